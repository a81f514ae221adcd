use std::time::Duration;

pub const DEFAULT_COMPILER_NAME: &str = "typst";
pub const DEFAULT_WORKING_DIRECTORY: &str = "~/";

pub const COMPILE_SUBCOMMAND: &str = "compile";
pub const WATCH_SUBCOMMAND: &str = "watch";

// Status lines printed by `typst watch` on stderr.
pub const TEXT_COMPILING: &str = "compiling ...";
pub const TEXT_COMPILED_WITH_ERRORS: &str = "compiled with errors";
pub const TEXT_COMPILED_SUCCESSFULLY: &str = "compiled successfully";

/// Exit code used for a compilation the user stopped.
pub const STOPPED_EXIT_CODE: i32 = -1;

/// How long output of a killed compiler is still forwarded.
pub const KILLED_OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Size of the buffer child process output is read into.
pub const READ_CHUNK_SIZE: usize = 8 * 1024;

pub const EVENT_BUS_CAPACITY: usize = 256;
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

pub const COMMAND_TX_ERR: &str = "Failed to send command to supervisor";
