/// Native module contains implementations of core traits
/// backed by real operating system processes.
pub mod process;
