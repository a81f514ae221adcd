pub mod diagnostics;
pub mod domain;
pub mod markers;
pub mod state;
pub mod strategy;
pub mod supervisor;
pub mod traits;
