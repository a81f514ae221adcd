pub mod process;
pub mod strategy;
