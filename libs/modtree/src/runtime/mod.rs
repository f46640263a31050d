mod runner;
pub mod shutdown;

pub use runner::{boot, run, RunOptions, ShutdownOptions};
