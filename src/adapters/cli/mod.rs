/// Command line adapter - parses arguments with clap and drives the use cases
pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
pub use commands::{exit_code, run};
