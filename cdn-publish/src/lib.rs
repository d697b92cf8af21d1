pub mod cli;
pub mod commands;
pub mod load_config;

pub use cli::{describe_error, run, run_with, Cli, Commands};
