//! Configuration management for httpscope
//!
//! This module handles both command line arguments and configuration file loading.
//! Configuration priority (highest to lowest):
//! 1. Command line arguments
//! 2. --config specified file
//! 3. ~/.httpscope/config.toml
//! 4. ./httpscope.toml

pub mod args;
pub mod merged;
pub mod settings;

pub use args::{Args, ParsedArgs};
pub use merged::MergedConfig;
pub use settings::Config;
