//! Library side of the `stagetree` command line tool
//!
//! Holds what the subcommands share: the configuration file and reading
//! and writing the JSON files the tool works on.

pub mod config;
pub mod files;
pub mod interrupt;

pub use config::{Config, ConfigError};
pub use files::FileError;
