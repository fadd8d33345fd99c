//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration file from the
//! platform config directory (or an explicit path), falls back to defaults
//! when the file does not exist, and can write a file back out.

pub mod config;
