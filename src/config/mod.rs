//! Configuration module for Sumi-Survey
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every field has a default, so an empty file (or no file at all) is a valid
//! configuration.
//!
//! # Example
//!
//! ```no_run
//! use sumi_survey::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("survey.toml")).unwrap();
//! println!("Page fetch timeout: {}s", config.fetcher.request_timeout_secs);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, FetcherConfig, OrchestratorConfig, OutputConfig, StorageConfig, UserAgentConfig,
    VerifierConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
