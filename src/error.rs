//! Configuration error types.
//!
//! Protocol errors live in [`crate::mcp::protocol`] and registry errors in
//! [`crate::registry::error`].

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading the hub configuration.
///
/// The binary reports these before any server is mounted.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file exists but reading it failed.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path that was read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON, has unknown fields, or names an
    /// unknown server `kind`.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path that was parsed.
        path: PathBuf,
        /// The serde error, with line and column.
        #[source]
        source: serde_json::Error,
    },

    /// A config path given on the command line does not exist.
    ///
    /// A missing file at the default location is not an error; built-in
    /// defaults apply instead.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// The path given by the user.
        path: PathBuf,
    },

    /// A server entry or the logging section is invalid: an empty,
    /// duplicate or `:`-containing server id, or an unknown log level.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Which entry was rejected and why.
        message: String,
    },
}
