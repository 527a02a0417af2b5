//! Error types for cdp-crawler
//!
//! This module defines the error hierarchy for:
//! - Device session and command errors
//! - Command output parsing errors
//! - SQLite storage and export errors
//! - Configuration and CLI errors
//! - Worker pool errors
//!
//! Per-visit failures are never propagated as errors out of the worker
//! pool; they are reduced to a [`VisitOutcome`] and counted.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the crawler
#[derive(Error, Debug)]
pub enum CrawlerError {
    /// Device access errors
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Output parsing errors
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Device session and command errors
#[derive(Error, Debug, Clone)]
pub enum DeviceError {
    /// Address could not be resolved to a socket address
    #[error("Failed to resolve '{address}': {reason}")]
    Resolve { address: String, reason: String },

    /// TCP connect or SSH handshake failed
    #[error("Failed to connect to '{address}': {reason}")]
    ConnectionFailed { address: String, reason: String },

    /// Credentials were rejected
    #[error("Authentication failed for '{username}' on '{address}'")]
    AuthFailed { address: String, username: String },

    /// Command could not be executed or its output read
    #[error("Command '{command}' failed on '{address}': {reason}")]
    CommandFailed {
        address: String,
        command: String,
        reason: String,
    },

    /// Operation exceeded the per-operation timeout
    #[error("Operation on '{address}' timed out after {secs}s")]
    Timeout { address: String, secs: u64 },
}

impl DeviceError {
    /// Check if the device rejected the credentials
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, DeviceError::AuthFailed { .. })
    }

    /// Check if the error was a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, DeviceError::Timeout { .. })
    }

    /// Address of the device the error refers to
    pub fn address(&self) -> &str {
        match self {
            DeviceError::Resolve { address, .. }
            | DeviceError::ConnectionFailed { address, .. }
            | DeviceError::AuthFailed { address, .. }
            | DeviceError::CommandFailed { address, .. }
            | DeviceError::Timeout { address, .. } => address,
        }
    }
}

/// Command output parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Device answered with an error line instead of command output
    #[error("Unexpected output from '{command}': {line}")]
    UnexpectedOutput { command: String, line: String },

    /// Output contained none of the expected fields
    #[error("No recognizable fields in '{command}' output")]
    Unrecognized { command: String },

    /// A neighbor block was missing its device identifier
    #[error("Malformed neighbor entry {index}: missing {field}")]
    MalformedEntry { index: usize, field: &'static str },
}

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Neighbor list (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV export error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error during export
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create database file
    #[error("Failed to create database at '{path}': {reason}")]
    CreateFailed { path: PathBuf, reason: String },

    /// Repository is not accepting writes
    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid queue capacity
    #[error("Invalid queue capacity {size}: must be at least {min}")]
    InvalidQueueCapacity { size: usize, min: usize },

    /// Invalid per-operation timeout
    #[error("Invalid timeout {secs}s: must be at least 1 second")]
    InvalidTimeout { secs: u64 },

    /// Invalid exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },

    /// Seed address is not a plausible host or IP
    #[error("Invalid seed address '{seed}': {reason}")]
    InvalidSeed { seed: String, reason: String },

    /// Seed or credential field missing
    #[error("Missing required value: {0}")]
    Missing(&'static str),
}

/// Worker pool errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked outside of a visit
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker thread could not be started
    #[error("Failed to start worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },

    /// Not a single worker could be started
    #[error("No workers could be started ({requested} requested)")]
    NoWorkers { requested: usize },

    /// Worker did not stop within the grace period
    #[error("Worker {id} did not stop within {grace_ms}ms")]
    NonTerminating { id: usize, grace_ms: u128 },
}

/// Result type alias for CrawlerError
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for DeviceError
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Result type alias for ParseError
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Result type alias for DbError
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Represents the outcome of visiting a single device
#[derive(Debug)]
pub enum VisitOutcome {
    /// Device was contacted and its record produced
    Visited {
        address: String,
        neighbors: usize,
        enqueued: usize,
        /// Neighbor facts could not be collected; record has no neighbors
        partial: bool,
        /// Record reached the repository
        persisted: bool,
    },

    /// Address was already admitted by another visit
    Duplicate { address: String },

    /// Skipped by policy (exclusion pattern, etc.)
    Skipped { address: String, reason: String },

    /// Device could not be reached or authenticated
    ConnectionFailed { address: String, error: DeviceError },

    /// Identity facts could not be collected
    ParseFailed { address: String, error: ParseError },

    /// The visit panicked; contained by the worker loop
    Panicked { address: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_classification() {
        let auth = DeviceError::AuthFailed {
            address: "10.0.0.1".into(),
            username: "admin".into(),
        };
        assert!(auth.is_auth_failure());
        assert!(!auth.is_timeout());
        assert_eq!(auth.address(), "10.0.0.1");

        let timeout = DeviceError::Timeout {
            address: "10.0.0.2".into(),
            secs: 30,
        };
        assert!(timeout.is_timeout());
    }

    #[test]
    fn test_error_conversion() {
        let err = DeviceError::ConnectionFailed {
            address: "10.0.0.1".into(),
            reason: "refused".into(),
        };
        let crawler_err: CrawlerError = err.into();
        assert!(matches!(crawler_err, CrawlerError::Device(_)));

        let parse: CrawlerError = ParseError::Unrecognized {
            command: "show version".into(),
        }
        .into();
        assert!(matches!(parse, CrawlerError::Parse(_)));
    }
}
