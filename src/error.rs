//! Error types for the intake service.

use std::path::PathBuf;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Reference data error: {0}")]
    ReferenceData(#[from] ReferenceDataError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures loading the county reference data. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ReferenceDataError {
    #[error("Failed to read reference data from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed reference data: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Reference data contains no counties")]
    Empty,

    #[error("Duplicate county name in reference data: {name}")]
    DuplicateCounty { name: String },

    #[error("County {name} has no sub-counties")]
    NoSubCounties { name: String },
}

/// Session state store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Another turn for the same conversation committed first.
    #[error("Conversation {conversation_id} was modified concurrently (expected revision {expected:?})")]
    Conflict {
        conversation_id: String,
        expected: Option<u64>,
    },
}

/// Step sequencer errors. These are operational failures of a turn, never
/// conversational text.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("County {county} accepted earlier has no reference record")]
    ReferenceInconsistency { county: String },

    #[error("Step {step} requires answer {answer} which has not been captured")]
    MissingAnswer { step: String, answer: String },

    #[error("Step {step} is not part of the {flow} flow")]
    UnknownStep { step: String, flow: String },

    #[error("Cursor {index} is out of range for a flow of {len} steps")]
    InvalidCursor { index: usize, len: usize },

    #[error("Turn did not reach a prompt after {steps} steps")]
    Stalled { steps: usize },

    #[error("Invalid flow definition: {0}")]
    Definition(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send response on {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
