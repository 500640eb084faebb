//! # Detection Error Types
//!
//! Errors surface only at the edges: config validation, scenario loading and
//! sink delivery. The per-sample detection path has no error channel; bad
//! samples are skipped.

use thiserror::Error;

/// Errors that can occur around the detection core.
#[derive(Error, Debug)]
pub enum DetectionError {
    /// A configuration value is out of range.
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfig {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A config or scenario document is not valid TOML for its schema.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// Reading a scenario file failed.
    #[error("scenario I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unknown built-in scenario name.
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    /// A violation could not be handed to its sink.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Delivery failures reported by a violation sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The sink's buffer is full; the violation was dropped.
    #[error("violation sink full, dropped violation for {entity}")]
    Full {
        /// Entity whose violation was dropped.
        entity: String,
    },

    /// The receiving side is gone.
    #[error("violation sink disconnected")]
    Disconnected,
}

/// Result type for detection operations.
pub type DetectionResult<T> = Result<T, DetectionError>;

impl DetectionError {
    /// Shorthand for [`DetectionError::InvalidConfig`].
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig { field, reason: reason.into() }
    }
}
