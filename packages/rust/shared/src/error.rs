//! Error types for Tiercast.
//!
//! Library crates use [`TiercastError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::DegradationLevel;

/// Top-level error type for all Tiercast operations.
#[derive(Debug, thiserror::Error)]
pub enum TiercastError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad module, duplicate ids, malformed input).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// JSON/TOML encoding or decoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A phase name that was never registered.
    #[error("unknown phase: {0}")]
    UnknownPhase(String),

    /// A phase was started before all of its predecessors completed.
    #[error("phase `{phase}` cannot start: waiting on {}", .waiting_on.join(", "))]
    PhaseOrdering {
        phase: String,
        waiting_on: Vec<String>,
    },

    /// A producer returned an error.
    #[error("producer `{producer}` failed: {message}")]
    Producer { producer: String, message: String },

    /// A producer attempt exceeded its timeout.
    #[error("producer `{producer}` timed out after {timeout_ms} ms")]
    ProducerTimeout { producer: String, timeout_ms: u64 },

    /// A phase ended `failed`, halting the pipeline.
    #[error("phase `{phase}` failed: {}", .failures.join("; "))]
    PhaseFailed {
        phase: String,
        failures: Vec<String>,
    },

    /// The phase was cancelled while producers were in flight.
    #[error("phase `{phase}` was cancelled")]
    Cancelled { phase: String },

    /// A caller asked to move up the degradation chain.
    #[error("invalid degradation direction: cannot go from `{from}` up to `{to}`")]
    InvalidDegradationDirection {
        from: DegradationLevel,
        to: DegradationLevel,
    },

    /// An emergency program failed its cold-start post-condition.
    #[error("emergency program is not usable from a cold start: {reason}")]
    ColdStartViolation { reason: String },

    /// The compiled routing spec failed its consistency checks.
    #[error("spec validation failed: {}", .problems.join("; "))]
    SpecValidation { problems: Vec<String> },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TiercastError>;

impl TiercastError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a producer error attributed to `producer`.
    pub fn producer(producer: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Producer {
            producer: producer.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error aborts a whole pipeline run rather than one phase.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PhaseOrdering { .. } | Self::SpecValidation { .. })
    }

    /// Whether a producer attempt that failed with this error may be retried.
    ///
    /// Cancellation and run-level errors are final.
    pub fn is_retryable(&self) -> bool {
        !self.is_fatal()
            && !matches!(
                self,
                Self::Cancelled { .. } | Self::UnknownPhase(_) | Self::PhaseFailed { .. }
            )
    }
}

impl From<serde_json::Error> for TiercastError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = TiercastError::config("missing axes");
        assert_eq!(err.to_string(), "config error: missing axes");

        let err = TiercastError::PhaseOrdering {
            phase: "integration".into(),
            waiting_on: vec!["content_creation".into()],
        };
        assert_eq!(
            err.to_string(),
            "phase `integration` cannot start: waiting on content_creation"
        );

        let err = TiercastError::InvalidDegradationDirection {
            from: DegradationLevel::Day,
            to: DegradationLevel::Program,
        };
        assert!(err.to_string().contains("`day` up to `program`"));
    }

    #[test]
    fn fatal_and_retryable_classes() {
        assert!(
            TiercastError::SpecValidation {
                problems: vec!["x".into()]
            }
            .is_fatal()
        );
        assert!(TiercastError::producer("p", "boom").is_retryable());
        assert!(
            !TiercastError::Cancelled {
                phase: "p".into()
            }
            .is_retryable()
        );
    }
}
