use serde::Serialize;
use thiserror::Error;

use crate::events::Phase;

/// Classification of a per-city failure, reported in the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    FetchFailed,
    ValidationFailed,
    RawWriteFailed,
    RecordWriteFailed,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::FetchFailed => "FetchFailed",
            FailureKind::ValidationFailed => "ValidationFailed",
            FailureKind::RawWriteFailed => "RawWriteFailed",
            FailureKind::RecordWriteFailed => "RecordWriteFailed",
        }
    }

    /// Pipeline phase that produces this kind of failure.
    pub fn phase(&self) -> Phase {
        match self {
            FailureKind::FetchFailed => Phase::Fetch,
            FailureKind::ValidationFailed => Phase::Normalize,
            FailureKind::RawWriteFailed => Phase::RawWrite,
            FailureKind::RecordWriteFailed => Phase::RecordWrite,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A required or optional payload field that was absent or unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field `{field}` {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn missing(field: &'static str) -> Self {
        Self { field, reason: "is missing".to_string() }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self { field, reason: reason.into() }
    }
}

/// Failure of one city's pipeline. Never escapes [`crate::ingest::Ingestor::run`].
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("fetch failed: {cause:#}")]
    FetchFailed { cause: anyhow::Error },

    #[error("validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    #[error("raw write to `{key}` failed: {cause:#}")]
    RawWriteFailed { key: String, cause: anyhow::Error },

    #[error("record write failed: {cause:#}")]
    RecordWriteFailed { cause: anyhow::Error },
}

impl IngestError {
    pub fn kind(&self) -> FailureKind {
        match self {
            IngestError::FetchFailed { .. } => FailureKind::FetchFailed,
            IngestError::ValidationFailed(_) => FailureKind::ValidationFailed,
            IngestError::RawWriteFailed { .. } => FailureKind::RawWriteFailed,
            IngestError::RecordWriteFailed { .. } => FailureKind::RecordWriteFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_variants() {
        let err = IngestError::FetchFailed { cause: anyhow::anyhow!("timeout") };
        assert_eq!(err.kind(), FailureKind::FetchFailed);
        assert!(err.to_string().contains("timeout"));

        let err: IngestError = ValidationError::missing("main.temp").into();
        assert_eq!(err.kind(), FailureKind::ValidationFailed);
        assert_eq!(err.to_string(), "validation failed: field `main.temp` is missing");
    }

    #[test]
    fn raw_write_error_names_key() {
        let err = IngestError::RawWriteFailed {
            key: "raw-data/Durban/x.json".into(),
            cause: anyhow::anyhow!("denied"),
        };
        assert_eq!(err.kind(), FailureKind::RawWriteFailed);
        assert!(err.to_string().contains("raw-data/Durban/x.json"));
    }

    #[test]
    fn failure_kinds_map_to_phases() {
        assert_eq!(FailureKind::FetchFailed.phase(), Phase::Fetch);
        assert_eq!(FailureKind::ValidationFailed.phase(), Phase::Normalize);
        assert_eq!(FailureKind::RawWriteFailed.phase(), Phase::RawWrite);
        assert_eq!(FailureKind::RecordWriteFailed.phase(), Phase::RecordWrite);
        assert_eq!(FailureKind::RawWriteFailed.phase().as_str(), "raw_write");
    }
}
