//! Run-level errors.
//!
//! Only failures that prevent every pair from making progress are errors
//! here. Everything confined to one pair is a [`PairFailure`](crate::job::PairFailure)
//! recorded in that pair's result.

use std::path::PathBuf;
use std::time::Duration;

use labeldiff_core::ClassificationError;

/// The label comparison step failed.
#[derive(Debug, thiserror::Error)]
pub enum ComparisonError {
    #[error("comparison command failed: {message}")]
    CommandFailed { message: String, stderr: String },

    #[error("comparison timed out after {0:?}")]
    Timeout(Duration),

    #[error("cannot read comparison sheets: {0}")]
    Sheets(#[from] ClassificationError),

    #[error("cannot prepare comparison input {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ComparisonError {
    /// Captured standard error of a failed comparison command.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ComparisonError::CommandFailed { stderr, .. } if !stderr.is_empty() => Some(stderr),
            _ => None,
        }
    }
}

/// Errors that abort a whole run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid pair registration: {0}")]
    Registration(String),

    #[error("invalid pipeline configuration: {0}")]
    Config(String),

    #[error("label comparison failed: {0}")]
    Comparison(#[from] ComparisonError),

    #[error("working directory error at {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write run manifest: {0}")]
    Manifest(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_stderr() {
        let err = ComparisonError::CommandFailed {
            message: "exit 2".into(),
            stderr: "sheet missing".into(),
        };
        assert_eq!(err.stderr(), Some("sheet missing"));
        assert_eq!(ComparisonError::Timeout(Duration::from_secs(1)).stderr(), None);
    }

    #[test]
    fn test_comparison_converts_to_pipeline_error() {
        let err: PipelineError = ComparisonError::Timeout(Duration::from_secs(120)).into();
        assert!(err.to_string().contains("timed out"));
    }
}
