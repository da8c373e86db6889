//! Error taxonomy for label classification, colour rules and drawing documents.

use std::path::PathBuf;

/// Errors produced while turning a comparison table into label sets.
#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("row {row}: {field} is not an integer: {value:?}")]
    InvalidNumber {
        row: usize,
        field: &'static str,
        value: String,
    },

    #[error("comparison sheet {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced while building colour rule tables.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("malformed colour rule {spec:?}: expected color:strings or color:file.txt")]
    MalformedSpec { spec: String },

    #[error("cannot read rule file {path}: {source}")]
    RuleFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors produced by the drawing document collaborator.
///
/// `Parse` is a structural failure of the drawing itself and is kept apart
/// from plain I/O failures so callers can report them differently.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("structure error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("unsupported document: {0}")]
    Unsupported(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DocumentError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    /// Whether this is a structural error in the drawing rather than I/O.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::Unsupported(_))
    }
}

/// Rejected annotation settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("line width must be within 0..=2.11 mm, got {0}")]
    LineWidth(f64),

    #[error("line colour must be a palette index within 0..=7, got {0}")]
    LineColor(i16),

    #[error("minimum font size must be a positive number of mm, got {0}")]
    MinFontSize(f64),
}

/// Failure to annotate one drawing file.
#[derive(Debug, thiserror::Error)]
pub enum AnnotateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("annotation cancelled before saving {}", output.display())]
    Cancelled { output: std::path::PathBuf },
}

/// A failure confined to a single entity. The annotation engine logs these
/// and moves on to the next entity.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EntityError {
    #[error("{dxf_type} {handle}: text height {height} is not a usable size")]
    InvalidHeight {
        dxf_type: String,
        handle: String,
        height: f64,
    },
}
