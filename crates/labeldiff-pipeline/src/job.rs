//! Registered pairs and their per-pair results.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use labeldiff_core::{DiffClassification, LabelLists};

use crate::digest::FileDigest;
use crate::stage::PairStage;

/// One of the two revisions of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Revision {
    A,
    B,
}

impl Revision {
    pub fn stage(self) -> PairStage {
        match self {
            Revision::A => PairStage::AnnotatingA,
            Revision::B => PairStage::AnnotatingB,
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revision::A => f.write_str("A"),
            Revision::B => f.write_str("B"),
        }
    }
}

/// Two revisions of one drawing registered under a unique name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawingPair {
    pub name: String,
    pub revision_a: PathBuf,
    pub revision_b: PathBuf,
}

impl DrawingPair {
    pub fn new(
        name: impl Into<String>,
        revision_a: impl Into<PathBuf>,
        revision_b: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            revision_a: revision_a.into(),
            revision_b: revision_b.into(),
        }
    }

    pub fn revision(&self, revision: Revision) -> &Path {
        match revision {
            Revision::A => &self.revision_a,
            Revision::B => &self.revision_b,
        }
    }
}

/// What went wrong, for programmatic handling of a failed pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No comparison sheet for the pair.
    MissingSheet,
    Classification,
    /// Rule files could not be loaded.
    Rules,
    Config,
    /// The drawing could not be parsed.
    Document,
    Io,
    Timeout,
    /// Internal task failure.
    Aborted,
}

/// Diagnostic for a failed pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairFailure {
    /// Stage that failed first.
    pub stage: PairStage,
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl PairFailure {
    pub fn new(stage: PairStage, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
            stderr: None,
        }
    }

    pub fn with_stderr(mut self, stderr: Option<String>) -> Self {
        self.stderr = stderr;
        self
    }
}

impl fmt::Display for PairFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.message)
    }
}

/// Files produced for a pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairOutputs {
    pub output_dir: PathBuf,
    pub original_a_name: String,
    pub original_b_name: String,
    /// Copy of the comparison sheet.
    pub sheet_csv: Option<PathBuf>,
    pub label_lists: Option<LabelLists>,
    pub classification: Option<DiffClassification>,
    pub annotated_a: Option<PathBuf>,
    pub annotated_b: Option<PathBuf>,
    pub digest_a: Option<FileDigest>,
    pub digest_b: Option<FileDigest>,
}

/// Outcome of one pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairResult {
    pub pair_name: String,
    pub success: bool,
    pub stage: PairStage,
    pub duration_ms: u64,
    pub outputs: PairOutputs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PairFailure>,
}

impl PairResult {
    pub fn completed(pair_name: impl Into<String>, outputs: PairOutputs, duration_ms: u64) -> Self {
        Self {
            pair_name: pair_name.into(),
            success: true,
            stage: PairStage::Completed,
            duration_ms,
            outputs,
            error: None,
        }
    }

    pub fn failed(
        pair_name: impl Into<String>,
        outputs: PairOutputs,
        failure: PairFailure,
        duration_ms: u64,
    ) -> Self {
        Self {
            pair_name: pair_name.into(),
            success: false,
            stage: PairStage::Failed,
            duration_ms,
            outputs,
            error: Some(failure),
        }
    }
}
