//! labeldiff pipeline - multi-pair label comparison and annotation
//!
//! Takes registered drawing pairs through:
//! - one batched label comparison (external command or pre-computed CSV sheets)
//! - per-pair classification into the four label lists
//! - annotation of revision A and revision B
//!
//! and records a [`RunReport`] in `manifest.json`.

pub mod compare;
pub mod config;
pub mod digest;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod runner;
pub mod stage;
pub mod workspace;

pub use compare::{CommandComparator, Comparison, CsvDirectoryComparator, LabelComparator};
pub use config::PipelineConfig;
pub use digest::FileDigest;
pub use error::{ComparisonError, PipelineError};
pub use job::{DrawingPair, FailureKind, PairFailure, PairOutputs, PairResult, Revision};
pub use pipeline::PairPipeline;
pub use progress::{ProgressReporter, ProgressUpdate};
pub use report::{render_summary_md, write_manifest, RunReport};
pub use runner::{CommandOutput, CommandRunner, CommandSpec};
pub use stage::PairStage;
pub use workspace::RunWorkspace;
