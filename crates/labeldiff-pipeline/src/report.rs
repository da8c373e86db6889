//! Run manifest and markdown summary.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::job::PairResult;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_SCHEMA_VERSION: &str = "1.0";

/// Outcome of a whole run, pairs in registration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: String,
    pub tool_version: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub workdir: PathBuf,
    pub pairs: Vec<PairResult>,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunReport {
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        workdir: PathBuf,
        pairs: Vec<PairResult>,
    ) -> Self {
        let succeeded = pairs.iter().filter(|p| p.success).count();
        let failed = pairs.len() - succeeded;
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            tool_version: labeldiff_core::VERSION.to_string(),
            run_id,
            started_at,
            finished_at: Utc::now(),
            workdir,
            pairs,
            succeeded,
            failed,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    pub fn pair(&self, name: &str) -> Option<&PairResult> {
        self.pairs.iter().find(|p| p.pair_name == name)
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}

/// Write `manifest.json` (pretty JSON) into `dir`.
pub fn write_manifest(dir: &Path, report: &RunReport) -> Result<PathBuf> {
    let path = dir.join(MANIFEST_FILE);
    let content = serde_json::to_string_pretty(report)
        .map_err(|e| PipelineError::Manifest(format!("serialize run report: {e}")))?;
    std::fs::write(&path, content)
        .map_err(|e| PipelineError::Manifest(format!("write {}: {e}", path.display())))?;
    Ok(path)
}

pub fn read_manifest(path: &Path) -> Result<RunReport> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| PipelineError::Manifest(format!("read {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| PipelineError::Manifest(format!("parse {}: {e}", path.display())))
}

/// Render a markdown summary of the run.
pub fn render_summary_md(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str("# Label Diff Run\n\n");
    out.push_str(&format!(
        "- run: `{}`\n- pairs: {}\n- succeeded: {}\n- failed: {}\n\n",
        report.run_id,
        report.pairs.len(),
        report.succeeded,
        report.failed
    ));

    out.push_str("| Pair | Result | Deleted | Added | Modified A | Modified B |\n");
    out.push_str("|---|---|---|---|---|---|\n");
    for pair in &report.pairs {
        let status = match &pair.error {
            None => "ok".to_string(),
            Some(failure) => format!("failed at {}", failure.stage),
        };
        let counts = match &pair.outputs.classification {
            Some(c) => format!(
                "{} | {} | {} | {}",
                c.deleted.len(),
                c.added.len(),
                c.modified_a.len(),
                c.modified_b.len()
            ),
            None => "- | - | - | -".to_string(),
        };
        out.push_str(&format!("| {} | {} | {} |\n", pair.pair_name, status, counts));
    }

    let failures: Vec<_> = report
        .pairs
        .iter()
        .filter_map(|p| p.error.as_ref().map(|e| (&p.pair_name, e)))
        .collect();
    if !failures.is_empty() {
        out.push_str("\n## Failures\n");
        for (name, failure) in failures {
            out.push_str(&format!("- `{}`: {}\n", name, failure.message));
        }
    }
    out
}
