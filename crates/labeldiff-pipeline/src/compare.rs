//! Label comparison collaborators.
//!
//! A comparator turns the registered pairs into a [`Workbook`] holding one
//! sheet per pair name (plus an optional `Summary` sheet, which is ignored).
//! Whatever the comparison tool printed to stderr travels with it so a pair
//! that got no sheet can report it.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use labeldiff_core::Workbook;

use crate::error::ComparisonError;
use crate::job::DrawingPair;
use crate::runner::{CommandRunner, CommandSpec, CommandTimedOut};

/// File name of the pair list handed to an external comparison command.
pub const PAIRS_FILE: &str = "pairs.json";
/// Directory the external command writes its CSV sheets to.
pub const SHEETS_DIR: &str = "comparison";

/// Sheets produced by one comparison batch.
#[derive(Debug, Clone, Default)]
pub struct Comparison {
    pub workbook: Workbook,
    /// Diagnostics the comparison tool wrote to stderr, if any.
    pub stderr: Option<String>,
}

impl From<Workbook> for Comparison {
    fn from(workbook: Workbook) -> Self {
        Self {
            workbook,
            stderr: None,
        }
    }
}

#[async_trait]
pub trait LabelComparator: Send + Sync {
    /// Compare every pair in one batch. `workdir` is the run's scratch
    /// directory and may be used for intermediate files.
    async fn compare(
        &self,
        pairs: &[DrawingPair],
        workdir: &Path,
    ) -> Result<Comparison, ComparisonError>;
}

/// Reads sheets that were produced ahead of time: one `<pair>.csv` per pair
/// in a directory.
#[derive(Debug, Clone)]
pub struct CsvDirectoryComparator {
    dir: PathBuf,
}

impl CsvDirectoryComparator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl LabelComparator for CsvDirectoryComparator {
    async fn compare(
        &self,
        pairs: &[DrawingPair],
        _workdir: &Path,
    ) -> Result<Comparison, ComparisonError> {
        let dir = self.dir.clone();
        let workbook = tokio::task::spawn_blocking(move || Workbook::read_csv_dir(&dir))
            .await
            .map_err(|e| ComparisonError::CommandFailed {
                message: format!("sheet reader task failed: {e}"),
                stderr: String::new(),
            })??;
        info!(
            dir = %self.dir.display(),
            sheets = workbook.sheets.len(),
            pairs = pairs.len(),
            "comparison sheets loaded"
        );
        Ok(workbook.into())
    }
}

/// Runs an external comparison program.
///
/// The program is invoked as `<program> <args>... <pairs.json> <out_dir>`.
/// `pairs.json` is a JSON array of `{name, revision_a, revision_b}`; the
/// program must write one `<pair>.csv` per pair into `out_dir`.
#[derive(Debug, Clone)]
pub struct CommandComparator {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Duration,
}

impl CommandComparator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::ZERO,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Deadline enforced by the runner itself. The pipeline applies its own
    /// timeout on top of this.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn write_pairs(pairs: &[DrawingPair], path: &Path) -> Result<(), ComparisonError> {
        let input_err = |source| ComparisonError::Input {
            path: path.to_path_buf(),
            source,
        };
        let json = serde_json::to_vec_pretty(pairs)
            .map_err(|e| input_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        fs::write(path, json).map_err(input_err)
    }
}

#[async_trait]
impl LabelComparator for CommandComparator {
    async fn compare(
        &self,
        pairs: &[DrawingPair],
        workdir: &Path,
    ) -> Result<Comparison, ComparisonError> {
        let pairs_path = workdir.join(PAIRS_FILE);
        let out_dir = workdir.join(SHEETS_DIR);
        Self::write_pairs(pairs, &pairs_path)?;
        fs::create_dir_all(&out_dir).map_err(|source| ComparisonError::Input {
            path: out_dir.clone(),
            source,
        })?;

        let spec = CommandSpec::new(&self.program, self.timeout)
            .args(self.args.iter().cloned())
            .arg(pairs_path.as_os_str())
            .arg(out_dir.as_os_str())
            .current_dir(workdir);
        debug!(program = %self.program.display(), pairs = pairs.len(), "running comparison command");

        let output = match CommandRunner::execute(&spec).await {
            Ok(output) => output,
            Err(e) => {
                if let Some(timeout) = e.downcast_ref::<CommandTimedOut>() {
                    return Err(ComparisonError::Timeout(timeout.timeout));
                }
                return Err(ComparisonError::CommandFailed {
                    message: format!("{e:#}"),
                    stderr: String::new(),
                });
            }
        };

        if !output.passed() {
            return Err(ComparisonError::CommandFailed {
                message: format!(
                    "{} exited with code {}",
                    self.program.display(),
                    output.exit_code
                ),
                stderr: output.stderr,
            });
        }

        let dir = out_dir.clone();
        let workbook = tokio::task::spawn_blocking(move || Workbook::read_csv_dir(&dir))
            .await
            .map_err(|e| ComparisonError::CommandFailed {
                message: format!("sheet reader task failed: {e}"),
                stderr: String::new(),
            })??;
        info!(sheets = workbook.sheets.len(), duration_ms = output.duration_ms, "comparison finished");
        let stderr = Some(output.stderr.trim().to_string()).filter(|s| !s.is_empty());
        Ok(Comparison { workbook, stderr })
    }
}
