//! Multi-pair orchestration.
//!
//! A run compares every registered pair in one batch, then takes each pair
//! through classification and the annotation of both revisions. Anything
//! that goes wrong inside a pair is recorded in that pair's [`PairResult`];
//! only registration and the shared comparison step can fail the run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use labeldiff_core::obs::{self, PairSpan};
use labeldiff_core::{
    annotate_file_cancellable, AnnotateError, AnnotationReport, ComparisonSheet,
    DiffClassification, DrawingStore, LabelLists,
};

use crate::compare::LabelComparator;
use crate::config::PipelineConfig;
use crate::digest::FileDigest;
use crate::error::{ComparisonError, PipelineError, Result};
use crate::job::{DrawingPair, FailureKind, PairFailure, PairOutputs, PairResult, Revision};
use crate::progress::ProgressReporter;
use crate::report::{write_manifest, RunReport};
use crate::stage::{PairStage, StageTracker};
use crate::workspace::RunWorkspace;

/// Orchestrates comparison, classification and annotation for a set of pairs.
pub struct PairPipeline {
    config: Arc<PipelineConfig>,
    comparator: Arc<dyn LabelComparator>,
    store: Arc<dyn DrawingStore>,
    progress: ProgressReporter,
}

impl PairPipeline {
    pub fn new(
        config: PipelineConfig,
        comparator: Arc<dyn LabelComparator>,
        store: Arc<dyn DrawingStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            comparator,
            store,
            progress: ProgressReporter::disabled(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Check a pair list before any work starts.
    pub fn register(&self, pairs: &[DrawingPair]) -> Result<()> {
        if pairs.is_empty() {
            return Err(PipelineError::Registration("no pairs registered".to_string()));
        }
        if pairs.len() > self.config.max_pairs {
            return Err(PipelineError::Registration(format!(
                "{} pairs registered, at most {} allowed",
                pairs.len(),
                self.config.max_pairs
            )));
        }

        let mut names = HashSet::new();
        for pair in pairs {
            if pair.name.trim().is_empty() {
                return Err(PipelineError::Registration("pair name is empty".to_string()));
            }
            if !names.insert(pair.name.as_str()) {
                return Err(PipelineError::Registration(format!(
                    "duplicate pair name '{}'",
                    pair.name
                )));
            }
            for revision in [Revision::A, Revision::B] {
                let path = pair.revision(revision);
                if !path.is_file() {
                    return Err(PipelineError::Registration(format!(
                        "pair '{}': revision {} not found at {}",
                        pair.name,
                        revision,
                        path.display()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Run every pair and write `manifest.json` into the workspace root.
    pub async fn run(
        &self,
        pairs: Vec<DrawingPair>,
        workspace: &mut RunWorkspace,
    ) -> Result<RunReport> {
        self.config.validate()?;
        self.register(&pairs)?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();
        obs::emit_run_started(&run_id.to_string(), pairs.len());

        let mut trackers: Vec<StageTracker> =
            pairs.iter().map(|p| StageTracker::new(&p.name)).collect();
        for tracker in &mut trackers {
            tracker.advance(PairStage::Comparing);
        }

        self.progress
            .run_status(format!("Comparing labels across {} pair(s)", pairs.len()));
        let comparison = match tokio::time::timeout(
            self.config.timeout,
            self.comparator.compare(&pairs, workspace.root()),
        )
        .await
        {
            Ok(Ok(comparison)) => comparison,
            Ok(Err(e)) => return Err(self.comparison_failed(e)),
            Err(_) => {
                let err = ComparisonError::Timeout(self.config.timeout);
                return Err(self.comparison_failed(err));
            }
        };

        let mut jobs = Vec::with_capacity(pairs.len());
        for (pair, tracker) in pairs.into_iter().zip(trackers) {
            let dir = workspace.pair_dir(&pair.name)?;
            let sheet = comparison.workbook.sheet(&pair.name).cloned();
            jobs.push(PairJob {
                pair,
                dir,
                sheet,
                comparison_stderr: comparison.stderr.clone(),
                tracker,
            });
        }

        let workers = self.config.max_concurrent_pairs.clamp(1, jobs.len());
        let sem = Arc::new(Semaphore::new(workers));
        let mut tasks = Vec::with_capacity(jobs.len());
        for job in jobs {
            // Taking the permit here keeps pairs starting in registration order.
            let permit = Arc::clone(&sem).acquire_owned().await.ok();
            let ctx = PairContext {
                config: Arc::clone(&self.config),
                store: Arc::clone(&self.store),
                progress: self.progress.clone(),
            };
            let name = job.pair.name.clone();
            let span = obs::pair_span(&name);
            let task = tokio::spawn(
                async move {
                    let _permit = permit;
                    process_pair(ctx, job).await
                }
                .instrument(span),
            );
            tasks.push((name, task));
        }

        let joined = join_all(
            tasks
                .into_iter()
                .map(|(name, task)| async move { (name, task.await) }),
        )
        .await;
        let results: Vec<PairResult> = joined
            .into_iter()
            .map(|(name, joined)| match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!(pair = %name, error = %e, "pair task aborted");
                    let failure =
                        PairFailure::new(PairStage::Failed, FailureKind::Aborted, e.to_string());
                    PairResult::failed(name, PairOutputs::default(), failure, 0)
                }
            })
            .collect();

        let report = RunReport::new(run_id, started_at, workspace.root().to_path_buf(), results);
        let manifest = write_manifest(workspace.root(), &report)?;
        info!(manifest = %manifest.display(), "run manifest written");

        obs::emit_run_finished(
            &run_id.to_string(),
            started.elapsed().as_millis() as u64,
            report.succeeded,
            report.failed,
        );
        self.progress.run_status(format!(
            "All pairs processed: {} succeeded, {} failed",
            report.succeeded, report.failed
        ));
        Ok(report)
    }

    fn comparison_failed(&self, err: ComparisonError) -> PipelineError {
        warn!(error = %err, "label comparison failed; no pair was processed");
        self.progress.run_status(format!("Label comparison failed: {err}"));
        err.into()
    }
}

struct PairContext {
    config: Arc<PipelineConfig>,
    store: Arc<dyn DrawingStore>,
    progress: ProgressReporter,
}

struct PairJob {
    pair: DrawingPair,
    dir: PathBuf,
    sheet: Option<ComparisonSheet>,
    comparison_stderr: Option<String>,
    tracker: StageTracker,
}

async fn process_pair(ctx: PairContext, job: PairJob) -> PairResult {
    let started = Instant::now();
    let PairJob {
        pair,
        dir,
        sheet,
        comparison_stderr,
        mut tracker,
    } = job;
    let name = pair.name.clone();

    let mut outputs = PairOutputs {
        output_dir: dir.clone(),
        original_a_name: file_name(&pair.revision_a),
        original_b_name: file_name(&pair.revision_b),
        ..PairOutputs::default()
    };

    let failure = match sheet {
        Some(sheet) => run_stages(&ctx, &pair, &dir, sheet, &mut tracker, &mut outputs).await,
        None => Some(
            PairFailure::new(
                PairStage::Comparing,
                FailureKind::MissingSheet,
                format!("comparison produced no sheet named '{name}'"),
            )
            .with_stderr(comparison_stderr),
        ),
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    match failure {
        None => {
            tracker.advance(PairStage::Completed);
            obs::emit_pair_finished(&name, true, PairStage::Completed.as_str(), duration_ms);
            ctx.progress
                .pair_status(&name, PairStage::Completed, format!("Pair {name}: completed"));
            PairResult::completed(name, outputs, duration_ms)
        }
        Some(failure) => {
            tracker.advance(PairStage::Failed);
            obs::emit_pair_finished(&name, false, failure.stage.as_str(), duration_ms);
            ctx.progress.pair_status(
                &name,
                PairStage::Failed,
                format!("Pair {name}: failed during {}: {}", failure.stage, failure.message),
            );
            PairResult::failed(name, outputs, failure, duration_ms)
        }
    }
}

/// Classify and annotate one pair, returning the first failure.
async fn run_stages(
    ctx: &PairContext,
    pair: &DrawingPair,
    dir: &Path,
    sheet: ComparisonSheet,
    tracker: &mut StageTracker,
    outputs: &mut PairOutputs,
) -> Option<PairFailure> {
    let name = pair.name.as_str();

    ctx.progress
        .pair_status(name, PairStage::Classified, format!("Pair {name}: classifying labels"));
    let base = dir
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let classify_dir = dir.to_path_buf();
    let revisions = (pair.revision_a.clone(), pair.revision_b.clone());
    let classified = tokio::task::spawn_blocking(move || {
        let staged = classify_sheet(&sheet, &classify_dir, &base);
        let digests = (digest_of(&revisions.0), digest_of(&revisions.1));
        (staged, digests)
    })
    .await;

    let (staged, (digest_a, digest_b)) = match classified {
        Ok(value) => value,
        Err(e) => {
            return Some(PairFailure::new(
                PairStage::Classified,
                FailureKind::Aborted,
                format!("classification task failed: {e}"),
            ))
        }
    };
    outputs.digest_a = digest_a;
    outputs.digest_b = digest_b;
    let (classification, lists, sheet_csv) = match staged {
        Ok(staged) => staged,
        Err(failure) => return Some(failure),
    };
    info!(
        deleted = classification.deleted.len(),
        added = classification.added.len(),
        modified_a = classification.modified_a.len(),
        modified_b = classification.modified_b.len(),
        "labels classified"
    );
    outputs.classification = Some(classification);
    outputs.label_lists = Some(lists.clone());
    outputs.sheet_csv = Some(sheet_csv);
    tracker.advance(PairStage::Classified);

    let output_a = annotated_path(dir, &pair.revision_a, &ctx.config.processed_suffix, None);
    let output_b = annotated_path(
        dir,
        &pair.revision_b,
        &ctx.config.processed_suffix,
        Some(output_a.as_path()),
    );

    let mut failures = Vec::new();
    for (revision, output) in [(Revision::A, output_a), (Revision::B, output_b)] {
        tracker.advance(revision.stage());
        ctx.progress.pair_status(
            name,
            revision.stage(),
            format!(
                "Pair {name}: annotating revision {revision} ({})",
                file_name(pair.revision(revision))
            ),
        );
        match annotate_revision(ctx, pair, revision, &lists, &output).await {
            Ok(report) => {
                info!(
                    revision = %revision,
                    output = %output.display(),
                    entities = report.entities_processed,
                    text_matched = report.text_matched,
                    "revision annotated"
                );
                match revision {
                    Revision::A => outputs.annotated_a = Some(output),
                    Revision::B => outputs.annotated_b = Some(output),
                }
            }
            Err(failure) => {
                warn!(revision = %revision, error = %failure.message, "revision annotation failed");
                failures.push((revision, failure));
            }
        }
    }

    match failures.len() {
        0 => None,
        1 => failures.pop().map(|(_, failure)| failure),
        _ => {
            let message = failures
                .iter()
                .map(|(revision, f)| format!("revision {revision}: {}", f.message))
                .collect::<Vec<_>>()
                .join("; ");
            let mut first = failures.swap_remove(0).1;
            first.message = message;
            Some(first)
        }
    }
}

fn classify_sheet(
    sheet: &ComparisonSheet,
    dir: &Path,
    base: &str,
) -> std::result::Result<(DiffClassification, LabelLists, PathBuf), PairFailure> {
    let classification = sheet.classify().map_err(|e| {
        PairFailure::new(PairStage::Classified, FailureKind::Classification, e.to_string())
    })?;

    let sheet_csv = dir.join(format!("{base}.csv"));
    sheet.write_csv(&sheet_csv).map_err(|e| {
        PairFailure::new(PairStage::Classified, FailureKind::Io, e.to_string())
    })?;

    let lists = LabelLists::write(dir, base, &classification).map_err(|e| {
        PairFailure::new(
            PairStage::Classified,
            FailureKind::Io,
            format!("cannot write label lists: {e}"),
        )
    })?;
    Ok((classification, lists, sheet_csv))
}

async fn annotate_revision(
    ctx: &PairContext,
    pair: &DrawingPair,
    revision: Revision,
    lists: &LabelLists,
    output: &Path,
) -> std::result::Result<AnnotationReport, PairFailure> {
    let stage = revision.stage();
    let config = ctx
        .config
        .annotation_config(revision, lists)
        .map_err(|e| PairFailure::new(stage, FailureKind::Rules, e.to_string()))?;

    let store = Arc::clone(&ctx.store);
    let input = pair.revision(revision).to_path_buf();
    let output_path = output.to_path_buf();
    let span_name = pair.name.clone();
    let cancel = Arc::new(AtomicBool::new(false));
    let task_cancel = Arc::clone(&cancel);
    let task = tokio::task::spawn_blocking(move || {
        let _span = PairSpan::enter(&span_name);
        annotate_file_cancellable(store.as_ref(), &input, &output_path, &config, &task_cancel)
    });

    // A timed-out blocking task keeps running detached; the flag stops it
    // before it writes the output.
    match tokio::time::timeout(ctx.config.timeout, task).await {
        Err(_) => {
            cancel.store(true, Ordering::Release);
            Err(PairFailure::new(
                stage,
                FailureKind::Timeout,
                format!(
                    "revision {revision} annotation timed out after {:?}",
                    ctx.config.timeout
                ),
            ))
        }
        Ok(Err(e)) => Err(PairFailure::new(
            stage,
            FailureKind::Aborted,
            format!("annotation task failed: {e}"),
        )),
        Ok(Ok(Err(e))) => Err(annotate_failure(stage, e)),
        Ok(Ok(Ok(report))) => Ok(report),
    }
}

fn annotate_failure(stage: PairStage, err: AnnotateError) -> PairFailure {
    let kind = match &err {
        AnnotateError::Config(_) => FailureKind::Config,
        AnnotateError::Document(doc) if doc.is_structural() => FailureKind::Document,
        AnnotateError::Document(_) => FailureKind::Io,
        AnnotateError::Cancelled { .. } => FailureKind::Timeout,
    };
    PairFailure::new(stage, kind, err.to_string())
}

/// `<dir>/<stem><suffix>.dxf`. When it collides with `taken`, `_b` is appended
/// to the stem so the two revisions never overwrite each other.
fn annotated_path(dir: &Path, input: &Path, suffix: &str, taken: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "drawing".to_string());
    let path = dir.join(format!("{stem}{suffix}.dxf"));
    match taken {
        Some(taken) if taken == path => dir.join(format!("{stem}{suffix}_b.dxf")),
        _ => path,
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn digest_of(path: &Path) -> Option<FileDigest> {
    match FileDigest::of_file(path) {
        Ok(digest) => Some(digest),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot digest revision");
            None
        }
    }
}
