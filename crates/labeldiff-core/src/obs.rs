//! Structured lifecycle events for pipeline runs.
//!
//! Every event carries a fixed `event` field (`run.started`, `pair.stage`,
//! `pair.finished`, `run.finished`) so JSON logs can be filtered without
//! parsing messages. [`PairSpan`] scopes all logging of one pair.

use tracing::{info, warn};

/// RAII guard that enters a pair-scoped span.
///
/// ```ignore
/// let _span = PairSpan::enter("Pair1");
/// // events logged here carry pair = "Pair1"
/// ```
pub struct PairSpan {
    _span: tracing::span::EnteredSpan,
}

impl PairSpan {
    pub fn enter(pair: &str) -> Self {
        Self {
            _span: pair_span(pair).entered(),
        }
    }
}

/// The pair-scoped span, for instrumenting futures that cannot hold a
/// [`PairSpan`] across `.await`.
pub fn pair_span(pair: &str) -> tracing::Span {
    tracing::info_span!("labeldiff.pair", pair = %pair)
}

pub fn emit_run_started(run_id: &str, pairs: usize) {
    info!(event = "run.started", run_id = %run_id, pairs = pairs);
}

/// A pair entered `stage`.
pub fn emit_pair_stage(pair: &str, stage: &str) {
    info!(event = "pair.stage", pair = %pair, stage = %stage);
}

pub fn emit_pair_finished(pair: &str, success: bool, stage: &str, duration_ms: u64) {
    if success {
        info!(event = "pair.finished", pair = %pair, success, stage = %stage, duration_ms);
    } else {
        warn!(event = "pair.finished", pair = %pair, success, stage = %stage, duration_ms);
    }
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, succeeded: usize, failed: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        succeeded = succeeded,
        failed = failed,
    );
}
