//! Progress notifications for callers.
//!
//! Reporting never blocks the pipeline: updates go through an unbounded
//! channel and the caller's callback runs on its own thread. A panicking
//! callback is logged and the remaining updates are still delivered.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::warn;

use crate::stage::PairStage;

/// A human-readable status line, optionally tied to a pair and stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub pair: Option<String>,
    pub stage: Option<PairStage>,
    pub message: String,
}

impl ProgressUpdate {
    pub fn run(message: impl Into<String>) -> Self {
        Self {
            pair: None,
            stage: None,
            message: message.into(),
        }
    }

    pub fn pair(pair: &str, stage: PairStage, message: impl Into<String>) -> Self {
        Self {
            pair: Some(pair.to_string()),
            stage: Some(stage),
            message: message.into(),
        }
    }
}

/// Sending half handed to the pipeline. Cloning shares the same receiver.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<UnboundedSender<ProgressUpdate>>,
}

impl ProgressReporter {
    /// A reporter that discards every update.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// A reporter and the receiver its updates arrive on.
    pub fn channel() -> (Self, UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Deliver updates to `callback` on a dedicated thread.
    pub fn from_fn<F>(callback: F) -> Self
    where
        F: Fn(&ProgressUpdate) + Send + 'static,
    {
        let (reporter, mut rx) = Self::channel();
        let spawned = std::thread::Builder::new()
            .name("labeldiff-progress".to_string())
            .spawn(move || {
                while let Some(update) = rx.blocking_recv() {
                    if catch_unwind(AssertUnwindSafe(|| callback(&update))).is_err() {
                        warn!(message = %update.message, "progress callback panicked");
                    }
                }
            });
        match spawned {
            Ok(_) => reporter,
            Err(e) => {
                warn!(error = %e, "cannot start progress thread; progress disabled");
                Self::disabled()
            }
        }
    }

    pub fn report(&self, update: ProgressUpdate) {
        if let Some(tx) = &self.tx {
            // A dropped receiver only means nobody is listening.
            let _ = tx.send(update);
        }
    }

    pub fn run_status(&self, message: impl Into<String>) {
        self.report(ProgressUpdate::run(message));
    }

    pub fn pair_status(&self, pair: &str, stage: PairStage, message: impl Into<String>) {
        self.report(ProgressUpdate::pair(pair, stage, message));
    }
}
