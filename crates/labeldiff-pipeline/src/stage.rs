//! Per-pair state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a pair is in the pipeline.
///
/// ```text
/// Registered -> Comparing -> Classified -> AnnotatingA -> AnnotatingB -> Completed
///       \___________\____________\______________\_____________\-> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStage {
    Registered,
    Comparing,
    Classified,
    AnnotatingA,
    AnnotatingB,
    Completed,
    Failed,
}

impl PairStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairStage::Registered => "registered",
            PairStage::Comparing => "comparing",
            PairStage::Classified => "classified",
            PairStage::AnnotatingA => "annotating_a",
            PairStage::AnnotatingB => "annotating_b",
            PairStage::Completed => "completed",
            PairStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PairStage::Completed | PairStage::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// Any non-terminal stage may fail. `AnnotatingA -> AnnotatingB` is
    /// legal regardless of how revision A ended.
    pub fn can_transition_to(&self, next: PairStage) -> bool {
        use PairStage::*;
        match (self, next) {
            (s, Failed) => !s.is_terminal(),
            (Registered, Comparing)
            | (Comparing, Classified)
            | (Classified, AnnotatingA)
            | (AnnotatingA, AnnotatingB)
            | (AnnotatingB, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PairStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one pair's stage and rejects illegal transitions.
#[derive(Debug, Clone)]
pub struct StageTracker {
    pair: String,
    current: PairStage,
}

impl StageTracker {
    pub fn new(pair: impl Into<String>) -> Self {
        Self {
            pair: pair.into(),
            current: PairStage::Registered,
        }
    }

    pub fn current(&self) -> PairStage {
        self.current
    }

    /// Move to `next`, emitting a `pair.stage` event. Illegal transitions
    /// are logged and ignored.
    pub fn advance(&mut self, next: PairStage) -> bool {
        if !self.current.can_transition_to(next) {
            tracing::warn!(pair = %self.pair, from = %self.current, to = %next, "illegal stage transition");
            return false;
        }
        self.current = next;
        labeldiff_core::obs::emit_pair_stage(&self.pair, next.as_str());
        true
    }
}
