//! Pipeline settings and the per-revision annotation rule sets.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use labeldiff_core::classify::LabelLists;
use labeldiff_core::rules::{RuleSource, RuleSpec};
use labeldiff_core::{AnnotationConfig, ColorRuleTable, PaletteColor, RuleError};

use crate::error::PipelineError;
use crate::job::Revision;

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_PAIRS: usize = 5;
/// Upper bound for `max_pairs`.
pub const MAX_PAIRS_LIMIT: usize = 10;

pub const TIMEOUT_ENV: &str = "LABELDIFF_TIMEOUT_SECS";
pub const MAX_PAIRS_ENV: &str = "LABELDIFF_MAX_PAIRS";

/// Settings for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Limit for the comparison step and for each annotation.
    pub timeout: Duration,
    pub max_pairs: usize,
    /// Pairs processed at the same time. 1 runs pairs sequentially.
    pub max_concurrent_pairs: usize,
    pub line_width_mm: f64,
    pub line_color: i16,
    pub min_font_size_mm: f64,
    /// Char colour rule applied to both revisions.
    pub marker_color: PaletteColor,
    pub marker_text: String,
    pub deleted_color: PaletteColor,
    pub modified_color: PaletteColor,
    pub added_color: PaletteColor,
    /// Appended to the input file stem for annotated outputs.
    pub processed_suffix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let annotation = AnnotationConfig::default();
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_pairs: DEFAULT_MAX_PAIRS,
            max_concurrent_pairs: 1,
            line_width_mm: annotation.line_width_mm,
            line_color: annotation.line_color,
            min_font_size_mm: annotation.min_font_size_mm,
            marker_color: PaletteColor::Red,
            marker_text: "\u{2606}".to_string(),
            deleted_color: PaletteColor::Magenta,
            modified_color: PaletteColor::Yellow,
            added_color: PaletteColor::Cyan,
            processed_suffix: "_processed".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `LABELDIFF_TIMEOUT_SECS` and `LABELDIFF_MAX_PAIRS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    /// Unset or unparsable values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(secs) = lookup(TIMEOUT_ENV).and_then(|v| v.trim().parse::<u64>().ok()) {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(max) = lookup(MAX_PAIRS_ENV).and_then(|v| v.trim().parse::<usize>().ok()) {
            config.max_pairs = max;
        }
        config
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, max_concurrent_pairs: usize) -> Self {
        self.max_concurrent_pairs = max_concurrent_pairs;
        self
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(1..=MAX_PAIRS_LIMIT).contains(&self.max_pairs) {
            return Err(PipelineError::Config(format!(
                "max_pairs must be between 1 and {MAX_PAIRS_LIMIT}, got {}",
                self.max_pairs
            )));
        }
        if self.timeout.is_zero() {
            return Err(PipelineError::Config("timeout must be positive".to_string()));
        }
        if self.max_concurrent_pairs == 0 {
            return Err(PipelineError::Config(
                "max_concurrent_pairs must be at least 1".to_string(),
            ));
        }
        self.base_annotation()
            .validate()
            .map_err(|e| PipelineError::Config(e.to_string()))
    }

    fn base_annotation(&self) -> AnnotationConfig {
        AnnotationConfig {
            line_width_mm: self.line_width_mm,
            line_color: self.line_color,
            min_font_size_mm: self.min_font_size_mm,
            ..AnnotationConfig::default()
        }
    }

    /// Rule specs for one revision: revision A highlights deleted and
    /// modified-in-A labels, revision B added and modified-in-B labels.
    pub fn text_rule_specs(&self, revision: Revision, lists: &LabelLists) -> Vec<RuleSpec> {
        let (primary_color, primary, modified) = match revision {
            Revision::A => (self.deleted_color, &lists.deleted, &lists.modified_a),
            Revision::B => (self.added_color, &lists.added, &lists.modified_b),
        };
        vec![
            RuleSpec {
                color: primary_color.name().to_string(),
                source: RuleSource::File(primary.clone()),
            },
            RuleSpec {
                color: self.modified_color.name().to_string(),
                source: RuleSource::File(modified.clone()),
            },
        ]
    }

    /// Full annotation settings for one revision, reading the label files.
    pub fn annotation_config(
        &self,
        revision: Revision,
        lists: &LabelLists,
    ) -> Result<AnnotationConfig, RuleError> {
        let char_rules =
            ColorRuleTable::new().with(self.marker_color.name(), [self.marker_text.clone()]);
        let text_rules = ColorRuleTable::from_specs(&self.text_rule_specs(revision, lists))?;
        Ok(self
            .base_annotation()
            .with_char_rules(char_rules)
            .with_text_rules(text_rules))
    }
}
