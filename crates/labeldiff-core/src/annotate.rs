//! Drawing annotation engine.
//!
//! Walks a [`DrawingDocument`] in a fixed order (layer table, user block
//! definitions, model space, paper layouts) and rewrites every entity so the
//! palette index is authoritative: true-colour and colour-book overrides are
//! cleared, geometry gets the configured colour and line weight, text gets the
//! colour chosen by the [`ColorResolver`] and is raised to the minimum height.
//!
//! Failures on a single entity are logged and counted; they never stop the
//! walk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::drawing::{DrawingDocument, DrawingStore, Entity, EntityKind, TextKind};
use crate::error::{AnnotateError, ConfigError, DocumentError, EntityError};
use crate::rules::{ColorResolver, ColorRuleTable};
use crate::text::clean_rich_text;

/// Largest DXF line weight, in mm.
pub const MAX_LINE_WIDTH_MM: f64 = 2.11;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Settings for one annotation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationConfig {
    /// Line width applied to geometry, in mm.
    pub line_width_mm: f64,
    /// Palette index for geometry, layers and unmatched text.
    pub line_color: i16,
    /// Text smaller than this is raised to it, in mm.
    pub min_font_size_mm: f64,
    /// Checked first.
    pub char_color_rules: ColorRuleTable,
    /// Checked when no char colour rule matched.
    pub text_color_rules: ColorRuleTable,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            line_width_mm: 0.25,
            line_color: 7,
            min_font_size_mm: 2.5,
            char_color_rules: ColorRuleTable::new(),
            text_color_rules: ColorRuleTable::new(),
        }
    }
}

impl AnnotationConfig {
    pub fn with_char_rules(mut self, rules: ColorRuleTable) -> Self {
        self.char_color_rules = rules;
        self
    }

    pub fn with_text_rules(mut self, rules: ColorRuleTable) -> Self {
        self.text_color_rules = rules;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.line_width_mm.is_finite()
            || !(0.0..=MAX_LINE_WIDTH_MM).contains(&self.line_width_mm)
        {
            return Err(ConfigError::LineWidth(self.line_width_mm));
        }
        if !(0..=7).contains(&self.line_color) {
            return Err(ConfigError::LineColor(self.line_color));
        }
        if !self.min_font_size_mm.is_finite() || self.min_font_size_mm <= 0.0 {
            return Err(ConfigError::MinFontSize(self.min_font_size_mm));
        }
        Ok(())
    }

    /// Line weight in 0.01 mm units.
    pub fn lineweight(&self) -> i16 {
        (self.line_width_mm * 100.0).round() as i16
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// What one annotation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationReport {
    pub layers_reset: usize,
    pub entities_processed: usize,
    pub entities_failed: usize,
    /// Text entities whose colour came from a rule.
    pub text_matched: usize,
    pub heights_raised: usize,
    /// Processed entities per DXF type.
    pub by_type: BTreeMap<String, usize>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct Annotator<'a> {
    config: &'a AnnotationConfig,
    resolver: ColorResolver,
    lineweight: i16,
    report: AnnotationReport,
}

#[derive(Default)]
struct EntityChange {
    rule_matched: bool,
    height_raised: bool,
}

/// Annotate `doc` in place.
pub fn annotate(doc: &mut DrawingDocument, config: &AnnotationConfig) -> AnnotationReport {
    let mut annotator = Annotator {
        config,
        resolver: ColorResolver::new(
            &config.char_color_rules,
            &config.text_color_rules,
            config.line_color,
        ),
        lineweight: config.lineweight(),
        report: AnnotationReport::default(),
    };

    for layer in &mut doc.layers {
        debug!(layer = %layer.name, from = layer.color, to = config.line_color, "layer colour reset");
        layer.color = config.line_color;
        layer.true_color = None;
        annotator.report.layers_reset += 1;
    }

    for block in doc.blocks.iter_mut().filter(|b| !b.is_system()) {
        debug!(block = %block.name, entities = block.entities.len(), "annotating block");
        annotator.visit_all(&mut block.entities);
    }

    annotator.visit_all(&mut doc.model_space);

    for layout in &mut doc.paper_layouts {
        debug!(layout = %layout.name, entities = layout.entities.len(), "annotating paper layout");
        annotator.visit_all(&mut layout.entities);
    }

    let report = annotator.report;
    info!(
        layers = report.layers_reset,
        entities = report.entities_processed,
        failed = report.entities_failed,
        text_matched = report.text_matched,
        heights_raised = report.heights_raised,
        "annotation finished"
    );
    report
}

impl Annotator<'_> {
    fn visit_all(&mut self, entities: &mut [Entity]) {
        for entity in entities {
            match self.visit(entity) {
                Ok(change) => {
                    self.report.entities_processed += 1;
                    *self.report.by_type.entry(entity.dxf_type.clone()).or_insert(0) += 1;
                    if change.rule_matched {
                        self.report.text_matched += 1;
                    }
                    if change.height_raised {
                        self.report.heights_raised += 1;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "entity skipped");
                    self.report.entities_failed += 1;
                }
            }
        }
    }

    fn visit(&self, entity: &mut Entity) -> Result<EntityChange, EntityError> {
        entity.true_color = None;
        entity.color_book_name = None;

        match entity.kind {
            EntityKind::Text(kind) => self.visit_text(entity, kind),
            EntityKind::Dimension => {
                self.apply_line_style(entity);
                let height_raised = match entity.dim_text_height {
                    Some(height) => {
                        let raised = self.raise_height(entity, height)?;
                        if let Some(h) = raised {
                            entity.dim_text_height = Some(h);
                        }
                        raised.is_some()
                    }
                    None => false,
                };
                Ok(EntityChange {
                    rule_matched: false,
                    height_raised,
                })
            }
            EntityKind::Linear | EntityKind::Reference | EntityKind::Hatch | EntityKind::Other => {
                self.apply_line_style(entity);
                Ok(EntityChange::default())
            }
        }
    }

    fn visit_text(&self, entity: &mut Entity, kind: TextKind) -> Result<EntityChange, EntityError> {
        let text = match (kind, entity.text_content.as_deref()) {
            (TextKind::MText, Some(raw)) => clean_rich_text(raw),
            (_, Some(raw)) => raw.to_string(),
            (_, None) => String::new(),
        };

        let matched = self.resolver.lookup(&text);
        let color = matched.unwrap_or(self.config.line_color);
        debug!(dxf_type = %entity.dxf_type, handle = entity.handle_or_unknown(), text = %text, color, "text colour resolved");
        entity.color_index = Some(color);

        let mut height_raised = false;
        if let Some(height) = entity.text_height {
            if let Some(h) = self.raise_height(entity, height)? {
                entity.text_height = Some(h);
                height_raised = true;
            }
        }

        Ok(EntityChange {
            rule_matched: matched.is_some(),
            height_raised,
        })
    }

    fn apply_line_style(&self, entity: &mut Entity) {
        entity.color_index = Some(self.config.line_color);
        entity.lineweight = Some(self.lineweight);
    }

    /// New height when `height` is below the minimum. Larger values are kept.
    fn raise_height(&self, entity: &Entity, height: f64) -> Result<Option<f64>, EntityError> {
        if !height.is_finite() || height < 0.0 {
            return Err(EntityError::InvalidHeight {
                dxf_type: entity.dxf_type.clone(),
                handle: entity.handle_or_unknown().to_string(),
                height,
            });
        }
        Ok((height < self.config.min_font_size_mm).then_some(self.config.min_font_size_mm))
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Open `input`, annotate it and save the result to `output`.
pub fn annotate_file(
    store: &dyn DrawingStore,
    input: &Path,
    output: &Path,
    config: &AnnotationConfig,
) -> Result<AnnotationReport, AnnotateError> {
    annotate_file_cancellable(store, input, output, config, &AtomicBool::new(false))
}

/// [`annotate_file`] that gives up before saving once `cancel` is set.
///
/// A save that has already started when `cancel` is raised still completes.
pub fn annotate_file_cancellable(
    store: &dyn DrawingStore,
    input: &Path,
    output: &Path,
    config: &AnnotationConfig,
    cancel: &AtomicBool,
) -> Result<AnnotationReport, AnnotateError> {
    config.validate()?;
    let mut doc = store.open(input)?;
    let report = annotate(&mut doc, config);
    if cancel.load(Ordering::Acquire) {
        warn!(input = %input.display(), output = %output.display(), "annotation cancelled, not saving");
        return Err(AnnotateError::Cancelled {
            output: output.to_path_buf(),
        });
    }
    store.save(&doc, output)?;
    info!(input = %input.display(), output = %output.display(), "drawing annotated");
    Ok(report)
}

/// Result for one file of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub input: PathBuf,
    pub output: PathBuf,
    pub elapsed_ms: u64,
    pub report: Option<AnnotationReport>,
    pub error: Option<String>,
}

impl FileOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Annotate every `.dxf` file under `input_dir`.
///
/// Outputs go to `output_dir` under the input file name, or overwrite the
/// input when no output directory is given. A failing file is recorded and
/// the batch continues.
pub fn annotate_directory(
    store: &dyn DrawingStore,
    input_dir: &Path,
    output_dir: Option<&Path>,
    config: &AnnotationConfig,
    recursive: bool,
) -> Result<Vec<FileOutcome>, AnnotateError> {
    config.validate()?;
    let files = find_drawings(input_dir, recursive).map_err(|source| DocumentError::Io {
        path: input_dir.to_path_buf(),
        source,
    })?;
    if files.is_empty() {
        warn!(dir = %input_dir.display(), "no drawings found");
    }

    let total = files.len();
    let mut outcomes = Vec::with_capacity(total);
    for (idx, input) in files.into_iter().enumerate() {
        let output = match (output_dir, input.file_name()) {
            (Some(dir), Some(name)) => dir.join(name),
            _ => input.clone(),
        };
        debug!(file = %input.display(), n = idx + 1, total, "annotating");

        let started = Instant::now();
        let result = annotate_file(store, &input, &output, config);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(report) => FileOutcome {
                input,
                output,
                elapsed_ms,
                report: Some(report),
                error: None,
            },
            Err(err) => {
                warn!(file = %input.display(), error = %err, "drawing failed");
                FileOutcome {
                    input,
                    output,
                    elapsed_ms,
                    report: None,
                    error: Some(err.to_string()),
                }
            }
        };
        outcomes.push(outcome);
    }

    let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
    info!(total, succeeded = total - failed, failed, "batch finished");
    Ok(outcomes)
}

fn find_drawings(dir: &Path, recursive: bool) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                if recursive {
                    pending.push(path);
                }
            } else if path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("dxf"))
                .unwrap_or(false)
            {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}
