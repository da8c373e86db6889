//! Label diff classification and drawing annotation.
//!
//! The pieces, bottom-up:
//! - [`text`]: whitespace normalisation and rich-text cleanup.
//! - [`classify`] and [`table`]: comparison sheets to the four label sets.
//! - [`rules`]: colour rule tables and the priority resolver.
//! - [`drawing`]: the document model and the DXF store.
//! - [`annotate`]: the engine that recolours a drawing.

pub mod annotate;
pub mod classify;
pub mod drawing;
pub mod error;
pub mod obs;
pub mod rules;
pub mod table;
pub mod telemetry;
pub mod text;

pub use annotate::{
    annotate, annotate_directory, annotate_file, annotate_file_cancellable, AnnotationConfig,
    AnnotationReport, FileOutcome,
};
pub use classify::{
    classify, classify_records, DiffClassification, LabelComparisonRow, LabelLists, Outcome,
};
pub use drawing::{DrawingDocument, DrawingStore, DxfStore, Entity, EntityKind};
pub use error::{
    AnnotateError, ClassificationError, ConfigError, DocumentError, EntityError, RuleError,
};
pub use rules::{
    resolve_text_color, ColorResolver, ColorRuleTable, PaletteColor, RuleSource, RuleSpec,
};
pub use table::{ComparisonSheet, Workbook, SUMMARY_SHEET};
pub use text::{clean_rich_text, normalize};

/// Crate version, recorded in run manifests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
