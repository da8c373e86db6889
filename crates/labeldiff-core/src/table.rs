//! Comparison sheets as produced by the label comparison step.
//!
//! A [`Workbook`] holds one [`ComparisonSheet`] per drawing pair plus an
//! optional `Summary` sheet that never takes part in per-pair processing.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classify::{classify_records, DiffClassification};
use crate::error::ClassificationError;

/// Name of the non-data sheet excluded from per-pair processing.
pub const SUMMARY_SHEET: &str = "Summary";

/// Column headings written for a comparison sheet when none were read.
pub const DEFAULT_HEADER: [&str; 5] = ["Label", "Count A", "Count B", "Result", "Difference"];

/// One tabular comparison sheet: a header row plus raw data records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonSheet {
    pub name: String,
    pub header: Vec<String>,
    pub records: Vec<Vec<String>>,
}

impl ComparisonSheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            header: DEFAULT_HEADER.iter().map(|s| s.to_string()).collect(),
            records: Vec::new(),
        }
    }

    /// Append a raw record.
    pub fn with_record<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.records.push(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Read a CSV sheet. The sheet is named after the file stem; the first
    /// row is the header. Records may have any number of fields so short rows
    /// reach the classifier and are skipped there.
    pub fn read_csv(path: &Path) -> Result<Self, ClassificationError> {
        let csv_err = |source| ClassificationError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(csv_err)?;

        let header = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(|s| s.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            records.push(record.iter().map(str::to_string).collect());
        }

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            name,
            header,
            records,
        })
    }

    /// Write the sheet as CSV (header first).
    pub fn write_csv(&self, path: &Path) -> Result<(), ClassificationError> {
        let csv_err = |source| ClassificationError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(csv_err)?;
        writer.write_record(&self.header).map_err(csv_err)?;
        for record in &self.records {
            writer.write_record(record).map_err(csv_err)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Classify the sheet's records.
    pub fn classify(&self) -> Result<DiffClassification, ClassificationError> {
        classify_records(&self.records)
    }
}

/// An ordered collection of comparison sheets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workbook {
    pub sheets: Vec<ComparisonSheet>,
}

impl Workbook {
    pub fn new(sheets: Vec<ComparisonSheet>) -> Self {
        Self { sheets }
    }

    /// Look up a data sheet by name. The summary sheet is never returned.
    pub fn sheet(&self, name: &str) -> Option<&ComparisonSheet> {
        self.data_sheets().find(|s| s.name == name)
    }

    /// All sheets except the summary sheet, in order.
    pub fn data_sheets(&self) -> impl Iterator<Item = &ComparisonSheet> {
        self.sheets.iter().filter(|s| s.name != SUMMARY_SHEET)
    }

    /// Read every `*.csv` file in `dir` as a sheet, ordered by file name.
    pub fn read_csv_dir(dir: &Path) -> Result<Self, ClassificationError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_csv = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
            if path.is_file() && is_csv {
                paths.push(path);
            }
        }
        paths.sort();

        let sheets = paths
            .iter()
            .map(|p| ComparisonSheet::read_csv(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { sheets })
    }
}
