//! Label diff classification.
//!
//! A comparison table row says how often a label occurs in revision A and B
//! and what the comparison concluded. [`classify`] partitions the rows into
//! four label sets in a single pass; relative order within each set follows
//! the input and duplicates are kept.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ClassificationError;

/// Minimum number of fields a comparison record needs to be classified.
pub const MIN_ROW_FIELDS: usize = 5;

/// Comparison outcome for one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// Present only in revision A.
    AOnly,
    /// Present only in revision B.
    BOnly,
    /// Present in both with differing counts.
    Different,
}

impl Outcome {
    /// Parse the outcome text used by the comparison table.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "A Only" => Some(Outcome::AOnly),
            "B Only" => Some(Outcome::BOnly),
            "Different" => Some(Outcome::Different),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::AOnly => "A Only",
            Outcome::BOnly => "B Only",
            Outcome::Different => "Different",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a label comparison table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelComparisonRow {
    pub label: String,
    pub count_a: u32,
    pub count_b: u32,
    pub outcome: Outcome,
    pub delta_count: i64,
}

impl LabelComparisonRow {
    pub fn new(
        label: impl Into<String>,
        count_a: u32,
        count_b: u32,
        outcome: Outcome,
        delta_count: i64,
    ) -> Self {
        Self {
            label: label.into(),
            count_a,
            count_b,
            outcome,
            delta_count,
        }
    }
}

/// The four disjoint label sets produced from one comparison table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffClassification {
    /// Outcome `A Only`.
    pub deleted: Vec<String>,
    /// Outcome `B Only`.
    pub added: Vec<String>,
    /// Outcome `Different` with a negative delta count.
    pub modified_a: Vec<String>,
    /// Outcome `Different` with a zero or positive delta count.
    pub modified_b: Vec<String>,
}

impl DiffClassification {
    /// Total number of classified labels across all four sets.
    pub fn len(&self) -> usize {
        self.deleted.len() + self.added.len() + self.modified_a.len() + self.modified_b.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, row: &LabelComparisonRow) {
        let set = match row.outcome {
            Outcome::AOnly => &mut self.deleted,
            Outcome::BOnly => &mut self.added,
            Outcome::Different if row.delta_count < 0 => &mut self.modified_a,
            Outcome::Different => &mut self.modified_b,
        };
        set.push(row.label.clone());
    }
}

/// Partition typed rows into the four label sets.
pub fn classify(rows: &[LabelComparisonRow]) -> DiffClassification {
    let mut classification = DiffClassification::default();
    for row in rows {
        classification.push(row);
    }
    classification
}

/// Parse one raw record.
///
/// Returns `Ok(None)` for records that are skipped: too few fields (warned)
/// or an outcome outside the three known values. `row_number` is only used
/// for diagnostics.
pub fn parse_record<S: AsRef<str>>(
    record: &[S],
    row_number: usize,
) -> Result<Option<LabelComparisonRow>, ClassificationError> {
    if record.len() < MIN_ROW_FIELDS {
        warn!(
            row = row_number,
            fields = record.len(),
            "comparison row has too few fields, skipping"
        );
        return Ok(None);
    }

    let label = record[0].as_ref().trim().to_string();
    let count_a = parse_count(record[1].as_ref(), row_number, "count A");
    let count_b = parse_count(record[2].as_ref(), row_number, "count B");
    let delta_count = parse_field::<i64>(record[4].as_ref(), row_number, "delta count")?;

    let Some(outcome) = Outcome::parse(record[3].as_ref()) else {
        debug!(row = row_number, outcome = %record[3].as_ref().trim(), "unrecognised outcome, skipping");
        return Ok(None);
    };

    Ok(Some(LabelComparisonRow {
        label,
        count_a,
        count_b,
        outcome,
        delta_count,
    }))
}

/// Classify raw comparison records (header already removed).
///
/// Data rows are numbered from 2, matching the line they occupy in a sheet
/// with a header row.
pub fn classify_records<R: AsRef<[String]>>(
    records: &[R],
) -> Result<DiffClassification, ClassificationError> {
    let mut classification = DiffClassification::default();
    for (idx, record) in records.iter().enumerate() {
        if let Some(row) = parse_record(record.as_ref(), idx + 2)? {
            classification.push(&row);
        }
    }
    Ok(classification)
}

/// Counts are informational only; an unreadable count is recorded as 0.
fn parse_count(value: &str, row: usize, field: &'static str) -> u32 {
    match value.trim().parse::<u32>() {
        Ok(count) => count,
        Err(_) => {
            debug!(row, field, value, "unreadable count, using 0");
            0
        }
    }
}

fn parse_field<T: std::str::FromStr>(
    value: &str,
    row: usize,
    field: &'static str,
) -> Result<T, ClassificationError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ClassificationError::InvalidNumber {
            row,
            field,
            value: value.to_string(),
        })
}

/// Paths of the four label list files written for one comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelLists {
    pub deleted: PathBuf,
    pub added: PathBuf,
    pub modified_a: PathBuf,
    pub modified_b: PathBuf,
}

impl LabelLists {
    /// Paths `<dir>/<base>_deleted.txt`, `_added.txt`, `_modified_a.txt`, `_modified_b.txt`.
    pub fn paths(dir: &Path, base_name: &str) -> Self {
        Self {
            deleted: dir.join(format!("{base_name}_deleted.txt")),
            added: dir.join(format!("{base_name}_added.txt")),
            modified_a: dir.join(format!("{base_name}_modified_a.txt")),
            modified_b: dir.join(format!("{base_name}_modified_b.txt")),
        }
    }

    /// Write all four files (UTF-8, one label per line), creating `dir` if needed.
    /// Every file is written, including empty ones.
    pub fn write(
        dir: &Path,
        base_name: &str,
        classification: &DiffClassification,
    ) -> std::io::Result<Self> {
        fs::create_dir_all(dir)?;
        let lists = Self::paths(dir, base_name);
        write_label_file(&lists.deleted, &classification.deleted)?;
        write_label_file(&lists.added, &classification.added)?;
        write_label_file(&lists.modified_a, &classification.modified_a)?;
        write_label_file(&lists.modified_b, &classification.modified_b)?;
        info!(
            dir = %dir.display(),
            deleted = classification.deleted.len(),
            added = classification.added.len(),
            modified_a = classification.modified_a.len(),
            modified_b = classification.modified_b.len(),
            "label lists written"
        );
        Ok(lists)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        [&self.deleted, &self.added, &self.modified_a, &self.modified_b].into_iter()
    }
}

fn write_label_file(path: &Path, labels: &[String]) -> std::io::Result<()> {
    let mut content = String::new();
    for label in labels {
        content.push_str(label);
        content.push('\n');
    }
    fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_a_only_row() {
        let rows = vec![LabelComparisonRow::new("R1", 1, 0, Outcome::AOnly, -1)];
        let c = classify(&rows);
        assert_eq!(c.deleted, vec!["R1".to_string()]);
        assert!(c.added.is_empty());
        assert!(c.modified_a.is_empty());
        assert!(c.modified_b.is_empty());
    }

    #[test]
    fn test_different_split_by_delta_sign() {
        let rows = vec![
            LabelComparisonRow::new("neg", 3, 1, Outcome::Different, -2),
            LabelComparisonRow::new("zero", 2, 2, Outcome::Different, 0),
            LabelComparisonRow::new("pos", 1, 4, Outcome::Different, 3),
        ];
        let c = classify(&rows);
        assert_eq!(c.modified_a, vec!["neg".to_string()]);
        assert_eq!(c.modified_b, vec!["zero".to_string(), "pos".to_string()]);
    }

    #[test]
    fn test_duplicates_preserved_in_order() {
        let rows = vec![
            LabelComparisonRow::new("X", 0, 1, Outcome::BOnly, 1),
            LabelComparisonRow::new("Y", 0, 1, Outcome::BOnly, 1),
            LabelComparisonRow::new("X", 0, 1, Outcome::BOnly, 1),
        ];
        let c = classify(&rows);
        assert_eq!(c.added, vec!["X", "Y", "X"]);
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn test_short_records_skipped() {
        let records = vec![
            rec(&["R1", "1", "0", "A Only", "-1"]),
            rec(&["broken", "1"]),
            rec(&["R2", "0", "1", "B Only", "1"]),
        ];
        let c = classify_records(&records).expect("classify");
        assert_eq!(c.deleted, vec!["R1"]);
        assert_eq!(c.added, vec!["R2"]);
    }

    #[test]
    fn test_non_integer_delta_is_fatal() {
        let records = vec![rec(&["R1", "1", "0", "A Only", "minus one"])];
        let err = classify_records(&records).unwrap_err();
        match err {
            ClassificationError::InvalidNumber { row, field, .. } => {
                assert_eq!(row, 2);
                assert_eq!(field, "delta count");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unreadable_counts_do_not_fail() {
        let records = vec![
            rec(&["R1", "1.0", "", "A Only", "-1"]),
            rec(&["R9", "", "1", "B Only", "1"]),
        ];
        let c = classify_records(&records).expect("classify");
        assert_eq!(c.deleted, vec!["R1"]);
        assert_eq!(c.added, vec!["R9"]);

        let row = parse_record(["R1", "1.0", "", "A Only", "-1"].as_slice(), 2)
            .expect("parse")
            .expect("row");
        assert_eq!((row.count_a, row.count_b), (0, 0));
    }

    #[test]
    fn test_fields_are_trimmed() {
        let records = vec![rec(&[" C12 ", " 2 ", " 1 ", " Different ", " -1 "])];
        let c = classify_records(&records).expect("classify");
        assert_eq!(c.modified_a, vec!["C12"]);
    }

    #[test]
    fn test_unknown_outcome_skipped() {
        let records = vec![rec(&["R9", "1", "1", "Same", "0"])];
        let c = classify_records(&records).expect("classify");
        assert!(c.is_empty());
    }

    #[test]
    fn test_write_label_lists() {
        let dir = tempfile::tempdir().unwrap();
        let c = DiffClassification {
            deleted: vec!["R1".to_string(), "R2".to_string()],
            added: vec![],
            modified_a: vec!["C3".to_string()],
            modified_b: vec![],
        };
        let lists = LabelLists::write(dir.path(), "Pair1", &c).expect("write");
        assert!(lists.deleted.ends_with("Pair1_deleted.txt"));
        assert_eq!(fs::read_to_string(&lists.deleted).unwrap(), "R1\nR2\n");
        assert_eq!(fs::read_to_string(&lists.added).unwrap(), "");
        assert_eq!(fs::read_to_string(&lists.modified_a).unwrap(), "C3\n");
        assert!(lists.iter().all(|p| p.exists()));
    }
}
