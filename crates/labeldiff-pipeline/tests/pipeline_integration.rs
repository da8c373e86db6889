//! End-to-end runs over real DXF files and CSV comparison sheets.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use labeldiff_core::{
    ComparisonSheet, DocumentError, DrawingDocument, DrawingStore, DxfStore, Workbook,
};
use labeldiff_pipeline::{
    Comparison, ComparisonError, CsvDirectoryComparator, DrawingPair, FailureKind,
    LabelComparator, PairPipeline, PairStage, PipelineConfig, PipelineError, ProgressReporter,
    RunWorkspace,
};

fn tags(pairs: &[(i32, &str)]) -> String {
    pairs
        .iter()
        .map(|(code, value)| format!("{code:>3}\n{value}\n"))
        .collect()
}

/// Model space with a line and three text labels.
fn drawing(labels: &[&str]) -> String {
    let mut body = vec![
        (0, "SECTION"),
        (2, "ENTITIES"),
        (0, "LINE"),
        (5, "10"),
        (8, "0"),
        (62, "3"),
        (10, "0.0"),
        (20, "0.0"),
        (11, "5.0"),
        (21, "0.0"),
    ];
    let handles = ["20", "21", "22", "23"];
    for (label, handle) in labels.iter().zip(handles) {
        body.extend([
            (0, "TEXT"),
            (5, handle),
            (8, "0"),
            (62, "3"),
            (40, "1.0"),
            (1, *label),
        ]);
    }
    body.extend([(0, "ENDSEC"), (0, "EOF")]);
    tags(&body)
}

struct Fixture {
    _dir: tempfile::TempDir,
    inputs: PathBuf,
    sheets: PathBuf,
    work: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let inputs = dir.path().join("inputs");
        let sheets = dir.path().join("sheets");
        let work = dir.path().join("work");
        std::fs::create_dir_all(&inputs).unwrap();
        std::fs::create_dir_all(&sheets).unwrap();
        Self {
            _dir: dir,
            inputs,
            sheets,
            work,
        }
    }

    fn pair(&self, name: &str, a: &str, b: &str) -> DrawingPair {
        let dir = self.inputs.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let path_a = dir.join(format!("{name}_rev1.dxf"));
        let path_b = dir.join(format!("{name}_rev2.dxf"));
        std::fs::write(&path_a, a).unwrap();
        std::fs::write(&path_b, b).unwrap();
        DrawingPair::new(name, path_a, path_b)
    }

    fn sheet(&self, name: &str, records: &[[&str; 5]]) {
        let mut sheet = ComparisonSheet::new(name);
        for record in records {
            sheet = sheet.with_record(record.iter().copied());
        }
        sheet.write_csv(&self.sheets.join(format!("{name}.csv"))).unwrap();
    }

    fn standard_sheet(&self, name: &str) {
        self.sheet(
            name,
            &[
                ["R1", "1", "0", "A Only", "-1"],
                ["R9", "0", "1", "B Only", "1"],
                ["C2", "3", "2", "Different", "-1"],
            ],
        );
    }

    fn pipeline(&self, config: PipelineConfig) -> PairPipeline {
        PairPipeline::new(
            config,
            Arc::new(CsvDirectoryComparator::new(&self.sheets)),
            Arc::new(DxfStore::new()),
        )
    }

    fn workspace(&self) -> RunWorkspace {
        RunWorkspace::at(&self.work).expect("workspace")
    }
}

fn text_color(doc: &DrawingDocument, label: &str) -> Option<i16> {
    doc.model_space
        .iter()
        .find(|e| e.text_content.as_deref() == Some(label))
        .and_then(|e| e.color_index)
}

#[tokio::test]
async fn test_failing_pair_does_not_stop_siblings() {
    let fx = Fixture::new();
    let pairs = vec![
        fx.pair("P1", &drawing(&["R1", "C2", "X"]), &drawing(&["R9", "C2", "X"])),
        fx.pair("P2", "this is\nnot a\ndrawing\n", &drawing(&["R9"])),
        fx.pair("P3", &drawing(&["R1"]), &drawing(&["R9"])),
    ];
    for name in ["P1", "P2", "P3"] {
        fx.standard_sheet(name);
    }

    let mut ws = fx.workspace();
    let report = fx
        .pipeline(PipelineConfig::default())
        .run(pairs, &mut ws)
        .await
        .expect("run");

    assert_eq!(report.pairs.len(), 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);

    let names: Vec<_> = report.pairs.iter().map(|p| p.pair_name.as_str()).collect();
    assert_eq!(names, vec!["P1", "P2", "P3"]);

    let p2 = report.pair("P2").unwrap();
    assert!(!p2.success);
    let failure = p2.error.as_ref().unwrap();
    assert_eq!(failure.stage, PairStage::AnnotatingA);
    assert_eq!(failure.kind, FailureKind::Document);
    // Revision B is independent and still annotated.
    assert!(p2.outputs.annotated_b.as_ref().unwrap().is_file());
    assert!(p2.outputs.annotated_a.is_none());

    assert!(report.pair("P1").unwrap().success);
    assert!(report.pair("P3").unwrap().success);
    assert!(fx.work.join("manifest.json").is_file());
}

#[tokio::test]
async fn test_pair_artifacts_and_colors() {
    let fx = Fixture::new();
    let pairs = vec![fx.pair("P1", &drawing(&["R1", "C2", "X"]), &drawing(&["R9", "C2", "\u{2606}"]))];
    fx.standard_sheet("P1");

    let mut ws = fx.workspace();
    let report = fx
        .pipeline(PipelineConfig::default())
        .run(pairs, &mut ws)
        .await
        .expect("run");
    let p1 = report.pair("P1").unwrap();
    assert!(p1.success, "{:?}", p1.error);

    let out = &p1.outputs;
    assert_eq!(out.output_dir, fx.work.join("P1"));
    assert_eq!(out.original_a_name, "P1_rev1.dxf");
    assert_eq!(out.original_b_name, "P1_rev2.dxf");
    assert!(out.sheet_csv.as_ref().unwrap().ends_with("P1.csv"));
    assert!(out.digest_a.is_some() && out.digest_b.is_some());

    let lists = out.label_lists.as_ref().unwrap();
    assert_eq!(std::fs::read_to_string(&lists.deleted).unwrap(), "R1\n");
    assert_eq!(std::fs::read_to_string(&lists.added).unwrap(), "R9\n");
    assert_eq!(std::fs::read_to_string(&lists.modified_a).unwrap(), "C2\n");
    assert_eq!(std::fs::read_to_string(&lists.modified_b).unwrap(), "");

    let annotated_a = out.annotated_a.as_ref().unwrap();
    assert_eq!(annotated_a, &fx.work.join("P1").join("P1_rev1_processed.dxf"));
    let store = DxfStore::new();
    let doc_a = store.open(annotated_a).unwrap();
    assert_eq!(text_color(&doc_a, "R1"), Some(6)); // deleted: magenta
    assert_eq!(text_color(&doc_a, "C2"), Some(2)); // modified: yellow
    assert_eq!(text_color(&doc_a, "X"), Some(7)); // unmatched: line colour
    assert_eq!(doc_a.model_space[0].color_index, Some(7));
    assert_eq!(doc_a.model_space[1].text_height, Some(2.5));

    let doc_b = store.open(out.annotated_b.as_ref().unwrap()).unwrap();
    assert_eq!(text_color(&doc_b, "R9"), Some(4)); // added: cyan
    assert_eq!(text_color(&doc_b, "C2"), Some(7)); // only modified in A
    assert_eq!(text_color(&doc_b, "\u{2606}"), Some(1)); // marker: red
}

#[tokio::test]
async fn test_missing_sheet_fails_only_that_pair() {
    let fx = Fixture::new();
    let pairs = vec![
        fx.pair("P1", &drawing(&["R1"]), &drawing(&["R9"])),
        fx.pair("P2", &drawing(&["R1"]), &drawing(&["R9"])),
    ];
    fx.standard_sheet("P1");
    fx.standard_sheet("Summary");

    let mut ws = fx.workspace();
    let report = fx
        .pipeline(PipelineConfig::default())
        .run(pairs, &mut ws)
        .await
        .expect("run");

    assert!(report.pair("P1").unwrap().success);
    let failure = report.pair("P2").unwrap().error.clone().unwrap();
    assert_eq!(failure.kind, FailureKind::MissingSheet);
    assert_eq!(failure.stage, PairStage::Comparing);
    assert_eq!(failure.stderr, None);
}

/// Returns the sheets it was built with and a fixed stderr text.
struct NoisyComparator {
    sheets: Vec<ComparisonSheet>,
    stderr: &'static str,
}

#[async_trait]
impl LabelComparator for NoisyComparator {
    async fn compare(
        &self,
        _pairs: &[DrawingPair],
        _workdir: &Path,
    ) -> Result<Comparison, ComparisonError> {
        Ok(Comparison {
            workbook: Workbook::new(self.sheets.clone()),
            stderr: Some(self.stderr.to_string()),
        })
    }
}

#[tokio::test]
async fn test_missing_sheet_carries_comparison_stderr() {
    let fx = Fixture::new();
    let pairs = vec![
        fx.pair("P1", &drawing(&["R1"]), &drawing(&["R9"])),
        fx.pair("P2", &drawing(&["R1"]), &drawing(&["R9"])),
    ];
    let comparator = NoisyComparator {
        sheets: vec![ComparisonSheet::new("P1").with_record(["R1", "1", "0", "A Only", "-1"])],
        stderr: "P2: revision B has no text entities",
    };
    let pipeline = PairPipeline::new(
        PipelineConfig::default(),
        Arc::new(comparator),
        Arc::new(DxfStore::new()),
    );

    let mut ws = fx.workspace();
    let report = pipeline.run(pairs, &mut ws).await.expect("run");

    assert!(report.pair("P1").unwrap().success);
    let failure = report.pair("P2").unwrap().error.clone().unwrap();
    assert_eq!(failure.kind, FailureKind::MissingSheet);
    assert_eq!(failure.stderr.as_deref(), Some("P2: revision B has no text entities"));
}

#[tokio::test]
async fn test_bad_delta_fails_classification() {
    let fx = Fixture::new();
    let pairs = vec![fx.pair("P1", &drawing(&["R1"]), &drawing(&["R9"]))];
    fx.sheet("P1", &[["R1", "1", "0", "A Only", "minus one"]]);

    let mut ws = fx.workspace();
    let report = fx
        .pipeline(PipelineConfig::default())
        .run(pairs, &mut ws)
        .await
        .expect("run");
    let failure = report.pairs[0].error.clone().unwrap();
    assert_eq!(failure.stage, PairStage::Classified);
    assert_eq!(failure.kind, FailureKind::Classification);
}

#[tokio::test]
async fn test_comparison_failure_is_fatal() {
    let fx = Fixture::new();
    let pairs = vec![fx.pair("P1", &drawing(&["R1"]), &drawing(&["R9"]))];
    let pipeline = PairPipeline::new(
        PipelineConfig::default(),
        Arc::new(CsvDirectoryComparator::new(fx.sheets.join("missing"))),
        Arc::new(DxfStore::new()),
    );

    let mut ws = fx.workspace();
    let err = pipeline.run(pairs, &mut ws).await.unwrap_err();
    assert!(matches!(err, PipelineError::Comparison(ComparisonError::Sheets(_))));
    assert!(!fx.work.join("manifest.json").exists());
}

struct SlowComparator;

#[async_trait]
impl LabelComparator for SlowComparator {
    async fn compare(
        &self,
        _pairs: &[DrawingPair],
        _workdir: &Path,
    ) -> Result<Comparison, ComparisonError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Workbook::default().into())
    }
}

#[tokio::test]
async fn test_comparison_timeout_is_fatal() {
    let fx = Fixture::new();
    let pairs = vec![fx.pair("P1", &drawing(&["R1"]), &drawing(&["R9"]))];
    let pipeline = PairPipeline::new(
        PipelineConfig::default().with_timeout(Duration::from_millis(50)),
        Arc::new(SlowComparator),
        Arc::new(DxfStore::new()),
    );

    let mut ws = fx.workspace();
    let err = pipeline.run(pairs, &mut ws).await.unwrap_err();
    assert!(matches!(err, PipelineError::Comparison(ComparisonError::Timeout(_))));
}

#[tokio::test]
async fn test_registration_errors() {
    let fx = Fixture::new();
    let p1 = fx.pair("P1", &drawing(&["R1"]), &drawing(&["R9"]));
    let pipeline = fx.pipeline(PipelineConfig {
        max_pairs: 1,
        ..PipelineConfig::default()
    });
    let mut ws = fx.workspace();

    let err = pipeline
        .run(vec![p1.clone(), DrawingPair::new("P2", &p1.revision_a, &p1.revision_b)], &mut ws)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Registration(_)));

    let missing = DrawingPair::new("P1", &p1.revision_a, fx.inputs.join("nope.dxf"));
    let err = pipeline.run(vec![missing], &mut ws).await.unwrap_err();
    assert!(err.to_string().contains("revision B not found"));
}

/// Fails every save into a directory named `P2`.
struct FlakyStore(DxfStore);

impl DrawingStore for FlakyStore {
    fn open(&self, path: &Path) -> Result<DrawingDocument, DocumentError> {
        self.0.open(path)
    }

    fn save(&self, document: &DrawingDocument, path: &Path) -> Result<(), DocumentError> {
        if path.parent().is_some_and(|p| p.ends_with("P2")) {
            return Err(DocumentError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.0.save(document, path)
    }
}

#[tokio::test]
async fn test_concurrent_pairs_keep_order_and_isolation() {
    let fx = Fixture::new();
    let pairs: Vec<_> = ["P1", "P2", "P3"]
        .iter()
        .map(|name| {
            fx.standard_sheet(name);
            fx.pair(name, &drawing(&["R1"]), &drawing(&["R9"]))
        })
        .collect();

    let pipeline = PairPipeline::new(
        PipelineConfig::default().with_concurrency(3),
        Arc::new(CsvDirectoryComparator::new(&fx.sheets)),
        Arc::new(FlakyStore(DxfStore::new())),
    );
    let mut ws = fx.workspace();
    let report = pipeline.run(pairs, &mut ws).await.expect("run");

    let outcome: Vec<_> = report
        .pairs
        .iter()
        .map(|p| (p.pair_name.as_str(), p.success))
        .collect();
    assert_eq!(outcome, vec![("P1", true), ("P2", false), ("P3", true)]);

    let failure = report.pair("P2").unwrap().error.clone().unwrap();
    assert_eq!(failure.kind, FailureKind::Io);
    assert!(failure.message.contains("revision A"));
    assert!(failure.message.contains("revision B"));
}

/// Opens drawings slowly enough to miss any short deadline.
struct SlowStore(DxfStore);

impl DrawingStore for SlowStore {
    fn open(&self, path: &Path) -> Result<DrawingDocument, DocumentError> {
        std::thread::sleep(Duration::from_millis(300));
        self.0.open(path)
    }

    fn save(&self, document: &DrawingDocument, path: &Path) -> Result<(), DocumentError> {
        self.0.save(document, path)
    }
}

#[tokio::test]
async fn test_annotation_timeout_leaves_no_output() {
    let fx = Fixture::new();
    let pairs = vec![fx.pair("P1", &drawing(&["R1"]), &drawing(&["R9"]))];
    fx.standard_sheet("P1");

    let pipeline = PairPipeline::new(
        PipelineConfig::default().with_timeout(Duration::from_millis(100)),
        Arc::new(CsvDirectoryComparator::new(&fx.sheets)),
        Arc::new(SlowStore(DxfStore::new())),
    );
    let mut ws = fx.workspace();
    let report = pipeline.run(pairs, &mut ws).await.expect("run");

    let result = report.pair("P1").unwrap();
    let failure = result.error.clone().unwrap();
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert_eq!(failure.stage, PairStage::AnnotatingA);

    // Let the detached annotations finish opening and reach the save check.
    tokio::time::sleep(Duration::from_millis(800)).await;
    let outputs: Vec<_> = std::fs::read_dir(&result.outputs.output_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".dxf"))
        .collect();
    assert!(outputs.is_empty(), "unexpected outputs: {outputs:?}");
}

#[tokio::test]
async fn test_progress_updates() {
    let fx = Fixture::new();
    let pairs = vec![fx.pair("P1", &drawing(&["R1"]), &drawing(&["R9"]))];
    fx.standard_sheet("P1");

    let (reporter, mut rx) = ProgressReporter::channel();
    let pipeline = fx.pipeline(PipelineConfig::default()).with_progress(reporter);
    let mut ws = fx.workspace();
    pipeline.run(pairs, &mut ws).await.expect("run");
    drop(pipeline);

    let mut messages = Vec::new();
    while let Some(update) = rx.recv().await {
        messages.push(update.message);
    }
    assert!(messages.first().unwrap().starts_with("Comparing labels"));
    assert!(messages.iter().any(|m| m == "Pair P1: classifying labels"));
    assert!(messages.iter().any(|m| m.starts_with("Pair P1: annotating revision B")));
    assert_eq!(messages.last().unwrap(), "All pairs processed: 1 succeeded, 0 failed");
}
