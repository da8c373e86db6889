//! labeldiff - drawing label diff and annotation CLI
//!
//! ## Commands
//!
//! - `classify`: split a comparison sheet into the four label lists
//! - `annotate`: recolour one DXF file or a directory of them
//! - `run`: compare, classify and annotate a set of drawing pairs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use tracing::{error, info};

use labeldiff_core::telemetry::{default_level, init_tracing};
use labeldiff_core::{
    annotate_directory, annotate_file, AnnotationConfig, ColorRuleTable, ComparisonSheet,
    DxfStore, FileOutcome, LabelLists, PaletteColor, RuleSpec,
};
use labeldiff_pipeline::config::{MAX_PAIRS_ENV, TIMEOUT_ENV};
use labeldiff_pipeline::{
    render_summary_md, CommandComparator, CsvDirectoryComparator, DrawingPair, LabelComparator,
    PairPipeline, PipelineConfig, ProgressReporter, RunReport, RunWorkspace,
};

#[derive(Parser)]
#[command(name = "labeldiff")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Drawing label diff and annotation", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a comparison sheet (CSV) into deleted/added/modified label lists
    Classify {
        /// Comparison sheet: label, countA, countB, outcome, delta
        csv: PathBuf,

        /// Output directory (default: next to the CSV file)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Print the classification without writing files
        #[arg(long)]
        dry_run: bool,
    },

    /// Recolour a DXF file or every DXF file in a directory
    Annotate {
        /// Input DXF file or directory
        input: PathBuf,

        /// Output file or directory (default: overwrite the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Line width in millimetres
        #[arg(long = "line-width", visible_alias = "lw", default_value_t = 0.25)]
        line_width: f64,

        /// Line colour name
        #[arg(long = "line-color", visible_alias = "lc", default_value = "white")]
        line_color: PaletteColor,

        /// Text colour rule, exact match: color:"a","b" or color:labels.txt
        #[arg(short = 't', long = "text-color")]
        text_color: Vec<RuleSpec>,

        /// Character colour rule, substring match: color:"a","b" or color:chars.txt
        #[arg(short = 'c', long = "char-color")]
        char_color: Vec<RuleSpec>,

        /// Minimum text height in millimetres
        #[arg(long, default_value_t = 2.5)]
        min_font_size: f64,

        /// Only process the top level of an input directory
        #[arg(long)]
        no_recursive: bool,

        /// Show the settings without processing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Compare, classify and annotate drawing pairs
    #[command(group(ArgGroup::new("comparison").required(true).args(["comparison_dir", "compare_cmd"])))]
    Run {
        /// Pair to process: name=revision_a.dxf,revision_b.dxf (repeatable)
        #[arg(long = "pair", required = true, value_parser = parse_pair)]
        pairs: Vec<DrawingPair>,

        /// Directory holding one pre-computed <pair>.csv sheet per pair
        #[arg(long)]
        comparison_dir: Option<PathBuf>,

        /// External comparison program, called as <cmd> <args>... <pairs.json> <out_dir>
        #[arg(long)]
        compare_cmd: Option<PathBuf>,

        /// Extra argument for the comparison program (repeatable)
        #[arg(long = "compare-arg", allow_hyphen_values = true)]
        compare_args: Vec<String>,

        /// Working directory for outputs (default: a new temporary directory, kept)
        #[arg(long)]
        workdir: Option<PathBuf>,

        /// Timeout in seconds for the comparison and for each annotation
        #[arg(long, env = TIMEOUT_ENV)]
        timeout: Option<u64>,

        /// Maximum number of pairs (1-10)
        #[arg(long, env = MAX_PAIRS_ENV)]
        max_pairs: Option<usize>,

        /// Pairs processed concurrently
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
    },
}

fn parse_pair(s: &str) -> std::result::Result<DrawingPair, String> {
    let (name, files) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=a.dxf,b.dxf, got {s:?}"))?;
    let (a, b) = files
        .split_once(',')
        .ok_or_else(|| format!("expected two comma-separated files in {s:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("pair name is empty in {s:?}"));
    }
    Ok(DrawingPair::new(name, a.trim(), b.trim()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json, default_level(cli.verbose));

    let result = match cli.command {
        Commands::Classify {
            csv,
            output_dir,
            dry_run,
        } => cmd_classify(&csv, output_dir.as_deref(), dry_run),
        Commands::Annotate {
            input,
            output,
            line_width,
            line_color,
            text_color,
            char_color,
            min_font_size,
            no_recursive,
            dry_run,
        } => {
            let settings = AnnotateArgs {
                line_width,
                line_color,
                text_color,
                char_color,
                min_font_size,
            };
            cmd_annotate(&input, output.as_deref(), &settings, !no_recursive, dry_run)
                .await
                .map(|_| ())
        }
        Commands::Run {
            pairs,
            comparison_dir,
            compare_cmd,
            compare_args,
            workdir,
            timeout,
            max_pairs,
            concurrency,
        } => {
            let comparator: Arc<dyn LabelComparator> = match (comparison_dir, compare_cmd) {
                (Some(dir), _) => Arc::new(CsvDirectoryComparator::new(dir)),
                (None, Some(cmd)) => Arc::new(CommandComparator::new(cmd).with_args(compare_args)),
                (None, None) => anyhow::bail!("either --comparison-dir or --compare-cmd is required"),
            };
            let mut config = PipelineConfig::from_env().with_concurrency(concurrency);
            if let Some(secs) = timeout {
                config.timeout = Duration::from_secs(secs);
            }
            if let Some(max) = max_pairs {
                config.max_pairs = max;
            }
            cmd_run(pairs, comparator, config, workdir, true)
                .await
                .map(|_| ())
        }
    };

    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "command failed");
    }
    result
}

// ---------------------------------------------------------------------------
// classify
// ---------------------------------------------------------------------------

fn cmd_classify(csv: &Path, output_dir: Option<&Path>, dry_run: bool) -> Result<()> {
    let sheet = ComparisonSheet::read_csv(csv)
        .with_context(|| format!("Failed to read comparison sheet {}", csv.display()))?;
    let classification = sheet.classify().context("Failed to classify labels")?;

    println!("Sheet: {} ({} rows)", sheet.name, sheet.records.len());
    println!("  deleted:    {}", classification.deleted.len());
    println!("  added:      {}", classification.added.len());
    println!("  modified A: {}", classification.modified_a.len());
    println!("  modified B: {}", classification.modified_b.len());

    if dry_run {
        println!();
        println!(
            "{}",
            serde_json::to_string_pretty(&classification).context("serialize classification")?
        );
        return Ok(());
    }

    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => csv
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let lists = LabelLists::write(&dir, &sheet.name, &classification)
        .with_context(|| format!("Failed to write label lists to {}", dir.display()))?;
    for path in lists.iter() {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// annotate
// ---------------------------------------------------------------------------

struct AnnotateArgs {
    line_width: f64,
    line_color: PaletteColor,
    text_color: Vec<RuleSpec>,
    char_color: Vec<RuleSpec>,
    min_font_size: f64,
}

impl AnnotateArgs {
    fn config(&self) -> Result<AnnotationConfig> {
        let config = AnnotationConfig {
            line_width_mm: self.line_width,
            line_color: self.line_color.index(),
            min_font_size_mm: self.min_font_size,
            ..AnnotationConfig::default()
        }
        .with_char_rules(
            ColorRuleTable::from_specs(&self.char_color).context("Invalid character colour rule")?,
        )
        .with_text_rules(
            ColorRuleTable::from_specs(&self.text_color).context("Invalid text colour rule")?,
        );
        config.validate().context("Invalid annotation settings")?;
        Ok(config)
    }
}

async fn cmd_annotate(
    input: &Path,
    output: Option<&Path>,
    args: &AnnotateArgs,
    recursive: bool,
    dry_run: bool,
) -> Result<Vec<FileOutcome>> {
    if !input.exists() {
        anyhow::bail!("Input not found: {}", input.display());
    }
    let is_dir = input.is_dir();
    if !is_dir && !has_dxf_extension(input) {
        anyhow::bail!("Input is not a DXF file: {}", input.display());
    }

    let config = args.config()?;
    println!("Input: {}", input.display());
    match output {
        Some(out) => println!("Output: {}", out.display()),
        None => println!("Output: (overwrite input)"),
    }
    println!(
        "Line: width {} mm (lineweight {}), colour {}",
        config.line_width_mm,
        config.lineweight(),
        args.line_color
    );
    println!("Minimum text height: {} mm", config.min_font_size_mm);
    print_rules("Character colours", &config.char_color_rules);
    print_rules("Text colours", &config.text_color_rules);

    if dry_run {
        println!("\nDry run: nothing written.");
        return Ok(Vec::new());
    }

    let input = input.to_path_buf();
    let output = output.map(Path::to_path_buf);
    let outcomes = tokio::task::spawn_blocking(move || -> Result<Vec<FileOutcome>> {
        let store = DxfStore::new();
        if is_dir {
            if let Some(dir) = &output {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
            Ok(annotate_directory(&store, &input, output.as_deref(), &config, recursive)?)
        } else {
            let target = output.clone().unwrap_or_else(|| input.clone());
            let started = std::time::Instant::now();
            let result = annotate_file(&store, &input, &target, &config);
            let elapsed_ms = started.elapsed().as_millis() as u64;
            Ok(vec![match result {
                Ok(report) => FileOutcome {
                    input,
                    output: target,
                    elapsed_ms,
                    report: Some(report),
                    error: None,
                },
                Err(e) => FileOutcome {
                    input,
                    output: target,
                    elapsed_ms,
                    report: None,
                    error: Some(e.to_string()),
                },
            }])
        }
    })
    .await
    .context("Annotation task failed")??;

    println!();
    for outcome in &outcomes {
        match (&outcome.report, &outcome.error) {
            (Some(report), _) => println!(
                "  ✓ {} ({} entities, {} labels coloured, {} heights raised, {}ms)",
                outcome.input.display(),
                report.entities_processed,
                report.text_matched,
                report.heights_raised,
                outcome.elapsed_ms
            ),
            (None, Some(err)) => println!("  ✗ {}: {}", outcome.input.display(), err),
            (None, None) => {}
        }
    }

    let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
    println!("\nSummary: {}/{} files annotated", outcomes.len() - failed, outcomes.len());
    if failed > 0 {
        anyhow::bail!("{failed} file(s) failed");
    }
    Ok(outcomes)
}

fn has_dxf_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("dxf"))
        .unwrap_or(false)
}

fn print_rules(title: &str, rules: &ColorRuleTable) {
    if rules.is_empty() {
        return;
    }
    println!("{title}:");
    for rule in rules.rules() {
        println!("  {}: {}", rule.color, rule.matches.join(", "));
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(
    pairs: Vec<DrawingPair>,
    comparator: Arc<dyn LabelComparator>,
    config: PipelineConfig,
    workdir: Option<PathBuf>,
    show_progress: bool,
) -> Result<RunReport> {
    let mut workspace = match workdir {
        Some(dir) => RunWorkspace::at(dir)?,
        None => RunWorkspace::temporary()?,
    };
    info!(workdir = %workspace.root().display(), pairs = pairs.len(), "starting run");

    let progress = if show_progress {
        ProgressReporter::from_fn(|update| eprintln!("{}", update.message))
    } else {
        ProgressReporter::disabled()
    };
    let pipeline = PairPipeline::new(config, comparator, Arc::new(DxfStore::new()))
        .with_progress(progress);

    let report = pipeline
        .run(pairs, &mut workspace)
        .await
        .context("Pipeline run failed")?;
    let root = workspace.keep();

    println!("{}", render_summary_md(&report));
    println!("Outputs: {}", root.display());
    for pair in &report.pairs {
        for path in [&pair.outputs.annotated_a, &pair.outputs.annotated_b]
            .into_iter()
            .flatten()
        {
            println!("  {}: {}", pair.pair_name, path.display());
        }
    }

    if !report.all_succeeded() {
        anyhow::bail!("{} of {} pair(s) failed", report.failed, report.pairs.len());
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drawing(label: &str) -> String {
        [
            "  0", "SECTION", "  2", "ENTITIES", "  0", "TEXT", "  5", "20", "  8", "0", " 62",
            "3", " 40", "1.0", "  1", label, "  0", "ENDSEC", "  0", "EOF",
        ]
        .iter()
        .map(|line| format!("{line}\n"))
        .collect()
    }

    fn annotate_args(text_color: &[&str]) -> AnnotateArgs {
        AnnotateArgs {
            line_width: 0.25,
            line_color: PaletteColor::White,
            text_color: text_color.iter().map(|s| s.parse().unwrap()).collect(),
            char_color: Vec::new(),
            min_font_size: 2.5,
        }
    }

    #[test]
    fn test_parse_pair() {
        let pair = parse_pair("P1=old/a.dxf, new/b.dxf").unwrap();
        assert_eq!(pair.name, "P1");
        assert_eq!(pair.revision_a, PathBuf::from("old/a.dxf"));
        assert_eq!(pair.revision_b, PathBuf::from("new/b.dxf"));

        assert!(parse_pair("a.dxf,b.dxf").is_err());
        assert!(parse_pair("P1=a.dxf").is_err());
        assert!(parse_pair("=a.dxf,b.dxf").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "labeldiff",
            "run",
            "--pair",
            "P1=a.dxf,b.dxf",
            "--pair",
            "P2=c.dxf,d.dxf",
            "--compare-cmd",
            "compare-labels",
            "--compare-arg",
            "--strict",
            "--timeout",
            "30",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                pairs,
                compare_args,
                timeout,
                ..
            } => {
                assert_eq!(pairs.len(), 2);
                assert_eq!(compare_args, vec!["--strict"]);
                assert_eq!(timeout, Some(30));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_run_needs_a_comparison_source() {
        assert!(Cli::try_parse_from(["labeldiff", "run", "--pair", "P1=a.dxf,b.dxf"]).is_err());
    }

    #[test]
    fn test_cli_parses_annotate_rules() {
        let cli = Cli::try_parse_from([
            "labeldiff",
            "annotate",
            "in.dxf",
            "-t",
            "red:\"R1\",\"R2\"",
            "-c",
            "magenta:labels.txt",
            "--line-color",
            "Cyan",
        ])
        .unwrap();
        match cli.command {
            Commands::Annotate {
                text_color,
                char_color,
                line_color,
                ..
            } => {
                assert_eq!(text_color[0].color, "red");
                assert_eq!(char_color[0].color, "magenta");
                assert_eq!(line_color, PaletteColor::Cyan);
            }
            _ => panic!("expected annotate"),
        }
        assert!(Cli::try_parse_from(["labeldiff", "annotate", "in.dxf", "-t", "no-colon"]).is_err());
    }

    #[test]
    fn test_cmd_classify_writes_lists() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("P1.csv");
        std::fs::write(
            &csv,
            "label,countA,countB,outcome,delta\nR1,1,0,A Only,-1\nR9,0,1,B Only,1\n",
        )
        .unwrap();

        cmd_classify(&csv, None, false).unwrap();
        let deleted = std::fs::read_to_string(dir.path().join("P1_deleted.txt")).unwrap();
        assert_eq!(deleted, "R1\n");
        assert!(dir.path().join("P1_modified_b.txt").is_file());
    }

    #[test]
    fn test_cmd_classify_dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("P1.csv");
        std::fs::write(&csv, "label,countA,countB,outcome,delta\nR1,1,0,A Only,-1\n").unwrap();
        cmd_classify(&csv, None, true).unwrap();
        assert!(!dir.path().join("P1_deleted.txt").exists());
    }

    #[tokio::test]
    async fn test_cmd_annotate_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("plan.dxf");
        let output = dir.path().join("out").join("plan.dxf");
        std::fs::write(&input, drawing("R1")).unwrap();

        let outcomes = cmd_annotate(&input, Some(&output), &annotate_args(&["red:R1"]), true, false)
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].report.as_ref().unwrap().text_matched, 1);
        assert!(output.is_file());
    }

    #[tokio::test]
    async fn test_cmd_annotate_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.dxf"), drawing("R1")).unwrap();
        std::fs::write(dir.path().join("bad.dxf"), "garbage\n").unwrap();
        let out = dir.path().join("out");

        let err = cmd_annotate(dir.path(), Some(&out), &annotate_args(&[]), true, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("1 file(s) failed"));
        assert!(out.join("good.dxf").is_file());
    }

    #[tokio::test]
    async fn test_cmd_annotate_rejects_non_dxf() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.txt");
        std::fs::write(&input, "x").unwrap();
        assert!(cmd_annotate(&input, None, &annotate_args(&[]), true, true).await.is_err());
    }

    #[tokio::test]
    async fn test_cmd_run_with_comparison_dir() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.dxf");
        let b = dir.path().join("b.dxf");
        std::fs::write(&a, drawing("R1")).unwrap();
        std::fs::write(&b, drawing("R9")).unwrap();
        let sheets = dir.path().join("sheets");
        std::fs::create_dir_all(&sheets).unwrap();
        std::fs::write(
            sheets.join("P1.csv"),
            "label,countA,countB,outcome,delta\nR1,1,0,A Only,-1\nR9,0,1,B Only,1\n",
        )
        .unwrap();

        let report = cmd_run(
            vec![DrawingPair::new("P1", &a, &b)],
            Arc::new(CsvDirectoryComparator::new(&sheets)),
            PipelineConfig::default(),
            Some(dir.path().join("work")),
            false,
        )
        .await
        .unwrap();
        assert!(report.all_succeeded());
        assert!(dir.path().join("work").join("manifest.json").is_file());
    }
}
