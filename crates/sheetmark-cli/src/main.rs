//! sheetmark CLI — grade scanned answer sheets from the command line.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use sheetmark::{AnswerKey, ExamStructure, OmrConfig, SheetProcessor, SheetReport};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "sheetmark")]
#[command(about = "Grade scanned multiple-choice answer sheets against an exam and answer key")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a single scanned sheet.
    Grade(GradeArgs),

    /// Grade a directory of scanned sheets in parallel.
    Batch(BatchArgs),

    /// Export the mm-space bubble layout template for an exam.
    LayoutInfo(LayoutInfoArgs),

    /// Check that an answer key covers every question of an exam.
    KeyCheck(KeyCheckArgs),
}

#[derive(Debug, Clone, Args)]
struct GradeArgs {
    /// Path to the scanned sheet image.
    #[arg(long)]
    image: PathBuf,

    /// Path to the exam structure (JSON).
    #[arg(long)]
    exam: PathBuf,

    /// Path to the answer key (JSON).
    #[arg(long)]
    key: PathBuf,

    /// Path to write the sheet report (JSON). Prints to stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Path to write the audit overlay image (PNG).
    #[arg(long)]
    debug_image: Option<PathBuf>,

    #[command(flatten)]
    tuning: TuningArgs,
}

#[derive(Debug, Clone, Args)]
struct BatchArgs {
    /// Directory containing the scanned sheet images.
    #[arg(long)]
    dir: PathBuf,

    /// Path to the exam structure (JSON).
    #[arg(long)]
    exam: PathBuf,

    /// Path to the answer key (JSON).
    #[arg(long)]
    key: PathBuf,

    /// Directory to write one report JSON per sheet.
    #[arg(long)]
    out_dir: PathBuf,

    #[command(flatten)]
    tuning: TuningArgs,
}

#[derive(Debug, Clone, Args)]
struct LayoutInfoArgs {
    /// Path to the exam structure (JSON).
    #[arg(long)]
    exam: PathBuf,

    /// Path to write the template (JSON). Prints to stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct KeyCheckArgs {
    /// Path to the exam structure (JSON).
    #[arg(long)]
    exam: PathBuf,

    /// Path to the answer key (JSON).
    #[arg(long)]
    key: PathBuf,
}

/// Decision-stage calibration knobs, applied over the default config.
#[derive(Debug, Clone, Args)]
struct TuningArgs {
    /// Minimum final score for a bubble to count as marked.
    #[arg(long, default_value = "35.0")]
    min_mark_score: f32,

    /// Top-two score gap below which a question reads as double-marked.
    #[arg(long, default_value = "10.0")]
    multiple_marks_band: f32,

    /// Top-two score gap below which separation is flagged as weak.
    #[arg(long, default_value = "15.0")]
    low_difference_band: f32,

    /// Confidence below which a question is counted for manual review.
    #[arg(long, default_value = "70")]
    review_confidence: u8,

    /// Per-sheet processing ceiling in seconds. Zero disables the budget.
    #[arg(long, default_value = "30.0")]
    time_budget_secs: f32,
}

impl TuningArgs {
    fn to_config(&self) -> OmrConfig {
        let mut config = OmrConfig::default();
        config.decision.min_mark_score = self.min_mark_score;
        config.decision.multiple_marks_band = self.multiple_marks_band;
        config.decision.low_difference_band = self.low_difference_band;
        config.decision.review_confidence = self.review_confidence;
        config.time_budget_secs = if self.time_budget_secs > 0.0 {
            Some(self.time_budget_secs)
        } else {
            None
        };
        config
    }
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Grade(args) => run_grade(&args),
        Commands::Batch(args) => run_batch(&args),
        Commands::LayoutInfo(args) => run_layout_info(&args),
        Commands::KeyCheck(args) => run_key_check(&args),
    }
}

fn load_processor(
    exam_path: &Path,
    key_path: &Path,
    tuning: &TuningArgs,
) -> CliResult<SheetProcessor> {
    let exam = ExamStructure::from_json_file(exam_path)?;
    let key = AnswerKey::from_json_file(key_path)?;
    Ok(SheetProcessor::with_config(exam, key, tuning.to_config())?)
}

fn write_report(report: &SheetReport, out: Option<&Path>) -> CliResult<()> {
    let json = serde_json::to_string_pretty(report)?;
    match out {
        Some(path) => {
            std::fs::write(path, &json)?;
            tracing::info!("Report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

// ── grade ──────────────────────────────────────────────────────────────

fn run_grade(args: &GradeArgs) -> CliResult<()> {
    let processor = load_processor(&args.exam, &args.key, &args.tuning)?;

    tracing::info!("Loading image: {}", args.image.display());
    let img = image::open(&args.image).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", args.image.display(), e).into()
    })?;

    let report = if let Some(debug_path) = &args.debug_image {
        let (report, overlay) = processor.process_with_debug(&img)?;
        overlay.save(debug_path)?;
        tracing::info!("Audit overlay written to {}", debug_path.display());
        report
    } else {
        processor.process_image(&img)?
    };

    tracing::info!(
        "Score: {:.1}/{:.1} ({:.1}%), grade {} \"{}\", {} flagged for review",
        report.grading.total_score,
        report.grading.max_score,
        report.grading.percentage,
        report.grading.grade.numeric,
        report.grading.grade.label,
        report.grading.low_confidence,
    );

    write_report(&report, args.out.as_deref())
}

// ── batch ──────────────────────────────────────────────────────────────

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tiff"];

fn run_batch(args: &BatchArgs) -> CliResult<()> {
    let processor = load_processor(&args.exam, &args.key, &args.tuning)?;

    let mut paths: Vec<PathBuf> = std::fs::read_dir(&args.dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        })
        .collect();
    paths.sort();
    if paths.is_empty() {
        return Err(format!("no sheet images found in {}", args.dir.display()).into());
    }
    tracing::info!("Grading {} sheets from {}", paths.len(), args.dir.display());

    let mut sheets = Vec::with_capacity(paths.len());
    for path in &paths {
        sheets.push(std::fs::read(path)?);
    }

    std::fs::create_dir_all(&args.out_dir)?;
    let results = processor.process_batch(&sheets);

    let mut failures = 0usize;
    for (path, result) in paths.iter().zip(&results) {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("sheet");
        match result {
            Ok(report) => {
                let out = args.out_dir.join(format!("{stem}.json"));
                std::fs::write(&out, serde_json::to_string_pretty(report)?)?;
                tracing::info!(
                    "{}: {:.1}% (grade {})",
                    path.display(),
                    report.grading.percentage,
                    report.grading.grade.numeric
                );
            }
            Err(e) => {
                failures += 1;
                tracing::error!("{}: {}", path.display(), e);
            }
        }
    }
    tracing::info!(
        "Batch complete: {}/{} sheets graded",
        results.len() - failures,
        results.len()
    );
    if failures > 0 {
        return Err(format!("{failures} sheet(s) failed").into());
    }
    Ok(())
}

// ── layout-info ────────────────────────────────────────────────────────

fn run_layout_info(args: &LayoutInfoArgs) -> CliResult<()> {
    let exam = ExamStructure::from_json_file(&args.exam)?;
    let template = sheetmark::SheetLayout::default().template(&exam);

    println!("answer sheet template for exam '{}'", exam.name);
    println!("  schema version:  {}", template.version);
    println!(
        "  page size:       {}x{} mm",
        template.page_size_mm[0], template.page_size_mm[1]
    );
    println!("  questions:       {}", template.questions.len());
    println!(
        "  corner centers:  ({}, {}) .. ({}, {}) mm",
        template.corner_centers_mm[0][0],
        template.corner_centers_mm[0][1],
        template.corner_centers_mm[3][0],
        template.corner_centers_mm[3][1]
    );

    if let Some(path) = &args.out {
        std::fs::write(path, serde_json::to_string_pretty(&template)?)?;
        tracing::info!("Template written to {}", path.display());
    } else {
        println!("{}", serde_json::to_string_pretty(&template)?);
    }
    Ok(())
}

// ── key-check ──────────────────────────────────────────────────────────

fn run_key_check(args: &KeyCheckArgs) -> CliResult<()> {
    let exam = ExamStructure::from_json_file(&args.exam)?;
    let key = AnswerKey::from_json_file(&args.key)?;

    if key.exam_id != exam.id {
        tracing::warn!(
            "key exam id '{}' does not match exam '{}'",
            key.exam_id,
            exam.id
        );
    }

    key.validate_against(&exam)?;
    println!(
        "key variant '{}' covers all {} questions of exam '{}'",
        key.variant,
        exam.total_questions(),
        exam.name
    );
    let extra: Vec<u32> = key
        .answers
        .keys()
        .copied()
        .filter(|&q| q > exam.total_questions())
        .collect();
    if !extra.is_empty() {
        println!("note: key has {} entries beyond the exam: {:?}", extra.len(), extra);
    }
    Ok(())
}
