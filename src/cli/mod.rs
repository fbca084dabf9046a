//! Crash risk CLI module
//!
//! Command-line interface for training a scoring model and scoring road segments.

use chrono::Local;
use clap::{Parser, Subcommand};
use colored::*;
use polars::prelude::ChunkAgg;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::inference::PREDICTION_COLUMN;
use crate::pipeline::{outputs, PipelineConfig, PredictOptions, PredictionRun, TrainingRun};
use crate::utils::DataLoader;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn kv(key: &str, val: &str) {
    println!("  {:<16} {}", muted(key), val.white());
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn score(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.4}", v))
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "crash-risk")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Road segment crash risk model training and scoring")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Tune, evaluate and select a crash risk model
    Train {
        /// Run configuration (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Directory holding the labeled input table
        #[arg(short, long)]
        data_dir: PathBuf,

        /// Output directory (defaults to the data directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Score road segments with a trained model
    Predict {
        /// Trained model file (model.json)
        #[arg(short, long)]
        model: PathBuf,

        /// Road segment table (CSV)
        #[arg(short, long)]
        data: PathBuf,

        /// Crash history table for recent crash counts (CSV)
        #[arg(long)]
        crashes: Option<PathBuf>,

        /// Segment identifier column shared by both tables
        #[arg(long, default_value = "segment_id")]
        segment_column: String,

        /// Output directory (defaults to the road table's directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show column types and null counts of a table
    Info {
        /// Input data file (CSV)
        #[arg(short, long)]
        data: PathBuf,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(config_path: &Path, data_dir: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    section("Train");

    let config = PipelineConfig::from_file(config_path)?;
    let run = TrainingRun::new(config)?;
    let out_dir = output.unwrap_or(data_dir);

    kv("Input", &run.input_path(data_dir).display().to_string());
    kv("Families", &run.config().models.join(", "));
    kv("Output", &out_dir.display().to_string());
    println!();

    step_run("Tuning and evaluating");
    let start = Instant::now();
    let report = run.run(data_dir, out_dir)?;
    step_done(&format!("{:?}", start.elapsed()));

    println!();
    println!(
        "  {:<22} {:>8} {:>8} {:>8} {:>10}",
        muted("Family"),
        muted("ROC-AUC"),
        muted("F1"),
        muted("Brier"),
        muted("Cal. AUC")
    );
    println!("  {}", dim(&"─".repeat(60)));
    for eval in &report.evaluations {
        let calibrated = eval.calibrated.as_ref().and_then(|c| c.metrics.roc_auc);
        println!(
            "  {:<22} {:>8} {:>8} {:>8.4} {:>10}",
            eval.family,
            score(eval.raw.metrics.roc_auc),
            score(eval.raw.metrics.f1),
            eval.raw.metrics.brier,
            score(calibrated)
        );
    }
    println!("  {}", dim(&"─".repeat(60)));

    println!();
    let verdict = if report.selection.above_floor {
        ok("best")
    } else {
        "below floor".yellow()
    };
    println!(
        "  {} {} {}",
        verdict,
        report.selection.family.white().bold(),
        muted(&format!("{:.4}", report.selection.score))
    );
    kv("Rows", &format!("{} ({} train / {} test)", report.rows, report.n_train, report.n_test));
    kv("Model", &out_dir.join(outputs::MODEL).display().to_string());
    println!();

    Ok(())
}

pub fn cmd_predict(
    model_path: &Path,
    data_path: &Path,
    crashes: Option<&Path>,
    segment_column: &str,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Predict");

    let mut options = PredictOptions::new(Local::now().naive_local());
    options.segment_column = segment_column.to_string();

    step_run("Loading model");
    let run = PredictionRun::load(model_path, options)?;
    step_done(&run.engine().artifact().family);

    let out_dir = match output {
        Some(dir) => dir.to_path_buf(),
        None => data_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    step_run("Scoring segments");
    let start = Instant::now();
    let scored = run.run(data_path, crashes, &out_dir)?;
    step_done(&format!("{} rows in {:?}", scored.height(), start.elapsed()));

    let probabilities = scored.column(PREDICTION_COLUMN)?.f64()?;
    kv("Mean risk", &score(probabilities.mean()));
    kv("Max risk", &score(probabilities.max()));
    kv("Output", &out_dir.join("predictions.csv").display().to_string());
    println!();

    Ok(())
}

pub fn cmd_info(data_path: &Path) -> anyhow::Result<()> {
    section("Data Info");

    let df = DataLoader::new().load_csv(data_path)?;

    kv("File", &data_path.display().to_string());
    kv("Rows", &df.height().to_string());
    kv("Columns", &df.width().to_string());
    println!();

    println!("  {:<24} {:<12} {:>8}", muted("Column"), muted("Type"), muted("Nulls"));
    println!("  {}", dim(&"─".repeat(46)));

    for col in df.get_columns() {
        println!(
            "  {:<24} {:<12} {:>8}",
            col.name(),
            format!("{:?}", col.dtype()).truecolor(140, 140, 140),
            col.null_count()
        );
    }

    println!();
    Ok(())
}
