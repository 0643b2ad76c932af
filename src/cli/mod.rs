//! Harvest AutoML CLI Module
//!
//! Command-line interface for cleaning, training and prediction.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::export::Predictor;
use crate::pipeline::{CleanReport, Pipeline, PipelineConfig, TrainReport};
use crate::preprocessing::FilterMode;
use crate::training::ComparisonRow;

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn line_box_empty() { line_box(""); }

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
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

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "harvest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Crop production AutoML: clean FAOSTAT data, train and select a regressor")]
#[command(long_about = None)]
pub struct Cli {
    /// JSON pipeline configuration; flags override its values
    #[arg(short, long, global = true, env = "HARVEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reshape raw observations, remove outliers and write the cleaned table
    Clean {
        /// Raw long-format file (CSV, TSV or Parquet)
        #[arg(short, long)]
        data: PathBuf,

        /// Directory for the cleaned table
        #[arg(short, long, env = "HARVEST_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,

        /// Filter all columns against bounds from the unfiltered data
        #[arg(long)]
        simultaneous: bool,
    },

    /// Fit every regressor on a cleaned table and persist the best one
    Train {
        /// Cleaned table written by `clean`
        #[arg(short, long)]
        data: PathBuf,

        /// Directory for the model artifact
        #[arg(short, long, env = "HARVEST_MODELS_DIR")]
        models_dir: Option<PathBuf>,

        /// Directory for the comparison table
        #[arg(short, long, env = "HARVEST_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,

        /// Fit candidates one after another
        #[arg(long)]
        sequential: bool,
    },

    /// Clean then train
    Run {
        /// Raw long-format file (CSV, TSV or Parquet)
        #[arg(short, long)]
        data: PathBuf,

        /// Directory for the model artifact
        #[arg(short, long, env = "HARVEST_MODELS_DIR")]
        models_dir: Option<PathBuf>,

        /// Directory for the cleaned and comparison tables
        #[arg(short, long, env = "HARVEST_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,

        /// Fit candidates one after another
        #[arg(long)]
        sequential: bool,

        /// Filter all columns against bounds from the unfiltered data
        #[arg(long)]
        simultaneous: bool,
    },

    /// Predict production with a saved model
    Predict {
        /// Model artifact (JSON)
        #[arg(short, long)]
        model: PathBuf,

        /// Area harvested (ha)
        #[arg(short, long)]
        area_harvested: f64,

        /// Yield (hg/ha)
        #[arg(short = 'y', long = "yield")]
        crop_yield: f64,
    },
}

/// Flag overrides applied on top of the configuration file
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub output_dir: Option<PathBuf>,
    pub models_dir: Option<PathBuf>,
    pub sequential: bool,
    pub simultaneous: bool,
}

/// Load the configuration file (or defaults) and apply flag overrides
pub fn resolve_config(path: Option<&Path>, overrides: &Overrides) -> anyhow::Result<PipelineConfig> {
    let mut config = match path {
        Some(p) => PipelineConfig::from_json_file(p)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &overrides.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(dir) = &overrides.models_dir {
        config.models_dir = dir.clone();
    }
    if overrides.sequential {
        config.training.parallel = false;
    }
    if overrides.simultaneous {
        config.outlier.mode = FilterMode::Simultaneous;
    }
    config.validate()?;
    Ok(config)
}

// ─── Reports ───────────────────────────────────────────────────────────────────

fn print_clean_report(report: &CleanReport) {
    println!();
    println!("  {:<18} {}", muted("Observations"), report.stats.input_rows);
    println!("  {:<18} {}", muted("Relevant"), report.stats.relevant_rows);
    println!("  {:<18} {}", muted("Groups"), report.stats.groups);
    println!("  {:<18} {}", muted("Complete"), report.stats.complete_groups);
    println!();

    println!(
        "  {:<16} {:>14} {:>14} {:>8}",
        muted("Column"), muted("Lower"), muted("Upper"), muted("Removed")
    );
    println!("  {}", dim(&"─".repeat(56)));
    for b in &report.bounds {
        println!(
            "  {:<16} {:>14.2} {:>14.2} {:>8}",
            b.column.column_name(), b.lower, b.upper, b.removed
        );
    }
    println!("  {}", dim(&"─".repeat(56)));
    step_ok(&format!(
        "{} rows → {}",
        report.rows,
        report.cleaned_path.display()
    ));
}

fn print_comparison(rows: &[ComparisonRow]) {
    println!();
    println!(
        "  {:<32} {:>14} {:>12} {:>8}",
        muted("Model"), muted("MSE"), muted("MAE"), muted("R²")
    );
    println!("  {}", dim(&"─".repeat(70)));
    for row in rows {
        match (&row.metrics, &row.error) {
            (Some(m), _) => println!(
                "  {:<32} {:>14.4e} {:>12.4e} {:>8.4}",
                row.name, m.mse, m.mae, m.r2
            ),
            (None, err) => println!(
                "  {:<32} {}",
                row.name,
                format!("err: {}", err.as_deref().unwrap_or("unknown")).red()
            ),
        }
    }
    println!("  {}", dim(&"─".repeat(70)));
}

fn print_train_report(report: &TrainReport) {
    println!();
    println!("  {:<18} {}", muted("Samples"), report.feature_rows);
    println!("  {:<18} {} / {}", muted("Train / test"), report.n_train, report.n_test);

    print_comparison(&report.comparison);

    println!();
    line_box_top();
    line_box_empty();
    line_box_center(&format!("{}", report.winner.white().bold()));
    line_box_empty();
    line_box_sep();
    line_box_empty();
    line_box(&kv("R²  ", &format!("{:.4}", report.winner_metrics.r2)));
    line_box(&kv("MSE ", &format!("{:.4e}", report.winner_metrics.mse)));
    line_box(&kv("MAE ", &format!("{:.4e}", report.winner_metrics.mae)));
    line_box_empty();
    line_box_bottom();
    println!();
    step_ok(&format!("model → {}", report.artifact_path.display()));
    step_ok(&format!("comparison → {}", report.comparison_path.display()));
    println!();
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_clean(config: PipelineConfig, data_path: &Path) -> anyhow::Result<()> {
    section("Clean");

    step_run(&format!("Cleaning {}", data_path.display()));
    let start = Instant::now();
    let pipeline = Pipeline::new(config)?;
    let (_, report) = pipeline.clean(data_path)?;
    step_done(&format!("{:?}", start.elapsed()));

    print_clean_report(&report);
    println!();
    Ok(())
}

pub fn cmd_train(config: PipelineConfig, data_path: &Path) -> anyhow::Result<()> {
    section("Train");

    let n_models = config.training.roster.len();
    step_run(&format!("Fitting {} models on {}", n_models, data_path.display()));
    let start = Instant::now();
    let pipeline = Pipeline::new(config)?;
    let report = pipeline.train_from_file(data_path)?;
    step_done(&format!("{:?}", start.elapsed()));

    print_train_report(&report);
    Ok(())
}

pub fn cmd_run(config: PipelineConfig, data_path: &Path) -> anyhow::Result<()> {
    section("Run");

    step_run(&format!("Running pipeline on {}", data_path.display()));
    let start = Instant::now();
    let pipeline = Pipeline::new(config)?;
    let report = pipeline.run(data_path)?;
    step_done(&format!("{:?}", start.elapsed()));

    print_clean_report(&report.clean);
    print_train_report(&report.train);
    Ok(())
}

pub fn cmd_predict(model_path: &Path, area_harvested: f64, crop_yield: f64) -> anyhow::Result<()> {
    section("Predict");

    step_run(&format!("Loading {}", model_path.display()));
    let predictor = Predictor::load(model_path)?;
    step_done(predictor.model_name());

    let production = predictor.predict(area_harvested, crop_yield)?;

    println!();
    println!("  {:<18} {}", muted("Area harvested"), area_harvested);
    println!("  {:<18} {}", muted("Yield"), crop_yield);
    println!("  {:<18} {}", muted("Production"), format!("{:.2}", production).white().bold());
    println!();
    Ok(())
}
