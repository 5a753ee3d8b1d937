use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;

use comment_sentiment::config::Settings;
use comment_sentiment::run::RunCoordinator;
use comment_sentiment::sentiment::HubModelProvider;

/// Finds the positive comments in scraped forum exports.
#[derive(Debug, Parser)]
#[command(name = "comment-sentiment", version, about)]
struct Cli {
    /// TOML settings file (defaults to ./comment-sentiment.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input directory of *.json comment files; repeat for several sources
    #[arg(short, long = "input", value_name = "DIR")]
    inputs: Vec<PathBuf>,

    /// Directory for the positive comment collections
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Hub repo id or local model directory
    #[arg(short, long)]
    model: Option<String>,

    /// Preferred device: gpu or cpu
    #[arg(long)]
    device: Option<String>,

    /// Minimum positive score, inclusive
    #[arg(short, long)]
    threshold: Option<f32>,

    /// Comments per classifier call
    #[arg(long)]
    batch_size: Option<usize>,

    /// Sources processed in parallel
    #[arg(short, long)]
    workers: Option<usize>,

    /// Print the run report as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Do not draw a progress bar
    #[arg(long)]
    no_progress: bool,

    /// Quiet mode (warnings and errors only)
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long)]
    verbose: bool,
}

/// Flags that override configuration; unset flags leave lower layers alone.
#[derive(Debug, Default, Serialize)]
struct CliOverrides {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    input_dirs: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    positive_threshold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<bool>,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            input_dirs: self.inputs.clone(),
            output_dir: self.output.clone(),
            model_name: self.model.clone(),
            device: self.device.clone(),
            positive_threshold: self.threshold,
            batch_size: self.batch_size,
            workers: self.workers,
            progress: (self.no_progress || self.json).then_some(false),
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(error) => {
            eprintln!("comment-sentiment error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    let settings = Settings::load_with(cli.config.as_deref(), cli.overrides())
        .context("failed to load settings")?;
    settings.log_summary();

    let provider = HubModelProvider::from_settings(&settings);
    let report = RunCoordinator::new(&settings, &provider)
        .run()
        .context("run aborted")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }

    Ok(if report.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("COMMENT_SENTIMENT_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
