//! The `scan` CLI subcommand -- scans a file or project for LLM API misuse.

use std::path::{Path, PathBuf};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use tally_analysis::{FindingCategory, Severity};
use tally_core::{load_config, ScanEngine};
use tally_report::{build_report, OutputFormat, ReportOptions};

use crate::{report_core_error, ExitCode};

// ---------------------------------------------------------------------------
// ScanArgs
// ---------------------------------------------------------------------------

/// Scan a file or project for risky and costly LLM API usage.
#[derive(Debug, clap::Args)]
pub struct ScanArgs {
    /// File or directory to scan.
    pub target: PathBuf,

    /// Output format: json or text. Defaults to `reporting.default_format`.
    #[arg(long)]
    pub format: Option<OutputFormat>,

    /// Output file path. Defaults to stdout.
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Configuration file applied on top of the user and project layers.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Per-file analysis budget in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Only report these categories (repeatable or comma-separated).
    #[arg(long = "category", value_delimiter = ',')]
    pub categories: Vec<FindingCategory>,

    /// Exit with code 1 when a finding at or above this severity remains.
    #[arg(long)]
    pub fail_on: Option<Severity>,

    /// Include the scan duration in the report.
    #[arg(long)]
    pub timing: bool,

    /// Enable verbose output.
    #[arg(long, short)]
    pub verbose: bool,

    /// Suppress all non-essential output.
    #[arg(long, short)]
    pub quiet: bool,
}

// ---------------------------------------------------------------------------
// execute
// ---------------------------------------------------------------------------

/// Executes the `scan` subcommand.
///
/// Returns an [`ExitCode`] indicating the outcome of the scan.
///
/// # Errors
///
/// Returns an error if the target cannot be scanned or the report cannot be
/// rendered or written.
pub fn execute(args: ScanArgs) -> Result<ExitCode, anyhow::Error> {
    // Ignore the error if the subscriber is already set (e.g. in tests).
    let _ = tally_core::init_tracing(args.verbose, args.quiet, false);

    let mut config = match load_config(Some(&args.target), args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return Ok(report_core_error("failed to load configuration", &e)),
    };
    if let Some(ms) = args.timeout_ms {
        config.scan.timeout_ms = Some(ms);
        if let Err(e) = config.validate() {
            eprintln!("tally: error: {e}");
            return Ok(ExitCode::ConfigError);
        }
    }
    let format = match args.format {
        Some(format) => format,
        None => match config.reporting.default_format.parse::<OutputFormat>() {
            Ok(format) => format,
            Err(e) => {
                eprintln!("tally: error: {e}");
                return Ok(ExitCode::ConfigError);
            }
        },
    };

    let engine = ScanEngine::new(config);

    let spinner = (!args.quiet).then(|| spinner(&args.target));
    let scanned = engine.scan(&args.target);
    if let Some(pb) = &spinner {
        match &scanned {
            Ok(project) => pb.finish_with_message(format!(
                "Scanned {} files ({} skipped), found {} findings",
                project.files_scanned,
                project.files_skipped,
                project.finding_count()
            )),
            Err(_) => pb.finish_and_clear(),
        }
    }
    let mut project = scanned.with_context(|| format!("failed to scan '{}'", args.target.display()))?;

    if !args.categories.is_empty() {
        project.retain_categories(&args.categories);
    }

    let options = ReportOptions {
        include_timing: args.timing,
    };
    let report = build_report(&project, engine.config(), options).context("failed to build report")?;
    let rendered = format.render(&report).context("failed to render report")?;

    if let Some(output_path) = &args.output {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
            }
        }
        std::fs::write(output_path, &rendered)
            .with_context(|| format!("failed to write output to '{}'", output_path.display()))?;
        info!(path = %output_path.display(), "wrote scan results");
    } else {
        println!("{rendered}");
    }

    let failed = args
        .fail_on
        .is_some_and(|threshold| project.has_findings_at_or_above(threshold));
    Ok(if failed {
        ExitCode::FindingsAtOrAbove
    } else {
        ExitCode::Pass
    })
}

fn spinner(target: &Path) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_strings(&["=>", "==>", "===>", "====>", "=====>", ""]));
    }
    pb.set_message(format!("Scanning {}...", target.display()));
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
