//! The `fix` CLI subcommand -- applies the safe automated fixes.

use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use tally_core::{load_config, ScanEngine};

use crate::{report_core_error, ExitCode};

/// Apply the safe automated fixes to a file or project.
#[derive(Debug, clap::Args)]
pub struct FixArgs {
    /// File or directory to fix.
    pub target: PathBuf,

    /// Print the planned edits without writing any file.
    #[arg(long)]
    pub dry_run: bool,

    /// Configuration file applied on top of the user and project layers.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(long, short)]
    pub verbose: bool,

    /// Suppress all non-essential output.
    #[arg(long, short)]
    pub quiet: bool,
}

/// Executes the `fix` subcommand.
///
/// Every file is re-read and re-scanned immediately before its fixes are
/// computed, so edits made since an earlier report cannot be overwritten
/// with stale proposals.
///
/// # Errors
///
/// Returns an error if the target cannot be scanned, a file's fixes
/// conflict, or a fixed file cannot be written.
pub fn execute(args: FixArgs) -> Result<ExitCode, anyhow::Error> {
    let _ = tally_core::init_tracing(args.verbose, args.quiet, false);

    let config = match load_config(Some(&args.target), args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return Ok(report_core_error("failed to load configuration", &e)),
    };
    let engine = ScanEngine::new(config);

    let plans = engine
        .plan_fixes(&args.target)
        .with_context(|| format!("failed to plan fixes for '{}'", args.target.display()))?;

    let mut applied = 0usize;
    for plan in &plans {
        if !args.quiet {
            println!("{}: {} fix(es)", plan.file.relative_path, plan.proposals.len());
            for proposal in &plan.proposals {
                println!("  - {}", proposal.description);
            }
        }
        if args.dry_run {
            continue;
        }
        std::fs::write(&plan.file.path, &plan.fixed_text)
            .with_context(|| format!("failed to write '{}'", plan.file.path.display()))?;
        applied += plan.proposals.len();
        info!(path = %plan.file.relative_path, fixes = plan.proposals.len(), "applied fixes");
    }

    if !args.quiet {
        if plans.is_empty() {
            println!("No fixable findings.");
        } else if args.dry_run {
            println!("Dry run: no files were changed.");
        } else {
            println!("Applied {applied} fix(es) to {} file(s).", plans.len());
        }
    }
    Ok(ExitCode::Pass)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENT: &str = "import os\nfrom openai import OpenAI\nc = OpenAI(api_key='sk-test123456789012345678901234567890')\n";

    fn args(target: PathBuf, dry_run: bool) -> FixArgs {
        FixArgs {
            target,
            dry_run,
            config: None,
            verbose: false,
            quiet: true,
        }
    }

    #[test]
    fn dry_run_leaves_files_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("agent.py");
        std::fs::write(&file, AGENT).unwrap();

        assert_eq!(execute(args(tmp.path().to_path_buf(), true)).unwrap(), ExitCode::Pass);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), AGENT);
    }

    #[test]
    fn fix_rewrites_files() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("agent.py");
        std::fs::write(&file, AGENT).unwrap();

        assert_eq!(execute(args(tmp.path().to_path_buf(), false)).unwrap(), ExitCode::Pass);
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "import os\nfrom tally_meter_openai import OpenAI\nc = OpenAI(api_key=os.getenv('OPENAI_API_KEY'))\n"
        );

        // A second run finds nothing left to fix.
        assert_eq!(execute(args(tmp.path().to_path_buf(), false)).unwrap(), ExitCode::Pass);
    }

    #[test]
    fn missing_target_is_an_error() {
        assert!(execute(args(PathBuf::from("/nonexistent/path/unlikely"), false)).is_err());
    }
}
