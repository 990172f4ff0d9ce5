//! The `config` CLI subcommand -- show, create and validate tally configuration.

use std::path::PathBuf;

use anyhow::Context;

use tally_core::config;

use crate::{report_core_error, ExitCode};

// ---------------------------------------------------------------------------
// ConfigArgs
// ---------------------------------------------------------------------------

/// Manage tally configuration.
#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config sub-subcommands.
#[derive(Debug, clap::Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration for a project.
    Show(LayerArgs),
    /// Write the default configuration to `.tally.yaml`.
    Init {
        /// Directory to write the file into.
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Validate the effective configuration for a project.
    Validate(LayerArgs),
}

/// Selects the configuration layers to load.
#[derive(Debug, Clone, clap::Args)]
pub struct LayerArgs {
    /// Project directory whose `.tally.yaml` is loaded.
    #[arg(default_value = ".")]
    pub project: PathBuf,

    /// Configuration file applied on top of the user and project layers.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// execute
// ---------------------------------------------------------------------------

/// Executes the `config` subcommand.
///
/// Returns an [`ExitCode`] indicating the outcome.
///
/// # Errors
///
/// Returns an error if the configuration cannot be serialized.
pub fn execute(args: ConfigArgs) -> Result<ExitCode, anyhow::Error> {
    match args.action {
        ConfigAction::Show(layers) => execute_show(&layers),
        ConfigAction::Init { dir } => Ok(execute_init(&dir)),
        ConfigAction::Validate(layers) => Ok(execute_validate(&layers)),
    }
}

/// Loads the merged configuration and prints it as YAML.
fn execute_show(layers: &LayerArgs) -> Result<ExitCode, anyhow::Error> {
    let cfg = match config::load_config(Some(&layers.project), layers.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => return Ok(report_core_error("failed to load configuration", &e)),
    };
    let yaml = cfg.to_yaml().context("failed to serialize configuration to YAML")?;
    print!("{yaml}");
    Ok(ExitCode::Pass)
}

fn execute_init(dir: &std::path::Path) -> ExitCode {
    match config::init_config(dir) {
        Ok(path) => {
            println!("Wrote {}", path.display());
            ExitCode::Pass
        }
        Err(e) => report_core_error("failed to write configuration", &e),
    }
}

/// Loads the merged configuration and reports whether it is valid.
fn execute_validate(layers: &LayerArgs) -> ExitCode {
    match config::load_config(Some(&layers.project), layers.config.as_deref()) {
        Ok(_) => {
            println!("Configuration is valid.");
            ExitCode::Pass
        }
        Err(e) => {
            eprintln!("Configuration error: {e}");
            ExitCode::for_error(&e)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn layers(project: PathBuf, config: Option<PathBuf>) -> LayerArgs {
        LayerArgs { project, config }
    }

    #[test]
    fn execute_show_succeeds() {
        let tmp = tempfile::tempdir().unwrap();
        let args = ConfigArgs {
            action: ConfigAction::Show(layers(tmp.path().to_path_buf(), None)),
        };
        assert_eq!(execute(args).unwrap(), ExitCode::Pass);
    }

    #[test]
    fn init_then_validate() {
        let tmp = tempfile::tempdir().unwrap();
        let init = ConfigArgs {
            action: ConfigAction::Init {
                dir: tmp.path().to_path_buf(),
            },
        };
        assert_eq!(execute(init).unwrap(), ExitCode::Pass);
        assert!(tmp.path().join(config::PROJECT_CONFIG_FILE).is_file());

        let validate = ConfigArgs {
            action: ConfigAction::Validate(layers(tmp.path().to_path_buf(), None)),
        };
        assert_eq!(execute(validate).unwrap(), ExitCode::Pass);
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(config::PROJECT_CONFIG_FILE), "scan: {}\n").unwrap();
        let args = ConfigArgs {
            action: ConfigAction::Init {
                dir: tmp.path().to_path_buf(),
            },
        };
        assert_eq!(execute(args).unwrap(), ExitCode::ConfigError);
    }

    #[test]
    fn validate_rejects_invalid_values() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(config::PROJECT_CONFIG_FILE),
            "scan:\n  max_file_size_kb: 0\n",
        )
        .unwrap();
        let args = ConfigArgs {
            action: ConfigAction::Validate(layers(tmp.path().to_path_buf(), None)),
        };
        assert_eq!(execute(args).unwrap(), ExitCode::ConfigError);
    }

    #[test]
    fn validate_reports_missing_explicit_file() {
        let tmp = tempfile::tempdir().unwrap();
        let args = ConfigArgs {
            action: ConfigAction::Validate(layers(tmp.path().to_path_buf(), Some(tmp.path().join("absent.yaml")))),
        };
        assert_eq!(execute(args).unwrap(), ExitCode::ConfigError);
    }
}
