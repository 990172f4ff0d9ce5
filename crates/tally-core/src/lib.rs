//! Tally Core -- project-level orchestration around the single-file engine.
//!
//! [`tally_analysis`] knows how to scan one text. This crate adds what a host
//! needs to scan a project: layered configuration ([`config`]), file
//! discovery ([`scanner`]), parallel scanning with per-file budgets and fix
//! application ([`engine`]), and the process-wide tracing subscriber.

pub mod config;
pub mod engine;
pub mod scanner;

use std::path::PathBuf;

use tally_analysis::{ApplyError, ConfigError};

pub use config::{load_config, ConfigSources, ReportingSettings, ScanSettings, TallyConfig};
pub use engine::{FileFix, ProjectScan, ScanEngine};
pub use scanner::{discover_files, DiscoveredFile, DiscoveryResult, DiscoveryStats};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Top-level error type for the tally-core crate.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A configuration file could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The merged configuration was rejected by validation.
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    /// A fix could not be applied to a file.
    #[error("cannot fix '{}': {source}", path.display())]
    Fix {
        /// File the fix was computed for.
        path: PathBuf,
        /// Why the text no longer accepts the fix.
        source: ApplyError,
    },

    /// Tracing/logging initialization failed.
    #[error("tracing initialization error: {0}")]
    TracingInit(String),
}

impl CoreError {
    /// `true` for failures caused by configuration rather than by scanning.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::InvalidConfig(_))
    }
}

/// Convenience alias for `Result<T, CoreError>`.
pub type CoreResult<T> = Result<T, CoreError>;

// ---------------------------------------------------------------------------
// Tracing / Logging
// ---------------------------------------------------------------------------

/// Initialize structured tracing with the given verbosity level.
///
/// # Behaviour
///
/// | `verbose` | `quiet` | `json_output` | Effect                                  |
/// |-----------|---------|---------------|-----------------------------------------|
/// | `true`    | _       | _             | DEBUG level                             |
/// | _         | `true`  | _             | ERROR level only                        |
/// | `false`   | `false` | _             | WARN level (default)                    |
/// | _         | _       | `true`        | JSON-formatted log lines (CI/CD)        |
/// | _         | _       | `false`       | Human-readable, compact log lines       |
///
/// Log lines go to stderr so that reports written to stdout stay parseable.
/// `RUST_LOG`, when set, takes precedence over the level chosen here.
///
/// # Errors
///
/// Returns [`CoreError::TracingInit`] if the global subscriber has already been
/// set (i.e. this function was called more than once in the same process).
pub fn init_tracing(verbose: bool, quiet: bool, json_output: bool) -> CoreResult<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json_output {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init()
            .map_err(|e| CoreError::TracingInit(e.to_string()))
    } else {
        fmt()
            .compact()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init()
            .map_err(|e| CoreError::TracingInit(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_classified() {
        assert!(CoreError::Config("bad yaml".to_string()).is_config());
        let invalid = ConfigError::Invalid {
            field: "loop_bound_threshold".to_string(),
            reason: "must be greater than 0".to_string(),
        };
        assert!(CoreError::from(invalid).is_config());
        assert!(!CoreError::TracingInit("x".to_string()).is_config());
    }

    #[test]
    fn fix_error_names_the_file() {
        let err = CoreError::Fix {
            path: PathBuf::from("src/app.py"),
            source: ApplyError::Overlap { start: 3, end: 9 },
        };
        let text = err.to_string();
        assert!(text.contains("src/app.py"));
        assert!(text.contains("3..9"));
    }

    // `init_tracing` sets a global subscriber, so only the second call is
    // guaranteed to fail regardless of test order.
    #[test]
    fn init_tracing_returns_error_on_double_init() {
        let _ = init_tracing(false, false, false);

        let result = init_tracing(false, false, false);
        assert!(matches!(result, Err(CoreError::TracingInit(msg)) if !msg.is_empty()));
    }
}
