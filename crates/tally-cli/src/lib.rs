//! Tally CLI -- command-line interface for the tally LLM usage analyzer.
//!
//! This crate provides argument parsing, exit code definitions and the
//! orchestration that ties configuration loading, the scan engine, fixes and
//! report rendering together.

pub mod commands;

use std::fmt;

use tally_core::CoreError;

// ---------------------------------------------------------------------------
// Exit Codes
// ---------------------------------------------------------------------------

/// Tally process exit codes.
///
/// | Code | Meaning                                          |
/// |------|--------------------------------------------------|
/// | 0    | Completed, nothing at or above `--fail-on`       |
/// | 1    | Completed, findings at or above `--fail-on`      |
/// | 2    | Engine error (missing target, I/O, conflicts)    |
/// | 3    | Configuration error                              |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExitCode {
    /// Completed without findings at or above the failure threshold.
    Pass = 0,
    /// Completed with findings at or above the failure threshold.
    FindingsAtOrAbove = 1,
    /// Engine error (missing target, I/O failure, conflicting fixes).
    EngineError = 2,
    /// Configuration error (malformed YAML, invalid values).
    ConfigError = 3,
}

impl ExitCode {
    /// Returns the numeric exit code as a `u8`.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns all exit code variants.
    #[must_use]
    pub const fn all() -> &'static [ExitCode] {
        &[Self::Pass, Self::FindingsAtOrAbove, Self::EngineError, Self::ConfigError]
    }

    /// Returns a human-readable description of this exit code.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Pass => "completed, no findings at or above the failure threshold",
            Self::FindingsAtOrAbove => "completed, findings at or above the failure threshold",
            Self::EngineError => "engine error (missing target, I/O failure, conflicting fixes)",
            Self::ConfigError => "configuration error (malformed YAML, invalid values)",
        }
    }

    /// The exit code for a failed core operation.
    #[must_use]
    pub const fn for_error(err: &CoreError) -> Self {
        if err.is_config() {
            Self::ConfigError
        } else {
            Self::EngineError
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exit code {} ({})", self.as_u8(), self.description())
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.as_u8())
    }
}

/// Terminate the process with the given [`ExitCode`].
///
/// Logs the exit reason (info for [`ExitCode::Pass`], error otherwise) and
/// returns the matching [`std::process::ExitCode`] for `main`.
///
/// # Example
///
/// ```rust,no_run
/// use tally_cli::ExitCode;
///
/// fn main() -> std::process::ExitCode {
///     tally_cli::terminate(ExitCode::Pass)
/// }
/// ```
pub fn terminate(code: ExitCode) -> std::process::ExitCode {
    match code {
        ExitCode::Pass => {
            tracing::info!(%code, "tally exiting");
        }
        ExitCode::FindingsAtOrAbove => {
            tracing::info!(%code, "tally exiting with findings");
        }
        _ => {
            tracing::error!(%code, "tally exiting with error");
        }
    }
    code.into()
}

/// Prints a failed core operation and picks its exit code.
pub(crate) fn report_core_error(context: &str, err: &CoreError) -> ExitCode {
    eprintln!("tally: error: {context}: {err}");
    ExitCode::for_error(err)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_numeric_values() {
        assert_eq!(ExitCode::Pass.as_u8(), 0);
        assert_eq!(ExitCode::FindingsAtOrAbove.as_u8(), 1);
        assert_eq!(ExitCode::EngineError.as_u8(), 2);
        assert_eq!(ExitCode::ConfigError.as_u8(), 3);
    }

    #[test]
    fn exit_code_display() {
        let display = ExitCode::Pass.to_string();
        assert!(display.contains('0'));
        assert!(display.contains("no findings"));

        let display = ExitCode::FindingsAtOrAbove.to_string();
        assert!(display.contains('1'));
        assert!(display.contains("failure threshold"));

        let display = ExitCode::ConfigError.to_string();
        assert!(display.contains('3'));
        assert!(display.contains("configuration error"));
    }

    #[test]
    fn all_codes_are_distinct() {
        let mut values: Vec<u8> = ExitCode::all().iter().map(|c| c.as_u8()).collect();
        values.dedup();
        assert_eq!(values.len(), 4);
    }

    #[test]
    fn config_failures_map_to_config_exit() {
        let err = CoreError::Config("bad yaml".to_string());
        assert_eq!(ExitCode::for_error(&err), ExitCode::ConfigError);

        let err = CoreError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(ExitCode::for_error(&err), ExitCode::EngineError);
    }
}
