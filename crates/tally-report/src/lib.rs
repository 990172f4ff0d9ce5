//! Tally Report -- output formatters and report generation.
//!
//! The primary format is the versioned tally JSON report ([`json`]), which
//! is deterministic and suitable for CI pipelines. [`text`] renders the same
//! report for terminals. Both are built from the [`summary`] computations.

pub mod json;
pub mod summary;
pub mod text;

use std::fmt;
use std::str::FromStr;

pub use json::{
    build_report, compute_config_hash, compute_findings_summary, compute_report_id, format_report, FindingsSummary,
    ReportOptions, ScanMetadata, TallyReport, ENGINE_VERSION, SCHEMA_VERSION,
};
pub use summary::{compute_onboarding, recommendations, OnboardingSummary, Recommendation};
pub use text::format_text;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while producing a report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// The report could not be serialized.
    #[error("report serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested output format does not exist.
    #[error("unknown output format '{0}' (expected json or text)")]
    UnknownFormat(String),
}

/// Convenience alias for `Result<T, ReportError>`.
pub type ReportResult<T> = Result<T, ReportError>;

// ---------------------------------------------------------------------------
// OutputFormat
// ---------------------------------------------------------------------------

/// Report output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    /// Versioned JSON report.
    #[default]
    Json,
    /// Human-readable terminal report.
    Text,
}

impl OutputFormat {
    /// Renders `report` in this format.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON encoding fails.
    pub fn render(self, report: &TallyReport) -> ReportResult<String> {
        match self {
            Self::Json => Ok(serde_json::to_string_pretty(report)?),
            Self::Text => Ok(format_text(report)),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "txt" => Ok(Self::Text),
            other => Err(ReportError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Text => "text",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_parses_names() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("TEXT".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        let err = "sarif".parse::<OutputFormat>().unwrap_err();
        assert!(err.to_string().contains("sarif"));
    }

    #[test]
    fn output_format_display_round_trips() {
        for format in [OutputFormat::Json, OutputFormat::Text] {
            assert_eq!(format.to_string().parse::<OutputFormat>().unwrap(), format);
        }
    }
}
