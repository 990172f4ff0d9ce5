//! Error types for the tally-analysis crate.
//!
//! Three failure families cross the public API:
//! - [`ParseError`] -- a source unit could not be turned into a tree at all.
//! - [`ApplyError`] -- a fix proposal no longer matches the text it is applied to.
//! - [`ConfigError`] -- the engine configuration is malformed.
//!
//! [`AnalysisError`] covers internal construction failures (finding builder,
//! line ranges) that never escape a scan.

use tally_lang::LangError;

// ---------------------------------------------------------------------------
// ParseError
// ---------------------------------------------------------------------------

/// Unrecoverable failure to tokenize a source unit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot parse source at byte {offset}: {message}")]
pub struct ParseError {
    /// Byte offset of the offending input.
    pub offset: usize,
    /// Human-readable reason.
    pub message: String,
}

impl ParseError {
    /// Creates a new parse error at `offset`.
    #[must_use]
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

impl From<LangError> for ParseError {
    fn from(err: LangError) -> Self {
        Self::new(0, err.to_string())
    }
}

// ---------------------------------------------------------------------------
// ApplyError
// ---------------------------------------------------------------------------

/// A fix proposal could not be applied to the given text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    /// The text at the proposal's span no longer matches the scanned snapshot
    /// and the snapshot could not be relocated unambiguously.
    #[error("fix is stale: expected {expected:?} at bytes {start}..{end}; re-scan before applying")]
    Stale {
        /// Span start recorded at scan time.
        start: usize,
        /// Span end recorded at scan time.
        end: usize,
        /// Original text recorded at scan time.
        expected: String,
    },

    /// The proposal's span lies outside the text or splits a character.
    #[error("fix span {start}..{end} is out of range for text of {len} bytes")]
    OutOfRange {
        /// Span start.
        start: usize,
        /// Span end.
        end: usize,
        /// Length of the text the fix was applied to.
        len: usize,
    },

    /// Two proposals in one batch touch overlapping spans.
    #[error("fixes overlap at bytes {start}..{end}")]
    Overlap {
        /// Start of the second, overlapping proposal.
        start: usize,
        /// End of the second, overlapping proposal.
        end: usize,
    },
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Malformed engine configuration. Surfaced before any scanning begins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A field holds a value outside its allowed domain.
    #[error("invalid configuration value for `{field}`: {reason}")]
    Invalid {
        /// Dotted path to the offending field.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The configuration document could not be deserialized.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AnalysisError
// ---------------------------------------------------------------------------

/// Internal error type for finding construction.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// An invalid line range was specified.
    #[error("invalid line range: {0}")]
    InvalidLineRange(String),

    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(String),
}

/// Convenience alias for `Result<T, AnalysisError>`.
pub type AnalysisResult<T> = Result<T, AnalysisError>;
