//! Finding model for tally scan results.
//!
//! This module defines:
//! - [`Span`] -- a half-open byte range into a source unit.
//! - [`LineRange`] -- a validated 1-indexed line/column range for display.
//! - [`Severity`] and [`FindingCategory`] -- the closed classification model.
//! - [`Finding`] -- one reported issue with a content-based fingerprint.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AnalysisError, AnalysisResult};
use crate::fix::FixProposal;
use crate::syntax::ScopeKind;

// ---------------------------------------------------------------------------
// Span
// ---------------------------------------------------------------------------

/// Half-open byte range `start..end` into the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    /// Inclusive start byte offset.
    pub start: usize,
    /// Exclusive end byte offset.
    pub end: usize,
}

impl Span {
    /// Creates a span, swapping the bounds if they are reversed.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    /// Span covering a tree-sitter node.
    #[must_use]
    pub fn of(node: &tree_sitter::Node<'_>) -> Self {
        Self::new(node.start_byte(), node.end_byte())
    }

    /// Length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns `true` for a zero-width span.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns `true` if `other` lies entirely within `self`.
    #[must_use]
    pub const fn contains(&self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Returns `true` if the two spans share at least one byte.
    #[must_use]
    pub const fn overlaps(&self, other: Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

// ---------------------------------------------------------------------------
// LineRange
// ---------------------------------------------------------------------------

/// A 1-indexed source line and column range.
///
/// Invariants enforced at construction:
/// - `start_line >= 1` and `end_line >= 1`
/// - `start_line <= end_line`
/// - If `start_line == end_line`, then `start_col <= end_col`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineRange {
    /// 1-indexed start line.
    pub start_line: u32,
    /// 1-indexed start column (bytes).
    pub start_col: u32,
    /// 1-indexed end line.
    pub end_line: u32,
    /// 1-indexed end column (bytes).
    pub end_col: u32,
}

impl LineRange {
    /// Creates a new `LineRange` after validating the invariants.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidLineRange`] if validation fails.
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> AnalysisResult<Self> {
        let range = Self {
            start_line,
            start_col,
            end_line,
            end_col,
        };
        range.validate()?;
        Ok(range)
    }

    /// Validates that the line range invariants hold.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidLineRange`] when a line is zero or the
    /// end precedes the start.
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.start_line == 0 || self.end_line == 0 {
            return Err(AnalysisError::InvalidLineRange(
                "lines are 1-indexed".to_string(),
            ));
        }
        if self.start_line > self.end_line {
            return Err(AnalysisError::InvalidLineRange(format!(
                "start_line ({}) must be <= end_line ({})",
                self.start_line, self.end_line
            )));
        }
        if self.start_line == self.end_line && self.start_col > self.end_col {
            return Err(AnalysisError::InvalidLineRange(format!(
                "on line {}, start_col ({}) must be <= end_col ({})",
                self.start_line, self.start_col, self.end_col
            )));
        }
        Ok(())
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start_line, self.start_col, self.end_line, self.end_col
        )
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Severity of a finding.
///
/// Variants are declared from most to least severe, so the derived `Ord`
/// sorts critical findings first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Ships a secret or otherwise demands immediate action.
    Critical,
    /// Likely large, uncontrolled spend.
    High,
    /// Cost or hygiene issue worth addressing.
    Medium,
    /// Minor issue.
    Low,
    /// Advisory only; no risk on its own.
    Info,
}

impl Severity {
    /// Numeric rank, 0 for `Info` up to 4 for `Critical`.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Info => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }

    const fn from_rank(rank: u8) -> Self {
        match rank {
            0 => Self::Info,
            1 => Self::Low,
            2 => Self::Medium,
            3 => Self::High,
            _ => Self::Critical,
        }
    }

    /// Raises the severity by `steps`, capped at [`Severity::Critical`].
    #[must_use]
    pub const fn raised(self, steps: u8) -> Self {
        Self::from_rank(self.rank().saturating_add(steps))
    }

    /// The more severe of `self` and `other`.
    #[must_use]
    pub const fn max_with(self, other: Self) -> Self {
        if other.rank() > self.rank() { other } else { self }
    }

    /// `true` if `self` is at least as severe as `threshold`.
    #[must_use]
    pub const fn at_least(self, threshold: Self) -> bool {
        self.rank() >= threshold.rank()
    }

    /// All severities, most severe first.
    #[must_use]
    pub const fn all() -> &'static [Severity] {
        &[Self::Critical, Self::High, Self::Medium, Self::Low, Self::Info]
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            "info" | "informational" => Ok(Self::Info),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// FindingCategory
// ---------------------------------------------------------------------------

/// Closed set of finding categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FindingCategory {
    /// Provider key literal passed to a credential parameter.
    HardcodedCredential,
    /// Provider key literal used as the default of an environment lookup.
    HardcodedCredentialFallback,
    /// Flagship-tier model selected by literal.
    ExpensiveModelSelection,
    /// Completion call without a max-output-token argument.
    MissingTokenLimit,
    /// Token limit above the configured threshold.
    ExcessiveTokenLimit,
    /// Provider invocation inside a loop with a large or unknown bound.
    UnboundedLoopInvocation,
    /// Per-element embedding/completion calls where a batch overload exists.
    UnbatchedEmbeddingOrCompletion,
    /// Provider entry point used without its metering wrapper.
    MissingUsageTracking,
    /// Streaming completion that never reports usage.
    StreamingWithoutUsage,
    /// Region of the file that could not be parsed.
    UnparsableSource,
    /// A detector failed internally; its coverage is missing for this file.
    DetectorFault,
    /// The per-file time budget expired before analysis finished.
    ScanTimeout,
}

impl FindingCategory {
    /// Every category, in declaration order.
    #[must_use]
    pub const fn all() -> &'static [FindingCategory] {
        &[
            Self::HardcodedCredential,
            Self::HardcodedCredentialFallback,
            Self::ExpensiveModelSelection,
            Self::MissingTokenLimit,
            Self::ExcessiveTokenLimit,
            Self::UnboundedLoopInvocation,
            Self::UnbatchedEmbeddingOrCompletion,
            Self::MissingUsageTracking,
            Self::StreamingWithoutUsage,
            Self::UnparsableSource,
            Self::DetectorFault,
            Self::ScanTimeout,
        ]
    }

    /// Severity before any scaling.
    #[must_use]
    pub const fn base_severity(self) -> Severity {
        match self {
            Self::HardcodedCredential | Self::HardcodedCredentialFallback => Severity::Critical,
            Self::UnboundedLoopInvocation => Severity::High,
            Self::ExpensiveModelSelection
            | Self::MissingTokenLimit
            | Self::ExcessiveTokenLimit
            | Self::UnbatchedEmbeddingOrCompletion => Severity::Medium,
            Self::MissingUsageTracking | Self::StreamingWithoutUsage => Severity::Low,
            Self::UnparsableSource | Self::DetectorFault | Self::ScanTimeout => Severity::Info,
        }
    }

    /// Rule identifier in the format `tally/{group}/{name}`.
    #[must_use]
    pub const fn rule_id(self) -> &'static str {
        match self {
            Self::HardcodedCredential => "tally/credentials/hardcoded-credential",
            Self::HardcodedCredentialFallback => "tally/credentials/hardcoded-fallback",
            Self::ExpensiveModelSelection => "tally/cost/expensive-model",
            Self::MissingTokenLimit => "tally/cost/missing-token-limit",
            Self::ExcessiveTokenLimit => "tally/cost/excessive-token-limit",
            Self::UnboundedLoopInvocation => "tally/cost/unbounded-loop",
            Self::UnbatchedEmbeddingOrCompletion => "tally/cost/unbatched-calls",
            Self::MissingUsageTracking => "tally/tracking/missing-usage-tracking",
            Self::StreamingWithoutUsage => "tally/tracking/streaming-without-usage",
            Self::UnparsableSource => "tally/engine/unparsable-source",
            Self::DetectorFault => "tally/engine/detector-fault",
            Self::ScanTimeout => "tally/engine/scan-timeout",
        }
    }

    /// Whether findings of this category may carry an automated fix.
    #[must_use]
    pub const fn fixable_by_design(self) -> bool {
        matches!(
            self,
            Self::HardcodedCredential | Self::HardcodedCredentialFallback | Self::MissingUsageTracking
        )
    }

    /// Whether this category describes the engine rather than the code.
    #[must_use]
    pub const fn is_engine_notice(self) -> bool {
        matches!(self, Self::UnparsableSource | Self::DetectorFault | Self::ScanTimeout)
    }
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::str::FromStr for FindingCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s.chars().filter(|c| *c != '-' && *c != '_').collect();
        Self::all()
            .iter()
            .copied()
            .find(|c| c.to_string().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| format!("unknown finding category '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Finding
// ---------------------------------------------------------------------------

/// Maximum number of lines kept in a snippet.
const MAX_SNIPPET_LINES: usize = 10;

/// A single issue reported by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// SHA-256 hex digest of `rule_id + file_path + normalized snippet`.
    pub fingerprint: String,

    /// Rule identifier derived from the category.
    pub rule_id: String,

    /// Finding category.
    pub category: FindingCategory,

    /// Severity after scaling.
    pub severity: Severity,

    /// File path using forward slashes, no leading `./`.
    pub file_path: String,

    /// Primary byte span.
    pub span: Span,

    /// 1-indexed location of [`Finding::span`].
    pub line_range: LineRange,

    /// Source text of the span (at most ten lines).
    pub snippet: String,

    /// Human-readable message.
    pub message: String,

    /// Distinct rationale notes, merged on dedup.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,

    /// Whether an automated fix exists for this finding.
    pub fixable: bool,

    /// The safe fix, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<FixProposal>,

    /// Scope the finding was observed in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeKind>,

    /// What the finding is about (literal value, model, symbol); groups
    /// repeated findings for severity scaling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Extensible metadata (deterministic ordering via `BTreeMap`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Finding {
    /// Computes the content-based fingerprint.
    #[must_use]
    pub fn compute_fingerprint(rule_id: &str, file_path: &str, snippet: &str) -> String {
        let normalized = normalize_snippet(snippet);
        let mut hasher = Sha256::new();
        hasher.update(rule_id.as_bytes());
        hasher.update(file_path.as_bytes());
        hasher.update(normalized.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Returns a copy of this finding with a different severity.
    #[must_use]
    pub fn with_severity(&self, severity: Severity) -> Self {
        Self {
            severity,
            ..self.clone()
        }
    }

    /// Returns a copy of this finding with its fix replaced.
    #[must_use]
    pub fn with_fix(&self, fix: Option<FixProposal>, fixable: bool) -> Self {
        Self {
            fix,
            fixable,
            ..self.clone()
        }
    }
}

fn normalize_snippet(snippet: &str) -> String {
    snippet
        .replace("\r\n", "\n")
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn normalize_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    normalized
        .strip_prefix("./")
        .unwrap_or(&normalized)
        .to_string()
}

fn clip_snippet(snippet: &str) -> String {
    snippet
        .lines()
        .take(MAX_SNIPPET_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ordering: `(file_path, span.start, severity desc, category, span.end)`.
impl Ord for Finding {
    fn cmp(&self, other: &Self) -> Ordering {
        self.file_path
            .cmp(&other.file_path)
            .then_with(|| self.span.start.cmp(&other.span.start))
            .then_with(|| self.severity.cmp(&other.severity))
            .then_with(|| self.category.cmp(&other.category))
            .then_with(|| self.span.end.cmp(&other.span.end))
    }
}

impl PartialOrd for Finding {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}:{} -- {}",
            self.severity, self.category, self.file_path, self.line_range, self.message
        )
    }
}

// ---------------------------------------------------------------------------
// FindingBuilder
// ---------------------------------------------------------------------------

/// Builder for [`Finding`] values.
///
/// `category`, `file_path`, `span`, `line_range`, `snippet` and `message` are
/// required. Severity defaults to the category baseline.
#[derive(Debug, Default)]
pub struct FindingBuilder {
    category: Option<FindingCategory>,
    severity: Option<Severity>,
    file_path: Option<String>,
    span: Option<Span>,
    line_range: Option<LineRange>,
    snippet: Option<String>,
    message: Option<String>,
    notes: Vec<String>,
    scope: Option<ScopeKind>,
    subject: Option<String>,
    metadata: BTreeMap<String, serde_json::Value>,
}

impl FindingBuilder {
    /// Creates a new empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the category.
    #[must_use]
    pub fn category(mut self, category: FindingCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Overrides the baseline severity.
    #[must_use]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Sets the file path.
    #[must_use]
    pub fn file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    /// Sets the byte span.
    #[must_use]
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Sets the line range.
    #[must_use]
    pub fn line_range(mut self, line_range: LineRange) -> Self {
        self.line_range = Some(line_range);
        self
    }

    /// Sets the snippet.
    #[must_use]
    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    /// Sets the message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Appends a rationale note.
    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Sets the observed scope.
    #[must_use]
    pub fn scope(mut self, scope: ScopeKind) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Sets the grouping subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Inserts a metadata key-value pair.
    #[must_use]
    pub fn meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Builds the [`Finding`].
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::MissingField`] if a required field is unset and
    /// [`AnalysisError::InvalidLineRange`] if the line range is invalid.
    pub fn build(self) -> AnalysisResult<Finding> {
        let category = self
            .category
            .ok_or_else(|| AnalysisError::MissingField("category".to_string()))?;
        let file_path = self
            .file_path
            .ok_or_else(|| AnalysisError::MissingField("file_path".to_string()))?;
        let span = self
            .span
            .ok_or_else(|| AnalysisError::MissingField("span".to_string()))?;
        let line_range = self
            .line_range
            .ok_or_else(|| AnalysisError::MissingField("line_range".to_string()))?;
        let snippet = self
            .snippet
            .ok_or_else(|| AnalysisError::MissingField("snippet".to_string()))?;
        let message = self
            .message
            .filter(|m| !m.is_empty())
            .ok_or_else(|| AnalysisError::MissingField("message".to_string()))?;
        line_range.validate()?;

        let file_path = normalize_path(&file_path);
        let snippet = clip_snippet(&snippet);
        let rule_id = category.rule_id().to_string();
        let fingerprint = Finding::compute_fingerprint(&rule_id, &file_path, &snippet);

        Ok(Finding {
            fingerprint,
            rule_id,
            category,
            severity: self.severity.unwrap_or_else(|| category.base_severity()),
            file_path,
            span,
            line_range,
            snippet,
            message,
            notes: self.notes,
            fixable: false,
            fix: None,
            scope: self.scope,
            subject: self.subject,
            metadata: self.metadata,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_finding() -> Finding {
        FindingBuilder::new()
            .category(FindingCategory::HardcodedCredential)
            .file_path("./src\\agent.py")
            .span(Span::new(24, 62))
            .line_range(LineRange::new(2, 24, 2, 62).unwrap())
            .snippet("client = OpenAI(api_key=\"sk-test\")")
            .message("hardcoded OpenAI key")
            .build()
            .unwrap()
    }

    // -- Span --------------------------------------------------------------

    #[test]
    fn span_new_orders_bounds() {
        assert_eq!(Span::new(9, 3), Span::new(3, 9));
        assert_eq!(Span::new(3, 9).len(), 6);
        assert!(Span::new(4, 4).is_empty());
    }

    #[test]
    fn span_overlap_and_containment() {
        let outer = Span::new(0, 10);
        assert!(outer.contains(Span::new(2, 5)));
        assert!(!outer.contains(Span::new(8, 12)));
        assert!(outer.overlaps(Span::new(8, 12)));
        assert!(!outer.overlaps(Span::new(10, 12)), "half-open spans may touch");
    }

    // -- LineRange ---------------------------------------------------------

    #[test]
    fn line_range_rejects_zero_and_reversed() {
        assert!(LineRange::new(0, 1, 1, 1).is_err());
        assert!(LineRange::new(3, 1, 2, 1).is_err());
        assert!(LineRange::new(2, 9, 2, 3).is_err());
        assert!(LineRange::new(2, 3, 2, 3).is_ok());
    }

    // -- Severity ----------------------------------------------------------

    #[test]
    fn severity_raise_is_capped() {
        assert_eq!(Severity::Medium.raised(1), Severity::High);
        assert_eq!(Severity::Medium.raised(2), Severity::Critical);
        assert_eq!(Severity::High.raised(5), Severity::Critical);
        assert_eq!(Severity::Critical.raised(1), Severity::Critical);
    }

    #[test]
    fn severity_ordering_puts_critical_first() {
        let mut all = vec![Severity::Low, Severity::Critical, Severity::Info, Severity::High];
        all.sort();
        assert_eq!(all, vec![Severity::Critical, Severity::High, Severity::Low, Severity::Info]);
        assert_eq!(Severity::Low.max_with(Severity::High), Severity::High);
        assert!(Severity::High.at_least(Severity::Medium));
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<Severity>(), Ok(Severity::High));
        assert_eq!("informational".parse::<Severity>(), Ok(Severity::Info));
        assert!("urgent".parse::<Severity>().is_err());
    }

    // -- FindingCategory ---------------------------------------------------

    #[test]
    fn category_baselines() {
        assert_eq!(FindingCategory::HardcodedCredential.base_severity(), Severity::Critical);
        assert_eq!(FindingCategory::UnboundedLoopInvocation.base_severity(), Severity::High);
        assert_eq!(FindingCategory::MissingUsageTracking.base_severity(), Severity::Low);
        assert_eq!(FindingCategory::UnparsableSource.base_severity(), Severity::Info);
    }

    #[test]
    fn category_parses_kebab_and_pascal() {
        assert_eq!(
            "missing-token-limit".parse::<FindingCategory>(),
            Ok(FindingCategory::MissingTokenLimit)
        );
        assert_eq!(
            "HardcodedCredential".parse::<FindingCategory>(),
            Ok(FindingCategory::HardcodedCredential)
        );
        assert!("sql-injection".parse::<FindingCategory>().is_err());
    }

    #[test]
    fn only_credential_and_tracking_categories_are_fixable() {
        let fixable: Vec<_> = FindingCategory::all()
            .iter()
            .filter(|c| c.fixable_by_design())
            .collect();
        assert_eq!(fixable.len(), 3);
    }

    // -- Finding -----------------------------------------------------------

    #[test]
    fn builder_normalizes_path_and_defaults_severity() {
        let finding = sample_finding();
        assert_eq!(finding.file_path, "src/agent.py");
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.rule_id, "tally/credentials/hardcoded-credential");
        assert_eq!(finding.fingerprint.len(), 64);
        assert!(!finding.fixable);
    }

    #[test]
    fn builder_requires_message() {
        let err = FindingBuilder::new()
            .category(FindingCategory::MissingTokenLimit)
            .file_path("a.py")
            .span(Span::new(0, 1))
            .line_range(LineRange::new(1, 1, 1, 2).unwrap())
            .snippet("x")
            .build()
            .unwrap_err();
        assert!(matches!(err, AnalysisError::MissingField(ref f) if f == "message"));
    }

    #[test]
    fn fingerprint_ignores_indentation() {
        let a = Finding::compute_fingerprint("r", "a.py", "    x = 1\n");
        let b = Finding::compute_fingerprint("r", "a.py", "x = 1");
        assert_eq!(a, b);
    }

    #[test]
    fn ordering_is_position_then_severity() {
        let critical = sample_finding();
        let medium = FindingBuilder::new()
            .category(FindingCategory::ExpensiveModelSelection)
            .file_path("src/agent.py")
            .span(Span::new(24, 62))
            .line_range(LineRange::new(2, 24, 2, 62).unwrap())
            .snippet("x")
            .message("gpt-4")
            .build()
            .unwrap();
        let earlier = medium.with_severity(Severity::Low);
        let earlier = Finding {
            span: Span::new(1, 2),
            ..earlier
        };
        let mut list = vec![medium.clone(), critical.clone(), earlier.clone()];
        list.sort();
        assert_eq!(list, vec![earlier, critical, medium]);
    }
}
