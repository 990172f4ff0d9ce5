//! Single-file scan pipeline.
//!
//! parse -> bind -> detectors -> severity scaling -> classify -> fix proposal.
//! A scan owns everything it creates; nothing outlives the returned
//! [`ScanResult`] and no state is shared between files.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::binder::Bindings;
use crate::classify::classify;
use crate::config::Config;
use crate::detectors::{build, finding_at, DetectorRegistry};
use crate::error::{ApplyError, ParseError};
use crate::finding::{Finding, FindingBuilder, FindingCategory, LineRange, Span};
use crate::fix::{self, FixProposal};
use crate::providers::Provider;
use crate::severity;
use crate::source::SourceUnit;

/// Findings of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Path as given to the scan.
    pub file_path: String,
    /// Classified findings, ordered by offset.
    pub findings: Vec<Finding>,
    /// `false` when the file could not be parsed at all.
    pub parse_ok: bool,
    /// Providers the file imports, in declaration order of [`Provider`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<Provider>,
}

impl ScanResult {
    /// Findings of `category`.
    pub fn of_category(&self, category: FindingCategory) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.category == category)
    }

    /// `true` when the file imports any provider SDK.
    #[must_use]
    pub fn uses_llm(&self) -> bool {
        !self.providers.is_empty()
    }

    /// `true` when any detector found provider usage worth reporting.
    #[must_use]
    pub fn has_findings(&self) -> bool {
        self.findings.iter().any(|f| !f.category.is_engine_notice())
    }
}

/// Scans `text` with the built-in detectors.
#[must_use]
pub fn scan(text: &str, path: &str, config: &Config) -> ScanResult {
    scan_with(&DetectorRegistry::with_defaults(), text, path, config)
}

/// Scans `text` with the detectors of `registry`.
#[must_use]
pub fn scan_with(registry: &DetectorRegistry, text: &str, path: &str, config: &Config) -> ScanResult {
    let unit = match SourceUnit::parse(text, path) {
        Ok(unit) => unit,
        Err(err) => {
            warn!(path, error = %err, "skipping unparsable file");
            return ScanResult {
                file_path: path.to_string(),
                findings: unparsable_file(text, path, &err).into_iter().collect(),
                parse_ok: false,
                providers: Vec::new(),
            };
        }
    };

    let mut findings = error_regions(&unit);
    let bindings = Bindings::bind(&unit, config);
    findings.extend(registry.run(&unit, &bindings, config));

    let findings = classify(severity::scale(findings))
        .into_iter()
        .map(|finding| attach_fix(finding, &unit, &bindings, config))
        .collect::<Vec<_>>();

    debug!(
        path,
        findings = findings.len(),
        fixable = findings.iter().filter(|f| f.fixable).count(),
        "scanned file"
    );
    ScanResult {
        file_path: path.to_string(),
        findings,
        parse_ok: true,
        providers: bindings.providers().into_iter().collect(),
    }
}

fn attach_fix(finding: Finding, unit: &SourceUnit, bindings: &Bindings, config: &Config) -> Finding {
    if !finding.category.fixable_by_design() {
        return finding;
    }
    match fix::propose(&finding, unit, bindings, config) {
        Some(proposal) if proposal.safe => finding.with_fix(Some(proposal), true),
        _ => finding.with_fix(None, false),
    }
}

fn error_regions(unit: &SourceUnit) -> Vec<Finding> {
    unit.syntax()
        .error_regions
        .iter()
        .filter_map(|span| {
            let builder = finding_at(unit, FindingCategory::UnparsableSource, *span, None)
                .message("source region could not be parsed; it was skipped")
                .meta("region", serde_json::json!([span.start, span.end]));
            build(builder, "parser")
        })
        .collect()
}

fn unparsable_file(text: &str, path: &str, err: &ParseError) -> Option<Finding> {
    let offset = err.offset.min(text.len());
    let line_start = text.get(..offset).and_then(|t| t.rfind('\n')).map_or(0, |i| i + 1);
    let line_end = text
        .get(offset..)
        .and_then(|t| t.find('\n'))
        .map_or(text.len(), |i| offset + i);
    let line = text.get(..offset).map_or(0, |t| t.matches('\n').count());
    let line = u32::try_from(line + 1).unwrap_or(u32::MAX);
    let col = u32::try_from(offset - line_start + 1).unwrap_or(u32::MAX);
    let line_range = LineRange::new(line, col, line, col).ok()?;

    let builder = FindingBuilder::new()
        .category(FindingCategory::UnparsableSource)
        .file_path(path)
        .span(Span::new(offset, offset))
        .line_range(line_range)
        .snippet(text.get(line_start..line_end).unwrap_or_default())
        .message(format!("file could not be parsed and was not analyzed: {}", err.message));
    build(builder, "parser")
}

// ---------------------------------------------------------------------------
// Fixes
// ---------------------------------------------------------------------------

/// Safe fix proposals of `result`, deduplicated, in finding order. A proposal
/// overlapping an earlier one is dropped.
#[must_use]
pub fn propose_fixes(result: &ScanResult) -> Vec<FixProposal> {
    let mut accepted: Vec<FixProposal> = Vec::new();
    for proposal in result.findings.iter().filter_map(|f| f.fix.as_ref()).filter(|p| p.safe) {
        if accepted.contains(proposal) {
            continue;
        }
        if accepted.iter().any(|p| p.span.overlaps(proposal.span)) {
            debug!(
                start = proposal.span.start,
                end = proposal.span.end,
                "dropping overlapping fix"
            );
            continue;
        }
        accepted.push(proposal.clone());
    }
    accepted
}

/// Applies one proposal to `text`. See [`fix::apply_fix`].
///
/// # Errors
///
/// Returns [`ApplyError`] when the proposal no longer matches `text`.
pub fn apply_fix(text: &str, proposal: &FixProposal) -> Result<String, ApplyError> {
    fix::apply_fix(text, proposal)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::Bindings;
    use crate::detectors::Detector;
    use crate::finding::Severity;

    const KEY: &str = "sk-test123456789012345678901234567890";

    #[test]
    fn scenario_a_single_literal() {
        let src = format!("client = OpenAI(api_key=\"{KEY}\")\n");
        let result = scan(&src, "app.py", &Config::default());
        assert!(result.parse_ok);
        let creds: Vec<_> = result.of_category(FindingCategory::HardcodedCredential).collect();
        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0].severity, Severity::Critical);
        assert_eq!(&src[creds[0].span.start..creds[0].span.end], format!("\"{KEY}\""));
        assert!(!creds[0].fixable, "no os binding to read the environment with");
        assert!(!result.uses_llm(), "the constructor is never imported");
    }

    #[test]
    fn providers_are_collected_from_imports() {
        let src = "import os\nimport anthropic\nfrom openai import OpenAI\n";
        let result = scan(src, "app.py", &Config::default());
        assert_eq!(result.providers, vec![crate::Provider::OpenAi, crate::Provider::Anthropic]);
        assert!(result.uses_llm());
    }

    #[test]
    fn error_region_is_reported_and_rest_analyzed() {
        let src = format!("import os\nfrom openai import OpenAI\nc = OpenAI(api_key='{KEY}')\n\ndef broken(:\n    pass\n");
        let result = scan(&src, "app.py", &Config::default());
        assert!(result.parse_ok);
        assert!(result.of_category(FindingCategory::UnparsableSource).count() >= 1);
        assert_eq!(result.of_category(FindingCategory::HardcodedCredential).count(), 1);
    }

    #[test]
    fn nul_byte_is_a_file_level_notice() {
        let result = scan("import openai\n\0\n", "app.py", &Config::default());
        assert!(!result.parse_ok);
        assert_eq!(result.findings.len(), 1);
        let notice = &result.findings[0];
        assert_eq!(notice.category, FindingCategory::UnparsableSource);
        assert_eq!(notice.line_range.start_line, 2);
        assert_eq!(notice.severity, Severity::Info);
    }

    #[test]
    fn fixable_findings_carry_safe_fixes() {
        let src = format!("import os\nfrom openai import OpenAI\nc = OpenAI(api_key='{KEY}')\n");
        let result = scan(&src, "app.py", &Config::default());
        let cred = result.of_category(FindingCategory::HardcodedCredential).next().unwrap();
        assert!(cred.fixable);
        assert_eq!(cred.fix.as_ref().unwrap().replacement, "os.getenv('OPENAI_API_KEY')");
        let tracking = result.of_category(FindingCategory::MissingUsageTracking).next().unwrap();
        assert!(tracking.fixable);
    }

    #[test]
    fn proposals_are_deduplicated() {
        let src = "from openai import OpenAI\na = OpenAI()\nb = OpenAI()\n";
        let result = scan(src, "app.py", &Config::default());
        assert_eq!(result.of_category(FindingCategory::MissingUsageTracking).count(), 2);
        let proposals = propose_fixes(&result);
        assert_eq!(proposals.len(), 1);
        let fixed = apply_fix(src, &proposals[0]).unwrap();
        assert!(scan(&fixed, "app.py", &Config::default())
            .of_category(FindingCategory::MissingUsageTracking)
            .next()
            .is_none());
    }

    struct Exploding;

    impl Detector for Exploding {
        fn id(&self) -> &'static str {
            "exploding"
        }

        fn detect(&self, _: &SourceUnit, _: &Bindings, _: &Config) -> Vec<Finding> {
            panic!("boom")
        }
    }

    #[test]
    fn panicking_detector_leaves_other_findings() {
        let mut registry = DetectorRegistry::with_defaults();
        registry.register(Box::new(Exploding));
        let src = format!("client = OpenAI(api_key=\"{KEY}\")\n");
        let result = scan_with(&registry, &src, "app.py", &Config::default());
        assert_eq!(result.of_category(FindingCategory::DetectorFault).count(), 1);
        assert_eq!(result.of_category(FindingCategory::HardcodedCredential).count(), 1);
    }
}
