//! Severity scaling.
//!
//! Detectors assign base severities; [`scale`] then applies the file-level
//! adjustments. Steps are additive and capped at [`Severity::Critical`]:
//!
//! - +1 when the finding was observed at module scope (runs on import);
//! - +1 when three or more findings share its category and subject.
//!
//! Informational findings are never scaled.

use std::collections::HashMap;

use tracing::trace;

use crate::finding::{Finding, FindingCategory, Severity};
use crate::syntax::ScopeKind;

/// Findings with the same category and subject needed before they escalate.
pub const REPEAT_THRESHOLD: usize = 3;

/// Applies module-scope and repetition scaling to `findings`.
#[must_use]
pub fn scale(findings: Vec<Finding>) -> Vec<Finding> {
    let mut repeats: HashMap<(FindingCategory, &str), usize> = HashMap::new();
    for finding in &findings {
        if let Some(subject) = &finding.subject {
            *repeats.entry((finding.category, subject.as_str())).or_default() += 1;
        }
    }

    let steps: Vec<u8> = findings
        .iter()
        .map(|finding| {
            if finding.severity == Severity::Info {
                return 0;
            }
            let module = u8::from(finding.scope == Some(ScopeKind::Module));
            let repeated = finding
                .subject
                .as_deref()
                .and_then(|s| repeats.get(&(finding.category, s)))
                .is_some_and(|n| *n >= REPEAT_THRESHOLD);
            module + u8::from(repeated)
        })
        .collect();

    findings
        .into_iter()
        .zip(steps)
        .map(|(mut finding, steps)| {
            if steps > 0 {
                let raised = finding.severity.raised(steps);
                trace!(
                    category = %finding.category,
                    from = %finding.severity,
                    to = %raised,
                    "scaled finding severity"
                );
                finding.severity = raised;
            }
            finding
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{FindingBuilder, LineRange, Span};

    fn finding(category: FindingCategory, scope: ScopeKind, subject: &str, start: usize) -> Finding {
        FindingBuilder::new()
            .category(category)
            .file_path("a.py")
            .span(Span::new(start, start + 4))
            .line_range(LineRange::new(1, 1, 1, 5).unwrap())
            .snippet("call")
            .message("m")
            .scope(scope)
            .subject(subject)
            .build()
            .unwrap()
    }

    #[test]
    fn module_scope_raises_one_step() {
        let scaled = scale(vec![
            finding(FindingCategory::MissingTokenLimit, ScopeKind::Module, "a", 0),
            finding(FindingCategory::MissingTokenLimit, ScopeKind::Function, "b", 10),
        ]);
        assert_eq!(scaled[0].severity, Severity::High);
        assert_eq!(scaled[1].severity, Severity::Medium);
    }

    #[test]
    fn repetition_needs_three_of_a_kind() {
        let two: Vec<_> = (0..2)
            .map(|i| finding(FindingCategory::MissingUsageTracking, ScopeKind::Function, "openai.OpenAI", i * 10))
            .collect();
        assert!(scale(two).iter().all(|f| f.severity == Severity::Low));

        let three: Vec<_> = (0..3)
            .map(|i| finding(FindingCategory::MissingUsageTracking, ScopeKind::Function, "openai.OpenAI", i * 10))
            .collect();
        assert!(scale(three).iter().all(|f| f.severity == Severity::Medium));
    }

    #[test]
    fn steps_add_and_cap_at_critical() {
        let findings: Vec<_> = (0..3)
            .map(|i| finding(FindingCategory::MissingTokenLimit, ScopeKind::Module, "s", i * 10))
            .collect();
        assert!(scale(findings).iter().all(|f| f.severity == Severity::Critical));

        let secret = finding(FindingCategory::HardcodedCredential, ScopeKind::Module, "secret:1", 0);
        assert_eq!(scale(vec![secret])[0].severity, Severity::Critical);
    }

    #[test]
    fn informational_findings_stay_put() {
        let notice = finding(FindingCategory::UnparsableSource, ScopeKind::Module, "x", 0);
        assert_eq!(scale(vec![notice])[0].severity, Severity::Info);
    }
}
