//! Detector registry.
//!
//! Every detector implements [`Detector`] and sees the same read-only inputs:
//! the parsed [`SourceUnit`], its [`Bindings`] and the process [`Config`].
//! Detectors are independent of each other; [`DetectorRegistry::run`] runs
//! each one under `catch_unwind` so a defect in one detector becomes a
//! [`FindingCategory::DetectorFault`] notice instead of aborting the scan.

mod common;
mod credentials;
mod loops;
mod models;
mod tokens;
mod tracking;

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, error, warn};

use crate::binder::Bindings;
use crate::config::Config;
use crate::finding::{Finding, FindingBuilder, FindingCategory, Span};
use crate::source::SourceUnit;
use crate::syntax::Site;

pub use credentials::CredentialDetector;
pub use loops::{LoopInvocationDetector, UnbatchedCallDetector};
pub use models::ExpensiveModelDetector;
pub use tokens::TokenLimitDetector;
pub use tracking::{StreamingUsageDetector, UsageTrackingDetector};

// ---------------------------------------------------------------------------
// Detector trait
// ---------------------------------------------------------------------------

/// One independent finding producer.
pub trait Detector: Send + Sync {
    /// Stable identifier used in logs and fault notices.
    fn id(&self) -> &'static str;

    /// Findings for `unit`. Must not fail; unresolvable inputs produce no
    /// findings.
    fn detect(&self, unit: &SourceUnit, bindings: &Bindings, config: &Config) -> Vec<Finding>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Ordered set of detectors.
pub struct DetectorRegistry {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
        }
    }

    /// Registry with every built-in detector.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CredentialDetector));
        registry.register(Box::new(ExpensiveModelDetector));
        registry.register(Box::new(TokenLimitDetector));
        registry.register(Box::new(LoopInvocationDetector));
        registry.register(Box::new(UnbatchedCallDetector));
        registry.register(Box::new(UsageTrackingDetector));
        registry.register(Box::new(StreamingUsageDetector));
        registry
    }

    /// Appends a detector.
    pub fn register(&mut self, detector: Box<dyn Detector>) {
        self.detectors.push(detector);
    }

    /// Identifiers of the registered detectors, in run order.
    #[must_use]
    pub fn ids(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.id()).collect()
    }

    /// Number of registered detectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    /// `true` when no detector is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Runs every detector against `unit`.
    ///
    /// A detector that panics contributes a single `DetectorFault` notice;
    /// the findings of the other detectors are unaffected.
    #[must_use]
    pub fn run(&self, unit: &SourceUnit, bindings: &Bindings, config: &Config) -> Vec<Finding> {
        let mut findings = Vec::new();
        for detector in &self.detectors {
            let result = catch_unwind(AssertUnwindSafe(|| detector.detect(unit, bindings, config)));
            match result {
                Ok(found) => {
                    debug!(
                        detector = detector.id(),
                        path = unit.path(),
                        findings = found.len(),
                        "detector finished"
                    );
                    findings.extend(found);
                }
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    error!(
                        detector = detector.id(),
                        path = unit.path(),
                        reason = %reason,
                        "detector panicked during detection"
                    );
                    if let Some(notice) = fault_notice(unit, detector.id(), &reason) {
                        findings.push(notice);
                    }
                }
            }
        }
        findings
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn fault_notice(unit: &SourceUnit, detector: &str, reason: &str) -> Option<Finding> {
    let span = Span::new(0, 0);
    let builder = finding_at(unit, FindingCategory::DetectorFault, span, None)
        .message(format!(
            "detector `{detector}` failed on this file; its findings are missing"
        ))
        .note(reason.to_string())
        .subject(detector)
        .meta("detector", serde_json::Value::from(detector));
    build(builder, detector)
}

// ---------------------------------------------------------------------------
// Shared finding helpers
// ---------------------------------------------------------------------------

/// Builder pre-filled with the location fields of `span` in `unit`.
pub(crate) fn finding_at(
    unit: &SourceUnit,
    category: FindingCategory,
    span: Span,
    site: Option<&Site>,
) -> FindingBuilder {
    let mut builder = FindingBuilder::new()
        .category(category)
        .file_path(unit.path())
        .span(span)
        .line_range(unit.line_range(span))
        .snippet(unit.snippet(span));
    if let Some(site) = site {
        builder = builder.scope(site.scope_kind());
    }
    builder
}

/// Builds `builder`, logging and dropping the finding on failure.
pub(crate) fn build(builder: FindingBuilder, detector: &str) -> Option<Finding> {
    match builder.build() {
        Ok(finding) => Some(finding),
        Err(e) => {
            warn!(detector, error = %e, "failed to build finding");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Panicking;

    impl Detector for Panicking {
        fn id(&self) -> &'static str {
            "panicking"
        }

        fn detect(&self, _: &SourceUnit, _: &Bindings, _: &Config) -> Vec<Finding> {
            panic!("index out of bounds");
        }
    }

    #[test]
    fn default_registry_has_every_detector() {
        let registry = DetectorRegistry::with_defaults();
        assert_eq!(registry.len(), 7);
        assert!(registry.ids().contains(&"credentials"));
    }

    #[test]
    fn panicking_detector_becomes_fault_notice() {
        let src = "from openai import OpenAI\nclient = OpenAI(api_key='sk-test123456789012345678901234567890')\n";
        let unit = SourceUnit::parse(src, "app.py").unwrap();
        let config = Config::default();
        let bindings = Bindings::bind(&unit, &config);

        let mut registry = DetectorRegistry::new();
        registry.register(Box::new(Panicking));
        registry.register(Box::new(CredentialDetector));
        let findings = registry.run(&unit, &bindings, &config);

        let fault = findings
            .iter()
            .find(|f| f.category == FindingCategory::DetectorFault)
            .unwrap();
        assert!(fault.message.contains("panicking"));
        assert_eq!(fault.notes, ["index out of bounds"]);
        assert!(findings
            .iter()
            .any(|f| f.category == FindingCategory::HardcodedCredential));
    }
}
