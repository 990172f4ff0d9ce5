//! Tally JSON report v1.0.0.
//!
//! Produces a deterministic JSON report containing scan metadata, findings,
//! per-severity and per-category counts, the onboarding summary and
//! recommendations.
//!
//! # Determinism guarantees
//!
//! - Findings arrive pre-sorted by `(file_path, offset, severity, category)`.
//! - Maps use `BTreeMap` for stable key ordering.
//! - Wall-clock duration is omitted unless requested.
//! - The report ID is a SHA-256 digest of the target, engine version,
//!   configuration hash and the sorted finding fingerprints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use tally_analysis::{Finding, FindingCategory, Severity};
use tally_core::{ProjectScan, TallyConfig};

use crate::summary::{compute_onboarding, recommendations, OnboardingSummary, Recommendation};
use crate::ReportResult;

// ---------------------------------------------------------------------------
// Schema version
// ---------------------------------------------------------------------------

/// Current schema version of the tally JSON report.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Engine version taken from this crate's Cargo.toml.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// Report structs
// ---------------------------------------------------------------------------

/// Top-level tally JSON report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TallyReport {
    /// Schema version identifier (always `"1.0.0"`).
    pub schema_version: String,

    /// Metadata about the scan that produced this report.
    pub scan: ScanMetadata,

    /// All findings produced by the scan, in deterministic order.
    pub findings: Vec<Finding>,

    /// Counts by severity level.
    pub findings_count: FindingsSummary,

    /// Counts by category; categories without findings are omitted.
    pub category_counts: BTreeMap<FindingCategory, u32>,

    /// Project overview.
    pub summary: OnboardingSummary,

    /// Remediation steps, most severe first.
    pub recommendations: Vec<Recommendation>,
}

/// Metadata describing the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanMetadata {
    /// Deterministic report ID (SHA-256 hex digest).
    pub id: String,

    /// Version of the engine that performed the scan.
    pub engine_version: String,

    /// Scan target as given.
    pub target_path: String,

    /// Number of source files successfully scanned.
    pub files_scanned: u64,

    /// Number of candidate files skipped.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub files_skipped: u64,

    /// Lowercase names of the languages scanned.
    pub languages_detected: Vec<String>,

    /// SHA-256 hash of the effective configuration.
    pub config_hash: String,

    /// Wall-clock duration, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Summary counts of findings by severity level.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FindingsSummary {
    /// Number of critical-severity findings.
    pub critical: u32,
    /// Number of high-severity findings.
    pub high: u32,
    /// Number of medium-severity findings.
    pub medium: u32,
    /// Number of low-severity findings.
    pub low: u32,
    /// Number of informational findings.
    pub info: u32,
    /// Total number of findings across all severity levels.
    pub total: u32,
}

/// Options for report generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportOptions {
    /// Include the wall-clock scan duration. Breaks byte-identical output.
    pub include_timing: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(n: &u64) -> bool {
    *n == 0
}

// ---------------------------------------------------------------------------
// Deterministic computation functions
// ---------------------------------------------------------------------------

/// Computes the deterministic report ID.
///
/// Fingerprints are sorted first, so the ID does not depend on the order in
/// which findings were collected.
#[must_use]
pub fn compute_report_id<'a>(
    target_path: &str,
    engine_version: &str,
    config_hash: &str,
    fingerprints: impl IntoIterator<Item = &'a str>,
) -> String {
    let mut sorted: Vec<&str> = fingerprints.into_iter().collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(target_path.as_bytes());
    hasher.update(b"\n");
    hasher.update(engine_version.as_bytes());
    hasher.update(b"\n");
    hasher.update(config_hash.as_bytes());
    for fingerprint in sorted {
        hasher.update(b"\n");
        hasher.update(fingerprint.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Computes a deterministic configuration hash over its JSON encoding.
///
/// # Errors
///
/// Returns [`crate::ReportError::Serialization`] if the configuration cannot
/// be encoded.
pub fn compute_config_hash(config: &TallyConfig) -> ReportResult<String> {
    let json = serde_json::to_string(config)?;
    Ok(hex::encode(Sha256::digest(json.as_bytes())))
}

/// Computes a summary of findings counts by severity level.
#[must_use]
pub fn compute_findings_summary<'a>(findings: impl IntoIterator<Item = &'a Finding>) -> FindingsSummary {
    let mut summary = FindingsSummary::default();
    for finding in findings {
        match finding.severity {
            Severity::Critical => summary.critical += 1,
            Severity::High => summary.high += 1,
            Severity::Medium => summary.medium += 1,
            Severity::Low => summary.low += 1,
            Severity::Info => summary.info += 1,
        }
        summary.total += 1;
    }
    summary
}

fn category_counts<'a>(findings: impl IntoIterator<Item = &'a Finding>) -> BTreeMap<FindingCategory, u32> {
    let mut counts = BTreeMap::new();
    for finding in findings {
        *counts.entry(finding.category).or_insert(0) += 1;
    }
    counts
}

// ---------------------------------------------------------------------------
// Report assembly
// ---------------------------------------------------------------------------

/// Assembles the report for `project` scanned with `config`.
///
/// # Errors
///
/// Returns [`crate::ReportError::Serialization`] if the configuration cannot
/// be hashed.
pub fn build_report(project: &ProjectScan, config: &TallyConfig, options: ReportOptions) -> ReportResult<TallyReport> {
    let config_hash = compute_config_hash(config)?;
    let engine_version = ENGINE_VERSION.to_string();
    let id = compute_report_id(
        &project.root,
        &engine_version,
        &config_hash,
        project.findings().map(|f| f.fingerprint.as_str()),
    );

    let scan = ScanMetadata {
        id,
        engine_version,
        target_path: project.root.clone(),
        files_scanned: project.files_scanned,
        files_skipped: project.files_skipped,
        languages_detected: project.languages.iter().map(|l| l.to_string().to_lowercase()).collect(),
        config_hash,
        duration_ms: options.include_timing.then_some(project.duration_ms),
    };

    let findings: Vec<Finding> = project.findings().cloned().collect();
    let report = TallyReport {
        schema_version: SCHEMA_VERSION.to_string(),
        scan,
        findings_count: compute_findings_summary(&findings),
        category_counts: category_counts(&findings),
        summary: compute_onboarding(project, config.reporting.monthly_tokens),
        recommendations: recommendations(project),
        findings,
    };
    debug!(id = %report.scan.id, findings = report.findings_count.total, "built report");
    Ok(report)
}

/// Formats the pretty-printed JSON report.
///
/// Identical inputs produce byte-identical output unless
/// [`ReportOptions::include_timing`] is set.
///
/// # Errors
///
/// Returns [`crate::ReportError::Serialization`] if encoding fails.
pub fn format_report(project: &ProjectScan, config: &TallyConfig, options: ReportOptions) -> ReportResult<String> {
    let report = build_report(project, config, options)?;
    Ok(serde_json::to_string_pretty(&report)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
