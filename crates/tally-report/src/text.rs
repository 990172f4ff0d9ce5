//! Human-readable terminal report.

use std::fmt::Write as _;

use tally_analysis::cost;

use crate::TallyReport;

/// Renders `report` for a terminal.
///
/// Findings are grouped per file, then followed by the onboarding summary
/// and the recommendations.
#[must_use]
pub fn format_text(report: &TallyReport) -> String {
    let mut out = String::new();

    let mut current: Option<&str> = None;
    for finding in &report.findings {
        if current != Some(finding.file_path.as_str()) {
            if current.is_some() {
                out.push('\n');
            }
            let _ = writeln!(out, "{}", finding.file_path);
            current = Some(finding.file_path.as_str());
        }
        let _ = writeln!(
            out,
            "  {}:{}  {:<8}  {}  {}",
            finding.line_range.start_line,
            finding.line_range.start_col,
            finding.severity,
            finding.category,
            finding.message
        );
        for note in &finding.notes {
            let _ = writeln!(out, "      note: {note}");
        }
    }
    if report.findings.is_empty() {
        out.push_str("No findings.\n");
    }

    let summary = &report.summary;
    let counts = &report.findings_count;
    out.push('\n');
    let _ = writeln!(
        out,
        "Scanned {} files ({} skipped), {} using LLM SDKs.",
        report.scan.files_scanned, report.scan.files_skipped, summary.files_with_llm_usage
    );
    let _ = writeln!(
        out,
        "Findings: {} total ({} critical, {} high, {} medium, {} low, {} info), {} fixable.",
        counts.total, counts.critical, counts.high, counts.medium, counts.low, counts.info, summary.fixable_findings
    );
    if !summary.providers.is_empty() {
        let names: Vec<&str> = summary.providers.iter().map(|p| p.name()).collect();
        let _ = writeln!(out, "Providers: {}", names.join(", "));
        let _ = writeln!(
            out,
            "Estimated spend: {} ({})",
            cost::format_monthly(summary.estimated_monthly_cost),
            summary.cost_band
        );
        if summary.optimization_potential >= 0.01 {
            let _ = writeln!(
                out,
                "Potential saving: {}",
                cost::format_monthly(summary.optimization_potential)
            );
        }
    }

    if !report.recommendations.is_empty() {
        out.push_str("\nRecommendations:\n");
        for (i, step) in report.recommendations.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. [{}] {} ({}): {}",
                i + 1,
                step.priority,
                step.category,
                step.findings,
                step.action
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_report, ReportOptions};
    use tally_analysis::{scan, Config};
    use tally_core::{ProjectScan, TallyConfig};

    fn report(src: &str) -> TallyReport {
        let project = ProjectScan {
            root: "demo".to_string(),
            files: vec![scan(src, "agent.py", &Config::default())],
            files_scanned: 1,
            files_skipped: 0,
            languages: Vec::new(),
            duration_ms: 0,
        };
        build_report(&project, &TallyConfig::default(), ReportOptions::default()).unwrap()
    }

    #[test]
    fn lists_findings_under_their_file() {
        let text = format_text(&report(
            "import os\nfrom openai import OpenAI\nc = OpenAI(api_key='sk-test123456789012345678901234567890')\n",
        ));
        assert!(text.starts_with("agent.py\n"));
        assert!(text.contains("3:"));
        assert!(text.contains("critical"));
        assert!(text.contains("HardcodedCredential"));
        assert!(text.contains("Providers: openai"));
        assert!(text.contains("Recommendations:\n  1. [critical] HardcodedCredential"));
    }

    #[test]
    fn clean_file_reports_no_findings() {
        let text = format_text(&report("print('hello')\n"));
        assert!(text.starts_with("No findings.\n"));
        assert!(text.contains("Findings: 0 total"));
        assert!(!text.contains("Providers:"));
        assert!(!text.contains("Recommendations:"));
    }
}
