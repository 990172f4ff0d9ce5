//! Onboarding summary and recommendations.
//!
//! The onboarding summary answers "how much LLM usage does this project have
//! and how risky is it": files touching provider SDKs, findings, providers
//! seen and a rough monthly spend band from the cost table.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use tally_analysis::cost::{self, CostEstimate, SpendBand};
use tally_analysis::{FindingCategory, Provider, Severity};
use tally_core::ProjectScan;

// ---------------------------------------------------------------------------
// OnboardingSummary
// ---------------------------------------------------------------------------

/// Project-level overview for a first scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnboardingSummary {
    /// Files read and analyzed.
    pub files_scanned: u64,
    /// Files importing at least one provider SDK.
    pub files_with_llm_usage: u64,
    /// Findings about the code (engine notices excluded).
    pub total_findings: u64,
    /// Critical findings.
    pub critical_findings: u64,
    /// Findings carrying a safe automated fix.
    pub fixable_findings: u64,
    /// Providers imported anywhere in the project.
    pub providers: Vec<Provider>,
    /// Sum of the per-model estimates, USD per month.
    pub estimated_monthly_cost: f64,
    /// Band of [`OnboardingSummary::estimated_monthly_cost`].
    pub cost_band: SpendBand,
    /// Monthly saving if every model moved to its provider's economy tier.
    pub optimization_potential: f64,
    /// Estimates per provider and model, in provider then model order.
    pub cost_estimates: Vec<CostEstimate>,
}

/// Computes the onboarding summary of `project`, assuming `monthly_tokens`
/// tokens per estimated model.
///
/// Models named by expensive-model findings are priced individually; a
/// provider without such a finding is priced at its standard tier.
#[must_use]
pub fn compute_onboarding(project: &ProjectScan, monthly_tokens: u64) -> OnboardingSummary {
    let providers: BTreeSet<Provider> = project
        .files
        .iter()
        .flat_map(|f| f.providers.iter().copied())
        .collect();

    let mut models: BTreeMap<Provider, BTreeSet<String>> = BTreeMap::new();
    for finding in project.findings() {
        let provider = finding.metadata.get("provider").and_then(|v| v.as_str());
        let model = finding.metadata.get("model").and_then(|v| v.as_str());
        if let (Some(provider), Some(model)) = (provider, model) {
            if let Some(p) = providers.iter().find(|p| p.name() == provider) {
                models.entry(*p).or_default().insert(model.to_string());
            }
        }
    }

    let cost_estimates: Vec<CostEstimate> = providers
        .iter()
        .flat_map(|provider| match models.get(provider) {
            Some(names) => names
                .iter()
                .map(|m| cost::estimate(*provider, Some(m), monthly_tokens))
                .collect::<Vec<_>>(),
            None => vec![cost::estimate(*provider, None, monthly_tokens)],
        })
        .collect();
    let estimated_monthly_cost: f64 = cost_estimates.iter().map(|e| e.monthly_estimate).sum();
    let optimization_potential: f64 = cost_estimates.iter().map(|e| e.optimization_potential).sum();

    let code_findings = || project.findings().filter(|f| !f.category.is_engine_notice());
    OnboardingSummary {
        files_scanned: project.files_scanned,
        files_with_llm_usage: project.files.iter().filter(|f| f.uses_llm()).count() as u64,
        total_findings: code_findings().count() as u64,
        critical_findings: code_findings().filter(|f| f.severity == Severity::Critical).count() as u64,
        fixable_findings: code_findings().filter(|f| f.fixable).count() as u64,
        providers: providers.into_iter().collect(),
        estimated_monthly_cost,
        cost_band: SpendBand::of(estimated_monthly_cost),
        optimization_potential,
        cost_estimates,
    }
}

// ---------------------------------------------------------------------------
// Recommendations
// ---------------------------------------------------------------------------

/// One remediation step, aggregated over a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Category the step addresses.
    pub category: FindingCategory,
    /// Highest severity among the category's findings.
    pub priority: Severity,
    /// Number of findings of the category.
    pub findings: u64,
    /// How many of them `tally fix` can rewrite.
    pub fixable: u64,
    /// What to do.
    pub action: String,
}

const fn action(category: FindingCategory) -> &'static str {
    match category {
        FindingCategory::HardcodedCredential => {
            "move provider keys out of source into environment variables or a secret manager, then rotate them"
        }
        FindingCategory::HardcodedCredentialFallback => {
            "drop literal defaults from environment lookups; a missing key should fail loudly"
        }
        FindingCategory::ExpensiveModelSelection => {
            "reserve flagship models for requests that need them and route routine traffic to a cheaper tier"
        }
        FindingCategory::MissingTokenLimit => "set an explicit max-output-token limit on every completion call",
        FindingCategory::ExcessiveTokenLimit => "lower token limits to what responses actually need",
        FindingCategory::UnboundedLoopInvocation => {
            "bound the number of provider calls per loop or move them behind a queue with a budget"
        }
        FindingCategory::UnbatchedEmbeddingOrCompletion => {
            "send the whole collection through the batch overload instead of one request per element"
        }
        FindingCategory::MissingUsageTracking => "import provider SDKs through their metering wrappers",
        FindingCategory::StreamingWithoutUsage => "request usage reporting on streamed completions",
        FindingCategory::UnparsableSource => "fix the syntax errors so the affected regions can be analyzed",
        FindingCategory::DetectorFault => "report the detector fault; coverage is missing for the affected files",
        FindingCategory::ScanTimeout => "raise the per-file budget or split very large files",
    }
}

/// Recommendations for every category present in `project`, most severe
/// first.
#[must_use]
pub fn recommendations(project: &ProjectScan) -> Vec<Recommendation> {
    let mut by_category: BTreeMap<FindingCategory, Recommendation> = BTreeMap::new();
    for finding in project.findings() {
        let entry = by_category.entry(finding.category).or_insert_with(|| Recommendation {
            category: finding.category,
            priority: finding.severity,
            findings: 0,
            fixable: 0,
            action: String::new(),
        });
        entry.priority = entry.priority.max_with(finding.severity);
        entry.findings += 1;
        entry.fixable += u64::from(finding.fixable);
    }

    let mut steps: Vec<Recommendation> = by_category
        .into_values()
        .map(|mut step| {
            step.action = if step.fixable > 0 {
                format!("{}; run `tally fix` to rewrite {} of them", action(step.category), step.fixable)
            } else {
                action(step.category).to_string()
            };
            step
        })
        .collect();
    steps.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.category.cmp(&b.category)));
    steps
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
