//! Rough spend model.
//!
//! A static price table (USD per 1K tokens, blended input/output) drives the
//! monthly estimates and spend bands used in report summaries, and the
//! cheaper-model suggestions attached to expensive-model findings. Prices are
//! indicative only.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::providers::Provider;

/// Monthly token volume assumed when the caller has no usage data.
pub const DEFAULT_MONTHLY_TOKENS: u64 = 100_000;

/// Price used for providers or models missing from the table.
const FALLBACK_PER_1K: f64 = 0.001;

// ---------------------------------------------------------------------------
// Price table
// ---------------------------------------------------------------------------

/// Price tier of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceTier {
    Premium,
    Standard,
    Economy,
    Embedding,
}

/// One row of the price table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub provider: Provider,
    pub model: &'static str,
    pub per_1k_tokens: f64,
    pub tier: PriceTier,
}

const fn price(provider: Provider, model: &'static str, per_1k_tokens: f64, tier: PriceTier) -> ModelPrice {
    ModelPrice {
        provider,
        model,
        per_1k_tokens,
        tier,
    }
}

#[rustfmt::skip]
const PRICES: &[ModelPrice] = &[
    price(Provider::OpenAi, "gpt-4", 0.03, PriceTier::Premium),
    price(Provider::OpenAi, "gpt-4-32k", 0.06, PriceTier::Premium),
    price(Provider::OpenAi, "gpt-4-turbo", 0.01, PriceTier::Premium),
    price(Provider::OpenAi, "gpt-4o", 0.005, PriceTier::Premium),
    price(Provider::OpenAi, "o1", 0.03, PriceTier::Premium),
    price(Provider::OpenAi, "gpt-4o-mini", 0.000_3, PriceTier::Economy),
    price(Provider::OpenAi, "gpt-3.5-turbo", 0.001_5, PriceTier::Standard),
    price(Provider::OpenAi, "gpt-3.5-turbo-16k", 0.003, PriceTier::Standard),
    price(Provider::OpenAi, "text-embedding-ada-002", 0.000_1, PriceTier::Embedding),
    price(Provider::OpenAi, "text-embedding-3-small", 0.000_02, PriceTier::Embedding),
    price(Provider::OpenAi, "text-embedding-3-large", 0.000_13, PriceTier::Embedding),
    price(Provider::Anthropic, "claude-3-opus", 0.015, PriceTier::Premium),
    price(Provider::Anthropic, "claude-3-5-sonnet", 0.003, PriceTier::Standard),
    price(Provider::Anthropic, "claude-3-sonnet", 0.003, PriceTier::Standard),
    price(Provider::Anthropic, "claude-3-haiku", 0.000_25, PriceTier::Economy),
    price(Provider::Anthropic, "claude-2.1", 0.008, PriceTier::Standard),
    price(Provider::Anthropic, "claude-instant", 0.001_6, PriceTier::Economy),
    price(Provider::Google, "gemini-1.5-pro", 0.003_5, PriceTier::Premium),
    price(Provider::Google, "gemini-pro", 0.000_25, PriceTier::Standard),
    price(Provider::Google, "gemini-pro-vision", 0.000_25, PriceTier::Standard),
    price(Provider::Google, "gemini-1.5-flash", 0.000_075, PriceTier::Economy),
    price(Provider::Google, "palm-2", 0.002, PriceTier::Standard),
    price(Provider::Bedrock, "claude-v2", 0.008, PriceTier::Standard),
    price(Provider::Bedrock, "claude-instant", 0.001_6, PriceTier::Economy),
    price(Provider::Bedrock, "titan-text-express", 0.000_8, PriceTier::Economy),
    price(Provider::Bedrock, "titan-text-lite", 0.000_3, PriceTier::Economy),
    price(Provider::Perplexity, "sonar-pro", 0.009, PriceTier::Premium),
    price(Provider::Perplexity, "sonar", 0.001, PriceTier::Standard),
];

/// Cross-region inference profile prefixes of Bedrock model ids.
const REGION_PREFIXES: &[&str] = &["us.", "eu.", "apac.", "us-gov.", "global."];

/// Vendor prefixes of Bedrock model ids (`anthropic.claude-v2`).
const VENDOR_PREFIXES: &[&str] = &[
    "anthropic.", "amazon.", "openai.", "google.", "meta.", "cohere.", "mistral.", "ai21.",
];

#[rustfmt::skip]
const SUGGESTIONS: &[(&str, &str)] = &[
    ("gpt-4", "consider gpt-4o-mini or gpt-3.5-turbo for non-critical tasks (about 20x cheaper)"),
    ("gpt-4-turbo", "use gpt-4o-mini where possible (about 7x cheaper)"),
    ("gpt-4o", "try gpt-4o-mini for routine requests (about 15x cheaper)"),
    ("claude-3-opus", "try claude-3-haiku for simple tasks (about 60x cheaper)"),
    ("claude-3-sonnet", "consider claude-3-haiku for basic queries (about 12x cheaper)"),
    ("gemini-1.5-pro", "try gemini-1.5-flash for high-volume requests"),
];

/// `model` without a resource path (`models/gemini-pro`) or Bedrock
/// region and vendor prefixes (`us.anthropic.claude-3-haiku`).
#[must_use]
pub fn model_name(model: &str) -> &str {
    let name = model.rsplit('/').next().unwrap_or(model);
    let name = REGION_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .unwrap_or(name);
    VENDOR_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .unwrap_or(name)
}

/// `true` when `model` is `name` or a snapshot of it: a dated or versioned
/// suffix (`-20240229`, `-v1:0`) or a revision tag (`:1`, `@001`).
#[must_use]
pub fn is_model(model: &str, name: &str) -> bool {
    let model = model_name(model);
    model == name
        || model.strip_prefix(name).is_some_and(|rest| {
            rest.strip_prefix('-').is_some_and(is_snapshot_suffix)
                || rest
                    .strip_prefix(':')
                    .or_else(|| rest.strip_prefix('@'))
                    .is_some_and(|tag| !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric()))
        })
}

fn is_snapshot_suffix(rest: &str) -> bool {
    rest.starts_with(|c: char| c.is_ascii_digit() || c == 'v')
        && rest.chars().all(|c| c.is_ascii_digit() || matches!(c, '-' | ':' | 'v' | '@'))
}

/// Table row for `model`, preferring rows of `provider` when given.
#[must_use]
pub fn price_of(provider: Option<Provider>, model: &str) -> Option<&'static ModelPrice> {
    PRICES
        .iter()
        .filter(|p| provider.map_or(true, |wanted| p.provider == wanted))
        .find(|p| is_model(model, p.model))
}

/// Cheaper alternative for a flagship model.
#[must_use]
pub fn suggestion(model: &str) -> Option<&'static str> {
    SUGGESTIONS
        .iter()
        .find(|(name, _)| is_model(model, name))
        .map(|(_, text)| *text)
}

// ---------------------------------------------------------------------------
// Estimates
// ---------------------------------------------------------------------------

/// Estimated spend of one provider/model pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub provider: String,
    pub model: String,
    pub per_1k_tokens: f64,
    pub monthly_estimate: f64,
    /// Monthly saving if the provider's economy tier were used instead.
    pub optimization_potential: f64,
}

/// Estimates the monthly spend of `provider` at `tokens_per_month`.
///
/// Bedrock model ids without a Bedrock row are priced as the model they host.
/// Without a known model the provider's first standard-tier row is used;
/// providers missing from the table get a flat fallback price.
#[must_use]
pub fn estimate(provider: Provider, model: Option<&str>, tokens_per_month: u64) -> CostEstimate {
    let rows = || PRICES.iter().filter(move |p| p.provider == provider);
    let row = model
        .and_then(|m| price_of(Some(provider), m))
        .or_else(|| model.filter(|_| provider == Provider::Bedrock).and_then(|m| price_of(None, m)))
        .or_else(|| rows().find(|p| p.tier == PriceTier::Standard))
        .or_else(|| rows().next());

    #[allow(clippy::cast_precision_loss)]
    let thousands = tokens_per_month as f64 / 1000.0;
    let Some(row) = row else {
        return CostEstimate {
            provider: provider.name().to_string(),
            model: model.unwrap_or("unknown").to_string(),
            per_1k_tokens: FALLBACK_PER_1K,
            monthly_estimate: FALLBACK_PER_1K * thousands,
            optimization_potential: 0.0,
        };
    };
    let economy = rows().find(|p| p.tier == PriceTier::Economy);
    CostEstimate {
        provider: provider.name().to_string(),
        model: model.unwrap_or(row.model).to_string(),
        per_1k_tokens: row.per_1k_tokens,
        monthly_estimate: row.per_1k_tokens * thousands,
        optimization_potential: economy.map_or(0.0, |e| ((row.per_1k_tokens - e.per_1k_tokens) * thousands).max(0.0)),
    }
}

/// Spend band of a monthly estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpendBand {
    High,
    Medium,
    Low,
}

impl SpendBand {
    /// HIGH above 1000/month, MEDIUM above 100, LOW otherwise.
    #[must_use]
    pub fn of(monthly: f64) -> Self {
        if monthly > 1000.0 {
            Self::High
        } else if monthly > 100.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for SpendBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        })
    }
}

/// Human-readable monthly amount (`< $0.01/month`, `$4.20/month`).
#[must_use]
pub fn format_monthly(monthly: f64) -> String {
    if monthly < 0.01 {
        "< $0.01/month".to_string()
    } else if monthly < 1.0 {
        format!("${monthly:.3}/month")
    } else if monthly < 10.0 {
        format!("${monthly:.2}/month")
    } else {
        format!("${monthly:.0}/month")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_match_their_base_row() {
        assert_eq!(price_of(None, "claude-3-opus-20240229").unwrap().tier, PriceTier::Premium);
        assert_eq!(price_of(None, "gpt-4o-mini").unwrap().tier, PriceTier::Economy);
        assert_eq!(price_of(None, "gpt-4-0613").unwrap().model, "gpt-4");
        assert!(price_of(None, "gpt-4o-mini-tts").is_none());
        assert!(price_of(Some(Provider::Anthropic), "gpt-4").is_none());
    }

    #[test]
    fn bedrock_model_ids_match_their_rows() {
        let row = price_of(Some(Provider::Bedrock), "anthropic.claude-v2:1").unwrap();
        assert_eq!(row.model, "claude-v2");
        assert_eq!(price_of(None, "amazon.titan-text-express-v1").unwrap().model, "titan-text-express");
        assert_eq!(price_of(None, "amazon.titan-text-lite-v1").unwrap().tier, PriceTier::Economy);
        assert_eq!(
            price_of(None, "us.anthropic.claude-3-haiku-20240307-v1:0").unwrap().model,
            "claude-3-haiku"
        );
        assert_eq!(model_name("models/gemini-1.5-pro"), "gemini-1.5-pro");
        assert!(!is_model("titan-text-express-plus", "titan-text-express"));
    }

    #[test]
    fn bedrock_estimates_use_the_bedrock_table() {
        let est = estimate(Provider::Bedrock, None, DEFAULT_MONTHLY_TOKENS);
        assert_eq!(est.provider, "aws-bedrock");
        assert_eq!(est.model, "claude-v2");
        assert!((est.monthly_estimate - 0.8).abs() < 1e-9);
        assert!((est.optimization_potential - 0.64).abs() < 1e-9, "against claude-instant");

        let hosted = estimate(Provider::Bedrock, Some("anthropic.claude-3-opus-20240229-v1:0"), 1_000_000);
        assert!((hosted.per_1k_tokens - 0.015).abs() < 1e-12, "priced as the hosted model");

        let est = estimate(Provider::Perplexity, Some("sonar-pro"), 1_000_000);
        assert!((est.monthly_estimate - 9.0).abs() < 1e-9);
    }

    #[test]
    fn estimate_scales_with_volume() {
        let est = estimate(Provider::OpenAi, Some("gpt-4"), 1_000_000);
        assert!((est.monthly_estimate - 30.0).abs() < 1e-9);
        assert!((est.optimization_potential - 29.7).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_uses_standard_row_and_unknown_provider_the_fallback() {
        let est = estimate(Provider::Anthropic, None, DEFAULT_MONTHLY_TOKENS);
        assert_eq!(est.model, "claude-3-5-sonnet");
        let est = estimate(Provider::Cohere, Some("command-r"), DEFAULT_MONTHLY_TOKENS);
        assert!((est.per_1k_tokens - FALLBACK_PER_1K).abs() < f64::EPSILON);
        assert_eq!(est.model, "command-r");
    }

    #[test]
    fn spend_bands() {
        assert_eq!(SpendBand::of(1000.5), SpendBand::High);
        assert_eq!(SpendBand::of(1000.0), SpendBand::Medium);
        assert_eq!(SpendBand::of(100.0), SpendBand::Low);
        assert_eq!(SpendBand::High.to_string(), "HIGH");
    }

    #[test]
    fn suggestions_and_formatting() {
        assert!(suggestion("claude-3-opus-20240229").unwrap().contains("haiku"));
        assert!(suggestion("gpt-4o-mini").is_none());
        assert_eq!(format_monthly(0.001), "< $0.01/month");
        assert_eq!(format_monthly(0.5), "$0.500/month");
        assert_eq!(format_monthly(4.2), "$4.20/month");
        assert_eq!(format_monthly(1234.4), "$1234/month");
    }
}
