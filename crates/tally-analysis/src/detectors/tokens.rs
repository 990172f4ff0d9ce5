//! Missing and excessive max-output-token limits.

use super::common::{token_limit, TokenLimit};
use super::{build, finding_at, Detector};
use crate::binder::Bindings;
use crate::config::Config;
use crate::finding::{Finding, FindingCategory};
use crate::providers::CallKind;
use crate::source::SourceUnit;

const ID: &str = "token-limit";

/// Reports `MissingTokenLimit` and `ExcessiveTokenLimit`.
///
/// Completions and chat-model constructors must carry a limit. Limits hidden
/// behind `**kwargs` or an unresolvable settings object are unknown and never
/// reported. Model factories are only checked for excessive limits; their
/// completions inherit whatever the factory sets.
pub struct TokenLimitDetector;

impl Detector for TokenLimitDetector {
    fn id(&self) -> &'static str {
        ID
    }

    fn detect(&self, unit: &SourceUnit, bindings: &Bindings, config: &Config) -> Vec<Finding> {
        let syntax = unit.syntax();
        let mut findings = Vec::new();
        for (id, resolved) in bindings.resolved_calls() {
            let requires_limit = matches!(resolved.kind, CallKind::Completion | CallKind::ChatModel);
            if !requires_limit && resolved.kind != CallKind::ModelFactory {
                continue;
            }
            let Some(call) = syntax.calls.get(id) else {
                continue;
            };
            let symbol = resolved.canonical();

            let builder = match token_limit(unit, id, resolved) {
                TokenLimit::Absent if requires_limit => finding_at(unit, FindingCategory::MissingTokenLimit, call.span, Some(&call.site))
                    .message(format!("`{symbol}` is called without a max-output-token limit"))
                    .note("output length, and so cost, is bounded only by the model's context window"),
                TokenLimit::Present { name, value, own: true } => {
                    let Some(limit) = value.as_int() else {
                        continue;
                    };
                    if limit <= 0 || limit.unsigned_abs() <= config.token_limit_threshold {
                        continue;
                    }
                    finding_at(unit, FindingCategory::ExcessiveTokenLimit, call.span, Some(&call.site))
                        .message(format!(
                            "`{name}={limit}` on `{symbol}` exceeds the configured limit of {}",
                            config.token_limit_threshold
                        ))
                        .meta("token_limit", serde_json::Value::from(limit))
                        .meta("argument", serde_json::Value::from(name))
                }
                _ => continue,
            };
            let builder = builder
                .subject(symbol.as_str())
                .meta("symbol", serde_json::Value::from(symbol.as_str()))
                .meta("provider", serde_json::Value::from(resolved.provider.name()));
            findings.extend(build(builder, ID));
        }
        findings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
