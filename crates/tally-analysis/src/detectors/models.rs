//! Expensive model selection.

use super::common::{loop_context, token_limit, Arguments};
use super::{build, finding_at, Detector};
use crate::binder::{Bindings, ResolvedSymbol};
use crate::config::Config;
use crate::cost;
use crate::finding::{Finding, FindingCategory, Severity, Span};
use crate::literal;
use crate::providers::{CallKind, MODEL_ARGS};
use crate::source::SourceUnit;
use crate::syntax::{Call, CallId, LoopContext};

const ID: &str = "expensive-model";

/// Reports `ExpensiveModelSelection` for flagship-tier model literals.
///
/// Severity starts at medium and is raised once to high when the call has no
/// token limit or runs in a loop above the configured bound.
pub struct ExpensiveModelDetector;

impl Detector for ExpensiveModelDetector {
    fn id(&self) -> &'static str {
        ID
    }

    fn detect(&self, unit: &SourceUnit, bindings: &Bindings, config: &Config) -> Vec<Finding> {
        let syntax = unit.syntax();
        bindings
            .resolved_calls()
            .filter(|(_, r)| selects_model(r.kind))
            .filter_map(|(id, resolved)| {
                let call = syntax.calls.get(id)?;
                let (model, model_span) = model_argument(unit, call, resolved)?;
                if !config.is_expensive_model(&model) {
                    return None;
                }
                report(unit, config, id, call, resolved, &model, model_span)
            })
            .collect()
    }
}

const fn selects_model(kind: CallKind) -> bool {
    matches!(
        kind,
        CallKind::Completion | CallKind::ChatModel | CallKind::ModelFactory | CallKind::Embedding | CallKind::Image
    )
}

/// Literal model name of `call` and the span of its definition.
pub(crate) fn model_argument(unit: &SourceUnit, call: &Call, resolved: &ResolvedSymbol) -> Option<(String, Span)> {
    let syntax = unit.syntax();
    let args = Arguments::of(unit, call);
    let value = match args.get(MODEL_ARGS) {
        Some(arg) => literal::evaluate(syntax, arg.value, arg.function),
        None => {
            let slot = resolved.shape.and_then(|s| s.model_slot)?;
            literal::evaluate(syntax, call.positional.get(slot)?, call.site.function)
        }
    };
    Some((value.as_str()?.to_string(), value.span()?))
}

fn report(
    unit: &SourceUnit,
    config: &Config,
    id: CallId,
    call: &Call,
    resolved: &ResolvedSymbol,
    model: &str,
    model_span: Span,
) -> Option<Finding> {
    let syntax = unit.syntax();
    let context = loop_context(syntax, call);
    let looped = context.exceeds(config.loop_bound_threshold);
    let unlimited = matches!(resolved.kind, CallKind::Completion | CallKind::ChatModel)
        && token_limit(unit, id, resolved).is_absent();

    let mut builder = finding_at(unit, FindingCategory::ExpensiveModelSelection, call.span, Some(&call.site))
        .message(format!("flagship-tier model `{model}` selected for `{}`", resolved.canonical()))
        .subject(model)
        .meta("model", serde_json::Value::from(model))
        .meta("provider", serde_json::Value::from(resolved.provider.name()))
        .meta("symbol", serde_json::Value::from(resolved.canonical()))
        .meta("model_span", serde_json::json!([model_span.start, model_span.end]));
    if unlimited {
        builder = builder.note("no max-output-token limit bounds the cost of each response");
    }
    if looped {
        let note = match context {
            LoopContext::Bounded(n) => format!("runs up to {n} times inside a loop"),
            _ => "runs inside a loop with no static bound".to_string(),
        };
        builder = builder.note(note);
    }
    if unlimited || looped {
        builder = builder.severity(Severity::Medium.raised(1));
    }
    builder = builder.note(
        cost::suggestion(model).unwrap_or("a smaller model tier is usually sufficient for routine requests"),
    );
    if let Some(price) = cost::price_of(Some(resolved.provider), model) {
        builder = builder.meta("price_tier", serde_json::to_value(price.tier).unwrap_or_default());
    }
    build(builder, ID)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(src: &str, path: &str) -> (SourceUnit, Vec<Finding>) {
        let unit = SourceUnit::parse(src, path).unwrap();
        let config = Config::default();
        let bindings = Bindings::bind(&unit, &config);
        let findings = ExpensiveModelDetector.detect(&unit, &bindings, &config);
        (unit, findings)
    }

    #[test]
    fn dated_snapshot_with_limit_stays_medium() {
        let src = "import anthropic\nc = anthropic.Anthropic()\nc.messages.create(model='claude-3-opus-20240229', max_tokens=100, messages=[])\n";
        let (unit, findings) = detect(src, "a.py");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Medium);
        assert!(unit.slice(findings[0].span).starts_with("c.messages.create("));
        assert_eq!(findings[0].subject.as_deref(), Some("claude-3-opus-20240229"));
        assert_eq!(findings[0].metadata["price_tier"], "premium");
        assert!(findings[0].notes.iter().any(|n| n.contains("claude-3-haiku")));
    }

    #[test]
    fn loop_raises_to_high() {
        let src = "import anthropic\nclient = anthropic.Anthropic()\nfor i in range(50):\n    client.messages.create(model='claude-3-opus-20240229', max_tokens=100, messages=[])\n";
        let (_, findings) = detect(src, "a.py");
        assert_eq!(findings[0].severity, Severity::High);
        assert!(findings[0].notes.iter().any(|n| n.contains("50 times")));
    }

    #[test]
    fn missing_limit_raises_once() {
        let src = "from openai import OpenAI\nc = OpenAI()\nwhile True:\n    c.chat.completions.create(model='gpt-4o')\n";
        let (_, findings) = detect(src, "a.py");
        assert_eq!(findings[0].severity, Severity::High, "both conditions raise only one step");
    }

    #[test]
    fn cheap_models_are_ignored() {
        let src = "from openai import OpenAI\nc = OpenAI()\nc.chat.completions.create(model='gpt-4o-mini')\n";
        assert!(detect(src, "a.py").1.is_empty());
    }

    #[test]
    fn positional_model_slot_and_chat_model_constructor() {
        let src = "import google.generativeai as genai\nm = genai.GenerativeModel('gemini-1.5-pro')\n";
        assert_eq!(detect(src, "a.py").1.len(), 1);
        let src = "from langchain_openai import ChatOpenAI\nllm = ChatOpenAI(model='gpt-4', max_tokens=10)\n";
        assert_eq!(detect(src, "a.py").1.len(), 1);
    }

    #[test]
    fn model_through_constant() {
        let src = "import OpenAI from 'openai';\nconst MODEL = 'gpt-4-turbo';\nconst c = new OpenAI();\nc.chat.completions.create({ model: MODEL, max_tokens: 10 });\n";
        let (_, findings) = detect(src, "a.ts");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].metadata["model"], "gpt-4-turbo");
    }
}
