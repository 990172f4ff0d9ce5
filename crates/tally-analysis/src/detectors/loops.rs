//! Provider requests inside loops.

use super::common::{iterates_collection, loop_context};
use super::{build, finding_at, Detector};
use crate::binder::Bindings;
use crate::config::Config;
use crate::finding::{Finding, FindingCategory};
use crate::providers::CallKind;
use crate::source::SourceUnit;
use crate::syntax::LoopContext;

// ---------------------------------------------------------------------------
// UnboundedLoopInvocation
// ---------------------------------------------------------------------------

const LOOP_ID: &str = "loop-invocation";

/// Reports billable requests in loops whose combined bound is unknown or
/// above `loop_bound_threshold`.
pub struct LoopInvocationDetector;

impl Detector for LoopInvocationDetector {
    fn id(&self) -> &'static str {
        LOOP_ID
    }

    fn detect(&self, unit: &SourceUnit, bindings: &Bindings, config: &Config) -> Vec<Finding> {
        let syntax = unit.syntax();
        let mut findings = Vec::new();
        for (id, resolved) in bindings.resolved_calls().filter(|(_, r)| r.kind.is_request()) {
            let Some(call) = syntax.calls.get(id) else {
                continue;
            };
            let context = loop_context(syntax, call);
            if !context.exceeds(config.loop_bound_threshold) {
                continue;
            }
            let symbol = resolved.canonical();
            let (message, bound) = match context {
                LoopContext::Bounded(n) => (
                    format!("`{symbol}` is invoked up to {n} times in a loop"),
                    serde_json::Value::from(n),
                ),
                _ => (
                    format!("`{symbol}` is invoked in a loop with no static bound"),
                    serde_json::Value::Null,
                ),
            };
            let builder = finding_at(unit, FindingCategory::UnboundedLoopInvocation, call.span, Some(&call.site))
                .message(message)
                .note(format!(
                    "each iteration is a billable request; the configured bound is {}",
                    config.loop_bound_threshold
                ))
                .subject(symbol.as_str())
                .meta("symbol", serde_json::Value::from(symbol.as_str()))
                .meta("loop_bound", bound);
            findings.extend(build(builder, LOOP_ID));
        }
        findings
    }
}

// ---------------------------------------------------------------------------
// UnbatchedEmbeddingOrCompletion
// ---------------------------------------------------------------------------

const BATCH_ID: &str = "unbatched-calls";

/// Reports per-element embedding or completion requests where the SDK has a
/// batch overload.
///
/// The call must sit directly in a loop over a collection and pass the loop
/// variable, so one call site yields one finding however long the collection.
pub struct UnbatchedCallDetector;

impl Detector for UnbatchedCallDetector {
    fn id(&self) -> &'static str {
        BATCH_ID
    }

    fn detect(&self, unit: &SourceUnit, bindings: &Bindings, _config: &Config) -> Vec<Finding> {
        let syntax = unit.syntax();
        let mut findings = Vec::new();
        for (id, resolved) in bindings.resolved_calls() {
            if !matches!(
                resolved.kind,
                CallKind::Embedding | CallKind::Completion | CallKind::Invocation
            ) {
                continue;
            }
            let Some(batch) = resolved.batch() else {
                continue;
            };
            let Some(call) = syntax.calls.get(id) else {
                continue;
            };
            let Some(lp) = call.site.loops.last().and_then(|l| syntax.loops.get(*l)) else {
                continue;
            };
            if !iterates_collection(syntax, lp) || !lp.targets.iter().any(|t| call.idents.contains(t)) {
                continue;
            }
            let symbol = resolved.canonical();
            let builder = finding_at(
                unit,
                FindingCategory::UnbatchedEmbeddingOrCompletion,
                call.span,
                Some(&call.site),
            )
            .message(format!("`{symbol}` is called once per element of a collection"))
            .note(format!("batch the elements with {batch}"))
            .subject(symbol.as_str())
            .meta("symbol", serde_json::Value::from(symbol.as_str()))
            .meta("batch", serde_json::Value::from(batch));
            findings.extend(build(builder, BATCH_ID));
        }
        findings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn run(detector: &dyn Detector, src: &str, path: &str) -> Vec<Finding> {
        let unit = SourceUnit::parse(src, path).unwrap();
        let config = Config::default();
        let bindings = Bindings::bind(&unit, &config);
        detector.detect(&unit, &bindings, &config)
    }

    // -- Loop bounds -------------------------------------------------------

    #[test]
    fn range_above_threshold() {
        let src = "import anthropic\nclient = anthropic.Anthropic()\nfor i in range(50):\n    client.messages.create(model='claude-3-opus-20240229', max_tokens=10, messages=[])\n";
        let findings = run(&LoopInvocationDetector, src, "a.py");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].metadata["loop_bound"], 50);
    }

    #[test]
    fn small_loops_are_fine() {
        let src = "import anthropic\nclient = anthropic.Anthropic()\nfor i in range(3):\n    client.messages.create(model='m', max_tokens=10, messages=[])\n";
        assert!(run(&LoopInvocationDetector, src, "a.py").is_empty());
    }

    #[test]
    fn nested_loops_multiply() {
        let src = "import anthropic\nclient = anthropic.Anthropic()\nfor i in range(4):\n    for j in range(4):\n        client.messages.create(model='m', max_tokens=10, messages=[])\n";
        let findings = run(&LoopInvocationDetector, src, "a.py");
        assert_eq!(findings[0].metadata["loop_bound"], 16);
    }

    #[test]
    fn while_loop_and_callback_are_unbounded() {
        let src = "from openai import OpenAI\nc = OpenAI()\nwhile True:\n    c.chat.completions.create(model='m', max_tokens=5)\n";
        let findings = run(&LoopInvocationDetector, src, "a.py");
        assert_eq!(findings[0].metadata["loop_bound"], serde_json::Value::Null);

        let src = "import OpenAI from 'openai';\nconst c = new OpenAI();\nexport function go(rows) {\n  rows.forEach(r => c.embeddings.create({ model: 'm', input: r }));\n}\n";
        assert_eq!(run(&LoopInvocationDetector, src, "a.ts").len(), 1);
    }

    #[test]
    fn constructors_in_loops_are_not_requests() {
        let src = "from openai import OpenAI\nwhile True:\n    c = OpenAI()\n";
        assert!(run(&LoopInvocationDetector, src, "a.py").is_empty());
    }

    // -- Batching ----------------------------------------------------------

    #[test]
    fn thousand_element_literal_yields_one_finding() {
        let items: Vec<String> = (0..1000).map(|i| format!("'t{i}'")).collect();
        let src = format!(
            "from openai import OpenAI\nopenai_client = OpenAI()\nfor text in [{}]:\n    openai_client.embeddings.create(model='text-embedding-3-small', input=text)\n",
            items.join(", ")
        );
        let findings = run(&UnbatchedCallDetector, &src, "a.py");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, FindingCategory::UnbatchedEmbeddingOrCompletion);
    }

    #[test]
    fn parameter_collection_with_callback() {
        let src = "import OpenAI from 'openai';\nconst c = new OpenAI();\nexport async function embed(docs) {\n  for (const d of docs) {\n    await c.embeddings.create({ model: 'm', input: d });\n  }\n}\n";
        assert_eq!(run(&UnbatchedCallDetector, src, "a.ts").len(), 1);
    }

    #[test]
    fn loop_variable_must_reach_the_call() {
        let src = "from openai import OpenAI\nc = OpenAI()\ndef f(docs):\n    for d in docs:\n        c.embeddings.create(model='m', input='constant')\n";
        assert!(run(&UnbatchedCallDetector, src, "a.py").is_empty());
    }

    #[test]
    fn chat_completions_have_no_batch_overload() {
        let src = "from openai import OpenAI\nc = OpenAI()\ndef f(qs):\n    for q in qs:\n        c.chat.completions.create(model='m', messages=[q], max_tokens=5)\n";
        assert!(run(&UnbatchedCallDetector, src, "a.py").is_empty());
    }

    #[test]
    fn counted_loops_are_not_collections() {
        let src = "from openai import OpenAI\nc = OpenAI()\nfor i in range(100):\n    c.embeddings.create(model='m', input=i)\n";
        assert!(run(&UnbatchedCallDetector, src, "a.py").is_empty());
    }
}
