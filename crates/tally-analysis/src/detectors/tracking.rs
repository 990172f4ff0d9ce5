//! Usage-tracking coverage.
//!
//! A provider namespace with a configured metering wrapper is tracked once
//! any import of that wrapper is present in the file. Entry points reached
//! through the raw SDK are reported otherwise; the fix proposer rewrites the
//! import that bound them.

use super::common::Arguments;
use super::{build, finding_at, Detector};
use crate::binder::Bindings;
use crate::config::Config;
use crate::finding::{Finding, FindingCategory};
use crate::literal;
use crate::providers::CallKind;
use crate::source::SourceUnit;
use crate::syntax::{DictKey, ExprKind};

// ---------------------------------------------------------------------------
// MissingUsageTracking
// ---------------------------------------------------------------------------

const TRACKING_ID: &str = "usage-tracking";

/// Reports constructors and module-level entry points of a wrapped namespace
/// used without the wrapper.
pub struct UsageTrackingDetector;

impl Detector for UsageTrackingDetector {
    fn id(&self) -> &'static str {
        TRACKING_ID
    }

    fn detect(&self, unit: &SourceUnit, bindings: &Bindings, config: &Config) -> Vec<Finding> {
        let syntax = unit.syntax();
        let mut findings = Vec::new();
        for (id, resolved) in bindings.resolved_calls() {
            if resolved.is_instance() || resolved.kind == CallKind::Other {
                continue;
            }
            let symbol = resolved.canonical();
            let Some((namespace, wrapper)) = config.wrapper_for(&symbol) else {
                continue;
            };
            let Some(module) = wrapper.for_family(unit.family()) else {
                continue;
            };
            if bindings.is_metered(namespace) {
                continue;
            }
            let Some(call) = syntax.calls.get(id) else {
                continue;
            };
            let builder = finding_at(unit, FindingCategory::MissingUsageTracking, call.span, Some(&call.site))
                .message(format!("`{symbol}` is used without the `{module}` metering wrapper"))
                .note("requests made through the raw SDK are not attributed to any usage meter")
                .subject(namespace)
                .meta("symbol", serde_json::Value::from(symbol.as_str()))
                .meta("namespace", serde_json::Value::from(namespace))
                .meta("wrapper", serde_json::Value::from(module));
            findings.extend(build(builder, TRACKING_ID));
        }
        findings
    }
}

// ---------------------------------------------------------------------------
// StreamingWithoutUsage
// ---------------------------------------------------------------------------

const STREAMING_ID: &str = "streaming-usage";

const STREAM_OPTIONS: &[&str] = &["stream_options", "streamOptions"];
const INCLUDE_USAGE: &[&str] = &["include_usage", "includeUsage"];

/// Reports streamed completions that never receive a usage chunk, for
/// providers where usage reporting on streams is opt-in.
pub struct StreamingUsageDetector;

impl Detector for StreamingUsageDetector {
    fn id(&self) -> &'static str {
        STREAMING_ID
    }

    fn detect(&self, unit: &SourceUnit, bindings: &Bindings, config: &Config) -> Vec<Finding> {
        let syntax = unit.syntax();
        let mut findings = Vec::new();
        for (id, resolved) in bindings.resolved_calls() {
            if resolved.kind != CallKind::Completion || !resolved.provider.stream_usage_is_opt_in() {
                continue;
            }
            let Some(call) = syntax.calls.get(id) else {
                continue;
            };
            let symbol = resolved.canonical();
            if config
                .wrapper_for(&symbol)
                .is_some_and(|(namespace, _)| bindings.is_metered(namespace))
            {
                continue;
            }
            let args = Arguments::of(unit, call);
            let stream_flag = args
                .get(&["stream"])
                .and_then(|a| literal::evaluate(syntax, a.value, a.function).as_bool());
            if !(resolved.streams() || stream_flag == Some(true)) {
                continue;
            }
            let reports_usage = match args.get(STREAM_OPTIONS) {
                Some(options) => {
                    let (value, scope) = literal::follow_scoped(syntax, options.value, options.function);
                    match &value.kind {
                        ExprKind::Dict(entries) => entries
                            .iter()
                            .find_map(|(key, v)| match key {
                                DictKey::Named(name) if INCLUDE_USAGE.contains(&name.as_str()) => {
                                    Some(literal::evaluate(syntax, v, scope).as_bool() != Some(false))
                                }
                                DictKey::Spread | DictKey::Computed => Some(true),
                                DictKey::Named(_) => None,
                            })
                            .unwrap_or(false),
                        _ => true,
                    }
                }
                None => args.opaque,
            };
            if reports_usage {
                continue;
            }
            let builder = finding_at(unit, FindingCategory::StreamingWithoutUsage, call.span, Some(&call.site))
                .message(format!("streamed `{symbol}` response never reports token usage"))
                .note("pass `stream_options={\"include_usage\": True}` to receive a final usage chunk")
                .subject(symbol.as_str())
                .meta("symbol", serde_json::Value::from(symbol.as_str()));
            findings.extend(build(builder, STREAMING_ID));
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

    // -- Tracking ----------------------------------------------------------

    #[test]
    fn raw_constructor_is_reported() {
        let findings = run(&UsageTrackingDetector, "from openai import OpenAI\nc = OpenAI()\nc.chat.completions.create(model='m')\n", "a.py");
        assert_eq!(findings.len(), 1, "only the entry point, not instance calls");
        assert_eq!(findings[0].metadata["wrapper"], "tally_meter_openai");
    }

    #[test]
    fn wrapper_import_silences_tracking() {
        let src = "import tally_meter_openai\nfrom openai import OpenAI\nc = OpenAI()\n";
        assert!(run(&UsageTrackingDetector, src, "a.py").is_empty());
        let src = "import { OpenAI } from '@tally-meter/openai';\nconst c = new OpenAI();\n";
        assert!(run(&UsageTrackingDetector, src, "a.ts").is_empty());
    }

    #[test]
    fn unwrapped_namespaces_are_ignored() {
        let src = "import litellm\nlitellm.completion(model='m', max_tokens=5)\n";
        assert!(run(&UsageTrackingDetector, src, "a.py").is_empty());
    }

    #[test]
    fn google_wrapper_covers_both_namespaces() {
        let src = "from google import genai\nclient = genai.Client()\n";
        let findings = run(&UsageTrackingDetector, src, "a.py");
        assert_eq!(findings[0].metadata["wrapper"], "tally_meter_google");
        let src = "import tally_meter_google as genai\nclient = genai.Client()\n";
        assert!(run(&UsageTrackingDetector, src, "a.py").is_empty());
    }

    // -- Streaming ---------------------------------------------------------

    #[test]
    fn stream_without_usage_option() {
        let src = "from openai import OpenAI\nc = OpenAI()\nc.chat.completions.create(model='m', stream=True, max_tokens=5)\n";
        assert_eq!(run(&StreamingUsageDetector, src, "a.py").len(), 1);
    }

    #[test]
    fn include_usage_clears_the_finding() {
        let src = "from openai import OpenAI\nc = OpenAI()\nc.chat.completions.create(model='m', stream=True, stream_options={'include_usage': True})\n";
        assert!(run(&StreamingUsageDetector, src, "a.py").is_empty());
        let src = "import OpenAI from 'openai';\nconst c = new OpenAI();\nc.chat.completions.create({ model: 'm', stream: true, stream_options: { include_usage: false } });\n";
        assert_eq!(run(&StreamingUsageDetector, src, "a.ts").len(), 1);
    }

    #[test]
    fn non_streaming_and_opt_out_providers() {
        let src = "from openai import OpenAI\nc = OpenAI()\nc.chat.completions.create(model='m', stream=False)\n";
        assert!(run(&StreamingUsageDetector, src, "a.py").is_empty());
        let src = "import anthropic\nc = anthropic.Anthropic()\nwith c.messages.stream(model='m', max_tokens=5, messages=[]) as s:\n    pass\n";
        assert!(run(&StreamingUsageDetector, src, "a.py").is_empty());
    }

    #[test]
    fn stream_helper_method_streams() {
        let src = "from openai import OpenAI\nc = OpenAI()\nc.chat.completions.stream(model='m', messages=[])\n";
        assert_eq!(run(&StreamingUsageDetector, src, "a.py").len(), 1);
    }
}
