//! Argument, loop and environment-read helpers shared by the detectors.

use tally_lang::LanguageFamily;

use crate::binder::{Bindings, ResolvedSymbol};
use crate::finding::Span;
use crate::literal::{self, Value};
use crate::providers::{SETTINGS_CONTAINERS, TOKEN_LIMIT_ARGS};
use crate::source::SourceUnit;
use crate::syntax::{BinOp, Call, CallId, DictKey, Expr, ExprKind, FunctionId, Loop, LoopContext, LoopKind, Syntax};

/// Collection nesting followed when sizing a loop iterable.
const MAX_SIZE_DEPTH: usize = 8;

/// Settings containers followed below the call's own arguments
/// (`body` then `textGenerationConfig`).
const MAX_SETTINGS_DEPTH: usize = 2;

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// A named argument with the scope its value is evaluated in.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Argument<'a> {
    pub name: &'a str,
    pub value: &'a Expr,
    pub function: Option<FunctionId>,
}

/// Named arguments of a call, with statically resolvable `**kwargs` and
/// option objects flattened in.
#[derive(Debug, Clone, Default)]
pub(crate) struct Arguments<'a> {
    pub named: Vec<Argument<'a>>,
    /// Some argument may carry names that are not statically visible.
    pub opaque: bool,
}

impl<'a> Arguments<'a> {
    pub(crate) fn of(unit: &'a SourceUnit, call: &'a Call) -> Self {
        let syntax = unit.syntax();
        let function = call.site.function;
        let mut args = Self {
            named: call
                .keywords
                .iter()
                .map(|k| Argument {
                    name: &k.name,
                    value: &k.value,
                    function,
                })
                .collect(),
            opaque: false,
        };
        for splat in &call.splats {
            args.absorb(syntax, splat, function);
        }
        if unit.family() == LanguageFamily::Node {
            if let Some(first) = call.positional.first() {
                let passes_bag = matches!(
                    first.kind,
                    ExprKind::Name(_) | ExprKind::Path(_) | ExprKind::Member { .. } | ExprKind::Subscript { .. } | ExprKind::Opaque
                );
                if passes_bag {
                    args.absorb(syntax, first, function);
                }
            }
        }
        args
    }

    /// Flattens `expr` when it resolves to a dictionary literal.
    fn absorb(&mut self, syntax: &'a Syntax, expr: &'a Expr, function: Option<FunctionId>) {
        let (value, scope) = literal::follow_scoped(syntax, expr, function);
        match value.as_dict() {
            Some(entries) => {
                for (key, entry) in entries {
                    match key {
                        DictKey::Named(name) => self.named.push(Argument {
                            name,
                            value: entry,
                            function: scope,
                        }),
                        DictKey::Spread => self.absorb(syntax, entry, scope),
                        DictKey::Computed => self.opaque = true,
                    }
                }
            }
            None if matches!(value.kind, ExprKind::Str(_) | ExprKind::Template(_) | ExprKind::Concat(_)) => {}
            None => self.opaque = true,
        }
    }

    /// Last argument named by any of `names`.
    pub(crate) fn get(&self, names: &[&str]) -> Option<&Argument<'a>> {
        self.named.iter().rev().find(|a| names.contains(&a.name))
    }
}

// ---------------------------------------------------------------------------
// Token limits
// ---------------------------------------------------------------------------

/// Outcome of looking for a max-output-token argument.
#[derive(Debug, Clone)]
pub(crate) enum TokenLimit<'a> {
    /// Found; `own` is false when it comes from the model factory.
    Present {
        name: &'a str,
        value: Value,
        own: bool,
    },
    /// Statically absent.
    Absent,
    /// Hidden behind a splat or an unresolvable settings object.
    Unknown,
}

impl TokenLimit<'_> {
    pub(crate) fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Token limit of call `id`, including settings of the model factory it was
/// made through.
pub(crate) fn token_limit<'a>(unit: &'a SourceUnit, id: CallId, resolved: &ResolvedSymbol) -> TokenLimit<'a> {
    let syntax = unit.syntax();
    let Some(call) = syntax.calls.get(id) else {
        return TokenLimit::Unknown;
    };
    let mut opaque = false;
    if let Some((name, value)) = limit_in_call(unit, call, &mut opaque) {
        return TokenLimit::Present { name, value, own: true };
    }
    if let Some(factory) = resolved.factory.and_then(|f| syntax.calls.get(f)) {
        if let Some((name, value)) = limit_in_call(unit, factory, &mut opaque) {
            return TokenLimit::Present { name, value, own: false };
        }
    }
    if opaque {
        TokenLimit::Unknown
    } else {
        TokenLimit::Absent
    }
}

fn limit_in_call<'a>(unit: &'a SourceUnit, call: &'a Call, opaque: &mut bool) -> Option<(&'a str, Value)> {
    limit_in_args(unit, &Arguments::of(unit, call), opaque, 0)
}

fn limit_in_args<'a>(
    unit: &'a SourceUnit,
    args: &Arguments<'a>,
    opaque: &mut bool,
    depth: usize,
) -> Option<(&'a str, Value)> {
    let syntax = unit.syntax();
    *opaque |= args.opaque;
    if let Some(arg) = args.get(TOKEN_LIMIT_ARGS) {
        return Some((arg.name, literal::evaluate(syntax, arg.value, arg.function)));
    }
    if depth >= MAX_SETTINGS_DEPTH {
        return None;
    }
    for container in args.named.iter().filter(|a| SETTINGS_CONTAINERS.contains(&a.name)) {
        let (value, scope) = literal::follow_scoped(syntax, container.value, container.function);
        let nested = match &value.kind {
            ExprKind::Dict(_) => {
                let mut nested = Arguments::default();
                nested.absorb(syntax, value, scope);
                nested
            }
            // A settings builder, or a serializer such as `json.dumps({...})`.
            ExprKind::Call(id) => match syntax.calls.get(*id) {
                Some(call) => {
                    let mut nested = Arguments::of(unit, call);
                    if let (LanguageFamily::Python, Some(first)) = (unit.family(), call.positional.first()) {
                        nested.absorb(syntax, first, call.site.function);
                    }
                    nested
                }
                None => continue,
            },
            ExprKind::Null => continue,
            _ => {
                *opaque = true;
                continue;
            }
        };
        if let Some(found) = limit_in_args(unit, &nested, opaque, depth + 1) {
            return Some(found);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

/// Static iteration count of a single loop, `None` when unknown.
pub(crate) fn loop_bound(syntax: &Syntax, lp: &Loop) -> Option<u64> {
    match lp.kind {
        LoopKind::Counted => lp.header_bound,
        LoopKind::While => None,
        LoopKind::ForEach | LoopKind::Comprehension | LoopKind::Callback => {
            collection_size(syntax, lp.iterable.as_ref()?, lp.function, 0)
        }
    }
}

/// Combined loop context of `call`.
pub(crate) fn loop_context(syntax: &Syntax, call: &Call) -> LoopContext {
    syntax.loop_context(&call.site, |lp| loop_bound(syntax, lp))
}

fn collection_size(syntax: &Syntax, expr: &Expr, function: Option<FunctionId>, depth: usize) -> Option<u64> {
    if depth > MAX_SIZE_DEPTH {
        return None;
    }
    let (expr, function) = literal::follow_scoped(syntax, expr, function);
    match &expr.kind {
        ExprKind::List(items) => {
            let spread = items.iter().any(|i| matches!(i.kind, ExprKind::Splat(_)));
            (!spread).then(|| items.len() as u64)
        }
        ExprKind::Dict(entries) => {
            let spread = entries.iter().any(|(k, _)| *k == DictKey::Spread);
            (!spread).then(|| entries.len() as u64)
        }
        ExprKind::Str(s) => Some(s.chars().count() as u64),
        ExprKind::Comprehension { iterable } => collection_size(syntax, iterable, function, depth + 1),
        ExprKind::Call(id) => {
            let call = syntax.calls.get(*id)?;
            if call.receiver.is_some() || !call.splats.is_empty() {
                return None;
            }
            let first = || call.positional.first();
            let callee: Vec<&str> = call.callee.iter().map(String::as_str).collect();
            match callee.as_slice() {
                ["range"] => range_size(syntax, call),
                ["enumerate" | "list" | "tuple" | "set" | "sorted" | "reversed"] => {
                    collection_size(syntax, first()?, call.site.function, depth + 1)
                }
                ["Object", "keys" | "values" | "entries"] => {
                    collection_size(syntax, first()?, call.site.function, depth + 1)
                }
                ["zip"] => call
                    .positional
                    .iter()
                    .map(|p| collection_size(syntax, p, call.site.function, depth + 1))
                    .collect::<Option<Vec<_>>>()?
                    .into_iter()
                    .min(),
                ["Array", "from"] => {
                    let source = first()?;
                    match source.as_dict() {
                        Some(entries) => entries.iter().find_map(|(k, v)| match k {
                            DictKey::Named(name) if name == "length" => literal::evaluate(syntax, v, call.site.function)
                                .as_int()
                                .and_then(|n| u64::try_from(n).ok()),
                            _ => None,
                        }),
                        None => collection_size(syntax, source, call.site.function, depth + 1),
                    }
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn range_size(syntax: &Syntax, call: &Call) -> Option<u64> {
    if !call.keywords.is_empty() {
        return None;
    }
    let ints = call
        .positional
        .iter()
        .map(|p| literal::evaluate(syntax, p, call.site.function).as_int().map(i128::from))
        .collect::<Option<Vec<_>>>()?;
    let count = match ints.as_slice() {
        [stop] => *stop,
        [start, stop] => stop - start,
        [start, stop, step] if *step > 0 => (stop - start + step - 1).div_euclid(*step),
        [start, stop, step] if *step < 0 => (start - stop - step - 1).div_euclid(-step),
        _ => return None,
    };
    u64::try_from(count.max(0)).ok()
}

/// `true` if `lp` walks a collection rather than counting or polling.
pub(crate) fn iterates_collection(syntax: &Syntax, lp: &Loop) -> bool {
    if !matches!(lp.kind, LoopKind::ForEach | LoopKind::Comprehension | LoopKind::Callback) {
        return false;
    }
    let Some(iterable) = &lp.iterable else {
        return false;
    };
    is_collection(syntax, iterable, lp.function, 0)
}

fn is_collection(syntax: &Syntax, expr: &Expr, function: Option<FunctionId>, depth: usize) -> bool {
    if depth > MAX_SIZE_DEPTH {
        return false;
    }
    if let ExprKind::Name(name) = &expr.kind {
        if syntax.is_parameter(name, function) {
            return true;
        }
    }
    let (expr, function) = literal::follow_scoped(syntax, expr, function);
    match &expr.kind {
        ExprKind::List(_) | ExprKind::Comprehension { .. } => true,
        ExprKind::Name(name) => syntax.is_parameter(name, function),
        ExprKind::Call(id) => syntax.calls.get(*id).is_some_and(|call| {
            let wraps = matches!(
                call.callee.as_slice(),
                [f] if matches!(f.as_str(), "enumerate" | "list" | "tuple" | "sorted" | "reversed" | "zip")
            );
            wraps
                && call.receiver.is_none()
                && call
                    .positional
                    .first()
                    .is_some_and(|p| is_collection(syntax, p, call.site.function, depth + 1))
        }),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Environment reads
// ---------------------------------------------------------------------------

/// An environment-variable read, possibly with a literal default.
#[derive(Debug, Clone)]
pub(crate) struct EnvLookup<'a> {
    /// Span of the whole expression.
    pub span: Span,
    /// Variable name, when it is a literal.
    pub key: Option<String>,
    /// Default used when the variable is not set.
    pub default: Option<&'a Expr>,
    /// The read without its default, as source text.
    pub without_default: String,
}

/// Recognizes `os.getenv(K, d)`, `os.environ.get(K, d)`, `os.environ[K]`,
/// `getenv(K)`, `<read> or d` and `process.env.K || d` / `?? d`.
pub(crate) fn env_lookup<'a>(
    unit: &'a SourceUnit,
    bindings: &Bindings,
    expr: &'a Expr,
    function: Option<FunctionId>,
) -> Option<EnvLookup<'a>> {
    let syntax = unit.syntax();
    match &expr.kind {
        ExprKind::Binary {
            op: BinOp::Or | BinOp::Coalesce,
            left,
            right,
        } => {
            let read = env_lookup(unit, bindings, left, function)?;
            Some(EnvLookup {
                span: expr.span,
                key: read.key,
                default: Some(right),
                without_default: unit.slice(left.span).to_string(),
            })
        }
        ExprKind::Call(id) if unit.family() == LanguageFamily::Python => {
            let call = syntax.calls.get(*id)?;
            if call.receiver.is_some() || !is_env_call(bindings, &call.callee) {
                return None;
            }
            let key_expr = call.positional.first()?;
            let key = literal::evaluate(syntax, key_expr, call.site.function)
                .as_str()
                .map(str::to_string);
            let default = call
                .positional
                .get(1)
                .or_else(|| call.keyword(&["default"]).map(|k| &k.value));
            let without_default = match default {
                Some(_) => format!("{})", unit.slice(Span::new(call.span.start, key_expr.span.end))),
                None => unit.slice(call.span).to_string(),
            };
            Some(EnvLookup {
                span: call.span,
                key,
                default,
                without_default,
            })
        }
        ExprKind::Path(path) if unit.family() == LanguageFamily::Node => match path.as_slice() {
            [process, env, key] if process == "process" && env == "env" => Some(EnvLookup {
                span: expr.span,
                key: Some(key.clone()),
                default: None,
                without_default: unit.slice(expr.span).to_string(),
            }),
            _ => None,
        },
        ExprKind::Subscript { object, index } => {
            let environ = match (&object.kind, unit.family()) {
                (ExprKind::Path(p), LanguageFamily::Node) => p.len() == 2 && p[0] == "process" && p[1] == "env",
                (ExprKind::Path(p), LanguageFamily::Python) => p.len() == 2 && is_os(bindings, &p[0]) && p[1] == "environ",
                (ExprKind::Name(n), LanguageFamily::Python) => n == "environ",
                _ => false,
            };
            environ.then(|| EnvLookup {
                span: expr.span,
                key: literal::evaluate(syntax, index, function).as_str().map(str::to_string),
                default: None,
                without_default: unit.slice(expr.span).to_string(),
            })
        }
        _ => None,
    }
}

fn is_env_call(bindings: &Bindings, callee: &[String]) -> bool {
    match callee {
        [f] => f == "getenv",
        [a, f] => (is_os(bindings, a) && f == "getenv") || (a == "environ" && f == "get"),
        [a, environ, f] => is_os(bindings, a) && environ == "environ" && f == "get",
        _ => false,
    }
}

fn is_os(bindings: &Bindings, alias: &str) -> bool {
    match bindings.binding_for(alias) {
        Some(binding) => binding.module == "os" && binding.canonical.is_none(),
        None => alias == "os",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn unit(src: &str, path: &str) -> SourceUnit {
        SourceUnit::parse(src, path).unwrap()
    }

    fn bound_of_first_loop(src: &str, path: &str) -> Option<u64> {
        let unit = unit(src, path);
        let syntax = unit.syntax();
        loop_bound(syntax, &syntax.loops[0])
    }

    // -- Loop bounds -------------------------------------------------------

    #[test]
    fn range_bounds() {
        assert_eq!(bound_of_first_loop("for i in range(50):\n    pass\n", "a.py"), Some(50));
        assert_eq!(bound_of_first_loop("for i in range(5, 25):\n    pass\n", "a.py"), Some(20));
        assert_eq!(bound_of_first_loop("for i in range(0, 10, 3):\n    pass\n", "a.py"), Some(4));
        assert_eq!(bound_of_first_loop("for i in range(10, 0, -2):\n    pass\n", "a.py"), Some(5));
        assert_eq!(bound_of_first_loop("N = 7\nfor i in range(N):\n    pass\n", "a.py"), Some(7));
        assert_eq!(bound_of_first_loop("def f(n):\n    for i in range(n):\n        pass\n", "a.py"), None);
    }

    #[test]
    fn literal_collections_are_sized() {
        assert_eq!(bound_of_first_loop("xs = ['a', 'b', 'c']\nfor x in xs:\n    pass\n", "a.py"), Some(3));
        assert_eq!(bound_of_first_loop("for i, x in enumerate(['a', 'b']):\n    pass\n", "a.py"), Some(2));
        assert_eq!(bound_of_first_loop("for (const x of [1, 2, 3, 4]) {}\n", "a.js"), Some(4));
        assert_eq!(bound_of_first_loop("for x in load():\n    pass\n", "a.py"), None);
    }

    #[test]
    fn while_loops_are_unbounded() {
        assert_eq!(bound_of_first_loop("while True:\n    pass\n", "a.py"), None);
    }

    #[test]
    fn collections_include_parameters() {
        let unit = unit("def f(docs):\n    for d in docs:\n        pass\n    for i in range(3):\n        pass\n", "a.py");
        let syntax = unit.syntax();
        assert!(iterates_collection(syntax, &syntax.loops[0]));
        assert!(!iterates_collection(syntax, &syntax.loops[1]));
    }

    // -- Token limits ------------------------------------------------------

    fn limit_of_last_call(src: &str, path: &str) -> String {
        let unit = unit(src, path);
        let bindings = Bindings::bind(&unit, &Config::default());
        let (id, resolved) = bindings.resolved_calls().last().unwrap();
        match token_limit(&unit, id, resolved) {
            TokenLimit::Present { name, value, own } => format!("{name}={:?} own={own}", value.as_int()),
            TokenLimit::Absent => "absent".to_string(),
            TokenLimit::Unknown => "unknown".to_string(),
        }
    }

    #[test]
    fn direct_and_nested_token_limits() {
        let direct = "from openai import OpenAI\nc = OpenAI()\nc.chat.completions.create(model='m', max_tokens=500)\n";
        assert_eq!(limit_of_last_call(direct, "a.py"), "max_tokens=Some(500) own=true");
        let nested = "import ollama\nollama.chat(model='m', options={'num_predict': 64})\n";
        assert_eq!(limit_of_last_call(nested, "a.py"), "num_predict=Some(64) own=true");
        let absent = "from openai import OpenAI\nc = OpenAI()\nc.chat.completions.create(model='m')\n";
        assert_eq!(limit_of_last_call(absent, "a.py"), "absent");
    }

    #[test]
    fn splats_make_limit_unknown_unless_resolvable() {
        let opaque = "from openai import OpenAI\nc = OpenAI()\ndef f(kw):\n    c.chat.completions.create(**kw)\n";
        assert_eq!(limit_of_last_call(opaque, "a.py"), "unknown");
        let known = "from openai import OpenAI\nc = OpenAI()\nkw = {'max_tokens': 9}\nc.chat.completions.create(**kw)\n";
        assert_eq!(limit_of_last_call(known, "a.py"), "max_tokens=Some(9) own=true");
    }

    #[test]
    fn factory_settings_apply_to_completions() {
        let src = "import google.generativeai as genai\nm = genai.GenerativeModel('gemini-pro', generation_config={'max_output_tokens': 100})\nm.generate_content('hi')\n";
        assert_eq!(limit_of_last_call(src, "a.py"), "max_output_tokens=Some(100) own=false");
    }

    #[test]
    fn bedrock_request_bodies() {
        let titan = "import boto3, json\nrt = boto3.client('bedrock-runtime')\nrt.invoke_model(modelId='amazon.titan-text-express-v1', body=json.dumps({'inputText': 'hi', 'textGenerationConfig': {'maxTokenCount': 256}}))\n";
        assert_eq!(limit_of_last_call(titan, "a.py"), "maxTokenCount=Some(256) own=true");
        let converse = "import boto3\nrt = boto3.client('bedrock-runtime')\nrt.converse(modelId='anthropic.claude-3-haiku-20240307-v1:0', messages=[], inferenceConfig={'maxTokens': 300})\n";
        assert_eq!(limit_of_last_call(converse, "a.py"), "maxTokens=Some(300) own=true");
        let opaque = "import boto3\nrt = boto3.client('bedrock-runtime')\ndef ask(payload):\n    rt.invoke_model(modelId='m', body=payload)\n";
        assert_eq!(limit_of_last_call(opaque, "a.py"), "unknown");
    }

    #[test]
    fn node_options_bag_variable() {
        let src = "import OpenAI from 'openai';\nconst c = new OpenAI();\nconst params = { model: 'gpt-4o', max_tokens: 50 };\nc.chat.completions.create(params);\n";
        assert_eq!(limit_of_last_call(src, "a.ts"), "max_tokens=Some(50) own=true");
    }

    // -- Environment reads -------------------------------------------------

    fn lookup_of(src: &str, path: &str) -> Option<(Option<String>, bool, String)> {
        let unit = unit(src, path);
        let bindings = Bindings::bind(&unit, &Config::default());
        let assignment = unit.syntax().assignments.last()?;
        env_lookup(&unit, &bindings, &assignment.value, assignment.site.function)
            .map(|l| (l.key, l.default.is_some(), l.without_default))
    }

    #[test]
    fn python_env_reads() {
        let (key, has_default, bare) = lookup_of("import os\nk = os.getenv('OPENAI_API_KEY', 'sk-x')\n", "a.py").unwrap();
        assert_eq!(key.as_deref(), Some("OPENAI_API_KEY"));
        assert!(has_default);
        assert_eq!(bare, "os.getenv('OPENAI_API_KEY')");

        let (_, has_default, bare) = lookup_of("import os\nk = os.environ.get('K') or 'sk-x'\n", "a.py").unwrap();
        assert!(has_default);
        assert_eq!(bare, "os.environ.get('K')");

        let (_, has_default, _) = lookup_of("import os\nk = os.environ['K']\n", "a.py").unwrap();
        assert!(!has_default);
        assert!(lookup_of("k = config.get('K', 'x')\n", "a.py").is_none());
    }

    #[test]
    fn node_env_reads() {
        let (key, has_default, bare) = lookup_of("const k = process.env.OPENAI_API_KEY ?? 'sk-x';\n", "a.js").unwrap();
        assert_eq!(key.as_deref(), Some("OPENAI_API_KEY"));
        assert!(has_default);
        assert_eq!(bare, "process.env.OPENAI_API_KEY");
    }
}
