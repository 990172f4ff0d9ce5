//! Import aliasing and call resolution.
//!
//! [`Bindings::bind`] walks the imports of a [`SourceUnit`] and builds the
//! alias table; every call is then resolved once to a [`ResolvedSymbol`]:
//! the provider, the canonical path below the provider namespace, and the
//! [`CallKind`] that path has in the provider tables. Detectors only look at
//! resolved symbols.
//!
//! Resolution rules:
//!
//! - The last import binding for an alias (in lexical order) wins.
//! - A local assignment visible at the call shadows an import of the same
//!   name unless its value is itself a provider instance or symbol.
//! - `x = Client(...)`, `self.x = Client(...)` and `const x = new Client()`
//!   make `x` an instance; calls on `x` resolve below the constructor's path.
//! - Wrapper modules re-export their namespace and mark it as metered.
//! - Calls below a service-gated SDK (`boto3`) resolve only when their
//!   client was created for a model runtime service.
//! - A client built with an OpenAI-compatible endpoint of another provider
//!   (`base_url="https://api.perplexity.ai"`) is attributed to that provider.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tally_lang::LanguageFamily;
use tracing::debug;

use crate::config::Config;
use crate::finding::Span;
use crate::literal;
use crate::providers::{
    endpoint_provider, is_known_package, lookup_module, match_method_shape, match_shape, namespace_module,
    service_gate, CallKind, CallShape, ModuleMatch, Provider, ENDPOINT_ARGS, SERVICE_ARGS, SERVICE_CLIENT_FACTORY,
};
use crate::source::SourceUnit;
use crate::syntax::{Call, CallId, ExprKind, FunctionId, ImportKind, ImportStyle, Syntax};

/// Instance and alias indirections followed before giving up.
const MAX_RESOLVE_DEPTH: usize = 12;

// ---------------------------------------------------------------------------
// ImportBinding
// ---------------------------------------------------------------------------

/// What an import binding binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    /// The module object (`import openai`, `import * as ai from 'openai'`,
    /// `const OpenAI = require('openai')`).
    Module,
    /// One exported member (`from openai import OpenAI`, `import { X }`).
    Member,
    /// Every export of the module (`from openai import *`).
    Wildcard,
    /// Any import of a metering wrapper module.
    AutoPatch,
    /// Loaded for side effects only.
    SideEffect,
}

/// How a binding resolves to a canonical path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// Python dotted path; canonicalized by longest known module prefix.
    Dotted(Vec<String>),
    /// npm package plus the members selected by the import.
    Package { matched: ModuleMatch, below: Vec<String> },
    /// Unknown module.
    Unresolved,
}

/// One local name bound by an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    /// Local alias; `None` for wildcard and side-effect imports.
    pub alias: Option<String>,
    /// Canonical symbol the alias denotes (`openai.OpenAI`), when the import
    /// alone determines it.
    pub canonical: Option<String>,
    /// Provider of the canonical symbol.
    pub provider: Option<Provider>,
    /// Canonical namespace of the symbol.
    pub namespace: Option<&'static str>,
    /// Binding kind.
    pub kind: BindingKind,
    /// Module as written.
    pub module: String,
    /// Index into [`Syntax::imports`].
    pub import: usize,
    /// Statement id shared by the bindings of one import statement.
    pub statement: usize,
    /// Span of the import statement.
    pub span: Span,
    /// Namespaces metered by this import when it is a wrapper.
    pub wraps: Vec<String>,
    target: Target,
}

impl ImportBinding {
    /// `true` when the module is not a known provider or wrapper.
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        self.target == Target::Unresolved
    }
}

// ---------------------------------------------------------------------------
// ResolvedSymbol
// ---------------------------------------------------------------------------

/// A call resolved against the provider tables.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSymbol {
    /// Provider.
    pub provider: Provider,
    /// Canonical namespace (`openai`, `google.genai`).
    pub namespace: &'static str,
    /// Path below the namespace, instance chain included
    /// (`OpenAI.chat.completions.create`).
    pub path: Vec<String>,
    /// Canonical symbol of the instance the call was made on.
    pub instance_of: Option<String>,
    /// Call kind.
    pub kind: CallKind,
    /// Matched shape.
    pub shape: Option<&'static CallShape>,
    /// Index into [`Bindings::imports`] of the binding the chain starts from.
    pub binding: Option<usize>,
    /// Call that created the instance this call was made on.
    pub constructor: Option<CallId>,
    /// Model-factory call whose settings apply to this call.
    pub factory: Option<CallId>,
}

impl ResolvedSymbol {
    /// Dotted canonical symbol.
    #[must_use]
    pub fn canonical(&self) -> String {
        canonical_name(self.namespace, &self.path)
    }

    /// `true` when reached through a client or model instance.
    #[must_use]
    pub fn is_instance(&self) -> bool {
        self.instance_of.is_some()
    }

    /// Batch-capable alternative, when one exists.
    #[must_use]
    pub fn batch(&self) -> Option<&'static str> {
        self.shape.and_then(|s| s.batch)
    }

    /// `true` when the shape itself streams.
    #[must_use]
    pub fn streams(&self) -> bool {
        self.shape.is_some_and(|s| s.streams)
    }

    /// Class that produced the chain (`ChatOpenAI`), for provider hints.
    #[must_use]
    pub fn root_class(&self) -> Option<&str> {
        self.path.first().map(String::as_str)
    }
}

fn canonical_name(namespace: &str, path: &[String]) -> String {
    if path.is_empty() {
        namespace.to_string()
    } else {
        format!("{namespace}.{}", path.join("."))
    }
}

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

/// Alias table and resolved calls of one source unit.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    imports: Vec<ImportBinding>,
    by_alias: HashMap<String, usize>,
    metered: BTreeSet<String>,
    resolved: Vec<Option<ResolvedSymbol>>,
}

impl Bindings {
    /// Binds the imports of `unit` and resolves every call.
    #[must_use]
    pub fn bind(unit: &SourceUnit, config: &Config) -> Self {
        let family = unit.family();
        let syntax = unit.syntax();
        let mut bindings = Self::default();

        for (index, import) in syntax.imports.iter().enumerate() {
            for binding in bind_import(index, import, family, config) {
                bindings.metered.extend(binding.wraps.iter().cloned());
                if let Some(alias) = &binding.alias {
                    bindings.by_alias.insert(alias.clone(), bindings.imports.len());
                }
                bindings.imports.push(binding);
            }
        }

        bindings.resolved = (0..syntax.calls.len())
            .map(|id| bindings.resolve_call(syntax, id, 0))
            .collect();
        bindings.resolved = (0..syntax.calls.len())
            .map(|id| bindings.settle_client(syntax, id))
            .collect();

        debug!(
            path = unit.path(),
            imports = bindings.imports.len(),
            resolved = bindings.resolved.iter().flatten().count(),
            metered = bindings.metered.len(),
            "bound source unit"
        );
        bindings
    }

    /// Every import binding in lexical order.
    #[must_use]
    pub fn imports(&self) -> &[ImportBinding] {
        &self.imports
    }

    /// The binding currently in effect for `alias`.
    #[must_use]
    pub fn binding_for(&self, alias: &str) -> Option<&ImportBinding> {
        self.by_alias.get(alias).and_then(|i| self.imports.get(*i))
    }

    /// Providers reached by any import of the unit, and by any resolved call.
    ///
    /// Service-gated SDK imports only count through calls on a client of a
    /// gated service.
    #[must_use]
    pub fn providers(&self) -> BTreeSet<Provider> {
        let imported = self
            .imports
            .iter()
            .filter(|b| b.namespace.map_or(true, |ns| service_gate(ns).is_none()))
            .filter_map(|b| b.provider);
        let called = self.resolved.iter().flatten().map(|r| r.provider);
        imported.chain(called).collect()
    }

    /// `true` if a wrapper import meters `namespace`.
    #[must_use]
    pub fn is_metered(&self, namespace: &str) -> bool {
        self.metered.contains(namespace)
    }

    /// Resolution of call `id`.
    #[must_use]
    pub fn resolved(&self, id: CallId) -> Option<&ResolvedSymbol> {
        self.resolved.get(id).and_then(Option::as_ref)
    }

    /// Resolved calls in call order.
    pub fn resolved_calls(&self) -> impl Iterator<Item = (CallId, &ResolvedSymbol)> {
        self.resolved
            .iter()
            .enumerate()
            .filter_map(|(id, r)| r.as_ref().map(|r| (id, r)))
    }

    /// Resolves a dotted attribute path (an assignment target such as
    /// `openai.api_key`) seen at `offset`.
    #[must_use]
    pub fn resolve_path(
        &self,
        syntax: &Syntax,
        path: &[String],
        offset: usize,
        function: Option<FunctionId>,
    ) -> Option<ResolvedSymbol> {
        self.resolve_segments(syntax, path, offset, function, 0)
    }

    // -- Resolution --------------------------------------------------------

    /// Applies the settings of the client call `id` was made through: the
    /// service a gated SDK client was created for and the endpoint a client
    /// was pointed at.
    fn settle_client(&self, syntax: &Syntax, id: CallId) -> Option<ResolvedSymbol> {
        let mut symbol = self.resolved(id)?.clone();
        let chain = self.creation_chain(id);

        if let Some(services) = service_gate(symbol.namespace) {
            let service = chain
                .iter()
                .filter(|c| {
                    self.resolved(**c)
                        .and_then(|r| r.path.last())
                        .is_some_and(|m| m == SERVICE_CLIENT_FACTORY)
                })
                .find_map(|c| string_argument(syntax, syntax.calls.get(*c)?, SERVICE_ARGS, Some(0)));
            if !service.is_some_and(|s| services.contains(&s.as_str())) {
                return None;
            }
        }

        if symbol.provider == Provider::OpenAi {
            let endpoint = chain
                .iter()
                .find_map(|c| string_argument(syntax, syntax.calls.get(*c)?, ENDPOINT_ARGS, None));
            if let Some(provider) = endpoint.as_deref().and_then(endpoint_provider) {
                debug!(call = id, provider = %provider, "client endpoint names another provider");
                symbol.provider = provider;
            }
        }
        Some(symbol)
    }

    /// `id` followed by the calls that created the instances it was made on,
    /// nearest first.
    fn creation_chain(&self, id: CallId) -> Vec<CallId> {
        let mut chain = vec![id];
        let mut next = self.resolved(id).and_then(|r| r.constructor);
        while let Some(created) = next {
            if chain.len() > MAX_RESOLVE_DEPTH || chain.contains(&created) {
                break;
            }
            chain.push(created);
            next = self.resolved(created).and_then(|r| r.constructor);
        }
        chain
    }

    fn resolve_call(&self, syntax: &Syntax, id: CallId, depth: usize) -> Option<ResolvedSymbol> {
        if depth > MAX_RESOLVE_DEPTH {
            return None;
        }
        let call = syntax.calls.get(id)?;
        match call.receiver {
            Some(receiver) => {
                let base = self.resolve_call(syntax, receiver, depth + 1)?;
                base.kind
                    .creates_instance()
                    .then(|| extend_instance(&base, receiver, &call.callee))
            }
            None => self.resolve_segments(syntax, &call.callee, call.span.start, call.site.function, depth),
        }
    }

    fn resolve_segments(
        &self,
        syntax: &Syntax,
        segments: &[String],
        offset: usize,
        function: Option<FunctionId>,
        depth: usize,
    ) -> Option<ResolvedSymbol> {
        if depth > MAX_RESOLVE_DEPTH {
            return None;
        }
        let head = segments.first()?;
        let member_of_self = matches!(head.as_str(), "self" | "this") && segments.len() >= 2;
        let key_len = if member_of_self { 2 } else { 1 };
        let key = &segments[..key_len];

        if !member_of_self && syntax.is_parameter(head, function) {
            return None;
        }
        let assignment = if member_of_self {
            syntax.assignments.iter().filter(|a| a.target == key).last()
        } else {
            syntax.visible_assignment(key, offset, function)
        };
        if let Some(assignment) = assignment {
            let value = literal::follow(syntax, &assignment.value, assignment.site.function);
            return match &value.kind {
                ExprKind::Call(created) => {
                    let base = self.resolve_call(syntax, *created, depth + 1)?;
                    base.kind
                        .creates_instance()
                        .then(|| extend_instance(&base, *created, &segments[key_len..]))
                }
                ExprKind::Name(_) | ExprKind::Path(_) => {
                    let mut path = value.path()?;
                    path.extend_from_slice(&segments[key_len..]);
                    self.resolve_segments(syntax, &path, value.span.start, assignment.site.function, depth + 1)
                }
                _ => None,
            };
        }
        if member_of_self {
            return None;
        }

        match self.by_alias.get(head) {
            Some(&index) => {
                let binding = self.imports.get(index)?;
                let (provider, namespace, path) = canonicalize(&binding.target, &segments[1..])?;
                Some(symbol(provider, namespace, path, Some(index)))
            }
            None => self
                .imports
                .iter()
                .enumerate()
                .rev()
                .filter(|(_, b)| b.kind == BindingKind::Wildcard)
                .find_map(|(index, binding)| {
                    let (provider, namespace, path) = canonicalize(&binding.target, segments)?;
                    let resolved = symbol(provider, namespace, path, Some(index));
                    resolved.shape.is_some().then_some(resolved)
                }),
        }
    }
}

/// String literal passed to `call` as one of `names`, or at `slot`.
fn string_argument(syntax: &Syntax, call: &Call, names: &[&str], slot: Option<usize>) -> Option<String> {
    let expr = call
        .keyword(names)
        .map(|k| &k.value)
        .or_else(|| slot.and_then(|s| call.positional.get(s)))?;
    literal::evaluate(syntax, expr, call.site.function)
        .as_str()
        .map(str::to_string)
}

fn symbol(provider: Provider, namespace: &'static str, path: Vec<String>, binding: Option<usize>) -> ResolvedSymbol {
    let shape = match_shape(provider, &path);
    ResolvedSymbol {
        provider,
        namespace,
        kind: shape.map_or(CallKind::Other, |s| s.kind),
        shape,
        path,
        instance_of: None,
        binding,
        constructor: None,
        factory: None,
    }
}

/// Extends an instance created by call `created` with `members`.
fn extend_instance(base: &ResolvedSymbol, created: CallId, members: &[String]) -> ResolvedSymbol {
    let mut path = base.path.clone();
    path.extend_from_slice(members);
    let (kind, shape) = if members.is_empty() {
        let kind = if base.kind == CallKind::ChatModel {
            CallKind::Invocation
        } else {
            CallKind::Other
        };
        (kind, None)
    } else {
        let shape = match_method_shape(base.provider, &path);
        (shape.map_or(CallKind::Other, |s| s.kind), shape)
    };
    ResolvedSymbol {
        provider: base.provider,
        namespace: base.namespace,
        instance_of: Some(base.canonical()),
        kind,
        shape,
        path,
        binding: base.binding,
        constructor: Some(created),
        factory: if base.kind == CallKind::ModelFactory {
            Some(created)
        } else {
            base.factory
        },
    }
}

/// Canonical `(provider, namespace, path)` of `target` followed by `tail`.
fn canonicalize(target: &Target, tail: &[String]) -> Option<(Provider, &'static str, Vec<String>)> {
    match target {
        Target::Dotted(prefix) => {
            let full: Vec<String> = prefix.iter().chain(tail).cloned().collect();
            let matched = lookup_module(&full.join("."), LanguageFamily::Python)?;
            Some((matched.provider, matched.namespace, matched.rest))
        }
        Target::Package { matched, below } => {
            let path = if below.is_empty() && tail.is_empty() {
                matched.default_export.map(str::to_string).into_iter().collect()
            } else {
                below.iter().chain(tail).cloned().collect()
            };
            Some((matched.provider, matched.namespace, path))
        }
        Target::Unresolved => None,
    }
}

// ---------------------------------------------------------------------------
// Import binding
// ---------------------------------------------------------------------------

fn bind_import(
    index: usize,
    import: &crate::syntax::Import,
    family: LanguageFamily,
    config: &Config,
) -> Vec<ImportBinding> {
    let wraps: Vec<String> = config
        .wrapper_namespaces(&import.module, family)
        .into_iter()
        .map(str::to_string)
        .collect();
    let binding = |alias: Option<String>, kind: BindingKind, target: Target| {
        let resolved = canonicalize(&target, &[]);
        ImportBinding {
            alias,
            canonical: resolved.as_ref().map(|(_, ns, path)| canonical_name(ns, path)),
            provider: resolved.as_ref().map(|(p, _, _)| *p),
            namespace: resolved.map(|(_, ns, _)| ns),
            kind: if wraps.is_empty() { kind } else { BindingKind::AutoPatch },
            module: import.module.clone(),
            import: index,
            statement: import.statement,
            span: import.span,
            wraps: wraps.clone(),
            target,
        }
    };

    // Both the wrapper's own path and the module it re-exports resolve to it.
    let module_target = |member: Option<&str>| -> Target {
        match family {
            LanguageFamily::Python => {
                let base = match wraps.first() {
                    Some(namespace) => namespace_module(namespace, family)
                        .map_or_else(|| namespace.clone(), |e| e.module.to_string()),
                    None => import.module.clone(),
                };
                let mut path: Vec<String> = base.split('.').map(str::to_string).collect();
                path.extend(member.map(str::to_string));
                if lookup_module(&path.join("."), family).is_some() {
                    Target::Dotted(path)
                } else {
                    Target::Unresolved
                }
            }
            LanguageFamily::Node => {
                let matched = match wraps.first() {
                    Some(namespace) => namespace_module(namespace, family)
                        .and_then(|e| lookup_module(e.module, family)),
                    None => lookup_module(&import.module, family),
                };
                match matched {
                    Some(matched) => {
                        let below = match member {
                            Some("default") => matched.default_export.map(str::to_string).into_iter().collect(),
                            Some(name) => vec![name.to_string()],
                            None => Vec::new(),
                        };
                        Target::Package { matched, below }
                    }
                    None => Target::Unresolved,
                }
            }
        }
    };

    match &import.kind {
        ImportKind::Module { alias, bound } => {
            let target = if import.style == ImportStyle::PyImport && wraps.is_empty() {
                // `import google.generativeai` binds `google`, which only
                // resolves together with the attribute path after it.
                if is_known_package(bound, family) {
                    Target::Dotted(bound.split('.').map(str::to_string).collect())
                } else {
                    Target::Unresolved
                }
            } else {
                module_target(None)
            };
            vec![binding(Some(alias.clone()), BindingKind::Module, target)]
        }
        ImportKind::Members(names) => names
            .iter()
            .map(|name| {
                binding(
                    Some(name.alias.clone()),
                    BindingKind::Member,
                    module_target(Some(&name.name)),
                )
            })
            .collect(),
        ImportKind::Wildcard => vec![binding(None, BindingKind::Wildcard, module_target(None))],
        ImportKind::SideEffect => vec![binding(None, BindingKind::SideEffect, Target::Unresolved)],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn bind(src: &str, path: &str) -> (SourceUnit, Bindings) {
        let unit = SourceUnit::parse(src, path).unwrap();
        let bindings = Bindings::bind(&unit, &Config::default());
        (unit, bindings)
    }

    /// Resolution of the last call whose callee ends with `method`.
    fn resolved<'b>(unit: &SourceUnit, bindings: &'b Bindings, method: &str) -> Option<&'b ResolvedSymbol> {
        let id = unit
            .syntax()
            .calls
            .iter()
            .rposition(|c| c.callee.last().is_some_and(|m| m == method))?;
        bindings.resolved(id)
    }

    // -- Imports -----------------------------------------------------------

    #[test]
    fn member_import_canonical_symbol() {
        let (_, bindings) = bind("from langchain_openai import ChatOpenAI as LLM\n", "a.py");
        let binding = bindings.binding_for("LLM").unwrap();
        assert_eq!(binding.canonical.as_deref(), Some("langchain.ChatOpenAI"));
        assert_eq!(binding.provider, Some(Provider::LangChain));
        assert_eq!(binding.kind, BindingKind::Member);
    }

    #[test]
    fn unknown_modules_are_recorded_unresolved() {
        let (_, bindings) = bind("import requests\nimport os\n", "a.py");
        assert_eq!(bindings.imports().len(), 2);
        assert!(bindings.imports().iter().all(ImportBinding::is_unresolved));
    }

    #[test]
    fn last_binding_for_alias_wins() {
        let src = "from openai import OpenAI as Client\nfrom anthropic import Anthropic as Client\nc = Client()\n";
        let (unit, bindings) = bind(src, "a.py");
        let symbol = resolved(&unit, &bindings, "Client").unwrap();
        assert_eq!(symbol.provider, Provider::Anthropic);
        assert_eq!(symbol.canonical(), "anthropic.Anthropic");
    }

    #[test]
    fn destructured_require_binds_each_name() {
        let src = "const { OpenAI, AzureOpenAI: Azure } = require('openai');\n";
        let (_, bindings) = bind(src, "a.js");
        assert_eq!(bindings.binding_for("OpenAI").unwrap().canonical.as_deref(), Some("openai.OpenAI"));
        assert_eq!(bindings.binding_for("Azure").unwrap().canonical.as_deref(), Some("openai.AzureOpenAI"));
    }

    #[test]
    fn wrapper_import_marks_namespace_metered() {
        let src = "from tally_meter_openai import OpenAI\nclient = OpenAI()\n";
        let (unit, bindings) = bind(src, "a.py");
        assert!(bindings.is_metered("openai"));
        assert_eq!(bindings.imports()[0].kind, BindingKind::AutoPatch);
        let symbol = resolved(&unit, &bindings, "OpenAI").unwrap();
        assert_eq!(symbol.kind, CallKind::Constructor);
    }

    // -- Calls -------------------------------------------------------------

    #[test]
    fn instance_methods_resolve_through_constructor() {
        let src = "import openai\nclient = openai.OpenAI()\nclient.chat.completions.create(model='gpt-4')\n";
        let (unit, bindings) = bind(src, "a.py");
        let symbol = resolved(&unit, &bindings, "create").unwrap();
        assert_eq!(symbol.kind, CallKind::Completion);
        assert_eq!(symbol.instance_of.as_deref(), Some("openai.OpenAI"));
        assert_eq!(symbol.canonical(), "openai.OpenAI.chat.completions.create");
    }

    #[test]
    fn self_attribute_instances_cross_methods() {
        let src = "\
from anthropic import Anthropic
class Agent:
    def __init__(self):
        self.client = Anthropic()
    def run(self):
        return self.client.messages.create(model='claude-3-haiku')
";
        let (unit, bindings) = bind(src, "a.py");
        assert_eq!(resolved(&unit, &bindings, "create").unwrap().kind, CallKind::Completion);
    }

    #[test]
    fn dotted_plain_import_resolves_with_attribute_path() {
        let src = "import google.generativeai\nm = google.generativeai.GenerativeModel('gemini-pro')\nm.generate_content('hi')\n";
        let (unit, bindings) = bind(src, "a.py");
        let factory = resolved(&unit, &bindings, "GenerativeModel").unwrap();
        assert_eq!(factory.kind, CallKind::ModelFactory);
        assert_eq!(factory.namespace, "google.generativeai");
        let completion = resolved(&unit, &bindings, "generate_content").unwrap();
        assert_eq!(completion.kind, CallKind::Completion);
        assert!(completion.factory.is_some());
    }

    #[test]
    fn from_google_import_genai() {
        let src = "from google import genai\nclient = genai.Client()\nclient.models.generate_content(model='gemini-2.5-pro')\n";
        let (unit, bindings) = bind(src, "a.py");
        let symbol = resolved(&unit, &bindings, "generate_content").unwrap();
        assert_eq!(symbol.namespace, "google.genai");
        assert_eq!(symbol.kind, CallKind::Completion);
    }

    #[test]
    fn default_import_and_new_expression() {
        let src = "import OpenAI from 'openai';\nconst client = new OpenAI();\nawait client.chat.completions.create({ model: 'gpt-4o' });\n";
        let (unit, bindings) = bind(src, "a.ts");
        assert_eq!(resolved(&unit, &bindings, "OpenAI").unwrap().kind, CallKind::Constructor);
        assert_eq!(resolved(&unit, &bindings, "create").unwrap().kind, CallKind::Completion);
    }

    #[test]
    fn module_require_called_directly_uses_default_export() {
        let src = "const Anthropic = require('@anthropic-ai/sdk');\nconst c = new Anthropic();\nc.messages.create({});\n";
        let (unit, bindings) = bind(src, "a.js");
        let symbol = resolved(&unit, &bindings, "create").unwrap();
        assert_eq!(symbol.canonical(), "anthropic.Anthropic.messages.create");
    }

    #[test]
    fn chained_constructor_call_resolves() {
        let src = "from openai import OpenAI\nOpenAI().embeddings.create(input='x')\n";
        let (unit, bindings) = bind(src, "a.py");
        assert_eq!(resolved(&unit, &bindings, "create").unwrap().kind, CallKind::Embedding);
    }

    #[test]
    fn chat_model_calls_are_invocations() {
        let src = "from langchain_openai import ChatOpenAI\nllm = ChatOpenAI()\nllm.invoke('q')\nllm.bind_tools([]).invoke('q')\nllm('q')\n";
        let (unit, bindings) = bind(src, "a.py");
        let calls: Vec<_> = bindings.resolved_calls().map(|(_, r)| r.kind).collect();
        assert_eq!(
            calls.iter().filter(|k| **k == CallKind::Invocation).count(),
            3,
            "{calls:?}"
        );
    }

    #[test]
    fn shadowing_assignment_hides_import() {
        let src = "import openai\nopenai = FakeClient()\nopenai.ChatCompletion.create(model='gpt-4')\n";
        let (unit, bindings) = bind(src, "a.py");
        assert!(resolved(&unit, &bindings, "create").is_none());
    }

    #[test]
    fn parameters_shadow_imports() {
        let src = "import openai\ndef f(openai):\n    openai.ChatCompletion.create(model='gpt-4')\n";
        let (unit, bindings) = bind(src, "a.py");
        assert!(resolved(&unit, &bindings, "create").is_none());
    }

    #[test]
    fn wildcard_import_resolves_known_shapes_only() {
        let src = "from litellm import *\ncompletion(model='gpt-4')\nhelper()\n";
        let (unit, bindings) = bind(src, "a.py");
        assert_eq!(resolved(&unit, &bindings, "completion").unwrap().kind, CallKind::Completion);
        assert!(resolved(&unit, &bindings, "helper").is_none());
    }

    // -- Client settings ---------------------------------------------------

    #[test]
    fn boto3_resolves_only_through_bedrock_clients() {
        let src = "import boto3\ns3 = boto3.client('s3')\ns3.put_object(Bucket='b')\n";
        let (unit, bindings) = bind(src, "a.py");
        assert!(resolved(&unit, &bindings, "put_object").is_none());
        assert!(resolved(&unit, &bindings, "client").is_none());
        assert!(bindings.providers().is_empty(), "a boto3 import alone is not LLM usage");

        let src = "import boto3\nrt = boto3.client('bedrock-runtime')\nrt.converse(modelId='m', messages=[])\n";
        let (unit, bindings) = bind(src, "a.py");
        let converse = resolved(&unit, &bindings, "converse").unwrap();
        assert_eq!(converse.provider, Provider::Bedrock);
        assert_eq!(converse.kind, CallKind::Completion);
        assert_eq!(converse.canonical(), "boto3.client.converse");
        assert_eq!(bindings.providers().into_iter().collect::<Vec<_>>(), [Provider::Bedrock]);
    }

    #[test]
    fn bedrock_clients_from_sessions_and_chains() {
        let src = "import boto3\nsession = boto3.Session(profile_name='p')\nrt = session.client(service_name='bedrock-runtime')\nrt.invoke_model(modelId='m', body='{}')\n";
        let (unit, bindings) = bind(src, "a.py");
        assert_eq!(resolved(&unit, &bindings, "invoke_model").unwrap().kind, CallKind::Completion);

        let src = "from boto3 import client\nclient('bedrock-runtime').converse_stream(modelId='m')\nclient('dynamodb').scan()\n";
        let (unit, bindings) = bind(src, "a.py");
        assert!(resolved(&unit, &bindings, "converse_stream").unwrap().streams());
        assert!(resolved(&unit, &bindings, "scan").is_none());
    }

    #[test]
    fn compatible_endpoint_reattributes_the_client() {
        let src = "from openai import OpenAI\nc = OpenAI(base_url='https://api.perplexity.ai')\nc.chat.completions.create(model='sonar')\n";
        let (unit, bindings) = bind(src, "a.py");
        let create = resolved(&unit, &bindings, "create").unwrap();
        assert_eq!(create.provider, Provider::Perplexity);
        assert_eq!(create.canonical(), "openai.OpenAI.chat.completions.create", "the SDK path is unchanged");
        assert_eq!(resolved(&unit, &bindings, "OpenAI").unwrap().provider, Provider::Perplexity);
        assert!(bindings.providers().contains(&Provider::Perplexity));

        let src = "import OpenAI from 'openai';\nconst c = new OpenAI({ baseURL: 'https://api.openai.com/v1' });\nc.chat.completions.create({ model: 'gpt-4o' });\n";
        let (unit, bindings) = bind(src, "a.ts");
        assert_eq!(resolved(&unit, &bindings, "create").unwrap().provider, Provider::OpenAi);
    }

    #[test]
    fn legacy_credential_assignment_target_resolves() {
        let src = "import openai\nopenai.api_key = 'sk-abc'\n";
        let (unit, bindings) = bind(src, "a.py");
        let assignment = &unit.syntax().assignments[0];
        let symbol = bindings
            .resolve_path(unit.syntax(), &assignment.target, assignment.span.start, None)
            .unwrap();
        assert_eq!(symbol.provider, Provider::OpenAi);
        assert_eq!(symbol.path, ["api_key"]);
    }
}
