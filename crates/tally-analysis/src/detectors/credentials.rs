//! Hardcoded credential detection.
//!
//! A credential sink is any place an API key is handed to an SDK: a
//! credential keyword argument (or JS object property), a dictionary entry
//! with a credential key, a module-level `alias.api_key = ...` assignment, or
//! a provider's positional credential slot. The value is followed through
//! local assignments to its definition; a string literal with a registered
//! credential shape is reported at the literal, and an environment read with
//! such a literal as its default is reported at the whole read.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use super::common::{env_lookup, EnvLookup};
use super::{build, finding_at, Detector};
use crate::binder::{Bindings, ResolvedSymbol};
use crate::config::Config;
use crate::finding::{Finding, FindingCategory, Span};
use crate::literal;
use crate::providers::{is_credential_arg, Provider, CREDENTIAL_ATTRIBUTES};
use crate::secrets::match_credential;
use crate::source::SourceUnit;
use crate::syntax::{Expr, ExprKind, FunctionId, Site, Syntax};

const ID: &str = "credentials";

/// Name indirections followed from a sink to its definition.
const MAX_INDIRECTIONS: usize = 16;

/// Reports `HardcodedCredential` and `HardcodedCredentialFallback`.
pub struct CredentialDetector;

impl Detector for CredentialDetector {
    fn id(&self) -> &'static str {
        ID
    }

    fn detect(&self, unit: &SourceUnit, bindings: &Bindings, config: &Config) -> Vec<Finding> {
        let mut seen = HashSet::new();
        let mut findings = Vec::new();
        for sink in sinks(unit, bindings) {
            let Some(hit) = inspect(unit, bindings, config, &sink) else {
                continue;
            };
            if !seen.insert((hit.category, hit.span)) {
                continue;
            }
            findings.extend(report(unit, &sink, &hit));
        }
        findings
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

struct Sink<'a> {
    value: &'a Expr,
    function: Option<FunctionId>,
    parameter: &'a str,
    site: &'a Site,
    provider: Option<Provider>,
}

fn sinks<'a>(unit: &'a SourceUnit, bindings: &Bindings) -> Vec<Sink<'a>> {
    let syntax = unit.syntax();
    let mut out = Vec::new();

    for (id, call) in syntax.calls.iter().enumerate() {
        let resolved = bindings.resolved(id);
        let provider = resolved.and_then(underlying_provider);
        for keyword in call.keywords.iter().filter(|k| is_credential_arg(&k.name)) {
            out.push(Sink {
                value: &keyword.value,
                function: call.site.function,
                parameter: &keyword.name,
                site: &call.site,
                provider,
            });
        }
        let slot = resolved.and_then(|r| r.shape).and_then(|s| s.credential_slot);
        if let Some(arg) = slot.and_then(|i| call.positional.get(i)) {
            out.push(Sink {
                value: arg,
                function: call.site.function,
                parameter: "api_key",
                site: &call.site,
                provider,
            });
        }
    }

    for entry in syntax.dict_entries.iter().filter(|e| is_credential_arg(&e.key)) {
        out.push(Sink {
            value: &entry.value,
            function: entry.site.function,
            parameter: &entry.key,
            site: &entry.site,
            provider: None,
        });
    }

    for assignment in &syntax.assignments {
        let [.., attribute] = assignment.target.as_slice() else {
            continue;
        };
        if assignment.target.len() < 2 || !CREDENTIAL_ATTRIBUTES.contains(&attribute.as_str()) {
            continue;
        }
        let provider = bindings
            .resolve_path(syntax, &assignment.target, assignment.span.start, assignment.site.function)
            .as_ref()
            .and_then(underlying_provider);
        out.push(Sink {
            value: &assignment.value,
            function: assignment.site.function,
            parameter: attribute,
            site: &assignment.site,
            provider,
        });
    }
    out
}

/// The provider whose key a call expects; LangChain classes name theirs.
fn underlying_provider(resolved: &ResolvedSymbol) -> Option<Provider> {
    match resolved.provider {
        Provider::LangChain | Provider::LiteLlm => resolved.root_class().and_then(Provider::from_class_hint),
        provider => Some(provider),
    }
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

struct Hit<'a> {
    category: FindingCategory,
    span: Span,
    value: String,
    shape: String,
    variable: Option<&'a str>,
    lookup: Option<EnvLookup<'a>>,
}

fn inspect<'a>(unit: &'a SourceUnit, bindings: &Bindings, config: &Config, sink: &Sink<'a>) -> Option<Hit<'a>> {
    let syntax = unit.syntax();
    let (expr, scope, variable) = definition_of(syntax, sink.value, sink.function);

    if let Some(lookup) = env_lookup(unit, bindings, expr, scope) {
        let default = literal::evaluate(syntax, lookup.default?, scope);
        let text = default.as_str()?;
        let shape = match_credential(&config.credential_shape_patterns, text)?;
        return Some(Hit {
            category: FindingCategory::HardcodedCredentialFallback,
            span: lookup.span,
            value: text.to_string(),
            shape: shape.name.clone(),
            variable,
            lookup: Some(lookup),
        });
    }

    let value = literal::evaluate(syntax, expr, scope);
    let text = value.as_str()?;
    let shape = match_credential(&config.credential_shape_patterns, text)?;
    Some(Hit {
        category: FindingCategory::HardcodedCredential,
        span: value.span()?,
        value: text.to_string(),
        shape: shape.name.clone(),
        variable,
        lookup: None,
    })
}

/// Follows plain names to the assigned expression, remembering the last
/// variable name on the way.
fn definition_of<'a>(
    syntax: &'a Syntax,
    expr: &'a Expr,
    function: Option<FunctionId>,
) -> (&'a Expr, Option<FunctionId>, Option<&'a str>) {
    let mut current = expr;
    let mut scope = function;
    let mut variable = None;
    for _ in 0..MAX_INDIRECTIONS {
        let ExprKind::Name(name) = &current.kind else {
            break;
        };
        let Some(assignment) = syntax.visible_assignment(std::slice::from_ref(name), current.span.start, scope) else {
            break;
        };
        variable = Some(name.as_str());
        current = &assignment.value;
        scope = assignment.site.function;
    }
    (current, scope, variable)
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

fn report(unit: &SourceUnit, sink: &Sink<'_>, hit: &Hit<'_>) -> Option<Finding> {
    let env_var = env_var_name(hit.variable, sink.provider, sink.parameter);
    let mut builder = finding_at(unit, hit.category, hit.span, Some(sink.site))
        .subject(fingerprint(&hit.value))
        .meta("shape", serde_json::Value::from(hit.shape.as_str()))
        .meta("parameter", serde_json::Value::from(sink.parameter))
        .meta("env_var", serde_json::Value::from(env_var.as_str()));
    if let Some(provider) = sink.provider {
        builder = builder.meta("provider", serde_json::Value::from(provider.name()));
    }

    builder = match &hit.lookup {
        Some(lookup) => {
            let key = lookup.key.as_deref().unwrap_or("the variable");
            builder
                .message(format!(
                    "credential literal ({} key shape) hardcoded as the fallback of the `{key}` environment read",
                    hit.shape
                ))
                .note("the key ships with the code whenever the variable is unset; drop the default")
                .meta("replacement", serde_json::Value::from(lookup.without_default.as_str()))
        }
        None => builder
            .message(format!(
                "hardcoded credential ({} key shape) passed to `{}`",
                hit.shape, sink.parameter
            ))
            .note(format!("read the key from the `{env_var}` environment variable instead")),
    };
    build(builder, ID)
}

/// Short stable digest used to group repeated uses of one secret without
/// repeating it.
fn fingerprint(value: &str) -> String {
    let digest = hex::encode(Sha256::digest(value.as_bytes()));
    format!("secret:{}", &digest[..16])
}

/// Environment variable a fix should read: an UPPER_SNAKE variable name,
/// else the provider's conventional variable, else the parameter name.
pub(crate) fn env_var_name(variable: Option<&str>, provider: Option<Provider>, parameter: &str) -> String {
    if let Some(variable) = variable.filter(|v| is_upper_snake(v)) {
        return variable.to_string();
    }
    if let Some(var) = provider.and_then(Provider::env_var) {
        return var.to_string();
    }
    upper_snake(parameter)
}

fn is_upper_snake(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn upper_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(char::is_ascii_lowercase);
            if prev.is_ascii_lowercase() || prev.is_ascii_digit() || (prev.is_ascii_uppercase() && next_lower) {
                out.push('_');
            }
        }
        out.push(c.to_ascii_uppercase());
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
