//! Fix proposals and their application.
//!
//! A [`FixProposal`] is a single text replacement plus enough of the scanned
//! text (the replaced snapshot and its line context) to tell whether it still
//! applies. The engine never writes to disk; hosts apply proposals with
//! [`apply_fix`] or [`apply_fixes`] and write the result themselves.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tally_lang::LanguageFamily;
use tracing::debug;

use crate::binder::{BindingKind, Bindings, ImportBinding};
use crate::config::Config;
use crate::error::ApplyError;
use crate::finding::{Finding, FindingCategory, Span};
use crate::source::SourceUnit;
use crate::syntax::{FunctionId, Import, ImportKind, ImportStyle, Syntax};

// ---------------------------------------------------------------------------
// FixProposal
// ---------------------------------------------------------------------------

/// A proposed replacement of one span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixProposal {
    /// Span replaced, as scanned.
    pub span: Span,
    /// Text the span held when scanned.
    pub original: String,
    /// Text between the start of the line and the span.
    pub context_before: String,
    /// Text between the span and the end of its last line.
    pub context_after: String,
    /// New text for the span.
    pub replacement: String,
    /// `false` when the rewrite could change behaviour; such proposals are
    /// never attached to findings.
    pub safe: bool,
    /// One-line summary of the edit.
    pub description: String,
}

impl FixProposal {
    /// Snapshots `span` of `unit` for a replacement.
    #[must_use]
    pub fn new(
        unit: &SourceUnit,
        span: Span,
        replacement: impl Into<String>,
        safe: bool,
        description: impl Into<String>,
    ) -> Self {
        let text = unit.text();
        let (context_before, context_after) = line_context(text, span);
        Self {
            span,
            original: text.get(span.start..span.end).unwrap_or_default().to_string(),
            context_before: context_before.to_string(),
            context_after: context_after.to_string(),
            replacement: replacement.into(),
            safe,
            description: description.into(),
        }
    }
}

fn line_context(text: &str, span: Span) -> (&str, &str) {
    let before = text.get(..span.start).unwrap_or_default();
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let after = text.get(span.end..).unwrap_or_default();
    let line_end = after.find('\n').unwrap_or(after.len());
    (&before[line_start..], &after[..line_end])
}

// ---------------------------------------------------------------------------
// Proposal
// ---------------------------------------------------------------------------

/// Builds the fix for `finding`, when its category is fixable.
///
/// Unsafe proposals are still returned so callers can explain why no fix is
/// offered; [`crate::scan`] only attaches safe ones.
#[must_use]
pub fn propose(finding: &Finding, unit: &SourceUnit, bindings: &Bindings, config: &Config) -> Option<FixProposal> {
    match finding.category {
        FindingCategory::HardcodedCredential => credential_fix(finding, unit, bindings),
        FindingCategory::HardcodedCredentialFallback => {
            let replacement = finding.metadata.get("replacement")?.as_str()?;
            Some(FixProposal::new(
                unit,
                finding.span,
                replacement,
                true,
                "drop the hardcoded fallback from the environment read",
            ))
        }
        FindingCategory::MissingUsageTracking => match wrapper_fix(finding, unit, bindings, config) {
            Ok(fix) => Some(fix),
            Err(reason) => {
                debug!(path = unit.path(), offset = finding.span.start, reason, "no wrapper rewrite");
                None
            }
        },
        _ => None,
    }
}

// -- Credentials -----------------------------------------------------------

fn credential_fix(finding: &Finding, unit: &SourceUnit, bindings: &Bindings) -> Option<FixProposal> {
    let var = finding.metadata.get("env_var")?.as_str()?;
    let syntax = unit.syntax();
    let offset = finding.span.start;
    let function = enclosing_function(syntax, offset);
    let description = format!("read the credential from the `{var}` environment variable");

    match unit.family() {
        LanguageFamily::Python => {
            let quote = if unit.slice(finding.span).starts_with('\'') { '\'' } else { '"' };
            let key = format!("{quote}{var}{quote}");
            match python_env_reader(syntax, bindings, offset, function) {
                Some(reader) => Some(FixProposal::new(unit, finding.span, reader.call(&key), true, description)),
                None => Some(FixProposal::new(
                    unit,
                    finding.span,
                    format!("os.getenv({key})"),
                    false,
                    format!("{description}; the file does not import `os`"),
                )),
            }
        }
        LanguageFamily::Node => {
            let shadowed = is_shadowed(syntax, "process", offset, function)
                || bindings
                    .binding_for("process")
                    .is_some_and(|b| b.module != "process" && b.module != "node:process");
            Some(FixProposal::new(
                unit,
                finding.span,
                format!("process.env.{var}"),
                !shadowed,
                description,
            ))
        }
    }
}

/// How the file can already read the environment.
enum EnvReader<'a> {
    /// `import os [as alias]`.
    Os(&'a str),
    /// `from os import getenv [as alias]`.
    Getenv(&'a str),
    /// `from os import environ [as alias]`.
    Environ(&'a str),
}

impl EnvReader<'_> {
    fn call(&self, key: &str) -> String {
        match self {
            Self::Os(alias) => format!("{alias}.getenv({key})"),
            Self::Getenv(alias) => format!("{alias}({key})"),
            Self::Environ(alias) => format!("{alias}.get({key})"),
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Os(_) => 0,
            Self::Getenv(_) => 1,
            Self::Environ(_) => 2,
        }
    }
}

fn python_env_reader<'a>(
    syntax: &'a Syntax,
    bindings: &Bindings,
    offset: usize,
    function: Option<FunctionId>,
) -> Option<EnvReader<'a>> {
    syntax
        .imports
        .iter()
        .filter(|import| import.module == "os")
        .flat_map(|import| -> Vec<EnvReader<'a>> {
            match &import.kind {
                ImportKind::Module { alias, bound } if bound == "os" => vec![EnvReader::Os(alias.as_str())],
                ImportKind::Members(names) => names
                    .iter()
                    .filter_map(|n| match n.name.as_str() {
                        "getenv" => Some(EnvReader::Getenv(n.alias.as_str())),
                        "environ" => Some(EnvReader::Environ(n.alias.as_str())),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            }
        })
        .filter(|reader| {
            let alias = match reader {
                EnvReader::Os(a) | EnvReader::Getenv(a) | EnvReader::Environ(a) => *a,
            };
            bindings.binding_for(alias).is_some_and(|b| b.module == "os") && !is_shadowed(syntax, alias, offset, function)
        })
        .min_by_key(EnvReader::rank)
}

fn is_shadowed(syntax: &Syntax, name: &str, offset: usize, function: Option<FunctionId>) -> bool {
    syntax.is_parameter(name, function) || syntax.visible_assignment(&[name.to_string()], offset, function).is_some()
}

fn enclosing_function(syntax: &Syntax, offset: usize) -> Option<FunctionId> {
    syntax
        .functions
        .iter()
        .enumerate()
        .filter(|(_, f)| f.span.start <= offset && offset < f.span.end)
        .min_by_key(|(_, f)| f.span.len())
        .map(|(id, _)| id)
}

// -- Usage tracking --------------------------------------------------------

fn wrapper_fix(
    finding: &Finding,
    unit: &SourceUnit,
    bindings: &Bindings,
    config: &Config,
) -> Result<FixProposal, &'static str> {
    let syntax = unit.syntax();
    let resolved = bindings
        .resolved_calls()
        .filter(|(id, r)| !r.is_instance() && syntax.calls.get(*id).is_some_and(|c| c.span == finding.span))
        .map(|(_, r)| r)
        .next()
        .ok_or("call not found")?;
    let (namespace, wrapper) = config.wrapper_for(&resolved.canonical()).ok_or("no wrapper configured")?;
    let module = wrapper.for_family(unit.family()).ok_or("no wrapper for this language")?;
    let binding = resolved
        .binding
        .and_then(|i| bindings.imports().get(i))
        .ok_or("entry point is not bound by an import")?;
    let import = syntax.imports.get(binding.import).ok_or("import not found")?;

    check_unambiguous(bindings, binding, namespace, module, unit.family(), config)?;

    let (span, replacement) = match import.style {
        ImportStyle::PyFrom => python_from(import, namespace, module)?,
        ImportStyle::PyImport => python_import(import, namespace, module)?,
        ImportStyle::EsModule | ImportStyle::Require => (import.module_span, node_specifier(&import.module, module)),
    };
    Ok(FixProposal::new(
        unit,
        span,
        replacement,
        true,
        format!("import `{}` through the `{module}` metering wrapper", import.module),
    ))
}

fn check_unambiguous(
    bindings: &Bindings,
    binding: &ImportBinding,
    namespace: &str,
    module: &str,
    family: LanguageFamily,
    config: &Config,
) -> Result<(), &'static str> {
    let imports = bindings.imports();
    if let Some(alias) = &binding.alias {
        let statements: BTreeSet<usize> = imports
            .iter()
            .filter(|b| b.alias.as_ref() == Some(alias))
            .map(|b| b.statement)
            .collect();
        if statements.len() > 1 {
            return Err("alias is bound by more than one import statement");
        }
    }
    if imports
        .iter()
        .any(|b| b.statement == binding.statement && b.import != binding.import)
    {
        return Err("statement imports several modules");
    }
    let common = imports.iter().filter(|b| b.import == binding.import).all(|b| {
        b.canonical
            .as_deref()
            .and_then(|c| config.wrapper_for(c))
            .and_then(|(_, w)| w.for_family(family))
            == Some(module)
    });
    if !common {
        return Err("imported names have no common wrapper");
    }
    let root = namespace.split('.').next().unwrap_or(namespace);
    if imports.iter().any(|b| {
        b.kind == BindingKind::AutoPatch && b.wraps.iter().any(|ns| ns.split('.').next() == Some(root))
    }) {
        return Err("a different wrapper for this provider is already imported");
    }
    Ok(())
}

/// Remainder of `module` below `namespace` (`""` or `".sub"`).
fn below<'m>(module: &'m str, namespace: &str) -> Option<&'m str> {
    let rest = module.strip_prefix(namespace)?;
    (rest.is_empty() || rest.starts_with('.')).then_some(rest)
}

fn python_from(import: &Import, namespace: &str, wrapper: &str) -> Result<(Span, String), &'static str> {
    if let Some(rest) = below(&import.module, namespace) {
        return Ok((import.module_span, format!("{wrapper}{rest}")));
    }
    // `from google import genai` names the namespace as a member of its parent
    let member = namespace
        .strip_prefix(import.module.as_str())
        .and_then(|r| r.strip_prefix('.'))
        .ok_or("module is not below the wrapped namespace")?;
    match &import.kind {
        ImportKind::Members(names) if names.len() == 1 && names[0].name == member => {
            Ok((import.span, format!("import {wrapper} as {}", names[0].alias)))
        }
        _ => Err("parent-package import binds more than the wrapped namespace"),
    }
}

fn python_import(import: &Import, namespace: &str, wrapper: &str) -> Result<(Span, String), &'static str> {
    let ImportKind::Module { alias, bound } = &import.kind else {
        return Err("unexpected import form");
    };
    if *bound != import.module {
        return Err("dotted plain module import");
    }
    let rest = below(&import.module, namespace).ok_or("module is not below the wrapped namespace")?;
    if *alias == import.module {
        Ok((import.span, format!("import {wrapper}{rest} as {alias}")))
    } else {
        Ok((import.module_span, format!("{wrapper}{rest}")))
    }
}

/// `wrapper` plus any subpath of the npm specifier.
fn node_specifier(specifier: &str, wrapper: &str) -> String {
    let segments = if specifier.starts_with('@') { 2 } else { 1 };
    let package_len = specifier
        .match_indices('/')
        .nth(segments - 1)
        .map_or(specifier.len(), |(i, _)| i);
    format!("{wrapper}{}", &specifier[package_len..])
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Applies `proposal` to `text`.
///
/// The span must still hold the scanned snapshot and its line context. When
/// an earlier edit shifted it, the snapshot is relocated if exactly one
/// occurrence carries the recorded context (or, failing that, one side of it).
///
/// # Errors
///
/// [`ApplyError::Stale`] when the snapshot cannot be found unambiguously and
/// [`ApplyError::OutOfRange`] when the span lies outside `text` and cannot be
/// relocated.
pub fn apply_fix(text: &str, proposal: &FixProposal) -> Result<String, ApplyError> {
    let span = locate(text, proposal)?;
    let mut out = String::with_capacity(text.len() + proposal.replacement.len());
    out.push_str(&text[..span.start]);
    out.push_str(&proposal.replacement);
    out.push_str(&text[span.end..]);
    Ok(out)
}

/// Applies non-overlapping `proposals` in one pass, back to front.
///
/// # Errors
///
/// [`ApplyError::Overlap`] when two proposals touch overlapping spans, and
/// any error of [`apply_fix`].
pub fn apply_fixes(text: &str, proposals: &[FixProposal]) -> Result<String, ApplyError> {
    let mut ordered: Vec<&FixProposal> = proposals.iter().collect();
    ordered.sort_by_key(|p| (p.span.start, p.span.end));
    for pair in ordered.windows(2) {
        if pair[0].span.overlaps(pair[1].span) {
            return Err(ApplyError::Overlap {
                start: pair[1].span.start,
                end: pair[1].span.end,
            });
        }
    }
    ordered
        .into_iter()
        .rev()
        .try_fold(text.to_string(), |current, proposal| apply_fix(&current, proposal))
}

fn locate(text: &str, proposal: &FixProposal) -> Result<Span, ApplyError> {
    let Span { start, end } = proposal.span;
    if holds(text, proposal, start) == (true, true) {
        return Ok(proposal.span);
    }

    if !proposal.original.is_empty() {
        let candidates: Vec<(usize, (bool, bool))> = text
            .match_indices(proposal.original.as_str())
            .map(|(at, _)| (at, holds(text, proposal, at)))
            .collect();
        let exact: Vec<usize> = candidates
            .iter()
            .filter(|(_, (b, a))| *b && *a)
            .map(|(at, _)| *at)
            .collect();
        let anchored: Vec<usize> = candidates
            .iter()
            .filter(|(_, (b, a))| *b || *a)
            .map(|(at, _)| *at)
            .collect();
        let found = match (exact.as_slice(), anchored.as_slice()) {
            ([at], _) | ([], [at]) => Some(*at),
            _ => None,
        };
        if let Some(at) = found {
            debug!(from = start, to = at, "relocated fix");
            return Ok(Span::new(at, at + proposal.original.len()));
        }
    }

    if start > end || end > text.len() || !text.is_char_boundary(start) || !text.is_char_boundary(end) {
        return Err(ApplyError::OutOfRange {
            start,
            end,
            len: text.len(),
        });
    }
    Err(ApplyError::Stale {
        start,
        end,
        expected: proposal.original.clone(),
    })
}

/// Whether the snapshot sits at `at`: (context before matches, context after
/// matches). Both are `false` when the snapshot itself does not.
fn holds(text: &str, proposal: &FixProposal, at: usize) -> (bool, bool) {
    let end = at + proposal.original.len();
    if text.get(at..end) != Some(proposal.original.as_str()) {
        return (false, false);
    }
    let (before, after) = line_context(text, Span::new(at, end));
    (before == proposal.context_before, after == proposal.context_after)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
