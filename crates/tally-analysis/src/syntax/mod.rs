//! Language-neutral structural view of a source unit.
//!
//! The tree-sitter tree is lowered once per file into [`Syntax`]: the
//! import statements, call expressions, assignments, dictionary entries,
//! loops and function scopes the detectors care about. Everything else is
//! kept as located [`ExprKind::Opaque`] nodes so spans stay exact without
//! the lowering having to understand arbitrary expressions.

mod node;
mod python;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tally_lang::{Language, LanguageFamily};

use crate::finding::Span;

pub(crate) use node::lower_node;
pub(crate) use python::lower_python;

/// Lowering stops descending past this nesting depth.
pub(crate) const MAX_DEPTH: usize = 400;

/// Index into [`Syntax::calls`].
pub type CallId = usize;
/// Index into [`Syntax::loops`].
pub type LoopId = usize;
/// Index into [`Syntax::functions`].
pub type FunctionId = usize;

// ---------------------------------------------------------------------------
// Scopes and loops
// ---------------------------------------------------------------------------

/// Kind of scope a statement executes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// Top level of the file; runs on import.
    Module,
    /// Inside a free function, lambda or arrow function.
    Function,
    /// Inside a method defined directly in a class body.
    ClassMethod,
}

/// Static iteration bound of the loops enclosing a call-site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "count")]
pub enum LoopContext {
    /// Not inside any loop.
    None,
    /// Inside loops whose combined iteration count is known.
    Bounded(u64),
    /// Inside at least one loop whose bound is not statically known.
    Unbounded,
}

impl LoopContext {
    /// Combines an outer context with one more enclosing loop of `bound`.
    #[must_use]
    pub fn nest(self, bound: Option<u64>) -> Self {
        match (self, bound) {
            (Self::Unbounded, _) | (_, None) => Self::Unbounded,
            (Self::None, Some(n)) => Self::Bounded(n),
            (Self::Bounded(m), Some(n)) => Self::Bounded(m.saturating_mul(n)),
        }
    }

    /// `true` when the bound is unknown or above `threshold`.
    #[must_use]
    pub fn exceeds(self, threshold: u64) -> bool {
        match self {
            Self::None => false,
            Self::Bounded(n) => n > threshold,
            Self::Unbounded => true,
        }
    }
}

/// Syntactic loop form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    /// `for x in xs` / `for (const x of xs)` / `for (k in obj)`.
    ForEach,
    /// C-style `for (init; cond; step)`.
    Counted,
    /// `while` / `do ... while`.
    While,
    /// Comprehension or generator expression.
    Comprehension,
    /// Callback passed to `forEach`/`map`/... on a receiver.
    Callback,
}

/// A loop construct.
#[derive(Debug, Clone)]
pub struct Loop {
    /// Span of the whole loop.
    pub span: Span,
    /// Loop form.
    pub kind: LoopKind,
    /// Collection being iterated, when there is one.
    pub iterable: Option<Expr>,
    /// Names bound per iteration.
    pub targets: Vec<String>,
    /// Bound derived directly from the loop header (C-style counters).
    pub header_bound: Option<u64>,
    /// Enclosing function.
    pub function: Option<FunctionId>,
}

/// A function, method, lambda or arrow function.
#[derive(Debug, Clone)]
pub struct Function {
    /// Span of the definition.
    pub span: Span,
    /// Declared name, if any.
    pub name: Option<String>,
    /// Parameter names.
    pub params: Vec<String>,
    /// Scope kind of the function body.
    pub kind: ScopeKind,
    /// Lexically enclosing function.
    pub parent: Option<FunctionId>,
}

/// Where a node sits: scope kind plus the enclosing function and loops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Site {
    /// Enclosing function, `None` at module level.
    pub function: Option<FunctionId>,
    /// Scope kind of the enclosing body.
    pub scope: Option<ScopeKind>,
    /// Enclosing loops, outermost first.
    pub loops: Vec<LoopId>,
}

impl Site {
    /// Scope kind, defaulting to module level.
    #[must_use]
    pub fn scope_kind(&self) -> ScopeKind {
        self.scope.unwrap_or(ScopeKind::Module)
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// A lowered expression with its span.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// Source span of the expression.
    pub span: Span,
    /// Expression shape.
    pub kind: ExprKind,
}

/// Binary operators the evaluator distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `or` / `||`
    Or,
    /// `??`
    Coalesce,
    /// Anything else.
    Other,
}

/// One piece of an f-string or template literal.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text.
    Text(String),
    /// Interpolated expression.
    Expr(Expr),
}

/// Key of a dictionary or object literal entry.
#[derive(Debug, Clone, PartialEq)]
pub enum DictKey {
    /// String or identifier key.
    Named(String),
    /// Computed or non-string key.
    Computed,
    /// `**spread` / `...spread`.
    Spread,
}

/// Expression shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// String literal with quotes removed.
    Str(String),
    /// Interpolated string.
    Template(Vec<TemplatePart>),
    /// Adjacent string literals (`"a" "b"`).
    Concat(Vec<Expr>),
    /// Integer literal.
    Int(i64),
    /// Floating-point literal.
    Float(f64),
    /// Boolean literal.
    Bool(bool),
    /// `None` / `null` / `undefined`.
    Null,
    /// Plain identifier.
    Name(String),
    /// Dotted chain of identifiers (`a.b.c`, `self.client`).
    Path(Vec<String>),
    /// Attribute access on a non-path object.
    Member {
        /// Object expression.
        object: Box<Expr>,
        /// Property name.
        property: String,
    },
    /// `object[index]`.
    Subscript {
        /// Object expression.
        object: Box<Expr>,
        /// Index expression.
        index: Box<Expr>,
    },
    /// Call or `new` expression; see [`Syntax::calls`].
    Call(CallId),
    /// Binary expression.
    Binary {
        /// Operator.
        op: BinOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// List, tuple, set or array literal.
    List(Vec<Expr>),
    /// Dictionary or object literal.
    Dict(Vec<(DictKey, Expr)>),
    /// Comprehension over a single iterable.
    Comprehension {
        /// Iterated expression.
        iterable: Box<Expr>,
    },
    /// `*x` / `**x` / `...x` in an argument or element position.
    Splat(Box<Expr>),
    /// Anything the analysis does not model.
    Opaque,
}

impl Expr {
    /// Creates an expression.
    #[must_use]
    pub const fn new(span: Span, kind: ExprKind) -> Self {
        Self { span, kind }
    }

    /// Opaque expression covering `span`.
    #[must_use]
    pub const fn opaque(span: Span) -> Self {
        Self::new(span, ExprKind::Opaque)
    }

    /// Dotted path for names and paths, e.g. `["client", "chat"]`.
    #[must_use]
    pub fn path(&self) -> Option<Vec<String>> {
        match &self.kind {
            ExprKind::Name(name) => Some(vec![name.clone()]),
            ExprKind::Path(path) => Some(path.clone()),
            _ => None,
        }
    }

    /// String value when this is a plain string literal.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Entries when this is a dictionary or object literal.
    #[must_use]
    pub fn as_dict(&self) -> Option<&[(DictKey, Expr)]> {
        match &self.kind {
            ExprKind::Dict(entries) => Some(entries),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// Syntactic form of an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStyle {
    /// Python `import a.b [as c]`.
    PyImport,
    /// Python `from a import b`.
    PyFrom,
    /// ECMAScript `import ... from 'a'`.
    EsModule,
    /// CommonJS `require('a')`.
    Require,
}

/// One name bound by a member import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedName {
    /// Exported name (`default` for default imports).
    pub name: String,
    /// Local alias.
    pub alias: String,
}

/// What an import binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportKind {
    /// Binds the module object itself.
    Module {
        /// Local alias.
        alias: String,
        /// Module the alias refers to (`a` for `import a.b`, `a.b` for
        /// `import a.b as c`).
        bound: String,
    },
    /// Binds individual exports.
    Members(Vec<ImportedName>),
    /// `from a import *`.
    Wildcard,
    /// Loads the module for its side effects only.
    SideEffect,
}

/// An import of one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Statement index; several modules imported by one statement share it.
    pub statement: usize,
    /// Span of the whole statement.
    pub span: Span,
    /// Span of the module specifier text (inside the quotes for Node).
    pub module_span: Span,
    /// Module as written.
    pub module: String,
    /// Bound names.
    pub kind: ImportKind,
    /// Syntactic form.
    pub style: ImportStyle,
}

/// A keyword argument (or object-literal property of an argument).
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    /// Argument name.
    pub name: String,
    /// Argument value.
    pub value: Expr,
}

/// A call or `new` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Span of the whole call.
    pub span: Span,
    /// Dotted callee path; when `receiver` is set, only the members after it.
    pub callee: Vec<String>,
    /// Call whose result the callee chain starts from (`f().g()`).
    pub receiver: Option<CallId>,
    /// `new` expression.
    pub is_new: bool,
    /// Positional arguments.
    pub positional: Vec<Expr>,
    /// Keyword arguments, including properties of object-literal arguments.
    pub keywords: Vec<Keyword>,
    /// `*args` / `**kwargs` / `...spread` arguments.
    pub splats: Vec<Expr>,
    /// Identifiers referenced anywhere in the arguments.
    pub idents: BTreeSet<String>,
    /// Location.
    pub site: Site,
}

impl Call {
    /// Looks up a keyword argument by any of `names`.
    #[must_use]
    pub fn keyword(&self, names: &[&str]) -> Option<&Keyword> {
        self.keywords.iter().find(|k| names.contains(&k.name.as_str()))
    }
}

/// An assignment to a name or attribute chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Span of the whole assignment.
    pub span: Span,
    /// Target path (`["client"]`, `["self", "client"]`, `["openai", "api_key"]`).
    pub target: Vec<String>,
    /// Assigned value.
    pub value: Expr,
    /// Location.
    pub site: Site,
}

/// A `key: value` entry of a dictionary or object literal.
#[derive(Debug, Clone, PartialEq)]
pub struct DictEntry {
    /// Key text.
    pub key: String,
    /// Entry value.
    pub value: Expr,
    /// Location.
    pub site: Site,
}

// ---------------------------------------------------------------------------
// Syntax
// ---------------------------------------------------------------------------

/// Lowered structural view of one source unit.
#[derive(Debug, Clone, Default)]
pub struct Syntax {
    /// Imports in lexical order.
    pub imports: Vec<Import>,
    /// Calls; an outer call is stored after the calls in its arguments.
    pub calls: Vec<Call>,
    /// Assignments in lexical order.
    pub assignments: Vec<Assignment>,
    /// Keyed entries of every dictionary/object literal.
    pub dict_entries: Vec<DictEntry>,
    /// Loops.
    pub loops: Vec<Loop>,
    /// Functions.
    pub functions: Vec<Function>,
    /// Error and missing-token regions the grammar recovered from.
    pub error_regions: Vec<Span>,
    /// Family of the grammar the unit was lowered from.
    pub family: Option<LanguageFamily>,
}

impl Syntax {
    /// Lowers `tree` for `language`.
    #[must_use]
    pub fn lower(language: Language, tree: &tree_sitter::Tree, text: &str) -> Self {
        let family = language.family();
        let mut syntax = match family {
            LanguageFamily::Python => lower_python(tree, text),
            LanguageFamily::Node => lower_node(tree, text),
        };
        syntax.family = Some(family);
        syntax
    }

    /// Combined static bound of the loops around `site`.
    ///
    /// `bound_of` resolves the iteration count of a single loop.
    pub fn loop_context(&self, site: &Site, mut bound_of: impl FnMut(&Loop) -> Option<u64>) -> LoopContext {
        site.loops
            .iter()
            .filter_map(|id| self.loops.get(*id))
            .fold(LoopContext::None, |ctx, lp| ctx.nest(bound_of(lp)))
    }

    /// `true` if `name` is a parameter of `function` or one of its parents.
    #[must_use]
    pub fn is_parameter(&self, name: &str, function: Option<FunctionId>) -> bool {
        let mut current = function;
        while let Some(id) = current {
            let Some(func) = self.functions.get(id) else {
                return false;
            };
            if func.params.iter().any(|p| p == name) {
                return true;
            }
            current = func.parent;
        }
        false
    }

    /// The assignment to `target` that is visible at `offset` from `function`.
    ///
    /// Looks first for the last assignment in the same function that ends
    /// before `offset`, then walks outward. Module-level assignments count
    /// regardless of order when the lookup comes from inside a function body.
    #[must_use]
    pub fn visible_assignment(
        &self,
        target: &[String],
        offset: usize,
        function: Option<FunctionId>,
    ) -> Option<&Assignment> {
        let mut current = function;
        loop {
            let in_scope = |a: &&Assignment| a.site.function == current && a.target == target;
            let found = if current.is_none() && function.is_some() {
                self.assignments.iter().filter(in_scope).last()
            } else {
                self.assignments
                    .iter()
                    .filter(in_scope)
                    .filter(|a| a.span.end <= offset)
                    .last()
            };
            if found.is_some() {
                return found;
            }
            let id = current?;
            if self.functions.get(id)?.params.iter().any(|p| target.len() == 1 && *p == target[0]) {
                return None;
            }
            current = self.functions.get(id)?.parent;
        }
    }
}

// ---------------------------------------------------------------------------
// Shared lowering helpers
// ---------------------------------------------------------------------------

/// Text of `node` in `text`, empty on invalid ranges.
pub(crate) fn node_text<'a>(node: &tree_sitter::Node<'_>, text: &'a str) -> &'a str {
    text.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

/// Named children of `node`.
pub(crate) fn named_children<'t>(node: &tree_sitter::Node<'t>) -> Vec<tree_sitter::Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Parses an integer literal, accepting `_` separators and hex/octal/binary.
pub(crate) fn parse_int(raw: &str) -> Option<i64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '_')
        .collect::<String>()
        .trim_end_matches(['n', 'l', 'L'])
        .to_string();
    let lower = cleaned.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else {
        lower.parse().ok()
    }
}

/// Records tree-sitter `ERROR` and `MISSING` nodes under `root`.
pub(crate) fn collect_error_regions(root: &tree_sitter::Node<'_>, out: &mut Vec<Span>) {
    if !root.has_error() {
        return;
    }
    let mut stack = vec![*root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            out.push(Span::of(&node));
            continue;
        }
        if node.has_error() {
            let mut cursor = node.walk();
            stack.extend(node.children(&mut cursor));
        }
    }
    out.sort();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
