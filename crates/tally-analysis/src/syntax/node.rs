//! Lowering of `tree-sitter-javascript` and `tree-sitter-typescript` trees.

use std::collections::BTreeSet;

use tree_sitter::Node;

use super::python::flatten_callee;
use super::{
    Assignment, BinOp, Call, CallId, DictEntry, DictKey, Expr, ExprKind, Function, FunctionId,
    Import, ImportKind, ImportStyle, ImportedName, Keyword, Loop, LoopId, LoopKind, MAX_DEPTH,
    ScopeKind, Site, Syntax, TemplatePart, collect_error_regions, named_children, node_text,
    parse_int,
};
use crate::finding::Span;

/// Array methods whose function argument runs once per element.
const ITERATION_METHODS: &[&str] = &[
    "forEach", "map", "flatMap", "filter", "reduce", "some", "every", "find", "findIndex",
];

/// Lowers a JavaScript or TypeScript tree into [`Syntax`].
pub(crate) fn lower_node(tree: &tree_sitter::Tree, text: &str) -> Syntax {
    let root = tree.root_node();
    let mut lowerer = Lowerer {
        text,
        out: Syntax::default(),
        function: None,
        scope: None,
        loops: Vec::new(),
        in_class_body: false,
        depth: 0,
        statement: 0,
    };
    lowerer.visit(root);
    collect_error_regions(&root, &mut lowerer.out.error_regions);
    lowerer.out
}

struct Lowerer<'s> {
    text: &'s str,
    out: Syntax,
    function: Option<FunctionId>,
    scope: Option<ScopeKind>,
    loops: Vec<LoopId>,
    in_class_body: bool,
    depth: usize,
    statement: usize,
}

/// Text of a string literal node without its quotes, and the span it covers.
fn string_body(node: &Node<'_>, text: &str) -> (String, Span) {
    let start = (node.start_byte() + 1).min(node.end_byte());
    let end = node.end_byte().saturating_sub(1).max(start);
    let body = text.get(start..end).unwrap_or("").to_string();
    (body, Span::new(start, end))
}

/// `require('x')` argument, when `node` is such a call.
fn required_module<'t>(node: &Node<'t>, text: &str) -> Option<Node<'t>> {
    if node.kind() != "call_expression" {
        return None;
    }
    let function = node.child_by_field_name("function")?;
    if function.kind() != "identifier" || node_text(&function, text) != "require" {
        return None;
    }
    let args = node.child_by_field_name("arguments")?;
    let first = named_children(&args).into_iter().next()?;
    (first.kind() == "string").then_some(first)
}

impl<'s> Lowerer<'s> {
    fn text_of(&self, node: &Node<'_>) -> &'s str {
        node_text(node, self.text)
    }

    fn site(&self) -> Site {
        Site {
            function: self.function,
            scope: self.scope,
            loops: self.loops.clone(),
        }
    }

    fn next_statement(&mut self) -> usize {
        self.statement += 1;
        self.statement
    }

    // -- Statements --------------------------------------------------------

    fn visit(&mut self, node: Node<'_>) {
        if self.depth > MAX_DEPTH {
            return;
        }
        self.depth += 1;
        match node.kind() {
            "comment" => {}
            "import_statement" => self.import_statement(node),
            "lexical_declaration" | "variable_declaration" => self.declaration(node),
            "class_body" => {
                let saved = std::mem::replace(&mut self.in_class_body, true);
                self.visit_children(node);
                self.in_class_body = saved;
            }
            "field_definition" | "public_field_definition" => self.field_definition(node),
            "for_statement" => self.for_statement(node),
            "for_in_statement" => self.for_in_statement(node),
            "while_statement" | "do_statement" => self.while_statement(node),
            _ => {
                self.expr(node);
            }
        }
        self.depth -= 1;
    }

    fn visit_children(&mut self, node: Node<'_>) {
        for child in named_children(&node) {
            self.visit(child);
        }
    }

    fn import_statement(&mut self, node: Node<'_>) {
        let statement = self.next_statement();
        let span = Span::of(&node);
        let children = named_children(&node);

        if let Some(clause) = children.iter().find(|c| c.kind() == "import_require_clause") {
            let (Some(alias), Some(source)) = (
                named_children(clause).into_iter().find(|c| c.kind() == "identifier"),
                clause.child_by_field_name("source"),
            ) else {
                return;
            };
            let (module, module_span) = string_body(&source, self.text);
            self.out.imports.push(Import {
                statement,
                span,
                module_span,
                kind: ImportKind::Module {
                    alias: self.text_of(&alias).to_string(),
                    bound: module.clone(),
                },
                module,
                style: ImportStyle::Require,
            });
            return;
        }

        let Some(source) = node.child_by_field_name("source") else {
            return;
        };
        let (module, module_span) = string_body(&source, self.text);
        let Some(clause) = children.iter().find(|c| c.kind() == "import_clause") else {
            self.out.imports.push(Import {
                statement,
                span,
                module_span,
                module,
                kind: ImportKind::SideEffect,
                style: ImportStyle::EsModule,
            });
            return;
        };

        let mut members = Vec::new();
        for part in named_children(clause) {
            match part.kind() {
                "identifier" => members.push(ImportedName {
                    name: "default".into(),
                    alias: self.text_of(&part).to_string(),
                }),
                "namespace_import" => {
                    if let Some(alias) = named_children(&part).into_iter().find(|c| c.kind() == "identifier") {
                        self.out.imports.push(Import {
                            statement,
                            span,
                            module_span,
                            module: module.clone(),
                            kind: ImportKind::Module {
                                alias: self.text_of(&alias).to_string(),
                                bound: module.clone(),
                            },
                            style: ImportStyle::EsModule,
                        });
                    }
                }
                "named_imports" => {
                    for specifier in named_children(&part) {
                        if specifier.kind() != "import_specifier" {
                            continue;
                        }
                        let Some(name) = specifier.child_by_field_name("name") else {
                            continue;
                        };
                        let name = match name.kind() {
                            "string" => string_body(&name, self.text).0,
                            _ => self.text_of(&name).to_string(),
                        };
                        let alias = specifier
                            .child_by_field_name("alias")
                            .map_or_else(|| name.clone(), |a| self.text_of(&a).to_string());
                        members.push(ImportedName { name, alias });
                    }
                }
                _ => {}
            }
        }
        if !members.is_empty() {
            self.out.imports.push(Import {
                statement,
                span,
                module_span,
                module,
                kind: ImportKind::Members(members),
                style: ImportStyle::EsModule,
            });
        }
    }

    fn declaration(&mut self, node: Node<'_>) {
        let declarators: Vec<Node<'_>> = named_children(&node)
            .into_iter()
            .filter(|c| c.kind() == "variable_declarator")
            .collect();
        let single = declarators.len() == 1;
        for declarator in declarators {
            let statement_span = if single {
                Span::of(&node)
            } else {
                Span::of(&declarator)
            };
            self.declarator(declarator, statement_span);
        }
    }

    fn declarator(&mut self, node: Node<'_>, statement_span: Span) {
        let (Some(name), Some(value)) = (
            node.child_by_field_name("name"),
            node.child_by_field_name("value"),
        ) else {
            return;
        };
        if let Some(source) = required_module(&value, self.text) {
            self.require_binding(name, source, statement_span);
            return;
        }
        let value = self.expr(value);
        if name.kind() == "identifier" {
            self.out.assignments.push(Assignment {
                span: Span::of(&node),
                target: vec![self.text_of(&name).to_string()],
                value,
                site: self.site(),
            });
        }
    }

    fn require_binding(&mut self, pattern: Node<'_>, source: Node<'_>, span: Span) {
        let statement = self.next_statement();
        let (module, module_span) = string_body(&source, self.text);
        let kind = match pattern.kind() {
            "identifier" => ImportKind::Module {
                alias: self.text_of(&pattern).to_string(),
                bound: module.clone(),
            },
            "object_pattern" => ImportKind::Members(
                named_children(&pattern)
                    .into_iter()
                    .filter_map(|p| match p.kind() {
                        "shorthand_property_identifier_pattern" => {
                            let name = self.text_of(&p).to_string();
                            Some(ImportedName {
                                alias: name.clone(),
                                name,
                            })
                        }
                        "pair_pattern" => Some(ImportedName {
                            name: self.text_of(&p.child_by_field_name("key")?).to_string(),
                            alias: self.text_of(&p.child_by_field_name("value")?).to_string(),
                        }),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => ImportKind::SideEffect,
        };
        self.out.imports.push(Import {
            statement,
            span,
            module_span,
            module,
            kind,
            style: ImportStyle::Require,
        });
    }

    fn field_definition(&mut self, node: Node<'_>) {
        let name = node
            .child_by_field_name("property")
            .or_else(|| node.child_by_field_name("name"));
        let Some(value) = node.child_by_field_name("value") else {
            return;
        };
        let saved_scope = self.scope.replace(ScopeKind::ClassMethod);
        let value = self.expr(value);
        if let Some(name) = name {
            self.out.assignments.push(Assignment {
                span: Span::of(&node),
                target: vec!["this".into(), self.text_of(&name).to_string()],
                value,
                site: self.site(),
            });
        }
        self.scope = saved_scope;
    }

    fn function(&mut self, node: Node<'_>, inline_callback: bool) {
        let kind = if self.in_class_body {
            ScopeKind::ClassMethod
        } else {
            ScopeKind::Function
        };
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text_of(&n).to_string());
        let params = match (
            node.child_by_field_name("parameters"),
            node.child_by_field_name("parameter"),
        ) {
            (Some(params), _) => self.parameters(params),
            (None, Some(single)) => vec![self.text_of(&single).to_string()],
            (None, None) => Vec::new(),
        };
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };

        let kind = if inline_callback {
            self.scope.unwrap_or(ScopeKind::Module)
        } else {
            kind
        };
        let id = self.out.functions.len();
        self.out.functions.push(Function {
            span: Span::of(&node),
            name,
            params,
            kind,
            parent: self.function,
        });
        let saved_function = self.function.replace(id);
        let saved_scope = self.scope;
        let saved_class = std::mem::replace(&mut self.in_class_body, false);
        let saved_loops = if inline_callback {
            self.loops.clone()
        } else {
            std::mem::take(&mut self.loops)
        };
        if !inline_callback || self.scope.is_some() {
            self.scope = Some(kind);
        }
        self.visit(body);
        self.function = saved_function;
        self.scope = saved_scope;
        self.in_class_body = saved_class;
        self.loops = saved_loops;
    }

    fn parameters(&self, node: Node<'_>) -> Vec<String> {
        let mut out = Vec::new();
        for param in named_children(&node) {
            let target = match param.kind() {
                "required_parameter" | "optional_parameter" => param.child_by_field_name("pattern"),
                "assignment_pattern" => param.child_by_field_name("left"),
                _ => Some(param),
            };
            if let Some(target) = target {
                self.pattern_names(target, &mut out);
            }
        }
        out
    }

    fn pattern_names(&self, node: Node<'_>, out: &mut Vec<String>) {
        let mut stack = vec![node];
        while let Some(next) = stack.pop() {
            match next.kind() {
                "identifier" | "shorthand_property_identifier_pattern" => {
                    out.push(self.text_of(&next).to_string());
                }
                "assignment_pattern" | "object_assignment_pattern" => {
                    stack.extend(next.child_by_field_name("left"));
                }
                "pair_pattern" => stack.extend(next.child_by_field_name("value")),
                "rest_pattern" | "object_pattern" | "array_pattern" => {
                    stack.extend(named_children(&next).into_iter().rev());
                }
                _ => {}
            }
        }
    }

    fn push_loop(&mut self, lp: Loop) -> LoopId {
        let id = self.out.loops.len();
        self.out.loops.push(lp);
        self.loops.push(id);
        id
    }

    fn for_statement(&mut self, node: Node<'_>) {
        let initializer = node.child_by_field_name("initializer");
        let condition = node.child_by_field_name("condition").map(|c| {
            if c.kind() == "expression_statement" {
                named_children(&c).into_iter().next().unwrap_or(c)
            } else {
                c
            }
        });
        let counter = initializer.and_then(|init| self.counter_start(init));
        let header_bound = match (&counter, condition) {
            (Some((var, start)), Some(cond)) => self.counted_bound(var, *start, cond),
            _ => None,
        };
        if let Some(init) = initializer {
            self.visit(init);
        }
        self.push_loop(Loop {
            span: Span::of(&node),
            kind: LoopKind::Counted,
            iterable: None,
            targets: counter.map(|(var, _)| vec![var]).unwrap_or_default(),
            header_bound,
            function: self.function,
        });
        if let Some(cond) = condition {
            self.visit(cond);
        }
        if let Some(inc) = node.child_by_field_name("increment") {
            self.visit(inc);
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(body);
        }
        self.loops.pop();
    }

    /// `let i = 0` / `i = 0` in a for-loop initializer.
    fn counter_start(&self, init: Node<'_>) -> Option<(String, i64)> {
        let (name, value) = match init.kind() {
            "lexical_declaration" | "variable_declaration" => {
                let declarator = named_children(&init)
                    .into_iter()
                    .find(|c| c.kind() == "variable_declarator")?;
                (
                    declarator.child_by_field_name("name")?,
                    declarator.child_by_field_name("value")?,
                )
            }
            "expression_statement" => {
                let inner = named_children(&init).into_iter().next()?;
                return self.counter_start(inner);
            }
            "assignment_expression" => (
                init.child_by_field_name("left")?,
                init.child_by_field_name("right")?,
            ),
            _ => return None,
        };
        if name.kind() != "identifier" || value.kind() != "number" {
            return None;
        }
        Some((self.text_of(&name).to_string(), parse_int(self.text_of(&value))?))
    }

    /// Iteration count of `var < N`-style conditions.
    fn counted_bound(&self, var: &str, start: i64, cond: Node<'_>) -> Option<u64> {
        if cond.kind() != "binary_expression" {
            return None;
        }
        let left = cond.child_by_field_name("left")?;
        let right = cond.child_by_field_name("right")?;
        let op = self.text_of(&cond.child_by_field_name("operator")?);
        if left.kind() != "identifier" || self.text_of(&left) != var || right.kind() != "number" {
            return None;
        }
        let limit = parse_int(self.text_of(&right))?;
        let count = match op {
            "<" => limit - start,
            "<=" => limit - start + 1,
            ">" => start - limit,
            ">=" => start - limit + 1,
            _ => return None,
        };
        Some(u64::try_from(count.max(0)).unwrap_or(0))
    }

    fn for_in_statement(&mut self, node: Node<'_>) {
        let iterable = node.child_by_field_name("right").map(|r| self.expr(r));
        let mut targets = Vec::new();
        if let Some(left) = node.child_by_field_name("left") {
            self.pattern_names(left, &mut targets);
        }
        self.push_loop(Loop {
            span: Span::of(&node),
            kind: LoopKind::ForEach,
            iterable,
            targets,
            header_bound: None,
            function: self.function,
        });
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(body);
        }
        self.loops.pop();
    }

    fn while_statement(&mut self, node: Node<'_>) {
        self.push_loop(Loop {
            span: Span::of(&node),
            kind: LoopKind::While,
            iterable: None,
            targets: Vec::new(),
            header_bound: None,
            function: self.function,
        });
        if let Some(cond) = node.child_by_field_name("condition") {
            self.visit(cond);
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(body);
        }
        self.loops.pop();
    }

    // -- Expressions -------------------------------------------------------

    fn expr(&mut self, node: Node<'_>) -> Expr {
        let node = unwrap_transparent(node);
        let span = Span::of(&node);
        if self.depth > MAX_DEPTH {
            return Expr::opaque(span);
        }
        self.depth += 1;
        let kind = self.expr_kind(node);
        self.depth -= 1;
        Expr::new(span, kind)
    }

    fn expr_kind(&mut self, node: Node<'_>) -> ExprKind {
        match node.kind() {
            "string" => ExprKind::Str(string_body(&node, self.text).0),
            "template_string" => self.template(node),
            "number" => {
                let raw = self.text_of(&node);
                parse_int(raw)
                    .map(ExprKind::Int)
                    .or_else(|| raw.replace('_', "").parse().ok().map(ExprKind::Float))
                    .unwrap_or(ExprKind::Opaque)
            }
            "true" => ExprKind::Bool(true),
            "false" => ExprKind::Bool(false),
            "null" | "undefined" => ExprKind::Null,
            "identifier" if self.text_of(&node) == "undefined" => ExprKind::Null,
            "identifier" | "this" | "super" | "shorthand_property_identifier" => {
                ExprKind::Name(self.text_of(&node).to_string())
            }
            "member_expression" => self.member(node),
            "subscript_expression" => {
                let object = node.child_by_field_name("object").map(|v| self.expr(v));
                let index = node.child_by_field_name("index").map(|s| self.expr(s));
                match (object, index) {
                    (Some(object), Some(index)) => ExprKind::Subscript {
                        object: Box::new(object),
                        index: Box::new(index),
                    },
                    _ => ExprKind::Opaque,
                }
            }
            "call_expression" => match required_module(&node, self.text) {
                Some(source) => {
                    let statement = self.next_statement();
                    let (module, module_span) = string_body(&source, self.text);
                    self.out.imports.push(Import {
                        statement,
                        span: Span::of(&node),
                        module_span,
                        module,
                        kind: ImportKind::SideEffect,
                        style: ImportStyle::Require,
                    });
                    ExprKind::Opaque
                }
                None => ExprKind::Call(self.call(node, false)),
            },
            "new_expression" => ExprKind::Call(self.call(node, true)),
            "assignment_expression" => self.assignment(node),
            "binary_expression" => self.binary(node),
            "unary_expression" => self.unary(node),
            "array" => ExprKind::List(
                named_children(&node)
                    .into_iter()
                    .filter(|c| c.kind() != "comment")
                    .map(|c| self.expr(c))
                    .collect(),
            ),
            "object" => self.object(node),
            "spread_element" => match named_children(&node).into_iter().next() {
                Some(inner) => ExprKind::Splat(Box::new(self.expr(inner))),
                None => ExprKind::Opaque,
            },
            "function_declaration"
            | "generator_function_declaration"
            | "function_expression"
            | "function"
            | "generator_function"
            | "arrow_function"
            | "method_definition" => {
                self.function(node, false);
                ExprKind::Opaque
            }
            _ => {
                self.visit_children(node);
                ExprKind::Opaque
            }
        }
    }

    fn template(&mut self, node: Node<'_>) -> ExprKind {
        let (_, body) = string_body(&node, self.text);
        let mut parts = Vec::new();
        let mut cursor = body.start;
        let mut interpolated = false;
        for sub in named_children(&node) {
            if sub.kind() != "template_substitution" {
                continue;
            }
            interpolated = true;
            if let Some(text) = self.text.get(cursor..sub.start_byte()) {
                if !text.is_empty() {
                    parts.push(TemplatePart::Text(text.to_string()));
                }
            }
            let inner = named_children(&sub).into_iter().next();
            parts.push(TemplatePart::Expr(match inner {
                Some(inner) => self.expr(inner),
                None => Expr::opaque(Span::of(&sub)),
            }));
            cursor = sub.end_byte();
        }
        let tail = self.text.get(cursor..body.end).unwrap_or("");
        if interpolated {
            if !tail.is_empty() {
                parts.push(TemplatePart::Text(tail.to_string()));
            }
            ExprKind::Template(parts)
        } else {
            ExprKind::Str(tail.to_string())
        }
    }

    fn member(&mut self, node: Node<'_>) -> ExprKind {
        let (Some(object), Some(prop)) = (
            node.child_by_field_name("object"),
            node.child_by_field_name("property"),
        ) else {
            return ExprKind::Opaque;
        };
        let property = self.text_of(&prop).to_string();
        let object = self.expr(object);
        match object.kind {
            ExprKind::Name(name) => ExprKind::Path(vec![name, property]),
            ExprKind::Path(mut path) => {
                path.push(property);
                ExprKind::Path(path)
            }
            _ => ExprKind::Member {
                object: Box::new(object),
                property,
            },
        }
    }

    fn assignment(&mut self, node: Node<'_>) -> ExprKind {
        let Some(right) = node.child_by_field_name("right") else {
            return ExprKind::Opaque;
        };
        let value = self.expr(right);
        if let Some(left) = node.child_by_field_name("left") {
            if let Some(target) = self.expr(left).path() {
                self.out.assignments.push(Assignment {
                    span: Span::of(&node),
                    target,
                    value: value.clone(),
                    site: self.site(),
                });
            }
        }
        value.kind
    }

    fn binary(&mut self, node: Node<'_>) -> ExprKind {
        let op = match node.child_by_field_name("operator").map(|o| self.text_of(&o)) {
            Some("+") => BinOp::Add,
            Some("||") => BinOp::Or,
            Some("??") => BinOp::Coalesce,
            _ => BinOp::Other,
        };
        match (node.child_by_field_name("left"), node.child_by_field_name("right")) {
            (Some(left), Some(right)) => ExprKind::Binary {
                op,
                left: Box::new(self.expr(left)),
                right: Box::new(self.expr(right)),
            },
            _ => {
                self.visit_children(node);
                ExprKind::Opaque
            }
        }
    }

    fn unary(&mut self, node: Node<'_>) -> ExprKind {
        let negative = node.child_by_field_name("operator").map(|o| self.text_of(&o)) == Some("-");
        let Some(argument) = node.child_by_field_name("argument") else {
            return ExprKind::Opaque;
        };
        match (negative, self.expr(argument).kind) {
            (true, ExprKind::Int(n)) => ExprKind::Int(-n),
            (true, ExprKind::Float(f)) => ExprKind::Float(-f),
            _ => ExprKind::Opaque,
        }
    }

    fn object(&mut self, node: Node<'_>) -> ExprKind {
        let mut entries = Vec::new();
        for child in named_children(&node) {
            match child.kind() {
                "pair" => {
                    let (Some(key), Some(value)) = (
                        child.child_by_field_name("key"),
                        child.child_by_field_name("value"),
                    ) else {
                        continue;
                    };
                    let name = match key.kind() {
                        "property_identifier" | "number" => Some(self.text_of(&key).to_string()),
                        "string" => Some(string_body(&key, self.text).0),
                        _ => {
                            self.visit(key);
                            None
                        }
                    };
                    let value = self.expr(value);
                    let key = match name {
                        Some(name) => {
                            self.out.dict_entries.push(DictEntry {
                                key: name.clone(),
                                value: value.clone(),
                                site: self.site(),
                            });
                            DictKey::Named(name)
                        }
                        None => DictKey::Computed,
                    };
                    entries.push((key, value));
                }
                "shorthand_property_identifier" => {
                    let name = self.text_of(&child).to_string();
                    let value = Expr::new(Span::of(&child), ExprKind::Name(name.clone()));
                    entries.push((DictKey::Named(name), value));
                }
                "spread_element" => {
                    let inner = self.expr(child);
                    entries.push((DictKey::Spread, inner));
                }
                _ => self.visit(child),
            }
        }
        ExprKind::Dict(entries)
    }

    fn call(&mut self, node: Node<'_>, is_new: bool) -> CallId {
        let callee_field = if is_new { "constructor" } else { "function" };
        let callee_expr = node.child_by_field_name(callee_field).map(|f| self.expr(f));
        let (callee, receiver) = callee_expr.as_ref().map(flatten_callee).unwrap_or_default();

        let iterates = callee
            .last()
            .is_some_and(|m| ITERATION_METHODS.contains(&m.as_str()));
        let collection = callee_expr.as_ref().and_then(|e| match &e.kind {
            ExprKind::Member { object, .. } => Some((**object).clone()),
            ExprKind::Path(path) if path.len() > 1 => {
                let object = &path[..path.len() - 1];
                let kind = if object.len() == 1 {
                    ExprKind::Name(object[0].clone())
                } else {
                    ExprKind::Path(object.to_vec())
                };
                Some(Expr::new(e.span, kind))
            }
            _ => None,
        });

        let mut positional = Vec::new();
        let mut keywords = Vec::new();
        let mut splats = Vec::new();
        let mut idents = BTreeSet::new();
        if let Some(args) = node.child_by_field_name("arguments") {
            self.collect_idents(args, &mut idents);
            let list = if args.kind() == "arguments" {
                named_children(&args)
            } else {
                vec![args]
            };
            for arg in list {
                if arg.kind() == "comment" {
                    continue;
                }
                let is_callback = matches!(
                    arg.kind(),
                    "arrow_function" | "function_expression" | "function"
                );
                if iterates && is_callback {
                    positional.push(self.callback(arg, collection.clone()));
                    continue;
                }
                let value = self.expr(arg);
                match &value.kind {
                    ExprKind::Splat(inner) => splats.push((**inner).clone()),
                    ExprKind::Dict(entries) => {
                        for (key, entry) in entries {
                            match key {
                                DictKey::Named(name) => keywords.push(Keyword {
                                    name: name.clone(),
                                    value: entry.clone(),
                                }),
                                DictKey::Spread => splats.push(entry.clone()),
                                DictKey::Computed => {}
                            }
                        }
                        positional.push(value);
                    }
                    _ => positional.push(value),
                }
            }
        }

        let id = self.out.calls.len();
        self.out.calls.push(Call {
            span: Span::of(&node),
            callee,
            receiver,
            is_new,
            positional,
            keywords,
            splats,
            idents,
            site: self.site(),
        });
        id
    }

    /// Lowers a per-element callback as the body of a loop over `collection`.
    fn callback(&mut self, node: Node<'_>, collection: Option<Expr>) -> Expr {
        let mut targets = Vec::new();
        match (
            node.child_by_field_name("parameters"),
            node.child_by_field_name("parameter"),
        ) {
            (Some(params), _) => {
                if let Some(first) = named_children(&params).into_iter().next() {
                    let first = match first.kind() {
                        "required_parameter" | "optional_parameter" => {
                            first.child_by_field_name("pattern").unwrap_or(first)
                        }
                        _ => first,
                    };
                    self.pattern_names(first, &mut targets);
                }
            }
            (None, Some(single)) => targets.push(self.text_of(&single).to_string()),
            (None, None) => {}
        }
        self.push_loop(Loop {
            span: Span::of(&node),
            kind: LoopKind::Callback,
            iterable: collection,
            targets,
            header_bound: None,
            function: self.function,
        });
        self.function(node, true);
        self.loops.pop();
        Expr::opaque(Span::of(&node))
    }

    fn collect_idents(&self, node: Node<'_>, out: &mut BTreeSet<String>) {
        let mut stack = vec![node];
        while let Some(next) = stack.pop() {
            if matches!(next.kind(), "identifier" | "shorthand_property_identifier") {
                out.insert(self.text_of(&next).to_string());
            } else {
                stack.extend(named_children(&next));
            }
        }
    }
}

/// Steps through parentheses, `await` and type-only wrappers (`as`,
/// `satisfies`, `!`, `<T>x`) to the expression they carry.
fn unwrap_transparent(mut node: Node<'_>) -> Node<'_> {
    while matches!(
        node.kind(),
        "parenthesized_expression"
            | "await_expression"
            | "as_expression"
            | "satisfies_expression"
            | "non_null_expression"
            | "type_assertion"
    ) {
        match named_children(&node).into_iter().find(|c| c.kind() != "comment") {
            Some(inner) if !inner.kind().ends_with("type") && inner.kind() != "type_arguments" => node = inner,
            _ => break,
        }
    }
    node
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tally_lang::{JavaScriptAdapter, LanguageAdapter, TypeScriptAdapter};

    fn lower_js(src: &str) -> Syntax {
        let tree = JavaScriptAdapter.parse(src.as_bytes()).unwrap();
        lower_node(&tree, src)
    }

    fn lower_ts(src: &str) -> Syntax {
        let tree = TypeScriptAdapter.parse(src.as_bytes()).unwrap();
        lower_node(&tree, src)
    }

    // -- Imports -----------------------------------------------------------

    #[test]
    fn es_module_imports() {
        let src = "import OpenAI from 'openai';\nimport * as ai from '@anthropic-ai/sdk';\nimport { ChatOpenAI as Chat } from '@langchain/openai';\nimport 'dotenv/config';\n";
        let syntax = lower_js(src);
        assert_eq!(syntax.imports.len(), 4);
        assert_eq!(
            syntax.imports[0].kind,
            ImportKind::Members(vec![ImportedName {
                name: "default".into(),
                alias: "OpenAI".into()
            }])
        );
        assert_eq!(
            syntax.imports[1].kind,
            ImportKind::Module {
                alias: "ai".into(),
                bound: "@anthropic-ai/sdk".into()
            }
        );
        let ImportKind::Members(names) = &syntax.imports[2].kind else {
            panic!("expected named imports");
        };
        assert_eq!(names[0].name, "ChatOpenAI");
        assert_eq!(names[0].alias, "Chat");
        assert_eq!(syntax.imports[3].kind, ImportKind::SideEffect);
        let span = syntax.imports[0].module_span;
        assert_eq!(&src[span.start..span.end], "openai");
    }

    #[test]
    fn require_bindings() {
        let src = "const OpenAI = require('openai');\nconst { Anthropic, Client: C } = require('@anthropic-ai/sdk');\n";
        let syntax = lower_js(src);
        assert_eq!(syntax.imports[0].style, ImportStyle::Require);
        assert_eq!(
            syntax.imports[0].kind,
            ImportKind::Module {
                alias: "OpenAI".into(),
                bound: "openai".into()
            }
        );
        let ImportKind::Members(names) = &syntax.imports[1].kind else {
            panic!("expected destructured require");
        };
        assert_eq!(names[1].name, "Client");
        assert_eq!(names[1].alias, "C");
        let stmt = syntax.imports[0].span;
        assert_eq!(&src[stmt.start..stmt.end], "const OpenAI = require('openai');");
    }

    // -- Calls -------------------------------------------------------------

    #[test]
    fn object_argument_becomes_keywords() {
        let syntax = lower_js("const r = await client.chat.completions.create({ model: 'gpt-4o', max_tokens: 256, messages, ...rest });\n");
        let call = syntax.calls.last().unwrap();
        assert_eq!(call.callee, ["client", "chat", "completions", "create"]);
        assert_eq!(call.keyword(&["model"]).unwrap().value.as_str(), Some("gpt-4o"));
        assert_eq!(call.keyword(&["max_tokens"]).unwrap().value.kind, ExprKind::Int(256));
        assert!(call.keyword(&["messages"]).is_some());
        assert_eq!(call.splats.len(), 1);
        assert!(call.idents.contains("messages"));
    }

    #[test]
    fn new_expression_is_constructor_call() {
        let syntax = lower_ts("const client = new OpenAI({ apiKey: process.env.OPENAI_API_KEY });\n");
        let call = &syntax.calls[0];
        assert!(call.is_new);
        assert_eq!(call.callee, ["OpenAI"]);
        let value = &call.keyword(&["apiKey"]).unwrap().value;
        assert_eq!(value.path().unwrap(), ["process", "env", "OPENAI_API_KEY"]);
        assert_eq!(syntax.assignments[0].target, ["client"]);
    }

    #[test]
    fn template_literal_parts() {
        let syntax = lower_js("const k = `sk-${suffix}`;\nconst plain = `sk-abc`;\n");
        let ExprKind::Template(parts) = &syntax.assignments[0].value.kind else {
            panic!("expected template");
        };
        assert_eq!(parts[0], TemplatePart::Text("sk-".into()));
        assert_eq!(syntax.assignments[1].value.as_str(), Some("sk-abc"));
    }

    #[test]
    fn nullish_fallback_is_coalesce() {
        let syntax = lower_js("const key = process.env.KEY ?? 'sk-default';\n");
        let ExprKind::Binary { op, .. } = &syntax.assignments[0].value.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinOp::Coalesce);
    }

    // -- Loops -------------------------------------------------------------

    #[test]
    fn counted_loop_bound() {
        let syntax = lower_js("for (let i = 0; i < 25; i++) { call(i); }\nfor (let j = 1; j <= 3; j++) {}\n");
        assert_eq!(syntax.loops[0].header_bound, Some(25));
        assert_eq!(syntax.loops[1].header_bound, Some(3));
        let call = syntax.calls.iter().find(|c| c.callee == ["call"]).unwrap();
        assert_eq!(call.site.loops, [0]);
    }

    #[test]
    fn for_of_targets_and_iterable() {
        let syntax = lower_js("for (const text of texts) { embed(text); }\n");
        let lp = &syntax.loops[0];
        assert_eq!(lp.kind, LoopKind::ForEach);
        assert_eq!(lp.targets, ["text"]);
        assert_eq!(lp.iterable.as_ref().unwrap().kind, ExprKind::Name("texts".into()));
    }

    #[test]
    fn array_callbacks_are_loops() {
        let syntax = lower_js("docs.forEach(async (doc) => { await embed(doc); });\n");
        let call = syntax.calls.iter().find(|c| c.callee == ["embed"]).unwrap();
        let lp = &syntax.loops[call.site.loops[0]];
        assert_eq!(lp.kind, LoopKind::Callback);
        assert_eq!(lp.targets, ["doc"]);
        assert_eq!(lp.iterable.as_ref().unwrap().kind, ExprKind::Name("docs".into()));
        assert_eq!(call.site.scope_kind(), ScopeKind::Module);
    }

    // -- Scopes ------------------------------------------------------------

    #[test]
    fn class_methods_and_fields() {
        let src = "class Svc {\n  client = new OpenAI();\n  run() { go(); }\n}\nfunction f() { stop(); }\n";
        let syntax = lower_ts(src);
        let scope_of = |name: &str| {
            syntax
                .calls
                .iter()
                .find(|c| c.callee == [name])
                .map(|c| c.site.scope_kind())
        };
        assert_eq!(scope_of("go"), Some(ScopeKind::ClassMethod));
        assert_eq!(scope_of("stop"), Some(ScopeKind::Function));
        assert_eq!(scope_of("OpenAI"), Some(ScopeKind::ClassMethod));
        assert!(syntax.assignments.iter().any(|a| a.target == ["this", "client"]));
    }

    #[test]
    fn deep_wrappers_unwrap_in_a_loop() {
        let depth = 20_000;
        let src = format!("const x = {}'gpt-4'{};\n", "(".repeat(depth), ")".repeat(depth));
        let syntax = lower_js(&src);
        assert_eq!(syntax.assignments[0].value.as_str(), Some("gpt-4"));

        let src = format!("const y = {}'gpt-4'{};\n", "(await ".repeat(depth / 4), ")".repeat(depth / 4));
        let syntax = lower_ts(&src);
        assert_eq!(syntax.assignments[0].value.as_str(), Some("gpt-4"));
    }

    #[test]
    fn destructuring_names_keep_source_order() {
        let syntax = lower_js("function f({ a, b: [c, { d }], ...e }, g = 1) {}\n");
        assert_eq!(syntax.functions[0].params, ["a", "c", "d", "e", "g"]);
    }

    #[test]
    fn typed_parameters_are_recorded() {
        let syntax = lower_ts("function f(a: string, b?: number, c = 1, ...rest: any[]) {}\n");
        assert_eq!(syntax.functions[0].params, ["a", "b", "c", "rest"]);
    }
}
