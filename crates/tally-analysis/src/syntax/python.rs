//! Lowering of `tree-sitter-python` trees.

use std::collections::BTreeSet;

use tree_sitter::Node;

use super::{
    Assignment, BinOp, Call, CallId, DictEntry, DictKey, Expr, ExprKind, Function, FunctionId,
    Import, ImportKind, ImportStyle, ImportedName, Keyword, Loop, LoopId, LoopKind, MAX_DEPTH,
    ScopeKind, Site, Syntax, TemplatePart, collect_error_regions, named_children, node_text,
    parse_int,
};
use crate::finding::Span;

/// Lowers a Python tree into [`Syntax`].
pub(crate) fn lower_python(tree: &tree_sitter::Tree, text: &str) -> Syntax {
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

    // -- Statements --------------------------------------------------------

    fn visit(&mut self, node: Node<'_>) {
        if self.depth > MAX_DEPTH {
            return;
        }
        self.depth += 1;
        match node.kind() {
            "comment" => {}
            "import_statement" => self.import_statement(node),
            "import_from_statement" => self.import_from_statement(node),
            "function_definition" => self.function_definition(node),
            "class_definition" => self.class_definition(node),
            "for_statement" => self.for_statement(node),
            "while_statement" => self.while_statement(node),
            "assignment" => {
                self.assignment(node);
            }
            "with_item" => self.with_item(node),
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

    fn next_statement(&mut self) -> usize {
        self.statement += 1;
        self.statement
    }

    fn import_statement(&mut self, node: Node<'_>) {
        let statement = self.next_statement();
        let span = Span::of(&node);
        let mut cursor = node.walk();
        let names: Vec<Node<'_>> = node.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            let (module_node, alias, bound) = match name.kind() {
                "aliased_import" => {
                    let Some(module_node) = name.child_by_field_name("name") else {
                        continue;
                    };
                    let module = self.text_of(&module_node).to_string();
                    let alias = name
                        .child_by_field_name("alias")
                        .map_or_else(|| module.clone(), |a| self.text_of(&a).to_string());
                    (module_node, alias, module)
                }
                _ => {
                    let module = self.text_of(&name);
                    let root = module.split('.').next().unwrap_or(module).to_string();
                    (name, root.clone(), root)
                }
            };
            self.out.imports.push(Import {
                statement,
                span,
                module_span: Span::of(&module_node),
                module: self.text_of(&module_node).to_string(),
                kind: ImportKind::Module { alias, bound },
                style: ImportStyle::PyImport,
            });
        }
    }

    fn import_from_statement(&mut self, node: Node<'_>) {
        let statement = self.next_statement();
        let Some(module_node) = node.child_by_field_name("module_name") else {
            return;
        };
        let wildcard = named_children(&node)
            .iter()
            .any(|c| c.kind() == "wildcard_import");
        let kind = if wildcard {
            ImportKind::Wildcard
        } else {
            let mut cursor = node.walk();
            let names = node
                .children_by_field_name("name", &mut cursor)
                .filter_map(|n| match n.kind() {
                    "aliased_import" => {
                        let name = self.text_of(&n.child_by_field_name("name")?).to_string();
                        let alias = n
                            .child_by_field_name("alias")
                            .map_or_else(|| name.clone(), |a| self.text_of(&a).to_string());
                        Some(ImportedName { name, alias })
                    }
                    _ => {
                        let name = self.text_of(&n).to_string();
                        Some(ImportedName {
                            alias: name.clone(),
                            name,
                        })
                    }
                })
                .collect();
            ImportKind::Members(names)
        };
        self.out.imports.push(Import {
            statement,
            span: Span::of(&node),
            module_span: Span::of(&module_node),
            module: self.text_of(&module_node).to_string(),
            kind,
            style: ImportStyle::PyFrom,
        });
    }

    fn function_definition(&mut self, node: Node<'_>) {
        let kind = if self.in_class_body {
            ScopeKind::ClassMethod
        } else {
            ScopeKind::Function
        };
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text_of(&n).to_string());
        let params = node
            .child_by_field_name("parameters")
            .map(|p| self.parameters(p))
            .unwrap_or_default();
        if let Some(body) = node.child_by_field_name("body") {
            self.in_function(Span::of(&node), name, params, kind, |l| l.visit(body));
        }
    }

    fn in_function(
        &mut self,
        span: Span,
        name: Option<String>,
        params: Vec<String>,
        kind: ScopeKind,
        body: impl FnOnce(&mut Self),
    ) {
        let id = self.out.functions.len();
        self.out.functions.push(Function {
            span,
            name,
            params,
            kind,
            parent: self.function,
        });
        let saved_function = self.function.replace(id);
        let saved_scope = self.scope.replace(kind);
        let saved_class = std::mem::replace(&mut self.in_class_body, false);
        let saved_loops = std::mem::take(&mut self.loops);
        body(self);
        self.function = saved_function;
        self.scope = saved_scope;
        self.in_class_body = saved_class;
        self.loops = saved_loops;
    }

    fn parameters(&self, node: Node<'_>) -> Vec<String> {
        named_children(&node)
            .iter()
            .filter_map(|p| match p.kind() {
                "identifier" => Some(self.text_of(p).to_string()),
                "default_parameter" | "typed_default_parameter" => p
                    .child_by_field_name("name")
                    .map(|n| self.text_of(&n).to_string()),
                "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                    named_children(p)
                        .into_iter()
                        .find(|c| c.kind() == "identifier")
                        .map(|n| self.text_of(&n).to_string())
                }
                _ => None,
            })
            .collect()
    }

    fn class_definition(&mut self, node: Node<'_>) {
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let saved = std::mem::replace(&mut self.in_class_body, true);
        self.visit(body);
        self.in_class_body = saved;
    }

    fn push_loop(&mut self, lp: Loop) -> LoopId {
        let id = self.out.loops.len();
        self.out.loops.push(lp);
        self.loops.push(id);
        id
    }

    fn for_statement(&mut self, node: Node<'_>) {
        let iterable = node.child_by_field_name("right").map(|r| self.expr(r));
        let targets = node
            .child_by_field_name("left")
            .map(|l| self.identifiers(l))
            .unwrap_or_default();
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
        if let Some(alt) = node.child_by_field_name("alternative") {
            self.visit(alt);
        }
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
        if let Some(alt) = node.child_by_field_name("alternative") {
            self.visit(alt);
        }
    }

    /// Records `left = right` and returns the assigned value.
    ///
    /// Chains (`a = b = value`) are walked in a loop, innermost target first.
    fn assignment(&mut self, node: Node<'_>) -> Option<Expr> {
        let mut chain = vec![node];
        let mut right = node.child_by_field_name("right")?;
        while right.kind() == "assignment" {
            chain.push(right);
            right = right.child_by_field_name("right")?;
        }
        let value = self.expr(right);
        for link in chain.into_iter().rev() {
            let Some(left) = link.child_by_field_name("left") else {
                continue;
            };
            if let Some(target) = self.expr(left).path() {
                self.out.assignments.push(Assignment {
                    span: Span::of(&link),
                    target,
                    value: value.clone(),
                    site: self.site(),
                });
            }
        }
        Some(value)
    }

    /// `with Client() as client:` binds `client` like an assignment.
    fn with_item(&mut self, node: Node<'_>) {
        let Some(value) = node.child_by_field_name("value") else {
            return;
        };
        if value.kind() != "as_pattern" {
            self.expr(value);
            return;
        }
        let children = named_children(&value);
        let Some(source) = children.first() else {
            return;
        };
        let lowered = self.expr(*source);
        let target = value
            .child_by_field_name("alias")
            .map(|alias| self.identifiers(alias))
            .unwrap_or_default();
        if let [name] = target.as_slice() {
            self.out.assignments.push(Assignment {
                span: Span::of(&value),
                target: vec![name.clone()],
                value: lowered,
                site: self.site(),
            });
        }
    }

    /// Identifiers under `node` in source order.
    fn identifiers(&self, node: Node<'_>) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(next) = stack.pop() {
            if next.kind() == "identifier" {
                out.push(self.text_of(&next).to_string());
            } else {
                stack.extend(named_children(&next).into_iter().rev());
            }
        }
        out
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
            "string" => self.string(node),
            "concatenated_string" => {
                ExprKind::Concat(named_children(&node).into_iter().map(|c| self.expr(c)).collect())
            }
            "integer" => parse_int(self.text_of(&node)).map_or(ExprKind::Opaque, ExprKind::Int),
            "float" => self
                .text_of(&node)
                .replace('_', "")
                .parse()
                .map_or(ExprKind::Opaque, ExprKind::Float),
            "true" => ExprKind::Bool(true),
            "false" => ExprKind::Bool(false),
            "none" => ExprKind::Null,
            "identifier" => ExprKind::Name(self.text_of(&node).to_string()),
            "attribute" => self.attribute(node),
            "subscript" => {
                let object = node.child_by_field_name("value").map(|v| self.expr(v));
                let index = node.child_by_field_name("subscript").map(|s| self.expr(s));
                match (object, index) {
                    (Some(object), Some(index)) => ExprKind::Subscript {
                        object: Box::new(object),
                        index: Box::new(index),
                    },
                    _ => ExprKind::Opaque,
                }
            }
            "call" => ExprKind::Call(self.call(node)),
            "binary_operator" | "boolean_operator" => self.binary(node),
            "unary_operator" => self.unary(node),
            "list" | "tuple" | "set" | "expression_list" => ExprKind::List(
                named_children(&node)
                    .into_iter()
                    .filter(|c| c.kind() != "comment")
                    .map(|c| self.expr(c))
                    .collect(),
            ),
            "dictionary" => self.dictionary(node),
            "list_comprehension" | "set_comprehension" | "generator_expression"
            | "dictionary_comprehension" => self.comprehension(node),
            "list_splat" | "dictionary_splat" => match named_children(&node).into_iter().next() {
                Some(inner) => ExprKind::Splat(Box::new(self.expr(inner))),
                None => ExprKind::Opaque,
            },
            "named_expression" => self.named_expression(node),
            "lambda" => {
                let params = node
                    .child_by_field_name("parameters")
                    .map(|p| self.parameters(p))
                    .unwrap_or_default();
                if let Some(body) = node.child_by_field_name("body") {
                    self.in_function(Span::of(&node), None, params, ScopeKind::Function, |l| {
                        l.visit(body);
                    });
                }
                ExprKind::Opaque
            }
            _ => {
                self.visit_children(node);
                ExprKind::Opaque
            }
        }
    }

    fn string(&mut self, node: Node<'_>) -> ExprKind {
        let children = named_children(&node);
        let content_start = children
            .iter()
            .find(|c| c.kind() == "string_start")
            .map_or(node.start_byte(), Node::end_byte);
        let content_end = children
            .iter()
            .find(|c| c.kind() == "string_end")
            .map_or(node.end_byte(), Node::start_byte);

        let mut parts = Vec::new();
        let mut cursor = content_start;
        let mut interpolated = false;
        for child in children.iter().filter(|c| c.kind() == "interpolation") {
            interpolated = true;
            if let Some(text) = self.text.get(cursor..child.start_byte()) {
                if !text.is_empty() {
                    parts.push(TemplatePart::Text(text.to_string()));
                }
            }
            let formatted = child.child_by_field_name("format_specifier").is_some()
                || child.child_by_field_name("type_conversion").is_some();
            match child.child_by_field_name("expression") {
                Some(inner) if !formatted => parts.push(TemplatePart::Expr(self.expr(inner))),
                _ => {
                    self.visit_children(*child);
                    parts.push(TemplatePart::Expr(Expr::opaque(Span::of(child))));
                }
            }
            cursor = child.end_byte();
        }
        let tail = self.text.get(cursor..content_end).unwrap_or("");
        if interpolated {
            if !tail.is_empty() {
                parts.push(TemplatePart::Text(tail.to_string()));
            }
            ExprKind::Template(parts)
        } else {
            ExprKind::Str(tail.to_string())
        }
    }

    fn attribute(&mut self, node: Node<'_>) -> ExprKind {
        let (Some(object), Some(attr)) = (
            node.child_by_field_name("object"),
            node.child_by_field_name("attribute"),
        ) else {
            return ExprKind::Opaque;
        };
        let property = self.text_of(&attr).to_string();
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

    fn binary(&mut self, node: Node<'_>) -> ExprKind {
        let op = match node.child_by_field_name("operator").map(|o| self.text_of(&o)) {
            Some("+") => BinOp::Add,
            Some("or") => BinOp::Or,
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
            (false, kind @ (ExprKind::Int(_) | ExprKind::Float(_))) => kind,
            _ => ExprKind::Opaque,
        }
    }

    fn dictionary(&mut self, node: Node<'_>) -> ExprKind {
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
                    let key = self.expr(key);
                    let value = self.expr(value);
                    let key = match key.as_str() {
                        Some(name) => {
                            self.out.dict_entries.push(DictEntry {
                                key: name.to_string(),
                                value: value.clone(),
                                site: self.site(),
                            });
                            DictKey::Named(name.to_string())
                        }
                        None => DictKey::Computed,
                    };
                    entries.push((key, value));
                }
                "dictionary_splat" => {
                    let inner = self.expr(child);
                    entries.push((DictKey::Spread, inner));
                }
                _ => {}
            }
        }
        ExprKind::Dict(entries)
    }

    fn comprehension(&mut self, node: Node<'_>) -> ExprKind {
        let children = named_children(&node);
        let mut pushed = 0;
        let mut first_iterable = None;
        for clause in children.iter().filter(|c| c.kind() == "for_in_clause") {
            let iterable = clause.child_by_field_name("right").map(|r| self.expr(r));
            if first_iterable.is_none() {
                first_iterable.clone_from(&iterable);
            }
            let targets = clause
                .child_by_field_name("left")
                .map(|l| self.identifiers(l))
                .unwrap_or_default();
            self.push_loop(Loop {
                span: Span::of(&node),
                kind: LoopKind::Comprehension,
                iterable,
                targets,
                header_bound: None,
                function: self.function,
            });
            pushed += 1;
        }
        for child in &children {
            if child.kind() == "if_clause" {
                self.visit(*child);
            }
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(body);
        }
        for _ in 0..pushed {
            self.loops.pop();
        }
        match first_iterable {
            Some(iterable) => ExprKind::Comprehension {
                iterable: Box::new(iterable),
            },
            None => ExprKind::Opaque,
        }
    }

    fn named_expression(&mut self, node: Node<'_>) -> ExprKind {
        let Some(value) = node.child_by_field_name("value") else {
            return ExprKind::Opaque;
        };
        let value = self.expr(value);
        if let Some(name) = node.child_by_field_name("name") {
            self.out.assignments.push(Assignment {
                span: Span::of(&node),
                target: vec![self.text_of(&name).to_string()],
                value: value.clone(),
                site: self.site(),
            });
        }
        value.kind
    }

    fn call(&mut self, node: Node<'_>) -> CallId {
        let callee_expr = node.child_by_field_name("function").map(|f| self.expr(f));
        let (callee, receiver) = callee_expr.as_ref().map(flatten_callee).unwrap_or_default();

        let mut positional = Vec::new();
        let mut keywords = Vec::new();
        let mut splats = Vec::new();
        let mut idents = BTreeSet::new();
        if let Some(args) = node.child_by_field_name("arguments") {
            self.collect_idents(args, &mut idents);
            if args.kind() == "argument_list" {
                for arg in named_children(&args) {
                    match arg.kind() {
                        "comment" => {}
                        "keyword_argument" => {
                            let (Some(name), Some(value)) = (
                                arg.child_by_field_name("name"),
                                arg.child_by_field_name("value"),
                            ) else {
                                continue;
                            };
                            keywords.push(Keyword {
                                name: self.text_of(&name).to_string(),
                                value: self.expr(value),
                            });
                        }
                        "list_splat" | "dictionary_splat" => {
                            if let Some(inner) = named_children(&arg).into_iter().next() {
                                splats.push(self.expr(inner));
                            }
                        }
                        _ => positional.push(self.expr(arg)),
                    }
                }
            } else {
                positional.push(self.expr(args));
            }
        }

        let id = self.out.calls.len();
        self.out.calls.push(Call {
            span: Span::of(&node),
            callee,
            receiver,
            is_new: false,
            positional,
            keywords,
            splats,
            idents,
            site: self.site(),
        });
        id
    }

    fn collect_idents(&self, node: Node<'_>, out: &mut BTreeSet<String>) {
        let mut stack = vec![node];
        while let Some(next) = stack.pop() {
            if next.kind() == "identifier" {
                out.insert(self.text_of(&next).to_string());
                continue;
            }
            let skip = match next.kind() {
                "keyword_argument" => next.child_by_field_name("name"),
                "attribute" => next.child_by_field_name("attribute"),
                _ => None,
            };
            stack.extend(
                named_children(&next)
                    .into_iter()
                    .filter(|child| skip.map_or(true, |s| s.id() != child.id())),
            );
        }
    }
}

/// Steps through parentheses and `await`, which carry no value of their own.
fn unwrap_transparent(mut node: Node<'_>) -> Node<'_> {
    while matches!(node.kind(), "parenthesized_expression" | "await") {
        match named_children(&node).into_iter().find(|c| c.kind() != "comment") {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

/// Splits a callee expression into a member path and an optional receiver call.
pub(super) fn flatten_callee(expr: &Expr) -> (Vec<String>, Option<CallId>) {
    match &expr.kind {
        ExprKind::Name(name) => (vec![name.clone()], None),
        ExprKind::Path(path) => (path.clone(), None),
        ExprKind::Call(id) => (Vec::new(), Some(*id)),
        ExprKind::Member { object, property } => {
            let (mut path, receiver) = flatten_callee(object);
            if path.is_empty() && receiver.is_none() {
                return (Vec::new(), None);
            }
            path.push(property.clone());
            (path, receiver)
        }
        _ => (Vec::new(), None),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tally_lang::{LanguageAdapter, PythonAdapter};

    fn lower(src: &str) -> Syntax {
        let tree = PythonAdapter.parse(src.as_bytes()).unwrap();
        lower_python(&tree, src)
    }

    // -- Imports -----------------------------------------------------------

    #[test]
    fn plain_and_aliased_imports() {
        let syntax = lower("import openai\nimport google.generativeai as genai\nimport os, json\n");
        assert_eq!(syntax.imports.len(), 4);
        assert_eq!(
            syntax.imports[0].kind,
            ImportKind::Module {
                alias: "openai".into(),
                bound: "openai".into()
            }
        );
        assert_eq!(
            syntax.imports[1].kind,
            ImportKind::Module {
                alias: "genai".into(),
                bound: "google.generativeai".into()
            }
        );
        assert_eq!(syntax.imports[2].statement, syntax.imports[3].statement);
    }

    #[test]
    fn from_imports_keep_aliases() {
        let src = "from openai import OpenAI as Client, AsyncOpenAI\nfrom anthropic import *\n";
        let syntax = lower(src);
        let ImportKind::Members(names) = &syntax.imports[0].kind else {
            panic!("expected member import");
        };
        assert_eq!(names[0].name, "OpenAI");
        assert_eq!(names[0].alias, "Client");
        assert_eq!(names[1].alias, "AsyncOpenAI");
        assert_eq!(syntax.imports[1].kind, ImportKind::Wildcard);
        let module_span = syntax.imports[0].module_span;
        assert_eq!(&src[module_span.start..module_span.end], "openai");
    }

    // -- Calls -------------------------------------------------------------

    #[test]
    fn call_arguments_are_lowered() {
        let syntax = lower("client.chat.completions.create(model=\"gpt-4\", max_tokens=500, **extra)\n");
        let call = syntax.calls.last().unwrap();
        assert_eq!(call.callee, ["client", "chat", "completions", "create"]);
        assert_eq!(call.keyword(&["model"]).unwrap().value.as_str(), Some("gpt-4"));
        assert_eq!(call.keyword(&["max_tokens"]).unwrap().value.kind, ExprKind::Int(500));
        assert_eq!(call.splats.len(), 1);
    }

    #[test]
    fn chained_call_records_receiver() {
        let syntax = lower("genai.GenerativeModel('gemini-pro').generate_content(prompt)\n");
        let outer = syntax.calls.last().unwrap();
        assert_eq!(outer.callee, ["generate_content"]);
        let receiver = outer.receiver.unwrap();
        assert_eq!(syntax.calls[receiver].callee, ["genai", "GenerativeModel"]);
        assert!(outer.idents.contains("prompt"));
    }

    // -- Strings -----------------------------------------------------------

    #[test]
    fn fstring_parts() {
        let syntax = lower("key = f\"sk-{env}-abc\"\n");
        let ExprKind::Template(parts) = &syntax.assignments[0].value.kind else {
            panic!("expected template");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], TemplatePart::Text("sk-".into()));
        assert!(matches!(&parts[1], TemplatePart::Expr(e) if e.kind == ExprKind::Name("env".into())));
    }

    #[test]
    fn formatted_interpolation_is_opaque() {
        let syntax = lower("x = f\"{n:>10}\"\n");
        let ExprKind::Template(parts) = &syntax.assignments[0].value.kind else {
            panic!("expected template");
        };
        assert!(matches!(&parts[0], TemplatePart::Expr(e) if e.kind == ExprKind::Opaque));
    }

    // -- Scopes and loops --------------------------------------------------

    #[test]
    fn scopes_distinguish_methods() {
        let src = "class Svc:\n    def run(self):\n        f()\n\ndef g():\n    h()\n\nk()\n";
        let syntax = lower(src);
        let scope_of = |name: &str| {
            syntax
                .calls
                .iter()
                .find(|c| c.callee == [name])
                .map(|c| c.site.scope_kind())
        };
        assert_eq!(scope_of("f"), Some(ScopeKind::ClassMethod));
        assert_eq!(scope_of("h"), Some(ScopeKind::Function));
        assert_eq!(scope_of("k"), Some(ScopeKind::Module));
    }

    #[test]
    fn loops_nest_around_calls() {
        let src = "for i in range(3):\n    while ok:\n        call(i)\n";
        let syntax = lower(src);
        let call = syntax.calls.iter().find(|c| c.callee == ["call"]).unwrap();
        assert_eq!(call.site.loops.len(), 2);
        assert_eq!(syntax.loops[call.site.loops[0]].targets, ["i"]);
        assert_eq!(syntax.loops[call.site.loops[1]].kind, LoopKind::While);
        let range = syntax.calls.iter().find(|c| c.callee == ["range"]).unwrap();
        assert!(range.site.loops.is_empty(), "iterable is evaluated outside the loop");
    }

    #[test]
    fn function_body_does_not_inherit_loops() {
        let src = "for x in xs:\n    def inner():\n        call()\n";
        let syntax = lower(src);
        let call = syntax.calls.iter().find(|c| c.callee == ["call"]).unwrap();
        assert!(call.site.loops.is_empty());
    }

    #[test]
    fn comprehension_creates_loop() {
        let syntax = lower("out = [embed(t) for t in texts]\n");
        let call = syntax.calls.iter().find(|c| c.callee == ["embed"]).unwrap();
        let lp = &syntax.loops[call.site.loops[0]];
        assert_eq!(lp.kind, LoopKind::Comprehension);
        assert_eq!(lp.targets, ["t"]);
    }

    // -- Assignments and dicts ---------------------------------------------

    #[test]
    fn attribute_assignment_and_dict_entries() {
        let syntax = lower("openai.api_key = 'sk-abc'\ncfg = {'api_key': k, **more}\n");
        assert_eq!(syntax.assignments[0].target, ["openai", "api_key"]);
        assert_eq!(syntax.dict_entries.len(), 1);
        assert_eq!(syntax.dict_entries[0].key, "api_key");
        let entries = syntax.assignments[1].value.as_dict().unwrap();
        assert_eq!(entries[1].0, DictKey::Spread);
    }

    #[test]
    fn parameters_are_recorded() {
        let syntax = lower("def f(a, b: int, c=1, *rest, **kw):\n    pass\n");
        assert_eq!(syntax.functions[0].params, ["a", "b", "c", "rest", "kw"]);
    }

    #[test]
    fn error_regions_are_collected() {
        let syntax = lower("import openai\ndef broken(:\n    pass\nclient = openai.OpenAI()\n");
        assert!(!syntax.error_regions.is_empty());
        assert_eq!(syntax.imports.len(), 1);
    }

    #[test]
    fn deep_parentheses_unwrap_in_a_loop() {
        let depth = 20_000;
        let src = format!("x = {}1{}\n", "(".repeat(depth), ")".repeat(depth));
        let syntax = lower(&src);
        assert_eq!(syntax.assignments[0].target, ["x"]);
        assert_eq!(syntax.assignments[0].value.kind, ExprKind::Int(1));
    }

    #[test]
    fn chained_assignment_binds_every_target() {
        let names: Vec<String> = (0..5_000).map(|i| format!("v{i}")).collect();
        let src = format!("{} = 'gpt-4'\n", names.join(" = "));
        let syntax = lower(&src);
        assert_eq!(syntax.assignments.len(), names.len());
        assert_eq!(syntax.assignments[0].target, [names[names.len() - 1].as_str()]);
        assert!(syntax.assignments.iter().all(|a| a.value.as_str() == Some("gpt-4")));
    }

    #[test]
    fn nested_loop_targets_keep_source_order() {
        let src = "for (a, (b, (c, d))) in rows:\n    pass\n";
        let syntax = lower(src);
        assert_eq!(syntax.loops[0].targets, ["a", "b", "c", "d"]);
    }

    #[test]
    fn with_statement_binds_target() {
        let syntax = lower("with anthropic.Anthropic() as client:\n    client.messages.create()\n");
        let assignment = &syntax.assignments[0];
        assert_eq!(assignment.target, ["client"]);
        assert!(matches!(assignment.value.kind, ExprKind::Call(_)));
        assert_eq!(syntax.calls.len(), 2);
    }
}
