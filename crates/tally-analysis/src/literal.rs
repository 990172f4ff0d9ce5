//! Static literal evaluation.
//!
//! [`evaluate`] folds an [`Expr`] into a [`Value`]: a [`Literal`] when every
//! part of the expression is statically known, [`Value::Unknown`] otherwise.
//! Names are followed through the assignment visible at the use site, so
//! `KEY = "sk-..."; Client(api_key=KEY)` resolves to the literal at its
//! definition.

use tally_lang::LanguageFamily;

use crate::finding::Span;
use crate::syntax::{BinOp, Expr, ExprKind, FunctionId, Syntax, TemplatePart};

/// Name indirections followed before giving up.
const MAX_INDIRECTIONS: usize = 16;

/// A statically known scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// String literal.
    Str(String),
    /// Integer literal.
    Int(i64),
    /// Floating-point literal.
    Float(f64),
    /// Boolean literal.
    Bool(bool),
}

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Fully resolved value and the span of the expression that produced it.
    Literal {
        /// Resolved value.
        literal: Literal,
        /// Span of the defining expression.
        span: Span,
    },
    /// Not statically resolvable.
    Unknown,
}

impl Value {
    fn of(literal: Literal, span: Span) -> Self {
        Self::Literal { literal, span }
    }

    /// String value, if resolved to a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Literal {
                literal: Literal::Str(s),
                ..
            } => Some(s),
            _ => None,
        }
    }

    /// Integer value, accepting integral floats.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Literal {
                literal: Literal::Int(n),
                ..
            } => Some(*n),
            #[allow(clippy::cast_possible_truncation)]
            Self::Literal {
                literal: Literal::Float(f),
                ..
            } if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    /// Boolean value, if resolved to a boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Literal {
                literal: Literal::Bool(b),
                ..
            } => Some(*b),
            _ => None,
        }
    }

    /// Span of the defining expression.
    #[must_use]
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Literal { span, .. } => Some(*span),
            Self::Unknown => None,
        }
    }

    /// `true` for [`Value::Unknown`].
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

/// Evaluates `expr` as seen from `function`.
#[must_use]
pub fn evaluate(syntax: &Syntax, expr: &Expr, function: Option<FunctionId>) -> Value {
    eval(syntax, expr, function, 0)
}

fn eval(syntax: &Syntax, expr: &Expr, function: Option<FunctionId>, depth: usize) -> Value {
    if depth > MAX_INDIRECTIONS {
        return Value::Unknown;
    }
    match &expr.kind {
        ExprKind::Str(s) => Value::of(Literal::Str(s.clone()), expr.span),
        ExprKind::Int(n) => Value::of(Literal::Int(*n), expr.span),
        ExprKind::Float(f) => Value::of(Literal::Float(*f), expr.span),
        ExprKind::Bool(b) => Value::of(Literal::Bool(*b), expr.span),
        ExprKind::Name(_) | ExprKind::Path(_) => {
            let Some((value, site_function)) = definition(syntax, expr, function) else {
                return Value::Unknown;
            };
            eval(syntax, value, site_function, depth + 1)
        }
        ExprKind::Concat(parts) => {
            let mut out = String::new();
            for part in parts {
                match eval(syntax, part, function, depth + 1) {
                    Value::Literal {
                        literal: Literal::Str(s),
                        ..
                    } => out.push_str(&s),
                    _ => return Value::Unknown,
                }
            }
            Value::of(Literal::Str(out), expr.span)
        }
        ExprKind::Template(parts) => {
            let mut out = String::new();
            for part in parts {
                match part {
                    TemplatePart::Text(text) => out.push_str(text),
                    TemplatePart::Expr(inner) => match eval(syntax, inner, function, depth + 1) {
                        Value::Literal { literal, .. } => match render(&literal, syntax.family) {
                            Some(text) => out.push_str(&text),
                            None => return Value::Unknown,
                        },
                        Value::Unknown => return Value::Unknown,
                    },
                }
            }
            Value::of(Literal::Str(out), expr.span)
        }
        ExprKind::Binary {
            op: BinOp::Add,
            left,
            right,
        } => {
            let left = eval(syntax, left, function, depth + 1);
            let right = eval(syntax, right, function, depth + 1);
            match (left, right) {
                (
                    Value::Literal {
                        literal: Literal::Str(a),
                        ..
                    },
                    Value::Literal {
                        literal: Literal::Str(b),
                        ..
                    },
                ) => Value::of(Literal::Str(a + &b), expr.span),
                (
                    Value::Literal {
                        literal: Literal::Int(a),
                        ..
                    },
                    Value::Literal {
                        literal: Literal::Int(b),
                        ..
                    },
                ) => a
                    .checked_add(b)
                    .map_or(Value::Unknown, |n| Value::of(Literal::Int(n), expr.span)),
                _ => Value::Unknown,
            }
        }
        _ => Value::Unknown,
    }
}

/// Interpolated text of `literal` as the language formats it.
///
/// Floats whose formatting switches to exponent notation are left
/// unresolved.
fn render(literal: &Literal, family: Option<LanguageFamily>) -> Option<String> {
    let python = family == Some(LanguageFamily::Python);
    match literal {
        Literal::Str(s) => Some(s.clone()),
        Literal::Int(n) => Some(n.to_string()),
        Literal::Bool(b) if python => Some(if *b { "True" } else { "False" }.to_string()),
        Literal::Bool(b) => Some(b.to_string()),
        // Python `str(float)` keeps the point: `1.0`, `0.5`.
        Literal::Float(f) if python => {
            let magnitude = f.abs();
            (magnitude == 0.0 || (1e-4..1e16).contains(&magnitude)).then(|| format!("{f:?}"))
        }
        // JS drops it for integral values: `1`, `0.5`.
        Literal::Float(f) if *f == 0.0 => Some("0".to_string()),
        Literal::Float(f) => (1e-6..1e21).contains(&f.abs()).then(|| f.to_string()),
    }
}

/// The value assigned to the name or path `expr`, with the defining
/// assignment's function.
fn definition<'a>(
    syntax: &'a Syntax,
    expr: &Expr,
    function: Option<FunctionId>,
) -> Option<(&'a Expr, Option<FunctionId>)> {
    let target = expr.path()?;
    let assignment = syntax.visible_assignment(&target, expr.span.start, function)?;
    Some((&assignment.value, assignment.site.function))
}

/// Follows name indirection until reaching a non-name expression.
///
/// Returns `expr` itself when it is not a name or the name has no visible
/// assignment.
#[must_use]
pub fn follow<'a>(syntax: &'a Syntax, expr: &'a Expr, function: Option<FunctionId>) -> &'a Expr {
    follow_scoped(syntax, expr, function).0
}

/// Like [`follow`], also returning the function the final expression
/// belongs to.
#[must_use]
pub fn follow_scoped<'a>(
    syntax: &'a Syntax,
    expr: &'a Expr,
    function: Option<FunctionId>,
) -> (&'a Expr, Option<FunctionId>) {
    let mut current = expr;
    let mut scope = function;
    for _ in 0..MAX_INDIRECTIONS {
        if !matches!(current.kind, ExprKind::Name(_)) {
            break;
        }
        match definition(syntax, current, scope) {
            Some((value, site_function)) => {
                current = value;
                scope = site_function;
            }
            None => break,
        }
    }
    (current, scope)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
