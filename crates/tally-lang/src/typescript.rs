//! JavaScript and TypeScript language adapters.
//!
//! Both grammars produce the same node kinds for everything the analysis
//! reads (imports, calls, `new` expressions, object literals, loops), so the
//! lowering in `tally-analysis` treats them as one family.

use crate::adapter::{AdapterRegistry, LanguageAdapter, parse_with};
use crate::error::LangResult;
use crate::language::Language;

// ---------------------------------------------------------------------------
// TypeScriptAdapter
// ---------------------------------------------------------------------------

/// Language adapter for TypeScript and TSX files.
///
/// Always uses the TSX grammar, which accepts plain TypeScript as well.
#[derive(Debug, Clone, Copy)]
pub struct TypeScriptAdapter;

impl LanguageAdapter for TypeScriptAdapter {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    fn extensions(&self) -> &[&str] {
        &["ts", "tsx", "mts", "cts"]
    }

    fn parse(&self, source: &[u8]) -> LangResult<tree_sitter::Tree> {
        parse_with("TypeScript", &self.tree_sitter_language(), source)
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_typescript::LANGUAGE_TSX.into()
    }
}

// ---------------------------------------------------------------------------
// JavaScriptAdapter
// ---------------------------------------------------------------------------

/// Language adapter for JavaScript and JSX files.
#[derive(Debug, Clone, Copy)]
pub struct JavaScriptAdapter;

impl LanguageAdapter for JavaScriptAdapter {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn extensions(&self) -> &[&str] {
        &["js", "jsx", "mjs", "cjs"]
    }

    fn parse(&self, source: &[u8]) -> LangResult<tree_sitter::Tree> {
        parse_with("JavaScript", &self.tree_sitter_language(), source)
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_javascript::LANGUAGE.into()
    }
}

/// Registers both the TypeScript and JavaScript adapters.
pub fn register_js_ts_adapters(registry: &mut AdapterRegistry) {
    registry.register(Box::new(TypeScriptAdapter));
    registry.register(Box::new(JavaScriptAdapter));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
