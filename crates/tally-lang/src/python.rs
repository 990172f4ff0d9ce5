//! Python language adapter backed by `tree-sitter-python`.

use crate::adapter::{AdapterRegistry, LanguageAdapter, parse_with};
use crate::error::LangResult;
use crate::language::Language;

/// Language adapter for Python sources and `.pyi` stubs.
#[derive(Debug, Clone, Copy)]
pub struct PythonAdapter;

impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    fn extensions(&self) -> &[&str] {
        &["py", "pyi"]
    }

    fn parse(&self, source: &[u8]) -> LangResult<tree_sitter::Tree> {
        parse_with("Python", &self.tree_sitter_language(), source)
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }
}

/// Registers the [`PythonAdapter`] into an existing [`AdapterRegistry`].
pub fn register_python_adapter(registry: &mut AdapterRegistry) {
    registry.register(Box::new(PythonAdapter));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sdk_client_setup() {
        let source = b"from openai import OpenAI\nclient = OpenAI(api_key=key)\n";
        let tree = PythonAdapter.parse(source).expect("valid Python should parse");
        let root = tree.root_node();
        assert_eq!(root.kind(), "module");
        assert!(!root.has_error(), "AST should have no errors");
        assert_eq!(root.named_child_count(), 2);
    }

    #[test]
    fn malformed_statement_still_produces_a_tree() {
        let source = b"import anthropic\ndef broken(:\n    pass\n";
        let tree = PythonAdapter.parse(source).expect("tree-sitter recovers");
        let root = tree.root_node();
        assert!(root.has_error());
        let first = root.named_child(0).unwrap();
        assert_eq!(first.kind(), "import_statement");
    }

    #[test]
    fn fstring_is_a_string_node() {
        let source = b"key = f\"sk-{env}-123\"\n";
        let tree = PythonAdapter.parse(source).unwrap();
        let sexp = tree.root_node().to_sexp();
        assert!(sexp.contains("interpolation"), "unexpected tree: {sexp}");
    }
}
