//! Language adapter trait and adapter registry.
//!
//! Every grammar backend implements [`LanguageAdapter`]. The
//! [`AdapterRegistry`] owns one adapter per [`Language`] and resolves
//! adapters by bare extension or by language.

use std::collections::HashMap;

use crate::error::{LangError, LangResult};
use crate::language::Language;

// ---------------------------------------------------------------------------
// LanguageAdapter trait
// ---------------------------------------------------------------------------

/// A language backend that can parse source code via tree-sitter.
///
/// Implementations must be `Send + Sync` so a single registry can serve
/// parallel file scans. `tree_sitter::Parser` is `!Send`, so each call to
/// [`parse`](Self::parse) builds its own parser.
pub trait LanguageAdapter: Send + Sync {
    /// Returns the [`Language`] variant this adapter handles.
    fn language(&self) -> Language;

    /// Returns the file extensions this adapter handles **without** the leading dot.
    fn extensions(&self) -> &[&str];

    /// Parse `source` into a tree-sitter [`Tree`](tree_sitter::Tree).
    ///
    /// # Errors
    ///
    /// Returns [`LangError::NoTree`] if the parser produces no tree.
    fn parse(&self, source: &[u8]) -> LangResult<tree_sitter::Tree>;

    /// Returns the tree-sitter grammar for this adapter.
    fn tree_sitter_language(&self) -> tree_sitter::Language;
}

/// Parses `source` with a fresh parser for `grammar`.
pub(crate) fn parse_with(
    label: &'static str,
    grammar: &tree_sitter::Language,
    source: &[u8],
) -> LangResult<tree_sitter::Tree> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(grammar)
        .map_err(|source| LangError::Grammar { language: label, source })?;
    tracing::debug!(language = label, source_len = source.len(), "parsing source");
    parser.parse(source, None).ok_or(LangError::NoTree { language: label })
}

// ---------------------------------------------------------------------------
// AdapterRegistry
// ---------------------------------------------------------------------------

/// A collection of registered [`LanguageAdapter`]s.
pub struct AdapterRegistry {
    adapters: HashMap<Language, Box<dyn LanguageAdapter>>,
    /// Bare file extensions (e.g. `"ts"`) to the language they belong to.
    extension_map: HashMap<String, Language>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
            extension_map: HashMap::new(),
        }
    }

    /// Creates a registry holding the Python, JavaScript and TypeScript adapters.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        crate::python::register_python_adapter(&mut registry);
        crate::typescript::register_js_ts_adapters(&mut registry);
        registry
    }

    /// Registers a language adapter, replacing any previous adapter for the
    /// same [`Language`].
    pub fn register(&mut self, adapter: Box<dyn LanguageAdapter>) {
        let lang = adapter.language();
        for ext in adapter.extensions() {
            self.extension_map.insert((*ext).to_owned(), lang);
        }
        self.adapters.insert(lang, adapter);
    }

    /// Looks up an adapter by bare file extension (without the leading dot).
    #[must_use]
    pub fn get_by_extension(&self, ext: &str) -> Option<&dyn LanguageAdapter> {
        let lang = self.extension_map.get(ext)?;
        self.adapters.get(lang).map(AsRef::as_ref)
    }

    /// Looks up an adapter by [`Language`].
    #[must_use]
    pub fn get_by_language(&self, lang: Language) -> Option<&dyn LanguageAdapter> {
        self.adapters.get(&lang).map(AsRef::as_ref)
    }

    /// Parses `source` with the adapter registered for `lang`.
    ///
    /// # Errors
    ///
    /// Returns [`LangError::NoAdapter`] when no adapter is
    /// registered, or the adapter's own parse error.
    pub fn parse(&self, lang: Language, source: &[u8]) -> LangResult<tree_sitter::Tree> {
        let adapter = self
            .get_by_language(lang)
            .ok_or(LangError::NoAdapter(lang))?;
        adapter.parse(source)
    }

    /// Returns the number of registered adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Returns `true` if no adapters are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("languages", &self.adapters.keys().collect::<Vec<_>>())
            .field("extensions", &self.extension_map.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
