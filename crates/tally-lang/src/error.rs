//! Errors raised by the tree-sitter adapters.

use crate::language::Language;

/// Adapter failures. Each one leaves the file without a tree.
#[derive(Debug, thiserror::Error)]
pub enum LangError {
    /// The parser returned without a tree.
    #[error("{language} parser produced no tree")]
    NoTree {
        /// Grammar that was running.
        language: &'static str,
    },

    /// The linked grammar does not match the tree-sitter runtime ABI.
    #[error("incompatible {language} grammar: {source}")]
    Grammar {
        /// Grammar that was rejected.
        language: &'static str,
        /// Runtime's reason.
        #[source]
        source: tree_sitter::LanguageError,
    },

    /// Nothing is registered for the language.
    #[error("no parser registered for {0}")]
    NoAdapter(Language),
}

/// Convenience alias for `Result<T, LangError>`.
pub type LangResult<T> = Result<T, LangError>;
