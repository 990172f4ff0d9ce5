//! Tally Lang -- language detection and tree-sitter integration.
//!
//! This crate provides:
//!
//! - [`Language`] -- the languages whose LLM SDK usage tally understands.
//! - [`LanguageAdapter`] -- a trait for tree-sitter language backends.
//! - [`AdapterRegistry`] -- a collection of adapters with lookup by extension or language.
//! - Concrete adapters for Python, JavaScript/JSX and TypeScript/TSX.

pub mod adapter;
pub mod error;
pub mod language;
pub mod python;
pub mod typescript;

pub use adapter::{AdapterRegistry, LanguageAdapter};
pub use error::{LangError, LangResult};
pub use language::{Language, LanguageFamily};
pub use python::{PythonAdapter, register_python_adapter};
pub use typescript::{JavaScriptAdapter, TypeScriptAdapter, register_js_ts_adapters};
