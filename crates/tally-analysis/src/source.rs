//! Parsed source units.
//!
//! A [`SourceUnit`] owns the text of one file together with its lowered
//! [`Syntax`] view and a line index for span-to-line conversion. It is built
//! once per scan and never mutated afterwards.

use std::sync::OnceLock;

use tally_lang::{AdapterRegistry, Language, LanguageFamily};
use tracing::debug;

use crate::error::ParseError;
use crate::finding::{LineRange, Span};
use crate::syntax::Syntax;

fn registry() -> &'static AdapterRegistry {
    static REGISTRY: OnceLock<AdapterRegistry> = OnceLock::new();
    REGISTRY.get_or_init(AdapterRegistry::with_defaults)
}

/// One scanned file.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    path: String,
    text: String,
    language: Language,
    syntax: Syntax,
    line_starts: Vec<usize>,
}

impl SourceUnit {
    /// Parses `text`, detecting the language from the extension of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] when the extension is not supported, the text
    /// contains a NUL byte, or the grammar produces no tree.
    pub fn parse(text: &str, path: &str) -> Result<Self, ParseError> {
        let language = Language::from_path(std::path::Path::new(path))
            .ok_or_else(|| ParseError::new(0, format!("unsupported file type: {path}")))?;
        Self::parse_as(text, path, language)
    }

    /// Parses `text` as `language`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] when the text contains a NUL byte or the
    /// grammar produces no tree.
    pub fn parse_as(text: &str, path: &str, language: Language) -> Result<Self, ParseError> {
        if let Some(offset) = text.bytes().position(|b| b == 0) {
            return Err(ParseError::new(offset, "NUL byte in source text"));
        }
        let tree = registry().parse(language, text.as_bytes())?;
        let syntax = Syntax::lower(language, &tree, text);
        debug!(
            path,
            %language,
            imports = syntax.imports.len(),
            calls = syntax.calls.len(),
            error_regions = syntax.error_regions.len(),
            "lowered source unit"
        );
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Ok(Self {
            path: path.to_string(),
            text: text.to_string(),
            language,
            syntax,
            line_starts,
        })
    }

    /// File path as given to the scan.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Full source text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Detected language.
    #[must_use]
    pub fn language(&self) -> Language {
        self.language
    }

    /// Language family (`Python` or `Node`).
    #[must_use]
    pub fn family(&self) -> LanguageFamily {
        self.language.family()
    }

    /// Lowered structural view.
    #[must_use]
    pub fn syntax(&self) -> &Syntax {
        &self.syntax
    }

    /// Text covered by `span`, empty when the span is out of range.
    #[must_use]
    pub fn slice(&self, span: Span) -> &str {
        self.text.get(span.start..span.end).unwrap_or("")
    }

    /// Zero-based line index containing `offset`.
    #[must_use]
    pub fn line_index(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next.saturating_sub(1),
        }
    }

    /// Byte range of the line with zero-based `index`, excluding the newline.
    #[must_use]
    pub fn line_span(&self, index: usize) -> Span {
        let start = self.line_starts.get(index).copied().unwrap_or(self.text.len());
        let end = self
            .line_starts
            .get(index + 1)
            .map_or(self.text.len(), |next| next.saturating_sub(1));
        let end = if self.text.get(..end).is_some_and(|t| t.ends_with('\r')) {
            end - 1
        } else {
            end
        };
        Span::new(start, end.max(start))
    }

    /// 1-indexed line/column range of `span`.
    #[must_use]
    pub fn line_range(&self, span: Span) -> LineRange {
        let start_line = self.line_index(span.start);
        let end_line = self.line_index(span.end);
        let col = |line: usize, offset: usize| {
            offset.saturating_sub(self.line_starts.get(line).copied().unwrap_or(0)) + 1
        };
        LineRange {
            start_line: to_u32(start_line + 1),
            start_col: to_u32(col(start_line, span.start)),
            end_line: to_u32(end_line + 1),
            end_col: to_u32(col(end_line, span.end)),
        }
    }

    /// The full lines touched by `span`.
    #[must_use]
    pub fn snippet(&self, span: Span) -> String {
        let first = self.line_span(self.line_index(span.start));
        let last = self.line_span(self.line_index(span.end));
        self.slice(Span::new(first.start, last.end)).to_string()
    }
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
