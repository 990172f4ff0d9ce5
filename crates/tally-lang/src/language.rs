//! Supported source languages.
//!
//! Tally only reads languages that have first-party LLM SDKs in wide use:
//! Python and the Node family (JavaScript and TypeScript). The Node languages
//! share one import model, so most of the analysis treats them as a single
//! [`LanguageFamily`].

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Source languages understood by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Python (`.py`, `.pyi`).
    Python,
    /// JavaScript (`.js`, `.jsx`, `.mjs`, `.cjs`).
    JavaScript,
    /// TypeScript (`.ts`, `.tsx`, `.mts`, `.cts`).
    TypeScript,
}

/// Import/module model shared by a group of languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageFamily {
    /// Python modules and `import`/`from ... import` statements.
    Python,
    /// npm packages, ES module imports and CommonJS `require`.
    Node,
}

impl Language {
    /// Returns the file extensions associated with this language.
    ///
    /// Extensions include the leading dot (e.g. `".ts"`).
    #[must_use]
    pub const fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Python => &[".py", ".pyi"],
            Self::JavaScript => &[".js", ".jsx", ".mjs", ".cjs"],
            Self::TypeScript => &[".ts", ".tsx", ".mts", ".cts"],
        }
    }

    /// Returns all supported language variants.
    #[must_use]
    pub const fn all() -> &'static [Language] {
        &[Self::Python, Self::JavaScript, Self::TypeScript]
    }

    /// Returns the import model this language follows.
    #[must_use]
    pub const fn family(self) -> LanguageFamily {
        match self {
            Self::Python => LanguageFamily::Python,
            Self::JavaScript | Self::TypeScript => LanguageFamily::Node,
        }
    }

    /// Attempts to determine the language from a file extension (including the dot).
    ///
    /// Returns `None` if the extension is not recognized.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            ".py" | ".pyi" => Some(Self::Python),
            ".js" | ".jsx" | ".mjs" | ".cjs" => Some(Self::JavaScript),
            ".ts" | ".tsx" | ".mts" | ".cts" => Some(Self::TypeScript),
            _ => None,
        }
    }

    /// Determines the language of `path` from its extension.
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?;
        Self::from_extension(&format!(".{}", ext.to_ascii_lowercase()))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Python => "Python",
            Self::JavaScript => "JavaScript",
            Self::TypeScript => "TypeScript",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
