//! Tally Analysis -- LLM SDK usage analysis for one source file at a time.
//!
//! The pipeline for a single file is:
//!
//! 1. [`source`] parses the text and lowers the tree into a language-neutral
//!    [`syntax::Syntax`] view.
//! 2. [`binder`] resolves import aliases and client instances against the
//!    static [`providers`] tables.
//! 3. [`detectors`] produce findings; each runs in isolation.
//! 4. [`severity`] scales and [`classify`] deduplicates and orders them.
//! 5. [`fix`] attaches safe fix proposals.
//!
//! [`scan`], [`propose_fixes`] and [`apply_fix`] are the entry points a host
//! needs. The crate never touches the filesystem.

pub mod binder;
pub mod classify;
pub mod config;
pub mod cost;
pub mod detectors;
pub mod error;
pub mod finding;
pub mod fix;
pub mod literal;
pub mod providers;
pub mod scan;
pub mod secrets;
pub mod severity;
pub mod source;
pub mod syntax;

pub use binder::{BindingKind, Bindings, ImportBinding, ResolvedSymbol};
pub use config::{Config, MeteringWrapper};
pub use detectors::{Detector, DetectorRegistry};
pub use error::{AnalysisError, AnalysisResult, ApplyError, ConfigError, ParseError};
pub use finding::{Finding, FindingBuilder, FindingCategory, LineRange, Severity, Span};
pub use fix::{apply_fixes, FixProposal};
pub use providers::Provider;
pub use scan::{apply_fix, propose_fixes, scan, scan_with, ScanResult};
pub use source::SourceUnit;
