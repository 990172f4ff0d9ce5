//! File discovery for the tally scanner.
//!
//! This module implements directory walking with:
//!
//! - `.gitignore` and `.tallyignore` respect (via the `ignore` crate)
//! - configured exclude globs
//! - Language detection by file extension
//! - Size limits and binary file skipping (via content sniffing)
//!
//! A scan target may also be a single file.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;
use tracing::{debug, info, warn};

use tally_lang::Language;

use crate::config::ScanSettings;
use crate::{CoreError, CoreResult};

/// Ignore file read in every directory, gitignore syntax.
pub const IGNORE_FILE: &str = ".tallyignore";

/// Bytes sniffed for NUL when detecting binary files.
const SNIFF_BYTES: usize = 8192;

// ---------------------------------------------------------------------------
// DiscoveredFile
// ---------------------------------------------------------------------------

/// A source file discovered during directory walking.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DiscoveredFile {
    /// Path relative to the scan root (normalized with forward slashes, no leading `./`).
    pub relative_path: String,
    /// Path to read the file from.
    pub path: PathBuf,
    /// Detected programming language based on file extension.
    pub language: Language,
}

// ---------------------------------------------------------------------------
// DiscoveryStats
// ---------------------------------------------------------------------------

/// Statistics collected during file discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    /// Files examined, before filtering.
    pub total_entries: u64,
    /// Files accepted for scanning.
    pub accepted: u64,
    /// Files with an unsupported extension or a filtered-out language.
    pub skipped_unsupported: u64,
    /// Files that look binary.
    pub skipped_binary: u64,
    /// Files above the configured size limit.
    pub skipped_too_large: u64,
    /// Entries that could not be walked or inspected.
    pub skipped_errors: u64,
}

impl DiscoveryStats {
    /// Candidate source files that were not scanned.
    #[must_use]
    pub const fn skipped(&self) -> u64 {
        self.skipped_binary + self.skipped_too_large + self.skipped_errors
    }
}

// ---------------------------------------------------------------------------
// DiscoveryResult
// ---------------------------------------------------------------------------

/// The result of file discovery: discovered files and statistics.
#[derive(Debug, Clone)]
pub struct DiscoveryResult {
    /// Discovered source files, sorted by relative path.
    pub files: Vec<DiscoveredFile>,
    /// Discovery statistics.
    pub stats: DiscoveryStats,
    /// Set of languages detected across all discovered files.
    pub languages_detected: BTreeSet<Language>,
}

// ---------------------------------------------------------------------------
// discover_files
// ---------------------------------------------------------------------------

/// Collect the source files under `root` that should be scanned.
///
/// - Respects `.gitignore` (inside or outside a git repository) and
///   [`IGNORE_FILE`] files found in the directory tree.
/// - Skips paths matching `settings.exclude_patterns`.
/// - Hidden files and directories are skipped.
/// - Files with unrecognized extensions, outside `settings.languages`, larger
///   than `settings.max_file_size_kb` or containing NUL bytes in their first
///   8 KiB are skipped and counted.
///
/// When `root` is a file it is the only candidate and is not subject to
/// ignore files.
///
/// # Errors
///
/// Returns [`CoreError::Io`] if `root` does not exist or is not readable and
/// [`CoreError::Config`] if an exclude pattern is not a valid glob.
pub fn discover_files(root: &Path, settings: &ScanSettings) -> CoreResult<DiscoveryResult> {
    let root = root.canonicalize().map_err(|e| {
        CoreError::Io(std::io::Error::new(
            e.kind(),
            format!("cannot access scan target '{}': {e}", root.display()),
        ))
    })?;

    let mut stats = DiscoveryStats::default();
    let mut files = Vec::new();

    if root.is_file() {
        let relative_path = root
            .file_name()
            .map_or_else(|| root.to_string_lossy().into_owned(), |n| n.to_string_lossy().into_owned());
        if let Some(file) = accept(&root, relative_path, settings, &mut stats) {
            files.push(file);
        }
    } else {
        let mut walker = WalkBuilder::new(&root);
        walker
            .follow_links(settings.follow_symlinks)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .require_git(false)
            .add_custom_ignore_filename(IGNORE_FILE)
            .hidden(true)
            .overrides(exclusions(&root, &settings.exclude_patterns)?)
            .sort_by_file_path(|a, b| a.cmp(b));

        for entry_result in walker.build() {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    warn!(error = %err, "error walking directory entry");
                    stats.skipped_errors += 1;
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let path = entry.path();
            let relative_path = path
                .strip_prefix(&root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            if let Some(file) = accept(path, relative_path, settings, &mut stats) {
                files.push(file);
            }
        }
    }

    files.sort();
    let languages_detected = files.iter().map(|f| f.language).collect();
    stats.accepted = files.len() as u64;

    info!(
        accepted = stats.accepted,
        skipped_unsupported = stats.skipped_unsupported,
        skipped_binary = stats.skipped_binary,
        skipped_too_large = stats.skipped_too_large,
        skipped_errors = stats.skipped_errors,
        languages = ?languages_detected,
        "file discovery complete"
    );

    Ok(DiscoveryResult {
        files,
        stats,
        languages_detected,
    })
}

fn exclusions(root: &Path, patterns: &[String]) -> CoreResult<Override> {
    let mut builder = OverrideBuilder::new(root);
    for pattern in patterns {
        builder
            .add(&format!("!{pattern}"))
            .map_err(|e| CoreError::Config(format!("invalid exclude pattern '{pattern}': {e}")))?;
    }
    builder
        .build()
        .map_err(|e| CoreError::Config(format!("invalid exclude patterns: {e}")))
}

/// Applies the per-file filters, counting rejections in `stats`.
fn accept(path: &Path, relative_path: String, settings: &ScanSettings, stats: &mut DiscoveryStats) -> Option<DiscoveredFile> {
    stats.total_entries += 1;

    let Some(language) = Language::from_path(path) else {
        debug!(path = %path.display(), "skipping unsupported file");
        stats.skipped_unsupported += 1;
        return None;
    };
    if !settings.languages.is_empty() && !settings.languages.contains(&language) {
        debug!(path = %path.display(), %language, "skipping filtered language");
        stats.skipped_unsupported += 1;
        return None;
    }

    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot inspect file; skipping");
            stats.skipped_errors += 1;
            return None;
        }
    };
    if size > settings.max_file_size_kb.saturating_mul(1024) {
        debug!(path = %path.display(), size, "skipping file above size limit");
        stats.skipped_too_large += 1;
        return None;
    }

    if is_binary(path) {
        debug!(path = %path.display(), "skipping binary file");
        stats.skipped_binary += 1;
        return None;
    }

    Some(DiscoveredFile {
        relative_path,
        path: path.to_path_buf(),
        language,
    })
}

// ---------------------------------------------------------------------------
// Binary detection
// ---------------------------------------------------------------------------

/// `true` if the first 8 KiB of the file contain a NUL byte. Unreadable files
/// are treated as text; the error surfaces when the engine reads them.
fn is_binary(path: &Path) -> bool {
    let Ok(mut file) = std::fs::File::open(path) else {
        return false;
    };
    let mut buffer = [0u8; SNIFF_BYTES];
    match file.read(&mut buffer) {
        Ok(n) => buffer[..n].contains(&0),
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
