//! Project scan orchestrator.
//!
//! The [`ScanEngine`] coordinates a project scan:
//!
//! 1. **Discover** source files under the target (see [`crate::scanner`]).
//! 2. **Scan** each file with the single-file engine, in parallel on the
//!    rayon pool, optionally under a per-file time budget.
//! 3. **Collect** per-file results in path order into a [`ProjectScan`].
//!
//! Files are independent: the engine shares only the read-only configuration
//! and detector registry between them.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use tally_core::{ScanEngine, TallyConfig};
//!
//! let engine = ScanEngine::new(TallyConfig::default());
//! let project = engine.scan(Path::new("src/")).unwrap();
//! println!("{} findings in {} files", project.finding_count(), project.files_scanned);
//! ```

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use tally_analysis::{
    apply_fixes, propose_fixes, scan_with, DetectorRegistry, Finding, FindingBuilder, FindingCategory, FixProposal,
    LineRange, ScanResult, Severity, Span,
};
use tally_lang::Language;

use crate::config::TallyConfig;
use crate::scanner::{discover_files, DiscoveredFile};
use crate::{CoreError, CoreResult};

// ---------------------------------------------------------------------------
// ProjectScan
// ---------------------------------------------------------------------------

/// The result of scanning every file under a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectScan {
    /// Target as given to the scan.
    pub root: String,
    /// Per-file results, sorted by relative path.
    pub files: Vec<ScanResult>,
    /// Files read and analyzed.
    pub files_scanned: u64,
    /// Candidate files that were skipped (binary, too large, unreadable).
    pub files_skipped: u64,
    /// Languages of the scanned files.
    pub languages: Vec<Language>,
    /// Wall-clock duration of the scan.
    pub duration_ms: u64,
}

impl ProjectScan {
    /// Every finding, file by file.
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.files.iter().flat_map(|f| f.findings.iter())
    }

    /// Number of findings across all files.
    #[must_use]
    pub fn finding_count(&self) -> usize {
        self.files.iter().map(|f| f.findings.len()).sum()
    }

    /// Most severe finding of the scan, if any.
    #[must_use]
    pub fn max_severity(&self) -> Option<Severity> {
        self.findings().map(|f| f.severity).reduce(Severity::max_with)
    }

    /// `true` when any finding is at least `threshold`.
    #[must_use]
    pub fn has_findings_at_or_above(&self, threshold: Severity) -> bool {
        self.findings().any(|f| f.severity.at_least(threshold))
    }

    /// Keeps only findings whose category is in `categories`.
    pub fn retain_categories(&mut self, categories: &[FindingCategory]) {
        for file in &mut self.files {
            file.findings.retain(|f| categories.contains(&f.category));
        }
    }
}

// ---------------------------------------------------------------------------
// FileFix
// ---------------------------------------------------------------------------

/// Safe fixes computed for one file against its current contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFix {
    /// The file the fixes belong to.
    pub file: DiscoveredFile,
    /// Applied proposals, in text order.
    pub proposals: Vec<FixProposal>,
    /// File contents with every proposal applied.
    pub fixed_text: String,
}

// ---------------------------------------------------------------------------
// ScanEngine
// ---------------------------------------------------------------------------

/// The project scan orchestrator.
pub struct ScanEngine {
    config: Arc<TallyConfig>,
    registry: Arc<DetectorRegistry>,
}

impl ScanEngine {
    /// Creates an engine running the built-in detectors.
    #[must_use]
    pub fn new(config: TallyConfig) -> Self {
        Self::with_registry(config, DetectorRegistry::with_defaults())
    }

    /// Creates an engine running the detectors of `registry`.
    #[must_use]
    pub fn with_registry(config: TallyConfig, registry: DetectorRegistry) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
        }
    }

    /// The configuration every scan runs with.
    #[must_use]
    pub fn config(&self) -> &TallyConfig {
        &self.config
    }

    /// Discovers and scans every source file under `target`.
    ///
    /// Files that cannot be read are logged at WARN level and counted as
    /// skipped. Parse failures and expired budgets are reported as engine
    /// notices in the file's result rather than aborting the scan.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError`] if file discovery itself fails (e.g. the target
    /// does not exist).
    pub fn scan(&self, target: &Path) -> CoreResult<ProjectScan> {
        let started = Instant::now();
        let discovery = discover_files(target, &self.config.scan)?;

        let outcomes: Vec<Option<ScanResult>> = discovery
            .files
            .par_iter()
            .map(|file| match self.scan_file(file) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(path = %file.path.display(), error = %e, "failed to read file; skipping");
                    None
                }
            })
            .collect();

        let unreadable = outcomes.iter().filter(|o| o.is_none()).count() as u64;
        let files: Vec<ScanResult> = outcomes.into_iter().flatten().collect();
        let languages: BTreeSet<Language> = discovery
            .files
            .iter()
            .filter(|f| files.iter().any(|r| r.file_path == f.relative_path))
            .map(|f| f.language)
            .collect();

        let project = ProjectScan {
            root: target.display().to_string(),
            files_scanned: files.len() as u64,
            files_skipped: discovery.stats.skipped() + unreadable,
            files,
            languages: languages.into_iter().collect(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        info!(
            findings = project.finding_count(),
            files_scanned = project.files_scanned,
            files_skipped = project.files_skipped,
            duration_ms = project.duration_ms,
            "scan complete"
        );
        Ok(project)
    }

    /// Reads and scans one discovered file.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be read as UTF-8 text.
    pub fn scan_file(&self, file: &DiscoveredFile) -> std::io::Result<ScanResult> {
        let text = std::fs::read_to_string(&file.path)?;
        Ok(self.scan_text(text, &file.relative_path))
    }

    /// Scans `text` as the file at `path`, honouring the configured budget.
    #[must_use]
    pub fn scan_text(&self, text: String, path: &str) -> ScanResult {
        match self.config.scan.timeout_ms {
            Some(ms) => self.scan_budgeted(Arc::from(text), path, Duration::from_millis(ms)),
            None => self.scan_inline(&text, path),
        }
    }

    fn scan_inline(&self, text: &str, path: &str) -> ScanResult {
        panic::catch_unwind(AssertUnwindSafe(|| {
            scan_with(&self.registry, text, path, &self.config.analysis)
        }))
        .unwrap_or_else(|_| aborted(path))
    }

    /// Runs the scan on a worker thread and abandons it when `budget`
    /// expires; the worker's eventual result is dropped.
    fn scan_budgeted(&self, text: Arc<str>, path: &str, budget: Duration) -> ScanResult {
        let (tx, rx) = mpsc::channel();
        let worker = {
            let text = Arc::clone(&text);
            let config = Arc::clone(&self.config);
            let registry = Arc::clone(&self.registry);
            let path = path.to_string();
            thread::Builder::new().name("tally-scan".to_string()).spawn(move || {
                let result = scan_with(&registry, &text, &path, &config.analysis);
                // The receiver is gone once the budget expired.
                let _ = tx.send(result);
            })
        };
        if let Err(e) = worker {
            warn!(path, error = %e, "cannot spawn scan worker; scanning inline");
            return self.scan_inline(&text, path);
        }

        match rx.recv_timeout(budget) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(path, budget_ms = budget.as_millis(), "scan budget expired; result discarded");
                notice(
                    path,
                    FindingCategory::ScanTimeout,
                    format!("analysis exceeded the {} ms budget and was abandoned", budget.as_millis()),
                )
            }
            Err(RecvTimeoutError::Disconnected) => aborted(path),
        }
    }

    // -----------------------------------------------------------------------
    // Fixes
    // -----------------------------------------------------------------------

    /// Computes the safe fixes for every file under `target`. Nothing is
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError`] if discovery fails or a file's fixes conflict.
    pub fn plan_fixes(&self, target: &Path) -> CoreResult<Vec<FileFix>> {
        let discovery = discover_files(target, &self.config.scan)?;
        let plans: Vec<CoreResult<Option<FileFix>>> =
            discovery.files.par_iter().map(|file| self.fix_file(file)).collect();
        plans.into_iter().filter_map(Result::transpose).collect()
    }

    /// Re-reads `file`, re-scans it and applies its safe fixes in memory.
    ///
    /// Scanning the current contents immediately before applying keeps the
    /// proposals from going stale between a report and a fix run.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Io`] if the file cannot be read and
    /// [`CoreError::Fix`] if the proposals cannot be applied.
    pub fn fix_file(&self, file: &DiscoveredFile) -> CoreResult<Option<FileFix>> {
        let text = std::fs::read_to_string(&file.path)?;
        let result = self.scan_text(text.clone(), &file.relative_path);
        let proposals = propose_fixes(&result);
        if proposals.is_empty() {
            return Ok(None);
        }

        let fixed_text = apply_fixes(&text, &proposals).map_err(|source| CoreError::Fix {
            path: file.path.clone(),
            source,
        })?;
        debug!(path = %file.relative_path, fixes = proposals.len(), "planned fixes");
        Ok(Some(FileFix {
            file: file.clone(),
            proposals,
            fixed_text,
        }))
    }
}

impl Default for ScanEngine {
    fn default() -> Self {
        Self::new(TallyConfig::default())
    }
}

impl std::fmt::Debug for ScanEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanEngine")
            .field("detectors", &self.registry.ids())
            .field("timeout_ms", &self.config.scan.timeout_ms)
            .finish_non_exhaustive()
    }
}

fn aborted(path: &str) -> ScanResult {
    error!(path, "analysis aborted unexpectedly");
    notice(path, FindingCategory::DetectorFault, "analysis of this file aborted unexpectedly")
}

/// A result holding a single file-level engine notice.
fn notice(path: &str, category: FindingCategory, message: impl Into<String>) -> ScanResult {
    let finding = LineRange::new(1, 1, 1, 1).and_then(|line_range| {
        FindingBuilder::new()
            .category(category)
            .file_path(path)
            .span(Span::new(0, 0))
            .line_range(line_range)
            .snippet("")
            .message(message)
            .build()
    });
    let findings = match finding {
        Ok(finding) => vec![finding],
        Err(e) => {
            error!(path, error = %e, "cannot build engine notice");
            Vec::new()
        }
    };
    ScanResult {
        file_path: path.to_string(),
        findings,
        parse_ok: true,
        providers: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tally_analysis::{Bindings, Config, Detector, SourceUnit};

    const KEY: &str = "sk-test123456789012345678901234567890";

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    struct Sleepy;

    impl Detector for Sleepy {
        fn id(&self) -> &'static str {
            "sleepy"
        }

        fn detect(&self, _: &SourceUnit, _: &Bindings, _: &Config) -> Vec<Finding> {
            thread::sleep(Duration::from_millis(500));
            Vec::new()
        }
    }

    #[test]
    fn scan_empty_directory_returns_empty_result() {
        let tmp = tempfile::tempdir().unwrap();
        let project = ScanEngine::default().scan(tmp.path()).unwrap();

        assert!(project.files.is_empty());
        assert_eq!(project.files_scanned, 0);
        assert_eq!(project.files_skipped, 0);
        assert!(project.languages.is_empty());
        assert_eq!(project.max_severity(), None);
    }

    #[test]
    fn scan_nonexistent_directory_returns_error() {
        let result = ScanEngine::default().scan(Path::new("/nonexistent/unlikely/path"));
        assert!(result.is_err());
    }

    #[test]
    fn scan_collects_results_in_path_order() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "b/agent.py", &format!("from openai import OpenAI\nc = OpenAI(api_key='{KEY}')\n"));
        write(tmp.path(), "a/plain.ts", "export const x = 1;\n");

        let project = ScanEngine::default().scan(tmp.path()).unwrap();

        let paths: Vec<&str> = project.files.iter().map(|f| f.file_path.as_str()).collect();
        assert_eq!(paths, vec!["a/plain.ts", "b/agent.py"]);
        assert_eq!(project.files_scanned, 2);
        assert_eq!(project.languages, vec![Language::Python, Language::TypeScript]);
        assert_eq!(project.max_severity(), Some(Severity::Critical));
        assert!(project.has_findings_at_or_above(Severity::High));
        assert!(project.files[0].findings.is_empty());
    }

    #[test]
    fn binary_and_unreadable_files_count_as_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "ok.py", "x = 1\n");
        fs::write(tmp.path().join("blob.py"), b"\0\0\0").unwrap();
        fs::write(tmp.path().join("latin1.py"), b"name = '\xe9'\n").unwrap();

        let project = ScanEngine::default().scan(tmp.path()).unwrap();
        assert_eq!(project.files_scanned, 1);
        assert_eq!(project.files_skipped, 2);
    }

    #[test]
    fn retain_categories_filters_findings() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "agent.py", &format!("from openai import OpenAI\nc = OpenAI(api_key='{KEY}')\n"));

        let mut project = ScanEngine::default().scan(tmp.path()).unwrap();
        assert!(project.findings().any(|f| f.category == FindingCategory::MissingUsageTracking));
        project.retain_categories(&[FindingCategory::HardcodedCredential]);
        assert!(project.findings().all(|f| f.category == FindingCategory::HardcodedCredential));
        assert_eq!(project.finding_count(), 1);
    }

    #[test]
    fn expired_budget_yields_timeout_notice() {
        let mut config = TallyConfig::default();
        config.scan.timeout_ms = Some(20);
        let mut registry = DetectorRegistry::with_defaults();
        registry.register(Box::new(Sleepy));
        let engine = ScanEngine::with_registry(config, registry);

        let result = engine.scan_text(format!("c = OpenAI(api_key='{KEY}')\n"), "slow.py");
        assert_eq!(result.findings.len(), 1, "partial results are discarded");
        assert_eq!(result.findings[0].category, FindingCategory::ScanTimeout);
        assert_eq!(result.findings[0].severity, Severity::Info);
    }

    #[test]
    fn generous_budget_keeps_the_result() {
        let mut config = TallyConfig::default();
        config.scan.timeout_ms = Some(30_000);
        let engine = ScanEngine::new(config);

        let result = engine.scan_text(format!("c = OpenAI(api_key='{KEY}')\n"), "fast.py");
        assert!(result
            .findings
            .iter()
            .any(|f| f.category == FindingCategory::HardcodedCredential));
    }

    #[test]
    fn fix_file_applies_every_safe_proposal() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "agent.py",
            &format!("import os\nfrom openai import OpenAI\nc = OpenAI(api_key='{KEY}')\n"),
        );
        let discovery = discover_files(tmp.path(), &TallyConfig::default().scan).unwrap();
        let engine = ScanEngine::default();

        let fix = engine.fix_file(&discovery.files[0]).unwrap().unwrap();
        assert_eq!(fix.proposals.len(), 2);
        assert_eq!(
            fix.fixed_text,
            "import os\nfrom tally_meter_openai import OpenAI\nc = OpenAI(api_key=os.getenv('OPENAI_API_KEY'))\n"
        );
        assert!(
            engine.scan_text(fix.fixed_text.clone(), "agent.py").findings.is_empty(),
            "nothing left to report"
        );
    }

    #[test]
    fn plan_fixes_skips_clean_files() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "clean.py", "print('hi')\n");
        write(tmp.path(), "metered.py", "from openai import OpenAI\nc = OpenAI()\n");

        let plans = ScanEngine::default().plan_fixes(tmp.path()).unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].file.relative_path, "metered.py");
        assert!(plans[0].fixed_text.starts_with("from tally_meter_openai import OpenAI"));
    }
}
