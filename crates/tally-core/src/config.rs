//! Configuration loading and merging for tally.
//!
//! Configuration is resolved from up to three YAML files layered over the
//! built-in defaults, lowest priority first:
//!
//! 1. `~/.tally/config.yaml`
//! 2. `.tally.yaml` in the project root (the scan target)
//! 3. an explicit file (`--config`)
//!
//! Layers merge per key: a mapping in a later layer only replaces the keys it
//! names, while scalars and sequences replace the earlier value wholesale.
//! The merged document is validated before any scanning begins.

use std::path::{Path, PathBuf};

use ignore::overrides::OverrideBuilder;
use serde::{Deserialize, Serialize};
use serde_yml::Value;
use tracing::{debug, info};

use tally_analysis::{Config, ConfigError};
use tally_lang::Language;

use crate::{CoreError, CoreResult};

/// File name of the project-level configuration.
pub const PROJECT_CONFIG_FILE: &str = ".tally.yaml";

/// Default assumed monthly token volume for cost estimates.
pub const DEFAULT_MONTHLY_TOKENS: u64 = tally_analysis::cost::DEFAULT_MONTHLY_TOKENS;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Complete tally configuration: host settings plus the engine [`Config`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    /// File discovery and per-file budgets.
    pub scan: ScanSettings,
    /// Detector thresholds, credential shapes and metering wrappers.
    pub analysis: Config,
    /// Report settings.
    pub reporting: ReportingSettings,
}

// ---------------------------------------------------------------------------
// ScanSettings
// ---------------------------------------------------------------------------

/// Scan-specific configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Languages to scan. Empty means all supported languages.
    pub languages: Vec<Language>,
    /// Glob patterns for files/directories to exclude.
    pub exclude_patterns: Vec<String>,
    /// Whether to follow symlinks during discovery.
    pub follow_symlinks: bool,
    /// Maximum file size in KiB. Larger files are skipped.
    pub max_file_size_kb: u64,
    /// Per-file analysis budget in milliseconds. `None` disables the budget.
    pub timeout_ms: Option<u64>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            languages: Vec::new(),
            exclude_patterns: vec![
                "**/*.min.js".into(),
                "**/*.bundle.js".into(),
                "**/*.chunk.js".into(),
                "**/node_modules/**".into(),
                "**/vendor/**".into(),
                "**/venv/**".into(),
                "**/.venv/**".into(),
                "**/__pycache__/**".into(),
                "**/.tox/**".into(),
                "**/site-packages/**".into(),
                "**/dist/**".into(),
            ],
            follow_symlinks: true,
            max_file_size_kb: 1024,
            timeout_ms: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ReportingSettings
// ---------------------------------------------------------------------------

/// Reporting settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingSettings {
    /// Default output format (`json` or `text`).
    pub default_format: String,
    /// Monthly token volume assumed per provider when estimating spend.
    pub monthly_tokens: u64,
}

impl Default for ReportingSettings {
    fn default() -> Self {
        Self {
            default_format: "json".to_string(),
            monthly_tokens: DEFAULT_MONTHLY_TOKENS,
        }
    }
}

const FORMATS: &[&str] = &["json", "text"];

impl TallyConfig {
    /// Checks host settings and the engine configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::Invalid`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.max_file_size_kb == 0 {
            return Err(invalid("scan.max_file_size_kb", "must be greater than 0"));
        }
        if self.scan.timeout_ms == Some(0) {
            return Err(invalid("scan.timeout_ms", "must be greater than 0; omit it to disable"));
        }
        let mut overrides = OverrideBuilder::new("/");
        for (i, pattern) in self.scan.exclude_patterns.iter().enumerate() {
            if let Err(e) = overrides.add(&format!("!{pattern}")) {
                return Err(invalid(format!("scan.exclude_patterns[{i}]"), e.to_string()));
            }
        }
        if !FORMATS.contains(&self.reporting.default_format.as_str()) {
            return Err(invalid(
                "reporting.default_format",
                format!("expected one of {}", FORMATS.join(", ")),
            ));
        }
        self.analysis.validate().map_err(|err| match err {
            ConfigError::Invalid { field, reason } => ConfigError::Invalid {
                field: format!("analysis.{field}"),
                reason,
            },
            other => other,
        })
    }

    /// Serializes the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if serialization fails.
    pub fn to_yaml(&self) -> CoreResult<String> {
        serde_yml::to_string(self).map_err(|e| CoreError::Config(format!("failed to serialize configuration: {e}")))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// The configuration files considered for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSources {
    /// User-level file; skipped when absent.
    pub home: Option<PathBuf>,
    /// Project-level file; skipped when absent.
    pub project: Option<PathBuf>,
    /// Explicitly requested file; must exist.
    pub explicit: Option<PathBuf>,
}

impl ConfigSources {
    /// The standard sources for a scan of `root`.
    #[must_use]
    pub fn discover(root: Option<&Path>, explicit: Option<&Path>) -> Self {
        Self {
            home: home_dir().map(|home| home.join(".tally").join("config.yaml")),
            project: root.map(project_config_path),
            explicit: explicit.map(Path::to_path_buf),
        }
    }

    /// Loads, merges and validates every present layer.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if a file is unreadable or malformed (or
    /// the explicit file does not exist), and [`CoreError::InvalidConfig`] if
    /// the merged result fails validation.
    pub fn load(&self) -> CoreResult<TallyConfig> {
        let mut merged = serde_yml::to_value(TallyConfig::default())
            .map_err(|e| CoreError::Config(format!("failed to encode defaults: {e}")))?;

        let optional = [("home", self.home.as_deref()), ("project", self.project.as_deref())];
        for (layer, path) in optional {
            if let Some(path) = path.filter(|p| p.is_file()) {
                debug!(layer, path = %path.display(), "loading config layer");
                merge_value(&mut merged, read_layer(path)?);
            }
        }
        if let Some(path) = &self.explicit {
            if !path.is_file() {
                return Err(CoreError::Config(format!("config file '{}' does not exist", path.display())));
            }
            debug!(layer = "explicit", path = %path.display(), "loading config layer");
            merge_value(&mut merged, read_layer(path)?);
        }

        let config: TallyConfig =
            serde_yml::from_value(merged).map_err(|e| CoreError::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        info!("configuration loaded");
        Ok(config)
    }
}

/// Loads the configuration for a scan of `root`. See [`ConfigSources`].
///
/// # Errors
///
/// See [`ConfigSources::load`].
pub fn load_config(root: Option<&Path>, explicit: Option<&Path>) -> CoreResult<TallyConfig> {
    ConfigSources::discover(root, explicit).load()
}

/// Writes the default configuration to `<dir>/.tally.yaml`.
///
/// # Errors
///
/// Returns [`CoreError::Config`] if the file already exists and
/// [`CoreError::Io`] if it cannot be written.
pub fn init_config(dir: &Path) -> CoreResult<PathBuf> {
    let path = dir.join(PROJECT_CONFIG_FILE);
    if path.exists() {
        return Err(CoreError::Config(format!("'{}' already exists", path.display())));
    }
    std::fs::write(&path, TallyConfig::default().to_yaml()?)?;
    info!(path = %path.display(), "wrote default configuration");
    Ok(path)
}

/// `.tally.yaml` next to `root`, or in it when `root` is a directory.
fn project_config_path(root: &Path) -> PathBuf {
    if root.is_file() {
        root.parent().unwrap_or(Path::new(".")).join(PROJECT_CONFIG_FILE)
    } else {
        root.join(PROJECT_CONFIG_FILE)
    }
}

fn read_layer(path: &Path) -> CoreResult<Value> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CoreError::Config(format!("failed to read config file '{}': {e}", path.display())))?;
    if content.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_yml::from_str(&content)
        .map_err(|e| CoreError::Config(format!("failed to parse config file '{}': {e}", path.display())))
}

/// Merges `overlay` into `base` key by key.
fn merge_value(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_value(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Get the user home directory.
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
