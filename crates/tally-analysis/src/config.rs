//! Engine configuration.
//!
//! [`Config`] is loaded once per process and shared read-only by every scan.
//! All fields default to safe values, so an empty YAML document is a valid
//! configuration.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tally_lang::LanguageFamily;

use crate::cost;
use crate::error::ConfigError;
use crate::secrets::{default_shapes, CredentialShape};

/// Default cap on requested output tokens.
pub const DEFAULT_TOKEN_LIMIT_THRESHOLD: u64 = 2000;
/// Default largest loop bound that is not considered a cost risk.
pub const DEFAULT_LOOP_BOUND_THRESHOLD: u64 = 10;

/// Models treated as flagship tier out of the box.
const DEFAULT_EXPENSIVE_MODELS: &[&str] = &[
    "gpt-4",
    "gpt-4-turbo",
    "gpt-4-32k",
    "gpt-4o",
    "gpt-4.5-preview",
    "o1",
    "o1-preview",
    "o1-pro",
    "o3",
    "o3-pro",
    "claude-3-opus",
    "claude-opus-4",
    "claude-opus-4-1",
    "gemini-1.5-pro",
    "gemini-2.5-pro",
    "gemini-ultra",
    "mistral-large-latest",
    "command-r-plus",
    "dall-e-3",
];

// ---------------------------------------------------------------------------
// MeteringWrapper
// ---------------------------------------------------------------------------

/// Drop-in metering module for one canonical namespace.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeteringWrapper {
    /// Python module path (`tally_meter_openai`).
    pub python: Option<String>,
    /// npm package specifier (`@tally-meter/openai`).
    pub node: Option<String>,
}

impl MeteringWrapper {
    fn of(python: &str, node: &str) -> Self {
        Self {
            python: Some(python.to_string()),
            node: Some(node.to_string()),
        }
    }

    /// Wrapper module for `family`.
    #[must_use]
    pub fn for_family(&self, family: LanguageFamily) -> Option<&str> {
        match family {
            LanguageFamily::Python => self.python.as_deref(),
            LanguageFamily::Node => self.node.as_deref(),
        }
    }
}

fn default_wrappers() -> BTreeMap<String, MeteringWrapper> {
    let google = MeteringWrapper::of("tally_meter_google", "@tally-meter/google");
    BTreeMap::from([
        (
            "openai".to_string(),
            MeteringWrapper::of("tally_meter_openai", "@tally-meter/openai"),
        ),
        (
            "anthropic".to_string(),
            MeteringWrapper::of("tally_meter_anthropic", "@tally-meter/anthropic"),
        ),
        ("google.generativeai".to_string(), google.clone()),
        ("google.genai".to_string(), google),
    ])
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Process-wide engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model names considered flagship tier. Dated snapshots of a listed name
    /// (`gpt-4-0613`, `claude-3-opus-20240229`) match as well.
    pub expensive_models: BTreeSet<String>,
    /// Token limits above this value are reported as excessive.
    pub token_limit_threshold: u64,
    /// Loops with more iterations than this are considered unbounded.
    pub loop_bound_threshold: u64,
    /// Credential shapes, tried in order.
    pub credential_shape_patterns: Vec<CredentialShape>,
    /// Canonical symbol (or namespace) to its metering wrapper.
    pub known_metering_wrappers: BTreeMap<String, MeteringWrapper>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            expensive_models: DEFAULT_EXPENSIVE_MODELS.iter().map(|m| (*m).to_string()).collect(),
            token_limit_threshold: DEFAULT_TOKEN_LIMIT_THRESHOLD,
            loop_bound_threshold: DEFAULT_LOOP_BOUND_THRESHOLD,
            credential_shape_patterns: default_shapes(),
            known_metering_wrappers: default_wrappers(),
        }
    }
}

impl Config {
    /// Parses a YAML document and validates it. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed YAML and
    /// [`ConfigError::Invalid`] when a value is out of range.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks every field against its allowed domain.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::Invalid`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_limit_threshold == 0 {
            return Err(ConfigError::invalid("token_limit_threshold", "must be greater than 0"));
        }
        if self.loop_bound_threshold == 0 {
            return Err(ConfigError::invalid("loop_bound_threshold", "must be greater than 0"));
        }
        if self.expensive_models.iter().any(|m| m.trim().is_empty()) {
            return Err(ConfigError::invalid("expensive_models", "model names must not be empty"));
        }

        for (i, shape) in self.credential_shape_patterns.iter().enumerate() {
            let field = format!("credential_shape_patterns[{i}]");
            if shape.name.trim().is_empty() {
                return Err(ConfigError::invalid(format!("{field}.name"), "must not be empty"));
            }
            let has_prefix = shape.prefix.as_deref().is_some_and(|p| !p.is_empty());
            if !has_prefix && shape.min_length < 16 {
                return Err(ConfigError::invalid(
                    format!("{field}.min_length"),
                    "shapes without a prefix need min_length >= 16",
                ));
            }
            if let Some(entropy) = shape.min_entropy {
                if !entropy.is_finite() || !(0.0..=8.0).contains(&entropy) {
                    return Err(ConfigError::invalid(
                        format!("{field}.min_entropy"),
                        "must be between 0 and 8 bits per character",
                    ));
                }
            }
        }

        for (key, wrapper) in &self.known_metering_wrappers {
            let field = format!("known_metering_wrappers.{key}");
            if key.trim().is_empty() {
                return Err(ConfigError::invalid("known_metering_wrappers", "keys must not be empty"));
            }
            if wrapper.python.is_none() && wrapper.node.is_none() {
                return Err(ConfigError::invalid(field, "needs a python or node module"));
            }
            if let Some(module) = &wrapper.python {
                if !is_dotted_identifier(module) {
                    return Err(ConfigError::invalid(
                        format!("{field}.python"),
                        format!("`{module}` is not a dotted module path"),
                    ));
                }
            }
            if let Some(module) = &wrapper.node {
                if module.is_empty() || module.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
                    return Err(ConfigError::invalid(
                        format!("{field}.node"),
                        format!("`{module}` is not a package specifier"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// `true` if `model` names a configured expensive model or a dated
    /// snapshot of one.
    #[must_use]
    pub fn is_expensive_model(&self, model: &str) -> bool {
        self.expensive_models.iter().any(|expensive| cost::is_model(model, expensive))
    }

    /// The wrapper configured for `canonical`, matching the longest key that
    /// equals it or is a dotted prefix of it.
    #[must_use]
    pub fn wrapper_for(&self, canonical: &str) -> Option<(&str, &MeteringWrapper)> {
        self.known_metering_wrappers
            .iter()
            .filter(|(key, _)| {
                canonical == key.as_str()
                    || canonical
                        .strip_prefix(key.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            })
            .max_by_key(|(key, _)| key.len())
            .map(|(key, wrapper)| (key.as_str(), wrapper))
    }

    /// Keys of every wrapper whose module for `family` is `module` (or a
    /// submodule of it), in key order.
    #[must_use]
    pub fn wrapper_namespaces(&self, module: &str, family: LanguageFamily) -> Vec<&str> {
        self.known_metering_wrappers
            .iter()
            .filter(|(_, wrapper)| {
                wrapper.for_family(family).is_some_and(|w| {
                    w == module
                        || match family {
                            LanguageFamily::Python => module.starts_with(&format!("{w}.")),
                            LanguageFamily::Node => module.starts_with(&format!("{w}/")),
                        }
                })
            })
            .map(|(key, _)| key.as_str())
            .collect()
    }
}

fn is_dotted_identifier(module: &str) -> bool {
    !module.is_empty()
        && module.split('.').all(|part| {
            part.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
