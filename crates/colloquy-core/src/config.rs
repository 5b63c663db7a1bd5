//! Engine configuration loaded from TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::security::{ConfirmationPolicy, SecurityRisk};

/// Default iteration cap for a single `run()` call.
const DEFAULT_MAX_ITERATIONS: usize = 30;

/// Engine-wide configuration.
///
/// Every field has a default so a missing or partial config file works.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Safety valve: maximum step-loop iterations per `run()` call.
    pub max_iterations_per_run: usize,
    /// Whether the stuck detector is consulted after each step.
    pub stuck_detection: bool,
    /// Confirmation policy applied to new conversations.
    pub confirmation: ConfirmationConfig,
    /// Optional system prompt seeded into new conversations.
    pub system_prompt: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations_per_run: DEFAULT_MAX_ITERATIONS,
            stuck_detection: true,
            confirmation: ConfirmationConfig::default(),
            system_prompt: None,
        }
    }
}

/// Confirmation policy selection, kept flat for TOML ergonomics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// One of `always`, `never`, or `risky`.
    pub mode: String,
    /// Risk threshold when `mode = "risky"`.
    pub threshold: SecurityRisk,
    /// Whether unknown risk confirms when `mode = "risky"`.
    pub confirm_unknown: bool,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            mode: "never".to_owned(),
            threshold: SecurityRisk::High,
            confirm_unknown: false,
        }
    }
}

impl ConfirmationConfig {
    /// Builds the policy this configuration describes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unrecognized mode and
    /// [`Error::InvalidPolicy`] for an invalid risky threshold.
    pub fn to_policy(&self) -> Result<ConfirmationPolicy> {
        match self.mode.as_str() {
            "always" => Ok(ConfirmationPolicy::AlwaysConfirm),
            "never" => Ok(ConfirmationPolicy::NeverConfirm),
            "risky" => ConfirmationPolicy::confirm_risky(self.threshold, self.confirm_unknown),
            other => Err(Error::Config(format!(
                "unknown confirmation mode '{other}' (expected always, never, or risky)"
            ))),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Loads the user's config file, falling back to defaults.
    ///
    /// Looks for `colloquy/config.toml` under the platform config
    /// directory; a missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error only if a file exists but cannot be parsed.
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Platform path of the user's config file, if determinable.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|base| base.join("colloquy").join("config.toml"))
    }
}
