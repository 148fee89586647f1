//! Configuration management for pagechat.
//!
//! Loads configuration from ${PAGECHAT_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::extract::{DEFAULT_NODE_BUDGET, ExtractOptions, MAX_TEXT_CHARS};
use crate::markdown::RenderMode;

/// Returns the default config template with comments.
///
/// Embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for pagechat configuration and data directories.
    //!
    //! PAGECHAT_HOME resolution order:
    //! 1. PAGECHAT_HOME environment variable (if set)
    //! 2. ~/.config/pagechat (default)

    use std::path::PathBuf;

    use anyhow::{Context, Result};

    /// Returns the pagechat home directory.
    pub fn pagechat_home() -> Result<PathBuf> {
        if let Ok(home) = std::env::var("PAGECHAT_HOME")
            && !home.trim().is_empty()
        {
            return Ok(PathBuf::from(home));
        }

        dirs::home_dir()
            .map(|h| h.join(".config").join("pagechat"))
            .context("Could not determine home directory; set PAGECHAT_HOME")
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> Result<PathBuf> {
        Ok(pagechat_home()?.join("config.toml"))
    }

    /// Returns the directory holding persisted history and preferences.
    pub fn store_dir() -> Result<PathBuf> {
        Ok(pagechat_home()?.join("store"))
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat model sent with every request
    pub model: String,

    /// Maximum tokens for responses
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Provider credentials and endpoint
    pub provider: ProviderConfig,

    /// Page extraction limits
    pub extract: ExtractConfig,

    /// Markdown rendering
    pub render: RenderConfig,
}

impl Config {
    pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";
    pub const DEFAULT_MAX_TOKENS: u32 = 1000;
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path()?)
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Extraction options derived from `[extract]`.
    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            max_chars: self.extract.max_chars,
            node_budget: DEFAULT_NODE_BUDGET,
        }
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: Self::DEFAULT_MODEL.to_string(),
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            temperature: Self::DEFAULT_TEMPERATURE,
            provider: ProviderConfig::default(),
            extract: ExtractConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

/// Chat-completions provider settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl ProviderConfig {
    /// Returns the effective API key if set and non-empty.
    pub fn effective_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Returns the effective base URL if set and non-empty.
    pub fn effective_base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Maximum characters of page text kept in a snapshot.
    pub max_chars: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_chars: MAX_TEXT_CHARS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub mode: RenderMode,
}
