use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "data/config/confluence.yaml";
pub const DEFAULT_BASE_URL: &str = "https://confluence.hl7.org";

const SAMPLE_BEARER_TOKEN: &str = "your_personal_access_token_here";

/// Converter configuration, loaded from a YAML file. Every field has a
/// default so partial files parse; a missing file is a startup error.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ConverterConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Seconds between requests.
    #[serde(default = "default_rate_limit_delay")]
    pub rate_limit_delay: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Seconds to wait before retrying a failed request, unless the server
    /// supplies its own wait hint.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            bearer_token: None,
            rate_limit_delay: default_rate_limit_delay(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_rate_limit_delay() -> f64 {
    1.0
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_delay() -> f64 {
    5.0
}

/// Load and parse the converter config. Missing or malformed files are
/// fatal; no conversion is attempted without configuration.
pub fn load_config(config_path: &Path) -> Result<ConverterConfig> {
    if !config_path.exists() {
        bail!(
            "config file not found: {} (run `wikicite init-config` to create one)",
            config_path.display()
        );
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: ConverterConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Write a sample config with a placeholder token. Returns `false` when the
/// file already exists and `force` is off.
pub fn write_sample_config(config_path: &Path, force: bool) -> Result<bool> {
    if config_path.exists() && !force {
        return Ok(false);
    }
    if let Some(parent) = config_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let sample = ConverterConfig {
        bearer_token: Some(SAMPLE_BEARER_TOKEN.to_string()),
        ..ConverterConfig::default()
    };
    let rendered = serde_yaml::to_string(&sample).context("failed to serialize sample config")?;
    fs::write(config_path, rendered)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    Ok(true)
}
