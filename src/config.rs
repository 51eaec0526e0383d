//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.kpiboard.toml` files.

use crate::cli::OutputFormat;
use crate::navigation::ROOT_LABEL;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".kpiboard.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Data source settings.
    #[serde(default)]
    pub data: DataConfig,

    /// Display settings.
    #[serde(default)]
    pub display: DisplayConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Write rendered output to this file instead of stdout.
    #[serde(default)]
    pub output: Option<String>,
}

/// Where the data sets live. Each value is a path or an http(s) URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Pre-aggregated provider KPIs. When unset, summaries are derived from claims.
    #[serde(default = "default_kpis")]
    pub kpis: Option<String>,

    /// Claims export used for the navigation tree.
    #[serde(default = "default_claims")]
    pub claims: Option<String>,

    /// Submitted-claims CSV summed into the charges row.
    #[serde(default)]
    pub csv: Option<String>,

    /// Timeout for HTTP sources, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            kpis: default_kpis(),
            claims: default_claims(),
            csv: None,
            timeout_seconds: default_timeout(),
        }
    }
}

impl DataConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_kpis() -> Option<String> {
    Some("data/provider_kpis.json".to_string())
}

fn default_claims() -> Option<String> {
    Some("data/claims_data.json".to_string())
}

fn default_timeout() -> u64 {
    30
}

/// How views are rendered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Output format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Label of the navigation root.
    #[serde(default = "default_root_label")]
    pub root_label: String,

    /// KPIs shown as dollar amounts.
    #[serde(default = "default_currency_kpis")]
    pub currency_kpis: Vec<String>,

    /// Show the claims CSV totals on the root view.
    #[serde(default = "default_true")]
    pub show_csv_row: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            root_label: default_root_label(),
            currency_kpis: default_currency_kpis(),
            show_csv_row: true,
        }
    }
}

fn default_root_label() -> String {
    ROOT_LABEL.to_string()
}

fn default_currency_kpis() -> Vec<String> {
    vec!["Charges".to_string()]
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, and only
    /// when they were given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref kpis) = args.kpis {
            self.data.kpis = non_empty(kpis);
        }
        if let Some(ref claims) = args.claims {
            self.data.claims = non_empty(claims);
        }
        if let Some(ref csv) = args.csv {
            self.data.csv = non_empty(csv);
        }
        if let Some(timeout) = args.timeout {
            self.data.timeout_seconds = timeout;
        }

        if let Some(format) = args.format {
            self.display.format = format;
        }
        if let Some(ref output) = args.output {
            self.general.output = Some(output.display().to_string());
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// An empty CLI value switches a source off.
fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
