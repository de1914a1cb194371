use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "livediff.config.toml";
pub const CONFIG_PATH_ENV: &str = "LIVEDIFF_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub diagnostics: DiagnosticsConfig,
    pub ledger: LedgerConfig,
    pub watch: WatchConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub rust_log_filter: String,
    pub trace_file_prefix: String,
    pub logs_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerConfig {
    /// Directory inside the project folder that holds ledger and reports.
    pub history_dir_name: String,
    pub ledger_file_name: String,
    /// Must capture the version label in group 1.
    pub version_pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchConfig {
    pub interval_secs: u64,
    pub reports_dir_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReportConfig {
    /// Append the positional change list below the fingerprint report.
    pub include_positional: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            rust_log_filter: "info,livediff_core=debug".to_string(),
            trace_file_prefix: "livediff".to_string(),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            history_dir_name: "_history".to_string(),
            ledger_file_name: "versions.json".to_string(),
            version_pattern: r".*_(\d+\.\d+\.\d+)\.als$".to_string(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            reports_dir_name: "reports".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = discover_config_path().with_context(|| {
            format!("failed to locate {CONFIG_FILE_NAME}; looked in cwd and parent directory")
        })?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config file {}", config_path.display()))?;

        let config: AppConfig = toml::from_str(&content).with_context(|| {
            format!("failed to parse config TOML from {}", config_path.display())
        })?;

        Ok(config)
    }

    /// Like [`AppConfig::load`], but a missing file yields the defaults.
    /// A file that exists and fails to parse is still an error.
    pub fn load_or_default() -> Result<Self> {
        match discover_config_path() {
            Ok(path) => Self::load_from(&path),
            Err(_) => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

fn discover_config_path() -> Result<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(path);
        }
    }

    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let candidates = [
        cwd.join(CONFIG_FILE_NAME),
        cwd.join("..").join(CONFIG_FILE_NAME),
    ];

    candidates
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(|| anyhow::anyhow!("{CONFIG_FILE_NAME} not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults_for_missing_keys() {
        let config: AppConfig = toml::from_str(
            r#"
            [watch]
            interval_secs = 30

            [ledger]
            history_dir_name = ".versions"
            "#,
        )
        .expect("partial config should parse");

        assert_eq!(config.watch.interval_secs, 30);
        assert_eq!(config.watch.reports_dir_name, "reports");
        assert_eq!(config.ledger.history_dir_name, ".versions");
        assert_eq!(config.ledger.ledger_file_name, "versions.json");
        assert_eq!(config.diagnostics, DiagnosticsConfig::default());
        assert!(!config.report.include_positional);
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let temp = tempfile::tempdir().expect("tempdir should be creatable");
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[watch\ninterval_secs = ").expect("writing config should work");
        assert!(AppConfig::load_from(&path).is_err());
    }
}
