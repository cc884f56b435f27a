use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_NAME: &str = "nbhist.config.json";

/// nbhist configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Appended to a script's stem when no output path is given
    #[serde(default = "default_history_suffix")]
    pub history_suffix: String,

    /// tracing filter used when RUST_LOG is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Pretty-print written history files
    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

fn default_history_suffix() -> String {
    ".history.json".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_pretty() -> bool {
    true
}

impl Config {
    /// Load config from a directory
    pub fn load(cwd: &str) -> anyhow::Result<Self> {
        let config_path = PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Where the history for `script` goes when no output is given
    pub fn history_path(&self, script: &str) -> PathBuf {
        let script = PathBuf::from(script);
        let stem = script
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "notebook".to_string());
        script.with_file_name(format!("{stem}{}", self.history_suffix))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_suffix: default_history_suffix(),
            log_filter: default_log_filter(),
            pretty: default_pretty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "historySuffix": ".nbh.json",
            "logFilter": "nbhist_history=debug",
            "pretty": false
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.history_suffix, ".nbh.json");
        assert_eq!(config.log_filter, "nbhist_history=debug");
        assert!(!config.pretty);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{ "pretty": false }"#).unwrap();
        assert_eq!(config.history_suffix, ".history.json");
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().display().to_string()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_history_path() {
        let config = Config::default();
        assert_eq!(
            config.history_path("notebooks/analysis.json"),
            PathBuf::from("notebooks/analysis.history.json")
        );
    }
}
