//! Configuration for engine discovery and sessions.
//!
//! Configuration is loaded from `~/.config/rbridge/config.toml`. The
//! `RBRIDGE_ENGINE` environment variable overrides the executable path.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::paths;

/// Environment variable that names the engine executable explicitly.
pub const ENGINE_ENV: &str = "RBRIDGE_ENGINE";

/// Configuration for locating and driving the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Explicit engine executable; tried before any PATH lookup.
    #[serde(default)]
    pub engine_path: Option<PathBuf>,

    /// Executable names searched for in PATH.
    #[serde(default = "default_aliases")]
    pub aliases: Vec<String>,

    /// Arguments passed to the engine at startup.
    #[serde(default = "default_engine_args")]
    pub engine_args: Vec<String>,

    /// Substrings that must all appear in the `--version` banner.
    #[serde(default = "default_banner")]
    pub banner: Vec<String>,

    /// Vectors and matrices above this many elements are spooled to a file.
    #[serde(default = "default_spool_threshold")]
    pub spool_threshold: usize,

    /// Inline lists break the line after this many elements.
    #[serde(default = "default_elements_per_line")]
    pub elements_per_line: usize,

    /// Marker printed after tabular dumps and raw scripts.
    #[serde(default = "default_end_marker")]
    pub end_marker: String,

    /// Script run once after the engine starts.
    #[serde(default = "default_init_script")]
    pub init_script: String,

    /// Parent directory for the session temp directory (system temp if unset).
    #[serde(default)]
    pub temp_root: Option<PathBuf>,
}

fn default_aliases() -> Vec<String> {
    vec!["R".to_string()]
}

fn default_engine_args() -> Vec<String> {
    ["--vanilla", "--slave", "--no-readline", "--encoding=UTF-8"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_banner() -> Vec<String> {
    vec!["R version".to_string(), "R Foundation".to_string()]
}

fn default_spool_threshold() -> usize {
    20
}

fn default_elements_per_line() -> usize {
    10
}

fn default_end_marker() -> String {
    "--rbridge-end--".to_string()
}

fn default_init_script() -> String {
    "options(digits=17);".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            engine_path: None,
            aliases: default_aliases(),
            engine_args: default_engine_args(),
            banner: default_banner(),
            spool_threshold: default_spool_threshold(),
            elements_per_line: default_elements_per_line(),
            end_marker: default_end_marker(),
            init_script: default_init_script(),
            temp_root: None,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from the default path, then apply the environment.
    ///
    /// If the config file doesn't exist, starts from the default configuration.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        let config = if path.exists() {
            Self::load_from(&path)?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        Ok(config.with_env_override())
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Get the default config file path.
    pub fn config_path() -> PathBuf {
        paths::config_dir().join("config.toml")
    }

    /// Defaults plus the `RBRIDGE_ENGINE` override.
    pub fn from_env() -> Self {
        Self::default().with_env_override()
    }

    /// Apply `RBRIDGE_ENGINE` on top of whatever the file said.
    pub fn with_env_override(mut self) -> Self {
        if let Some(path) = std::env::var_os(ENGINE_ENV).filter(|v| !v.is_empty()) {
            self.engine_path = Some(PathBuf::from(path));
        }
        self
    }

    pub fn with_engine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.engine_path = Some(path.into());
        self
    }

    pub fn with_spool_threshold(mut self, threshold: usize) -> Self {
        self.spool_threshold = threshold;
        self
    }

    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert!(config.engine_path.is_none());
        assert_eq!(config.aliases, vec!["R"]);
        assert_eq!(config.spool_threshold, 20);
        assert_eq!(config.elements_per_line, 10);
        assert!(config.engine_args.iter().any(|a| a == "--no-readline"));
        assert!(config.init_script.contains("digits=17"));
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
engine_path = "/opt/R/bin/R"
spool_threshold = 100
"#;

        let config: BridgeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.engine_path, Some(PathBuf::from("/opt/R/bin/R")));
        assert_eq!(config.spool_threshold, 100);
        // Unspecified fields fall back to defaults
        assert_eq!(config.banner, default_banner());
        assert_eq!(config.end_marker, default_end_marker());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
aliases = ["R", "R-devel"]
engine_args = ["--vanilla"]
banner = ["R version"]
spool_threshold = 5
elements_per_line = 4
end_marker = "EOT"
init_script = ""
temp_root = "/var/tmp"
"#;

        let config: BridgeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.aliases, vec!["R", "R-devel"]);
        assert_eq!(config.engine_args, vec!["--vanilla"]);
        assert_eq!(config.elements_per_line, 4);
        assert_eq!(config.end_marker, "EOT");
        assert!(config.init_script.is_empty());
        assert_eq!(config.temp_root, Some(PathBuf::from("/var/tmp")));
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = BridgeConfig::load_from(Path::new("/nonexistent/rbridge.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn test_builders() {
        let config = BridgeConfig::default()
            .with_engine_path("/usr/local/bin/R")
            .with_spool_threshold(3)
            .with_temp_root("/scratch");
        assert_eq!(config.engine_path, Some(PathBuf::from("/usr/local/bin/R")));
        assert_eq!(config.spool_threshold, 3);
        assert_eq!(config.temp_root, Some(PathBuf::from("/scratch")));
    }
}
