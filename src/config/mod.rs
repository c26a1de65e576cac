pub mod profiles;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use profiles::{ScanProfile, ToolProfiles};

pub const CONFIG_DIR_ENV: &str = "SCANWARDEN_CONFIG_DIR";
pub const SCAN_PROFILE_ENV: &str = "SCANWARDEN_SCAN_PROFILE";
const TOOL_PROFILE_PREFIX: &str = "SCANWARDEN_";
const TOOL_PROFILE_SUFFIX: &str = "_PROFILE";

/// Top-level configuration from `.scanwarden.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
}

impl Config {
    /// Load config from a TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# scan-warden configuration

[tools]
# Timeout applied when neither the profile nor an override names one.
default_timeout_secs = 120

# Tools run in every batch. Destructive-capable tools are skipped unless
# the destructive phase is authorized.
catalog = ["medusa", "nikto", "nmap", "nuclei", "sqlmap", "wpscan"]

# Per-tool timeout overrides (seconds).
# [tools.timeouts]
# nmap = 60

[scheduler]
# Upper bound on concurrently probed targets.
max_parallelism = 5
# Targets probed per scheduling round before re-evaluating.
round_size = 10
# How long an availability check stays valid (seconds).
availability_staleness_secs = 300
# Targets treated as maximally critical.
# critical_assets = ["https://example.test/admin"]

[orchestrator]
# Seconds to wait for the destructive confirmation prompt (unset = forever).
# confirm_timeout_secs = 300
"#
    }
}

/// Tool execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default)]
    pub timeouts: HashMap<String, u64>,
    #[serde(default = "default_catalog")]
    pub catalog: Vec<String>,
    /// PATH handed to tool subprocesses.
    #[serde(default)]
    pub path: Option<String>,
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_catalog() -> Vec<String> {
    ["medusa", "nikto", "nmap", "nuclei", "sqlmap", "wpscan"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            timeouts: HashMap::new(),
            catalog: default_catalog(),
            path: None,
        }
    }
}

impl ToolSettings {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

/// Adaptive scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,
    #[serde(default = "default_round_size")]
    pub round_size: usize,
    #[serde(default = "default_staleness_secs")]
    pub availability_staleness_secs: u64,
    #[serde(default)]
    pub critical_assets: Vec<String>,
    #[serde(default)]
    pub asset_values: HashMap<String, f64>,
}

fn default_max_parallelism() -> usize {
    5
}

fn default_round_size() -> usize {
    10
}

fn default_staleness_secs() -> u64 {
    300
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_parallelism: default_max_parallelism(),
            round_size: default_round_size(),
            availability_staleness_secs: default_staleness_secs(),
            critical_assets: Vec::new(),
            asset_values: HashMap::new(),
        }
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    #[serde(default)]
    pub confirm_timeout_secs: Option<u64>,
}

/// Environment-derived overrides, captured once at startup.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub config_dir: Option<PathBuf>,
    pub scan_profile: Option<ScanProfile>,
    /// Per-tool profile names from `SCANWARDEN_<TOOL>_PROFILE`.
    pub tool_profiles: HashMap<String, String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build overrides from an arbitrary variable list.
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut out = Self::default();
        for (key, value) in vars {
            if key == CONFIG_DIR_ENV {
                if !value.is_empty() {
                    out.config_dir = Some(PathBuf::from(value));
                }
            } else if key == SCAN_PROFILE_ENV {
                out.scan_profile = ScanProfile::from_str_lenient(&value);
                if out.scan_profile.is_none() {
                    tracing::warn!(value = %value, "unknown scan profile in environment, ignoring");
                }
            } else if let Some(tool) = key
                .strip_prefix(TOOL_PROFILE_PREFIX)
                .and_then(|rest| rest.strip_suffix(TOOL_PROFILE_SUFFIX))
            {
                if !tool.is_empty() && tool != "SCAN" {
                    out.tool_profiles.insert(tool.to_lowercase(), value);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(Path::new("/nonexistent/.scanwarden.toml")).unwrap();
        assert_eq!(config.tools.default_timeout_secs, 120);
        assert_eq!(config.scheduler.max_parallelism, 5);
        assert!(config.orchestrator.confirm_timeout_secs.is_none());
    }

    #[test]
    fn starter_toml_parses() {
        let config: Config = toml::from_str(Config::starter_toml()).unwrap();
        assert_eq!(config.tools.catalog.len(), 6);
        assert_eq!(config.scheduler.round_size, 10);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".scanwarden.toml");
        std::fs::write(&path, "[tools.timeouts]\nnmap = 30\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.tools.timeouts.get("nmap"), Some(&30));
        assert_eq!(config.tools.default_timeout_secs, 120);
    }

    #[test]
    fn env_overrides_parse_tool_profiles() {
        let vars = vec![
            ("SCANWARDEN_SCAN_PROFILE".to_string(), "thorough".to_string()),
            ("SCANWARDEN_NMAP_PROFILE".to_string(), "stealth".to_string()),
            ("SCANWARDEN_CONFIG_DIR".to_string(), "/etc/scanwarden".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ];
        let env = EnvOverrides::from_vars(vars);
        assert_eq!(env.scan_profile, Some(ScanProfile::Thorough));
        assert_eq!(env.tool_profiles.get("nmap").map(String::as_str), Some("stealth"));
        assert_eq!(env.config_dir, Some(PathBuf::from("/etc/scanwarden")));
        assert_eq!(env.tool_profiles.len(), 1);
    }
}
