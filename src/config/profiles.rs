//! Per-tool argument profiles.
//!
//! Each known tool has named profiles (quick, normal, thorough, stealth)
//! carrying the argument list and timeout used when the tool is invoked as a
//! plain binary. Operators can extend or replace profiles by dropping
//! `<tool>.json` files into the config directory.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Global scan intensity selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanProfile {
    Quick,
    Normal,
    Thorough,
    Stealth,
}

impl ScanProfile {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "quick" | "fast" => Some(Self::Quick),
            "normal" | "default" => Some(Self::Normal),
            "thorough" | "full" => Some(Self::Thorough),
            "stealth" | "slow" => Some(Self::Stealth),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Normal => "normal",
            Self::Thorough => "thorough",
            Self::Stealth => "stealth",
        }
    }
}

impl std::fmt::Display for ScanProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments and timeout for one tool under one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSpec {
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_profile_timeout")]
    pub timeout: u64,
}

fn default_profile_timeout() -> u64 {
    120
}

/// All profiles of one tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolProfileSet {
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileSpec>,
    #[serde(default)]
    pub default_profile: Option<String>,
}

type BuiltinProfile = (&'static str, &'static [&'static str], u64);

const NMAP: &[BuiltinProfile] = &[
    ("quick", &["-Pn", "-sS", "--top-ports", "100"], 60),
    ("normal", &["-Pn", "-sS", "-sV", "--top-ports", "1000"], 120),
    ("thorough", &["-Pn", "-sS", "-sV", "-O", "--script", "default,safe"], 300),
    ("stealth", &["-Pn", "-sS", "-f", "--scan-delay", "5", "--max-rate", "10"], 600),
];

const SQLMAP: &[BuiltinProfile] = &[
    ("quick", &["--batch", "--risk=1", "--level=1", "--random-agent", "--timeout=10"], 120),
    ("normal", &["--batch", "--risk=2", "--level=2", "--random-agent", "--timeout=30"], 240),
    (
        "thorough",
        &["--batch", "--risk=3", "--level=3", "--random-agent", "--timeout=60", "--tamper=space2comment"],
        600,
    ),
];

const NIKTO: &[BuiltinProfile] = &[
    ("quick", &["-Cgidirs", "none", "-maxtime", "300"], 300),
    ("normal", &["-Cgidirs", "none"], 600),
    ("thorough", &[], 1200),
];

const WPSCAN: &[BuiltinProfile] = &[
    ("quick", &["--no-banner", "--disable-tls-checks", "--max-threads", "5"], 120),
    ("normal", &["--no-banner", "--disable-tls-checks", "--max-threads", "10"], 300),
    (
        "thorough",
        &["--no-banner", "--disable-tls-checks", "--max-threads", "20", "--enumerate", "vp,vt,cb,dbe"],
        600,
    ),
];

const NUCLEI: &[BuiltinProfile] = &[
    ("quick", &["-silent", "-json", "-tags", "misconfig"], 120),
    ("normal", &["-silent", "-json", "-tags", "misconfig,vuln"], 300),
    ("thorough", &["-silent", "-json", "-tags", "misconfig,vuln,file"], 600),
];

const SSLYZE_BASE: &[&str] = &[
    "--sslv2", "--sslv3", "--tlsv1", "--tlsv1_1", "--tlsv1_2", "--tlsv1_3", "--certinfo",
    "--compression", "--heartbleed",
];

const SSLYZE: &[BuiltinProfile] = &[
    ("quick", SSLYZE_BASE, 120),
    (
        "normal",
        &[
            "--sslv2", "--sslv3", "--tlsv1", "--tlsv1_1", "--tlsv1_2", "--tlsv1_3", "--certinfo",
            "--compression", "--heartbleed", "--openssl_ccs", "--reneg",
        ],
        240,
    ),
    (
        "thorough",
        &[
            "--sslv2", "--sslv3", "--tlsv1", "--tlsv1_1", "--tlsv1_2", "--tlsv1_3", "--certinfo",
            "--compression", "--heartbleed", "--openssl_ccs", "--reneg", "--resum", "--early_data",
        ],
        480,
    ),
    (
        "stealth",
        &[
            "--sslv2", "--sslv3", "--tlsv1", "--tlsv1_1", "--tlsv1_2", "--certinfo", "--compression",
            "--timeout", "5",
        ],
        180,
    ),
];

const BUILTIN: &[(&str, &[BuiltinProfile])] = &[
    ("nmap", NMAP),
    ("sqlmap", SQLMAP),
    ("nikto", NIKTO),
    ("wpscan", WPSCAN),
    ("nuclei", NUCLEI),
    ("sslyze", SSLYZE),
];

/// Profile table for all known tools.
#[derive(Debug, Clone, Default)]
pub struct ToolProfiles {
    tools: HashMap<String, ToolProfileSet>,
}

impl ToolProfiles {
    /// Built-in profiles only.
    pub fn builtin() -> Self {
        let tools = BUILTIN
            .iter()
            .map(|(tool, profiles)| {
                let set = ToolProfileSet {
                    profiles: profiles
                        .iter()
                        .map(|(name, args, timeout)| {
                            (
                                name.to_string(),
                                ProfileSpec {
                                    args: args.iter().map(|a| a.to_string()).collect(),
                                    timeout: *timeout,
                                },
                            )
                        })
                        .collect(),
                    default_profile: Some("normal".into()),
                };
                (tool.to_string(), set)
            })
            .collect();
        Self { tools }
    }

    /// Built-in profiles merged with `<config_dir>/*.json` overrides.
    ///
    /// Invalid files are logged and ignored.
    pub fn load(config_dir: Option<&Path>) -> Self {
        let mut table = Self::builtin();
        let Some(dir) = config_dir else {
            return table;
        };
        if !dir.is_dir() {
            tracing::debug!(dir = %dir.display(), "tool config directory missing, using built-in profiles");
            return table;
        }

        let pattern = dir.join("*.json");
        let entries = match glob::glob(&pattern.to_string_lossy()) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(error = %e, "invalid tool config directory pattern");
                return table;
            }
        };

        for path in entries.flatten() {
            let Some(tool) = path.file_stem().map(|s| s.to_string_lossy().to_lowercase()) else {
                continue;
            };
            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|s| serde_json::from_str::<ToolProfileSet>(&s).map_err(|e| e.to_string()));
            match parsed {
                Ok(custom) => table.merge(&tool, custom),
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "ignoring invalid tool config");
                }
            }
        }
        table
    }

    fn merge(&mut self, tool: &str, custom: ToolProfileSet) {
        let entry = self.tools.entry(tool.to_string()).or_default();
        entry.profiles.extend(custom.profiles);
        if custom.default_profile.is_some() {
            entry.default_profile = custom.default_profile;
        }
    }

    pub fn knows(&self, tool: &str) -> bool {
        self.tools.contains_key(tool)
    }

    /// Pick the profile for `tool`.
    ///
    /// Order: requested name, the tool's default profile, `normal`, then the
    /// first profile by name. Unknown tools yield `None`.
    pub fn resolve(&self, tool: &str, requested: Option<&str>) -> Option<ProfileSpec> {
        let set = self.tools.get(tool)?;
        requested
            .and_then(|name| set.profiles.get(name))
            .or_else(|| {
                set.default_profile
                    .as_deref()
                    .and_then(|name| set.profiles.get(name))
            })
            .or_else(|| set.profiles.get("normal"))
            .or_else(|| set.profiles.values().next())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builtin_nmap_quick() {
        let profiles = ToolProfiles::builtin();
        let spec = profiles.resolve("nmap", Some("quick")).unwrap();
        assert_eq!(spec.args, vec!["-Pn", "-sS", "--top-ports", "100"]);
        assert_eq!(spec.timeout, 60);
    }

    #[test]
    fn missing_profile_falls_back_to_default() {
        let profiles = ToolProfiles::builtin();
        // nuclei has no stealth profile
        let spec = profiles.resolve("nuclei", Some("stealth")).unwrap();
        assert_eq!(spec.timeout, 300);
        assert!(profiles.resolve("unknown-tool", None).is_none());
    }

    #[test]
    fn config_dir_overrides_merge() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("nmap.json"),
            r#"{"profiles": {"quick": {"args": ["-F"], "timeout": 10}}}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("gobuster.json"),
            r#"{"profiles": {"normal": {"args": ["dir"]}}, "default_profile": "normal"}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let profiles = ToolProfiles::load(Some(dir.path()));
        assert_eq!(profiles.resolve("nmap", Some("quick")).unwrap().args, vec!["-F"]);
        // untouched profiles survive the merge
        assert_eq!(profiles.resolve("nmap", Some("thorough")).unwrap().timeout, 300);
        let gobuster = profiles.resolve("gobuster", None).unwrap();
        assert_eq!(gobuster.args, vec!["dir"]);
        assert_eq!(gobuster.timeout, 120);
        assert!(!profiles.knows("broken"));
    }

    #[test]
    fn scan_profile_parsing() {
        assert_eq!(ScanProfile::from_str_lenient("THOROUGH"), Some(ScanProfile::Thorough));
        assert_eq!(ScanProfile::from_str_lenient("bogus"), None);
        assert_eq!(ScanProfile::Stealth.to_string(), "stealth");
    }
}
