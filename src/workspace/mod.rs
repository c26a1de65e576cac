//! Run directory layout and lifecycle.
//!
//! A run lives at `<root>/<primary_domain>/<run_id>/` and is owned by a
//! single orchestrator for its lifetime.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WardenError};

pub const RUN_META_FILE: &str = "run_meta.json";
pub const REPORTS_DIR: &str = "reports";
pub const LOGS_DIR: &str = "logs";
pub const GENERATED_TOOLS_DIR: &str = "generated/tools";

/// Metadata written once when a run is established.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub targets: Vec<String>,
    pub mode: String,
    pub primary_domain: String,
    #[serde(default)]
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl RunMeta {
    /// Read `run_meta.json` from a run directory.
    pub fn load(run_dir: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(run_dir.join(RUN_META_FILE))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// One scan execution and its directory.
#[derive(Debug, Clone)]
pub struct ScanRun {
    targets: Vec<String>,
    primary_domain: String,
    run_id: String,
    mode: String,
    dir: PathBuf,
}

impl ScanRun {
    /// Create the run directory tree and write `run_meta.json`.
    ///
    /// Failing here is fatal for the whole run.
    pub fn establish(root: &Path, targets: Vec<String>, run_id: &str, mode: &str) -> Result<Self> {
        let first = targets
            .first()
            .ok_or_else(|| WardenError::Config("at least one target is required".into()))?;
        if run_id.is_empty() || run_id.contains(['/', '\\']) || run_id == ".." {
            return Err(WardenError::Config(format!("invalid run id '{run_id}'")));
        }
        let primary_domain = primary_domain(first);
        let dir = root.join(&primary_domain).join(run_id);

        for sub in [LOGS_DIR, REPORTS_DIR, GENERATED_TOOLS_DIR] {
            std::fs::create_dir_all(dir.join(sub)).map_err(|e| WardenError::RunDir {
                path: dir.display().to_string(),
                message: e.to_string(),
            })?;
        }

        let meta = RunMeta {
            targets: targets.clone(),
            mode: mode.to_string(),
            primary_domain: primary_domain.clone(),
            run_id: run_id.to_string(),
            created_at: Some(chrono::Utc::now()),
        };
        let json = serde_json::to_string_pretty(&meta)?;
        std::fs::write(dir.join(RUN_META_FILE), json).map_err(|e| WardenError::RunDir {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;

        tracing::info!(run_dir = %dir.display(), targets = targets.len(), "run directory established");

        Ok(Self {
            targets,
            primary_domain,
            run_id: run_id.to_string(),
            mode: mode.to_string(),
            dir,
        })
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn primary_domain(&self) -> &str {
        &self.primary_domain
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.dir.join(REPORTS_DIR)
    }

    pub fn tools_dir(&self) -> PathBuf {
        self.dir.join(GENERATED_TOOLS_DIR)
    }
}

/// Host (with port) of a URL target, or the bare target up to the first `/`.
pub fn primary_domain(target: &str) -> String {
    if let Ok(parsed) = url::Url::parse(target) {
        if let Some(host) = parsed.host_str() {
            return match parsed.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            };
        }
    }
    target
        .split('/')
        .find(|s| !s.is_empty())
        .unwrap_or(target)
        .to_string()
}

/// Remove earlier runs for `domain` under `root`, keeping `keep` if given.
///
/// Returns the number of entries removed. Individual removal failures are
/// logged and skipped.
pub fn clear_previous_runs(root: &Path, domain: &str, keep: Option<&Path>) -> Result<usize> {
    let base = root.join(domain);
    if !base.is_dir() {
        return Ok(0);
    }
    let keep = keep.and_then(|k| k.canonicalize().ok());
    let mut removed = 0;

    for entry in std::fs::read_dir(&base)?.flatten() {
        let path = entry.path();
        if let (Some(keep), Ok(canonical)) = (keep.as_ref(), path.canonicalize()) {
            if &canonical == keep {
                continue;
            }
        }
        let outcome = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match outcome {
            Ok(()) => removed += 1,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove previous run, skipping");
            }
        }
    }

    Ok(removed)
}
