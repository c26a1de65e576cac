//! Destructive-mode safety gate.
//!
//! Destructive testing needs two operator signals: an explicit destructive
//! flag, and proof of control over the run (a token file in the run
//! directory, an exported token, or both agreeing). Any error resolves to
//! "not allowed".

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::Result;

pub const PROOF_FILE: &str = "proof_of_control.txt";
pub const DESTRUCTIVE_ENV: &str = "SCANWARDEN_DESTRUCTIVE";
pub const PROOF_ENV: &str = "SCANWARDEN_PROOF";

/// The two external signals the gate decides on.
#[derive(Clone, Default)]
pub struct SafetySignals {
    pub destructive_flag: bool,
    pub proof_token: Option<String>,
}

impl std::fmt::Debug for SafetySignals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetySignals")
            .field("destructive_flag", &self.destructive_flag)
            .field("proof_token", &self.proof_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl SafetySignals {
    /// Capture both signals from the process environment.
    pub fn from_env() -> Self {
        Self {
            destructive_flag: std::env::var(DESTRUCTIVE_ENV)
                .map(|v| flag_enabled(&v))
                .unwrap_or(false),
            proof_token: std::env::var(PROOF_ENV).ok(),
        }
    }
}

fn flag_enabled(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Decides whether destructive operations may run for a run directory.
#[derive(Debug, Clone, Default)]
pub struct SafetyGate {
    signals: SafetySignals,
}

impl SafetyGate {
    pub fn new(signals: SafetySignals) -> Self {
        Self { signals }
    }

    pub fn from_env() -> Self {
        Self::new(SafetySignals::from_env())
    }

    pub fn destructive_flag(&self) -> bool {
        self.signals.destructive_flag
    }

    /// Check proof of control for `run_dir`.
    ///
    /// Token and artifact both present: they must match. Token only: accepted.
    /// Artifact only: accepted.
    pub fn proof_of_control(&self, run_dir: &Path) -> bool {
        let token = self
            .signals
            .proof_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let proof_path = proof_path(run_dir);

        match token {
            Some(token) => {
                if proof_path.is_file() {
                    match std::fs::read_to_string(&proof_path) {
                        Ok(contents) => contents.trim() == token,
                        Err(e) => {
                            tracing::warn!(path = %proof_path.display(), error = %e, "unreadable proof artifact");
                            false
                        }
                    }
                } else {
                    true
                }
            }
            None => proof_path.is_file(),
        }
    }

    /// Destructive operations are allowed only with the flag AND proof of control.
    pub fn is_destructive_allowed(&self, run_dir: &Path) -> bool {
        if !self.signals.destructive_flag {
            return false;
        }
        self.proof_of_control(run_dir)
    }
}

pub fn proof_path(run_dir: &Path) -> PathBuf {
    run_dir.join(PROOF_FILE)
}

/// Generate a fresh proof token scoped to `run_dir`.
pub fn generate_token(run_dir: &Path) -> String {
    let seed = format!(
        "{}:{}:{}",
        run_dir.display(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        uuid::Uuid::new_v4()
    );
    hex::encode(Sha256::digest(seed.as_bytes()))
}

/// Write the proof artifact, readable only by the owner on unix.
pub fn write_proof(run_dir: &Path, token: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(run_dir)?;
    let path = proof_path(run_dir);
    std::fs::write(&path, format!("{}\n", token.trim()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)) {
            tracing::debug!(error = %e, "could not restrict proof file permissions");
        }
    }

    Ok(path)
}

/// Read the token stored in the proof artifact, if any.
pub fn read_proof(run_dir: &Path) -> Option<String> {
    std::fs::read_to_string(proof_path(run_dir))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Operator guidance for enabling destructive mode.
pub fn instructions(run_dir: &Path) -> String {
    format!(
        "To enable destructive mode, perform both steps:\n\
         1) Export the destructive flag:\n\
         \x20    export {DESTRUCTIVE_ENV}=1\n\
         2) Provide proof of control for the run, either:\n\
         \x20    a) a token file at {} (scanwarden proof create {}), or\n\
         \x20    b) an exported token for CI: export {PROOF_ENV}=<token>\n\
         If both are present they must match.\n",
        proof_path(run_dir).display(),
        run_dir.display(),
    )
}
