//! External security tool execution.
//!
//! Tools are run through a registered adapter when one is available, as a
//! sandboxed binary found on the sanitized PATH otherwise, and as a
//! deterministic mock when neither exists. Every invocation leaves exactly
//! one JSON envelope under `generated/tools/<tool>.json`.

pub mod adapters;
pub mod args;
pub mod envelope;
pub mod manager;
pub mod mock;
pub mod parse;
pub mod process;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use adapters::{AdapterContext, AdapterOutput, AdapterRegistry, ToolAdapter};
pub use envelope::{Envelope, ToolStatus};
pub use manager::{Authorization, ToolExecutionManager, ToolInvocation};

/// PATH handed to tool subprocesses unless configured otherwise.
pub const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Tools that can modify or brute-force a target.
pub const DESTRUCTIVE_TOOLS: &[&str] = &[
    "sqlmap",
    "wpscan",
    "hydra",
    "medusa",
    "john",
    "hashcat",
    "msfconsole",
    "msf",
    "commix",
    "crowbar",
    "ncrack",
    "crackmapexec",
    "crack",
    "ldapdomaindump",
    "beef",
    "metasploit",
];

pub fn is_destructive(tool: &str) -> bool {
    let tool = tool.trim().to_lowercase();
    DESTRUCTIVE_TOOLS.iter().any(|t| *t == tool)
}

/// A tool name plus its destructive classification.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub destructive: bool,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let destructive = is_destructive(&name);
        Self { name, destructive }
    }
}

impl std::fmt::Display for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.destructive {
            write!(f, "{} (destructive)", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

/// Sorted, de-duplicated union of configured tool names and adapter names.
pub fn build_catalog<'a>(
    configured: impl IntoIterator<Item = &'a str>,
    registry: &AdapterRegistry,
) -> Vec<ToolDescriptor> {
    let mut names: Vec<String> = configured
        .into_iter()
        .map(|n| n.trim().to_lowercase())
        .filter(|n| !n.is_empty())
        .chain(registry.names().map(str::to_string))
        .collect();
    names.sort();
    names.dedup();
    names.into_iter().map(ToolDescriptor::new).collect()
}

/// Locate an executable named `tool` on `path_var`.
///
/// Names containing a path separator are never resolved.
pub fn resolve_binary(tool: &str, path_var: &str) -> Option<PathBuf> {
    if tool.is_empty() || tool.contains(['/', '\\']) {
        return None;
    }
    std::env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(tool))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
