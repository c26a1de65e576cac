pub mod nmap;
pub mod sqlmap;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::envelope::Envelope;
use super::process::SandboxedCommand;
use super::{args, resolve_binary};
use crate::error::{Result, WardenError};

/// Everything an adapter needs for one invocation.
#[derive(Debug, Clone)]
pub struct AdapterContext {
    pub tool: String,
    pub run_dir: PathBuf,
    pub target: Option<String>,
    pub extra_args: Vec<String>,
    pub profile_args: Vec<String>,
    pub timeout: Duration,
    /// Sanitized PATH for any subprocess the adapter starts.
    pub path_env: String,
}

/// What an adapter hands back to the manager.
#[derive(Debug, Clone)]
pub enum AdapterOutput {
    /// A complete envelope, persisted as-is.
    Envelope(Envelope),
    /// Arbitrary result data, wrapped as `adapter_return`.
    Raw(Value),
}

/// A tool-specific integration that takes precedence over running the bare
/// binary.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// Tool name this adapter handles.
    fn name(&self) -> &str;

    /// Whether the adapter can run in this environment.
    fn is_available(&self, ctx: &AdapterContext) -> bool;

    /// Run the tool.
    async fn run(&self, ctx: &AdapterContext) -> Result<AdapterOutput>;
}

/// Explicit adapter registry keyed by tool name.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn ToolAdapter>>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.adapters.keys()).finish()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in adapters.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for adapter in builtin_adapters() {
            if let Err(e) = registry.register(adapter) {
                tracing::warn!(error = %e, "built-in adapter rejected");
            }
        }
        registry
    }

    /// Register an adapter, replacing any previous one for the same tool.
    ///
    /// The name keys envelope files, so it must be a plain tool name made
    /// of ASCII letters, digits, `.`, `_` and `-`.
    pub fn register(&mut self, adapter: Arc<dyn ToolAdapter>) -> Result<()> {
        let name = adapter.name().trim().to_lowercase();
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid {
            return Err(WardenError::AdapterLoad {
                tool: adapter.name().to_string(),
                message: "adapter name is not a plain tool name".into(),
            });
        }
        if self.adapters.insert(name.clone(), adapter).is_some() {
            tracing::debug!(tool = %name, "replacing registered adapter");
        }
        Ok(())
    }

    pub fn get(&self, tool: &str) -> Option<Arc<dyn ToolAdapter>> {
        self.adapters.get(tool).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }
}

/// All built-in adapters.
pub fn builtin_adapters() -> Vec<Arc<dyn ToolAdapter>> {
    vec![Arc::new(nmap::NmapAdapter), Arc::new(sqlmap::SqlmapAdapter)]
}

/// Run the tool binary for `ctx` with its standard argument layout.
pub(crate) async fn run_binary(ctx: &AdapterContext) -> Result<Envelope> {
    let program = resolve_binary(&ctx.tool, &ctx.path_env).ok_or_else(|| WardenError::ToolExecution {
        tool: ctx.tool.clone(),
        message: "binary not found on PATH".into(),
    })?;
    let command = SandboxedCommand {
        program,
        args: args::build_args(&ctx.tool, ctx.target.as_deref(), &ctx.profile_args, &ctx.extra_args),
        path_env: ctx.path_env.clone(),
        timeout: ctx.timeout,
    };
    let result = command.run().await;
    Ok(Envelope::from_process(&ctx.tool, &result).with_target(ctx.target.as_deref()))
}
