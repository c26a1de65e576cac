use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::future::join_all;

use super::adapters::{AdapterContext, AdapterOutput, AdapterRegistry};
use super::envelope::{Envelope, ToolStatus};
use super::process::SandboxedCommand;
use super::{args, build_catalog, is_destructive, mock, resolve_binary, ToolDescriptor, DEFAULT_PATH};
use crate::config::{Config, EnvOverrides, ToolProfiles, ToolSettings};
use crate::error::{Result, WardenError};
use crate::safety::SafetyGate;
use crate::workspace::{RunMeta, GENERATED_TOOLS_DIR};

/// Built-in per-tool timeouts, used when no profile was requested.
const BUILTIN_TIMEOUTS: &[(&str, u64)] = &[("sqlmap", 120), ("nmap", 60), ("wpscan", 90), ("nuclei", 45)];

/// Who vouches for running destructive-capable tools.
#[derive(Debug, Clone)]
pub enum Authorization<'a> {
    /// Destructive tools are skipped.
    NonDestructiveOnly,
    /// The gate is consulted at the moment each destructive tool is invoked.
    Gated(&'a SafetyGate),
    /// An operator explicitly accepted destructive testing.
    OperatorOverride { reason: String },
}

impl Authorization<'_> {
    pub fn operator(reason: impl Into<String>) -> Self {
        Self::OperatorOverride { reason: reason.into() }
    }

    fn permits(&self, tool: &str, run_dir: &Path) -> Result<()> {
        if !is_destructive(tool) {
            return Ok(());
        }
        match self {
            Self::NonDestructiveOnly => Err(WardenError::SafetyGateDenied(format!(
                "{tool} is destructive and this is not the destructive phase"
            ))),
            Self::Gated(gate) => {
                let allowed = gate.is_destructive_allowed(run_dir);
                tracing::info!(
                    tool = %tool,
                    destructive_flag = gate.destructive_flag(),
                    allowed,
                    "safety gate verdict"
                );
                if allowed {
                    Ok(())
                } else {
                    Err(WardenError::SafetyGateDenied(format!(
                        "{tool} needs the destructive flag and proof of control"
                    )))
                }
            }
            Self::OperatorOverride { reason } => {
                tracing::warn!(tool = %tool, reason = %reason, "operator override for destructive tool");
                Ok(())
            }
        }
    }
}

/// One requested tool run.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool: String,
    pub run_dir: PathBuf,
    pub target: Option<String>,
    pub extra_args: Vec<String>,
    pub timeout: Option<Duration>,
    pub profile: Option<String>,
}

impl ToolInvocation {
    pub fn new(tool: impl Into<String>, run_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into().trim().to_lowercase(),
            run_dir: run_dir.into(),
            target: None,
            extra_args: Vec::new(),
            timeout: None,
            profile: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }
}

/// Runs tools and records exactly one envelope per invocation.
#[derive(Debug, Clone)]
pub struct ToolExecutionManager {
    settings: ToolSettings,
    profiles: ToolProfiles,
    env: EnvOverrides,
    adapters: AdapterRegistry,
}

impl ToolExecutionManager {
    pub fn new(
        settings: ToolSettings,
        profiles: ToolProfiles,
        env: EnvOverrides,
        adapters: AdapterRegistry,
    ) -> Self {
        Self {
            settings,
            profiles,
            env,
            adapters,
        }
    }

    /// Manager with built-in adapters and profiles from the config directory.
    pub fn from_config(config: &Config, env: &EnvOverrides) -> Self {
        Self::new(
            config.tools.clone(),
            ToolProfiles::load(env.config_dir.as_deref()),
            env.clone(),
            AdapterRegistry::with_builtin(),
        )
    }

    /// Configured tools plus registered adapters.
    pub fn catalog(&self) -> Vec<ToolDescriptor> {
        build_catalog(self.settings.catalog.iter().map(String::as_str), &self.adapters)
    }

    fn path_env(&self) -> &str {
        self.settings.path.as_deref().unwrap_or(DEFAULT_PATH)
    }

    /// Explicit profile, then `SCANWARDEN_<TOOL>_PROFILE`, then the global
    /// scan profile.
    fn requested_profile(&self, inv: &ToolInvocation) -> Option<String> {
        inv.profile
            .clone()
            .or_else(|| self.env.tool_profiles.get(&inv.tool).cloned())
            .or_else(|| self.env.scan_profile.map(|p| p.to_string()))
    }

    fn resolve_timeout(&self, inv: &ToolInvocation, requested: Option<&str>) -> Duration {
        if let Some(t) = inv.timeout {
            return t;
        }
        if let Some(secs) = self.settings.timeouts.get(&inv.tool) {
            return Duration::from_secs(*secs);
        }
        if requested.is_some() {
            if let Some(spec) = self.profiles.resolve(&inv.tool, requested) {
                return Duration::from_secs(spec.timeout);
            }
        }
        BUILTIN_TIMEOUTS
            .iter()
            .find(|(tool, _)| *tool == inv.tool)
            .map(|(_, secs)| Duration::from_secs(*secs))
            .unwrap_or_else(|| self.settings.default_timeout())
    }

    fn default_target(run_dir: &Path) -> Option<String> {
        match RunMeta::load(run_dir) {
            Ok(meta) => meta.targets.into_iter().next(),
            Err(e) => {
                tracing::debug!(run_dir = %run_dir.display(), error = %e, "no run metadata for target defaulting");
                None
            }
        }
    }

    /// Run one tool. Never fails; the outcome is in the returned envelope,
    /// which has also been written under the run directory.
    pub async fn run(&self, inv: &ToolInvocation, auth: &Authorization<'_>) -> Envelope {
        let tools_dir = inv.run_dir.join(GENERATED_TOOLS_DIR);
        let mut envelope = self.execute(inv, auth).await;
        envelope.meta.tool = inv.tool.clone();

        if let Err(e) = envelope.persist(&tools_dir) {
            tracing::warn!(tool = %inv.tool, error = %e, "failed to write tool envelope");
        }
        tracing::info!(tool = %inv.tool, status = %envelope.status(), "tool invocation finished");
        envelope
    }

    async fn execute(&self, inv: &ToolInvocation, auth: &Authorization<'_>) -> Envelope {
        if let Err(denied) = auth.permits(&inv.tool, &inv.run_dir) {
            tracing::info!(tool = %inv.tool, reason = %denied, "skipping tool");
            return Envelope::skipped(&inv.tool, denied.to_string());
        }

        let target = inv.target.clone().or_else(|| Self::default_target(&inv.run_dir));
        let requested = self.requested_profile(inv);
        let profile_args = self
            .profiles
            .resolve(&inv.tool, requested.as_deref())
            .map(|spec| spec.args)
            .unwrap_or_default();
        let ctx = AdapterContext {
            tool: inv.tool.clone(),
            run_dir: inv.run_dir.clone(),
            target,
            extra_args: inv.extra_args.clone(),
            profile_args,
            timeout: self.resolve_timeout(inv, requested.as_deref()),
            path_env: self.path_env().to_string(),
        };

        if let Some(adapter) = self.adapters.get(&inv.tool) {
            if adapter.is_available(&ctx) {
                return match adapter.run(&ctx).await {
                    Ok(AdapterOutput::Envelope(env)) => env,
                    Ok(AdapterOutput::Raw(value)) => {
                        Envelope::new(&inv.tool, ToolStatus::AdapterReturn, value)
                            .with_target(ctx.target.as_deref())
                    }
                    Err(e) => {
                        tracing::warn!(tool = %inv.tool, error = %e, "adapter failed");
                        Envelope::adapter_error(&inv.tool, e).with_target(ctx.target.as_deref())
                    }
                };
            }
            tracing::debug!(tool = %inv.tool, "adapter unavailable, falling back");
        }

        match resolve_binary(&inv.tool, &ctx.path_env) {
            Some(program) => {
                let command = SandboxedCommand {
                    program,
                    args: args::build_args(&inv.tool, ctx.target.as_deref(), &ctx.profile_args, &ctx.extra_args),
                    path_env: ctx.path_env.clone(),
                    timeout: ctx.timeout,
                };
                let result = command.run().await;
                Envelope::from_process(&inv.tool, &result).with_target(ctx.target.as_deref())
            }
            None => {
                tracing::info!(tool = %inv.tool, "tool not on PATH, recording mock output");
                mock::mock_envelope(&inv.tool, ctx.target.as_deref())
            }
        }
    }

    /// Run several distinct tools concurrently against a run directory.
    pub async fn run_batch(
        &self,
        tools: &[ToolDescriptor],
        run_dir: &Path,
        auth: &Authorization<'_>,
    ) -> Vec<Envelope> {
        let mut seen = HashSet::new();
        let invocations: Vec<ToolInvocation> = tools
            .iter()
            .filter(|t| seen.insert(t.name.to_lowercase()))
            .map(|t| ToolInvocation::new(&t.name, run_dir))
            .collect();
        join_all(invocations.iter().map(|inv| self.run(inv, auth))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanProfile;
    use crate::error::{Result, WardenError};
    use crate::safety::SafetySignals;
    use crate::tools::adapters::ToolAdapter;
    use crate::workspace::ScanRun;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn manager_with_path(path: &str, adapters: AdapterRegistry) -> ToolExecutionManager {
        let settings = ToolSettings {
            path: Some(path.to_string()),
            ..ToolSettings::default()
        };
        ToolExecutionManager::new(settings, ToolProfiles::builtin(), EnvOverrides::default(), adapters)
    }

    fn empty_path() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[tokio::test]
    async fn missing_binary_and_adapter_yields_mock() {
        let run = tempfile::tempdir().unwrap();
        let bin = empty_path();
        let manager = manager_with_path(&bin.path().to_string_lossy(), AdapterRegistry::new());

        let env = manager
            .run(&ToolInvocation::new("nikto", run.path()).with_target("https://t"), &Authorization::NonDestructiveOnly)
            .await;
        assert_eq!(env.status(), ToolStatus::MockedNoBinary);
        assert_eq!(env.result["mock_output"]["target"], "https://t");
        let on_disk = Envelope::load(&run.path().join(GENERATED_TOOLS_DIR).join("nikto.json")).unwrap();
        assert_eq!(on_disk.status(), ToolStatus::MockedNoBinary);
    }

    #[tokio::test]
    async fn destructive_tool_skipped_without_authorization() {
        let run = tempfile::tempdir().unwrap();
        let manager = manager_with_path(DEFAULT_PATH, AdapterRegistry::with_builtin());
        let env = manager
            .run(&ToolInvocation::new("sqlmap", run.path()), &Authorization::NonDestructiveOnly)
            .await;
        assert_eq!(env.status(), ToolStatus::SkippedBySafety);
        assert_eq!(
            env.meta.reason.as_deref(),
            Some("Destructive operation denied by safety gate: sqlmap is destructive and this is not the destructive phase")
        );
        assert!(env.output_file.unwrap().is_file());
    }

    #[tokio::test]
    async fn gated_authorization_checks_at_invocation() {
        let run = tempfile::tempdir().unwrap();
        let bin = empty_path();
        let manager = manager_with_path(&bin.path().to_string_lossy(), AdapterRegistry::new());

        let closed = SafetyGate::default();
        let env = manager
            .run(&ToolInvocation::new("hydra", run.path()), &Authorization::Gated(&closed))
            .await;
        assert_eq!(env.status(), ToolStatus::SkippedBySafety);
        assert!(env
            .meta
            .reason
            .as_deref()
            .is_some_and(|r| r.contains("denied by safety gate") && r.contains("hydra")));

        let open = SafetyGate::new(SafetySignals {
            destructive_flag: true,
            proof_token: Some("tok".into()),
        });
        let env = manager
            .run(&ToolInvocation::new("hydra", run.path()), &Authorization::Gated(&open))
            .await;
        assert_eq!(env.status(), ToolStatus::MockedNoBinary);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_ran_with_real_rc() {
        let run = tempfile::tempdir().unwrap();
        let manager = manager_with_path(DEFAULT_PATH, AdapterRegistry::new());
        let env = manager
            .run(&ToolInvocation::new("false", run.path()), &Authorization::NonDestructiveOnly)
            .await;
        assert_eq!(env.status(), ToolStatus::Ran);
        assert_eq!(env.result["rc"], json!(1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_records_null_rc() {
        let run = tempfile::tempdir().unwrap();
        let manager = manager_with_path(DEFAULT_PATH, AdapterRegistry::new());
        let inv = ToolInvocation::new("sleep", run.path())
            .with_args(vec!["10".into()])
            .with_timeout(Duration::from_millis(200));
        let env = manager.run(&inv, &Authorization::NonDestructiveOnly).await;
        assert_eq!(env.status(), ToolStatus::Timeout);
        assert_eq!(env.result["rc"], Value::Null);
        assert!(env.result["stderr"]
            .as_str()
            .unwrap()
            .ends_with("Tool sleep timed out after 200ms"));
    }

    struct FixedAdapter {
        name: &'static str,
        output: fn() -> Result<AdapterOutput>,
    }

    #[async_trait]
    impl ToolAdapter for FixedAdapter {
        fn name(&self) -> &str {
            self.name
        }

        fn is_available(&self, _ctx: &AdapterContext) -> bool {
            true
        }

        async fn run(&self, _ctx: &AdapterContext) -> Result<AdapterOutput> {
            (self.output)()
        }
    }

    #[tokio::test]
    async fn adapter_outcomes_are_normalized() {
        let run = tempfile::tempdir().unwrap();
        let mut registry = AdapterRegistry::new();
        let adapters: [(&'static str, fn() -> Result<AdapterOutput>); 3] = [
            ("raw", || Ok(AdapterOutput::Raw(json!({"hits": 3})))),
            ("broken", || Err(WardenError::collaborator("broken", "exploded"))),
            ("renamed", || {
                Ok(AdapterOutput::Envelope(Envelope::new("other", ToolStatus::Ran, json!({}))))
            }),
        ];
        for (name, output) in adapters {
            registry.register(Arc::new(FixedAdapter { name, output })).unwrap();
        }
        let manager = manager_with_path(DEFAULT_PATH, registry);
        let auth = Authorization::NonDestructiveOnly;

        let raw = manager.run(&ToolInvocation::new("raw", run.path()), &auth).await;
        assert_eq!(raw.status(), ToolStatus::AdapterReturn);
        assert_eq!(raw.result["hits"], json!(3));

        let broken = manager.run(&ToolInvocation::new("broken", run.path()), &auth).await;
        assert_eq!(broken.status(), ToolStatus::AdapterError);
        assert!(broken.result["error"].as_str().unwrap().contains("exploded"));

        let renamed = manager.run(&ToolInvocation::new("renamed", run.path()), &auth).await;
        assert_eq!(renamed.tool(), "renamed");
        assert!(run.path().join(GENERATED_TOOLS_DIR).join("renamed.json").is_file());
    }

    #[tokio::test]
    async fn target_defaults_to_first_run_target() {
        let root = tempfile::tempdir().unwrap();
        let scan = ScanRun::establish(
            root.path(),
            vec!["https://first.test".into(), "https://second.test".into()],
            "r1",
            "non-destructive",
        )
        .unwrap();
        let bin = empty_path();
        let manager = manager_with_path(&bin.path().to_string_lossy(), AdapterRegistry::new());
        let env = manager
            .run(&ToolInvocation::new("nuclei", scan.dir()), &Authorization::NonDestructiveOnly)
            .await;
        assert_eq!(env.meta.target.as_deref(), Some("https://first.test"));
    }

    #[test]
    fn timeout_precedence() {
        let mut settings = ToolSettings::default();
        settings.timeouts.insert("nikto".into(), 33);
        let env = EnvOverrides {
            scan_profile: Some(ScanProfile::Thorough),
            ..EnvOverrides::default()
        };
        let manager = ToolExecutionManager::new(settings, ToolProfiles::builtin(), env, AdapterRegistry::new());
        let explicit = ToolInvocation::new("nikto", "/tmp").with_timeout(Duration::from_secs(5));
        assert_eq!(manager.resolve_timeout(&explicit, None), Duration::from_secs(5));

        let overridden = ToolInvocation::new("nikto", "/tmp");
        assert_eq!(manager.resolve_timeout(&overridden, Some("thorough")), Duration::from_secs(33));

        let nmap = ToolInvocation::new("nmap", "/tmp");
        let requested = manager.requested_profile(&nmap);
        assert_eq!(requested.as_deref(), Some("thorough"));
        assert_eq!(manager.resolve_timeout(&nmap, requested.as_deref()), Duration::from_secs(300));
        assert_eq!(manager.resolve_timeout(&nmap, None), Duration::from_secs(60));

        let unknown = ToolInvocation::new("whatweb", "/tmp");
        assert_eq!(manager.resolve_timeout(&unknown, None), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn batch_with_destructive_off_skips_only_destructive_tools() {
        let run = tempfile::tempdir().unwrap();
        let bin = empty_path();
        let manager = manager_with_path(&bin.path().to_string_lossy(), AdapterRegistry::with_builtin());
        let catalog = manager.catalog();
        let envelopes = manager
            .run_batch(&catalog, run.path(), &Authorization::NonDestructiveOnly)
            .await;

        assert_eq!(envelopes.len(), catalog.len());
        for (tool, env) in catalog.iter().zip(&envelopes) {
            if tool.destructive {
                assert_eq!(env.status(), ToolStatus::SkippedBySafety, "{}", tool.name);
            } else {
                assert_ne!(env.status(), ToolStatus::SkippedBySafety, "{}", tool.name);
            }
        }
    }
}
