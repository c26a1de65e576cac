//! scan-warden — phase-gated security scan orchestration.
//!
//! Runs a non-destructive assessment of one or more targets, then asks for
//! explicit authorization before any destructive-capable tool or probe runs.
//! External tools execute as sandboxed subprocesses under per-tool timeouts
//! and their outputs are normalized into triaged findings.
//!
//! # Quick Start
//!
//! ```no_run
//! use scanwarden::{scan, Capabilities, ScanOptions};
//!
//! # async fn demo() -> scanwarden::error::Result<()> {
//! let options = ScanOptions::default();
//! let summary = scan(vec!["https://example.com".into()], &options, Capabilities::default()).await?;
//! println!("findings: {}", summary.non_destructive.findings.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod findings;
pub mod orchestrator;
pub mod output;
pub mod safety;
pub mod scheduler;
pub mod tools;
pub mod triage;
pub mod workspace;

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, EnvOverrides};
use error::Result;
use output::OutputFormat;
use safety::SafetyGate;
use scheduler::AdaptiveScheduler;
use tools::ToolExecutionManager;
use workspace::ScanRun;

pub use findings::{Finding, Severity};
pub use orchestrator::{Capabilities, DestructiveDirective, PhaseOrchestrator, RunSummary, StdinPrompt};

/// Mode recorded in `run_meta.json` for new runs.
pub const RUN_MODE: &str = "non-destructive";

/// Options for a scan invocation.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Path to config file (defaults to `.scanwarden.toml` in the working directory).
    pub config_path: Option<PathBuf>,
    /// Directory holding `<domain>/<run_id>/` run directories.
    pub root: PathBuf,
    /// Generated when absent.
    pub run_id: Option<String>,
    /// Remove earlier runs of the primary domain first.
    pub clear_previous: bool,
    pub directive: DestructiveDirective,
    pub env: EnvOverrides,
    /// System load gauge in 0..=1 fed to the scheduler.
    pub system_load: Option<f64>,
    /// Overrides `orchestrator.confirm_timeout_secs`.
    pub confirm_timeout: Option<Duration>,
    /// Output format.
    pub format: OutputFormat,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            root: PathBuf::from("runs"),
            run_id: None,
            clear_previous: false,
            directive: DestructiveDirective::Ask,
            env: EnvOverrides::default(),
            system_load: None,
            confirm_timeout: None,
            format: OutputFormat::Console,
        }
    }
}

/// `<UTC timestamp>-<8 hex chars>`, unique enough for one operator.
pub fn generate_run_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", chrono::Utc::now().format("%Y%m%dT%H%M%SZ"), &suffix[..8])
}

/// Run a complete scan: establish the run directory, run both phases,
/// return the summary.
///
/// Only configuration and run-directory failures are returned as errors.
pub async fn scan(targets: Vec<String>, options: &ScanOptions, capabilities: Capabilities) -> Result<RunSummary> {
    let config_path = options
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(".scanwarden.toml"));
    let config = Config::load(&config_path)?;

    let run_id = options.run_id.clone().unwrap_or_else(generate_run_id);
    if options.clear_previous {
        if let Some(first) = targets.first() {
            let domain = workspace::primary_domain(first);
            let removed = workspace::clear_previous_runs(&options.root, &domain, None)?;
            tracing::info!(domain = %domain, removed, "cleared previous runs");
        }
    }
    let run = ScanRun::establish(&options.root, targets, &run_id, RUN_MODE)?;

    let manager = ToolExecutionManager::from_config(&config, &options.env);
    let mut scheduler = AdaptiveScheduler::new(config.scheduler.clone());
    if let Some(load) = options.system_load {
        scheduler.set_system_load(load);
    }
    let confirm_timeout = options
        .confirm_timeout
        .or(config.orchestrator.confirm_timeout_secs.map(Duration::from_secs));

    let summary = PhaseOrchestrator::new(run, manager, scheduler, SafetyGate::from_env())
        .with_capabilities(capabilities)
        .with_prompt(Box::new(StdinPrompt::new(confirm_timeout)))
        .with_round_size(config.scheduler.round_size)
        .run(options.directive)
        .await;
    Ok(summary)
}

/// Render a run summary in the specified format.
pub fn render_report(summary: &RunSummary, format: OutputFormat) -> Result<String> {
    output::render(summary, format)
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::findings::{Confidence, ConfidenceLevel};
    use crate::orchestrator::Probe;
    use crate::scheduler::ProbeConfig;
    use crate::tools::ToolStatus;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::path::Path;
    use std::sync::Arc;

    struct CannedProbe;

    #[async_trait]
    impl Probe for CannedProbe {
        fn kind(&self) -> &str {
            "xss"
        }

        async fn check(&self, url: &str, _outdir: &Path, _config: &ProbeConfig) -> Result<Vec<Finding>> {
            Ok(vec![
                Finding::new("xss-reflected", format!("{url}/login"))
                    .with_confidence(Confidence::Level(ConfidenceLevel::Medium)),
                Finding::new("sqli-none", format!("{url}/search")).with_status(502),
            ])
        }
    }

    /// Options whose tool PATH is an empty directory, so every tool is mocked.
    fn options(dir: &Path, directive: DestructiveDirective) -> ScanOptions {
        let bin = dir.join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let config_path = dir.join(".scanwarden.toml");
        std::fs::write(&config_path, format!("[tools]\npath = \"{}\"\n", bin.display())).unwrap();
        ScanOptions {
            config_path: Some(config_path),
            root: dir.join("runs"),
            run_id: Some("it".into()),
            directive,
            ..ScanOptions::default()
        }
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn destructive_off_only_skips_destructive_tools() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path(), DestructiveDirective::Skip);
        let summary = scan(vec!["https://example.com".into()], &opts, Capabilities::default())
            .await
            .unwrap();

        assert!(summary.destructive.is_none());
        for env in &summary.non_destructive.envelopes {
            if tools::is_destructive(&env.tool) {
                assert_eq!(env.status, ToolStatus::SkippedBySafety, "{}", env.tool);
            } else {
                assert_eq!(env.status, ToolStatus::MockedNoBinary, "{}", env.tool);
            }
        }
        let sqlmap = read_json(&summary.run_dir.join("generated/tools/sqlmap.json"));
        assert_eq!(sqlmap["meta"]["status"], "skipped_by_safety");
        assert!(!summary.run_dir.join("reports/final_report_with_destructive.json").exists());
    }

    #[tokio::test]
    async fn end_to_end_triage_lands_in_report() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path(), DestructiveDirective::Skip);
        let caps = Capabilities::default().with_probe(Arc::new(CannedProbe));
        let summary = scan(vec!["https://example.test".into()], &opts, caps).await.unwrap();

        let report = read_json(summary.non_destructive.report.as_ref().unwrap());
        let severity_of = |kind: &str| {
            report["findings"]
                .as_array()
                .unwrap()
                .iter()
                .find(|f| f["type"] == kind)
                .map(|f| f["severity"].as_u64().unwrap())
        };
        assert_eq!(severity_of("xss-reflected"), Some(5));
        assert_eq!(severity_of("sqli-none"), Some(3));
        assert_eq!(report["meta"]["run_id"], "it");
    }

    #[tokio::test]
    async fn forced_run_merges_into_destructive_report() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path(), DestructiveDirective::Force);
        let summary = scan(vec!["https://example.com".into()], &opts, Capabilities::default())
            .await
            .unwrap();

        let destructive = summary.destructive.as_ref().unwrap();
        assert!(destructive.errors.is_empty());
        let merged = read_json(&summary.run_dir.join("reports/final_report_with_destructive.json"));
        assert_eq!(merged["meta"]["destructive"]["source_report"], "reports/final_report.json");
        assert!(merged["meta"]["destructive"]["appended_count"].as_u64().unwrap() >= 1);

        let rendered = render_report(&summary, OutputFormat::Console).unwrap();
        assert!(rendered.contains("== destructive =="));
    }
}
