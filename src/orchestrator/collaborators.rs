//! Interfaces to the probes, recon steps and report writers that the
//! orchestrator drives but does not implement.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::findings::Finding;
use crate::scheduler::ProbeConfig;
use crate::workspace::{ScanRun, REPORTS_DIR};

/// File written by [`JsonReportSink`].
pub const FINAL_REPORT: &str = "final_report.json";

/// Reconnaissance steps. Every step defaults to a no-op.
#[async_trait]
pub trait ReconCollaborator: Send + Sync {
    fn name(&self) -> &str;

    async fn passive_recon(&self, _run: &ScanRun) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn active_recon(&self, _run: &ScanRun) -> Result<Value> {
        Ok(Value::Null)
    }

    /// Pages found while crawling.
    async fn crawl(&self, _run: &ScanRun) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// URLs carrying query parameters or forms worth probing.
    async fn discover_params(&self, _run: &ScanRun) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// A non-destructive vulnerability probe run per target URL.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Probe class used for scheduling decisions, e.g. `xss` or `sqli`.
    fn kind(&self) -> &str;

    async fn check(&self, url: &str, outdir: &Path, config: &ProbeConfig) -> Result<Vec<Finding>>;
}

/// A probe that only runs once destructive testing has been authorized.
#[async_trait]
pub trait DestructiveProbe: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, targets: &[String], outdir: &Path) -> Result<Vec<Finding>>;
}

/// Run metadata handed to report sinks.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub run_id: String,
    pub primary_domain: String,
    pub targets: Vec<String>,
    pub mode: String,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

impl ReportMeta {
    pub fn for_run(run: &ScanRun) -> Self {
        Self {
            run_id: run.run_id().to_string(),
            primary_domain: run.primary_domain().to_string(),
            targets: run.targets().to_vec(),
            mode: run.mode().to_string(),
            generated_at: chrono::Utc::now(),
        }
    }
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    fn name(&self) -> &str;

    /// Persist the report and return its path, if it wrote a file.
    async fn write_reports(&self, outdir: &Path, meta: &ReportMeta, findings: &[Finding]) -> Result<Option<PathBuf>>;
}

/// Writes `reports/final_report.json` as `{meta, findings}`.
pub struct JsonReportSink;

#[async_trait]
impl ReportSink for JsonReportSink {
    fn name(&self) -> &str {
        "json"
    }

    async fn write_reports(&self, outdir: &Path, meta: &ReportMeta, findings: &[Finding]) -> Result<Option<PathBuf>> {
        let dir = outdir.join(REPORTS_DIR);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(FINAL_REPORT);
        let body = serde_json::to_string_pretty(&serde_json::json!({
            "meta": meta,
            "findings": findings,
        }))?;
        tokio::fs::write(&path, body).await?;
        Ok(Some(path))
    }
}

/// Optional collaborators, assembled once at startup.
#[derive(Clone)]
pub struct Capabilities {
    pub recon: Option<Arc<dyn ReconCollaborator>>,
    pub probes: Vec<Arc<dyn Probe>>,
    pub destructive_probes: Vec<Arc<dyn DestructiveProbe>>,
    pub report_sinks: Vec<Arc<dyn ReportSink>>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            recon: None,
            probes: Vec::new(),
            destructive_probes: Vec::new(),
            report_sinks: vec![Arc::new(JsonReportSink)],
        }
    }
}

impl Capabilities {
    pub fn with_recon(mut self, recon: Arc<dyn ReconCollaborator>) -> Self {
        self.recon = Some(recon);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn with_destructive_probe(mut self, probe: Arc<dyn DestructiveProbe>) -> Self {
        self.destructive_probes.push(probe);
        self
    }

    pub fn with_report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.report_sinks.push(sink);
        self
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("recon", &self.recon.as_ref().map(|r| r.name().to_string()))
            .field("probes", &self.probes.iter().map(|p| p.kind().to_string()).collect::<Vec<_>>())
            .field(
                "destructive_probes",
                &self.destructive_probes.iter().map(|p| p.name().to_string()).collect::<Vec<_>>(),
            )
            .field("report_sinks", &self.report_sinks.iter().map(|s| s.name().to_string()).collect::<Vec<_>>())
            .finish()
    }
}
