//! Phase state machine.
//!
//! A run always completes a non-destructive phase first. Destructive tools
//! and probes only run afterwards, and only when the operator skipped
//! nothing and either forced the phase or approved it at the prompt. A
//! failure in the destructive phase is recorded in the summary and never
//! touches the non-destructive output.

pub mod collaborators;
pub mod merge;
pub mod prompt;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;

pub use collaborators::{Capabilities, DestructiveProbe, JsonReportSink, Probe, ReconCollaborator, ReportMeta, ReportSink};
pub use merge::MergeOutcome;
pub use prompt::{ConfirmationPrompt, StdinPrompt};

use crate::findings::Finding;
use crate::safety::SafetyGate;
use crate::scheduler::{AdaptiveScheduler, ProbeConfig};
use crate::tools::parse::collect_tool_findings;
use crate::tools::{Authorization, Envelope, ToolExecutionManager, ToolStatus};
use crate::triage::TriageEngine;
use crate::workspace::ScanRun;

const DEFAULT_ROUND_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    NonDestructiveRunning,
    AwaitingConfirmation,
    DestructiveRunning,
    DestructiveSkipped,
    Complete,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::NonDestructiveRunning => "non_destructive_running",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::DestructiveRunning => "destructive_running",
            Self::DestructiveSkipped => "destructive_skipped",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

/// How the destructive decision is made once the first phase completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestructiveDirective {
    Skip,
    Force,
    Ask,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseTransition {
    pub phase: Phase,
    pub at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvelopeRecord {
    pub tool: String,
    pub status: ToolStatus,
}

impl From<&Envelope> for EnvelopeRecord {
    fn from(env: &Envelope) -> Self {
        Self {
            tool: env.tool().to_string(),
            status: env.status(),
        }
    }
}

/// Outcome of one phase.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PhaseSummary {
    pub findings: Vec<Finding>,
    pub envelopes: Vec<EnvelopeRecord>,
    pub rounds: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeOutcome>,
    /// Collaborator and report failures that were logged and skipped.
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub non_destructive: PhaseSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destructive: Option<PhaseSummary>,
    /// Why the destructive phase ran or was skipped.
    pub decision: String,
    pub phases: Vec<PhaseTransition>,
}

pub struct PhaseOrchestrator {
    run: ScanRun,
    manager: ToolExecutionManager,
    scheduler: AdaptiveScheduler,
    triage: TriageEngine,
    gate: SafetyGate,
    capabilities: Capabilities,
    prompt: Box<dyn ConfirmationPrompt>,
    round_size: usize,
    phase: Phase,
    history: Vec<PhaseTransition>,
}

impl PhaseOrchestrator {
    pub fn new(run: ScanRun, manager: ToolExecutionManager, scheduler: AdaptiveScheduler, gate: SafetyGate) -> Self {
        Self {
            run,
            manager,
            scheduler,
            triage: TriageEngine::new(),
            gate,
            capabilities: Capabilities::default(),
            prompt: Box::new(StdinPrompt::default()),
            round_size: DEFAULT_ROUND_SIZE,
            phase: Phase::Init,
            history: vec![PhaseTransition {
                phase: Phase::Init,
                at: chrono::Utc::now(),
            }],
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_prompt(mut self, prompt: Box<dyn ConfirmationPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_round_size(mut self, round_size: usize) -> Self {
        self.round_size = round_size.max(1);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn run_dir(&self) -> &std::path::Path {
        self.run.dir()
    }

    pub fn scheduler_mut(&mut self) -> &mut AdaptiveScheduler {
        &mut self.scheduler
    }

    fn transition(&mut self, phase: Phase) {
        tracing::info!(from = %self.phase, to = %phase, run_id = %self.run.run_id(), "phase transition");
        self.phase = phase;
        self.history.push(PhaseTransition {
            phase,
            at: chrono::Utc::now(),
        });
    }

    /// Drive the run to completion.
    pub async fn run(mut self, directive: DestructiveDirective) -> RunSummary {
        self.transition(Phase::NonDestructiveRunning);
        let non_destructive = self.non_destructive_phase().await;

        self.transition(Phase::AwaitingConfirmation);
        let (authorization, decision) = self.decide(directive).await;

        let destructive = match authorization {
            Some(auth) => {
                self.transition(Phase::DestructiveRunning);
                Some(self.destructive_phase(&auth).await)
            }
            None => {
                self.transition(Phase::DestructiveSkipped);
                None
            }
        };

        self.transition(Phase::Complete);
        RunSummary {
            run_id: self.run.run_id().to_string(),
            run_dir: self.run.dir().to_path_buf(),
            non_destructive,
            destructive,
            decision,
            phases: self.history,
        }
    }

    async fn non_destructive_phase(&mut self) -> PhaseSummary {
        let mut summary = PhaseSummary::default();
        let discovered = self.recon(&mut summary).await;

        let catalog = self.manager.catalog();
        let envelopes = self
            .manager
            .run_batch(&catalog, self.run.dir(), &Authorization::NonDestructiveOnly)
            .await;
        summary.envelopes = envelopes.iter().map(EnvelopeRecord::from).collect();

        let mut tool_findings = collect_tool_findings(self.run.dir());
        self.triage.triage_all(&mut tool_findings);
        self.scheduler.observe(&tool_findings);
        summary.findings = tool_findings;

        let mut seen = HashSet::new();
        let mut pending: Vec<String> = self
            .run
            .targets()
            .iter()
            .cloned()
            .chain(discovered)
            .filter(|t| seen.insert(t.clone()))
            .collect();

        if !self.capabilities.probes.is_empty() {
            while !pending.is_empty() {
                let round = self.scheduler.next_round(&mut pending, self.round_size);
                self.probe_round(&round, &mut summary).await;
            }
        }

        self.triage.triage_all(&mut summary.findings);
        self.write_reports(&mut summary).await;
        tracing::info!(
            findings = summary.findings.len(),
            rounds = summary.rounds,
            errors = summary.errors.len(),
            "non-destructive phase complete"
        );
        summary
    }

    /// Run the recon collaborator. Returns discovered parameter URLs.
    async fn recon(&mut self, summary: &mut PhaseSummary) -> Vec<String> {
        let Some(recon) = self.capabilities.recon.clone() else {
            return Vec::new();
        };
        let name = recon.name().to_string();

        for (step, result) in [
            ("passive_recon", recon.passive_recon(&self.run).await),
            ("active_recon", recon.active_recon(&self.run).await),
        ] {
            if let Err(e) = result {
                tracing::warn!(collaborator = %name, step, error = %e, "recon step failed");
                summary.errors.push(format!("{name}.{step}: {e}"));
            }
        }
        match recon.crawl(&self.run).await {
            Ok(pages) => tracing::info!(collaborator = %name, pages = pages.len(), "crawl finished"),
            Err(e) => {
                tracing::warn!(collaborator = %name, error = %e, "crawl failed");
                summary.errors.push(format!("{name}.crawl: {e}"));
            }
        }
        match recon.discover_params(&self.run).await {
            Ok(urls) => urls,
            Err(e) => {
                tracing::warn!(collaborator = %name, error = %e, "parameter discovery failed");
                summary.errors.push(format!("{name}.discover_params: {e}"));
                Vec::new()
            }
        }
    }

    /// One scheduling round. Parallelism is fixed for the round's dispatch.
    async fn probe_round(&mut self, round: &[String], summary: &mut PhaseSummary) {
        let strategy = self.scheduler.strategy(round);
        summary.rounds += 1;
        tracing::info!(
            round = summary.rounds,
            targets = strategy.scan_order.len(),
            parallelism = strategy.parallelism,
            adjustments = ?strategy.adjustments,
            "dispatching probe round"
        );

        let mut jobs: Vec<(Arc<dyn Probe>, String, ProbeConfig)> = Vec::new();
        for target in &strategy.scan_order {
            for probe in &self.capabilities.probes {
                let kind = probe.kind();
                if !self.scheduler.should_scan(target, kind, &summary.findings) {
                    tracing::debug!(target = %target, probe = kind, "probe skipped by scheduler");
                    continue;
                }
                let config = self.scheduler.probe_config(kind, target, &summary.findings);
                jobs.push((Arc::clone(probe), target.clone(), config));
            }
        }

        let semaphore = Semaphore::new(strategy.parallelism);
        let outdir = self.run.dir().to_path_buf();
        let results = join_all(jobs.iter().map(|(probe, target, config)| {
            let semaphore = &semaphore;
            let outdir = &outdir;
            async move {
                let _permit = semaphore.acquire().await.ok();
                probe.check(target, outdir, config).await
            }
        }))
        .await;

        let mut reached: HashMap<&str, bool> = HashMap::new();
        let mut fresh = Vec::new();
        for ((probe, target, _), result) in jobs.iter().zip(results) {
            let ok = match result {
                Ok(found) => {
                    fresh.extend(found);
                    true
                }
                Err(e) => {
                    tracing::warn!(probe = probe.kind(), target = %target, error = %e, "probe failed");
                    summary.errors.push(format!("{}@{target}: {e}", probe.kind()));
                    false
                }
            };
            *reached.entry(target.as_str()).or_insert(false) |= ok;
        }
        for (target, ok) in reached {
            self.scheduler.record_availability(target, ok);
        }

        self.triage.triage_all(&mut fresh);
        self.scheduler.observe(&fresh);
        summary.findings.extend(fresh);
    }

    async fn write_reports(&self, summary: &mut PhaseSummary) {
        let meta = ReportMeta::for_run(&self.run);
        for sink in &self.capabilities.report_sinks {
            match sink.write_reports(self.run.dir(), &meta, &summary.findings).await {
                Ok(Some(path)) => {
                    summary.report.get_or_insert(path);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(sink = sink.name(), error = %e, "report sink failed");
                    summary.errors.push(format!("{}: {e}", sink.name()));
                }
            }
        }
    }

    async fn decide(&self, directive: DestructiveDirective) -> (Option<Authorization<'static>>, String) {
        let gate_allows = self.gate.is_destructive_allowed(self.run.dir());
        tracing::info!(gate_allows, directive = ?directive, "destructive decision");

        match directive {
            DestructiveDirective::Skip => (None, "skip directive".to_string()),
            DestructiveDirective::Force => {
                tracing::warn!("destructive phase forced; skipping confirmation");
                (Some(Authorization::operator("force directive")), "force directive".to_string())
            }
            DestructiveDirective::Ask => match self.prompt.ask(prompt::CONFIRMATION_QUESTION).await {
                Ok(answer) if prompt::is_affirmative(&answer) => {
                    tracing::warn!("operator approved destructive tests interactively");
                    (
                        Some(Authorization::operator("interactive approval")),
                        "interactive approval".to_string(),
                    )
                }
                Ok(_) => {
                    tracing::info!("operator declined destructive tests");
                    (None, "operator declined".to_string())
                }
                Err(e) => {
                    tracing::warn!(error = %e, "no confirmation received; skipping destructive phase");
                    (None, format!("no confirmation: {e}"))
                }
            },
        }
    }

    async fn destructive_phase(&mut self, auth: &Authorization<'_>) -> PhaseSummary {
        let mut summary = PhaseSummary::default();

        let catalog = self.manager.catalog();
        let envelopes = self.manager.run_batch(&catalog, self.run.dir(), auth).await;
        summary.envelopes = envelopes.iter().map(EnvelopeRecord::from).collect();

        let mut findings = collect_tool_findings(self.run.dir());
        let outdir = self.run.dir().to_path_buf();
        let targets = self.run.targets().to_vec();
        for probe in &self.capabilities.destructive_probes {
            match probe.run(&targets, &outdir).await {
                Ok(found) => findings.extend(found),
                Err(e) => {
                    tracing::warn!(probe = probe.name(), error = %e, "destructive probe failed");
                    summary.errors.push(format!("{}: {e}", probe.name()));
                }
            }
        }
        self.triage.triage_all(&mut findings);
        self.scheduler.observe(&findings);

        match merge::merge_destructive(self.run.dir(), &self.run.reports_dir(), &findings) {
            Ok(outcome) => {
                summary.report = Some(outcome.path.clone());
                summary.merge = Some(outcome);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to merge destructive findings");
                summary.errors.push(format!("merge: {e}"));
            }
        }
        summary.findings = findings;
        summary
    }
}
