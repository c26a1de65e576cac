//! Severity normalization.
//!
//! Each finding gets a base score from its confidence label, then every
//! registered [`SeverityRule`] may raise or cap it. Scoring never looks at
//! the finding's current severity, so re-scoring a triaged finding yields
//! the same value.

pub mod builtin;

use crate::findings::{ConfidenceLevel, Finding, Severity};

/// Base score used when the confidence is missing or not a known label.
const DEFAULT_BASE: i64 = 2;

/// A severity rule adjusts a running score for one finding.
pub trait SeverityRule: Send + Sync {
    /// Short identifier for logging.
    fn id(&self) -> &'static str;

    /// Return the adjusted score.
    fn apply(&self, finding: &Finding, score: i64) -> i64;
}

/// Runs all registered severity rules in order.
pub struct TriageEngine {
    rules: Vec<Box<dyn SeverityRule>>,
}

impl TriageEngine {
    /// Create an engine with all built-in rules registered.
    pub fn new() -> Self {
        Self {
            rules: builtin::all_rules(),
        }
    }

    /// Score a single finding into 1..=5.
    pub fn score(&self, finding: &Finding) -> Severity {
        let mut score = base_score(finding);
        for rule in &self.rules {
            let next = rule.apply(finding, score);
            if next != score {
                tracing::trace!(rule = rule.id(), from = score, to = next, kind = %finding.kind, "severity adjusted");
            }
            score = next;
        }
        Severity::new(score.clamp(0, 5))
    }

    /// Assign a severity to every finding in place.
    pub fn triage_all(&self, findings: &mut [Finding]) {
        for finding in findings.iter_mut() {
            finding.severity = self.score(finding);
        }
    }

    /// IDs of the registered rules.
    pub fn rule_ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.id()).collect()
    }
}

impl Default for TriageEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn base_score(finding: &Finding) -> i64 {
    match finding.confidence.as_ref().and_then(|c| c.level()) {
        Some(ConfidenceLevel::Info) => 1,
        Some(ConfidenceLevel::Low) => 2,
        Some(ConfidenceLevel::Medium) => 3,
        Some(ConfidenceLevel::High) => 4,
        Some(ConfidenceLevel::Critical) => 5,
        None => DEFAULT_BASE,
    }
}
