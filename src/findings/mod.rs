//! Normalized finding model shared by probes, tool parsers, triage, and
//! reporting.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Number of evidence characters that take part in duplicate detection.
pub const EVIDENCE_KEY_LEN: usize = 200;

/// A normalized security finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Finding type, e.g. `sqli-error` or `xss-reflected`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Host or URL the finding was observed on.
    #[serde(default)]
    pub target: String,
    /// Triage severity, always within 1..=5.
    #[serde(default)]
    pub severity: Severity,
    /// How certain the producer is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    /// Evidence text. Non-string evidence is kept as its JSON rendering.
    #[serde(default, deserialize_with = "evidence_text")]
    pub evidence: String,
    /// HTTP status observed by the probe, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Response snippet captured by the probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    /// Proof attached by the probe (URL, payload, PoC reference).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,
    /// Producer of the finding.
    #[serde(default)]
    pub source: FindingSource,
    /// Derived fields added by collaborators (AI annotations, CVE ids, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Where a finding came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindingSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Finding {
    pub fn new(kind: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            target: target.into(),
            severity: Severity::default(),
            confidence: None,
            evidence: String::new(),
            status: None,
            snippet: None,
            proof: None,
            source: FindingSource::default(),
            extra: Map::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = evidence.into();
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn from_tool(mut self, tool: impl Into<String>) -> Self {
        self.source.tool = Some(tool.into());
        self
    }

    /// Whether concrete evidence or proof is attached.
    pub fn has_proof(&self) -> bool {
        !self.evidence.trim().is_empty()
            || self.proof.as_deref().is_some_and(|p| !p.trim().is_empty())
            || self
                .extra
                .get("proof_used_url")
                .is_some_and(|v| !v.is_null())
    }

    /// Key used to avoid appending exact duplicates when merging reports.
    pub fn dedup_key(&self) -> (String, String, String) {
        (
            self.kind.clone(),
            self.target.clone(),
            self.evidence.chars().take(EVIDENCE_KEY_LEN).collect(),
        )
    }
}

/// Integer severity clamped to 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "u8")]
pub struct Severity(u8);

impl Severity {
    pub const MIN: Severity = Severity(1);
    pub const MAX: Severity = Severity(5);

    /// Build a severity, clamping out-of-range values into 1..=5.
    pub fn new(value: i64) -> Self {
        Self(value.clamp(1, 5) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            1 => "info",
            2 => "low",
            3 => "medium",
            4 => "high",
            _ => "critical",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::MIN
    }
}

impl From<i64> for Severity {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl From<Severity> for u8 {
    fn from(value: Severity) -> Self {
        value.0
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Confidence as reported by a producer: a label, a score, or something
/// we don't recognise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Confidence {
    Level(ConfidenceLevel),
    Score(f64),
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl ConfidenceLevel {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "info" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl Confidence {
    /// Label view of this confidence, if it names one.
    pub fn level(&self) -> Option<ConfidenceLevel> {
        match self {
            Self::Level(level) => Some(*level),
            Self::Other(s) => ConfidenceLevel::from_str_lenient(s),
            Self::Score(_) => None,
        }
    }

    /// Weight in [0, 1] used when combining confidence with severity.
    pub fn weight(&self) -> f64 {
        match self {
            Self::Score(s) if s.is_finite() => s.clamp(0.0, 1.0),
            Self::Score(_) => 0.5,
            _ => match self.level() {
                Some(ConfidenceLevel::Info) => 0.2,
                Some(ConfidenceLevel::Low) => 0.4,
                Some(ConfidenceLevel::Medium) => 0.6,
                Some(ConfidenceLevel::High) => 0.8,
                Some(ConfidenceLevel::Critical) => 1.0,
                None => 0.5,
            },
        }
    }
}

impl From<ConfidenceLevel> for Confidence {
    fn from(level: ConfidenceLevel) -> Self {
        Self::Level(level)
    }
}

fn evidence_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}
