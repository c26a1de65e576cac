use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadIntensity {
    Light,
    Normal,
    Intensive,
    Targeted,
}

impl std::fmt::Display for PayloadIntensity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Normal => write!(f, "normal"),
            Self::Intensive => write!(f, "intensive"),
            Self::Targeted => write!(f, "targeted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Timing {
    Slow,
    Normal,
    Fast,
}

impl std::fmt::Display for Timing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slow => write!(f, "slow"),
            Self::Normal => write!(f, "normal"),
            Self::Fast => write!(f, "fast"),
        }
    }
}

/// Scheduling decision for one probing round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulingStrategy {
    pub scan_order: Vec<String>,
    /// Always within `1..=max(1, scan_order.len())`.
    pub parallelism: usize,
    pub rate_limited: bool,
    pub waf_aware: bool,
    pub payload_intensity: PayloadIntensity,
    pub timing: Timing,
    pub adjustments: Vec<String>,
}

impl SchedulingStrategy {
    pub(crate) fn new(scan_order: Vec<String>, max_parallelism: usize) -> Self {
        let parallelism = scan_order.len().min(max_parallelism).max(1);
        Self {
            scan_order,
            parallelism,
            rate_limited: false,
            waf_aware: false,
            payload_intensity: PayloadIntensity::Normal,
            timing: Timing::Normal,
            adjustments: Vec::new(),
        }
    }

    pub(crate) fn reduce_parallelism_by_one(&mut self) {
        self.parallelism = self.parallelism.saturating_sub(1).max(1);
    }

    pub(crate) fn halve_parallelism(&mut self) {
        self.parallelism = (self.parallelism / 2).max(1);
    }
}

/// Per-probe tuning for one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeConfig {
    pub timeout_secs: u64,
    pub retries: u32,
    pub payload_intensity: PayloadIntensity,
    /// Payload family suggested by earlier findings, e.g. `time-based`.
    pub payload_family: Option<&'static str>,
    pub rate_limited: bool,
    pub waf_bypass: bool,
    pub framework_specific: bool,
    pub timing: Timing,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            retries: 2,
            payload_intensity: PayloadIntensity::Normal,
            payload_family: None,
            rate_limited: false,
            waf_bypass: false,
            framework_specific: false,
            timing: Timing::Normal,
        }
    }
}

/// Stable sort by descending score. Ties keep input order.
pub fn rank_by_score(targets: &[String], score: impl Fn(&str) -> f64) -> Vec<String> {
    let mut scored: Vec<(f64, &String)> = targets.iter().map(|t| (score(t), t)).collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().map(|(_, t)| t.clone()).collect()
}

/// Remove and return the `size` best-scoring targets of `pending`. The whole
/// pool is ranked on every call, so scores that moved since the previous
/// batch decide the next one.
pub fn next_batch(pending: &mut Vec<String>, size: usize, score: impl Fn(&str) -> f64) -> Vec<String> {
    let mut ranked = rank_by_score(pending, score);
    let rest = ranked.split_off(size.max(1).min(ranked.len()));
    *pending = rest;
    ranked
}

/// Operator-facing hints derived from a strategy.
pub fn timing_recommendations(strategy: &SchedulingStrategy) -> Vec<String> {
    let mut out = Vec::new();
    match strategy.timing {
        Timing::Slow => out.push("Use longer delays between requests to avoid detection".to_string()),
        Timing::Fast => out.push("Aggressive timing is acceptable for faster scanning".to_string()),
        Timing::Normal => {}
    }
    if strategy.rate_limited {
        out.push("Apply strict rate limiting to avoid being blocked".to_string());
    }
    if strategy.waf_aware {
        out.push("Use WAF-aware techniques and payload obfuscation".to_string());
    }
    if strategy.parallelism == 1 {
        out.push("Sequential scanning recommended to minimize impact".to_string());
    } else if strategy.parallelism > 3 {
        out.push("High parallelism in use; monitor targets for instability".to_string());
    }
    out
}
