use std::time::Instant;

use serde::Serialize;

use super::tables::{self, tier_match};
use crate::findings::Finding;

/// Weight of a finding whose producer gave no confidence.
const UNKNOWN_CONFIDENCE_WEIGHT: f64 = 0.5;

/// Derived signals about one target, computed from accumulated findings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetProfile {
    pub target: String,
    pub waf_detected: bool,
    pub framework: Option<&'static str>,
    pub error_rate: f64,
    pub asset_criticality: f64,
    pub availability: Option<bool>,
    #[serde(skip)]
    pub last_checked: Option<Instant>,
}

impl TargetProfile {
    /// Build a profile from the findings recorded for `target`.
    pub fn build(target: &str, findings: &[&Finding], asset_criticality: f64) -> Self {
        let waf_detected = findings
            .iter()
            .any(|f| tables::contains_any(&f.evidence, tables::WAF_SIGNATURES));
        let framework = findings
            .iter()
            .find_map(|f| tier_match(tables::FRAMEWORK_INDICATORS, &f.target));

        Self {
            target: target.to_string(),
            waf_detected,
            framework,
            error_rate: error_rate(findings),
            asset_criticality,
            availability: None,
            last_checked: None,
        }
    }
}

/// Fraction of findings whose type mentions `error`. Zero for no findings.
pub fn error_rate(findings: &[&Finding]) -> f64 {
    if findings.is_empty() {
        return 0.0;
    }
    let errors = findings.iter().filter(|f| f.kind.contains("error")).count();
    errors as f64 / findings.len() as f64
}

/// Severity and confidence weighted base of the risk score.
pub fn base_risk(findings: &[&Finding]) -> f64 {
    let weighted: f64 = findings
        .iter()
        .map(|f| {
            let weight = f
                .confidence
                .as_ref()
                .map(|c| c.weight())
                .unwrap_or(UNKNOWN_CONFIDENCE_WEIGHT);
            f64::from(f.severity.get()) * weight
        })
        .sum();
    let critical = findings.iter().filter(|f| f.severity.get() >= 4).count();
    1.0 + 2.0 * weighted + 5.0 * critical as f64
}

pub fn exploitability(findings: &[&Finding]) -> f64 {
    findings
        .iter()
        .filter_map(|f| tier_match(tables::EXPLOITABILITY, &f.kind))
        .fold(1.0, f64::max)
}

pub fn business_impact(target: &str) -> f64 {
    tier_match(tables::BUSINESS_IMPACT, target).unwrap_or(1.0)
}

pub fn default_criticality(target: &str) -> f64 {
    tier_match(tables::ASSET_CRITICALITY, target).unwrap_or(1.0)
}
