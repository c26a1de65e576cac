//! Adaptive target scheduling.
//!
//! The scheduler accumulates findings for a run and turns them into a
//! per-round [`SchedulingStrategy`]: which targets to probe, in what order,
//! how many at once and how aggressively. It performs no I/O; callers feed it
//! findings, availability observations and a system-load gauge.

pub mod profile;
pub mod strategy;
pub mod tables;

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub use profile::TargetProfile;
pub use strategy::{
    next_batch, rank_by_score, timing_recommendations, PayloadIntensity, ProbeConfig, SchedulingStrategy, Timing,
};

use crate::config::SchedulerSettings;
use crate::findings::Finding;

const WAF_ERROR_RATE_THRESHOLD: f64 = 0.3;
const SKIP_ERROR_RATE_THRESHOLD: f64 = 0.5;
const HIGH_LOAD: f64 = 0.8;
const MEDIUM_LOAD: f64 = 0.5;
const LOW_LOAD: f64 = 0.3;
const HIGH_RISK_CRITICALITY: f64 = 4.0;
const HIGH_RISK_SCORE: f64 = 75.0;
const POOR_NETWORK: f64 = 0.8;
const MAX_RISK: f64 = 100.0;

pub struct AdaptiveScheduler {
    settings: SchedulerSettings,
    findings: Vec<Finding>,
    profiles: HashMap<String, TargetProfile>,
    availability: HashMap<String, (bool, Instant)>,
    asset_overrides: HashMap<String, f64>,
    network_factors: HashMap<String, f64>,
    system_load: f64,
}

impl AdaptiveScheduler {
    pub fn new(settings: SchedulerSettings) -> Self {
        let mut scheduler = Self {
            asset_overrides: HashMap::new(),
            findings: Vec::new(),
            profiles: HashMap::new(),
            availability: HashMap::new(),
            network_factors: HashMap::new(),
            system_load: 0.0,
            settings,
        };
        for asset in scheduler.settings.critical_assets.clone() {
            scheduler.set_asset_criticality(&asset, 5.0);
        }
        for (asset, value) in scheduler.settings.asset_values.clone() {
            scheduler.set_asset_criticality(&asset, value);
        }
        scheduler
    }

    /// Record new findings. Cached profiles are invalidated.
    pub fn observe(&mut self, findings: &[Finding]) {
        if findings.is_empty() {
            return;
        }
        self.findings.extend_from_slice(findings);
        self.profiles.clear();
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Caller-supplied load gauge, clamped to 0.0..=1.0.
    pub fn set_system_load(&mut self, load: f64) {
        self.system_load = if load.is_finite() { load.clamp(0.0, 1.0) } else { 0.0 };
    }

    pub fn system_load(&self) -> f64 {
        self.system_load
    }

    /// Operator or collaborator supplied network factor, clamped to 0.5..=2.0.
    /// A non-finite factor resets the target to neutral.
    pub fn set_network_factor(&mut self, target: &str, factor: f64) {
        let factor = if factor.is_finite() { factor.clamp(0.5, 2.0) } else { 1.0 };
        self.network_factors.insert(target.to_string(), factor);
    }

    /// Explicit asset criticality, clamped to 1.0..=5.0.
    pub fn set_asset_criticality(&mut self, target: &str, value: f64) {
        self.asset_overrides.insert(target.to_string(), value.clamp(1.0, 5.0));
        self.profiles.remove(target);
    }

    pub fn record_availability(&mut self, target: &str, available: bool) {
        self.record_availability_at(target, available, Instant::now());
    }

    pub fn record_availability_at(&mut self, target: &str, available: bool, at: Instant) {
        self.availability.insert(target.to_string(), (available, at));
        self.profiles.remove(target);
    }

    /// Cached availability, or `None` when unknown or stale.
    fn cached_availability(&self, target: &str) -> Option<(bool, Instant)> {
        let staleness = Duration::from_secs(self.settings.availability_staleness_secs);
        self.availability
            .get(target)
            .filter(|(_, at)| at.elapsed() <= staleness)
            .copied()
    }

    pub fn is_available(&self, target: &str) -> bool {
        self.cached_availability(target).map(|(up, _)| up).unwrap_or(true)
    }

    fn findings_for(&self, target: &str) -> Vec<&Finding> {
        self.findings.iter().filter(|f| f.target == target).collect()
    }

    pub fn asset_criticality(&self, target: &str) -> f64 {
        self.asset_overrides
            .get(target)
            .copied()
            .unwrap_or_else(|| profile::default_criticality(target))
    }

    pub fn network_factor(&self, target: &str) -> f64 {
        self.network_factors.get(target).copied().unwrap_or(1.0)
    }

    /// Lazily computed, cached profile of `target`.
    pub fn profile(&mut self, target: &str) -> TargetProfile {
        if let Some(cached) = self.profiles.get(target) {
            return cached.clone();
        }
        let mut profile = TargetProfile::build(target, &self.findings_for(target), self.asset_criticality(target));
        if let Some((up, at)) = self.cached_availability(target) {
            profile.availability = Some(up);
            profile.last_checked = Some(at);
        }
        self.profiles.insert(target.to_string(), profile.clone());
        profile
    }

    /// Risk score of `target` in 0..=100.
    pub fn risk_score(&self, target: &str) -> f64 {
        let findings = self.findings_for(target);
        let score = profile::base_risk(&findings)
            * self.asset_criticality(target)
            * profile::exploitability(&findings)
            * profile::business_impact(target)
            * self.network_factor(target);
        score.min(MAX_RISK)
    }

    /// Take the next round out of `pending`: the `size` targets with the
    /// highest risk given everything observed so far.
    pub fn next_round(&self, pending: &mut Vec<String>, size: usize) -> Vec<String> {
        next_batch(pending, size, |t| self.risk_score(t))
    }

    fn overall_error_rate(&self) -> f64 {
        let all: Vec<&Finding> = self.findings.iter().collect();
        profile::error_rate(&all)
    }

    /// Compute the strategy for the next round.
    pub fn strategy(&mut self, targets: &[String]) -> SchedulingStrategy {
        let ranked = rank_by_score(targets, |t| self.risk_score(t));

        let (available, unavailable): (Vec<String>, Vec<String>) =
            ranked.into_iter().partition(|t| self.is_available(t));
        let mut strategy = SchedulingStrategy::new(available, self.settings.max_parallelism);
        if !unavailable.is_empty() {
            strategy
                .adjustments
                .push(format!("Removed {} unavailable target(s)", unavailable.len()));
        }

        let order = strategy.scan_order.clone();
        let waf = order.iter().any(|t| self.profile(t).waf_detected);

        if waf {
            strategy.waf_aware = true;
            strategy.rate_limited = true;
            strategy.parallelism = 1;
            strategy.payload_intensity = PayloadIntensity::Light;
            strategy.timing = Timing::Slow;
            strategy.adjustments.push("WAF detected, scanning sequentially".into());
        } else if self.overall_error_rate() > WAF_ERROR_RATE_THRESHOLD {
            strategy.rate_limited = true;
            strategy.parallelism = 1;
            strategy.timing = Timing::Slow;
            strategy
                .adjustments
                .push("High error rate detected, reducing parallel scans".into());
        } else if self.system_load > HIGH_LOAD {
            strategy.halve_parallelism();
            strategy.rate_limited = true;
            strategy.payload_intensity = PayloadIntensity::Light;
            strategy.timing = Timing::Slow;
            strategy
                .adjustments
                .push("High system load, reducing parallel scans".into());
        } else if self.system_load > MEDIUM_LOAD {
            strategy.reduce_parallelism_by_one();
        } else if self.system_load < LOW_LOAD {
            strategy.payload_intensity = PayloadIntensity::Intensive;
            strategy.timing = Timing::Fast;
        }

        let high_risk = order
            .iter()
            .filter(|t| self.asset_criticality(t) >= HIGH_RISK_CRITICALITY || self.risk_score(t) >= HIGH_RISK_SCORE)
            .count();
        if high_risk > 0 && !waf {
            strategy.payload_intensity = PayloadIntensity::Intensive;
            strategy
                .adjustments
                .push(format!("Prioritizing {high_risk} high-risk target(s)"));
        }

        if !order.is_empty() {
            let avg_network = order.iter().map(|t| self.network_factor(t)).sum::<f64>() / order.len() as f64;
            if avg_network < POOR_NETWORK {
                strategy.rate_limited = true;
                strategy.reduce_parallelism_by_one();
                strategy.timing = Timing::Slow;
                strategy.adjustments.push("Poor network conditions detected".into());
            }
        }

        tracing::debug!(
            targets = strategy.scan_order.len(),
            parallelism = strategy.parallelism,
            intensity = %strategy.payload_intensity,
            waf = strategy.waf_aware,
            "scheduling strategy computed"
        );
        strategy
    }

    /// Realtime gate for one probe against one target.
    pub fn should_scan(&mut self, target: &str, probe_kind: &str, current_findings: &[Finding]) -> bool {
        if self.profile(target).error_rate > SKIP_ERROR_RATE_THRESHOLD {
            return false;
        }
        if tables::contains_any(target, tables::CRITICAL_PATHS) {
            return true;
        }
        let already_critical = current_findings
            .iter()
            .any(|f| f.target == target && f.severity.get() >= 4);
        if already_critical && !tables::HIGH_VALUE_PROBES.contains(&probe_kind) {
            return false;
        }
        if self.system_load > HIGH_LOAD && tables::LOAD_SENSITIVE_PROBES.contains(&probe_kind) {
            return false;
        }
        true
    }

    /// Tuning for one probe kind against one target.
    pub fn probe_config(&mut self, probe_kind: &str, target: &str, current_findings: &[Finding]) -> ProbeConfig {
        let mut config = ProbeConfig::default();
        let profile = self.profile(target);

        if profile.waf_detected {
            config.waf_bypass = true;
            config.rate_limited = true;
            config.payload_intensity = PayloadIntensity::Light;
            config.timeout_secs = 15;
            config.timing = Timing::Slow;
        }
        if profile.framework.is_some() {
            config.framework_specific = true;
            config.payload_intensity = PayloadIntensity::Targeted;
        }

        let relevant: Vec<&Finding> = current_findings
            .iter()
            .filter(|f| f.target == target && f.kind.starts_with(probe_kind))
            .collect();

        if let Some(rules) = tables::probe_rules(probe_kind) {
            let escalate = relevant.iter().any(|f| rules.escalate_on.contains(&f.kind.as_str()));
            let reduce = relevant.iter().any(|f| rules.reduce_on.contains(&f.kind.as_str()));
            if escalate && !reduce {
                config.payload_intensity = PayloadIntensity::Intensive;
                config.retries = 3;
                config.timing = Timing::Fast;
            } else if reduce && !escalate {
                config.payload_intensity = PayloadIntensity::Light;
                config.timeout_secs = 5;
                config.retries = 1;
                config.timing = Timing::Slow;
            }
            config.payload_family = relevant.iter().find_map(|f| {
                rules
                    .payload_families
                    .iter()
                    .find(|(kind, _)| *kind == f.kind)
                    .map(|(_, family)| *family)
            });
        }

        if self.system_load > HIGH_LOAD {
            config.timing = Timing::Slow;
            config.payload_intensity = PayloadIntensity::Light;
        } else if self.system_load < LOW_LOAD {
            config.timing = Timing::Fast;
            config.payload_intensity = PayloadIntensity::Intensive;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::Severity;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn scheduler() -> AdaptiveScheduler {
        AdaptiveScheduler::new(SchedulerSettings::default())
    }

    fn targets(v: &[&str]) -> Vec<String> {
        v.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn riskier_targets_come_first() {
        let mut s = scheduler();
        s.set_system_load(0.4);
        s.observe(&[
            Finding::new("rce", "https://t/c").with_severity(Severity::new(5)),
            Finding::new("banner", "https://t/a").with_severity(Severity::new(2)),
        ]);
        let strategy = s.strategy(&targets(&["https://t/b", "https://t/a", "https://t/c"]));
        assert_eq!(strategy.scan_order, targets(&["https://t/c", "https://t/a", "https://t/b"]));
        assert_eq!(strategy.parallelism, 3);
    }

    #[test]
    fn waf_forces_sequential_light_scanning() {
        let mut s = scheduler();
        s.set_system_load(0.1);
        s.observe(&[Finding::new("headers", "https://t/admin").with_evidence("server: AkamaiGHost")]);
        let strategy = s.strategy(&targets(&["https://t/admin", "https://t/x", "https://t/y"]));
        assert_eq!(strategy.parallelism, 1);
        assert!(strategy.waf_aware && strategy.rate_limited);
        // admin is high-risk, but WAF throttling wins
        assert_eq!(strategy.payload_intensity, PayloadIntensity::Light);
    }

    #[test]
    fn high_error_rate_throttles() {
        let mut s = scheduler();
        s.set_system_load(0.4);
        s.observe(&[
            Finding::new("sqli-error", "https://t/a"),
            Finding::new("ok", "https://t/b"),
        ]);
        let strategy = s.strategy(&targets(&["https://t/a", "https://t/b"]));
        assert_eq!(strategy.parallelism, 1);
        assert_eq!(strategy.timing, Timing::Slow);
    }

    #[test]
    fn load_scaling() {
        let many = targets(&["a", "b", "c", "d", "e", "f"]);
        let mut s = scheduler();
        s.set_system_load(0.9);
        let strategy = s.strategy(&many);
        assert_eq!(strategy.parallelism, 2);
        assert_eq!(strategy.payload_intensity, PayloadIntensity::Light);

        s.set_system_load(0.6);
        assert_eq!(s.strategy(&many).parallelism, 4);

        s.set_system_load(0.1);
        let strategy = s.strategy(&many);
        assert_eq!(strategy.parallelism, 5);
        assert_eq!(strategy.timing, Timing::Fast);
    }

    #[test]
    fn stale_availability_is_ignored() {
        let mut s = scheduler();
        s.set_system_load(0.4);
        s.record_availability("down", false);
        let old = Instant::now()
            .checked_sub(Duration::from_secs(600))
            .unwrap_or_else(Instant::now);
        s.record_availability_at("stale", false, old);
        let strategy = s.strategy(&targets(&["down", "stale", "up"]));
        assert!(!strategy.scan_order.contains(&"down".to_string()));
        assert!(strategy.scan_order.contains(&"up".to_string()));
        assert_eq!(strategy.adjustments[0], "Removed 1 unavailable target(s)");
    }

    #[test]
    fn operator_criticality_and_network_factor() {
        let settings = SchedulerSettings {
            critical_assets: vec!["https://t/plain".into()],
            ..SchedulerSettings::default()
        };
        let mut s = AdaptiveScheduler::new(settings);
        assert_eq!(s.asset_criticality("https://t/plain"), 5.0);
        s.set_asset_criticality("https://t/other", 42.0);
        assert_eq!(s.asset_criticality("https://t/other"), 5.0);

        s.set_system_load(0.4);
        s.set_network_factor("a", 0.1);
        s.set_network_factor("b", 0.5);
        let strategy = s.strategy(&targets(&["a", "b"]));
        assert!(strategy.rate_limited);
        assert_eq!(strategy.parallelism, 1);
    }

    #[test]
    fn non_finite_network_factor_is_neutral() {
        let mut s = scheduler();
        s.set_network_factor("a", 0.7);
        s.set_network_factor("a", f64::NAN);
        assert_eq!(s.network_factor("a"), 1.0);
        s.set_network_factor("b", f64::INFINITY);
        assert_eq!(s.network_factor("b"), 1.0);
        s.set_network_factor("c", f64::NEG_INFINITY);
        assert_eq!(s.network_factor("c"), 1.0);
        assert!(s.risk_score("a").is_finite());
        let strategy = s.strategy(&targets(&["a", "b", "c"]));
        assert!(!strategy.rate_limited);
    }

    #[test]
    fn should_scan_rules() {
        let mut s = scheduler();
        let critical = vec![Finding::new("rce", "https://t/x").with_severity(Severity::new(5))];
        assert!(!s.should_scan("https://t/x", "headers", &critical));
        assert!(s.should_scan("https://t/x", "sqli", &critical));
        assert!(s.should_scan("https://t/admin", "headers", &[]));

        s.set_system_load(0.95);
        assert!(!s.should_scan("https://t/x", "rce", &[]));
        assert!(s.should_scan("https://t/login", "rce", &[]));

        s.observe(&[
            Finding::new("sqli-error", "https://t/admin"),
            Finding::new("xss-error", "https://t/admin"),
            Finding::new("ok", "https://t/admin"),
        ]);
        assert!(!s.should_scan("https://t/admin", "xss", &[]));
    }

    #[test]
    fn probe_config_escalates_and_reduces() {
        let mut s = scheduler();
        s.set_system_load(0.5);
        let blind = vec![Finding::new("sqli-blind", "https://t/q")];
        let config = s.probe_config("sqli", "https://t/q", &blind);
        assert_eq!(config.payload_intensity, PayloadIntensity::Intensive);
        assert_eq!(config.retries, 3);
        assert_eq!(config.payload_family, Some("time-based"));

        let timeouts = vec![Finding::new("sqli-timeout", "https://t/q")];
        let config = s.probe_config("sqli", "https://t/q", &timeouts);
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.timing, Timing::Slow);

        s.observe(&[Finding::new("banner", "https://t/wp-content/x")]);
        let config = s.probe_config("xss", "https://t/wp-content/x", &[]);
        assert!(config.framework_specific);
        assert_eq!(config.payload_intensity, PayloadIntensity::Targeted);
    }

    proptest! {
        #[test]
        fn parallelism_within_bounds(
            n in 0usize..12,
            load in 0.0f64..1.0,
            waf in any::<bool>(),
            errors in 0usize..4,
        ) {
            let mut s = scheduler();
            s.set_system_load(load);
            let list: Vec<String> = (0..n).map(|i| format!("https://t/{i}")).collect();
            if waf && n > 0 {
                s.observe(&[Finding::new("headers", list[0].clone()).with_evidence("imperva")]);
            }
            let errs: Vec<Finding> = (0..errors).map(|_| Finding::new("x-error", "https://t/0")).collect();
            s.observe(&errs);

            let strategy = s.strategy(&list);
            prop_assert!(strategy.parallelism >= 1);
            prop_assert!(strategy.parallelism <= strategy.scan_order.len().max(1));
            if waf && n > 0 {
                prop_assert_eq!(strategy.parallelism, 1);
            }
        }

        #[test]
        fn risk_score_is_capped(sev in 1i64..=5, count in 0usize..40) {
            let mut s = scheduler();
            let findings: Vec<Finding> = (0..count)
                .map(|_| Finding::new("rce", "https://t/admin/payment").with_severity(Severity::new(sev)))
                .collect();
            s.observe(&findings);
            let score = s.risk_score("https://t/admin/payment");
            prop_assert!(score > 0.0 && score <= 100.0);
        }
    }
}
