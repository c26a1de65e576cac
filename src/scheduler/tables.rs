//! Declarative pattern tables and the matcher that reads them.
//!
//! Every table is ordered by priority: the first tier with a matching
//! pattern wins.

/// A named or valued tier and its substring patterns.
pub type Tier<T> = (T, &'static [&'static str]);

/// Substrings in finding evidence that reveal a WAF.
pub const WAF_SIGNATURES: &[&str] = &[
    "cloudflare",
    "akamai",
    "imperva",
    "sucuri",
    "incapsula",
    "f5 big-ip",
    "mod_security",
];

pub const FRAMEWORK_INDICATORS: &[Tier<&str>] = &[
    ("wordpress", &["/wp-content/", "/wp-admin/", "/wp-includes/"]),
    ("drupal", &["/sites/default/", "/node/"]),
    ("joomla", &["/components/com_", "/administrator/"]),
    ("laravel", &["laravel_session", "/vendor/laravel/"]),
    ("django", &["csrfmiddlewaretoken", "/static/admin/"]),
];

pub const ASSET_CRITICALITY: &[Tier<f64>] = &[
    (
        5.0,
        &["/admin", "/api", "/payment", "/finance", "/banking", "/user/manage", "/system/config", "/root"],
    ),
    (
        4.0,
        &["/login", "/user", "/account", "/profile", "/settings", "/cart", "/checkout", "/order", "/purchase"],
    ),
    (3.0, &["/dashboard", "/reports", "/analytics", "/search", "/upload", "/download", "/files"]),
    (
        2.0,
        &["/blog", "/news", "/about", "/contact", "/help", "/terms", "/privacy", "/static", "/public"],
    ),
];

pub const EXPLOITABILITY: &[Tier<f64>] = &[
    (2.0, &["rce", "sqli", "command"]),
    (1.5, &["xss", "csrf", "file-inclusion"]),
    (1.2, &["info-disclosure", "weak-crypto"]),
];

pub const BUSINESS_IMPACT: &[Tier<f64>] = &[
    (2.0, &["/payment", "/api", "/admin", "/login", "/user", "/account", "/checkout"]),
    (1.5, &["/dashboard", "/profile", "/settings", "/cart"]),
    (1.2, &["/blog", "/news", "/about", "/contact"]),
];

/// Targets that are always worth probing.
pub const CRITICAL_PATHS: &[&str] = &["/admin", "/login", "/api", "/payment"];

/// Probe kinds allowed to continue on a target that already has a
/// high-severity finding.
pub const HIGH_VALUE_PROBES: &[&str] = &["sqli", "xss", "rce"];

/// Probe kinds suspended under heavy system load.
pub const LOAD_SENSITIVE_PROBES: &[&str] = &["sqli", "rce"];

/// Per-probe adaptation rules: finding types that escalate or reduce the
/// next round, and the payload family suggested by a finding type.
pub struct ProbeRules {
    pub kind: &'static str,
    pub escalate_on: &'static [&'static str],
    pub reduce_on: &'static [&'static str],
    pub payload_families: &'static [(&'static str, &'static str)],
}

pub const PROBE_RULES: &[ProbeRules] = &[
    ProbeRules {
        kind: "sqli",
        escalate_on: &["sqli-error", "sqli-blind"],
        reduce_on: &["sqli-timeout", "sqli-error"],
        payload_families: &[("sqli-error", "error-based"), ("sqli-blind", "time-based"), ("sqli-none", "light")],
    },
    ProbeRules {
        kind: "xss",
        escalate_on: &["xss-reflected", "xss-stored"],
        reduce_on: &["xss-timeout", "xss-error"],
        payload_families: &[("xss-reflected", "reflected"), ("xss-stored", "stored"), ("xss-none", "light")],
    },
];

pub fn probe_rules(kind: &str) -> Option<&'static ProbeRules> {
    PROBE_RULES.iter().find(|r| r.kind == kind)
}

/// Case-insensitive substring test against a pattern list.
pub fn contains_any(haystack: &str, patterns: &[&str]) -> bool {
    let haystack = haystack.to_lowercase();
    patterns.iter().any(|p| haystack.contains(p))
}

/// Value of the first tier with a pattern contained in `haystack`.
pub fn tier_match<T: Copy>(tiers: &[Tier<T>], haystack: &str) -> Option<T> {
    let haystack = haystack.to_lowercase();
    tiers
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| haystack.contains(p)))
        .map(|(value, _)| *value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_tier_wins_over_longer_lower_tier_pattern() {
        assert_eq!(tier_match(ASSET_CRITICALITY, "https://t/api/blog"), Some(5.0));
        assert_eq!(tier_match(ASSET_CRITICALITY, "https://t/USER/manage"), Some(5.0));
        assert_eq!(tier_match(ASSET_CRITICALITY, "https://t/cart"), Some(4.0));
        assert_eq!(tier_match(ASSET_CRITICALITY, "https://t/"), None);
    }

    #[test]
    fn framework_and_waf_tables() {
        assert_eq!(tier_match(FRAMEWORK_INDICATORS, "https://t/wp-content/x.js"), Some("wordpress"));
        assert_eq!(tier_match(FRAMEWORK_INDICATORS, "https://t/components/com_users"), Some("joomla"));
        assert!(contains_any("Server: Cloudflare", WAF_SIGNATURES));
        assert!(!contains_any("Server: nginx", WAF_SIGNATURES));
    }

    #[test]
    fn exploitability_by_finding_type() {
        assert_eq!(tier_match(EXPLOITABILITY, "sqli-error"), Some(2.0));
        assert_eq!(tier_match(EXPLOITABILITY, "xss-reflected"), Some(1.5));
        assert_eq!(tier_match(EXPLOITABILITY, "open-port"), None);
        assert!(probe_rules("sqli").is_some());
        assert!(probe_rules("lfi").is_none());
    }
}
