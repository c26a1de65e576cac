use super::SeverityRule;
use crate::findings::Finding;

/// Routes where a reflected XSS reaches authenticated or payment flows.
const SENSITIVE_ROUTES: &[&str] = &["/login", "/cart", "/user", "/checkout", "/signup"];

/// Snippet markers showing the response was a login wall.
const AUTH_REQUIRED_MARKERS: &[&str] = &["you must login", "please login"];

/// Returns all built-in severity rules, in application order.
pub fn all_rules() -> Vec<Box<dyn SeverityRule>> {
    vec![
        Box::new(SqlErrorRule),
        Box::new(ReflectedXssRule),
        Box::new(ServerInstabilityRule),
        Box::new(AuthWallCap),
    ]
}

/// SQL error disclosure: at least high, critical with proof attached.
pub struct SqlErrorRule;

impl SeverityRule for SqlErrorRule {
    fn id(&self) -> &'static str {
        "sqli-error"
    }

    fn apply(&self, finding: &Finding, score: i64) -> i64 {
        if !finding.kind.to_lowercase().contains("sqli-error") {
            return score;
        }
        if finding.has_proof() {
            score.max(5)
        } else {
            score.max(4)
        }
    }
}

/// Reflected XSS is reliable; on sensitive routes it is critical.
pub struct ReflectedXssRule;

impl SeverityRule for ReflectedXssRule {
    fn id(&self) -> &'static str {
        "xss-reflected"
    }

    fn apply(&self, finding: &Finding, score: i64) -> i64 {
        if !finding.kind.to_lowercase().contains("xss-reflected") {
            return score;
        }
        let target = finding.target.to_lowercase();
        if SENSITIVE_ROUTES.iter().any(|r| target.contains(r)) {
            score.max(5)
        } else {
            score.max(4)
        }
    }
}

/// A clean SQLi probe that still triggered a 5xx tells us the server is
/// unstable under input.
pub struct ServerInstabilityRule;

impl SeverityRule for ServerInstabilityRule {
    fn id(&self) -> &'static str {
        "server-instability"
    }

    fn apply(&self, finding: &Finding, score: i64) -> i64 {
        let unstable = finding.status.is_some_and(|s| s >= 500);
        if unstable && finding.kind.to_lowercase().contains("sqli-none") {
            score.max(3)
        } else {
            score
        }
    }
}

/// A login wall in the response caps the score.
pub struct AuthWallCap;

impl SeverityRule for AuthWallCap {
    fn id(&self) -> &'static str {
        "auth-wall"
    }

    fn apply(&self, finding: &Finding, score: i64) -> i64 {
        let snippet = finding.snippet.as_deref().unwrap_or_default().to_lowercase();
        if AUTH_REQUIRED_MARKERS.iter().any(|m| snippet.contains(m)) {
            score.min(3)
        } else {
            score
        }
    }
}
