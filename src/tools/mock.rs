//! Deterministic stand-in output for tools that are not installed, so
//! pipelines stay exercisable in CI.

use serde_json::{json, Value};

use super::envelope::{Envelope, ToolStatus};

pub fn mock_output(tool: &str, target: Option<&str>) -> Value {
    let t = target.unwrap_or("<no-target>");
    match tool {
        "sqlmap" => json!({
            "tool": "sqlmap",
            "status": "mock",
            "target": t,
            "vulnerabilities": [
                {"url": format!("{t}/search.php"), "parameter": "q", "payload": "' OR '1'='1", "confidence": 0.8}
            ],
        }),
        "nmap" => json!({
            "tool": "nmap",
            "status": "mock",
            "target": t,
            "hosts": [{"address": t, "ports": [{"port": 80, "state": "open"}]}],
        }),
        "wpscan" => json!({
            "tool": "wpscan",
            "status": "mock",
            "target": t,
            "vulnerable": [{"type": "plugin", "name": "example-plugin", "severity": "high"}],
        }),
        "nuclei" => json!({
            "tool": "nuclei",
            "status": "mock",
            "target": t,
            "matches": [{
                "template-id": "http-missing-security-headers",
                "host": t,
                "info": {"name": "HTTP Missing Security Headers", "severity": "info"},
            }],
        }),
        "nikto" => json!({
            "tool": "nikto",
            "status": "mock",
            "target": t,
            "items": [{"url": "/", "msg": "The anti-clickjacking X-Frame-Options header is not present."}],
        }),
        _ => json!({
            "tool": tool,
            "status": "mock",
            "target": t,
            "message": "no-op mock output",
        }),
    }
}

/// Envelope recorded when neither an adapter nor a binary is available.
pub fn mock_envelope(tool: &str, target: Option<&str>) -> Envelope {
    Envelope::new(
        tool,
        ToolStatus::MockedNoBinary,
        json!({
            "note": format!("{tool} not on PATH; returning mock"),
            "target": target,
            "mock_output": mock_output(tool, target),
        }),
    )
    .with_target(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_is_deterministic() {
        assert_eq!(mock_output("nmap", Some("h")), mock_output("nmap", Some("h")));
        assert_eq!(mock_output("nikto", None)["target"], "<no-target>");
    }

    #[test]
    fn envelope_carries_mock_output() {
        let env = mock_envelope("sqlmap", Some("https://t"));
        assert_eq!(env.status(), ToolStatus::MockedNoBinary);
        assert_eq!(
            env.result["mock_output"]["vulnerabilities"][0]["url"],
            "https://t/search.php"
        );
    }
}
