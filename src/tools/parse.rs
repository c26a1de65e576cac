//! Turn persisted tool envelopes into findings.
//!
//! Each known tool has a parser that reads both its real output and the
//! shape of its mock output. Whatever a parser cannot interpret is wrapped
//! as a generic `external-tool-<name>` finding.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use super::envelope::{Envelope, ToolStatus};
use crate::findings::{Confidence, ConfidenceLevel, Finding, Severity};
use crate::workspace::GENERATED_TOOLS_DIR;

/// Envelope characters kept as evidence for generically wrapped output.
const ENVELOPE_EVIDENCE_LEN: usize = 1500;

/// Evidence kept from one structured record (a nuclei match, a sqlmap hit).
const RECORD_EVIDENCE_LEN: usize = 2000;

static NMAP_OPEN_PORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(\d{1,5})/(tcp|udp)\s+open\s+(\S+)(?:[ \t]+(.*))?$").expect("valid regex")
});

/// `[template-id] [protocol] [severity] url` lines of nuclei's text output.
static NUCLEI_TEXT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\[([^\]]+)\].*?\[(critical|high|medium|low|info)\]\s+(\S+)").expect("valid regex")
});

const SQLMAP_MARKERS: &[&str] = &["is vulnerable", "sql injection", "payload:"];

/// Nikto lines describing the scan itself rather than an issue.
const NIKTO_SCAN_INFO: &[&str] = &[
    "target ip:",
    "target hostname:",
    "target port:",
    "start time:",
    "end time:",
    "host(s) tested",
    "item(s) reported on remote host",
    "ssl info:",
];

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| value.get(k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Severity from a number or a label such as `high` or `Medium`.
fn label_severity(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim().to_ascii_lowercase();
            [("critical", 5), ("high", 4), ("med", 3), ("low", 2), ("info", 1)]
                .iter()
                .find(|(label, _)| s.starts_with(label))
                .map(|(_, sev)| *sev)
        }
        _ => None,
    }
}

/// A JSON document printed on stdout, as `-o json` style flags produce.
fn stdout_document(payload: &Value) -> Option<Value> {
    first_str(payload, &["stdout"])
        .and_then(|out| serde_json::from_str::<Value>(out.trim()).ok())
        .filter(|doc| doc.is_object() || doc.is_array())
}

/// Open ports from nmap's normal output.
pub fn parse_nmap_open_ports(stdout: &str, target: &str) -> Vec<Finding> {
    NMAP_OPEN_PORT
        .captures_iter(stdout)
        .map(|caps| {
            let port: u16 = caps[1].parse().unwrap_or_default();
            let mut finding = Finding::new("open-port", target)
                .with_confidence(Confidence::Level(ConfidenceLevel::Info))
                .with_evidence(caps[0].trim())
                .from_tool("nmap");
            finding.extra.insert("port".into(), json!(port));
            finding.extra.insert("protocol".into(), json!(&caps[2]));
            finding.extra.insert("service".into(), json!(&caps[3]));
            if let Some(version) = caps.get(4).map(|m| m.as_str().trim()).filter(|v| !v.is_empty()) {
                finding.extra.insert("version".into(), json!(version));
            }
            finding
        })
        .collect()
}

/// Open ports from a structured `hosts` list (or host-keyed map), falling
/// back to nmap's normal stdout.
pub fn parse_nmap_result(payload: &Value, target: &str) -> Vec<Finding> {
    let hosts: Vec<(String, &Value)> = match payload.get("hosts") {
        Some(Value::Array(list)) => list
            .iter()
            .map(|h| {
                let addr = first_str(h, &["address", "ip", "host"]).unwrap_or(target);
                (addr.to_string(), h)
            })
            .collect(),
        Some(Value::Object(map)) => map.iter().map(|(addr, h)| (addr.clone(), h)).collect(),
        _ => Vec::new(),
    };

    let mut findings = Vec::new();
    for (addr, host) in hosts {
        let ports = host.get("ports").and_then(Value::as_array).into_iter().flatten();
        for port in ports.filter(|p| p.get("state").and_then(Value::as_str) == Some("open")) {
            let number = port.get("port").cloned().unwrap_or(Value::Null);
            let protocol = first_str(port, &["protocol"]).unwrap_or("tcp");
            let mut finding = Finding::new("open-port", addr.as_str())
                .with_confidence(Confidence::Level(ConfidenceLevel::Info))
                .with_evidence(format!("Port {}/{protocol} open", number.as_u64().unwrap_or_default()))
                .from_tool("nmap");
            finding.extra.insert("port".into(), number);
            finding.extra.insert("protocol".into(), json!(protocol));
            if let Some(service) = first_str(port, &["service"]) {
                finding.extra.insert("service".into(), json!(service));
            }
            findings.push(finding);
        }
    }
    if findings.is_empty() {
        if let Some(stdout) = first_str(payload, &["stdout"]) {
            findings = parse_nmap_open_ports(stdout, target);
        }
    }
    findings
}

/// An injection finding if sqlmap's output reports one.
pub fn parse_sqlmap_output(stdout: &str, target: &str) -> Option<Finding> {
    let line = stdout.lines().find(|line| {
        let lower = line.to_lowercase();
        SQLMAP_MARKERS.iter().any(|m| lower.contains(m))
    })?;
    Some(
        Finding::new("sqli-error", target)
            .with_confidence(Confidence::Level(ConfidenceLevel::Medium))
            .with_evidence(line.trim())
            .from_tool("sqlmap"),
    )
}

/// Injection points from a structured `vulnerabilities` list, falling back
/// to the stdout markers of [`parse_sqlmap_output`].
pub fn parse_sqlmap_result(payload: &Value, target: &str) -> Vec<Finding> {
    let default_target = first_str(payload, &["target"]).unwrap_or(target);
    let listed = payload
        .get("vulnerabilities")
        .or_else(|| payload.get("vulns"))
        .and_then(Value::as_array);

    if let Some(vulns) = listed.filter(|v| !v.is_empty()) {
        return vulns
            .iter()
            .map(|v| {
                let url = first_str(v, &["url", "target", "request"]).unwrap_or(default_target);
                let evidence = first_str(v, &["payload", "evidence"])
                    .map(String::from)
                    .unwrap_or_else(|| truncate(&v.to_string(), RECORD_EVIDENCE_LEN));
                let confidence = match v.get("confidence") {
                    Some(Value::Number(n)) => n.as_f64().map(Confidence::Score),
                    Some(Value::String(s)) => ConfidenceLevel::from_str_lenient(s).map(Confidence::Level),
                    _ => None,
                };
                let mut finding = Finding::new("sqli-external-sqlmap", url)
                    .with_confidence(confidence.unwrap_or(Confidence::Level(ConfidenceLevel::High)))
                    .with_severity(Severity::new(5))
                    .with_evidence(evidence)
                    .from_tool("sqlmap");
                if let Some(param) = first_str(v, &["parameter", "param"]) {
                    finding.extra.insert("parameter".into(), json!(param));
                }
                finding
            })
            .collect();
    }

    first_str(payload, &["stdout"])
        .and_then(|out| parse_sqlmap_output(out, default_target))
        .into_iter()
        .collect()
}

fn nuclei_match(record: &Value, target: &str) -> Finding {
    let info = record.get("info").unwrap_or(&Value::Null);
    let host = first_str(record, &["matched-at", "host", "target"]).unwrap_or(target);
    let severity = label_severity(info.get("severity"))
        .or_else(|| label_severity(record.get("severity")))
        .unwrap_or(3);

    let mut finding = Finding::new("nuclei-issue", host)
        .with_confidence(Confidence::Level(ConfidenceLevel::Medium))
        .with_severity(Severity::new(severity))
        .with_evidence(truncate(&record.to_string(), RECORD_EVIDENCE_LEN))
        .from_tool("nuclei");
    if let Some(id) = first_str(record, &["template-id", "templateID", "template"]) {
        finding.extra.insert("template_id".into(), json!(id));
    }
    if let Some(name) = first_str(info, &["name"]) {
        finding.extra.insert("name".into(), json!(name));
    }
    finding
}

/// Matches from nuclei's JSON-lines output (`-jsonl`), its text output, or
/// a structured `matches` list.
pub fn parse_nuclei_output(payload: &Value, target: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    let stdout = first_str(payload, &["stdout"]).unwrap_or_default();

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<Value>(line) {
            Ok(record) if record.is_object() => findings.push(nuclei_match(&record, target)),
            _ => {
                let Some(caps) = NUCLEI_TEXT_LINE.captures(line) else {
                    continue;
                };
                let mut finding = Finding::new("nuclei-issue", &caps[3])
                    .with_confidence(Confidence::Level(ConfidenceLevel::Low))
                    .with_severity(Severity::new(label_severity(Some(&json!(&caps[2]))).unwrap_or(3)))
                    .with_evidence(truncate(line, ENVELOPE_EVIDENCE_LEN))
                    .from_tool("nuclei");
                finding.extra.insert("template_id".into(), json!(&caps[1]));
                findings.push(finding);
            }
        }
    }

    if findings.is_empty() {
        if let Some(matches) = payload.get("matches").and_then(Value::as_array) {
            findings.extend(matches.iter().filter(|m| m.is_object()).map(|m| nuclei_match(m, target)));
        }
    }
    findings
}

fn nikto_item(item: &Value, target: &str) -> Finding {
    let host = first_str(item, &["host", "target"]).unwrap_or(target);
    let message = first_str(item, &["msg", "description", "message"])
        .map(String::from)
        .unwrap_or_else(|| item.to_string());
    let severity = if label_severity(item.get("severity")).is_some_and(|s| s >= 4) {
        4
    } else {
        3
    };

    let mut finding = Finding::new("nikto-issue", host)
        .with_confidence(Confidence::Level(ConfidenceLevel::Low))
        .with_severity(Severity::new(severity))
        .with_evidence(truncate(&message, RECORD_EVIDENCE_LEN))
        .from_tool("nikto");
    if let Some(path) = first_str(item, &["url", "uri"]) {
        finding.extra.insert("path".into(), json!(path));
    }
    if let Some(id) = item.get("id").filter(|v| !v.is_null()) {
        finding.extra.insert("nikto_id".into(), id.clone());
    }
    finding
}

/// Items in `items`/`findings`/`issues`/`vulnerabilities`, nikto's JSON
/// report on stdout, or `+ ` lines of its text output.
pub fn parse_nikto_output(payload: &Value, target: &str) -> Vec<Finding> {
    fn listed<'a>(doc: &'a Value) -> Option<&'a Vec<Value>> {
        ["items", "findings", "issues", "vulnerabilities"]
            .iter()
            .filter_map(|k| doc.get(k).and_then(Value::as_array))
            .find(|items| !items.is_empty())
    }

    if let Some(items) = listed(payload) {
        return items.iter().map(|it| nikto_item(it, target)).collect();
    }

    if let Some(doc) = stdout_document(payload) {
        let hosts: Vec<&Value> = match &doc {
            Value::Array(hosts) => hosts.iter().collect(),
            other => vec![other],
        };
        return hosts
            .into_iter()
            .flat_map(|host| {
                let host_target = first_str(host, &["host", "target"]).unwrap_or(target);
                listed(host)
                    .into_iter()
                    .flatten()
                    .map(move |it| nikto_item(it, host_target))
            })
            .collect();
    }

    let stdout = first_str(payload, &["stdout"]).unwrap_or_default();
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix("+ "))
        .map(str::trim)
        .filter(|body| {
            let lower = body.to_lowercase();
            !body.is_empty() && !NIKTO_SCAN_INFO.iter().any(|info| lower.contains(info))
        })
        .map(|body| {
            let mut finding = Finding::new("nikto-issue", target)
                .with_confidence(Confidence::Level(ConfidenceLevel::Low))
                .with_severity(Severity::new(3))
                .with_evidence(truncate(body, ENVELOPE_EVIDENCE_LEN))
                .from_tool("nikto");
            if body.starts_with('/') {
                if let Some((path, _)) = body.split_once(": ") {
                    finding.extra.insert("path".into(), json!(path));
                }
            }
            finding
        })
        .collect()
}

fn wp_listed_vuln(vuln: &Value, site: &str) -> Finding {
    let title = first_str(vuln, &["name", "title", "reference"])
        .map(String::from)
        .unwrap_or_else(|| vuln.to_string());
    let mut finding = Finding::new("wp-plugin-vuln", site)
        .with_confidence(Confidence::Level(ConfidenceLevel::Medium))
        .with_severity(Severity::new(label_severity(vuln.get("severity")).unwrap_or(3)))
        .with_evidence(truncate(&title, RECORD_EVIDENCE_LEN))
        .from_tool("wpscan");
    if let Some(component) = first_str(vuln, &["type"]) {
        finding.extra.insert("component".into(), json!(component));
    }
    finding
}

/// Vulnerabilities attached to the core version, themes, and plugins of a
/// `wpscan --format json` report.
fn wp_report_vulns(report: &Value, site: &str) -> Vec<Finding> {
    let mut components: Vec<(String, &Value)> = Vec::new();
    for key in ["version", "main_theme"] {
        if let Some(component) = report.get(key).filter(|c| c.is_object()) {
            components.push((key.to_string(), component));
        }
    }
    for key in ["plugins", "themes"] {
        if let Some(Value::Object(map)) = report.get(key) {
            components.extend(map.iter().map(|(name, c)| (format!("{key}/{name}"), c)));
        }
    }

    let mut findings = Vec::new();
    for (component, entry) in components {
        let vulns = entry.get("vulnerabilities").and_then(Value::as_array).into_iter().flatten();
        for vuln in vulns {
            let title = first_str(vuln, &["title"]).unwrap_or("untitled vulnerability");
            let mut finding = Finding::new("wp-vuln", site)
                .with_confidence(Confidence::Level(ConfidenceLevel::Medium))
                .with_severity(Severity::new(label_severity(vuln.get("severity")).unwrap_or(4)))
                .with_evidence(format!("{component}: {title}"))
                .from_tool("wpscan");
            finding.extra.insert("component".into(), json!(component));
            if let Some(cves) = vuln.pointer("/references/cve").filter(|c| c.is_array()) {
                finding.extra.insert("cve".into(), cves.clone());
            }
            if let Some(fixed) = first_str(vuln, &["fixed_in"]) {
                finding.extra.insert("fixed_in".into(), json!(fixed));
            }
            findings.push(finding);
        }
    }
    findings
}

/// Vulnerabilities from a flat `vulnerable`/`vulnerabilities` list, from a
/// wpscan JSON report, or inferred from text output.
pub fn parse_wpscan_output(payload: &Value, target: &str) -> Vec<Finding> {
    let embedded = stdout_document(payload);
    let doc = embedded.as_ref().unwrap_or(payload);
    let site = first_str(doc, &["target_url", "target", "url"]).unwrap_or(target);

    let listed: Vec<&Value> = match ["vulnerable", "vulnerabilities", "vulns"]
        .iter()
        .find_map(|k| doc.get(k).filter(|v| !v.is_null()))
    {
        Some(Value::Array(list)) => list.iter().collect(),
        Some(Value::Object(by_kind)) => by_kind
            .values()
            .flat_map(|v| match v {
                Value::Array(list) => list.iter().collect::<Vec<_>>(),
                other => vec![other],
            })
            .collect(),
        _ => Vec::new(),
    };
    if !listed.is_empty() {
        return listed.into_iter().map(|v| wp_listed_vuln(v, site)).collect();
    }

    let from_report = wp_report_vulns(doc, site);
    if !from_report.is_empty() || embedded.is_some() {
        return from_report;
    }

    match first_str(payload, &["stdout", "output"]) {
        Some(text) if text.to_lowercase().contains("vulnerable") => vec![Finding::new("wp-vuln-inferred", site)
            .with_confidence(Confidence::Level(ConfidenceLevel::Low))
            .with_severity(Severity::new(3))
            .with_evidence(truncate(text, RECORD_EVIDENCE_LEN))
            .from_tool("wpscan")],
        _ => Vec::new(),
    }
}

/// Collect findings from every envelope under `<run_dir>/generated/tools/`.
///
/// Unreadable envelopes become a low-severity finding rather than an error.
pub fn collect_tool_findings(run_dir: &Path) -> Vec<Finding> {
    let pattern = run_dir.join(GENERATED_TOOLS_DIR).join("*.json");
    let paths = match glob::glob(&pattern.to_string_lossy()) {
        Ok(paths) => paths,
        Err(e) => {
            tracing::warn!(error = %e, "invalid envelope glob");
            return Vec::new();
        }
    };

    let mut findings = Vec::new();
    for path in paths.flatten() {
        let fname = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match Envelope::load(&path) {
            Ok(env) => findings.extend(envelope_findings(&env, &fname)),
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "unreadable tool envelope");
                let mut finding = Finding::new(format!("external-tool-{fname}"), "")
                    .with_confidence(Confidence::Level(ConfidenceLevel::Info))
                    .with_severity(Severity::new(1))
                    .with_evidence(format!("failed to parse tool output: {e}"));
                finding.source.file = Some(fname);
                findings.push(finding);
            }
        }
    }
    findings
}

/// Findings from the tool's own parser, empty for tools without one.
fn tool_findings(tool: &str, payload: &Value, target: &str) -> Vec<Finding> {
    match tool {
        "nmap" => parse_nmap_result(payload, target),
        "sqlmap" => parse_sqlmap_result(payload, target),
        "nuclei" => parse_nuclei_output(payload, target),
        "nikto" => parse_nikto_output(payload, target),
        "wpscan" => parse_wpscan_output(payload, target),
        _ => Vec::new(),
    }
}

fn envelope_findings(env: &Envelope, fname: &str) -> Vec<Finding> {
    let tool = env.tool();
    let target = env
        .meta
        .target
        .clone()
        .or_else(|| env.result.get("target").and_then(Value::as_str).map(String::from))
        .unwrap_or_default();

    if let Some(parsed) = &env.parsed_findings {
        return parsed
            .iter()
            .cloned()
            .map(|mut f| {
                f.source.tool = Some(tool.to_string());
                f.source.file = Some(fname.to_string());
                if f.target.is_empty() {
                    f.target = target.clone();
                }
                f
            })
            .collect();
    }

    if env.status() == ToolStatus::SkippedBySafety {
        return Vec::new();
    }

    // Mocked envelopes carry the stand-in tool output one level down.
    let payload = match env.status() {
        ToolStatus::MockedNoBinary => env.result.get("mock_output").unwrap_or(&env.result),
        _ => &env.result,
    };
    let parsed = tool_findings(tool, payload, &target);
    if !parsed.is_empty() {
        return parsed
            .into_iter()
            .map(|mut f| {
                f.source.file = Some(fname.to_string());
                f
            })
            .collect();
    }

    let rendered = serde_json::to_string(env).unwrap_or_default();
    let mut finding = Finding::new(format!("external-tool-{tool}"), target)
        .with_confidence(Confidence::Level(ConfidenceLevel::Low))
        .with_severity(Severity::new(2))
        .with_evidence(rendered.chars().take(ENVELOPE_EVIDENCE_LEN).collect::<String>())
        .from_tool(tool);
    finding.source.file = Some(fname.to_string());
    vec![finding]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::mock::mock_envelope;
    use pretty_assertions::assert_eq;

    const NMAP_OUT: &str = "\
Starting Nmap 7.94
PORT     STATE    SERVICE VERSION
22/tcp   open     ssh     OpenSSH 8.9p1
80/tcp   open     http
443/tcp  filtered https
";

    const NUCLEI_JSONL: &str = r#"{"template-id":"CVE-2021-44228","info":{"name":"Apache Log4j RCE","severity":"critical"},"type":"http","host":"https://shop.test","matched-at":"https://shop.test/api/login","timestamp":"2024-05-01T10:00:00Z"}
{"template-id":"http-missing-security-headers","info":{"name":"HTTP Missing Security Headers","severity":"info"},"type":"http","host":"https://shop.test","matched-at":"https://shop.test"}
[INF] Templates loaded for current scan: 2
"#;

    const NIKTO_TEXT: &str = "\
- Nikto v2.5.0
---------------------------------------------------------------------------
+ Target IP:          203.0.113.7
+ Target Hostname:    shop.test
+ Start Time:         2024-05-01 10:00:00 (GMT0)
---------------------------------------------------------------------------
+ Server: nginx/1.18.0
+ /: The anti-clickjacking X-Frame-Options header is not present.
+ /admin/: This might be interesting.
+ 7962 requests: 0 error(s) and 3 item(s) reported on remote host
+ End Time:           2024-05-01 10:03:12 (GMT0) (192 seconds)
+ 1 host(s) tested
";

    fn persist(mut env: Envelope, run: &Path) {
        env.persist(&run.join(GENERATED_TOOLS_DIR)).unwrap();
    }

    #[test]
    fn nmap_open_ports_only() {
        let findings = parse_nmap_open_ports(NMAP_OUT, "10.0.0.1");
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].extra["port"], json!(22));
        assert_eq!(findings[0].extra["version"], json!("OpenSSH 8.9p1"));
        assert_eq!(findings[1].extra["service"], json!("http"));
        assert!(!findings[1].extra.contains_key("version"));
    }

    #[test]
    fn sqlmap_marker_detection() {
        let out = "[INFO] testing\nParameter: id (GET)\n    Payload: id=1 AND 1=1\n";
        let f = parse_sqlmap_output(out, "https://t/?id=1").unwrap();
        assert_eq!(f.kind, "sqli-error");
        assert_eq!(f.evidence, "Payload: id=1 AND 1=1");
        assert!(parse_sqlmap_output("all tested parameters do not appear to be injectable", "t").is_none());
    }

    #[test]
    fn sqlmap_structured_vulnerabilities() {
        let result = json!({
            "target": "https://shop.test",
            "vulnerabilities": [
                {"url": "https://shop.test/item.php", "parameter": "id", "payload": "id=1' AND SLEEP(5)-- -", "confidence": 0.9},
                {"param": "q", "evidence": "boolean-based blind"}
            ]
        });
        let findings = parse_sqlmap_result(&result, "fallback");
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].kind, "sqli-external-sqlmap");
        assert_eq!(findings[0].target, "https://shop.test/item.php");
        assert_eq!(findings[0].extra["parameter"], json!("id"));
        assert_eq!(findings[0].confidence, Some(Confidence::Score(0.9)));
        assert_eq!(findings[1].target, "https://shop.test");
        assert_eq!(findings[1].evidence, "boolean-based blind");
        assert!(findings.iter().all(|f| f.severity.get() == 5));

        let text_only = json!({"stdout": "[CRITICAL] parameter 'id' is vulnerable"});
        let findings = parse_sqlmap_result(&text_only, "https://t");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, "sqli-error");
    }

    #[test]
    fn nuclei_json_lines_and_text_output() {
        let findings = parse_nuclei_output(&json!({ "stdout": NUCLEI_JSONL }), "https://shop.test");
        assert_eq!(findings.len(), 2, "log lines are not matches");
        assert_eq!(findings[0].kind, "nuclei-issue");
        assert_eq!(findings[0].target, "https://shop.test/api/login");
        assert_eq!(findings[0].extra["template_id"], json!("CVE-2021-44228"));
        assert_eq!(findings[0].severity.get(), 5);
        assert_eq!(findings[1].severity.get(), 1);

        let text = "[tech-detect:nginx] [http] [info] https://shop.test\n[CVE-2023-1234] [http] [high] https://shop.test/x\n";
        let findings = parse_nuclei_output(&json!({ "stdout": text }), "https://shop.test");
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[1].target, "https://shop.test/x");
        assert_eq!(findings[1].severity.get(), 4);
        assert_eq!(findings[1].extra["template_id"], json!("CVE-2023-1234"));
    }

    #[test]
    fn nuclei_matches_list() {
        let result = json!({"matches": [{"template-id": "exposed-git", "host": "https://t", "severity": "medium"}]});
        let findings = parse_nuclei_output(&result, "fallback");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].target, "https://t");
        assert_eq!(findings[0].severity.get(), 3);
    }

    #[test]
    fn nikto_items_json_report_and_text() {
        let items = json!({"items": [
            {"url": "/admin/", "msg": "Admin login page found.", "severity": "high"},
            {"host": "https://other.test", "description": "Directory indexing found."}
        ]});
        let findings = parse_nikto_output(&items, "https://shop.test");
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity.get(), 4);
        assert_eq!(findings[0].extra["path"], json!("/admin/"));
        assert_eq!(findings[0].target, "https://shop.test");
        assert_eq!(findings[1].target, "https://other.test");
        assert_eq!(findings[1].severity.get(), 3);

        let report = json!([{
            "host": "shop.test", "ip": "203.0.113.7", "port": "443",
            "vulnerabilities": [{"id": "999986", "method": "GET", "url": "/", "msg": "X-Frame-Options header is not present."}]
        }]);
        let findings = parse_nikto_output(&json!({ "stdout": report.to_string() }), "https://shop.test");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].target, "shop.test");
        assert_eq!(findings[0].extra["nikto_id"], json!("999986"));

        let findings = parse_nikto_output(&json!({ "stdout": NIKTO_TEXT }), "https://shop.test");
        let evidence: Vec<&str> = findings.iter().map(|f| f.evidence.as_str()).collect();
        assert_eq!(
            evidence,
            vec![
                "Server: nginx/1.18.0",
                "/: The anti-clickjacking X-Frame-Options header is not present.",
                "/admin/: This might be interesting.",
            ]
        );
        assert_eq!(findings[2].extra["path"], json!("/admin/"));
    }

    #[test]
    fn wpscan_flat_list_and_json_report() {
        let flat = json!({"target": "https://blog.test", "vulnerable": [{"type": "plugin", "name": "example-plugin", "severity": "high"}]});
        let findings = parse_wpscan_output(&flat, "fallback");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, "wp-plugin-vuln");
        assert_eq!(findings[0].target, "https://blog.test");
        assert_eq!(findings[0].severity.get(), 4);
        assert_eq!(findings[0].extra["component"], json!("plugin"));

        let report = json!({
            "target_url": "https://blog.test/",
            "version": {"number": "5.8", "vulnerabilities": [
                {"title": "WordPress < 5.8.3 - SQL Injection via WP_Query", "fixed_in": "5.8.3", "references": {"cve": ["2022-21661"]}}
            ]},
            "plugins": {
                "contact-form-7": {"vulnerabilities": [{"title": "Contact Form 7 < 5.3.2 - Unrestricted File Upload"}]},
                "akismet": {"vulnerabilities": []}
            }
        });
        let findings = parse_wpscan_output(&json!({ "stdout": report.to_string() }), "fallback");
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.kind == "wp-vuln" && f.target == "https://blog.test/"));
        assert_eq!(findings[0].extra["cve"], json!(["2022-21661"]));
        assert_eq!(findings[0].extra["fixed_in"], json!("5.8.3"));
        assert_eq!(findings[1].extra["component"], json!("plugins/contact-form-7"));

        let clean = json!({"target_url": "https://blog.test/", "plugins": {}});
        assert!(parse_wpscan_output(&json!({ "stdout": clean.to_string() }), "t").is_empty());

        let text = json!({"stdout": "[!] The version is vulnerable to 3 issues"});
        assert_eq!(parse_wpscan_output(&text, "https://blog.test")[0].kind, "wp-vuln-inferred");
    }

    #[test]
    fn mocked_envelopes_use_their_stand_in_output() {
        let run = tempfile::tempdir().unwrap();
        for tool in ["sqlmap", "wpscan", "nmap", "nuclei", "nikto"] {
            persist(mock_envelope(tool, Some("https://shop.test")), run.path());
        }
        let findings = collect_tool_findings(run.path());
        let kind_of = |tool: &str| {
            findings
                .iter()
                .find(|f| f.source.tool.as_deref() == Some(tool))
                .map(|f| f.kind.as_str())
        };
        assert_eq!(kind_of("sqlmap"), Some("sqli-external-sqlmap"));
        assert_eq!(kind_of("wpscan"), Some("wp-plugin-vuln"));
        assert_eq!(kind_of("nmap"), Some("open-port"));
        assert_eq!(kind_of("nuclei"), Some("nuclei-issue"));
        assert_eq!(kind_of("nikto"), Some("nikto-issue"));
        assert!(findings.iter().all(|f| f.source.file.is_some()));
    }

    #[test]
    fn collects_parsed_generic_and_broken_envelopes() {
        let run = tempfile::tempdir().unwrap();

        let mut with_parsed = Envelope::new("custom", ToolStatus::AdapterReturn, json!({}));
        with_parsed.parsed_findings = Some(vec![Finding::new("weak-cipher", "https://t")]);
        persist(with_parsed, run.path());

        persist(
            Envelope::new("nikto", ToolStatus::Ran, json!({"rc": 0, "stdout": "+ Server: nginx"}))
                .with_target(Some("https://t")),
            run.path(),
        );
        persist(
            Envelope::new("medusa", ToolStatus::Ran, json!({"rc": 1, "stdout": "no route"})).with_target(Some("https://t")),
            run.path(),
        );
        persist(Envelope::skipped("sqlmap", "destructive"), run.path());

        std::fs::write(run.path().join(GENERATED_TOOLS_DIR).join("garbage.json"), "{oops").unwrap();

        let mut findings = collect_tool_findings(run.path());
        findings.sort_by(|a, b| a.kind.cmp(&b.kind));
        let kinds: Vec<&str> = findings.iter().map(|f| f.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec!["external-tool-garbage.json", "external-tool-medusa", "nikto-issue", "weak-cipher"]
        );
        assert_eq!(findings[0].severity.get(), 1);
        assert_eq!(findings[1].severity.get(), 2);
        assert_eq!(findings[1].target, "https://t");
        assert!(findings[1].evidence.chars().count() <= ENVELOPE_EVIDENCE_LEN);
        assert_eq!(findings[2].target, "https://t");
        assert_eq!(findings[2].source.file.as_deref(), Some("nikto.json"));
        assert_eq!(findings[3].source.tool.as_deref(), Some("custom"));
    }

    #[test]
    fn nmap_stdout_is_expanded_into_ports() {
        let run = tempfile::tempdir().unwrap();
        persist(
            Envelope::new("nmap", ToolStatus::Ran, json!({"rc": 0, "stdout": NMAP_OUT})).with_target(Some("10.0.0.1")),
            run.path(),
        );
        let findings = collect_tool_findings(run.path());
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.kind == "open-port" && f.target == "10.0.0.1"));
    }

    #[test]
    fn nmap_structured_hosts() {
        let result = json!({"hosts": [{"address": "10.0.0.2", "ports": [
            {"port": 443, "state": "open", "service": "https"},
            {"port": 25, "state": "closed"}
        ]}]});
        let findings = parse_nmap_result(&result, "fallback");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].target, "10.0.0.2");
        assert_eq!(findings[0].evidence, "Port 443/tcp open");
        assert_eq!(findings[0].extra["service"], json!("https"));
    }
}
