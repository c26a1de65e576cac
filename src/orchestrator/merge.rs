//! Appending destructive-phase findings to the latest written report.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::{Result, WardenError};
use crate::findings::{Finding, EVIDENCE_KEY_LEN};

/// Reports to merge into, most enriched first.
pub const REPORT_PRECEDENCE: &[&str] = &[
    "final_report_with_pocs_map.json",
    "final_report_with_pocs.json",
    "final_report.json",
];

pub const DESTRUCTIVE_REPORT: &str = "final_report_with_destructive.json";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeOutcome {
    pub path: PathBuf,
    pub appended: usize,
    /// Report the merge started from, relative to the run directory.
    pub source_report: Option<String>,
}

/// The first report of [`REPORT_PRECEDENCE`] present in `reports_dir`.
pub fn latest_report(reports_dir: &Path) -> Option<PathBuf> {
    REPORT_PRECEDENCE
        .iter()
        .map(|name| reports_dir.join(name))
        .find(|p| p.is_file())
}

fn value_key(v: &Value) -> (String, String, String) {
    let text = |key: &str| match v.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    (
        text("type"),
        text("target"),
        text("evidence").chars().take(EVIDENCE_KEY_LEN).collect(),
    )
}

/// Merge `new` into the latest report under `run_dir/reports`, writing
/// [`DESTRUCTIVE_REPORT`]. Exact duplicates are not appended. With no
/// existing report the output holds only the new findings.
pub fn merge_destructive(run_dir: &Path, reports_dir: &Path, new: &[Finding]) -> Result<MergeOutcome> {
    std::fs::create_dir_all(reports_dir)?;
    let source = latest_report(reports_dir);

    let loaded = match &source {
        Some(path) => serde_json::from_str::<Value>(&std::fs::read_to_string(path)?)?,
        None => json!({ "findings": [] }),
    };
    let mut root = match loaded {
        Value::Array(items) => json!({ "findings": items }),
        other => other,
    };
    let obj = root
        .as_object_mut()
        .ok_or_else(|| WardenError::Internal("report root is neither an object nor an array".into()))?;

    let findings = obj
        .entry("findings")
        .or_insert_with(|| Value::Array(Vec::new()));
    if !findings.is_array() {
        *findings = Value::Array(Vec::new());
    }
    let mut appended = 0;
    if let Value::Array(list) = findings {
        let mut seen: HashSet<_> = list.iter().map(value_key).collect();
        for finding in new {
            if seen.insert(finding.dedup_key()) {
                list.push(serde_json::to_value(finding)?);
                appended += 1;
            }
        }
    }

    let source_report = source.as_ref().map(|p| {
        p.strip_prefix(run_dir)
            .unwrap_or(p)
            .to_string_lossy()
            .into_owned()
    });
    let meta = obj
        .entry("meta")
        .or_insert_with(|| Value::Object(Map::new()));
    if !meta.is_object() {
        *meta = Value::Object(Map::new());
    }
    if let Value::Object(meta) = meta {
        meta.insert(
            "destructive".into(),
            json!({ "appended_count": appended, "source_report": source_report }),
        );
    }

    let path = reports_dir.join(DESTRUCTIVE_REPORT);
    std::fs::write(&path, serde_json::to_string_pretty(&root)?)?;
    tracing::info!(path = %path.display(), appended, "merged destructive findings");
    Ok(MergeOutcome {
        path,
        appended,
        source_report,
    })
}
