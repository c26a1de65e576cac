use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::process::{ProcessOutcome, ProcessResult};
use crate::error::Result;
use crate::findings::Finding;

/// Outcome of one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ran,
    Error,
    Timeout,
    MockedNoBinary,
    AdapterError,
    AdapterReturn,
    SkippedBySafety,
}

impl ToolStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ran => "ran",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::MockedNoBinary => "mocked_no_binary",
            Self::AdapterError => "adapter_error",
            Self::AdapterReturn => "adapter_return",
            Self::SkippedBySafety => "skipped_by_safety",
        }
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    pub tool: String,
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Why the tool was not run, for skipped envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The persisted record of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub meta: EnvelopeMeta,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_findings: Option<Vec<Finding>>,
    /// Where the envelope was written. Not part of the file itself.
    #[serde(skip)]
    pub output_file: Option<PathBuf>,
}

impl Envelope {
    pub fn new(tool: impl Into<String>, status: ToolStatus, result: Value) -> Self {
        Self {
            meta: EnvelopeMeta {
                tool: tool.into(),
                status,
                target: None,
                reason: None,
            },
            result,
            parsed_findings: None,
            output_file: None,
        }
    }

    pub fn with_target(mut self, target: Option<&str>) -> Self {
        self.meta.target = target.map(String::from);
        self
    }

    pub fn skipped(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut env = Self::new(tool, ToolStatus::SkippedBySafety, json!({}));
        env.meta.reason = Some(reason.into());
        env
    }

    pub fn adapter_error(tool: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::new(tool, ToolStatus::AdapterError, json!({ "error": error.to_string() }))
    }

    /// Map a finished subprocess to an envelope.
    pub fn from_process(tool: impl Into<String>, proc: &ProcessResult) -> Self {
        let status = match proc.outcome {
            ProcessOutcome::Exited => ToolStatus::Ran,
            ProcessOutcome::TimedOut => ToolStatus::Timeout,
            ProcessOutcome::SpawnFailed => ToolStatus::Error,
        };
        Self::new(
            tool,
            status,
            json!({
                "cmd": proc.cmd,
                "rc": proc.rc,
                "stdout": proc.stdout,
                "stderr": proc.stderr,
            }),
        )
    }

    pub fn tool(&self) -> &str {
        &self.meta.tool
    }

    pub fn status(&self) -> ToolStatus {
        self.meta.status
    }

    /// Captured stdout, for envelopes produced by a subprocess.
    pub fn stdout(&self) -> Option<&str> {
        self.result.get("stdout").and_then(Value::as_str)
    }

    /// Write the envelope atomically to `<tools_dir>/<tool>.json`.
    pub fn persist(&mut self, tools_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(tools_dir)?;
        let path = envelope_path(tools_dir, &self.meta.tool);
        let tmp = tools_dir.join(format!(".{}.json.tmp", file_stem(&self.meta.tool)));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        self.output_file = Some(path.clone());
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut env: Envelope = serde_json::from_str(&content)?;
        env.output_file = Some(path.to_path_buf());
        Ok(env)
    }
}

pub fn envelope_path(tools_dir: &Path, tool: &str) -> PathBuf {
    tools_dir.join(format!("{}.json", file_stem(tool)))
}

/// Tool name restricted to characters safe for a file name.
fn file_stem(tool: &str) -> String {
    let stem: String = tool
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match stem.trim_matches('.') {
        "" => "unnamed".to_string(),
        s => s.to_string(),
    }
}
