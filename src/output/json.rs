use crate::error::Result;
use crate::orchestrator::RunSummary;

/// Render a run summary as JSON.
pub fn render(summary: &RunSummary) -> Result<String> {
    let json = serde_json::to_string_pretty(summary)?;
    Ok(json)
}
