use async_trait::async_trait;

use super::{run_binary, AdapterContext, AdapterOutput, ToolAdapter};
use crate::error::Result;
use crate::tools::parse::parse_sqlmap_output;
use crate::tools::resolve_binary;

/// Runs sqlmap and flags reported injection points.
pub struct SqlmapAdapter;

#[async_trait]
impl ToolAdapter for SqlmapAdapter {
    fn name(&self) -> &str {
        "sqlmap"
    }

    fn is_available(&self, ctx: &AdapterContext) -> bool {
        resolve_binary("sqlmap", &ctx.path_env).is_some()
    }

    async fn run(&self, ctx: &AdapterContext) -> Result<AdapterOutput> {
        let mut envelope = run_binary(ctx).await?;
        let target = ctx.target.as_deref().unwrap_or_default();
        let finding = envelope
            .stdout()
            .and_then(|out| parse_sqlmap_output(out, target));
        if finding.is_some() {
            tracing::info!(target = %target, "sqlmap reported an injection point");
        }
        envelope.parsed_findings = Some(finding.into_iter().collect());
        Ok(AdapterOutput::Envelope(envelope))
    }
}
