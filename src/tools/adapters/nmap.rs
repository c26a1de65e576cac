use async_trait::async_trait;

use super::{run_binary, AdapterContext, AdapterOutput, ToolAdapter};
use crate::error::Result;
use crate::tools::parse::parse_nmap_open_ports;
use crate::tools::resolve_binary;

/// Runs nmap and attaches open ports as parsed findings.
pub struct NmapAdapter;

#[async_trait]
impl ToolAdapter for NmapAdapter {
    fn name(&self) -> &str {
        "nmap"
    }

    fn is_available(&self, ctx: &AdapterContext) -> bool {
        resolve_binary("nmap", &ctx.path_env).is_some()
    }

    async fn run(&self, ctx: &AdapterContext) -> Result<AdapterOutput> {
        let mut envelope = run_binary(ctx).await?;
        let target = ctx.target.as_deref().unwrap_or_default();
        let ports = envelope
            .stdout()
            .map(|out| parse_nmap_open_ports(out, target))
            .unwrap_or_default();
        tracing::debug!(target = %target, open_ports = ports.len(), "nmap finished");
        envelope.parsed_findings = Some(ports);
        Ok(AdapterOutput::Envelope(envelope))
    }
}
