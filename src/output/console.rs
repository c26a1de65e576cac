use crate::findings::Finding;
use crate::orchestrator::{PhaseSummary, RunSummary};

fn severity_tag(finding: &Finding) -> &'static str {
    match finding.severity.get() {
        5 => "[CRITICAL]",
        4 => "[HIGH]    ",
        3 => "[MEDIUM]  ",
        2 => "[LOW]     ",
        _ => "[INFO]    ",
    }
}

fn render_phase(output: &mut String, title: &str, phase: &PhaseSummary) {
    output.push_str(&format!("\n  == {} ==\n", title));
    if !phase.envelopes.is_empty() {
        let tools: Vec<String> = phase
            .envelopes
            .iter()
            .map(|e| format!("{} ({})", e.tool, e.status))
            .collect();
        output.push_str(&format!("  tools: {}\n", tools.join(", ")));
    }
    if phase.rounds > 0 {
        output.push_str(&format!("  probe rounds: {}\n", phase.rounds));
    }

    if phase.findings.is_empty() {
        output.push_str("\n  No findings.\n");
    } else {
        // Highest severity first, then by target
        let mut sorted: Vec<&Finding> = phase.findings.iter().collect();
        sorted.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.target.cmp(&b.target)));

        output.push_str(&format!("\n  {} finding(s):\n\n", sorted.len()));
        for finding in sorted {
            output.push_str(&format!("  {} {} {}\n", severity_tag(finding), finding.kind, finding.target));
            if let Some(tool) = &finding.source.tool {
                output.push_str(&format!("           via {}\n", tool));
            }
        }
    }

    if let Some(report) = &phase.report {
        output.push_str(&format!("\n  report: {}\n", report.display()));
    }
    if let Some(merge) = &phase.merge {
        output.push_str(&format!("  appended: {}\n", merge.appended));
    }
    for error in &phase.errors {
        output.push_str(&format!("  error: {}\n", error));
    }
}

/// Render a run summary for the terminal.
pub fn render(summary: &RunSummary) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "\n  Run {} ({})\n",
        summary.run_id,
        summary.run_dir.display()
    ));

    render_phase(&mut output, "non-destructive", &summary.non_destructive);
    match &summary.destructive {
        Some(phase) => render_phase(&mut output, "destructive", phase),
        None => output.push_str(&format!("\n  Destructive phase skipped ({}).\n", summary.decision)),
    }
    output.push('\n');
    output
}
