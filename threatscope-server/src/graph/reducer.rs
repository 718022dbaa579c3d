//! Summary reducer
//!
//! Total function from the accumulated result set to one final report.
//! Builds a kind-ordered digest under a deterministic character budget,
//! makes a single provider call, and falls back to a templated count-based
//! summary when that call fails. Never errors.

use super::experts::WorkerResult;
use super::RunStats;
use crate::provider::AnalysisProvider;
use crate::records::RecordKind;
use tracing::warn;

/// Report text for a run that produced no analyses
pub const NO_RESULTS_SUMMARY: &str =
    "No analyses completed. Check data loading and expert processing.";

/// Per-record digest budget (characters)
const DIGEST_CHAR_BUDGET: usize = 200_000;
/// Whole provider context budget (characters)
const CONTEXT_CHAR_BUDGET: usize = 800_000;
const TRUNCATION_MARKER: &str = "\n\n[Content truncated to fit model context]";

const SYSTEM_PROMPT: &str = "\
You are a CISO presenting security findings to executive leadership. \
Synthesize the expert analyses into business-focused insights.

Audience: C-level executives needing actionable security decisions.
Format: max 250 words with these sections:

## Critical Risks
## Security Patterns
## Quick Wins
## Strategic Recommendations

Quantify risks where possible, avoid jargon, include rough effort estimates, \
and reference specific findings by record ID when relevant. Report any \
extraordinary or suspicious patterns that require immediate executive \
attention.";

/// The synthesized end-of-run report
#[derive(Debug, Clone)]
pub struct FinalReport {
    pub summary: String,
    /// Individual record analyses behind the summary
    pub expert_count: usize,
    /// Sum of all workers' processing times
    pub total_processing_time_ms: u64,
}

/// Reduce the result set to one report. Total: always returns a report.
pub async fn reduce(
    provider: &dyn AnalysisProvider,
    results: &[WorkerResult],
    stats: &RunStats,
) -> FinalReport {
    let expert_count = results.len();
    let total_processing_time_ms = results.iter().map(|r| r.processing_time_ms).sum();

    if results.is_empty() {
        return FinalReport {
            summary: NO_RESULTS_SUMMARY.to_string(),
            expert_count: 0,
            total_processing_time_ms: 0,
        };
    }

    let context = build_context(results, stats);

    let summary = match provider.invoke(SYSTEM_PROMPT, &context).await {
        Ok(response) => format!("# Executive Summary\n\n{}", response),
        Err(e) => {
            warn!(error = %e, "Summary synthesis degraded to templated fallback");
            fallback_summary(results, stats, &e.to_string())
        }
    };

    FinalReport {
        summary,
        expert_count,
        total_processing_time_ms,
    }
}

/// Assemble the provider context: overview line plus kind-ordered digests,
/// truncated deterministically at the fixed budgets.
fn build_context(results: &[WorkerResult], stats: &RunStats) -> String {
    let mut sections = vec![format!(
        "Dataset Overview: {} hosts, {} certificates analyzed",
        stats.host_count, stats.cert_count
    )];

    for kind in RecordKind::CANONICAL_ORDER {
        let bullets: Vec<String> = results
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| {
                format!(
                    "- {} {}: {}",
                    match kind {
                        RecordKind::Host => "Host",
                        RecordKind::Cert => "Cert",
                    },
                    r.record_id,
                    truncate_chars(&r.content, DIGEST_CHAR_BUDGET)
                )
            })
            .collect();

        if !bullets.is_empty() {
            let heading = match kind {
                RecordKind::Host => "HOST FINDINGS:",
                RecordKind::Cert => "CERTIFICATE FINDINGS:",
            };
            sections.push(format!("{}\n\n{}", heading, bullets.join("\n\n---\n\n")));
        }
    }

    sections.push(
        "Write a concise executive summary focusing on the most critical \
         security insights and patterns across all records."
            .to_string(),
    );

    let context = sections.join("\n\n---\n\n");
    match context.char_indices().nth(CONTEXT_CHAR_BUDGET) {
        Some((byte_idx, _)) => {
            let mut truncated = context[..byte_idx].to_string();
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
        None => context,
    }
}

/// Deterministic count-based summary used when the provider is unavailable
fn fallback_summary(results: &[WorkerResult], stats: &RunStats, error: &str) -> String {
    let host_analyses = results.iter().filter(|r| r.kind == RecordKind::Host).count();
    let cert_analyses = results.iter().filter(|r| r.kind == RecordKind::Cert).count();
    format!(
        "# Executive Summary\n\n\
         Dataset analysis completed:\n\
         - **{}** host infrastructure assessments\n\
         - **{}** certificate security evaluations\n\
         - **{}** of {} records analyzed\n\n\
         Review the individual record findings for specific security insights \
         and recommendations.\n\n\
         *Note: summary synthesis failed: {}*",
        host_analyses,
        cert_analyses,
        results.len(),
        stats.total(),
        error
    )
}

/// Truncate to at most `max_chars` characters, appending "..." when cut.
/// Operates on char boundaries, so multi-byte content is safe.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &s[..byte_idx]),
        None => s.to_string(),
    }
}
