//! Host infrastructure analysis expert

use super::{AnalysisContext, ProgressChunk, ProgressSink, WorkerResult, FALLBACK_CONFIDENCE};
use crate::provider::AnalysisProvider;
use crate::records::{HostRecord, RecordKind};
use std::time::Instant;
use tracing::warn;

const SYSTEM_PROMPT: &str = "\
You are a senior infrastructure security analyst conducting a comprehensive \
host assessment. Analyze the host record JSON for security risks and \
operational concerns.

Required output (max 200 words, markdown):

## Geographic & Infrastructure Context
- Location and geopolitical considerations, provider/ASN trust implications

## Network Services & Exposure
- Open ports/services with security implications, notable software versions

## Vulnerability Assessment
- Table of CVE / severity / CVSS / description when vulnerabilities exist

## Threat Intelligence
- Security labels, malware detections, known threat-actor associations

## Priority Recommendations
1. Most critical action required
2. Secondary priorities

Report any extraordinary or suspicious findings even when they do not fit \
the sections above. Be specific and actionable.";

/// Analyze one host record. Total: provider failures degrade, never propagate.
pub async fn analyze(
    provider: &dyn AnalysisProvider,
    host: &HostRecord,
    ctx: &AnalysisContext,
    sink: &ProgressSink,
) -> WorkerResult {
    let started = Instant::now();

    let host_json =
        serde_json::to_string_pretty(host).unwrap_or_else(|_| "(unserializable record)".to_string());
    let user_query = format!(
        "User Question: {}\n\n\
         Analyze this host record comprehensively:\n{}\n\n\
         Provide a comprehensive host analysis covering security, \
         infrastructure, and operational aspects.",
        ctx.original_message, host_json
    );

    match provider.invoke(SYSTEM_PROMPT, &user_query).await {
        Ok(response) => {
            let content = format!("**Host Analysis**\n\n{}", response);
            // Longer responses indicate richer grounding in the record data
            let confidence = (0.75 + response.len() as f64 / 2000.0).min(0.95);

            sink.send(ProgressChunk {
                kind: RecordKind::Host,
                record_id: host.ip.clone(),
                content: content.clone(),
            });

            WorkerResult {
                kind: RecordKind::Host,
                record_id: host.ip.clone(),
                content,
                confidence,
                processing_time_ms: started.elapsed().as_millis() as u64,
            }
        }
        Err(e) => {
            warn!(ip = %host.ip, error = %e, "Host analysis degraded to fallback");
            WorkerResult {
                kind: RecordKind::Host,
                record_id: host.ip.clone(),
                content: format!(
                    "**Host Analysis** (Error: {})\n\n\
                     Host analysis for {}: unable to complete analysis due to \
                     technical issues.",
                    e, host.ip
                ),
                confidence: FALLBACK_CONFIDENCE,
                processing_time_ms: started.elapsed().as_millis() as u64,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticProvider;
    use crate::records::test_host;

    #[tokio::test]
    async fn test_confidence_scales_with_response_length() {
        let ctx = AnalysisContext {
            original_message: String::new(),
        };
        let sink = ProgressSink::disabled();
        let host = test_host("192.0.2.10");

        let short = analyze(&StaticProvider::new("ok"), &host, &ctx, &sink).await;
        assert!((short.confidence - (0.75 + 2.0 / 2000.0)).abs() < 1e-9);

        let long_reply = "x".repeat(10_000);
        let long = analyze(&StaticProvider::new(long_reply), &host, &ctx, &sink).await;
        assert_eq!(long.confidence, 0.95); // capped

        assert!(short.content.starts_with("**Host Analysis**"));
    }
}
