//! Certificate and cryptographic analysis expert

use super::{AnalysisContext, ProgressChunk, ProgressSink, WorkerResult, FALLBACK_CONFIDENCE};
use crate::provider::AnalysisProvider;
use crate::records::{CertificateRecord, RecordKind};
use std::time::Instant;
use tracing::warn;

const SYSTEM_PROMPT: &str = "\
You are a senior PKI and cryptographic security specialist analyzing \
certificate data. Review the certificate JSON for security, compliance, and \
trust issues.

Required output (max 200 words, markdown):

## Certificate Chain & Trust
- Issuer, validation level, browser trust status

## Cryptographic Strength
- Algorithm/key size assessment against current standards

## Validity & Lifecycle
- Current status (active/expired/revoked), renewal timeline

## Compliance & Standards
- CT logging, OCSP/CRL availability, linting violations

## Security Recommendations
1. Most critical remediation needed
2. Compliance improvements required

Report any extraordinary or suspicious findings even when they do not fit \
the sections above. Be precise and technical.";

/// Analyze one certificate record. Total: provider failures degrade, never
/// propagate.
pub async fn analyze(
    provider: &dyn AnalysisProvider,
    cert: &CertificateRecord,
    ctx: &AnalysisContext,
    sink: &ProgressSink,
) -> WorkerResult {
    let started = Instant::now();

    let cert_json =
        serde_json::to_string_pretty(cert).unwrap_or_else(|_| "(unserializable record)".to_string());
    let user_query = format!(
        "User Question: {}\n\n\
         Analyze this certificate record from a cryptographic security \
         perspective:\n{}\n\n\
         Provide a comprehensive certificate and cryptographic analysis.",
        ctx.original_message, cert_json
    );

    match provider.invoke(SYSTEM_PROMPT, &user_query).await {
        Ok(response) => {
            let content = format!("**Certificate Analysis**\n\n{}", response);
            let confidence = (0.80 + response.len() as f64 / 2500.0).min(0.98);

            sink.send(ProgressChunk {
                kind: RecordKind::Cert,
                record_id: cert.fingerprint_sha256.clone(),
                content: content.clone(),
            });

            WorkerResult {
                kind: RecordKind::Cert,
                record_id: cert.fingerprint_sha256.clone(),
                content,
                confidence,
                processing_time_ms: started.elapsed().as_millis() as u64,
            }
        }
        Err(e) => {
            warn!(
                fingerprint = %cert.fingerprint_sha256,
                error = %e,
                "Certificate analysis degraded to fallback"
            );
            WorkerResult {
                kind: RecordKind::Cert,
                record_id: cert.fingerprint_sha256.clone(),
                content: format!(
                    "**Certificate Analysis** (Error: {})\n\n\
                     Certificate {}: unable to complete certificate analysis \
                     due to technical issues.",
                    e, cert.fingerprint_sha256
                ),
                confidence: FALLBACK_CONFIDENCE,
                processing_time_ms: started.elapsed().as_millis() as u64,
            }
        }
    }
}
