//! Shared fixtures for integration tests

// Each test binary compiles this module; not every binary uses every fixture.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use threatscope_server::graph::ExecutionGraph;
use threatscope_server::provider::{AnalysisProvider, ProviderError, StaticProvider};
use threatscope_server::records::{CertificateRecord, HostRecord, MockRecordSource};
use threatscope_server::store::{MemoryStore, RunStore};
use threatscope_server::AppState;

pub fn host(ip: &str) -> HostRecord {
    serde_json::from_value(serde_json::json!({
        "ip": ip,
        "location": {"city": "Rotterdam", "country": "Netherlands", "country_code": "NL"},
        "services": [
            {
                "port": 22,
                "protocol": "SSH",
                "banner": "OpenSSH 8.9",
                "vulnerabilities": [
                    {"cve_id": "CVE-2023-38408", "severity": "critical", "cvss_score": 9.8}
                ]
            }
        ]
    }))
    .expect("host fixture should deserialize")
}

pub fn cert(fingerprint: &str) -> CertificateRecord {
    serde_json::from_value(serde_json::json!({
        "fingerprint_sha256": fingerprint,
        "domains": ["example.com"],
        "issuer": {"common_name": "R3", "organization": "Let's Encrypt", "country": "US"},
        "validity_period": {
            "not_before": "2025-01-01T00:00:00Z",
            "not_after": "2025-04-01T00:00:00Z",
            "length_days": 90,
            "status": "active"
        }
    }))
    .expect("cert fixture should deserialize")
}

/// Three hosts and three certificates
pub fn full_source() -> Arc<MockRecordSource> {
    Arc::new(MockRecordSource::new(
        vec![host("10.0.0.1"), host("10.0.0.2"), host("10.0.0.3")],
        vec![cert("c1"), cert("c2"), cert("c3")],
    ))
}

/// Provider that fails whenever the user content mentions `needle`
pub struct FailWhenMentioned {
    pub needle: String,
}

#[async_trait]
impl AnalysisProvider for FailWhenMentioned {
    async fn invoke(&self, _system: &str, user: &str) -> Result<String, ProviderError> {
        if user.contains(&self.needle) {
            Err(ProviderError::Network("provider unreachable".to_string()))
        } else {
            Ok("healthy analysis".to_string())
        }
    }
}

/// App state over the mock source, a static provider, and a memory store
pub fn test_state() -> AppState {
    let store: Arc<dyn RunStore> = Arc::new(MemoryStore::new());
    let graph = Arc::new(ExecutionGraph::new(
        full_source(),
        Arc::new(StaticProvider::new("canned expert analysis")),
    ));
    AppState::new(store, graph)
}
