//! Security record models and dataset access
//!
//! Records are immutable input units: network hosts keyed by IP and TLS
//! certificates keyed by SHA-256 fingerprint. Dataset JSON is sparse, so the
//! models are optional-heavy and tolerate missing sections.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use threatscope_common::Result;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Closed set of record kinds handled by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Host,
    Cert,
}

impl RecordKind {
    /// Canonical kind order used for routing decisions and digests.
    ///
    /// Downstream ordering derives from this array, never from input order.
    pub const CANONICAL_ORDER: [RecordKind; 2] = [RecordKind::Host, RecordKind::Cert];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Host => "host",
            RecordKind::Cert => "cert",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Host record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Location {
    pub city: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomousSystem {
    pub asn: i64,
    pub name: String,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dns {
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatingSystem {
    pub vendor: Option<String>,
    pub product: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    pub cve_id: String,
    pub severity: String,
    pub cvss_score: f64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Software {
    pub product: String,
    pub vendor: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MalwareDetection {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub confidence: f64,
    #[serde(default)]
    pub threat_actors: Vec<String>,
}

/// One exposed network service on a host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub port: u16,
    pub protocol: String,
    pub banner: Option<String>,
    #[serde(default)]
    pub software: Vec<Software>,
    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,
    pub tls_enabled: Option<bool>,
    pub malware_detected: Option<MalwareDetection>,
    pub authentication_required: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreatIntelligence {
    #[serde(default)]
    pub security_labels: Vec<String>,
    #[serde(default)]
    pub malware_families: Vec<String>,
    pub risk_level: Option<String>,
    #[serde(default)]
    pub suspicious_patterns: Vec<String>,
}

/// A scanned network host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRecord {
    /// Primary identity key
    pub ip: String,
    pub location: Option<Location>,
    pub autonomous_system: Option<AutonomousSystem>,
    pub dns: Option<Dns>,
    pub operating_system: Option<OperatingSystem>,
    #[serde(default)]
    pub services: Vec<Service>,
    pub threat_intelligence: Option<ThreatIntelligence>,
}

// ---------------------------------------------------------------------------
// Certificate record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateSubject {
    pub common_name: Option<String>,
    pub organization: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateIssuer {
    pub common_name: String,
    pub organization: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidityPeriod {
    pub not_before: String,
    pub not_after: String,
    pub length_days: i64,
    /// "active", "expired", ...
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyInfo {
    pub algorithm: String,
    pub key_size: i64,
    pub public_key_fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateAuthority {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub validation_level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertValidation {
    #[serde(default)]
    pub trusted_by_major_browsers: bool,
    pub expiry_status: Option<String>,
    pub validation_issues: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Revocation {
    #[serde(default)]
    pub crl_revoked: bool,
    #[serde(default)]
    pub ocsp_revoked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAnalysis {
    pub zlint_status: String,
    #[serde(default)]
    pub failed_lints: Vec<String>,
    pub risk_level: String,
    pub notes: Option<String>,
}

/// A TLS certificate observed in scans
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateRecord {
    /// Primary identity key
    pub fingerprint_sha256: String,
    pub fingerprint_sha1: Option<String>,
    #[serde(default)]
    pub domains: Vec<String>,
    pub subject: Option<CertificateSubject>,
    pub issuer: Option<CertificateIssuer>,
    pub validity_period: Option<ValidityPeriod>,
    pub key_info: Option<KeyInfo>,
    pub certificate_authority: Option<CertificateAuthority>,
    pub validation: Option<CertValidation>,
    pub revocation: Option<Revocation>,
    pub security_analysis: Option<SecurityAnalysis>,
    pub threat_intelligence: Option<ThreatIntelligence>,
}

// ---------------------------------------------------------------------------
// Record union
// ---------------------------------------------------------------------------

/// One immutable input unit for the analysis pipeline
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Record {
    Host(HostRecord),
    Cert(CertificateRecord),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Host(_) => RecordKind::Host,
            Record::Cert(_) => RecordKind::Cert,
        }
    }

    /// Stable kind-specific identity key, used downstream as `record_id`
    pub fn record_id(&self) -> &str {
        match self {
            Record::Host(host) => &host.ip,
            Record::Cert(cert) => &cert.fingerprint_sha256,
        }
    }
}

// ---------------------------------------------------------------------------
// Record source
// ---------------------------------------------------------------------------

/// Source of record datasets
///
/// Implementations must be cheap to call repeatedly; the file-backed source
/// caches parsed datasets after the first load.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// All records of one kind, in dataset order
    async fn get_all(&self, kind: RecordKind) -> Result<Vec<Record>>;

    /// Lookup by the kind's primary identity key
    async fn get_by_key(&self, kind: RecordKind, key: &str) -> Result<Option<Record>>;
}

#[derive(Debug, Default, Deserialize)]
struct HostsFile {
    #[serde(default)]
    hosts: Vec<HostRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct CertificatesFile {
    #[serde(default)]
    certificates: Vec<CertificateRecord>,
}

/// File-backed record source loading JSON datasets from disk
///
/// Missing or malformed dataset files degrade to an empty dataset with a
/// logged warning; a broken dataset must not take the whole service down.
pub struct FileRecordSource {
    hosts_path: PathBuf,
    certificates_path: PathBuf,
    hosts: RwLock<Option<Vec<HostRecord>>>,
    certificates: RwLock<Option<Vec<CertificateRecord>>>,
}

impl FileRecordSource {
    pub fn new(hosts_path: PathBuf, certificates_path: PathBuf) -> Self {
        Self {
            hosts_path,
            certificates_path,
            hosts: RwLock::new(None),
            certificates: RwLock::new(None),
        }
    }

    async fn load_hosts(&self) -> Vec<HostRecord> {
        if let Some(hosts) = self.hosts.read().await.as_ref() {
            return hosts.clone();
        }
        let mut cache = self.hosts.write().await;
        if let Some(hosts) = cache.as_ref() {
            return hosts.clone();
        }
        let parsed: HostsFile = read_dataset(&self.hosts_path, "hosts").await;
        info!("Loaded {} host records from {:?}", parsed.hosts.len(), self.hosts_path);
        *cache = Some(parsed.hosts.clone());
        parsed.hosts
    }

    async fn load_certificates(&self) -> Vec<CertificateRecord> {
        if let Some(certs) = self.certificates.read().await.as_ref() {
            return certs.clone();
        }
        let mut cache = self.certificates.write().await;
        if let Some(certs) = cache.as_ref() {
            return certs.clone();
        }
        let parsed: CertificatesFile = read_dataset(&self.certificates_path, "certificates").await;
        info!(
            "Loaded {} certificate records from {:?}",
            parsed.certificates.len(),
            self.certificates_path
        );
        *cache = Some(parsed.certificates.clone());
        parsed.certificates
    }
}

async fn read_dataset<T: Default + for<'de> Deserialize<'de>>(
    path: &std::path::Path,
    label: &str,
) -> T {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Failed to parse {} dataset {:?}: {}", label, path, e);
                T::default()
            }
        },
        Err(e) => {
            warn!("{} dataset file {:?} not readable: {}", label, path, e);
            T::default()
        }
    }
}

#[async_trait]
impl RecordSource for FileRecordSource {
    async fn get_all(&self, kind: RecordKind) -> Result<Vec<Record>> {
        let records = match kind {
            RecordKind::Host => self.load_hosts().await.into_iter().map(Record::Host).collect(),
            RecordKind::Cert => self
                .load_certificates()
                .await
                .into_iter()
                .map(Record::Cert)
                .collect(),
        };
        Ok(records)
    }

    async fn get_by_key(&self, kind: RecordKind, key: &str) -> Result<Option<Record>> {
        let all = self.get_all(kind).await?;
        Ok(all.into_iter().find(|r| r.record_id() == key))
    }
}

/// In-memory record source for tests and demos
pub struct MockRecordSource {
    hosts: Vec<HostRecord>,
    certificates: Vec<CertificateRecord>,
}

impl MockRecordSource {
    pub fn new(hosts: Vec<HostRecord>, certificates: Vec<CertificateRecord>) -> Self {
        Self { hosts, certificates }
    }

    /// Empty datasets
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

#[async_trait]
impl RecordSource for MockRecordSource {
    async fn get_all(&self, kind: RecordKind) -> Result<Vec<Record>> {
        let records = match kind {
            RecordKind::Host => self.hosts.iter().cloned().map(Record::Host).collect(),
            RecordKind::Cert => self.certificates.iter().cloned().map(Record::Cert).collect(),
        };
        Ok(records)
    }

    async fn get_by_key(&self, kind: RecordKind, key: &str) -> Result<Option<Record>> {
        let all = self.get_all(kind).await?;
        Ok(all.into_iter().find(|r| r.record_id() == key))
    }
}

/// Minimal host fixture used across unit tests
#[cfg(test)]
pub(crate) fn test_host(ip: &str) -> HostRecord {
    serde_json::from_value(serde_json::json!({
        "ip": ip,
        "location": {"city": "Test City", "country": "Testland", "country_code": "TL"},
        "services": [{"port": 80, "protocol": "HTTP"}]
    }))
    .expect("fixture host should deserialize")
}

/// Minimal certificate fixture used across unit tests
#[cfg(test)]
pub(crate) fn test_cert(fingerprint: &str) -> CertificateRecord {
    serde_json::from_value(serde_json::json!({
        "fingerprint_sha256": fingerprint,
        "domains": ["test.example.com"]
    }))
    .expect("fixture cert should deserialize")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_host_json_parses() {
        let host: HostRecord = serde_json::from_str(r#"{"ip": "203.0.113.9"}"#).unwrap();
        assert_eq!(host.ip, "203.0.113.9");
        assert!(host.services.is_empty());
        assert!(host.threat_intelligence.is_none());
    }

    #[test]
    fn test_full_service_json_parses() {
        let service: Service = serde_json::from_str(
            r#"{
                "port": 443,
                "protocol": "HTTPS",
                "banner": "nginx/1.18.0",
                "software": [{"product": "nginx", "version": "1.18.0"}],
                "vulnerabilities": [
                    {"cve_id": "CVE-2021-23017", "severity": "high", "cvss_score": 8.1}
                ],
                "tls_enabled": true
            }"#,
        )
        .unwrap();
        assert_eq!(service.port, 443);
        assert_eq!(service.vulnerabilities[0].cve_id, "CVE-2021-23017");
    }

    #[test]
    fn test_record_identity_keys() {
        let host = Record::Host(test_host("192.0.2.1"));
        assert_eq!(host.kind(), RecordKind::Host);
        assert_eq!(host.record_id(), "192.0.2.1");

        let cert = Record::Cert(test_cert("abc123"));
        assert_eq!(cert.kind(), RecordKind::Cert);
        assert_eq!(cert.record_id(), "abc123");
    }

    #[test]
    fn test_canonical_order_is_host_then_cert() {
        assert_eq!(
            RecordKind::CANONICAL_ORDER,
            [RecordKind::Host, RecordKind::Cert]
        );
    }

    #[tokio::test]
    async fn test_file_source_missing_files_degrade_to_empty() {
        let source = FileRecordSource::new(
            PathBuf::from("/nonexistent/hosts.json"),
            PathBuf::from("/nonexistent/certs.json"),
        );
        let hosts = source.get_all(RecordKind::Host).await.unwrap();
        let certs = source.get_all(RecordKind::Cert).await.unwrap();
        assert!(hosts.is_empty());
        assert!(certs.is_empty());
    }

    #[tokio::test]
    async fn test_file_source_loads_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let hosts_path = dir.path().join("hosts.json");
        std::fs::write(
            &hosts_path,
            r#"{"metadata": {"description": "t"}, "hosts": [{"ip": "198.51.100.7"}]}"#,
        )
        .unwrap();

        let source = FileRecordSource::new(hosts_path.clone(), dir.path().join("certs.json"));
        let hosts = source.get_all(RecordKind::Host).await.unwrap();
        assert_eq!(hosts.len(), 1);

        // Second read comes from cache even after the file disappears
        std::fs::remove_file(&hosts_path).unwrap();
        let hosts = source.get_all(RecordKind::Host).await.unwrap();
        assert_eq!(hosts.len(), 1);

        let found = source
            .get_by_key(RecordKind::Host, "198.51.100.7")
            .await
            .unwrap();
        assert!(found.is_some());
        let missing = source.get_by_key(RecordKind::Host, "10.0.0.1").await.unwrap();
        assert!(missing.is_none());
    }
}
