//! Client for the collector's "safe" content service
//!
//! A file rule may reference its content as `safe://<id>`. The service
//! returns a JSON descriptor carrying a digest of the stored content (`sha256`,
//! or `md5` from older collectors), and the content itself. The descriptor's
//! digest is trusted as-is: a node that can reach the collector over TLS
//! accepts whatever digest it reports, and downloaded bytes are verified
//! against that digest before they are written.

use base64::Engine;
use compobj_base::config::CollectorPreferences;
use serde::Deserialize;
use md5::Md5;
use sha2::{Digest, Sha256};
use std::time::Duration;

pub const SAFE_SCHEME: &str = "safe://";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum SafeError {
    #[error("Safe service is not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Safe service returned status {status} for '{id}'")]
    Status { id: String, status: u16 },

    #[error("Checksum mismatch for '{id}': expected {expected}, got {actual}")]
    Checksum {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Safe descriptor for '{id}' carries no sha256 or md5 digest")]
    MissingDigest { id: String },
}

/// Metadata of one stored file
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SafeDescriptor {
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
}

impl SafeDescriptor {
    /// The strongest digest the service reported
    pub fn digest(&self, id: &str) -> Result<ContentDigest, SafeError> {
        non_empty(&self.sha256)
            .map(ContentDigest::Sha256)
            .or_else(|| non_empty(&self.md5).map(ContentDigest::Md5))
            .ok_or_else(|| SafeError::MissingDigest { id: id.to_string() })
    }
}

fn non_empty(digest: &Option<String>) -> Option<String> {
    digest
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

/// Expected content digest, tagged with its algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentDigest {
    Sha256(String),
    Md5(String),
}

impl ContentDigest {
    pub fn algorithm(&self) -> &'static str {
        match self {
            ContentDigest::Sha256(_) => "sha256",
            ContentDigest::Md5(_) => "md5",
        }
    }

    pub fn expected(&self) -> &str {
        match self {
            ContentDigest::Sha256(hex) | ContentDigest::Md5(hex) => hex,
        }
    }

    /// Digest of `data` with the same algorithm
    pub fn compute(&self, data: &[u8]) -> String {
        match self {
            ContentDigest::Sha256(_) => sha256_hex(data),
            ContentDigest::Md5(_) => hex::encode(Md5::digest(data)),
        }
    }

    /// `Ok(())` when `data` hashes to the expected digest, else the actual digest
    pub fn verify(&self, data: &[u8]) -> Result<(), String> {
        let actual = self.compute(data);
        if actual.eq_ignore_ascii_case(self.expected()) {
            Ok(())
        } else {
            Err(actual)
        }
    }
}

/// Source of reference content for file rules
pub trait SafeStore {
    fn descriptor(&self, id: &str) -> Result<SafeDescriptor, SafeError>;

    fn download(&self, id: &str) -> Result<Vec<u8>, SafeError>;
}

/// Identifier from a `safe://<id>` reference
pub fn parse_reference(reference: &str) -> Option<&str> {
    reference
        .strip_prefix(SAFE_SCHEME)
        .map(|id| id.trim_matches('/'))
        .filter(|id| !id.is_empty())
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// HTTPS client authenticated with the node's name and uuid
#[derive(Debug)]
pub struct HttpSafeStore {
    client: reqwest::blocking::Client,
    base_url: String,
    authorization: String,
}

impl HttpSafeStore {
    pub fn from_config(config: &CollectorPreferences) -> Result<Self, SafeError> {
        let base_url = config
            .url
            .clone()
            .ok_or_else(|| SafeError::NotConfigured("no collector url".to_string()))?;
        let node_uuid = config
            .node_uuid
            .clone()
            .ok_or_else(|| SafeError::NotConfigured("no node uuid".to_string()))?;
        let node_name = match &config.node_name {
            Some(name) => name.clone(),
            None => hostname::get()
                .map_err(|e| SafeError::NotConfigured(format!("hostname: {}", e)))?
                .to_string_lossy()
                .into_owned(),
        };

        let credentials = format!("{}:{}", node_name, node_uuid);
        let authorization = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        );

        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(config.insecure)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization,
        })
    }

    fn get(&self, id: &str, suffix: &str) -> Result<reqwest::blocking::Response, SafeError> {
        let url = format!("{}/safe/{}{}", self.base_url, id, suffix);
        let response = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .send()?;
        if !response.status().is_success() {
            return Err(SafeError::Status {
                id: id.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

impl SafeStore for HttpSafeStore {
    fn descriptor(&self, id: &str) -> Result<SafeDescriptor, SafeError> {
        Ok(self.get(id, "")?.json()?)
    }

    fn download(&self, id: &str) -> Result<Vec<u8>, SafeError> {
        let digest = self.descriptor(id)?.digest(id)?;
        let data = self.get(id, "/download")?.bytes()?.to_vec();
        digest.verify(&data).map_err(|actual| SafeError::Checksum {
            id: id.to_string(),
            expected: digest.expected().to_string(),
            actual,
        })?;
        Ok(data)
    }
}

/// In-memory store for tests and offline runs
#[derive(Debug, Default, Clone)]
pub struct MemorySafeStore {
    files: std::collections::HashMap<String, Vec<u8>>,
}

impl MemorySafeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.insert(id.into(), data.into());
    }
}

impl SafeStore for MemorySafeStore {
    fn descriptor(&self, id: &str) -> Result<SafeDescriptor, SafeError> {
        let data = self.files.get(id).ok_or_else(|| SafeError::Status {
            id: id.to_string(),
            status: 404,
        })?;
        Ok(SafeDescriptor {
            sha256: Some(sha256_hex(data)),
            size: Some(data.len() as u64),
            ..SafeDescriptor::default()
        })
    }

    fn download(&self, id: &str) -> Result<Vec<u8>, SafeError> {
        self.files.get(id).cloned().ok_or_else(|| SafeError::Status {
            id: id.to_string(),
            status: 404,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_reference() {
        assert_eq!(parse_reference("safe://abc123"), Some("abc123"));
        assert_eq!(parse_reference("safe://"), None);
        assert_eq!(parse_reference("https://x/y"), None);
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"hello\n"),
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemorySafeStore::new();
        store.insert("f1", "hello\n");
        assert_eq!(
            store.descriptor("f1").unwrap().digest("f1").unwrap(),
            ContentDigest::Sha256(sha256_hex(b"hello\n"))
        );
        assert_eq!(store.download("f1").unwrap(), b"hello\n");
        assert_matches!(store.download("f2"), Err(SafeError::Status { status: 404, .. }));
    }

    #[test]
    fn test_http_store_requires_configuration() {
        let config = CollectorPreferences {
            url: None,
            node_name: Some("n1".into()),
            node_uuid: Some("secret".into()),
            insecure: false,
        };
        assert_matches!(HttpSafeStore::from_config(&config), Err(SafeError::NotConfigured(_)));
    }

    #[test]
    fn test_descriptor_digest_selection() {
        let legacy: SafeDescriptor =
            serde_json::from_str(r#"{"md5": "B1946AC92492D2347C6235B4D2611184", "size": 6}"#)
                .unwrap();
        let digest = legacy.digest("7").unwrap();
        assert_eq!(digest.algorithm(), "md5");
        assert!(digest.verify(b"hello\n").is_ok());
        assert_matches!(digest.verify(b"hello"), Err(actual) if actual.len() == 32);

        let both: SafeDescriptor = serde_json::from_str(
            r#"{"sha256": "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03",
                "md5": "b1946ac92492d2347c6235b4d2611184"}"#,
        )
        .unwrap();
        assert_eq!(both.digest("7").unwrap().algorithm(), "sha256");

        let empty: SafeDescriptor = serde_json::from_str(r#"{"md5": "", "name": "motd"}"#).unwrap();
        assert_matches!(empty.digest("7"), Err(SafeError::MissingDigest { .. }));
    }
}
