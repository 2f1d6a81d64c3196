//! Durable key-addressed blob store.
//!
//! Session transcripts live in an S3-compatible object store accessed over
//! the S3 REST API with AWS Signature V4 authentication. Uses only
//! pure-Rust dependencies (`hmac`, `sha2`) for signing, and supports
//! custom endpoints for S3-compatible services (MinIO, LocalStack).
//!
//! Credentials are read from environment variables:
//! - `AWS_ACCESS_KEY_ID` — required
//! - `AWS_SECRET_ACCESS_KEY` — required
//! - `AWS_SESSION_TOKEN` — optional (temporary credentials / IAM roles)
//!
//! The [`BlobStore`] trait is the seam the session store depends on; tests
//! substitute [`MemoryBlobStore`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::BlobConfig;
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// A durable key-addressed blob store: get/put by key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch a blob. Returns `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a blob, replacing any existing value at the key.
    async fn put(&self, key: &str, body: String) -> Result<()>;
}

// ============ S3 implementation ============

pub struct S3BlobStore {
    config: BlobConfig,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl S3BlobStore {
    /// Build a store from config, reading credentials from the
    /// environment.
    pub fn new(config: BlobConfig) -> Result<Self> {
        let creds = AwsCredentials::from_env()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");

        Ok(Self {
            config,
            creds,
            client,
        })
    }

    fn host(&self) -> String {
        if let Some(ref endpoint) = self.config.endpoint_url {
            endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string()
        } else {
            format!(
                "{}.s3.{}.amazonaws.com",
                self.config.bucket, self.config.region
            )
        }
    }

    fn scheme(&self) -> &'static str {
        match self.config.endpoint_url {
            Some(ref e) if e.starts_with("http://") => "http",
            _ => "https",
        }
    }

    /// Build a signed request for `method` on `key` with the given body.
    fn signed_request(&self, method: &str, key: &str, body: &[u8]) -> reqwest::RequestBuilder {
        let host = self.host();
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let url = format!("{}://{}/{}", self.scheme(), host, encoded_key);

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let payload_hash = hex_sha256(body);

        let mut headers = vec![
            ("host".to_string(), host),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_uri = format!("/{}", encoded_key);
        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            method, canonical_uri, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.creds.secret_access_key,
            &date_stamp,
            &self.config.region,
            "s3",
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        let mut builder = match method {
            "PUT" => self.client.put(&url),
            _ => self.client.get(&url),
        };
        builder = builder
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date);

        if let Some(ref token) = self.creds.session_token {
            builder = builder.header("x-amz-security-token", token);
        }

        builder
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let resp = self
            .signed_request("GET", key, b"")
            .send()
            .await
            .map_err(|e| Error::storage(format!("blob get failed: {}", e)))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Error::storage(format!(
                "blob get returned HTTP {} for key '{}'",
                resp.status(),
                key
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::storage(format!("blob read failed: {}", e)))?;
        Ok(Some(String::from_utf8_lossy(&bytes).to_string()))
    }

    async fn put(&self, key: &str, body: String) -> Result<()> {
        let resp = self
            .signed_request("PUT", key, body.as_bytes())
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::storage(format!("blob put failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Error::storage(format!(
                "blob put returned HTTP {} for key '{}'",
                resp.status(),
                key
            )));
        }

        Ok(())
    }
}

// ============ In-memory implementation (tests) ============

/// Map-backed blob store used by tests and offline development.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.lock().expect("blob map poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .objects
            .lock()
            .expect("blob map poisoned")
            .get(key)
            .cloned())
    }

    async fn put(&self, key: &str, body: String) -> Result<()> {
        self.objects
            .lock()
            .expect("blob map poisoned")
            .insert(key.to_string(), body);
        Ok(())
    }
}

// ============ AWS SigV4 helpers ============

struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| Error::storage("AWS_ACCESS_KEY_ID environment variable not set"))?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| Error::storage("AWS_SECRET_ACCESS_KEY environment variable not set"))?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986 (used in SigV4 canonical requests).
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}
