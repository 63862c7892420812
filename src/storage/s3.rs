use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::{ObjectStore, UploadCredentials};
use crate::config::StorageConfig;
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// S3-compatible store speaking SigV4 directly: presigned POST policies for
/// uploads, presigned GET URLs for reads, plain HTTPS for downloads.
pub struct S3Store {
    config: StorageConfig,
    client: reqwest::Client,
}

impl S3Store {
    pub fn new(config: StorageConfig, download_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(download_timeout)
            .build()
            .expect("failed to create HTTP client");
        Self { config, client }
    }

    /// Virtual-hosted AWS URL, or path-style against a custom endpoint.
    fn base_url(&self) -> String {
        match &self.config.endpoint {
            Some(endpoint) => format!(
                "{}/{}",
                endpoint.trim_end_matches('/'),
                self.config.bucket
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com",
                self.config.bucket, self.config.region
            ),
        }
    }

    fn host(&self) -> Result<String> {
        let url = reqwest::Url::parse(&self.base_url())
            .map_err(|e| Error::storage(format!("bad storage endpoint: {}", e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::storage("storage endpoint has no host"))?;
        Ok(match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        })
    }

    /// Path part of the canonical URI for `key` under this addressing style.
    fn canonical_path(&self, key: &str) -> String {
        let encoded = uri_encode(key, false);
        match &self.config.endpoint {
            Some(_) => format!("/{}/{}", self.config.bucket, encoded),
            None => format!("/{}", encoded),
        }
    }

    fn credential_scope(&self, datestamp: &str) -> String {
        format!("{}/{}/s3/aws4_request", datestamp, self.config.region)
    }

    fn signing_key(&self, datestamp: &str) -> Vec<u8> {
        let k_date = hmac_sha256(
            format!("AWS4{}", self.config.secret_key).as_bytes(),
            datestamp.as_bytes(),
        );
        let k_region = hmac_sha256(&k_date, self.config.region.as_bytes());
        let k_service = hmac_sha256(&k_region, b"s3");
        hmac_sha256(&k_service, b"aws4_request")
    }

    fn presigned_get_at(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> Result<String> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let datestamp = now.format("%Y%m%d").to_string();
        let scope = self.credential_scope(&datestamp);
        let credential = format!("{}/{}", self.config.access_key, scope);
        let host = self.host()?;

        let mut params = vec![
            ("X-Amz-Algorithm", ALGORITHM.to_string()),
            ("X-Amz-Credential", credential),
            ("X-Amz-Date", amz_date.clone()),
            ("X-Amz-Expires", ttl.as_secs().to_string()),
            ("X-Amz-SignedHeaders", "host".to_string()),
        ];
        params.sort_by(|a, b| a.0.cmp(b.0));
        let canonical_query: String = params
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k, true), uri_encode(v, true)))
            .collect::<Vec<_>>()
            .join("&");

        let canonical_request = format!(
            "GET\n{}\n{}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD",
            self.canonical_path(key),
            canonical_query,
            host
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );
        let signature = hex::encode(hmac_sha256(
            &self.signing_key(&datestamp),
            string_to_sign.as_bytes(),
        ));

        Ok(format!(
            "{}/{}?{}&X-Amz-Signature={}",
            self.base_url(),
            uri_encode(key, false),
            canonical_query,
            signature
        ))
    }

    fn presigned_upload_at(&self, key: &str, now: DateTime<Utc>) -> Result<UploadCredentials> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let datestamp = now.format("%Y%m%d").to_string();
        let expiration = (now + chrono::Duration::seconds(self.config.url_ttl_secs as i64))
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();
        let credential = format!(
            "{}/{}",
            self.config.access_key,
            self.credential_scope(&datestamp)
        );

        let policy = serde_json::json!({
            "expiration": expiration,
            "conditions": [
                {"bucket": self.config.bucket},
                {"key": key},
                {"x-amz-algorithm": ALGORITHM},
                {"x-amz-credential": credential},
                {"x-amz-date": amz_date},
            ],
        });
        let policy_b64 = BASE64.encode(
            serde_json::to_vec(&policy)
                .map_err(|e| Error::storage(format!("cannot encode policy: {}", e)))?,
        );
        let signature = hex::encode(hmac_sha256(
            &self.signing_key(&datestamp),
            policy_b64.as_bytes(),
        ));

        let mut fields = HashMap::new();
        fields.insert("key".to_string(), key.to_string());
        fields.insert("policy".to_string(), policy_b64);
        fields.insert("x-amz-algorithm".to_string(), ALGORITHM.to_string());
        fields.insert("x-amz-credential".to_string(), credential);
        fields.insert("x-amz-date".to_string(), amz_date);
        fields.insert("x-amz-signature".to_string(), signature);

        Ok(UploadCredentials {
            url: self.base_url(),
            fields,
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn presigned_upload(&self, key: &str) -> Result<UploadCredentials> {
        let credentials = self.presigned_upload_at(key, Utc::now())?;
        debug!(key, url = %credentials.url, "generated upload credentials");
        Ok(credentials)
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<()> {
        let url = self
            .presigned_get(key, Duration::from_secs(self.config.url_ttl_secs))
            .await?;

        info!(key, dest = %dest.display(), "downloading from bucket");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::storage(format!(
                "download of {} failed with status {}",
                key,
                response.status()
            )));
        }
        let bytes = response.bytes().await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage(format!("{}: {}", parent.display(), e)))?;
        }

        // Write to a part file first so a half-finished download is never
        // mistaken for a cached video.
        let part = dest.with_extension(format!("{}.part", uuid::Uuid::new_v4()));
        tokio::fs::write(&part, &bytes)
            .await
            .map_err(|e| Error::storage(format!("{}: {}", part.display(), e)))?;
        tokio::fs::rename(&part, dest)
            .await
            .map_err(|e| Error::storage(format!("{}: {}", dest.display(), e)))?;

        info!(key, bytes = bytes.len(), "download complete");
        Ok(())
    }

    async fn presigned_get(&self, key: &str, ttl: Duration) -> Result<String> {
        self.presigned_get_at(key, ttl, Utc::now())
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// SigV4 URI encoding: unreserved characters pass through, everything else is
/// percent-encoded; `/` is kept in object-key paths.
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
