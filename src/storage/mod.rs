mod s3;

pub use s3::S3Store;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A presigned POST: the browser uploads directly to the bucket with these
/// form fields, the server never proxies video bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCredentials {
    pub url: String,
    pub fields: HashMap<String, String>,
}

/// Object storage collaborator. The core only ever sees a local file path;
/// everything bucket-shaped goes through here.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Credentials for a direct-to-bucket upload of `key`.
    async fn presigned_upload(&self, key: &str) -> Result<UploadCredentials>;

    /// Fetch `key` into `dest`.
    async fn download(&self, key: &str, dest: &Path) -> Result<()>;

    /// Time-limited read URL for `key`.
    async fn presigned_get(&self, key: &str, ttl: Duration) -> Result<String>;
}
