//! AWS S3 blob storage.
//!
//! Guides are stored as `{bucket}/{prefix}/{name}` with content type
//! `application/pdf`. Existence is a `HeadObject`; listing walks
//! `ListObjectsV2` pages.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::{AppError, Result};
use crate::storage::BlobStore;

/// S3-backed blob store.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3BlobStore {
    /// Create a new S3 store instance.
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    /// Create an S3 store with credentials from the default provider chain.
    pub async fn from_env(bucket: &str, prefix: &str) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config), bucket, prefix)
    }

    /// Object key for a guide name.
    fn object_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix, key)
        }
    }

    /// Guide name for an object key, if it lives under the prefix.
    fn strip_prefix<'k>(&self, object_key: &'k str) -> Option<&'k str> {
        if self.prefix.is_empty() {
            return Some(object_key);
        }
        object_key
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(AppError::blob(DisplayErrorContext(&service_err)))
                }
            }
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let object_key = self.object_key(key);
        let size = bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| AppError::blob(DisplayErrorContext(&e)))?;

        log::debug!("Wrote {} bytes to s3://{}/{}", size, self.bucket, object_key);
        Ok(())
    }

    fn locator(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, self.object_key(key))
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let prefix = (!self.prefix.is_empty()).then(|| format!("{}/", self.prefix));
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_prefix(prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| AppError::blob(DisplayErrorContext(&e)))?;
            for object in page.contents() {
                if let Some(name) = object.key().and_then(|k| self.strip_prefix(k)) {
                    keys.push(name.to_string());
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(prefix: &str) -> S3BlobStore {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .build();
        S3BlobStore::new(Client::from_conf(config), "clinical-guides", prefix)
    }

    #[test]
    fn test_locator_without_prefix() {
        let store = store("");
        assert_eq!(
            store.locator("GER-1.Example Title.pdf"),
            "s3://clinical-guides/GER-1.Example Title.pdf"
        );
    }

    #[test]
    fn test_prefix_round_trip() {
        let store = store("/guides/");
        assert_eq!(store.object_key("a.pdf"), "guides/a.pdf");
        assert_eq!(store.locator("a.pdf"), "s3://clinical-guides/guides/a.pdf");
        assert_eq!(store.strip_prefix("guides/a.pdf"), Some("a.pdf"));
        assert_eq!(store.strip_prefix("guidesx/a.pdf"), None);
    }
}
