//! S3 (or S3-compatible) object store through the AWS SDK
//!
//! Requests are SigV4-signed by the SDK. Static credentials from the
//! configuration take precedence; otherwise the SDK's default provider chain
//! (environment, profile, instance metadata) is used. Path-style addressing
//! is opt-in for MinIO and similar services.

use super::{ObjectStorage, StoredObject};
use crate::config::StorageConfig;
use crate::errors::{StorageError, StorageResult};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{
    Credentials, Region, RequestChecksumCalculation, ResponseChecksumValidation,
};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use bytes::Bytes;
use sandboxed_file_store::detect_content_type;
use std::time::SystemTime;
use tracing::{debug, trace};

const CREDENTIALS_PROVIDER: &str = "image-resizer-config";

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub async fn new(config: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(config.request_timeout)
                    .build(),
            );

        if let Some(endpoint) = config.endpoint_url() {
            loader = loader.endpoint_url(endpoint);
        }

        if let Some(key) = config.access_key.as_deref().filter(|key| !key.is_empty()) {
            loader = loader.credentials_provider(Credentials::new(
                key,
                config.secret_key.clone().unwrap_or_default(),
                None,
                None,
                CREDENTIALS_PROVIDER,
            ));
        }

        let shared = loader.load().await;
        // Checksums only when an operation requires them; several
        // S3-compatible stores reject aws-chunked trailing checksums.
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.path_style)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .response_checksum_validation(ResponseChecksumValidation::WhenRequired)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStore {
    async fn get_object(&self, key: &str) -> StorageResult<StoredObject> {
        trace!("GetObject {}/{}", self.bucket, key);

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let no_such_key = e.as_service_error().is_some_and(|e| e.is_no_such_key());
                if no_such_key || status_of(&e) == Some(404) {
                    StorageError::NotFound {
                        path: key.to_string(),
                    }
                } else {
                    StorageError::transport(key, DisplayErrorContext(&e))
                }
            })?;

        let last_modified = output
            .last_modified()
            .and_then(to_system_time)
            .unwrap_or_else(SystemTime::now);
        let content = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::transport(key, e))?
            .into_bytes();

        debug!("Fetched {} ({} bytes)", key, content.len());
        Ok(StoredObject {
            content,
            last_modified,
        })
    }

    async fn head_last_modified(&self, key: &str) -> StorageResult<Option<SystemTime>> {
        trace!("HeadObject {}/{}", self.bucket, key);

        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output
                .last_modified()
                .and_then(to_system_time)
                .map(Some)
                .ok_or_else(|| StorageError::InvalidResponse {
                    path: key.to_string(),
                    message: "missing or invalid Last-Modified header".to_string(),
                }),
            Err(e)
                if e.as_service_error().is_some_and(|e| e.is_not_found())
                    || status_of(&e) == Some(404) =>
            {
                Ok(None)
            }
            Err(e) => Err(StorageError::transport(key, DisplayErrorContext(&e))),
        }
    }

    async fn put_object(&self, key: &str, content: Bytes) -> StorageResult<()> {
        let content_type = detect_content_type(key, &content).mime_type;
        trace!(
            "PutObject {}/{} ({}, {} bytes)",
            self.bucket,
            key,
            content_type,
            content.len()
        );

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .content_disposition("attachment")
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|e| StorageError::transport(key, DisplayErrorContext(&e)))?;
        Ok(())
    }
}

fn status_of<E>(err: &SdkError<E>) -> Option<u16> {
    err.raw_response().map(|response| response.status().as_u16())
}

fn to_system_time(time: &DateTime) -> Option<SystemTime> {
    SystemTime::try_from(*time).ok()
}
