use crate::config::BridgeConfig;
use crate::domain::model::{ObjectBody, StorageObjectRef};
use crate::domain::ports::ObjectStore;
use crate::utils::error::{BridgeError, Result};
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::head_bucket::HeadBucketError;
use aws_sdk_s3::primitives::{ByteStream, Length};
use aws_sdk_s3::Client as S3Client;
use tokio::fs::File;

#[derive(Debug, Clone)]
pub struct S3Storage {
    client: S3Client,
}

impl S3Storage {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }

    /// Static credentials, explicit endpoint, path-style addressing and no SDK
    /// retries; a failed call is reported to the caller as-is.
    pub async fn from_config(config: &BridgeConfig) -> Self {
        let credentials = Credentials::new(
            config.aws_access_key_id.clone(),
            config.aws_secret_access_key.clone(),
            None,
            None,
            "colab-bridge",
        );
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.s3_region.clone()))
            .endpoint_url(&config.s3_endpoint_url)
            .credentials_provider(credentials)
            .retry_config(RetryConfig::disabled())
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();
        Self::new(S3Client::from_conf(s3_config))
    }
}

/// Transport failures become `StorageConnection`; anything the service answered
/// becomes `StorageClient`.
fn map_sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> BridgeError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let message = format!("{} failed: {}", operation, DisplayErrorContext(&err));
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            BridgeError::StorageConnection { message }
        }
        _ => BridgeError::StorageClient { message },
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(err) => {
                tracing::warn!("Minio connection error: {}", DisplayErrorContext(&err));
                let missing = err.as_service_error().is_some_and(HeadBucketError::is_not_found)
                    || err
                        .raw_response()
                        .is_some_and(|response| response.status().as_u16() == 404);
                if missing {
                    return Err(BridgeError::NoSuchBucket {
                        bucket: bucket.to_string(),
                    });
                }
                Err(map_sdk_error("HeadBucket", err))
            }
        }
    }

    async fn list_prefix(&self, bucket: &str, prefix: &str) -> Result<Vec<StorageObjectRef>> {
        let mut objects = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| {
                tracing::warn!("Minio list objects error: {}", DisplayErrorContext(&err));
                map_sdk_error("ListObjectsV2", err)
            })?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    objects.push(StorageObjectRef {
                        key: key.to_string(),
                        size_bytes: object.size().unwrap_or(0).max(0) as u64,
                    });
                }
            }
        }

        tracing::debug!("listed {} object(s) under {}/{}", objects.len(), bucket, prefix);
        Ok(objects)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: File,
        size_bytes: u64,
    ) -> Result<()> {
        let body = ByteStream::read_from()
            .file(content)
            .length(Length::Exact(size_bytes))
            .build()
            .await
            .map_err(|err| BridgeError::StorageClient {
                message: format!("PutObject failed: cannot read {}: {}", key, err),
            })?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(size_bytes as i64)
            .body(body)
            .send()
            .await
            .map_err(|err| {
                tracing::warn!("Minio file upload error: {}", DisplayErrorContext(&err));
                map_sdk_error("PutObject", err)
            })?;

        tracing::info!("uploaded {} ({} bytes) to bucket {}", key, size_bytes, bucket);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                tracing::warn!("Minio get object error: {}", DisplayErrorContext(&err));
                map_sdk_error("GetObject", err)
            })?;

        let size_bytes = response.content_length().unwrap_or(0).max(0) as u64;
        Ok(ObjectBody {
            reader: Box::pin(response.body.into_async_read()),
            size_bytes,
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                tracing::warn!("Minio file delete error: {}", DisplayErrorContext(&err));
                map_sdk_error("DeleteObject", err)
            })?;
        Ok(())
    }
}
