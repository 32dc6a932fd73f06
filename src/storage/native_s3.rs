//! Native AWS S3 SDK backend
//!
//! Talks to AWS S3 or any S3-compatible endpoint (MinIO, Wasabi, Ceph)
//! through the AWS SDK. Credentials come from explicit configuration when
//! given, otherwise from the default AWS provider chain.
//!
//! Writes are buffered client-side. Small objects are sent with a single
//! `PutObject` on finalize; once the buffer reaches [`MULTIPART_PART_SIZE`]
//! a multipart upload is started and parts are streamed as they fill, with
//! `CompleteMultipartUpload` issued on finalize. Either way nothing is
//! visible in the bucket until finalize succeeds, and an abort after a
//! failed or interrupted finalize removes any uploaded parts.

use super::client::{Connector, ListPage, ObjectReader, ObjectWriter, StorageClient};
use crate::config::S3Config;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;

/// Part size for multipart upload: 8 MB.
pub const MULTIPART_PART_SIZE: usize = 8 * 1024 * 1024;

/// Connector producing a fresh SDK client per call.
#[derive(Debug, Clone)]
pub struct S3Connector {
    config: S3Config,
}

impl S3Connector {
    /// Create a connector from configuration.
    pub fn new(config: S3Config) -> Self {
        Self { config }
    }

    async fn build_client(&self) -> aws_sdk_s3::Client {
        let config = &self.config;
        let mut aws_config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        // Set custom endpoint for S3-compatible services
        if let Some(ref endpoint) = config.endpoint_url {
            aws_config_builder = aws_config_builder.endpoint_url(endpoint);
        }

        if let (Some(ref key_id), Some(ref secret)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let creds = aws_credential_types::Credentials::new(
                key_id,
                secret,
                None, // session token
                None, // expiry
                "bucketfile-static",
            );
            aws_config_builder = aws_config_builder.credentials_provider(creds);
        }

        let aws_config = aws_config_builder.load().await;

        let mut s3_config = aws_sdk_s3::config::Builder::from(&aws_config);
        if config.force_path_style {
            s3_config = s3_config.force_path_style(true);
        }

        aws_sdk_s3::Client::from_conf(s3_config.build())
    }
}

#[async_trait]
impl Connector for S3Connector {
    async fn connect(&self) -> StorageResult<Box<dyn StorageClient>> {
        if self.config.region.trim().is_empty() {
            return Err(StorageError::service("S3 region is not set"));
        }
        let client = self.build_client().await;
        Ok(Box::new(S3Client { client }))
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}

/// Map an SDK failure to a storage error, recognising the codes callers care about.
fn sdk_error<E, R>(bucket: &str, operation: &str, err: SdkError<E, R>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    match err.code() {
        Some("NoSuchBucket") => StorageError::BucketNotFound(bucket.to_string()),
        Some("AccessDenied") => StorageError::PermissionDenied(format!(
            "S3 {} on bucket '{}'",
            operation, bucket
        )),
        _ => StorageError::Service(format!(
            "S3 {} failed: {}",
            operation,
            DisplayErrorContext(&err)
        )),
    }
}

struct S3Client {
    client: aws_sdk_s3::Client,
}

#[async_trait]
impl StorageClient for S3Client {
    async fn open_writer(&self, bucket: &str, object: &str) -> StorageResult<Box<dyn ObjectWriter>> {
        Ok(Box::new(S3Writer {
            client: self.client.clone(),
            bucket: bucket.to_string(),
            key: object.to_string(),
            buffer: Vec::new(),
            multipart: None,
        }))
    }

    async fn open_reader(&self, bucket: &str, object: &str) -> StorageResult<Box<dyn ObjectReader>> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(object)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::not_found(bucket, object)
                } else {
                    sdk_error(bucket, "get_object", e)
                }
            })?;

        Ok(Box::new(S3Reader { body: resp.body }))
    }

    async fn list_page(&self, bucket: &str, token: Option<String>) -> StorageResult<ListPage> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_continuation_token(token)
            .send()
            .await
            .map_err(|e| sdk_error(bucket, "list_objects_v2", e))?;

        let names = resp
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(str::to_string))
            .collect();

        Ok(ListPage {
            names,
            next: resp.next_continuation_token().map(str::to_string),
        })
    }
}

/// In-flight multipart upload
struct Multipart {
    upload_id: String,
    parts: Vec<CompletedPart>,
}

struct S3Writer {
    client: aws_sdk_s3::Client,
    bucket: String,
    key: String,
    buffer: Vec<u8>,
    multipart: Option<Multipart>,
}

impl S3Writer {
    async fn start_multipart(&self) -> StorageResult<Multipart> {
        let create = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await
            .map_err(|e| sdk_error(&self.bucket, "create_multipart_upload", e))?;

        let upload_id = create
            .upload_id()
            .ok_or_else(|| StorageError::service("S3 create_multipart_upload: missing upload_id"))?
            .to_string();

        tracing::debug!("Started multipart upload {} for {}", upload_id, self.key);
        Ok(Multipart {
            upload_id,
            parts: Vec::new(),
        })
    }

    async fn upload_part(&mut self, chunk: Vec<u8>) -> StorageResult<()> {
        if self.multipart.is_none() {
            self.multipart = Some(self.start_multipart().await?);
        }
        let Some(multipart) = self.multipart.as_mut() else {
            return Err(StorageError::service("S3 multipart upload not started"));
        };

        let part_number = multipart.parts.len() as i32 + 1;
        let resp = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&multipart.upload_id)
            .part_number(part_number)
            .body(ByteStream::from(chunk))
            .send()
            .await
            .map_err(|e| sdk_error(&self.bucket, "upload_part", e))?;

        multipart.parts.push(
            CompletedPart::builder()
                .part_number(part_number)
                .set_e_tag(resp.e_tag().map(str::to_string))
                .build(),
        );
        Ok(())
    }

    async fn complete(&mut self) -> StorageResult<()> {
        let remaining = std::mem::take(&mut self.buffer);

        if self.multipart.is_none() {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&self.key)
                .body(ByteStream::from(remaining))
                .send()
                .await
                .map_err(|e| sdk_error(&self.bucket, "put_object", e))?;
            return Ok(());
        }

        if !remaining.is_empty() {
            self.upload_part(remaining).await?;
        }

        let Some(multipart) = self.multipart.as_ref() else {
            return Err(StorageError::service("S3 multipart upload not started"));
        };
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(multipart.parts.clone()))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&multipart.upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| sdk_error(&self.bucket, "complete_multipart_upload", e))?;
        Ok(())
    }

    async fn abort_multipart(&mut self) -> StorageResult<()> {
        let Some(multipart) = self.multipart.take() else {
            return Ok(());
        };
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&multipart.upload_id)
            .send()
            .await
            .map_err(|e| sdk_error(&self.bucket, "abort_multipart_upload", e))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectWriter for S3Writer {
    async fn write(&mut self, data: &[u8]) -> StorageResult<()> {
        self.buffer.extend_from_slice(data);
        while self.buffer.len() >= MULTIPART_PART_SIZE {
            let rest = self.buffer.split_off(MULTIPART_PART_SIZE);
            let part = std::mem::replace(&mut self.buffer, rest);
            self.upload_part(part).await?;
        }
        Ok(())
    }

    async fn finalize(&mut self) -> StorageResult<()> {
        self.complete().await?;
        // Completed uploads have nothing left to abort
        self.multipart = None;
        Ok(())
    }

    async fn abort(mut self: Box<Self>) -> StorageResult<()> {
        self.buffer.clear();
        self.abort_multipart().await
    }
}

struct S3Reader {
    body: ByteStream,
}

#[async_trait]
impl ObjectReader for S3Reader {
    async fn read_chunk(&mut self) -> StorageResult<Option<Bytes>> {
        match self.body.next().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(StorageError::Service(format!(
                "S3 body read failed: {}",
                DisplayErrorContext(&e)
            ))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_size_is_above_s3_minimum() {
        assert!(MULTIPART_PART_SIZE >= 5 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_region() {
        let connector = S3Connector::new(S3Config {
            region: "  ".to_string(),
            ..Default::default()
        });
        assert!(connector.connect().await.is_err());
        assert_eq!(connector.name(), "s3");
    }

    #[tokio::test]
    async fn test_connect_with_static_credentials() {
        let connector = S3Connector::new(S3Config::minio(
            "http://127.0.0.1:9000",
            "minioadmin",
            "minioadmin",
        ));
        assert!(connector.connect().await.is_ok());
    }
}
