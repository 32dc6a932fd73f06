//! Bucket file façade
//!
//! Three independent entry points: [`BucketFiles::upload`],
//! [`BucketFiles::fetch`] and [`BucketFiles::list_names`]. Each call opens
//! its own client, runs every step under one absolute deadline taken at
//! call entry, drops the client on the way out, and tags any failure with
//! the step that produced it. Nothing is retried.

use crate::config::{BackendKind, StoreConfig, Timeouts};
use crate::error::{BucketFileError, PartialListing, Result, StorageError, StorageResult};
use crate::storage::{Connector, LocalStore, ObjectReader, ObjectWriter, StorageClient};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

/// Buffer size for copying the upload source into the write channel
pub const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Run `fut` until `deadline`, reporting expiry as [`StorageError::DeadlineExceeded`].
async fn bounded<T, F>(deadline: Instant, budget: Duration, fut: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::DeadlineExceeded(budget)),
    }
}

/// Run a cleanup step (abort or close) until `deadline`.
///
/// The step is always polled at least once, even past the deadline. If it
/// has not finished by then it is moved to a background task so the call
/// can return on time.
async fn release_by<F>(deadline: Instant, what: String, cleanup: F)
where
    F: Future<Output = StorageResult<()>> + Send + 'static,
{
    let mut cleanup = Box::pin(cleanup);
    let outcome = tokio::time::timeout_at(deadline, &mut cleanup).await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("{} failed: {}", what, e),
        Err(_) => {
            tracing::debug!("{} still running at the deadline, finishing in background", what);
            tokio::spawn(async move {
                if let Err(e) = cleanup.await {
                    tracing::warn!("{} failed: {}", what, e);
                }
            });
        }
    }
}

/// Copy `source` to exhaustion into `writer`, returning the byte count.
async fn copy_into<R>(source: &mut R, writer: &mut dyn ObjectWriter) -> StorageResult<u64>
where
    R: AsyncRead + Unpin + Send + ?Sized,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        writer.write(&buf[..n]).await?;
        total += n as u64;
    }
}

/// Read `reader` to exhaustion into memory.
async fn read_to_end(reader: &mut dyn ObjectReader) -> StorageResult<Vec<u8>> {
    let mut data = Vec::new();
    while let Some(chunk) = reader.read_chunk().await? {
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

/// Stateless upload/fetch/list façade over a storage backend.
///
/// Cloning is cheap; clones share the connector but never a client.
#[derive(Clone)]
pub struct BucketFiles {
    connector: Arc<dyn Connector>,
    timeouts: Timeouts,
}

impl std::fmt::Debug for BucketFiles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketFiles")
            .field("backend", &self.connector.name())
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl BucketFiles {
    /// Create a façade over `connector` with the default deadlines.
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Arc::new(connector),
            timeouts: Timeouts::default(),
        }
    }

    /// Replace the deadlines.
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Build the backend named by `config`.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        config.validate().map_err(BucketFileError::Config)?;

        let files = match config.backend {
            BackendKind::Local => {
                let root = config.root.clone().ok_or_else(|| {
                    BucketFileError::config("local backend requires a root directory")
                })?;
                Self::new(LocalStore::new(root))
            }
            #[cfg(feature = "s3")]
            BackendKind::S3 => Self::new(crate::storage::S3Connector::new(config.s3.clone())),
            #[cfg(not(feature = "s3"))]
            BackendKind::S3 => {
                return Err(BucketFileError::config(
                    "built without the 's3' feature; use the local backend",
                ))
            }
        };

        Ok(files.with_timeouts(config.timeouts))
    }

    /// Build from environment variables (see [`StoreConfig::from_env`]).
    pub fn from_env() -> Result<Self> {
        Self::from_config(&StoreConfig::from_env())
    }

    /// Current deadlines
    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Name of the backend in use
    pub fn backend_name(&self) -> &'static str {
        self.connector.name()
    }

    async fn connect(&self, deadline: Instant, budget: Duration) -> Result<Box<dyn StorageClient>> {
        bounded(deadline, budget, self.connector.connect())
            .await
            .map_err(BucketFileError::Connection)
    }

    /// Upload everything readable from `source` to `bucket/object`.
    ///
    /// The source is only borrowed; the caller still owns it afterwards.
    /// The object is created or overwritten only if the final commit
    /// succeeds. Returns the number of bytes written.
    pub async fn upload<R>(&self, source: &mut R, bucket: &str, object: &str) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let budget = self.timeouts.upload;
        let deadline = Instant::now() + budget;
        tracing::debug!("Uploading {}/{} via {} (deadline {:?})", bucket, object, self.backend_name(), budget);

        let client = self.connect(deadline, budget).await?;

        let mut writer = bounded(deadline, budget, client.open_writer(bucket, object))
            .await
            .map_err(|e| BucketFileError::open(object, e))?;

        let copied = bounded(deadline, budget, copy_into(source, writer.as_mut())).await;
        let written = match copied {
            Ok(written) => written,
            Err(e) => {
                tracing::warn!("Upload of {}/{} failed during copy: {}", bucket, object, e);
                release_by(deadline, format!("Discarding partial upload of {}", object), writer.abort()).await;
                return Err(BucketFileError::transfer(object, e));
            }
        };

        let committed = bounded(deadline, budget, writer.finalize()).await;
        if let Err(e) = committed {
            tracing::warn!("Upload of {}/{} failed to commit: {}", bucket, object, e);
            release_by(deadline, format!("Discarding uncommitted upload of {}", object), writer.abort()).await;
            return Err(BucketFileError::commit(object, e));
        }

        tracing::info!("Uploaded {}/{} ({} bytes)", bucket, object, written);
        Ok(written)
    }

    /// Fetch the full contents of `bucket/object` into memory.
    ///
    /// There is no size cap. On failure no partial content is returned.
    pub async fn fetch(&self, bucket: &str, object: &str) -> Result<Vec<u8>> {
        let budget = self.timeouts.fetch;
        let deadline = Instant::now() + budget;
        tracing::debug!("Fetching {}/{} via {} (deadline {:?})", bucket, object, self.backend_name(), budget);

        let client = self.connect(deadline, budget).await?;

        let mut reader = bounded(deadline, budget, client.open_reader(bucket, object))
            .await
            .map_err(|e| BucketFileError::open(object, e))?;

        let read = bounded(deadline, budget, read_to_end(reader.as_mut())).await;
        release_by(deadline, format!("Closing reader for {}/{}", bucket, object), reader.close()).await;

        let data = read.map_err(|e| BucketFileError::transfer(object, e))?;
        tracing::info!("Fetched {}/{} ({} bytes)", bucket, object, data.len());
        Ok(data)
    }

    /// List every object name in `bucket`, in listing order.
    ///
    /// On failure the names gathered before the failing page are returned
    /// inside the [`PartialListing`] error.
    pub async fn list_names(&self, bucket: &str) -> std::result::Result<Vec<String>, PartialListing> {
        let budget = self.timeouts.list;
        let deadline = Instant::now() + budget;
        tracing::debug!("Listing {} via {} (deadline {:?})", bucket, self.backend_name(), budget);

        let mut names = Vec::new();
        let client = match self.connect(deadline, budget).await {
            Ok(client) => client,
            Err(error) => return Err(PartialListing { names, error }),
        };

        let mut token = None;
        let mut pages = 0usize;
        loop {
            match bounded(deadline, budget, client.list_page(bucket, token.take())).await {
                Ok(page) => {
                    pages += 1;
                    names.extend(page.names);
                    match page.next {
                        Some(next) => token = Some(next),
                        None => break,
                    }
                }
                Err(e) => {
                    tracing::warn!("Listing {} failed after {} pages ({} names): {}", bucket, pages, names.len(), e);
                    return Err(PartialListing {
                        names,
                        error: BucketFileError::listing(bucket, e),
                    });
                }
            }
        }

        tracing::info!("Listed {} ({} names, {} pages)", bucket, names.len(), pages);
        Ok(names)
    }
}
