//! Storage capability interface
//!
//! The façade only ever talks to a backend through these traits:
//! connect, open a writer and finalize it, open a reader and close it,
//! and request one listing page at a time.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;

/// One page of a bucket listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Object names on this page, in listing order
    pub names: Vec<String>,
    /// Token for the next page; `None` marks the end of the listing
    pub next: Option<String>,
}

impl ListPage {
    /// Final page holding `names`
    pub fn last(names: Vec<String>) -> Self {
        Self { names, next: None }
    }

    /// True when no further page follows
    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}

/// Produces a fresh, authenticated client per call.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a client. Dropping the client releases it.
    async fn connect(&self) -> StorageResult<Box<dyn StorageClient>>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// A connected client scoped to a single façade call.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Open a write channel for `bucket/object`.
    async fn open_writer(&self, bucket: &str, object: &str) -> StorageResult<Box<dyn ObjectWriter>>;

    /// Open a read channel for `bucket/object`.
    async fn open_reader(&self, bucket: &str, object: &str) -> StorageResult<Box<dyn ObjectReader>>;

    /// Fetch one listing page. `token` is `None` for the first page.
    async fn list_page(&self, bucket: &str, token: Option<String>) -> StorageResult<ListPage>;
}

/// Write channel. Bytes are not visible until [`ObjectWriter::finalize`] succeeds.
#[async_trait]
pub trait ObjectWriter: Send {
    /// Append bytes to the pending object.
    async fn write(&mut self, data: &[u8]) -> StorageResult<()>;

    /// Commit the object.
    ///
    /// The writer stays with the caller either way; after a failure, or if
    /// this future is dropped before completing, [`ObjectWriter::abort`]
    /// discards whatever the backend still holds.
    async fn finalize(&mut self) -> StorageResult<()>;

    /// Discard anything written so far. A no-op after a successful finalize.
    async fn abort(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}

/// Read channel over an existing object.
#[async_trait]
pub trait ObjectReader: Send {
    /// Next chunk of the object, `None` once exhausted.
    async fn read_chunk(&mut self) -> StorageResult<Option<Bytes>>;

    /// Release the channel.
    async fn close(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}
