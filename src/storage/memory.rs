//! In-memory storage backend
//!
//! Keeps buckets in a process-local map. Intended for tests and demos: it
//! can inject failures at each primitive and add artificial latency to the
//! data path so deadline handling can be exercised without a live service.

use super::client::{Connector, ListPage, ObjectReader, ObjectWriter, StorageClient};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Default number of names per listing page
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Chunk size handed out by readers
const READ_CHUNK_SIZE: usize = 64 * 1024;

type Buckets = BTreeMap<String, BTreeMap<String, Bytes>>;

#[derive(Debug, Clone, Default)]
struct Faults {
    fail_connect: bool,
    fail_commit: bool,
    fail_read: bool,
    fail_listing_after: Option<usize>,
    latency: Option<Duration>,
}

#[derive(Debug)]
struct Shared {
    buckets: Mutex<Buckets>,
    faults: Mutex<Faults>,
    page_size: AtomicUsize,
    live_clients: AtomicUsize,
    connections: AtomicUsize,
    open_readers: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory object store. Clones share the same buckets.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                buckets: Mutex::new(BTreeMap::new()),
                faults: Mutex::new(Faults::default()),
                page_size: AtomicUsize::new(DEFAULT_PAGE_SIZE),
                live_clients: AtomicUsize::new(0),
                connections: AtomicUsize::new(0),
                open_readers: AtomicUsize::new(0),
            }),
        }
    }

    /// Create a bucket; no-op if it already exists
    pub fn create_bucket(&self, bucket: &str) {
        lock(&self.shared.buckets).entry(bucket.to_string()).or_default();
    }

    /// Store an object directly, bypassing the client
    pub fn put(&self, bucket: &str, object: &str, data: impl Into<Bytes>) {
        lock(&self.shared.buckets)
            .entry(bucket.to_string())
            .or_default()
            .insert(object.to_string(), data.into());
    }

    /// Read an object directly, bypassing the client
    pub fn get(&self, bucket: &str, object: &str) -> Option<Bytes> {
        lock(&self.shared.buckets)
            .get(bucket)
            .and_then(|objects| objects.get(object).cloned())
    }

    /// Names currently stored in `bucket`, sorted
    pub fn object_names(&self, bucket: &str) -> Vec<String> {
        lock(&self.shared.buckets)
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Names per listing page (minimum 1)
    pub fn set_page_size(&self, page_size: usize) {
        self.shared.page_size.store(page_size.max(1), Ordering::SeqCst);
    }

    /// Make `connect` fail
    pub fn set_fail_connect(&self, fail: bool) {
        lock(&self.shared.faults).fail_connect = fail;
    }

    /// Make `finalize` fail
    pub fn set_fail_commit(&self, fail: bool) {
        lock(&self.shared.faults).fail_commit = fail;
    }

    /// Make `read_chunk` fail after opening succeeded
    pub fn set_fail_read(&self, fail: bool) {
        lock(&self.shared.faults).fail_read = fail;
    }

    /// Fail the listing once `pages` pages were served by a client
    pub fn fail_listing_after(&self, pages: Option<usize>) {
        lock(&self.shared.faults).fail_listing_after = pages;
    }

    /// Delay applied to every write, read and listing primitive
    pub fn set_latency(&self, latency: Option<Duration>) {
        lock(&self.shared.faults).latency = latency;
    }

    /// Clients currently alive
    pub fn live_clients(&self) -> usize {
        self.shared.live_clients.load(Ordering::SeqCst)
    }

    /// Clients ever created
    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Read channels opened and not yet closed
    pub fn open_readers(&self) -> usize {
        self.shared.open_readers.load(Ordering::SeqCst)
    }

    fn faults(&self) -> Faults {
        lock(&self.shared.faults).clone()
    }
}

#[async_trait]
impl Connector for MemoryStore {
    async fn connect(&self) -> StorageResult<Box<dyn StorageClient>> {
        if self.faults().fail_connect {
            return Err(StorageError::service("memory store: connection refused"));
        }
        self.shared.connections.fetch_add(1, Ordering::SeqCst);
        self.shared.live_clients.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryClient {
            store: self.clone(),
            pages_served: AtomicUsize::new(0),
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryClient {
    store: MemoryStore,
    pages_served: AtomicUsize,
}

impl Drop for MemoryClient {
    fn drop(&mut self) {
        self.store.shared.live_clients.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn delay(store: &MemoryStore) {
    if let Some(latency) = store.faults().latency {
        tokio::time::sleep(latency).await;
    }
}

#[async_trait]
impl StorageClient for MemoryClient {
    async fn open_writer(&self, bucket: &str, object: &str) -> StorageResult<Box<dyn ObjectWriter>> {
        Ok(Box::new(MemoryWriter {
            store: self.store.clone(),
            bucket: bucket.to_string(),
            object: object.to_string(),
            buffer: Vec::new(),
        }))
    }

    async fn open_reader(&self, bucket: &str, object: &str) -> StorageResult<Box<dyn ObjectReader>> {
        let data = {
            let buckets = lock(&self.store.shared.buckets);
            let objects = buckets
                .get(bucket)
                .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
            objects
                .get(object)
                .cloned()
                .ok_or_else(|| StorageError::not_found(bucket, object))?
        };
        self.store.shared.open_readers.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryReader {
            store: self.store.clone(),
            remaining: data,
        }))
    }

    async fn list_page(&self, bucket: &str, token: Option<String>) -> StorageResult<ListPage> {
        delay(&self.store).await;

        let served = self.pages_served.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.store.faults().fail_listing_after {
            if served >= limit {
                return Err(StorageError::service(format!(
                    "memory store: listing failed on page {}",
                    served + 1
                )));
            }
        }

        let page_size = self.store.shared.page_size.load(Ordering::SeqCst);
        let buckets = lock(&self.store.shared.buckets);
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;

        let start = match token.as_deref() {
            Some(after) => Bound::Excluded(after),
            None => Bound::Unbounded,
        };
        let mut remaining = objects.range::<str, _>((start, Bound::Unbounded)).map(|(name, _)| name);
        let names: Vec<String> = remaining.by_ref().take(page_size).cloned().collect();
        let next = if remaining.next().is_some() {
            names.last().cloned()
        } else {
            None
        };

        Ok(ListPage { names, next })
    }
}

struct MemoryWriter {
    store: MemoryStore,
    bucket: String,
    object: String,
    buffer: Vec<u8>,
}

#[async_trait]
impl ObjectWriter for MemoryWriter {
    async fn write(&mut self, data: &[u8]) -> StorageResult<()> {
        delay(&self.store).await;
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    async fn finalize(&mut self) -> StorageResult<()> {
        if self.store.faults().fail_commit {
            return Err(StorageError::service("memory store: commit rejected"));
        }
        let mut buckets = lock(&self.store.shared.buckets);
        let objects = buckets
            .get_mut(&self.bucket)
            .ok_or_else(|| StorageError::BucketNotFound(self.bucket.clone()))?;
        objects.insert(self.object.clone(), Bytes::from(std::mem::take(&mut self.buffer)));
        Ok(())
    }
}

struct MemoryReader {
    store: MemoryStore,
    remaining: Bytes,
}

#[async_trait]
impl ObjectReader for MemoryReader {
    async fn read_chunk(&mut self) -> StorageResult<Option<Bytes>> {
        delay(&self.store).await;
        if self.store.faults().fail_read {
            return Err(StorageError::service("memory store: connection reset"));
        }
        if self.remaining.is_empty() {
            return Ok(None);
        }
        let take = self.remaining.len().min(READ_CHUNK_SIZE);
        Ok(Some(self.remaining.split_to(take)))
    }

    async fn close(self: Box<Self>) -> StorageResult<()> {
        self.store.shared.open_readers.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
