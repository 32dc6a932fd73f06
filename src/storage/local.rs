//! Local filesystem storage backend
//!
//! A root directory plays the role of the service: every bucket is a
//! sub-directory and every object a file beneath it (object names with `/`
//! become nested directories). Writes are staged in a hidden directory in
//! the bucket and renamed into place on finalize, so a half-written object
//! is never visible.

use super::client::{Connector, ListPage, ObjectReader, ObjectWriter, StorageClient};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use walkdir::WalkDir;

/// Directory inside each bucket holding uncommitted writes
pub const STAGING_DIR: &str = ".bucketfile-staging";

/// Default number of names per listing page
pub const DEFAULT_PAGE_SIZE: usize = 1000;

const READ_CHUNK_SIZE: usize = 64 * 1024;

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Filesystem-backed object store
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    page_size: usize,
}

impl LocalStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the number of names per listing page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[async_trait]
impl Connector for LocalStore {
    async fn connect(&self) -> StorageResult<Box<dyn StorageClient>> {
        let meta = tokio::fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(StorageError::service(format!(
                "storage root '{}' is not a directory",
                self.root.display()
            )));
        }
        Ok(Box::new(LocalClient {
            root: self.root.clone(),
            page_size: self.page_size,
            snapshot: Mutex::new(None),
        }))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

struct LocalClient {
    root: PathBuf,
    page_size: usize,
    /// Names from the walk made for the first page of the current listing
    snapshot: Mutex<Option<Snapshot>>,
}

struct Snapshot {
    bucket: String,
    names: Arc<Vec<String>>,
}

/// Resolve `name` to a relative path made only of normal components.
fn relative_path(name: &str) -> StorageResult<PathBuf> {
    let path = Path::new(name);
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            _ => return Err(StorageError::InvalidName(name.to_string())),
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(relative)
}

impl LocalClient {
    async fn bucket_dir(&self, bucket: &str) -> StorageResult<PathBuf> {
        let relative = relative_path(bucket)?;
        if relative.components().count() != 1 {
            return Err(StorageError::InvalidName(bucket.to_string()));
        }
        let dir = self.root.join(relative);
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(StorageError::BucketNotFound(bucket.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::BucketNotFound(bucket.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn object_path(bucket_dir: &Path, object: &str) -> StorageResult<PathBuf> {
        let relative = relative_path(object)?;
        if relative.starts_with(STAGING_DIR) {
            return Err(StorageError::InvalidName(object.to_string()));
        }
        Ok(bucket_dir.join(relative))
    }

    fn snapshot_for(&self, bucket: &str) -> Option<Arc<Vec<String>>> {
        let snapshot = self.snapshot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        snapshot
            .as_ref()
            .filter(|snapshot| snapshot.bucket == bucket)
            .map(|snapshot| Arc::clone(&snapshot.names))
    }
}

#[async_trait]
impl StorageClient for LocalClient {
    async fn open_writer(&self, bucket: &str, object: &str) -> StorageResult<Box<dyn ObjectWriter>> {
        let bucket_dir = self.bucket_dir(bucket).await?;
        let target = Self::object_path(&bucket_dir, object)?;

        let staging = bucket_dir.join(STAGING_DIR);
        tokio::fs::create_dir_all(&staging).await?;
        let staged = staging.join(format!(
            "{}-{}.part",
            std::process::id(),
            STAGING_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let file = File::create(&staged).await?;

        tracing::debug!("Staging '{}' at {}", object, staged.display());
        Ok(Box::new(LocalWriter {
            file,
            staged,
            target,
            pending: true,
        }))
    }

    async fn open_reader(&self, bucket: &str, object: &str) -> StorageResult<Box<dyn ObjectReader>> {
        let bucket_dir = self.bucket_dir(bucket).await?;
        let path = Self::object_path(&bucket_dir, object)?;

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(StorageError::not_found(bucket, object)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(bucket, object))
            }
            Err(e) => return Err(e.into()),
        }

        let file = File::open(&path).await?;
        Ok(Box::new(LocalReader { file }))
    }

    async fn list_page(&self, bucket: &str, token: Option<String>) -> StorageResult<ListPage> {
        let bucket_dir = self.bucket_dir(bucket).await?;

        // The bucket is walked once per listing; later pages reuse that walk
        let cached = match token {
            Some(_) => self.snapshot_for(bucket),
            None => None,
        };
        let names = match cached {
            Some(names) => names,
            None => {
                let names = tokio::task::spawn_blocking(move || scan_bucket(&bucket_dir))
                    .await
                    .map_err(|e| StorageError::service(format!("listing task failed: {}", e)))??;
                let names = Arc::new(names);
                *self.snapshot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Snapshot {
                    bucket: bucket.to_string(),
                    names: Arc::clone(&names),
                });
                names
            }
        };

        Ok(page_after(&names, token.as_deref(), self.page_size))
    }
}

/// All committed object names under `bucket_dir`, sorted
fn scan_bucket(bucket_dir: &Path) -> StorageResult<Vec<String>> {
    let mut names = Vec::new();
    let walker = WalkDir::new(bucket_dir)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !(entry.depth() == 1 && entry.file_name() == STAGING_DIR));

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(bucket_dir) else {
            continue;
        };
        let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
        match parts {
            Some(parts) => names.push(parts.join("/")),
            None => tracing::warn!("Skipping non UTF-8 object path {}", entry.path().display()),
        }
    }

    names.sort();
    Ok(names)
}

/// Page of at most `page_size` names strictly after `token`
fn page_after(names: &[String], token: Option<&str>, page_size: usize) -> ListPage {
    let start = token.map_or(0, |t| names.partition_point(|name| name.as_str() <= t));
    let remaining = &names[start..];
    if remaining.len() <= page_size {
        return ListPage::last(remaining.to_vec());
    }
    let page = remaining[..page_size].to_vec();
    let next = page.last().cloned();
    ListPage { names: page, next }
}

struct LocalWriter {
    file: File,
    staged: PathBuf,
    target: PathBuf,
    /// Staged file exists and was not renamed into place
    pending: bool,
}

impl LocalWriter {
    async fn commit(&mut self) -> io::Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        if let Some(parent) = self.target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // No await from here on: a finalize dropped earlier never renames
        std::fs::rename(&self.staged, &self.target)?;
        self.pending = false;
        Ok(())
    }
}

impl Drop for LocalWriter {
    fn drop(&mut self) {
        if self.pending {
            let _ = std::fs::remove_file(&self.staged);
        }
    }
}

#[async_trait]
impl ObjectWriter for LocalWriter {
    async fn write(&mut self, data: &[u8]) -> StorageResult<()> {
        self.file.write_all(data).await?;
        Ok(())
    }

    async fn finalize(&mut self) -> StorageResult<()> {
        if !self.pending {
            return Ok(());
        }
        if let Err(e) = self.commit().await {
            if tokio::fs::remove_file(&self.staged).await.is_ok() {
                self.pending = false;
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn abort(mut self: Box<Self>) -> StorageResult<()> {
        if !self.pending {
            return Ok(());
        }
        match tokio::fs::remove_file(&self.staged).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.pending = false;
        Ok(())
    }
}

struct LocalReader {
    file: File,
}

#[async_trait]
impl ObjectReader for LocalReader {
    async fn read_chunk(&mut self) -> StorageResult<Option<Bytes>> {
        let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
        let n = self.file.read_buf(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(buf.freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with_bucket(bucket: &str) -> (TempDir, LocalStore) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(bucket)).unwrap();
        let store = LocalStore::new(dir.path());
        (dir, store)
    }

    async fn read_all(reader: &mut Box<dyn ObjectReader>) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = reader.read_chunk().await.unwrap() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[test]
    fn test_relative_path_rejects_escapes() {
        assert!(relative_path("a/b/c.txt").is_ok());
        assert!(relative_path("../etc/passwd").is_err());
        assert!(relative_path("/abs").is_err());
        assert!(relative_path("").is_err());
        assert!(relative_path("a/./b").is_ok());
    }

    #[test]
    fn test_page_after() {
        let names: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let first = page_after(&names, None, 2);
        assert_eq!(first.names, vec!["a", "b"]);
        assert_eq!(first.next.as_deref(), Some("b"));

        let second = page_after(&names, first.next.as_deref(), 2);
        assert_eq!(second.names, vec!["c"]);
        assert!(second.is_last());

        let exact = page_after(&names, None, 3);
        assert_eq!(exact.names.len(), 3);
        assert!(exact.is_last());
    }

    #[tokio::test]
    async fn test_write_is_staged_until_finalize() {
        let (dir, store) = store_with_bucket("bkt");
        let client = store.connect().await.unwrap();

        let mut writer = client.open_writer("bkt", "nested/obj.bin").await.unwrap();
        writer.write(b"payload").await.unwrap();
        let target = dir.path().join("bkt").join("nested").join("obj.bin");
        assert!(!target.exists());

        writer.finalize().await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"payload");

        let staging = dir.path().join("bkt").join(STAGING_DIR);
        assert_eq!(std::fs::read_dir(staging).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_abort_discards_staged_bytes() {
        let (dir, store) = store_with_bucket("bkt");
        let client = store.connect().await.unwrap();

        let mut writer = client.open_writer("bkt", "obj").await.unwrap();
        writer.write(b"half").await.unwrap();
        writer.abort().await.unwrap();

        assert!(!dir.path().join("bkt").join("obj").exists());
        let staging = dir.path().join("bkt").join(STAGING_DIR);
        assert_eq!(std::fs::read_dir(staging).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_writer_removes_staged_file() {
        let (dir, store) = store_with_bucket("bkt");
        let client = store.connect().await.unwrap();

        let mut writer = client.open_writer("bkt", "obj").await.unwrap();
        writer.write(b"never committed").await.unwrap();
        drop(writer);

        assert!(!dir.path().join("bkt").join("obj").exists());
        let staging = dir.path().join("bkt").join(STAGING_DIR);
        assert_eq!(std::fs::read_dir(staging).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_abort_after_finalize_keeps_object() {
        let (dir, store) = store_with_bucket("bkt");
        let client = store.connect().await.unwrap();

        let mut writer = client.open_writer("bkt", "obj").await.unwrap();
        writer.write(b"kept").await.unwrap();
        writer.finalize().await.unwrap();
        writer.abort().await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("bkt").join("obj")).unwrap(), b"kept");
    }

    #[tokio::test]
    async fn test_reader_and_not_found() {
        let (dir, store) = store_with_bucket("bkt");
        std::fs::write(dir.path().join("bkt").join("hello.txt"), b"hi there").unwrap();
        let client = store.connect().await.unwrap();

        let mut reader = client.open_reader("bkt", "hello.txt").await.unwrap();
        assert_eq!(read_all(&mut reader).await, b"hi there");
        reader.close().await.unwrap();

        let err = client.open_reader("bkt", "missing").await.err().unwrap();
        assert!(matches!(err, StorageError::NotFound { .. }));

        let err = client.open_reader("other", "hello.txt").await.err().unwrap();
        assert!(matches!(err, StorageError::BucketNotFound(_)));
    }

    #[tokio::test]
    async fn test_listing_skips_staging_and_sorts() {
        let (dir, store) = store_with_bucket("bkt");
        let bucket = dir.path().join("bkt");
        std::fs::create_dir_all(bucket.join("a")).unwrap();
        std::fs::create_dir_all(bucket.join(STAGING_DIR)).unwrap();
        std::fs::write(bucket.join("a").join("b"), b"1").unwrap();
        std::fs::write(bucket.join("a.txt"), b"2").unwrap();
        std::fs::write(bucket.join("z"), b"3").unwrap();
        std::fs::write(bucket.join(STAGING_DIR).join("1-0.part"), b"4").unwrap();

        let store = store.with_page_size(2);
        let client = store.connect().await.unwrap();

        let first = client.list_page("bkt", None).await.unwrap();
        assert_eq!(first.names, vec!["a.txt", "a/b"]);
        let second = client.list_page("bkt", first.next).await.unwrap();
        assert_eq!(second.names, vec!["z"]);
        assert!(second.is_last());
    }

    #[tokio::test]
    async fn test_later_pages_reuse_first_walk() {
        let (dir, store) = store_with_bucket("bkt");
        let bucket = dir.path().join("bkt");
        for name in ["a", "b", "c"] {
            std::fs::write(bucket.join(name), b"x").unwrap();
        }
        let client = store.with_page_size(2).connect().await.unwrap();

        let first = client.list_page("bkt", None).await.unwrap();
        assert_eq!(first.names, vec!["a", "b"]);

        // written after the walk, so not part of this listing
        std::fs::write(bucket.join("bb"), b"x").unwrap();
        let second = client.list_page("bkt", first.next).await.unwrap();
        assert_eq!(second.names, vec!["c"]);
        assert!(second.is_last());

        let fresh = client.list_page("bkt", None).await.unwrap();
        assert_eq!(fresh.names, vec!["a", "b"]);
        assert_eq!(fresh.next.as_deref(), Some("b"));
        let rest = client.list_page("bkt", fresh.next).await.unwrap();
        assert_eq!(rest.names, vec!["bb", "c"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_listing_skips_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let (dir, store) = store_with_bucket("bkt");
        let bucket = dir.path().join("bkt");
        std::fs::write(bucket.join("ok.txt"), b"1").unwrap();
        std::fs::write(bucket.join(OsStr::from_bytes(b"bad\xff")), b"2").unwrap();

        let client = store.connect().await.unwrap();
        let page = client.list_page("bkt", None).await.unwrap();
        assert_eq!(page.names, vec!["ok.txt"]);
    }

    #[tokio::test]
    async fn test_connect_requires_root() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().join("absent"));
        assert!(store.connect().await.is_err());
    }
}
