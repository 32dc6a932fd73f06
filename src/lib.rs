//! # bucketfile - upload, fetch and list objects in a storage bucket
//!
//! A small façade over an object store with three operations, each of
//! which opens its own client, runs under a fixed deadline, and fails with
//! an error naming the step that went wrong:
//!
//! - **upload**: stream bytes into an object (50s deadline by default)
//! - **fetch**: read a whole object into memory (50s)
//! - **list_names**: every object name in a bucket (10s); on failure the
//!   names gathered so far come back with the error
//!
//! Backends: AWS S3 and S3-compatible services (feature `s3`), a local
//! directory, and an in-memory store for tests.
//!
//! ## Quick Start
//!
//! ```no_run
//! # async fn demo() -> bucketfile::Result<()> {
//! let mut file = tokio::fs::File::open("report.csv").await.unwrap();
//! bucketfile::upload(&mut file, "my-bucket", "reports/report.csv").await?;
//!
//! let data = bucketfile::fetch("my-bucket", "reports/report.csv").await?;
//! println!("{} bytes", data.len());
//!
//! match bucketfile::list_names("my-bucket").await {
//!     Ok(names) => println!("{:?}", names),
//!     Err(partial) => eprintln!("listed {} before: {}", partial.names.len(), partial.error),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Explicit backend
//!
//! ```
//! use bucketfile::storage::MemoryStore;
//! use bucketfile::BucketFiles;
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//! store.create_bucket("bkt");
//! let files = BucketFiles::new(store);
//!
//! let mut source: &[u8] = b"hello";
//! files.upload(&mut source, "bkt", "greeting").await.unwrap();
//! assert_eq!(files.fetch("bkt", "greeting").await.unwrap(), b"hello");
//! assert_eq!(files.list_names("bkt").await.unwrap(), vec!["greeting"]);
//! # });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod facade;
pub mod storage;

// Re-export commonly used types
pub use config::{BackendKind, StoreConfig, Timeouts};
pub use error::{BucketFileError, PartialListing, Result, StorageError};
pub use facade::BucketFiles;

use tokio::io::AsyncRead;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upload `source` to `bucket/object` using the backend configured in the environment.
pub async fn upload<R>(source: &mut R, bucket: &str, object: &str) -> Result<u64>
where
    R: AsyncRead + Unpin + Send + ?Sized,
{
    BucketFiles::from_env()?.upload(source, bucket, object).await
}

/// Fetch `bucket/object` using the backend configured in the environment.
pub async fn fetch(bucket: &str, object: &str) -> Result<Vec<u8>> {
    BucketFiles::from_env()?.fetch(bucket, object).await
}

/// List `bucket` using the backend configured in the environment.
pub async fn list_names(bucket: &str) -> std::result::Result<Vec<String>, PartialListing> {
    let files = BucketFiles::from_env().map_err(|error| PartialListing {
        names: Vec::new(),
        error,
    })?;
    files.list_names(bucket).await
}

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use bucketfile::prelude::*;
    //! ```

    pub use crate::config::{BackendKind, StoreConfig, Timeouts};
    pub use crate::error::{BucketFileError, PartialListing, Result, StorageError};
    pub use crate::facade::BucketFiles;
    pub use crate::storage::{Connector, ListPage, LocalStore, MemoryStore, ObjectReader, ObjectWriter, StorageClient};
    #[cfg(feature = "s3")]
    pub use crate::storage::S3Connector;
}
