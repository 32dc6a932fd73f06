//! Error types for bucketfile
//!
//! Two layers: [`StorageError`] is what a storage backend reports for a
//! single primitive, [`BucketFileError`] is what the façade hands back,
//! tagged with the step that failed.

use std::time::Duration;
use thiserror::Error;

/// Failure reported by a storage backend
#[derive(Error, Debug)]
pub enum StorageError {
    /// Object does not exist
    #[error("object '{object}' not found in bucket '{bucket}'")]
    NotFound {
        /// Bucket that was searched
        bucket: String,
        /// Missing object name
        object: String,
    },

    /// Bucket does not exist
    #[error("bucket '{0}' not found")]
    BucketNotFound(String),

    /// Credentials are valid but not allowed to do this
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Name the backend cannot represent
    #[error("invalid object name: {0}")]
    InvalidName(String),

    /// The call's deadline passed before the primitive completed
    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// Local I/O failure (source stream, staging file, ...)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error reported by the service or its SDK
    #[error("{0}")]
    Service(String),
}

impl StorageError {
    /// Create a not-found error
    pub fn not_found(bucket: impl Into<String>, object: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            object: object.into(),
        }
    }

    /// Create a service error from anything printable
    pub fn service(message: impl std::fmt::Display) -> Self {
        Self::Service(message.to_string())
    }
}

/// Error returned by the façade operations
#[derive(Error, Debug)]
pub enum BucketFileError {
    /// Storage client could not be constructed
    #[error("storage client: {0}")]
    Connection(#[source] StorageError),

    /// Read or write channel could not be opened
    #[error("object '{object}' open: {source}")]
    Open {
        /// Object being opened
        object: String,
        /// Backend failure
        #[source]
        source: StorageError,
    },

    /// Byte copy or read failed, deadline expiry included
    #[error("transfer of '{object}': {source}")]
    Transfer {
        /// Object being copied
        object: String,
        /// Backend or source failure
        #[source]
        source: StorageError,
    },

    /// Write channel could not be finalized; the object was not written
    #[error("finalize of '{object}': {source}")]
    Commit {
        /// Object that was not written
        object: String,
        /// Backend failure
        #[source]
        source: StorageError,
    },

    /// Listing page request failed
    #[error("bucket '{bucket}' listing: {source}")]
    Listing {
        /// Bucket being listed
        bucket: String,
        /// Backend failure
        #[source]
        source: StorageError,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl BucketFileError {
    /// Create an open error
    pub fn open(object: impl Into<String>, source: StorageError) -> Self {
        Self::Open {
            object: object.into(),
            source,
        }
    }

    /// Create a transfer error
    pub fn transfer(object: impl Into<String>, source: StorageError) -> Self {
        Self::Transfer {
            object: object.into(),
            source,
        }
    }

    /// Create a commit error
    pub fn commit(object: impl Into<String>, source: StorageError) -> Self {
        Self::Commit {
            object: object.into(),
            source,
        }
    }

    /// Create a listing error
    pub fn listing(bucket: impl Into<String>, source: StorageError) -> Self {
        Self::Listing {
            bucket: bucket.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Short tag naming the step that failed
    pub fn step(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connect",
            Self::Open { .. } => "open",
            Self::Transfer { .. } => "transfer",
            Self::Commit { .. } => "commit",
            Self::Listing { .. } => "list",
            Self::Config(_) => "config",
        }
    }

    /// Underlying backend error, if any
    pub fn storage_error(&self) -> Option<&StorageError> {
        match self {
            Self::Connection(source)
            | Self::Open { source, .. }
            | Self::Transfer { source, .. }
            | Self::Commit { source, .. }
            | Self::Listing { source, .. } => Some(source),
            Self::Config(_) => None,
        }
    }

    /// Check whether the cause is a missing object or bucket
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.storage_error(),
            Some(StorageError::NotFound { .. } | StorageError::BucketNotFound(_))
        )
    }

    /// Check whether the cause is an expired deadline
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self.storage_error(), Some(StorageError::DeadlineExceeded(_)))
    }
}

/// Result type alias for bucketfile operations
pub type Result<T> = std::result::Result<T, BucketFileError>;

/// Result type alias for backend primitives
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Failed listing, carrying the names gathered before the failure
#[derive(Error, Debug)]
#[error("{error} ({} names listed before failure)", .names.len())]
pub struct PartialListing {
    /// Names accumulated before the failure, in listing order
    pub names: Vec<String>,
    /// What went wrong
    #[source]
    pub error: BucketFileError,
}

impl PartialListing {
    /// Split into the partial names and the error
    pub fn into_parts(self) -> (Vec<String>, BucketFileError) {
        (self.names, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_tags() {
        let err = BucketFileError::Connection(StorageError::service("no credentials"));
        assert_eq!(err.step(), "connect");

        let err = BucketFileError::open("a.txt", StorageError::not_found("b", "a.txt"));
        assert_eq!(err.step(), "open");
        assert!(err.is_not_found());

        let err = BucketFileError::commit("a.txt", StorageError::service("409"));
        assert_eq!(err.step(), "commit");
        assert!(!err.is_not_found());

        assert_eq!(BucketFileError::config("bad").step(), "config");
        assert!(BucketFileError::config("bad").storage_error().is_none());
    }

    #[test]
    fn test_open_error_names_object() {
        let err = BucketFileError::open("reports/q1.csv", StorageError::not_found("b", "reports/q1.csv"));
        let message = err.to_string();
        assert!(message.contains("reports/q1.csv"));
        assert!(message.starts_with("object 'reports/q1.csv' open"));
    }

    #[test]
    fn test_deadline_detection() {
        let err = BucketFileError::transfer("x", StorageError::DeadlineExceeded(Duration::from_secs(50)));
        assert!(err.is_deadline_exceeded());
        assert_eq!(err.step(), "transfer");
    }

    #[test]
    fn test_partial_listing_keeps_names() {
        let partial = PartialListing {
            names: vec!["a".to_string(), "b".to_string()],
            error: BucketFileError::listing("bkt", StorageError::service("page 3 failed")),
        };
        assert!(partial.to_string().contains("2 names"));
        let (names, error) = partial.into_parts();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(error.step(), "list");
    }
}
