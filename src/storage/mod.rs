//! Object storage module
//!
//! The capability traits the façade is written against, plus three
//! backends: native S3 (feature `s3`), a local directory, and an
//! in-memory store with fault injection.

mod client;
mod local;
mod memory;
#[cfg(feature = "s3")]
mod native_s3;

pub use client::*;
pub use local::{LocalStore, STAGING_DIR};
pub use memory::MemoryStore;
#[cfg(feature = "s3")]
pub use native_s3::{S3Connector, MULTIPART_PART_SIZE};
