//! Configuration module for bucketfile
//!
//! Provides CLI arguments, config files, environment defaults and
//! operation deadlines.

mod settings;

pub use settings::*;
