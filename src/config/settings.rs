//! Configuration settings for bucketfile
//!
//! Defines CLI arguments, backend selection, S3 connection settings and
//! the per-operation deadlines.

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default deadline for an upload
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(50);

/// Default deadline for a fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(50);

/// Default deadline for a full bucket listing
pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(10);

/// bucketfile - upload, fetch and list objects in a storage bucket
#[derive(Parser, Debug, Clone)]
#[command(name = "bucketfile")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Upload, fetch and list objects in a storage bucket")]
#[command(long_about = r#"
bucketfile wraps a cloud object store with three operations, each bounded by
a fixed deadline and failing with the name of the step that went wrong.

Examples:
  bucketfile upload ./report.csv my-bucket reports/report.csv
  cat data.bin | bucketfile upload - my-bucket data.bin
  bucketfile get my-bucket reports/report.csv -o report.csv
  bucketfile list my-bucket
  bucketfile --backend local --root /srv/buckets list my-bucket
"#)]
pub struct CliArgs {
    /// Storage backend
    #[arg(long, value_enum, env = "BUCKETFILE_BACKEND")]
    pub backend: Option<BackendKind>,

    /// Root directory holding bucket directories (local backend)
    #[arg(long, value_name = "DIR", env = "BUCKETFILE_ROOT")]
    pub root: Option<PathBuf>,

    /// AWS region (s3 backend)
    #[arg(long, value_name = "REGION")]
    pub region: Option<String>,

    /// Custom endpoint URL for S3-compatible services
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Use path-style bucket addressing (MinIO, Ceph)
    #[arg(long)]
    pub path_style: bool,

    /// JSON configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Upload deadline (e.g. 50s, 2m)
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub upload_timeout: Option<Duration>,

    /// Fetch deadline (e.g. 50s, 2m)
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub fetch_timeout: Option<Duration>,

    /// Listing deadline (e.g. 10s)
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub list_timeout: Option<Duration>,

    /// Output format for listings
    #[arg(long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Upload a file (or stdin with '-') to an object
    #[command(name = "upload")]
    Upload {
        /// Local file, or '-' for stdin
        file: String,
        /// Bucket name
        bucket: String,
        /// Object name
        object: String,
    },

    /// Download an object
    #[command(name = "get")]
    Get {
        /// Bucket name
        bucket: String,
        /// Object name
        object: String,
        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// List object names in a bucket
    #[command(name = "list")]
    List {
        /// Bucket name
        bucket: String,
    },
}

/// Storage backend selection
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// AWS S3 or an S3-compatible service
    #[default]
    S3,
    /// Directory on the local filesystem
    Local,
}

impl BackendKind {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Local => "local",
        }
    }
}

/// Output format for listings
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// One name per line
    #[default]
    Text,
    /// JSON array
    Json,
}

/// Log output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Text,
    /// Structured JSON lines
    Json,
}

/// S3 connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// AWS region (e.g., "us-east-1")
    pub region: String,
    /// Custom endpoint URL for S3-compatible services (MinIO, Wasabi)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for some S3-compatible services)
    pub force_path_style: bool,
    /// Access key ID (optional, falls back to AWS credential chain)
    pub access_key_id: Option<String>,
    /// Secret access key (optional, falls back to AWS credential chain)
    pub secret_access_key: Option<String>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint_url: None,
            force_path_style: false,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

impl S3Config {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            region: std::env::var("AWS_REGION")
                .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
                .unwrap_or_else(|_| "us-east-1".to_string()),
            endpoint_url: std::env::var("AWS_ENDPOINT_URL")
                .ok()
                .or_else(|| std::env::var("S3_ENDPOINT").ok()),
            force_path_style: std::env::var("S3_PATH_STYLE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
        }
    }

    /// Create config for MinIO
    pub fn minio(endpoint: &str, access_key: &str, secret_key: &str) -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint_url: Some(endpoint.to_string()),
            force_path_style: true, // MinIO requires path-style
            access_key_id: Some(access_key.to_string()),
            secret_access_key: Some(secret_key.to_string()),
        }
    }
}

/// Per-operation deadlines, measured from the start of each call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Upload deadline
    #[serde(with = "humantime_str")]
    pub upload: Duration,
    /// Fetch deadline
    #[serde(with = "humantime_str")]
    pub fetch: Duration,
    /// Listing deadline
    #[serde(with = "humantime_str")]
    pub list: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            upload: DEFAULT_UPLOAD_TIMEOUT,
            fetch: DEFAULT_FETCH_TIMEOUT,
            list: DEFAULT_LIST_TIMEOUT,
        }
    }
}

/// Serialize durations as humantime strings ("50s", "1m 30s")
mod humantime_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Complete store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// Which backend to talk to
    pub backend: BackendKind,
    /// Root directory for the local backend
    pub root: Option<PathBuf>,
    /// S3 settings
    pub s3: S3Config,
    /// Operation deadlines
    pub timeouts: Timeouts,
}

impl StoreConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            backend: std::env::var("BUCKETFILE_BACKEND")
                .ok()
                .and_then(|v| BackendKind::from_str(&v, true).ok())
                .unwrap_or_default(),
            root: std::env::var_os("BUCKETFILE_ROOT").map(PathBuf::from),
            s3: S3Config::from_env(),
            timeouts: Timeouts::default(),
        }
    }

    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read config file '{}': {}", path.display(), e))?;
        serde_json::from_str(&content)
            .map_err(|e| format!("Invalid config file '{}': {}", path.display(), e))
    }

    /// Create config from CLI arguments, layered over the config file or environment
    pub fn from_cli(args: &CliArgs) -> Result<Self, String> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::from_env(),
        };

        if let Some(backend) = args.backend {
            config.backend = backend;
        }
        if let Some(root) = &args.root {
            config.root = Some(root.clone());
        }
        if let Some(region) = &args.region {
            config.s3.region = region.clone();
        }
        if let Some(endpoint) = &args.endpoint {
            config.s3.endpoint_url = Some(endpoint.clone());
        }
        if args.path_style {
            config.s3.force_path_style = true;
        }
        if let Some(timeout) = args.upload_timeout {
            config.timeouts.upload = timeout;
        }
        if let Some(timeout) = args.fetch_timeout {
            config.timeouts.fetch = timeout;
        }
        if let Some(timeout) = args.list_timeout {
            config.timeouts.list = timeout;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.backend == BackendKind::Local && self.root.is_none() {
            return Err("Local backend requires a root directory (--root or BUCKETFILE_ROOT)".to_string());
        }
        let timeouts = &self.timeouts;
        if timeouts.upload.is_zero() || timeouts.fetch.is_zero() || timeouts.list.is_zero() {
            return Err("Timeouts must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Parse a human-readable duration ("50s", "2m", "1h 30m")
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value.trim()).map_err(|e| format!("Invalid duration '{}': {}", value, e))
}
