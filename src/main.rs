//! bucketfile CLI - upload, fetch and list objects in a storage bucket

use anyhow::{anyhow, Result};
use bucketfile::config::{CliArgs, Commands, LogFormat, OutputFormat, StoreConfig};
use bucketfile::BucketFiles;
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn main() {
    let args = CliArgs::parse();

    init_logging(&args);

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(args: &CliArgs) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match args.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn run(args: CliArgs) -> Result<()> {
    let config = StoreConfig::from_cli(&args).map_err(|e| anyhow!(e))?;

    if args.verbose > 1 {
        print_config(&config);
    }

    let files = BucketFiles::from_config(&config)?;
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| anyhow!("Cannot start async runtime: {}", e))?;

    match &args.command {
        Commands::Upload { file, bucket, object } => {
            runtime.block_on(cmd_upload(&files, file, bucket, object, args.quiet))
        }
        Commands::Get { bucket, object, output } => {
            runtime.block_on(cmd_get(&files, bucket, object, output.as_deref(), args.quiet))
        }
        Commands::List { bucket } => runtime.block_on(cmd_list(&files, bucket, args.output_format)),
    }
}

async fn cmd_upload(files: &BucketFiles, file: &str, bucket: &str, object: &str, quiet: bool) -> Result<()> {
    let written = if file == "-" {
        let mut stdin = tokio::io::stdin();
        files.upload(&mut stdin, bucket, object).await?
    } else {
        let path = PathBuf::from(file);
        let mut source = tokio::fs::File::open(&path)
            .await
            .map_err(|e| anyhow!("Cannot open '{}': {}", path.display(), e))?;
        files.upload(&mut source, bucket, object).await?
    };

    if !quiet {
        eprintln!(
            "Uploaded {} to {}/{}",
            humansize::format_size(written, humansize::BINARY),
            bucket,
            object
        );
    }
    Ok(())
}

async fn cmd_get(
    files: &BucketFiles,
    bucket: &str,
    object: &str,
    output: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let data = files.fetch(bucket, object).await?;

    let written = match output {
        Some(path) => tokio::fs::write(path, &data)
            .await
            .map_err(|e| anyhow!("Cannot write '{}': {}", path.display(), e)),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&data)
                .and_then(|_| stdout.flush())
                .map_err(|e| anyhow!("Cannot write to stdout: {}", e))
        }
    };
    written?;

    if !quiet && output.is_some() {
        eprintln!(
            "Fetched {} from {}/{}",
            humansize::format_size(data.len() as u64, humansize::BINARY),
            bucket,
            object
        );
    }
    Ok(())
}

async fn cmd_list(files: &BucketFiles, bucket: &str, format: OutputFormat) -> Result<()> {
    let (names, failure) = match files.list_names(bucket).await {
        Ok(names) => (names, None),
        Err(partial) => {
            let (names, error) = partial.into_parts();
            (names, Some(error))
        }
    };

    // Partial results are printed before the error is reported
    match format {
        OutputFormat::Text => {
            for name in &names {
                println!("{}", name);
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&names)
                .map_err(|e| anyhow!("Cannot encode listing: {}", e))?;
            println!("{}", json);
        }
    }

    match failure {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

fn print_config(config: &StoreConfig) {
    eprintln!("=== Configuration ===");
    eprintln!("Backend:     {}", config.backend.name());
    if let Some(ref root) = config.root {
        eprintln!("Root:        {}", root.display());
    }
    eprintln!("Region:      {}", config.s3.region);
    if let Some(ref endpoint) = config.s3.endpoint_url {
        eprintln!("Endpoint:    {}", endpoint);
    }
    eprintln!("Path style:  {}", config.s3.force_path_style);
    eprintln!("Upload:      {}", humantime::format_duration(config.timeouts.upload));
    eprintln!("Fetch:       {}", humantime::format_duration(config.timeouts.fetch));
    eprintln!("List:        {}", humantime::format_duration(config.timeouts.list));
    eprintln!();
}
