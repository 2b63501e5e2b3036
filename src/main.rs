use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use futures_util::StreamExt;
use serde_json::{Value, json};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use exif_session::document::DocumentError;
use exif_session::exiftool::{
    ExifToolConfig, ExifToolConfigBuilder, ExifToolError, ExifToolSession, ExifToolVersion,
};
use exif_session::logging::{LogConfig, init_logging};
use exif_session::metadata::{ExifCompact, ExifData};

/// Output shape for each file
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Flat record of commonly used fields
    Compact,
    /// Full metadata split into category groups
    Groups,
    /// The document exactly as exiftool returned it
    Raw,
}

/// CLI arguments for the exiftool metadata reader
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Files or directories to read metadata from
    #[arg(required = true, value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Output format, one JSON line per file
    #[arg(long, value_enum, default_value_t = OutputFormat::Compact)]
    format: OutputFormat,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Flag passed to exiftool once and applied to every request (repeatable)
    #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
    common_args: Vec<String>,

    /// Flag sent with each request (repeatable)
    #[arg(long = "flag", value_name = "FLAG", allow_hyphen_values = true)]
    flags: Vec<String>,

    /// Number of files queued on the session at once
    #[arg(long, default_value_t = 4, value_name = "N")]
    jobs: usize,

    /// Seconds to wait for each response before giving up on the session
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Path to exiftool executable (overrides EXIFTOOL_PATH env var)
    #[arg(long, value_name = "PATH")]
    exiftool_path: Option<String>,

    /// Log level (overrides RUST_LOG env var)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log file path (overrides EXIF_LOG_FILE env var)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

/// Expand the given paths into the list of files to read
fn collect_files(paths: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }

        let walker = WalkDir::new(path).sort_by_file_name();
        let walker = if recursive {
            walker
        } else {
            walker.max_depth(1)
        };

        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable entry under {}: {}", path.display(), e),
            }
        }
    }

    files
}

fn build_config(args: &Args) -> Result<ExifToolConfig, Box<dyn std::error::Error>> {
    let mut builder = ExifToolConfigBuilder::new()
        .exiftool_path(ExifToolConfig::resolve_exiftool_path(
            args.exiftool_path.clone(),
        ))
        .add_common_args(args.common_args.iter().cloned())
        .stderr_handler(|line| warn!(target: "exiftool", "{}", line));

    if let Some(secs) = args.timeout {
        builder = builder.response_timeout(Duration::from_secs(secs));
    }

    Ok(builder.build()?)
}

/// Read one file and shape it per the output format
async fn read_file(
    session: &ExifToolSession,
    path: &Path,
    flags: &[String],
    format: OutputFormat,
) -> Result<Value, ExifToolError> {
    let document = session
        .read_with_flags(flags, &path.to_string_lossy())
        .await?;

    let metadata = match format {
        OutputFormat::Raw => Ok(Value::Object(document)),
        OutputFormat::Groups => serde_json::to_value(ExifData::from_document(&document)),
        OutputFormat::Compact => serde_json::to_value(ExifCompact::from_exif_data(
            &ExifData::from_document(&document),
        )),
    };
    metadata.map_err(|e| ExifToolError::Document(DocumentError::Json(e)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging with configuration from env vars and CLI args
    let log_config =
        LogConfig::from_env().with_overrides(args.log_level.clone(), args.log_file.clone());

    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    match ExifToolVersion::detect(Path::new(&config.exiftool_path)) {
        Ok(version) => info!("Using exiftool {} at {}", version, config.exiftool_path),
        Err(e) => warn!("Could not detect exiftool version: {}", e),
    }

    let files = collect_files(&args.paths, args.recursive);
    info!("Reading metadata from {} files", files.len());

    let session = match ExifToolSession::start(config).await {
        Ok(session) => Arc::new(session),
        Err(e) => {
            eprintln!("Failed to start exiftool: {e}");
            std::process::exit(1);
        }
    };

    let mut results = futures_util::stream::iter(files)
        .map(|path| {
            let session = Arc::clone(&session);
            let flags = &args.flags;
            async move {
                let result = read_file(&session, &path, flags, args.format).await;
                (path, result)
            }
        })
        .buffered(args.jobs.max(1));

    let mut failures = 0usize;
    while let Some((path, result)) = results.next().await {
        match result {
            Ok(metadata) => {
                println!(
                    "{}",
                    json!({ "path": path.to_string_lossy(), "metadata": metadata })
                );
            }
            Err(e) => {
                failures += 1;
                error!("Failed to read {}: {}", path.display(), e);
                eprintln!("{}: {}", path.display(), e);
                if e.is_fatal() {
                    eprintln!("Exiftool session is no longer usable, stopping");
                    break;
                }
            }
        }
    }
    drop(results);

    if let Err(e) = session.stop().await {
        warn!("Exiftool shutdown reported errors: {}", e);
    }

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
