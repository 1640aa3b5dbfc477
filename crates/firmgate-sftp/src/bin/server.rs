//! SFTP Bridge Server Binary
//!
//! NIST 800-53: AU-2 (Audit Events), AU-12 (Audit Generation)
//! Implementation: Firmware distribution endpoint with JSON logging for SIEM integration
//!
//! Run with: cargo run --bin firmgate-sftp-server

use clap::Parser;
use firmgate_db::Database;
use firmgate_sftp::{Authenticator, Config, LogFormat, Server};
use firmgate_store::{S3Config, S3ObjectStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Port to listen on
    #[arg(short, long, default_value = "2222")]
    port: u16,

    /// Host key path
    #[arg(long)]
    host_key: Option<PathBuf>,

    /// Bucket holding the firmware namespace
    #[arg(long)]
    bucket: Option<String>,

    /// Custom S3 endpoint URL (MinIO, localstack)
    #[arg(long)]
    s3_endpoint: Option<String>,

    /// Verbose logging (debug level)
    #[arg(short, long)]
    verbose: bool,

    /// Log format (json or text)
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Log file path
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Load or create configuration
    let mut config = if let Some(config_path) = args.config {
        match Config::from_file(&config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load config: {e}");
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    config.bind_address = args.bind;
    config.port = args.port;

    if let Some(host_key) = args.host_key {
        config.host_key_path = host_key;
    }

    if let Some(bucket) = args.bucket {
        config.s3.bucket = bucket;
    }

    if let Some(endpoint) = args.s3_endpoint {
        config.s3.endpoint = Some(endpoint);
        config.s3.force_path_style = true;
    }

    if let Some(log_format) = args.log_format {
        config.logging.format = log_format;
    }

    if let Some(log_file) = args.log_file {
        config.logging.file = Some(log_file);
    }

    if args.verbose {
        config.logging.level = "debug".to_string();
    }

    // Initialize logging with JSON support for SIEM integration
    // NIST 800-53 AU-12: Audit Generation
    let _log_guard = init_logging(&mut config);

    info!(
        event = "server_starting",
        version = env!("CARGO_PKG_VERSION"),
        "Starting Firmgate SFTP bridge"
    );

    info!(
        event = "server_configuration",
        bind_address = %config.bind_address,
        port = config.port,
        bucket = %config.s3.bucket,
        s3_endpoint = ?config.s3.endpoint,
        host_key_path = ?config.host_key_path,
        max_file_size = config.max_file_size,
        max_handles = config.max_handles,
        log_format = ?config.logging.format,
        "SFTP bridge configuration"
    );

    if let Err(e) = config.validate() {
        error!(
            event = "configuration_validation_failed",
            error = %e,
            "Configuration validation failed"
        );
        std::process::exit(1);
    }

    // Credential store
    let Some(database_url) = config.database_url() else {
        error!(event = "missing_database_url", "No credential store URL configured");
        std::process::exit(1);
    };

    let db = match Database::connect(&database_url).await {
        Ok(db) => db,
        Err(e) => {
            error!(
                event = "database_connection_failed",
                error = %e,
                "Failed to connect to credential store"
            );
            std::process::exit(1);
        }
    };

    let authenticator = match Authenticator::new(db) {
        Ok(a) => a,
        Err(e) => {
            error!(event = "authenticator_init_failed", error = %e, "Failed to initialize authenticator");
            std::process::exit(1);
        }
    };

    // Object store backend
    let store = S3ObjectStore::connect(S3Config {
        region: config.s3.region.clone(),
        bucket: config.s3.bucket.clone(),
        endpoint: config.s3.endpoint.clone(),
        force_path_style: config.s3.force_path_style,
        op_timeout: config.op_timeout(),
    })
    .await;

    let server = match Server::new(config, Arc::new(store), authenticator).await {
        Ok(s) => {
            info!(event = "server_created", "SFTP bridge created successfully");
            s
        }
        Err(e) => {
            error!(
                event = "server_creation_failed",
                error = %e,
                "Failed to create server"
            );
            std::process::exit(1);
        }
    };

    info!(
        event = "server_running",
        "SFTP bridge is now running and accepting connections"
    );

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(event = "server_error", error = %e, "Server encountered an error");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!(event = "shutdown_signal", "Received shutdown signal");
        }
    }

    info!(event = "server_shutdown", "SFTP bridge shutdown complete");
}

/// Set up the tracing subscriber, returning the appender guard when
/// logging to a file.
fn init_logging(config: &mut Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    if let Some(log_file) = config.logging.file.clone() {
        let parent = log_file.parent().map(PathBuf::from);
        if let Some(ref dir) = parent {
            if !dir.exists() {
                if let Err(e) = std::fs::create_dir_all(dir) {
                    eprintln!("Warning: Failed to create log directory: {e}");
                    eprintln!("Falling back to stderr logging");
                    config.logging.file = None;
                }
            }
        }

        if config.logging.file.is_some() {
            if let (Some(dir), Some(file_name)) = (parent, log_file.file_name()) {
                let file_appender =
                    tracing_appender::rolling::daily(dir, file_name.to_string_lossy().as_ref());
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                match config.logging.format {
                    LogFormat::Json => {
                        tracing_subscriber::fmt()
                            .json()
                            .with_env_filter(EnvFilter::new(config.logging.level.clone()))
                            .with_writer(non_blocking)
                            .with_current_span(true)
                            .with_span_list(true)
                            .init();
                    }
                    LogFormat::Text => {
                        tracing_subscriber::fmt()
                            .with_env_filter(EnvFilter::new(config.logging.level.clone()))
                            .with_writer(non_blocking)
                            .init();
                    }
                }

                return Some(guard);
            }
            config.logging.file = None;
        }
    }

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(EnvFilter::new(config.logging.level.clone()))
                .with_current_span(true)
                .with_span_list(true)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new(config.logging.level.clone()))
                .init();
        }
    }

    None
}
