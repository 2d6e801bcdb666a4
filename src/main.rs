//! Wayfarer Daemon
//!
//! Serves the trip planning and check-in HTTP API over a local SQLite
//! database.
//!
//! ## Usage
//!
//! ```bash
//! # Start with a cipher key from the environment
//! CIPHER_KEY=... wayfarer
//!
//! # Start with custom config
//! wayfarer --config /path/to/config.toml
//!
//! # Local development with a built-in key and JSON logs
//! wayfarer --dev-mode --log-json --http-port 8081
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use wayfarer::config::DEV_CIPHER_KEY;
use wayfarer::services::events::spawn_logging_listener;
use wayfarer::{Config, HttpServer, Services, TripDb};

#[derive(Parser, Debug)]
#[command(name = "wayfarer")]
#[command(about = "Trip planning backend with check-in tracking")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "WAYFARER_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, env = "HTTP_PORT")]
    http_port: Option<u16>,

    /// Shared key for check-in payloads
    #[arg(long, env = "CIPHER_KEY", hide_env_values = true)]
    cipher_key: Option<String>,

    /// Fall back to a built-in insecure cipher key
    #[arg(long, env = "DEV_MODE")]
    dev_mode: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("wayfarer=info".parse()?);
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json)?;

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)
            .with_context(|| format!("loading config from {}", config_path.display()))?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(key) = args.cipher_key {
        config.cipher_key = key;
    }
    if config.cipher_key.is_empty() && args.dev_mode {
        warn!("No cipher key configured, using the insecure development key");
        config.cipher_key = DEV_CIPHER_KEY.to_string();
    }
    config.validate()?;

    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        receipt_ttl_secs = config.receipt_ttl_secs,
        "Starting wayfarer"
    );

    // Ensure storage directory exists
    tokio::fs::create_dir_all(&config.storage_dir).await?;

    // Save default config if it doesn't exist (without the key)
    let config_path = config.config_path();
    if !config_path.exists() {
        let persisted = Config {
            cipher_key: String::new(),
            ..config.clone()
        };
        persisted.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let db = Arc::new(TripDb::open(&config.database_path())?);
    let services = Arc::new(Services::new(db.clone(), &config));
    let listener = spawn_logging_listener(services.events.clone());

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let http_server = Arc::new(HttpServer::new(services.clone(), http_addr));

    info!("HTTP API available at http://{}", http_addr);
    info!("Press Ctrl+C to stop.");

    // Handle shutdown signal
    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    listener.abort();

    if let Ok(stats) = db.stats() {
        info!(
            users = stats.users,
            check_ins = stats.check_ins,
            open_route_logs = stats.open_route_logs,
            "Final database stats"
        );
    }

    Ok(())
}
