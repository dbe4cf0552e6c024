//! Logging initialization and configuration checking
//!
//! This module provides:
//! - Logger initialization (console + optional file)
//! - Startup diagnostics for the fanout and bot settings

use anyhow::Result;
use std::fs::File;
use std::sync::Arc;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config;

/// Initialize logger for console and (optionally) file output
///
/// The crate logs through the `log` facade; `LogTracer` forwards those records into the
/// `tracing` subscriber built here. `RUST_LOG` controls verbosity, default `info`.
///
/// # Arguments
/// * `log_file_path` - Optional path to a log file (truncated on start)
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - A logger was already installed or the file could not be created
pub fn init_logger(log_file_path: Option<&str>) -> Result<()> {
    LogTracer::init().map_err(|e| anyhow::anyhow!("Failed to bridge log records: {}", e))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_file_path {
        Some(path) => {
            let file = File::create(path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs the effective fanout/bot configuration at startup
///
/// Secrets (bot token, connection strings) are reported only as set/unset.
pub fn log_startup_configuration() {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("Notification fanout configuration");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if config::DATABASE_URL.is_some() {
        log::info!("✅ DATABASE_URL: set");
    } else {
        log::error!("❌ DATABASE_URL: not set");
    }

    if config::BOT_TOKEN.is_empty() {
        log::error!("❌ BOT_TOKEN: not set");
    } else {
        log::info!("✅ BOT_TOKEN: set");
    }

    log::info!("   notify channel: {}", config::listener::CHANNEL.as_str());
    log::info!(
        "   fanout: {} guide(s) per chunk, {}ms pause",
        *config::fanout::CHUNK_SIZE,
        *config::fanout::CHUNK_PAUSE_MS
    );
    log::info!(
        "   poller: every {}s, batch {}, first-run look-back {}s",
        *config::poller::INTERVAL_SECS,
        *config::poller::BATCH_LIMIT,
        *config::poller::LOOKBACK_SECS
    );
    log::info!(
        "   click dedup window: {}ms (capacity {})",
        *config::interaction::CLICK_DEDUP_WINDOW_MS,
        *config::interaction::CLICK_DEDUP_CAPACITY
    );

    match config::REDIS_URL.as_deref() {
        Some(_) => log::info!("   interaction state: shared (Redis)"),
        None => log::info!("   interaction state: process-local"),
    }
}
