use anyhow::Result;
use dotenvy::dotenv;
use sqlx::postgres::PgPool;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tokio::time::sleep;

use guidebot::cli::{Cli, Commands};
use guidebot::core::{config, init_logger, log_startup_configuration};
use guidebot::fanout::{
    spawn_discoverer, BackupPoller, ChangeListener, Discoverer, FanoutDispatcher, FanoutSettings, PollerSettings,
    Trigger,
};
use guidebot::storage::{create_pool, run_migrations, PgStore, Store};
use guidebot::telegram::{
    create_bot, schema, setup_bot_commands, ClickDedup, DedupSettings, HandlerDeps, Interaction, MemoryClickDedup,
    MemoryPendingReplies, Messenger, PendingReplies, RedisClickDedup, RedisPendingReplies, TelegramMessenger,
};
use uuid::Uuid;

const MAX_DISPATCHER_RETRIES: u32 = 5;
const BOT_API_STARTUP_RETRIES: u32 = 12;

/// Main entry point
///
/// Parses CLI arguments and dispatches to the requested subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, database, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Load .env before any config static is read
    let _ = dotenv();

    init_logger(config::LOG_FILE_PATH.as_deref())?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_bot().await,
        Commands::Migrate => run_migrate().await,
        Commands::Dispatch { request_id } => run_dispatch(request_id).await,
        Commands::PollOnce { lookback_secs } => run_poll_once(lookback_secs).await,
    }
}

/// Connect to Postgres and apply migrations unless RUN_MIGRATIONS=false
async fn connect_database() -> Result<PgPool> {
    let url = config::database_url()?;
    let pool = create_pool(url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create database pool: {}", e))?;

    if *config::database::RUN_MIGRATIONS {
        run_migrations(&pool).await?;
        log::info!("Database migrations applied");
    }
    Ok(pool)
}

/// Build the dispatcher over Postgres and the Bot API
fn build_dispatcher(pool: &PgPool, bot: &Bot, settings: FanoutSettings) -> Arc<FanoutDispatcher> {
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));
    let messenger: Arc<dyn Messenger> = Arc::new(TelegramMessenger::new(bot.clone()));
    Arc::new(FanoutDispatcher::new(store, messenger, settings))
}

/// Pending replies and click dedup: Redis when REDIS_URL is set, process-local otherwise
fn interaction_stores() -> Result<(Arc<dyn PendingReplies>, Arc<dyn ClickDedup>)> {
    let dedup_settings = DedupSettings::from_env();
    match config::REDIS_URL.as_deref() {
        Some(url) => {
            let client = redis::Client::open(url).map_err(|e| anyhow::anyhow!("Invalid REDIS_URL: {}", e))?;
            log::info!("Pending replies and click dedup stored in Redis");
            Ok((
                Arc::new(RedisPendingReplies::new(
                    client.clone(),
                    config::interaction::pending_reply_ttl(),
                )),
                Arc::new(RedisClickDedup::new(client, dedup_settings.window)),
            ))
        }
        None => {
            log::info!("Pending replies and click dedup kept in process memory");
            Ok((
                Arc::new(MemoryPendingReplies::new()),
                Arc::new(MemoryClickDedup::new(dedup_settings)),
            ))
        }
    }
}

async fn run_bot() -> Result<()> {
    log::info!("Starting bot...");
    guidebot::core::metrics::init_metrics();
    log_startup_configuration();

    let bot = create_bot()?;

    // Retry while a local Bot API server is still starting
    let bot_info = {
        let mut attempt = 0;
        loop {
            match bot.get_me().await {
                Ok(info) => break info,
                Err(e) => {
                    attempt += 1;
                    if attempt >= BOT_API_STARTUP_RETRIES {
                        return Err(anyhow::anyhow!(
                            "Failed to connect to Bot API after {} attempts: {}",
                            attempt,
                            e
                        ));
                    }
                    log::warn!(
                        "Bot API not ready (attempt {}/{}): {}. Retrying in 5 seconds...",
                        attempt,
                        BOT_API_STARTUP_RETRIES,
                        e
                    );
                    sleep(Duration::from_secs(5)).await;
                }
            }
        }
    };
    log::info!("Bot username: {:?}, Bot ID: {}", bot_info.username.as_deref(), bot_info.id);

    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to publish bot commands: {}", e);
    }

    let pool = connect_database().await?;

    if *config::metrics::ENABLED {
        let metrics_port = *config::metrics::PORT;
        log::info!("Starting metrics server on port {}", metrics_port);
        tokio::spawn(async move {
            if let Err(e) = guidebot::core::metrics_server::start_metrics_server(metrics_port).await {
                log::error!("Metrics server error: {}", e);
            }
        });
    } else {
        log::info!("Metrics collection disabled (METRICS_ENABLED=false)");
    }

    let dispatcher = build_dispatcher(&pool, &bot, FanoutSettings::from_env());

    let discoverers: Vec<Arc<dyn Discoverer>> = vec![
        Arc::new(ChangeListener::new(
            pool.clone(),
            config::listener::CHANNEL.as_str(),
            Arc::clone(&dispatcher),
        )),
        Arc::new(BackupPoller::new(Arc::clone(&dispatcher), PollerSettings::from_env())),
    ];
    let discoverer_handles: Vec<_> = discoverers.into_iter().map(spawn_discoverer).collect();

    let (pending, clicks) = interaction_stores()?;
    let interaction = Arc::new(Interaction::new(
        Arc::clone(dispatcher.store()),
        Arc::new(TelegramMessenger::new(bot.clone())),
        pending,
        clicks,
    ));
    let handler = schema(HandlerDeps::new(interaction));

    let mut retry_count = 0;
    loop {
        let bot_clone = bot.clone();
        let handler_clone = handler.clone();

        // Separate task so a panic inside the dispatcher can be caught and retried
        let handle = tokio::spawn(async move {
            use teloxide::update_listeners::Polling;

            let listener = Polling::builder(bot_clone.clone()).drop_pending_updates().build();

            Dispatcher::builder(bot_clone, handler_clone)
                .enable_ctrlc_handler()
                .build()
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("An error from the update listener"),
                )
                .await
        });

        match handle.await {
            Ok(()) => {
                log::info!("Dispatcher shutdown gracefully");
                break;
            }
            Err(join_err) if join_err.is_panic() => {
                log::error!("Dispatcher panicked: {}", join_err);
                if retry_count >= MAX_DISPATCHER_RETRIES {
                    log::error!("Max retries reached after panic. Exiting...");
                    break;
                }
                retry_count += 1;
                log::info!(
                    "Restarting dispatcher (attempt {}/{})...",
                    retry_count,
                    MAX_DISPATCHER_RETRIES
                );
                sleep(Duration::from_secs(2u64.pow(retry_count))).await;
            }
            Err(join_err) => {
                log::warn!("Dispatcher task was cancelled: {}", join_err);
                break;
            }
        }
    }

    for handle in discoverer_handles {
        handle.abort();
    }
    Ok(())
}

async fn run_migrate() -> Result<()> {
    let url = config::database_url()?;
    let pool = create_pool(url).await?;
    run_migrations(&pool).await?;
    log::info!("Migrations applied");
    Ok(())
}

async fn run_dispatch(request_id: Uuid) -> Result<()> {
    let pool = connect_database().await?;
    let bot = create_bot()?;
    let dispatcher = build_dispatcher(&pool, &bot, FanoutSettings::from_env());

    let report = dispatcher.dispatch(request_id, Trigger::Manual).await?;
    if report.skipped {
        println!("Request {} is missing or not active; nothing sent", request_id);
    } else {
        println!(
            "Request {}: {} eligible, {} delivered, {} failed, {} unrecorded",
            request_id, report.eligible, report.delivered, report.failed, report.unrecorded
        );
    }
    Ok(())
}

async fn run_poll_once(lookback_secs: Option<i64>) -> Result<()> {
    let pool = connect_database().await?;
    let bot = create_bot()?;
    let dispatcher = build_dispatcher(&pool, &bot, FanoutSettings::from_env());

    let mut settings = PollerSettings::from_env();
    if let Some(secs) = lookback_secs {
        settings.lookback = chrono::Duration::try_seconds(secs.max(0))
            .ok_or_else(|| anyhow::anyhow!("--lookback-secs out of range: {}", secs))?;
    }

    let found = BackupPoller::new(dispatcher, settings).poll_once().await?;
    println!("Poll found {} request(s) without notifications", found);
    Ok(())
}
