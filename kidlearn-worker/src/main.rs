//! Kid Learn Event Worker
//!
//! Consumes learning events from a Redis pub/sub channel and stores them in
//! PostgreSQL, denormalizing quiz answers for analytics.

mod config;
mod publish;
mod shutdown;

use clap::{Parser, Subcommand};
use config::file::LogFormat;
use config::{ConfigLoader, Overrides, WorkerConfig, get_database_url};
use kidlearn_core::framework::DatabaseProcessor;
use kidlearn_core::processors::{EventProcessor, EventWorker};
use kidlearn_core::transport::RedisSubscriber;
use publish::{PublishRequest, publish_event};
use shutdown::spawn_shutdown_listener;
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Kid Learn - learning event worker
#[derive(Parser, Debug)]
#[command(name = "kidlearn-worker")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to an optional configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the Redis URL
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Override the pub/sub channel name
    #[arg(long, env = "CHANNEL")]
    channel: Option<String>,

    /// Override the default log level
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Consume events until SIGINT or SIGTERM (the default)
    Run,
    /// Publish a single event on the channel and exit
    Publish {
        /// Event type tag, e.g. lesson_view or quiz_answer
        #[arg(long)]
        event_type: String,

        /// Payload as a JSON object
        #[arg(long, default_value = "{}")]
        payload: String,

        #[arg(long)]
        user_id: Option<String>,

        #[arg(long)]
        session_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is normal outside local development
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let config_loader = ConfigLoader::new(
        args.config.as_ref(),
        Overrides {
            redis_url: args.redis_url,
            channel: args.channel,
            log_level: args.log_level,
        },
    );
    let config = config_loader.load()?;

    // Initialize tracing
    init_tracing(&config.log_level, config.log_format);

    match config_loader.config_path() {
        Some(path) => tracing::info!("Configuration loaded from {:?}", path),
        None => tracing::info!("No configuration file given, using defaults"),
    }

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run_worker(config, args.migrate).await,
        Command::Publish {
            event_type,
            payload,
            user_id,
            session_id,
        } => {
            let request = PublishRequest {
                event_type,
                payload,
                user_id,
                session_id,
            };
            publish_event(&config.redis_url, &config.channel, &request)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to publish event: {}", e);
                    e
                })
        }
    }
}

async fn run_worker(config: WorkerConfig, migrate: bool) -> anyhow::Result<()> {
    tracing::info!("Starting kidlearn-worker v{}", env!("CARGO_PKG_VERSION"));

    // Install signal handlers before anything can block
    let shutdown_rx = spawn_shutdown_listener().map_err(|e| {
        tracing::error!("Failed to install signal handlers: {}", e);
        e
    })?;

    // Get database URL from environment
    let database_url = get_database_url().map_err(|e| {
        tracing::error!("Failed to read database URL: {}", e);
        e
    })?;

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    // Run migrations if requested
    if migrate {
        tracing::info!("Running database migrations...");
        if let Err(e) = sqlx::migrate!("../migrations").run(&db_pool).await {
            tracing::error!("Failed to run migrations: {}", e);
            db_pool.close().await;
            return Err(e.into());
        }
        tracing::info!("Migrations completed successfully");
    }

    let subscriber = match RedisSubscriber::new(&config.redis_url) {
        Ok(subscriber) => subscriber,
        Err(e) => {
            tracing::error!("Invalid Redis URL: {}", e);
            db_pool.close().await;
            return Err(e.into());
        }
    };

    // From here on the worker owns the pool and closes it on every path
    let processor = EventProcessor::new(DatabaseProcessor::new(db_pool));
    let mut worker = EventWorker::new(subscriber, processor, config.channel, shutdown_rx);

    let stats = worker.run().await.map_err(|e| {
        tracing::error!("Worker failed: {}", e);
        e
    })?;

    tracing::info!(
        received = stats.received,
        failed = stats.failed,
        "Worker shutdown complete"
    );
    Ok(())
}

/// Initialize the tracing subscriber with environment-based filtering.
///
/// `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", level.to_lowercase())));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}
