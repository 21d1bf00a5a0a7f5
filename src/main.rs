// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use blog_backend::config::{Config, StorageBackend};
use blog_backend::jobs::scheduler::AUTO_RESPONSE_JOB;
use blog_backend::jobs::{
    DeferredReplyScheduler, JobQueue, JobRunner, MemoryJobQueue, PgJobQueue,
};
use blog_backend::models::user::{NewUser, ROLE_ADMIN};
use blog_backend::moderation::ProfanityGate;
use blog_backend::routes;
use blog_backend::services::{AutoResponseWorker, ContentService};
use blog_backend::state::AppState;
use blog_backend::store::{ContentStore, MemoryStore, PgStore};
use blog_backend::utils::hash::hash_password;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load configuration from environment (.env is read inside)
    let config = Config::from_env()?;

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let (store, queue): (Arc<dyn ContentStore>, Arc<dyn JobQueue>) = match config.storage {
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or("DATABASE_URL must be set")?;
            let pool = connect_with_retry(url).await?;

            // Run Migrations Automatically
            tracing::info!("Running migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Migrations applied successfully.");

            let store: Arc<dyn ContentStore> = Arc::new(PgStore::new(pool.clone()));
            let queue: Arc<dyn JobQueue> = Arc::new(PgJobQueue::new(pool));
            (store, queue)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
            let queue: Arc<dyn JobQueue> = Arc::new(MemoryJobQueue::new());
            (store, queue)
        }
    };

    // Seed Admin User
    if let Err(e) = seed_admin_user(store.as_ref(), &config).await {
        tracing::error!("Failed to seed admin user: {:?}", e);
    }

    let gate = match &config.profanity_wordlist {
        Some(path) => ProfanityGate::with_word_list(path)?,
        None => ProfanityGate::builtin()?,
    };
    tracing::info!(words = gate.len(), "profanity lexicon loaded");

    let scheduler = DeferredReplyScheduler::new(queue.clone(), config.jobs.max_attempts);
    let content = ContentService::new(store, Arc::new(gate), scheduler);

    let shutdown = CancellationToken::new();

    let runner = if config.jobs.enabled {
        let runner = JobRunner::new(queue, config.jobs.clone()).register(
            AUTO_RESPONSE_JOB,
            Arc::new(AutoResponseWorker::new(content.clone())),
        );
        Some(tokio::spawn(runner.run(shutdown.clone())))
    } else {
        tracing::info!("Job runner disabled; jobs stay queued");
        None
    };

    // Create the Axum application router
    let app = routes::create_router(AppState::new(content, config.clone()));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    // Start the server
    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        })
        .await?;

    // The server can also stop on its own; make sure the runner follows.
    shutdown.cancel();
    if let Some(handle) = runner {
        handle.await?;
    }

    Ok(())
}

/// Initialize Database Pool with Retry
async fn connect_with_retry(url: &str) -> Result<PgPool, sqlx::Error> {
    let mut retry_count = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(url)
            .await
        {
            Ok(pool) => {
                tracing::info!("Database connected...");
                return Ok(pool);
            }
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    tracing::error!("Failed to connect to database after 5 retries");
                    return Err(e);
                }
                tracing::warn!(
                    "Database not ready, retrying in 2s... (Attempt {})",
                    retry_count
                );
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

async fn seed_admin_user(store: &dyn ContentStore, config: &Config) -> Result<(), BoxError> {
    if let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) {
        if store.find_user_by_username(username).await?.is_none() {
            tracing::info!("Seeding admin user: {}", username);
            let hashed_password = hash_password(password)?;

            store
                .create_user(NewUser {
                    username: username.clone(),
                    email: config
                        .admin_email
                        .clone()
                        .unwrap_or_else(|| format!("{username}@localhost")),
                    password: hashed_password,
                    role: ROLE_ADMIN.to_string(),
                })
                .await?;
            tracing::info!("Admin user created successfully.");
        }
    }
    Ok(())
}
