use axum::{routing::get, Router};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use userstats::{
    config::AppConfig,
    shared::AppState,
    stats::{
        self,
        counters::{CountStore, InMemoryCountStore, PostgresCountStore},
        identity::{IdentityStore, InMemoryIdentityStore, PostgresIdentityStore},
        rating::{InMemoryRatingService, PostgresRatingService, RatingService},
        repository::{InMemoryStatsRepository, PostgresStatsRepository, StatsRepository},
        StatsBatchScheduler, StatsRecalculator, UserStatsUpdater,
    },
    tasks::{InMemoryTaskQueue, PostgresTaskQueue, TaskDispatcher, TaskScheduler, TaskSource, TaskWorker},
};

/// Storage collaborators, either all Postgres or all in-memory
struct Backends {
    counts: Arc<dyn CountStore>,
    ratings: Arc<dyn RatingService>,
    identities: Arc<dyn IdentityStore>,
    repository: Arc<dyn StatsRepository>,
    scheduler: Arc<dyn TaskScheduler>,
    source: Arc<dyn TaskSource>,
}

async fn build_backends(config: &AppConfig) -> Result<Backends, Box<dyn std::error::Error>> {
    match &config.database_url {
        Some(database_url) => {
            info!("Using PostgreSQL backends");
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await?;
            sqlx::migrate!("./migrations").run(&pool).await?;

            // Leases outlive the handler timeout so a running task is never claimed twice
            let lease = config.task_timeout + Duration::from_secs(30);
            let queue = Arc::new(PostgresTaskQueue::new(pool.clone(), lease));
            Ok(Backends {
                counts: Arc::new(PostgresCountStore::new(pool.clone())),
                ratings: Arc::new(PostgresRatingService::new(pool.clone())),
                identities: Arc::new(PostgresIdentityStore::new(pool.clone())),
                repository: Arc::new(PostgresStatsRepository::new(pool)),
                scheduler: queue.clone(),
                source: queue,
            })
        }
        None => {
            info!("DATABASE_URL not set, using in-memory backends");
            let queue = Arc::new(InMemoryTaskQueue::new());
            Ok(Backends {
                counts: Arc::new(InMemoryCountStore::new()),
                ratings: Arc::new(InMemoryRatingService::new()),
                identities: Arc::new(InMemoryIdentityStore::new()),
                repository: Arc::new(InMemoryStatsRepository::new()),
                scheduler: queue.clone(),
                source: queue,
            })
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "userstats=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    info!(environment = %config.environment, "Starting user stats service");

    let backends = build_backends(&config).await?;

    let stats_batch = Arc::new(
        StatsBatchScheduler::new(backends.scheduler.clone(), config.environment)
            .with_debounce(config.stats_debounce),
    );
    let updater = Arc::new(UserStatsUpdater::new(
        StatsRecalculator::new(backends.counts),
        backends.ratings,
        backends.identities,
        backends.repository.clone(),
    ));

    // The dispatch table is built once here and handed to the worker
    let dispatcher = Arc::new(
        TaskDispatcher::builder()
            .with_handler(stats_batch.clone())
            .with_handler(updater)
            .with_handler_timeout(config.task_timeout)
            .build(),
    );
    let worker = TaskWorker::new(backends.source, dispatcher, config.worker.clone());
    tokio::spawn(worker.run());

    let app_state = AppState::new(backends.repository, stats_batch, config.environment);

    let app = Router::new()
        .route("/", get(|| async { "user stats service" }))
        .merge(stats::handlers::router())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
