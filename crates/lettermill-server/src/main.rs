//! Lettermill - newsletter delivery server entry point

use anyhow::Result;
use lettermill_api::AppState;
use lettermill_common::config::Config;
use lettermill_core::{
    BackoffPolicy, CampaignManager, DispatchWorker, EventRecorder, PipelineScheduler,
    RecipientResolver, SmtpMailer, StatisticsAggregator, TemplateRenderer,
};
use lettermill_storage::db::DatabasePool;
use lettermill_storage::repository::{
    QueueItemRepository, SegmentRepository, SubscriberRepository,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting Lettermill delivery server...");

    let config = Config::load()?;

    let db_pool = DatabasePool::new(&config.database).await?;
    info!("Database connection established");

    db_pool.migrate().await?;
    info!("Database migrations completed");

    // Shared pipeline components
    let transport = Arc::new(SmtpMailer::from_config(&config.smtp, &config.server.hostname)?);
    let renderer = Arc::new(TemplateRenderer::from_config(&config));

    let pool = db_pool.pool().clone();
    let resolver = RecipientResolver::new(
        SubscriberRepository::new(pool.clone()),
        SegmentRepository::new(pool.clone()),
        QueueItemRepository::new(pool),
        config.delivery.require_verified,
        config.delivery.max_attempts,
    );

    let manager = Arc::new(CampaignManager::new(&db_pool, resolver));
    let recorder = EventRecorder::new(&db_pool);
    let aggregator = StatisticsAggregator::new(&db_pool);

    let backoff = BackoffPolicy::new(
        config.delivery.retry_base_secs.max(1) as u64,
        config.delivery.retry_cap_secs.max(1) as u64,
    );
    let poll_interval = Duration::from_secs(config.delivery.poll_interval_secs);

    // Dispatch worker pool
    let mut worker_handles = Vec::new();
    for n in 0..config.delivery.worker_count {
        let worker = DispatchWorker::new(
            format!("{}-worker-{}", config.server.hostname, n),
            &db_pool,
            transport.clone(),
            renderer.clone(),
            backoff.clone(),
            config.delivery.batch_size,
            poll_interval,
        );
        worker_handles.push(tokio::spawn(worker.run()));
    }
    info!("Started {} dispatch workers", config.delivery.worker_count);

    // Pipeline scheduler
    let scheduler = PipelineScheduler::new(
        &db_pool,
        manager.clone(),
        aggregator.clone(),
        poll_interval,
        config.delivery.lease_secs,
        Duration::from_secs(config.stats.refresh_interval_secs),
        config.stats.engagement_decay_per_day,
    );
    let scheduler_handle = tokio::spawn(scheduler.run());

    // API server
    let api_handle = {
        let state = Arc::new(AppState {
            db_pool: db_pool.clone(),
            manager,
            recorder,
            aggregator,
            renderer,
            webhook_secret: config.webhook.signing_secret.clone(),
        });
        let bind = config.server.api_bind.clone();
        tokio::spawn(async move {
            let app = lettermill_api::create_router(state);
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .expect("Failed to bind API server");
            info!("Starting API server on {}", bind);
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("API server error: {}", e);
            }
        })
    };

    info!("Lettermill server started successfully");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    for handle in worker_handles {
        handle.abort();
    }
    scheduler_handle.abort();
    api_handle.abort();

    info!("Lettermill server shutdown complete");

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,lettermill=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .init();
}
