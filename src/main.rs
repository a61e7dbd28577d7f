use axum::{
    routing::{get, post},
    Router,
};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rust_followup_api::channels::{ChannelRegistry, EmailSender, PushSender, SmsSender};
use rust_followup_api::config::Config;
use rust_followup_api::db::Database;
use rust_followup_api::db_storage::PgStorage;
use rust_followup_api::followup::FollowUpService;
use rust_followup_api::handlers::{self, AppState};

/// Spawns the periodic batch: generate due follow-ups, then send the ones
/// whose schedule has arrived.
fn spawn_scheduler(state: Arc<AppState>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        // First tick fires immediately; skip it so startup stays fast
        ticker.tick().await;

        loop {
            ticker.tick().await;
            tracing::info!("Scheduled follow-up run starting");

            match handlers::run_guarded_batch(&state).await {
                Ok(report) => tracing::info!(
                    "Scheduled batch: {} generated, {} failed",
                    report.generated,
                    report.failed
                ),
                Err(e) => tracing::error!("Scheduled batch failed: {}", e),
            }

            match state
                .service
                .dispatch_due_follow_ups(chrono::Utc::now())
                .await
            {
                Ok(report) => tracing::info!(
                    "Scheduled dispatch: {} attempted, {} sent, {} failed, {} skipped",
                    report.attempted,
                    report.sent,
                    report.failed,
                    report.skipped
                ),
                Err(e) => tracing::error!("Scheduled dispatch failed: {}", e),
            }
        }
    });
}

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - Database connection.
/// - Channel senders (email, SMS, push).
/// - HTTP routes and middleware (CORS, Rate Limiting).
/// - The optional follow-up scheduler.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_followup_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");
    let storage = Arc::new(PgStorage::new(db.pool.clone()));

    // Channel senders
    let mut channels = ChannelRegistry::new()
        .register(Arc::new(EmailSender::new(
            config.email_api_url.clone(),
            config.email_api_key.clone(),
        )?))
        .register(Arc::new(SmsSender::new(config.sms_region()?)));
    match (&config.push_api_url, &config.push_api_key) {
        (Some(url), Some(key)) => {
            channels = channels.register(Arc::new(PushSender::new(url.clone(), key.clone())?));
            tracing::info!("✓ Push sender initialized: {}", url);
        }
        _ => tracing::warn!("Push sender not configured; push follow-ups will fail"),
    }
    tracing::info!("Channel senders ready: {:?}", channels.channels());

    let service = FollowUpService::new(storage.clone(), storage, channels);

    // Client-level deduplication (5 minute TTL covers a slow generation)
    let processing_clients_cache = Cache::builder()
        .time_to_live(Duration::from_secs(300))
        .max_capacity(10_000)
        .build();

    // Batch guard (1 hour TTL so a crashed run cannot block forever)
    let batch_runs_cache = Cache::builder()
        .time_to_live(Duration::from_secs(3600))
        .max_capacity(10)
        .build();

    let app_state = Arc::new(AppState {
        service,
        config: config.clone(),
        processing_clients_cache,
        batch_runs_cache,
    });

    if let Some(interval) = config.batch_interval_secs {
        tracing::info!("Follow-up scheduler enabled (every {}s)", interval);
        spawn_scheduler(app_state.clone(), interval);
    }

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let protected_routes = Router::new()
        .route("/api/v1/strategies", get(handlers::list_strategies))
        .route(
            "/api/v1/clients/:email/insight",
            get(handlers::get_client_insight),
        )
        .route(
            "/api/v1/clients/:email/follow-ups",
            post(handlers::generate_client_follow_up),
        )
        .route("/api/v1/follow-ups/batch", post(handlers::run_batch))
        .route("/api/v1/follow-ups/dispatch", post(handlers::dispatch_due))
        .route("/api/v1/follow-ups/stats", get(handlers::follow_up_stats))
        .route("/api/v1/follow-ups/:id", get(handlers::get_follow_up))
        .route("/api/v1/follow-ups/:id/send", post(handlers::send_follow_up))
        .route(
            "/api/v1/follow-ups/:id/cancel",
            post(handlers::cancel_follow_up),
        )
        .layer(
            ServiceBuilder::new()
                // Request size limit: 1MB max payload
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
