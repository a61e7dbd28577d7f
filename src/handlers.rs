use crate::auth::validate_admin_key;
use crate::config::Config;
use crate::errors::AppError;
use crate::followup::{
    normalize_email, BatchReport, DispatchReport, FollowUpService, FollowUpStats,
    GenerationOutcome,
};
use crate::models::{ClientInsight, FollowUpStrategy, GeneratedFollowUp, StrategyId};
use crate::strategies::catalog;
use crate::validation::is_well_formed_email;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use moka::future::Cache;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

const BATCH_KEY: &str = "automatic-batch";

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Follow-up workflow with its storage and channel collaborators.
    pub service: FollowUpService,
    /// Application configuration.
    pub config: Config,
    /// Client-level deduplication cache to prevent concurrent generation for the same client.
    /// Key: normalized email, Value: unix timestamp when processing started.
    pub processing_clients_cache: Cache<String, i64>,
    /// Guards against overlapping batch runs (manual trigger vs scheduler).
    pub batch_runs_cache: Cache<String, i64>,
}

/// Atomically marks `key` as in flight.
///
/// Returns the start time of the run already holding the key, if any.
async fn claim(cache: &Cache<String, i64>, key: &str, now: i64) -> Result<(), i64> {
    let entry = cache
        .entry(key.to_string())
        .or_insert_with(async move { now })
        .await;
    if entry.is_fresh() {
        Ok(())
    } else {
        Err(entry.into_value())
    }
}

impl AppState {
    fn authorize(&self, headers: &HeaderMap) -> Result<(), AppError> {
        validate_admin_key(self.config.admin_api_key.as_deref(), headers)
    }
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-followup-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// GET /api/v1/strategies
pub async fn list_strategies() -> Json<&'static [FollowUpStrategy]> {
    Json(catalog())
}

/// Client emails in paths are identifiers; only their format is checked.
fn validated_email(raw: &str) -> Result<String, AppError> {
    let email = normalize_email(raw);
    if !is_well_formed_email(&email) {
        return Err(AppError::BadRequest(format!("Invalid client email '{}'", raw)));
    }
    Ok(email)
}

/// GET /api/v1/clients/:email/insight
///
/// Recomputes the client's insight from their reservation history.
pub async fn get_client_insight(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(email): Path<String>,
) -> Result<Json<ClientInsight>, AppError> {
    state.authorize(&headers)?;
    let email = validated_email(&email)?;
    tracing::info!("GET insight for {}", email);

    let insight = state.service.analyze_client(&email).await?;
    Ok(Json(insight))
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateFollowUpRequest {
    /// Forces a strategy instead of the recommended one.
    pub strategy: Option<StrategyId>,
}

/// POST /api/v1/clients/:email/follow-ups
///
/// Generates (and stores) a follow-up for one client. Concurrent requests for
/// the same client are deduplicated.
pub async fn generate_client_follow_up(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(email): Path<String>,
    body: Option<Json<GenerateFollowUpRequest>>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    state.authorize(&headers)?;
    let email = validated_email(&email)?;
    let request = body.map(|Json(b)| b).unwrap_or_default();

    let now = chrono::Utc::now().timestamp();
    if let Err(processing_since) = claim(&state.processing_clients_cache, &email, now).await {
        let seconds_ago = now - processing_since;
        tracing::warn!(
            "⏭ DUPLICATE REQUEST BLOCKED - Client {} already being processed ({} seconds ago)",
            email,
            seconds_ago
        );
        return Ok((
            StatusCode::CONFLICT,
            Json(json!({
                "success": false,
                "message": format!("Client already being processed (started {} seconds ago)", seconds_ago),
                "client_email": email,
                "duplicate_request": true
            })),
        ));
    }

    let result = match request.strategy {
        Some(strategy_id) => state
            .service
            .generate_follow_up_with_strategy(&email, strategy_id)
            .await
            .map(|follow_up| GenerationOutcome::Generated { follow_up }),
        None => state.service.generate_follow_up(&email).await,
    };

    state.processing_clients_cache.invalidate(&email).await;

    let outcome = result?;
    let status = match outcome {
        GenerationOutcome::Generated { .. } => StatusCode::CREATED,
        GenerationOutcome::Skipped { .. } => StatusCode::OK,
    };
    Ok((status, Json(json!({ "success": true, "result": outcome }))))
}

/// POST /api/v1/follow-ups/batch
///
/// Runs the automatic follow-up batch over every client with history.
pub async fn run_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<BatchReport>, AppError> {
    state.authorize(&headers)?;
    run_guarded_batch(&state).await.map(Json)
}

/// Runs the batch unless another run is in flight.
pub async fn run_guarded_batch(state: &AppState) -> Result<BatchReport, AppError> {
    let now = chrono::Utc::now().timestamp();
    if claim(&state.batch_runs_cache, BATCH_KEY, now).await.is_err() {
        return Err(AppError::BadRequest(
            "A follow-up batch is already running".to_string(),
        ));
    }

    let result = state.service.generate_automatic_follow_ups().await;
    state.batch_runs_cache.invalidate(BATCH_KEY).await;
    result
}

/// POST /api/v1/follow-ups/dispatch
pub async fn dispatch_due(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DispatchReport>, AppError> {
    state.authorize(&headers)?;
    let report = state
        .service
        .dispatch_due_follow_ups(chrono::Utc::now())
        .await?;
    Ok(Json(report))
}

/// GET /api/v1/follow-ups/:id
pub async fn get_follow_up(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<GeneratedFollowUp>, AppError> {
    state.authorize(&headers)?;
    Ok(Json(state.service.get_follow_up(id).await?))
}

/// POST /api/v1/follow-ups/:id/send
///
/// A failed send is reported in the returned follow-up's status, not as an error.
pub async fn send_follow_up(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<GeneratedFollowUp>, AppError> {
    state.authorize(&headers)?;
    tracing::info!("POST send follow-up {}", id);
    Ok(Json(state.service.send_follow_up(id).await?))
}

/// POST /api/v1/follow-ups/:id/cancel
pub async fn cancel_follow_up(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<GeneratedFollowUp>, AppError> {
    state.authorize(&headers)?;
    Ok(Json(state.service.cancel_follow_up(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    pub days: Option<i64>,
}

/// GET /api/v1/follow-ups/stats?days=30
pub async fn follow_up_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<StatsParams>,
) -> Result<Json<FollowUpStats>, AppError> {
    state.authorize(&headers)?;
    let days = params.days.unwrap_or(30);
    if !(1..=365).contains(&days) {
        return Err(AppError::BadRequest(
            "days must be between 1 and 365".to_string(),
        ));
    }
    Ok(Json(state.service.follow_up_stats(days).await?))
}
