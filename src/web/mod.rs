mod cache;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{
    config::ServiceConfig,
    error::ImpactError,
    exposure::ExposureReport,
    impact::{DamageRadii, ImpactParameters},
    mitigation::{MitigatedOutcome, Mitigation},
    neo::{NeoClient, NeoError, NeoSummary},
    providers::http_client,
    service::ImpactService,
};

pub use cache::ResponseCache;

const SENTRY_CACHE_KEY: &str = "sentry:summary";

pub struct AppState {
    service: ImpactService,
    neo: NeoClient,
    http: Client,
    cache: ResponseCache,
    sentry_url: String,
    sentry_ttl: Duration,
}

impl AppState {
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.providers.timeout_secs);
        let user_agent = &config.providers.user_agent;
        Ok(Self {
            service: ImpactService::from_config(config)?,
            neo: NeoClient::from_config(&config.neo, timeout, user_agent)
                .context("Failed to build NEO client")?,
            http: http_client(timeout, user_agent).context("Failed to build HTTP client")?,
            cache: ResponseCache::new(),
            sentry_url: config.server.sentry_url.clone(),
            sentry_ttl: Duration::from_secs(config.server.sentry_ttl_secs),
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/impact/run", post(impact_run))
        .route("/api/impact/assess", post(impact_assess))
        .route("/api/pop/sum", post(pop_sum))
        .route("/api/neo/feed", get(neo_feed))
        .route("/api/neo/lookup/:id", get(neo_lookup))
        .route("/api/sentry", get(sentry))
        .with_state(state)
}

pub async fn run(config: ServiceConfig) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;
    let state = Arc::new(AppState::from_config(&config)?);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, chain = ?config.providers.chain, "impact API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down impact API");
}

enum ApiError {
    BadRequest(String),
    Upstream(String),
}

impl From<ImpactError> for ApiError {
    fn from(err: ImpactError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<NeoError> for ApiError {
    fn from(err: NeoError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Upstream(message) => {
                warn!(error = %message, "upstream request failed");
                (StatusCode::BAD_GATEWAY, message)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn impact_run(
    State(state): State<Arc<AppState>>,
    Json(params): Json<ImpactParameters>,
) -> Result<Json<DamageRadii>, ApiError> {
    Ok(Json(state.service.compute_damage_radii(&params)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PopSumRequest {
    lat: f64,
    lng: f64,
    radii_km: Vec<f64>,
    #[serde(default)]
    year: Option<u16>,
}

async fn pop_sum(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PopSumRequest>,
) -> Result<Json<ExposureReport>, ApiError> {
    let report = state
        .service
        .estimate_exposure(request.lat, request.lng, &request.radii_km, request.year)
        .await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct AssessRequest {
    #[serde(flatten)]
    params: ImpactParameters,
    lat: f64,
    lng: f64,
    #[serde(default)]
    year: Option<u16>,
    #[serde(default)]
    mitigation: Mitigation,
}

#[derive(Debug, Serialize)]
struct AssessResponse {
    radii: DamageRadii,
    exposure: ExposureReport,
    mitigated: MitigatedOutcome,
}

async fn impact_assess(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AssessRequest>,
) -> Result<Json<AssessResponse>, ApiError> {
    let assessment = state
        .service
        .assess(&request.params, request.lat, request.lng, request.year)
        .await?;
    let mitigated = request.mitigation.apply(
        &assessment.radii,
        assessment.exposure.severe_population(),
        assessment.exposure.deaths_estimate,
    );
    Ok(Json(AssessResponse {
        radii: assessment.radii,
        exposure: assessment.exposure,
        mitigated,
    }))
}

#[derive(Debug, Deserialize)]
struct FeedQuery {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

#[derive(Serialize)]
struct FeedResponse {
    items: Vec<NeoSummary>,
}

async fn neo_feed(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<FeedResponse>, ApiError> {
    let items = state.neo.feed(query.start, query.end).await?;
    Ok(Json(FeedResponse { items }))
}

async fn neo_lookup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<NeoSummary>, ApiError> {
    Ok(Json(state.neo.lookup(&id).await?))
}

async fn sentry(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    if let Some(cached) = state.cache.get(SENTRY_CACHE_KEY).await {
        return Ok(Json(cached));
    }
    let body: Value = state
        .http
        .get(&state.sentry_url)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|err| ApiError::Upstream(format!("sentry: {err}")))?
        .json()
        .await
        .map_err(|err| ApiError::Upstream(format!("sentry: {err}")))?;
    state
        .cache
        .set(SENTRY_CACHE_KEY, body.clone(), state.sentry_ttl)
        .await;
    Ok(Json(body))
}
