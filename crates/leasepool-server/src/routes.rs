//! API route handlers

use axum::{
    Json, Router,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::debug;

use leasepool_core::{LeaseRecord, LeaseRequest, ReleaseRequest};
use leasepool_node::{PoolStatus, SeedAccount, SeedOptions, SeedReport};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// A single item or a list of them
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

/// Body of `POST /account/seed`
#[derive(Debug, Deserialize)]
pub struct SeedBody {
    pub accounts: Vec<SeedAccount>,
    #[serde(flatten)]
    pub options: SeedOptions,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        // Account endpoints
        .route("/account/request", get(request_accounts))
        .route("/account/update", post(update_accounts))
        .route("/account/release", post(release_accounts))
        .route("/account/seed", post(seed_accounts))
        // Reporting
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> &'static str {
    "LeasePool running!"
}

async fn request_accounts(
    State(state): State<AppState>,
    query: Result<Query<LeaseRequest>, QueryRejection>,
) -> ApiResult<Json<Vec<LeaseRecord>>> {
    let Query(request) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let leased = state
        .blocking(move |pool| pool.request_accounts(&request))
        .await?;
    Ok(Json(leased))
}

async fn update_accounts(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<&'static str> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    match body {
        Value::Array(patches) => {
            debug!(count = patches.len(), "Received account updates");
            state.pool.submit_batch(patches)?;
        }
        patch => state.pool.submit(patch)?,
    }
    Ok("ok")
}

async fn release_accounts(
    State(state): State<AppState>,
    body: Result<Json<OneOrMany<ReleaseRequest>>, JsonRejection>,
) -> ApiResult<&'static str> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    state.pool.release(body.into_vec())?;
    Ok("ok")
}

async fn seed_accounts(
    State(state): State<AppState>,
    body: Result<Json<SeedBody>, JsonRejection>,
) -> ApiResult<Json<SeedReport>> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let report = state
        .blocking(move |pool| pool.seed(body.accounts, body.options))
        .await?;
    Ok(Json(report))
}

async fn status(State(state): State<AppState>) -> ApiResult<Json<PoolStatus>> {
    let status = state.blocking(|pool| pool.status()).await?;
    Ok(Json(status))
}
