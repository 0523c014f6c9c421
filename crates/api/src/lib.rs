//! `api` crate — HTTP REST API layer.
//!
//! Exposes:
//!   GET    /health
//!   GET    /v1/check
//!   POST   /v1/events-batch
//!   GET    /v1/events
//!   GET    /v1/nodes
//!   POST   /v1/nodes
//!   PUT    /v1/nodes/{flow}/{id}
//!   DELETE /v1/nodes/{flow}/{id}
//!   POST   /v1/run-eval
//!   POST   /v1/eval-event
//!   GET    /v1/eval-outputs
//!
//! Everything under `/v1` sits behind the `X-Api-Key` middleware.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::{middleware, Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use db::{DbPool, SqlStorage};
use engine::Orchestrator;
use eval::Evaluator;

pub mod auth;
pub mod error;
pub mod handlers;
pub mod schemas;

pub use error::ApiError;
use schemas::SuccessResponse;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orchestrator: Arc<Orchestrator>,
    pub api_key: String,
}

impl AppState {
    /// Wire the orchestrator to SQL storage and the given evaluator.
    pub fn new(pool: DbPool, evaluator: Evaluator, api_key: impl Into<String>) -> Self {
        let storage = Arc::new(SqlStorage::new(pool.clone()));
        Self {
            pool,
            orchestrator: Arc::new(Orchestrator::new(storage, Arc::new(evaluator))),
            api_key: api_key.into(),
        }
    }
}

async fn health() -> Json<SuccessResponse> {
    Json(SuccessResponse::new("API is healthy"))
}

async fn check() -> Json<SuccessResponse> {
    Json(SuccessResponse::new("lgtm"))
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/check", get(check))
        .route("/events-batch", post(handlers::events::persist_batch))
        .route("/events", get(handlers::events::list))
        .route("/nodes", get(handlers::nodes::list).post(handlers::nodes::create))
        .route(
            "/nodes/:flow/:id",
            put(handlers::nodes::update).delete(handlers::nodes::delete),
        )
        .route("/run-eval", post(handlers::evals::run_eval))
        .route("/eval-event", post(handlers::evals::eval_event))
        .route("/eval-outputs", get(handlers::evals::list_outputs))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .route("/health", get(health))
        .nest("/v1", v1)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(bind: &str, state: AppState) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("API listening on {bind}");
    axum::serve(listener, app).await
}
