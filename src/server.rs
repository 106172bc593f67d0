use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, Request, State, rejection::JsonRejection},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::AppState;
use crate::error::{ErrorKind, RagError};
use crate::rag::domain::answer::{AnswerStatus, QueryMode, Question};
use crate::rag::domain::graph::Entity;
use crate::rag::store::SnapshotStats;

/// Grace added to the pipeline deadline before the HTTP layer gives up.
const HTTP_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Build the application router with all middleware applied.
pub fn router(state: AppState) -> Router {
    let timeout_duration = state.config.resilience.request_timeout() + HTTP_TIMEOUT_GRACE;

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/question", post(ask_question))
        .route("/admin/reindex", post(reindex))
        .route("/graph/entities/{id}", get(get_entity))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(1024 * 1024))
                .layer(axum::middleware::from_fn(
                    move |req: Request, next: Next| async move {
                        match tokio::time::timeout(timeout_duration, next.run(req)).await {
                            Ok(res) => res,
                            Err(_) => ApiError::new(
                                StatusCode::GATEWAY_TIMEOUT,
                                "Request timed out",
                                None,
                            )
                            .into_response(),
                        }
                    },
                ))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    crate::resilience::rate_limit_middleware,
                )),
        )
        .with_state(state)
}

/// Start the Axum server.
pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let interval = state.config.indexing.reindex_interval_secs;
    if interval > 0 {
        spawn_periodic_reindex(state.clone(), Duration::from_secs(interval));
    }

    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn spawn_periodic_reindex(state: AppState, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let dir = state.config.corpus_dir();
            match state.service.reindex_dir(&dir).await {
                Ok(stats) => info!(
                    name: "index.periodic",
                    version = stats.version,
                    entities = stats.entities,
                    "Periodic reindex complete"
                ),
                Err(e) => tracing::error!(error = %e, "Periodic reindex failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(name: "server.shutdown", "Shutting down");
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// JSON error body returned for every failure.
#[derive(Debug, Serialize)]
struct ApiErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    body: ApiErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>, request_id: Option<String>) -> Self {
        Self {
            status,
            body: ApiErrorBody {
                error: message.into(),
                request_id,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        Self::new(status_for(err.kind()), err.to_string(), None)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::BackendTransient
        | ErrorKind::BackendFatal
        | ErrorKind::IndexingFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct RootResponse {
    message: &'static str,
}

/// GET / - Service banner.
async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "GraphRAG question answering service. POST /question to ask.",
    })
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    snapshot_version: u64,
    snapshot_created_at: DateTime<Utc>,
    entities: usize,
    relations: usize,
    communities: usize,
}

/// GET /health - Liveness plus current snapshot counts.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.service.store().snapshot();
    let stats = snapshot.stats();
    Json(HealthResponse {
        status: "healthy",
        snapshot_version: stats.version,
        snapshot_created_at: snapshot.created_at(),
        entities: stats.entities,
        relations: stats.relations,
        communities: stats.communities,
    })
}

/// GET /metrics - Prometheus text exposition.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Request body for the question API.
#[derive(Debug, Deserialize)]
struct QuestionRequest {
    question: String,
    /// Optional retrieval strategy hint
    #[serde(default)]
    mode: QueryMode,
}

/// Response from the question API.
#[derive(Debug, Serialize)]
struct QuestionResponse {
    question: String,
    answer: String,
    status: AnswerStatus,
    sources: Vec<String>,
    request_id: String,
}

/// POST /question - Answer a question from the knowledge graph.
async fn ask_question(
    State(state): State<AppState>,
    payload: Result<Json<QuestionRequest>, JsonRejection>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let Json(req) =
        payload.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text(), None))?;

    let question = Question::with_mode(req.question, req.mode);
    let text = question.text.clone();
    tracing::info!(request_id = %question.id, question = %text, "Received question");

    let trace = state.service.answer_traced(question).await;
    let answer = trace.answer;

    if let Some(failure) = &answer.failure {
        return Err(ApiError::new(
            status_for(failure.kind),
            failure.message.clone(),
            Some(trace.request_id),
        ));
    }

    Ok(Json(QuestionResponse {
        question: text,
        answer: answer.text,
        status: answer.status,
        sources: answer.sources,
        request_id: trace.request_id,
    }))
}

/// POST /admin/reindex - Rebuild the graph from the corpus directory.
async fn reindex(State(state): State<AppState>) -> Result<Json<SnapshotStats>, ApiError> {
    let dir = state.config.corpus_dir();
    let stats = state.service.reindex_dir(&dir).await?;
    Ok(Json(stats))
}

#[derive(Debug, Serialize)]
struct EntityResponse {
    entity: Entity,
    neighbors: Vec<Entity>,
    snapshot_version: u64,
}

/// GET /graph/entities/{id} - An entity and its direct neighbours.
async fn get_entity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EntityResponse>, ApiError> {
    let snapshot = state.service.store().snapshot();
    let entity = snapshot.get(&id)?.clone();
    let neighbors = snapshot
        .neighbors(&id, None)?
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(EntityResponse {
        entity,
        neighbors,
        snapshot_version: snapshot.version(),
    }))
}
