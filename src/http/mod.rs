//! HTTP surface: axum router wiring every memory-lifecycle endpoint plus
//! `/ingest` and `/doctor`, with permissive CORS and request tracing
//! layered on top.

pub mod auth;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::FabricError;
use crate::governor::Governor;
use crate::types::{
    ConsolidateRequest, ConsolidateResponse, CreateMemoryRequest, CreateMemoryResponse,
    DeleteMemoryResponse, DoctorResponse, HealthResponse, IngestRequest, IngestResponse,
    ListMemoriesResponse, ObserveRequest, ObserveResponse, RecallRequest, RecallResponse,
    ReflectRequest, ReflectResponse, RememberRequest, RememberResponse, SummarizeRequest,
    SummarizeResponse,
};

impl IntoResponse for FabricError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Build the full axum router: the Hippocampus memories surface, the
/// Governor's observe/remember/recall/consolidate/reflect surface, and the
/// supplemented `/ingest`/`/doctor` endpoints, behind CORS/trace layers and
/// the shared-secret API-key middleware.
pub fn router(governor: Arc<Governor>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/memories", post(create_memory))
        .route("/memories/:user_id", get(list_memories))
        .route("/memories/:memory_id", delete(delete_memory))
        .route("/summaries", post(summarize))
        .route("/observe", post(observe))
        .route("/remember", post(remember))
        .route("/recall", post(recall))
        .route("/consolidate", post(consolidate))
        .route("/ingest", post(ingest))
        .route("/doctor", get(doctor))
        .route("/reflect", post(reflect))
        .route_layer(axum::middleware::from_fn_with_state(governor.clone(), auth::require_api_key))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(governor)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string() })
}

async fn create_memory(
    State(governor): State<Arc<Governor>>,
    Json(request): Json<CreateMemoryRequest>,
) -> Json<CreateMemoryResponse> {
    let memory = governor.storage.add(&request.user_id, &request.text, request.metadata).await;
    Json(CreateMemoryResponse { memory })
}

#[derive(Debug, serde::Deserialize)]
struct ListMemoriesQuery {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn list_memories(
    State(governor): State<Arc<Governor>>,
    Path(user_id): Path<String>,
    Query(params): Query<ListMemoriesQuery>,
) -> Json<ListMemoriesResponse> {
    let limit = params.limit.unwrap_or(governor.config().query_limit);
    let memories = match params.query {
        Some(query) if !query.is_empty() => governor.storage.query(&user_id, &query, limit).await,
        _ => governor.storage.list(Some(&user_id), limit).await,
    };
    Json(ListMemoriesResponse { memories })
}

async fn delete_memory(
    State(governor): State<Arc<Governor>>,
    Path(memory_id): Path<String>,
) -> Result<Json<DeleteMemoryResponse>, StatusCode> {
    if governor.storage.delete(&memory_id).await {
        Ok(Json(DeleteMemoryResponse { deleted: true }))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn summarize(
    State(governor): State<Arc<Governor>>,
    Json(request): Json<SummarizeRequest>,
) -> Result<Json<SummarizeResponse>, StatusCode> {
    if request.texts.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let max_length = governor.config().summary_max_length;

    let summary = match governor
        .llm
        .summarize(&request.texts, &governor.config().rerank_model, max_length)
        .await
    {
        Some(summary) => summary,
        None => governor.storage.summarize(&request.texts, max_length).await,
    };

    if summary.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(Json(SummarizeResponse { summary }))
}

async fn observe(
    State(governor): State<Arc<Governor>>,
    Json(request): Json<ObserveRequest>,
) -> Result<Json<ObserveResponse>, FabricError> {
    Ok(Json(governor.observe(request).await?))
}

async fn remember(
    State(governor): State<Arc<Governor>>,
    Json(request): Json<RememberRequest>,
) -> Result<Json<RememberResponse>, FabricError> {
    Ok(Json(governor.remember(request).await?))
}

async fn recall(
    State(governor): State<Arc<Governor>>,
    Json(request): Json<RecallRequest>,
) -> Result<Json<RecallResponse>, FabricError> {
    Ok(Json(governor.recall(request).await?))
}

async fn consolidate(
    State(governor): State<Arc<Governor>>,
    Json(request): Json<ConsolidateRequest>,
) -> Result<Json<ConsolidateResponse>, FabricError> {
    Ok(Json(governor.consolidate(request).await?))
}

/// `/ingest`: shapes an inbound event into a memory write-back payload and
/// posts it through the same write-back path the worker uses, rather than
/// routing it through observe/working-store classification.
async fn ingest(
    State(governor): State<Arc<Governor>>,
    Json(request): Json<IngestRequest>,
) -> Json<IngestResponse> {
    let timestamp = request.timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp());
    let mut metadata: HashMap<String, serde_json::Value> = request.metadata;
    metadata.insert("source".to_string(), serde_json::json!(request.source));
    metadata.insert("timestamp".to_string(), serde_json::json!(timestamp));

    let memory = governor.storage.add(&request.user_id, &request.text, metadata).await;
    Json(IngestResponse {
        logged: true,
        status: format!("stored:{}", memory.id),
    })
}

/// `/doctor`: GETs the configured LLM base URL's `/v1/models` and reports
/// reachability. Registered as a normal route alongside every other
/// endpoint.
async fn doctor(State(governor): State<Arc<Governor>>) -> Json<DoctorResponse> {
    let status = governor.llm.check_litellm().await;
    Json(DoctorResponse { litellm: status.as_report_string() })
}

/// `/reflect`: runs the post-reply reflection selector over a second recall
/// query keyed on the current exchange, returning at most one soft-prefixed
/// line for the caller to append to its reply.
async fn reflect(
    State(governor): State<Arc<Governor>>,
    Json(request): Json<ReflectRequest>,
) -> Json<ReflectResponse> {
    Json(governor.reflect(request).await)
}
