//! HTTP API v1 — chat widget and admin console endpoints.
//!
//! Endpoints:
//!
//! - `POST   /v1/chat`               — Process one conversation turn
//! - `POST   /v1/chat/ephemeral`     — Process a turn with caller-held history
//! - `GET    /v1/documents`          — List knowledge-base documents
//! - `POST   /v1/documents`          — Create a document
//! - `DELETE /v1/documents/{id}`     — Delete a document
//! - `GET    /v1/prompts`            — List instruction entries
//! - `POST   /v1/prompts`            — Create an instruction entry
//! - `DELETE /v1/prompts/{id}`       — Delete an instruction entry
//! - `GET    /v1/traces`             — Recent trace records, newest first
//! - `DELETE /v1/conversations/{id}` — Delete a conversation and its data
//! - `GET    /v1/status`             — Runtime status

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use sproutline_core::completion::CompletionClient;
use sproutline_core::error::Error;
use sproutline_core::knowledge::{InstructionEntry, InstructionKind, KnowledgeEntry};
use sproutline_core::message::{ConversationId, Message, Role};
use sproutline_core::storage::Storage;
use sproutline_core::trace::TraceRecord;
use sproutline_pipeline::TurnOrchestrator;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: Arc<TurnOrchestrator>,
    pub storage: Arc<dyn Storage>,
    pub client: Arc<dyn CompletionClient>,
    pub model: String,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/ephemeral", post(ephemeral_chat_handler))
        .route("/documents", get(list_documents_handler))
        .route("/documents", post(create_document_handler))
        .route("/documents/{id}", delete(delete_document_handler))
        .route("/prompts", get(list_prompts_handler))
        .route("/prompts", post(create_prompt_handler))
        .route("/prompts/{id}", delete(delete_prompt_handler))
        .route("/traces", get(list_traces_handler))
        .route("/conversations/{id}", delete(delete_conversation_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
struct ChatRequest {
    /// Existing conversation ID (omit to start a new conversation).
    #[serde(default)]
    conversation_id: Option<String>,
    /// The parent's message.
    content: String,
}

#[derive(Serialize)]
struct ChatResponse {
    conversation_id: String,
    /// The reply to show the user (generated or canned).
    content: String,
    blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct EphemeralChatRequest {
    message: String,
    #[serde(default)]
    history: Vec<HistoryMessageDto>,
}

#[derive(Deserialize)]
struct HistoryMessageDto {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct EphemeralChatResponse {
    content: String,
    blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct CreateDocumentRequest {
    title: String,
    body: String,
    category: String,
    #[serde(default = "default_active")]
    active: bool,
}

#[derive(Deserialize)]
struct CreatePromptRequest {
    name: String,
    body: String,
    kind: String,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Serialize)]
struct CreatedResponse {
    id: String,
}

#[derive(Serialize)]
struct DeletedResponse {
    deleted: bool,
}

#[derive(Deserialize)]
struct TracesQuery {
    #[serde(default = "default_trace_limit")]
    limit: usize,
}

fn default_trace_limit() -> usize {
    50
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    version: &'static str,
    model: String,
    storage_backend: String,
    completion_client: String,
    uptime_secs: i64,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Map a pipeline error to an HTTP response. Upstream completion
/// failures become a generic 502; the detail is already in the trace log.
fn map_turn_error(e: Error) -> ApiError {
    match e {
        Error::TurnFailed(_) => (
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse {
                error: "Failed to process message, please try again later".into(),
            }),
        ),
        other => {
            error!(error = %other, "Turn processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Internal server error".into(),
                }),
            )
        }
    }
}

fn map_storage_error(e: sproutline_core::error::StorageError) -> ApiError {
    error!(error = %e, "Storage operation failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Internal server error".into(),
        }),
    )
}

// ── Chat handlers ─────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if payload.content.trim().is_empty() {
        return Err(bad_request("content must not be empty"));
    }

    let conversation = payload
        .conversation_id
        .map(ConversationId)
        .unwrap_or_default();

    info!(conversation = %conversation, "v1/chat request");

    let outcome = state
        .orchestrator
        .process_turn(&conversation, &payload.content)
        .await
        .map_err(map_turn_error)?;

    Ok(Json(ChatResponse {
        conversation_id: conversation.0,
        content: outcome.reply,
        blocked: outcome.blocked,
        block_reason: outcome.block_reason,
    }))
}

async fn ephemeral_chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<EphemeralChatRequest>,
) -> Result<Json<EphemeralChatResponse>, ApiError> {
    if payload.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let history: Vec<Message> = payload
        .history
        .iter()
        .map(|m| {
            let role = Role::from_str(&m.role)
                .map_err(|e| bad_request(format!("invalid history role: {e}")))?;
            Ok(match role {
                Role::User => Message::user(&m.content),
                Role::Assistant => Message::assistant(&m.content),
                Role::System => Message::system(&m.content),
            })
        })
        .collect::<Result<_, ApiError>>()?;

    let outcome = state
        .orchestrator
        .process_ephemeral_turn(&payload.message, &history)
        .await
        .map_err(map_turn_error)?;

    Ok(Json(EphemeralChatResponse {
        content: outcome.reply,
        blocked: outcome.blocked,
        block_reason: outcome.block_reason,
    }))
}

// ── Admin handlers ────────────────────────────────────────────────────────

async fn list_documents_handler(
    State(state): State<SharedState>,
) -> Result<Json<Vec<KnowledgeEntry>>, ApiError> {
    let documents = state
        .storage
        .list_documents()
        .await
        .map_err(map_storage_error)?;
    Ok(Json(documents))
}

async fn create_document_handler(
    State(state): State<SharedState>,
    Json(payload): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    if payload.title.trim().is_empty() || payload.body.trim().is_empty() {
        return Err(bad_request("title and body must not be empty"));
    }

    let mut entry = KnowledgeEntry::new(&payload.title, &payload.body, &payload.category);
    entry.active = payload.active;
    let id = state
        .storage
        .create_document(entry)
        .await
        .map_err(map_storage_error)?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

async fn delete_document_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let deleted = state
        .storage
        .delete_document(&id)
        .await
        .map_err(map_storage_error)?;
    if !deleted {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("document not found: {id}"),
            }),
        ));
    }
    Ok(Json(DeletedResponse { deleted }))
}

async fn list_prompts_handler(
    State(state): State<SharedState>,
) -> Result<Json<Vec<InstructionEntry>>, ApiError> {
    let prompts = state
        .storage
        .list_prompts()
        .await
        .map_err(map_storage_error)?;
    Ok(Json(prompts))
}

async fn create_prompt_handler(
    State(state): State<SharedState>,
    Json(payload): Json<CreatePromptRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let kind = InstructionKind::from_str(&payload.kind)
        .map_err(|e| bad_request(format!("invalid prompt kind: {e}")))?;
    if payload.name.trim().is_empty() || payload.body.trim().is_empty() {
        return Err(bad_request("name and body must not be empty"));
    }

    let mut entry = InstructionEntry::new(&payload.name, &payload.body, kind);
    entry.active = payload.active;
    let id = state
        .storage
        .create_prompt(entry)
        .await
        .map_err(map_storage_error)?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

async fn delete_prompt_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let deleted = state
        .storage
        .delete_prompt(&id)
        .await
        .map_err(map_storage_error)?;
    if !deleted {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("prompt not found: {id}"),
            }),
        ));
    }
    Ok(Json(DeletedResponse { deleted }))
}

async fn list_traces_handler(
    State(state): State<SharedState>,
    Query(query): Query<TracesQuery>,
) -> Result<Json<Vec<TraceRecord>>, ApiError> {
    let limit = query.limit.min(500);
    let traces = state
        .storage
        .list_traces(limit)
        .await
        .map_err(map_storage_error)?;
    Ok(Json(traces))
}

async fn delete_conversation_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let deleted = state
        .storage
        .delete_conversation(&ConversationId(id))
        .await
        .map_err(map_storage_error)?;
    Ok(Json(DeletedResponse { deleted }))
}

async fn status_handler(State(state): State<SharedState>) -> Json<StatusResponse> {
    let uptime = chrono::Utc::now() - state.start_time;
    Json(StatusResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model: state.model.clone(),
        storage_backend: state.storage.name().into(),
        completion_client: state.client.name().into(),
        uptime_secs: uptime.num_seconds(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_router;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use sproutline_core::completion::{CompletionReply, CompletionRequest, Usage};
    use sproutline_core::error::CompletionError;
    use sproutline_guardrail::PatternGuardrail;
    use sproutline_pipeline::{Evaluator, PromptComposer};
    use sproutline_storage::InMemoryStorage;
    use tower::ServiceExt;

    struct MockClient;

    #[async_trait]
    impl CompletionClient for MockClient {
        fn name(&self) -> &str {
            "mock"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionReply, CompletionError> {
            // The evaluator asks for JSON; the primary call gets prose.
            let text = if request.messages[0].content.contains("quality evaluator") {
                r#"{"score": 90, "feedback": "Good."}"#.to_string()
            } else {
                "We open at 6:30am.".to_string()
            };
            Ok(CompletionReply {
                text,
                model: "gpt-4o-mini".into(),
                request_id: "chatcmpl-test".into(),
                usage: Usage {
                    prompt_tokens: 50,
                    completion_tokens: 10,
                    total_tokens: 60,
                },
            })
        }
    }

    fn test_state() -> (SharedState, Arc<InMemoryStorage>) {
        let storage = Arc::new(InMemoryStorage::new());
        let client: Arc<dyn CompletionClient> = Arc::new(MockClient);
        let orchestrator = Arc::new(TurnOrchestrator::new(
            PatternGuardrail::with_defaults(),
            PromptComposer::new(storage.clone()),
            client.clone(),
            Evaluator::new(client.clone(), "gpt-4o-mini"),
            storage.clone(),
            "gpt-4o-mini",
        ));
        let state = Arc::new(GatewayState {
            orchestrator,
            storage: storage.clone(),
            client,
            model: "gpt-4o-mini".into(),
            start_time: chrono::Utc::now(),
        });
        (state, storage)
    }

    async fn send(app: axum::Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let (state, _) = test_state();
        let app = build_router(state, None);
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn malformed_cors_origin_does_not_break_routing() {
        let (state, _) = test_state();
        let app = build_router(state, Some("not a\nvalid origin"));
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app, req).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn configured_cors_origin_is_echoed() {
        let (state, _) = test_state();
        let app = build_router(state, Some("https://littlesprouts.example"));
        let req = Request::builder()
            .uri("/health")
            .header("Origin", "https://littlesprouts.example")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("https://littlesprouts.example")
        );
    }

    #[tokio::test]
    async fn chat_assigns_conversation_id_and_replies() {
        let (state, _) = test_state();
        let app = build_router(state, None);

        let (status, body) = send(
            app,
            post_json("/v1/chat", json!({"content": "What are your hours?"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "We open at 6:30am.");
        assert_eq!(body["blocked"], false);
        assert!(!body["conversation_id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn chat_blocks_pii_with_reason() {
        let (state, storage) = test_state();
        let app = build_router(state, None);

        let (status, body) = send(
            app,
            post_json("/v1/chat", json!({"content": "My SSN is 123-45-6789"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["blocked"], true);
        assert!(body["block_reason"].as_str().unwrap().contains("PII"));
        assert_eq!(storage.trace_count().await, 1);
    }

    #[tokio::test]
    async fn chat_rejects_empty_message() {
        let (state, _) = test_state();
        let app = build_router(state, None);
        let (status, _) = send(app, post_json("/v1/chat", json!({"content": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upstream_failure_maps_to_generic_502() {
        struct FailingClient;

        #[async_trait]
        impl CompletionClient for FailingClient {
            fn name(&self) -> &str {
                "failing"
            }

            async fn complete(
                &self,
                _request: CompletionRequest,
            ) -> Result<CompletionReply, CompletionError> {
                Err(CompletionError::Network("connection refused".into()))
            }
        }

        let storage = Arc::new(InMemoryStorage::new());
        let client: Arc<dyn CompletionClient> = Arc::new(FailingClient);
        let orchestrator = Arc::new(TurnOrchestrator::new(
            PatternGuardrail::with_defaults(),
            PromptComposer::new(storage.clone()),
            client.clone(),
            Evaluator::new(client.clone(), "gpt-4o-mini"),
            storage.clone(),
            "gpt-4o-mini",
        ));
        let state = Arc::new(GatewayState {
            orchestrator,
            storage,
            client,
            model: "gpt-4o-mini".into(),
            start_time: chrono::Utc::now(),
        });
        let app = build_router(state, None);

        let (status, body) = send(app, post_json("/v1/chat", json!({"content": "hi"}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let error = body["error"].as_str().unwrap();
        assert!(error.contains("try again"));
        assert!(!error.contains("connection refused"));
    }

    #[tokio::test]
    async fn ephemeral_chat_rejects_bad_role() {
        let (state, _) = test_state();
        let app = build_router(state, None);
        let (status, body) = send(
            app,
            post_json(
                "/v1/chat/ephemeral",
                json!({
                    "message": "hi",
                    "history": [{"role": "wizard", "content": "abracadabra"}]
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("role"));
    }

    #[tokio::test]
    async fn ephemeral_chat_replies_without_persisting() {
        let (state, storage) = test_state();
        let app = build_router(state, None);
        let (status, body) = send(
            app,
            post_json(
                "/v1/chat/ephemeral",
                json!({
                    "message": "What are your hours?",
                    "history": [
                        {"role": "user", "content": "hi"},
                        {"role": "assistant", "content": "Hello!"}
                    ]
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "We open at 6:30am.");
        assert_eq!(storage.trace_count().await, 0);
    }

    #[tokio::test]
    async fn document_crud_round_trip() {
        let (state, _) = test_state();
        let app = build_router(state, None);

        let (status, created) = send(
            app.clone(),
            post_json(
                "/v1/documents",
                json!({"title": "Hours", "body": "6:30-6:30", "category": "operations"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();

        let req = Request::builder()
            .uri("/v1/documents")
            .body(Body::empty())
            .unwrap();
        let (status, listed) = send(app.clone(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["title"], "Hours");

        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/v1/documents/{id}"))
            .body(Body::empty())
            .unwrap();
        let (status, deleted) = send(app.clone(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["deleted"], true);

        // Second delete: gone.
        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/v1/documents/{id}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app, req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn prompt_creation_validates_kind() {
        let (state, _) = test_state();
        let app = build_router(state, None);

        let (status, _) = send(
            app.clone(),
            post_json(
                "/v1/prompts",
                json!({"name": "tone", "body": "Be warm.", "kind": "behavior"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            app,
            post_json(
                "/v1/prompts",
                json!({"name": "x", "body": "y", "kind": "mystery"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("kind"));
    }

    #[tokio::test]
    async fn traces_listing_respects_limit() {
        let (state, storage) = test_state();
        for i in 0..5 {
            storage
                .record_trace(TraceRecord::new("gpt-4o-mini", format!("q{i}")))
                .await
                .unwrap();
        }
        let app = build_router(state, None);
        let req = Request::builder()
            .uri("/v1/traces?limit=2")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[0]["user_text"], "q4");
    }

    #[tokio::test]
    async fn status_reports_runtime_details() {
        let (state, _) = test_state();
        let app = build_router(state, None);
        let req = Request::builder()
            .uri("/v1/status")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["storage_backend"], "in_memory");
        assert_eq!(body["completion_client"], "mock");
    }
}
