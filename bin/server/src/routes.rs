//! HTTP route handlers for the parley API.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use parley_conversation::{Conversation, Message, TurnRequest};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::auth::{AppState, RequireAuth};
use crate::error::ApiError;

/// Create the API router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/chat", post(chat))
        .route("/conversations/{id}", get(conversation))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "parley",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Chat request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// The caller's message.
    pub message: Option<String>,
    /// Conversation to continue.
    pub conversation_id: Option<String>,
}

/// Chat response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    /// The assistant's reply.
    pub response: String,
    /// The conversation the turn was recorded in.
    pub conversation_id: String,
}

/// Run one conversation turn.
async fn chat(
    State(state): State<Arc<AppState>>,
    RequireAuth(caller): RequireAuth,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = body.map_err(|rejection| {
        debug!(error = %rejection, "Rejected chat body");
        ApiError::BadRequest {
            reason: "request body must be JSON with a string 'message' field".to_string(),
        }
    })?;

    let Some(message) = request.message else {
        return Err(ApiError::BadRequest {
            reason: "message is required".to_string(),
        });
    };

    let mut turn = TurnRequest::new(message).owned_by(caller.subject());
    turn.conversation_id = request.conversation_id;

    let reply = state.manager.handle(turn).await?;

    Ok(Json(ChatResponse {
        response: reply.reply,
        conversation_id: reply.conversation_id.to_string(),
    }))
}

/// A conversation's history as returned to its owner.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub conversation_id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl From<Conversation> for ConversationView {
    fn from(conversation: Conversation) -> Self {
        Self {
            conversation_id: conversation.id.to_string(),
            title: conversation.title(),
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
            messages: conversation.messages().to_vec(),
        }
    }
}

/// Read back one of the caller's conversations.
async fn conversation(
    State(state): State<Arc<AppState>>,
    RequireAuth(caller): RequireAuth,
    Path(id): Path<String>,
) -> Result<Json<ConversationView>, ApiError> {
    state
        .manager
        .conversation(&id, Some(caller.subject()))
        .await?
        .map(|c| Json(ConversationView::from(c)))
        .ok_or(ApiError::NotFound {
            conversation_id: id,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use parley_ai::{
        ChatMessage, ChatRole, Completion, CompletionError, CompletionProvider, ProviderKind,
        TokenUsage,
    };
    use parley_conversation::{
        InMemoryConversationStore, RecordingReporter, SessionConfig, SessionManager,
        UnknownConversationPolicy,
    };
    use parley_platform_access::StaticTokenVerifier;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    /// Echoes the last user message; "fail" and "timeout" produce errors.
    struct EchoProvider;

    #[async_trait]
    impl CompletionProvider for EchoProvider {
        async fn complete(&self, history: &[ChatMessage]) -> Result<Completion, CompletionError> {
            let last = history
                .iter()
                .rev()
                .find(|m| m.role == ChatRole::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();

            match last.as_str() {
                "fail" => {
                    return Err(CompletionError::ProviderUnavailable {
                        provider: "echo".to_string(),
                        reason: "connection refused".to_string(),
                    });
                }
                "timeout" => return Err(CompletionError::Timeout),
                _ => {}
            }

            Ok(Completion {
                content: format!("echo: {last}"),
                model: "echo".to_string(),
                usage: TokenUsage::default(),
            })
        }

        fn provider(&self) -> ProviderKind {
            ProviderKind::OpenAiCompatible
        }

        fn model(&self) -> &str {
            "echo"
        }
    }

    fn app_with(config: SessionConfig) -> Router {
        let manager = SessionManager::new(
            Arc::new(InMemoryConversationStore::new()),
            Arc::new(EchoProvider),
            Arc::new(RecordingReporter::new()),
            config,
        );
        let verifier = StaticTokenVerifier::from_tokens([
            ("alice", "token-alice"),
            ("bob", "token-bob"),
            ("mallory", "token-mallory"),
        ])
        .with_denied(["mallory"]);

        router(Arc::new(AppState::new(manager, Arc::new(verifier))))
    }

    fn app() -> Router {
        app_with(SessionConfig::default())
    }

    fn chat_request(token: Option<&str>, body: impl Into<Body>) -> Request<Body> {
        let mut builder = Request::post("/chat").header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(body.into()).expect("request")
    }

    fn chat_json(token: &str, body: Value) -> Request<Body> {
        chat_request(Some(token), body.to_string())
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, body)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = app();
        let request = Request::get("/health").body(Body::empty()).expect("request");

        let (status, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "parley");
    }

    #[tokio::test]
    async fn first_message_returns_reply_and_new_id() {
        let app = app();

        let (status, body) = send(&app, chat_json("token-alice", json!({ "message": "Hi" }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "echo: Hi");
        let id = body["conversationId"].as_str().expect("conversation id");
        assert!(id.starts_with("conv_"));
    }

    #[tokio::test]
    async fn follow_up_keeps_conversation_id_and_history() {
        let app = app();
        let (_, first) = send(&app, chat_json("token-alice", json!({ "message": "Hi" }))).await;
        let id = first["conversationId"].as_str().expect("id").to_string();

        let (status, second) = send(
            &app,
            chat_json(
                "token-alice",
                json!({ "message": "Follow-up", "conversationId": id }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["conversationId"], id.as_str());

        let request = Request::get(format!("/conversations/{id}"))
            .header(header::AUTHORIZATION, "Bearer token-alice")
            .body(Body::empty())
            .expect("request");
        let (status, history) = send(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        let messages = history["messages"].as_array().expect("messages");
        let roles: Vec<&str> = messages
            .iter()
            .map(|m| m["role"].as_str().expect("role"))
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user", "assistant"]);
        assert_eq!(history["title"], "Hi");
    }

    #[tokio::test]
    async fn missing_credential_is_unauthorized() {
        let app = app();

        let response = app
            .clone()
            .oneshot(chat_request(None, json!({ "message": "Hi" }).to_string()))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).map(|v| v.as_bytes()),
            Some(&b"Bearer"[..])
        );
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let app = app();

        let (status, body) = send(&app, chat_json("token-eve", json!({ "message": "Hi" }))).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn denied_subject_is_forbidden() {
        let app = app();

        let (status, body) =
            send(&app, chat_json("token-mallory", json!({ "message": "Hi" }))).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Access denied");
    }

    #[tokio::test]
    async fn blank_message_is_bad_request() {
        let app = app();

        let (status, body) = send(&app, chat_json("token-alice", json!({ "message": "   " }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().expect("error").contains("empty"));
    }

    #[tokio::test]
    async fn missing_message_is_bad_request() {
        let app = app();

        let (status, body) = send(&app, chat_json("token-alice", json!({}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "message is required");
    }

    #[tokio::test]
    async fn unparseable_body_is_bad_request() {
        let app = app();

        let (status, body) = send(&app, chat_request(Some("token-alice"), "{not json")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn non_string_message_is_bad_request() {
        let app = app();

        let (status, _) = send(&app, chat_json("token-alice", json!({ "message": 42 }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn provider_failure_is_internal_error() {
        let app = app();

        let (status, body) = send(&app, chat_json("token-alice", json!({ "message": "fail" }))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(
            body["error"]
                .as_str()
                .expect("error")
                .contains("completion failed")
        );
    }

    #[tokio::test]
    async fn timed_out_turn_keeps_user_message_without_reply() {
        let app = app();
        let (_, first) = send(&app, chat_json("token-alice", json!({ "message": "Hi" }))).await;
        let id = first["conversationId"].as_str().expect("id").to_string();

        let (status, _) = send(
            &app,
            chat_json("token-alice", json!({ "message": "timeout", "conversationId": id })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let request = Request::get(format!("/conversations/{id}"))
            .header(header::AUTHORIZATION, "Bearer token-alice")
            .body(Body::empty())
            .expect("request");
        let (_, history) = send(&app, request).await;
        let messages = history["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[3]["role"], "user");
        assert_eq!(messages[3]["content"], "timeout");
    }

    #[tokio::test]
    async fn unknown_id_starts_fresh_by_default() {
        let app = app();

        let (status, body) = send(
            &app,
            chat_json(
                "token-alice",
                json!({ "message": "Hi", "conversationId": "conv_01ARZ3NDEKTSV4RRFFQ69G5FAV" }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_ne!(body["conversationId"], "conv_01ARZ3NDEKTSV4RRFFQ69G5FAV");
    }

    #[tokio::test]
    async fn unknown_id_is_not_found_under_reject_policy() {
        let app = app_with(SessionConfig {
            unknown_id_policy: UnknownConversationPolicy::Reject,
            ..SessionConfig::default()
        });

        let (status, body) = send(
            &app,
            chat_json(
                "token-alice",
                json!({ "message": "Hi", "conversationId": "conv_01ARZ3NDEKTSV4RRFFQ69G5FAV" }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().expect("error").contains("not found"));
    }

    #[tokio::test]
    async fn other_callers_conversation_is_hidden() {
        let app = app();
        let (_, first) = send(&app, chat_json("token-alice", json!({ "message": "private" }))).await;
        let id = first["conversationId"].as_str().expect("id");

        let request = Request::get(format!("/conversations/{id}"))
            .header(header::AUTHORIZATION, "Bearer token-bob")
            .body(Body::empty())
            .expect("request");
        let (status, _) = send(&app, request).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
