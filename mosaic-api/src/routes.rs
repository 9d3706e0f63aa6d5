//! HTTP route handlers
//!
//! `POST /api/generate` accepts the prompt, gates it through moderation
//! and the rate limiter, creates the session, and hands the actual work
//! to a background executor task; callers poll `GET /api/sessions/{id}`
//! for progress. Refinement (`POST /api/iterate`) runs inline because a
//! single model call is short enough to answer synchronously.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use mosaic_core::{ContextEntry, SessionId, SessionRecord};
use mosaic_jobs::IterationOutcome;
use mosaic_providers::GenerationParams;
use mosaic_store::Admission;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn router(state: AppState) -> Router {
    // Browser clients call this API cross-origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/iterate", post(iterate))
        .route("/api/sessions/:id", get(session_status))
        .route("/api/sessions/:id/context/:model", get(session_context))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// REQUEST / RESPONSE BODIES
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub prompt: String,
    /// Model names to run; omitted means every configured model.
    #[serde(default)]
    pub models: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub session_id: SessionId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterateRequest {
    pub session_id: SessionId,
    pub model: String,
    pub prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IterateResponse {
    pub index: usize,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextResponse {
    pub session_id: SessionId,
    pub model: String,
    pub window: Vec<ContextEntry>,
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<impl IntoResponse> {
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err(ApiError::InvalidRequest("prompt must not be empty".into()));
    }
    admit(&state, &headers, prompt).await?;

    let known: Vec<&str> = state.registry.all().iter().map(|m| m.name()).collect();
    if known.is_empty() {
        return Err(ApiError::InvalidRequest("no models configured".into()));
    }
    let enabled: Vec<&str> = match &request.models {
        None => known.clone(),
        Some(requested) => {
            for name in requested {
                if !known.contains(&name.as_str()) {
                    return Err(ApiError::InvalidRequest(format!(
                        "unknown model {}",
                        name
                    )));
                }
            }
            known
                .iter()
                .copied()
                .filter(|name| requested.iter().any(|r| r == name))
                .collect()
        }
    };
    if enabled.is_empty() {
        return Err(ApiError::InvalidRequest("no models selected".into()));
    }

    let session_id = state
        .manager
        .create_session(prompt, &known, &enabled)
        .await?;

    let executor = state.executor.clone();
    tokio::spawn(async move {
        if let Err(e) = executor.execute(session_id, GenerationParams::default()).await {
            tracing::error!(%session_id, error = %e, "generation run failed");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateResponse { session_id }),
    ))
}

async fn iterate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IterateRequest>,
) -> ApiResult<Json<IterateResponse>> {
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err(ApiError::InvalidRequest("prompt must not be empty".into()));
    }
    admit(&state, &headers, prompt).await?;

    let outcome = state
        .executor
        .execute_iteration(request.session_id, &request.model, prompt)
        .await?;

    let response = match outcome {
        IterationOutcome::Completed { index, image_key } => IterateResponse {
            index,
            status: "completed",
            image_key: Some(image_key),
            error: None,
        },
        IterationOutcome::Failed { index, error } => IterateResponse {
            index,
            status: "error",
            image_key: None,
            error: Some(error),
        },
    };
    Ok(Json(response))
}

async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Json<SessionRecord>> {
    let record = state
        .manager
        .session(session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("session".to_string()))?;
    Ok(Json(record))
}

async fn session_context(
    State(state): State<AppState>,
    Path((session_id, model)): Path<(SessionId, String)>,
) -> ApiResult<Json<ContextResponse>> {
    if state.manager.session(session_id).await?.is_none() {
        return Err(ApiError::NotFound("session".to_string()));
    }
    let window = state.context.window(session_id, &model).await?;
    Ok(Json(ContextResponse {
        session_id,
        model,
        window,
    }))
}

/// Moderation and rate-limit gates shared by the mutating endpoints.
async fn admit(state: &AppState, headers: &HeaderMap, prompt: &str) -> ApiResult<()> {
    if state.filter.is_blocked(prompt) {
        tracing::info!("prompt rejected by moderation gate");
        return Err(ApiError::BlockedPrompt);
    }
    let identity = client_identity(headers);
    match state.limiter.check(&identity).await? {
        Admission::Allowed => Ok(()),
        Admission::Limited(scope) => Err(ApiError::RateLimited(scope)),
    }
}

/// The caller's network identity, from the forwarding proxy when present.
fn client_identity(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use mosaic_core::{PromptFilter, RateLimitConfig, SessionStatus};
    use mosaic_jobs::{FanOutExecutor, SessionManager};
    use mosaic_providers::{detect::ProviderKind, ModelRegistry};
    use mosaic_store::{ContextLog, ImageStore, MemoryObjectStore, ObjectStore, RateLimiter};
    use mosaic_test_utils::{model_config, ScriptedAdapter};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(identity_limit: u64) -> (Router, SessionManager) {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let adapter = ScriptedAdapter::new("mock");
        let registry = Arc::new(
            ModelRegistry::new(
                vec![model_config(1, "mock", "m1"), model_config(2, "mock", "m2")],
                1,
            )
            .with_adapter(ProviderKind::Generic, adapter),
        );
        let manager = SessionManager::new(Arc::clone(&store));
        let executor = FanOutExecutor::new(
            manager.clone(),
            Arc::clone(&registry),
            Arc::new(ImageStore::new(Arc::clone(&store))),
            Arc::new(ContextLog::new(Arc::clone(&store))),
        )
        .with_model_timeout(Duration::from_secs(5));
        let state = AppState {
            registry,
            limiter: Arc::new(RateLimiter::new(
                Arc::clone(&store),
                RateLimitConfig {
                    global_limit: 1000,
                    identity_limit,
                    whitelist: vec![],
                    identity_salt: "salt".into(),
                },
            )),
            filter: Arc::new(PromptFilter::new()),
            manager: manager.clone(),
            executor,
            context: Arc::new(ContextLog::new(store)),
        };
        (router(state), manager)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_generate_accepts_and_runs_to_completion() {
        let (app, manager) = app(100);
        let response = app
            .oneshot(post_json("/api/generate", json!({ "prompt": "a sunset" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = body_json(response).await;
        let session_id: SessionId = body["sessionId"].as_str().unwrap().parse().unwrap();

        // The executor runs in the background; poll until terminal.
        let mut status = SessionStatus::Pending;
        for _ in 0..50 {
            if let Some(record) = manager.session(session_id).await.unwrap() {
                status = record.status;
                if status != SessionStatus::Pending && status != SessionStatus::InProgress {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_generate_blocked_prompt() {
        let (app, _) = app(100);
        let response = app
            .oneshot(post_json("/api/generate", json!({ "prompt": "n-s-f-w art" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "blocked_prompt");
    }

    #[tokio::test]
    async fn test_generate_empty_prompt() {
        let (app, _) = app(100);
        let response = app
            .oneshot(post_json("/api/generate", json!({ "prompt": "  " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_generate_unknown_model() {
        let (app, _) = app(100);
        let response = app
            .oneshot(post_json(
                "/api/generate",
                json!({ "prompt": "a cat", "models": ["mystery"] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_second_request() {
        let (app, _) = app(1);
        let response = app
            .clone()
            .oneshot(post_json("/api/generate", json!({ "prompt": "one" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = app
            .oneshot(post_json("/api/generate", json!({ "prompt": "two" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(response).await["error"], "rate_limited");
    }

    #[tokio::test]
    async fn test_session_status_not_found() {
        let (app, _) = app(100);
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/sessions/{}", mosaic_core::new_session_id()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_session_status_returns_record() {
        let (app, manager) = app(100);
        let id = manager
            .create_session("p", &["m1", "m2"], &["m1"])
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/sessions/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["sessionId"], id.to_string());
        assert_eq!(body["status"], "pending");
    }

    #[tokio::test]
    async fn test_iterate_unknown_model_is_404() {
        let (app, manager) = app(100);
        let id = manager.create_session("p", &["m1"], &["m1"]).await.unwrap();

        let response = app
            .oneshot(post_json(
                "/api/iterate",
                json!({ "sessionId": id, "model": "mystery", "prompt": "r" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_context_window_empty_for_fresh_session() {
        let (app, manager) = app(100);
        let id = manager.create_session("p", &["m1"], &["m1"]).await.unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/sessions/{}/context/m1", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["window"], json!([]));
    }
}
