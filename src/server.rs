use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::translate::ooba_types::OobaGenerateRequest;
use crate::translate::openai_types::ChatCompletionRequest;
use crate::translate::request::ooba_to_chat;
use crate::translate::response::chat_to_ooba;
use crate::upstream::{UpstreamClient, UpstreamRejection, UpstreamReply};

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::StreamExt;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const PROXY_NAME: &str = "nvidia-nim-ooba-proxy";

#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub upstream: UpstreamClient,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/v1/generate", post(handle_generate))
        .route("/api/v1/model", get(handle_model))
        .route("/api/v1/models", get(handle_models))
        .route("/api/v1/info/version", get(handle_version))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_generate(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let req: OobaGenerateRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse generate request");
            return ProxyError::invalid_request(e.to_string()).into_response();
        }
    };

    tracing::info!(
        streaming = req.stream,
        prompt_len = req.prompt.len(),
        max_new_tokens = req.max_new_tokens,
        "Generate request"
    );

    let chat_req = ooba_to_chat(&req, state.upstream.model());

    let result = if chat_req.stream {
        handle_streaming(&state, &chat_req).await
    } else {
        handle_non_streaming(&state, &chat_req).await
    };

    result.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Generate failed");
        e.into_response()
    })
}

async fn handle_non_streaming(state: &AppState, req: &ChatCompletionRequest) -> Result<Response> {
    match state.upstream.complete(req).await? {
        UpstreamReply::Success(resp) => {
            let ooba = chat_to_ooba(&resp)?;
            tracing::info!(tokens = ooba.results[0].tokens, "Completed");
            Ok(Json(ooba).into_response())
        }
        UpstreamReply::Rejected(rejection) => Ok(passthrough(rejection)),
    }
}

async fn handle_streaming(state: &AppState, req: &ChatCompletionRequest) -> Result<Response> {
    match state.upstream.stream(req).await? {
        UpstreamReply::Success(events) => {
            // Each event becomes one `data: <json>\n\n` frame, flushed as produced
            let frames = events.map(|event| Event::default().json_data(&event));
            Ok(([(header::CONNECTION, "keep-alive")], Sse::new(frames)).into_response())
        }
        UpstreamReply::Rejected(rejection) => Ok(passthrough(rejection)),
    }
}

/// Hand an upstream rejection back to the caller untouched.
fn passthrough(rejection: UpstreamRejection) -> Response {
    let status = StatusCode::from_u16(rejection.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = rejection
        .content_type
        .unwrap_or_else(|| "application/json".to_string());

    (status, [(header::CONTENT_TYPE, content_type)], rejection.body).into_response()
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn handle_model(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "result": state.upstream.model() }))
}

async fn handle_models(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "model_names": state.config.models }))
}

async fn handle_version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "proxy": PROXY_NAME,
    }))
}
