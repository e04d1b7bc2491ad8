/// HTTP surfaces for the two processes.
///
/// `api_router` serves the action endpoint for the editor; `terminal_router`
/// is mounted by the terminal host and upgrades connections to WebSockets.

use crate::commands::{self, ActionRequest, AppState};
use crate::error::IdeError;
use crate::services::terminal::{run_session, session_cwd};
use crate::services::{SessionRegistry, TerminalOptions};
use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::header::{AUTHORIZATION, ORIGIN};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

impl IntoResponse for IdeError {
    fn into_response(self) -> Response {
        let status = match &self {
            IdeError::Unauthorized => StatusCode::UNAUTHORIZED,
            IdeError::AccessDenied(_) | IdeError::Forbidden(_) => StatusCode::FORBIDDEN,
            IdeError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        let body = json!({
            "success": false,
            "error": self.to_string(),
            "code": self.code(),
        });
        (status, Json(body)).into_response()
    }
}

/// Byte comparison whose running time does not depend on where the inputs
/// first differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn token_matches(password: Option<&str>, headers: &HeaderMap, token: Option<&str>) -> bool {
    let Some(password) = password else {
        return true;
    };
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    bearer
        .into_iter()
        .chain(token)
        .any(|presented| constant_time_eq(presented.as_bytes(), password.as_bytes()))
}

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

#[derive(Clone)]
struct ApiState {
    app: Arc<AppState>,
    password: Option<Arc<str>>,
}

/// Router for the request-handling server: `POST /api` with a JSON body
/// carrying `action` and its parameters.
pub fn api_router(app: Arc<AppState>, password: Option<String>) -> Router {
    let state = ApiState {
        app,
        password: password.map(Arc::from),
    };
    Router::new()
        .route("/api", post(api_handler))
        .with_state(state)
}

async fn api_handler(
    State(state): State<ApiState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !token_matches(state.password.as_deref(), &headers, query.token.as_deref()) {
        log::warn!("[Api] Rejected unauthenticated request");
        return IdeError::Unauthorized.into_response();
    }

    let request = match serde_json::from_slice::<Value>(&body)
        .map_err(|e| IdeError::InvalidRequest(format!("invalid JSON body: {e}")))
        .and_then(ActionRequest::parse)
    {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    let app = state.app.clone();
    let outcome = tokio::task::spawn_blocking(move || commands::dispatch(&app, request))
        .await
        .unwrap_or_else(|e| {
            log::error!("[Api] Action worker failed: {}", e);
            Err(IdeError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "action worker failed",
            )))
        });

    match outcome {
        Ok(value) => Json(success_body(value)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `{success: true}` merged with the result's own fields.
fn success_body(value: Value) -> Value {
    let mut body = Map::new();
    body.insert("success".into(), Value::Bool(true));
    match value {
        Value::Object(fields) => body.extend(fields),
        Value::Null => {}
        other => {
            body.insert("result".into(), other);
        }
    }
    Value::Object(body)
}

/// Everything a terminal-host connection needs.
pub struct TerminalHost {
    pub options: TerminalOptions,
    pub registry: Arc<SessionRegistry>,
    /// Empty allows any origin.
    pub allowed_origins: Vec<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TerminalQuery {
    cwd: Option<String>,
    token: Option<String>,
}

/// Router for the terminal host: `GET /` and `GET /ws/terminal`.
pub fn terminal_router(host: Arc<TerminalHost>) -> Router {
    Router::new()
        .route("/", get(terminal_handler))
        .route("/ws/terminal", get(terminal_handler))
        .with_state(host)
}

fn origin_allowed(allowed: &[String], headers: &HeaderMap) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Some(origin) = headers.get(ORIGIN).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    allowed.iter().any(|entry| origin.contains(entry.as_str()))
}

async fn terminal_handler(
    ws: WebSocketUpgrade,
    State(host): State<Arc<TerminalHost>>,
    Query(query): Query<TerminalQuery>,
    headers: HeaderMap,
) -> Response {
    if !origin_allowed(&host.allowed_origins, &headers) {
        log::warn!(
            "[Terminal] Rejected origin {:?}",
            headers.get(ORIGIN).and_then(|v| v.to_str().ok())
        );
        return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
    }
    if !token_matches(host.password.as_deref(), &headers, query.token.as_deref()) {
        return IdeError::Unauthorized.into_response();
    }

    let cwd = session_cwd(query.cwd.as_deref());
    let options = host.options.clone();
    let registry = host.registry.clone();
    ws.on_upgrade(move |socket| run_session(socket, cwd, options, registry))
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("Shutdown signal received");
}
