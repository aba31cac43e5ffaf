//! HTTP realization of the request boundary.
//!
//! The renderer process talks to the privileged process through
//! `POST /invoke/{operation}`: session id in a cookie, JSON input in the
//! body, uniform envelope back. The envelope is the protocol, so the HTTP
//! status is 200 for every expected outcome; only the transport itself
//! failing produces anything else, which the renderer maps to
//! `TransportError`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;

use crate::dispatcher::{Dispatcher, Envelope, ErrorKind};
use crate::guard::FORBIDDEN_MESSAGE;
use crate::session::SessionManager;

/// Cookie carrying the session id.
pub const SESSION_COOKIE: &str = "permitdesk_session";

/// Shared state for the boundary handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub sessions: Arc<SessionManager>,
}

/// Build the boundary router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/invoke/{operation}", post(invoke_handler))
        .with_state(state)
}

/// Serve the boundary until the process exits.
pub async fn serve(state: AppState, port: u16) {
    let app = router(state);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!(port = port, "Starting request boundary");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind boundary port");

    axum::serve(listener, app)
        .await
        .expect("request boundary server failed");
}

/// Health check handler - returns 200 OK.
async fn health_handler() -> &'static str {
    "OK"
}

/// Resolve the session and dispatch the named operation.
async fn invoke_handler(
    State(state): State<AppState>,
    Path(operation): Path<String>,
    headers: HeaderMap,
    Json(input): Json<Value>,
) -> Json<Envelope> {
    let session_id = match session_id_from_headers(&headers) {
        Some(id) => id,
        None => {
            return Json(Envelope::failure(ErrorKind::Forbidden, FORBIDDEN_MESSAGE));
        }
    };

    let session = match state.sessions.get(&session_id).await {
        Ok(Some(session)) => session,
        // Unknown or expired session: same generic denial as a missing one.
        Ok(None) => {
            return Json(Envelope::failure(ErrorKind::Forbidden, FORBIDDEN_MESSAGE));
        }
        Err(e) => {
            tracing::error!(error = %e, "Session lookup failed");
            return Json(Envelope::failure(
                ErrorKind::HandlerFailure,
                e.user_message(),
            ));
        }
    };

    Json(state.dispatcher.invoke(&operation, input, &session).await)
}

/// Extract the session id from the cookie header.
fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .find_map(|cookie| {
            let mut parts = cookie.trim().splitn(2, '=');
            let name = parts.next()?;
            let value = parts.next()?;
            if name == SESSION_COOKIE {
                Some(value.to_string())
            } else {
                None
            }
        })
}
