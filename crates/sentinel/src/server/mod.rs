//! Browser dashboard and JSON API.
//!
//! Handlers lock the shared agent for the duration of one synchronous
//! storage call; nothing awaits while the lock is held.

mod handlers;

use std::net::SocketAddr;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::runner::{spawn_loop, AgentControl, SharedAgent};

/// The dashboard page.
pub const DASHBOARD_HTML: &str = include_str!("dashboard.html");

/// State shared by all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The agent.
    pub agent: SharedAgent,
    /// Start/stop flags of the background loop.
    pub control: AgentControl,
    /// Restart the loop after a reset.
    pub autostart: bool,
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/api/transactions", get(handlers::list_transactions))
        .route("/api/transactions/:id", get(handlers::get_transaction))
        .route("/api/blocked", get(handlers::blocked))
        .route("/api/stats", get(handlers::stats))
        .route("/api/alerts", get(handlers::alerts))
        .route(
            "/api/investigations",
            get(handlers::list_investigations).post(handlers::create_investigation),
        )
        .route(
            "/api/investigations/:id",
            patch(handlers::update_investigation),
        )
        .route("/api/agent/status", get(handlers::agent_status))
        .route("/api/agent/start", post(handlers::start_agent))
        .route("/api/agent/stop", post(handlers::stop_agent))
        .route("/api/agent/step", post(handlers::step_agent))
        .route("/api/logs", get(handlers::logs))
        .route(
            "/api/threshold",
            get(handlers::get_threshold).put(handlers::put_threshold),
        )
        .route("/api/reset", post(handlers::reset))
        .route("/api/simulate", post(handlers::simulate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the loop task and serve HTTP until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(state: AppState, bind: SocketAddr, period: std::time::Duration) -> Result<()> {
    let loop_task = spawn_loop(state.agent.clone(), state.control.clone(), period);
    if state.autostart {
        state.control.start();
    }
    let control = state.control.clone();

    let listener = TcpListener::bind(bind)
        .await
        .map_err(|e| Error::server(format!("failed to bind {bind}: {e}")))?;
    info!("Dashboard listening on http://{}", bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await
        .map_err(|e| Error::server(e.to_string()))?;

    control.shutdown();
    if let Err(e) = loop_task.await {
        error!("Agent loop task failed: {}", e);
    }
    info!("Dashboard stopped");
    Ok(())
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

/// An error answered as `{"message": ...}`.
///
/// Malformed bodies, queries and path segments are answered with 400 too,
/// so every failure a client sees has the same shape.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = if err.is_not_found() {
            StatusCode::NOT_FOUND
        } else if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            error!("Request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                message: self.message,
            }),
        )
            .into_response()
    }
}
