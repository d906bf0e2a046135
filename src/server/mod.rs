//! HTTP front end for the command runner.
//!
//! Endpoints:
//! - `POST /api/exec` launches a command and streams its output as
//!   `text/plain`, with the execution id in the `X-Execution-Id` header
//! - `DELETE /api/exec?id=...` cancels a running execution
//! - `GET /api/exec` lists running executions
//! - `GET /health` reports liveness

mod error;

pub use error::{ApiError, ErrorBody};

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderName, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use deskexec_config::constants::server::EXECUTION_ID_HEADER;
use deskexec_runner::{CommandRequest, ExecutionId, ExecutionInfo, Launched, Launcher};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    launcher: Arc<Launcher>,
}

impl AppState {
    pub fn new(launcher: Launcher) -> Self {
        Self {
            launcher: Arc::new(launcher),
        }
    }

    pub fn launcher(&self) -> &Launcher {
        &self.launcher
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelParams {
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionList {
    pub executions: Vec<ExecutionInfo>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/exec",
            get(list_executions)
                .post(launch_command)
                .delete(cancel_command),
        )
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn launch_command(
    State(state): State<AppState>,
    request: Result<Json<CommandRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) =
        request.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let Launched { id, stream } = state.launcher.launch(&request).await?;
    let id_value = HeaderValue::from_str(id.as_str())
        .map_err(|err| ApiError::internal(format!("invalid execution id header: {err}")))?;

    let body = Body::from_stream(stream.map(Ok::<_, Infallible>));
    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(HeaderName::from_static(EXECUTION_ID_HEADER), id_value);
    Ok(response)
}

async fn cancel_command(
    State(state): State<AppState>,
    Query(params): Query<CancelParams>,
) -> Result<Json<CancelResponse>, ApiError> {
    let Some(id) = params
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
    else {
        return Err(ApiError::bad_request("Execution ID is required"));
    };

    state.launcher.registry().cancel(&ExecutionId::from(id))?;
    Ok(Json(CancelResponse { success: true }))
}

async fn list_executions(State(state): State<AppState>) -> Json<ExecutionList> {
    Json(ExecutionList {
        executions: state.launcher.registry().list(),
    })
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// On shutdown every running command is terminated so that open output
/// streams end and in-flight responses can complete.
pub async fn serve<F>(listener: TcpListener, launcher: Launcher, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = launcher.registry().clone();
    let local_addr = listener
        .local_addr()
        .context("failed to read listener address")?;
    tracing::info!(
        addr = %local_addr,
        root = %launcher.project_root().path().display(),
        timeout = ?launcher.timeout(),
        "deskexec server listening"
    );

    axum::serve(listener, create_router(AppState::new(launcher)))
        .with_graceful_shutdown(async move {
            shutdown.await;
            let terminated = registry.terminate_all();
            tracing::info!(terminated, "shutting down; terminated running commands");
        })
        .await
        .context("server terminated with an error")?;

    tracing::info!("deskexec server stopped");
    Ok(())
}

/// Bind `addr` and serve until Ctrl+C or SIGTERM.
pub async fn run(launcher: Launcher, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    serve(listener, launcher, shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
