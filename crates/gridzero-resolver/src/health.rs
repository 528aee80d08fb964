//! Ops HTTP surface: `GET /health` and the manual `POST /resolve` trigger.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use gridzero_types::{GridzeroError, Result};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::orchestrator::SettlementOutcome;
use crate::scheduler::RoundScheduler;
use crate::state::{HealthSnapshot, PipelineState};

#[derive(Clone)]
struct OpsState {
    state: Arc<PipelineState>,
    scheduler: Arc<RoundScheduler>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn router(state: Arc<PipelineState>, scheduler: Arc<RoundScheduler>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/resolve", post(resolve))
        .with_state(OpsState { state, scheduler })
}

async fn health(State(ops): State<OpsState>) -> Json<HealthSnapshot> {
    Json(ops.state.snapshot())
}

async fn resolve(
    State(ops): State<OpsState>,
) -> std::result::Result<Json<SettlementOutcome>, (StatusCode, Json<ErrorResponse>)> {
    info!("manual resolution requested");
    match ops.scheduler.tick().await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) => {
            let status = match &e {
                GridzeroError::ResolutionInProgress => StatusCode::CONFLICT,
                e if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            warn!(error = %e, status = status.as_u16(), "manual resolution failed");
            Err((status, Json(ErrorResponse { error: e.to_string() })))
        }
    }
}

/// Bind the ops listener.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| GridzeroError::Configuration(format!("ops.listen_addr {addr}: {e}")))?;
    TcpListener::bind(addr)
        .await
        .map_err(|e| GridzeroError::Io(format!("bind ops listener {addr}: {e}")))
}

/// Serve `router` on `listener` until `shutdown` flips to `true`.
pub async fn serve(listener: TcpListener, router: Router, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "ops endpoint listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        })
        .await
        .map_err(|e| GridzeroError::Io(format!("ops server: {e}")))
}
