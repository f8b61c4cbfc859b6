//! HTTP surface over [`SignalService`].
//!
//! | route | success | failures |
//! |---|---|---|
//! | `GET /signals` | 200 | 503/500 |
//! | `GET /signals/by-device?id=` | 200 | 400 empty id, 404 none |
//! | `POST /signals` | 201 | 400 |
//! | `PATCH /signals/:id` | 200 | 400, 404 |
//! | `DELETE /signals/:id` | 200 | 404 |

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use xray_pipeline_core::contract::{DeleteConfirmation, NewSignal, SignalPatch, SignalRecord};
use xray_pipeline_core::error::{ServiceError, StoreError};
use xray_pipeline_core::service::SignalService;

pub fn router(service: SignalService) -> Router {
    Router::new()
        .route("/signals", get(list_signals).post(create_signal))
        .route("/signals/by-device", get(find_by_device))
        .route("/signals/:id", patch(update_signal).delete(delete_signal))
        .with_state(service)
}

/// Bind `0.0.0.0:port` and serve until `shutdown` is cancelled.
pub async fn serve(service: SignalService, port: u16, shutdown: CancellationToken) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {addr}"))?;
    serve_on(listener, service, shutdown).await
}

pub async fn serve_on(
    listener: TcpListener,
    service: SignalService,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr().context("HTTP listener has no local address")?;
    info!(%addr, "[API] Signals API listening");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")?;

    info!("[API] Signals API stopped");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct DeviceQuery {
    #[serde(default)]
    id: String,
}

async fn list_signals(
    State(service): State<SignalService>,
) -> Result<Json<Vec<SignalRecord>>, ApiError> {
    Ok(Json(service.list_all().await?))
}

async fn find_by_device(
    State(service): State<SignalService>,
    Query(query): Query<DeviceQuery>,
) -> Result<Json<Vec<SignalRecord>>, ApiError> {
    Ok(Json(service.find_by_device(&query.id).await?))
}

async fn create_signal(
    State(service): State<SignalService>,
    payload: Result<Json<NewSignal>, JsonRejection>,
) -> Result<(StatusCode, Json<SignalRecord>), ApiError> {
    let Json(signal) = payload?;
    let record = service.create(signal).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_signal(
    State(service): State<SignalService>,
    Path(id): Path<String>,
    payload: Result<Json<SignalPatch>, JsonRejection>,
) -> Result<Json<SignalRecord>, ApiError> {
    let Json(patch) = payload?;
    Ok(Json(service.update(&id, patch).await?))
}

async fn delete_signal(
    State(service): State<SignalService>,
    Path(id): Path<String>,
) -> Result<Json<DeleteConfirmation>, ApiError> {
    Ok(Json(service.delete(&id).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    status_code: u16,
    error: String,
    message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        let status = match &e {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Invalid(_) => StatusCode::BAD_REQUEST,
            ServiceError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), message = %self.message, "[API][ERROR] Request failed");
        } else {
            debug!(status = self.status.as_u16(), message = %self.message, "[API] Request rejected");
        }

        let body = ErrorBody {
            status_code: self.status.as_u16(),
            error: self
                .status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
