//! HTTP surface of the tree service.
//!
//! Routes:
//! - `POST   /imports`                                   apply one batch
//! - `DELETE /delete/{id}[?date=]`                       cascade delete
//! - `GET    /nodes/{id}`                                node with expanded children
//! - `GET    /updates?date=`                             files changed in the day before `date`
//! - `GET    /node/{id}/history?dateStart=&dateEnd=`     history range
//!
//! Every failure is answered with a fresh `{code, message}` body; the detailed
//! error only goes to the log. Store work runs on the blocking pool.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;

use crate::core::errors::{DtrError, Result};
use crate::logger::{ActivityEntry, EventType, Severity};
use crate::model::wire::{ErrorBody, ImportRequest, ItemsResponse};
use crate::model::{NodeId, Timestamp};
use crate::tree::TreeService;

/// Error wrapper that renders as the public failure body.
#[derive(Debug)]
pub struct ApiError(pub DtrError);

impl From<DtrError> for ApiError {
    fn from(value: DtrError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.http_status();
        if code >= 500 {
            tracing::error!(code = self.0.code(), error = %self.0, "request failed");
        } else {
            tracing::debug!(code = self.0.code(), error = %self.0, "request rejected");
        }
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorBody::for_status(code))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct DateParam {
    pub date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeParams {
    pub date_start: Option<String>,
    pub date_end: Option<String>,
}

/// Build the router over a shared service.
pub fn router(service: Arc<TreeService>) -> Router {
    Router::new()
        .route("/imports", post(import))
        .route("/delete/{id}", delete(delete_node))
        .route("/nodes/{id}", get(get_node))
        .route("/updates", get(updates))
        .route("/node/{id}/history", get(history))
        .with_state(service)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(service: Arc<TreeService>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await.map_err(|error| DtrError::Runtime {
        details: format!("cannot bind {addr}: {error}"),
    })?;
    serve_on(service, listener).await
}

/// Serve on an already bound listener.
pub async fn serve_on(service: Arc<TreeService>, listener: TcpListener) -> Result<()> {
    let local = listener.local_addr().map_err(|error| DtrError::Runtime {
        details: format!("listener has no local address: {error}"),
    })?;
    tracing::info!(addr = %local, "http server listening");
    let mut entry = ActivityEntry::new(EventType::ServerStarted, Severity::Info);
    entry.details = Some(local.to_string());
    service.record_activity(&entry);

    axum::serve(listener, router(service))
        .await
        .map_err(|error| DtrError::Runtime {
            details: format!("http server stopped: {error}"),
        })
}

async fn run_blocking<T, F>(service: Arc<TreeService>, work: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&TreeService) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || work(&service))
        .await
        .map_err(|error| DtrError::Runtime {
            details: format!("blocking task failed: {error}"),
        })?
        .map_err(ApiError)
}

fn required_date(raw: Option<&str>, name: &str) -> Result<Timestamp> {
    raw.map_or_else(
        || Err(DtrError::malformed(format!("missing query parameter {name}"))),
        Timestamp::parse,
    )
}

async fn import(State(service): State<Arc<TreeService>>, body: Bytes) -> ApiResult<StatusCode> {
    let request: ImportRequest = serde_json::from_slice(&body)
        .map_err(|error| DtrError::malformed(format!("import body: {error}")))?;
    run_blocking(service, move |svc| svc.import(&request)).await?;
    Ok(StatusCode::OK)
}

async fn delete_node(
    State(service): State<Arc<TreeService>>,
    Path(id): Path<String>,
    Query(params): Query<DateParam>,
) -> ApiResult<StatusCode> {
    let id: NodeId = id.parse()?;
    let date = params.date.as_deref().map(Timestamp::parse).transpose()?;
    run_blocking(service, move |svc| svc.delete(id, date)).await?;
    Ok(StatusCode::OK)
}

async fn get_node(
    State(service): State<Arc<TreeService>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id: NodeId = id.parse()?;
    let view = run_blocking(service, move |svc| svc.get_node(id)).await?;
    Ok(Json(view).into_response())
}

async fn updates(
    State(service): State<Arc<TreeService>>,
    Query(params): Query<DateParam>,
) -> ApiResult<Response> {
    let date = required_date(params.date.as_deref(), "date")?;
    let items = run_blocking(service, move |svc| svc.recent_files(date)).await?;
    Ok(Json(ItemsResponse { items }).into_response())
}

async fn history(
    State(service): State<Arc<TreeService>>,
    Path(id): Path<String>,
    Query(params): Query<RangeParams>,
) -> ApiResult<Response> {
    let id: NodeId = id.parse()?;
    let start = required_date(params.date_start.as_deref(), "dateStart")?;
    let end = required_date(params.date_end.as_deref(), "dateEnd")?;
    let items = run_blocking(service, move |svc| svc.history(id, start, end)).await?;
    Ok(Json(ItemsResponse { items }).into_response())
}
