use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::ToSocketAddrs;
use tokio_util::sync::CancellationToken;

use crate::docker::Daemon;
use crate::exporter::Exporter;
use crate::status::Status;
use crate::usage::UsageSampler;

mod models;

pub use models::{ContainerItem, Health, StatusResponse};

const NOT_READY: &str = "503 Service Unavailable (Collecting initial metrics, please wait...)\n";
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared handles of all HTTP handlers.
pub struct AppState<D> {
    exporter: Arc<Exporter<D>>,
    status: Arc<Status>,
    usage: UsageSampler,
}

impl<D> Clone for AppState<D> {
    fn clone(&self) -> Self {
        Self {
            exporter: Arc::clone(&self.exporter),
            status: Arc::clone(&self.status),
            usage: self.usage.clone(),
        }
    }
}

impl<D> AppState<D> {
    pub fn new(exporter: Arc<Exporter<D>>, status: Arc<Status>, usage: UsageSampler) -> Self {
        Self {
            exporter,
            status,
            usage,
        }
    }
}

async fn metrics<D: Daemon>(State(state): State<AppState<D>>) -> Response {
    if !state.status.is_ready() {
        log::debug!("Rejecting scrape, initial metrics are still being collected");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            NOT_READY,
        )
            .into_response();
    }

    match state.exporter.scrape(&CancellationToken::new()).await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(err) => {
            log::error!("Failed to render metrics: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to render metrics").into_response()
        }
    }
}

async fn status<D: Daemon>(State(state): State<AppState<D>>) -> Response {
    let errors = state.status.errors();
    let mut body = StatusResponse {
        status: Health::Healthy,
        ready: state.status.is_ready(),
        api_version: String::new(),
        error: String::new(),
        errors: errors
            .descriptions()
            .into_iter()
            .map(|(operation, err)| (operation.to_owned(), err))
            .collect(),
    };

    match state.exporter.docker().ping(&CancellationToken::new()).await {
        Ok(api_version) => {
            body.api_version = api_version;
            if !errors.is_ok() {
                body.status = Health::Degraded;
            }
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => {
            log::error!("Docker daemon is not responding: {}", err);
            body.status = Health::Unhealthy;
            body.error = err.to_string();
            (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
        }
    }
}

async fn containers<D: Daemon>(State(state): State<AppState<D>>) -> Response {
    match state.exporter.overview(&CancellationToken::new()).await {
        Ok((containers, overviews)) => {
            let items: Vec<ContainerItem> = containers
                .iter()
                .map(|container| ContainerItem::new(container, overviews.get(&container.id)))
                .collect();
            (StatusCode::OK, Json(items)).into_response()
        }
        Err(err) => {
            log::error!("Failed to list containers: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn info<D: Daemon>(State(state): State<AppState<D>>) -> Response {
    (StatusCode::OK, Json(state.exporter.host().clone())).into_response()
}

async fn usage<D: Daemon>(State(state): State<AppState<D>>) -> Response {
    (StatusCode::OK, Json(state.usage.sample().await)).into_response()
}

/// Builds the router serving `/metrics`, `/status` and the JSON API under `/api`.
pub fn router<D: Daemon>(state: AppState<D>) -> axum::Router {
    axum::Router::new()
        .route("/metrics", get(metrics::<D>))
        .route("/status", get(status::<D>))
        .route("/api/containers", get(containers::<D>))
        .route("/api/info", get(info::<D>))
        .route("/api/usage", get(usage::<D>))
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to bind HTTP listener: {0}")]
    Bind(#[source] std::io::Error),
    #[error("HTTP server failed: {0}")]
    Serve(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct APIServer {
    router: axum::Router,
}

impl APIServer {
    pub fn new<D: Daemon>(state: AppState<D>) -> Self {
        Self {
            router: router(state),
        }
    }

    /// Serves requests until `shutdown` resolves, then drains open connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or the server fails.
    pub async fn listen(
        self,
        addr: impl ToSocketAddrs,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(Error::Bind)?;
        if let Ok(local) = listener.local_addr() {
            log::info!("Listening on http://{local}");
        }
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(Error::Serve)
    }
}
