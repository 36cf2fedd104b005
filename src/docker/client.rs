use std::path::PathBuf;
use std::pin::Pin;
use std::task::{self, Poll};

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::rt::{TokioExecutor, TokioIo};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::container::ContainerID;

use super::models::{
    ApiMessage, ContainerInfo, ContainerInspect, ContainerStats, DiskUsage, RawContainerSummary,
    RawDiskUsage, RawInspect, RawStats,
};
use super::{Daemon, Error, Result};

/// Socket the daemon listens on when `DOCKER_HOST` is not set.
pub const DEFAULT_HOST: &str = "unix:///var/run/docker.sock";

/// Connection to the daemon's unix socket wrapped for hyper.
#[derive(Debug)]
pub struct DaemonStream(TokioIo<tokio::net::UnixStream>);

impl Connection for DaemonStream {
    fn connected(&self) -> Connected {
        Connected::new()
    }
}

impl Read for DaemonStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl Write for DaemonStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

/// Connects every request to the same unix socket, ignoring the request URI.
#[derive(Debug, Clone)]
pub struct UnixConnector {
    path: PathBuf,
}

impl tower::Service<Uri> for UnixConnector {
    type Response = DaemonStream;

    type Error = std::io::Error;

    type Future = Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        _cx: &mut task::Context<'_>,
    ) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: Uri) -> Self::Future {
        let path = self.path.clone();
        Box::pin(async move {
            let stream = tokio::net::UnixStream::connect(path).await?;

            Ok(DaemonStream(TokioIo::new(stream)))
        })
    }
}

/// Parses a `unix://` docker host into the socket path.
///
/// # Errors
///
/// Returns [`Error::UnsupportedHost`] for any other scheme or an empty path.
pub fn socket_path(host: &str) -> Result<PathBuf> {
    match host.strip_prefix("unix://") {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => Err(Error::UnsupportedHost(host.to_owned())),
    }
}

/// Engine API client talking HTTP/1 over the daemon's unix socket.
#[derive(Debug, Clone)]
pub struct DockerClient {
    client: Client<UnixConnector, Empty<Bytes>>,
    socket: PathBuf,
}

impl DockerClient {
    /// Creates a client for `host`. No connection is made until the first request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedHost`] if `host` is not a `unix://` address.
    pub fn new(host: &str) -> Result<Self> {
        let socket = socket_path(host)?;
        log::debug!("Using docker socket {}", socket.display());
        let connector = UnixConnector {
            path: socket.clone(),
        };
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Ok(Self { client, socket })
    }

    pub fn socket(&self) -> &std::path::Path {
        &self.socket
    }

    async fn send(&self, path: &str) -> Result<hyper::Response<Bytes>> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(format!("http://docker{path}"))
            .header(hyper::header::ACCEPT, "application/json")
            .body(Empty::<Bytes>::new())
            .map_err(|source| Error::Request {
                path: path.to_owned(),
                source,
            })?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|source| Error::Send {
                path: path.to_owned(),
                source,
            })?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|source| Error::Body {
                path: path.to_owned(),
                source,
            })?
            .to_bytes();

        if !parts.status.is_success() {
            return Err(status_error(path, parts.status, &body));
        }
        Ok(hyper::Response::from_parts(parts, body))
    }

    async fn get_json<T>(&self, token: &CancellationToken, path: String) -> Result<T>
    where
        T: DeserializeOwned,
    {
        log::trace!("GET {path}");
        let response = tokio::select! {
            biased;
            () = token.cancelled() => return Err(Error::Cancelled(path)),
            response = self.send(&path) => response?,
        };
        serde_json::from_slice(response.body()).map_err(|source| Error::Decode { path, source })
    }
}

fn status_error(path: &str, status: StatusCode, body: &[u8]) -> Error {
    let message = serde_json::from_slice::<ApiMessage>(body)
        .map(|msg| msg.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_owned());
    Error::Status {
        path: path.to_owned(),
        status,
        message,
    }
}

impl Daemon for DockerClient {
    async fn list_containers(
        &self,
        token: &CancellationToken,
        size: bool,
    ) -> Result<Vec<ContainerInfo>> {
        let raw: Vec<RawContainerSummary> = self
            .get_json(token, format!("/containers/json?all=true&size={size}"))
            .await?;
        raw.into_iter().map(RawContainerSummary::into_info).collect()
    }

    async fn inspect_container(
        &self,
        token: &CancellationToken,
        id: &ContainerID,
        size: bool,
    ) -> Result<ContainerInspect> {
        let raw: RawInspect = self
            .get_json(token, format!("/containers/{id}/json?size={size}"))
            .await?;
        Ok(raw.into())
    }

    async fn container_stats(
        &self,
        token: &CancellationToken,
        id: &ContainerID,
    ) -> Result<ContainerStats> {
        let raw: RawStats = self
            .get_json(token, format!("/containers/{id}/stats?stream=false&one-shot=true"))
            .await?;
        Ok(raw.into())
    }

    async fn disk_usage(&self, token: &CancellationToken) -> Result<DiskUsage> {
        let raw: RawDiskUsage = self.get_json(token, "/system/df".to_owned()).await?;
        Ok(raw.into())
    }

    async fn ping(&self, token: &CancellationToken) -> Result<String> {
        let path = "/_ping".to_owned();
        let response = tokio::select! {
            biased;
            () = token.cancelled() => return Err(Error::Cancelled(path)),
            response = self.send(&path) => response?,
        };
        Ok(response
            .headers()
            .get("Api-Version")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_owned())
    }
}
