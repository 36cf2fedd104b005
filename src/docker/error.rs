use hyper::StatusCode;

use crate::container;

/// Errors returned by the docker daemon facade.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported docker host `{0}` (expected `unix://<path>`)")]
    UnsupportedHost(String),
    #[error("failed to build request for `{path}`: {source}")]
    Request {
        path: String,
        #[source]
        source: hyper::http::Error,
    },
    #[error("failed to send request `{path}` to docker daemon: {source}")]
    Send {
        path: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },
    #[error("failed to read response body of `{path}`: {source}")]
    Body {
        path: String,
        #[source]
        source: hyper::Error,
    },
    #[error("docker daemon answered `{path}` with {status}: {message}")]
    Status {
        path: String,
        status: StatusCode,
        message: String,
    },
    #[error("failed to decode response of `{path}`: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    ContainerID(#[from] container::Error),
    #[error("request `{0}` was cancelled")]
    Cancelled(String),
}

pub type Result<T> = std::result::Result<T, Error>;
