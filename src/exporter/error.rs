use crate::docker;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to render metrics: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error(transparent)]
    Docker(#[from] docker::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
