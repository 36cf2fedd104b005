/// Turns a failed result into `None` after logging it.
pub trait ResultOkLogExt<T, E> {
    /// Logs the error at `warn` level.
    fn ok_log(self) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn ok_log(self) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::warn!("{err}");
                None
            }
        }
    }
}

/// Errors that abort startup.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] crate::config::Error),
    #[error(transparent)]
    Docker(#[from] crate::docker::Error),
    #[error(transparent)]
    Api(#[from] crate::api::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
