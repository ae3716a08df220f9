//! Contains the error type returned when a manager can't be set up

use crate::BoxError;
use thiserror::Error;

/// Error returned by [`RequestsManagerBuilder::build`](crate::RequestsManagerBuilder::build)
#[derive(Error, Debug)]
#[error("manager error: {msg}")]
pub struct ManagerError {
    msg: String,
    #[source]
    source: BoxError,
}

impl ManagerError {
    fn new<E: std::error::Error + Send + Sync + 'static>(msg: impl Into<String>, source: E) -> ManagerError {
        ManagerError {
            msg: msg.into(),
            source: Box::new(source),
        }
    }
}

impl From<tokio::runtime::TryCurrentError> for ManagerError {
    fn from(e: tokio::runtime::TryCurrentError) -> Self {
        ManagerError::new("no tokio runtime to run requests on", e)
    }
}
