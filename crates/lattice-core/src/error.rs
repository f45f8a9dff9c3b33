use crate::platform::PlatformError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found")]
    NotFound,
    #[error("not authorized")]
    AuthorizationDenied,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("a banshare submission is already in progress for this user")]
    DialogBusy,
    #[error("missing configuration: {0}")]
    ConfigurationMissing(&'static str),
    #[error("database error: {0}")]
    Database(#[from] lattice_db::DbError),
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),
}
