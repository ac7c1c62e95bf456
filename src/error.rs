use thiserror::Error;

use crate::media::MediaError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("message record already disposed")]
    Disposed,

    #[error("invalid record state: {0}")]
    InvalidState(String),

    #[error("malformed chat message: {0}")]
    MalformedMessage(String),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
