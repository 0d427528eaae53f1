use reqwest::StatusCode;
use thiserror::Error;

use crate::retry::{Classify, FailureKind};

pub type Result<T> = core::result::Result<T, Error>;

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no access token configured (pass --token or set {0})")]
    MissingCredential(&'static str),

    #[error("access token cannot be used as an Authorization header value")]
    InvalidCredential,

    #[error("could not fetch the column header: {0}")]
    HeaderUnavailable(#[source] FetchError),

    #[error("Reqwest Error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Csv Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tokio Join Error, couldn't await a task! {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors from a single request against the remote service.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("authorization rejected with status {status}")]
    Unauthorized { status: StatusCode },

    #[error("server answered with status {status}")]
    Status { status: StatusCode },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed CSV page: {0}")]
    Csv(#[from] csv::Error),

    #[error("unexpected payload: {0}")]
    Parse(String),

    #[error("output writer is no longer accepting rows")]
    WriterClosed,
}

impl FetchError {
    /// Maps a non-success status to the matching error.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Unauthorized { status },
            _ => FetchError::Status { status },
        }
    }
}

impl Classify for FetchError {
    fn kind(&self) -> FailureKind {
        match self {
            FetchError::Unauthorized { .. } => FailureKind::Authorization,
            FetchError::Status { .. } => FailureKind::Transient,
            FetchError::Transport(e) if e.is_builder() => FailureKind::Permanent,
            FetchError::Transport(_) => FailureKind::Transient,
            FetchError::Csv(_) | FetchError::Parse(_) | FetchError::WriterClosed => {
                FailureKind::Permanent
            }
        }
    }
}
