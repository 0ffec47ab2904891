use axum::http::StatusCode;
use thiserror::Error;
use travelog_core::{ImageError, TravelogError};

/// Failure of a story lifecycle operation, as reported to the caller.
#[derive(Error, Debug)]
pub enum StoryError {
    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Travel story not found!")]
    NotFound,

    #[error("Image service error: {0}")]
    Upstream(#[from] ImageError),

    #[error("Storage error: {0}")]
    Internal(#[from] TravelogError),
}

impl StoryError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Upstream(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the caller. Collaborator details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Upstream(_) => "Image service request failed".to_string(),
            Self::Internal(_) => "Internal Server Error".to_string(),
            other => other.to_string(),
        }
    }
}
