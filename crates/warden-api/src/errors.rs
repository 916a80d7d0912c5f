use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("remote returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status of the failed call, when the remote answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
