use thiserror::Error;

use crate::origin::OriginError;

pub type Result<T> = std::result::Result<T, StatusError>;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("Origin fetch failed: {0}")]
    OriginFetch(OriginError),

    #[error("Origin query timed out: {0}")]
    OriginTimeout(OriginError),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Workflow type not in catalog: {0}")]
    CatalogLookupMiss(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StatusError {
    pub fn malformed(message: impl Into<String>) -> Self {
        StatusError::MalformedInput(message.into())
    }

    /// True for failures that came from an origin store (fetch or timeout).
    pub fn is_origin(&self) -> bool {
        matches!(
            self,
            StatusError::OriginFetch(_) | StatusError::OriginTimeout(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StatusError::OriginTimeout(_))
    }
}

impl From<OriginError> for StatusError {
    fn from(err: OriginError) -> Self {
        if err.is_timeout() {
            StatusError::OriginTimeout(err)
        } else {
            StatusError::OriginFetch(err)
        }
    }
}
