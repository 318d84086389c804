/// Core error type for the pager.
///
/// Adapter crates map their specific errors into this type so the polling loop
/// and dispatcher can decide per failure whether to retry, back off or drop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("pagination session not found")]
    NotFound,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("platform rejected request: {0}")]
    Platform(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("background task failed: {0}")]
    TaskFailed(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
