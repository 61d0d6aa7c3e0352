#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already processed: {0}")]
    AlreadyProcessed(String),

    /// Never says which field differed.
    #[error("Order details do not match")]
    EmailMismatch,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl ClaimError {
    /// Whether this error came from a collaborator over the network rather
    /// than from claim state.
    pub fn is_upstream(&self) -> bool {
        matches!(self, ClaimError::Http(_) | ClaimError::Upstream(_))
    }
}

pub type Result<T> = std::result::Result<T, ClaimError>;
