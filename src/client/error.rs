use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    /// The refresh was rejected; local auth state has been cleared. Carries
    /// the status of the original failed request.
    #[error("Session ended, login required (original status {status})")]
    SessionEnded { status: StatusCode },
    /// The refresh endpoint failed for a non-auth reason. The session is kept.
    #[error("Refresh unavailable ({status:?})")]
    RefreshUnavailable { status: Option<StatusCode> },
    #[error("Request failed with {status}: {message}")]
    Status {
        status: StatusCode,
        code: Option<String>,
        message: String,
    },
}

impl ClientError {
    /// Machine-readable code from the server's error body, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Status { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::SessionEnded { status } | ClientError::Status { status, .. } => {
                Some(*status)
            }
            ClientError::RefreshUnavailable { status } => *status,
            ClientError::Http(e) => e.status(),
            ClientError::Url(_) => None,
        }
    }
}
