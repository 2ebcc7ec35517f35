use crate::hasher::HashError;
use crate::jwt::JwtError;

/// Failures of the refresh credential lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No live stored credential for the principal.
    #[error("No refresh credential")]
    NoCredential,
    /// Presented secret did not match. The stored credential has been revoked.
    #[error("Refresh credential mismatch")]
    Mismatch,
    /// The credential is valid but the principal no longer exists.
    #[error("Principal no longer exists")]
    PrincipalMissing,
    #[error("Credential store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<HashError> for SessionError {
    fn from(e: HashError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<JwtError> for SessionError {
    fn from(e: JwtError) -> Self {
        Self::Internal(e.to_string())
    }
}
