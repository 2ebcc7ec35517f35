//! Authentication user types.

use crate::jwt::BearerClaims;

/// Principal extracted from a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// User UUID
    pub principal: String,
    /// JWT claims from the bearer token
    pub claims: BearerClaims,
}
