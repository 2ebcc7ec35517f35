//! Per-client authentication state.

use crate::db::UserProfile;

/// What one client instance knows about its session. The cookies themselves
/// live in the HTTP client's jar.
#[derive(Debug, Default, Clone)]
pub struct ClientSession {
    user: Option<UserProfile>,
    sync_token: Option<String>,
}

impl ClientSession {
    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn sync_token(&self) -> Option<&str> {
        self.sync_token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Record a successful login. Returns the previously recorded user.
    pub fn begin(&mut self, user: UserProfile, sync_token: String) -> Option<UserProfile> {
        self.sync_token = Some(sync_token);
        self.user.replace(user)
    }

    /// Record the user an authenticated response belongs to. Returns the
    /// previously recorded user.
    pub fn set_user(&mut self, user: UserProfile) -> Option<UserProfile> {
        self.user.replace(user)
    }

    pub fn set_sync_token(&mut self, token: String) {
        self.sync_token = Some(token);
    }

    pub fn clear_sync_token(&mut self) {
        self.sync_token = None;
    }

    /// Forget the user and the sync token. Returns the user that was recorded.
    pub fn end(&mut self) -> Option<UserProfile> {
        self.sync_token = None;
        self.user.take()
    }
}
