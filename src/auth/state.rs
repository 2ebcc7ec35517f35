//! Authentication state traits and macro.

use crate::session::Sessions;

/// Trait for state types that provide session access for authentication.
pub trait HasAuthBackend {
    fn sessions(&self) -> &Sessions;
}

/// Macro to implement `HasAuthBackend` for state structs with the standard fields.
///
/// The struct must have a `sessions: Sessions` field.
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub sessions: Sessions,
///     // ... other fields
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn sessions(&self) -> &$crate::session::Sessions {
                &self.sessions
            }
        }
    };
}
