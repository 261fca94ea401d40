//! Authentication state trait and macro.

use super::session::SessionManager;

/// Trait for state types that provide the session manager for authentication.
pub trait HasSessionManager {
    fn sessions(&self) -> &SessionManager;
}

impl HasSessionManager for SessionManager {
    fn sessions(&self) -> &SessionManager {
        self
    }
}

/// Macro to implement `HasSessionManager` for state structs with a
/// `sessions: SessionManager` field.
///
/// # Example
/// ```ignore
/// use crate::impl_has_session_manager;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub sessions: SessionManager,
///     // ... other fields
/// }
///
/// impl_has_session_manager!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_session_manager {
    ($state_type:ty) => {
        impl $crate::auth::HasSessionManager for $state_type {
            fn sessions(&self) -> &$crate::auth::SessionManager {
                &self.sessions
            }
        }
    };
}
