//! Session and authorization state
//!
//! `Unknown → Loading → Authenticated | Unauthenticated`. Connectivity
//! failures while loading never conclude "unauthenticated"; only an
//! authorization verdict from the platform does.

mod decision;
mod manager;
mod principal;
mod role;
pub mod views;

pub use decision::{AuthorizationDecision, Redirect, authorize};
pub use manager::{SESSION_KEY, SessionManager};
pub use principal::{OrganizationScope, Principal};
pub use role::Role;

/// Where the session lifecycle currently stands
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Nothing attempted yet
    Unknown,
    /// Restore or sign-in in progress, or stalled on connectivity
    Loading,
    Authenticated(Principal),
    Unauthenticated,
}

impl SessionState {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            SessionState::Authenticated(principal) => Some(principal),
            _ => None,
        }
    }

    /// Unknown counts as loading: restore simply has not started
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Unknown | SessionState::Loading)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Unknown => "unknown",
            SessionState::Loading => "loading",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Unauthenticated => "unauthenticated",
        }
    }
}
