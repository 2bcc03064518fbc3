//! Per-navigation authorization decision

use std::fmt;

use serde::Serialize;

use super::{Role, SessionState};

/// Where a denied navigation is sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "destination", rename_all = "lowercase")]
pub enum Redirect {
    /// Signed in, but the role does not fit
    Unauthorized,
    /// Not signed in; come back to `return_to` afterwards
    Login { return_to: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuthorizationDecision {
    Allowed,
    /// Session restore still running; show a waiting indicator
    PendingLoad,
    Denied(Redirect),
}

impl fmt::Display for AuthorizationDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorizationDecision::Allowed => f.write_str("allowed"),
            AuthorizationDecision::PendingLoad => f.write_str("pending (session loading)"),
            AuthorizationDecision::Denied(Redirect::Unauthorized) => {
                f.write_str("denied (redirect to unauthorized)")
            }
            AuthorizationDecision::Denied(Redirect::Login { return_to }) => {
                write!(f, "denied (redirect to login, then {})", return_to)
            }
        }
    }
}

/// Decide a navigation to `requested` needing one of `required_roles`.
///
/// The checks run in a fixed order: role membership, then loading, then
/// identity. A known principal is never sent to login over a role
/// mismatch, and an allowed role never waits on a restore.
pub fn authorize(
    state: &SessionState,
    required_roles: &[Role],
    requested: &str,
) -> AuthorizationDecision {
    let role = state.principal().map(|p| p.role);

    if required_roles.is_empty() || role.is_some_and(|r| required_roles.contains(&r)) {
        return AuthorizationDecision::Allowed;
    }

    if state.is_loading() {
        return AuthorizationDecision::PendingLoad;
    }

    if role.is_some() {
        return AuthorizationDecision::Denied(Redirect::Unauthorized);
    }

    AuthorizationDecision::Denied(Redirect::Login {
        return_to: requested.to_string(),
    })
}
