//! Authorization decision display model

use serde::Serialize;
use tabled::Tabled;

use crate::session::views::View;
use crate::session::{AuthorizationDecision, Role};

/// One view and what the current session may do with it
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct AccessDisplay {
    #[tabled(rename = "VIEW")]
    pub view: String,

    #[tabled(rename = "PATH")]
    pub path: String,

    #[tabled(rename = "ROLES")]
    pub roles: String,

    #[tabled(rename = "DECISION")]
    pub decision: String,

    #[tabled(skip)]
    pub outcome: AuthorizationDecision,
}

impl AccessDisplay {
    pub fn new(view: &View, requested: &str, outcome: AuthorizationDecision) -> Self {
        let roles = if view.required_roles.is_empty() {
            "public".to_string()
        } else if view.required_roles == Role::ALL.as_slice() {
            "any signed-in".to_string()
        } else {
            view.required_roles
                .iter()
                .map(|r| r.tag())
                .collect::<Vec<_>>()
                .join(", ")
        };
        Self {
            view: view.name.to_string(),
            path: requested.to_string(),
            roles,
            decision: outcome.to_string(),
            outcome,
        }
    }
}
