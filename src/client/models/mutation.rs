//! Serializable write descriptors
//!
//! A [`Mutation`] is plain data: it can sit in the offline queue across
//! process restarts and be turned back into a remote call at drain time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Resource;

/// One write against the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    Create {
        resource: Resource,
        data: Value,
    },
    Update {
        resource: Resource,
        id: String,
        data: Value,
    },
    Delete {
        resource: Resource,
        id: String,
    },
}

impl Mutation {
    pub fn resource(&self) -> Resource {
        match self {
            Mutation::Create { resource, .. }
            | Mutation::Update { resource, .. }
            | Mutation::Delete { resource, .. } => *resource,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Mutation::Create { .. } => "create",
            Mutation::Update { .. } => "update",
            Mutation::Delete { .. } => "delete",
        }
    }

    /// Short label for logs and listings, e.g. `update schools`
    pub fn label(&self) -> String {
        format!("{} {}", self.action(), self.resource())
    }

    /// Target row id, if the write addresses an existing row
    pub fn target(&self) -> Option<&str> {
        match self {
            Mutation::Create { .. } => None,
            Mutation::Update { id, .. } | Mutation::Delete { id, .. } => Some(id),
        }
    }

    /// Row payload carried by creates and updates
    pub fn data(&self) -> Option<&Value> {
        match self {
            Mutation::Create { data, .. } | Mutation::Update { data, .. } => Some(data),
            Mutation::Delete { .. } => None,
        }
    }
}
