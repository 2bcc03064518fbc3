//! Offline queue display model

use serde::Serialize;
use tabled::Tabled;

use super::common::truncate_string;
use crate::output::formatters::format_timestamp_local;
use crate::queue::QueuedOperation;

/// Queued write display model for table/JSON output
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct QueuedOperationDisplay {
    #[tabled(rename = "ID")]
    pub id: String,

    /// `create`, `update` or `delete`
    #[tabled(rename = "ACTION")]
    pub action: String,

    #[tabled(rename = "RESOURCE")]
    pub resource: String,

    /// Row id for update/delete, payload preview for create
    #[tabled(rename = "TARGET")]
    pub target: String,

    #[tabled(rename = "ATTEMPTS")]
    pub attempts: String,

    #[tabled(rename = "QUEUED")]
    pub enqueued_at: String,
}

impl From<&QueuedOperation> for QueuedOperationDisplay {
    fn from(op: &QueuedOperation) -> Self {
        let target = match op.mutation.target() {
            Some(id) => id.to_string(),
            None => op
                .mutation
                .data()
                .map(|data| truncate_string(&data.to_string(), 32))
                .unwrap_or_default(),
        };
        Self {
            id: op.id.clone(),
            action: op.mutation.action().to_string(),
            resource: op.mutation.resource().to_string(),
            target,
            attempts: format!("{}/{}", op.attempt_count, op.max_attempts),
            enqueued_at: format_timestamp_local(op.enqueued_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Mutation, Resource};
    use chrono::Utc;
    use serde_json::json;

    fn op(mutation: Mutation) -> QueuedOperation {
        QueuedOperation {
            id: "op-1".to_string(),
            mutation,
            enqueued_at: Utc::now(),
            attempt_count: 1,
            max_attempts: 3,
            owner: None,
        }
    }

    #[test]
    fn test_update_shows_row_id() {
        let display = QueuedOperationDisplay::from(&op(Mutation::Update {
            resource: Resource::Schools,
            id: "sch-9".to_string(),
            data: json!({"name": "Renamed"}),
        }));

        assert_eq!(display.action, "update");
        assert_eq!(display.resource, "schools");
        assert_eq!(display.target, "sch-9");
        assert_eq!(display.attempts, "1/3");
    }

    #[test]
    fn test_create_shows_payload_preview() {
        let display = QueuedOperationDisplay::from(&op(Mutation::Create {
            resource: Resource::Regions,
            data: json!({"name": "A very long region name that will not fit"}),
        }));

        assert!(display.target.starts_with("{\"name\""));
        assert!(display.target.ends_with("..."));
    }
}
