//! Authentication models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tokens issued by the platform's auth service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthSession {
    /// Bearer token sent with every data request
    pub access_token: String,

    /// Long-lived token exchanged for a new access token
    pub refresh_token: String,

    /// Access token expiration time
    pub expires_at: DateTime<Utc>,

    /// Platform user id the tokens belong to
    pub user_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl AuthSession {
    /// Whether the access token expires within `buffer` from now
    pub fn expires_within(&self, buffer: chrono::Duration) -> bool {
        self.expires_at - buffer < Utc::now()
    }
}
