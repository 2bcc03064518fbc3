//! Authentication API trait

use async_trait::async_trait;

use crate::client::models::{AuthSession, Profile};
use crate::error::Result;

/// Session and profile operations for the registry platform
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange email and password for a session
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession>;

    /// Exchange a refresh token for a new session
    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession>;

    /// Revoke the session on the platform
    async fn sign_out(&self, access_token: &str) -> Result<()>;

    /// Fetch the profile row for a user
    async fn fetch_profile(&self, user_id: &str) -> Result<Profile>;

    /// Bearer token for subsequent data calls; `None` falls back to the anon key
    async fn set_access_token(&self, token: Option<String>);
}
