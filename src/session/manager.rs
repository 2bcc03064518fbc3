//! Session lifecycle
//!
//! Tokens are persisted in the durable store under [`SESSION_KEY`]. Every
//! principal change (sign-in, token refresh, sign-out, invalidation) wipes
//! the response cache so one principal's view never leaks to another.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::views;
use super::{AuthorizationDecision, Principal, SessionState, authorize};
use crate::client::{AuthApi, AuthSession, RegistryApi};
use crate::error::{ApiError, Error, ErrorClass, Result};
use crate::orchestrator::RequestOrchestrator;
use crate::queue::DrainReport;
use crate::storage::{self, DurableStore};

/// Durable store key of the persisted session
pub const SESSION_KEY: &str = "session";

/// Refresh tokens this close to expiry
const REFRESH_BUFFER_MINUTES: i64 = 5;

pub struct SessionManager {
    api: Arc<dyn RegistryApi>,
    orchestrator: Arc<RequestOrchestrator>,
    store: Arc<dyn DurableStore>,
    state: watch::Sender<SessionState>,
}

impl SessionManager {
    pub fn new(
        api: Arc<dyn RegistryApi>,
        orchestrator: Arc<RequestOrchestrator>,
        store: Arc<dyn DurableStore>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Unknown);
        Self {
            api,
            orchestrator,
            store,
            state,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn principal(&self) -> Option<Principal> {
        self.state.borrow().principal().cloned()
    }

    fn set_state(&self, state: SessionState) {
        debug!("Session state: {}", state.label());
        self.state.send_replace(state);
    }

    fn stored_session(&self) -> Option<AuthSession> {
        match storage::load_json::<AuthSession>(self.store.as_ref(), SESSION_KEY) {
            Ok(session) => session,
            Err(e) => {
                warn!("Discarding unreadable stored session: {}", e);
                let _ = self.store.remove(SESSION_KEY);
                None
            }
        }
    }

    fn refresh_buffer() -> chrono::Duration {
        chrono::Duration::minutes(REFRESH_BUFFER_MINUTES)
    }

    async fn load_principal(&self, user_id: &str) -> Result<Principal> {
        let profile = self
            .orchestrator
            .call("fetch profile", || self.api.fetch_profile(user_id))
            .await?;
        Ok(Principal::from_profile(&profile))
    }

    /// Settle a failed restore: an authorization verdict signs out,
    /// anything else leaves us loading and surfaces the error.
    async fn fail_loading(&self, err: Error) -> Result<SessionState> {
        if err.is_authorization() {
            info!("Stored session was rejected by the platform");
            self.invalidate().await?;
            return Ok(self.state());
        }
        if err.class() == ErrorClass::Network {
            info!("Session restore deferred until online: {}", err);
        } else {
            warn!(
                "Session restore interrupted ({}), still loading: {}",
                err.class(),
                err
            );
        }
        Err(err)
    }

    /// Restore the persisted session, refreshing it if close to expiry.
    ///
    /// Returns the settled state, or the connectivity error that kept it
    /// from settling (the state then stays [`SessionState::Loading`]).
    pub async fn restore(&self) -> Result<SessionState> {
        self.set_state(SessionState::Loading);

        let Some(mut session) = self.stored_session() else {
            self.set_state(SessionState::Unauthenticated);
            return Ok(self.state());
        };

        if self.orchestrator.network().is_offline() {
            return self
                .fail_loading(
                    ApiError::Network("offline, stored session cannot be verified".to_string())
                        .into(),
                )
                .await;
        }

        let mut refreshed = false;
        if session.expires_within(Self::refresh_buffer()) {
            debug!("Stored session expires soon, refreshing");
            let result = self
                .orchestrator
                .call("refresh session", || {
                    self.api.refresh_session(&session.refresh_token)
                })
                .await;
            match result {
                Ok(fresh) => {
                    storage::save_json(self.store.as_ref(), SESSION_KEY, &fresh)?;
                    session = fresh;
                    refreshed = true;
                }
                Err(e) => return self.fail_loading(e).await,
            }
        }

        self.api
            .set_access_token(Some(session.access_token.clone()))
            .await;

        match self.load_principal(&session.user_id).await {
            Ok(principal) => {
                if refreshed {
                    self.orchestrator.reset_for_principal_change();
                }
                self.set_state(SessionState::Authenticated(principal));
                Ok(self.state())
            }
            Err(e) => self.fail_loading(e).await,
        }
    }

    /// Sign in with email and password
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Principal> {
        let previous = self.state();
        self.set_state(SessionState::Loading);

        let result: Result<(AuthSession, Principal)> = async {
            let session = self
                .orchestrator
                .call("sign in", || self.api.sign_in(email, password))
                .await?;
            self.api
                .set_access_token(Some(session.access_token.clone()))
                .await;
            let principal = self.load_principal(&session.user_id).await?;
            Ok((session, principal))
        }
        .await;

        match result {
            Ok((session, principal)) => {
                storage::save_json(self.store.as_ref(), SESSION_KEY, &session)?;
                self.orchestrator.reset_for_principal_change();
                info!("Signed in as {} ({})", principal.display_name, principal.role);
                self.set_state(SessionState::Authenticated(principal.clone()));
                Ok(principal)
            }
            Err(e) => {
                // Put back whatever token the stored session carries
                let token = self.stored_session().map(|s| s.access_token);
                self.api.set_access_token(token).await;
                if e.is_authorization() {
                    self.set_state(SessionState::Unauthenticated);
                } else {
                    self.set_state(previous);
                }
                Err(e)
            }
        }
    }

    /// Exchange the refresh token for a new session
    pub async fn refresh(&self) -> Result<Principal> {
        let session = self.stored_session().ok_or(ApiError::Unauthorized)?;

        let result = self
            .orchestrator
            .call("refresh session", || {
                self.api.refresh_session(&session.refresh_token)
            })
            .await;
        let fresh = match result {
            Ok(fresh) => fresh,
            Err(e) => {
                if e.is_authorization() {
                    self.invalidate().await?;
                }
                return Err(e);
            }
        };

        storage::save_json(self.store.as_ref(), SESSION_KEY, &fresh)?;
        self.api
            .set_access_token(Some(fresh.access_token.clone()))
            .await;
        self.orchestrator.reset_for_principal_change();

        let principal = self.load_principal(&fresh.user_id).await?;
        self.set_state(SessionState::Authenticated(principal.clone()));
        Ok(principal)
    }

    /// Explicit logout. Remote revocation is best-effort; local state is
    /// always cleared.
    pub async fn sign_out(&self) -> Result<()> {
        if let Some(session) = self.stored_session()
            && !self.orchestrator.network().is_offline()
            && let Err(e) = self.api.sign_out(&session.access_token).await
        {
            warn!("Remote sign-out failed ({}): {}", e.class(), e);
        }
        self.end_session().await?;
        info!("Signed out");
        Ok(())
    }

    /// The platform rejected our token; drop the session.
    pub async fn invalidate(&self) -> Result<()> {
        self.end_session().await
    }

    /// Clear the stored session, its queued writes and the cache
    async fn end_session(&self) -> Result<()> {
        if let Some(session) = self.stored_session() {
            self.orchestrator.queue().purge_owner(&session.user_id)?;
        }
        self.store.remove(SESSION_KEY)?;
        self.api.set_access_token(None).await;
        self.orchestrator.reset_for_principal_change();
        self.set_state(SessionState::Unauthenticated);
        Ok(())
    }

    /// Replay queued writes under the current session.
    ///
    /// A session still loading (restored while offline) is verified first
    /// so the replays carry its token. A token the platform rejects
    /// mid-drain is refreshed once and the drain resumes; a refresh the
    /// platform also rejects ends the session.
    pub async fn replay_queue(&self) -> Result<DrainReport> {
        if matches!(self.state(), SessionState::Unknown | SessionState::Loading) {
            self.restore().await?;
        }
        if self.state() == SessionState::Unauthenticated {
            return Err(ApiError::Unauthorized.into());
        }

        let mut report = self.orchestrator.drain_queue().await;
        if let Some(reason) = report.rejected.take() {
            info!("Queued writes rejected ({}), refreshing session", reason);
            self.refresh().await?;
            report.absorb(self.orchestrator.drain_queue().await);
        }
        Ok(report)
    }

    /// Replay the queue whenever the network monitor reports a return to
    /// online
    pub fn spawn_drain_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let session = Arc::clone(self);
        let mut offline = self.orchestrator.network().subscribe();
        tokio::spawn(async move {
            while offline.changed().await.is_ok() {
                if *offline.borrow_and_update() {
                    continue;
                }
                match session.replay_queue().await {
                    Ok(report) => debug!(
                        "Back online, replayed {} queued writes ({} left)",
                        report.executed, report.remaining
                    ),
                    Err(e) => warn!("Queued writes not replayed ({}): {}", e.class(), e),
                }
            }
        })
    }

    /// Decide a navigation to `requested`; `None` for unknown views
    pub fn authorize(&self, requested: &str) -> Option<AuthorizationDecision> {
        let view = views::find(requested)?;
        Some(authorize(&self.state(), view.required_roles, requested))
    }
}
