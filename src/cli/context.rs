//! Command execution context
//!
//! Wires the data-access layer together for one CLI invocation: durable
//! store, network monitor, response cache, offline queue, remote client,
//! orchestrator and session.

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use log::debug;

use crate::cache::ResponseCache;
use crate::cli::OutputFormat;
use crate::cli::args::GlobalOptions;
use crate::client::RestClient;
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::network::{FixedProbe, HttpProbe, NetworkMonitor};
use crate::orchestrator::RequestOrchestrator;
use crate::queue::{DrainReport, OfflineQueue};
use crate::retry::RetryPolicy;
use crate::session::{SessionManager, SessionState};
use crate::storage::{DurableStore, SqliteStore};

/// Everything a command needs to talk to the registry
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
    /// Bypass the response cache for reads
    pub no_cache: bool,
    pub data_dir: PathBuf,
    pub store: Arc<dyn DurableStore>,
    pub api: Arc<RestClient>,
    pub orchestrator: Arc<RequestOrchestrator>,
    pub session: Arc<SessionManager>,
}

impl CommandContext {
    /// Build the context and restore the persisted session.
    ///
    /// A session that cannot be verified (platform unreachable) is not an
    /// error here; the session simply stays loading and commands decide
    /// what that means for them.
    pub async fn new(opts: &GlobalOptions) -> Result<Self> {
        let ctx = Self::build(opts).await?;

        if let Err(e) = ctx.session.restore().await {
            debug!("Session not verified: {}", e);
        }
        ctx.resume_queue().await;

        Ok(ctx)
    }

    async fn build(opts: &GlobalOptions) -> Result<Self> {
        let config = Config::load_or_default(opts.config_ref())?;
        let api_url = config.require_api_url(opts.api_url_ref())?.to_string();
        let prefs = config.preferences.clone();

        let data_dir = config.resolve_data_dir(opts.data_dir_ref())?;
        let store: Arc<dyn DurableStore> = Arc::new(SqliteStore::open_at(&data_dir)?);

        let network = if opts.offline {
            NetworkMonitor::initialize(&FixedProbe::offline()).await
        } else {
            NetworkMonitor::initialize(&HttpProbe::new(&api_url)).await
        };
        debug!(
            "Starting {}",
            if network.is_offline() { "offline" } else { "online" }
        );

        let cache = ResponseCache::new(prefs.cache_max_entries)
            .with_revalidate_delay(prefs.revalidate_delay())
            .with_persistence(store.clone());
        let queue = OfflineQueue::new(
            store.clone(),
            prefs.queue_capacity,
            prefs.queue_max_attempts,
        );

        let api = Arc::new(RestClient::new(
            &api_url,
            config.api_key.clone(),
            prefs.request_timeout(),
        )?);

        let orchestrator = Arc::new(
            RequestOrchestrator::new(
                api.clone(),
                Arc::new(network),
                Arc::new(cache),
                Arc::new(queue),
            )
            .with_retry_policy(RetryPolicy::new(
                prefs.max_retries,
                prefs.initial_retry_delay(),
            ))
            .with_request_timeout(prefs.request_timeout()),
        );

        let session = Arc::new(SessionManager::new(
            api.clone(),
            orchestrator.clone(),
            store.clone(),
        ));

        Ok(Self {
            config,
            format: opts.format,
            no_cache: opts.no_cache,
            data_dir,
            store,
            api,
            orchestrator,
            session,
        })
    }

    /// Replay writes left over from an earlier offline run.
    ///
    /// Without a session there is nothing to send them with; they wait
    /// for the next sign-in.
    async fn resume_queue(&self) {
        if self.orchestrator.network().is_offline()
            || self.orchestrator.queue().is_empty()
            || self.session.state() == SessionState::Unauthenticated
        {
            return;
        }
        match self.session.replay_queue().await {
            Ok(report) => report_drain(&report),
            Err(e) => debug!("Queued writes not replayed: {}", e),
        }
    }

    /// Owner recorded on queued writes
    pub fn owner(&self) -> Option<String> {
        self.session.principal().map(|p| p.id)
    }

    /// Registry data needs a session; a still-loading one (offline) may
    /// read from cache and queue writes.
    pub fn require_session(&self) -> Result<()> {
        if self.session.state() == SessionState::Unauthenticated {
            return Err(ApiError::Unauthorized.into());
        }
        Ok(())
    }
}

/// Local state only: config and durable store, no remote client.
///
/// Commands that inspect or clear local data use this so they work before
/// `init`, offline, and without touching the platform.
pub struct LocalContext {
    pub config: Config,
    pub format: OutputFormat,
    pub data_dir: PathBuf,
    pub store: Arc<SqliteStore>,
}

impl LocalContext {
    pub fn open(opts: &GlobalOptions) -> Result<Self> {
        let config = Config::load_or_default(opts.config_ref())?;
        let data_dir = config.resolve_data_dir(opts.data_dir_ref())?;
        let store = Arc::new(SqliteStore::open_at(&data_dir)?);
        Ok(Self {
            config,
            format: opts.format,
            data_dir,
            store,
        })
    }

    /// The offline queue as persisted
    pub fn queue(&self) -> OfflineQueue {
        let prefs = &self.config.preferences;
        OfflineQueue::new(
            self.store.clone(),
            prefs.queue_capacity,
            prefs.queue_max_attempts,
        )
    }

    /// The response cache as persisted
    pub fn cache(&self) -> ResponseCache {
        ResponseCache::new(self.config.preferences.cache_max_entries)
            .with_persistence(self.store.clone())
    }
}

/// Tell the user what a drain did; silent when nothing ran
pub fn report_drain(report: &DrainReport) {
    if report.coalesced {
        eprintln!("{}", "A queue drain is already running".dimmed());
        return;
    }
    if report.executed == 0 && report.failed.is_empty() {
        return;
    }
    if !report.succeeded.is_empty() {
        eprintln!(
            "{} Sent {} queued write(s)",
            "✓".green(),
            report.succeeded.len()
        );
    }
    if report.requeued > 0 {
        eprintln!(
            "{} {} queued write(s) will be retried later",
            "⚠".yellow(),
            report.requeued
        );
    }
    for failure in &report.failed {
        eprintln!(
            "{} {} ({})",
            "✗".red(),
            failure.to_error(),
            failure.message.dimmed()
        );
    }
    if let Some(reason) = &report.rejected {
        eprintln!(
            "{} Session rejected ({}); run 'edureg login', {} write(s) stay queued",
            "✗".red(),
            reason.dimmed(),
            report.remaining
        );
        return;
    }
    if report.remaining > 0 {
        eprintln!(
            "{} {} write(s) still waiting for connectivity",
            "○".dimmed(),
            report.remaining
        );
    }
}
