//! Network state monitor
//!
//! Holds the single "are we offline" flag shared by the retry policy, the
//! response cache and the offline queue. The flag only changes through
//! [`NetworkMonitor::handle_online`] and [`NetworkMonitor::handle_offline`],
//! which play the role of the platform's connectivity events; dependents
//! observe transitions through [`NetworkMonitor::subscribe`].

pub mod probe;

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub use probe::{ConnectivityProbe, FixedProbe, HttpProbe};

/// Process-wide connectivity flag
pub struct NetworkMonitor {
    offline: watch::Sender<bool>,
}

impl NetworkMonitor {
    /// Create a monitor with a known starting state
    pub fn new(is_offline: bool) -> Self {
        let (offline, _) = watch::channel(is_offline);
        Self { offline }
    }

    /// Read the platform's connectivity primitive once and start from it.
    ///
    /// A probe that cannot tell (`None`) leaves us optimistically online.
    pub async fn initialize(probe: &dyn ConnectivityProbe) -> Self {
        let is_offline = match probe.check().await {
            Some(online) => !online,
            None => {
                debug!("No connectivity primitive available, assuming online");
                false
            }
        };
        debug!(
            "Network monitor initialized ({})",
            if is_offline { "offline" } else { "online" }
        );
        Self::new(is_offline)
    }

    /// Current state, no side effects
    pub fn is_offline(&self) -> bool {
        *self.offline.borrow()
    }

    /// "Became online" event. Returns true if this was a transition.
    pub fn handle_online(&self) -> bool {
        let changed = self.offline.send_if_modified(|offline| {
            let was_offline = *offline;
            *offline = false;
            was_offline
        });
        if changed {
            info!("Connectivity restored");
        }
        changed
    }

    /// "Became offline" event. Returns true if this was a transition.
    ///
    /// In-flight requests are left alone; they fail on their own and the
    /// retry policy classifies them.
    pub fn handle_offline(&self) -> bool {
        let changed = self.offline.send_if_modified(|offline| {
            let was_online = !*offline;
            *offline = true;
            was_online
        });
        if changed {
            info!("Connectivity lost, working offline");
        }
        changed
    }

    /// Watch the offline flag for transitions
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.offline.subscribe()
    }

    /// Poll `probe` every `interval`, feeding results into the transition
    /// handlers. Indeterminate results leave the state untouched.
    pub fn spawn_watcher(
        self: &Arc<Self>,
        probe: Arc<dyn ConnectivityProbe>,
        interval: Duration,
    ) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match probe.check().await {
                    Some(true) => {
                        monitor.handle_online();
                    }
                    Some(false) => {
                        monitor.handle_offline();
                    }
                    None => {}
                }
            }
        })
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}
