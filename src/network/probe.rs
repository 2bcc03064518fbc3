//! Connectivity probes
//!
//! A probe answers "can we reach the platform right now?". `None` means the
//! probe has no way to tell.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client as HttpClient;

/// Source of the platform's current-connectivity reading
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// `Some(true)` when online, `Some(false)` when offline, `None` if unknown
    async fn check(&self) -> Option<bool>;
}

/// Probe with a fixed answer (forced offline mode, tests)
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(Option<bool>);

impl FixedProbe {
    pub fn online() -> Self {
        Self(Some(true))
    }

    pub fn offline() -> Self {
        Self(Some(false))
    }

    pub fn unavailable() -> Self {
        Self(None)
    }
}

#[async_trait]
impl ConnectivityProbe for FixedProbe {
    async fn check(&self) -> Option<bool> {
        self.0
    }
}

/// Probe that pings the platform's health endpoint.
///
/// Any HTTP response counts as online; only transport failures count as
/// offline.
pub struct HttpProbe {
    http: Option<HttpClient>,
    url: String,
}

/// Health checks should answer fast or not at all
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

impl HttpProbe {
    pub fn new(api_url: &str) -> Self {
        let http = HttpClient::builder().timeout(PROBE_TIMEOUT).build().ok();
        Self {
            http,
            url: format!("{}/auth/v1/health", api_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn check(&self) -> Option<bool> {
        let http = self.http.as_ref()?;
        match http.get(&self.url).send().await {
            Ok(_) => Some(true),
            Err(e) if e.is_connect() || e.is_timeout() => {
                debug!("Connectivity probe failed: {}", e);
                Some(false)
            }
            Err(e) => {
                debug!("Connectivity probe inconclusive: {}", e);
                None
            }
        }
    }
}
