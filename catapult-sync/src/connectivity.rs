//! Best-effort reachability probe.
//!
//! Advisory only: callers use it to decide between syncing now and queueing
//! for later, but gateway transport errors are still handled either way.

use reqwest::Client;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, trace};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Widely reachable endpoints; any HTTP response at all counts, status
/// codes included, since a 4xx still proves the network path works.
const PROBE_ENDPOINTS: &[&str] = &[
    "https://api.github.com",
    "https://www.google.com/generate_204",
    "https://www.cloudflare.com",
];

#[derive(Debug, Clone)]
pub struct ConnectivityChecker {
    http: Client,
    endpoints: Vec<String>,
    #[cfg(test)]
    force_online: bool,
}

impl Default for ConnectivityChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityChecker {
    pub fn new() -> Self {
        let http = Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            endpoints: PROBE_ENDPOINTS.iter().map(|e| e.to_string()).collect(),
            #[cfg(test)]
            force_online: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_endpoints(endpoints: Vec<String>) -> Self {
        let mut checker = Self::new();
        checker.endpoints = endpoints;
        checker
    }

    /// Probe-free stand-in for tests that need the online path.
    #[cfg(test)]
    pub(crate) fn assume_online() -> Self {
        let mut checker = Self::with_endpoints(Vec::new());
        checker.force_online = true;
        checker
    }

    pub async fn is_connected(&self) -> bool {
        #[cfg(test)]
        if self.force_online {
            return true;
        }
        for endpoint in &self.endpoints {
            match self.http.head(endpoint).send().await {
                Ok(resp) => {
                    trace!(endpoint, status = %resp.status(), "probe answered");
                    return true;
                }
                Err(e) => {
                    trace!(endpoint, error = %e, "probe failed");
                }
            }
        }
        debug!("no probe endpoint reachable");
        false
    }

    /// Poll until reachable or the shutdown signal flips. Returns whether
    /// connectivity was seen.
    pub async fn wait_for_connectivity(&self, mut shutdown: watch::Receiver<bool>) -> bool {
        loop {
            if self.is_connected().await {
                return true;
            }
            tokio::select! {
                _ = tokio::time::sleep(WAIT_POLL_INTERVAL) => {}
                _ = shutdown.changed() => return false,
            }
        }
    }

    /// Up to `attempts` probes with exponential backoff capped at 30 s.
    pub async fn check_with_retry(&self, attempts: u32) -> bool {
        let mut delay = Duration::from_secs(1);
        for attempt in 1..=attempts {
            if self.is_connected().await {
                return true;
            }
            if attempt < attempts {
                debug!(attempt, delay_secs = delay.as_secs(), "offline, backing off");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_BACKOFF);
            }
        }
        false
    }
}
