use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::resilience::clock::Clock;
use crate::resilience::error::OperationError;

/// One lightweight reachability check against `url`.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<(), OperationError>;
}

/// Issues a `HEAD` request; any HTTP response counts as reachable.
#[derive(Clone, Default)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn probe(&self, url: &str) -> Result<(), OperationError> {
        self.client.head(url).send().await?;
        Ok(())
    }
}

/// Host-reported online/offline state plus an active reachability probe.
///
/// Built once at startup and shared; the host calls [`set_online`] when its
/// network state changes.
///
/// [`set_online`]: ConnectivityMonitor::set_online
pub struct ConnectivityMonitor {
    online: watch::Sender<bool>,
    probe: Arc<dyn ConnectivityProbe>,
    clock: Arc<dyn Clock>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool, probe: Arc<dyn ConnectivityProbe>, clock: Arc<dyn Clock>) -> Self {
        let (online, _) = watch::channel(online);
        Self {
            online,
            probe,
            clock,
        }
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    pub fn set_online(&self, online: bool) {
        let previous = self.online.send_replace(online);
        if previous != online {
            info!(online, "Connectivity changed");
        }
    }

    /// Resolves once online. Rejects with `Timeout` when `timeout` elapses
    /// first. The listener is dropped on every exit path.
    pub async fn wait_for_online(&self, timeout: Option<Duration>) -> Result<(), OperationError> {
        if self.is_online() {
            return Ok(());
        }

        let mut listener = self.online.subscribe();
        let back_online = async {
            listener
                .wait_for(|online| *online)
                .await
                .map(|_| ())
                .map_err(|_| OperationError::Cancelled)
        };

        match timeout {
            Some(limit) => tokio::select! {
                result = back_online => result,
                _ = self.clock.sleep(limit) => Err(OperationError::Timeout(limit)),
            },
            None => back_online.await,
        }
    }

    /// Number of callers currently waiting in [`wait_for_online`].
    ///
    /// [`wait_for_online`]: ConnectivityMonitor::wait_for_online
    pub fn listener_count(&self) -> usize {
        self.online.receiver_count()
    }

    /// Probes `url` once under `timeout`. Never fails: errors and timeouts
    /// both report unreachable.
    pub async fn test_connectivity(&self, url: &str, timeout: Duration) -> bool {
        let reachable = tokio::select! {
            result = self.probe.probe(url) => result,
            _ = self.clock.sleep(timeout) => Err(OperationError::Timeout(timeout)),
        };
        match reachable {
            Ok(()) => true,
            Err(e) => {
                debug!(url, error = %e, "Connectivity probe failed");
                false
            }
        }
    }
}
