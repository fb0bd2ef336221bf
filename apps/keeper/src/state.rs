use std::sync::Arc;

use crate::config::Config;
use crate::resilience::ConnectivityMonitor;
use crate::storage::PersistenceGateway;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<PersistenceGateway>,
    pub monitor: Arc<ConnectivityMonitor>,
    pub config: Config,
}
