use std::time::Duration;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ConnectivityQuery {
    /// Wait up to this long for the host to come back online before answering.
    pub wait_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityResponse {
    pub online: bool,
    pub probe_url: Option<String>,
    /// `None` when no probe URL is configured.
    pub reachable: Option<bool>,
}

/// GET /api/v1/connectivity
/// Probes the configured URL once and feeds the result into the monitor.
pub async fn handle_connectivity(
    State(state): State<AppState>,
    Query(query): Query<ConnectivityQuery>,
) -> Json<ConnectivityResponse> {
    let reachable = match &state.config.probe_url {
        Some(url) => {
            let reachable = state
                .monitor
                .test_connectivity(url, state.config.probe_timeout())
                .await;
            state.monitor.set_online(reachable);
            Some(reachable)
        }
        None => None,
    };

    if let Some(wait_ms) = query.wait_ms {
        // A timeout just means we answer with the offline state.
        let _ = state
            .monitor
            .wait_for_online(Some(Duration::from_millis(wait_ms)))
            .await;
    }

    Json(ConnectivityResponse {
        online: state.monitor.is_online(),
        probe_url: state.config.probe_url.clone(),
        reachable,
    })
}
