//! Sync status endpoint.

use axum::extract::State;
use serde::Serialize;

use super::ApiResponse;
use crate::sync::StatsSnapshot;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SyncStatus {
    pub running: bool,
    pub stats: StatsSnapshot,
}

/// GET /sync/status - Engine state and run counters.
pub async fn sync_status(State(state): State<AppState>) -> ApiResponse<SyncStatus> {
    ApiResponse::new(SyncStatus {
        running: state.engine.is_running(),
        stats: state.engine.stats().snapshot(),
    })
}
