//! Health endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthServices {
    pub tba: bool,
    pub store: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub uptime: String,
    pub services: HealthServices,
    pub ok: bool,
}

/// GET /health - Ping the upstream and the store.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let (tba, store) = tokio::join!(state.upstream.ping(), state.store.ping());

    if let Err(err) = &tba {
        tracing::warn!(error = %err, "TBA ping failed");
    }
    if let Err(err) = &store {
        tracing::warn!(error = %err, "store ping failed");
    }

    let services = HealthServices {
        tba: tba.is_ok(),
        store: store.is_ok(),
    };

    Json(HealthStatus {
        uptime: format!("{:?}", state.started_at.elapsed()),
        ok: services.tba && services.store,
        services,
    })
}
