//! Listener and upload statistics.

use axum::extract::State;
use axum::Json;
use beacon_core::ListenerStats;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Pipeline statistics.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "started_at_utc": "2025-01-15T03:30:00Z",
    "uptime_secs": 3600,
    "sink": "phant",
    "listener": {
        "received": 1200,
        "eddystone": 480,
        "ibeacon": 310,
        "ignored": 410,
        "pending": 4,
        "upload": { "cycles": 120, "delivered": 310, "failed": 3 }
    }
}))]
pub struct StatsResponse {
    /// When the server started (RFC 3339, UTC).
    #[schema(example = "2025-01-15T03:30:00Z")]
    pub started_at_utc: String,

    /// Server uptime in seconds.
    #[schema(example = 3600)]
    pub uptime_secs: u64,

    /// Configured sink kind.
    #[schema(example = "phant")]
    pub sink: String,

    /// Advertisement and upload counters.
    pub listener: ListenerStats,
}

/// Get pipeline statistics.
#[utoipa::path(
    get,
    path = "/api/stats",
    tag = "system",
    operation_id = "getStats",
    summary = "Get listener and upload counters",
    description = "Returns how many advertisements were received and classified, \
        how many observations are pending, and upload cycle totals.",
    responses(
        (status = 200, description = "Statistics retrieved", body = StatsResponse)
    )
)]
pub async fn get_stats(State(state): State<SharedState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        started_at_utc: state.started_at().to_rfc3339(),
        uptime_secs: state.uptime_secs(),
        sink: state.sink_kind().to_string(),
        listener: state.stats(),
    })
}
