//! Observation API endpoints.
//!
//! Pending observations are the ones waiting in the store for the next
//! upload cycle. Recent observations are the last ones seen, uploaded or
//! not, newest first.

use axum::extract::{Path, State};
use axum::Json;
use beacon_core::{BluetoothAddress, Observation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

// ============================================================================
// Response Types
// ============================================================================

/// A list of observations.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "count": 1,
    "observations": [
        {
            "address": "AB:89:67:45:23:01",
            "captured_at": "2025-01-15T03:30:00Z",
            "rssi": -61,
            "beacon_type": "IBEACON"
        }
    ]
}))]
pub struct ObservationsResponse {
    /// Number of observations returned.
    #[schema(example = 1)]
    pub count: usize,

    /// The observations.
    pub observations: Vec<Observation>,
}

impl From<Vec<Observation>> for ObservationsResponse {
    fn from(observations: Vec<Observation>) -> Self {
        Self {
            count: observations.len(),
            observations,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// List pending observations.
#[utoipa::path(
    get,
    path = "/api/observations",
    tag = "observations",
    operation_id = "listPendingObservations",
    summary = "List observations awaiting upload",
    description = "Returns the latest observation per beacon address that has \
        not been uploaded yet. The list empties after every upload cycle.",
    responses(
        (status = 200, description = "Pending observations", body = ObservationsResponse)
    )
)]
pub async fn list_pending(State(state): State<SharedState>) -> Json<ObservationsResponse> {
    let mut observations = state.store().snapshot();
    observations.sort_by_key(|o| o.address);
    Json(observations.into())
}

/// List recent observations.
#[utoipa::path(
    get,
    path = "/api/observations/recent",
    tag = "observations",
    operation_id = "listRecentObservations",
    summary = "List recently seen beacons",
    description = "Returns the most recent beacon observations, newest first, \
        regardless of whether they have been uploaded. The buffer size is set \
        by server.recent_capacity.",
    responses(
        (status = 200, description = "Recent observations", body = ObservationsResponse)
    )
)]
pub async fn list_recent(State(state): State<SharedState>) -> Json<ObservationsResponse> {
    Json(state.recent().await.into())
}

/// Get the pending observation for one address.
#[utoipa::path(
    get,
    path = "/api/observations/{address}",
    tag = "observations",
    operation_id = "getPendingObservation",
    summary = "Get a pending observation by address",
    description = "Returns the observation awaiting upload for the given beacon \
        address. Addresses use the AA:BB:CC:DD:EE:FF format.",
    params(
        ("address" = String, Path, description = "Beacon address", example = "AB:89:67:45:23:01")
    ),
    responses(
        (status = 200, description = "Pending observation", body = Observation),
        (status = 400, description = "Malformed address", body = crate::api::error::ErrorResponse),
        (status = 404, description = "Nothing pending for this address", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn get_pending(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> ApiResult<Json<Observation>> {
    let address: BluetoothAddress = address.parse()?;

    state
        .store()
        .get(address)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound {
            error_code: "observation_not_found".to_string(),
            message: format!("No pending observation for {address}"),
        })
}
