//! OpenAPI specification generation for the beacon-relay status API.

use axum::Json;
use beacon_core::{BeaconType, ListenerStats, Observation, UploadTotals};
use utoipa::OpenApi;

use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::observations::ObservationsResponse;
use super::stats::StatsResponse;

/// Serve the OpenAPI specification as JSON.
///
/// This endpoint is available at `/api/openapi.json`.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as a pretty-printed string.
/// Used by the gen-openapi binary.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> serde_json::Result<String> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for beacon-relay.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "beacon-relay API",
        version = "0.1.0",
        description = r#"
# beacon-relay API

beacon-relay listens for Bluetooth Low Energy beacon advertisements and
periodically uploads the latest observation per beacon to an HTTP data sink.

## Overview

- **Observations**: beacons waiting for the next upload, and the most recent ones seen
- **Statistics**: advertisement, classification and upload counters

The API is read-only. Uploading happens on its own schedule.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local beacon-relay server")
    ),
    tags(
        (
            name = "system",
            description = "Health checks and pipeline statistics"
        ),
        (
            name = "observations",
            description = "Beacon observations pending upload and recently seen"
        )
    ),
    paths(
        super::health::health_check,
        super::observations::list_pending,
        super::observations::list_recent,
        super::observations::get_pending,
        super::stats::get_stats,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            ObservationsResponse,
            Observation,
            BeaconType,
            StatsResponse,
            ListenerStats,
            UploadTotals,
        )
    )
)]
pub struct ApiDoc;
