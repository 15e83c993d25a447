//! HTTP API routes and handlers.
//!
//! This module contains the read-only status API:
//! - `health` - Service health checks
//! - `observations` - Pending and recent beacon observations
//! - `stats` - Listener and upload counters
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod error;
pub mod health;
pub mod observations;
pub mod openapi;
pub mod stats;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                      - Health check
/// /api
/// ├── /observations            - Pending observations
/// ├── /observations/recent     - Recently seen observations
/// ├── /observations/{address}  - Pending observation for one address
/// ├── /stats                   - Listener and upload counters
/// └── /openapi.json            - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .nest(
            "/api",
            Router::new()
                .route("/observations", get(observations::list_pending))
                .route("/observations/recent", get(observations::list_recent))
                .route("/observations/{address}", get(observations::get_pending))
                .route("/stats", get(stats::get_stats))
                .route("/openapi.json", get(openapi::get_openapi_spec)),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use beacon_core::classifier::{APPLE_COMPANY_ID, EDDYSTONE_SERVICE_UUID, IBEACON_PREFIX};
    use beacon_core::{
        AdvertisementFeed, AdvertisementRecord, BeaconListener, BeaconType, BluetoothAddress,
        Observation, ObservationSink, UploadConfig, UploadResult,
    };

    use super::*;
    use crate::api::health::HealthResponse;
    use crate::api::observations::ObservationsResponse;
    use crate::api::stats::StatsResponse;
    use crate::state::AppState;

    struct NullSink;

    impl ObservationSink for NullSink {
        async fn send(&self, _observation: &Observation) -> UploadResult<()> {
            Ok(())
        }
    }

    fn start_listener() -> BeaconListener {
        let (_tx, feed) = AdvertisementFeed::channel(4);
        let settings = UploadConfig {
            interval_secs: 3600,
            flush_on_shutdown: false,
            ..UploadConfig::default()
        };
        BeaconListener::start(feed, NullSink, &settings)
    }

    fn setup(listener: &BeaconListener) -> (TestServer, Arc<AppState>) {
        let state = AppState::new(listener.handle(), 10, "json").shared();
        let server = TestServer::new(create_router(Arc::clone(&state))).unwrap();
        (server, state)
    }

    fn eddystone(raw: u64, rssi: i16) -> AdvertisementRecord {
        AdvertisementRecord::new(BluetoothAddress::new(raw), rssi)
            .with_service_uuid(EDDYSTONE_SERVICE_UUID)
    }

    fn ibeacon(raw: u64, rssi: i16) -> AdvertisementRecord {
        let mut payload = IBEACON_PREFIX.to_vec();
        payload.extend_from_slice(&[0u8; 21]);
        AdvertisementRecord::new(BluetoothAddress::new(raw), rssi)
            .with_manufacturer_data(APPLE_COMPANY_ID, payload)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let listener = start_listener();
        let (server, _) = setup(&listener);

        let response = server.get("/health").await;
        response.assert_status_ok();
        let body: HealthResponse = response.json();
        assert_eq!(body.status, "ok");

        listener.shutdown().await;
    }

    #[tokio::test]
    async fn test_pending_observations_listed() {
        let listener = start_listener();
        let (server, _) = setup(&listener);

        listener.ingest(&ibeacon(0x0123_4567_89AB, -70));
        listener.ingest(&eddystone(0x0000_0000_0001, -50));
        listener.ingest(&eddystone(0x0000_0000_0001, -55));

        let response = server.get("/api/observations").await;
        response.assert_status_ok();
        let body: ObservationsResponse = response.json();
        assert_eq!(body.count, 2);
        assert_eq!(body.observations[0].address, BluetoothAddress::new(1));
        assert_eq!(body.observations[0].rssi, -55);
        assert_eq!(body.observations[1].beacon_type, BeaconType::IBeacon);

        listener.shutdown().await;
    }

    #[tokio::test]
    async fn test_get_observation_by_address() {
        let listener = start_listener();
        let (server, _) = setup(&listener);

        listener.ingest(&ibeacon(0x0123_4567_89AB, -70));

        let response = server.get("/api/observations/AB:89:67:45:23:01").await;
        response.assert_status_ok();
        let body: Observation = response.json();
        assert_eq!(body.address, BluetoothAddress::new(0x0123_4567_89AB));
        assert_eq!(body.rssi, -70);

        let json: serde_json::Value = response.json();
        assert_eq!(json["beacon_type"], "IBEACON");
        assert_eq!(json["address"], "AB:89:67:45:23:01");

        listener.shutdown().await;
    }

    #[tokio::test]
    async fn test_get_observation_not_found() {
        let listener = start_listener();
        let (server, _) = setup(&listener);

        let response = server.get("/api/observations/AA:BB:CC:DD:EE:FF").await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: ErrorResponse = response.json();
        assert_eq!(body.error, "observation_not_found");

        listener.shutdown().await;
    }

    #[tokio::test]
    async fn test_get_observation_bad_address() {
        let listener = start_listener();
        let (server, _) = setup(&listener);

        let response = server.get("/api/observations/not-an-address").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorResponse = response.json();
        assert_eq!(body.error, "invalid_bluetooth_address");

        listener.shutdown().await;
    }

    #[tokio::test]
    async fn test_recent_observations_newest_first() {
        let listener = start_listener();
        let (server, state) = setup(&listener);

        for raw in 1..=3 {
            let record = eddystone(raw, -60);
            state
                .push_recent(Observation::from_record(&record, BeaconType::Eddystone))
                .await;
        }

        let response = server.get("/api/observations/recent").await;
        response.assert_status_ok();
        let body: ObservationsResponse = response.json();
        assert_eq!(body.count, 3);
        assert_eq!(body.observations[0].address, BluetoothAddress::new(3));

        listener.shutdown().await;
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let listener = start_listener();
        let (server, _) = setup(&listener);

        listener.ingest(&eddystone(1, -50));
        listener.ingest(&ibeacon(2, -60));
        listener.ingest(&AdvertisementRecord::new(BluetoothAddress::new(3), -80));

        let response = server.get("/api/stats").await;
        response.assert_status_ok();
        let body: StatsResponse = response.json();
        assert_eq!(body.sink, "json");
        assert_eq!(body.listener.received, 3);
        assert_eq!(body.listener.eddystone, 1);
        assert_eq!(body.listener.ibeacon, 1);
        assert_eq!(body.listener.ignored, 1);
        assert_eq!(body.listener.pending, 2);

        listener.shutdown().await;
    }

    #[tokio::test]
    async fn test_openapi_endpoint() {
        let listener = start_listener();
        let (server, _) = setup(&listener);

        let response = server.get("/api/openapi.json").await;
        response.assert_status_ok();
        let json: serde_json::Value = response.json();
        assert_eq!(json["info"]["title"], "beacon-relay API");

        listener.shutdown().await;
    }
}
