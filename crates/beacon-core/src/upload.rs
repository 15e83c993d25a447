//! Upload sinks: where drained observations are sent.
//!
//! [`ObservationSink`] is the seam the upload cycle depends on. [`HttpSink`]
//! is the production implementation and speaks one of two wire formats:
//!
//! - **phant**: `GET <base>/<public_key>?private_key=..&mac=..&timestamp=..&type=..&rssi=..&misc_data=0`
//! - **JSON**: `POST <endpoint>` with `{"Address", "TimeCaptured", "RSSI", "BeaconType"}`
//!
//! Every request carries a bounded timeout. Only `200`, `201` and `202`
//! count as delivered.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::config::{SinkConfig, UploadConfig};
use crate::types::Observation;

/// Errors produced while delivering an observation.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// The configured endpoint cannot carry the request.
    #[error("Invalid upload endpoint '{0}'")]
    InvalidEndpoint(String),

    /// Transport failure: connection refused, DNS, TLS or timeout.
    #[error("Upload request to {endpoint} failed: {source}")]
    Request {
        /// Endpoint without query string.
        endpoint: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint answered with a status other than 200, 201 or 202.
    #[error("Upload to {endpoint} returned unexpected status {status}")]
    UnexpectedStatus {
        /// Endpoint without query string.
        endpoint: String,
        /// HTTP status code received.
        status: u16,
    },
}

impl UploadError {
    /// Returns `true` if the request ran into the client timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Request { source, .. } if source.is_timeout())
    }
}

/// Result type for upload operations.
pub type UploadResult<T> = std::result::Result<T, UploadError>;

/// Destination for drained observations.
pub trait ObservationSink: Send + Sync {
    /// Deliver one observation. Implementations must not retry.
    fn send(&self, observation: &Observation) -> impl Future<Output = UploadResult<()>> + Send;
}

impl<S: ObservationSink> ObservationSink for std::sync::Arc<S> {
    fn send(&self, observation: &Observation) -> impl Future<Output = UploadResult<()>> + Send {
        (**self).send(observation)
    }
}

/// Body of a JSON upload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct JsonObservation {
    address: String,
    time_captured: DateTime<Utc>,
    #[serde(rename = "RSSI")]
    rssi: i16,
    beacon_type: &'static str,
}

impl From<&Observation> for JsonObservation {
    fn from(observation: &Observation) -> Self {
        Self {
            address: observation.address.to_string(),
            time_captured: observation.captured_at,
            rssi: observation.rssi,
            beacon_type: observation.beacon_type.as_str(),
        }
    }
}

#[derive(Debug, Clone)]
enum SinkTarget {
    Phant { stream_url: Url, private_key: String },
    Json { endpoint: Url },
}

/// HTTP upload sink for either a phant stream or a JSON endpoint.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    target: SinkTarget,
}

impl HttpSink {
    /// Build the sink described by the upload configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the phant
    /// base URL cannot take a path segment.
    pub fn from_config(config: &UploadConfig) -> UploadResult<Self> {
        let timeout = config.request_timeout();
        match &config.sink {
            SinkConfig::Phant {
                base_url,
                public_key,
                private_key,
            } => Self::phant(base_url, public_key, private_key, timeout),
            SinkConfig::Json { endpoint } => Self::json(endpoint.clone(), timeout),
        }
    }

    /// phant sink posting to `<base_url>/<public_key>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or `base_url`
    /// cannot be a base.
    pub fn phant(
        base_url: &Url,
        public_key: &str,
        private_key: &str,
        timeout: Duration,
    ) -> UploadResult<Self> {
        let mut stream_url = base_url.clone();
        stream_url
            .path_segments_mut()
            .map_err(|()| UploadError::InvalidEndpoint(base_url.to_string()))?
            .pop_if_empty()
            .push(public_key);

        Ok(Self {
            client: build_client(timeout)?,
            target: SinkTarget::Phant {
                stream_url,
                private_key: private_key.to_string(),
            },
        })
    }

    /// JSON sink posting to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn json(endpoint: Url, timeout: Duration) -> UploadResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            target: SinkTarget::Json { endpoint },
        })
    }

    /// Endpoint requests go to, without query string. Safe to log.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        match &self.target {
            SinkTarget::Phant { stream_url, .. } => stream_url,
            SinkTarget::Json { endpoint } => endpoint,
        }
    }

    /// Full request URL for an observation.
    #[must_use]
    pub fn request_url(&self, observation: &Observation) -> Url {
        match &self.target {
            SinkTarget::Phant {
                stream_url,
                private_key,
            } => phant_url(stream_url, private_key, observation),
            SinkTarget::Json { endpoint } => endpoint.clone(),
        }
    }
}

impl ObservationSink for HttpSink {
    async fn send(&self, observation: &Observation) -> UploadResult<()> {
        let endpoint = self.endpoint().to_string();
        let request = match &self.target {
            SinkTarget::Phant { .. } => self.client.get(self.request_url(observation)),
            SinkTarget::Json { endpoint } => self
                .client
                .post(endpoint.clone())
                .json(&JsonObservation::from(observation)),
        };

        let response = request
            .send()
            .await
            .map_err(|source| UploadError::Request {
                endpoint: endpoint.clone(),
                // The request URL carries the phant private key.
                source: source.without_url(),
            })?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED
        ) {
            tracing::trace!(%endpoint, address = %observation.address, "Observation delivered");
            Ok(())
        } else {
            Err(UploadError::UnexpectedStatus {
                endpoint,
                status: status.as_u16(),
            })
        }
    }
}

fn build_client(timeout: Duration) -> UploadResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(UploadError::ClientBuild)
}

fn phant_url(stream_url: &Url, private_key: &str, observation: &Observation) -> Url {
    let mut url = stream_url.clone();
    url.query_pairs_mut()
        .clear()
        .append_pair("private_key", private_key)
        .append_pair("mac", &observation.address.to_string())
        .append_pair("timestamp", &observation.captured_at.timestamp().to_string())
        .append_pair("type", observation.beacon_type.as_str())
        .append_pair("rssi", &observation.rssi.to_string())
        .append_pair("misc_data", "0");
    url
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Query, State};
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use chrono::TimeZone;

    use super::*;
    use crate::types::{BeaconType, BluetoothAddress};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn observation() -> Observation {
        Observation {
            address: BluetoothAddress::new(0x0123_4567_89AB),
            captured_at: Utc.with_ymd_and_hms(2025, 1, 15, 3, 30, 0).unwrap(),
            rssi: -61,
            beacon_type: BeaconType::IBeacon,
        }
    }

    fn query_map(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    async fn spawn_endpoint(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    #[test]
    fn test_phant_stream_url_appends_public_key() {
        let base = Url::parse("http://data.sparkfun.com/input/").unwrap();
        let sink = HttpSink::phant(&base, "PUBKEY", "PRIVKEY", TIMEOUT).unwrap();
        assert_eq!(sink.endpoint().as_str(), "http://data.sparkfun.com/input/PUBKEY");

        let base = Url::parse("http://phant.local/input").unwrap();
        let sink = HttpSink::phant(&base, "PUBKEY", "PRIVKEY", TIMEOUT).unwrap();
        assert_eq!(sink.endpoint().as_str(), "http://phant.local/input/PUBKEY");
    }

    #[test]
    fn test_phant_query_parameters() {
        let base = Url::parse("http://data.sparkfun.com/input/").unwrap();
        let sink = HttpSink::phant(&base, "PUBKEY", "PRIVKEY", TIMEOUT).unwrap();
        let url = sink.request_url(&observation());

        assert_eq!(url.path(), "/input/PUBKEY");
        let query = query_map(&url);
        assert_eq!(query["private_key"], "PRIVKEY");
        assert_eq!(query["mac"], "AB:89:67:45:23:01");
        assert_eq!(query["timestamp"], "1736911800");
        assert_eq!(query["type"], "IBEACON");
        assert_eq!(query["rssi"], "-61");
        assert_eq!(query["misc_data"], "0");
        assert_eq!(query.len(), 6);
    }

    #[test]
    fn test_phant_rejects_non_base_url() {
        let base = Url::parse("mailto:beacons@example.com").unwrap();
        assert!(matches!(
            HttpSink::phant(&base, "PUBKEY", "PRIVKEY", TIMEOUT),
            Err(UploadError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_json_body_shape() {
        let body = serde_json::to_value(JsonObservation::from(&observation())).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "Address": "AB:89:67:45:23:01",
                "TimeCaptured": "2025-01-15T03:30:00Z",
                "RSSI": -61,
                "BeaconType": "IBEACON"
            })
        );
    }

    #[test]
    fn test_from_config_selects_variant() {
        let mut config = UploadConfig::default();
        config.sink = SinkConfig::Json {
            endpoint: Url::parse("https://logs.example.com/inputs/abc").unwrap(),
        };
        let sink = HttpSink::from_config(&config).unwrap();
        assert_eq!(
            sink.request_url(&observation()).as_str(),
            "https://logs.example.com/inputs/abc"
        );
    }

    #[tokio::test]
    async fn test_phant_send_delivers_query() {
        let received: Arc<Mutex<Vec<HashMap<String, String>>>> = Arc::default();
        let router = Router::new()
            .route(
                "/input/{key}",
                get(
                    |State(rx): State<Arc<Mutex<Vec<HashMap<String, String>>>>>,
                     Query(q): Query<HashMap<String, String>>| async move {
                        rx.lock().unwrap().push(q);
                        AxumStatus::OK
                    },
                ),
            )
            .with_state(Arc::clone(&received));
        let addr = spawn_endpoint(router).await;

        let base = Url::parse(&format!("http://{addr}/input/")).unwrap();
        let sink = HttpSink::phant(&base, "PUBKEY", "PRIVKEY", TIMEOUT).unwrap();
        sink.send(&observation()).await.unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["mac"], "AB:89:67:45:23:01");
        assert_eq!(received[0]["type"], "IBEACON");
    }

    #[tokio::test]
    async fn test_json_send_posts_body() {
        let received: Arc<Mutex<Vec<serde_json::Value>>> = Arc::default();
        let router = Router::new()
            .route(
                "/inputs",
                post(
                    |State(rx): State<Arc<Mutex<Vec<serde_json::Value>>>>,
                     Json(body): Json<serde_json::Value>| async move {
                        rx.lock().unwrap().push(body);
                        AxumStatus::ACCEPTED
                    },
                ),
            )
            .with_state(Arc::clone(&received));
        let addr = spawn_endpoint(router).await;

        let endpoint = Url::parse(&format!("http://{addr}/inputs")).unwrap();
        let sink = HttpSink::json(endpoint, TIMEOUT).unwrap();
        sink.send(&observation()).await.unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received[0]["Address"], "AB:89:67:45:23:01");
        assert_eq!(received[0]["RSSI"], -61);
    }

    #[tokio::test]
    async fn test_unexpected_status_is_error() {
        let router = Router::new().route("/inputs", post(|| async { AxumStatus::NO_CONTENT }));
        let addr = spawn_endpoint(router).await;

        let endpoint = Url::parse(&format!("http://{addr}/inputs")).unwrap();
        let sink = HttpSink::json(endpoint, TIMEOUT).unwrap();
        let err = sink.send(&observation()).await.unwrap_err();
        assert!(matches!(err, UploadError::UnexpectedStatus { status: 204, .. }));
        assert!(!err.is_timeout());
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let router = Router::new().route(
            "/inputs",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                AxumStatus::OK
            }),
        );
        let addr = spawn_endpoint(router).await;

        let endpoint = Url::parse(&format!("http://{addr}/inputs")).unwrap();
        let sink = HttpSink::json(endpoint, Duration::from_millis(100)).unwrap();
        let err = sink.send(&observation()).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_error_message_omits_private_key() {
        // Nothing listens on port 9 of the loopback interface.
        let base = Url::parse("http://127.0.0.1:9/input/").unwrap();
        let sink = HttpSink::phant(&base, "PUBKEY", "SECRETKEY", TIMEOUT).unwrap();
        let err = sink.send(&observation()).await.unwrap_err();
        assert!(matches!(err, UploadError::Request { .. }));
        assert!(!format!("{err}").contains("SECRETKEY"));
    }
}
