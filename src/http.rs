//! HTTP routing client for a Kakao Mobility style directions API.
//!
//! This module provides route fetching with:
//! - A pooled reqwest client with connect and request timeouts
//! - Automatic retry with exponential backoff on 429
//! - Bounded retries on transport errors
//!
//! Response paths arrive as flat `[x1, y1, x2, y2, ...]` vertex lists (longitude
//! first) per road segment; [`parse_directions`] joins them into one path.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;

use crate::route::{RoutingError, RoutingService};
use crate::Coordinate;

const MAX_RETRIES: u32 = 3;

/// Configuration for the HTTP routing client.
#[derive(Debug, Clone)]
pub struct HttpRoutingConfig {
    /// Directions endpoint (default: Kakao Mobility v1 directions)
    pub endpoint: String,
    /// REST API key, sent as `Authorization: KakaoAK <key>`
    pub api_key: String,
    /// Connection timeout (default: 5s)
    pub connect_timeout: Duration,
    /// Whole-request timeout (default: 10s)
    pub request_timeout: Duration,
    /// Retries after a 429 or transport error (default: 3)
    pub max_retries: u32,
}

impl HttpRoutingConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }
}

impl Default for HttpRoutingConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://apis-navi.kakaomobility.com/v1/directions".to_string(),
            api_key: String::new(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            max_retries: MAX_RETRIES,
        }
    }
}

// ============================================================================
// Response format
// ============================================================================

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    routes: Vec<ApiRoute>,
}

#[derive(Debug, Deserialize)]
struct ApiRoute {
    result_code: i32,
    #[serde(default)]
    result_msg: String,
    #[serde(default)]
    sections: Vec<ApiSection>,
}

#[derive(Debug, Deserialize)]
struct ApiSection {
    #[serde(default)]
    roads: Vec<ApiRoad>,
}

#[derive(Debug, Deserialize)]
struct ApiRoad {
    #[serde(default)]
    vertexes: Vec<f64>,
}

/// Extract the driving path from a directions response body.
///
/// A non-zero `result_code` or a response without vertices is `NoRoute`.
pub fn parse_directions(body: &[u8]) -> Result<Vec<Coordinate>, RoutingError> {
    let data: DirectionsResponse = serde_json::from_slice(body)
        .map_err(|e| RoutingError::Network(format!("JSON parse error: {}", e)))?;

    let route = data.routes.into_iter().next().ok_or(RoutingError::NoRoute)?;
    if route.result_code != 0 {
        debug!("[HttpRouting] result_code {}: {}", route.result_code, route.result_msg);
        return Err(RoutingError::NoRoute);
    }

    let path: Vec<Coordinate> = route
        .sections
        .iter()
        .flat_map(|section| section.roads.iter())
        .flat_map(|road| road.vertexes.chunks_exact(2))
        .map(|xy| Coordinate::new(xy[1], xy[0]))
        .collect();

    if path.is_empty() {
        return Err(RoutingError::NoRoute);
    }
    Ok(path)
}

// ============================================================================
// Client
// ============================================================================

/// Directions client implementing [`RoutingService`].
pub struct HttpRoutingService {
    client: Client,
    config: HttpRoutingConfig,
    auth_header: String,
    consecutive_429s: AtomicU32,
}

impl HttpRoutingService {
    pub fn new(config: HttpRoutingConfig) -> Result<Self, RoutingError> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RoutingError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            auth_header: format!("KakaoAK {}", config.api_key),
            config,
            consecutive_429s: AtomicU32::new(0),
        })
    }

    fn record_success(&self) {
        self.consecutive_429s.store(0, Ordering::Relaxed);
    }

    fn record_429(&self) -> Duration {
        let count = self.consecutive_429s.fetch_add(1, Ordering::Relaxed) + 1;
        // 1s, 2s, 4s max
        let backoff = Duration::from_millis(500 * (1 << count.min(3)));
        warn!("[HttpRouting] Got 429! Consecutive: {}, backing off {:?}", count, backoff);
        backoff
    }

    async fn fetch(&self, origin: Coordinate, destination: Coordinate) -> Result<Vec<Coordinate>, RoutingError> {
        let query = [
            ("origin", format!("{},{}", origin.longitude, origin.latitude)),
            ("destination", format!("{},{}", destination.longitude, destination.latitude)),
        ];

        let mut retries = 0;
        let req_start = Instant::now();

        loop {
            let response = self
                .client
                .get(&self.config.endpoint)
                .header("Authorization", &self.auth_header)
                .query(&query)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        retries += 1;
                        if retries > self.config.max_retries {
                            return Err(RoutingError::Network("Max retries exceeded (429)".to_string()));
                        }
                        let wait = self.record_429();
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    self.record_success();

                    if !status.is_success() {
                        return Err(RoutingError::Network(format!("HTTP {}", status)));
                    }

                    let bytes = resp
                        .bytes()
                        .await
                        .map_err(|e| RoutingError::Network(format!("Body download error: {}", e)))?;
                    let path = parse_directions(&bytes)?;

                    info!(
                        "[HttpRouting] {} points ({:.1}KB) in {:?}",
                        path.len(),
                        bytes.len() as f64 / 1024.0,
                        req_start.elapsed()
                    );
                    return Ok(path);
                }
                Err(e) if e.is_timeout() => {
                    warn!("[HttpRouting] Timed out after {:?}", req_start.elapsed());
                    return Err(RoutingError::Timeout);
                }
                Err(e) => {
                    retries += 1;
                    if retries > self.config.max_retries {
                        return Err(RoutingError::Network(format!("Request error: {}", e)));
                    }

                    let wait = Duration::from_millis(200 * (1 << retries));
                    warn!("[HttpRouting] Error: {}, retry {} after {:?}", e, retries, wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

impl RoutingService for HttpRoutingService {
    fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> BoxFuture<'_, Result<Vec<Coordinate>, RoutingError>> {
        self.fetch(origin, destination).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_directions_joins_roads() {
        let body = br#"{
            "routes": [{
                "result_code": 0,
                "result_msg": "길찾기 성공",
                "sections": [
                    {"roads": [{"vertexes": [126.700, 37.450, 126.702, 37.452]}]},
                    {"roads": [{"vertexes": [126.705, 37.456]}, {"vertexes": []}]}
                ]
            }]
        }"#;

        let path = parse_directions(body).unwrap();
        assert_eq!(
            path,
            vec![
                Coordinate::new(37.450, 126.700),
                Coordinate::new(37.452, 126.702),
                Coordinate::new(37.456, 126.705),
            ]
        );
    }

    #[test]
    fn test_parse_directions_failure_code() {
        let body = br#"{"routes": [{"result_code": 104, "result_msg": "출발지와 도착지가 너무 가까움"}]}"#;
        assert_eq!(parse_directions(body), Err(RoutingError::NoRoute));
    }

    #[test]
    fn test_parse_directions_empty() {
        assert_eq!(parse_directions(br#"{"routes": []}"#), Err(RoutingError::NoRoute));
        assert_eq!(
            parse_directions(br#"{"routes": [{"result_code": 0, "sections": []}]}"#),
            Err(RoutingError::NoRoute)
        );
    }

    #[test]
    fn test_parse_directions_bad_json() {
        assert!(matches!(parse_directions(b"not json"), Err(RoutingError::Network(_))));
    }

    #[test]
    fn test_backoff_grows_and_resets() {
        let service = HttpRoutingService::new(HttpRoutingConfig::new("test-key")).unwrap();
        assert_eq!(service.auth_header, "KakaoAK test-key");

        assert_eq!(service.record_429(), Duration::from_millis(1000));
        assert_eq!(service.record_429(), Duration::from_millis(2000));
        assert_eq!(service.record_429(), Duration::from_millis(4000));
        assert_eq!(service.record_429(), Duration::from_millis(4000));

        service.record_success();
        assert_eq!(service.record_429(), Duration::from_millis(1000));
    }
}
