//! User location.
//!
//! The device position is requested once per session with a bounded wait. If the
//! request is denied, fails or times out, a fixed fallback coordinate is used instead
//! and the fix carries a `LocationUnavailable` warning so callers know it is a
//! substitute.

use std::time::Duration;

use futures::future::BoxFuture;
use log::{info, warn};
use thiserror::Error;

use crate::{Coordinate, EngineError};

/// Failure reported by the host geolocation capability.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeolocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("Geolocation is not supported")]
    Unsupported,
}

/// One-shot device position request.
pub trait GeolocationProvider {
    fn current_position(&self) -> BoxFuture<'_, std::result::Result<Coordinate, GeolocationError>>;
}

/// Where a location fix came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationSource {
    Device,
    Fallback,
}

/// A resolved user location.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationFix {
    pub coordinate: Coordinate,
    pub source: LocationSource,
    /// Set when `coordinate` is the fallback
    pub warning: Option<EngineError>,
}

impl LocationFix {
    pub fn is_fallback(&self) -> bool {
        self.source == LocationSource::Fallback
    }
}

/// Configuration for location acquisition.
#[derive(Debug, Clone)]
pub struct LocationConfig {
    /// Longest wait for the device position (default: 5s)
    pub timeout: Duration,
    /// Position used when the device position is unavailable (default: Seoul City Hall)
    pub fallback: Coordinate,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            fallback: Coordinate::new(37.5665, 126.9780),
        }
    }
}

/// Resolves the user location once and caches it for the session.
#[derive(Debug, Default)]
pub struct UserLocationProvider {
    config: LocationConfig,
    fix: Option<LocationFix>,
}

impl UserLocationProvider {
    pub fn new(config: LocationConfig) -> Self {
        Self { config, fix: None }
    }

    /// Resolve the user location.
    ///
    /// The first call asks `geolocation` and waits at most the configured timeout.
    /// Later calls return the cached fix without asking again.
    pub async fn acquire(&mut self, geolocation: &dyn GeolocationProvider) -> LocationFix {
        if let Some(fix) = &self.fix {
            return fix.clone();
        }

        let fix = match tokio::time::timeout(self.config.timeout, geolocation.current_position()).await {
            Ok(Ok(coordinate)) if coordinate.is_valid() => {
                info!(
                    "[Location] Device position {:.5}, {:.5}",
                    coordinate.latitude, coordinate.longitude
                );
                LocationFix {
                    coordinate,
                    source: LocationSource::Device,
                    warning: None,
                }
            }
            Ok(Ok(coordinate)) => self.fallback(format!(
                "device reported invalid position {}, {}",
                coordinate.latitude, coordinate.longitude
            )),
            Ok(Err(e)) => self.fallback(e.to_string()),
            Err(_) => self.fallback(format!("no position within {:?}", self.config.timeout)),
        };

        self.fix = Some(fix.clone());
        fix
    }

    fn fallback(&self, reason: String) -> LocationFix {
        warn!("[Location] Using fallback position: {}", reason);
        LocationFix {
            coordinate: self.config.fallback,
            source: LocationSource::Fallback,
            warning: Some(EngineError::LocationUnavailable(reason)),
        }
    }

    /// The resolved fix, if acquisition has finished.
    pub fn fix(&self) -> Option<&LocationFix> {
        self.fix.as_ref()
    }

    /// The resolved coordinate, device or fallback.
    pub fn current(&self) -> Option<Coordinate> {
        self.fix.as_ref().map(|fix| fix.coordinate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Device {
        result: std::result::Result<Coordinate, GeolocationError>,
        calls: AtomicUsize,
    }

    impl Device {
        fn new(result: std::result::Result<Coordinate, GeolocationError>) -> Self {
            Self { result, calls: AtomicUsize::new(0) }
        }
    }

    impl GeolocationProvider for Device {
        fn current_position(&self) -> BoxFuture<'_, std::result::Result<Coordinate, GeolocationError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(self.result.clone()).boxed()
        }
    }

    struct Silent;

    impl GeolocationProvider for Silent {
        fn current_position(&self) -> BoxFuture<'_, std::result::Result<Coordinate, GeolocationError>> {
            futures::future::pending::<std::result::Result<Coordinate, GeolocationError>>().boxed()
        }
    }

    #[tokio::test]
    async fn test_device_position() {
        let device = Device::new(Ok(Coordinate::new(37.45, 126.70)));
        let mut location = UserLocationProvider::new(LocationConfig::default());

        let fix = location.acquire(&device).await;
        assert_eq!(fix.source, LocationSource::Device);
        assert_eq!(fix.coordinate, Coordinate::new(37.45, 126.70));
        assert!(fix.warning.is_none());
    }

    #[tokio::test]
    async fn test_denied_uses_fallback() {
        let device = Device::new(Err(GeolocationError::PermissionDenied));
        let mut location = UserLocationProvider::new(LocationConfig::default());

        let fix = location.acquire(&device).await;
        assert!(fix.is_fallback());
        assert_eq!(fix.coordinate, Coordinate::new(37.5665, 126.9780));
        assert!(matches!(fix.warning, Some(EngineError::LocationUnavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_uses_fallback() {
        let mut location = UserLocationProvider::new(LocationConfig::default());
        let started = tokio::time::Instant::now();

        let fix = location.acquire(&Silent).await;
        assert!(fix.is_fallback());
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_acquired_once_per_session() {
        let device = Device::new(Ok(Coordinate::new(37.45, 126.70)));
        let mut location = UserLocationProvider::new(LocationConfig::default());
        assert_eq!(location.current(), None);

        location.acquire(&device).await;
        location.acquire(&device).await;

        assert_eq!(device.calls.load(Ordering::SeqCst), 1);
        assert_eq!(location.current(), Some(Coordinate::new(37.45, 126.70)));
    }

    #[tokio::test]
    async fn test_invalid_device_position_uses_fallback() {
        let device = Device::new(Ok(Coordinate::new(123.0, 0.0)));
        let mut location = UserLocationProvider::new(LocationConfig::default());
        assert!(location.acquire(&device).await.is_fallback());
    }
}
