//! # Parkmap
//!
//! Spatial visualization and interaction engine for parking facility maps.
//!
//! This library keeps a live map view, a filtered facility list, marker and cluster
//! rendering, highlight state, a single detail popup and an optional route overlay
//! consistent with each other while the user pans, zooms, hovers and clicks.
//!
//! The map widget itself is not part of this crate. Rendering goes through the
//! [`MapProvider`] trait, routes come from a [`RoutingService`] and the device position
//! from a [`GeolocationProvider`].
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel visibility filtering with rayon
//! - **`http`** - Enable the HTTP routing service client
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use parkmap::{Coordinate, Facility, FacilityId, PriceType, ViewportState, viewport};
//!
//! let facilities = vec![
//!     Facility::new(FacilityId(1), "Central Lot", 37.456, 126.705, PriceType::Paid, 5),
//!     Facility::new(FacilityId(2), "Harbor Lot", 37.460, 126.710, PriceType::Free, 30),
//! ];
//!
//! let view = ViewportState::new(Coordinate::new(37.456, 126.705), 500.0, 3);
//! let visible = viewport::compute_visible(&facilities, &view);
//!
//! assert_eq!(visible.len(), 1);
//! assert_eq!(visible[0].id, FacilityId(1));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod error;
pub use error::{EngineError, ErrorKind, Result};

pub mod geo_utils;

// Dataset snapshots and public-data ingestion
pub mod dataset;
pub use dataset::{parse_public_records, DatasetSnapshot};

// Viewport filtering and debouncing
pub mod viewport;
pub use viewport::{compute_visible, Debouncer, FilterConfig};

// Map provider seam
pub mod map;
pub use map::{
    ClusterKey, ClusterSpec, MapEvent, MapEventKind, MapProvider, MarkerIcon, MarkerStyle,
    PolylineStyle, RenderId, Subscription, SubscriptionSet,
};

pub mod cluster;
pub use cluster::{Cluster, ClusterConfig, ClusterManager};

pub mod markers;
pub use markers::{MarkerConfig, MarkerHandle, MarkerLifecycleManager, ReconcileReport};

pub mod highlight;
pub use highlight::{HighlightChange, HighlightCoordinator};

pub mod popup;
pub use popup::{
    ActionCallback, DirectionsProvider, PopupAction, PopupDescriptor, PopupManager,
};

pub mod route;
pub use route::{
    ActiveRoute, RouteOutcome, RouteOverlayController, RouteState, RouteTicket, RoutingError,
    RoutingService,
};

pub mod labels;
pub use labels::{AvailabilityColor, LabelConfig, LabelSpec, OverlayLabelController};

pub mod location;
pub use location::{
    GeolocationError, GeolocationProvider, LocationConfig, LocationFix, LocationSource,
    UserLocationProvider,
};

pub mod engine;
pub use engine::{Engine, EngineConfig, EngineEvent};

// HTTP routing client
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{HttpRoutingConfig, HttpRoutingService};

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate with latitude and longitude in degrees.
///
/// # Example
/// ```
/// use parkmap::Coordinate;
/// let city_hall = Coordinate::new(37.5665, 126.9780); // Seoul
/// assert!(city_hall.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Create a new coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the coordinate has valid values.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from coordinates. Returns `None` for empty input.
    pub fn from_points(points: &[Coordinate]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self { min_lat, max_lat, min_lng, max_lng })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Check whether a coordinate lies inside the bounds (edges included).
    pub fn contains(&self, point: &Coordinate) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lng
            && point.longitude <= self.max_lng
    }
}

/// Stable identifier of a parking facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacilityId(pub u64);

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a facility charges for parking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceType {
    Free,
    Paid,
    Mixed,
}

impl PriceType {
    /// Map a public-data fee label ("무료", "유료", ...) to a price type.
    ///
    /// Anything that is neither explicitly free nor explicitly paid is mixed.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "무료" | "free" | "Free" => PriceType::Free,
            "유료" | "paid" | "Paid" => PriceType::Paid,
            _ => PriceType::Mixed,
        }
    }

    /// Display label used in popup content.
    pub fn label(&self) -> &'static str {
        match self {
            PriceType::Free => "무료",
            PriceType::Paid => "유료",
            PriceType::Mixed => "혼합",
        }
    }
}

/// A parking facility from the current dataset snapshot.
///
/// Facilities are immutable for the lifetime of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub id: FacilityId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub price_type: PriceType,
    pub available_spots: u32,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub base_fee: String,
    #[serde(default)]
    pub operating_days: String,
    /// Facility kind, e.g. public or private lot
    #[serde(default)]
    pub category: String,
}

impl Facility {
    /// Create a facility with empty descriptive fields.
    pub fn new(
        id: FacilityId,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        price_type: PriceType,
        available_spots: u32,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            latitude,
            longitude,
            price_type,
            available_spots,
            address: String::new(),
            base_fee: String::new(),
            operating_days: String::new(),
            category: String::new(),
        }
    }

    /// Builder-style address setter.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Whether the facility can be placed on the map.
    ///
    /// Source records use `0` for missing coordinates, so a zero latitude or
    /// longitude counts as missing.
    pub fn has_valid_coordinates(&self) -> bool {
        self.coordinate().is_valid() && self.latitude != 0.0 && self.longitude != 0.0
    }
}

/// The map's current view: center, search radius and zoom level.
///
/// Zoom levels follow the map provider convention: level 1 is the closest view and
/// larger levels show a wider area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    pub center: Coordinate,
    pub radius_meters: f64,
    pub zoom_level: u32,
}

impl ViewportState {
    pub fn new(center: Coordinate, radius_meters: f64, zoom_level: u32) -> Self {
        Self { center, radius_meters, zoom_level }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(37.5665, 126.9780).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, 181.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_zero_coordinates_are_missing() {
        let lot = Facility::new(FacilityId(7), "No Position", 0.0, 126.7, PriceType::Free, 3);
        assert!(!lot.has_valid_coordinates());

        let lot = Facility::new(FacilityId(8), "Somewhere", 37.45, 126.7, PriceType::Free, 3);
        assert!(lot.has_valid_coordinates());
    }

    #[test]
    fn test_price_type_labels() {
        assert_eq!(PriceType::from_label("무료"), PriceType::Free);
        assert_eq!(PriceType::from_label("유료"), PriceType::Paid);
        assert_eq!(PriceType::from_label("혼합"), PriceType::Mixed);
        assert_eq!(PriceType::from_label(""), PriceType::Mixed);
    }

    #[test]
    fn test_bounds_from_points() {
        assert!(Bounds::from_points(&[]).is_none());

        let bounds = Bounds::from_points(&[
            Coordinate::new(37.45, 126.70),
            Coordinate::new(37.47, 126.72),
        ])
        .unwrap();
        assert_eq!(bounds.min_lat, 37.45);
        assert_eq!(bounds.max_lng, 126.72);
        assert!(bounds.contains(&Coordinate::new(37.46, 126.71)));
        assert!(!bounds.contains(&Coordinate::new(37.48, 126.71)));
    }
}
