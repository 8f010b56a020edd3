//! Map provider seam.
//!
//! The engine never draws anything itself. Every marker, label, popup, cluster and
//! polyline is created and destroyed through [`MapProvider`], which the host implements
//! on top of its map SDK. Render objects are referred to by opaque [`RenderId`]s.
//!
//! Event listeners registered with the provider are held in [`Subscription`] handles
//! that must be disposed explicitly; [`SubscriptionSet`] disposes a whole group at
//! teardown.

use std::fmt;

use log::{debug, warn};

use crate::labels::LabelSpec;
use crate::popup::PopupDescriptor;
use crate::{Bounds, Coordinate, FacilityId, PriceType};

/// Opaque handle to a render object owned by the map provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderId(pub u64);

/// Opaque handle to a registered event listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Grid cell a cluster occupies: (row, col).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterKey(pub i32, pub i32);

// ============================================================================
// Render styles
// ============================================================================

/// Icon variant for a facility marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerIcon {
    pub price_type: PriceType,
    pub highlighted: bool,
}

/// Visual state of a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerStyle {
    pub icon: MarkerIcon,
    /// Square icon size in pixels, anchored at its center
    pub size: u32,
    pub z_index: i32,
}

/// Stroke settings for the route polyline.
#[derive(Debug, Clone, PartialEq)]
pub struct PolylineStyle {
    pub stroke_weight: u32,
    pub stroke_color: String,
    pub stroke_opacity: f32,
}

impl Default for PolylineStyle {
    fn default() -> Self {
        Self {
            stroke_weight: 5,
            stroke_color: "#424242".to_string(),
            stroke_opacity: 0.7,
        }
    }
}

/// Cluster marker description.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSpec {
    pub key: ClusterKey,
    pub center: Coordinate,
    pub count: usize,
    /// Whether the provider may run its own zoom-to-fit on click
    pub click_zoom: bool,
}

// ============================================================================
// Events
// ============================================================================

/// Event kinds the engine subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapEventKind {
    CenterChanged,
    ZoomChanged,
    Click,
    MarkerOver,
    MarkerOut,
    MarkerClick,
    ClusterOver,
    ClusterOut,
    ClusterClick,
}

impl MapEventKind {
    pub const ALL: [MapEventKind; 9] = [
        MapEventKind::CenterChanged,
        MapEventKind::ZoomChanged,
        MapEventKind::Click,
        MapEventKind::MarkerOver,
        MapEventKind::MarkerOut,
        MapEventKind::MarkerClick,
        MapEventKind::ClusterOver,
        MapEventKind::ClusterOut,
        MapEventKind::ClusterClick,
    ];
}

/// An event delivered by the map provider.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    CenterChanged(Coordinate),
    ZoomChanged(u32),
    /// Click on the map background
    Click(Coordinate),
    MarkerOver(FacilityId),
    MarkerOut(FacilityId),
    MarkerClick(FacilityId),
    ClusterOver(ClusterKey),
    ClusterOut(ClusterKey),
    ClusterClick(ClusterKey),
}

impl MapEvent {
    pub fn kind(&self) -> MapEventKind {
        match self {
            MapEvent::CenterChanged(_) => MapEventKind::CenterChanged,
            MapEvent::ZoomChanged(_) => MapEventKind::ZoomChanged,
            MapEvent::Click(_) => MapEventKind::Click,
            MapEvent::MarkerOver(_) => MapEventKind::MarkerOver,
            MapEvent::MarkerOut(_) => MapEventKind::MarkerOut,
            MapEvent::MarkerClick(_) => MapEventKind::MarkerClick,
            MapEvent::ClusterOver(_) => MapEventKind::ClusterOver,
            MapEvent::ClusterOut(_) => MapEventKind::ClusterOut,
            MapEvent::ClusterClick(_) => MapEventKind::ClusterClick,
        }
    }
}

// ============================================================================
// Provider trait
// ============================================================================

/// Rendering and viewport capabilities of the host map SDK.
pub trait MapProvider {
    fn create_marker(&mut self, facility: FacilityId, position: Coordinate, style: &MarkerStyle) -> RenderId;
    fn restyle_marker(&mut self, marker: RenderId, style: &MarkerStyle);
    fn destroy_marker(&mut self, marker: RenderId);

    fn create_overlay(&mut self, label: &LabelSpec, visible: bool) -> RenderId;
    fn set_overlay_visible(&mut self, overlay: RenderId, visible: bool);
    fn destroy_overlay(&mut self, overlay: RenderId);

    fn open_popup(&mut self, popup: &PopupDescriptor) -> RenderId;
    fn close_popup(&mut self, popup: RenderId);

    fn create_polyline(&mut self, path: &[Coordinate], style: &PolylineStyle) -> RenderId;
    fn destroy_polyline(&mut self, polyline: RenderId);

    fn create_cluster(&mut self, cluster: &ClusterSpec) -> RenderId;
    fn scale_cluster(&mut self, cluster: RenderId, scale: f32);
    fn destroy_cluster(&mut self, cluster: RenderId);

    fn center(&self) -> Coordinate;
    fn set_center(&mut self, center: Coordinate);
    fn set_bounds(&mut self, bounds: &Bounds);
    fn level(&self) -> u32;
    fn set_level(&mut self, level: u32);

    fn subscribe(&mut self, kind: MapEventKind) -> ListenerId;
    fn unsubscribe(&mut self, listener: ListenerId);
}

// ============================================================================
// Subscriptions
// ============================================================================

/// A registered event listener. Release it with [`Subscription::dispose`].
///
/// Dropping an undisposed subscription logs a warning: the provider still holds the
/// listener.
#[must_use = "subscriptions must be disposed"]
pub struct Subscription {
    listener: ListenerId,
    kind: MapEventKind,
    disposed: bool,
}

impl Subscription {
    pub fn acquire(map: &mut dyn MapProvider, kind: MapEventKind) -> Self {
        let listener = map.subscribe(kind);
        debug!("[Subscriptions] {:?} -> listener {:?}", kind, listener);
        Self { listener, kind, disposed: false }
    }

    pub fn kind(&self) -> MapEventKind {
        self.kind
    }

    pub fn listener(&self) -> ListenerId {
        self.listener
    }

    pub fn dispose(mut self, map: &mut dyn MapProvider) {
        map.unsubscribe(self.listener);
        self.disposed = true;
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("listener", &self.listener)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.disposed {
            warn!(
                "[Subscriptions] Listener {:?} ({:?}) dropped without dispose",
                self.listener, self.kind
            );
        }
    }
}

/// A group of subscriptions released together.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, map: &mut dyn MapProvider, kind: MapEventKind) {
        self.subscriptions.push(Subscription::acquire(map, kind));
    }

    pub fn is_subscribed(&self, kind: MapEventKind) -> bool {
        self.subscriptions.iter().any(|s| s.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Dispose every subscription. Returns how many were released.
    pub fn dispose_all(&mut self, map: &mut dyn MapProvider) -> usize {
        let count = self.subscriptions.len();
        for subscription in self.subscriptions.drain(..) {
            subscription.dispose(map);
        }
        count
    }
}

// ============================================================================
// Recording provider for tests
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{BTreeMap, HashSet};

    use super::*;

    /// In-memory map provider that records every live render object.
    #[derive(Debug)]
    pub(crate) struct RecordingMap {
        next_id: u64,
        pub markers: BTreeMap<RenderId, (FacilityId, Coordinate, MarkerStyle)>,
        pub overlays: BTreeMap<RenderId, (LabelSpec, bool)>,
        pub popups: BTreeMap<RenderId, FacilityId>,
        pub polylines: BTreeMap<RenderId, Vec<Coordinate>>,
        pub clusters: BTreeMap<RenderId, (ClusterSpec, f32)>,
        pub listeners: HashSet<ListenerId>,
        pub center: Coordinate,
        pub level: u32,
        pub fitted_bounds: Vec<Bounds>,
        pub overlays_created: usize,
    }

    impl RecordingMap {
        pub fn new(center: Coordinate, level: u32) -> Self {
            Self {
                next_id: 0,
                markers: BTreeMap::new(),
                overlays: BTreeMap::new(),
                popups: BTreeMap::new(),
                polylines: BTreeMap::new(),
                clusters: BTreeMap::new(),
                listeners: HashSet::new(),
                center,
                level,
                fitted_bounds: Vec::new(),
                overlays_created: 0,
            }
        }

        fn next(&mut self) -> RenderId {
            self.next_id += 1;
            RenderId(self.next_id)
        }

        pub fn marker_facilities(&self) -> Vec<FacilityId> {
            let mut ids: Vec<FacilityId> = self.markers.values().map(|(id, _, _)| *id).collect();
            ids.sort();
            ids
        }

        pub fn marker_style(&self, facility: FacilityId) -> Option<MarkerStyle> {
            self.markers
                .values()
                .find(|(id, _, _)| *id == facility)
                .map(|(_, _, style)| *style)
        }

        pub fn overlay_for(&self, facility: FacilityId) -> Option<&(LabelSpec, bool)> {
            self.overlays.values().find(|(spec, _)| spec.facility_id == facility)
        }

        pub fn render_object_count(&self) -> usize {
            self.markers.len()
                + self.overlays.len()
                + self.popups.len()
                + self.polylines.len()
                + self.clusters.len()
        }
    }

    impl MapProvider for RecordingMap {
        fn create_marker(&mut self, facility: FacilityId, position: Coordinate, style: &MarkerStyle) -> RenderId {
            let id = self.next();
            self.markers.insert(id, (facility, position, *style));
            id
        }

        fn restyle_marker(&mut self, marker: RenderId, style: &MarkerStyle) {
            let entry = self.markers.get_mut(&marker).expect("restyle of unknown marker");
            entry.2 = *style;
        }

        fn destroy_marker(&mut self, marker: RenderId) {
            assert!(self.markers.remove(&marker).is_some(), "double destroy of marker");
        }

        fn create_overlay(&mut self, label: &LabelSpec, visible: bool) -> RenderId {
            let id = self.next();
            self.overlays.insert(id, (label.clone(), visible));
            self.overlays_created += 1;
            id
        }

        fn set_overlay_visible(&mut self, overlay: RenderId, visible: bool) {
            let entry = self.overlays.get_mut(&overlay).expect("toggle of unknown overlay");
            entry.1 = visible;
        }

        fn destroy_overlay(&mut self, overlay: RenderId) {
            assert!(self.overlays.remove(&overlay).is_some(), "double destroy of overlay");
        }

        fn open_popup(&mut self, popup: &PopupDescriptor) -> RenderId {
            let id = self.next();
            self.popups.insert(id, popup.facility_id);
            id
        }

        fn close_popup(&mut self, popup: RenderId) {
            assert!(self.popups.remove(&popup).is_some(), "double close of popup");
        }

        fn create_polyline(&mut self, path: &[Coordinate], _style: &PolylineStyle) -> RenderId {
            let id = self.next();
            self.polylines.insert(id, path.to_vec());
            id
        }

        fn destroy_polyline(&mut self, polyline: RenderId) {
            assert!(self.polylines.remove(&polyline).is_some(), "double destroy of polyline");
        }

        fn create_cluster(&mut self, cluster: &ClusterSpec) -> RenderId {
            let id = self.next();
            self.clusters.insert(id, (cluster.clone(), 1.0));
            id
        }

        fn scale_cluster(&mut self, cluster: RenderId, scale: f32) {
            let entry = self.clusters.get_mut(&cluster).expect("scale of unknown cluster");
            entry.1 = scale;
        }

        fn destroy_cluster(&mut self, cluster: RenderId) {
            assert!(self.clusters.remove(&cluster).is_some(), "double destroy of cluster");
        }

        fn center(&self) -> Coordinate {
            self.center
        }

        fn set_center(&mut self, center: Coordinate) {
            self.center = center;
        }

        fn set_bounds(&mut self, bounds: &Bounds) {
            self.center = bounds.center();
            self.fitted_bounds.push(*bounds);
        }

        fn level(&self) -> u32 {
            self.level
        }

        fn set_level(&mut self, level: u32) {
            self.level = level;
        }

        fn subscribe(&mut self, _kind: MapEventKind) -> ListenerId {
            let id = ListenerId(self.next().0);
            self.listeners.insert(id);
            id
        }

        fn unsubscribe(&mut self, listener: ListenerId) {
            assert!(self.listeners.remove(&listener), "unsubscribe of unknown listener");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingMap;
    use super::*;

    #[test]
    fn test_subscription_set_disposes_all() {
        let mut map = RecordingMap::new(Coordinate::new(37.45, 126.70), 3);
        let mut subs = SubscriptionSet::new();

        for kind in MapEventKind::ALL {
            subs.subscribe(&mut map, kind);
        }
        assert_eq!(map.listeners.len(), MapEventKind::ALL.len());
        assert!(subs.is_subscribed(MapEventKind::ClusterClick));

        assert_eq!(subs.dispose_all(&mut map), MapEventKind::ALL.len());
        assert!(map.listeners.is_empty());
        assert!(subs.is_empty());
    }

    #[test]
    fn test_single_subscription_dispose() {
        let mut map = RecordingMap::new(Coordinate::new(37.45, 126.70), 3);
        let sub = Subscription::acquire(&mut map, MapEventKind::Click);
        assert_eq!(sub.kind(), MapEventKind::Click);
        assert!(map.listeners.contains(&sub.listener()));

        sub.dispose(&mut map);
        assert!(map.listeners.is_empty());
    }

    #[test]
    fn test_event_kind() {
        assert_eq!(MapEvent::MarkerClick(FacilityId(1)).kind(), MapEventKind::MarkerClick);
        assert_eq!(MapEvent::ZoomChanged(4).kind(), MapEventKind::ZoomChanged);
    }
}
