//! # Map Engine
//!
//! Stateful engine for one map session. It owns the dataset snapshot, the viewport
//! and every component, and keeps them consistent as map events and host commands
//! arrive.
//!
//! ## Architecture
//!
//! The engine manages:
//! - The facility snapshot with its spatial index
//! - The viewport and the debounced visible set
//! - Markers, clusters and availability labels for the visible set
//! - Highlight, popup and route state
//! - The map event subscriptions, released by [`Engine::teardown`]
//!
//! Hosts forward map events to [`Engine::handle_event`], call [`Engine::tick`] when
//! [`Engine::next_deadline`] passes, and read state changes from
//! [`Engine::drain_events`].
//!
//! The engine is single-threaded. Async work (geolocation, routing) runs through
//! `&mut self`, and route responses carry a request token so that only the newest
//! one is applied.

use std::time::Instant;

use log::{debug, info, warn};
use url::Url;

use crate::cluster::{ClusterConfig, ClusterManager};
use crate::dataset::{parse_public_records, DatasetSnapshot};
use crate::highlight::{HighlightChange, HighlightCoordinator};
use crate::labels::{LabelConfig, OverlayLabelController};
use crate::location::{GeolocationProvider, LocationConfig, LocationFix, LocationSource, UserLocationProvider};
use crate::map::{MapEvent, MapEventKind, MapProvider, PolylineStyle, SubscriptionSet};
use crate::markers::{MarkerConfig, MarkerLifecycleManager};
use crate::popup::{directions_url, ActionCallback, DirectionsProvider, PopupDescriptor, PopupManager};
use crate::route::{RouteOutcome, RouteOverlayController, RouteState, RouteTicket, RoutingError, RoutingService};
use crate::viewport::{zoom_for_radius, Debouncer, FilterConfig};
use crate::{Coordinate, EngineError, Facility, FacilityId, Result, ViewportState};

// ============================================================================
// Configuration and events
// ============================================================================

/// Configuration for every engine component.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub filter: FilterConfig,
    pub cluster: ClusterConfig,
    pub marker: MarkerConfig,
    pub label: LabelConfig,
    pub location: LocationConfig,
    pub polyline: PolylineStyle,
}

/// State changes reported to the host UI.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The visible set settled to these facilities, in snapshot order.
    VisibleFacilitiesChanged(Vec<FacilityId>),
    HighlightChanged(Option<FacilityId>),
    PopupOpened(PopupDescriptor),
    PopupClosed(FacilityId),
    RouteStateChanged(RouteState),
    /// A recoverable condition was absorbed.
    Warning(EngineError),
}

// ============================================================================
// Engine
// ============================================================================

/// The map session engine.
pub struct Engine<M: MapProvider> {
    map: M,
    config: EngineConfig,
    ready: bool,

    snapshot: Option<DatasetSnapshot>,
    viewport: ViewportState,
    visible: Vec<Facility>,
    debouncer: Debouncer<ViewportState>,

    subscriptions: SubscriptionSet,
    markers: MarkerLifecycleManager,
    clusters: ClusterManager,
    labels: OverlayLabelController,
    highlight: HighlightCoordinator,
    popups: PopupManager,
    routes: RouteOverlayController,
    location: UserLocationProvider,

    // Deferred until the session is attached
    pending_recenter: Option<Coordinate>,
    pending_selection: Option<FacilityId>,

    events: Vec<EngineEvent>,
}

impl<M: MapProvider> Engine<M> {
    /// Create an engine over `map`. Nothing is rendered until [`attach`](Self::attach).
    pub fn new(map: M, config: EngineConfig) -> Self {
        let viewport = ViewportState::new(map.center(), config.filter.radius_meters, map.level());
        Self {
            debouncer: Debouncer::new(config.filter.debounce),
            markers: MarkerLifecycleManager::new(config.marker.clone()),
            clusters: ClusterManager::new(config.cluster.clone()),
            labels: OverlayLabelController::new(config.label.clone()),
            routes: RouteOverlayController::new(config.polyline.clone()),
            location: UserLocationProvider::new(config.location.clone()),
            highlight: HighlightCoordinator::new(),
            popups: PopupManager::new(),
            subscriptions: SubscriptionSet::new(),
            snapshot: None,
            visible: Vec::new(),
            pending_recenter: None,
            pending_selection: None,
            events: Vec::new(),
            ready: false,
            viewport,
            config,
            map,
        }
    }

    /// Mark the map session ready: subscribe to map events, apply deferred work and
    /// render the current visible set.
    pub fn attach(&mut self) {
        if self.ready {
            return;
        }
        for kind in MapEventKind::ALL {
            self.subscriptions.subscribe(&mut self.map, kind);
        }
        self.ready = true;
        self.viewport.zoom_level = self.map.level();

        match self.pending_recenter.take() {
            Some(center) => {
                self.map.set_center(center);
                self.viewport.center = center;
            }
            None => self.viewport.center = self.map.center(),
        }

        self.refresh_now();
        info!(
            "[Engine] Attached: {} listeners, {} visible facilities",
            self.subscriptions.len(),
            self.visible.len()
        );

        if let Some(id) = self.pending_selection.take() {
            if let Err(e) = self.select_facility(id) {
                warn!("[Engine] Deferred selection of {} failed: {}", id, e);
                self.events.push(EngineEvent::Warning(e));
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    // ========================================================================
    // Dataset
    // ========================================================================

    /// Replace the facility snapshot. Returns the number of facilities kept after the
    /// region prefilter.
    ///
    /// Markers, labels and clusters are rebuilt from scratch. An open popup whose
    /// facility is gone is closed. On error the previous snapshot stays in place.
    pub fn load_snapshot(&mut self, facilities: Vec<Facility>) -> Result<usize> {
        let snapshot = DatasetSnapshot::new(facilities, self.config.filter.region.as_deref())?;
        let count = snapshot.len();

        if self.ready {
            self.markers.clear(&mut self.map);
            self.labels.clear(&mut self.map);
            self.clusters.clear(&mut self.map);
        }
        if let Some(open) = self.popups.active_facility() {
            if !snapshot.contains(open) {
                self.close_popup();
            }
        }
        self.snapshot = Some(snapshot);

        if self.ready {
            self.refresh_now();
        }
        Ok(count)
    }

    /// Parse public-data JSON records and load them as the snapshot.
    pub fn load_public_records(&mut self, json: &str) -> Result<usize> {
        let facilities = parse_public_records(json)?;
        self.load_snapshot(facilities)
    }

    pub fn snapshot(&self) -> Option<&DatasetSnapshot> {
        self.snapshot.as_ref()
    }

    fn lookup(&self, id: FacilityId) -> Result<&Facility> {
        match &self.snapshot {
            Some(snapshot) => snapshot.lookup(id),
            None => Err(EngineError::LookupFailure(id)),
        }
    }

    // ========================================================================
    // Map events
    // ========================================================================

    /// Handle an event delivered by the map provider at time `now`.
    ///
    /// Viewport motion is debounced; everything else takes effect immediately.
    /// Events arriving before [`attach`](Self::attach) are ignored.
    pub fn handle_event(&mut self, event: MapEvent, now: Instant) -> Result<()> {
        if !self.ready {
            debug!("[Engine] Ignoring {:?} before attach", event.kind());
            return Ok(());
        }

        match event {
            MapEvent::CenterChanged(center) => {
                self.viewport.center = center;
                self.debouncer.schedule(self.viewport, now);
            }
            MapEvent::ZoomChanged(level) => {
                self.viewport.zoom_level = level;
                self.labels.on_zoom(level, &mut self.map);
                self.debouncer.schedule(self.viewport, now);
            }
            MapEvent::Click(_) => {
                self.close_popup();
            }
            MapEvent::MarkerOver(id) => self.hover_facility(id),
            MapEvent::MarkerOut(id) => self.leave_facility(id),
            MapEvent::MarkerClick(id) => {
                self.open_popup(id)?;
            }
            MapEvent::ClusterOver(key) => self.clusters.hover(key, true, &mut self.map),
            MapEvent::ClusterOut(key) => self.clusters.hover(key, false, &mut self.map),
            MapEvent::ClusterClick(key) => {
                if let Some(next) = self.clusters.click(key, &self.viewport) {
                    debug!("[Engine] Cluster {:?} -> level {}", key, next.zoom_level);
                    self.map.set_level(next.zoom_level);
                    self.map.set_center(next.center);
                    self.viewport = next;
                    self.labels.on_zoom(next.zoom_level, &mut self.map);
                    self.debouncer.schedule(self.viewport, now);
                }
            }
        }
        Ok(())
    }

    /// Apply a debounced viewport change if its quiet period is over.
    /// Returns whether the visible set was recomputed.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.debouncer.poll(now) {
            Some(viewport) => {
                self.refresh(viewport);
                true
            }
            None => false,
        }
    }

    /// When the next [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    fn refresh_now(&mut self) {
        self.debouncer.cancel();
        self.refresh(self.viewport);
    }

    fn refresh(&mut self, viewport: ViewportState) {
        if !self.ready {
            return;
        }

        let visible: Vec<Facility> = match &self.snapshot {
            Some(snapshot) => snapshot.query_visible(&viewport).into_iter().cloned().collect(),
            None => Vec::new(),
        };

        if let Some(current) = self.highlight.current() {
            if !visible.iter().any(|f| f.id == current) && self.highlight.forget(current) {
                self.events.push(EngineEvent::HighlightChanged(None));
            }
        }

        self.markers.reconcile(&visible, self.highlight.current(), &mut self.map);
        if let Some(current) = self.highlight.current() {
            let emphasize = HighlightChange { restore: None, emphasize: Some(current) };
            self.markers.apply_highlight(&emphasize, &mut self.map);
        }
        self.clusters.rebuild(&visible, viewport.zoom_level, &mut self.map);
        self.labels.sync(&visible, viewport.zoom_level, &mut self.map);

        let changed = visible.len() != self.visible.len()
            || visible.iter().zip(&self.visible).any(|(a, b)| a.id != b.id);
        self.visible = visible;
        if changed {
            debug!("[Engine] Visible set now {} facilities", self.visible.len());
            self.events.push(EngineEvent::VisibleFacilitiesChanged(
                self.visible.iter().map(|f| f.id).collect(),
            ));
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Pan to a facility and open its popup (list click).
    ///
    /// Before the session is attached the selection is remembered and applied on
    /// attach; `Ok(None)` is returned in that case. A facility without coordinates
    /// cannot be shown on the map: the viewport and popup stay as they are and
    /// `Ok(None)` is returned.
    pub fn select_facility(&mut self, id: FacilityId) -> Result<Option<PopupDescriptor>> {
        let facility = self.lookup(id)?;
        if !facility.has_valid_coordinates() {
            warn!("[Engine] Facility {} has no position, not selecting", id);
            return Ok(None);
        }
        let position = facility.coordinate();

        if !self.ready {
            info!("[Engine] Deferring selection of {} until attach", id);
            self.pending_selection = Some(id);
            self.events.push(EngineEvent::Warning(EngineError::RenderTargetNotReady));
            return Ok(None);
        }

        self.map.set_center(position);
        self.viewport.center = position;
        self.refresh_now();
        self.open_popup(id).map(Some)
    }

    /// Highlight a facility (list or marker hover).
    pub fn hover_facility(&mut self, id: FacilityId) {
        let change = self.highlight.set_highlight(Some(id));
        self.apply_highlight(change);
    }

    /// Mouse left a facility. Ignored if another facility is highlighted by now.
    pub fn leave_facility(&mut self, id: FacilityId) {
        let change = self.highlight.leave(id);
        self.apply_highlight(change);
    }

    fn apply_highlight(&mut self, change: HighlightChange) {
        if change.is_empty() {
            return;
        }
        self.markers.apply_highlight(&change, &mut self.map);
        self.events.push(EngineEvent::HighlightChanged(self.highlight.current()));
    }

    fn open_popup(&mut self, id: FacilityId) -> Result<PopupDescriptor> {
        let Some(snapshot) = &self.snapshot else {
            return Err(EngineError::LookupFailure(id));
        };
        let previous = self.popups.active_facility();
        let descriptor = self.popups.open(id, snapshot, &mut self.map)?;

        if let Some(previous) = previous {
            self.events.push(EngineEvent::PopupClosed(previous));
        }
        self.events.push(EngineEvent::PopupOpened(descriptor.clone()));
        Ok(descriptor)
    }

    /// Close the open popup, if any.
    pub fn close_popup(&mut self) -> Option<FacilityId> {
        let closed = self.popups.close(&mut self.map)?;
        self.events.push(EngineEvent::PopupClosed(closed));
        Some(closed)
    }

    pub fn set_action_callback(&mut self, callback: ActionCallback) {
        self.popups.set_callback(callback);
    }

    /// Grow the search radius by `delta_meters` around the current center and
    /// schedule a refilter. Returns the new radius.
    ///
    /// The zoom level only follows when `couple_zoom_to_radius` is set.
    pub fn increase_radius(&mut self, delta_meters: f64, now: Instant) -> f64 {
        if !delta_meters.is_finite() || delta_meters <= 0.0 {
            warn!("[Engine] Ignoring radius change of {}", delta_meters);
            return self.viewport.radius_meters;
        }
        self.viewport.radius_meters += delta_meters;

        if self.config.filter.couple_zoom_to_radius {
            let level = zoom_for_radius(self.viewport.radius_meters);
            self.viewport.zoom_level = level;
            if self.ready {
                self.map.set_level(level);
                self.labels.on_zoom(level, &mut self.map);
            }
        }

        info!("[Engine] Radius now {:.0}m", self.viewport.radius_meters);
        self.debouncer.schedule(self.viewport, now);
        self.viewport.radius_meters
    }

    /// Grow the search radius by the configured step.
    pub fn step_radius(&mut self, now: Instant) -> f64 {
        self.increase_radius(self.config.filter.radius_step_meters, now)
    }

    // ========================================================================
    // Location and routes
    // ========================================================================

    /// Resolve the user location and recenter on it.
    ///
    /// A device fix recenters the map once; before attach the recenter is deferred.
    /// A fallback fix is reported as a warning and does not move the map.
    pub async fn acquire_location(&mut self, geolocation: &dyn GeolocationProvider) -> LocationFix {
        let first = self.location.fix().is_none();
        let fix = self.location.acquire(geolocation).await;
        if !first {
            return fix;
        }

        if let Some(warning) = &fix.warning {
            self.events.push(EngineEvent::Warning(warning.clone()));
        }
        if fix.source == LocationSource::Device {
            self.recenter(fix.coordinate);
        }
        fix
    }

    /// Move the map to `center` and refilter at once, e.g. for a geocoded address
    /// search. Before attach the move is applied on attach.
    ///
    /// Returns false, leaving the viewport untouched, if `center` is not a valid
    /// position.
    pub fn recenter(&mut self, center: Coordinate) -> bool {
        if !center.is_valid() {
            warn!(
                "[Engine] Ignoring recenter to invalid position {}, {}",
                center.latitude, center.longitude
            );
            return false;
        }
        if !self.ready {
            debug!("[Engine] Deferring recenter until attach");
            self.pending_recenter = Some(center);
            return true;
        }

        self.map.set_center(center);
        self.viewport.center = center;
        self.refresh_now();
        true
    }

    pub fn user_location(&self) -> Option<Coordinate> {
        self.location.current()
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.ready {
            Ok(())
        } else {
            Err(EngineError::RenderTargetNotReady)
        }
    }

    /// Start a route from the user location to a facility.
    pub fn request_route(&mut self, id: FacilityId) -> Result<RouteTicket> {
        self.ensure_ready()?;
        let facility = self.lookup(id)?.clone();
        let origin = self.location.current();

        let ticket = self.routes.begin(origin, &facility);
        self.events.push(EngineEvent::RouteStateChanged(self.routes.state().clone()));
        ticket
    }

    /// Apply the routing response for a ticket from [`request_route`](Self::request_route).
    ///
    /// The map provider reports the fitted viewport through its usual events.
    pub fn complete_route(
        &mut self,
        ticket: &RouteTicket,
        response: std::result::Result<Vec<Coordinate>, RoutingError>,
    ) -> Result<RouteOutcome> {
        self.ensure_ready()?;
        let outcome = self.routes.complete(ticket, response, &mut self.map);
        if !matches!(outcome, Ok(RouteOutcome::Discarded { .. })) {
            self.events.push(EngineEvent::RouteStateChanged(self.routes.state().clone()));
        }
        outcome
    }

    /// Fetch and draw a route to a facility.
    pub async fn find_route(&mut self, id: FacilityId, service: &dyn RoutingService) -> Result<RouteOutcome> {
        let ticket = self.request_route(id)?;
        let response = service.route(ticket.origin, ticket.destination).await;
        self.complete_route(&ticket, response)
    }

    /// Remove the drawn route.
    pub fn clear_route(&mut self) {
        self.routes.clear(&mut self.map);
        self.events.push(EngineEvent::RouteStateChanged(RouteState::Idle));
    }

    pub fn route_state(&self) -> &RouteState {
        self.routes.state()
    }

    /// External directions link to a facility, starting at the user location or,
    /// without one, the map center.
    pub fn directions_url(&self, id: FacilityId, provider: DirectionsProvider) -> Result<Url> {
        let facility = self.lookup(id)?;
        let origin = self.location.current().unwrap_or(self.viewport.center);
        directions_url(provider, facility, origin)
            .map_err(|e| EngineError::RouteUnavailable(format!("invalid directions link: {}", e)))
    }

    // ========================================================================
    // State access
    // ========================================================================

    /// Take the events produced since the last drain.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn visible_facilities(&self) -> &[Facility] {
        &self.visible
    }

    pub fn viewport(&self) -> ViewportState {
        self.viewport
    }

    pub fn highlighted(&self) -> Option<FacilityId> {
        self.highlight.current()
    }

    pub fn active_popup(&self) -> Option<FacilityId> {
        self.popups.active_facility()
    }

    pub fn markers(&self) -> &MarkerLifecycleManager {
        &self.markers
    }

    pub fn clusters(&self) -> &ClusterManager {
        &self.clusters
    }

    pub fn labels(&self) -> &OverlayLabelController {
        &self.labels
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut M {
        &mut self.map
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Release every listener and render object. The engine can be attached again.
    ///
    /// The popup, route and highlight are reported as closed, idle and cleared.
    pub fn teardown(&mut self) {
        self.debouncer.cancel();
        let listeners = self.subscriptions.dispose_all(&mut self.map);
        let markers = self.markers.clear(&mut self.map);
        self.clusters.clear(&mut self.map);
        self.labels.clear(&mut self.map);
        self.close_popup();
        if *self.routes.state() != RouteState::Idle || self.routes.active().is_some() {
            self.clear_route();
        }
        if let Some(current) = self.highlight.current() {
            if self.highlight.forget(current) {
                self.events.push(EngineEvent::HighlightChanged(None));
            }
        }
        self.pending_recenter = None;
        self.pending_selection = None;
        self.visible.clear();
        self.ready = false;
        info!("[Engine] Torn down: {} listeners, {} markers released", listeners, markers);
    }
}
