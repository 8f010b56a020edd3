//! Route overlay.
//!
//! [`RouteOverlayController`] fetches a driving route from a [`RoutingService`] and
//! keeps at most one route polyline on the map.
//!
//! Requests are numbered. [`begin`](RouteOverlayController::begin) hands out a ticket
//! for the newest request and [`complete`](RouteOverlayController::complete) applies a
//! response only if its token is still the newest, so a slow response for an older
//! request can never replace a newer route. Hosts that run the fetch themselves use
//! the two halves directly; [`find_route`](RouteOverlayController::find_route) does
//! both in one call.

use futures::future::BoxFuture;
use log::{debug, info, warn};
use thiserror::Error;

use crate::geo_utils::polyline_length;
use crate::map::{MapProvider, PolylineStyle, RenderId};
use crate::{Bounds, Coordinate, EngineError, Facility, FacilityId, Result};

/// Failure reported by a routing service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RoutingError {
    #[error("No route between origin and destination")]
    NoRoute,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Routing request timed out")]
    Timeout,
}

/// Driving directions between two coordinates.
pub trait RoutingService {
    /// Ordered path from `origin` to `destination`.
    fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> BoxFuture<'_, std::result::Result<Vec<Coordinate>, RoutingError>>;
}

/// Route lifecycle as seen by the host.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RouteState {
    #[default]
    Idle,
    Loading { facility: FacilityId },
    Active { facility: FacilityId, distance_meters: f64 },
    Error { message: String },
}

/// A started route request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteTicket {
    pub token: u64,
    pub facility: FacilityId,
    pub origin: Coordinate,
    pub destination: Coordinate,
}

/// The route currently drawn on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveRoute {
    pub facility: FacilityId,
    pub render: RenderId,
    pub path: Vec<Coordinate>,
    pub bounds: Bounds,
    pub distance_meters: f64,
}

/// Result of completing a route request.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// The response was drawn and the viewport fitted to it.
    Applied { facility: FacilityId, bounds: Bounds, distance_meters: f64 },
    /// A newer request was started; the response was dropped unseen.
    Discarded { token: u64 },
}

/// Owns the route polyline.
#[derive(Debug, Default)]
pub struct RouteOverlayController {
    style: PolylineStyle,
    last_token: u64,
    pending: Option<u64>,
    active: Option<ActiveRoute>,
    state: RouteState,
}

impl RouteOverlayController {
    pub fn new(style: PolylineStyle) -> Self {
        Self {
            style,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &RouteState {
        &self.state
    }

    pub fn active(&self) -> Option<&ActiveRoute> {
        self.active.as_ref()
    }

    /// Whether `token` is the newest outstanding request.
    pub fn is_current(&self, token: u64) -> bool {
        self.pending == Some(token)
    }

    /// Start a route request from `origin` to `facility`.
    ///
    /// Fails with `LocationUnavailable` if there is no origin; nothing is drawn or
    /// removed in that case. Every call, failed or not, supersedes any outstanding
    /// request.
    pub fn begin(&mut self, origin: Option<Coordinate>, facility: &Facility) -> Result<RouteTicket> {
        let Some(origin) = origin else {
            warn!("[Route] No origin for route to {}", facility.id);
            if let Some(superseded) = self.pending.take() {
                debug!("[Route] Request {} superseded by failed request", superseded);
            }
            let err = EngineError::LocationUnavailable("no origin for route".to_string());
            self.state = RouteState::Error { message: err.to_string() };
            return Err(err);
        };

        self.last_token += 1;
        if let Some(superseded) = self.pending.replace(self.last_token) {
            debug!("[Route] Request {} superseded by {}", superseded, self.last_token);
        }
        self.state = RouteState::Loading { facility: facility.id };

        Ok(RouteTicket {
            token: self.last_token,
            facility: facility.id,
            origin,
            destination: facility.coordinate(),
        })
    }

    /// Apply the routing response for `ticket`.
    ///
    /// Stale responses are discarded without touching the map or the state. A failed
    /// or empty response sets the error state and leaves any drawn route in place.
    /// A valid path is drawn first and the previous polyline removed after, then the
    /// viewport is fitted to the new path.
    pub fn complete(
        &mut self,
        ticket: &RouteTicket,
        response: std::result::Result<Vec<Coordinate>, RoutingError>,
        map: &mut dyn MapProvider,
    ) -> Result<RouteOutcome> {
        if !self.is_current(ticket.token) {
            debug!("[Route] Discarding stale response {} (current {:?})", ticket.token, self.pending);
            return Ok(RouteOutcome::Discarded { token: ticket.token });
        }
        self.pending = None;

        let path = match response {
            Ok(path) => path,
            Err(e) => return Err(self.fail(ticket.facility, e.to_string())),
        };
        if path.is_empty() {
            return Err(self.fail(ticket.facility, "empty path".to_string()));
        }
        if path.iter().any(|p| !p.is_valid()) {
            return Err(self.fail(ticket.facility, "path contains invalid coordinates".to_string()));
        }
        let Some(bounds) = Bounds::from_points(&path) else {
            return Err(self.fail(ticket.facility, "empty path".to_string()));
        };

        let distance_meters = polyline_length(&path);
        let render = map.create_polyline(&path, &self.style);
        if let Some(previous) = self.active.take() {
            map.destroy_polyline(previous.render);
        }
        map.set_bounds(&bounds);

        info!(
            "[Route] Applied route to {}: {} points, {:.0}m",
            ticket.facility,
            path.len(),
            distance_meters
        );
        self.active = Some(ActiveRoute {
            facility: ticket.facility,
            render,
            path,
            bounds,
            distance_meters,
        });
        self.state = RouteState::Active { facility: ticket.facility, distance_meters };

        Ok(RouteOutcome::Applied { facility: ticket.facility, bounds, distance_meters })
    }

    /// Fetch and apply a route in one call.
    pub async fn find_route(
        &mut self,
        origin: Option<Coordinate>,
        facility: &Facility,
        service: &dyn RoutingService,
        map: &mut dyn MapProvider,
    ) -> Result<RouteOutcome> {
        let ticket = self.begin(origin, facility)?;
        let response = service.route(ticket.origin, ticket.destination).await;
        self.complete(&ticket, response, map)
    }

    /// Remove the drawn route and forget any outstanding request.
    pub fn clear(&mut self, map: &mut dyn MapProvider) {
        if let Some(route) = self.active.take() {
            map.destroy_polyline(route.render);
        }
        self.pending = None;
        self.state = RouteState::Idle;
    }

    fn fail(&mut self, facility: FacilityId, reason: String) -> EngineError {
        warn!("[Route] Route to {} unavailable: {}", facility, reason);
        let err = EngineError::RouteUnavailable(reason);
        self.state = RouteState::Error { message: err.to_string() };
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    use crate::map::testing::RecordingMap;
    use crate::PriceType;

    struct FixedRoute(std::result::Result<Vec<Coordinate>, RoutingError>);

    impl RoutingService for FixedRoute {
        fn route(
            &self,
            _origin: Coordinate,
            _destination: Coordinate,
        ) -> BoxFuture<'_, std::result::Result<Vec<Coordinate>, RoutingError>> {
            futures::future::ready(self.0.clone()).boxed()
        }
    }

    fn lot(id: u64) -> Facility {
        Facility::new(FacilityId(id), "lot", 37.46, 126.71, PriceType::Paid, 5)
    }

    fn path() -> Vec<Coordinate> {
        vec![
            Coordinate::new(37.450, 126.700),
            Coordinate::new(37.455, 126.705),
            Coordinate::new(37.460, 126.710),
        ]
    }

    fn map() -> RecordingMap {
        RecordingMap::new(Coordinate::new(37.456, 126.705), 3)
    }

    fn origin() -> Option<Coordinate> {
        Some(Coordinate::new(37.45, 126.70))
    }

    #[test]
    fn test_missing_origin() {
        let mut map = map();
        let mut routes = RouteOverlayController::default();

        let err = routes.begin(None, &lot(1)).unwrap_err();
        assert!(matches!(err, EngineError::LocationUnavailable(_)));
        assert!(map.polylines.is_empty());
        assert!(matches!(routes.state(), RouteState::Error { .. }));
        // nothing to complete
        let ticket = RouteTicket {
            token: 1,
            facility: FacilityId(1),
            origin: Coordinate::new(0.0, 0.0),
            destination: Coordinate::new(0.0, 0.0),
        };
        assert_eq!(
            routes.complete(&ticket, Ok(path()), &mut map).unwrap(),
            RouteOutcome::Discarded { token: 1 }
        );
        assert!(map.polylines.is_empty());
    }

    #[test]
    fn test_missing_origin_supersedes_outstanding_request() {
        let mut map = map();
        let mut routes = RouteOverlayController::default();

        let outstanding = routes.begin(origin(), &lot(1)).unwrap();
        assert!(routes.begin(None, &lot(2)).is_err());
        assert!(!routes.is_current(outstanding.token));

        let outcome = routes.complete(&outstanding, Ok(path()), &mut map).unwrap();
        assert_eq!(outcome, RouteOutcome::Discarded { token: outstanding.token });
        assert!(map.polylines.is_empty());
        assert!(matches!(routes.state(), RouteState::Error { .. }));
    }

    #[test]
    fn test_applied_route_fits_viewport() {
        let mut map = map();
        let mut routes = RouteOverlayController::default();

        let ticket = routes.begin(origin(), &lot(1)).unwrap();
        assert_eq!(routes.state(), &RouteState::Loading { facility: FacilityId(1) });
        assert_eq!(ticket.destination, Coordinate::new(37.46, 126.71));

        let outcome = routes.complete(&ticket, Ok(path()), &mut map).unwrap();
        let RouteOutcome::Applied { bounds, distance_meters, .. } = outcome else {
            panic!("expected applied route");
        };
        assert_eq!(bounds.min_lat, 37.450);
        assert_eq!(bounds.max_lng, 126.710);
        assert!(distance_meters > 1000.0);

        assert_eq!(map.polylines.len(), 1);
        assert_eq!(map.fitted_bounds, vec![bounds]);
        assert!(matches!(routes.state(), RouteState::Active { .. }));
    }

    #[test]
    fn test_empty_path_keeps_existing_route() {
        let mut map = map();
        let mut routes = RouteOverlayController::default();

        let first = routes.begin(origin(), &lot(1)).unwrap();
        routes.complete(&first, Ok(path()), &mut map).unwrap();
        let drawn = map.polylines.clone();

        let second = routes.begin(origin(), &lot(2)).unwrap();
        let err = routes.complete(&second, Ok(Vec::new()), &mut map).unwrap_err();
        assert!(matches!(err, EngineError::RouteUnavailable(_)));

        assert_eq!(map.polylines, drawn);
        assert_eq!(routes.active().unwrap().facility, FacilityId(1));
        assert!(matches!(routes.state(), RouteState::Error { .. }));
    }

    #[test]
    fn test_service_error_keeps_existing_route() {
        let mut map = map();
        let mut routes = RouteOverlayController::default();

        let first = routes.begin(origin(), &lot(1)).unwrap();
        routes.complete(&first, Ok(path()), &mut map).unwrap();

        let second = routes.begin(origin(), &lot(2)).unwrap();
        let err = routes.complete(&second, Err(RoutingError::Timeout), &mut map).unwrap_err();
        assert_eq!(err, EngineError::RouteUnavailable("Routing request timed out".to_string()));
        assert_eq!(map.polylines.len(), 1);
    }

    #[test]
    fn test_stale_response_discarded() {
        let mut map = map();
        let mut routes = RouteOverlayController::default();

        let slow = routes.begin(origin(), &lot(1)).unwrap();
        let fast = routes.begin(origin(), &lot(2)).unwrap();
        assert!(fast.token > slow.token);

        let newer_path = vec![Coordinate::new(37.44, 126.69), Coordinate::new(37.46, 126.71)];
        routes.complete(&fast, Ok(newer_path.clone()), &mut map).unwrap();

        let outcome = routes.complete(&slow, Ok(path()), &mut map).unwrap();
        assert_eq!(outcome, RouteOutcome::Discarded { token: slow.token });

        assert_eq!(map.polylines.len(), 1);
        assert_eq!(map.polylines.values().next(), Some(&newer_path));
        assert_eq!(routes.active().unwrap().facility, FacilityId(2));
    }

    #[test]
    fn test_replacement_never_leaves_two_polylines() {
        let mut map = map();
        let mut routes = RouteOverlayController::default();

        for id in 1..=3 {
            let ticket = routes.begin(origin(), &lot(id)).unwrap();
            routes.complete(&ticket, Ok(path()), &mut map).unwrap();
            assert_eq!(map.polylines.len(), 1);
        }
        assert_eq!(routes.active().unwrap().facility, FacilityId(3));
    }

    #[test]
    fn test_clear() {
        let mut map = map();
        let mut routes = RouteOverlayController::default();
        let ticket = routes.begin(origin(), &lot(1)).unwrap();
        routes.complete(&ticket, Ok(path()), &mut map).unwrap();

        let pending = routes.begin(origin(), &lot(2)).unwrap();
        routes.clear(&mut map);
        assert!(map.polylines.is_empty());
        assert_eq!(routes.state(), &RouteState::Idle);

        // a response arriving after clear is ignored
        let outcome = routes.complete(&pending, Ok(path()), &mut map).unwrap();
        assert!(matches!(outcome, RouteOutcome::Discarded { .. }));
        assert!(map.polylines.is_empty());
    }

    #[tokio::test]
    async fn test_find_route() {
        let mut map = map();
        let mut routes = RouteOverlayController::default();

        let service = FixedRoute(Ok(path()));
        let outcome = routes.find_route(origin(), &lot(1), &service, &mut map).await.unwrap();
        assert!(matches!(outcome, RouteOutcome::Applied { facility: FacilityId(1), .. }));

        let err = routes.find_route(None, &lot(2), &service, &mut map).await.unwrap_err();
        assert!(matches!(err, EngineError::LocationUnavailable(_)));

        let empty = FixedRoute(Ok(Vec::new()));
        let err = routes.find_route(origin(), &lot(2), &empty, &mut map).await.unwrap_err();
        assert!(matches!(err, EngineError::RouteUnavailable(_)));
        assert_eq!(map.polylines.len(), 1);
    }
}
