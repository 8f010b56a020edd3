//! Viewport filtering.
//!
//! [`compute_visible`] is the pure containment query: facilities within the viewport
//! radius of its center. Viewport motion arrives in bursts, so the engine runs it
//! through a [`Debouncer`] that coalesces a burst into one evaluation of the most
//! recent viewport.

use std::time::{Duration, Instant};

use crate::geo_utils::within_radius;
use crate::{Facility, ViewportState};

/// Configuration for viewport filtering.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Initial search radius around the map center (default: 800m)
    pub radius_meters: f64,
    /// Radius added by one "increase radius" command (default: 200m)
    pub radius_step_meters: f64,
    /// Quiet period before a viewport change is applied (default: 300ms)
    pub debounce: Duration,
    /// Address substring applied once at snapshot load (default: "인천")
    pub region: Option<String>,
    /// Also adjust the zoom level when the radius changes (default: false)
    pub couple_zoom_to_radius: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            radius_meters: 800.0,
            radius_step_meters: 200.0,
            debounce: Duration::from_millis(300),
            region: Some("인천".to_string()),
            couple_zoom_to_radius: false,
        }
    }
}

/// Facilities within `viewport.radius_meters` of the viewport center, in input order.
///
/// Pure: no side effects, safe to call with literal inputs. Facilities without valid
/// coordinates are never visible.
///
/// # Example
/// ```
/// use parkmap::{Coordinate, Facility, FacilityId, PriceType, ViewportState, compute_visible};
///
/// let lots = vec![Facility::new(FacilityId(1), "A", 37.456, 126.705, PriceType::Free, 4)];
/// let view = ViewportState::new(Coordinate::new(37.456, 126.705), 100.0, 3);
/// assert_eq!(compute_visible(&lots, &view).len(), 1);
/// ```
pub fn compute_visible(facilities: &[Facility], viewport: &ViewportState) -> Vec<Facility> {
    facilities
        .iter()
        .filter(|f| is_visible(f, viewport))
        .cloned()
        .collect()
}

/// Parallel variant of [`compute_visible`] for large snapshots. Same result and order.
#[cfg(feature = "parallel")]
pub fn compute_visible_parallel(facilities: &[Facility], viewport: &ViewportState) -> Vec<Facility> {
    use rayon::prelude::*;

    facilities
        .par_iter()
        .filter(|f| is_visible(f, viewport))
        .cloned()
        .collect()
}

#[inline]
fn is_visible(facility: &Facility, viewport: &ViewportState) -> bool {
    facility.has_valid_coordinates()
        && within_radius(&facility.coordinate(), &viewport.center, viewport.radius_meters)
}

/// Zoom level that comfortably shows a search circle of the given radius.
pub fn zoom_for_radius(radius_meters: f64) -> u32 {
    if radius_meters <= 500.0 {
        3
    } else if radius_meters <= 1000.0 {
        5
    } else if radius_meters <= 2000.0 {
        6
    } else if radius_meters <= 4000.0 {
        7
    } else if radius_meters <= 8000.0 {
        8
    } else {
        10
    }
}

// ============================================================================
// Debouncing
// ============================================================================

/// Most-recent-wins debouncer driven by explicit timestamps.
///
/// Each [`schedule`](Self::schedule) replaces the pending value and restarts the quiet
/// period. [`poll`](Self::poll) hands out the pending value once the quiet period
/// has elapsed. A value that was replaced is never returned.
///
/// The caller owns the clock: hosts sleep until [`deadline`](Self::deadline) and then
/// poll, tests pass literal instants.
///
/// # Example
/// ```
/// use std::time::{Duration, Instant};
/// use parkmap::Debouncer;
///
/// let mut debouncer = Debouncer::new(Duration::from_millis(300));
/// let t0 = Instant::now();
///
/// debouncer.schedule("first", t0);
/// debouncer.schedule("second", t0 + Duration::from_millis(100));
///
/// assert_eq!(debouncer.poll(t0 + Duration::from_millis(350)), None);
/// assert_eq!(debouncer.poll(t0 + Duration::from_millis(400)), Some("second"));
/// ```
#[derive(Debug)]
pub struct Debouncer<T> {
    quiet_period: Duration,
    pending: Option<Pending<T>>,
    generation: u64,
}

#[derive(Debug)]
struct Pending<T> {
    value: T,
    deadline: Instant,
}

impl<T> Debouncer<T> {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            pending: None,
            generation: 0,
        }
    }

    /// Schedule `value`, superseding anything pending. Returns the schedule generation.
    pub fn schedule(&mut self, value: T, now: Instant) -> u64 {
        self.generation += 1;
        self.pending = Some(Pending {
            value,
            deadline: now + self.quiet_period,
        });
        self.generation
    }

    /// Take the pending value if its quiet period has elapsed at `now`.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some(p) if p.deadline <= now => self.pending.take().map(|p| p.value),
            _ => None,
        }
    }

    /// Take the pending value immediately, regardless of the deadline.
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|p| p.value)
    }

    /// Drop the pending value.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// When the pending value becomes due.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Number of schedules so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
