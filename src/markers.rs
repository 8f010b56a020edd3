//! Marker lifecycle.
//!
//! [`MarkerLifecycleManager`] owns one marker per visible facility and keeps that set in
//! step with the visible set through a key-based diff: markers for facilities that are
//! still visible are left alone, so nothing flickers while the map pans.

use std::collections::{BTreeMap, HashSet};

use log::debug;

use crate::highlight::HighlightChange;
use crate::map::{MapProvider, MarkerIcon, MarkerStyle, RenderId};
use crate::{Coordinate, Facility, FacilityId, PriceType};

/// Marker sizing and stacking.
#[derive(Debug, Clone)]
pub struct MarkerConfig {
    /// Icon size at rest in pixels (default: 40)
    pub base_size: u32,
    /// Icon size while highlighted in pixels (default: 90)
    pub highlight_size: u32,
    /// Stacking order at rest (default: 0)
    pub base_z_index: i32,
    /// Stacking order while highlighted (default: 10)
    pub highlight_z_index: i32,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            base_size: 40,
            highlight_size: 90,
            base_z_index: 0,
            highlight_z_index: 10,
        }
    }
}

impl MarkerConfig {
    pub fn style_for(&self, price_type: PriceType, highlighted: bool) -> MarkerStyle {
        MarkerStyle {
            icon: MarkerIcon { price_type, highlighted },
            size: if highlighted { self.highlight_size } else { self.base_size },
            z_index: if highlighted { self.highlight_z_index } else { self.base_z_index },
        }
    }
}

/// A rendered marker and its current visual state.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerHandle {
    pub render: RenderId,
    pub position: Coordinate,
    pub price_type: PriceType,
    pub style: MarkerStyle,
}

impl MarkerHandle {
    pub fn is_highlighted(&self) -> bool {
        self.style.icon.highlighted
    }
}

/// What a reconcile pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<FacilityId>,
    pub updated: Vec<FacilityId>,
    pub removed: Vec<FacilityId>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Owns the facility markers, keyed by facility id.
#[derive(Debug, Default)]
pub struct MarkerLifecycleManager {
    config: MarkerConfig,
    handles: BTreeMap<FacilityId, MarkerHandle>,
}

impl MarkerLifecycleManager {
    pub fn new(config: MarkerConfig) -> Self {
        Self {
            config,
            handles: BTreeMap::new(),
        }
    }

    /// Diff the current markers against `visible`.
    ///
    /// - facilities no longer visible: marker destroyed, handle removed
    /// - newly visible facilities: marker created in the resting style
    /// - still visible: untouched unless their highlight state differs from `highlighted`
    ///
    /// Facilities without valid coordinates are skipped silently.
    pub fn reconcile(
        &mut self,
        visible: &[Facility],
        highlighted: Option<FacilityId>,
        map: &mut dyn MapProvider,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let keep: HashSet<FacilityId> = visible
            .iter()
            .filter(|f| f.has_valid_coordinates())
            .map(|f| f.id)
            .collect();

        let stale: Vec<FacilityId> = self
            .handles
            .keys()
            .filter(|id| !keep.contains(id))
            .copied()
            .collect();
        for id in stale {
            if let Some(handle) = self.handles.remove(&id) {
                map.destroy_marker(handle.render);
                report.removed.push(id);
            }
        }

        for facility in visible.iter().filter(|f| f.has_valid_coordinates()) {
            match self.handles.get_mut(&facility.id) {
                Some(handle) => {
                    let should_highlight = highlighted == Some(facility.id);
                    if handle.is_highlighted() != should_highlight {
                        handle.style = self.config.style_for(handle.price_type, should_highlight);
                        map.restyle_marker(handle.render, &handle.style);
                        report.updated.push(facility.id);
                    }
                }
                None => {
                    let style = self.config.style_for(facility.price_type, false);
                    let position = facility.coordinate();
                    let render = map.create_marker(facility.id, position, &style);
                    self.handles.insert(
                        facility.id,
                        MarkerHandle {
                            render,
                            position,
                            price_type: facility.price_type,
                            style,
                        },
                    );
                    report.created.push(facility.id);
                }
            }
        }

        debug!(
            "[Markers] Reconciled: +{} ~{} -{} (now {})",
            report.created.len(),
            report.updated.len(),
            report.removed.len(),
            self.handles.len()
        );
        report
    }

    /// Apply a highlight transition to the markers this manager owns.
    ///
    /// The restored marker goes back to baseline before the new one is emphasized.
    /// Ids without a marker are ignored.
    pub fn apply_highlight(&mut self, change: &HighlightChange, map: &mut dyn MapProvider) {
        if let Some(id) = change.restore {
            self.set_highlighted(id, false, map);
        }
        if let Some(id) = change.emphasize {
            self.set_highlighted(id, true, map);
        }
    }

    fn set_highlighted(&mut self, id: FacilityId, highlighted: bool, map: &mut dyn MapProvider) {
        let Some(handle) = self.handles.get_mut(&id) else {
            return;
        };
        if handle.is_highlighted() == highlighted {
            return;
        }
        handle.style = self.config.style_for(handle.price_type, highlighted);
        map.restyle_marker(handle.render, &handle.style);
    }

    pub fn handle(&self, id: FacilityId) -> Option<&MarkerHandle> {
        self.handles.get(&id)
    }

    /// Facility ids that currently have a marker, ascending.
    pub fn keys(&self) -> Vec<FacilityId> {
        self.handles.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Destroy every marker.
    pub fn clear(&mut self, map: &mut dyn MapProvider) -> usize {
        let count = self.handles.len();
        for (_, handle) in std::mem::take(&mut self.handles) {
            map.destroy_marker(handle.render);
        }
        count
    }
}
