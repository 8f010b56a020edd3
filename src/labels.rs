//! Availability labels.
//!
//! Every visible facility gets a small label with its name and free spot count,
//! colored by availability. Labels are only shown at close zoom levels. Zooming
//! toggles their visibility; it never destroys or recreates them.

use std::collections::{BTreeMap, HashSet};

use log::debug;

use crate::map::{MapProvider, RenderId};
use crate::markers::ReconcileReport;
use crate::{Coordinate, Facility, FacilityId};

/// Label color bucket by available spots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AvailabilityColor {
    Urgent,
    Caution,
    Ample,
}

impl AvailabilityColor {
    /// Bucket for `spots` with the default thresholds (10 and 20).
    pub fn for_spots(spots: u32) -> Self {
        LabelConfig::default().color_for(spots)
    }

    pub fn css_name(&self) -> &'static str {
        match self {
            AvailabilityColor::Urgent => "red",
            AvailabilityColor::Caution => "orange",
            AvailabilityColor::Ample => "green",
        }
    }
}

/// Configuration for availability labels.
#[derive(Debug, Clone)]
pub struct LabelConfig {
    /// Labels are shown at this level and closer (default: 2)
    pub max_visible_level: u32,
    /// Spots at or below which a label is urgent (default: 10)
    pub urgent_max: u32,
    /// Spots at or below which a label is caution (default: 20)
    pub caution_max: u32,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            max_visible_level: 2,
            urgent_max: 10,
            caution_max: 20,
        }
    }
}

impl LabelConfig {
    pub fn color_for(&self, spots: u32) -> AvailabilityColor {
        if spots <= self.urgent_max {
            AvailabilityColor::Urgent
        } else if spots <= self.caution_max {
            AvailabilityColor::Caution
        } else {
            AvailabilityColor::Ample
        }
    }

    pub fn is_visible_at(&self, level: u32) -> bool {
        level <= self.max_visible_level
    }
}

/// Content of one availability label.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSpec {
    pub facility_id: FacilityId,
    pub position: Coordinate,
    pub name: String,
    pub available_spots: u32,
    pub color: AvailabilityColor,
}

impl LabelSpec {
    pub fn for_facility(facility: &Facility, config: &LabelConfig) -> Self {
        Self {
            facility_id: facility.id,
            position: facility.coordinate(),
            name: facility.name.clone(),
            available_spots: facility.available_spots,
            color: config.color_for(facility.available_spots),
        }
    }

    /// Second label line, e.g. "잔여: 12".
    pub fn spots_text(&self) -> String {
        format!("잔여: {}", self.available_spots)
    }
}

#[derive(Debug)]
struct RenderedLabel {
    render: RenderId,
    spec: LabelSpec,
}

/// Owns the availability labels, one per visible facility.
#[derive(Debug, Default)]
pub struct OverlayLabelController {
    config: LabelConfig,
    labels: BTreeMap<FacilityId, RenderedLabel>,
    shown: bool,
}

impl OverlayLabelController {
    pub fn new(config: LabelConfig) -> Self {
        Self {
            config,
            labels: BTreeMap::new(),
            shown: false,
        }
    }

    pub fn config(&self) -> &LabelConfig {
        &self.config
    }

    /// Bring labels in line with `visible`, created hidden or shown according to `level`.
    /// Replaced labels are reported as `updated`.
    pub fn sync(&mut self, visible: &[Facility], level: u32, map: &mut dyn MapProvider) -> ReconcileReport {
        self.on_zoom(level, map);

        let keep: HashSet<FacilityId> = visible
            .iter()
            .filter(|f| f.has_valid_coordinates())
            .map(|f| f.id)
            .collect();
        let stale: Vec<FacilityId> = self.labels.keys().filter(|id| !keep.contains(id)).copied().collect();
        for id in &stale {
            if let Some(label) = self.labels.remove(id) {
                map.destroy_overlay(label.render);
            }
        }

        let mut report = ReconcileReport {
            removed: stale,
            ..ReconcileReport::default()
        };
        for facility in visible.iter().filter(|f| f.has_valid_coordinates()) {
            let spec = LabelSpec::for_facility(facility, &self.config);
            match self.labels.get(&facility.id) {
                Some(existing) if existing.spec == spec => continue,
                Some(existing) => {
                    map.destroy_overlay(existing.render);
                    report.updated.push(facility.id);
                }
                None => report.created.push(facility.id),
            }
            let render = map.create_overlay(&spec, self.shown);
            self.labels.insert(facility.id, RenderedLabel { render, spec });
        }

        debug!(
            "[Labels] Synced: +{} ~{} -{} (now {}, shown={})",
            report.created.len(),
            report.updated.len(),
            report.removed.len(),
            self.labels.len(),
            self.shown
        );
        report
    }

    /// Show or hide every label for `level`. Returns whether visibility changed.
    pub fn on_zoom(&mut self, level: u32, map: &mut dyn MapProvider) -> bool {
        let shown = self.config.is_visible_at(level);
        if shown == self.shown {
            return false;
        }
        self.shown = shown;
        for label in self.labels.values() {
            map.set_overlay_visible(label.render, shown);
        }
        debug!("[Labels] Level {} -> labels {}", level, if shown { "shown" } else { "hidden" });
        true
    }

    pub fn is_shown(&self) -> bool {
        self.shown
    }

    pub fn spec(&self, id: FacilityId) -> Option<&LabelSpec> {
        self.labels.get(&id).map(|label| &label.spec)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Destroy every label.
    pub fn clear(&mut self, map: &mut dyn MapProvider) {
        for (_, label) in std::mem::take(&mut self.labels) {
            map.destroy_overlay(label.render);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::testing::RecordingMap;
    use crate::viewport::compute_visible;
    use crate::{PriceType, ViewportState};

    fn nearby_lots() -> Vec<Facility> {
        vec![
            Facility::new(FacilityId(1), "One", 37.456, 126.705, PriceType::Paid, 5),
            Facility::new(FacilityId(2), "Two", 37.460, 126.710, PriceType::Free, 30),
        ]
    }

    #[test]
    fn test_color_thresholds() {
        assert_eq!(AvailabilityColor::for_spots(0), AvailabilityColor::Urgent);
        assert_eq!(AvailabilityColor::for_spots(10), AvailabilityColor::Urgent);
        assert_eq!(AvailabilityColor::for_spots(11), AvailabilityColor::Caution);
        assert_eq!(AvailabilityColor::for_spots(20), AvailabilityColor::Caution);
        assert_eq!(AvailabilityColor::for_spots(21), AvailabilityColor::Ample);
        assert_eq!(AvailabilityColor::Urgent.css_name(), "red");
    }

    #[test]
    fn test_labels_for_visible_lots() {
        let mut map = RecordingMap::new(Coordinate::new(37.456, 126.705), 2);
        let mut labels = OverlayLabelController::new(LabelConfig::default());
        let view = ViewportState::new(Coordinate::new(37.456, 126.705), 500.0, 2);

        let visible = compute_visible(&nearby_lots(), &view);
        labels.sync(&visible, view.zoom_level, &mut map);

        let (spec, shown) = map.overlay_for(FacilityId(1)).unwrap();
        assert_eq!(spec.color, AvailabilityColor::Urgent);
        assert_eq!(spec.spots_text(), "잔여: 5");
        assert!(*shown);
        assert!(map.overlay_for(FacilityId(2)).is_none());
        assert_eq!(
            LabelSpec::for_facility(&nearby_lots()[1], labels.config()).color,
            AvailabilityColor::Ample
        );
    }

    #[test]
    fn test_zoom_only_toggles() {
        let mut map = RecordingMap::new(Coordinate::new(37.456, 126.705), 2);
        let mut labels = OverlayLabelController::new(LabelConfig::default());
        labels.sync(&nearby_lots(), 2, &mut map);
        assert_eq!(map.overlays_created, 2);

        assert!(labels.on_zoom(3, &mut map));
        assert!(map.overlays.values().all(|(_, shown)| !shown));

        assert!(!labels.on_zoom(5, &mut map));
        assert!(labels.on_zoom(1, &mut map));
        assert!(map.overlays.values().all(|(_, shown)| *shown));

        assert_eq!(map.overlays_created, 2);
        assert_eq!(map.overlays.len(), 2);
    }

    #[test]
    fn test_labels_created_hidden_when_zoomed_out() {
        let mut map = RecordingMap::new(Coordinate::new(37.456, 126.705), 5);
        let mut labels = OverlayLabelController::new(LabelConfig::default());
        labels.sync(&nearby_lots(), 5, &mut map);

        assert!(!labels.is_shown());
        assert!(map.overlays.values().all(|(_, shown)| !shown));
    }

    #[test]
    fn test_sync_follows_visible_set() {
        let mut map = RecordingMap::new(Coordinate::new(37.456, 126.705), 2);
        let mut labels = OverlayLabelController::new(LabelConfig::default());
        let all = nearby_lots();

        labels.sync(&all, 2, &mut map);
        labels.sync(&all[..1], 2, &mut map);
        assert_eq!(labels.len(), 1);
        assert!(map.overlay_for(FacilityId(2)).is_none());

        // retained label is not recreated
        assert_eq!(map.overlays_created, 2);

        let mut fewer_spots = all[0].clone();
        fewer_spots.available_spots = 2;
        let report = labels.sync(&[fewer_spots, all[1].clone()], 2, &mut map);
        assert_eq!(report.created, vec![FacilityId(2)]);
        assert_eq!(report.updated, vec![FacilityId(1)]);
        assert!(report.removed.is_empty());
        assert_eq!(map.overlays.len(), 2);

        labels.clear(&mut map);
        assert!(map.overlays.is_empty());
    }
}
