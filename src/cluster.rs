//! Marker clustering.
//!
//! Groups visible facilities into a sparse grid of cells whose size grows with the
//! zoom level. A cell with enough facilities becomes a cluster drawn at the average
//! position of its members.
//!
//! Clusters are rebuilt from scratch whenever the marker set changes; nothing about a
//! cluster survives a rebuild.

use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::geo_utils::{compute_center, meters_to_degrees};
use crate::map::{ClusterKey, ClusterSpec, MapProvider, RenderId};
use crate::{Coordinate, Facility, FacilityId, ViewportState};

const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Configuration for clustering
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Lowest zoom level at which clustering applies (default: 2)
    pub min_level: u32,
    /// Minimum facilities in a cell to form a cluster (default: 3)
    pub min_cluster_size: usize,
    /// Grid cell size in screen pixels (default: 60)
    pub grid_size_px: f64,
    /// Ground meters per screen pixel at level 1 (default: 0.25, doubles per level)
    pub meters_per_px_level1: f64,
    /// Scale applied to a hovered cluster (default: 1.2)
    pub hover_scale: f32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_level: 2,
            min_cluster_size: 3,
            grid_size_px: 60.0,
            meters_per_px_level1: 0.25,
            hover_scale: 1.2,
        }
    }
}

impl ClusterConfig {
    /// Whether clustering applies at `level`.
    pub fn is_active(&self, level: u32) -> bool {
        level >= self.min_level
    }

    /// Grid cell size in meters at `level`.
    pub fn cell_size_meters(&self, level: u32) -> f64 {
        let doublings = level.saturating_sub(1).min(20) as i32;
        self.grid_size_px * self.meters_per_px_level1 * 2f64.powi(doublings)
    }
}

/// A group of nearby facilities drawn as one marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub key: ClusterKey,
    pub centroid: Coordinate,
    pub members: Vec<FacilityId>,
}

/// Group facilities into clusters at `level`.
///
/// Returns no clusters when clustering is inactive at this level. Facilities without
/// valid coordinates are ignored. Output is sorted by cell.
pub fn group(facilities: &[Facility], level: u32, config: &ClusterConfig) -> Vec<Cluster> {
    if !config.is_active(level) {
        return Vec::new();
    }

    let positioned: Vec<&Facility> = facilities.iter().filter(|f| f.has_valid_coordinates()).collect();
    if positioned.len() < config.min_cluster_size {
        return Vec::new();
    }

    let cell_size = config.cell_size_meters(level);
    let ref_lat = positioned.iter().map(|f| f.latitude).sum::<f64>() / positioned.len() as f64;
    let cell_lat_deg = cell_size / METERS_PER_DEGREE_LAT;
    let cell_lng_deg = meters_to_degrees(cell_size, ref_lat);

    let mut cells: BTreeMap<ClusterKey, Vec<&Facility>> = BTreeMap::new();
    for facility in positioned {
        let row = (facility.latitude / cell_lat_deg).floor() as i32;
        let col = (facility.longitude / cell_lng_deg).floor() as i32;
        cells.entry(ClusterKey(row, col)).or_default().push(facility);
    }

    cells
        .into_iter()
        .filter(|(_, members)| members.len() >= config.min_cluster_size)
        .filter_map(|(key, members)| {
            let points: Vec<Coordinate> = members.iter().map(|f| f.coordinate()).collect();
            let centroid = compute_center(&points)?;
            Some(Cluster {
                key,
                centroid,
                members: members.iter().map(|f| f.id).collect(),
            })
        })
        .collect()
}

#[derive(Debug)]
struct RenderedCluster {
    cluster: Cluster,
    render: RenderId,
    scale: f32,
}

/// Owns the cluster render objects and handles cluster interaction.
#[derive(Debug)]
pub struct ClusterManager {
    config: ClusterConfig,
    clusters: HashMap<ClusterKey, RenderedCluster>,
}

impl ClusterManager {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            config,
            clusters: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Replace all clusters with a fresh grouping of `visible`. Returns the cluster count.
    pub fn rebuild(&mut self, visible: &[Facility], level: u32, map: &mut dyn MapProvider) -> usize {
        self.clear(map);

        for cluster in group(visible, level, &self.config) {
            let render = map.create_cluster(&ClusterSpec {
                key: cluster.key,
                center: cluster.centroid,
                count: cluster.members.len(),
                click_zoom: false,
            });
            self.clusters.insert(cluster.key, RenderedCluster { cluster, render, scale: 1.0 });
        }

        debug!(
            "[Clusters] Rebuilt {} clusters from {} facilities at level {}",
            self.clusters.len(),
            visible.len(),
            level
        );
        self.clusters.len()
    }

    /// Enlarge a cluster on hover, restore it on leave.
    pub fn hover(&mut self, key: ClusterKey, entered: bool, map: &mut dyn MapProvider) {
        let Some(rendered) = self.clusters.get_mut(&key) else {
            return;
        };
        let scale = if entered { self.config.hover_scale } else { 1.0 };
        if rendered.scale != scale {
            rendered.scale = scale;
            map.scale_cluster(rendered.render, scale);
        }
    }

    /// Viewport after clicking a cluster: one level closer, centered on the cluster.
    pub fn click(&self, key: ClusterKey, viewport: &ViewportState) -> Option<ViewportState> {
        let rendered = self.clusters.get(&key)?;
        Some(ViewportState {
            center: rendered.cluster.centroid,
            zoom_level: viewport.zoom_level.saturating_sub(1).max(1),
            ..*viewport
        })
    }

    pub fn get(&self, key: ClusterKey) -> Option<&Cluster> {
        self.clusters.get(&key).map(|r| &r.cluster)
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Destroy every cluster render object.
    pub fn clear(&mut self, map: &mut dyn MapProvider) {
        for (_, rendered) in self.clusters.drain() {
            map.destroy_cluster(rendered.render);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::testing::RecordingMap;
    use crate::PriceType;

    fn lot(id: u64, lat: f64, lng: f64) -> Facility {
        Facility::new(FacilityId(id), "lot", lat, lng, PriceType::Free, 10)
    }

    fn tight_group() -> Vec<Facility> {
        vec![
            lot(1, 37.4560001, 126.705),
            lot(2, 37.4560002, 126.705),
            lot(3, 37.4560003, 126.705),
        ]
    }

    #[test]
    fn test_no_clusters_below_min_level() {
        assert!(group(&tight_group(), 1, &ClusterConfig::default()).is_empty());
    }

    #[test]
    fn test_tight_group_clusters() {
        let clusters = group(&tight_group(), 5, &ClusterConfig::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 3);
        assert!((clusters[0].centroid.latitude - 37.4560002).abs() < 1e-9);
    }

    #[test]
    fn test_min_cluster_size() {
        let pair = &tight_group()[..2];
        assert!(group(pair, 5, &ClusterConfig::default()).is_empty());
    }

    #[test]
    fn test_far_apart_facilities_do_not_cluster() {
        let spread = vec![lot(1, 37.40, 126.60), lot(2, 37.50, 126.70), lot(3, 37.60, 126.80)];
        assert!(group(&spread, 3, &ClusterConfig::default()).is_empty());
    }

    #[test]
    fn test_cell_size_grows_with_level() {
        let config = ClusterConfig::default();
        assert_eq!(config.cell_size_meters(1), 15.0);
        assert_eq!(config.cell_size_meters(3), 60.0);
        assert!(config.cell_size_meters(6) > config.cell_size_meters(5));
    }

    #[test]
    fn test_hover_and_click() {
        let mut map = RecordingMap::new(Coordinate::new(37.456, 126.705), 5);
        let mut manager = ClusterManager::new(ClusterConfig::default());
        assert_eq!(manager.rebuild(&tight_group(), 5, &mut map), 1);

        let (_, (spec, _)) = map.clusters.iter().next().unwrap();
        let key = spec.key;
        assert!(!spec.click_zoom);

        manager.hover(key, true, &mut map);
        assert_eq!(map.clusters.values().next().unwrap().1, 1.2);
        manager.hover(key, false, &mut map);
        assert_eq!(map.clusters.values().next().unwrap().1, 1.0);

        let view = ViewportState::new(Coordinate::new(37.0, 126.0), 800.0, 5);
        let next = manager.click(key, &view).unwrap();
        assert_eq!(next.zoom_level, 4);
        assert_eq!(next.center, manager.get(key).unwrap().centroid);
        assert_eq!(next.radius_meters, 800.0);
    }

    #[test]
    fn test_rebuild_replaces_everything() {
        let mut map = RecordingMap::new(Coordinate::new(37.456, 126.705), 5);
        let mut manager = ClusterManager::new(ClusterConfig::default());

        manager.rebuild(&tight_group(), 5, &mut map);
        manager.rebuild(&tight_group(), 5, &mut map);
        assert_eq!(map.clusters.len(), 1);

        manager.rebuild(&[], 5, &mut map);
        assert!(map.clusters.is_empty());
        assert!(manager.is_empty());
    }
}
