//! Dataset snapshots.
//!
//! A [`DatasetSnapshot`] is the immutable facility set the engine works from. It applies
//! the region prefilter once at load time, indexes facilities by id and keeps an R-tree
//! over their positions for radius queries.
//!
//! Public parking data comes as JSON records keyed by Korean field names with numbers
//! that are sometimes encoded as strings; [`parse_public_records`] turns those into
//! [`Facility`] values.

use std::collections::HashMap;

use log::{info, warn};
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::geo_utils::{circle_bounds, within_radius};
use crate::{Facility, FacilityId, PriceType, ViewportState};

/// Indexed facility position: `[lng, lat]` with the facility's index in the snapshot.
type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Immutable facility set with id lookup and spatial index.
#[derive(Debug)]
pub struct DatasetSnapshot {
    facilities: Vec<Facility>,
    by_id: HashMap<FacilityId, usize>,
    spatial_index: RTree<IndexedPoint>,
}

impl DatasetSnapshot {
    /// Build a snapshot from raw facilities.
    ///
    /// When `region` is set, only facilities whose address contains it are kept.
    /// Duplicate ids keep the first occurrence.
    ///
    /// Fails with `DataUnavailable` when `facilities` is empty.
    pub fn new(facilities: Vec<Facility>, region: Option<&str>) -> Result<Self> {
        if facilities.is_empty() {
            return Err(EngineError::DataUnavailable(
                "dataset snapshot is empty".to_string(),
            ));
        }

        let total = facilities.len();
        let mut kept: Vec<Facility> = Vec::with_capacity(total);
        let mut by_id = HashMap::with_capacity(total);

        for facility in facilities {
            if let Some(region) = region {
                if !facility.address.contains(region) {
                    continue;
                }
            }
            if by_id.contains_key(&facility.id) {
                warn!("[Dataset] Duplicate facility id {}, keeping first", facility.id);
                continue;
            }
            by_id.insert(facility.id, kept.len());
            kept.push(facility);
        }

        let points: Vec<IndexedPoint> = kept
            .iter()
            .enumerate()
            .filter(|(_, f)| f.has_valid_coordinates())
            .map(|(i, f)| GeomWithData::new([f.longitude, f.latitude], i))
            .collect();
        let positioned = points.len();

        info!(
            "[Dataset] Loaded {} of {} facilities (region: {:?}, {} with valid coordinates)",
            kept.len(),
            total,
            region,
            positioned
        );

        Ok(Self {
            facilities: kept,
            by_id,
            spatial_index: RTree::bulk_load(points),
        })
    }

    pub fn facilities(&self) -> &[Facility] {
        &self.facilities
    }

    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }

    pub fn get(&self, id: FacilityId) -> Option<&Facility> {
        self.by_id.get(&id).map(|&i| &self.facilities[i])
    }

    pub fn contains(&self, id: FacilityId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Look up a facility, failing with `LookupFailure` if it is not in the snapshot.
    pub fn lookup(&self, id: FacilityId) -> Result<&Facility> {
        self.get(id).ok_or(EngineError::LookupFailure(id))
    }

    /// Facilities within the viewport radius, in snapshot order.
    ///
    /// Returns the same set as [`crate::viewport::compute_visible`] over
    /// [`Self::facilities`], using the R-tree to skip far-away facilities.
    pub fn query_visible(&self, viewport: &ViewportState) -> Vec<&Facility> {
        let bounds = circle_bounds(&viewport.center, viewport.radius_meters);
        let envelope = AABB::from_corners(
            [bounds.min_lng, bounds.min_lat],
            [bounds.max_lng, bounds.max_lat],
        );

        let mut indices: Vec<usize> = self
            .spatial_index
            .locate_in_envelope(&envelope)
            .map(|p| p.data)
            .filter(|&i| {
                within_radius(
                    &self.facilities[i].coordinate(),
                    &viewport.center,
                    viewport.radius_meters,
                )
            })
            .collect();
        indices.sort_unstable();

        indices.into_iter().map(|i| &self.facilities[i]).collect()
    }
}

// ============================================================================
// Public-data ingestion
// ============================================================================

/// One record of the public parking-lot dataset.
#[derive(Debug, Deserialize)]
struct PublicRecord {
    #[serde(default, deserialize_with = "de_opt_u64")]
    id: Option<u64>,
    #[serde(rename = "주차장명", default, deserialize_with = "de_text")]
    name: String,
    #[serde(rename = "위도", default, deserialize_with = "de_f64")]
    latitude: f64,
    #[serde(rename = "경도", default, deserialize_with = "de_f64")]
    longitude: f64,
    #[serde(rename = "요금정보", default, deserialize_with = "de_text")]
    fee_info: String,
    #[serde(rename = "가능한주차면", default, deserialize_with = "de_u32")]
    available_spots: u32,
    #[serde(rename = "소재지지번주소", default, deserialize_with = "de_text")]
    address: String,
    #[serde(rename = "주차기본요금", default, deserialize_with = "de_text")]
    base_fee: String,
    #[serde(rename = "운영요일", default, deserialize_with = "de_text")]
    operating_days: String,
    #[serde(rename = "주차장구분", default, deserialize_with = "de_text")]
    category: String,
}

/// Parse a JSON array of public parking-lot records into facilities.
///
/// Records without an `id` are numbered by position (1-based). Missing coordinates
/// become `0.0`, which the engine treats as "no position".
///
/// # Example
/// ```
/// use parkmap::{parse_public_records, FacilityId, PriceType};
///
/// let json = r#"[{"id": 3, "주차장명": "구월 공영", "위도": "37.449", "경도": 126.704,
///                "요금정보": "유료", "가능한주차면": "12", "소재지지번주소": "인천광역시 남동구"}]"#;
/// let lots = parse_public_records(json).unwrap();
/// assert_eq!(lots[0].id, FacilityId(3));
/// assert_eq!(lots[0].price_type, PriceType::Paid);
/// assert_eq!(lots[0].available_spots, 12);
/// ```
pub fn parse_public_records(json: &str) -> Result<Vec<Facility>> {
    let records: Vec<PublicRecord> = serde_json::from_str(json)
        .map_err(|e| EngineError::DataUnavailable(format!("JSON parse error: {}", e)))?;

    Ok(records
        .into_iter()
        .enumerate()
        .map(|(i, r)| Facility {
            id: FacilityId(r.id.unwrap_or(i as u64 + 1)),
            name: r.name,
            latitude: r.latitude,
            longitude: r.longitude,
            price_type: PriceType::from_label(&r.fee_info),
            available_spots: r.available_spots,
            address: r.address,
            base_fee: r.base_fee,
            operating_days: r.operating_days,
            category: r.category,
        })
        .collect())
}

fn de_f64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn de_u32<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u32, D::Error> {
    let value = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    Ok(value.max(0.0).min(u32::MAX as f64) as u32)
}

fn de_opt_u64<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<u64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn de_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}
