//! Detail popup.
//!
//! At most one popup is open at a time. The popup content is a renderer-agnostic
//! [`PopupDescriptor`]: display fields plus the action ids the host UI turns into
//! buttons. Button presses come back through an injected [`ActionCallback`].

use std::fmt;
use std::sync::Arc;

use log::{debug, info};
use url::Url;

use crate::dataset::DatasetSnapshot;
use crate::map::{MapProvider, RenderId};
use crate::{Coordinate, EngineError, Facility, FacilityId, Result};

/// Actions offered by a facility popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PopupAction {
    ViewDetail,
    Reserve,
    FindRoute,
}

impl PopupAction {
    pub const ALL: [PopupAction; 3] = [PopupAction::ViewDetail, PopupAction::Reserve, PopupAction::FindRoute];

    /// Stable action id for host UIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            PopupAction::ViewDetail => "viewDetail",
            PopupAction::Reserve => "reserve",
            PopupAction::FindRoute => "findRoute",
        }
    }
}

/// Host callback for popup actions.
pub type ActionCallback = Arc<dyn Fn(PopupAction, FacilityId) + Send + Sync>;

/// Content of a facility popup.
#[derive(Clone)]
pub struct PopupDescriptor {
    pub facility_id: FacilityId,
    pub position: Coordinate,
    pub name: String,
    pub price_label: &'static str,
    pub base_fee: String,
    pub category: String,
    pub operating_days: String,
    pub available_spots: u32,
    pub actions: Vec<PopupAction>,
    callback: Option<ActionCallback>,
}

impl PopupDescriptor {
    pub fn for_facility(facility: &Facility, callback: Option<ActionCallback>) -> Self {
        Self {
            facility_id: facility.id,
            position: facility.coordinate(),
            name: facility.name.clone(),
            price_label: facility.price_type.label(),
            base_fee: facility.base_fee.clone(),
            category: facility.category.clone(),
            operating_days: facility.operating_days.clone(),
            available_spots: facility.available_spots,
            actions: PopupAction::ALL.to_vec(),
            callback,
        }
    }

    /// Forward a button press to the host callback.
    ///
    /// Returns `false` when no callback is installed or the action is not offered.
    pub fn invoke(&self, action: PopupAction) -> bool {
        if !self.actions.contains(&action) {
            return false;
        }
        match &self.callback {
            Some(callback) => {
                callback(action, self.facility_id);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for PopupDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopupDescriptor")
            .field("facility_id", &self.facility_id)
            .field("position", &self.position)
            .field("name", &self.name)
            .field("price_label", &self.price_label)
            .field("available_spots", &self.available_spots)
            .field("actions", &self.actions)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

#[derive(Debug)]
struct OpenPopup {
    facility: FacilityId,
    render: RenderId,
}

/// Owns the single open popup.
#[derive(Default)]
pub struct PopupManager {
    active: Option<OpenPopup>,
    callback: Option<ActionCallback>,
}

impl PopupManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_callback(&mut self, callback: ActionCallback) {
        self.callback = Some(callback);
    }

    /// Open the popup for `id`, closing any open popup first.
    ///
    /// Fails with `LookupFailure` if the facility is not in `snapshot` or has no
    /// coordinates to anchor the popup at; the currently open popup (if any) is then
    /// left as it was.
    pub fn open(
        &mut self,
        id: FacilityId,
        snapshot: &DatasetSnapshot,
        map: &mut dyn MapProvider,
    ) -> Result<PopupDescriptor> {
        let facility = snapshot.lookup(id)?;
        if !facility.has_valid_coordinates() {
            debug!("[Popup] {} has no position to anchor a popup", id);
            return Err(EngineError::LookupFailure(id));
        }
        let descriptor = PopupDescriptor::for_facility(facility, self.callback.clone());

        self.close(map);
        let render = map.open_popup(&descriptor);
        self.active = Some(OpenPopup { facility: id, render });

        info!("[Popup] Opened for {} ({})", id, descriptor.name);
        Ok(descriptor)
    }

    /// Close the open popup. Returns the facility it belonged to.
    pub fn close(&mut self, map: &mut dyn MapProvider) -> Option<FacilityId> {
        let open = self.active.take()?;
        map.close_popup(open.render);
        debug!("[Popup] Closed for {}", open.facility);
        Some(open.facility)
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_facility(&self) -> Option<FacilityId> {
        self.active.as_ref().map(|open| open.facility)
    }
}

impl fmt::Debug for PopupManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopupManager")
            .field("active", &self.active)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

// ============================================================================
// Directions deep links
// ============================================================================

/// External map app that can show turn-by-turn directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionsProvider {
    Kakao,
    Naver,
}

const KAKAO_LINK_BASE: &str = "https://map.kakao.com/link/to/";
const NAVER_ROUTE_BASE: &str = "http://map.naver.com/index.nhn";
const NAVER_ORIGIN_LABEL: &str = "현재위치";

/// Deep link that opens directions to `facility` in an external map app.
///
/// Kakao links only carry the destination. Naver links also carry `origin`.
///
/// # Example
/// ```
/// use parkmap::{Coordinate, DirectionsProvider, Facility, FacilityId, PriceType};
/// use parkmap::popup::directions_url;
///
/// let lot = Facility::new(FacilityId(1), "Central", 37.456, 126.705, PriceType::Paid, 5);
/// let url = directions_url(DirectionsProvider::Kakao, &lot, Coordinate::new(37.45, 126.70)).unwrap();
/// assert_eq!(url.as_str(), "https://map.kakao.com/link/to/Central,37.456,126.705");
/// ```
pub fn directions_url(
    provider: DirectionsProvider,
    facility: &Facility,
    origin: Coordinate,
) -> std::result::Result<Url, url::ParseError> {
    match provider {
        DirectionsProvider::Kakao => {
            let mut url = Url::parse(KAKAO_LINK_BASE)?;
            let target = format!("{},{},{}", facility.name, facility.latitude, facility.longitude);
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop_if_empty().push(&target);
            }
            Ok(url)
        }
        DirectionsProvider::Naver => Url::parse_with_params(
            NAVER_ROUTE_BASE,
            &[
                ("slng", origin.longitude.to_string()),
                ("slat", origin.latitude.to_string()),
                ("stext", NAVER_ORIGIN_LABEL.to_string()),
                ("elng", facility.longitude.to_string()),
                ("elat", facility.latitude.to_string()),
                ("etext", facility.name.clone()),
                ("menu", "route".to_string()),
            ],
        ),
    }
}
