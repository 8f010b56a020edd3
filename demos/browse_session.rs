//! A scripted map session against a console map provider.
//!
//! Run with: cargo run --example browse_session

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use parkmap::map::ListenerId;
use parkmap::{
    Bounds, ClusterSpec, Coordinate, Engine, EngineConfig, EngineEvent, FacilityId, GeolocationError,
    GeolocationProvider, LabelSpec, MapEvent, MapEventKind, MapProvider, MarkerStyle, PolylineStyle,
    PopupDescriptor, RenderId, RoutingError, RoutingService,
};

/// Prints every render call instead of drawing.
struct ConsoleMap {
    next_id: u64,
    center: Coordinate,
    level: u32,
}

impl ConsoleMap {
    fn next(&mut self) -> RenderId {
        self.next_id += 1;
        RenderId(self.next_id)
    }
}

impl MapProvider for ConsoleMap {
    fn create_marker(&mut self, facility: FacilityId, position: Coordinate, style: &MarkerStyle) -> RenderId {
        let id = self.next();
        println!(
            "  + marker {:?} for {} at ({:.4}, {:.4}) size {}",
            id, facility, position.latitude, position.longitude, style.size
        );
        id
    }

    fn restyle_marker(&mut self, marker: RenderId, style: &MarkerStyle) {
        println!("  ~ marker {:?} size {} z {}", marker, style.size, style.z_index);
    }

    fn destroy_marker(&mut self, marker: RenderId) {
        println!("  - marker {:?}", marker);
    }

    fn create_overlay(&mut self, label: &LabelSpec, visible: bool) -> RenderId {
        let id = self.next();
        println!(
            "  + label {:?} '{}' {} ({}) visible={}",
            id,
            label.name,
            label.spots_text(),
            label.color.css_name(),
            visible
        );
        id
    }

    fn set_overlay_visible(&mut self, overlay: RenderId, visible: bool) {
        println!("  ~ label {:?} visible={}", overlay, visible);
    }

    fn destroy_overlay(&mut self, overlay: RenderId) {
        println!("  - label {:?}", overlay);
    }

    fn open_popup(&mut self, popup: &PopupDescriptor) -> RenderId {
        let id = self.next();
        let actions: Vec<&str> = popup.actions.iter().map(|a| a.as_str()).collect();
        println!(
            "  + popup {:?} '{}' {} spots={} actions={:?}",
            id, popup.name, popup.price_label, popup.available_spots, actions
        );
        id
    }

    fn close_popup(&mut self, popup: RenderId) {
        println!("  - popup {:?}", popup);
    }

    fn create_polyline(&mut self, path: &[Coordinate], style: &PolylineStyle) -> RenderId {
        let id = self.next();
        println!("  + polyline {:?} with {} points ({})", id, path.len(), style.stroke_color);
        id
    }

    fn destroy_polyline(&mut self, polyline: RenderId) {
        println!("  - polyline {:?}", polyline);
    }

    fn create_cluster(&mut self, cluster: &ClusterSpec) -> RenderId {
        let id = self.next();
        println!("  + cluster {:?} of {}", id, cluster.count);
        id
    }

    fn scale_cluster(&mut self, cluster: RenderId, scale: f32) {
        println!("  ~ cluster {:?} scale {}", cluster, scale);
    }

    fn destroy_cluster(&mut self, cluster: RenderId) {
        println!("  - cluster {:?}", cluster);
    }

    fn center(&self) -> Coordinate {
        self.center
    }

    fn set_center(&mut self, center: Coordinate) {
        self.center = center;
    }

    fn set_bounds(&mut self, bounds: &Bounds) {
        println!(
            "  fit bounds ({:.4}, {:.4}) - ({:.4}, {:.4})",
            bounds.min_lat, bounds.min_lng, bounds.max_lat, bounds.max_lng
        );
        self.center = bounds.center();
    }

    fn level(&self) -> u32 {
        self.level
    }

    fn set_level(&mut self, level: u32) {
        self.level = level;
    }

    fn subscribe(&mut self, _kind: MapEventKind) -> ListenerId {
        ListenerId(self.next().0)
    }

    fn unsubscribe(&mut self, _listener: ListenerId) {}
}

struct FixedDevice;

impl GeolocationProvider for FixedDevice {
    fn current_position(&self) -> BoxFuture<'_, Result<Coordinate, GeolocationError>> {
        futures::future::ready(Ok(Coordinate::new(37.4563, 126.7052))).boxed()
    }
}

/// Straight line from origin to destination.
struct StraightLine;

impl RoutingService for StraightLine {
    fn route(&self, origin: Coordinate, destination: Coordinate) -> BoxFuture<'_, Result<Vec<Coordinate>, RoutingError>> {
        futures::future::ready(Ok(vec![origin, destination])).boxed()
    }
}

const RECORDS: &str = r#"[
    {"id": 1, "주차장명": "인천시청 공영주차장", "위도": 37.4563, "경도": 126.7052, "요금정보": "유료",
     "가능한주차면": 5, "소재지지번주소": "인천광역시 남동구 구월동", "주차기본요금": 1000, "운영요일": "평일+토요일", "주차장구분": "공영"},
    {"id": 2, "주차장명": "구월 노외주차장", "위도": "37.4590", "경도": "126.7080", "요금정보": "무료",
     "가능한주차면": "18", "소재지지번주소": "인천광역시 남동구 구월동", "주차장구분": "공영"},
    {"id": 3, "주차장명": "예술회관 주차장", "위도": 37.4490, "경도": 126.7010, "요금정보": "혼합",
     "가능한주차면": 42, "소재지지번주소": "인천광역시 남동구 구월동", "주차장구분": "민영"},
    {"id": 4, "주차장명": "시청앞 주차장", "위도": 37.5663, "경도": 126.9779, "요금정보": "유료",
     "가능한주차면": 3, "소재지지번주소": "서울특별시 중구 태평로1가"}
]"#;

fn print_events(engine: &mut Engine<ConsoleMap>) {
    for event in engine.drain_events() {
        match event {
            EngineEvent::PopupOpened(popup) => println!("  event: popup opened for {}", popup.facility_id),
            other => println!("  event: {:?}", other),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let map = ConsoleMap {
        next_id: 0,
        center: Coordinate::new(37.4563, 126.7052),
        level: 2,
    };
    let mut engine = Engine::new(map, EngineConfig::default());

    println!("Loading public records");
    let kept = engine.load_public_records(RECORDS).expect("records should parse");
    println!("  {} facilities after region filter\n", kept);

    println!("Attaching");
    engine.attach();
    engine.acquire_location(&FixedDevice).await;
    print_events(&mut engine);

    println!("\nHovering facility 2 in the list");
    engine.hover_facility(FacilityId(2));
    print_events(&mut engine);

    println!("\nZooming out to level 4");
    let t0 = Instant::now();
    engine.handle_event(MapEvent::ZoomChanged(4), t0).expect("zoom event");
    engine.tick(t0 + Duration::from_millis(300));
    print_events(&mut engine);

    println!("\nSelecting facility 3");
    engine.select_facility(FacilityId(3)).expect("facility 3 exists");
    print_events(&mut engine);

    println!("\nFinding a route to facility 3");
    match engine.find_route(FacilityId(3), &StraightLine).await {
        Ok(outcome) => println!("  {:?}", outcome),
        Err(e) => println!("  route failed: {}", e),
    }
    print_events(&mut engine);

    println!("\nSelecting an unknown facility");
    if let Err(e) = engine.select_facility(FacilityId(999)) {
        println!("  {} ({:?})", e, e.kind());
    }

    println!("\nTearing down");
    engine.teardown();
}
