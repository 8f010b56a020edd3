//! Fetch a driving route from the directions API.
//!
//! Run with: KAKAO_REST_KEY=... cargo run --example route_fetch --features http

use parkmap::geo_utils::polyline_length;
use parkmap::{Coordinate, HttpRoutingConfig, HttpRoutingService, RoutingService};

#[tokio::main]
async fn main() {
    let api_key = std::env::var("KAKAO_REST_KEY").unwrap_or_default();
    if api_key.is_empty() {
        eprintln!("Set KAKAO_REST_KEY to a Kakao REST API key");
        return;
    }

    let service = match HttpRoutingService::new(HttpRoutingConfig::new(api_key)) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to create routing client: {}", e);
            return;
        }
    };

    // Incheon City Hall to Dongincheon station
    let origin = Coordinate::new(37.4563, 126.7052);
    let destination = Coordinate::new(37.4753, 126.6324);

    match service.route(origin, destination).await {
        Ok(path) => {
            println!("Route with {} points, {:.0}m", path.len(), polyline_length(&path));
            for point in path.iter().take(5) {
                println!("  {:.5}, {:.5}", point.latitude, point.longitude);
            }
        }
        Err(e) => eprintln!("Routing failed: {}", e),
    }
}
