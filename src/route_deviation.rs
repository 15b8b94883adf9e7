use itertools::Itertools;

use crate::gps_processor::Point;
use crate::utils::EARTH_RADIUS_KM;

const EARTH_RADIUS_M: f64 = EARTH_RADIUS_KM * 1000.0;

// Projects `point` onto a plane tangent at `origin`; unit: meter. Good enough
// for the few hundred meters that matter when deciding on a reroute.
fn project(origin: &Point, point: &Point) -> (f64, f64) {
    // take the short way around when the route crosses the 180th meridian
    let mut d_lng = point.longitude - origin.longitude;
    if d_lng > 180.0 {
        d_lng -= 360.0;
    } else if d_lng < -180.0 {
        d_lng += 360.0;
    }
    let x = d_lng.to_radians()
        * origin.latitude.to_radians().cos()
        * EARTH_RADIUS_M;
    let y = (point.latitude - origin.latitude).to_radians() * EARTH_RADIUS_M;
    (x, y)
}

// distance from the origin (0, 0) to the segment a-b
fn distance_to_segment((ax, ay): (f64, f64), (bx, by): (f64, f64)) -> f64 {
    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        ((-ax * dx - ay * dy) / len_sq).clamp(0.0, 1.0)
    };
    let px = ax + t * dx;
    let py = ay + t * dy;
    (px * px + py * py).sqrt()
}

/// Minimum distance in meters from `position` to the route polyline.
pub fn distance_from_route_m(position: &Point, route: &[Point]) -> f64 {
    match route {
        [] => 0.0,
        [only] => position.haversine_distance(only),
        _ => route
            .iter()
            .map(|p| project(position, p))
            .tuple_windows()
            .map(|(a, b)| distance_to_segment(a, b))
            .fold(f64::INFINITY, f64::min),
    }
}
