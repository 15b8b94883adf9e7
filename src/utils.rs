use crate::gps_processor::Point;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

pub fn haversine_distance_km(a: &Point, b: &Point) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    // `min` guards against rounding pushing `h` slightly above 1 for
    // antipodal points.
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Rounded up to the next whole minute.
pub fn fallback_eta_minutes(distance_km: f64, speed_kmh: f64) -> u32 {
    if speed_kmh <= 0.0 || !distance_km.is_finite() {
        return 0;
    }
    (distance_km.max(0.0) / speed_kmh * 60.0).ceil() as u32
}

lazy_static! {
    static ref HTML_TAG: regex::Regex = regex::Regex::new(r"<[^>]*>").unwrap();
    static ref WHITESPACE: regex::Regex = regex::Regex::new(r"\s+").unwrap();
}

// The provider wraps street names in `<b>` and appends notes in `<div>`s, so
// tags are replaced by a space rather than removed outright.
pub fn strip_html(html: &str) -> String {
    let text = HTML_TAG.replace_all(html, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}
