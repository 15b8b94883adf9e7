use serde::{Deserialize, Serialize};

use crate::utils;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
}

impl Point {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Point {
            latitude,
            longitude,
        }
    }

    // unit: meter
    pub fn haversine_distance(&self, other: &Point) -> f64 {
        utils::haversine_distance_km(self, other) * 1000.0
    }

    // The format the directions provider expects in `origin`/`destination`.
    pub fn to_query_value(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}

/// One sample from the platform location sensor.
#[derive(Clone, Debug, PartialEq)]
pub struct RawData {
    pub point: Point,
    // degrees clockwise from north
    pub heading: Option<f64>,
    // m/s
    pub speed: Option<f64>,
    pub accuracy: Option<f32>,
    pub timestamp_ms: Option<i64>,
}

impl RawData {
    /// iOS reports `-1` for heading/speed it could not determine.
    pub fn normalized(mut self) -> Self {
        self.heading = self.heading.filter(|h| h.is_finite() && *h >= 0.0);
        self.speed = self.speed.filter(|s| s.is_finite() && *s >= 0.0);
        self
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FilterResult {
    Accept,
    TooSoon,
    TooClose,
    OutOfOrder,
}

/// Applies the watch options (minimum time and distance between samples) on
/// our side, so platforms that ignore them still behave the same.
pub struct LocationFilter {
    min_interval_ms: i64,
    min_distance_m: f64,
    last_accepted: Option<RawData>,
}

impl LocationFilter {
    pub fn new(min_interval_ms: i64, min_distance_m: f64) -> Self {
        LocationFilter {
            min_interval_ms,
            min_distance_m,
            last_accepted: None,
        }
    }

    pub fn last_accepted(&self) -> Option<&RawData> {
        self.last_accepted.as_ref()
    }

    pub fn process(&mut self, curr_data: &RawData) -> FilterResult {
        let result = match &self.last_accepted {
            None => FilterResult::Accept,
            Some(last_data) => {
                match curr_data
                    .timestamp_ms
                    .and_then(|now| last_data.timestamp_ms.map(|prev| now - prev))
                {
                    // NOTE: Android sometimes hands us a stale fix after a newer
                    // one. Feeding it to the tracker would move the traveler
                    // backwards, so it is dropped.
                    Some(time_diff_in_ms) if time_diff_in_ms < 0 => FilterResult::OutOfOrder,
                    Some(time_diff_in_ms) if time_diff_in_ms < self.min_interval_ms => {
                        FilterResult::TooSoon
                    }
                    _ => {
                        if last_data.point.haversine_distance(&curr_data.point)
                            < self.min_distance_m
                        {
                            FilterResult::TooClose
                        } else {
                            FilterResult::Accept
                        }
                    }
                }
            }
        };
        if result == FilterResult::Accept {
            self.last_accepted = Some(curr_data.clone());
        }
        result
    }
}
