use std::str::FromStr;

use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::gps_processor::Point;

/// Maneuver identifiers as sent by the directions provider.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum Maneuver {
    TurnSlightLeft,
    TurnSharpLeft,
    TurnLeft,
    TurnSlightRight,
    TurnSharpRight,
    TurnRight,
    UturnLeft,
    UturnRight,
    KeepLeft,
    KeepRight,
    RampLeft,
    RampRight,
    ForkLeft,
    ForkRight,
    RoundaboutLeft,
    RoundaboutRight,
    Straight,
    Merge,
    Ferry,
    FerryTrain,
}

impl Maneuver {
    pub fn parse(value: Option<&str>) -> Option<Maneuver> {
        let value = value?.trim();
        if value.is_empty() {
            return None;
        }
        match Maneuver::from_str(value) {
            Ok(maneuver) => Some(maneuver),
            Err(_) => {
                debug!("[route] unknown maneuver: {}", value);
                None
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteStep {
    // plain text, markup already stripped
    pub instruction: String,
    pub distance_text: String,
    pub duration_text: String,
    pub maneuver: Option<Maneuver>,
}

/// The route currently on screen. Never edited in place: a new fetch produces
/// a new `RouteState` that replaces the old one.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteState {
    pub points: Vec<Point>,
    pub steps: Vec<RouteStep>,
    pub eta_minutes: u32,
    pub distance_km: f64,
}

impl RouteState {
    pub fn next_step(&self) -> Option<&RouteStep> {
        self.steps.first()
    }
}
