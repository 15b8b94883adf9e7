//! Client side of the external directions service. The provider is the only
//! source of route geometry and timing.

use std::future::Future;

use serde::Deserialize;

use crate::config::DirectionsConfig;
use crate::gps_processor::Point;
use crate::polyline;
use crate::route::{Maneuver, RouteState, RouteStep};
use crate::utils;

#[derive(Debug, thiserror::Error)]
pub enum DirectionsError {
    #[error("directions request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid directions response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no route available (status: {status})")]
    NoRoute { status: String },
    #[error("invalid route polyline: {0}")]
    Polyline(anyhow::Error),
}

pub trait DirectionsProvider: Send + Sync + 'static {
    /// Driving route from `origin` to `destination`.
    fn fetch_route(
        &self,
        origin: Point,
        destination: Point,
    ) -> impl Future<Output = Result<RouteState, DirectionsError>> + Send;
}

#[derive(Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Deserialize)]
struct DirectionsRoute {
    overview_polyline: EncodedPolyline,
    #[serde(default)]
    legs: Vec<DirectionsLeg>,
}

#[derive(Deserialize)]
struct EncodedPolyline {
    points: String,
}

#[derive(Deserialize)]
struct DirectionsLeg {
    #[serde(default)]
    distance: Measure,
    #[serde(default)]
    duration: Measure,
    #[serde(default)]
    steps: Vec<DirectionsStep>,
}

#[derive(Deserialize, Default)]
struct Measure {
    #[serde(default)]
    value: f64,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct DirectionsStep {
    #[serde(default)]
    html_instructions: String,
    #[serde(default)]
    distance: Measure,
    #[serde(default)]
    duration: Measure,
    maneuver: Option<String>,
}

pub fn parse_directions_response(body: &str) -> Result<RouteState, DirectionsError> {
    let response: DirectionsResponse = serde_json::from_str(body)?;
    if response.status != "OK" {
        return Err(DirectionsError::NoRoute {
            status: response.status,
        });
    }
    let route = match response.routes.into_iter().next() {
        Some(route) => route,
        None => {
            return Err(DirectionsError::NoRoute {
                status: response.status,
            })
        }
    };

    let points =
        polyline::decode(&route.overview_polyline.points).map_err(DirectionsError::Polyline)?;

    let distance_m: f64 = route.legs.iter().map(|leg| leg.distance.value).sum();
    let duration_sec: f64 = route.legs.iter().map(|leg| leg.duration.value).sum();
    let steps = route
        .legs
        .into_iter()
        .flat_map(|leg| leg.steps)
        .map(|step| RouteStep {
            instruction: utils::strip_html(&step.html_instructions),
            distance_text: step.distance.text,
            duration_text: step.duration.text,
            maneuver: Maneuver::parse(step.maneuver.as_deref()),
        })
        .collect();

    Ok(RouteState {
        points,
        steps,
        eta_minutes: (duration_sec / 60.0).ceil().max(0.0) as u32,
        distance_km: distance_m / 1000.0,
    })
}

/// Talks to the Google Directions web service.
#[derive(Clone)]
pub struct GoogleDirectionsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleDirectionsClient {
    pub fn new(config: &DirectionsConfig) -> Result<Self, DirectionsError> {
        // no request timeout, a hung request only delays the next route update
        let client = reqwest::Client::builder().build()?;
        Ok(GoogleDirectionsClient {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

impl DirectionsProvider for GoogleDirectionsClient {
    async fn fetch_route(
        &self,
        origin: Point,
        destination: Point,
    ) -> Result<RouteState, DirectionsError> {
        debug!(
            "[directions] requesting route {} -> {}",
            origin.to_query_value(),
            destination.to_query_value()
        );
        let body = self
            .client
            .get(&self.base_url)
            .query(&[
                ("origin", origin.to_query_value()),
                ("destination", destination.to_query_value()),
                ("mode", "driving".to_string()),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_directions_response(&body)
    }
}
