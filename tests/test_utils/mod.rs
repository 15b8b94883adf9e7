#![allow(dead_code)]

use carpool_nav_core::directions::{DirectionsError, DirectionsProvider};
use carpool_nav_core::gps_processor::{Point, RawData};
use carpool_nav_core::route::{Maneuver, RouteState, RouteStep};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// unit: degree per meter, north-south
const DEGREE_PER_METER: f64 = 1.0 / 111_194.93;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn north_of(base: &Point, meters: f64) -> Point {
    Point::new(base.latitude + meters * DEGREE_PER_METER, base.longitude)
}

pub fn east_of(base: &Point, meters: f64) -> Point {
    Point::new(
        base.latitude,
        base.longitude + meters * DEGREE_PER_METER / base.latitude.to_radians().cos(),
    )
}

pub fn sample(point: Point, timestamp_ms: i64) -> RawData {
    RawData {
        point,
        heading: None,
        speed: Some(13.9),
        accuracy: Some(5.0),
        timestamp_ms: Some(timestamp_ms),
    }
}

pub fn straight_route(origin: Point, destination: Point, eta_minutes: u32) -> RouteState {
    RouteState {
        points: vec![origin, destination],
        steps: vec![RouteStep {
            instruction: "Head north on Main St".to_string(),
            distance_text: "5.0 km".to_string(),
            duration_text: format!("{eta_minutes} mins"),
            maneuver: Some(Maneuver::Straight),
        }],
        eta_minutes,
        distance_km: origin.haversine_distance(&destination) / 1000.0,
    }
}

type Responder =
    Box<dyn Fn(usize, Point, Point) -> Result<RouteState, DirectionsError> + Send + Sync>;

/// Lets a test hold a provider call open until it calls `release`.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

pub struct MockDirections {
    calls: Arc<AtomicUsize>,
    origins: Arc<Mutex<Vec<Point>>>,
    responder: Responder,
    gate: Option<Arc<Gate>>,
}

#[derive(Clone)]
pub struct MockHandle {
    calls: Arc<AtomicUsize>,
    origins: Arc<Mutex<Vec<Point>>>,
}

impl MockHandle {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn origins(&self) -> Vec<Point> {
        self.origins.lock().unwrap().clone()
    }
}

impl MockDirections {
    pub fn new(
        responder: impl Fn(usize, Point, Point) -> Result<RouteState, DirectionsError>
            + Send
            + Sync
            + 'static,
    ) -> (Self, MockHandle) {
        let calls = Arc::new(AtomicUsize::new(0));
        let origins = Arc::new(Mutex::new(Vec::new()));
        let handle = MockHandle {
            calls: calls.clone(),
            origins: origins.clone(),
        };
        (
            MockDirections {
                calls,
                origins,
                responder: Box::new(responder),
                gate: None,
            },
            handle,
        )
    }

    /// Always answers with a straight line from origin to destination.
    pub fn straight(eta_minutes: u32) -> (Self, MockHandle) {
        Self::new(move |_, origin, destination| {
            Ok(straight_route(origin, destination, eta_minutes))
        })
    }

    pub fn failing() -> (Self, MockHandle) {
        Self::new(|_, _, _| {
            Err(DirectionsError::NoRoute {
                status: "ZERO_RESULTS".to_string(),
            })
        })
    }

    pub fn with_gate(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }
}

impl DirectionsProvider for MockDirections {
    fn fetch_route(
        &self,
        origin: Point,
        destination: Point,
    ) -> impl Future<Output = Result<RouteState, DirectionsError>> + Send {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.origins.lock().unwrap().push(origin);
        let result = (self.responder)(index, origin, destination);
        let gate = self.gate.clone();
        async move {
            if let Some(gate) = gate {
                gate.entered.notify_one();
                gate.release.notified().await;
            }
            result
        }
    }
}

/// Polls `condition` until it holds, giving spawned tasks time to run.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
