//! Keeps the displayed route, ETA and distance in sync with the traveler's
//! live position.
//!
//! Every operation does its bookkeeping synchronously and returns right away.
//! Calls to the directions provider are handed back to the caller as a
//! [`PendingFetch`], which can be awaited inline or spawned. Completions may
//! arrive in any order: each fetch carries a sequence number and only a
//! result newer than the last applied one is taken.

use std::future::IntoFuture;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;

use crate::config::NavigationConfig;
use crate::directions::{DirectionsError, DirectionsProvider};
use crate::gps_processor::{Point, RawData};
use crate::route::RouteState;
use crate::utils;

/// A display directive for the map view, not data.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CameraCommand {
    pub center: Point,
    pub heading: f64,
    pub pitch: f64,
    pub zoom: f64,
    pub animation_duration_ms: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum EtaSource {
    // taken from a full route fetch
    Route,
    // periodic refresh from the provider
    Provider,
    // provider failed, estimated from the straight-line distance
    Fallback,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Eta {
    pub minutes: u32,
    pub distance_km: f64,
    pub source: EtaSource,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FetchKind {
    Route,
    Eta,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FetchOutcome {
    Applied,
    // ETA refresh failed, the local estimate was used instead
    FellBack,
    // a newer result was already applied
    Stale,
    Failed,
    SessionEnded,
}

/// A directions request that has been issued but not yet sent. Await it (or
/// spawn it) to perform the request and apply its result.
pub struct PendingFetch {
    kind: FetchKind,
    seq: u64,
    future: BoxFuture<'static, FetchOutcome>,
}

impl PendingFetch {
    pub fn kind(&self) -> FetchKind {
        self.kind
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl IntoFuture for PendingFetch {
    type Output = FetchOutcome;
    type IntoFuture = BoxFuture<'static, FetchOutcome>;

    fn into_future(self) -> Self::IntoFuture {
        self.future
    }
}

impl std::fmt::Debug for PendingFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingFetch")
            .field("kind", &self.kind)
            .field("seq", &self.seq)
            .finish()
    }
}

pub struct PositionUpdate {
    pub distance_to_destination_km: f64,
    pub camera: Option<CameraCommand>,
    pub eta_refresh: Option<PendingFetch>,
}

#[derive(Debug)]
pub enum DeviationDecision {
    CoolingDown,
    WithinThreshold,
    AlreadyRecalculating,
    // no position has been reported yet, nothing to route from
    NoPosition,
    SessionEnded,
    Reroute(PendingFetch),
}

#[derive(Clone, Debug)]
pub struct NavigationStatus {
    pub position: Option<Point>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub distance_to_destination_km: Option<f64>,
    pub eta: Option<Eta>,
    pub route: Option<Arc<RouteState>>,
    pub next_instruction: Option<String>,
    pub is_recalculating: bool,
    pub auto_follow: bool,
}

struct SessionState {
    last_known_position: Option<Point>,
    last_heading: Option<f64>,
    last_speed: Option<f64>,
    distance_to_destination_km: Option<f64>,
    last_recalculation_ms: Option<i64>,
    is_recalculating: bool,
    last_fetch_ms: Option<i64>,
    last_camera_update_ms: Option<i64>,
    auto_follow: bool,
    route: Option<Arc<RouteState>>,
    eta: Option<Eta>,
    next_seq: u64,
    applied_route_seq: u64,
    applied_eta_seq: u64,
    ended: bool,
}

impl SessionState {
    fn new() -> Self {
        SessionState {
            last_known_position: None,
            last_heading: None,
            last_speed: None,
            distance_to_destination_km: None,
            last_recalculation_ms: None,
            is_recalculating: false,
            last_fetch_ms: None,
            last_camera_update_ms: None,
            auto_follow: true,
            route: None,
            eta: None,
            next_seq: 0,
            applied_route_seq: 0,
            applied_eta_seq: 0,
            ended: false,
        }
    }

    fn issue_fetch(&mut self, now_ms: i64) -> u64 {
        self.last_fetch_ms = Some(now_ms);
        self.next_seq += 1;
        self.next_seq
    }

    fn elapsed_since(last_ms: Option<i64>, now_ms: i64, interval_ms: i64) -> bool {
        match last_ms {
            None => true,
            Some(last_ms) => now_ms - last_ms >= interval_ms,
        }
    }
}

struct Inner<P> {
    provider: P,
    config: NavigationConfig,
    destination: Point,
    state: Mutex<SessionState>,
}

pub struct NavigationTracker<P> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for NavigationTracker<P> {
    fn clone(&self) -> Self {
        NavigationTracker {
            inner: self.inner.clone(),
        }
    }
}

// Clears `is_recalculating` however the reroute ends, including when the
// pending fetch is dropped without ever being polled.
struct RecalculationGuard<P> {
    inner: Arc<Inner<P>>,
}

impl<P> Drop for RecalculationGuard<P> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.inner.state.lock() {
            state.is_recalculating = false;
        }
    }
}

impl<P: DirectionsProvider> NavigationTracker<P> {
    pub fn new(provider: P, config: NavigationConfig, destination: Point) -> Self {
        NavigationTracker {
            inner: Arc::new(Inner {
                provider,
                config,
                destination,
                state: Mutex::new(SessionState::new()),
            }),
        }
    }

    pub fn destination(&self) -> Point {
        self.inner.destination
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.inner.config
    }

    pub fn provider(&self) -> &P {
        &self.inner.provider
    }

    pub fn on_position_update(&self, sample: &RawData, now_ms: i64) -> PositionUpdate {
        let config = &self.inner.config;
        let position = sample.point;
        let mut state = self.inner.state.lock().unwrap();

        state.last_known_position = Some(position);
        if sample.heading.is_some() {
            state.last_heading = sample.heading;
        }
        state.last_speed = sample.speed;
        let distance_km = utils::haversine_distance_km(&position, &self.inner.destination);
        state.distance_to_destination_km = Some(distance_km);

        let camera = if state.auto_follow
            && SessionState::elapsed_since(
                state.last_camera_update_ms,
                now_ms,
                config.camera_update_interval_ms,
            ) {
            state.last_camera_update_ms = Some(now_ms);
            Some(CameraCommand {
                center: position,
                heading: state.last_heading.unwrap_or(0.0),
                pitch: config.camera_pitch,
                zoom: config.camera_zoom,
                animation_duration_ms: config.camera_animation_ms,
            })
        } else {
            None
        };

        let eta_seq = if !state.ended
            && SessionState::elapsed_since(
                state.last_fetch_ms,
                now_ms,
                config.eta_refresh_interval_ms,
            ) {
            Some(state.issue_fetch(now_ms))
        } else {
            None
        };
        drop(state);

        PositionUpdate {
            distance_to_destination_km: distance_km,
            camera,
            eta_refresh: eta_seq.map(|seq| self.eta_refresh(seq, position)),
        }
    }

    fn eta_refresh(&self, seq: u64, origin: Point) -> PendingFetch {
        let tracker = self.clone();
        let destination = self.inner.destination;
        PendingFetch {
            kind: FetchKind::Eta,
            seq,
            future: async move {
                let result = tracker.inner.provider.fetch_route(origin, destination).await;
                tracker.apply_eta(seq, result)
            }
            .boxed(),
        }
    }

    fn apply_eta(&self, seq: u64, result: Result<RouteState, DirectionsError>) -> FetchOutcome {
        let mut state = self.inner.state.lock().unwrap();
        if state.ended {
            return FetchOutcome::SessionEnded;
        }
        if seq <= state.applied_eta_seq {
            debug!("[tracker] dropping stale eta result #{}", seq);
            return FetchOutcome::Stale;
        }
        state.applied_eta_seq = seq;
        match result {
            Ok(route) => {
                state.eta = Some(Eta {
                    minutes: route.eta_minutes,
                    distance_km: route.distance_km,
                    source: EtaSource::Provider,
                });
                // nothing on screen yet, e.g. the initial fetch failed
                if state.route.is_none() && seq > state.applied_route_seq {
                    info!(
                        "[tracker] eta refresh #{} brought the first route: {} points",
                        seq,
                        route.points.len()
                    );
                    state.applied_route_seq = seq;
                    state.route = Some(Arc::new(route));
                }
                FetchOutcome::Applied
            }
            Err(e) => {
                let distance_km = state.distance_to_destination_km.unwrap_or(0.0);
                let minutes =
                    utils::fallback_eta_minutes(distance_km, self.inner.config.fallback_speed_kmh);
                warn!(
                    "[tracker] eta refresh failed, estimating {} min locally: {}",
                    minutes, e
                );
                state.eta = Some(Eta {
                    minutes,
                    distance_km,
                    source: EtaSource::Fallback,
                });
                FetchOutcome::FellBack
            }
        }
    }

    /// Requests a route and replaces the displayed one with it. On failure the
    /// current route stays on screen.
    pub fn fetch_route(&self, origin: Point, destination: Point, now_ms: i64) -> PendingFetch {
        let seq = self.inner.state.lock().unwrap().issue_fetch(now_ms);
        let tracker = self.clone();
        PendingFetch {
            kind: FetchKind::Route,
            seq,
            future: async move {
                let result = tracker.inner.provider.fetch_route(origin, destination).await;
                tracker.apply_route(seq, result)
            }
            .boxed(),
        }
    }

    fn apply_route(&self, seq: u64, result: Result<RouteState, DirectionsError>) -> FetchOutcome {
        let mut state = self.inner.state.lock().unwrap();
        if state.ended {
            return FetchOutcome::SessionEnded;
        }
        match result {
            Ok(route) => {
                if seq <= state.applied_route_seq {
                    debug!("[tracker] dropping stale route result #{}", seq);
                    return FetchOutcome::Stale;
                }
                info!(
                    "[tracker] new route #{}: {} points, {} steps, {:.1} km, {} min",
                    seq,
                    route.points.len(),
                    route.steps.len(),
                    route.distance_km,
                    route.eta_minutes
                );
                state.applied_route_seq = seq;
                if seq > state.applied_eta_seq {
                    state.applied_eta_seq = seq;
                    state.eta = Some(Eta {
                        minutes: route.eta_minutes,
                        distance_km: route.distance_km,
                        source: EtaSource::Route,
                    });
                }
                state.route = Some(Arc::new(route));
                FetchOutcome::Applied
            }
            Err(e) => {
                warn!("[tracker] route fetch #{} failed: {}", seq, e);
                FetchOutcome::Failed
            }
        }
    }

    pub fn on_route_deviation(&self, distance_from_route_m: f64, now_ms: i64) -> DeviationDecision {
        let config = &self.inner.config;
        let mut state = self.inner.state.lock().unwrap();
        if state.ended {
            return DeviationDecision::SessionEnded;
        }
        if !SessionState::elapsed_since(
            state.last_recalculation_ms,
            now_ms,
            config.recalculation_cooldown_ms,
        ) {
            return DeviationDecision::CoolingDown;
        }
        if distance_from_route_m <= config.deviation_threshold_m {
            return DeviationDecision::WithinThreshold;
        }
        if state.is_recalculating {
            return DeviationDecision::AlreadyRecalculating;
        }
        let origin = match state.last_known_position {
            Some(position) => position,
            None => return DeviationDecision::NoPosition,
        };

        state.is_recalculating = true;
        state.last_recalculation_ms = Some(now_ms);
        let seq = state.issue_fetch(now_ms);
        drop(state);

        info!(
            "[tracker] {:.0} m off route, recalculating (#{})",
            distance_from_route_m, seq
        );
        let guard = RecalculationGuard {
            inner: self.inner.clone(),
        };
        let tracker = self.clone();
        let destination = self.inner.destination;
        DeviationDecision::Reroute(PendingFetch {
            kind: FetchKind::Route,
            seq,
            future: async move {
                let _guard = guard;
                let result = tracker.inner.provider.fetch_route(origin, destination).await;
                tracker.apply_route(seq, result)
            }
            .boxed(),
        })
    }

    /// Disabled when the user pans the map, enabled again by "recenter".
    pub fn set_auto_follow(&self, enabled: bool) {
        let mut state = self.inner.state.lock().unwrap();
        if enabled && !state.auto_follow {
            // recenter on the very next position update
            state.last_camera_update_ms = None;
        }
        state.auto_follow = enabled;
    }

    pub fn current_route(&self) -> Option<Arc<RouteState>> {
        self.inner.state.lock().unwrap().route.clone()
    }

    pub fn needs_initial_route(&self) -> bool {
        let state = self.inner.state.lock().unwrap();
        !state.ended && state.route.is_none() && state.last_fetch_ms.is_none()
    }

    pub fn status(&self) -> NavigationStatus {
        let state = self.inner.state.lock().unwrap();
        NavigationStatus {
            position: state.last_known_position,
            heading: state.last_heading,
            speed: state.last_speed,
            distance_to_destination_km: state.distance_to_destination_km,
            eta: state.eta,
            next_instruction: state
                .route
                .as_ref()
                .and_then(|route| route.next_step())
                .map(|step| step.instruction.clone()),
            route: state.route.clone(),
            is_recalculating: state.is_recalculating,
            auto_follow: state.auto_follow,
        }
    }

    /// Results of fetches still in flight are discarded from now on.
    pub fn end(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.ended = true;
    }

    pub fn is_ended(&self) -> bool {
        self.inner.state.lock().unwrap().ended
    }
}
