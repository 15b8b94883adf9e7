use std::sync::{Mutex, OnceLock};

use anyhow::{Ok, Result};
use tokio::runtime::Runtime;

use crate::config::NavigationConfig;
use crate::directions::GoogleDirectionsClient;
use crate::gps_processor::{Point, RawData};
use crate::logs;
use crate::navigation_tracker::{CameraCommand, NavigationStatus};
use crate::tracking_session::{ChannelLocationSource, LocationPermission, TrackingSession};

struct MainState {
    config: NavigationConfig,
    // a single worker thread: all tracking callbacks run one after another
    runtime: Runtime,
    location_source: ChannelLocationSource,
    session: Mutex<Option<TrackingSession<GoogleDirectionsClient>>>,
}

static MAIN_STATE: OnceLock<MainState> = OnceLock::new();

pub fn init(cache_dir: String, config_json: Option<String>) -> Result<()> {
    if MAIN_STATE.get().is_some() {
        warn!("`init` is called multiple times");
        return Ok(());
    }

    if let Err(e) = logs::init(&cache_dir) {
        // most likely a logger is already installed (e.g. in tests)
        eprintln!("failed to initialize logging: {e}");
    }

    let config = match config_json {
        Some(json) => NavigationConfig::from_json(&json)?,
        None => NavigationConfig::from_json("{}")?,
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("navigation")
        .enable_all()
        .build()?;

    let state = MainState {
        config,
        runtime,
        location_source: ChannelLocationSource::new(LocationPermission::Denied),
        session: Mutex::new(None),
    };
    if MAIN_STATE.set(state).is_err() {
        warn!("`init` is called multiple times");
    } else {
        info!("initialized");
    }
    Ok(())
}

fn get() -> Result<&'static MainState> {
    MAIN_STATE
        .get()
        .ok_or_else(|| anyhow!("main state is not initialized"))
}

/// Starts tracking toward the destination. The error of a denied permission
/// is meant to be shown to the user as is.
pub fn start_navigation(
    destination_latitude: f64,
    destination_longitude: f64,
    origin: Option<RawData>,
    permission: LocationPermission,
) -> Result<()> {
    let state = get()?;
    let mut session = state.session.lock().unwrap();
    if let Some(previous) = session.take() {
        info!("[api] replacing session {}", previous.id());
        state.runtime.block_on(previous.stop());
    }

    state.location_source.set_permission(permission);
    let provider = GoogleDirectionsClient::new(&state.config.directions)?;
    let destination = Point::new(destination_latitude, destination_longitude);
    let new_session = state.runtime.block_on(TrackingSession::start(
        &state.location_source,
        provider,
        state.config.clone(),
        destination,
        origin.map(|raw_data| raw_data.point),
    ))?;
    *session = Some(new_session);
    Ok(())
}

/// Returns `false` if there is no active session to take the batch.
pub fn on_location_update(mut raw_data_list: Vec<RawData>, received_timestamp_ms: i64) -> bool {
    let Some(state) = get().ok() else {
        return false;
    };
    if !state.location_source.is_subscribed() {
        return false;
    }
    // Samples without a timestamp are stamped with the batch's arrival time
    // before sorting. NOTE: batches from Android are not always in order.
    for raw_data in raw_data_list.iter_mut() {
        raw_data.timestamp_ms.get_or_insert(received_timestamp_ms);
    }
    raw_data_list.sort_by_key(|raw_data| raw_data.timestamp_ms);
    for raw_data in raw_data_list {
        if !state.location_source.push(raw_data) {
            debug!("[api] location update without an active session");
            return false;
        }
    }
    true
}

/// The user dragged the map, stop following the traveler.
pub fn on_user_pan() {
    with_session(|session| session.set_auto_follow(false));
}

pub fn recenter() {
    with_session(|session| session.set_auto_follow(true));
}

pub fn navigation_status() -> Option<NavigationStatus> {
    with_session(|session| session.status())
}

pub fn take_camera_command() -> Option<CameraCommand> {
    with_session(|session| session.take_camera_command()).flatten()
}

pub fn stop_navigation() {
    let Some(state) = get().ok() else {
        return;
    };
    let session = state.session.lock().unwrap().take();
    if let Some(session) = session {
        state.runtime.block_on(session.stop());
    }
}

fn with_session<T>(f: impl FnOnce(&TrackingSession<GoogleDirectionsClient>) -> T) -> Option<T> {
    let state = get().ok()?;
    let session = state.session.lock().unwrap();
    session.as_ref().map(f)
}
