use std::future::Future;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::NavigationConfig;
use crate::directions::DirectionsProvider;
use crate::gps_processor::{FilterResult, LocationFilter, Point, RawData};
use crate::navigation_tracker::{
    CameraCommand, DeviationDecision, NavigationStatus, NavigationTracker, PendingFetch,
};
use crate::route_deviation;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LocationPermission {
    Granted,
    Denied,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WatchOptions {
    pub min_interval_ms: i64,
    pub min_distance_m: f64,
}

impl From<&NavigationConfig> for WatchOptions {
    fn from(config: &NavigationConfig) -> Self {
        WatchOptions {
            min_interval_ms: config.location_min_interval_ms,
            min_distance_m: config.location_min_distance_m,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    #[error("Location permission is required to start navigation")]
    PermissionDenied,
    #[error("failed to subscribe to location updates: {0}")]
    Subscribe(anyhow::Error),
}

/// A live subscription to the location sensor. Dropping it releases the
/// platform subscription.
pub struct LocationSubscription {
    receiver: mpsc::UnboundedReceiver<RawData>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl LocationSubscription {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<RawData>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        LocationSubscription {
            receiver,
            release: Some(Box::new(release)),
        }
    }

    pub async fn recv(&mut self) -> Option<RawData> {
        self.receiver.recv().await
    }
}

impl Drop for LocationSubscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

pub trait LocationSource: Send + Sync {
    fn request_permission(&self) -> impl Future<Output = LocationPermission> + Send;

    fn subscribe(&self, options: WatchOptions) -> Result<LocationSubscription>;
}

type SenderSlot = Arc<Mutex<Option<mpsc::UnboundedSender<RawData>>>>;

/// Location source fed by the host: the platform's sensor callback calls
/// `push` for every fix it receives.
pub struct ChannelLocationSource {
    permission: Mutex<LocationPermission>,
    sender: SenderSlot,
    options: Mutex<Option<WatchOptions>>,
}

impl ChannelLocationSource {
    pub fn new(permission: LocationPermission) -> Self {
        ChannelLocationSource {
            permission: Mutex::new(permission),
            sender: Arc::new(Mutex::new(None)),
            options: Mutex::new(None),
        }
    }

    pub fn set_permission(&self, permission: LocationPermission) {
        *self.permission.lock().unwrap() = permission;
    }

    /// Returns `false` if nobody is subscribed.
    pub fn push(&self, raw_data: RawData) -> bool {
        match self.sender.lock().unwrap().as_ref() {
            Some(sender) => sender.send(raw_data).is_ok(),
            None => false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.sender.lock().unwrap().is_some()
    }

    /// The options requested by the current subscriber, to be forwarded to the
    /// platform sensor.
    pub fn watch_options(&self) -> Option<WatchOptions> {
        *self.options.lock().unwrap()
    }
}

impl LocationSource for ChannelLocationSource {
    async fn request_permission(&self) -> LocationPermission {
        *self.permission.lock().unwrap()
    }

    fn subscribe(&self, options: WatchOptions) -> Result<LocationSubscription> {
        let mut sender = self.sender.lock().unwrap();
        if sender.is_some() {
            bail!("location source already has a subscriber");
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *sender = Some(tx);
        *self.options.lock().unwrap() = Some(options);
        debug!("[session] location subscription acquired");

        let slot = self.sender.clone();
        Ok(LocationSubscription::new(rx, move || {
            if let Ok(mut sender) = slot.lock() {
                *sender = None;
            }
            debug!("[session] location subscription released");
        }))
    }
}

/// One navigation screen's worth of tracking: created when the screen opens,
/// torn down by `stop` (or drop) when it closes.
pub struct TrackingSession<P: DirectionsProvider> {
    id: Uuid,
    tracker: NavigationTracker<P>,
    camera: Arc<Mutex<Option<CameraCommand>>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl<P: DirectionsProvider> TrackingSession<P> {
    /// Must be called from within a tokio runtime.
    pub async fn start<S: LocationSource>(
        source: &S,
        provider: P,
        config: NavigationConfig,
        destination: Point,
        origin: Option<Point>,
    ) -> Result<Self, NavigationError> {
        if source.request_permission().await == LocationPermission::Denied {
            warn!("[session] location permission denied");
            return Err(NavigationError::PermissionDenied);
        }
        let subscription = source
            .subscribe(WatchOptions::from(&config))
            .map_err(NavigationError::Subscribe)?;

        let id = Uuid::new_v4();
        let tracker = NavigationTracker::new(provider, config, destination);
        if let Some(origin) = origin {
            spawn_fetch(tracker.fetch_route(origin, destination, Utc::now().timestamp_millis()));
        }

        let camera = Arc::new(Mutex::new(None));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_location_loop(
            id,
            tracker.clone(),
            subscription,
            camera.clone(),
            shutdown_rx,
        ));
        info!(
            "[session] {} started, destination {}",
            id,
            destination.to_query_value()
        );

        Ok(TrackingSession {
            id,
            tracker,
            camera,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tracker(&self) -> &NavigationTracker<P> {
        &self.tracker
    }

    pub fn status(&self) -> NavigationStatus {
        self.tracker.status()
    }

    pub fn set_auto_follow(&self, enabled: bool) {
        self.tracker.set_auto_follow(enabled);
    }

    /// The latest camera instruction not yet handed to the map.
    pub fn take_camera_command(&self) -> Option<CameraCommand> {
        self.camera.lock().unwrap().take()
    }

    pub async fn stop(mut self) {
        self.shut_down();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("[session] {} location loop ended abnormally: {}", self.id, e);
            }
        }
        info!("[session] {} stopped", self.id);
    }

    fn shut_down(&mut self) {
        self.tracker.end();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl<P: DirectionsProvider> Drop for TrackingSession<P> {
    fn drop(&mut self) {
        self.shut_down();
        // aborting drops the loop, and with it the location subscription
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn spawn_fetch(pending: PendingFetch) {
    let kind = pending.kind();
    let seq = pending.seq();
    tokio::spawn(async move {
        let outcome = pending.await;
        debug!("[session] {:?} fetch #{} finished: {:?}", kind, seq, outcome);
    });
}

fn process_sample<P: DirectionsProvider>(
    tracker: &NavigationTracker<P>,
    sample: &RawData,
    now_ms: i64,
    camera: &Mutex<Option<CameraCommand>>,
) {
    if tracker.needs_initial_route() {
        spawn_fetch(tracker.fetch_route(sample.point, tracker.destination(), now_ms));
    }

    let update = tracker.on_position_update(sample, now_ms);
    if let Some(command) = update.camera {
        *camera.lock().unwrap() = Some(command);
    }
    if let Some(pending) = update.eta_refresh {
        spawn_fetch(pending);
    }

    if let Some(route) = tracker.current_route() {
        let deviation_m = route_deviation::distance_from_route_m(&sample.point, &route.points);
        if let DeviationDecision::Reroute(pending) = tracker.on_route_deviation(deviation_m, now_ms)
        {
            spawn_fetch(pending);
        }
    }
}

async fn run_location_loop<P: DirectionsProvider>(
    id: Uuid,
    tracker: NavigationTracker<P>,
    mut subscription: LocationSubscription,
    camera: Arc<Mutex<Option<CameraCommand>>>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut filter = LocationFilter::new(
        tracker.config().location_min_interval_ms,
        tracker.config().location_min_distance_m,
    );
    loop {
        let sample = tokio::select! {
            _ = &mut shutdown => break,
            sample = subscription.recv() => match sample {
                Some(sample) => sample.normalized(),
                None => break,
            },
        };
        match filter.process(&sample) {
            FilterResult::Accept => (),
            result => {
                debug!("[session] {} skipping sample: {:?}", id, result);
                continue;
            }
        }
        // Device timestamps only feed the filter. Every tracker timer runs on
        // the wall clock, the same one that stamped the initial fetch.
        process_sample(&tracker, &sample, Utc::now().timestamp_millis(), &camera);
    }
    debug!("[session] {} location loop finished", id);
}
