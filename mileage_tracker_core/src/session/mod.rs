use std::sync::Arc;

use mileage_tracker_lib::{
    path_point::{GpsQuality, PathPoint},
    place::SavedPlace,
    snapshot::{SessionSnapshot, SessionStatus},
    trip_record::{ResolvedAddress, TripRecord, TripType},
};
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};

use crate::{
    accumulator::FilterLimits,
    config::TrackerConfig,
    geocoding::{AddressResolver, Geocoder, ResolutionError},
    location::{LocationEvent, LocationProvider, PermissionState, ProviderErrorCode, SubscriptionId, WatchOptions},
    places::PlaceCache,
    storage::{KeyValueStore, SessionStore},
    TrackerError,
};

mod state;

use state::SessionState;
pub use state::TripProgress;

/// State shared between the session handle and the tasks it spawns.
struct SessionCore {
    state: Mutex<SessionState>,
    store: SessionStore,
    resolver: AddressResolver,
    progress: watch::Sender<TripProgress>,
}

struct Watcher {
    id: SubscriptionId,
    task: JoinHandle<()>,
}

/**
 * TripSession records one trip at a time from a live location feed.
 *
 * Fixes are consumed by a single ingestion task per subscription, so the
 * accumulator never sees two fixes at once. Snapshots are queued to the
 * session store and address lookups run on their own tasks, neither of
 * them holds up the next fix. Lifecycle operations are serialized on the
 * watcher lock.
 */
pub struct TripSession {
    core: Arc<SessionCore>,
    provider: Arc<dyn LocationProvider>,
    places: Arc<PlaceCache>,
    limits: FilterLimits,
    options: WatchOptions,
    watcher: Mutex<Option<Watcher>>,
}

impl TripSession {
    /// Builds an idle session. Must be called inside a tokio runtime.
    pub async fn open(
        config: &TrackerConfig,
        provider: Arc<dyn LocationProvider>,
        store: Arc<dyn KeyValueStore>,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        let places = Arc::new(PlaceCache::load(store.clone(), config).await);
        let state = SessionState::idle(config.limits);
        let (progress, _) = watch::channel(state.progress());

        let core = SessionCore {
            state: Mutex::new(state),
            store: SessionStore::start(store),
            resolver: AddressResolver::new(geocoder, places.clone()),
            progress,
        };

        Self {
            core: Arc::new(core),
            provider,
            places,
            limits: config.limits,
            options: config.watch_options(),
            watcher: Mutex::new(None),
        }
    }

    /// Resumes the trip left in the store by a previous process. Returns
    /// false when there is nothing to resume or a trip is already running.
    pub async fn recover(&self) -> Result<bool, TrackerError> {
        let mut watcher = self.watcher.lock().await;

        if self.core.state.lock().await.is_tracking() {
            return Ok(false);
        }
        let Some(snapshot) = self.core.store.load().await else {
            return Ok(false);
        };

        self.ensure_permission().await?;

        tracing::info!(
            "Resuming {} trip at {:.3} mi with {} points",
            snapshot.trip_type,
            snapshot.distance_miles,
            snapshot.path.len()
        );

        let epoch = {
            let mut state = self.core.state.lock().await;
            state.restore(self.limits, snapshot);
            self.core.publish(&state);
            state.epoch
        };

        *watcher = Some(self.attach(epoch).await?);
        Ok(true)
    }

    /// Begins a new trip, replacing whatever was running.
    pub async fn start(&self) -> Result<(), TrackerError> {
        let mut watcher = self.watcher.lock().await;

        self.ensure_permission().await?;
        self.detach(&mut watcher).await;
        self.core.store.clear();

        let epoch = {
            let mut state = self.core.state.lock().await;
            state.clear(self.limits, SessionStatus::Tracking);
            self.core.publish(&state);
            tracing::info!("Started {} trip", state.trip_type);
            state.epoch
        };

        *watcher = Some(self.attach(epoch).await?);
        Ok(())
    }

    /// Reclassifies the trip. A running trip is flushed right away so the
    /// new type survives a crash.
    pub async fn change_type(&self, trip_type: TripType) {
        let mut state = self.core.state.lock().await;
        state.trip_type = trip_type;

        if state.is_tracking() {
            self.core.flush(&state);
        }
        self.core.publish(&state);
    }

    /// Finishes the trip and hands back its record. Looks up the end address
    /// first, a failed lookup leaves it empty.
    pub async fn stop(&self) -> TripRecord {
        let mut watcher = self.watcher.lock().await;

        let (tracking, end_point) = {
            let state = self.core.state.lock().await;
            (state.is_tracking(), state.accumulator.last_accepted())
        };
        if !tracking {
            tracing::debug!("Stop requested with no trip running");
            return self.core.state.lock().await.record();
        }

        self.detach(&mut watcher).await;

        let end_address = match end_point {
            Some(point) => Some(self.core.resolver.resolve(point.latitude, point.longitude).await),
            None => None,
        };

        let record = {
            let mut state = self.core.state.lock().await;
            match end_address {
                Some(Ok(address)) => {
                    state.end_address = Some(address);
                    state.geocoding_error = None;
                }
                Some(Err(err)) => {
                    tracing::warn!("End address lookup failed: {err}");
                    state.resolution_failed(&err);
                }
                None => {}
            }
            state.status = SessionStatus::Idle;
            self.core.publish(&state);
            state.record()
        };

        self.core.store.clear();
        tracing::info!("Stopped {} trip at {:.3} mi", record.trip_type, record.distance_miles);
        record
    }

    /// Drops the trip without producing a record.
    pub async fn reset(&self) {
        let mut watcher = self.watcher.lock().await;
        self.detach(&mut watcher).await;

        {
            let mut state = self.core.state.lock().await;
            state.clear(self.limits, SessionStatus::Idle);
            self.core.publish(&state);
        }

        self.core.store.clear();
        tracing::info!("Trip discarded");
    }

    /// Remembers `name` for the coordinate. False when nothing was learned.
    pub async fn learn_place(&self, latitude: f64, longitude: f64, name: &str) -> Result<bool, TrackerError> {
        self.places.save(latitude, longitude, name).await
    }

    pub async fn places(&self) -> Vec<SavedPlace> {
        self.places.places().await
    }

    pub fn progress(&self) -> TripProgress {
        self.core.progress.borrow().clone()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<TripProgress> {
        self.core.progress.subscribe()
    }

    /// Republishes the live state after the app returns to the foreground.
    pub async fn on_foreground(&self) {
        let state = self.core.state.lock().await;
        self.core.publish(&state);
    }

    /// Waits until every snapshot queued so far has been written.
    pub async fn settle(&self) {
        self.core.store.settle().await;

        let mut state = self.core.state.lock().await;
        state.apply_receipt(self.core.store.last_written());
    }

    /// The trip a previous process left in the store, while none is running here.
    pub async fn pending_trip(&self) -> Option<SessionSnapshot> {
        if self.core.state.lock().await.is_tracking() {
            return None;
        }
        self.core.store.load().await
    }

    /// Reverse geocodes a coordinate the same way trip addresses are resolved.
    pub async fn resolve(&self, latitude: f64, longitude: f64) -> Result<ResolvedAddress, ResolutionError> {
        self.core.resolver.resolve(latitude, longitude).await
    }

    async fn ensure_permission(&self) -> Result<(), TrackerError> {
        let permission = match self.provider.check_permission().await {
            Ok(PermissionState::Granted) => return Ok(()),
            Ok(_) => self.provider.request_permission().await,
            Err(err) => Err(err),
        };

        match permission {
            Ok(PermissionState::Granted) => Ok(()),
            Ok(_) => {
                tracing::warn!("Location permission not granted");
                Err(TrackerError::PermissionDenied)
            }
            Err(err) => {
                tracing::warn!("Could not obtain location permission: {err}");
                Err(TrackerError::PermissionDenied)
            }
        }
    }

    async fn attach(&self, epoch: u64) -> Result<Watcher, TrackerError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let id = match self.provider.subscribe(self.options.clone(), tx).await {
            Ok(id) => id,
            Err(err) => {
                tracing::error!("Failed to add location watcher: {err}");
                let mut state = self.core.state.lock().await;
                state.status = SessionStatus::Idle;
                self.core.publish(&state);
                return Err(err);
            }
        };

        let task = tokio::spawn(ingest(self.core.clone(), epoch, rx));
        tracing::debug!("Location watcher {} added", id.0);
        Ok(Watcher { id, task })
    }

    async fn detach(&self, watcher: &mut Option<Watcher>) {
        let Some(Watcher { id, task }) = watcher.take() else {
            return;
        };

        // The watcher counts as gone even when the provider disagrees
        if let Err(err) = self.provider.unsubscribe(id).await {
            tracing::warn!("Failed to remove location watcher {}: {err}", id.0);
        }
        task.abort();
        tracing::debug!("Location watcher {} removed", id.0);
    }
}

impl Drop for TripSession {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.get_mut().take() {
            watcher.task.abort();
        }
    }
}

impl SessionCore {
    fn publish(&self, state: &SessionState) {
        self.progress.send_replace(state.progress());
    }

    /// Queues a snapshot. The unflushed distance only drops once the
    /// write is reported back.
    fn flush(&self, state: &SessionState) {
        self.store.flush(state.snapshot(), state.epoch);
    }

    async fn handle_event(self: &Arc<Self>, epoch: u64, event: LocationEvent) {
        let mut state = self.state.lock().await;
        if state.epoch != epoch || !state.is_tracking() {
            tracing::trace!("Dropping location event for a finished trip");
            return;
        }
        state.events_received += 1;
        state.apply_receipt(self.store.last_written());

        match event {
            LocationEvent::Error(ProviderErrorCode::NotAuthorized) => {
                tracing::warn!("Location provider lost authorization");
                state.quality = GpsQuality::Poor;
            }
            LocationEvent::Error(ProviderErrorCode::Other(code)) => {
                tracing::warn!("Location provider error: {code}");
            }
            LocationEvent::Fix(fix) => {
                let outcome = state.accumulator.accept(fix);
                state.quality = outcome.quality;

                if outcome.accepted {
                    state.gps_used = true;
                }
                if outcome.flush_due {
                    self.flush(&state);
                }
                if outcome.start_point && !state.start_resolved {
                    state.start_resolved = true;
                    tokio::spawn(resolve_start(self.clone(), epoch, PathPoint::from(fix)));
                }
            }
        }

        self.publish(&state);
    }
}

async fn ingest(core: Arc<SessionCore>, epoch: u64, mut rx: mpsc::UnboundedReceiver<LocationEvent>) {
    while let Some(event) = rx.recv().await {
        core.handle_event(epoch, event).await;
    }
    tracing::debug!("Location feed closed");
}

async fn resolve_start(core: Arc<SessionCore>, epoch: u64, point: PathPoint) {
    let resolved = core.resolver.resolve(point.latitude, point.longitude).await;

    let mut state = core.state.lock().await;
    if state.epoch != epoch {
        tracing::debug!("Discarding start address of a replaced trip");
        return;
    }

    match resolved {
        Ok(address) => {
            tracing::debug!("Trip starts at {}", address.formatted);
            state.start_address = Some(address);
            state.geocoding_error = None;
        }
        Err(err) => {
            tracing::warn!("Start address lookup failed: {err}");
            state.resolution_failed(&err);
        }
    }
    core.publish(&state);
}
