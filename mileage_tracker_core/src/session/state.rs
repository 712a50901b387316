use mileage_tracker_lib::{
    path_point::{GpsQuality, PathPoint},
    snapshot::{SessionSnapshot, SessionStatus},
    trip_record::{ResolvedAddress, TripRecord, TripType},
};

use crate::{
    accumulator::{FilterLimits, PathAccumulator},
    geocoding::ResolutionError,
    storage::WriteReceipt,
};

/// What observers of a session see. A new value is published after every
/// location event, every operation and every address resolution.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TripProgress {
    pub status: SessionStatus,
    pub distance_miles: f64,
    pub path: Vec<PathPoint>,
    pub trip_type: TripType,
    pub gps_quality: GpsQuality,
    /// At least one fix was accepted in this trip.
    pub gps_used: bool,
    pub start_address: Option<ResolvedAddress>,
    pub end_address: Option<ResolvedAddress>,
    /// Why the last address lookup failed, if it did.
    pub geocoding_error: Option<String>,
    pub events_received: u64,
}

/// The live trip. Only mutated under the session lock.
pub(super) struct SessionState {
    pub status: SessionStatus,
    pub accumulator: PathAccumulator,
    pub trip_type: TripType,
    pub quality: GpsQuality,
    pub gps_used: bool,
    /// Set once the start address lookup has been kicked off, or when the
    /// trip was restored and already had its start point.
    pub start_resolved: bool,
    pub start_address: Option<ResolvedAddress>,
    pub end_address: Option<ResolvedAddress>,
    pub geocoding_error: Option<String>,
    /// Bumped whenever the trip is replaced. Work started under an older
    /// epoch is discarded when it lands.
    pub epoch: u64,
    pub events_received: u64,
}

impl SessionState {
    pub fn idle(limits: FilterLimits) -> Self {
        Self {
            status: SessionStatus::Idle,
            accumulator: PathAccumulator::new(limits),
            trip_type: TripType::default(),
            quality: GpsQuality::default(),
            gps_used: false,
            start_resolved: false,
            start_address: None,
            end_address: None,
            geocoding_error: None,
            epoch: 0,
            events_received: 0,
        }
    }

    /// Replaces the trip with a fresh one, keeping the selected trip type.
    pub fn clear(&mut self, limits: FilterLimits, status: SessionStatus) {
        *self = Self {
            status,
            trip_type: self.trip_type,
            epoch: self.epoch + 1,
            ..Self::idle(limits)
        };
    }

    pub fn restore(&mut self, limits: FilterLimits, snapshot: SessionSnapshot) {
        let resume_point = snapshot.resume_point();
        let accumulator = PathAccumulator::restore(limits, snapshot.distance_miles, snapshot.path, resume_point);

        self.clear(limits, SessionStatus::Tracking);
        self.trip_type = snapshot.trip_type;
        self.gps_used = accumulator.has_start();
        self.start_resolved = accumulator.has_start();
        self.accumulator = accumulator;
    }

    pub fn is_tracking(&self) -> bool {
        self.status == SessionStatus::Tracking
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::new(
            self.accumulator.distance_miles(),
            self.accumulator.path(),
            self.accumulator.last_accepted(),
            self.trip_type,
        )
    }

    /// Credits the newest successful write if it was made for this trip.
    pub fn apply_receipt(&mut self, receipt: Option<WriteReceipt>) {
        let Some(receipt) = receipt else {
            return;
        };
        if receipt.generation == self.epoch && self.is_tracking() {
            self.accumulator.mark_persisted(receipt.distance_miles);
        }
    }

    /// Keeps the cause of a failed lookup for the caller to show.
    /// A disabled geocoder is not worth reporting.
    pub fn resolution_failed(&mut self, err: &ResolutionError) {
        if *err != ResolutionError::Disabled {
            self.geocoding_error = Some(err.to_string());
        }
    }

    pub fn progress(&self) -> TripProgress {
        TripProgress {
            status: self.status,
            distance_miles: self.accumulator.distance_miles(),
            path: self.accumulator.path(),
            trip_type: self.trip_type,
            gps_quality: self.quality,
            gps_used: self.gps_used,
            start_address: self.start_address.clone(),
            end_address: self.end_address.clone(),
            geocoding_error: self.geocoding_error.clone(),
            events_received: self.events_received,
        }
    }

    pub fn record(&self) -> TripRecord {
        TripRecord {
            distance_miles: self.accumulator.distance_miles(),
            path: self.accumulator.path(),
            trip_type: self.trip_type,
            start_address: self.start_address.clone(),
            end_address: self.end_address.clone(),
            gps_used: self.gps_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use mileage_tracker_lib::path_point::Fix;

    use super::*;

    #[test]
    fn clear_keeps_trip_type_and_bumps_epoch() {
        let limits = FilterLimits::default();
        let mut state = SessionState::idle(limits);
        state.trip_type = TripType::Personal;
        state.accumulator.accept(Fix::new(40.0, -75.0, 5.));
        state.geocoding_error = Some("Connection error: timeout".into());

        state.clear(limits, SessionStatus::Tracking);
        assert_eq!(state.epoch, 1);
        assert_eq!(state.trip_type, TripType::Personal);
        assert!(state.is_tracking());
        assert!(!state.accumulator.has_start());
        assert_eq!(state.geocoding_error, None);
    }

    #[test]
    fn restored_trip_skips_start_lookup() {
        let limits = FilterLimits::default();
        let mut state = SessionState::idle(limits);
        let a = PathPoint::new(40.0, -75.0, 8.);
        let b = PathPoint::new(40.0004, -75.0, 8.);

        state.restore(limits, SessionSnapshot::new(0.0276, vec![a, b], Some(b), TripType::Personal));

        assert!(state.is_tracking());
        assert!(state.start_resolved);
        assert!(state.gps_used);
        assert_eq!(state.trip_type, TripType::Personal);
        assert_eq!(state.accumulator.last_accepted(), Some(b));
        assert_eq!(state.record().path, vec![a, b]);
        assert_eq!(state.snapshot().distance_miles, 0.0276);
    }

    #[test]
    fn receipts_from_other_trips_are_ignored() {
        let limits = FilterLimits::default();
        let mut state = SessionState::idle(limits);
        state.clear(limits, SessionStatus::Tracking);
        state.accumulator.accept(Fix::new(40.0, -75.0, 5.));
        state.accumulator.accept(Fix::new(40.0006, -75.0, 5.));
        let distance = state.accumulator.distance_miles();

        state.apply_receipt(Some(WriteReceipt { generation: state.epoch - 1, distance_miles: distance }));
        assert_eq!(state.accumulator.unflushed_miles(), distance);

        state.apply_receipt(None);
        assert_eq!(state.accumulator.unflushed_miles(), distance);

        state.apply_receipt(Some(WriteReceipt { generation: state.epoch, distance_miles: distance }));
        assert_eq!(state.accumulator.unflushed_miles(), 0.);
    }

    #[test]
    fn disabled_geocoder_is_silent() {
        let mut state = SessionState::idle(FilterLimits::default());
        state.resolution_failed(&ResolutionError::Disabled);
        assert_eq!(state.geocoding_error, None);

        state.resolution_failed(&ResolutionError::Status("REQUEST_DENIED".into()));
        assert_eq!(state.geocoding_error.as_deref(), Some("Geocoder returned REQUEST_DENIED"));
    }
}
