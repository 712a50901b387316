use std::collections::VecDeque;

use mileage_tracker_lib::{
    geo_math::haversine_miles,
    path_point::{Fix, GpsQuality, PathPoint},
};

/// Thresholds the accumulator filters fixes with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterLimits {
    /// Fixes with a larger accuracy radius are dropped outright.
    pub max_accuracy_meters: f64,
    /// A single step longer than this is a GPS jump.
    pub max_jump_miles: f64,
    /// A single step shorter than this is stationary noise (~5 m).
    pub min_movement_miles: f64,
    /// Unflushed distance (~50 m) that makes a durable flush due.
    pub flush_threshold_miles: f64,
    pub max_path_points: usize,
    /// Consecutive jumps after which the last fix is re-anchored. 0 disables.
    pub reanchor_after_jumps: u32,
}

impl Default for FilterLimits {
    fn default() -> Self {
        Self {
            max_accuracy_meters: 50.,
            max_jump_miles: 0.5,
            min_movement_miles: 0.0031,
            flush_threshold_miles: 0.03,
            max_path_points: 500,
            reanchor_after_jumps: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    LowAccuracy,
    Jump,
    Stationary,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptanceOutcome {
    pub accepted: bool,
    pub distance_added_miles: f64,
    pub quality: GpsQuality,
    pub rejection: Option<Rejection>,
    /// The fix became the first point of the trip.
    pub start_point: bool,
    /// The caller should write a snapshot, and call `mark_persisted` once the
    /// write has succeeded. Stays due on later fixes until then.
    pub flush_due: bool,
    /// A run of jumps moved the anchor without adding distance.
    pub reanchored: bool,
}

impl AcceptanceOutcome {
    fn rejected(quality: GpsQuality, rejection: Rejection) -> Self {
        Self {
            accepted: false,
            distance_added_miles: 0.,
            quality,
            rejection: Some(rejection),
            start_point: false,
            flush_due: false,
            reanchored: false,
        }
    }

    fn accepted(quality: GpsQuality, distance_added_miles: f64, start_point: bool, flush_due: bool) -> Self {
        Self {
            accepted: true,
            distance_added_miles,
            quality,
            rejection: None,
            start_point,
            flush_due,
            reanchored: false,
        }
    }
}

/// Turns a stream of raw fixes into a distance and a bounded path,
/// dropping inaccurate fixes, GPS jumps and stationary jitter.
#[derive(Debug, Clone)]
pub struct PathAccumulator {
    limits: FilterLimits,
    distance_miles: f64,
    /// Distance covered by the last successfully written snapshot.
    persisted_miles: f64,
    path: VecDeque<PathPoint>,
    last_accepted: Option<PathPoint>,
    consecutive_jumps: u32,
}

impl PathAccumulator {
    pub fn new(limits: FilterLimits) -> Self {
        Self {
            limits,
            distance_miles: 0.,
            persisted_miles: 0.,
            path: VecDeque::new(),
            last_accepted: None,
            consecutive_jumps: 0,
        }
    }

    /// Rebuilds the accumulator from a persisted trip. Nothing is unflushed.
    pub fn restore(limits: FilterLimits, distance_miles: f64, path: Vec<PathPoint>, last_accepted: Option<PathPoint>) -> Self {
        let mut accumulator = Self::new(limits);
        accumulator.distance_miles = distance_miles.max(0.);
        accumulator.persisted_miles = accumulator.distance_miles;
        accumulator.last_accepted = last_accepted.or_else(|| path.last().copied());
        for point in path {
            accumulator.push_point(point);
        }
        accumulator
    }

    pub fn accept(&mut self, fix: Fix) -> AcceptanceOutcome {
        let quality = GpsQuality::from_accuracy(fix.accuracy_meters);

        // Written so that a NaN accuracy is rejected too
        if !(fix.accuracy_meters <= self.limits.max_accuracy_meters) {
            tracing::trace!("Dropping fix with accuracy {} m", fix.accuracy_meters);
            return AcceptanceOutcome::rejected(quality, Rejection::LowAccuracy);
        }

        let point = PathPoint::from(fix);

        let Some(last) = self.last_accepted else {
            self.push_point(point);
            self.last_accepted = Some(point);
            return AcceptanceOutcome::accepted(quality, 0., true, true);
        };

        let step = haversine_miles(last.latitude, last.longitude, point.latitude, point.longitude);

        if step > self.limits.max_jump_miles {
            self.consecutive_jumps += 1;
            tracing::debug!("Rejected jump of {:.3} mi ({} in a row)", step, self.consecutive_jumps);

            let mut outcome = AcceptanceOutcome::rejected(quality, Rejection::Jump);
            if self.limits.reanchor_after_jumps > 0 && self.consecutive_jumps >= self.limits.reanchor_after_jumps {
                tracing::info!("Re-anchoring path after {} consecutive jumps", self.consecutive_jumps);
                self.consecutive_jumps = 0;
                self.push_point(point);
                self.last_accepted = Some(point);
                outcome.reanchored = true;
            }
            return outcome;
        }
        self.consecutive_jumps = 0;

        if step < self.limits.min_movement_miles {
            tracing::trace!("Ignoring {:.5} mi of stationary noise", step);
            return AcceptanceOutcome::rejected(quality, Rejection::Stationary);
        }

        self.distance_miles += step;
        self.push_point(point);
        self.last_accepted = Some(point);

        let flush_due = self.unflushed_miles() >= self.limits.flush_threshold_miles;
        AcceptanceOutcome::accepted(quality, step, false, flush_due)
    }

    /// Records a successful write of a snapshot taken at `distance_miles`.
    /// Writes land in order, so an older receipt never moves this back.
    pub fn mark_persisted(&mut self, distance_miles: f64) {
        self.persisted_miles = self.persisted_miles.max(distance_miles.min(self.distance_miles));
    }

    pub fn distance_miles(&self) -> f64 {
        self.distance_miles
    }

    /// Distance accumulated since the last successful write.
    pub fn unflushed_miles(&self) -> f64 {
        self.distance_miles - self.persisted_miles
    }

    pub fn last_accepted(&self) -> Option<PathPoint> {
        self.last_accepted
    }

    pub fn path(&self) -> Vec<PathPoint> {
        self.path.iter().copied().collect()
    }

    pub fn path_len(&self) -> usize {
        self.path.len()
    }

    pub fn has_start(&self) -> bool {
        self.last_accepted.is_some()
    }

    fn push_point(&mut self, point: PathPoint) {
        self.path.push_back(point);
        while self.path.len() > self.limits.max_path_points {
            self.path.pop_front();
        }
    }
}
