//! Velocity tracking
//!
//! Converts a stream of timestamped content offsets (or velocities supplied by
//! a host gesture recognizer) into smoothed velocity and acceleration signals
//! and a bounded window of samples. Windowed statistics are computed on demand.
//!
//! Too-frequent or out-of-order input is dropped silently. This bounds the
//! work done per input burst and is not an error.

use crate::config::{DetectionConfig, MAX_PREALLOCATED};
use crate::types::{seconds_between, Sample, ScrollDirection, Vector2};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::trace;

/// A sample must be newer than this to count as "still scrolling"
pub const SCROLLING_RECENCY_SEC: f64 = 0.5;

/// Tracker parameters, extracted from [`DetectionConfig`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub velocity_alpha: f64,
    pub vector_alpha: f64,
    pub acceleration_alpha: f64,
    pub max_sample_count: usize,
    pub max_sample_age_sec: f64,
    pub minimum_sample_interval_sec: f64,
    pub minimum_direction_speed: f64,
    pub direction_dominance_ratio: f64,
    pub stopped_velocity: f64,
    pub feed_direction: ScrollDirection,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::from(&DetectionConfig::default())
    }
}

impl From<&DetectionConfig> for TrackerConfig {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            velocity_alpha: config.smoothing.velocity_alpha,
            vector_alpha: config.smoothing.vector_alpha,
            acceleration_alpha: config.smoothing.acceleration_alpha,
            max_sample_count: config.windows.max_sample_count,
            max_sample_age_sec: config.windows.max_sample_age_sec,
            minimum_sample_interval_sec: config.windows.minimum_sample_interval_sec,
            minimum_direction_speed: config.velocity.minimum_direction_speed,
            direction_dominance_ratio: config.velocity.direction_dominance_ratio,
            stopped_velocity: config.velocity.stopped_velocity,
            feed_direction: config.monitoring.feed_direction,
        }
    }
}

/// Windowed statistics over the tracker's samples
///
/// Requires at least 2 samples; otherwise every field is zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityStatistics {
    pub average_velocity: f64,
    pub peak_velocity: f64,
    pub minimum_velocity: f64,
    /// Sample standard deviation (n-1 denominator)
    pub standard_deviation: f64,
    pub coefficient_of_variation: f64,
    /// Mean of per-pair accelerations (signed, points/s^2)
    pub average_acceleration: f64,
    /// Largest per-pair acceleration magnitude
    pub peak_acceleration: f64,
    /// Share of known-direction samples moving in the feed direction
    pub downward_ratio: f64,
    pub direction_changes: u32,
    pub time_span_sec: f64,
    pub sample_count: usize,
}

impl VelocityStatistics {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count < 2
    }
}

/// Classify a velocity vector into a scroll direction
///
/// The dominant axis must exceed the other by `dominance_ratio`; vectors
/// slower than `minimum_speed` have no direction.
pub fn classify_direction(velocity: Vector2, minimum_speed: f64, dominance_ratio: f64) -> ScrollDirection {
    let magnitude = velocity.magnitude();
    if magnitude < minimum_speed || magnitude == 0.0 {
        return ScrollDirection::Unknown;
    }

    let (ax, ay) = (velocity.x.abs(), velocity.y.abs());
    if ay >= ax * dominance_ratio {
        if velocity.y > 0.0 {
            ScrollDirection::Down
        } else {
            ScrollDirection::Up
        }
    } else if ax >= ay * dominance_ratio {
        if velocity.x > 0.0 {
            ScrollDirection::Right
        } else {
            ScrollDirection::Left
        }
    } else {
        ScrollDirection::Unknown
    }
}

/// Smoothed velocity tracker with a bounded sample window
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityTracker {
    config: TrackerConfig,
    samples: VecDeque<Sample>,
    last_position: Option<Vector2>,
    last_timestamp: Option<DateTime<Utc>>,
    /// Raw magnitude of the previous accepted sample
    last_magnitude: Option<f64>,
    smoothed_magnitude: Option<f64>,
    smoothed_vector: Option<Vector2>,
    smoothed_acceleration: Option<f64>,
}

impl Default for VelocityTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl VelocityTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            samples: VecDeque::with_capacity(config.max_sample_count.min(MAX_PREALLOCATED)),
            config,
            last_position: None,
            last_timestamp: None,
            last_magnitude: None,
            smoothed_magnitude: None,
            smoothed_vector: None,
            smoothed_acceleration: None,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Replace the configuration and re-apply pruning
    pub fn set_config(&mut self, config: TrackerConfig) {
        self.config = config;
        self.prune();
    }

    /// Record a content offset; velocity is derived from the previous offset
    ///
    /// Returns `None` for the first call on a fresh tracker, whenever the
    /// sample arrives sooner than the minimum sample interval, and for
    /// non-finite input. Rejected samples leave the tracker untouched.
    pub fn record_sample(&mut self, position: Vector2, timestamp: DateTime<Utc>) -> Option<Sample> {
        let (previous_position, dt) = self.accept_interval(position, timestamp)?;
        let velocity = (position - previous_position) / dt;
        if !velocity.is_finite() {
            trace!("velocity sample dropped: derived velocity overflowed");
            return None;
        }
        Some(self.push(position, velocity, timestamp, dt))
    }

    /// Record a velocity computed by the caller
    ///
    /// Same contract as [`record_sample`](Self::record_sample).
    pub fn record_velocity(
        &mut self,
        velocity: Vector2,
        position: Vector2,
        timestamp: DateTime<Utc>,
    ) -> Option<Sample> {
        if !velocity.is_finite() {
            trace!("velocity sample dropped: non-finite velocity");
            return None;
        }
        let (_, dt) = self.accept_interval(position, timestamp)?;
        Some(self.push(position, velocity, timestamp, dt))
    }

    /// Previous position and elapsed time, or `None` if there is nothing to
    /// record (first call, or the sample came too soon)
    fn accept_interval(&mut self, position: Vector2, timestamp: DateTime<Utc>) -> Option<(Vector2, f64)> {
        if !position.is_finite() {
            trace!("velocity sample dropped: non-finite position");
            return None;
        }

        let (last_position, last_timestamp) = match (self.last_position, self.last_timestamp) {
            (Some(p), Some(t)) => (p, t),
            _ => {
                self.last_position = Some(position);
                self.last_timestamp = Some(timestamp);
                return None;
            }
        };

        let dt = seconds_between(last_timestamp, timestamp);
        if dt <= 0.0 || dt < self.config.minimum_sample_interval_sec {
            trace!(dt, "velocity sample dropped: below minimum interval");
            return None;
        }

        Some((last_position, dt))
    }

    fn push(&mut self, position: Vector2, velocity: Vector2, timestamp: DateTime<Utc>, dt: f64) -> Sample {
        let magnitude = velocity.magnitude();
        let direction = classify_direction(
            velocity,
            self.config.minimum_direction_speed,
            self.config.direction_dominance_ratio,
        );

        if let Some(previous) = self.last_magnitude {
            if dt > 0.0 {
                let acceleration = (magnitude - previous) / dt;
                self.smoothed_acceleration = Some(ema(
                    self.smoothed_acceleration,
                    acceleration,
                    self.config.acceleration_alpha,
                ));
            }
        }
        self.smoothed_magnitude = Some(ema(self.smoothed_magnitude, magnitude, self.config.velocity_alpha));
        self.smoothed_vector = Some(match self.smoothed_vector {
            Some(prev) => prev * (1.0 - self.config.vector_alpha) + velocity * self.config.vector_alpha,
            None => velocity,
        });

        self.last_position = Some(position);
        self.last_timestamp = Some(timestamp);
        self.last_magnitude = Some(magnitude);

        let sample = Sample {
            timestamp,
            position,
            velocity,
            magnitude,
            direction,
        };
        self.samples.push_back(sample);
        self.prune();
        sample
    }

    /// Drop samples older than the max age (relative to the newest sample),
    /// then the oldest excess beyond the max count
    fn prune(&mut self) {
        if let Some(newest) = self.samples.back().map(|s| s.timestamp) {
            while let Some(oldest) = self.samples.front() {
                if seconds_between(oldest.timestamp, newest) > self.config.max_sample_age_sec {
                    self.samples.pop_front();
                } else {
                    break;
                }
            }
        }
        while self.samples.len() > self.config.max_sample_count {
            self.samples.pop_front();
        }
    }

    /// Compute statistics over samples within `window_sec` of `now`
    /// (the whole window if `None`)
    pub fn calculate_statistics(&self, window_sec: Option<f64>, now: DateTime<Utc>) -> VelocityStatistics {
        let samples: Vec<&Sample> = match window_sec {
            Some(window) => self
                .samples
                .iter()
                .filter(|s| seconds_between(s.timestamp, now) <= window)
                .collect(),
            None => self.samples.iter().collect(),
        };

        if samples.len() < 2 {
            return VelocityStatistics::empty();
        }

        let n = samples.len() as f64;
        let magnitudes: Vec<f64> = samples.iter().map(|s| s.magnitude).collect();
        let average = magnitudes.iter().sum::<f64>() / n;
        let peak = magnitudes.iter().cloned().fold(f64::MIN, f64::max);
        let minimum = magnitudes.iter().cloned().fold(f64::MAX, f64::min);

        let standard_deviation = if peak == minimum {
            0.0
        } else {
            let variance = magnitudes.iter().map(|m| (m - average).powi(2)).sum::<f64>() / (n - 1.0);
            variance.sqrt()
        };
        let coefficient_of_variation = if average > 0.0 {
            standard_deviation / average
        } else {
            0.0
        };

        let accelerations: Vec<f64> = samples
            .windows(2)
            .filter_map(|pair| {
                let dt = seconds_between(pair[0].timestamp, pair[1].timestamp);
                (dt > 0.0).then(|| (pair[1].magnitude - pair[0].magnitude) / dt)
            })
            .collect();
        let (average_acceleration, peak_acceleration) = if accelerations.is_empty() {
            (0.0, 0.0)
        } else {
            (
                accelerations.iter().sum::<f64>() / accelerations.len() as f64,
                accelerations.iter().map(|a| a.abs()).fold(0.0, f64::max),
            )
        };

        let known: Vec<ScrollDirection> = samples
            .iter()
            .map(|s| s.direction)
            .filter(ScrollDirection::is_known)
            .collect();
        let downward_ratio = if known.is_empty() {
            0.0
        } else {
            known.iter().filter(|d| **d == self.config.feed_direction).count() as f64 / known.len() as f64
        };
        let direction_changes = known.windows(2).filter(|pair| pair[0] != pair[1]).count() as u32;

        let time_span_sec = match (samples.first(), samples.last()) {
            (Some(first), Some(last)) => seconds_between(first.timestamp, last.timestamp),
            _ => 0.0,
        };

        VelocityStatistics {
            average_velocity: average,
            peak_velocity: peak,
            minimum_velocity: minimum,
            standard_deviation,
            coefficient_of_variation,
            average_acceleration,
            peak_acceleration,
            downward_ratio,
            direction_changes,
            time_span_sec,
            sample_count: samples.len(),
        }
    }

    /// True if the newest sample is recent and the smoothed speed is above
    /// the stopped threshold
    pub fn is_scrolling(&self, now: DateTime<Utc>) -> bool {
        let recent = self
            .samples
            .back()
            .map(|s| seconds_between(s.timestamp, now) < SCROLLING_RECENCY_SEC)
            .unwrap_or(false);
        recent && self.smoothed_velocity() > self.config.stopped_velocity
    }

    /// Smoothed speed (points/s), 0 before the first sample
    pub fn smoothed_velocity(&self) -> f64 {
        self.smoothed_magnitude.unwrap_or(0.0)
    }

    pub fn smoothed_vector(&self) -> Vector2 {
        self.smoothed_vector.unwrap_or(Vector2::ZERO)
    }

    pub fn smoothed_acceleration(&self) -> f64 {
        self.smoothed_acceleration.unwrap_or(0.0)
    }

    /// Direction of the smoothed velocity vector
    pub fn current_direction(&self) -> ScrollDirection {
        classify_direction(
            self.smoothed_vector(),
            self.config.minimum_direction_speed,
            self.config.direction_dominance_ratio,
        )
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn last_sample(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Clear the window and all smoothed state
    pub fn reset(&mut self) {
        self.samples.clear();
        self.last_position = None;
        self.last_timestamp = None;
        self.last_magnitude = None;
        self.smoothed_magnitude = None;
        self.smoothed_vector = None;
        self.smoothed_acceleration = None;
    }
}

fn ema(previous: Option<f64>, value: f64, alpha: f64) -> f64 {
    match previous {
        Some(prev) => alpha * value + (1.0 - alpha) * prev,
        None => value,
    }
}
