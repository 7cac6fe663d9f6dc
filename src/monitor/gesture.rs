//! Gesture segmentation
//!
//! Continuous offset streams produce a sample every frame. The session model
//! counts discrete scrolls, so consecutive samples are folded into one
//! gesture until the stream goes quiet or flips direction.

use crate::types::{seconds_between, Sample, ScrollDirection, ScrollEvent, Vector2};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One inbound gesture sample from the host
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GestureInput {
    /// Content offset; velocity is derived by the tracker
    Position {
        position: Vector2,
        timestamp: DateTime<Utc>,
    },
    /// Velocity already computed by the host recognizer
    Velocity {
        velocity: Vector2,
        position: Vector2,
        timestamp: DateTime<Utc>,
    },
}

impl GestureInput {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            GestureInput::Position { timestamp, .. } | GestureInput::Velocity { timestamp, .. } => *timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct OpenGesture {
    start: DateTime<Utc>,
    last: DateTime<Utc>,
    direction: ScrollDirection,
    magnitude_sum: f64,
    sample_count: u32,
    distance: f64,
    last_position: Vector2,
    acceleration: f64,
}

impl OpenGesture {
    fn begin(sample: &Sample, acceleration: f64) -> Self {
        Self {
            start: sample.timestamp,
            last: sample.timestamp,
            direction: sample.direction,
            magnitude_sum: sample.magnitude,
            sample_count: 1,
            distance: 0.0,
            last_position: sample.position,
            acceleration,
        }
    }

    fn close(self) -> ScrollEvent {
        ScrollEvent {
            timestamp: self.start,
            direction: self.direction,
            velocity: self.magnitude_sum / self.sample_count as f64,
            acceleration: Some(self.acceleration),
            distance: Some(self.distance),
            duration_sec: Some(seconds_between(self.start, self.last)),
        }
    }
}

/// Folds accepted samples into discrete scroll events
#[derive(Debug, Clone, PartialEq)]
pub struct GestureSegmenter {
    gap_sec: f64,
    current: Option<OpenGesture>,
}

impl GestureSegmenter {
    pub fn new(gap_sec: f64) -> Self {
        Self { gap_sec, current: None }
    }

    pub fn set_gap(&mut self, gap_sec: f64) {
        self.gap_sec = gap_sec;
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Add a sample; returns the previous gesture if this sample closed it
    pub fn push(&mut self, sample: &Sample, acceleration: f64) -> Option<ScrollEvent> {
        let Some(open) = self.current.as_mut() else {
            self.current = Some(OpenGesture::begin(sample, acceleration));
            return None;
        };

        let gap = seconds_between(open.last, sample.timestamp);
        let reversed = open.direction.is_known()
            && sample.direction.is_known()
            && open.direction != sample.direction;

        if gap >= self.gap_sec || reversed {
            let closed = self.current.replace(OpenGesture::begin(sample, acceleration));
            return closed.map(OpenGesture::close);
        }

        open.last = sample.timestamp;
        open.magnitude_sum += sample.magnitude;
        open.sample_count += 1;
        open.distance += (sample.position - open.last_position).magnitude();
        open.last_position = sample.position;
        open.acceleration = acceleration;
        if !open.direction.is_known() {
            open.direction = sample.direction;
        }
        None
    }

    /// Close the open gesture if the stream has gone quiet
    pub fn flush_if_idle(&mut self, now: DateTime<Utc>) -> Option<ScrollEvent> {
        let idle = self
            .current
            .as_ref()
            .map(|g| seconds_between(g.last, now) >= self.gap_sec)
            .unwrap_or(false);
        if idle {
            self.flush()
        } else {
            None
        }
    }

    /// Close the open gesture unconditionally
    pub fn flush(&mut self) -> Option<ScrollEvent> {
        self.current.take().map(OpenGesture::close)
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::add_seconds;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 17, 20, 0, 0).unwrap()
    }

    fn sample(offset_sec: f64, y: f64, vy: f64) -> Sample {
        let velocity = Vector2::new(0.0, vy);
        Sample {
            timestamp: add_seconds(t0(), offset_sec),
            position: Vector2::new(0.0, y),
            velocity,
            magnitude: velocity.magnitude(),
            direction: if vy > 0.0 {
                ScrollDirection::Down
            } else if vy < 0.0 {
                ScrollDirection::Up
            } else {
                ScrollDirection::Unknown
            },
        }
    }

    #[test]
    fn test_gap_closes_gesture() {
        let mut segmenter = GestureSegmenter::new(0.25);
        assert!(segmenter.push(&sample(0.0, 0.0, 400.0), 0.0).is_none());
        assert!(segmenter.push(&sample(0.05, 20.0, 400.0), 0.0).is_none());
        assert!(segmenter.push(&sample(0.10, 40.0, 600.0), 100.0).is_none());

        let event = segmenter.push(&sample(1.0, 60.0, 300.0), 0.0).unwrap();
        assert_eq!(event.timestamp, t0());
        assert_eq!(event.direction, ScrollDirection::Down);
        assert!((event.velocity - 1400.0 / 3.0).abs() < 1e-9);
        assert_eq!(event.distance, Some(40.0));
        assert_eq!(event.duration_sec, Some(0.1));
        assert_eq!(event.acceleration, Some(100.0));
        assert!(segmenter.is_open());
    }

    #[test]
    fn test_direction_flip_closes_gesture() {
        let mut segmenter = GestureSegmenter::new(0.25);
        segmenter.push(&sample(0.0, 100.0, 300.0), 0.0);
        let event = segmenter.push(&sample(0.05, 90.0, -300.0), 0.0).unwrap();
        assert_eq!(event.direction, ScrollDirection::Down);

        let event = segmenter.flush().unwrap();
        assert_eq!(event.direction, ScrollDirection::Up);
        assert!(!segmenter.is_open());
    }

    #[test]
    fn test_unknown_start_takes_first_known_direction() {
        let mut segmenter = GestureSegmenter::new(0.25);
        segmenter.push(&sample(0.0, 0.0, 0.0), 0.0);
        segmenter.push(&sample(0.05, 10.0, 200.0), 0.0);
        let event = segmenter.flush().unwrap();
        assert_eq!(event.direction, ScrollDirection::Down);
    }

    #[test]
    fn test_flush_if_idle() {
        let mut segmenter = GestureSegmenter::new(0.25);
        segmenter.push(&sample(0.0, 0.0, 300.0), 0.0);

        assert!(segmenter.flush_if_idle(add_seconds(t0(), 0.1)).is_none());
        assert!(segmenter.flush_if_idle(add_seconds(t0(), 0.3)).is_some());
        assert!(segmenter.flush_if_idle(add_seconds(t0(), 5.0)).is_none());
    }
}
