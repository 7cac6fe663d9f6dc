//! Session model
//!
//! A session is one continuous monitoring period in one app context. It owns a
//! bounded rolling window of scroll events plus lifetime aggregates. All
//! metrics are recomputed from current state on access.

use crate::config::{DetectionConfig, MAX_PREALLOCATED};
use crate::types::{
    seconds_between, ScrollDirection, ScrollEvent, SessionRef, SessionState, SessionSummary,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Default rolling window of events
pub const DEFAULT_EVENT_WINDOW: usize = 50;

/// One continuous monitoring period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionModel {
    id: Uuid,
    app_context: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    state: SessionState,
    total_scroll_count: u32,
    downward_scroll_count: u32,
    direction_changes: u32,
    total_velocity: f64,
    /// Last non-unknown direction, for change counting
    last_known_direction: Option<ScrollDirection>,
    events: VecDeque<ScrollEvent>,
    window_size: usize,
    feed_direction: ScrollDirection,
}

impl SessionModel {
    /// Start a new active session
    pub fn new(
        app_context: impl Into<String>,
        start_time: DateTime<Utc>,
        window_size: usize,
        feed_direction: ScrollDirection,
    ) -> Self {
        let window_size = window_size.max(1);
        Self {
            id: Uuid::new_v4(),
            app_context: app_context.into(),
            start_time,
            end_time: None,
            state: SessionState::Active,
            total_scroll_count: 0,
            downward_scroll_count: 0,
            direction_changes: 0,
            total_velocity: 0.0,
            last_known_direction: None,
            events: VecDeque::with_capacity(window_size.min(MAX_PREALLOCATED)),
            window_size,
            feed_direction,
        }
    }

    pub fn from_config(app_context: impl Into<String>, start_time: DateTime<Utc>, config: &DetectionConfig) -> Self {
        Self::new(
            app_context,
            start_time,
            config.windows.event_window_size,
            config.monitoring.feed_direction,
        )
    }

    /// Fold an event into the session
    ///
    /// Ignored once the session has ended, or if the velocity is not finite.
    /// A paused session resumes on the first event. Returns whether the
    /// event was recorded.
    pub fn record_event(&mut self, event: ScrollEvent) -> bool {
        if !event.velocity.is_finite() {
            return false;
        }
        match self.state {
            SessionState::Ended => return false,
            SessionState::Paused => self.state = SessionState::Active,
            SessionState::Active => {}
        }

        if event.direction.is_known() {
            if let Some(previous) = self.last_known_direction {
                if previous != event.direction {
                    self.direction_changes += 1;
                }
            }
            self.last_known_direction = Some(event.direction);
        }

        self.total_scroll_count += 1;
        self.total_velocity += event.velocity;
        if event.direction == self.feed_direction {
            self.downward_scroll_count += 1;
        }

        self.events.push_back(event);
        while self.events.len() > self.window_size {
            self.events.pop_front();
        }
        true
    }

    /// Pause an active session (no-op otherwise)
    pub fn pause(&mut self) {
        if self.state == SessionState::Active {
            self.state = SessionState::Paused;
        }
    }

    /// Resume a paused session (no-op otherwise)
    pub fn resume(&mut self) {
        if self.state == SessionState::Paused {
            self.state = SessionState::Active;
        }
    }

    /// End the session; the end time is stamped only once
    pub fn end(&mut self, at: DateTime<Utc>) {
        if self.state == SessionState::Ended {
            return;
        }
        self.state = SessionState::Ended;
        self.end_time = Some(at.max(self.start_time));
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn app_context(&self) -> &str {
        &self.app_context
    }

    pub fn session_ref(&self) -> SessionRef {
        SessionRef {
            session_id: self.id,
            app_context: self.app_context.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn total_scroll_count(&self) -> u32 {
        self.total_scroll_count
    }

    pub fn downward_scroll_count(&self) -> u32 {
        self.downward_scroll_count
    }

    pub fn direction_changes(&self) -> u32 {
        self.direction_changes
    }

    pub fn events(&self) -> impl Iterator<Item = &ScrollEvent> {
        self.events.iter()
    }

    pub fn window_len(&self) -> usize {
        self.events.len()
    }

    pub fn last_event(&self) -> Option<&ScrollEvent> {
        self.events.back()
    }

    // ------------------------------------------------------------------
    // Derived metrics
    // ------------------------------------------------------------------

    /// Seconds since start (or until end once ended)
    pub fn duration_sec(&self, now: DateTime<Utc>) -> f64 {
        let until = self.end_time.unwrap_or(now);
        seconds_between(self.start_time, until).max(0.0)
    }

    /// Lifetime mean event velocity
    pub fn average_velocity(&self) -> f64 {
        if self.total_scroll_count == 0 {
            return 0.0;
        }
        self.total_velocity / self.total_scroll_count as f64
    }

    /// Mean event velocity over the rolling window
    pub fn recent_average_velocity(&self) -> f64 {
        if self.events.is_empty() {
            return 0.0;
        }
        self.events.iter().map(|e| e.velocity).sum::<f64>() / self.events.len() as f64
    }

    pub fn downward_scroll_ratio(&self) -> f64 {
        if self.total_scroll_count == 0 {
            return 0.0;
        }
        self.downward_scroll_count as f64 / self.total_scroll_count as f64
    }

    pub fn scrolls_per_minute(&self, now: DateTime<Utc>) -> f64 {
        per_minute(self.total_scroll_count, self.duration_sec(now))
    }

    pub fn direction_changes_per_minute(&self, now: DateTime<Utc>) -> f64 {
        per_minute(self.direction_changes, self.duration_sec(now))
    }

    /// Window velocity standard deviation (n-1), 0 with fewer than 2 events
    pub fn velocity_standard_deviation(&self) -> f64 {
        let n = self.events.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.recent_average_velocity();
        let variance = self
            .events
            .iter()
            .map(|e| (e.velocity - mean).powi(2))
            .sum::<f64>()
            / (n - 1) as f64;
        variance.sqrt()
    }

    /// Window coefficient of variation, 0 if the mean is 0
    pub fn recent_velocity_cv(&self) -> f64 {
        let mean = self.recent_average_velocity();
        if mean <= 0.0 {
            return 0.0;
        }
        self.velocity_standard_deviation() / mean
    }

    /// Gap between the last two events in the window
    pub fn recent_scroll_gap(&self) -> Option<f64> {
        let n = self.events.len();
        if n < 2 {
            return None;
        }
        Some(seconds_between(self.events[n - 2].timestamp, self.events[n - 1].timestamp))
    }

    /// Largest inter-event gap in the window and the timestamp ending it
    pub fn largest_recent_gap(&self) -> Option<(f64, DateTime<Utc>)> {
        self.events
            .iter()
            .zip(self.events.iter().skip(1))
            .map(|(a, b)| (seconds_between(a.timestamp, b.timestamp), b.timestamp))
            .fold(None, |best: Option<(f64, DateTime<Utc>)>, gap| match best {
                Some(b) if b.0 >= gap.0 => Some(b),
                _ => Some(gap),
            })
    }

    pub fn time_since_last_scroll(&self, now: DateTime<Utc>) -> Option<f64> {
        self.events
            .back()
            .map(|e| seconds_between(e.timestamp, now).max(0.0))
    }

    /// Immutable summary of the session's aggregates
    ///
    /// Peak scores and intervention counts are owned by the controller and
    /// start at zero here.
    pub fn summarize(&self, now: DateTime<Utc>) -> SessionSummary {
        SessionSummary {
            session_id: self.id,
            app_context: self.app_context.clone(),
            start_time: self.start_time,
            end_time: self.end_time.unwrap_or(now),
            duration_sec: self.duration_sec(now),
            total_scroll_count: self.total_scroll_count,
            downward_scroll_count: self.downward_scroll_count,
            direction_changes: self.direction_changes,
            downward_scroll_ratio: self.downward_scroll_ratio(),
            average_velocity: self.average_velocity(),
            scrolls_per_minute: self.scrolls_per_minute(now),
            peak_intensity: 0.0,
            peak_doom_score: 0.0,
            interventions_triggered: 0,
        }
    }
}

fn per_minute(count: u32, duration_sec: f64) -> f64 {
    if duration_sec <= 0.0 {
        return 0.0;
    }
    count as f64 / (duration_sec / 60.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::add_seconds;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 23, 0, 0).unwrap()
    }

    fn session() -> SessionModel {
        SessionModel::new("feed", t0(), 5, ScrollDirection::Down)
    }

    fn event(offset_sec: f64, direction: ScrollDirection, velocity: f64) -> ScrollEvent {
        ScrollEvent::new(add_seconds(t0(), offset_sec), direction, velocity)
    }

    #[test]
    fn test_counts_and_ratios() {
        let mut s = session();
        s.record_event(event(1.0, ScrollDirection::Down, 400.0));
        s.record_event(event(2.0, ScrollDirection::Down, 600.0));
        s.record_event(event(3.0, ScrollDirection::Up, 200.0));
        s.record_event(event(4.0, ScrollDirection::Unknown, 10.0));
        s.record_event(event(5.0, ScrollDirection::Up, 300.0));

        assert_eq!(s.total_scroll_count(), 5);
        assert_eq!(s.downward_scroll_count(), 2);
        // Down -> Up once; Unknown is skipped
        assert_eq!(s.direction_changes(), 1);
        assert_eq!(s.downward_scroll_ratio(), 0.4);
        assert_eq!(s.average_velocity(), 302.0);

        let now = add_seconds(t0(), 60.0);
        assert_eq!(s.scrolls_per_minute(now), 5.0);
        assert_eq!(s.direction_changes_per_minute(now), 1.0);
        assert_eq!(s.time_since_last_scroll(now), Some(55.0));
    }

    #[test]
    fn test_window_is_bounded() {
        let mut s = session();
        for i in 0..12 {
            s.record_event(event(i as f64, ScrollDirection::Down, 100.0 + i as f64));
        }

        assert_eq!(s.window_len(), 5);
        assert_eq!(s.total_scroll_count(), 12);
        assert_eq!(s.recent_average_velocity(), 109.0);
        assert_eq!(s.last_event().map(|e| e.velocity), Some(111.0));
    }

    #[test]
    fn test_ended_session_ignores_events() {
        let mut s = session();
        s.record_event(event(1.0, ScrollDirection::Down, 400.0));
        s.end(add_seconds(t0(), 10.0));

        assert!(!s.record_event(event(11.0, ScrollDirection::Down, 400.0)));
        assert_eq!(s.total_scroll_count(), 1);
        assert_eq!(s.state(), SessionState::Ended);

        // End is stamped once
        s.end(add_seconds(t0(), 99.0));
        assert_eq!(s.end_time(), Some(add_seconds(t0(), 10.0)));
        assert_eq!(s.duration_sec(add_seconds(t0(), 500.0)), 10.0);
    }

    #[test]
    fn test_non_finite_velocity_is_ignored() {
        let mut s = session();
        s.record_event(event(1.0, ScrollDirection::Down, 400.0));

        assert!(!s.record_event(event(2.0, ScrollDirection::Down, f64::NAN)));
        assert!(!s.record_event(event(3.0, ScrollDirection::Up, f64::INFINITY)));
        assert_eq!(s.total_scroll_count(), 1);
        assert_eq!(s.direction_changes(), 0);
        assert_eq!(s.average_velocity(), 400.0);
    }

    #[test]
    fn test_event_resumes_paused_session() {
        let mut s = session();
        s.pause();
        s.pause();
        assert_eq!(s.state(), SessionState::Paused);

        assert!(s.record_event(event(1.0, ScrollDirection::Down, 400.0)));
        assert_eq!(s.state(), SessionState::Active);
    }

    #[test]
    fn test_velocity_spread() {
        let mut s = session();
        assert_eq!(s.velocity_standard_deviation(), 0.0);
        assert_eq!(s.recent_velocity_cv(), 0.0);

        s.record_event(event(1.0, ScrollDirection::Down, 200.0));
        s.record_event(event(2.0, ScrollDirection::Down, 400.0));
        s.record_event(event(3.0, ScrollDirection::Down, 600.0));

        assert_eq!(s.velocity_standard_deviation(), 200.0);
        assert_eq!(s.recent_velocity_cv(), 0.5);
    }

    #[test]
    fn test_gaps() {
        let mut s = session();
        assert_eq!(s.recent_scroll_gap(), None);
        assert_eq!(s.largest_recent_gap(), None);

        s.record_event(event(1.0, ScrollDirection::Down, 400.0));
        s.record_event(event(13.0, ScrollDirection::Down, 400.0));
        s.record_event(event(15.0, ScrollDirection::Down, 400.0));

        assert_eq!(s.recent_scroll_gap(), Some(2.0));
        assert_eq!(s.largest_recent_gap(), Some((12.0, add_seconds(t0(), 13.0))));
    }

    #[test]
    fn test_empty_session_metrics_are_zero() {
        let s = session();
        assert_eq!(s.duration_sec(t0()), 0.0);
        assert_eq!(s.scrolls_per_minute(t0()), 0.0);
        assert_eq!(s.average_velocity(), 0.0);
        assert_eq!(s.downward_scroll_ratio(), 0.0);
        assert_eq!(s.time_since_last_scroll(t0()), None);
    }
}
