//! Doom-scroll heuristics
//!
//! Periodic 5-factor classifier. Where the intensity scorer answers "how
//! intense is scrolling right now", this engine answers "does this session
//! look like doom scrolling", using a duration sigmoid, a velocity band, a
//! downward-ratio ramp, velocity consistency and an inverted engagement score.
//! The weighted sum is gated by session duration so short sessions cannot
//! reach high scores.
//!
//! The engine keeps a bounded score history for trend analysis and tracks
//! reading pauses across calls.

use crate::config::{HeuristicsConfig, MAX_PREALLOCATED};
use crate::session::SessionModel;
use crate::types::{seconds_between, DoomScrollScore};
use crate::velocity::VelocityStatistics;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Logistic steepness for the duration score
pub const DURATION_STEEPNESS: f64 = 3.0;

/// Reading pauses recorded before the session counts as "engaged"
const ENGAGED_PAUSE_COUNT: u32 = 2;

/// Number of binary engagement indicators
const ENGAGEMENT_INDICATORS: f64 = 3.0;

/// Velocity score above the rapid-flick ceiling
const FLICK_VELOCITY_SCORE: f64 = 0.2;

/// Direction score reached at the minimum downward ratio
const DIRECTION_RATIO_FLOOR_SCORE: f64 = 0.3;

/// Consistency score floor as CV grows without bound
const CONSISTENCY_FLOOR: f64 = 0.1;

/// Periodic doom-scroll classifier with score history
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicsEngine {
    config: HeuristicsConfig,
    history: VecDeque<DoomScrollScore>,
    reading_pause_count: u32,
    last_reading_pause_at: Option<DateTime<Utc>>,
    is_doom_scrolling_detected: bool,
    doom_scrolling_started_at: Option<DateTime<Utc>>,
}

impl Default for HeuristicsEngine {
    fn default() -> Self {
        Self::new(HeuristicsConfig::default())
    }
}

impl HeuristicsEngine {
    pub fn new(config: HeuristicsConfig) -> Self {
        Self {
            history: VecDeque::with_capacity(config.score_history_size.min(MAX_PREALLOCATED)),
            config,
            reading_pause_count: 0,
            last_reading_pause_at: None,
            is_doom_scrolling_detected: false,
            doom_scrolling_started_at: None,
        }
    }

    pub fn config(&self) -> &HeuristicsConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: HeuristicsConfig) {
        self.config = config;
        while self.history.len() > self.config.score_history_size {
            self.history.pop_front();
        }
    }

    /// Score the session and fold the result into history
    pub fn calculate_score(
        &mut self,
        session: &SessionModel,
        stats: &VelocityStatistics,
        now: DateTime<Utc>,
    ) -> DoomScrollScore {
        let duration = session.duration_sec(now);

        // Windowed tracker statistics when available, session window otherwise
        let (velocity, cv) = if stats.is_empty() {
            (session.recent_average_velocity(), session.recent_velocity_cv())
        } else {
            (stats.average_velocity, stats.coefficient_of_variation)
        };

        let duration_score = self.duration_score(duration);
        let velocity_score = self.velocity_score(velocity);
        let direction_score = self.direction_score(session.downward_scroll_ratio());
        let consistency_score = self.consistency_score(cv);
        let engagement_score = self.engagement_score(session, now);

        let w = &self.config.weights;
        let weighted = duration_score * w.duration
            + velocity_score * w.velocity
            + direction_score * w.direction
            + consistency_score * w.consistency
            + engagement_score * w.engagement;
        let overall_score = (weighted * self.duration_gate(duration)).clamp(0.0, 1.0);

        let score = DoomScrollScore {
            overall_score,
            duration_score,
            velocity_score,
            direction_score,
            consistency_score,
            engagement_score,
            timestamp: now,
        };

        self.history.push_back(score);
        while self.history.len() > self.config.score_history_size {
            self.history.pop_front();
        }
        self.update_detection(&score);

        debug!(
            overall = overall_score,
            level = ?score.level(),
            "doom-scroll score calculated"
        );
        score
    }

    fn update_detection(&mut self, score: &DoomScrollScore) {
        let detected = score.level().should_intervene();
        if detected && !self.is_doom_scrolling_detected {
            info!(score = score.overall_score, "doom scrolling detected");
            self.doom_scrolling_started_at = Some(score.timestamp);
        } else if !detected && self.is_doom_scrolling_detected {
            info!(score = score.overall_score, "doom scrolling cleared");
            self.doom_scrolling_started_at = None;
        }
        self.is_doom_scrolling_detected = detected;
    }

    /// `min(1, duration / minimum session duration)`
    pub fn duration_gate(&self, duration_sec: f64) -> f64 {
        let minimum = self.config.minimum_session_duration_sec;
        if minimum <= 0.0 {
            return 1.0;
        }
        (duration_sec / minimum).clamp(0.0, 1.0)
    }

    /// Logistic curve centred on the midpoint, rescaled onto [0, 1] between
    /// the floor and ceiling durations
    pub fn duration_score(&self, duration_sec: f64) -> f64 {
        let c = &self.config;
        if duration_sec <= c.duration_floor_sec {
            return 0.0;
        }
        if duration_sec >= c.duration_ceiling_sec {
            return 1.0;
        }

        let scale = (c.duration_ceiling_sec - c.duration_floor_sec) / 4.0;
        let logistic = |d: f64| 1.0 / (1.0 + (-DURATION_STEEPNESS * (d - c.duration_midpoint_sec) / scale).exp());

        let low = logistic(c.duration_floor_sec);
        let high = logistic(c.duration_ceiling_sec);
        if high <= low {
            return 0.0;
        }
        ((logistic(duration_sec) - low) / (high - low)).clamp(0.0, 1.0)
    }

    /// Peaks at the middle of the doom-scroll velocity band; damped outside
    /// it and flat low past the rapid-flick ceiling
    pub fn velocity_score(&self, velocity: f64) -> f64 {
        let c = &self.config;
        if velocity < c.minimum_velocity {
            return 0.0;
        }
        if velocity > c.rapid_flick_velocity {
            return FLICK_VELOCITY_SCORE;
        }

        let (low, high) = (c.doom_velocity_min, c.doom_velocity_max);
        if velocity < low {
            0.5 * ratio(velocity - c.minimum_velocity, low - c.minimum_velocity)
        } else if velocity <= high {
            let mid = (low + high) / 2.0;
            let half = (high - low) / 2.0;
            let proximity = 1.0 - ratio((velocity - mid).abs(), half);
            0.5 + 0.5 * proximity
        } else {
            let fraction = ratio(velocity - high, c.rapid_flick_velocity - high);
            0.5 - (0.5 - FLICK_VELOCITY_SCORE) * fraction
        }
    }

    /// 0-0.3 below the minimum downward ratio, 0.3-1.0 up to the target
    pub fn direction_score(&self, downward_ratio: f64) -> f64 {
        let c = &self.config;
        let ratio_value = downward_ratio.clamp(0.0, 1.0);
        if ratio_value < c.minimum_downward_ratio {
            DIRECTION_RATIO_FLOOR_SCORE * ratio(ratio_value, c.minimum_downward_ratio)
        } else {
            let fraction = ratio(
                ratio_value - c.minimum_downward_ratio,
                c.target_downward_ratio - c.minimum_downward_ratio,
            );
            DIRECTION_RATIO_FLOOR_SCORE + (1.0 - DIRECTION_RATIO_FLOOR_SCORE) * fraction
        }
    }

    /// 1.0 when very consistent, 0.5-1.0 up to the max consistent CV, then
    /// decays toward a floor
    pub fn consistency_score(&self, coefficient_of_variation: f64) -> f64 {
        let c = &self.config;
        let cv = coefficient_of_variation.max(0.0);
        if cv <= c.very_consistent_cv {
            1.0
        } else if cv <= c.max_consistent_cv {
            1.0 - 0.5 * ratio(cv - c.very_consistent_cv, c.max_consistent_cv - c.very_consistent_cv)
        } else {
            CONSISTENCY_FLOOR + (0.5 - CONSISTENCY_FLOOR) * (-2.0 * (cv - c.max_consistent_cv)).exp()
        }
    }

    /// Inverted engagement: `1 - indicators / 3`
    ///
    /// Also records any new reading pause found in the session window.
    pub fn engagement_score(&mut self, session: &SessionModel, now: DateTime<Utc>) -> f64 {
        let threshold = self.config.reading_pause_threshold_sec;

        let window_pause = session
            .largest_recent_gap()
            .filter(|(gap, _)| *gap >= threshold);
        if let Some((gap, ended_at)) = window_pause {
            let already_counted = self
                .last_reading_pause_at
                .map(|at| at >= ended_at)
                .unwrap_or(false);
            if !already_counted {
                debug!(gap, "reading pause detected");
                self.record_reading_pause(ended_at);
            }
        }
        let idle = session
            .time_since_last_scroll(now)
            .map(|idle| idle >= threshold)
            .unwrap_or(false);

        let dcpm = session.direction_changes_per_minute(now);
        let engaged_direction_changes = dcpm >= self.config.engaged_direction_changes_min
            && dcpm <= self.config.engaged_direction_changes_max;

        let indicators = [
            window_pause.is_some() || idle,
            engaged_direction_changes,
            self.reading_pause_count >= ENGAGED_PAUSE_COUNT,
        ]
        .iter()
        .filter(|present| **present)
        .count() as f64;

        1.0 - indicators / ENGAGEMENT_INDICATORS
    }

    /// Record a reading pause observed elsewhere (e.g. by the host UI)
    pub fn record_reading_pause(&mut self, at: DateTime<Utc>) {
        self.reading_pause_count += 1;
        self.last_reading_pause_at = Some(at);
    }

    /// Mean of the newer half of the last `window` scores minus the older half
    ///
    /// Returns 0 until at least `window` scores exist.
    pub fn score_trend(&self, window: usize) -> f64 {
        if window < 2 || self.history.len() < window {
            return 0.0;
        }

        let recent: Vec<f64> = self
            .history
            .iter()
            .skip(self.history.len() - window)
            .map(|s| s.overall_score)
            .collect();
        let (older, newer) = recent.split_at(window / 2);
        mean(newer) - mean(older)
    }

    pub fn is_escalating(&self) -> bool {
        self.score_trend(self.config.trend_window) > self.config.escalation_threshold
    }

    pub fn current_score(&self) -> Option<&DoomScrollScore> {
        self.history.back()
    }

    pub fn history(&self) -> impl Iterator<Item = &DoomScrollScore> {
        self.history.iter()
    }

    pub fn reading_pause_count(&self) -> u32 {
        self.reading_pause_count
    }

    pub fn is_doom_scrolling_detected(&self) -> bool {
        self.is_doom_scrolling_detected
    }

    pub fn doom_scrolling_started_at(&self) -> Option<DateTime<Utc>> {
        self.doom_scrolling_started_at
    }

    /// Seconds since doom scrolling was first detected, 0 if not detected
    pub fn doom_scrolling_duration_sec(&self, now: DateTime<Utc>) -> f64 {
        self.doom_scrolling_started_at
            .map(|start| seconds_between(start, now).max(0.0))
            .unwrap_or(0.0)
    }

    /// Clear history and all detection state
    pub fn reset(&mut self) {
        self.history.clear();
        self.reading_pause_count = 0;
        self.last_reading_pause_at = None;
        self.is_doom_scrolling_detected = false;
        self.doom_scrolling_started_at = None;
    }
}

/// `value / span` clamped to [0, 1]; 1 for an empty span
fn ratio(value: f64, span: f64) -> f64 {
    if span <= 0.0 {
        return 1.0;
    }
    (value / span).clamp(0.0, 1.0)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectionConfig;
    use crate::types::{add_seconds, Level, ScrollDirection, ScrollEvent};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 16, 21, 0, 0).unwrap()
    }

    fn steady_session(pause_at: Option<usize>) -> (SessionModel, DateTime<Utc>) {
        let mut session = SessionModel::from_config("feed", t0(), &DetectionConfig::default());
        let spacing = 200.0 / 60.0;
        let mut offset = 0.0;
        for i in 0..60 {
            if Some(i) == pause_at {
                offset += 12.0;
            }
            session.record_event(ScrollEvent::new(
                add_seconds(t0(), offset + i as f64 * spacing),
                ScrollDirection::Down,
                500.0,
            ));
        }
        (session, add_seconds(t0(), 200.0 + offset))
    }

    fn steady_stats() -> VelocityStatistics {
        VelocityStatistics {
            average_velocity: 500.0,
            peak_velocity: 520.0,
            minimum_velocity: 480.0,
            standard_deviation: 10.0,
            coefficient_of_variation: 0.02,
            downward_ratio: 1.0,
            time_span_sec: 2.0,
            sample_count: 40,
            ..VelocityStatistics::default()
        }
    }

    #[test]
    fn test_duration_score_is_monotonic_sigmoid() {
        let engine = HeuristicsEngine::default();
        assert_eq!(engine.duration_score(0.0), 0.0);
        assert_eq!(engine.duration_score(60.0), 0.0);
        assert_eq!(engine.duration_score(1800.0), 1.0);
        assert_eq!(engine.duration_score(5000.0), 1.0);

        let mut previous = 0.0;
        for minute in 1..=30 {
            let score = engine.duration_score(minute as f64 * 60.0);
            assert!(score >= previous, "not monotonic at {minute} min");
            previous = score;
        }
        // Just inside the floor the curve starts near zero
        assert!(engine.duration_score(61.0) < 0.01);
    }

    #[test]
    fn test_velocity_score_band() {
        let engine = HeuristicsEngine::default();
        assert_eq!(engine.velocity_score(40.0), 0.0);
        assert_eq!(engine.velocity_score(125.0), 0.25);
        assert_eq!(engine.velocity_score(200.0), 0.5);
        assert_eq!(engine.velocity_score(700.0), 1.0);
        assert_eq!(engine.velocity_score(1200.0), 0.5);
        assert_eq!(engine.velocity_score(3000.0), 0.2);

        let damped = engine.velocity_score(1850.0);
        assert!(damped > 0.2 && damped < 0.5);
    }

    #[test]
    fn test_direction_score_ramp() {
        let engine = HeuristicsEngine::default();
        assert_eq!(engine.direction_score(0.0), 0.0);
        assert!((engine.direction_score(0.3) - 0.15).abs() < 1e-9);
        assert_eq!(engine.direction_score(0.6), 0.3);
        assert!((engine.direction_score(0.85) - 1.0).abs() < 1e-9);
        assert_eq!(engine.direction_score(1.0), 1.0);
    }

    #[test]
    fn test_consistency_score_decay() {
        let engine = HeuristicsEngine::default();
        assert_eq!(engine.consistency_score(0.1), 1.0);
        assert!((engine.consistency_score(0.45) - 0.75).abs() < 1e-9);
        assert_eq!(engine.consistency_score(0.6), 0.5);

        let high = engine.consistency_score(1.5);
        assert!(high > CONSISTENCY_FLOOR && high < 0.5);
        assert!(engine.consistency_score(10.0) >= CONSISTENCY_FLOOR);
    }

    #[test]
    fn test_reading_pause_lowers_engagement_score() {
        let (steady, steady_now) = steady_session(None);
        let (paused, paused_now) = steady_session(Some(30));

        let mut engine = HeuristicsEngine::default();
        let without_pause = engine.calculate_score(&steady, &steady_stats(), steady_now);

        let mut engine = HeuristicsEngine::default();
        let with_pause = engine.calculate_score(&paused, &steady_stats(), paused_now);

        assert_eq!(without_pause.engagement_score, 1.0);
        assert!(with_pause.engagement_score < without_pause.engagement_score);
        assert_eq!(engine.reading_pause_count(), 1);

        // The same gap is not counted twice
        engine.calculate_score(&paused, &steady_stats(), add_seconds(paused_now, 1.0));
        assert_eq!(engine.reading_pause_count(), 1);
    }

    #[test]
    fn test_duration_gate_dampens_short_sessions() {
        let mut session = SessionModel::from_config("feed", t0(), &DetectionConfig::default());
        for i in 0..30 {
            session.record_event(ScrollEvent::new(
                add_seconds(t0(), i as f64 * 2.0),
                ScrollDirection::Down,
                700.0,
            ));
        }
        let now = add_seconds(t0(), 60.0);

        let mut engine = HeuristicsEngine::default();
        let score = engine.calculate_score(&session, &steady_stats(), now);

        let w = &engine.config().weights;
        let ungated = score.duration_score * w.duration
            + score.velocity_score * w.velocity
            + score.direction_score * w.direction
            + score.consistency_score * w.consistency
            + score.engagement_score * w.engagement;
        assert!(ungated > 0.0);
        assert!(score.overall_score < ungated);
        assert!((score.overall_score - ungated * 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_overall_score_in_unit_range() {
        let (session, now) = steady_session(None);
        let mut engine = HeuristicsEngine::default();
        for step in 0..20 {
            let score = engine.calculate_score(&session, &steady_stats(), add_seconds(now, step as f64 * 300.0));
            assert!((0.0..=1.0).contains(&score.overall_score));
        }
    }

    #[test]
    fn test_detection_edge_sets_and_clears_marker() {
        let (session, now) = steady_session(None);
        let mut engine = HeuristicsEngine::default();

        // Long after the last scroll: idle, so engagement lowers the score
        let late = add_seconds(now, 1500.0);
        let score = engine.calculate_score(&session, &steady_stats(), late);
        assert!(score.level() >= Level::Moderate, "score {}", score.overall_score);
        assert!(engine.is_doom_scrolling_detected());
        assert_eq!(engine.doom_scrolling_started_at(), Some(late));
        assert_eq!(engine.doom_scrolling_duration_sec(add_seconds(late, 30.0)), 30.0);

        let empty = SessionModel::from_config("feed", late, &DetectionConfig::default());
        engine.calculate_score(&empty, &VelocityStatistics::empty(), late);
        assert!(!engine.is_doom_scrolling_detected());
        assert_eq!(engine.doom_scrolling_started_at(), None);
    }

    #[test]
    fn test_history_bounded_and_trend() {
        let config = HeuristicsConfig {
            score_history_size: 6,
            trend_window: 4,
            ..HeuristicsConfig::default()
        };
        let mut engine = HeuristicsEngine::new(config);
        let (session, now) = steady_session(None);

        assert_eq!(engine.score_trend(4), 0.0);

        // Growing duration pushes the score up on every call
        for step in 0..10 {
            engine.calculate_score(&session, &steady_stats(), add_seconds(now, step as f64 * 120.0));
        }
        assert_eq!(engine.history().count(), 6);
        assert!(engine.score_trend(4) > 0.0);
        assert_eq!(engine.score_trend(7), 0.0);
    }

    #[test]
    fn test_escalation_threshold() {
        let mut engine = HeuristicsEngine::default();
        let (session, now) = steady_session(None);
        for step in 0..10 {
            engine.calculate_score(&session, &steady_stats(), add_seconds(now, step as f64 * 150.0));
        }
        assert!(engine.score_trend(10) > engine.config().escalation_threshold);
        assert!(engine.is_escalating());
    }

    #[test]
    fn test_reset_matches_fresh_engine() {
        let (session, now) = steady_session(Some(30));
        let mut engine = HeuristicsEngine::default();
        engine.calculate_score(&session, &steady_stats(), now);
        engine.record_reading_pause(now);

        engine.reset();
        assert_eq!(engine, HeuristicsEngine::default());
        engine.reset();
        assert_eq!(engine, HeuristicsEngine::default());
    }
}
