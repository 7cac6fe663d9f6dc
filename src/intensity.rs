//! Scroll intensity scoring
//!
//! Fast, per-tick 4-factor score over the current session. This is the signal
//! intervention thresholds are compared against. The slower 5-factor
//! classification lives in [`crate::heuristics`].

use crate::config::DetectionConfig;
use crate::session::SessionModel;
use crate::types::ScrollIntensity;
use chrono::{DateTime, Utc};

/// Sub-score weights: velocity, frequency, direction, consistency
pub const VELOCITY_WEIGHT: f64 = 0.25;
pub const FREQUENCY_WEIGHT: f64 = 0.30;
pub const DIRECTION_WEIGHT: f64 = 0.25;
pub const CONSISTENCY_WEIGHT: f64 = 0.20;

/// Scrolls per minute mapped to a frequency score of 0 and 1
const FREQUENCY_FLOOR_SPM: f64 = 10.0;
const FREQUENCY_CEILING_SPM: f64 = 60.0;

/// Downward ratio below which the direction score is 0
const DIRECTION_FLOOR_RATIO: f64 = 0.5;

/// CV at which the consistency score reaches 0
const CONSISTENCY_CV_CEILING: f64 = 1.0;

/// Consistency score when there is no velocity data
const NEUTRAL_CONSISTENCY: f64 = 0.5;

/// Duration multiplier bounds
const EXTENDED_BOOST: f64 = 0.3;
const MAXIMUM_BOOST: f64 = 0.5;

/// Per-tick intensity scorer (gesture analyzer)
#[derive(Debug, Clone)]
pub struct IntensityScorer {
    config: DetectionConfig,
}

impl Default for IntensityScorer {
    fn default() -> Self {
        Self::new(DetectionConfig::default())
    }
}

impl IntensityScorer {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: DetectionConfig) {
        self.config = config;
    }

    /// Score the session as of `now`; always within [0, 1]
    pub fn analyze_session(&self, session: &SessionModel, now: DateTime<Utc>) -> ScrollIntensity {
        let velocity_score = self.velocity_score(session.recent_average_velocity());
        let frequency_score = frequency_score(session.scrolls_per_minute(now));
        let direction_score = self.direction_score(session.downward_scroll_ratio());
        let consistency_score = consistency_score(session);

        let weighted = velocity_score * VELOCITY_WEIGHT
            + frequency_score * FREQUENCY_WEIGHT
            + direction_score * DIRECTION_WEIGHT
            + consistency_score * CONSISTENCY_WEIGHT;
        let score = (weighted * self.duration_multiplier(session.duration_sec(now))).clamp(0.0, 1.0);

        ScrollIntensity {
            score,
            velocity_score,
            frequency_score,
            direction_score,
            consistency_score,
            timestamp: now,
        }
    }

    /// Linear between minimum velocity (0) and rapid scroll velocity (1)
    pub fn velocity_score(&self, velocity: f64) -> f64 {
        let v = &self.config.velocity;
        normalize(velocity, v.minimum_velocity, v.rapid_scroll_velocity)
    }

    /// 0 below a 50% downward share, then linear up to the target ratio
    pub fn direction_score(&self, downward_ratio: f64) -> f64 {
        if downward_ratio < DIRECTION_FLOOR_RATIO {
            return 0.0;
        }
        normalize(
            downward_ratio,
            DIRECTION_FLOOR_RATIO,
            self.config.pattern.target_downward_ratio,
        )
    }

    /// Scale applied to the weighted score by session length
    pub fn duration_multiplier(&self, duration_sec: f64) -> f64 {
        let s = &self.config.session;
        if duration_sec < s.minimum_session_duration_sec {
            (duration_sec / s.minimum_session_duration_sec).max(0.0)
        } else if duration_sec <= s.extended_session_duration_sec {
            1.0
        } else if duration_sec <= s.maximum_session_duration_sec {
            let span = s.maximum_session_duration_sec - s.extended_session_duration_sec;
            1.0 + EXTENDED_BOOST * (duration_sec - s.extended_session_duration_sec) / span
        } else {
            1.0 + MAXIMUM_BOOST
        }
    }

    /// True if the window contains a gap at or above the pause threshold, or
    /// the user has been still that long
    pub fn detect_pause(&self, session: &SessionModel, now: DateTime<Utc>) -> bool {
        let threshold = self.config.pattern.pause_threshold_sec;
        let gap_in_window = session
            .largest_recent_gap()
            .map(|(gap, _)| gap >= threshold)
            .unwrap_or(false);
        let idle = session
            .time_since_last_scroll(now)
            .map(|idle| idle >= threshold)
            .unwrap_or(false);
        gap_in_window || idle
    }

    pub fn detect_erratic_behavior(&self, session: &SessionModel, now: DateTime<Utc>) -> bool {
        session.direction_changes_per_minute(now) >= self.config.pattern.erratic_direction_changes_per_minute
    }

    /// Sustained, high-frequency, predominantly downward scrolling with no
    /// recent pause and no erratic direction changes
    pub fn is_doom_scrolling_pattern(&self, session: &SessionModel, now: DateTime<Utc>) -> bool {
        let c = &self.config;
        session.total_scroll_count() >= c.scroll_count.minimum_scroll_count
            && session.duration_sec(now) >= c.session.minimum_session_duration_sec
            && session.downward_scroll_ratio() >= c.pattern.high_downward_ratio
            && session.scrolls_per_minute(now) >= c.scroll_count.high_frequency_scrolls_per_minute
            && !self.detect_pause(session, now)
            && !self.detect_erratic_behavior(session, now)
    }
}

fn frequency_score(scrolls_per_minute: f64) -> f64 {
    normalize(scrolls_per_minute, FREQUENCY_FLOOR_SPM, FREQUENCY_CEILING_SPM)
}

fn consistency_score(session: &SessionModel) -> f64 {
    if session.recent_average_velocity() <= 0.0 {
        return NEUTRAL_CONSISTENCY;
    }
    (1.0 - session.recent_velocity_cv() / CONSISTENCY_CV_CEILING).clamp(0.0, 1.0)
}

/// Linear map of `value` from [low, high] onto [0, 1], clamped
fn normalize(value: f64, low: f64, high: f64) -> f64 {
    if high <= low {
        return if value >= high { 1.0 } else { 0.0 };
    }
    ((value - low) / (high - low)).clamp(0.0, 1.0)
}
