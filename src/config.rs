//! Detection configuration
//!
//! All thresholds are fixed per profile; nothing here is learned. A profile is
//! either one of the named presets or a fully custom document. Partial JSON
//! documents are overlaid on the medium preset.
//!
//! Construction never fails: `validate()` returns human-readable issues and
//! callers are expected to check it (or use `validated()`) before relying on
//! a custom profile.

use crate::error::DetectorError;
use crate::types::{InterventionKind, ScrollDirection};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tolerance when checking that score weights sum to one
const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Longest accepted cooldown, timeout or interval (one week)
pub const MAX_PERIOD_SEC: f64 = 7.0 * 24.0 * 60.0 * 60.0;

/// Largest accepted window or history size
pub const MAX_WINDOW_SIZE: usize = 100_000;

/// Windows never preallocate more than this many slots
pub const MAX_PREALLOCATED: usize = 1024;

fn is_period(value: f64) -> bool {
    value > 0.0 && value <= MAX_PERIOD_SEC
}

// ============================================================================
// Presets
// ============================================================================

/// Named sensitivity profiles for the detection pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityPreset {
    Low,
    #[default]
    Medium,
    High,
}

impl SensitivityPreset {
    pub const ALL: [SensitivityPreset; 3] = [
        SensitivityPreset::Low,
        SensitivityPreset::Medium,
        SensitivityPreset::High,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SensitivityPreset::Low => "low",
            SensitivityPreset::Medium => "medium",
            SensitivityPreset::High => "high",
        }
    }
}

impl fmt::Display for SensitivityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SensitivityPreset {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(SensitivityPreset::Low),
            "medium" => Ok(SensitivityPreset::Medium),
            "high" => Ok(SensitivityPreset::High),
            other => Err(DetectorError::UnknownPreset(other.to_string())),
        }
    }
}

/// Named weightings for the heuristics engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicsPreset {
    #[default]
    Default,
    Strict,
    Relaxed,
}

impl HeuristicsPreset {
    pub const ALL: [HeuristicsPreset; 3] = [
        HeuristicsPreset::Default,
        HeuristicsPreset::Strict,
        HeuristicsPreset::Relaxed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HeuristicsPreset::Default => "default",
            HeuristicsPreset::Strict => "strict",
            HeuristicsPreset::Relaxed => "relaxed",
        }
    }
}

impl fmt::Display for HeuristicsPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HeuristicsPreset {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(HeuristicsPreset::Default),
            "strict" => Ok(HeuristicsPreset::Strict),
            "relaxed" => Ok(HeuristicsPreset::Relaxed),
            other => Err(DetectorError::UnknownPreset(other.to_string())),
        }
    }
}

// ============================================================================
// Detection configuration groups
// ============================================================================

/// Session duration bands (seconds)
///
/// Below `minimum` the intensity is scaled down, up to `extended` it is left
/// alone, up to `maximum` it ramps to +30%, and past `maximum` it is +50%.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionThresholds {
    pub minimum_session_duration_sec: f64,
    pub extended_session_duration_sec: f64,
    pub maximum_session_duration_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollCountThresholds {
    pub minimum_scroll_count: u32,
    pub high_frequency_scrolls_per_minute: f64,
}

/// Velocity thresholds (points per second)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityThresholds {
    pub minimum_velocity: f64,
    pub rapid_scroll_velocity: f64,
    /// Smoothed speed at or below which the user is considered stopped
    pub stopped_velocity: f64,
    /// Below this speed a sample's direction is unknown
    pub minimum_direction_speed: f64,
    /// The dominant axis must exceed the other by this factor
    pub direction_dominance_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternThresholds {
    pub pause_threshold_sec: f64,
    pub erratic_direction_changes_per_minute: f64,
    pub high_downward_ratio: f64,
    pub target_downward_ratio: f64,
}

/// Intensity scores at which each intervention kind becomes eligible
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionThresholds {
    pub gentle: f64,
    pub firm: f64,
    pub mandatory_break: f64,
}

impl InterventionThresholds {
    pub fn for_kind(&self, kind: InterventionKind) -> f64 {
        match kind {
            InterventionKind::Gentle => self.gentle,
            InterventionKind::Firm => self.firm,
            InterventionKind::MandatoryBreak => self.mandatory_break,
        }
    }
}

/// Cooldown periods (seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooldownPeriods {
    pub gentle_sec: f64,
    pub firm_sec: f64,
    pub mandatory_break_sec: f64,
    /// Suppresses every kind after a mandatory break (or a break taken)
    pub post_break_sec: f64,
}

impl CooldownPeriods {
    pub fn for_kind(&self, kind: InterventionKind) -> f64 {
        match kind {
            InterventionKind::Gentle => self.gentle_sec,
            InterventionKind::Firm => self.firm_sec,
            InterventionKind::MandatoryBreak => self.mandatory_break_sec,
        }
    }
}

/// EMA weights; higher alpha reacts faster and smooths less
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingFactors {
    pub velocity_alpha: f64,
    pub vector_alpha: f64,
    pub acceleration_alpha: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSizes {
    /// Rolling window of scroll events kept per session
    pub event_window_size: usize,
    pub max_sample_count: usize,
    pub max_sample_age_sec: f64,
    /// Samples closer together than this are dropped
    pub minimum_sample_interval_sec: f64,
    /// Window used for velocity statistics at each analysis tick
    pub statistics_window_sec: f64,
    pub session_history_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSettings {
    /// Analysis clock self-suspends after this much inactivity
    pub idle_timeout_sec: f64,
    /// Analysis interval in balanced power mode
    pub base_analysis_interval_sec: f64,
    /// Gap that closes a continuous scroll gesture
    pub gesture_gap_sec: f64,
    /// Direction that counts as moving through the feed
    pub feed_direction: ScrollDirection,
    /// Unreported presentations are treated as timed out after this long
    pub presentation_timeout_sec: f64,
}

// ============================================================================
// Heuristics configuration
// ============================================================================

/// Weights for the five doom-scroll sub-scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub duration: f64,
    pub velocity: f64,
    pub direction: f64,
    pub consistency: f64,
    pub engagement: f64,
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.duration + self.velocity + self.direction + self.consistency + self.engagement
    }
}

/// Configuration for the periodic doom-scroll classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicsConfig {
    pub weights: ScoreWeights,
    /// Duration gate: scores are scaled by `duration / minimum` below this
    pub minimum_session_duration_sec: f64,
    /// Duration sigmoid bounds and midpoint (seconds)
    pub duration_floor_sec: f64,
    pub duration_ceiling_sec: f64,
    pub duration_midpoint_sec: f64,
    pub minimum_velocity: f64,
    pub doom_velocity_min: f64,
    pub doom_velocity_max: f64,
    /// Faster than this reads as searching, not doom scrolling
    pub rapid_flick_velocity: f64,
    pub minimum_downward_ratio: f64,
    pub target_downward_ratio: f64,
    pub very_consistent_cv: f64,
    pub max_consistent_cv: f64,
    pub reading_pause_threshold_sec: f64,
    pub engaged_direction_changes_min: f64,
    pub engaged_direction_changes_max: f64,
    pub score_history_size: usize,
    pub trend_window: usize,
    pub escalation_threshold: f64,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self::preset(HeuristicsPreset::Default)
    }
}

impl HeuristicsConfig {
    pub fn preset(preset: HeuristicsPreset) -> Self {
        let base = Self {
            weights: ScoreWeights {
                duration: 0.25,
                velocity: 0.20,
                direction: 0.20,
                consistency: 0.15,
                engagement: 0.20,
            },
            minimum_session_duration_sec: 120.0,
            duration_floor_sec: 60.0,
            duration_ceiling_sec: 1800.0,
            duration_midpoint_sec: 600.0,
            minimum_velocity: 50.0,
            doom_velocity_min: 200.0,
            doom_velocity_max: 1200.0,
            rapid_flick_velocity: 2500.0,
            minimum_downward_ratio: 0.6,
            target_downward_ratio: 0.85,
            very_consistent_cv: 0.3,
            max_consistent_cv: 0.6,
            reading_pause_threshold_sec: 5.0,
            engaged_direction_changes_min: 1.0,
            engaged_direction_changes_max: 6.0,
            score_history_size: 60,
            trend_window: 10,
            escalation_threshold: 0.05,
        };

        match preset {
            HeuristicsPreset::Default => base,
            HeuristicsPreset::Strict => Self {
                weights: ScoreWeights {
                    duration: 0.30,
                    velocity: 0.15,
                    direction: 0.25,
                    consistency: 0.10,
                    engagement: 0.20,
                },
                minimum_session_duration_sec: 60.0,
                duration_floor_sec: 30.0,
                duration_ceiling_sec: 1200.0,
                duration_midpoint_sec: 300.0,
                minimum_downward_ratio: 0.5,
                target_downward_ratio: 0.75,
                reading_pause_threshold_sec: 8.0,
                ..base
            },
            HeuristicsPreset::Relaxed => Self {
                weights: ScoreWeights {
                    duration: 0.20,
                    velocity: 0.20,
                    direction: 0.20,
                    consistency: 0.15,
                    engagement: 0.25,
                },
                minimum_session_duration_sec: 300.0,
                duration_floor_sec: 120.0,
                duration_ceiling_sec: 3600.0,
                duration_midpoint_sec: 1200.0,
                minimum_downward_ratio: 0.7,
                target_downward_ratio: 0.9,
                reading_pause_threshold_sec: 4.0,
                ..base
            },
        }
    }

    /// Validate the heuristics configuration, returning every issue found
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let w = &self.weights;

        for (name, value) in [
            ("duration", w.duration),
            ("velocity", w.velocity),
            ("direction", w.direction),
            ("consistency", w.consistency),
            ("engagement", w.engagement),
        ] {
            if !(0.0..=1.0).contains(&value) {
                issues.push(format!("heuristics weight '{name}' must be within [0, 1], got {value}"));
            }
        }
        if (w.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            issues.push(format!("heuristics weights must sum to 1.0, got {:.3}", w.sum()));
        }

        if self.minimum_session_duration_sec <= 0.0 {
            issues.push("heuristics minimum session duration must be positive".to_string());
        }
        if self.duration_floor_sec < 0.0 || self.duration_ceiling_sec <= self.duration_floor_sec {
            issues.push("heuristics duration ceiling must exceed a non-negative floor".to_string());
        }
        if self.duration_midpoint_sec < self.duration_floor_sec
            || self.duration_midpoint_sec > self.duration_ceiling_sec
        {
            issues.push("heuristics duration midpoint must lie between floor and ceiling".to_string());
        }

        if !(self.minimum_velocity >= 0.0
            && self.minimum_velocity < self.doom_velocity_min
            && self.doom_velocity_min < self.doom_velocity_max
            && self.doom_velocity_max < self.rapid_flick_velocity)
        {
            issues.push(
                "heuristics velocities must satisfy minimum < doom range min < doom range max < rapid flick"
                    .to_string(),
            );
        }

        if !(0.0..=1.0).contains(&self.minimum_downward_ratio)
            || !(0.0..=1.0).contains(&self.target_downward_ratio)
        {
            issues.push("heuristics downward ratios must be within [0, 1]".to_string());
        } else if self.target_downward_ratio <= self.minimum_downward_ratio {
            issues.push("heuristics target downward ratio must exceed the minimum ratio".to_string());
        }

        if self.very_consistent_cv < 0.0 || self.max_consistent_cv <= self.very_consistent_cv {
            issues.push("heuristics consistency thresholds must satisfy 0 <= very consistent < max consistent".to_string());
        }
        if self.reading_pause_threshold_sec <= 0.0 {
            issues.push("heuristics reading pause threshold must be positive".to_string());
        }
        if self.engaged_direction_changes_min < 0.0
            || self.engaged_direction_changes_max <= self.engaged_direction_changes_min
        {
            issues.push("heuristics engaged direction-change window is empty".to_string());
        }
        if self.score_history_size < 2 || self.score_history_size > MAX_WINDOW_SIZE {
            issues.push(format!("heuristics score history must hold between 2 and {MAX_WINDOW_SIZE} scores"));
        }
        if self.trend_window < 2 || self.trend_window > self.score_history_size {
            issues.push("heuristics trend window must be between 2 and the history size".to_string());
        }
        if self.escalation_threshold < 0.0 {
            issues.push("heuristics escalation threshold must not be negative".to_string());
        }

        issues
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

// ============================================================================
// Detection configuration
// ============================================================================

/// Complete configuration for the detection pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub session: SessionThresholds,
    pub scroll_count: ScrollCountThresholds,
    pub velocity: VelocityThresholds,
    pub pattern: PatternThresholds,
    pub intensity: InterventionThresholds,
    pub cooldown: CooldownPeriods,
    pub smoothing: SmoothingFactors,
    pub windows: WindowSizes,
    pub monitoring: MonitoringSettings,
    pub heuristics: HeuristicsConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self::preset(SensitivityPreset::Medium)
    }
}

impl DetectionConfig {
    /// Build one of the named sensitivity profiles
    pub fn preset(preset: SensitivityPreset) -> Self {
        let medium = Self {
            session: SessionThresholds {
                minimum_session_duration_sec: 120.0,
                extended_session_duration_sec: 600.0,
                maximum_session_duration_sec: 1800.0,
            },
            scroll_count: ScrollCountThresholds {
                minimum_scroll_count: 20,
                high_frequency_scrolls_per_minute: 12.0,
            },
            velocity: VelocityThresholds {
                minimum_velocity: 50.0,
                rapid_scroll_velocity: 1500.0,
                stopped_velocity: 10.0,
                minimum_direction_speed: 20.0,
                direction_dominance_ratio: 1.0,
            },
            pattern: PatternThresholds {
                pause_threshold_sec: 8.0,
                erratic_direction_changes_per_minute: 8.0,
                high_downward_ratio: 0.7,
                target_downward_ratio: 0.85,
            },
            intensity: InterventionThresholds {
                gentle: 0.5,
                firm: 0.7,
                mandatory_break: 0.85,
            },
            cooldown: CooldownPeriods {
                gentle_sec: 300.0,
                firm_sec: 600.0,
                mandatory_break_sec: 1800.0,
                post_break_sec: 900.0,
            },
            smoothing: SmoothingFactors {
                velocity_alpha: 0.3,
                vector_alpha: 0.3,
                acceleration_alpha: 0.2,
            },
            windows: WindowSizes {
                event_window_size: 50,
                max_sample_count: 120,
                max_sample_age_sec: 3.0,
                minimum_sample_interval_sec: 0.008,
                statistics_window_sec: 2.0,
                session_history_size: 50,
            },
            monitoring: MonitoringSettings {
                idle_timeout_sec: 30.0,
                base_analysis_interval_sec: 1.0,
                gesture_gap_sec: 0.25,
                feed_direction: ScrollDirection::Down,
                presentation_timeout_sec: 120.0,
            },
            heuristics: HeuristicsConfig::default(),
        };

        match preset {
            SensitivityPreset::Medium => medium,
            SensitivityPreset::Low => Self {
                session: SessionThresholds {
                    minimum_session_duration_sec: 300.0,
                    extended_session_duration_sec: 900.0,
                    maximum_session_duration_sec: 2700.0,
                },
                scroll_count: ScrollCountThresholds {
                    minimum_scroll_count: 30,
                    high_frequency_scrolls_per_minute: 15.0,
                },
                pattern: PatternThresholds {
                    pause_threshold_sec: 6.0,
                    erratic_direction_changes_per_minute: 6.0,
                    high_downward_ratio: 0.8,
                    target_downward_ratio: 0.9,
                },
                intensity: InterventionThresholds {
                    gentle: 0.6,
                    firm: 0.8,
                    mandatory_break: 0.92,
                },
                cooldown: CooldownPeriods {
                    gentle_sec: 600.0,
                    firm_sec: 1200.0,
                    mandatory_break_sec: 3600.0,
                    post_break_sec: 1800.0,
                },
                ..medium
            },
            SensitivityPreset::High => Self {
                session: SessionThresholds {
                    minimum_session_duration_sec: 60.0,
                    extended_session_duration_sec: 300.0,
                    maximum_session_duration_sec: 1200.0,
                },
                scroll_count: ScrollCountThresholds {
                    minimum_scroll_count: 12,
                    high_frequency_scrolls_per_minute: 8.0,
                },
                pattern: PatternThresholds {
                    pause_threshold_sec: 10.0,
                    erratic_direction_changes_per_minute: 10.0,
                    high_downward_ratio: 0.6,
                    target_downward_ratio: 0.8,
                },
                intensity: InterventionThresholds {
                    gentle: 0.4,
                    firm: 0.6,
                    mandatory_break: 0.8,
                },
                cooldown: CooldownPeriods {
                    gentle_sec: 180.0,
                    firm_sec: 420.0,
                    mandatory_break_sec: 1200.0,
                    post_break_sec: 600.0,
                },
                ..medium
            },
        }
    }

    /// Replace the heuristics section with a named preset
    pub fn with_heuristics(mut self, preset: HeuristicsPreset) -> Self {
        self.heuristics = HeuristicsConfig::preset(preset);
        self
    }

    /// Validate the configuration, returning every issue found
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        let s = &self.session;
        if s.minimum_session_duration_sec <= 0.0
            || s.extended_session_duration_sec <= 0.0
            || s.maximum_session_duration_sec <= 0.0
        {
            issues.push("session durations must be positive".to_string());
        } else if !(s.minimum_session_duration_sec <= s.extended_session_duration_sec
            && s.extended_session_duration_sec < s.maximum_session_duration_sec)
        {
            issues.push(
                "session durations must satisfy minimum <= extended < maximum".to_string(),
            );
        }

        if self.scroll_count.minimum_scroll_count == 0 {
            issues.push("minimum scroll count must be at least 1".to_string());
        }
        if self.scroll_count.high_frequency_scrolls_per_minute <= 0.0 {
            issues.push("high-frequency scroll rate must be positive".to_string());
        }

        let v = &self.velocity;
        if v.minimum_velocity < 0.0 {
            issues.push("minimum velocity must not be negative".to_string());
        }
        if v.rapid_scroll_velocity <= v.minimum_velocity {
            issues.push("rapid scroll velocity must exceed minimum velocity".to_string());
        }
        if v.stopped_velocity < 0.0 || v.minimum_direction_speed < 0.0 {
            issues.push("stopped and direction speeds must not be negative".to_string());
        }
        if v.direction_dominance_ratio < 1.0 {
            issues.push("direction dominance ratio must be at least 1.0".to_string());
        }

        let p = &self.pattern;
        if p.pause_threshold_sec <= 0.0 {
            issues.push("pause threshold must be positive".to_string());
        }
        if p.erratic_direction_changes_per_minute <= 0.0 {
            issues.push("erratic direction-change rate must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&p.high_downward_ratio) {
            issues.push("high downward ratio must be within [0, 1]".to_string());
        }
        if !(p.target_downward_ratio > 0.5 && p.target_downward_ratio <= 1.0) {
            issues.push("target downward ratio must be within (0.5, 1]".to_string());
        }

        let t = &self.intensity;
        for kind in InterventionKind::ALL {
            let value = t.for_kind(kind);
            if !(0.0..=1.0).contains(&value) {
                issues.push(format!("{kind:?} intervention threshold must be within [0, 1], got {value}"));
            }
        }
        if t.firm <= t.gentle {
            issues.push("firm threshold must exceed gentle threshold".to_string());
        }
        if t.mandatory_break <= t.firm {
            issues.push("mandatory break threshold must exceed firm threshold".to_string());
        }

        let c = &self.cooldown;
        if ![c.gentle_sec, c.firm_sec, c.mandatory_break_sec, c.post_break_sec]
            .into_iter()
            .all(is_period)
        {
            issues.push(format!("cooldown periods must be positive and at most {MAX_PERIOD_SEC}s"));
        }

        let a = &self.smoothing;
        for (name, alpha) in [
            ("velocity", a.velocity_alpha),
            ("vector", a.vector_alpha),
            ("acceleration", a.acceleration_alpha),
        ] {
            if !(alpha > 0.0 && alpha <= 1.0) {
                issues.push(format!("{name} smoothing alpha must be within (0, 1], got {alpha}"));
            }
        }

        let w = &self.windows;
        if ![w.event_window_size, w.max_sample_count, w.session_history_size]
            .into_iter()
            .all(|size| (1..=MAX_WINDOW_SIZE).contains(&size))
        {
            issues.push(format!("window sizes must be between 1 and {MAX_WINDOW_SIZE}"));
        }
        if w.max_sample_age_sec <= 0.0 || w.statistics_window_sec <= 0.0 {
            issues.push("sample age and statistics window must be positive".to_string());
        }
        if w.minimum_sample_interval_sec < 0.0 {
            issues.push("minimum sample interval must not be negative".to_string());
        }

        let m = &self.monitoring;
        if !is_period(m.idle_timeout_sec) || !is_period(m.base_analysis_interval_sec) {
            issues.push(format!("idle timeout and analysis interval must be positive and at most {MAX_PERIOD_SEC}s"));
        }
        if !is_period(m.gesture_gap_sec) || !is_period(m.presentation_timeout_sec) {
            issues.push(format!("gesture gap and presentation timeout must be positive and at most {MAX_PERIOD_SEC}s"));
        }
        if !m.feed_direction.is_known() {
            issues.push("feed direction must be a concrete direction".to_string());
        }

        issues.extend(self.heuristics.validate());
        issues
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Return the configuration if it validates, or every issue found
    pub fn validated(self) -> Result<Self, DetectorError> {
        let issues = self.validate();
        if issues.is_empty() {
            Ok(self)
        } else {
            Err(DetectorError::InvalidConfiguration(issues))
        }
    }

    /// Load a configuration from JSON (missing sections use the medium preset)
    pub fn from_json(json: &str) -> Result<Self, DetectorError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, DetectorError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
