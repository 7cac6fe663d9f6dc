//! Core data types for doomscope
//!
//! These types flow between the velocity tracker, the session model, both
//! scorers and the monitoring controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Sub};
use uuid::Uuid;

/// Seconds elapsed from `earlier` to `later` (negative if `later` is earlier).
pub fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let delta = later - earlier;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

/// Offset a timestamp by a (possibly fractional) number of seconds.
///
/// Saturates at the representable range instead of overflowing.
pub fn add_seconds(at: DateTime<Utc>, seconds: f64) -> DateTime<Utc> {
    let delta = chrono::Duration::microseconds((seconds * 1_000_000.0).round() as i64);
    at.checked_add_signed(delta).unwrap_or(if seconds < 0.0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// A 2D vector in content-offset space (points, or points per second).
///
/// Positive `y` means the content offset grows, i.e. the user moves further
/// down the feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f64,
    pub y: f64,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn magnitude(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vector2 {
    type Output = Vector2;

    fn add(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vector2 {
    type Output = Vector2;

    fn sub(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vector2 {
    type Output = Vector2;

    fn mul(self, rhs: f64) -> Vector2 {
        Vector2::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Vector2 {
    type Output = Vector2;

    fn div(self, rhs: f64) -> Vector2 {
        Vector2::new(self.x / rhs, self.y / rhs)
    }
}

/// Dominant scroll direction of a sample or event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
    /// Too slow, or no axis dominates
    Unknown,
}

impl ScrollDirection {
    pub fn is_known(&self) -> bool {
        !matches!(self, ScrollDirection::Unknown)
    }
}

/// A single velocity sample produced by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub position: Vector2,
    pub velocity: Vector2,
    /// Velocity magnitude in points per second
    pub magnitude: f64,
    pub direction: ScrollDirection,
}

/// A discrete scroll event recorded into a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollEvent {
    pub timestamp: DateTime<Utc>,
    pub direction: ScrollDirection,
    /// Velocity magnitude in points per second
    pub velocity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceleration: Option<f64>,
    /// Distance travelled in points
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Duration of the gesture in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f64>,
}

impl ScrollEvent {
    pub fn new(timestamp: DateTime<Utc>, direction: ScrollDirection, velocity: f64) -> Self {
        Self {
            timestamp,
            direction,
            velocity,
            acceleration: None,
            distance: None,
            duration_sec: None,
        }
    }
}

/// Lifecycle state of a monitoring session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Paused,
    Ended,
}

/// Lightweight reference to the session an event belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRef {
    pub session_id: Uuid,
    pub app_context: String,
}

/// Per-tick scroll intensity (4-factor gesture score)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollIntensity {
    /// Overall intensity (0-1)
    pub score: f64,
    pub velocity_score: f64,
    pub frequency_score: f64,
    pub direction_score: f64,
    pub consistency_score: f64,
    pub timestamp: DateTime<Utc>,
}

/// Categorical doom-scroll level derived from the composite score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    None,
    Mild,
    Moderate,
    Elevated,
    Severe,
}

impl Level {
    /// Map an overall score onto a level using fixed cut points
    pub fn from_score(score: f64) -> Self {
        if score >= 0.80 {
            Level::Severe
        } else if score >= 0.65 {
            Level::Elevated
        } else if score >= 0.50 {
            Level::Moderate
        } else if score >= 0.30 {
            Level::Mild
        } else {
            Level::None
        }
    }

    pub fn should_intervene(&self) -> bool {
        matches!(self, Level::Moderate | Level::Elevated | Level::Severe)
    }
}

/// Composite 5-factor doom-scroll score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DoomScrollScore {
    /// Duration-gated weighted score (0-1)
    pub overall_score: f64,
    pub duration_score: f64,
    pub velocity_score: f64,
    pub direction_score: f64,
    pub consistency_score: f64,
    /// Inverted engagement: high means little sign of reading
    pub engagement_score: f64,
    pub timestamp: DateTime<Utc>,
}

impl DoomScrollScore {
    pub fn level(&self) -> Level {
        Level::from_score(self.overall_score)
    }
}

/// Intervention severities, ascending
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    Gentle,
    Firm,
    MandatoryBreak,
}

impl InterventionKind {
    pub const ALL: [InterventionKind; 3] = [
        InterventionKind::Gentle,
        InterventionKind::Firm,
        InterventionKind::MandatoryBreak,
    ];

    /// Highest severity first, the order thresholds are evaluated in
    pub const BY_SEVERITY: [InterventionKind; 3] = [
        InterventionKind::MandatoryBreak,
        InterventionKind::Firm,
        InterventionKind::Gentle,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Outcome reported by the intervention presenter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionResult {
    Completed,
    TookBreak,
    Skipped,
    Continued,
    TimedOut,
}

impl InterventionResult {
    pub const ALL: [InterventionResult; 5] = [
        InterventionResult::Completed,
        InterventionResult::TookBreak,
        InterventionResult::Skipped,
        InterventionResult::Continued,
        InterventionResult::TimedOut,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Whether the user dismissed the intervention and kept scrolling
    pub fn is_ignored(&self) -> bool {
        matches!(
            self,
            InterventionResult::Skipped | InterventionResult::Continued | InterventionResult::TimedOut
        )
    }
}

/// Coarse power/thermal signal from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerMode {
    Full,
    #[default]
    Balanced,
    Reduced,
    Minimal,
    Suspended,
}

impl PowerMode {
    pub const ALL: [PowerMode; 5] = [
        PowerMode::Full,
        PowerMode::Balanced,
        PowerMode::Reduced,
        PowerMode::Minimal,
        PowerMode::Suspended,
    ];

    /// Multiplier applied to the base analysis interval; `None` suspends analysis
    pub fn interval_multiplier(&self) -> Option<f64> {
        match self {
            PowerMode::Full => Some(0.5),
            PowerMode::Balanced => Some(1.0),
            PowerMode::Reduced => Some(2.0),
            PowerMode::Minimal => Some(5.0),
            PowerMode::Suspended => None,
        }
    }

    /// Analysis interval in seconds for a given base interval
    pub fn analysis_interval_sec(&self, base_interval_sec: f64) -> Option<f64> {
        self.interval_multiplier().map(|m| base_interval_sec * m)
    }
}

/// Immutable summary of a finished session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub app_context: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_sec: f64,
    pub total_scroll_count: u32,
    pub downward_scroll_count: u32,
    pub direction_changes: u32,
    pub downward_scroll_ratio: f64,
    pub average_velocity: f64,
    pub scrolls_per_minute: f64,
    /// Highest intensity seen during the session (0 if never analyzed)
    pub peak_intensity: f64,
    /// Highest doom-scroll score seen during the session
    pub peak_doom_score: f64,
    pub interventions_triggered: u32,
}
