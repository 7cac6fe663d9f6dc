//! Outbound monitor events

use crate::types::{
    DoomScrollScore, InterventionKind, Level, ScrollIntensity, SessionRef, SessionSummary,
};
use crate::velocity::VelocityStatistics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregate snapshot emitted on every analysis tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorMetrics {
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
    pub duration_sec: f64,
    pub total_scroll_count: u32,
    pub scrolls_per_minute: f64,
    pub direction_changes_per_minute: f64,
    pub downward_scroll_ratio: f64,
    pub average_velocity: f64,
    pub velocity: VelocityStatistics,
    pub intensity: ScrollIntensity,
    pub doom_score: DoomScrollScore,
    pub level: Level,
    pub score_trend: f64,
    pub is_escalating: bool,
    pub is_doom_scrolling_detected: bool,
    pub is_doom_scrolling_pattern: bool,
    pub is_scrolling: bool,
}

/// Typed event stream consumed by presenters, loggers and tests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    SessionStarted {
        session: SessionRef,
    },
    SessionEnded {
        summary: SessionSummary,
    },
    GentleIntervention {
        intensity: ScrollIntensity,
        session: SessionRef,
    },
    FirmIntervention {
        intensity: ScrollIntensity,
        session: SessionRef,
    },
    MandatoryBreak {
        intensity: ScrollIntensity,
        session: SessionRef,
    },
    IntensityUpdated {
        intensity: ScrollIntensity,
    },
    PauseDetected {
        duration_sec: f64,
    },
    MetricsUpdated {
        metrics: Box<MonitorMetrics>,
    },
    MonitoringStateChanged {
        is_monitoring: bool,
        reason: String,
    },
}

impl MonitorEvent {
    /// Build the intervention event for a kind
    pub fn intervention(kind: InterventionKind, intensity: ScrollIntensity, session: SessionRef) -> Self {
        match kind {
            InterventionKind::Gentle => MonitorEvent::GentleIntervention { intensity, session },
            InterventionKind::Firm => MonitorEvent::FirmIntervention { intensity, session },
            InterventionKind::MandatoryBreak => MonitorEvent::MandatoryBreak { intensity, session },
        }
    }

    pub fn state_changed(is_monitoring: bool, reason: &str) -> Self {
        MonitorEvent::MonitoringStateChanged {
            is_monitoring,
            reason: reason.to_string(),
        }
    }

    /// The intervention kind, for intervention events
    pub fn intervention_kind(&self) -> Option<InterventionKind> {
        match self {
            MonitorEvent::GentleIntervention { .. } => Some(InterventionKind::Gentle),
            MonitorEvent::FirmIntervention { .. } => Some(InterventionKind::Firm),
            MonitorEvent::MandatoryBreak { .. } => Some(InterventionKind::MandatoryBreak),
            _ => None,
        }
    }

    /// Stable snake_case name, matching the serialized `type` tag
    pub fn name(&self) -> &'static str {
        match self {
            MonitorEvent::SessionStarted { .. } => "session_started",
            MonitorEvent::SessionEnded { .. } => "session_ended",
            MonitorEvent::GentleIntervention { .. } => "gentle_intervention",
            MonitorEvent::FirmIntervention { .. } => "firm_intervention",
            MonitorEvent::MandatoryBreak { .. } => "mandatory_break",
            MonitorEvent::IntensityUpdated { .. } => "intensity_updated",
            MonitorEvent::PauseDetected { .. } => "pause_detected",
            MonitorEvent::MetricsUpdated { .. } => "metrics_updated",
            MonitorEvent::MonitoringStateChanged { .. } => "monitoring_state_changed",
        }
    }
}
