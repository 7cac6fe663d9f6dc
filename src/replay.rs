//! Deterministic replay
//!
//! Replays a recorded gesture/lifecycle log through a controller running on a
//! [`ManualClock`]. Analysis ticks are fired at the instants the real clock
//! would fire them: one interval after the clock (re)starts, then every
//! interval until it stops.
//!
//! Input is newline-delimited JSON, one record per line:
//!
//! ```text
//! {"timestamp":"2024-01-15T22:00:00Z","type":"start","app_context":"feed"}
//! {"timestamp":"2024-01-15T22:00:00.5Z","type":"velocity","velocity":{"x":0.0,"y":600.0}}
//! {"timestamp":"2024-01-15T22:01:30Z","type":"stop"}
//! ```

use crate::clock::{Clock, ManualClock};
use crate::config::DetectionConfig;
use crate::error::DetectorError;
use crate::monitor::{MonitorEvent, MonitoringController};
use crate::types::{add_seconds, InterventionKind, InterventionResult, PowerMode, Vector2};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::warn;

fn default_app_context() -> String {
    "default".to_string()
}

/// Host action carried by a replay record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayAction {
    Start {
        #[serde(default = "default_app_context")]
        app_context: String,
    },
    Position {
        position: Vector2,
    },
    Velocity {
        velocity: Vector2,
        #[serde(default)]
        position: Vector2,
    },
    Pause,
    Resume,
    Stop,
    Power {
        mode: PowerMode,
    },
    Result {
        kind: InterventionKind,
        result: InterventionResult,
    },
    ReadingPause,
}

/// One timestamped line of a replay log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub action: ReplayAction,
}

impl ReplayRecord {
    pub fn new(timestamp: DateTime<Utc>, action: ReplayAction) -> Self {
        Self { timestamp, action }
    }
}

/// An emitted event stamped with the replay time it was observed at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayEntry {
    pub at: DateTime<Utc>,
    pub event: MonitorEvent,
}

/// Parse NDJSON replay records
///
/// Blank lines are skipped. Timestamps must not go backwards.
pub fn parse_ndjson(input: &str) -> Result<Vec<ReplayRecord>, DetectorError> {
    let mut records: Vec<ReplayRecord> = Vec::new();

    for (index, line) in input.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: ReplayRecord = serde_json::from_str(trimmed)
            .map_err(|e| DetectorError::ParseError(format!("line {}: {}", line_no, e)))?;

        if let Some(previous) = records.last() {
            if record.timestamp < previous.timestamp {
                return Err(DetectorError::ParseError(format!(
                    "line {}: timestamp {} is earlier than the previous record",
                    line_no,
                    record.timestamp.to_rfc3339()
                )));
            }
        }
        records.push(record);
    }

    Ok(records)
}

/// Drives a controller from replay records
#[derive(Debug)]
pub struct ReplaySession {
    controller: MonitoringController,
    clock: Arc<ManualClock>,
    events: broadcast::Receiver<MonitorEvent>,
    /// (clock generation, next firing)
    schedule: Option<(u64, DateTime<Utc>)>,
    log: Vec<ReplayEntry>,
}

impl ReplaySession {
    pub fn new(config: DetectionConfig, start: DateTime<Utc>) -> Self {
        let clock = Arc::new(ManualClock::new(start));
        let controller = MonitoringController::without_runtime(config, clock.clone());
        let events = controller.subscribe();
        Self {
            controller,
            clock,
            events,
            schedule: None,
            log: Vec::new(),
        }
    }

    pub fn controller(&self) -> &MonitoringController {
        &self.controller
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Fire every analysis tick due up to `target`, then move the clock there
    pub fn advance_to(&mut self, target: DateTime<Utc>) {
        while let Some((_, next)) = self.schedule {
            if next > target {
                break;
            }
            self.clock.set(next);
            self.controller.tick();
            self.collect(next);
            self.sync_schedule(next);
        }
        self.clock.set(target);
    }

    /// Apply one record at its timestamp
    pub fn apply(&mut self, record: &ReplayRecord) {
        self.advance_to(record.timestamp);
        let at = record.timestamp;

        match &record.action {
            ReplayAction::Start { app_context } => self.controller.start_monitoring(app_context),
            ReplayAction::Position { position } => {
                self.controller.process_scroll(*position, at);
            }
            ReplayAction::Velocity { velocity, position } => {
                self.controller.process_drag(*velocity, *position, at);
            }
            ReplayAction::Pause => self.controller.pause_monitoring(),
            ReplayAction::Resume => self.controller.resume_monitoring(),
            ReplayAction::Stop => {
                self.controller.stop_monitoring();
            }
            ReplayAction::Power { mode } => self.controller.set_power_mode(*mode),
            ReplayAction::Result { kind, result } => {
                self.controller.report_intervention_result(*kind, *result);
            }
            ReplayAction::ReadingPause => self.controller.record_reading_pause(),
        }

        self.collect(at);
        self.sync_schedule(at);
    }

    /// Events observed so far
    pub fn log(&self) -> &[ReplayEntry] {
        &self.log
    }

    pub fn into_log(self) -> Vec<ReplayEntry> {
        self.log
    }

    fn collect(&mut self, at: DateTime<Utc>) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.log.push(ReplayEntry { at, event }),
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "replay log dropped events");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    /// Track the controller's clock: a new generation restarts the phase
    fn sync_schedule(&mut self, now: DateTime<Utc>) {
        let (Some(generation), Some(interval)) = (
            self.controller.analysis_generation(),
            self.controller.analysis_interval_sec(),
        ) else {
            self.schedule = None;
            return;
        };

        self.schedule = match self.schedule {
            Some((tracked, next)) if tracked == generation && next > now => Some((tracked, next)),
            Some((tracked, next)) if tracked == generation => Some((tracked, add_seconds(next, interval))),
            _ => Some((generation, add_seconds(now, interval))),
        };
    }
}

/// Replay all records and return the event log
pub fn replay(config: DetectionConfig, records: &[ReplayRecord]) -> Vec<ReplayEntry> {
    let Some(first) = records.first() else {
        return Vec::new();
    };

    let mut session = ReplaySession::new(config, first.timestamp);
    for record in records {
        session.apply(record);
    }
    session.into_log()
}
