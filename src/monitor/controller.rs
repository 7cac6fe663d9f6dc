//! Monitoring controller
//!
//! State machine: idle -> monitoring (active <-> paused) -> idle.
//!
//! The analysis clock is started lazily by the first accepted sample, not by
//! `start_monitoring`, and suspends itself once input has been idle for the
//! configured timeout. Every clock firing re-checks its generation under the
//! state lock, so `pause_monitoring`/`stop_monitoring`/`reset` prevent any
//! further tick body from running before they return.
//!
//! Without a tokio runtime the clock is tracked logically and the host calls
//! [`MonitoringController::tick`] itself.

use super::clock::{AnalysisClock, MAX_PERIOD};
use super::events::{MonitorEvent, MonitorMetrics};
use super::gesture::{GestureInput, GestureSegmenter};
use super::intervention::{InterventionState, InterventionStatus};
use crate::clock::{Clock, SystemClock};
use crate::config::{DetectionConfig, MAX_PREALLOCATED};
use crate::error::DetectorError;
use crate::heuristics::HeuristicsEngine;
use crate::intensity::IntensityScorer;
use crate::session::SessionModel;
use crate::types::{
    seconds_between, DoomScrollScore, InterventionKind, InterventionResult, PowerMode, Sample,
    ScrollEvent, ScrollIntensity, SessionRef, SessionState, SessionSummary, Vector2,
};
use crate::velocity::{TrackerConfig, VelocityTracker};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

/// Buffered events per subscriber before the oldest are dropped
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct AnalysisSchedule {
    running: bool,
    generation: u64,
    task: Option<AnalysisClock>,
}

#[derive(Debug)]
struct ControllerState {
    config: DetectionConfig,
    session: Option<SessionModel>,
    tracker: VelocityTracker,
    scorer: IntensityScorer,
    engine: HeuristicsEngine,
    segmenter: GestureSegmenter,
    interventions: InterventionState,
    history: VecDeque<SessionSummary>,
    power_mode: PowerMode,
    last_event_at: Option<DateTime<Utc>>,
    current_intensity: Option<ScrollIntensity>,
    peak_intensity: f64,
    peak_doom_score: f64,
    session_interventions: u32,
    schedule: AnalysisSchedule,
}

impl ControllerState {
    fn new(config: DetectionConfig) -> Self {
        Self {
            tracker: VelocityTracker::new(TrackerConfig::from(&config)),
            scorer: IntensityScorer::new(config.clone()),
            engine: HeuristicsEngine::new(config.heuristics.clone()),
            segmenter: GestureSegmenter::new(config.monitoring.gesture_gap_sec),
            interventions: InterventionState::new(),
            history: VecDeque::with_capacity(config.windows.session_history_size.min(MAX_PREALLOCATED)),
            power_mode: PowerMode::default(),
            session: None,
            last_event_at: None,
            current_intensity: None,
            peak_intensity: 0.0,
            peak_doom_score: 0.0,
            session_interventions: 0,
            schedule: AnalysisSchedule::default(),
            config,
        }
    }

    /// Input is accepted while a session exists and has not ended
    fn accepts_input(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.state() != SessionState::Ended)
            .unwrap_or(false)
    }

    fn session_is_active(&self) -> bool {
        self.session.as_ref().map(SessionModel::is_active).unwrap_or(false)
    }

    fn record_event(&mut self, event: ScrollEvent) {
        if !event.velocity.is_finite() {
            trace!("non-finite scroll event dropped");
            return;
        }
        if event.velocity < self.config.velocity.minimum_velocity {
            trace!(velocity = event.velocity, "scroll event below minimum velocity");
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.record_event(event);
        }
    }

    fn flush_gesture(&mut self) {
        if let Some(event) = self.segmenter.flush() {
            self.record_event(event);
        }
    }

    fn analysis_interval_sec(&self) -> Option<f64> {
        self.power_mode
            .analysis_interval_sec(self.config.monitoring.base_analysis_interval_sec)
            .filter(|secs| secs.is_finite() && *secs > 0.0)
    }

    fn input_is_recent(&self, now: DateTime<Utc>) -> bool {
        self.last_event_at
            .map(|last| seconds_between(last, now) < self.config.monitoring.idle_timeout_sec)
            .unwrap_or(false)
    }

    fn stop_clock(&mut self) {
        if self.schedule.running {
            debug!(generation = self.schedule.generation, "analysis clock suspended");
        }
        self.schedule.running = false;
        self.schedule.generation += 1;
        self.schedule.task = None;
    }

    /// Drop per-session detection state; history and power mode survive
    fn clear_transient(&mut self) {
        self.tracker.reset();
        self.engine.reset();
        self.segmenter.reset();
        self.interventions.reset();
        self.last_event_at = None;
        self.current_intensity = None;
        self.peak_intensity = 0.0;
        self.peak_doom_score = 0.0;
        self.session_interventions = 0;
    }

    /// One analysis pass: score, publish and evaluate interventions
    fn analyze(&mut self, now: DateTime<Utc>) -> Vec<MonitorEvent> {
        let mut events = Vec::new();

        if let Some(event) = self.segmenter.flush_if_idle(now) {
            self.record_event(event);
        }

        let Some(session) = self.session.as_ref() else {
            return events;
        };

        let intensity = self.scorer.analyze_session(session, now);
        let stats = self
            .tracker
            .calculate_statistics(Some(self.config.windows.statistics_window_sec), now);
        let score = self.engine.calculate_score(session, &stats, now);

        self.current_intensity = Some(intensity);
        self.peak_intensity = self.peak_intensity.max(intensity.score);
        self.peak_doom_score = self.peak_doom_score.max(score.overall_score);
        events.push(MonitorEvent::IntensityUpdated { intensity });

        let metrics = MonitorMetrics {
            timestamp: now,
            session_id: session.id(),
            duration_sec: session.duration_sec(now),
            total_scroll_count: session.total_scroll_count(),
            scrolls_per_minute: session.scrolls_per_minute(now),
            direction_changes_per_minute: session.direction_changes_per_minute(now),
            downward_scroll_ratio: session.downward_scroll_ratio(),
            average_velocity: session.average_velocity(),
            velocity: stats,
            intensity,
            doom_score: score,
            level: score.level(),
            score_trend: self.engine.score_trend(self.config.heuristics.trend_window),
            is_escalating: self.engine.is_escalating(),
            is_doom_scrolling_detected: self.engine.is_doom_scrolling_detected(),
            is_doom_scrolling_pattern: self.scorer.is_doom_scrolling_pattern(session, now),
            is_scrolling: self.tracker.is_scrolling(now),
        };
        events.push(MonitorEvent::MetricsUpdated {
            metrics: Box::new(metrics),
        });

        let cooldowns = &self.config.cooldown;
        if let Some(kind) = self.interventions.expire_presentation(
            now,
            self.config.monitoring.presentation_timeout_sec,
            cooldowns,
        ) {
            debug!(?kind, "intervention presentation timed out");
        }

        if let Some(kind) = self
            .interventions
            .evaluate(intensity.score, &self.config.intensity, cooldowns, now)
        {
            self.interventions.record_fired(kind, now, cooldowns);
            self.session_interventions += 1;
            let session_ref = session.session_ref();
            info!(
                ?kind,
                score = intensity.score,
                session_id = %session_ref.session_id,
                "intervention triggered"
            );
            events.push(MonitorEvent::intervention(kind, intensity, session_ref));
        }

        events
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<ControllerState>,
    events: broadcast::Sender<MonitorEvent>,
    clock: Arc<dyn Clock>,
    runtime: Option<Handle>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: MonitorEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    fn start_clock(self: &Arc<Self>, state: &mut ControllerState) {
        let Some(interval_sec) = state.analysis_interval_sec() else {
            debug!(power_mode = ?state.power_mode, "analysis clock not started");
            return;
        };

        state.schedule.generation += 1;
        state.schedule.running = true;
        let generation = state.schedule.generation;

        if let Some(runtime) = &self.runtime {
            // Only overflow can fail here; the interval is finite and positive
            let period = Duration::try_from_secs_f64(interval_sec).unwrap_or(MAX_PERIOD);
            let weak = Arc::downgrade(self);
            state.schedule.task = Some(AnalysisClock::spawn(
                runtime,
                period,
                generation,
                move || {
                    weak.upgrade()
                        .map(|shared| shared.tick_from_clock(generation))
                        .unwrap_or(false)
                },
            ));
        }
        debug!(generation, interval_sec, "analysis clock started");
    }

    fn ensure_clock(self: &Arc<Self>, state: &mut ControllerState) {
        if !state.schedule.running && state.session_is_active() {
            self.start_clock(state);
        }
    }

    /// Bookkeeping for an accepted sample
    fn accept(self: &Arc<Self>, state: &mut ControllerState, sample: &Sample, event: Option<ScrollEvent>) {
        if let Some(session) = state.session.as_mut() {
            if session.state() == SessionState::Paused {
                debug!("input while paused, resuming session");
                session.resume();
            }
        }

        if let Some(last) = state.last_event_at {
            let gap = seconds_between(last, sample.timestamp);
            if gap >= state.config.pattern.pause_threshold_sec {
                debug!(gap, "scroll pause detected");
                self.emit(MonitorEvent::PauseDetected { duration_sec: gap });
            }
        }
        state.last_event_at = Some(sample.timestamp);

        if let Some(event) = event {
            state.record_event(event);
        }
        self.ensure_clock(state);
    }

    fn tick_locked(&self, state: &mut ControllerState, now: DateTime<Utc>) -> Option<ScrollIntensity> {
        if !state.session_is_active() {
            return None;
        }

        if !state.input_is_recent(now) {
            state.flush_gesture();
            if state.schedule.running {
                debug!("input idle, suspending analysis");
                state.stop_clock();
            }
            return None;
        }

        for event in state.analyze(now) {
            self.emit(event);
        }
        state.current_intensity
    }

    /// Clock callback; returns whether the clock should keep running
    fn tick_from_clock(&self, generation: u64) -> bool {
        let mut state = self.lock();
        if !state.schedule.running || state.schedule.generation != generation {
            return false;
        }
        self.tick_locked(&mut state, self.clock.now());
        state.schedule.running && state.schedule.generation == generation
    }
}

/// Orchestrates a monitoring session and emits [`MonitorEvent`]s
///
/// Cloning yields another handle to the same controller.
#[derive(Debug, Clone)]
pub struct MonitoringController {
    shared: Arc<Shared>,
}

impl Default for MonitoringController {
    fn default() -> Self {
        Self::new(DetectionConfig::default())
    }
}

impl MonitoringController {
    /// Create a controller on the wall clock
    ///
    /// Configuration issues are logged, not rejected; use
    /// [`try_new`](Self::try_new) to reject them.
    pub fn new(config: DetectionConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a controller, rejecting an invalid configuration
    pub fn try_new(config: DetectionConfig) -> Result<Self, DetectorError> {
        Ok(Self::new(config.validated()?))
    }

    /// Use the given clock and the ambient tokio runtime, if any
    pub fn with_clock(config: DetectionConfig, clock: Arc<dyn Clock>) -> Self {
        Self::build(config, clock, Handle::try_current().ok())
    }

    /// Run the analysis clock on an explicit runtime
    pub fn with_runtime(config: DetectionConfig, runtime: Handle, clock: Arc<dyn Clock>) -> Self {
        Self::build(config, clock, Some(runtime))
    }

    /// Never spawn a clock task; the host drives [`tick`](Self::tick)
    pub fn without_runtime(config: DetectionConfig, clock: Arc<dyn Clock>) -> Self {
        Self::build(config, clock, None)
    }

    fn build(config: DetectionConfig, clock: Arc<dyn Clock>, runtime: Option<Handle>) -> Self {
        let issues = config.validate();
        if !issues.is_empty() {
            warn!(?issues, "monitoring with an invalid configuration");
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ControllerState::new(config)),
                events,
                clock,
                runtime,
            }),
        }
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.shared.events.subscribe()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start a session for `app_context`; no-op if one is already running
    pub fn start_monitoring(&self, app_context: &str) {
        let shared = &self.shared;
        let mut state = shared.lock();
        if state.session.is_some() {
            debug!(app_context, "already monitoring");
            return;
        }

        let now = shared.clock.now();
        state.clear_transient();
        let session = SessionModel::from_config(app_context, now, &state.config);
        let session_ref = session.session_ref();
        state.session = Some(session);

        info!(session_id = %session_ref.session_id, app_context, "monitoring started");
        shared.emit(MonitorEvent::SessionStarted { session: session_ref });
        shared.emit(MonitorEvent::state_changed(true, "started"));
    }

    /// Pause the session and suspend the analysis clock
    pub fn pause_monitoring(&self) {
        let shared = &self.shared;
        let mut state = shared.lock();
        if !state.session_is_active() {
            return;
        }

        state.flush_gesture();
        if let Some(session) = state.session.as_mut() {
            session.pause();
        }
        state.stop_clock();

        info!("monitoring paused");
        shared.emit(MonitorEvent::state_changed(false, "paused"));
    }

    /// Resume a paused session
    ///
    /// The clock restarts now only if input was recent; otherwise the next
    /// accepted sample restarts it.
    pub fn resume_monitoring(&self) {
        let shared = &self.shared;
        let mut state = shared.lock();
        let Some(session) = state.session.as_mut() else {
            return;
        };
        if session.state() != SessionState::Paused {
            return;
        }
        session.resume();

        let now = shared.clock.now();
        if state.input_is_recent(now) {
            shared.ensure_clock(&mut state);
        } else {
            debug!("input idle, analysis waits for the next sample");
        }

        info!("monitoring resumed");
        shared.emit(MonitorEvent::state_changed(true, "resumed"));
    }

    /// End the session and archive its summary
    pub fn stop_monitoring(&self) -> Option<SessionSummary> {
        let shared = &self.shared;
        let mut state = shared.lock();
        state.stop_clock();
        state.flush_gesture();

        let mut session = state.session.take()?;
        let now = shared.clock.now();
        session.end(now);

        let mut summary = session.summarize(now);
        summary.peak_intensity = state.peak_intensity;
        summary.peak_doom_score = state.peak_doom_score;
        summary.interventions_triggered = state.session_interventions;

        state.history.push_back(summary.clone());
        while state.history.len() > state.config.windows.session_history_size {
            state.history.pop_front();
        }
        state.clear_transient();

        info!(
            session_id = %summary.session_id,
            duration_sec = summary.duration_sec,
            scrolls = summary.total_scroll_count,
            interventions = summary.interventions_triggered,
            "monitoring stopped"
        );
        shared.emit(MonitorEvent::SessionEnded {
            summary: summary.clone(),
        });
        shared.emit(MonitorEvent::state_changed(false, "stopped"));
        Some(summary)
    }

    /// Discard the current session (without a summary) and all detection state
    pub fn reset(&self) {
        let shared = &self.shared;
        let mut state = shared.lock();
        state.stop_clock();
        let had_session = state.session.take().is_some();
        state.clear_transient();

        if had_session {
            info!("monitoring reset");
            shared.emit(MonitorEvent::state_changed(false, "reset"));
        }
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Record a content offset from a continuous scroll
    ///
    /// Samples are grouped into gestures; each closed gesture is one scroll
    /// event. Returns the accepted sample, if any.
    pub fn process_scroll(&self, position: Vector2, timestamp: DateTime<Utc>) -> Option<Sample> {
        let shared = &self.shared;
        let mut state = shared.lock();
        if !state.accepts_input() {
            return None;
        }

        let sample = state.tracker.record_sample(position, timestamp)?;
        let acceleration = state.tracker.smoothed_acceleration();
        let closed = state.segmenter.push(&sample, acceleration);
        shared.accept(&mut state, &sample, closed);
        Some(sample)
    }

    /// Record a velocity from the host recognizer; each accepted sample is
    /// one scroll event
    pub fn process_drag(&self, velocity: Vector2, position: Vector2, timestamp: DateTime<Utc>) -> Option<Sample> {
        let shared = &self.shared;
        let mut state = shared.lock();
        if !state.accepts_input() {
            return None;
        }

        let sample = state.tracker.record_velocity(velocity, position, timestamp)?;
        let event = ScrollEvent {
            acceleration: Some(state.tracker.smoothed_acceleration()),
            ..ScrollEvent::new(sample.timestamp, sample.direction, sample.magnitude)
        };
        shared.accept(&mut state, &sample, Some(event));
        Some(sample)
    }

    pub fn process_gesture(&self, input: GestureInput) -> Option<Sample> {
        match input {
            GestureInput::Position { position, timestamp } => self.process_scroll(position, timestamp),
            GestureInput::Velocity {
                velocity,
                position,
                timestamp,
            } => self.process_drag(velocity, position, timestamp),
        }
    }

    /// Count a reading pause reported by the host UI
    pub fn record_reading_pause(&self) {
        let shared = &self.shared;
        let mut state = shared.lock();
        let now = shared.clock.now();
        state.engine.record_reading_pause(now);
    }

    // ------------------------------------------------------------------
    // Analysis
    // ------------------------------------------------------------------

    /// Run one analysis pass now
    ///
    /// The analysis clock calls this internally; hosts without a runtime
    /// call it at [`analysis_interval_sec`](Self::analysis_interval_sec).
    pub fn tick(&self) -> Option<ScrollIntensity> {
        let shared = &self.shared;
        let mut state = shared.lock();
        let now = shared.clock.now();
        shared.tick_locked(&mut state, now)
    }

    /// Apply a power signal; rescales or suspends the analysis clock
    pub fn set_power_mode(&self, mode: PowerMode) {
        let shared = &self.shared;
        let mut state = shared.lock();
        if state.power_mode == mode {
            return;
        }
        debug!(from = ?state.power_mode, to = ?mode, "power mode changed");
        state.power_mode = mode;

        let was_running = state.schedule.running;
        state.stop_clock();
        if mode == PowerMode::Suspended {
            return;
        }

        let now = shared.clock.now();
        if was_running || state.input_is_recent(now) {
            shared.ensure_clock(&mut state);
        }
    }

    /// Fold a presenter outcome into the cooldown ledger
    pub fn report_intervention_result(&self, kind: InterventionKind, result: InterventionResult) -> bool {
        let shared = &self.shared;
        let mut state = shared.lock();
        let now = shared.clock.now();
        let cooldowns = state.config.cooldown.clone();
        let applied = state.interventions.record_result(kind, result, now, &cooldowns);
        if applied {
            info!(?kind, ?result, "intervention result recorded");
        }
        applied
    }

    /// Replace the configuration; components keep their accumulated state
    pub fn update_config(&self, config: DetectionConfig) {
        let shared = &self.shared;
        let issues = config.validate();
        if !issues.is_empty() {
            warn!(?issues, "applying an invalid configuration");
        }

        let mut state = shared.lock();
        state.tracker.set_config(TrackerConfig::from(&config));
        state.scorer.set_config(config.clone());
        state.engine.set_config(config.heuristics.clone());
        state.segmenter.set_gap(config.monitoring.gesture_gap_sec);
        while state.history.len() > config.windows.session_history_size {
            state.history.pop_front();
        }
        state.config = config;

        if state.schedule.running {
            state.stop_clock();
            shared.ensure_clock(&mut state);
        }
    }

    // ------------------------------------------------------------------
    // Read-only views
    // ------------------------------------------------------------------

    pub fn config(&self) -> DetectionConfig {
        self.shared.lock().config.clone()
    }

    pub fn is_monitoring(&self) -> bool {
        self.shared.lock().session.is_some()
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.shared.lock().session.as_ref().map(SessionModel::state)
    }

    pub fn current_session(&self) -> Option<SessionRef> {
        self.shared.lock().session.as_ref().map(SessionModel::session_ref)
    }

    pub fn current_intensity(&self) -> Option<ScrollIntensity> {
        self.shared.lock().current_intensity
    }

    pub fn current_doom_score(&self) -> Option<DoomScrollScore> {
        self.shared.lock().engine.current_score().copied()
    }

    pub fn power_mode(&self) -> PowerMode {
        self.shared.lock().power_mode
    }

    /// Whether the analysis clock is currently scheduled
    pub fn is_analysis_scheduled(&self) -> bool {
        self.shared.lock().schedule.running
    }

    /// Generation of the scheduled analysis clock, if one is scheduled
    ///
    /// Changes every time the clock is (re)started, which restarts its phase.
    pub fn analysis_generation(&self) -> Option<u64> {
        let state = self.shared.lock();
        state.schedule.running.then_some(state.schedule.generation)
    }

    /// Analysis interval for the current power mode; `None` when suspended
    pub fn analysis_interval_sec(&self) -> Option<f64> {
        self.shared.lock().analysis_interval_sec()
    }

    pub fn intervention_status(&self) -> InterventionStatus {
        let shared = &self.shared;
        let state = shared.lock();
        state.interventions.status(shared.clock.now())
    }

    /// Completed session summaries, oldest first
    pub fn session_history(&self) -> Vec<SessionSummary> {
        self.shared.lock().history.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::add_seconds;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tokio::sync::broadcast::Receiver;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 18, 22, 0, 0).unwrap()
    }

    fn manual(config: DetectionConfig) -> (MonitoringController, Arc<ManualClock>, Receiver<MonitorEvent>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let controller = MonitoringController::without_runtime(config, clock.clone());
        let rx = controller.subscribe();
        (controller, clock, rx)
    }

    fn drain(rx: &mut Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn down(speed: f64) -> Vector2 {
        Vector2::new(0.0, speed)
    }

    #[test]
    fn test_start_is_idempotent_and_clock_is_lazy() {
        let (controller, clock, mut rx) = manual(DetectionConfig::default());

        controller.start_monitoring("feed");
        let session = controller.current_session().unwrap();
        controller.start_monitoring("other");
        assert_eq!(controller.current_session(), Some(session));

        let names: Vec<&str> = drain(&mut rx).iter().map(MonitorEvent::name).collect();
        assert_eq!(names, vec!["session_started", "monitoring_state_changed"]);
        assert!(!controller.is_analysis_scheduled());

        // First sample only primes the tracker
        assert!(controller.process_drag(down(500.0), Vector2::ZERO, clock.now()).is_none());
        assert!(!controller.is_analysis_scheduled());

        clock.advance(0.1);
        assert!(controller.process_drag(down(500.0), Vector2::ZERO, clock.now()).is_some());
        assert!(controller.is_analysis_scheduled());
    }

    #[test]
    fn test_input_ignored_without_session() {
        let (controller, clock, _rx) = manual(DetectionConfig::default());
        assert!(controller.process_drag(down(500.0), Vector2::ZERO, clock.now()).is_none());
        clock.advance(0.1);
        assert!(controller.process_drag(down(500.0), Vector2::ZERO, clock.now()).is_none());
        assert_eq!(controller.tick(), None);
        assert_eq!(controller.stop_monitoring(), None);
    }

    #[test]
    fn test_escalating_interventions_respect_presentation_and_cooldown() {
        let (controller, clock, mut rx) = manual(DetectionConfig::default());
        controller.start_monitoring("feed");

        let mut fired = Vec::new();
        for step in 0..=300 {
            let now = clock.now();
            controller.process_drag(down(600.0), Vector2::new(0.0, step as f64 * 300.0), now);
            if step % 2 == 0 {
                controller.tick();
            }
            for event in drain(&mut rx) {
                if let Some(kind) = event.intervention_kind() {
                    fired.push((kind, seconds_between(t0(), now)));
                    assert!(controller.report_intervention_result(kind, InterventionResult::Completed));
                }
            }
            clock.advance(0.5);
        }

        assert_eq!(
            fired,
            vec![(InterventionKind::Gentle, 72.0), (InterventionKind::Firm, 100.0)]
        );

        let status = controller.intervention_status();
        assert_eq!(status.intervention_count, 2);
        assert_eq!(status.outcome_counts[InterventionResult::Completed.index()], 2);
        assert_eq!(status.presenting, None);

        let summary = controller.stop_monitoring().unwrap();
        assert_eq!(summary.total_scroll_count, 300);
        assert_eq!(summary.downward_scroll_ratio, 1.0);
        assert_eq!(summary.interventions_triggered, 2);
        assert!(summary.peak_intensity > 0.8 && summary.peak_intensity < 0.85);
        assert!(summary.peak_doom_score > 0.0);
        assert_eq!(controller.session_history(), vec![summary]);

        // Ledger is cleared with the session
        assert_eq!(controller.intervention_status().intervention_count, 0);
    }

    #[test]
    fn test_unreported_presentation_blocks_until_timeout() {
        let (controller, clock, mut rx) = manual(DetectionConfig::default());
        controller.start_monitoring("feed");

        let mut fired = Vec::new();
        for step in 0..=500 {
            let now = clock.now();
            controller.process_drag(down(600.0), Vector2::ZERO, now);
            if step % 2 == 0 {
                controller.tick();
            }
            fired.extend(drain(&mut rx).iter().filter_map(MonitorEvent::intervention_kind));
            clock.advance(0.5);
        }

        // Gentle at 72s is never reported; it times out at 192s, then Firm fires
        assert_eq!(fired, vec![InterventionKind::Gentle, InterventionKind::Firm]);
        let status = controller.intervention_status();
        assert_eq!(status.outcome_counts[InterventionResult::TimedOut.index()], 1);
        assert_eq!(status.presenting, Some(InterventionKind::Firm));
    }

    fn eager_config(post_break_sec: f64) -> DetectionConfig {
        let mut config = DetectionConfig::default();
        config.intensity.gentle = 0.01;
        config.intensity.firm = 0.02;
        config.intensity.mandatory_break = 0.03;
        config.cooldown.post_break_sec = post_break_sec;
        config
    }

    /// Scroll steadily for `seconds`, ticking every second and answering
    /// each intervention with `answer`
    fn scroll_and_answer(
        controller: &MonitoringController,
        clock: &ManualClock,
        rx: &mut Receiver<MonitorEvent>,
        seconds: usize,
        answer: InterventionResult,
    ) -> Vec<(InterventionKind, f64)> {
        let mut fired = Vec::new();
        for step in 0..=seconds * 2 {
            let now = clock.now();
            controller.process_drag(down(600.0), Vector2::new(0.0, step as f64 * 300.0), now);
            if step % 2 == 0 {
                controller.tick();
            }
            for event in drain(rx) {
                if let Some(kind) = event.intervention_kind() {
                    fired.push((kind, seconds_between(t0(), now)));
                    assert!(controller.report_intervention_result(kind, answer));
                }
            }
            clock.advance(0.5);
        }
        fired
    }

    #[test]
    fn test_mandatory_break_blocks_every_kind_until_window_ends() {
        let (controller, clock, mut rx) = manual(eager_config(60.0));
        controller.start_monitoring("feed");

        let fired = scroll_and_answer(&controller, &clock, &mut rx, 100, InterventionResult::Completed);

        let (first, break_at) = fired[0];
        assert_eq!(first, InterventionKind::MandatoryBreak);
        // Gentle and Firm are past their thresholds and never fired, yet
        // nothing fires until the post-break window closes
        assert_eq!(
            fired[1..],
            [
                (InterventionKind::Firm, break_at + 60.0),
                (InterventionKind::Gentle, break_at + 61.0),
            ]
        );

        let status = controller.intervention_status();
        assert_eq!(status.post_break_until, Some(add_seconds(t0(), break_at + 60.0)));
        assert!(!status.post_break_active);
    }

    #[test]
    fn test_unbounded_post_break_window_saturates() {
        let config = eager_config(1e15);
        assert!(!config.is_valid());
        let (controller, clock, mut rx) = manual(config);
        controller.start_monitoring("feed");

        let fired = scroll_and_answer(&controller, &clock, &mut rx, 200, InterventionResult::TookBreak);

        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, InterventionKind::MandatoryBreak);
        let status = controller.intervention_status();
        assert_eq!(status.post_break_until, Some(DateTime::<Utc>::MAX_UTC));
        assert!(status.post_break_active);
        assert!(controller.tick().is_some());
        assert!(controller.stop_monitoring().is_some());
    }

    #[test]
    fn test_non_finite_drag_is_ignored() {
        let (controller, clock, _rx) = manual(DetectionConfig::default());
        controller.start_monitoring("feed");

        controller.process_drag(down(600.0), Vector2::ZERO, clock.now());
        clock.advance(0.5);
        assert!(controller.process_drag(down(f64::NAN), Vector2::ZERO, clock.now()).is_none());
        assert!(controller
            .process_scroll(Vector2::new(0.0, f64::INFINITY), clock.now())
            .is_none());
        assert!(!controller.is_analysis_scheduled());

        for _ in 0..10 {
            clock.advance(0.5);
            assert!(controller.process_drag(down(600.0), Vector2::ZERO, clock.now()).is_some());
        }
        let intensity = controller.tick().unwrap();
        assert!(intensity.score.is_finite());

        let summary = controller.stop_monitoring().unwrap();
        assert_eq!(summary.total_scroll_count, 10);
        assert_eq!(summary.average_velocity, 600.0);
    }

    #[test]
    fn test_pause_detected_at_ingestion() {
        let (controller, clock, mut rx) = manual(DetectionConfig::default());
        controller.start_monitoring("feed");

        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());
        clock.advance(0.5);
        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());
        clock.advance(10.0);
        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());

        let pauses: Vec<f64> = drain(&mut rx)
            .into_iter()
            .filter_map(|event| match event {
                MonitorEvent::PauseDetected { duration_sec } => Some(duration_sec),
                _ => None,
            })
            .collect();
        assert_eq!(pauses, vec![10.0]);
    }

    #[test]
    fn test_pause_and_resume_follow_idle_timeout() {
        let (controller, clock, _rx) = manual(DetectionConfig::default());
        controller.start_monitoring("feed");
        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());
        clock.advance(0.1);
        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());
        assert!(controller.is_analysis_scheduled());

        controller.pause_monitoring();
        assert_eq!(controller.session_state(), Some(SessionState::Paused));
        assert!(!controller.is_analysis_scheduled());
        assert_eq!(controller.tick(), None);

        controller.resume_monitoring();
        assert_eq!(controller.session_state(), Some(SessionState::Active));
        assert!(controller.is_analysis_scheduled());

        controller.pause_monitoring();
        clock.advance(45.0);
        controller.resume_monitoring();
        assert!(!controller.is_analysis_scheduled());

        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());
        assert!(controller.is_analysis_scheduled());
    }

    #[test]
    fn test_input_resumes_paused_session() {
        let (controller, clock, _rx) = manual(DetectionConfig::default());
        controller.start_monitoring("feed");
        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());
        controller.pause_monitoring();

        clock.advance(0.1);
        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());
        assert_eq!(controller.session_state(), Some(SessionState::Active));
        assert!(controller.is_analysis_scheduled());
    }

    #[test]
    fn test_idle_tick_suspends_clock() {
        let (controller, clock, mut rx) = manual(DetectionConfig::default());
        controller.start_monitoring("feed");
        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());
        clock.advance(0.1);
        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());

        clock.advance(1.0);
        assert!(controller.tick().is_some());
        drain(&mut rx);

        clock.advance(30.0);
        assert_eq!(controller.tick(), None);
        assert!(!controller.is_analysis_scheduled());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_power_mode_scales_and_suspends() {
        let (controller, clock, _rx) = manual(DetectionConfig::default());
        assert_eq!(controller.power_mode(), PowerMode::Balanced);
        assert_eq!(controller.analysis_interval_sec(), Some(1.0));

        controller.start_monitoring("feed");
        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());
        clock.advance(0.1);
        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());

        controller.set_power_mode(PowerMode::Suspended);
        assert!(!controller.is_analysis_scheduled());
        assert_eq!(controller.analysis_interval_sec(), None);

        clock.advance(0.1);
        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());
        assert!(!controller.is_analysis_scheduled());

        controller.set_power_mode(PowerMode::Minimal);
        assert!(controller.is_analysis_scheduled());
        assert_eq!(controller.analysis_interval_sec(), Some(5.0));

        controller.set_power_mode(PowerMode::Full);
        assert_eq!(controller.analysis_interval_sec(), Some(0.5));
    }

    #[test]
    fn test_continuous_scroll_is_segmented_into_gestures() {
        let (controller, clock, _rx) = manual(DetectionConfig::default());
        controller.start_monitoring("feed");

        let frame = 1.0 / 60.0;
        let mut y = 0.0;
        for burst in 0..2 {
            for _ in 0..60 {
                controller.process_scroll(Vector2::new(0.0, y), clock.now());
                y += 10.0;
                clock.advance(frame);
            }
            if burst == 0 {
                clock.advance(1.0);
            }
        }

        let summary = controller.stop_monitoring().unwrap();
        assert_eq!(summary.total_scroll_count, 2);
        assert_eq!(summary.downward_scroll_count, 2);
    }

    #[test]
    fn test_reset_discards_session_without_summary() {
        let (controller, clock, mut rx) = manual(DetectionConfig::default());
        controller.start_monitoring("feed");
        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());
        clock.advance(0.1);
        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());
        drain(&mut rx);

        controller.reset();
        assert!(!controller.is_monitoring());
        assert!(!controller.is_analysis_scheduled());
        assert!(controller.session_history().is_empty());
        assert_eq!(
            drain(&mut rx),
            vec![MonitorEvent::state_changed(false, "reset")]
        );

        controller.reset();
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_session_history_is_bounded() {
        let mut config = DetectionConfig::default();
        config.windows.session_history_size = 2;
        let (controller, clock, _rx) = manual(config);

        for context in ["a", "b", "c"] {
            controller.start_monitoring(context);
            clock.advance(5.0);
            controller.stop_monitoring();
        }

        let contexts: Vec<String> = controller
            .session_history()
            .into_iter()
            .map(|s| s.app_context)
            .collect();
        assert_eq!(contexts, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_try_new_rejects_invalid_config() {
        let mut config = DetectionConfig::default();
        config.intensity.firm = 0.1;
        assert!(matches!(
            MonitoringController::try_new(config),
            Err(DetectorError::InvalidConfiguration(_))
        ));
    }

    /// Wall time derived from tokio's (pausable) clock
    #[derive(Debug)]
    struct TokioClock {
        origin: DateTime<Utc>,
        started: tokio::time::Instant,
    }

    impl TokioClock {
        fn new() -> Self {
            Self {
                origin: t0(),
                started: tokio::time::Instant::now(),
            }
        }
    }

    impl Clock for TokioClock {
        fn now(&self) -> DateTime<Utc> {
            add_seconds(self.origin, self.started.elapsed().as_secs_f64())
        }
    }

    fn count_intensity_updates(rx: &mut Receiver<MonitorEvent>) -> usize {
        drain(rx)
            .iter()
            .filter(|e| matches!(e, MonitorEvent::IntensityUpdated { .. }))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_clock_ticks_until_paused() {
        let clock = Arc::new(TokioClock::new());
        let controller =
            MonitoringController::with_runtime(DetectionConfig::default(), Handle::current(), clock.clone());
        let mut rx = controller.subscribe();

        controller.start_monitoring("feed");
        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());
        assert!(controller.is_analysis_scheduled());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(count_intensity_updates(&mut rx), 3);

        controller.pause_monitoring();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count_intensity_updates(&mut rx), 0);

        controller.stop_monitoring();
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_clock_self_suspends_when_idle() {
        let clock = Arc::new(TokioClock::new());
        let controller =
            MonitoringController::with_runtime(DetectionConfig::default(), Handle::current(), clock.clone());
        let mut rx = controller.subscribe();

        controller.start_monitoring("feed");
        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());

        tokio::time::sleep(Duration::from_secs(40)).await;
        assert!(!controller.is_analysis_scheduled());
        drain(&mut rx);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count_intensity_updates(&mut rx), 0);

        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());
        assert!(controller.is_analysis_scheduled());
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(count_intensity_updates(&mut rx), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_clock_survives_oversized_interval() {
        let mut config = DetectionConfig::default();
        config.monitoring.base_analysis_interval_sec = 1e30;
        let clock = Arc::new(TokioClock::new());
        let controller = MonitoringController::with_runtime(config, Handle::current(), clock.clone());
        let mut rx = controller.subscribe();

        controller.start_monitoring("feed");
        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.process_drag(down(500.0), Vector2::ZERO, clock.now());
        assert!(controller.is_analysis_scheduled());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count_intensity_updates(&mut rx), 0);
        assert!(controller.is_analysis_scheduled());
        assert!(controller.stop_monitoring().is_some());
    }
}
