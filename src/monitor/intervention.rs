//! Intervention cooldown ledger
//!
//! Single-writer bookkeeping for fired interventions: last firing time per
//! kind, the shared post-break suppression window, the presentation in
//! flight, and outcome feedback from the presenter. Only the controller
//! mutates it; callers read an [`InterventionStatus`] snapshot.

use crate::config::{CooldownPeriods, InterventionThresholds};
use crate::types::{add_seconds, seconds_between, InterventionKind, InterventionResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Presentation {
    kind: InterventionKind,
    since: DateTime<Utc>,
}

/// Read-only view of the intervention ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionStatus {
    pub intervention_count: u32,
    /// Indexed by [`InterventionKind::index`]
    pub counts_by_kind: [u32; 3],
    pub last_fired: [Option<DateTime<Utc>>; 3],
    pub presenting: Option<InterventionKind>,
    pub post_break_until: Option<DateTime<Utc>>,
    pub post_break_active: bool,
    /// Indexed by [`InterventionResult::index`]
    pub outcome_counts: [u32; 5],
    pub consecutive_ignored: u32,
}

/// Cooldown and feedback ledger
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterventionState {
    last_fired: [Option<DateTime<Utc>>; 3],
    counts_by_kind: [u32; 3],
    intervention_count: u32,
    post_break_until: Option<DateTime<Utc>>,
    presenting: Option<Presentation>,
    outcome_counts: [u32; 5],
    consecutive_ignored: u32,
}

impl InterventionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `kind` is past its own cooldown at `now`
    pub fn is_cooled_down(&self, kind: InterventionKind, cooldowns: &CooldownPeriods, now: DateTime<Utc>) -> bool {
        match self.last_fired[kind.index()] {
            Some(at) => seconds_between(at, now) >= cooldowns.for_kind(kind),
            None => true,
        }
    }

    pub fn is_post_break_active(&self, now: DateTime<Utc>) -> bool {
        self.post_break_until.map(|until| now < until).unwrap_or(false)
    }

    pub fn is_presenting(&self) -> bool {
        self.presenting.is_some()
    }

    /// Pick the intervention to fire for `score`, if any
    ///
    /// Highest severity first; the first kind whose threshold is met and
    /// whose cooldown has elapsed wins. Nothing fires while a presentation
    /// is in flight or the post-break window is open.
    pub fn evaluate(
        &self,
        score: f64,
        thresholds: &InterventionThresholds,
        cooldowns: &CooldownPeriods,
        now: DateTime<Utc>,
    ) -> Option<InterventionKind> {
        if self.is_presenting() || self.is_post_break_active(now) {
            return None;
        }

        InterventionKind::BY_SEVERITY
            .into_iter()
            .find(|kind| score >= thresholds.for_kind(*kind) && self.is_cooled_down(*kind, cooldowns, now))
    }

    /// Record a firing and start its presentation
    pub fn record_fired(&mut self, kind: InterventionKind, now: DateTime<Utc>, cooldowns: &CooldownPeriods) {
        self.last_fired[kind.index()] = Some(now);
        self.counts_by_kind[kind.index()] += 1;
        self.intervention_count += 1;
        self.presenting = Some(Presentation { kind, since: now });

        if kind == InterventionKind::MandatoryBreak {
            self.open_post_break(now, cooldowns);
        }
    }

    /// Fold a presenter outcome into the ledger
    ///
    /// Results for a kind that is not being presented are ignored (they
    /// were already folded in as timed out). Returns whether it was applied.
    pub fn record_result(
        &mut self,
        kind: InterventionKind,
        result: InterventionResult,
        now: DateTime<Utc>,
        cooldowns: &CooldownPeriods,
    ) -> bool {
        match self.presenting {
            Some(p) if p.kind == kind => {}
            _ => {
                debug!(?kind, ?result, "intervention result without matching presentation");
                return false;
            }
        }

        self.presenting = None;
        self.outcome_counts[result.index()] += 1;
        if result.is_ignored() {
            self.consecutive_ignored += 1;
        } else {
            self.consecutive_ignored = 0;
        }
        if result == InterventionResult::TookBreak {
            self.open_post_break(now, cooldowns);
        }
        true
    }

    /// Treat a presentation older than `timeout_sec` as timed out
    pub fn expire_presentation(
        &mut self,
        now: DateTime<Utc>,
        timeout_sec: f64,
        cooldowns: &CooldownPeriods,
    ) -> Option<InterventionKind> {
        let presentation = self.presenting?;
        if seconds_between(presentation.since, now) < timeout_sec {
            return None;
        }
        self.record_result(presentation.kind, InterventionResult::TimedOut, now, cooldowns);
        Some(presentation.kind)
    }

    fn open_post_break(&mut self, now: DateTime<Utc>, cooldowns: &CooldownPeriods) {
        let until = add_seconds(now, cooldowns.post_break_sec);
        self.post_break_until = Some(match self.post_break_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
    }

    pub fn intervention_count(&self) -> u32 {
        self.intervention_count
    }

    pub fn status(&self, now: DateTime<Utc>) -> InterventionStatus {
        InterventionStatus {
            intervention_count: self.intervention_count,
            counts_by_kind: self.counts_by_kind,
            last_fired: self.last_fired,
            presenting: self.presenting.map(|p| p.kind),
            post_break_until: self.post_break_until,
            post_break_active: self.is_post_break_active(now),
            outcome_counts: self.outcome_counts,
            consecutive_ignored: self.consecutive_ignored,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectionConfig;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 17, 22, 0, 0).unwrap()
    }

    fn at(offset_sec: f64) -> DateTime<Utc> {
        add_seconds(t0(), offset_sec)
    }

    #[test]
    fn test_highest_satisfied_kind_fires() {
        let config = DetectionConfig::default();
        let ledger = InterventionState::new();

        assert_eq!(ledger.evaluate(0.4, &config.intensity, &config.cooldown, t0()), None);
        assert_eq!(
            ledger.evaluate(0.55, &config.intensity, &config.cooldown, t0()),
            Some(InterventionKind::Gentle)
        );
        assert_eq!(
            ledger.evaluate(0.75, &config.intensity, &config.cooldown, t0()),
            Some(InterventionKind::Firm)
        );
        assert_eq!(
            ledger.evaluate(0.9, &config.intensity, &config.cooldown, t0()),
            Some(InterventionKind::MandatoryBreak)
        );
    }

    #[test]
    fn test_kind_cannot_refire_within_cooldown() {
        let config = DetectionConfig::default();
        let (thresholds, cooldowns) = (&config.intensity, &config.cooldown);
        let mut ledger = InterventionState::new();

        ledger.record_fired(InterventionKind::Gentle, t0(), cooldowns);
        assert!(ledger.record_result(InterventionKind::Gentle, InterventionResult::Completed, at(5.0), cooldowns));

        for offset in [10.0, 100.0, 299.0] {
            assert_eq!(ledger.evaluate(0.6, thresholds, cooldowns, at(offset)), None);
        }
        assert_eq!(
            ledger.evaluate(0.6, thresholds, cooldowns, at(300.0)),
            Some(InterventionKind::Gentle)
        );
    }

    #[test]
    fn test_cooling_kind_falls_through_to_lower_severity() {
        let config = DetectionConfig::default();
        let (thresholds, cooldowns) = (&config.intensity, &config.cooldown);
        let mut ledger = InterventionState::new();

        ledger.record_fired(InterventionKind::Firm, t0(), cooldowns);
        ledger.record_result(InterventionKind::Firm, InterventionResult::Continued, at(1.0), cooldowns);

        assert_eq!(
            ledger.evaluate(0.8, thresholds, cooldowns, at(10.0)),
            Some(InterventionKind::Gentle)
        );
    }

    #[test]
    fn test_mandatory_break_blocks_all_kinds() {
        let config = DetectionConfig::default();
        let (thresholds, cooldowns) = (&config.intensity, &config.cooldown);
        let mut ledger = InterventionState::new();

        ledger.record_fired(InterventionKind::MandatoryBreak, t0(), cooldowns);
        ledger.record_result(InterventionKind::MandatoryBreak, InterventionResult::Completed, at(60.0), cooldowns);

        for offset in [61.0, 400.0, 899.0] {
            assert_eq!(ledger.evaluate(1.0, thresholds, cooldowns, at(offset)), None);
        }
        // Post-break window over, mandatory still cooling: the next kind down fires
        assert_eq!(
            ledger.evaluate(1.0, thresholds, cooldowns, at(900.0)),
            Some(InterventionKind::Firm)
        );
    }

    #[test]
    fn test_presentation_blocks_and_times_out() {
        let config = DetectionConfig::default();
        let (thresholds, cooldowns) = (&config.intensity, &config.cooldown);
        let mut ledger = InterventionState::new();

        ledger.record_fired(InterventionKind::Gentle, t0(), cooldowns);
        assert!(ledger.is_presenting());
        assert_eq!(ledger.evaluate(0.95, thresholds, cooldowns, at(10.0)), None);

        assert_eq!(ledger.expire_presentation(at(119.0), 120.0, cooldowns), None);
        assert_eq!(
            ledger.expire_presentation(at(120.0), 120.0, cooldowns),
            Some(InterventionKind::Gentle)
        );

        let status = ledger.status(at(120.0));
        assert_eq!(status.presenting, None);
        assert_eq!(status.outcome_counts[InterventionResult::TimedOut.index()], 1);
        assert_eq!(status.consecutive_ignored, 1);

        // Late report after the timeout is ignored
        assert!(!ledger.record_result(InterventionKind::Gentle, InterventionResult::Completed, at(130.0), cooldowns));
    }

    #[test]
    fn test_took_break_opens_post_break_window() {
        let config = DetectionConfig::default();
        let (thresholds, cooldowns) = (&config.intensity, &config.cooldown);
        let mut ledger = InterventionState::new();

        ledger.record_fired(InterventionKind::Firm, t0(), cooldowns);
        ledger.record_result(InterventionKind::Firm, InterventionResult::Skipped, at(2.0), cooldowns);
        assert_eq!(ledger.status(at(2.0)).consecutive_ignored, 1);

        ledger.record_fired(InterventionKind::Gentle, at(3.0), cooldowns);
        ledger.record_result(InterventionKind::Gentle, InterventionResult::TookBreak, at(10.0), cooldowns);

        let status = ledger.status(at(10.0));
        assert_eq!(status.consecutive_ignored, 0);
        assert!(status.post_break_active);
        assert_eq!(status.post_break_until, Some(at(910.0)));
        assert_eq!(ledger.evaluate(1.0, thresholds, cooldowns, at(500.0)), None);
    }

    #[test]
    fn test_reset_clears_ledger() {
        let config = DetectionConfig::default();
        let mut ledger = InterventionState::new();
        ledger.record_fired(InterventionKind::MandatoryBreak, t0(), &config.cooldown);

        ledger.reset();
        assert_eq!(ledger, InterventionState::new());
        assert_eq!(ledger.intervention_count(), 0);
    }
}
