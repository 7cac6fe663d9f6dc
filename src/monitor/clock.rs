//! Analysis clock
//!
//! A cancellable repeating task on a tokio runtime. The callback returns
//! `false` to stop the clock from the inside (idle self-suspension, stale
//! generation).

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Bounds applied to the clock period
pub const MIN_PERIOD: Duration = Duration::from_millis(1);
pub const MAX_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Handle to a running analysis clock; dropping it cancels the clock
#[derive(Debug)]
pub struct AnalysisClock {
    token: CancellationToken,
    task: JoinHandle<()>,
    period: Duration,
    generation: u64,
}

impl AnalysisClock {
    /// Spawn a clock that calls `on_tick` every `period`, first after one
    /// full period
    ///
    /// The period is clamped to [`MIN_PERIOD`, `MAX_PERIOD`].
    pub fn spawn<F>(runtime: &Handle, period: Duration, generation: u64, mut on_tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let period = period.clamp(MIN_PERIOD, MAX_PERIOD);
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let task = runtime.spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        if !on_tick() {
                            break;
                        }
                    }
                }
            }
            debug!(generation, "analysis clock stopped");
        });

        Self {
            token,
            task,
            period,
            generation,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Drop for AnalysisClock {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
