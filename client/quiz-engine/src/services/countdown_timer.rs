use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use crate::models::{TimeExpired, TimerEvent, TimerTick};

/// Countdown over a whole-second budget. Emits one `TimerTick` per elapsed second and a
/// single `TimeExpired` when the budget reaches zero, unless cancelled first.
pub struct CountdownTimer {
    total_seconds: u64,
    remaining: Arc<AtomicU64>,
    fired: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl CountdownTimer {
    /// Spawns the countdown on the current tokio runtime. `tick_interval` is the wall time
    /// of one countdown second.
    pub fn start(
        total_seconds: u64,
        tick_interval: Duration,
        events: UnboundedSender<TimerEvent>,
    ) -> Self {
        let remaining = Arc::new(AtomicU64::new(total_seconds));
        let fired = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run_countdown(
            total_seconds,
            tick_interval,
            remaining.clone(),
            fired.clone(),
            cancelled.clone(),
            events,
        ));

        tracing::debug!(
            "Countdown started: total={}s, tick_interval={}ms",
            total_seconds,
            tick_interval.as_millis()
        );

        Self {
            total_seconds,
            remaining,
            fired,
            cancelled,
            task: Some(task),
        }
    }

    pub fn total_seconds(&self) -> u64 {
        self.total_seconds
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.remaining.load(Ordering::SeqCst)
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Stops the countdown and suppresses expiry. Idempotent.
    ///
    /// On a multi-threaded runtime a tick that the timer task is already sending on another
    /// worker may still be delivered after this returns; nothing later than that is.
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(
                "Countdown cancelled with {}s remaining",
                self.remaining_seconds()
            );
        }
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_countdown(
    total_seconds: u64,
    tick_interval: Duration,
    remaining: Arc<AtomicU64>,
    fired: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    events: UnboundedSender<TimerEvent>,
) {
    if total_seconds > 0 {
        let mut interval = interval_at(Instant::now() + tick_interval, tick_interval);

        loop {
            interval.tick().await;
            if cancelled.load(Ordering::SeqCst) {
                return;
            }

            let left = remaining.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
            if left == 0 {
                break;
            }

            let tick = TimerEvent::TimerTick(TimerTick {
                remaining_seconds: left,
                elapsed_seconds: total_seconds - left,
                total_seconds,
                timestamp: Utc::now(),
            });
            if cancelled.load(Ordering::SeqCst) {
                return;
            }
            if events.send(tick).is_err() {
                tracing::debug!("Countdown listener dropped, stopping timer");
                return;
            }
        }
    }

    if cancelled.load(Ordering::SeqCst) {
        return;
    }
    if fired
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        tracing::info!("Countdown expired after {}s", total_seconds);
        let _ = events.send(TimerEvent::TimeExpired(TimeExpired {
            total_seconds,
            timestamp: Utc::now(),
        }));
    }
}
