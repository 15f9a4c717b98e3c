//! The periodic lifecycle driver.
//!
//! Each tick loads every event not yet in a terminal state, recomputes its
//! target state, and applies the full transition chain in order, one
//! persisted step and one notification per transition, so a delayed tick
//! emits the same ordered notifications an on-time sequence of ticks would
//! have. Per-event failures are logged and retried next tick; they never
//! abort the rest of the tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use rollcall_common::{Clock, Event, NotifyBackend, Result, StatusChanged};
use rollcall_store::EventCollection;

use crate::status::{target_status, transition_path};

pub struct LifecycleScheduler {
    events: Arc<dyn EventCollection>,
    notifier: Arc<dyn NotifyBackend>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

/// What one tick did.
#[derive(Debug, Default, Clone)]
pub struct TickStats {
    pub events_checked: usize,
    pub transitions_applied: usize,
    pub events_failed: usize,
}

impl std::fmt::Display for TickStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "checked={} transitions={} failed={}",
            self.events_checked, self.transitions_applied, self.events_failed
        )
    }
}

impl LifecycleScheduler {
    pub fn new(
        events: Arc<dyn EventCollection>,
        notifier: Arc<dyn NotifyBackend>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            events,
            notifier,
            clock,
            interval,
        }
    }

    /// One evaluation pass over all active events.
    pub async fn tick(&self) -> Result<TickStats> {
        let now = self.clock.now();
        let events = self.events.events_not_terminal().await?;

        let mut stats = TickStats {
            events_checked: events.len(),
            ..TickStats::default()
        };

        for mut event in events {
            match self.advance_event(&mut event).await {
                Ok(applied) => stats.transitions_applied += applied,
                Err(e) => {
                    // Retried on the next tick; the rest of this tick
                    // proceeds.
                    warn!(event_id = %event.event_id, error = %e, "Failed to advance event");
                    stats.events_failed += 1;
                }
            }
        }

        if stats.transitions_applied > 0 || stats.events_failed > 0 {
            info!(now = %now, "Scheduler tick complete. {stats}");
        }
        Ok(stats)
    }

    /// Apply every transition between the stored state and the target, in
    /// order. Each step is persisted before its notification goes out, so
    /// a crash mid-chain resumes exactly where it stopped.
    async fn advance_event(&self, event: &mut Event) -> Result<usize> {
        let now = self.clock.now();
        let target = target_status(event, now);
        if target == event.status {
            return Ok(0);
        }

        let path = transition_path(event.status, target);
        let mut applied = 0;
        for next in path {
            let from = event.status;
            event.status = next;
            event.updated_at = now;
            self.events.save_event(event).await?;
            applied += 1;

            let change = StatusChanged {
                event_id: event.event_id,
                title: event.title.clone(),
                from,
                to: next,
                at: now,
            };
            if let Err(e) = self.notifier.status_changed(&change).await {
                warn!(event_id = %event.event_id, error = %e, "Failed to send status notification");
            }
        }
        Ok(applied)
    }

    /// Drive ticks until the shutdown signal flips. Tick errors are logged
    /// and the loop keeps going.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(interval_secs = self.interval.as_secs(), "Scheduler running");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "Scheduler tick failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Scheduler stopping");
                        break;
                    }
                }
            }
        }
    }

    /// Spawn the loop and return a stop handle. Explicit lifecycle: the
    /// scheduler owns no global state.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move { self.run(rx).await });
        SchedulerHandle { shutdown: tx, task }
    }
}

pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}
