//! Timer scheduler backed by tokio tasks.
//!
//! Each armed timer is a task that posts its [`TimerId`] into a queue the
//! driver drains on its own loop, so ticks are handled on the same
//! dispatcher as every other input. Cancelling aborts the task; a tick that
//! was already queued is dropped by the view as stale.

use std::{collections::HashMap, time::Duration};

use agent_watch_core::{Scheduler, TimerId, TimerSchedule};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

const MIN_PERIOD: Duration = Duration::from_millis(1);

pub struct TokioScheduler {
    next_id: u64,
    timers: HashMap<TimerId, JoinHandle<()>>,
    ticks: mpsc::UnboundedSender<TimerId>,
}

impl TokioScheduler {
    /// Create a scheduler and the queue its ticks arrive on.
    ///
    /// Must be used inside a tokio runtime.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerId>) {
        let (ticks, rx) = mpsc::unbounded_channel();
        (
            Self {
                next_id: 0,
                timers: HashMap::new(),
                ticks,
            },
            rx,
        )
    }

    /// Timers armed and not yet cancelled or finished.
    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.timers.values().filter(|h| !h.is_finished()).count()
    }
}

impl Scheduler for TokioScheduler {
    fn arm(&mut self, schedule: TimerSchedule) -> TimerId {
        // Fired one-shots are never cancelled by their owner.
        self.timers.retain(|_, handle| !handle.is_finished());

        self.next_id += 1;
        let id = TimerId::from_raw(self.next_id);
        let ticks = self.ticks.clone();
        let period = schedule.period().max(MIN_PERIOD);

        let handle = match schedule {
            TimerSchedule::Every(_) => tokio::spawn(async move {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    interval.tick().await;
                    if ticks.send(id).is_err() {
                        break;
                    }
                }
            }),
            TimerSchedule::After(_) => tokio::spawn(async move {
                tokio::time::sleep(period).await;
                let _ = ticks.send(id);
            }),
        };
        self.timers.insert(id, handle);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_repeating_timer_ticks_until_cancelled() {
        let (mut scheduler, mut ticks) = TokioScheduler::new();
        let id = scheduler.arm(TimerSchedule::Every(Duration::from_millis(100)));

        assert_eq!(ticks.recv().await, Some(id));
        assert_eq!(ticks.recv().await, Some(id));

        scheduler.cancel(id);
        tokio::time::sleep(Duration::from_millis(500)).await;
        // At most one tick queued before the abort landed.
        while let Ok(stale) = ticks.try_recv() {
            assert_eq!(stale, id);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(ticks.try_recv().is_err());
        assert_eq!(scheduler.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_fires_once() {
        let (mut scheduler, mut ticks) = TokioScheduler::new();
        let id = scheduler.arm(TimerSchedule::After(Duration::from_secs(5)));

        tokio::time::sleep(Duration::from_millis(4_999)).await;
        assert!(ticks.try_recv().is_err());

        assert_eq!(ticks.recv().await, Some(id));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(ticks.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ids_are_not_reused() {
        let (mut scheduler, _ticks) = TokioScheduler::new();
        let first = scheduler.arm(TimerSchedule::After(Duration::from_millis(10)));
        scheduler.cancel(first);
        let second = scheduler.arm(TimerSchedule::After(Duration::from_millis(10)));
        assert_ne!(first, second);
        assert_eq!(scheduler.armed_count(), 1);
    }
}
