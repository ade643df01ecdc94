//! Time source and cancellable timers.
//!
//! Timers are identified by [`TimerId`]s that a scheduler never hands out
//! twice. A tick that was already queued when its timer got cancelled can
//! therefore always be recognised as stale by its owner.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::model::Millis;

/// Source of the current time in epoch milliseconds.
pub trait Clock {
    fn now_ms(&self) -> Millis;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

/// Test clock; clones share the same instant.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: Millis) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    pub fn set(&self, now: Millis) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(duration_ms(by), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }
}

/// Handle of an armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// When a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSchedule {
    /// Fire repeatedly, once per period.
    Every(Duration),
    /// Fire once after the delay.
    After(Duration),
}

impl TimerSchedule {
    #[must_use]
    pub const fn period(self) -> Duration {
        match self {
            Self::Every(d) | Self::After(d) => d,
        }
    }

    #[must_use]
    pub const fn repeats(self) -> bool {
        matches!(self, Self::Every(_))
    }
}

/// Arms and cancels timers whose ticks are delivered back to the owner
/// by id.
///
/// `cancel` must take effect before it returns: once cancelled, the
/// scheduler never reports that id again.
pub trait Scheduler {
    fn arm(&mut self, schedule: TimerSchedule) -> TimerId;

    fn cancel(&mut self, id: TimerId);
}

/// Deterministic scheduler driven by [`ManualScheduler::advance`].
#[derive(Debug)]
pub struct ManualScheduler {
    clock: ManualClock,
    next_id: u64,
    armed: BTreeMap<TimerId, ArmedTimer>,
}

#[derive(Debug, Clone, Copy)]
struct ArmedTimer {
    schedule: TimerSchedule,
    due: Millis,
}

impl ManualScheduler {
    #[must_use]
    pub const fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            next_id: 1,
            armed: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn clock(&self) -> &ManualClock {
        &self.clock
    }

    #[must_use]
    pub fn is_armed(&self, id: TimerId) -> bool {
        self.armed.contains_key(&id)
    }

    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    /// Move the clock forward and return every firing in due order.
    ///
    /// A repeating timer appears once per elapsed period.
    pub fn advance(&mut self, by: Duration) -> Vec<TimerId> {
        let target = self.clock.now_ms() + duration_ms(by);
        let mut fired = Vec::new();

        loop {
            let next = self
                .armed
                .iter()
                .filter(|(_, t)| t.due <= target)
                .min_by_key(|(id, t)| (t.due, **id))
                .map(|(id, t)| (*id, *t));
            let Some((id, timer)) = next else { break };

            self.clock.set(timer.due);
            fired.push(id);
            if timer.schedule.repeats() {
                let period = duration_ms(timer.schedule.period()).max(1);
                if let Some(t) = self.armed.get_mut(&id) {
                    t.due += period;
                }
            } else {
                self.armed.remove(&id);
            }
        }

        self.clock.set(target);
        fired
    }
}

impl Scheduler for ManualScheduler {
    fn arm(&mut self, schedule: TimerSchedule) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let due = self.clock.now_ms() + duration_ms(schedule.period());
        self.armed.insert(id, ArmedTimer { schedule, due });
        id
    }

    fn cancel(&mut self, id: TimerId) {
        self.armed.remove(&id);
    }
}

/// Whole milliseconds of a duration, saturating.
#[must_use]
pub fn duration_ms(d: Duration) -> Millis {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_shared() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();
        other.advance(Duration::from_millis(250));
        assert_eq!(clock.now_ms(), 1_250);
    }

    #[test]
    fn test_repeating_timer_fires_per_period() {
        let mut scheduler = ManualScheduler::new(ManualClock::new(0));
        let tick = scheduler.arm(TimerSchedule::Every(Duration::from_millis(100)));

        let fired = scheduler.advance(Duration::from_millis(350));
        assert_eq!(fired, vec![tick, tick, tick]);
        assert_eq!(scheduler.clock().now_ms(), 350);
        assert!(scheduler.is_armed(tick));
    }

    #[test]
    fn test_one_shot_fires_once_in_order() {
        let mut scheduler = ManualScheduler::new(ManualClock::new(0));
        let late = scheduler.arm(TimerSchedule::After(Duration::from_millis(300)));
        let early = scheduler.arm(TimerSchedule::After(Duration::from_millis(100)));

        assert_eq!(scheduler.advance(Duration::from_secs(1)), vec![early, late]);
        assert_eq!(scheduler.armed_count(), 0);
        assert!(scheduler.advance(Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn test_cancelled_timer_never_fires_and_id_is_not_reused() {
        let mut scheduler = ManualScheduler::new(ManualClock::new(0));
        let first = scheduler.arm(TimerSchedule::Every(Duration::from_millis(100)));
        scheduler.cancel(first);
        let second = scheduler.arm(TimerSchedule::Every(Duration::from_millis(100)));

        assert_ne!(first, second);
        assert_eq!(scheduler.advance(Duration::from_millis(100)), vec![second]);
    }
}
