//! Cooperative interrupt handshake.
//!
//! `Idle --request--> Requested --ack--> Acknowledged --complete|error--> Idle`.
//! A local deadline armed at `request` returns to `Idle` from any state if
//! the server never completes the handshake. The client then believes the
//! session is idle although the server may still be working; input
//! responsiveness is preferred over that risk.

use std::time::Duration;

use agent_watch_core::{InterruptStatus, Scheduler, TimerId, TimerSchedule, ViewError};
use tracing::{debug, warn};

/// How an outstanding request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterruptOutcome {
    Completed,
    Errored(String),
    TimedOut,
}

/// Single outstanding interrupt request with a timeout fallback.
#[derive(Debug)]
pub struct InterruptCoordinator {
    status: InterruptStatus,
    deadline: Option<TimerId>,
    timeout: Duration,
    last_outcome: Option<InterruptOutcome>,
}

impl InterruptCoordinator {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            status: InterruptStatus::Idle,
            deadline: None,
            timeout,
            last_outcome: None,
        }
    }

    /// Start a request and arm its deadline.
    ///
    /// # Errors
    /// Returns `InterruptPending` if a request is already outstanding.
    pub fn request<S: Scheduler>(&mut self, scheduler: &mut S) -> Result<(), ViewError> {
        if self.is_outstanding() {
            return Err(ViewError::InterruptPending);
        }
        self.status = InterruptStatus::Requested;
        self.deadline = Some(scheduler.arm(TimerSchedule::After(self.timeout)));
        self.last_outcome = None;
        Ok(())
    }

    /// Server acknowledged the request. Ignored unless `Requested`.
    pub fn acknowledge(&mut self) -> bool {
        if self.status == InterruptStatus::Requested {
            self.status = InterruptStatus::Acknowledged;
            true
        } else {
            debug!(status = ?self.status, "interrupt acknowledgement ignored");
            false
        }
    }

    /// Server finished the interrupt.
    pub fn complete<S: Scheduler>(&mut self, scheduler: &mut S) -> Option<InterruptOutcome> {
        self.settle(InterruptOutcome::Completed, scheduler)
    }

    /// Server failed to interrupt.
    pub fn fail<S: Scheduler>(&mut self, message: String, scheduler: &mut S) -> Option<InterruptOutcome> {
        self.settle(InterruptOutcome::Errored(message), scheduler)
    }

    /// Deadline tick. Returns `TimedOut` if `timer` is the live deadline.
    pub fn on_timer(&mut self, timer: TimerId) -> Option<InterruptOutcome> {
        if self.deadline != Some(timer) {
            return None;
        }
        // One-shot timers are gone once fired.
        self.deadline = None;
        warn!(status = ?self.status, timeout = ?self.timeout, "interrupt not confirmed, restoring input");
        self.finish(InterruptOutcome::TimedOut)
    }

    #[must_use]
    pub fn owns_timer(&self, timer: TimerId) -> bool {
        self.deadline == Some(timer)
    }

    /// Drop any outstanding request and its deadline.
    pub fn reset<S: Scheduler>(&mut self, scheduler: &mut S) {
        if let Some(timer) = self.deadline.take() {
            scheduler.cancel(timer);
        }
        self.status = InterruptStatus::Idle;
    }

    #[must_use]
    pub const fn status(&self) -> InterruptStatus {
        self.status
    }

    #[must_use]
    pub const fn is_outstanding(&self) -> bool {
        !matches!(self.status, InterruptStatus::Idle)
    }

    #[must_use]
    pub const fn last_outcome(&self) -> Option<&InterruptOutcome> {
        self.last_outcome.as_ref()
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    fn settle<S: Scheduler>(&mut self, outcome: InterruptOutcome, scheduler: &mut S) -> Option<InterruptOutcome> {
        if !self.is_outstanding() {
            debug!(?outcome, "interrupt result with no outstanding request ignored");
            return None;
        }
        if let Some(timer) = self.deadline.take() {
            scheduler.cancel(timer);
        }
        self.finish(outcome)
    }

    fn finish(&mut self, outcome: InterruptOutcome) -> Option<InterruptOutcome> {
        self.status = InterruptStatus::Idle;
        self.last_outcome = Some(outcome.clone());
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use agent_watch_core::{ManualClock, ManualScheduler};

    use super::*;

    fn setup() -> (InterruptCoordinator, ManualScheduler) {
        (
            InterruptCoordinator::new(Duration::from_millis(5_000)),
            ManualScheduler::new(ManualClock::new(0)),
        )
    }

    #[test]
    fn test_request_ack_complete_ends_idle() {
        let (mut interrupt, mut scheduler) = setup();
        interrupt.request(&mut scheduler).unwrap();
        assert_eq!(interrupt.status(), InterruptStatus::Requested);

        scheduler.advance(Duration::from_millis(1_000));
        assert!(interrupt.acknowledge());
        assert_eq!(interrupt.status(), InterruptStatus::Acknowledged);

        assert_eq!(interrupt.complete(&mut scheduler), Some(InterruptOutcome::Completed));
        assert_eq!(interrupt.status(), InterruptStatus::Idle);
        assert_eq!(scheduler.armed_count(), 0);
    }

    #[test]
    fn test_second_request_rejected() {
        let (mut interrupt, mut scheduler) = setup();
        interrupt.request(&mut scheduler).unwrap();
        assert_eq!(interrupt.request(&mut scheduler), Err(ViewError::InterruptPending));
        interrupt.acknowledge();
        assert_eq!(interrupt.request(&mut scheduler), Err(ViewError::InterruptPending));
        assert_eq!(scheduler.armed_count(), 1);
    }

    #[test]
    fn test_timeout_without_response() {
        let (mut interrupt, mut scheduler) = setup();
        interrupt.request(&mut scheduler).unwrap();

        assert!(scheduler.advance(Duration::from_millis(4_999)).is_empty());
        let fired = scheduler.advance(Duration::from_millis(1));
        assert_eq!(fired.len(), 1);

        assert_eq!(interrupt.on_timer(fired[0]), Some(InterruptOutcome::TimedOut));
        assert_eq!(interrupt.status(), InterruptStatus::Idle);
        assert_eq!(interrupt.last_outcome(), Some(&InterruptOutcome::TimedOut));
    }

    #[test]
    fn test_timeout_also_covers_acknowledged() {
        let (mut interrupt, mut scheduler) = setup();
        interrupt.request(&mut scheduler).unwrap();
        interrupt.acknowledge();

        let fired = scheduler.advance(Duration::from_millis(5_000));
        assert_eq!(interrupt.on_timer(fired[0]), Some(InterruptOutcome::TimedOut));
    }

    #[test]
    fn test_error_after_ack_surfaces_message() {
        let (mut interrupt, mut scheduler) = setup();
        interrupt.request(&mut scheduler).unwrap();
        interrupt.acknowledge();

        let outcome = interrupt.fail("agent busy".into(), &mut scheduler);
        assert_eq!(outcome, Some(InterruptOutcome::Errored("agent busy".into())));
        assert!(!interrupt.is_outstanding());
        assert_eq!(scheduler.armed_count(), 0);
    }

    #[test]
    fn test_late_messages_ignored_after_timeout() {
        let (mut interrupt, mut scheduler) = setup();
        interrupt.request(&mut scheduler).unwrap();
        let fired = scheduler.advance(Duration::from_millis(5_000));
        interrupt.on_timer(fired[0]);

        assert!(!interrupt.acknowledge());
        assert_eq!(interrupt.complete(&mut scheduler), None);
        assert_eq!(interrupt.on_timer(fired[0]), None);
    }

    #[test]
    fn test_reset_cancels_deadline() {
        let (mut interrupt, mut scheduler) = setup();
        interrupt.request(&mut scheduler).unwrap();
        interrupt.reset(&mut scheduler);

        assert_eq!(interrupt.status(), InterruptStatus::Idle);
        assert!(scheduler.advance(Duration::from_secs(10)).is_empty());
    }
}
