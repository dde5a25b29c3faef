use std::mem;
use std::time::Duration;

use super::control::ControlId;

/// Pending display-refresh callbacks, at most one per controller.
#[derive(Debug, Default)]
pub(crate) struct FrameQueue {
    pending: Vec<ControlId>,
}

impl FrameQueue {
    pub(crate) fn request(&mut self, control: ControlId) {
        if !self.pending.contains(&control) {
            self.pending.push(control);
        }
    }

    pub(crate) fn cancel(&mut self, control: ControlId) {
        self.pending.retain(|pending| *pending != control);
    }

    pub(crate) fn is_requested(&self, control: ControlId) -> bool {
        self.pending.contains(&control)
    }

    pub(crate) fn take(&mut self) -> Vec<ControlId> {
        mem::take(&mut self.pending)
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TimerTask {
    ConsistencyCheck {
        control: ControlId,
        generation: u64,
    },
    RecoveryPass {
        control: ControlId,
        generation: u64,
        delay_ms: u64,
    },
}

impl TimerTask {
    pub(crate) fn control(&self) -> ControlId {
        match self {
            TimerTask::ConsistencyCheck { control, .. } | TimerTask::RecoveryPass { control, .. } => {
                *control
            }
        }
    }
}

#[derive(Debug)]
struct TimerEntry {
    id: TimerId,
    due: Duration,
    task: TimerTask,
}

/// Deferred one-shot callbacks on a virtual clock advanced by the host.
#[derive(Debug, Default)]
pub(crate) struct TimerQueue {
    now: Duration,
    next_id: u64,
    entries: Vec<TimerEntry>,
}

impl TimerQueue {
    pub(crate) fn schedule(&mut self, delay: Duration, task: TimerTask) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.entries.push(TimerEntry {
            id,
            due: self.now.saturating_add(delay),
            task,
        });
        id
    }

    pub(crate) fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    pub(crate) fn now(&self) -> Duration {
        self.now
    }

    pub(crate) fn pending(&self) -> usize {
        self.entries.len()
    }

    /// Moves the clock forward and returns every task that came due, in due
    /// order with ties broken by scheduling order.
    pub(crate) fn advance(&mut self, delta: Duration) -> Vec<(TimerId, TimerTask)> {
        self.now = self.now.saturating_add(delta);
        let now = self.now;
        let (mut due, pending): (Vec<TimerEntry>, Vec<TimerEntry>) =
            mem::take(&mut self.entries)
                .into_iter()
                .partition(|entry| entry.due <= now);
        self.entries = pending;
        due.sort_by_key(|entry| (entry.due, entry.id));
        due.into_iter().map(|entry| (entry.id, entry.task)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass(delay_ms: u64) -> TimerTask {
        TimerTask::RecoveryPass {
            control: ControlId(0),
            generation: 1,
            delay_ms,
        }
    }

    #[test]
    fn frame_requests_are_deduplicated_and_taken_once() {
        let mut frames = FrameQueue::default();
        frames.request(ControlId(1));
        frames.request(ControlId(1));
        frames.request(ControlId(2));

        assert_eq!(frames.len(), 2);
        assert_eq!(frames.take(), vec![ControlId(1), ControlId(2)]);
        assert!(frames.take().is_empty());
    }

    #[test]
    fn cancelled_frame_request_is_dropped() {
        let mut frames = FrameQueue::default();
        frames.request(ControlId(3));
        frames.cancel(ControlId(3));

        assert!(!frames.is_requested(ControlId(3)));
    }

    #[test]
    fn timers_fire_in_due_order() {
        let mut timers = TimerQueue::default();
        timers.schedule(Duration::from_millis(300), pass(300));
        timers.schedule(Duration::from_millis(100), pass(100));

        assert!(timers.advance(Duration::from_millis(50)).is_empty());
        let fired = timers.advance(Duration::from_millis(300));

        let delays: Vec<TimerTask> = fired.into_iter().map(|(_, task)| task).collect();
        assert_eq!(delays, vec![pass(100), pass(300)]);
        assert_eq!(timers.pending(), 0);
        assert_eq!(timers.now(), Duration::from_millis(350));
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut timers = TimerQueue::default();
        let id = timers.schedule(Duration::from_millis(10), pass(10));

        assert!(timers.cancel(id));
        assert!(!timers.cancel(id));
        assert!(timers.advance(Duration::from_secs(1)).is_empty());
    }
}
