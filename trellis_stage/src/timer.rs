// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-node one-shot timers.

use alloc::boxed::Box;
use smallvec::SmallVec;

use crate::stage::Stage;

/// Callback run when a timer comes due.
pub(crate) type TimerFn = Box<dyn FnOnce(&mut Stage)>;

struct Timer {
    /// Stage time at which the timer is due.
    run_at: f64,
    /// Stage time at which the timer was paused, if it is.
    paused_at: Option<f64>,
    canceled: bool,
    /// Taken when the timer comes due; `None` marks it spent.
    func: Option<TimerFn>,
}

/// The one-shot timers of a single node.
///
/// Newly scheduled timers sit in `pending` until the next drain, so a
/// callback scheduling a follow-up never sees it run in the same drain.
/// Cancellation and pausing only mark; spent and canceled timers are
/// dropped by the drain that observes them.
#[derive(Default)]
pub(crate) struct TimerQueue {
    pending: SmallVec<[Timer; 2]>,
    active: SmallVec<[Timer; 2]>,
    /// Whether new timers start out paused.
    paused: bool,
}

impl TimerQueue {
    /// Schedules `f` to run once `delay` seconds after `now`.
    ///
    /// A non-positive delay comes due at the next drain. On a paused
    /// queue the timer starts out paused and keeps its full delay.
    pub(crate) fn schedule(&mut self, now: f64, delay: f64, f: TimerFn) {
        self.pending.push(Timer {
            run_at: now + delay,
            paused_at: self.paused.then_some(now),
            canceled: false,
            func: Some(f),
        });
    }

    /// Marks every timer canceled. They are dropped at the next drain.
    pub(crate) fn cancel_all(&mut self) {
        for timer in self.pending.iter_mut().chain(self.active.iter_mut()) {
            timer.canceled = true;
        }
    }

    /// Pauses or resumes every timer, preserving remaining delays.
    ///
    /// Pausing an already paused timer keeps its original pause stamp.
    pub(crate) fn set_paused(&mut self, now: f64, paused: bool) {
        self.paused = paused;
        for timer in self.pending.iter_mut().chain(self.active.iter_mut()) {
            if paused {
                if timer.paused_at.is_none() {
                    timer.paused_at = Some(now);
                }
            } else if let Some(since) = timer.paused_at.take() {
                timer.run_at += now - since;
            }
        }
    }

    /// Promotes pending timers and takes the callbacks due at `now`.
    ///
    /// The callbacks are returned rather than run so the caller can
    /// hand each one exclusive stage access.
    pub(crate) fn take_due(&mut self, now: f64) -> SmallVec<[TimerFn; 2]> {
        self.active.append(&mut self.pending);
        let mut due = SmallVec::new();
        for timer in &mut self.active {
            if !timer.canceled
                && timer.paused_at.is_none()
                && timer.run_at <= now
                && let Some(f) = timer.func.take()
            {
                due.push(f);
            }
        }
        self.active.retain(|t| !t.canceled && t.func.is_some());
        due
    }
}

impl core::fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TimerQueue")
            .field("pending", &self.pending.len())
            .field("active", &self.active.len())
            .field("paused", &self.paused)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;
    use alloc::rc::Rc;
    use core::cell::Cell;

    use super::TimerQueue;
    use crate::stage::Stage;

    fn counting(hits: &Rc<Cell<u32>>) -> super::TimerFn {
        let hits = hits.clone();
        Box::new(move |_| hits.set(hits.get() + 1))
    }

    fn run_due(queue: &mut TimerQueue, stage: &mut Stage, now: f64) {
        for f in queue.take_due(now) {
            f(stage);
        }
    }

    #[test]
    fn fires_at_or_after_the_deadline() {
        let mut stage = Stage::new();
        let mut queue = TimerQueue::default();
        let hits = Rc::new(Cell::new(0));

        queue.schedule(0.0, 1.0, counting(&hits));
        run_due(&mut queue, &mut stage, 0.999);
        assert_eq!(hits.get(), 0);
        run_due(&mut queue, &mut stage, 1.0);
        assert_eq!(hits.get(), 1);
        // One-shot: a later drain must not fire it again.
        run_due(&mut queue, &mut stage, 2.0);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn cancel_marks_and_the_next_drain_drops() {
        let mut stage = Stage::new();
        let mut queue = TimerQueue::default();
        let hits = Rc::new(Cell::new(0));

        queue.schedule(0.0, 1.0, counting(&hits));
        queue.cancel_all();
        run_due(&mut queue, &mut stage, 5.0);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn pause_preserves_the_remaining_delay() {
        let mut stage = Stage::new();
        let mut queue = TimerQueue::default();
        let hits = Rc::new(Cell::new(0));

        queue.schedule(0.0, 1.0, counting(&hits));
        queue.set_paused(0.25, true);
        run_due(&mut queue, &mut stage, 1.5);
        assert_eq!(hits.get(), 0, "paused timers must not fire");

        // 0.75 seconds were left; resuming at 0.75 pushes the deadline
        // out to 1.5.
        queue.set_paused(0.75, false);
        run_due(&mut queue, &mut stage, 1.4);
        assert_eq!(hits.get(), 0);
        run_due(&mut queue, &mut stage, 1.5);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn scheduling_on_a_paused_queue_starts_paused() {
        let mut stage = Stage::new();
        let mut queue = TimerQueue::default();
        let hits = Rc::new(Cell::new(0));

        queue.set_paused(0.0, true);
        queue.schedule(0.5, 1.0, counting(&hits));
        run_due(&mut queue, &mut stage, 10.0);
        assert_eq!(hits.get(), 0);

        // Paused from 0.5 to 2.0, so the full delay remains: due at 3.0.
        queue.set_paused(2.0, false);
        run_due(&mut queue, &mut stage, 2.9);
        assert_eq!(hits.get(), 0);
        run_due(&mut queue, &mut stage, 3.0);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn negative_delay_comes_due_immediately() {
        let mut stage = Stage::new();
        let mut queue = TimerQueue::default();
        let hits = Rc::new(Cell::new(0));

        queue.schedule(1.0, -0.5, counting(&hits));
        run_due(&mut queue, &mut stage, 1.0);
        assert_eq!(hits.get(), 1);
    }
}
