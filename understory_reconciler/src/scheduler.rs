// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The external cooperative scheduler, and a queue-backed implementation.
//!
//! The reconciler asks its [`Scheduler`] to run a [`Task`] at some
//! [`Priority`], polls [`Scheduler::should_yield`] between units of render
//! work, and cancels callbacks it no longer needs. The host drives execution:
//! it takes a scheduled task when it sees fit and hands it to
//! [`Reconciler::run_task`](crate::Reconciler::run_task).
//!
//! [`WorkQueue`] is a deterministic in-memory scheduler suitable for tests,
//! headless hosts, and hosts that already own an event loop.
//!
//! ```
//! use understory_reconciler::lane::Priority;
//! use understory_reconciler::scheduler::{Scheduler, Task, WorkQueue};
//!
//! let mut queue = WorkQueue::new();
//! let low = queue.schedule_callback(Priority::Low, Task::PerformWork);
//! let urgent = queue.schedule_callback(Priority::Immediate, Task::FlushPassiveEffects);
//! queue.cancel_callback(low);
//!
//! let next = queue.pop().unwrap();
//! assert_eq!(next.handle, urgent);
//! assert!(queue.pop().is_none());
//! ```

use alloc::collections::BTreeMap;

use crate::lane::Priority;

/// Token identifying a scheduled callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallbackHandle(u64);

impl CallbackHandle {
    /// Wrap a scheduler-specific identifier.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The wrapped identifier.
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Work the reconciler asks the scheduler to run later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Task {
    /// Render (and possibly commit) the root's most urgent pending lane.
    PerformWork,
    /// Run the passive effects queued by the last commit.
    FlushPassiveEffects,
}

/// Outcome of running a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    /// Nothing further for this callback.
    Complete,
    /// The render yielded; run the same callback again later.
    Continue,
}

/// An external cooperative scheduler.
pub trait Scheduler {
    /// Arrange for `task` to be handed back at `priority`.
    fn schedule_callback(&mut self, priority: Priority, task: Task) -> CallbackHandle;

    /// Forget a callback. Cancelling an unknown or already-run handle is a no-op.
    fn cancel_callback(&mut self, handle: CallbackHandle);

    /// Whether the current slice is used up and render work should yield.
    fn should_yield(&mut self) -> bool;
}

/// A task taken from a [`WorkQueue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledTask {
    /// Handle the task was scheduled under.
    pub handle: CallbackHandle,
    /// Priority the task was scheduled at.
    pub priority: Priority,
    /// What to run.
    pub task: Task,
}

/// Priority-ordered run queue with an optional per-slice work budget.
///
/// Tasks run most urgent first, and in scheduling order within a priority.
/// With a slice budget of `n`, [`should_yield`](Scheduler::should_yield)
/// reports `true` on its `n`-th poll after each [`pop`](Self::pop).
#[derive(Clone, Debug, Default)]
pub struct WorkQueue {
    tasks: BTreeMap<(Priority, u64), ScheduledTask>,
    next_id: u64,
    slice: Option<u32>,
    used: u32,
    yields: u32,
}

impl WorkQueue {
    /// A queue that never asks render work to yield.
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue that yields after `units` units of work per slice.
    ///
    /// # Panics
    ///
    /// Panics if `units` is zero.
    pub fn with_slice(units: u32) -> Self {
        assert!(units > 0, "a slice must allow at least one unit of work");
        Self {
            slice: Some(units),
            ..Self::default()
        }
    }

    /// Take the most urgent task and start a fresh slice.
    pub fn pop(&mut self) -> Option<ScheduledTask> {
        let (_, task) = self.tasks.pop_first()?;
        self.used = 0;
        Some(task)
    }

    /// Put a task back under its original handle, keeping its place in line.
    pub fn requeue(&mut self, task: ScheduledTask) {
        self.tasks.insert((task.priority, task.handle.0), task);
    }

    /// Priority of the next task, if any.
    pub fn peek_priority(&self) -> Option<Priority> {
        self.tasks.first_key_value().map(|(&(priority, _), _)| priority)
    }

    /// Whether `handle` is still queued.
    pub fn contains(&self, handle: CallbackHandle) -> bool {
        self.tasks.values().any(|task| task.handle == handle)
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of times render work was told to yield.
    pub fn yield_count(&self) -> u32 {
        self.yields
    }
}

impl Scheduler for WorkQueue {
    fn schedule_callback(&mut self, priority: Priority, task: Task) -> CallbackHandle {
        let handle = CallbackHandle(self.next_id);
        self.next_id += 1;
        self.tasks.insert(
            (priority, handle.0),
            ScheduledTask {
                handle,
                priority,
                task,
            },
        );
        handle
    }

    fn cancel_callback(&mut self, handle: CallbackHandle) {
        self.tasks.retain(|_, task| task.handle != handle);
    }

    fn should_yield(&mut self) -> bool {
        let Some(budget) = self.slice else {
            return false;
        };
        self.used = self.used.saturating_add(1);
        let exhausted = self.used >= budget;
        if exhausted {
            self.yields += 1;
        }
        exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_within_priority() {
        let mut q = WorkQueue::new();
        let a = q.schedule_callback(Priority::Normal, Task::PerformWork);
        let b = q.schedule_callback(Priority::Normal, Task::FlushPassiveEffects);
        let c = q.schedule_callback(Priority::UserBlocking, Task::PerformWork);
        assert_eq!(q.peek_priority(), Some(Priority::UserBlocking));
        let order: [CallbackHandle; 3] = core::array::from_fn(|_| q.pop().unwrap().handle);
        assert_eq!(order, [c, a, b]);
        assert!(q.is_empty());
    }

    #[test]
    fn requeue_keeps_handle_and_position() {
        let mut q = WorkQueue::new();
        let a = q.schedule_callback(Priority::Normal, Task::PerformWork);
        let b = q.schedule_callback(Priority::Normal, Task::PerformWork);
        let first = q.pop().unwrap();
        assert_eq!(first.handle, a);
        q.requeue(first);
        assert!(q.contains(a));
        assert_eq!(q.pop().unwrap().handle, a, "continuations keep their place");
        assert_eq!(q.pop().unwrap().handle, b);
    }

    #[test]
    fn cancel_removes_only_that_handle() {
        let mut q = WorkQueue::new();
        let a = q.schedule_callback(Priority::Low, Task::PerformWork);
        let b = q.schedule_callback(Priority::Low, Task::PerformWork);
        q.cancel_callback(a);
        q.cancel_callback(a);
        assert!(!q.contains(a));
        assert!(q.contains(b));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn slice_budget_resets_on_pop() {
        let mut q = WorkQueue::with_slice(2);
        assert!(!q.should_yield());
        assert!(q.should_yield());
        q.schedule_callback(Priority::Normal, Task::PerformWork);
        let _ = q.pop();
        assert!(!q.should_yield());
        assert!(q.should_yield());
        assert_eq!(q.yield_count(), 2);

        let mut unbounded = WorkQueue::new();
        assert!((0..100).all(|_| !unbounded.should_yield()));
    }
}
