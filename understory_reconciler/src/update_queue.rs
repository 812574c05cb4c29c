// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Update queues and the skip-and-rebase fold.
//!
//! Every stateful position (the root's element, each `use_state` hook) owns a
//! [`StateCell`]. New updates land in the cell's shared [`UpdateQueue`], which
//! both buffers of a fiber (and every setter) point at. A render moves the
//! pending updates onto the committed cell's base queue, then folds the base
//! queue with [`process_update_queue`], skipping updates whose lane is not
//! being rendered.
//!
//! ```
//! use understory_reconciler::lane::Lanes;
//! use understory_reconciler::update_queue::{Update, UpdateRing, process_update_queue};
//!
//! let mut ring = UpdateRing::new();
//! ring.push(Update::reduce(|n: &i32| n + 1, Lanes::TRANSITION));
//! ring.push(Update::reduce(|n: &i32| n * 10, Lanes::SYNC));
//!
//! // Render only the sync lane: the transition update is skipped.
//! let first = process_update_queue(1, &ring, Lanes::SYNC);
//! assert_eq!(first.memoized_state, 10);
//! assert_eq!(first.base_state, 1);
//! assert_eq!(first.base_queue.len(), 2);
//!
//! // Rendering the transition lane replays both, in order.
//! let second = process_update_queue(first.base_state, &first.base_queue, Lanes::TRANSITION);
//! assert_eq!(second.memoized_state, 20);
//! assert!(second.base_queue.is_empty());
//! ```

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use core::cell::RefCell;
use core::fmt;

use crate::lane::{Lane, Lanes, NO_LANE, is_subset_of_lanes};

/// How an update produces the next state.
pub enum Action<S> {
    /// Replace the state outright.
    Replace(S),
    /// Compute the next state from the previous one.
    Reduce(Rc<dyn Fn(&S) -> S>),
}

impl<S: Clone> Action<S> {
    /// Apply this action on top of `prev`.
    #[must_use]
    pub fn apply(&self, prev: &S) -> S {
        match self {
            Self::Replace(next) => next.clone(),
            Self::Reduce(f) => f(prev),
        }
    }
}

impl<S: Clone> Clone for Action<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Replace(next) => Self::Replace(next.clone()),
            Self::Reduce(f) => Self::Reduce(Rc::clone(f)),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for Action<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace(next) => f.debug_tuple("Replace").field(next).finish(),
            Self::Reduce(_) => f.write_str("Reduce(..)"),
        }
    }
}

/// An immutable change record.
#[derive(Clone, Debug)]
pub struct Update<S> {
    /// What to do to the state.
    pub action: Action<S>,
    /// Priority the update was requested at.
    pub lane: Lane,
}

impl<S> Update<S> {
    /// An update that replaces the state with `value`.
    pub fn replace(value: S, lane: Lane) -> Self {
        Self {
            action: Action::Replace(value),
            lane,
        }
    }

    /// An update that derives the next state from the previous one.
    pub fn reduce(f: impl Fn(&S) -> S + 'static, lane: Lane) -> Self {
        Self {
            action: Action::Reduce(Rc::new(f)),
            lane,
        }
    }
}

/// An ordered ring of updates with O(1) append.
///
/// The head is the most recently appended update; traversal starts from the
/// oldest and ends at the head.
#[derive(Clone, Debug)]
pub struct UpdateRing<S> {
    updates: VecDeque<Update<S>>,
}

impl<S> Default for UpdateRing<S> {
    fn default() -> Self {
        Self {
            updates: VecDeque::new(),
        }
    }
}

impl<S> UpdateRing<S> {
    /// An empty ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `update` after the current head.
    pub fn push(&mut self, update: Update<S>) {
        self.updates.push_back(update);
    }

    /// Move every update of `other` after the current head, preserving order.
    pub fn append(&mut self, other: &mut Self) {
        self.updates.append(&mut other.updates);
    }

    /// The most recently appended update.
    pub fn head(&self) -> Option<&Update<S>> {
        self.updates.back()
    }

    /// Iterate from the oldest update to the head.
    pub fn iter(&self) -> impl Iterator<Item = &Update<S>> {
        self.updates.iter()
    }

    /// Number of queued updates.
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// Whether the ring holds no updates.
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Union of the lanes of every queued update.
    pub fn lanes(&self) -> Lanes {
        self.updates
            .iter()
            .fold(NO_LANE, |lanes, update| lanes | update.lane)
    }
}

/// The shared, not-yet-rendered half of a state cell.
///
/// Cloning yields another handle to the same queue.
pub struct UpdateQueue<S> {
    pending: Rc<RefCell<UpdateRing<S>>>,
}

impl<S> Clone for UpdateQueue<S> {
    fn clone(&self) -> Self {
        Self {
            pending: Rc::clone(&self.pending),
        }
    }
}

impl<S> Default for UpdateQueue<S> {
    fn default() -> Self {
        Self {
            pending: Rc::new(RefCell::new(UpdateRing::new())),
        }
    }
}

impl<S> fmt::Debug for UpdateQueue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateQueue")
            .field("pending", &self.pending.borrow().len())
            .finish()
    }
}

impl<S> UpdateQueue<S> {
    /// A new, empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an update. O(1).
    pub fn enqueue(&self, update: Update<S>) {
        self.pending.borrow_mut().push(update);
    }

    /// Detach and return every pending update.
    pub fn take_pending(&self) -> UpdateRing<S> {
        core::mem::take(&mut *self.pending.borrow_mut())
    }

    /// Whether any update is waiting to be rendered.
    pub fn has_pending(&self) -> bool {
        !self.pending.borrow().is_empty()
    }

    /// Whether both handles point at the same queue.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.pending, &other.pending)
    }
}

/// Result of folding a queue under a set of render lanes.
#[derive(Debug)]
pub struct Processed<S> {
    /// State to render with.
    pub memoized_state: S,
    /// Restart point for the residual queue.
    pub base_state: S,
    /// Updates to replay on a later render, starting with the first skipped one.
    pub base_queue: UpdateRing<S>,
    /// Lanes of the updates that were skipped.
    pub skipped_lanes: Lanes,
}

/// Fold `queue` over `base_state`, applying only updates whose lane is in `render_lanes`.
///
/// The first skipped update opens a residual queue and freezes the base state
/// at the value just before it. Every later update, applied or not, is copied
/// into the residual queue; applied ones are copied with [`NO_LANE`] so that a
/// later replay reapplies them regardless of which lanes it renders.
pub fn process_update_queue<S: Clone>(
    base_state: S,
    queue: &UpdateRing<S>,
    render_lanes: Lanes,
) -> Processed<S> {
    let mut state = base_state;
    let mut new_base_state: Option<S> = None;
    let mut residual = UpdateRing::new();
    let mut skipped_lanes = NO_LANE;

    for update in queue.iter() {
        if !is_subset_of_lanes(render_lanes, update.lane) {
            if residual.is_empty() {
                new_base_state = Some(state.clone());
            }
            skipped_lanes |= update.lane;
            residual.push(update.clone());
            continue;
        }
        if !residual.is_empty() {
            residual.push(Update {
                action: update.action.clone(),
                lane: NO_LANE,
            });
        }
        state = update.action.apply(&state);
    }

    let base_state = new_base_state.unwrap_or_else(|| state.clone());
    Processed {
        memoized_state: state,
        base_state,
        base_queue: residual,
        skipped_lanes,
    }
}

/// One stateful position: committed state, rebase point, and queues.
#[derive(Clone, Debug)]
pub struct StateCell<S> {
    /// State produced by the last render of this cell.
    pub memoized_state: S,
    /// State the base queue replays from.
    pub base_state: S,
    /// Skipped updates (and their followers) awaiting a later render.
    pub base_queue: UpdateRing<S>,
    /// Shared pending queue; setters append here.
    pub queue: UpdateQueue<S>,
}

impl<S: Clone> StateCell<S> {
    /// A cell holding `initial` with empty queues.
    pub fn new(initial: S) -> Self {
        Self {
            memoized_state: initial.clone(),
            base_state: initial,
            base_queue: UpdateRing::new(),
            queue: UpdateQueue::new(),
        }
    }

    /// Produce the work-in-progress successor of this committed cell.
    ///
    /// Pending updates are first moved onto `self.base_queue`, so a render
    /// that is later abandoned loses nothing: the next attempt starts from
    /// the same committed cell.
    pub fn rebase(&mut self, render_lanes: Lanes) -> (Self, Lanes) {
        let mut pending = self.queue.take_pending();
        self.base_queue.append(&mut pending);
        let processed =
            process_update_queue(self.base_state.clone(), &self.base_queue, render_lanes);
        (
            Self {
                memoized_state: processed.memoized_state,
                base_state: processed.base_state,
                base_queue: processed.base_queue,
                queue: self.queue.clone(),
            },
            processed.skipped_lanes,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use proptest::prelude::*;

    fn add(n: i64, lane: Lane) -> Update<i64> {
        Update::reduce(move |s: &i64| s + n, lane)
    }

    #[test]
    fn ring_head_is_most_recent() {
        let mut ring = UpdateRing::new();
        ring.push(Update::replace(1, Lanes::DEFAULT));
        ring.push(Update::replace(2, Lanes::SYNC));
        assert!(matches!(ring.head().map(|u| &u.action), Some(Action::Replace(2))));
        assert_eq!(ring.lanes(), Lanes::DEFAULT | Lanes::SYNC);
        let order: Vec<_> = ring
            .iter()
            .map(|u| match u.action {
                Action::Replace(v) => v,
                Action::Reduce(_) => -1,
            })
            .collect();
        assert_eq!(order, [1, 2]);
    }

    #[test]
    fn queue_handles_share_pending() {
        let queue = UpdateQueue::new();
        let other = queue.clone();
        other.enqueue(add(1, Lanes::DEFAULT));
        assert!(queue.has_pending());
        assert!(queue.ptr_eq(&other));
        assert_eq!(queue.take_pending().len(), 1);
        assert!(!other.has_pending());
    }

    #[test]
    fn all_satisfied_closes_residual() {
        let mut ring = UpdateRing::new();
        ring.push(add(2, Lanes::DEFAULT));
        ring.push(Update::replace(7, Lanes::SYNC));
        ring.push(add(1, Lanes::DEFAULT));
        let out = process_update_queue(0, &ring, Lanes::DEFAULT | Lanes::SYNC);
        assert_eq!(out.memoized_state, 8);
        assert_eq!(out.base_state, 8);
        assert!(out.base_queue.is_empty());
        assert_eq!(out.skipped_lanes, NO_LANE);
    }

    #[test]
    fn applied_after_skip_are_mirrored_without_lane() {
        let mut ring = UpdateRing::new();
        ring.push(add(1, Lanes::SYNC));
        ring.push(add(10, Lanes::TRANSITION));
        ring.push(add(100, Lanes::SYNC));
        let out = process_update_queue(0, &ring, Lanes::SYNC);
        assert_eq!(out.memoized_state, 101);
        assert_eq!(out.base_state, 1, "base freezes before the first skip");
        let lanes: Vec<_> = out.base_queue.iter().map(|u| u.lane).collect();
        assert_eq!(lanes, [Lanes::TRANSITION, NO_LANE]);
        assert_eq!(out.skipped_lanes, Lanes::TRANSITION);
    }

    #[test]
    fn rebase_keeps_pending_on_the_committed_cell() {
        let mut committed = StateCell::new(0_i64);
        committed.queue.enqueue(add(5, Lanes::TRANSITION));
        committed.queue.enqueue(add(1, Lanes::SYNC));

        let (wip, skipped) = committed.rebase(Lanes::SYNC);
        assert_eq!(wip.memoized_state, 1);
        assert_eq!(skipped, Lanes::TRANSITION);
        // Abandon `wip`: the committed cell still holds both updates.
        assert_eq!(committed.base_queue.len(), 2);
        assert!(!committed.queue.has_pending());

        let (retry, _) = committed.rebase(Lanes::SYNC | Lanes::TRANSITION);
        assert_eq!(retry.memoized_state, 6);
        assert!(retry.base_queue.is_empty());
    }

    fn lane_strategy() -> impl Strategy<Value = Lane> {
        prop_oneof![
            Just(Lanes::SYNC),
            Just(Lanes::INPUT_CONTINUOUS),
            Just(Lanes::DEFAULT),
            Just(Lanes::TRANSITION),
            Just(Lanes::IDLE),
        ]
    }

    proptest! {
        #[test]
        fn same_lane_fold_matches_left_fold(
            base in -1000_i64..1000,
            ops in proptest::collection::vec((0_u8..3, -50_i64..50), 0..24),
            lane in lane_strategy(),
        ) {
            let mut ring = UpdateRing::new();
            let mut expected = base;
            for (kind, n) in &ops {
                let n = *n;
                match kind {
                    0 => {
                        ring.push(Update::replace(n, lane));
                        expected = n;
                    }
                    1 => {
                        ring.push(add(n, lane));
                        expected += n;
                    }
                    _ => {
                        ring.push(Update::reduce(move |s: &i64| s.wrapping_mul(2) - n, lane));
                        expected = expected.wrapping_mul(2) - n;
                    }
                }
            }
            let out = process_update_queue(base, &ring, lane);
            prop_assert_eq!(out.memoized_state, expected);
            prop_assert_eq!(out.base_state, expected);
            prop_assert!(out.base_queue.is_empty());
        }

        #[test]
        fn skipped_updates_are_never_lost_or_duplicated(
            base in -100_i64..100,
            ops in proptest::collection::vec((lane_strategy(), 1_i64..20), 1..16),
            first in lane_strategy(),
        ) {
            // Appending distinct powers keeps the history observable: the final
            // state records exactly which updates ran, and in what order.
            let mut cell = StateCell::new(alloc::vec![base]);
            for (lane, n) in &ops {
                let n = *n;
                cell.queue.enqueue(Update::reduce(
                    move |s: &Vec<i64>| {
                        let mut next = s.clone();
                        next.push(n);
                        next
                    },
                    *lane,
                ));
            }

            let (wip, _) = cell.rebase(first);
            cell = wip;
            let (done, skipped) = cell.rebase(Lanes::all());
            prop_assert_eq!(skipped, NO_LANE);

            let mut expected = alloc::vec![base];
            expected.extend(ops.iter().map(|(_, n)| *n));
            prop_assert_eq!(done.memoized_state, expected);
            prop_assert!(done.base_queue.is_empty());
        }
    }
}
