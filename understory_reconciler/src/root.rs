// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-mount root state.

use alloc::vec::Vec;

use crate::element::Element;
use crate::fiber::FiberId;
use crate::hooks::EffectRef;
use crate::lane::{Lane, Lanes, NO_LANE};
use crate::scheduler::CallbackHandle;
use crate::update_queue::UpdateQueue;

/// Effects queued by commits and not yet run.
#[derive(Debug, Default)]
pub(crate) struct PendingPassiveEffects {
    /// Effects of deleted function components; only their cleanups run.
    pub(crate) unmount: Vec<EffectRef>,
    /// Effects of function components that re-rendered with changed deps.
    pub(crate) update: Vec<EffectRef>,
}

impl PendingPassiveEffects {
    pub(crate) fn is_empty(&self) -> bool {
        self.unmount.is_empty() && self.update.is_empty()
    }
}

/// The only state mutated across scheduling boundaries.
#[derive(Debug)]
pub(crate) struct RootContainer<I> {
    pub(crate) container: I,
    /// The committed root fiber.
    pub(crate) current: FiberId,
    /// Queue of root-level element updates, shared by both root buffers.
    pub(crate) update_queue: UpdateQueue<Option<Element>>,
    pub(crate) pending_lanes: Lanes,
    /// Lanes updated while a yielded render was in progress.
    pub(crate) interleaved_lanes: Lanes,
    pub(crate) callback_handle: Option<CallbackHandle>,
    pub(crate) callback_priority: Lane,
    pub(crate) finished_work: Option<FiberId>,
    pub(crate) finish_lane: Lane,
    pub(crate) pending_passive_effects: PendingPassiveEffects,
    /// Scheduled passive flush, if one is outstanding.
    pub(crate) passive_callback: Option<CallbackHandle>,
    pub(crate) unmounted: bool,
}

impl<I> RootContainer<I> {
    pub(crate) fn new(
        container: I,
        current: FiberId,
        update_queue: UpdateQueue<Option<Element>>,
    ) -> Self {
        Self {
            container,
            current,
            update_queue,
            pending_lanes: NO_LANE,
            interleaved_lanes: NO_LANE,
            callback_handle: None,
            callback_priority: NO_LANE,
            finished_work: None,
            finish_lane: NO_LANE,
            pending_passive_effects: PendingPassiveEffects::default(),
            passive_callback: None,
            unmounted: false,
        }
    }
}
