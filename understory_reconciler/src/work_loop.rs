// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The interruptible render loop.
//!
//! A render walks the work-in-progress tree one fiber at a time: begin on the
//! way down, complete on the way back up. Everything the walk needs to resume
//! lives in a [`RenderSession`]; between slices the session is parked on the
//! reconciler, and a render for a different lane throws it away.

use alloc::rc::Rc;

use crate::context::ContextStack;
use crate::error::{ReconcileError, invariant_violation};
use crate::fiber::FiberId;
use crate::host::RenderTarget;
use crate::lane::{Lane, Lanes, NO_LANE, highest_priority};
use crate::reconciler::Reconciler;
use crate::scheduler::{CallbackHandle, Scheduler, TaskStatus};

/// State of one render attempt.
#[derive(Debug)]
pub(crate) struct RenderSession {
    /// Next fiber to visit; `None` once the root has completed.
    pub(crate) work_in_progress: Option<FiberId>,
    /// Work-in-progress root of this attempt.
    pub(crate) root_work: FiberId,
    pub(crate) render_lane: Lane,
    pub(crate) contexts: ContextStack,
}

/// How a call to [`Reconciler::render_root`] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RootExitStatus {
    /// Yielded; the session is parked for the next slice.
    Incomplete,
    /// The tree is finished and waiting to be committed.
    Completed,
}

impl<H: RenderTarget, S: Scheduler> Reconciler<H, S> {
    /// Entry point for [`Task::PerformWork`](crate::scheduler::Task::PerformWork).
    pub(crate) fn perform_concurrent_work_on_root(
        &mut self,
        handle: CallbackHandle,
        did_timeout: bool,
    ) -> Result<TaskStatus, ReconcileError> {
        let original = self.root.callback_handle;
        let flushed = self.flush_passive_effects()?;
        if flushed && self.root.callback_handle != original {
            // Effects scheduled something more urgent.
            return Ok(TaskStatus::Complete);
        }
        if self.root.callback_handle != Some(handle) {
            tracing::trace!(?handle, "stale callback");
            return Ok(TaskStatus::Complete);
        }

        let lane = highest_priority(self.root.pending_lanes);
        if lane == NO_LANE {
            return Ok(TaskStatus::Complete);
        }
        let needs_sync = lane == Lanes::SYNC || did_timeout || !self.config.time_slicing;
        let status = self.render_root(lane, !needs_sync)?;
        match status {
            RootExitStatus::Incomplete => {
                self.ensure_root_is_scheduled();
                if self.root.callback_handle == Some(handle) {
                    Ok(TaskStatus::Continue)
                } else {
                    Ok(TaskStatus::Complete)
                }
            }
            RootExitStatus::Completed => {
                self.commit_root();
                Ok(TaskStatus::Complete)
            }
        }
    }

    /// Entry point for sync-queue work.
    pub(crate) fn perform_sync_work_on_root(&mut self) -> Result<(), ReconcileError> {
        self.flush_passive_effects()?;
        let lane = highest_priority(self.root.pending_lanes);
        if lane != Lanes::SYNC {
            self.ensure_root_is_scheduled();
            return Ok(());
        }
        match self.render_root(lane, false)? {
            RootExitStatus::Completed => self.commit_root(),
            RootExitStatus::Incomplete => {
                invariant_violation("synchronous render returned incomplete");
            }
        }
        Ok(())
    }

    /// Render `lane` until the tree completes or, when `time_slice` is set,
    /// the scheduler asks to yield.
    ///
    /// A parked session for the same lane is resumed; any other session is
    /// discarded first. A component error restarts the render from a fresh
    /// stack up to `render_retries` times, after which the lane is dropped
    /// from the root and the error returned.
    pub(crate) fn render_root(
        &mut self,
        lane: Lane,
        time_slice: bool,
    ) -> Result<RootExitStatus, ReconcileError> {
        let mut retries = 0_u8;
        loop {
            let mut session = match self.session.take() {
                Some(session) if session.render_lane == lane => session,
                stale => {
                    if let Some(stale) = stale {
                        tracing::debug!(
                            abandoned = ?stale.render_lane,
                            ?lane,
                            "discarding render for a different lane"
                        );
                    }
                    self.prepare_fresh_stack(lane)
                }
            };

            let result = if time_slice {
                self.work_loop_concurrent(&mut session)
            } else {
                self.work_loop_sync(&mut session)
            };

            match result {
                Ok(()) if session.work_in_progress.is_some() => {
                    if !time_slice {
                        invariant_violation("work in progress remains after a synchronous render");
                    }
                    tracing::debug!(?lane, "render yielded");
                    self.session = Some(session);
                    return Ok(RootExitStatus::Incomplete);
                }
                Ok(()) => {
                    if session.contexts.depth() != 0 {
                        invariant_violation("context stack not empty after render");
                    }
                    self.root.finished_work = Some(session.root_work);
                    self.root.finish_lane = lane;
                    return Ok(RootExitStatus::Completed);
                }
                Err(err) if retries < self.config.render_retries => {
                    retries += 1;
                    tracing::warn!(error = %err, ?lane, retries, "render failed; retrying");
                }
                Err(err) => {
                    tracing::error!(error = %err, ?lane, "render abandoned");
                    self.root.pending_lanes.remove(lane);
                    if let Some(handle) = self.root.callback_handle.take() {
                        self.scheduler.cancel_callback(handle);
                    }
                    self.root.callback_priority = NO_LANE;
                    self.ensure_root_is_scheduled();
                    return Err(err);
                }
            }
        }
    }

    fn prepare_fresh_stack(&mut self, lane: Lane) -> RenderSession {
        tracing::debug!(?lane, "starting render");
        let current = self.root.current;
        let props = Rc::clone(&self.fibers.get(current).pending_props);
        let root_work = self.fibers.create_work_in_progress(current, props);
        self.root.finished_work = None;
        self.root.finish_lane = NO_LANE;
        self.root.interleaved_lanes = NO_LANE;
        RenderSession {
            work_in_progress: Some(root_work),
            root_work,
            render_lane: lane,
            contexts: ContextStack::default(),
        }
    }

    fn work_loop_sync(&mut self, session: &mut RenderSession) -> Result<(), ReconcileError> {
        while let Some(unit) = session.work_in_progress {
            self.perform_unit_of_work(session, unit)?;
        }
        Ok(())
    }

    fn work_loop_concurrent(&mut self, session: &mut RenderSession) -> Result<(), ReconcileError> {
        while let Some(unit) = session.work_in_progress {
            self.perform_unit_of_work(session, unit)?;
            if session.work_in_progress.is_some() && self.scheduler.should_yield() {
                break;
            }
        }
        Ok(())
    }

    fn perform_unit_of_work(
        &mut self,
        session: &mut RenderSession,
        unit: FiberId,
    ) -> Result<(), ReconcileError> {
        let next = self.begin_work(session, unit)?;
        let fiber = self.fibers.get_mut(unit);
        fiber.memoized_props = Rc::clone(&fiber.pending_props);
        match next {
            Some(child) => session.work_in_progress = Some(child),
            None => self.complete_unit_of_work(session, unit),
        }
        Ok(())
    }

    /// Complete `unit` and its ancestors until one has a sibling left to begin.
    fn complete_unit_of_work(&mut self, session: &mut RenderSession, unit: FiberId) {
        let mut node = Some(unit);
        while let Some(id) = node {
            self.complete_work(session, id);
            if id == session.root_work {
                session.work_in_progress = None;
                return;
            }
            let fiber = self.fibers.get(id);
            if let Some(sibling) = fiber.sibling {
                session.work_in_progress = Some(sibling);
                return;
            }
            node = fiber.parent;
            session.work_in_progress = node;
        }
    }
}
