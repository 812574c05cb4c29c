// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-root driver: entry points, lane bookkeeping, and scheduling.

use alloc::rc::Rc;

use crate::config::ReconcilerConfig;
use crate::element::Element;
use crate::error::ReconcileError;
use crate::fiber::{FiberArena, FiberKind, FiberState};
use crate::hooks::UpdateContext;
use crate::host::RenderTarget;
use crate::lane::{Lane, Lanes, NO_LANE, Priority, highest_priority, lanes_to_priority};
use crate::root::RootContainer;
use crate::scheduler::{CallbackHandle, Scheduler, Task, TaskStatus, WorkQueue};
use crate::sync_queue::SyncQueue;
use crate::update_queue::{StateCell, Update};
use crate::work_loop::RenderSession;

/// Work pushed onto the sync queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SyncTask {
    PerformSyncWorkOnRoot,
}

/// One mounted tree: its fibers, its root state, and the collaborators that
/// render it.
///
/// The reconciler never calls back into the host on its own. Work happens
/// only inside the entry points: [`render`](Self::render) and the lane
/// context helpers enqueue, while [`run_task`](Self::run_task),
/// [`flush_sync_work`](Self::flush_sync_work), and
/// [`flush_passive_effects`](Self::flush_passive_effects) render and commit.
///
/// ```
/// use understory_reconciler::{Element, Reconciler, ReconcilerConfig, RenderTarget};
/// use understory_reconciler::element::Props;
/// use understory_reconciler::scheduler::WorkQueue;
///
/// #[derive(Default)]
/// struct Log(Vec<String>);
///
/// impl RenderTarget for Log {
///     type Instance = String;
///     fn create_instance(&mut self, tag: &str, _: &Props) -> String { tag.into() }
///     fn create_text_instance(&mut self, text: &str) -> String { text.into() }
///     fn append_initial_child(&mut self, p: &String, c: &String) {
///         self.0.push(format!("{p} <- {c}"));
///     }
///     fn append_child_to_container(&mut self, c: &String, p: &String) {
///         self.0.push(format!("{p} <- {c}"));
///     }
///     fn insert_child_to_container(&mut self, c: &String, p: &String, _: &String) {
///         self.0.push(format!("{p} <- {c}"));
///     }
///     fn remove_child(&mut self, c: &String, p: &String) {
///         self.0.push(format!("{p} -x {c}"));
///     }
///     fn commit_update(&mut self, _: &String, _: &Props) {}
///     fn commit_text_update(&mut self, _: &String, _: &str) {}
///     fn schedule_microtask(&mut self) {}
/// }
///
/// let mut root = Reconciler::create_root(
///     Log::default(),
///     WorkQueue::new(),
///     "body".to_string(),
///     ReconcilerConfig::default(),
/// );
/// root.render(Some(Element::host("p").with_child(Element::text("hi")))).unwrap();
/// root.act().unwrap();
/// assert_eq!(root.host().0, ["p <- hi", "body <- p"]);
/// ```
pub struct Reconciler<H: RenderTarget, S: Scheduler> {
    pub(crate) host: H,
    pub(crate) scheduler: S,
    pub(crate) config: ReconcilerConfig,
    pub(crate) fibers: FiberArena<H::Instance>,
    pub(crate) root: RootContainer<H::Instance>,
    /// A yielded render, resumed by the next call that renders the same lane.
    pub(crate) session: Option<RenderSession>,
    pub(crate) sync_queue: SyncQueue<SyncTask>,
    pub(crate) updates: Rc<UpdateContext>,
}

impl<H, S> core::fmt::Debug for Reconciler<H, S>
where
    H: RenderTarget + core::fmt::Debug,
    S: Scheduler + core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Reconciler")
            .field("host", &self.host)
            .field("scheduler", &self.scheduler)
            .field("config", &self.config)
            .field("live_fibers", &self.fibers.live_count())
            .field("root", &self.root)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl<H: RenderTarget, S: Scheduler> Reconciler<H, S> {
    /// Mount an empty root rendering into `container`.
    pub fn create_root(
        host: H,
        scheduler: S,
        container: H::Instance,
        config: ReconcilerConfig,
    ) -> Self {
        let mut fibers = FiberArena::default();
        let current = fibers.alloc(FiberKind::HostRoot, None, Rc::default());
        let cell = StateCell::new(None);
        let update_queue = cell.queue.clone();
        let fiber = fibers.get_mut(current);
        fiber.state = FiberState::Root(cell);
        fiber.state_node = Some(container.clone());
        tracing::debug!(?container, "root created");
        Self {
            host,
            scheduler,
            config,
            fibers,
            root: RootContainer::new(container, current, update_queue),
            session: None,
            sync_queue: SyncQueue::default(),
            updates: Rc::new(UpdateContext::default()),
        }
    }

    /// Request that the tree become `element` (or empty, for `None`).
    ///
    /// The update gets its lane from the ambient context: see
    /// [`run_with_priority`](Self::run_with_priority) and
    /// [`start_transition`](Self::start_transition). Nothing renders until
    /// the scheduled work runs.
    pub fn render(&mut self, element: Option<Element>) -> Result<(), ReconcileError> {
        if self.root.unmounted {
            tracing::warn!("render called on an unmounted root");
            return Err(ReconcileError::RootUnmounted);
        }
        self.schedule_pending_updates();
        let lane = self.updates.request_update_lane();
        self.update_container(element, lane);
        Ok(())
    }

    /// Run `f` with `priority` as the ambient priority for update requests.
    pub fn run_with_priority<R>(
        &mut self,
        priority: Priority,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        self.schedule_pending_updates();
        let previous = self.updates.replace_priority(priority);
        let result = f(self);
        self.updates.replace_priority(previous);
        self.schedule_pending_updates();
        result
    }

    /// Run `f` with every update it requests assigned the transition lane.
    pub fn start_transition<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.schedule_pending_updates();
        self.updates.enter_transition();
        let result = f(self);
        self.updates.exit_transition();
        self.schedule_pending_updates();
        result
    }

    /// Fold updates dispatched by state setters into the root and make sure
    /// work is scheduled for them.
    ///
    /// Every entry point calls this; hosts only need it after dispatching
    /// from outside any reconciler call when they want the schedule to
    /// reflect the update immediately.
    pub fn schedule_pending_updates(&mut self) {
        let lanes = self.updates.take_pending();
        if lanes.is_empty() {
            return;
        }
        self.mark_root_updated(lanes);
        self.ensure_root_is_scheduled();
    }

    /// Run a task previously handed to the [`Scheduler`].
    ///
    /// `did_timeout` forces a non-yielding render, for hosts whose scheduler
    /// has starved the task.
    pub fn run_task(
        &mut self,
        handle: CallbackHandle,
        task: Task,
        did_timeout: bool,
    ) -> Result<TaskStatus, ReconcileError> {
        if self.root.unmounted {
            return Ok(TaskStatus::Complete);
        }
        self.schedule_pending_updates();
        match task {
            Task::PerformWork => self.perform_concurrent_work_on_root(handle, did_timeout),
            Task::FlushPassiveEffects => {
                if self.root.passive_callback == Some(handle) {
                    self.root.passive_callback = None;
                }
                self.flush_passive_effects()?;
                Ok(TaskStatus::Complete)
            }
        }
    }

    /// Drain the sync queue. Call from the microtask requested through
    /// [`RenderTarget::schedule_microtask`].
    ///
    /// Re-entrant calls return immediately. Every queued task runs even if
    /// one fails; the first error is returned.
    pub fn flush_sync_work(&mut self) -> Result<(), ReconcileError> {
        self.schedule_pending_updates();
        if !self.sync_queue.begin_flush() {
            return Ok(());
        }
        let mut first_error = None;
        while let Some(task) = self.sync_queue.pop() {
            let result = match task {
                SyncTask::PerformSyncWorkOnRoot => self.perform_sync_work_on_root(),
            };
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }
        self.sync_queue.end_flush();
        first_error.map_or(Ok(()), Err)
    }

    /// Tear the tree down: remove every host node from the container, run
    /// every effect cleanup, and refuse further renders.
    pub fn unmount(&mut self) -> Result<(), ReconcileError> {
        if self.root.unmounted {
            return Ok(());
        }
        self.schedule_pending_updates();
        self.update_container(None, Lanes::SYNC);
        self.flush_sync_work()?;
        self.flush_passive_effects()?;
        if let Some(handle) = self.root.callback_handle.take() {
            self.scheduler.cancel_callback(handle);
        }
        self.root.callback_priority = NO_LANE;
        self.root.pending_lanes = NO_LANE;
        self.session = None;
        self.root.unmounted = true;
        tracing::debug!("root unmounted");
        Ok(())
    }

    /// The render target.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The render target, mutably.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The scheduler.
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// The scheduler, mutably.
    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Options this root was created with.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// The container the tree renders into.
    pub fn container(&self) -> &H::Instance {
        &self.root.container
    }

    /// Lanes with outstanding work, including setter updates not yet folded in.
    pub fn pending_lanes(&self) -> Lanes {
        self.root.pending_lanes | self.updates.peek_pending()
    }

    /// Whether [`unmount`](Self::unmount) has run.
    pub fn is_unmounted(&self) -> bool {
        self.root.unmounted
    }

    fn update_container(&mut self, element: Option<Element>, lane: Lane) {
        self.root.update_queue.enqueue(Update::replace(element, lane));
        tracing::debug!(?lane, "root update enqueued");
        self.mark_root_updated(lane);
        self.ensure_root_is_scheduled();
    }

    pub(crate) fn mark_root_updated(&mut self, lanes: Lanes) {
        self.root.pending_lanes |= lanes;
        if self.session.is_some() {
            self.root.interleaved_lanes |= lanes;
        }
    }

    /// Make sure exactly one driver invocation is scheduled for the most
    /// urgent pending lane.
    pub(crate) fn ensure_root_is_scheduled(&mut self) {
        let lane = highest_priority(self.root.pending_lanes);
        if lane == NO_LANE {
            if let Some(handle) = self.root.callback_handle.take() {
                self.scheduler.cancel_callback(handle);
            }
            self.root.callback_priority = NO_LANE;
            return;
        }
        let previous = self.root.callback_priority;
        if lane == previous {
            return;
        }
        let cancelled = self.root.callback_handle.take();
        if let Some(handle) = cancelled {
            self.scheduler.cancel_callback(handle);
        }
        tracing::debug!(?lane, ?previous, ?cancelled, "scheduling root");
        if lane == Lanes::SYNC {
            let was_idle = self.sync_queue.is_empty();
            self.sync_queue.push(SyncTask::PerformSyncWorkOnRoot);
            if was_idle {
                self.host.schedule_microtask();
            }
        } else {
            let handle = self
                .scheduler
                .schedule_callback(lanes_to_priority(lane), Task::PerformWork);
            self.root.callback_handle = Some(handle);
        }
        self.root.callback_priority = lane;
    }
}

impl<H: RenderTarget> Reconciler<H, WorkQueue> {
    /// Pop and run the most urgent queued task. Returns `false` if the queue was empty.
    ///
    /// A task that yields is put back under its original handle.
    pub fn run_next_task(&mut self) -> Result<bool, ReconcileError> {
        self.schedule_pending_updates();
        let Some(task) = self.scheduler.pop() else {
            return Ok(false);
        };
        if self.run_task(task.handle, task.task, false)? == TaskStatus::Continue {
            self.scheduler.requeue(task);
        }
        Ok(true)
    }

    /// Run sync work and queued tasks until nothing is left.
    pub fn act(&mut self) -> Result<(), ReconcileError> {
        loop {
            self.flush_sync_work()?;
            if !self.run_next_task()? && self.sync_queue.is_empty() {
                return Ok(());
            }
        }
    }
}
