// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hook machinery for function components.
//!
//! A component receives a [`Hooks`] handle for the duration of one render.
//! Hooks are identified by call order, so a component must call the same
//! hooks in the same order on every render.
//!
//! State setters do not hold a reference to the root. They enqueue onto the
//! hook's shared queue and record the lane in the root's update mailbox; the
//! reconciler drains the mailbox at its entry points (see
//! [`Reconciler::schedule_pending_updates`](crate::Reconciler::schedule_pending_updates)).

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::Any;
use core::cell::{Cell, RefCell};
use core::fmt;

use crate::context::ContextStack;
use crate::element::{Context, PropValue};
use crate::error::invariant_violation;
use crate::flags::{EffectTags, Flags};
use crate::lane::{Lane, Lanes, NO_LANE, Priority, priority_to_lane};
use crate::update_queue::{Action, StateCell, Update, UpdateQueue};

/// Cleanup returned by an effect; runs before the effect re-runs and on unmount.
pub type EffectCleanup = Box<dyn FnOnce()>;

type EffectCreate = Box<dyn FnOnce() -> Option<EffectCleanup>>;

/// One `use_effect` record.
pub(crate) struct Effect {
    pub(crate) tags: EffectTags,
    create: Option<EffectCreate>,
    /// Shared by every render of the same hook, so the cleanup of the
    /// committed run survives an abandoned render.
    destroy: Rc<RefCell<Option<EffectCleanup>>>,
    deps: Option<Vec<PropValue>>,
}

impl Effect {
    /// Run and clear the pending cleanup, if any.
    pub(crate) fn run_destroy(&self) {
        let destroy = self.destroy.borrow_mut().take();
        if let Some(destroy) = destroy {
            destroy();
        }
    }

    /// Run the effect body and keep its cleanup.
    pub(crate) fn run_create(&mut self) {
        if let Some(create) = self.create.take() {
            let destroy = create();
            *self.destroy.borrow_mut() = destroy;
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("tags", &self.tags)
            .field("has_create", &self.create.is_some())
            .field("has_destroy", &self.destroy.borrow().is_some())
            .field("deps", &self.deps)
            .finish()
    }
}

pub(crate) type EffectRef = Rc<RefCell<Effect>>;

/// One hook slot on a function component fiber.
pub(crate) enum Hook {
    /// A `StateCell<T>`, type-erased.
    State(Box<dyn Any>),
    Effect(EffectRef),
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::State(_) => f.write_str("State(..)"),
            Self::Effect(effect) => f.debug_tuple("Effect").field(&effect.borrow()).finish(),
        }
    }
}

/// Per-root mailbox shared with every setter: the ambient lane context and
/// the lanes of updates not yet seen by the driver.
#[derive(Debug, Default)]
pub(crate) struct UpdateContext {
    priority: Cell<Priority>,
    transition_depth: Cell<u32>,
    pending: Cell<Lanes>,
}

impl UpdateContext {
    /// Lane for an update requested right now.
    pub(crate) fn request_update_lane(&self) -> Lane {
        if self.transition_depth.get() > 0 {
            Lanes::TRANSITION
        } else {
            priority_to_lane(self.priority.get())
        }
    }

    pub(crate) fn mark(&self, lane: Lane) {
        self.pending.set(self.pending.get() | lane);
    }

    pub(crate) fn take_pending(&self) -> Lanes {
        self.pending.replace(NO_LANE)
    }

    /// Lanes dispatched since the last drain, left in place.
    pub(crate) fn peek_pending(&self) -> Lanes {
        self.pending.get()
    }

    /// Set the ambient priority, returning the previous one.
    pub(crate) fn replace_priority(&self, priority: Priority) -> Priority {
        self.priority.replace(priority)
    }

    pub(crate) fn enter_transition(&self) {
        self.transition_depth.set(self.transition_depth.get() + 1);
    }

    pub(crate) fn exit_transition(&self) {
        self.transition_depth
            .set(self.transition_depth.get().saturating_sub(1));
    }
}

/// Setter returned by [`Hooks::use_state`].
///
/// Setters may be cloned and called at any time, including from effects and
/// from outside any render.
pub struct StateSetter<T> {
    queue: UpdateQueue<T>,
    updates: Rc<UpdateContext>,
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            updates: Rc::clone(&self.updates),
        }
    }
}

impl<T> fmt::Debug for StateSetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSetter")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl<T> StateSetter<T> {
    /// Replace the state.
    pub fn set(&self, value: T) {
        self.dispatch(Action::Replace(value));
    }

    /// Derive the next state from the previous one.
    pub fn update(&self, f: impl Fn(&T) -> T + 'static) {
        self.dispatch(Action::Reduce(Rc::new(f)));
    }

    fn dispatch(&self, action: Action<T>) {
        let lane = self.updates.request_update_lane();
        self.queue.enqueue(Update { action, lane });
        self.updates.mark(lane);
        tracing::trace!(?lane, "state update dispatched");
    }
}

/// Hook access for one render of one function component.
pub struct Hooks<'a> {
    current: Option<&'a mut Vec<Hook>>,
    work_in_progress: Vec<Hook>,
    render_lanes: Lanes,
    contexts: &'a ContextStack,
    updates: &'a Rc<UpdateContext>,
    flags: Flags,
}

impl fmt::Debug for Hooks<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("mounting", &self.current.is_none())
            .field("called", &self.work_in_progress.len())
            .field("render_lanes", &self.render_lanes)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl<'a> Hooks<'a> {
    pub(crate) fn new(
        current: Option<&'a mut Vec<Hook>>,
        render_lanes: Lanes,
        contexts: &'a ContextStack,
        updates: &'a Rc<UpdateContext>,
    ) -> Self {
        Self {
            current,
            work_in_progress: Vec::new(),
            render_lanes,
            contexts,
            updates,
            flags: Flags::empty(),
        }
    }

    /// The hook list for the work-in-progress fiber and the flags the hooks raised.
    pub(crate) fn finish(self) -> (Vec<Hook>, Flags) {
        if let Some(current) = &self.current
            && current.len() != self.work_in_progress.len()
        {
            invariant_violation("hook count changed between renders");
        }
        (self.work_in_progress, self.flags)
    }

    fn current_hook(&mut self) -> Option<&mut Hook> {
        let index = self.work_in_progress.len();
        self.current.as_mut().and_then(|hooks| hooks.get_mut(index))
    }

    /// Lanes being rendered.
    pub fn render_lanes(&self) -> Lanes {
        self.render_lanes
    }

    /// Component-local state.
    ///
    /// On mount the state is `init()`. On later renders it is the committed
    /// state with every update whose lane is being rendered applied in order.
    pub fn use_state<T: Clone + 'static>(
        &mut self,
        init: impl FnOnce() -> T,
    ) -> (T, StateSetter<T>) {
        let render_lanes = self.render_lanes;
        let rebased = match self.current_hook() {
            None => None,
            Some(Hook::State(any)) => match any.downcast_mut::<StateCell<T>>() {
                Some(cell) => Some(cell.rebase(render_lanes).0),
                None => {
                    invariant_violation("use_state called where a different state type was");
                    None
                }
            },
            Some(Hook::Effect(_)) => {
                invariant_violation("use_state called where use_effect was");
                None
            }
        };
        let cell = rebased.unwrap_or_else(|| StateCell::new(init()));
        let value = cell.memoized_state.clone();
        let setter = StateSetter {
            queue: cell.queue.clone(),
            updates: Rc::clone(self.updates),
        };
        self.work_in_progress.push(Hook::State(Box::new(cell)));
        (value, setter)
    }

    /// Run `create` after the commit this render produces, and its cleanup
    /// before the next run or on unmount.
    ///
    /// With `deps: None` the effect runs after every commit. Otherwise it
    /// runs on mount and whenever `deps` differ from the previous render's.
    pub fn use_effect(
        &mut self,
        create: impl FnOnce() -> Option<EffectCleanup> + 'static,
        deps: Option<Vec<PropValue>>,
    ) {
        let previous = match self.current_hook() {
            None => None,
            Some(Hook::Effect(effect)) => Some(Rc::clone(effect)),
            Some(Hook::State(_)) => {
                invariant_violation("use_effect called where use_state was");
                None
            }
        };
        let (destroy, unchanged) = match previous {
            Some(previous) => {
                let previous = previous.borrow();
                let unchanged = deps.is_some() && previous.deps == deps;
                (Rc::clone(&previous.destroy), unchanged)
            }
            None => (Rc::new(RefCell::new(None)), false),
        };
        let tags = if unchanged {
            EffectTags::HAS_CALLBACK
        } else {
            self.flags |= Flags::PASSIVE_EFFECT;
            EffectTags::HAS_CALLBACK | EffectTags::NEEDS_EXECUTION
        };
        self.work_in_progress
            .push(Hook::Effect(Rc::new(RefCell::new(Effect {
                tags,
                create: Some(Box::new(create)),
                destroy,
                deps,
            }))));
    }

    /// The value of the nearest enclosing provider of `context`, or its default.
    pub fn use_context<T: Clone + 'static>(&self, context: &Context<T>) -> T {
        self.contexts
            .read(context.id())
            .and_then(|value| value.downcast_ref::<T>().cloned())
            .unwrap_or_else(|| context.default_value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lane::Lanes;

    #[test]
    fn lane_follows_ambient_context() {
        let ctx = UpdateContext::default();
        assert_eq!(ctx.request_update_lane(), Lanes::DEFAULT);
        let prev = ctx.replace_priority(Priority::Immediate);
        assert_eq!(prev, Priority::Normal);
        assert_eq!(ctx.request_update_lane(), Lanes::SYNC);
        ctx.enter_transition();
        assert_eq!(
            ctx.request_update_lane(),
            Lanes::TRANSITION,
            "an explicit transition overrides the ambient priority"
        );
        ctx.exit_transition();
        assert_eq!(ctx.request_update_lane(), Lanes::SYNC);
    }

    #[test]
    fn setters_record_lanes_in_the_mailbox() {
        let updates = Rc::new(UpdateContext::default());
        let cell = StateCell::new(0_i32);
        let setter = StateSetter {
            queue: cell.queue.clone(),
            updates: Rc::clone(&updates),
        };
        setter.update(|n| n + 1);
        updates.replace_priority(Priority::UserBlocking);
        setter.clone().set(5);
        assert_eq!(updates.peek_pending(), Lanes::DEFAULT | Lanes::INPUT_CONTINUOUS);
        assert_eq!(updates.take_pending(), Lanes::DEFAULT | Lanes::INPUT_CONTINUOUS);
        assert_eq!(updates.take_pending(), NO_LANE);
        assert_eq!(cell.queue.take_pending().len(), 2);
    }

    #[test]
    fn mount_then_update_reuses_state_and_effect_cleanup() {
        let updates = Rc::new(UpdateContext::default());
        let contexts = ContextStack::default();

        let mut first = Hooks::new(None, Lanes::DEFAULT, &contexts, &updates);
        let (value, setter) = first.use_state(|| 1_i32);
        first.use_effect(|| None, Some(alloc::vec![PropValue::Int(1)]));
        let (mut committed, flags) = first.finish();
        assert_eq!(value, 1);
        assert!(flags.contains(Flags::PASSIVE_EFFECT));

        setter.update(|n| n * 3);
        let mut second = Hooks::new(Some(&mut committed), Lanes::DEFAULT, &contexts, &updates);
        let (value, _) = second.use_state(|| 100_i32);
        second.use_effect(|| None, Some(alloc::vec![PropValue::Int(1)]));
        let (hooks, flags) = second.finish();
        assert_eq!(value, 3, "init is ignored after mount");
        assert!(
            !flags.contains(Flags::PASSIVE_EFFECT),
            "unchanged deps do not schedule the effect"
        );
        let Hook::Effect(effect) = &hooks[1] else {
            panic!("second hook should be an effect");
        };
        assert_eq!(effect.borrow().tags, EffectTags::HAS_CALLBACK);
    }
}
