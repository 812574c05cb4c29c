// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The begin half of a fiber visit: produce the next child chain.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::mem;
use core::slice;

use crate::child_fiber::ChildReconciler;
use crate::element::{Component, ContextId, Element};
use crate::error::{ReconcileError, invariant_violation};
use crate::fiber::{FiberId, FiberKind, FiberState};
use crate::flags::Flags;
use crate::hooks::Hooks;
use crate::host::RenderTarget;
use crate::reconciler::Reconciler;
use crate::scheduler::Scheduler;
use crate::work_loop::RenderSession;

impl<H: RenderTarget, S: Scheduler> Reconciler<H, S> {
    /// Reconcile the children of `wip` and return the first one to visit.
    pub(crate) fn begin_work(
        &mut self,
        session: &mut RenderSession,
        wip: FiberId,
    ) -> Result<Option<FiberId>, ReconcileError> {
        let fiber = self.fibers.get(wip);
        tracing::trace!(fiber = ?wip, kind = fiber.kind.name(), "begin");
        match &fiber.kind {
            FiberKind::HostRoot => Ok(self.update_host_root(session, wip)),
            FiberKind::HostElement(_) => {
                self.mark_ref(wip);
                Ok(self.update_props_children(wip))
            }
            FiberKind::HostText => Ok(None),
            FiberKind::Function(component) => {
                let component = component.clone();
                self.update_function_component(session, wip, &component)
            }
            FiberKind::Fragment => Ok(self.update_props_children(wip)),
            FiberKind::Provider(id) => {
                let id = *id;
                Ok(self.update_context_provider(session, wip, id))
            }
        }
    }

    fn update_host_root(&mut self, session: &RenderSession, wip: FiberId) -> Option<FiberId> {
        let Some(current) = self.fibers.get(wip).alternate else {
            invariant_violation("work-in-progress root has no current root");
            return None;
        };
        let FiberState::Root(committed) = &mut self.fibers.get_mut(current).state else {
            invariant_violation("root fiber without root state");
            return None;
        };
        let (cell, _) = committed.rebase(session.render_lane);
        let element = cell.memoized_state.clone();
        self.fibers.get_mut(wip).state = FiberState::Root(cell);
        match element {
            Some(element) => self.reconcile_children(wip, slice::from_ref(&element)),
            None => self.reconcile_children(wip, &[]),
        }
    }

    fn update_props_children(&mut self, wip: FiberId) -> Option<FiberId> {
        let props = Rc::clone(&self.fibers.get(wip).pending_props);
        self.reconcile_children(wip, &props.children)
    }

    fn update_context_provider(
        &mut self,
        session: &mut RenderSession,
        wip: FiberId,
        id: ContextId,
    ) -> Option<FiberId> {
        let props = Rc::clone(&self.fibers.get(wip).pending_props);
        if let Some(value) = &props.context_value {
            session.contexts.push(id, Rc::clone(value));
        }
        self.reconcile_children(wip, &props.children)
    }

    fn update_function_component(
        &mut self,
        session: &RenderSession,
        wip: FiberId,
        component: &Component,
    ) -> Result<Option<FiberId>, ReconcileError> {
        let current = self.fibers.get(wip).alternate;
        // The committed hooks are lent to the render and put back afterwards,
        // whatever the outcome.
        let mut current_hooks: Option<Vec<_>> = current.and_then(|current| {
            match mem::take(&mut self.fibers.get_mut(current).state) {
                FiberState::Hooks(hooks) => Some(hooks),
                _ => None,
            }
        });
        let props = Rc::clone(&self.fibers.get(wip).pending_props);

        let rendered = {
            let mut hooks = Hooks::new(
                current_hooks.as_mut(),
                session.render_lane,
                &session.contexts,
                &self.updates,
            );
            component
                .render(&mut hooks, &props)
                .map(|element| (element, hooks.finish()))
        };

        if let (Some(current), Some(hooks)) = (current, current_hooks) {
            self.fibers.get_mut(current).state = FiberState::Hooks(hooks);
        }

        let (element, (hooks, flags)) = rendered.map_err(|source| ReconcileError::Render {
            component: component.name_owned(),
            source,
        })?;
        let fiber = self.fibers.get_mut(wip);
        fiber.state = FiberState::Hooks(hooks);
        fiber.flags |= flags;
        Ok(self.reconcile_children(wip, slice::from_ref(&element)))
    }

    /// Raise `REF` when the ref was attached, removed, or reassigned.
    fn mark_ref(&mut self, wip: FiberId) {
        let fiber = self.fibers.get(wip);
        let previous = fiber
            .alternate
            .and_then(|current| self.fibers.get(current).node_ref.as_ref());
        let changed = match (previous, fiber.node_ref.as_ref()) {
            (None, None) => false,
            (Some(a), Some(b)) => !a.ptr_eq(b),
            _ => true,
        };
        if changed {
            self.fibers.get_mut(wip).flags |= Flags::REF;
        }
    }

    /// Diff `children` against the committed child chain of `wip`.
    ///
    /// Effects are tracked only when `wip` has a committed counterpart; a
    /// freshly mounted subtree is attached as a whole by its top fiber.
    fn reconcile_children(&mut self, wip: FiberId, children: &[Element]) -> Option<FiberId> {
        let current = self.fibers.get(wip).alternate;
        let first = match current {
            Some(current) => {
                let current_child = self.fibers.get(current).child;
                ChildReconciler::new(&mut self.fibers, true).reconcile_child_fibers(
                    wip,
                    current_child,
                    children,
                )
            }
            None => ChildReconciler::new(&mut self.fibers, false).mount_child_fibers(wip, children),
        };
        self.fibers.get_mut(wip).child = first;
        first
    }
}
