// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Commit: apply a finished render to the target, swap trees, and queue
//! passive effects.
//!
//! A commit runs to completion once started. Its sub-phases, in order:
//!
//! 1. Mutation: placements, updates, deletions, and ref detachment, over
//!    every subtree whose `subtree_flags` say there is something to do.
//! 2. Tree swap: the finished tree becomes current.
//! 3. Layout: refs are attached to their (now current) host instances.
//!
//! Passive effects collected during mutation run later, from a
//! [`Task::FlushPassiveEffects`] callback or an explicit
//! [`Reconciler::flush_passive_effects`].

use alloc::vec;
use alloc::vec::Vec;
use core::mem;

use smallvec::SmallVec;

use crate::error::{ReconcileError, invariant_violation};
use crate::fiber::{FiberId, FiberKind};
use crate::flags::{EffectTags, Flags};
use crate::host::RenderTarget;
use crate::lane::{NO_LANE, Priority};
use crate::reconciler::Reconciler;
use crate::scheduler::{Scheduler, Task};

/// A step of the iterative mutation walk.
enum Visit {
    Enter(FiberId),
    Exit(FiberId),
}

impl<H: RenderTarget, S: Scheduler> Reconciler<H, S> {
    /// Commit the finished work-in-progress tree.
    pub(crate) fn commit_root(&mut self) {
        let Some(finished) = self.root.finished_work.take() else {
            invariant_violation("commit without finished work");
            return;
        };
        let lane = mem::replace(&mut self.root.finish_lane, NO_LANE);
        if lane == NO_LANE {
            invariant_violation("finish lane is empty at commit");
        }
        tracing::debug!(?lane, "commit start");

        if let Some(handle) = self.root.callback_handle.take() {
            self.scheduler.cancel_callback(handle);
        }
        self.root.callback_priority = NO_LANE;
        self.root.pending_lanes.remove(lane);
        self.root.pending_lanes |= mem::take(&mut self.root.interleaved_lanes);

        let fiber = self.fibers.get(finished);
        let all_flags = fiber.flags | fiber.subtree_flags;
        if all_flags.intersects(Flags::PASSIVE_MASK) && self.root.passive_callback.is_none() {
            let handle = self
                .scheduler
                .schedule_callback(Priority::Normal, Task::FlushPassiveEffects);
            self.root.passive_callback = Some(handle);
        }

        if all_flags.intersects(Flags::MUTATION_MASK | Flags::PASSIVE_MASK) {
            self.commit_mutation_effects(finished);
        }
        self.root.current = finished;
        if all_flags.intersects(Flags::LAYOUT_MASK) {
            self.commit_layout_effects(finished);
        }

        let freed = self.fibers.collect_garbage(finished);
        tracing::debug!(freed, live = self.fibers.live_count(), "commit end");
        self.ensure_root_is_scheduled();
    }

    /// Run queued passive effects: every unmount cleanup, then the cleanups
    /// of re-running effects, then their bodies.
    ///
    /// Returns whether anything ran. Updates dispatched by effects are
    /// scheduled, and sync work they produce is flushed before returning.
    pub fn flush_passive_effects(&mut self) -> Result<bool, ReconcileError> {
        if let Some(handle) = self.root.passive_callback.take() {
            self.scheduler.cancel_callback(handle);
        }
        let effects = mem::take(&mut self.root.pending_passive_effects);
        if effects.is_empty() {
            return Ok(false);
        }
        tracing::debug!(
            unmount = effects.unmount.len(),
            update = effects.update.len(),
            "flushing passive effects"
        );
        for effect in &effects.unmount {
            effect.borrow().run_destroy();
        }
        let needs_run = EffectTags::HAS_CALLBACK | EffectTags::NEEDS_EXECUTION;
        for effect in &effects.update {
            let effect = effect.borrow();
            if effect.tags.contains(needs_run) {
                effect.run_destroy();
            }
        }
        for effect in &effects.update {
            let mut effect = effect.borrow_mut();
            if effect.tags.contains(needs_run) {
                effect.run_create();
                effect.tags.remove(EffectTags::NEEDS_EXECUTION);
            }
        }
        self.schedule_pending_updates();
        self.flush_sync_work()?;
        Ok(true)
    }

    fn commit_mutation_effects(&mut self, finished: FiberId) {
        let mask = Flags::MUTATION_MASK | Flags::PASSIVE_MASK;
        let mut stack = vec![Visit::Enter(finished)];
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(id) => {
                    stack.push(Visit::Exit(id));
                    if self.fibers.get(id).subtree_flags.intersects(mask) {
                        let children: SmallVec<[FiberId; 8]> = self.fibers.children(id).collect();
                        stack.extend(children.into_iter().rev().map(Visit::Enter));
                    }
                }
                Visit::Exit(id) => self.commit_mutation_effects_on_fiber(id),
            }
        }
    }

    fn commit_mutation_effects_on_fiber(&mut self, id: FiberId) {
        let flags = self.fibers.get(id).flags;
        if flags.contains(Flags::PLACEMENT) {
            self.commit_placement(id);
            self.fibers.get_mut(id).flags.remove(Flags::PLACEMENT);
        }
        if flags.contains(Flags::UPDATE) {
            self.commit_update(id);
            self.fibers.get_mut(id).flags.remove(Flags::UPDATE);
        }
        if flags.contains(Flags::CHILD_DELETION) {
            let deletions = mem::take(&mut self.fibers.get_mut(id).deletions);
            for deleted in deletions {
                self.commit_deletion(id, deleted);
            }
            self.fibers.get_mut(id).flags.remove(Flags::CHILD_DELETION);
        }
        if flags.contains(Flags::REF) {
            let fiber = self.fibers.get(id);
            if let Some(old) = fiber
                .alternate
                .and_then(|current| self.fibers.get(current).node_ref.as_ref())
            {
                old.detach();
            }
        }
        if flags.contains(Flags::PASSIVE_EFFECT) {
            let fiber = self.fibers.get(id);
            self.root
                .pending_passive_effects
                .update
                .extend(fiber.effects().cloned());
            self.fibers.get_mut(id).flags.remove(Flags::PASSIVE_EFFECT);
        }
    }

    fn commit_update(&mut self, id: FiberId) {
        let fiber = self.fibers.get(id);
        let Some(instance) = &fiber.state_node else {
            invariant_violation("update flagged on a fiber without an instance");
            return;
        };
        match &fiber.kind {
            FiberKind::HostElement(_) => self.host.commit_update(instance, &fiber.memoized_props),
            FiberKind::HostText => {
                let text = fiber.memoized_props.text.as_deref().unwrap_or_default();
                self.host.commit_text_update(instance, text);
            }
            _ => invariant_violation("update flagged on a non-host fiber"),
        }
    }

    fn commit_placement(&mut self, id: FiberId) {
        let Some(parent) = self.host_parent(id) else {
            invariant_violation("placed fiber has no host parent");
            return;
        };
        let before = self.host_sibling(id);
        let mut hosts = Vec::new();
        self.collect_top_level_hosts(id, &mut hosts);
        for host in hosts {
            let Some(instance) = self.fibers.get(host).state_node.clone() else {
                invariant_violation("placed host fiber has no instance");
                continue;
            };
            match &before {
                Some(before) => self
                    .host
                    .insert_child_to_container(&instance, &parent, before),
                None => self.host.append_child_to_container(&instance, &parent),
            }
        }
    }

    /// Instance of the nearest host ancestor of `id` (the container for the root).
    fn host_parent(&self, id: FiberId) -> Option<H::Instance> {
        let mut node = self.fibers.get(id).parent;
        while let Some(parent) = node {
            let fiber = self.fibers.get(parent);
            if matches!(fiber.kind, FiberKind::HostElement(_) | FiberKind::HostRoot) {
                return fiber.state_node.clone();
            }
            node = fiber.parent;
        }
        None
    }

    /// Instance of the first host node after `id` in document order that is
    /// already in place, stopping at the host parent.
    fn host_sibling(&self, id: FiberId) -> Option<H::Instance> {
        let mut node = id;
        'siblings: loop {
            loop {
                let fiber = self.fibers.get(node);
                if let Some(sibling) = fiber.sibling {
                    node = sibling;
                    break;
                }
                let parent = fiber.parent?;
                if matches!(
                    self.fibers.get(parent).kind,
                    FiberKind::HostElement(_) | FiberKind::HostRoot
                ) {
                    return None;
                }
                node = parent;
            }
            loop {
                let fiber = self.fibers.get(node);
                if fiber.kind.is_host() {
                    break;
                }
                // A moving subtree is no anchor.
                if fiber.flags.contains(Flags::PLACEMENT) {
                    continue 'siblings;
                }
                match fiber.child {
                    Some(child) => node = child,
                    None => continue 'siblings,
                }
            }
            let fiber = self.fibers.get(node);
            if !fiber.flags.contains(Flags::PLACEMENT) {
                return fiber.state_node.clone();
            }
        }
    }

    /// Host fibers at or below `id` with no host fiber between them and `id`, in order.
    fn collect_top_level_hosts(&self, id: FiberId, out: &mut Vec<FiberId>) {
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            if self.fibers.get(node).kind.is_host() {
                out.push(node);
                continue;
            }
            let children: SmallVec<[FiberId; 8]> = self.fibers.children(node).collect();
            stack.extend(children.into_iter().rev());
        }
    }

    /// Remove the committed subtree `deleted`, formerly a child of `parent`.
    ///
    /// Only top-level host nodes are detached from the target; their
    /// descendants leave with them. Refs below are detached and effects of
    /// function components below are queued for unmount.
    fn commit_deletion(&mut self, parent: FiberId, deleted: FiberId) {
        let host_parent = if matches!(
            self.fibers.get(parent).kind,
            FiberKind::HostElement(_) | FiberKind::HostRoot
        ) {
            self.fibers.get(parent).state_node.clone()
        } else {
            self.host_parent(parent)
        };

        let mut top_level = Vec::new();
        let mut stack = vec![(deleted, false)];
        while let Some((id, inside_host)) = stack.pop() {
            let fiber = self.fibers.get(id);
            let is_host = fiber.kind.is_host();
            if is_host {
                if let Some(node_ref) = &fiber.node_ref {
                    node_ref.detach();
                }
                if !inside_host {
                    top_level.extend(fiber.state_node.clone());
                }
            }
            if matches!(fiber.kind, FiberKind::Function(_)) {
                self.root
                    .pending_passive_effects
                    .unmount
                    .extend(fiber.effects().cloned());
            }
            let children: SmallVec<[FiberId; 8]> = self.fibers.children(id).collect();
            stack.extend(
                children
                    .into_iter()
                    .rev()
                    .map(|child| (child, inside_host || is_host)),
            );
        }

        match host_parent {
            Some(container) => {
                for instance in &top_level {
                    self.host.remove_child(instance, &container);
                }
            }
            None => invariant_violation("deleted fiber has no host parent"),
        }

        let fiber = self.fibers.get_mut(deleted);
        fiber.parent = None;
        fiber.child = None;
    }

    fn commit_layout_effects(&mut self, finished: FiberId) {
        let mut stack = vec![finished];
        while let Some(id) = stack.pop() {
            let fiber = self.fibers.get(id);
            if fiber.flags.contains(Flags::REF) {
                if let (Some(node_ref), Some(instance)) = (&fiber.node_ref, &fiber.state_node) {
                    node_ref.attach(alloc::boxed::Box::new(instance.clone()));
                }
                self.fibers.get_mut(id).flags.remove(Flags::REF);
            }
            if self.fibers.get(id).subtree_flags.intersects(Flags::LAYOUT_MASK) {
                stack.extend(self.fibers.children(id));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ReconcilerConfig;
    use crate::element::{Component, Element};
    use crate::reconciler::Reconciler;
    use crate::scheduler::WorkQueue;
    use crate::test_host::{CONTAINER, Op, TestHost};

    fn root() -> Reconciler<TestHost, WorkQueue> {
        Reconciler::create_root(
            TestHost::default(),
            WorkQueue::new(),
            CONTAINER,
            ReconcilerConfig::default(),
        )
    }

    #[test]
    fn insertion_anchors_on_the_next_stable_host_through_components() {
        let wrap = Component::new("Wrap", |_, props| {
            Element::fragment(props.children.iter().cloned())
        });
        let tree = |mid: bool| {
            let mut items = alloc::vec![Element::text("a").with_key("a")];
            if mid {
                items.push(Element::text("m").with_key("m"));
            }
            items.push(
                Element::component(&wrap)
                    .with_key("w")
                    .with_child(Element::text("z")),
            );
            Element::host("div").with_children(items)
        };
        let mut r = root();
        r.render(Some(tree(false))).unwrap();
        r.act().unwrap();
        let div = r.host().children(CONTAINER)[0];
        let z = r.host().children(div)[1];
        r.host_mut().take_ops();

        r.render(Some(tree(true))).unwrap();
        r.act().unwrap();
        let ops = r.host_mut().take_ops();
        let m = r.host().children(div)[1];
        assert_eq!(
            ops,
            [
                Op::CreateText(m, "m".into()),
                Op::Insert {
                    parent: div,
                    child: m,
                    before: z
                }
            ]
        );
        assert_eq!(r.host().markup(CONTAINER), "<div>amz</div>");
    }

    #[test]
    fn fragment_moves_carry_all_their_hosts() {
        let tree = |order: [&'static str; 2]| {
            Element::host("div").with_children(order.map(|k| {
                Element::fragment([Element::text(k), Element::text(k)]).with_key(k)
            }))
        };
        let mut r = root();
        r.render(Some(tree(["x", "y"]))).unwrap();
        r.act().unwrap();
        r.render(Some(tree(["y", "x"]))).unwrap();
        r.act().unwrap();
        assert_eq!(r.host().markup(CONTAINER), "<div>yyxx</div>");
    }

    #[test]
    fn unmounting_a_component_removes_each_top_level_host() {
        let pair = Component::new("Pair", |_, _| {
            Element::fragment([
                Element::host("b").with_child(Element::text("1")),
                Element::host("i").with_child(Element::text("2")),
            ])
        });
        let mut r = root();
        r.render(Some(
            Element::host("p").with_children([
                Element::component(&pair),
                Element::text("tail").with_key("t"),
            ]),
        ))
        .unwrap();
        r.act().unwrap();
        r.host_mut().take_ops();

        r.render(Some(
            Element::host("p").with_child(Element::text("tail").with_key("t")),
        ))
        .unwrap();
        r.act().unwrap();
        let removes = r
            .host_mut()
            .take_ops()
            .into_iter()
            .filter(|op| matches!(op, Op::Remove { .. }))
            .count();
        assert_eq!(removes, 2);
        assert_eq!(r.host().markup(CONTAINER), "<p>tail</p>");
    }
}
