// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The complete half of a fiber visit: host instances and flag bubbling.

use alloc::rc::Rc;
use alloc::vec::Vec;

use smallvec::SmallVec;

use crate::fiber::{FiberId, FiberKind};
use crate::flags::Flags;
use crate::host::RenderTarget;
use crate::reconciler::Reconciler;
use crate::scheduler::Scheduler;
use crate::work_loop::RenderSession;

impl<H: RenderTarget, S: Scheduler> Reconciler<H, S> {
    /// Finish `wip` once all of its children have completed.
    pub(crate) fn complete_work(&mut self, session: &mut RenderSession, wip: FiberId) {
        let fiber = self.fibers.get(wip);
        tracing::trace!(fiber = ?wip, kind = fiber.kind.name(), "complete");
        let mounted = fiber.alternate.filter(|_| fiber.state_node.is_some());
        let props = Rc::clone(&fiber.memoized_props);
        match &fiber.kind {
            FiberKind::HostElement(tag) => match mounted {
                Some(current) => {
                    if self.fibers.get(current).memoized_props.content_differs(&props) {
                        self.fibers.get_mut(wip).flags |= Flags::UPDATE;
                    }
                }
                None => {
                    let tag = tag.clone();
                    let instance = self.host.create_instance(&tag, &props);
                    self.append_all_children(&instance, wip);
                    self.fibers.get_mut(wip).state_node = Some(instance);
                }
            },
            FiberKind::HostText => {
                let text = props.text.as_deref().unwrap_or_default();
                match mounted {
                    Some(current) => {
                        if self.fibers.get(current).memoized_props.text != props.text {
                            self.fibers.get_mut(wip).flags |= Flags::UPDATE;
                        }
                    }
                    None => {
                        let instance = self.host.create_text_instance(text);
                        self.fibers.get_mut(wip).state_node = Some(instance);
                    }
                }
            }
            FiberKind::Provider(id) => {
                if props.context_value.is_some() {
                    session.contexts.pop(*id);
                }
            }
            FiberKind::HostRoot | FiberKind::Function(_) | FiberKind::Fragment => {}
        }
        self.bubble_properties(wip);
    }

    /// Attach the top-level host nodes below `wip` to its fresh `instance`,
    /// looking through non-host fibers.
    fn append_all_children(&mut self, instance: &H::Instance, wip: FiberId) {
        let mut stack: Vec<FiberId> = self.fibers.children(wip).collect();
        stack.reverse();
        while let Some(id) = stack.pop() {
            let fiber = self.fibers.get(id);
            if fiber.kind.is_host() {
                if let Some(child) = &fiber.state_node {
                    self.host.append_initial_child(instance, child);
                }
                continue;
            }
            let children: SmallVec<[FiberId; 8]> = self.fibers.children(id).collect();
            stack.extend(children.into_iter().rev());
        }
    }

    /// OR the children's flags into `subtree_flags` and point them back at `wip`.
    fn bubble_properties(&mut self, wip: FiberId) {
        let mut subtree_flags = Flags::empty();
        let mut child = self.fibers.get(wip).child;
        while let Some(id) = child {
            let fiber = self.fibers.get_mut(id);
            subtree_flags |= fiber.flags | fiber.subtree_flags;
            fiber.parent = Some(wip);
            child = fiber.sibling;
        }
        self.fibers.get_mut(wip).subtree_flags |= subtree_flags;
    }
}
