// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fibers and the generational arena that owns them.
//!
//! A fiber is one tree position as seen by one of the two buffers. The
//! committed ("current") fiber and its work-in-progress counterpart point at
//! each other through `alternate`; both are slots in the same [`FiberArena`],
//! so every cross-link is a [`FiberId`] rather than a reference.

use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;

use smallvec::SmallVec;

use crate::element::{Component, ContextId, Element, ElementType, Key, NodeRef, Props, Tag};
use crate::flags::Flags;
use crate::hooks::Hook;
use crate::update_queue::StateCell;

/// Identifier for a fiber in the arena (generational).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct FiberId(pub(crate) u32, pub(crate) u32);

impl FiberId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// The closed set of fiber kinds.
#[derive(Clone, Debug)]
pub(crate) enum FiberKind {
    /// The root of the tree; its instance is the container.
    HostRoot,
    HostElement(Tag),
    HostText,
    Function(Component),
    Fragment,
    Provider(ContextId),
}

impl FiberKind {
    pub(crate) fn from_element_type(ty: &ElementType) -> Self {
        match ty {
            ElementType::Host(tag) => Self::HostElement(tag.clone()),
            ElementType::Text => Self::HostText,
            ElementType::Component(component) => Self::Function(component.clone()),
            ElementType::Fragment => Self::Fragment,
            ElementType::Provider(id) => Self::Provider(*id),
        }
    }

    /// Whether a fiber of this kind can be reused for an element of type `ty`.
    pub(crate) fn matches(&self, ty: &ElementType) -> bool {
        match (self, ty) {
            (Self::HostElement(a), ElementType::Host(b)) => a == b,
            (Self::HostText, ElementType::Text) => true,
            (Self::Function(a), ElementType::Component(b)) => a.ptr_eq(b),
            (Self::Fragment, ElementType::Fragment) => true,
            (Self::Provider(a), ElementType::Provider(b)) => a == b,
            _ => false,
        }
    }

    /// Host elements and text: kinds that own a target instance.
    pub(crate) fn is_host(&self) -> bool {
        matches!(self, Self::HostElement(_) | Self::HostText)
    }

    pub(crate) fn name(&self) -> &str {
        match self {
            Self::HostRoot => "HostRoot",
            Self::HostElement(tag) => tag,
            Self::HostText => "#text",
            Self::Function(component) => component.name(),
            Self::Fragment => "Fragment",
            Self::Provider(_) => "Provider",
        }
    }
}

/// Kind-specific state.
#[derive(Debug, Default)]
pub(crate) enum FiberState {
    #[default]
    None,
    /// The root's element, with its update queues.
    Root(StateCell<Option<Element>>),
    /// A function component's hooks, in call order.
    Hooks(Vec<Hook>),
}

#[derive(Debug)]
pub(crate) struct Fiber<I> {
    generation: u32,
    pub(crate) kind: FiberKind,
    pub(crate) key: Option<Key>,
    pub(crate) node_ref: Option<NodeRef>,
    pub(crate) pending_props: Rc<Props>,
    pub(crate) memoized_props: Rc<Props>,
    pub(crate) state: FiberState,
    pub(crate) flags: Flags,
    /// OR of every descendant's `flags | subtree_flags`.
    pub(crate) subtree_flags: Flags,
    /// Current-tree children removed by this render.
    pub(crate) deletions: SmallVec<[FiberId; 2]>,
    pub(crate) child: Option<FiberId>,
    pub(crate) sibling: Option<FiberId>,
    /// The `return` link. Non-owning; traversal only.
    pub(crate) parent: Option<FiberId>,
    /// Position among siblings at the last reconcile.
    pub(crate) index: usize,
    pub(crate) alternate: Option<FiberId>,
    pub(crate) state_node: Option<I>,
}

impl<I> Fiber<I> {
    fn new(generation: u32, kind: FiberKind, key: Option<Key>, props: Rc<Props>) -> Self {
        Self {
            generation,
            kind,
            key,
            node_ref: None,
            memoized_props: Rc::clone(&props),
            pending_props: props,
            state: FiberState::None,
            flags: Flags::empty(),
            subtree_flags: Flags::empty(),
            deletions: SmallVec::new(),
            child: None,
            sibling: None,
            parent: None,
            index: 0,
            alternate: None,
            state_node: None,
        }
    }

    /// Iterate this fiber's effect hooks.
    pub(crate) fn effects(&self) -> impl Iterator<Item = &crate::hooks::EffectRef> {
        let hooks: &[Hook] = match &self.state {
            FiberState::Hooks(hooks) => hooks,
            _ => &[],
        };
        hooks.iter().filter_map(|hook| match hook {
            Hook::Effect(effect) => Some(effect),
            Hook::State(_) => None,
        })
    }
}

/// Slot storage for both fiber buffers.
#[derive(Debug)]
pub(crate) struct FiberArena<I> {
    /// slots
    fibers: Vec<Option<Fiber<I>>>,
    /// last generation per slot (persists across frees)
    generations: Vec<u32>,
    free_list: Vec<usize>,
}

impl<I> Default for FiberArena<I> {
    fn default() -> Self {
        Self {
            fibers: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
        }
    }
}

impl<I: Clone> FiberArena<I> {
    /// Allocate a detached fiber.
    pub(crate) fn alloc(
        &mut self,
        kind: FiberKind,
        key: Option<Key>,
        props: Rc<Props>,
    ) -> FiberId {
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            self.fibers[idx] = Some(Fiber::new(generation, kind, key, props));
            #[allow(
                clippy::cast_possible_truncation,
                reason = "FiberId uses 32-bit indices by design."
            )]
            (idx as u32, generation)
        } else {
            let generation = 1_u32;
            self.fibers.push(Some(Fiber::new(generation, kind, key, props)));
            self.generations.push(generation);
            #[allow(
                clippy::cast_possible_truncation,
                reason = "FiberId uses 32-bit indices by design."
            )]
            ((self.fibers.len() - 1) as u32, generation)
        };
        FiberId::new(idx, generation)
    }

    /// Allocate a detached fiber for `element`.
    pub(crate) fn alloc_from_element(&mut self, element: &Element) -> FiberId {
        let id = self.alloc(
            FiberKind::from_element_type(&element.ty),
            element.key.clone(),
            Rc::clone(&element.props),
        );
        self.get_mut(id).node_ref = element.node_ref.clone();
        id
    }

    /// Returns true if `id` refers to a live fiber.
    pub(crate) fn is_alive(&self, id: FiberId) -> bool {
        self.fibers
            .get(id.idx())
            .and_then(|n| n.as_ref())
            .map(|n| n.generation == id.1)
            .unwrap_or(false)
    }

    /// Access a fiber; panics if `id` is stale.
    pub(crate) fn get(&self, id: FiberId) -> &Fiber<I> {
        self.fibers[id.idx()].as_ref().expect("dangling FiberId")
    }

    /// Access a fiber mutably; panics if `id` is stale.
    pub(crate) fn get_mut(&mut self, id: FiberId) -> &mut Fiber<I> {
        self.fibers[id.idx()].as_mut().expect("dangling FiberId")
    }

    pub(crate) fn live_count(&self) -> usize {
        self.iter().count()
    }

    /// Every live fiber with its id.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (FiberId, &Fiber<I>)> {
        self.fibers.iter().enumerate().filter_map(|(idx, slot)| {
            slot.as_ref().map(|fiber| {
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "FiberId uses 32-bit indices by design."
                )]
                let id = FiberId::new(idx as u32, fiber.generation);
                (id, fiber)
            })
        })
    }

    /// Iterate the child chain of `id`.
    pub(crate) fn children(&self, id: FiberId) -> impl Iterator<Item = FiberId> {
        core::iter::successors(self.get(id).child, |&child| self.get(child).sibling)
    }

    /// The work-in-progress counterpart of `current`, ready to render with `pending_props`.
    ///
    /// Reuses the existing alternate when there is one, so each position
    /// toggles between the same two slots across renders.
    pub(crate) fn create_work_in_progress(
        &mut self,
        current: FiberId,
        pending_props: Rc<Props>,
    ) -> FiberId {
        let existing = self.get(current).alternate.filter(|&id| self.is_alive(id));
        let wip = match existing {
            Some(wip) => {
                let fiber = self.get_mut(wip);
                fiber.pending_props = pending_props;
                fiber.flags = Flags::empty();
                fiber.subtree_flags = Flags::empty();
                fiber.deletions.clear();
                wip
            }
            None => {
                let (kind, key) = {
                    let fiber = self.get(current);
                    (fiber.kind.clone(), fiber.key.clone())
                };
                let wip = self.alloc(kind, key, pending_props);
                self.get_mut(wip).alternate = Some(current);
                self.get_mut(current).alternate = Some(wip);
                wip
            }
        };

        let cur = self.get(current);
        let child = cur.child;
        let index = cur.index;
        let memoized_props = Rc::clone(&cur.memoized_props);
        let node_ref = cur.node_ref.clone();
        let state_node = cur.state_node.clone();
        let state = match &cur.state {
            FiberState::Root(cell) => FiberState::Root(cell.clone()),
            _ => FiberState::None,
        };

        let fiber = self.get_mut(wip);
        fiber.child = child;
        fiber.sibling = None;
        fiber.index = index;
        fiber.memoized_props = memoized_props;
        fiber.node_ref = node_ref;
        fiber.state_node = state_node;
        fiber.state = state;
        wip
    }

    /// Free every fiber not reachable from `root`, except the alternates of
    /// reachable fibers. Returns the number of slots freed.
    ///
    /// Kept alternates have their tree links cleared; they are rebuilt from
    /// their current counterpart when next reused.
    pub(crate) fn collect_garbage(&mut self, root: FiberId) -> usize {
        let mut reachable = vec![false; self.fibers.len()];
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !self.is_alive(id) || reachable[id.idx()] {
                continue;
            }
            reachable[id.idx()] = true;
            let fiber = self.get(id);
            stack.extend(fiber.sibling);
            stack.extend(fiber.child);
        }

        let mut alternates = vec![false; self.fibers.len()];
        for (idx, slot) in self.fibers.iter().enumerate() {
            if let Some(alt) = slot.as_ref().and_then(|f| f.alternate)
                && reachable[idx]
                && self.is_alive(alt)
            {
                alternates[alt.idx()] = true;
            }
        }

        let mut freed = 0;
        for idx in 0..self.fibers.len() {
            if self.fibers[idx].is_none() || reachable[idx] {
                continue;
            }
            if alternates[idx] {
                if let Some(fiber) = self.fibers[idx].as_mut() {
                    fiber.child = None;
                    fiber.sibling = None;
                    fiber.parent = None;
                    fiber.deletions.clear();
                    fiber.state = FiberState::None;
                }
                continue;
            }
            self.fibers[idx] = None;
            self.free_list.push(idx);
            freed += 1;
        }
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(arena: &mut FiberArena<u32>, tag: &'static str) -> FiberId {
        arena.alloc(FiberKind::HostElement(tag.into()), None, Rc::default())
    }

    #[test]
    fn liveness_alloc_free_reuse() {
        let mut arena = FiberArena::<u32>::default();
        let root = host(&mut arena, "root");
        let a = host(&mut arena, "a");
        assert!(arena.is_alive(a));
        assert_eq!(arena.collect_garbage(root), 1);
        assert!(!arena.is_alive(a));
        assert!(arena.is_alive(root));

        let b = host(&mut arena, "b");
        assert!(arena.is_alive(b));
        assert!(!arena.is_alive(a));
        if a.0 == b.0 {
            assert!(b.1 > a.1, "generation must increase on reuse");
        }
    }

    #[test]
    fn work_in_progress_pairs_and_reuses_alternate() {
        let mut arena = FiberArena::<u32>::default();
        let current = host(&mut arena, "div");
        let child = host(&mut arena, "span");
        arena.get_mut(current).child = Some(child);
        arena.get_mut(current).state_node = Some(7);

        let wip = arena.create_work_in_progress(current, Rc::default());
        assert_eq!(arena.get(wip).alternate, Some(current));
        assert_eq!(arena.get(current).alternate, Some(wip));
        assert_eq!(arena.get(wip).child, Some(child));
        assert_eq!(arena.get(wip).state_node, Some(7));

        arena.get_mut(wip).flags = Flags::UPDATE;
        let again = arena.create_work_in_progress(current, Rc::default());
        assert_eq!(again, wip, "the pair toggles between the same two slots");
        assert!(arena.get(again).flags.is_empty());
    }

    #[test]
    fn kinds_match_by_tag_and_identity() {
        let component = Component::new("C", |_, _| Element::empty());
        let kind = FiberKind::Function(component.clone());
        assert!(kind.matches(&ElementType::Component(component)));
        let lookalike = Component::new("C", |_, _| Element::empty());
        assert!(!kind.matches(&ElementType::Component(lookalike)));
        assert!(FiberKind::HostElement("li".into()).matches(&ElementType::Host("li".into())));
        assert!(!FiberKind::HostElement("li".into()).matches(&ElementType::Host("ul".into())));
        assert!(!FiberKind::HostText.matches(&ElementType::Fragment));
    }

    #[test]
    fn garbage_collection_keeps_tree_and_alternates() {
        let mut arena = FiberArena::<u32>::default();
        let root = host(&mut arena, "root");
        let a = host(&mut arena, "a");
        let b = host(&mut arena, "b");
        let orphan = host(&mut arena, "orphan");
        arena.get_mut(root).child = Some(a);
        arena.get_mut(a).sibling = Some(b);
        arena.get_mut(a).parent = Some(root);
        arena.get_mut(b).parent = Some(root);
        let a_alt = arena.create_work_in_progress(a, Rc::default());
        arena.get_mut(a_alt).child = Some(orphan);

        assert_eq!(arena.collect_garbage(root), 1);
        assert!(!arena.is_alive(orphan));
        assert!(arena.is_alive(a_alt));
        assert_eq!(arena.get(a_alt).child, None);
        assert_eq!(arena.children(root).collect::<Vec<_>>(), [a, b]);
        assert_eq!(arena.live_count(), 4);
    }
}
