// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Child reconciliation: diff a new child list against a committed chain.

use alloc::rc::Rc;

use hashbrown::HashMap;

use crate::element::{Element, Key};
use crate::fiber::{FiberArena, FiberId};
use crate::flags::Flags;

/// Identity of a child within its sibling group.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum MapKey {
    Key(Key),
    Index(usize),
}

impl MapKey {
    fn new(key: Option<&Key>, index: usize) -> Self {
        match key {
            Some(key) => Self::Key(key.clone()),
            None => Self::Index(index),
        }
    }
}

/// Builds the work-in-progress child chain of one parent.
///
/// With `track_effects` off (first mount of a subtree) no deletions are
/// recorded and no placements are flagged.
pub(crate) struct ChildReconciler<'a, I> {
    arena: &'a mut FiberArena<I>,
    track_effects: bool,
}

impl<I> core::fmt::Debug for ChildReconciler<'_, I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChildReconciler")
            .field("track_effects", &self.track_effects)
            .finish_non_exhaustive()
    }
}

impl<'a, I: Clone> ChildReconciler<'a, I> {
    pub(crate) fn new(arena: &'a mut FiberArena<I>, track_effects: bool) -> Self {
        Self {
            arena,
            track_effects,
        }
    }

    /// Reconcile `children` under `parent`, reusing fibers from `current_first_child`.
    pub(crate) fn reconcile_child_fibers(
        mut self,
        parent: FiberId,
        current_first_child: Option<FiberId>,
        children: &[Element],
    ) -> Option<FiberId> {
        let children = match children {
            [only] if only.is_unkeyed_fragment() => only.props.children.as_slice(),
            _ => children,
        };
        match children {
            [] => {
                self.delete_remaining_children(parent, current_first_child);
                None
            }
            [single] => {
                let fiber = self.reconcile_single_element(parent, current_first_child, single);
                Some(self.place_single_child(fiber))
            }
            _ => self.reconcile_children_array(parent, current_first_child, children),
        }
    }

    /// Build a fresh chain for a parent with no committed children.
    pub(crate) fn mount_child_fibers(
        self,
        parent: FiberId,
        children: &[Element],
    ) -> Option<FiberId> {
        self.reconcile_child_fibers(parent, None, children)
    }

    fn reconcile_single_element(
        &mut self,
        parent: FiberId,
        current_first_child: Option<FiberId>,
        element: &Element,
    ) -> FiberId {
        let mut child = current_first_child;
        while let Some(current) = child {
            let fiber = self.arena.get(current);
            let sibling = fiber.sibling;
            if fiber.key == element.key {
                if fiber.kind.matches(&element.ty) {
                    self.delete_remaining_children(parent, sibling);
                    let existing = self.use_fiber(current, element);
                    self.arena.get_mut(existing).parent = Some(parent);
                    return existing;
                }
                // Same key, different kind: nothing below can match either.
                self.delete_remaining_children(parent, Some(current));
                break;
            }
            self.delete_child(parent, current);
            child = sibling;
        }
        let created = self.arena.alloc_from_element(element);
        self.arena.get_mut(created).parent = Some(parent);
        created
    }

    fn reconcile_children_array(
        &mut self,
        parent: FiberId,
        current_first_child: Option<FiberId>,
        children: &[Element],
    ) -> Option<FiberId> {
        let mut existing: HashMap<MapKey, FiberId> = HashMap::new();
        let mut current = current_first_child;
        while let Some(id) = current {
            let fiber = self.arena.get(id);
            existing.insert(MapKey::new(fiber.key.as_ref(), fiber.index), id);
            current = fiber.sibling;
        }

        let mut first: Option<FiberId> = None;
        let mut last: Option<FiberId> = None;
        let mut last_placed_index = 0;
        for (index, element) in children.iter().enumerate() {
            let fiber = self.update_from_map(&mut existing, index, element);
            {
                let f = self.arena.get_mut(fiber);
                f.index = index;
                f.parent = Some(parent);
            }
            match last {
                Some(prev) => self.arena.get_mut(prev).sibling = Some(fiber),
                None => first = Some(fiber),
            }
            last = Some(fiber);

            if !self.track_effects {
                continue;
            }
            match self.arena.get(fiber).alternate {
                Some(current) => {
                    let old_index = self.arena.get(current).index;
                    if old_index < last_placed_index {
                        // Moved right past a sibling that stayed.
                        self.arena.get_mut(fiber).flags |= Flags::PLACEMENT;
                    } else {
                        last_placed_index = old_index;
                    }
                }
                None => self.arena.get_mut(fiber).flags |= Flags::PLACEMENT,
            }
        }

        // Unclaimed children go, in their committed order.
        let mut current = current_first_child;
        while let Some(id) = current {
            let fiber = self.arena.get(id);
            let sibling = fiber.sibling;
            if existing.contains_key(&MapKey::new(fiber.key.as_ref(), fiber.index)) {
                self.delete_child(parent, id);
            }
            current = sibling;
        }
        first
    }

    /// Claim the committed fiber matching `element` from `existing`, or create one.
    fn update_from_map(
        &mut self,
        existing: &mut HashMap<MapKey, FiberId>,
        index: usize,
        element: &Element,
    ) -> FiberId {
        let key = MapKey::new(element.key.as_ref(), index);
        match existing.get(&key) {
            Some(&current) if self.arena.get(current).kind.matches(&element.ty) => {
                existing.remove(&key);
                self.use_fiber(current, element)
            }
            _ => self.arena.alloc_from_element(element),
        }
    }

    /// The work-in-progress counterpart of `current`, carrying `element`'s props.
    fn use_fiber(&mut self, current: FiberId, element: &Element) -> FiberId {
        let wip = self
            .arena
            .create_work_in_progress(current, Rc::clone(&element.props));
        let fiber = self.arena.get_mut(wip);
        fiber.index = 0;
        fiber.sibling = None;
        fiber.node_ref = element.node_ref.clone();
        wip
    }

    fn place_single_child(&mut self, fiber: FiberId) -> FiberId {
        let f = self.arena.get_mut(fiber);
        if self.track_effects && f.alternate.is_none() {
            f.flags |= Flags::PLACEMENT;
        }
        fiber
    }

    fn delete_child(&mut self, parent: FiberId, child: FiberId) {
        if !self.track_effects {
            return;
        }
        let p = self.arena.get_mut(parent);
        p.deletions.push(child);
        p.flags |= Flags::CHILD_DELETION;
    }

    fn delete_remaining_children(&mut self, parent: FiberId, first: Option<FiberId>) {
        if !self.track_effects {
            return;
        }
        let mut child = first;
        while let Some(id) = child {
            child = self.arena.get(id).sibling;
            self.delete_child(parent, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Props;
    use crate::fiber::FiberKind;
    use alloc::vec::Vec;

    /// A committed parent with one committed host child per key.
    fn committed(arena: &mut FiberArena<u32>, keys: &[&'static str]) -> (FiberId, FiberId) {
        let current = arena.alloc(FiberKind::HostElement("ul".into()), None, Rc::default());
        let elements: Vec<_> = keys
            .iter()
            .map(|&k| Element::host("li").with_key(k))
            .collect();
        let first = ChildReconciler::new(arena, false).mount_child_fibers(current, &elements);
        arena.get_mut(current).child = first;
        let wip = arena.create_work_in_progress(current, Rc::<Props>::default());
        (current, wip)
    }

    fn keyed(keys: &[&'static str]) -> Vec<Element> {
        keys.iter()
            .map(|&k| Element::host("li").with_key(k))
            .collect()
    }

    fn chain(arena: &FiberArena<u32>, first: Option<FiberId>) -> Vec<FiberId> {
        core::iter::successors(first, |&id| arena.get(id).sibling).collect()
    }

    #[test]
    fn swap_flags_exactly_one_placement() {
        let mut arena = FiberArena::default();
        let (current, wip) = committed(&mut arena, &["1", "2"]);
        let old = arena.children(current).collect::<Vec<_>>();

        let current_child = arena.get(current).child;
        let first = ChildReconciler::new(&mut arena, true).reconcile_child_fibers(
            wip,
            current_child,
            &keyed(&["2", "1"]),
        );
        let new = chain(&arena, first);
        assert_eq!(new.len(), 2);
        assert_eq!(arena.get(new[0]).alternate, Some(old[1]));
        assert_eq!(arena.get(new[1]).alternate, Some(old[0]));
        let placed = new
            .iter()
            .filter(|&&id| arena.get(id).flags.contains(Flags::PLACEMENT))
            .count();
        assert_eq!(placed, 1);
        assert!(arena.get(new[1]).flags.contains(Flags::PLACEMENT));
        assert!(arena.get(wip).deletions.is_empty());
    }

    #[test]
    fn unclaimed_children_are_deleted_in_order() {
        let mut arena = FiberArena::default();
        let (current, wip) = committed(&mut arena, &["a", "b", "c", "d"]);
        let old = arena.children(current).collect::<Vec<_>>();
        let current_child = arena.get(current).child;
        let first = ChildReconciler::new(&mut arena, true).reconcile_child_fibers(
            wip,
            current_child,
            &keyed(&["c", "x"]),
        );
        let new = chain(&arena, first);
        assert_eq!(arena.get(new[0]).alternate, Some(old[2]));
        assert!(arena.get(new[1]).alternate.is_none());
        assert!(arena.get(new[1]).flags.contains(Flags::PLACEMENT));
        assert_eq!(arena.get(wip).deletions.as_slice(), [old[0], old[1], old[3]]);
        assert!(arena.get(wip).flags.contains(Flags::CHILD_DELETION));
    }

    #[test]
    fn single_child_matches_key_then_kind() {
        let mut arena = FiberArena::default();
        let (current, wip) = committed(&mut arena, &["a", "b"]);
        let old = arena.children(current).collect::<Vec<_>>();

        let current_child = arena.get(current).child;
        let first = ChildReconciler::new(&mut arena, true).reconcile_child_fibers(
            wip,
            current_child,
            &[Element::host("li").with_key("b")],
        );
        let only = first.unwrap();
        assert_eq!(arena.get(only).alternate, Some(old[1]));
        assert!(arena.get(only).flags.is_empty());
        assert_eq!(arena.get(wip).deletions.as_slice(), [old[0]]);

        let (current, wip) = committed(&mut arena, &["a"]);
        let current_child = arena.get(current).child;
        let first = ChildReconciler::new(&mut arena, true).reconcile_child_fibers(
            wip,
            current_child,
            &[Element::host("p").with_key("a")],
        );
        let replaced = first.unwrap();
        assert!(arena.get(replaced).alternate.is_none());
        assert!(arena.get(replaced).flags.contains(Flags::PLACEMENT));
        assert_eq!(arena.get(wip).deletions.len(), 1);
    }

    #[test]
    fn mounting_flags_nothing() {
        let mut arena = FiberArena::<u32>::default();
        let parent = arena.alloc(FiberKind::Fragment, None, Rc::default());
        let first = ChildReconciler::new(&mut arena, false)
            .mount_child_fibers(parent, &[Element::fragment(keyed(&["a", "b", "c"]))]);
        let new = chain(&arena, first);
        assert_eq!(new.len(), 3, "an unkeyed fragment child is unwrapped");
        assert!(new.iter().all(|&id| arena.get(id).flags.is_empty()));
        assert!(new.iter().all(|&id| arena.get(id).parent == Some(parent)));
        assert_eq!(
            new.iter().map(|&id| arena.get(id).index).collect::<Vec<_>>(),
            [0, 1, 2]
        );
    }
}
