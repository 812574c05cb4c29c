// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scoped context values for the render in progress.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;

use crate::element::{ContextId, ContextValue};

/// Provider values visible at the current point of the traversal.
///
/// Providers push on begin and pop on complete. The stack lives in the
/// render session, so a discarded render takes its entries with it.
#[derive(Default)]
pub(crate) struct ContextStack {
    entries: Vec<(ContextId, ContextValue)>,
}

impl ContextStack {
    pub(crate) fn push(&mut self, id: ContextId, value: ContextValue) {
        self.entries.push((id, value));
    }

    pub(crate) fn pop(&mut self, id: ContextId) {
        match self.entries.pop() {
            Some((top, _)) if top == id => {}
            _ => crate::error::invariant_violation("context stack popped out of order"),
        }
    }

    /// Nearest value published for `id`.
    pub(crate) fn read(&self, id: ContextId) -> Option<ContextValue> {
        self.entries
            .iter()
            .rev()
            .find(|(entry, _)| *entry == id)
            .map(|(_, value)| Rc::clone(value))
    }

    pub(crate) fn depth(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Debug for ContextStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextStack")
            .field("depth", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Context;

    #[test]
    fn nearest_provider_wins() {
        let ctx = Context::new(0_u32);
        let other = Context::new(0_u32);
        let mut stack = ContextStack::default();
        stack.push(ctx.id(), Rc::new(1_u32));
        stack.push(other.id(), Rc::new(9_u32));
        stack.push(ctx.id(), Rc::new(2_u32));
        let read = |s: &ContextStack| {
            s.read(ctx.id())
                .and_then(|v| v.downcast_ref::<u32>().copied())
        };
        assert_eq!(read(&stack), Some(2));
        stack.pop(ctx.id());
        assert_eq!(read(&stack), Some(1));
        stack.pop(other.id());
        stack.pop(ctx.id());
        assert_eq!(read(&stack), None);
        assert_eq!(stack.depth(), 0);
    }
}
