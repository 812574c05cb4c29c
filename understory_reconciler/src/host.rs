// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The rendering target the commit phase drives.

use core::fmt::Debug;

use crate::element::Props;

/// Capabilities a concrete rendering target provides.
///
/// The reconciler never inspects instances; it only hands them back to the
/// target. All mutation of the target happens inside a commit, after the
/// render that produced it ran to completion.
pub trait RenderTarget {
    /// Handle to a node owned by the target. The root container is one too.
    type Instance: Clone + Debug + 'static;

    /// Create a detached host node for `tag`.
    fn create_instance(&mut self, tag: &str, props: &Props) -> Self::Instance;

    /// Create a detached text node.
    fn create_text_instance(&mut self, text: &str) -> Self::Instance;

    /// Attach `child` to a `parent` that is itself not yet attached.
    fn append_initial_child(&mut self, parent: &Self::Instance, child: &Self::Instance);

    /// Append `child` as the last child of `container`, moving it if already attached.
    fn append_child_to_container(&mut self, child: &Self::Instance, container: &Self::Instance);

    /// Insert `child` into `container` before `before`, moving it if already attached.
    fn insert_child_to_container(
        &mut self,
        child: &Self::Instance,
        container: &Self::Instance,
        before: &Self::Instance,
    );

    /// Detach `child` from `container`.
    fn remove_child(&mut self, child: &Self::Instance, container: &Self::Instance);

    /// Apply changed attributes to a host node.
    fn commit_update(&mut self, instance: &Self::Instance, props: &Props);

    /// Replace the content of a text node.
    fn commit_text_update(&mut self, instance: &Self::Instance, text: &str);

    /// Arrange for [`Reconciler::flush_sync_work`] to run before control
    /// returns to the event loop.
    ///
    /// [`Reconciler::flush_sync_work`]: crate::Reconciler::flush_sync_work
    fn schedule_microtask(&mut self);
}
