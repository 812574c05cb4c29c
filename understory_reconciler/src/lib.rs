// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Reconciler: incremental, priority-aware tree reconciliation.
//!
//! Given a declarative description of a tree (an [`Element`]), the reconciler
//! works out the minimal set of mutations that bring a retained rendering
//! target up to date, and applies them in one atomic commit.
//!
//! - Updates are tagged with priority [lanes](lane); urgent work preempts
//!   less urgent work, and skipped updates are rebased rather than lost.
//! - Rendering is interruptible at fiber granularity and resumes where it
//!   yielded, driven by a [`Scheduler`](scheduler::Scheduler).
//! - The commit never yields: placements, updates, deletions, and refs are
//!   applied in one pass, and passive effects are deferred to a later task.
//!
//! ## Two trees
//!
//! Every position in the tree is a fiber, kept twice: the *current* fiber is
//! what the target shows, and its *work-in-progress* twin is what the next
//! commit will show. A render diffs elements against current fibers and
//! flags the work-in-progress side; the commit applies those flags and
//! swaps the buffers. Both buffers live in one generational arena, and
//! fibers unreachable after a commit are reclaimed.
//!
//! ## Driving a root
//!
//! The reconciler never calls into the host unprompted. A root is created
//! over a [`RenderTarget`] and a scheduler, and the host calls back in:
//!
//! - [`Reconciler::render`] enqueues a new root element.
//! - [`Reconciler::run_task`] runs work handed to the scheduler.
//! - [`Reconciler::flush_sync_work`] drains sync-lane work after the host's
//!   microtask fires.
//!
//! With the bundled [`WorkQueue`](scheduler::WorkQueue) scheduler,
//! [`Reconciler::act`] does all of that until the root is idle:
//!
//! ```
//! use understory_reconciler::element::Props;
//! use understory_reconciler::scheduler::WorkQueue;
//! use understory_reconciler::{Component, Element, Reconciler, ReconcilerConfig, RenderTarget};
//!
//! #[derive(Default)]
//! struct Count(usize);
//!
//! impl RenderTarget for Count {
//!     type Instance = ();
//!     fn create_instance(&mut self, _: &str, _: &Props) {
//!         self.0 += 1;
//!     }
//!     fn create_text_instance(&mut self, _: &str) {
//!         self.0 += 1;
//!     }
//!     fn append_initial_child(&mut self, _: &(), _: &()) {}
//!     fn append_child_to_container(&mut self, _: &(), _: &()) {}
//!     fn insert_child_to_container(&mut self, _: &(), _: &(), _: &()) {}
//!     fn remove_child(&mut self, _: &(), _: &()) {}
//!     fn commit_update(&mut self, _: &(), _: &Props) {}
//!     fn commit_text_update(&mut self, _: &(), _: &str) {}
//!     fn schedule_microtask(&mut self) {}
//! }
//!
//! let list = Component::new("List", |hooks, _| {
//!     let (items, _set) = hooks.use_state(|| 3_usize);
//!     Element::host("ul").with_children((0..items).map(|i| Element::host("li").with_key(i)))
//! });
//!
//! let mut root = Reconciler::create_root(
//!     Count::default(),
//!     WorkQueue::new(),
//!     (),
//!     ReconcilerConfig::default(),
//! );
//! root.render(Some(Element::component(&list))).unwrap();
//! root.act().unwrap();
//! assert_eq!(root.host().0, 4);
//! ```
//!
//! ## Errors
//!
//! A component may fail its render with a [`RenderError`]. The render is
//! restarted from scratch up to [`ReconcilerConfig::render_retries`] times;
//! if it still fails, nothing is committed and the entry point returns
//! [`ReconcileError::Render`]. Broken internal invariants are not errors:
//! they are logged through `tracing` and panic in debug builds.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod config;
pub mod element;
pub mod error;
pub mod flags;
pub mod hooks;
pub mod host;
pub mod lane;
pub mod scheduler;
pub mod update_queue;

mod begin;
mod child_fiber;
mod commit;
mod complete;
mod context;
mod fiber;
mod reconciler;
mod root;
mod sync_queue;
mod work_loop;

#[cfg(test)]
mod test_host;

pub use config::ReconcilerConfig;
pub use element::{Component, Context, Element, Key, NodeRef, PropValue, Props};
pub use error::{ReconcileError, RenderError};
pub use hooks::{Hooks, StateSetter};
pub use host::RenderTarget;
pub use lane::{Lane, Lanes, Priority};
pub use reconciler::Reconciler;
