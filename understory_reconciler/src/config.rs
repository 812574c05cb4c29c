// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Root configuration.

/// Options fixed when a root is created.
///
/// ```
/// use understory_reconciler::ReconcilerConfig;
///
/// let config = ReconcilerConfig::default().with_time_slicing(false);
/// assert!(!config.time_slicing);
/// assert_eq!(config.render_retries, 1);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Whether non-sync lanes render in yielding slices.
    ///
    /// When `false` every lane renders to completion in one call, without
    /// polling the scheduler.
    pub time_slicing: bool,
    /// Fresh-stack retries after a component fails to render, before the
    /// attempt is abandoned and reported.
    pub render_retries: u8,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            time_slicing: true,
            render_retries: 1,
        }
    }
}

impl ReconcilerConfig {
    /// Set [`time_slicing`](Self::time_slicing).
    #[must_use]
    pub fn with_time_slicing(mut self, time_slicing: bool) -> Self {
        self.time_slicing = time_slicing;
        self
    }

    /// Set [`render_retries`](Self::render_retries).
    #[must_use]
    pub fn with_render_retries(mut self, render_retries: u8) -> Self {
        self.render_retries = render_retries;
        self
    }
}
