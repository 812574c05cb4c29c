// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.

use alloc::borrow::Cow;

/// Failure reported by a component's render function.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RenderError {
    message: Cow<'static, str>,
}

impl RenderError {
    /// A render error with a human-readable message.
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message this error was built with.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors surfaced by the reconciler's driver entry points.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// A component failed on every attempt of a render; nothing was committed.
    #[error("component `{component}` failed to render")]
    Render {
        /// Name of the failing component.
        component: Cow<'static, str>,
        /// The error the component returned on its last attempt.
        #[source]
        source: RenderError,
    },
    /// The root was unmounted and accepts no further work.
    #[error("root has been unmounted")]
    RootUnmounted,
}

/// Report a broken internal invariant.
///
/// These indicate a reconciliation bug rather than a runtime condition, so
/// they are logged and fail loudly in debug builds.
#[track_caller]
pub(crate) fn invariant_violation(what: &str) {
    tracing::error!(invariant = what, "reconciler invariant violated");
    if cfg!(debug_assertions) {
        panic!("reconciler invariant violated: {what}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use core::error::Error;

    #[test]
    fn render_error_is_the_source() {
        let err = ReconcileError::Render {
            component: "List".into(),
            source: RenderError::new("boom"),
        };
        assert_eq!(err.to_string(), "component `List` failed to render");
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("boom"));
    }
}
