// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Navigation effects.
//!
//! Redirects are values, not side effects buried in callbacks. A
//! [`Navigator`] belongs to one rendering context and accepts exactly one
//! navigation: the first terminal outcome wins and every later attempt to
//! schedule is a no-op, however many times the context re-renders.

use std::sync::OnceLock;

use serde::Serialize;
use tracing::debug;
use url::form_urlencoded;
use utoipa::ToSchema;

/// Entry point that starts a new authorization.
pub const LOGIN_ENTRY: &str = "/auth/login";

/// Public, unauthenticated error view.
pub const ERROR_VIEW: &str = "/auth/error";

/// Landing page after login when no return path was requested.
pub const HOME: &str = "/";

/// A scheduled change of location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", content = "location", rename_all = "snake_case")]
pub enum Navigation {
    /// Path on the local surface.
    Internal(String),
    /// Full navigation to another origin (identity provider).
    External(String),
}

impl Navigation {
    pub fn location(&self) -> &str {
        match self {
            Navigation::Internal(path) | Navigation::External(path) => path,
        }
    }

    /// Login entry point, remembering where to come back to.
    pub fn login(return_to: Option<&str>) -> Self {
        match return_to.and_then(sanitize_return_to) {
            Some(path) => {
                let query = form_urlencoded::Serializer::new(String::new())
                    .append_pair("return_to", &path)
                    .finish();
                Navigation::Internal(format!("{LOGIN_ENTRY}?{query}"))
            }
            None => Navigation::Internal(LOGIN_ENTRY.to_string()),
        }
    }

    /// Public error view for a failed authorization.
    pub fn error_view(code: &str) -> Self {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("code", code)
            .finish();
        Navigation::Internal(format!("{ERROR_VIEW}?{query}"))
    }

    pub fn home() -> Self {
        Navigation::Internal(HOME.to_string())
    }
}

/// Accept only local absolute paths as post-login destinations.
pub fn sanitize_return_to(raw: &str) -> Option<String> {
    let path = raw.trim();
    let local = path.starts_with('/') && !path.starts_with("//") && !path.contains('\\');
    local.then(|| path.to_string())
}

/// One-shot navigation slot for a rendering context.
#[derive(Debug, Default)]
pub struct Navigator {
    scheduled: OnceLock<Navigation>,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a navigation. Returns `false` when one is already scheduled,
    /// in which case nothing changes.
    pub fn schedule(&self, navigation: Navigation) -> bool {
        match self.scheduled.set(navigation) {
            Ok(()) => true,
            Err(ignored) => {
                debug!(ignored = %ignored.location(), "Navigation already scheduled");
                false
            }
        }
    }

    pub fn scheduled(&self) -> Option<&Navigation> {
        self.scheduled.get()
    }
}
