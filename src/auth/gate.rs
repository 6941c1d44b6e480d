// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access gate for protected views.
//!
//! A protected view is anything that renders from an [`Identity`]. The gate
//! decides, from the session status alone, whether the view runs:
//!
//! | Session | Result |
//! |---------|--------|
//! | `Bootstrapping` | [`Gated::Placeholder`] |
//! | `Anonymous` | [`Gated::Redirecting`] to the login entry, scheduled once |
//! | `Authenticated` / `Refreshing` | [`Gated::Render`] with the identity injected |
//!
//! Gates compose: a gate is itself a [`ProtectedView`] once its session is
//! resolved, see the wallet binding gate.

use serde::Serialize;

use super::navigation::{Navigation, Navigator};
use super::session::{SessionManager, SessionStatus};
use crate::models::Identity;

/// A view that needs an authenticated identity.
pub trait ProtectedView: Send + Sync {
    type Output;

    fn render(&self, identity: &Identity) -> Self::Output;
}

impl<F, T> ProtectedView for F
where
    F: Fn(&Identity) -> T + Send + Sync,
{
    type Output = T;

    fn render(&self, identity: &Identity) -> T {
        self(identity)
    }
}

/// What a gate produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Gated<T> {
    /// Session not resolved yet; render nothing identity-specific.
    Placeholder,
    Redirecting { navigation: Navigation },
    Render { view: T },
}

impl<T> Gated<T> {
    pub fn into_view(self) -> Option<T> {
        match self {
            Gated::Render { view } => Some(view),
            _ => None,
        }
    }
}

/// Wraps a protected view behind the session.
pub struct AccessGate<V> {
    view: V,
    return_to: Option<String>,
}

impl<V: ProtectedView> AccessGate<V> {
    pub fn new(view: V) -> Self {
        Self {
            view,
            return_to: None,
        }
    }

    /// Path to come back to after login.
    pub fn returning_to(mut self, path: impl Into<String>) -> Self {
        self.return_to = Some(path.into());
        self
    }

    /// Render against the current session status without waiting.
    pub fn render(&self, session: &SessionManager, navigator: &Navigator) -> Gated<V::Output> {
        match session.status() {
            SessionStatus::Bootstrapping => Gated::Placeholder,
            SessionStatus::Anonymous => self.redirect(navigator),
            SessionStatus::Authenticated | SessionStatus::Refreshing => {
                match session.current_identity() {
                    Some(identity) => Gated::Render {
                        view: self.view.render(&identity),
                    },
                    // Logged out between the two reads
                    None => self.redirect(navigator),
                }
            }
        }
    }

    /// Wait for bootstrap to resolve, then render.
    pub async fn render_resolved(
        &self,
        session: &SessionManager,
        navigator: &Navigator,
    ) -> Gated<V::Output> {
        session.wait_resolved().await;
        self.render(session, navigator)
    }

    fn redirect(&self, navigator: &Navigator) -> Gated<V::Output> {
        navigator.schedule(Navigation::login(self.return_to.as_deref()));
        let navigation = navigator
            .scheduled()
            .cloned()
            .unwrap_or_else(|| Navigation::login(None));
        Gated::Redirecting { navigation }
    }
}
