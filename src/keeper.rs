// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Keeper
//!
//! Background task that keeps the session usable while no surface is
//! actively calling into it.
//!
//! ## Strategy
//!
//! Every `tick` (default 30 s) the keeper:
//! 1. Calls `refresh_if_needed` when the session is authenticated, so the
//!    credentials are exchanged before they expire.
//! 2. Reads eligibility, which schedules a resync once the last one is older
//!    than the resync interval.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{RefreshOutcome, SessionError, SessionManager};
use crate::faucet::ClaimEngine;

/// Default interval between keeper sweeps.
const DEFAULT_TICK: Duration = Duration::from_secs(30);

pub struct SessionKeeper {
    session: SessionManager,
    engine: ClaimEngine,
    tick: Duration,
}

impl SessionKeeper {
    pub fn new(session: SessionManager, engine: ClaimEngine) -> Self {
        Self {
            session,
            engine,
            tick: DEFAULT_TICK,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Run until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(keeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.tick.as_secs(), "Session keeper starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            self.step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.tick) => {},
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Session keeper shutting down");
    }

    async fn step(&self) {
        if !self.session.status().is_authenticated() {
            return;
        }

        match self.session.refresh_if_needed().await {
            Ok(RefreshOutcome::NotNeeded) => {}
            Ok(outcome) => debug!(outcome = ?outcome, "Keeper refresh completed"),
            Err(SessionError::NotAuthenticated) => return,
            Err(e) => {
                warn!(error = %e, "Keeper refresh failed");
                if !self.session.status().is_authenticated() {
                    return;
                }
            }
        }

        let view = self.engine.eligibility();
        debug!(
            can_claim = view.can_claim(),
            optimistic = view.optimistic,
            "Keeper checked eligibility"
        );
    }
}
