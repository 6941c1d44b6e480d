// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Countdown until the next claim.
//!
//! The countdown is display only. It is a pure function of the last known
//! `next_claim_time` and the clock; reaching zero does not make a claim
//! possible, only a resync reporting `can_claim` does.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use utoipa::ToSchema;

use super::eligibility::ClaimEngine;
use crate::clock::SharedClock;

const TICK: Duration = Duration::from_secs(1);

/// Remaining time, split for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Countdown {
    pub remaining_secs: u64,
    pub hours: u64,
    pub minutes: u8,
    pub seconds: u8,
    /// The projected time has passed.
    pub ready: bool,
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

/// Project the countdown to `next_claim_time` at `now`.
pub fn project(next_claim_time: DateTime<Utc>, now: DateTime<Utc>) -> Countdown {
    let remaining_secs = (next_claim_time - now).num_seconds().max(0) as u64;
    Countdown {
        remaining_secs,
        hours: remaining_secs / 3600,
        minutes: ((remaining_secs % 3600) / 60) as u8,
        seconds: (remaining_secs % 60) as u8,
        ready: remaining_secs == 0,
    }
}

/// Holds the seed between authoritative updates.
#[derive(Debug, Clone, Default)]
pub struct CountdownProjector {
    seed: Option<DateTime<Utc>>,
}

impl CountdownProjector {
    /// Replace the seed. Returns whether it changed.
    pub fn reseed(&mut self, next_claim_time: Option<DateTime<Utc>>) -> bool {
        if self.seed == next_claim_time {
            return false;
        }
        self.seed = next_claim_time;
        true
    }

    pub fn current(&self, now: DateTime<Utc>) -> Option<Countdown> {
        self.seed.map(|next| project(next, now))
    }

    /// Publish the countdown every second until cancelled or every receiver
    /// is gone. Re-seeds whenever the engine state changes.
    pub fn spawn(
        engine: ClaimEngine,
        clock: SharedClock,
        shutdown: CancellationToken,
    ) -> watch::Receiver<Option<Countdown>> {
        let (tx, rx) = watch::channel(None);

        tokio::spawn(async move {
            let mut projector = CountdownProjector::default();
            let mut changes = engine.subscribe();
            let mut ticker = tokio::time::interval(TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tx.closed() => break,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {}
                }

                if projector.reseed(engine.projection()) {
                    debug!(next_claim_time = ?projector.seed, "Countdown re-seeded");
                }
                let countdown = projector.current(clock.now());
                tx.send_if_modified(|current| {
                    if *current == countdown {
                        return false;
                    }
                    *current = countdown;
                    true
                });
            }

            info!("Countdown projector stopped");
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeDelta;

    use super::*;
    use crate::auth::SessionManager;
    use crate::clock::manual::ManualClock;
    use crate::clock::Clock;
    use crate::models::{ClaimState, Identity, IdentityPatch, WalletAddress};
    use crate::storage::{CredentialRecord, CredentialStore, MemoryStore};
    use crate::testing::{ScriptedBackend, ScriptedProvider};

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn projects_hours_minutes_seconds() {
        let c = project(at("2026-03-02T13:01:05Z"), at("2026-03-01T12:00:00Z"));
        assert_eq!(c.remaining_secs, 25 * 3600 + 65);
        assert_eq!(c.to_string(), "25:01:05");
        assert!(!c.ready);
    }

    #[test]
    fn past_time_is_ready_at_zero() {
        let c = project(at("2026-03-01T11:00:00Z"), at("2026-03-01T12:00:00Z"));
        assert_eq!(c.remaining_secs, 0);
        assert_eq!(c.to_string(), "00:00:00");
        assert!(c.ready);
    }

    #[test]
    fn reseed_reports_changes_only() {
        let mut projector = CountdownProjector::default();
        assert_eq!(projector.current(Utc::now()), None);

        let next = at("2026-03-01T12:10:00Z");
        assert!(projector.reseed(Some(next)));
        assert!(!projector.reseed(Some(next)));
        assert_eq!(
            projector.current(at("2026-03-01T12:00:00Z")).map(|c| c.to_string()),
            Some("00:10:00".to_string())
        );
    }

    #[tokio::test]
    async fn spawned_projector_follows_engine() {
        let clock = Arc::new(ManualClock::at(at("2026-03-01T12:00:00Z")));
        let session = SessionManager::new(
            CredentialStore::new(Arc::new(MemoryStore::new()), "test"),
            Arc::new(ScriptedProvider::default()),
            clock.clone(),
            TimeDelta::minutes(5),
        );
        session.bootstrap();
        let record =
            CredentialRecord::new("a", "r", clock.now() + TimeDelta::hours(1), "user_1").unwrap();
        session.adopt(record, Identity::bare("user_1"));
        session
            .update_identity(IdentityPatch::wallet(
                WalletAddress::parse("0x742d35cc6634c0532925a3b844bc9e7595f4ab12").unwrap(),
            ))
            .unwrap();

        let backend = Arc::new(ScriptedBackend::default());
        backend.set_eligibility(ClaimState::new(false, clock.now() + TimeDelta::seconds(90)));
        let engine = ClaimEngine::new(
            session,
            backend,
            clock.clone(),
            TimeDelta::hours(24),
            TimeDelta::seconds(60),
        );

        let shutdown = CancellationToken::new();
        let mut rx = CountdownProjector::spawn(engine.clone(), clock.clone(), shutdown.clone());
        engine.resync().await.unwrap();

        let countdown = *rx.wait_for(|c| c.is_some()).await.unwrap();
        assert_eq!(countdown.map(|c| c.to_string()).as_deref(), Some("00:01:30"));

        shutdown.cancel();
    }
}
