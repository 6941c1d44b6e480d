// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Claim eligibility engine.
//!
//! Holds the last server-reported [`ClaimState`] for the current
//! (identity, wallet) pair and executes claims.
//!
//! ## Rules
//!
//! - `can_claim` is never computed locally. After a successful claim the
//!   engine marks the state as not claimable and projects the next claim
//!   time from the cooldown; the next resync replaces that projection
//!   wholesale.
//! - At most one claim is in flight. Extra calls fail locally with
//!   [`ClaimError::ClaimAlreadyInProgress`] and never reach the network.
//! - Every state change bumps a revision. A resync only lands if the
//!   revision it started from is still current, so a slow resync cannot
//!   undo a claim that completed meanwhile.
//! - Claims and resyncs run on their own tasks; a caller that goes away does
//!   not abort them. Results for a session that has since changed are
//!   dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::error::ClaimError;
use crate::auth::{SessionContext, SessionManager};
use crate::clock::SharedClock;
use crate::models::{ClaimState, WalletAddress};
use crate::providers::{ClaimRejection, FaucetBackend};

/// What the surrounding page sees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct Eligibility {
    /// Last known state; `None` until the first resync for this identity.
    pub claim_state: Option<ClaimState>,
    /// When the server last reported `claim_state`.
    pub synced_at: Option<DateTime<Utc>>,
    /// `claim_state` is a local projection after a claim, not yet confirmed.
    pub optimistic: bool,
    pub claim_in_flight: bool,
}

impl Eligibility {
    pub fn can_claim(&self) -> bool {
        self.claim_state.as_ref().is_some_and(|s| s.can_claim)
    }

    pub fn next_claim_time(&self) -> Option<DateTime<Utc>> {
        self.claim_state.as_ref().map(|s| s.next_claim_time)
    }
}

/// Terminal result of a successful claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Claimed {
    pub claimed_at: DateTime<Utc>,
    /// Projected from the cooldown until the next resync.
    pub next_claim_time: DateTime<Utc>,
}

/// The session an engine state belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EngineKey {
    generation: u64,
    identity_id: String,
    wallet: Option<WalletAddress>,
}

impl From<&SessionContext> for EngineKey {
    fn from(context: &SessionContext) -> Self {
        Self {
            generation: context.generation,
            identity_id: context.identity.identity_id.clone(),
            wallet: context.identity.wallet_address.clone(),
        }
    }
}

/// Engine state published to subscribers.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    view: Eligibility,
    key: Option<EngineKey>,
    revision: u64,
    attempted_at: Option<DateTime<Utc>>,
    claimed: Option<Claimed>,
}

impl EngineState {
    pub fn view(&self) -> &Eligibility {
        &self.view
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

struct EngineInner {
    session: SessionManager,
    backend: Arc<dyn FaucetBackend>,
    clock: SharedClock,
    cooldown: TimeDelta,
    resync_interval: TimeDelta,
    state: watch::Sender<EngineState>,
    claim_in_flight: AtomicBool,
    resync_in_flight: AtomicBool,
}

/// Resets the single-flight flag when the claim task ends.
struct FlightGuard(Arc<EngineInner>);

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.0.claim_in_flight.store(false, Ordering::Release);
    }
}

struct ResyncGuard(Arc<EngineInner>);

impl Drop for ResyncGuard {
    fn drop(&mut self) {
        self.0.resync_in_flight.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct ClaimEngine {
    inner: Arc<EngineInner>,
}

impl ClaimEngine {
    pub fn new(
        session: SessionManager,
        backend: Arc<dyn FaucetBackend>,
        clock: SharedClock,
        cooldown: TimeDelta,
        resync_interval: TimeDelta,
    ) -> Self {
        let (state, _) = watch::channel(EngineState::default());
        Self {
            inner: Arc::new(EngineInner {
                session,
                backend,
                clock,
                cooldown,
                resync_interval,
                state,
                claim_in_flight: AtomicBool::new(false),
                resync_in_flight: AtomicBool::new(false),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.inner.state.subscribe()
    }

    fn current_key(&self) -> Option<EngineKey> {
        self.inner.session.context().as_ref().map(EngineKey::from)
    }

    /// Last synced eligibility. Never waits on the network; schedules a
    /// background resync when the state is older than the resync interval.
    pub fn eligibility(&self) -> Eligibility {
        let key = self.current_key();
        let now = self.inner.clock.now();

        let (view, stale) = {
            let state = self.inner.state.borrow();
            if key.is_some() && state.key == key {
                let stale = state
                    .attempted_at
                    .is_none_or(|at| now - at >= self.inner.resync_interval);
                (state.view.clone(), stale)
            } else {
                (Eligibility::default(), true)
            }
        };

        if stale && key.as_ref().is_some_and(|k| k.wallet.is_some()) {
            self.spawn_resync();
        }

        Eligibility {
            claim_in_flight: self.inner.claim_in_flight.load(Ordering::Acquire),
            ..view
        }
    }

    /// Next claim time for the current session, if known.
    pub fn projection(&self) -> Option<DateTime<Utc>> {
        let key = self.current_key()?;
        let state = self.inner.state.borrow();
        if state.key.as_ref() == Some(&key) {
            state.view.next_claim_time()
        } else {
            None
        }
    }

    /// Consume the terminal claim result. Returns it at most once.
    pub fn take_claimed(&self) -> Option<Claimed> {
        let key = self.current_key()?;
        let mut taken = None;
        self.inner.state.send_if_modified(|state| {
            if state.key.as_ref() == Some(&key) {
                taken = state.claimed.take();
            }
            taken.is_some()
        });
        taken
    }

    /// Fetch the authoritative state and replace the local one.
    pub async fn resync(&self) -> Result<Eligibility, ClaimError> {
        let context = self
            .inner
            .session
            .context()
            .ok_or(ClaimError::NotAuthenticated)?;
        let key = EngineKey::from(&context);
        if key.wallet.is_none() {
            return Err(ClaimError::WalletNotBound);
        }

        let now = self.inner.clock.now();
        let mut started_at_revision = 0;
        self.inner.state.send_if_modified(|state| {
            let switched = state.key.as_ref() != Some(&key);
            if switched {
                *state = EngineState {
                    key: Some(key.clone()),
                    revision: state.revision + 1,
                    ..EngineState::default()
                };
            }
            state.attempted_at = Some(now);
            started_at_revision = state.revision;
            switched
        });

        let claim_state = match self.inner.backend.eligibility(&context.access_token).await {
            Ok(claim_state) => claim_state,
            Err(e) => {
                warn!(identity_id = %key.identity_id, error = %e, "Eligibility resync failed");
                return Err(ClaimError::Transport(e));
            }
        };

        let synced_at = self.inner.clock.now();
        let can_claim = claim_state.can_claim;
        let next_claim_time = claim_state.next_claim_time;
        let session = &self.inner.session;

        let applied = self.inner.state.send_if_modified(|state| {
            if session.generation() != key.generation
                || state.key.as_ref() != Some(&key)
                || state.revision != started_at_revision
            {
                return false;
            }
            state.view = Eligibility {
                claim_state: Some(claim_state),
                synced_at: Some(synced_at),
                optimistic: false,
                claim_in_flight: false,
            };
            state.revision += 1;
            true
        });

        if applied {
            debug!(
                identity_id = %key.identity_id,
                can_claim,
                next_claim_time = %next_claim_time,
                "Eligibility resynced"
            );
        } else {
            debug!(identity_id = %key.identity_id, "Discarding superseded eligibility resync");
        }

        Ok(self.eligibility_snapshot())
    }

    fn eligibility_snapshot(&self) -> Eligibility {
        let key = self.current_key();
        let state = self.inner.state.borrow();
        let view = if key.is_some() && state.key == key {
            state.view.clone()
        } else {
            Eligibility::default()
        };
        Eligibility {
            claim_in_flight: self.inner.claim_in_flight.load(Ordering::Acquire),
            ..view
        }
    }

    fn spawn_resync(&self) {
        let Ok(handle) = Handle::try_current() else {
            return;
        };
        if self
            .inner
            .resync_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let engine = self.clone();
        handle.spawn(async move {
            let _guard = ResyncGuard(engine.inner.clone());
            if let Err(e) = engine.resync().await {
                debug!(error = %e, "Background eligibility resync did not complete");
            }
        });
    }

    fn claim_state_for(&self, key: &EngineKey) -> Option<ClaimState> {
        let state = self.inner.state.borrow();
        if state.key.as_ref() == Some(key) {
            state.view.claim_state.clone()
        } else {
            None
        }
    }

    /// Submit a claim for the current identity.
    pub async fn claim(&self) -> Result<Claimed, ClaimError> {
        if self
            .inner
            .claim_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Claim already in flight, ignoring");
            return Err(ClaimError::ClaimAlreadyInProgress);
        }
        let guard = FlightGuard(self.inner.clone());

        let context = self
            .inner
            .session
            .context()
            .ok_or(ClaimError::NotAuthenticated)?;
        let key = EngineKey::from(&context);
        if key.wallet.is_none() {
            return Err(ClaimError::WalletNotBound);
        }

        let mut known = self.claim_state_for(&key);
        if known.is_none() {
            self.resync().await?;
            known = self.claim_state_for(&key);
        }
        let Some(current) = known else {
            return Err(ClaimError::EligibilityUnknown);
        };
        if !current.can_claim {
            return Err(ClaimError::NotYetEligible {
                next_claim_time: current.next_claim_time,
            });
        }

        info!(identity_id = %key.identity_id, "Submitting claim");
        let engine = self.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            let result = engine.inner.backend.claim(&context.access_token).await;
            engine.apply_claim_result(&key, result)
        });

        task.await
            .unwrap_or_else(|e| Err(ClaimError::Internal(format!("claim task failed: {e}"))))
    }

    fn apply_claim_result(
        &self,
        key: &EngineKey,
        result: Result<(), ClaimRejection>,
    ) -> Result<Claimed, ClaimError> {
        let session = &self.inner.session;
        let now = self.inner.clock.now();

        match result {
            Ok(()) => {
                let claimed = Claimed {
                    claimed_at: now,
                    next_claim_time: now
                        .checked_add_signed(self.inner.cooldown)
                        .unwrap_or(DateTime::<Utc>::MAX_UTC),
                };
                let applied = self.inner.state.send_if_modified(|state| {
                    if session.generation() != key.generation || state.key.as_ref() != Some(key) {
                        return false;
                    }
                    let balances = state
                        .view
                        .claim_state
                        .take()
                        .map(|s| s.balances)
                        .unwrap_or_default();
                    state.view.claim_state = Some(ClaimState {
                        can_claim: false,
                        next_claim_time: claimed.next_claim_time,
                        balances,
                    });
                    state.view.optimistic = true;
                    state.claimed = Some(claimed.clone());
                    state.revision += 1;
                    true
                });

                if applied {
                    info!(
                        identity_id = %key.identity_id,
                        next_claim_time = %claimed.next_claim_time,
                        "Claim accepted"
                    );
                } else {
                    info!(identity_id = %key.identity_id, "Claim accepted for a session that has ended");
                }
                Ok(claimed)
            }
            Err(ClaimRejection::TooEarly {
                next_claim_time: Some(next_claim_time),
            }) => {
                self.inner.state.send_if_modified(|state| {
                    if session.generation() != key.generation || state.key.as_ref() != Some(key) {
                        return false;
                    }
                    let balances = state
                        .view
                        .claim_state
                        .take()
                        .map(|s| s.balances)
                        .unwrap_or_default();
                    state.view.claim_state = Some(ClaimState {
                        can_claim: false,
                        next_claim_time,
                        balances,
                    });
                    state.view.synced_at = Some(now);
                    state.view.optimistic = false;
                    state.revision += 1;
                    true
                });
                info!(identity_id = %key.identity_id, next_claim_time = %next_claim_time, "Claim too early");
                Err(ClaimError::TooEarly {
                    next_claim_time: Some(next_claim_time),
                })
            }
            Err(ClaimRejection::TooEarly {
                next_claim_time: None,
            }) => {
                info!(identity_id = %key.identity_id, "Claim too early, resyncing");
                self.spawn_resync();
                Err(ClaimError::TooEarly {
                    next_claim_time: None,
                })
            }
            Err(ClaimRejection::Refused { code, message }) => {
                warn!(identity_id = %key.identity_id, code = %code, "Claim refused");
                self.spawn_resync();
                Err(ClaimError::Rejected { code, message })
            }
            Err(ClaimRejection::Transport(e)) => {
                warn!(identity_id = %key.identity_id, error = %e, "Claim request failed");
                self.spawn_resync();
                Err(ClaimError::Transport(e))
            }
        }
    }
}
