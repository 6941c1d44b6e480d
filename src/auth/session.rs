// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session manager.
//!
//! ## Lifecycle
//!
//! ```text
//! Bootstrapping ──► Authenticated ──► Refreshing ──► Authenticated
//!       │                 │                 └──────► Anonymous
//!       └──────────► Anonymous ◄── logout ──┘
//! ```
//!
//! The manager is the only writer of the credential record after login.
//! Every adoption or logout bumps a generation counter; results of network
//! calls started under an older generation are dropped on arrival.
//!
//! Store writes happen under a writer lock and before the new state is
//! published, so readers never wait on disk I/O.
//!
//! Refresh is serialized: concurrent callers of [`SessionManager::refresh_if_needed`]
//! share one exchange and observe the same outcome. The exchange runs on
//! its own task so that a caller going away does not abort it halfway
//! through a single-use refresh token.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use super::error::SessionError;
use crate::clock::SharedClock;
use crate::models::{Identity, IdentityPatch, WalletAddress};
use crate::providers::{IdentityProvider, RefreshFailure};
use crate::storage::{fingerprint, CredentialRecord, CredentialStore};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Bootstrapping,
    Authenticated,
    Refreshing,
    Anonymous,
}

impl SessionStatus {
    /// Resolved to a signed-in user (refreshing keeps the identity).
    pub fn is_authenticated(self) -> bool {
        matches!(self, SessionStatus::Authenticated | SessionStatus::Refreshing)
    }
}

/// Outcome of a successful [`SessionManager::refresh_if_needed`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Credentials are outside the safety margin.
    NotNeeded,
    Refreshed,
    /// The session changed while the exchange was in flight; its result was
    /// dropped.
    Superseded,
}

/// Read-only view of the session handed to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub identity: Option<Identity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Everything a caller needs to make an authenticated request.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub generation: u64,
    pub access_token: String,
    pub identity: Identity,
}

/// Internal session state, published on a watch channel.
#[derive(Debug, Clone)]
struct SessionState {
    status: SessionStatus,
    credentials: Option<CredentialRecord>,
    identity: Option<Identity>,
    generation: u64,
}

impl SessionState {
    fn clear(&mut self) {
        self.status = SessionStatus::Anonymous;
        self.credentials = None;
        self.identity = None;
        self.generation += 1;
    }
}

struct SessionInner {
    store: CredentialStore,
    provider: Arc<dyn IdentityProvider>,
    clock: SharedClock,
    refresh_margin: TimeDelta,
    state: watch::Sender<SessionState>,
    /// Held across every store write and the publish that follows it.
    writer: Mutex<()>,
    bootstrapped: AtomicBool,
    refresh_lock: Arc<tokio::sync::Mutex<()>>,
    refresh_epoch: AtomicU64,
    last_refresh: Mutex<Option<Result<RefreshOutcome, SessionError>>>,
}

/// Owned handle to the one session of this process.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(
        store: CredentialStore,
        provider: Arc<dyn IdentityProvider>,
        clock: SharedClock,
        refresh_margin: TimeDelta,
    ) -> Self {
        let (state, _) = watch::channel(SessionState {
            status: SessionStatus::Bootstrapping,
            credentials: None,
            identity: None,
            generation: 0,
        });

        Self {
            inner: Arc::new(SessionInner {
                store,
                provider,
                clock,
                refresh_margin,
                state,
                writer: Mutex::new(()),
                bootstrapped: AtomicBool::new(false),
                refresh_lock: Arc::new(tokio::sync::Mutex::new(())),
                refresh_epoch: AtomicU64::new(0),
                last_refresh: Mutex::new(None),
            }),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn status(&self) -> SessionStatus {
        self.inner.state.borrow().status
    }

    /// The identity snapshot, if signed in. Pure read.
    pub fn current_identity(&self) -> Option<Identity> {
        let state = self.inner.state.borrow();
        if state.status.is_authenticated() {
            state.identity.clone()
        } else {
            None
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.borrow();
        let signed_in = state.status.is_authenticated();
        SessionSnapshot {
            status: state.status,
            identity: state.identity.clone().filter(|_| signed_in),
            expires_at: state
                .credentials
                .as_ref()
                .filter(|_| signed_in)
                .map(CredentialRecord::expires_at),
        }
    }

    /// Token and identity for an authenticated request.
    pub fn context(&self) -> Option<SessionContext> {
        let state = self.inner.state.borrow();
        if !state.status.is_authenticated() {
            return None;
        }
        let credentials = state.credentials.as_ref()?;
        let identity = state.identity.clone()?;
        Some(SessionContext {
            generation: state.generation,
            access_token: credentials.access_token().to_string(),
            identity,
        })
    }

    /// Generation of the current session; changes on adopt and logout.
    pub fn generation(&self) -> u64 {
        self.inner.state.borrow().generation
    }

    /// Wait until bootstrap has resolved the session.
    pub async fn wait_resolved(&self) -> SessionStatus {
        let mut rx = self.inner.state.subscribe();
        let status = match rx
            .wait_for(|s| s.status != SessionStatus::Bootstrapping)
            .await
        {
            Ok(state) => state.status,
            // Sender lives in `inner`, which we hold
            Err(_) => self.status(),
        };
        status
    }

    fn writer(&self) -> MutexGuard<'_, ()> {
        self.inner
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Resolve the initial session from the credential store.
    ///
    /// Only the first call reads the store; later calls return the current
    /// status.
    pub fn bootstrap(&self) -> SessionStatus {
        if self.inner.bootstrapped.swap(true, Ordering::AcqRel) {
            return self.status();
        }

        let _writer = self.writer();
        let now = self.inner.clock.now();
        let store = &self.inner.store;

        let loaded = match store.load_credentials() {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "Credential store unreadable, starting anonymous");
                None
            }
        };

        let resolved = match loaded {
            Some(record) if !record.is_expired(now) => {
                let identity = store
                    .load_identity()
                    .ok()
                    .flatten()
                    .filter(|identity| identity.identity_id == record.identity_id())
                    .unwrap_or_else(|| Identity::bare(record.identity_id()));
                Some((record, identity))
            }
            Some(record) => {
                info!(identity_id = %record.identity_id(), expired_at = %record.expires_at(), "Stored credentials expired");
                if let Err(e) = store.clear_session() {
                    warn!(error = %e, "Failed to erase expired credentials");
                }
                None
            }
            None => None,
        };

        self.inner.state.send_if_modified(|state| {
            // A callback may have been adopted before bootstrap ran
            if state.status != SessionStatus::Bootstrapping {
                return false;
            }
            match resolved {
                Some((record, identity)) => {
                    info!(
                        identity_id = %record.identity_id(),
                        token = %fingerprint(record.access_token()),
                        expires_at = %record.expires_at(),
                        "Session bootstrapped as authenticated"
                    );
                    state.status = SessionStatus::Authenticated;
                    state.credentials = Some(record);
                    state.identity = Some(identity);
                }
                None => {
                    info!("Session bootstrapped as anonymous");
                    state.status = SessionStatus::Anonymous;
                }
            }
            true
        });

        self.status()
    }

    /// Take over a freshly authorized session.
    ///
    /// The caller has already persisted `record`.
    pub fn adopt(&self, record: CredentialRecord, mut identity: Identity) {
        identity.identity_id = record.identity_id().to_string();
        let _writer = self.writer();
        if let Err(e) = self.inner.store.save_identity(&identity) {
            warn!(error = %e, "Failed to persist identity snapshot");
        }

        self.inner.state.send_modify(|state| {
            info!(
                identity_id = %record.identity_id(),
                token = %fingerprint(record.access_token()),
                expires_at = %record.expires_at(),
                "Adopted new session"
            );
            state.status = SessionStatus::Authenticated;
            state.credentials = Some(record);
            state.identity = Some(identity);
            state.generation += 1;
        });
    }

    /// Drop the session. Purely local; cannot fail.
    pub fn logout(&self) {
        let _writer = self.writer();
        if let Err(e) = self.inner.store.clear_session() {
            warn!(error = %e, "Failed to erase credentials during logout");
        }
        self.inner.state.send_modify(|state| {
            let identity_id = state.identity.as_ref().map(|i| i.identity_id.clone());
            state.clear();
            info!(identity_id = ?identity_id, "Logged out");
        });
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Merge non-credential fields into the identity.
    ///
    /// The wallet address is write-once: a patch carrying a different
    /// address than the bound one leaves the bound one in place.
    pub fn update_identity(&self, patch: IdentityPatch) -> Result<Identity, SessionError> {
        self.update_identity_if(None, patch)
    }

    /// Like [`Self::update_identity`], but only while the session is still
    /// the one identified by `generation`.
    pub(crate) fn update_identity_if(
        &self,
        generation: Option<u64>,
        patch: IdentityPatch,
    ) -> Result<Identity, SessionError> {
        let _writer = self.writer();
        let current = {
            let state = self.inner.state.borrow();
            let same_session = generation.is_none_or(|g| g == state.generation);
            state
                .identity
                .clone()
                .filter(|_| same_session && state.status.is_authenticated())
        };
        let mut identity = current.ok_or(SessionError::NotAuthenticated)?;

        if !merge_identity(&mut identity, patch) {
            return Ok(identity);
        }
        if let Err(e) = self.inner.store.save_identity(&identity) {
            warn!(error = %e, "Failed to persist identity snapshot");
        }
        self.inner.state.send_modify(|state| {
            state.identity = Some(identity.clone());
        });

        Ok(identity)
    }

    /// Re-read the profile from the identity provider and merge it.
    pub async fn refresh_identity(&self) -> Result<Identity, SessionError> {
        let context = self.context().ok_or(SessionError::NotAuthenticated)?;
        let Some(profile) = self
            .inner
            .provider
            .fetch_profile(&context.access_token)
            .await?
        else {
            return Ok(context.identity);
        };

        if profile
            .identity_id
            .as_deref()
            .is_some_and(|id| id != context.identity.identity_id)
        {
            warn!(
                identity_id = %context.identity.identity_id,
                "Profile belongs to a different identity, ignoring it"
            );
            return Ok(context.identity);
        }

        let patch = IdentityPatch {
            email: profile.email,
            display_name: profile.display_name,
            timezone: profile.timezone,
            wallet_address: profile
                .wallet_address
                .as_deref()
                .and_then(|raw| WalletAddress::parse(raw).ok()),
        };
        self.update_identity_if(Some(context.generation), patch)
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Exchange the refresh token when expiry is within the safety margin.
    ///
    /// A rejected exchange clears the store and leaves the session
    /// anonymous.
    pub async fn refresh_if_needed(&self) -> Result<RefreshOutcome, SessionError> {
        let observed = self.inner.refresh_epoch.load(Ordering::Acquire);
        let guard = self.inner.refresh_lock.clone().lock_owned().await;

        if self.inner.refresh_epoch.load(Ordering::Acquire) != observed {
            // Another caller's exchange finished while we waited
            if let Some(outcome) = self.last_refresh_outcome() {
                return outcome;
            }
        }

        let manager = self.clone();
        let task = tokio::spawn(async move {
            let outcome = manager.refresh_exclusive().await;
            manager.record_refresh(outcome.clone());
            drop(guard);
            outcome
        });

        task.await
            .unwrap_or_else(|e| Err(SessionError::Internal(format!("refresh task failed: {e}"))))
    }

    fn last_refresh_outcome(&self) -> Option<Result<RefreshOutcome, SessionError>> {
        self.inner
            .last_refresh
            .lock()
            .ok()
            .and_then(|last| last.clone())
    }

    fn record_refresh(&self, outcome: Result<RefreshOutcome, SessionError>) {
        if let Ok(mut last) = self.inner.last_refresh.lock() {
            *last = Some(outcome);
        }
        self.inner.refresh_epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Runs with the refresh lock held.
    async fn refresh_exclusive(&self) -> Result<RefreshOutcome, SessionError> {
        let (generation, credentials) = {
            let state = self.inner.state.borrow();
            if !state.status.is_authenticated() {
                return Err(SessionError::NotAuthenticated);
            }
            (state.generation, state.credentials.clone())
        };
        let credentials = credentials.ok_or(SessionError::NotAuthenticated)?;

        let now = self.inner.clock.now();
        if credentials.expires_at() - now > self.inner.refresh_margin {
            return Ok(RefreshOutcome::NotNeeded);
        }

        self.set_status(generation, SessionStatus::Refreshing);
        debug!(identity_id = %credentials.identity_id(), "Refreshing credentials");

        let result = self
            .inner
            .provider
            .refresh(credentials.refresh_token())
            .await;

        match result {
            Ok(grant) => {
                let refresh_token = grant
                    .refresh_token
                    .unwrap_or_else(|| credentials.refresh_token().to_string());
                let record = match CredentialRecord::new(
                    grant.access_token,
                    refresh_token,
                    grant.expires_at,
                    credentials.identity_id(),
                ) {
                    Ok(record) => record,
                    Err(e) => {
                        self.set_status(generation, SessionStatus::Authenticated);
                        return Err(SessionError::Transport(
                            crate::providers::TransportError::InvalidResponse(e.to_string()),
                        ));
                    }
                };
                self.install_refreshed(generation, record)
            }
            Err(RefreshFailure::Rejected(reason)) => {
                warn!(identity_id = %credentials.identity_id(), reason = %reason, "Refresh rejected, clearing session");
                self.fail_closed(generation);
                Err(SessionError::RefreshRejected(reason))
            }
            Err(RefreshFailure::Transport(e)) => {
                if credentials.is_expired(self.inner.clock.now()) {
                    warn!(error = %e, "Refresh unreachable and credentials expired, clearing session");
                    self.fail_closed(generation);
                } else {
                    warn!(error = %e, "Refresh failed, keeping unexpired credentials");
                    self.set_status(generation, SessionStatus::Authenticated);
                }
                Err(SessionError::Transport(e))
            }
        }
    }

    /// Persist and publish refreshed credentials unless the session moved on.
    fn install_refreshed(
        &self,
        generation: u64,
        record: CredentialRecord,
    ) -> Result<RefreshOutcome, SessionError> {
        let _writer = self.writer();
        {
            let state = self.inner.state.borrow();
            if state.generation != generation || !state.status.is_authenticated() {
                info!("Session changed during refresh, discarding new credentials");
                return Ok(RefreshOutcome::Superseded);
            }
        }

        let outcome = match self.inner.store.save_credentials(&record) {
            Ok(()) => Ok(RefreshOutcome::Refreshed),
            Err(e) => {
                error!(error = %e, "Failed to persist refreshed credentials");
                Err(SessionError::from(e))
            }
        };
        info!(
            identity_id = %record.identity_id(),
            token = %fingerprint(record.access_token()),
            expires_at = %record.expires_at(),
            "Credentials refreshed"
        );
        self.inner.state.send_modify(|state| {
            state.status = SessionStatus::Authenticated;
            state.credentials = Some(record);
        });

        outcome
    }

    fn fail_closed(&self, generation: u64) {
        let _writer = self.writer();
        if self.inner.state.borrow().generation != generation {
            return;
        }
        if let Err(e) = self.inner.store.clear_session() {
            error!(error = %e, "Failed to erase rejected credentials");
        }
        self.inner.state.send_modify(SessionState::clear);
    }

    fn set_status(&self, generation: u64, status: SessionStatus) {
        self.inner.state.send_if_modified(|state| {
            if state.generation != generation || state.status == status {
                return false;
            }
            state.status = status;
            true
        });
    }
}

/// Apply a patch; returns whether anything changed.
fn merge_identity(identity: &mut Identity, patch: IdentityPatch) -> bool {
    let mut changed = false;

    if let Some(email) = patch.email.filter(|v| Some(v) != identity.email.as_ref()) {
        identity.email = Some(email);
        changed = true;
    }
    if let Some(name) = patch
        .display_name
        .filter(|v| Some(v) != identity.display_name.as_ref())
    {
        identity.display_name = Some(name);
        changed = true;
    }
    if let Some(tz) = patch.timezone.filter(|v| Some(v) != identity.timezone.as_ref()) {
        identity.timezone = Some(tz);
        changed = true;
    }
    if let Some(address) = patch.wallet_address {
        match &identity.wallet_address {
            None => {
                info!(identity_id = %identity.identity_id, wallet = %address, "Wallet bound to identity");
                identity.wallet_address = Some(address);
                changed = true;
            }
            Some(bound) if *bound != address => {
                warn!(
                    identity_id = %identity.identity_id,
                    bound = %bound,
                    ignored = %address,
                    "Ignoring attempt to rebind wallet"
                );
            }
            Some(_) => {}
        }
    }

    changed
}
