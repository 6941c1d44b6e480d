// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Scripted collaborators for unit tests.
//!
//! Both fakes count calls and can be held open with a [`Notify`] so tests
//! can line up concurrent callers against one in-flight request.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeDelta;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::clock::manual::ManualClock;
use crate::clock::Clock;
use crate::config::{Config, DEFAULT_REDIRECT_URI, DEFAULT_SCOPE};
use crate::models::{ClaimState, Identity, IdentityPatch, WalletAddress};
use crate::providers::{
    BindFailure, BindReply, ClaimRejection, FaucetBackend, IdentityProvider, ProviderProfile,
    RefreshFailure, TokenGrant, TransportError,
};
use crate::state::AppState;
use crate::storage::{CredentialRecord, MemoryStore};

pub const TEST_WALLET: &str = "0x742d35cc6634c0532925a3b844bc9e7595f4ab12";

/// Front end origin on the bridge's allow-list.
pub const TEST_FRONTEND_ORIGIN: &str = "http://localhost:3000";

fn unscripted() -> TransportError {
    TransportError::Unreachable("no scripted response".into())
}

/// Holds the next call open until the test releases it.
#[derive(Default)]
struct Hold {
    gate: Mutex<Option<Arc<Notify>>>,
    entered: Notify,
}

impl Hold {
    fn arm(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    async fn pass(&self) {
        self.entered.notify_one();
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

// =============================================================================
// Identity Provider
// =============================================================================

#[derive(Default)]
pub struct ScriptedProvider {
    refreshes: Mutex<VecDeque<Result<TokenGrant, RefreshFailure>>>,
    refresh_calls: AtomicUsize,
    last_refresh_token: Mutex<Option<String>>,
    refresh_hold: Hold,
    profile: Mutex<Option<ProviderProfile>>,
}

impl ScriptedProvider {
    pub fn push_refresh(&self, result: Result<TokenGrant, RefreshFailure>) {
        self.refreshes.lock().unwrap().push_back(result);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn last_refresh_token(&self) -> Option<String> {
        self.last_refresh_token.lock().unwrap().clone()
    }

    /// Block refresh calls until the returned handle is notified.
    pub fn hold_refresh(&self) -> Arc<Notify> {
        self.refresh_hold.arm()
    }

    pub async fn wait_for_refresh_call(&self) {
        self.refresh_hold.entered.notified().await;
    }

    pub fn set_profile(&self, profile: ProviderProfile) {
        *self.profile.lock().unwrap() = Some(profile);
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshFailure> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_refresh_token.lock().unwrap() = Some(refresh_token.to_string());
        self.refresh_hold.pass().await;

        let next = self.refreshes.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(RefreshFailure::Transport(unscripted())))
    }

    async fn fetch_profile(
        &self,
        _access_token: &str,
    ) -> Result<Option<ProviderProfile>, TransportError> {
        Ok(self.profile.lock().unwrap().clone())
    }
}

// =============================================================================
// Faucet Backend
// =============================================================================

pub struct ScriptedBackend {
    eligibility: Mutex<Result<ClaimState, TransportError>>,
    eligibility_calls: AtomicUsize,
    claims: Mutex<VecDeque<Result<(), ClaimRejection>>>,
    claim_calls: AtomicUsize,
    claim_hold: Hold,
    binds: Mutex<VecDeque<Result<BindReply, BindFailure>>>,
    bind_calls: AtomicUsize,
    bound: Mutex<Vec<WalletAddress>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            eligibility: Mutex::new(Err(unscripted())),
            eligibility_calls: AtomicUsize::new(0),
            claims: Mutex::new(VecDeque::new()),
            claim_calls: AtomicUsize::new(0),
            claim_hold: Hold::default(),
            binds: Mutex::new(VecDeque::new()),
            bind_calls: AtomicUsize::new(0),
            bound: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedBackend {
    /// Answer every eligibility request with `state` from now on.
    pub fn set_eligibility(&self, state: ClaimState) {
        *self.eligibility.lock().unwrap() = Ok(state);
    }

    pub fn fail_eligibility(&self, error: TransportError) {
        *self.eligibility.lock().unwrap() = Err(error);
    }

    pub fn eligibility_calls(&self) -> usize {
        self.eligibility_calls.load(Ordering::SeqCst)
    }

    /// Queue a claim answer; unqueued claims succeed.
    pub fn push_claim(&self, result: Result<(), ClaimRejection>) {
        self.claims.lock().unwrap().push_back(result);
    }

    pub fn claim_calls(&self) -> usize {
        self.claim_calls.load(Ordering::SeqCst)
    }

    pub fn hold_claim(&self) -> Arc<Notify> {
        self.claim_hold.arm()
    }

    pub async fn wait_for_claim_call(&self) {
        self.claim_hold.entered.notified().await;
    }

    /// Queue a bind answer; unqueued binds succeed.
    pub fn push_bind(&self, result: Result<BindReply, BindFailure>) {
        self.binds.lock().unwrap().push_back(result);
    }

    pub fn bind_calls(&self) -> usize {
        self.bind_calls.load(Ordering::SeqCst)
    }

    pub fn bound_addresses(&self) -> Vec<WalletAddress> {
        self.bound.lock().unwrap().clone()
    }
}

#[async_trait]
impl FaucetBackend for ScriptedBackend {
    async fn eligibility(&self, _access_token: &str) -> Result<ClaimState, TransportError> {
        self.eligibility_calls.fetch_add(1, Ordering::SeqCst);
        self.eligibility.lock().unwrap().clone()
    }

    async fn claim(&self, _access_token: &str) -> Result<(), ClaimRejection> {
        self.claim_calls.fetch_add(1, Ordering::SeqCst);
        self.claim_hold.pass().await;

        let next = self.claims.lock().unwrap().pop_front();
        next.unwrap_or(Ok(()))
    }

    async fn bind_wallet(
        &self,
        _access_token: &str,
        address: &WalletAddress,
    ) -> Result<BindReply, BindFailure> {
        self.bind_calls.fetch_add(1, Ordering::SeqCst);
        self.bound.lock().unwrap().push(address.clone());

        let next = self.binds.lock().unwrap().pop_front();
        next.unwrap_or(Ok(BindReply::Bound))
    }
}

// =============================================================================
// Bridge State
// =============================================================================

pub fn test_config() -> Config {
    Config {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        data_dir: std::env::temp_dir(),
        partition: "test".into(),
        authorize_url: Url::parse("https://idp.example.com/authorize").unwrap(),
        token_url: Url::parse("https://idp.example.com/token").unwrap(),
        profile_url: None,
        client_id: Some("faucet-web".into()),
        redirect_uri: DEFAULT_REDIRECT_URI.into(),
        scope: DEFAULT_SCOPE.into(),
        allowed_origins: vec![
            "http://127.0.0.1:8787".into(),
            TEST_FRONTEND_ORIGIN.into(),
        ],
        faucet_url: Url::parse("https://faucet.example.com").unwrap(),
        claim_cooldown: TimeDelta::hours(24),
        resync_interval: TimeDelta::seconds(60),
        refresh_margin: TimeDelta::minutes(5),
        authorization_ttl: TimeDelta::minutes(10),
        http_timeout: Duration::from_secs(5),
    }
}

/// Bridge state over in-memory storage and scripted collaborators.
pub struct TestApp {
    pub state: AppState,
    pub kv: Arc<MemoryStore>,
    pub provider: Arc<ScriptedProvider>,
    pub backend: Arc<ScriptedBackend>,
    pub clock: Arc<ManualClock>,
    pub shutdown: CancellationToken,
}

impl TestApp {
    /// Must be called inside a Tokio runtime.
    pub fn new() -> Self {
        let kv = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::default());
        let backend = Arc::new(ScriptedBackend::default());
        let clock = Arc::new(ManualClock::at("2026-03-01T12:00:00Z".parse().unwrap()));
        let shutdown = CancellationToken::new();

        let state = AppState::new(
            &test_config(),
            kv.clone(),
            provider.clone(),
            backend.clone(),
            clock.clone(),
            &shutdown,
        );
        state.session.bootstrap();

        Self {
            state,
            kv,
            provider,
            backend,
            clock,
            shutdown,
        }
    }

    /// Adopt a session for `user_1`, optionally with the test wallet bound.
    pub fn sign_in(&self, with_wallet: bool) {
        let record = CredentialRecord::new(
            "access-1",
            "refresh-1",
            self.clock.now() + TimeDelta::hours(1),
            "user_1",
        )
        .unwrap();
        self.state.session.adopt(record, Identity::bare("user_1"));
        if with_wallet {
            self.state
                .session
                .update_identity(IdentityPatch::wallet(WalletAddress::parse(TEST_WALLET).unwrap()))
                .unwrap();
        }
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
