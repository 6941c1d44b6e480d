// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::api::guard::BridgeGuard;
use crate::auth::{AuthorizationFlow, SessionManager};
use crate::clock::SharedClock;
use crate::config::Config;
use crate::faucet::{ClaimEngine, Countdown, CountdownProjector, WalletBinder};
use crate::providers::{FaucetBackend, IdentityProvider};
use crate::storage::{CredentialStore, KeyValueStore};

/// Handles shared by every bridge route.
#[derive(Clone)]
pub struct AppState {
    pub session: SessionManager,
    pub flow: Arc<AuthorizationFlow>,
    pub engine: ClaimEngine,
    pub binder: WalletBinder,
    pub countdown: watch::Receiver<Option<Countdown>>,
    pub guard: BridgeGuard,
    pub scope: String,
    pub redirect_uri: String,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Wire the session core together and start the countdown task.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        config: &Config,
        kv: Arc<dyn KeyValueStore>,
        provider: Arc<dyn IdentityProvider>,
        backend: Arc<dyn FaucetBackend>,
        clock: SharedClock,
        shutdown: &CancellationToken,
    ) -> Self {
        let store = CredentialStore::new(kv, config.partition.clone());
        let session = SessionManager::new(
            store.clone(),
            provider,
            clock.clone(),
            config.refresh_margin,
        );
        let flow = AuthorizationFlow::new(
            store,
            session.clone(),
            config.authorize_url.clone(),
            config.client_id.clone(),
            config.authorization_ttl,
            clock.clone(),
        );
        let engine = ClaimEngine::new(
            session.clone(),
            backend.clone(),
            clock.clone(),
            config.claim_cooldown,
            config.resync_interval,
        );
        let binder = WalletBinder::new(session.clone(), backend);
        let countdown = CountdownProjector::spawn(engine.clone(), clock, shutdown.child_token());

        Self {
            session,
            flow: Arc::new(flow),
            engine,
            binder,
            countdown,
            guard: BridgeGuard::new(&config.allowed_origins, config.bind_addr),
            scope: config.scope.clone(),
            redirect_uri: config.redirect_uri.clone(),
            data_dir: config.data_dir.clone(),
        }
    }
}
