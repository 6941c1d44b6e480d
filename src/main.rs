// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use faucet_session::{
    api::router,
    clock::system_clock,
    config::{Config, LogFormat, DEFAULT_LOG_FILTER},
    keeper::SessionKeeper,
    providers::{HttpFaucetBackend, HttpIdentityProvider},
    state::AppState,
    storage::RedbStore,
};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match LogFormat::from_env() {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::from_env()?;
    info!(
        bind_addr = %config.bind_addr,
        data_dir = %config.data_dir.display(),
        partition = %config.partition,
        allowed_origins = ?config.allowed_origins,
        "Starting faucet session bridge"
    );

    let kv = Arc::new(RedbStore::open(&config.database_path())?);
    let provider = Arc::new(HttpIdentityProvider::new(
        config.token_url.clone(),
        config.profile_url.clone(),
        config.client_id.clone(),
        config.http_timeout,
    )?);
    let backend = Arc::new(HttpFaucetBackend::new(&config.faucet_url, config.http_timeout)?);

    let shutdown = CancellationToken::new();
    let state = AppState::new(&config, kv, provider, backend, system_clock(), &shutdown);

    let status = state.session.bootstrap();
    info!(status = ?status, "Session bootstrapped");

    let keeper = SessionKeeper::new(state.session.clone(), state.engine.clone());
    let keeper_handle = tokio::spawn(keeper.run(shutdown.child_token()));

    let app = router(state);
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "Listening (docs at /docs)");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = keeper_handle.await {
        warn!(error = %e, "Session keeper task failed");
    }
    Ok(())
}
