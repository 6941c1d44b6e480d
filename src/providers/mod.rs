// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Remote Collaborators
//!
//! The session core talks to two services:
//!
//! - the **identity provider**, for refresh-token exchange and profile reads
//! - the **faucet backend**, for eligibility, claims and wallet binding
//!
//! Both are traits so the session manager and claim engine can be driven by
//! scripted fakes in tests. The HTTP clients normalize every failure without
//! a structured reason into [`TransportError`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{ClaimState, WalletAddress};

pub mod error;
pub mod faucet;
pub mod identity;

pub use error::TransportError;
pub use faucet::HttpFaucetBackend;
pub use identity::HttpIdentityProvider;

// =============================================================================
// Identity Provider
// =============================================================================

/// Credentials returned by a refresh-token exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Rotated refresh token; `None` keeps the current one.
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Profile attributes reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderProfile {
    pub identity_id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub timezone: Option<String>,
    pub wallet_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshFailure {
    /// The provider refused the refresh token.
    #[error("refresh rejected by provider: {0}")]
    Rejected(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange a refresh token for a new credential grant.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshFailure>;

    /// Fetch the profile behind an access token. `None` when the provider
    /// exposes no profile endpoint.
    async fn fetch_profile(
        &self,
        access_token: &str,
    ) -> Result<Option<ProviderProfile>, TransportError>;
}

// =============================================================================
// Faucet Backend
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimRejection {
    /// Cooldown has not elapsed according to the server.
    #[error("claim attempted before the cooldown elapsed")]
    TooEarly {
        next_claim_time: Option<DateTime<Utc>>,
    },

    #[error("claim refused ({code}): {message}")]
    Refused { code: String, message: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Successful answers to a wallet bind request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindReply {
    Bound,
    /// The identity already has an address; `address` is the bound one when
    /// the server says which.
    AlreadyBound { address: Option<WalletAddress> },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindFailure {
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[async_trait]
pub trait FaucetBackend: Send + Sync {
    async fn eligibility(&self, access_token: &str) -> Result<ClaimState, TransportError>;

    async fn claim(&self, access_token: &str) -> Result<(), ClaimRejection>;

    async fn bind_wallet(
        &self,
        access_token: &str,
        address: &WalletAddress,
    ) -> Result<BindReply, BindFailure>;
}
