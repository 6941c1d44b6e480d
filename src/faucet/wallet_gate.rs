// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet binding gate.
//!
//! Claim-capable views only render once the identity has a payout address.
//! Until then the gate renders a binding form, and [`WalletBinder`] performs
//! the bind:
//!
//! 1. Validate the address lexically. Malformed input never reaches the
//!    network.
//! 2. Refuse locally when the identity already holds a different address.
//! 3. Ask the faucet to bind. An "already bound" answer counts as success
//!    only when it names the submitted address, or, when it names none, the
//!    identity provider's profile does.
//! 4. Record the address on the identity, which unblocks the wrapped view.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::error::BindError;
use crate::auth::{ProtectedView, SessionManager};
use crate::models::{Identity, IdentityPatch, WalletAddress, ADDRESS_HEX_LEN, ADDRESS_PREFIX};
use crate::providers::{BindFailure, BindReply, FaucetBackend};

/// Form shown instead of a claim control while no wallet is bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct BindingForm {
    pub identity_id: String,
    /// Lexical rule the address must satisfy.
    pub address_pattern: String,
}

impl BindingForm {
    fn for_identity(identity: &Identity) -> Self {
        Self {
            identity_id: identity.identity_id.clone(),
            address_pattern: format!("^{ADDRESS_PREFIX}[0-9a-fA-F]{{{ADDRESS_HEX_LEN}}}$"),
        }
    }
}

/// What the wallet binding gate produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "wallet", rename_all = "snake_case")]
pub enum WalletGated<T> {
    BindingRequired { form: BindingForm },
    Ready { view: T },
}

/// Decorator that requires a bound wallet before rendering `V`.
pub struct WalletBindingGate<V> {
    view: V,
}

impl<V: ProtectedView> WalletBindingGate<V> {
    pub fn new(view: V) -> Self {
        Self { view }
    }
}

impl<V: ProtectedView> ProtectedView for WalletBindingGate<V> {
    type Output = WalletGated<V::Output>;

    fn render(&self, identity: &Identity) -> Self::Output {
        if identity.has_wallet() {
            WalletGated::Ready {
                view: self.view.render(identity),
            }
        } else {
            WalletGated::BindingRequired {
                form: BindingForm::for_identity(identity),
            }
        }
    }
}

/// Result of a successful bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct BindOutcome {
    pub address: WalletAddress,
    /// The faucet already had this address on record.
    pub already_bound: bool,
}

/// Binds a payout address to the current identity.
#[derive(Clone)]
pub struct WalletBinder {
    session: SessionManager,
    backend: Arc<dyn FaucetBackend>,
}

impl WalletBinder {
    pub fn new(session: SessionManager, backend: Arc<dyn FaucetBackend>) -> Self {
        Self { session, backend }
    }

    pub async fn bind_wallet(&self, input: &str) -> Result<BindOutcome, BindError> {
        let address = WalletAddress::parse(input).map_err(|_| BindError::InvalidAddressFormat)?;

        let context = self.session.context().ok_or(BindError::NotAuthenticated)?;
        if let Some(bound) = &context.identity.wallet_address {
            if *bound != address {
                warn!(
                    identity_id = %context.identity.identity_id,
                    bound = %bound,
                    requested = %address,
                    "Refusing to rebind wallet"
                );
                return Err(BindError::Conflict {
                    bound: Some(bound.clone()),
                });
            }
        }

        let reply = self
            .backend
            .bind_wallet(&context.access_token, &address)
            .await
            .map_err(|e| match e {
                BindFailure::Validation { field, message } => {
                    BindError::Validation { field, message }
                }
                BindFailure::Transport(e) => BindError::Transport(e),
            })?;

        let already_bound = match reply {
            BindReply::Bound => false,
            BindReply::AlreadyBound { address: Some(bound) } if bound == address => true,
            BindReply::AlreadyBound { address: None } => {
                // Local wallet is either unset or equal to `address` here
                if context.identity.wallet_address.is_none() {
                    self.reconcile_unnamed_binding(&address).await?;
                }
                true
            }
            BindReply::AlreadyBound { address: Some(bound) } => {
                warn!(
                    identity_id = %context.identity.identity_id,
                    requested = %address,
                    bound = %bound,
                    "Faucet reports a different bound wallet"
                );
                return Err(BindError::Conflict { bound: Some(bound) });
            }
        };

        let identity = self
            .session
            .update_identity_if(Some(context.generation), IdentityPatch::wallet(address.clone()))?;
        if identity.wallet_address.as_ref() != Some(&address) {
            return Err(BindError::Conflict {
                bound: identity.wallet_address,
            });
        }

        info!(
            identity_id = %identity.identity_id,
            wallet = %address,
            already_bound,
            "Wallet bound"
        );
        Ok(BindOutcome {
            address,
            already_bound,
        })
    }

    /// The faucet has some wallet on record but did not say which. An
    /// earlier bind may have landed without being recorded locally, so ask
    /// the identity provider before calling it a conflict.
    async fn reconcile_unnamed_binding(&self, address: &WalletAddress) -> Result<(), BindError> {
        let identity = self.session.refresh_identity().await?;
        match identity.wallet_address {
            Some(bound) if bound == *address => {
                info!(
                    identity_id = %identity.identity_id,
                    wallet = %address,
                    "Recovered wallet binding from provider profile"
                );
                Ok(())
            }
            bound => {
                warn!(
                    identity_id = %identity.identity_id,
                    requested = %address,
                    bound = ?bound.as_ref().map(WalletAddress::as_str),
                    "Faucet reports an unnamed wallet the profile does not confirm"
                );
                Err(BindError::Conflict { bound })
            }
        }
    }
}
