// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet binding and claim errors.

use chrono::{DateTime, Utc};

use crate::auth::SessionError;
use crate::models::WalletAddress;
use crate::providers::TransportError;

/// Failure of [`super::WalletBinder::bind_wallet`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    /// Rejected locally; no request was made
    #[error("wallet address must be `0x` followed by 40 hex characters")]
    InvalidAddressFormat,

    #[error("no authenticated session")]
    NotAuthenticated,

    /// The identity already has a different address
    #[error("identity is already bound to another address")]
    Conflict { bound: Option<WalletAddress> },

    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl BindError {
    pub fn error_code(&self) -> &'static str {
        match self {
            BindError::InvalidAddressFormat => "invalid_address_format",
            BindError::NotAuthenticated => "not_authenticated",
            BindError::Conflict { .. } => "wallet_conflict",
            BindError::Validation { .. } => "validation_error",
            BindError::Transport(_) => "transport_error",
            BindError::Session(e) => e.error_code(),
        }
    }
}

/// Failure of [`super::ClaimEngine::claim`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimError {
    #[error("no authenticated session")]
    NotAuthenticated,

    #[error("no wallet bound to this identity")]
    WalletNotBound,

    /// Another claim for this identity has not finished
    #[error("a claim is already in progress")]
    ClaimAlreadyInProgress,

    /// Last synced state says the cooldown is running
    #[error("not eligible to claim until {next_claim_time}")]
    NotYetEligible { next_claim_time: DateTime<Utc> },

    #[error("eligibility could not be determined")]
    EligibilityUnknown,

    /// The faucet refused the claim because the cooldown has not elapsed
    #[error("claim was too early")]
    TooEarly {
        next_claim_time: Option<DateTime<Utc>>,
    },

    #[error("claim rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("internal claim error: {0}")]
    Internal(String),
}

impl ClaimError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ClaimError::NotAuthenticated => "not_authenticated",
            ClaimError::WalletNotBound => "wallet_not_bound",
            ClaimError::ClaimAlreadyInProgress => "claim_in_progress",
            ClaimError::NotYetEligible { .. } => "not_yet_eligible",
            ClaimError::EligibilityUnknown => "eligibility_unknown",
            ClaimError::TooEarly { .. } => "too_early",
            ClaimError::Rejected { .. } => "claim_rejected",
            ClaimError::Transport(_) => "transport_error",
            ClaimError::Internal(_) => "internal_error",
        }
    }

    /// Concurrency noise the surface absorbs instead of reporting.
    pub fn is_silent(&self) -> bool {
        matches!(self, ClaimError::ClaimAlreadyInProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_in_progress_is_silent() {
        assert!(ClaimError::ClaimAlreadyInProgress.is_silent());
        assert!(!ClaimError::TooEarly { next_claim_time: None }.is_silent());
        assert!(!ClaimError::Transport(TransportError::Status { status: 502 }).is_silent());
    }

    #[test]
    fn session_errors_keep_their_code() {
        let err = BindError::from(SessionError::NotAuthenticated);
        assert_eq!(err.error_code(), "not_authenticated");
        assert_eq!(BindError::InvalidAddressFormat.error_code(), "invalid_address_format");
    }
}
