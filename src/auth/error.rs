// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorization flow and session errors.

use crate::providers::TransportError;
use crate::storage::StoreError;

/// Failure of the redirect-based authorization flow.
///
/// None of these are retried automatically; the user restarts the flow.
#[derive(Debug, thiserror::Error)]
pub enum AuthFlowError {
    /// Callback state does not match the most recent unconsumed nonce
    #[error("authorization state does not match the pending request")]
    StateMismatch,

    /// The pending request outlived its time to live
    #[error("authorization request has expired")]
    AuthorizationExpired,

    /// Callback lacks one or more credential fields
    #[error("authorization callback is missing: {0}")]
    IncompleteCallback(String),

    /// The delivered credentials had already expired on arrival
    #[error("authorization callback carries expired credentials")]
    ExpiredCredentials,

    /// The provider reported an error instead of credentials
    #[error("identity provider denied authorization: {0}")]
    ProviderDenied(String),

    /// No randomness available for a nonce
    #[error("unable to generate authorization nonce")]
    NonceUnavailable,

    #[error("credential storage failed: {0}")]
    Storage(#[from] StoreError),
}

impl AuthFlowError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthFlowError::StateMismatch => "state_mismatch",
            AuthFlowError::AuthorizationExpired => "authorization_expired",
            AuthFlowError::IncompleteCallback(_) => "incomplete_callback",
            AuthFlowError::ExpiredCredentials => "expired_credentials",
            AuthFlowError::ProviderDenied(_) => "provider_denied",
            AuthFlowError::NonceUnavailable => "nonce_unavailable",
            AuthFlowError::Storage(_) => "storage_error",
        }
    }

    /// Forged, stale or malformed callbacks.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            AuthFlowError::StateMismatch
                | AuthFlowError::AuthorizationExpired
                | AuthFlowError::IncompleteCallback(_)
                | AuthFlowError::ExpiredCredentials
        )
    }
}

/// Failure of a session operation.
///
/// Cloneable so that every caller waiting on one serialized refresh gets the
/// same outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("no authenticated session")]
    NotAuthenticated,

    /// Provider refused the refresh token; the session has been cleared
    #[error("credential refresh was rejected: {0}")]
    RefreshRejected(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("credential storage failed: {0}")]
    Storage(String),

    #[error("internal session error: {0}")]
    Internal(String),
}

impl SessionError {
    pub fn error_code(&self) -> &'static str {
        match self {
            SessionError::NotAuthenticated => "not_authenticated",
            SessionError::RefreshRejected(_) => "refresh_rejected",
            SessionError::Transport(_) => "transport_error",
            SessionError::Storage(_) => "storage_error",
            SessionError::Internal(_) => "internal_error",
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        SessionError::Storage(e.to_string())
    }
}
