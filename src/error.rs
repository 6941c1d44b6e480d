// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{AuthFlowError, SessionError};
use crate::faucet::{BindError, ClaimError};
use crate::providers::TransportError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub error_code: &'static str,
}

/// JSON error body returned by every bridge route.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    error: String,
    error_code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error_code,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "not_authenticated", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.error_code.to_string(),
        });
        (self.status, body).into_response()
    }
}

impl From<TransportError> for ApiError {
    fn from(e: TransportError) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "transport_error", e.to_string())
    }
}

impl From<AuthFlowError> for ApiError {
    fn from(e: AuthFlowError) -> Self {
        let status = match &e {
            AuthFlowError::StateMismatch
            | AuthFlowError::AuthorizationExpired
            | AuthFlowError::IncompleteCallback(_)
            | AuthFlowError::ExpiredCredentials => StatusCode::BAD_REQUEST,
            AuthFlowError::ProviderDenied(_) => StatusCode::FORBIDDEN,
            AuthFlowError::NonceUnavailable | AuthFlowError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.error_code(), e.to_string())
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        let status = match &e {
            SessionError::NotAuthenticated | SessionError::RefreshRejected(_) => {
                StatusCode::UNAUTHORIZED
            }
            SessionError::Transport(_) => StatusCode::BAD_GATEWAY,
            SessionError::Storage(_) | SessionError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.error_code(), e.to_string())
    }
}

impl From<BindError> for ApiError {
    fn from(e: BindError) -> Self {
        let status = match &e {
            BindError::InvalidAddressFormat | BindError::Validation { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            BindError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            BindError::Conflict { .. } => StatusCode::CONFLICT,
            BindError::Transport(_) => StatusCode::BAD_GATEWAY,
            BindError::Session(inner) => return ApiError::from(inner.clone()),
        };
        Self::new(status, e.error_code(), e.to_string())
    }
}

impl From<ClaimError> for ApiError {
    fn from(e: ClaimError) -> Self {
        let status = match &e {
            ClaimError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            ClaimError::WalletNotBound | ClaimError::ClaimAlreadyInProgress => {
                StatusCode::CONFLICT
            }
            ClaimError::NotYetEligible { .. } | ClaimError::TooEarly { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ClaimError::EligibilityUnknown => StatusCode::SERVICE_UNAVAILABLE,
            ClaimError::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ClaimError::Transport(_) => StatusCode::BAD_GATEWAY,
            ClaimError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.error_code(), e.to_string())
    }
}
