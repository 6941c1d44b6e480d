// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transport errors and structured error bodies shared by the provider and
//! faucet clients.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use serde::Deserialize;

/// Failure that carries no machine-readable reason.
///
/// Unreachable hosts and non-2xx responses without a structured body all end
/// up here; callers may retry them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Unreachable(String),

    #[error("unexpected HTTP status {status}")]
    Status { status: u16 },

    #[error("response was invalid: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    pub fn status(status: StatusCode) -> Self {
        TransportError::Status {
            status: status.as_u16(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            TransportError::InvalidResponse(e.to_string())
        } else {
            TransportError::Unreachable(e.to_string())
        }
    }
}

/// Error body returned by the faucet backend and the identity provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default, alias = "error")]
    pub error_code: Option<String>,
    #[serde(default, alias = "error_description")]
    pub message: Option<String>,
    #[serde(default)]
    pub next_claim_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub address: Option<String>,
    /// Field validation errors keyed by field name.
    #[serde(default)]
    pub errors: BTreeMap<String, String>,
}

impl ErrorBody {
    /// Whether the body carries anything a caller can act on.
    pub fn is_structured(&self) -> bool {
        self.error_code.is_some() || !self.errors.is_empty()
    }

    pub fn code(&self) -> &str {
        self.error_code.as_deref().unwrap_or("")
    }
}

/// Read a non-2xx response body, returning it only when it is structured.
pub async fn structured_error(response: Response) -> Option<ErrorBody> {
    let bytes = response.bytes().await.ok()?;
    let body: ErrorBody = serde_json::from_slice(&bytes).ok()?;
    body.is_structured().then_some(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_accepts_oauth_style_fields() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"error":"invalid_grant","error_description":"used"}"#).unwrap();
        assert!(body.is_structured());
        assert_eq!(body.code(), "invalid_grant");
        assert_eq!(body.message.as_deref(), Some("used"));
    }

    #[test]
    fn error_body_without_code_or_fields_is_unstructured() {
        let body: ErrorBody = serde_json::from_str(r#"{"message":"oops"}"#).unwrap();
        assert!(!body.is_structured());

        let body: ErrorBody =
            serde_json::from_str(r#"{"errors":{"address":"already used"}}"#).unwrap();
        assert!(body.is_structured());
    }
}
