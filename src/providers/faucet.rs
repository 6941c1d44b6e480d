// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP client for the faucet backend.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | eligibility | `GET {base}/v1/faucet/eligibility` |
//! | claim | `POST {base}/v1/faucet/claim` |
//! | bind wallet | `POST {base}/v1/wallet/bind` `{"address": ...}` |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use super::error::{structured_error, ErrorBody, TransportError};
use super::{BindFailure, BindReply, ClaimRejection, FaucetBackend};
use crate::models::{ClaimState, WalletAddress};

/// Error codes the backend uses for "cooldown has not elapsed".
const TOO_EARLY_CODES: &[&str] = &["too_early", "cooldown_active"];

/// Error codes the backend uses for "this identity already has an address".
const ALREADY_BOUND_CODES: &[&str] = &["already_bound", "address_already_set"];

#[derive(Debug, Clone)]
pub struct HttpFaucetBackend {
    base_url: String,
    http: Client,
}

impl HttpFaucetBackend {
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Unreachable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl FaucetBackend for HttpFaucetBackend {
    async fn eligibility(&self, access_token: &str) -> Result<ClaimState, TransportError> {
        let response = self
            .http
            .get(self.endpoint("/v1/faucet/eligibility"))
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TransportError::status(response.status()));
        }

        let state: ClaimState = response.json().await?;
        debug!(can_claim = state.can_claim, next_claim_time = %state.next_claim_time, "Fetched eligibility");
        Ok(state)
    }

    async fn claim(&self, access_token: &str) -> Result<(), ClaimRejection> {
        let response = self
            .http
            .post(self.endpoint("/v1/faucet/claim"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(TransportError::from)?;

        let status = response.status();
        if status.is_success() {
            info!("Faucet accepted claim");
            return Ok(());
        }

        Err(classify_claim_failure(status, structured_error(response).await))
    }

    async fn bind_wallet(
        &self,
        access_token: &str,
        address: &WalletAddress,
    ) -> Result<BindReply, BindFailure> {
        let response = self
            .http
            .post(self.endpoint("/v1/wallet/bind"))
            .bearer_auth(access_token)
            .json(&json!({ "address": address }))
            .send()
            .await
            .map_err(TransportError::from)?;

        let status = response.status();
        if status.is_success() {
            return Ok(BindReply::Bound);
        }

        classify_bind_failure(status, structured_error(response).await)
    }
}

fn classify_claim_failure(status: StatusCode, body: Option<ErrorBody>) -> ClaimRejection {
    let Some(body) = body else {
        return ClaimRejection::Transport(TransportError::status(status));
    };

    if TOO_EARLY_CODES.contains(&body.code()) {
        return ClaimRejection::TooEarly {
            next_claim_time: body.next_claim_time,
        };
    }

    ClaimRejection::Refused {
        code: body.code().to_string(),
        message: body
            .message
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
    }
}

fn classify_bind_failure(
    status: StatusCode,
    body: Option<ErrorBody>,
) -> Result<BindReply, BindFailure> {
    let Some(body) = body else {
        if status == StatusCode::CONFLICT {
            return Ok(BindReply::AlreadyBound { address: None });
        }
        return Err(BindFailure::Transport(TransportError::status(status)));
    };

    if status == StatusCode::CONFLICT || ALREADY_BOUND_CODES.contains(&body.code()) {
        let address = body
            .address
            .as_deref()
            .and_then(|raw| WalletAddress::parse(raw).ok());
        return Ok(BindReply::AlreadyBound { address });
    }

    if let Some((field, message)) = body.errors.into_iter().next() {
        return Err(BindFailure::Validation { field, message });
    }

    Err(BindFailure::Validation {
        field: "address".to_string(),
        message: body
            .message
            .unwrap_or_else(|| body.error_code.unwrap_or_default()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const ADDR: &str = "0x742d35cc6634c0532925a3b844bc9e7595f4ab12";

    fn body(code: &str) -> ErrorBody {
        ErrorBody {
            error_code: Some(code.to_string()),
            ..ErrorBody::default()
        }
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let backend = HttpFaucetBackend::new(
            &Url::parse("https://faucet.example.com/api/").unwrap(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            backend.endpoint("/v1/faucet/claim"),
            "https://faucet.example.com/api/v1/faucet/claim"
        );
    }

    #[test]
    fn too_early_carries_authoritative_time() {
        let mut b = body("too_early");
        b.next_claim_time = Some("2026-05-01T12:00:00Z".parse().unwrap());

        match classify_claim_failure(StatusCode::TOO_MANY_REQUESTS, Some(b)) {
            ClaimRejection::TooEarly { next_claim_time } => {
                assert_eq!(next_claim_time.unwrap().to_rfc3339(), "2026-05-01T12:00:00+00:00");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unstructured_claim_failure_is_transport() {
        assert_eq!(
            classify_claim_failure(StatusCode::INTERNAL_SERVER_ERROR, None),
            ClaimRejection::Transport(TransportError::Status { status: 500 })
        );
    }

    #[test]
    fn other_structured_claim_failure_is_refused() {
        let mut b = body("faucet_empty");
        b.message = Some("Faucet is out of funds".into());
        assert_eq!(
            classify_claim_failure(StatusCode::SERVICE_UNAVAILABLE, Some(b)),
            ClaimRejection::Refused {
                code: "faucet_empty".into(),
                message: "Faucet is out of funds".into(),
            }
        );
    }

    #[test]
    fn already_bound_reports_bound_address() {
        let mut b = body("already_bound");
        b.address = Some(ADDR.to_uppercase().replacen("0X", "0x", 1));

        let reply = classify_bind_failure(StatusCode::CONFLICT, Some(b)).unwrap();
        assert_eq!(
            reply,
            BindReply::AlreadyBound {
                address: Some(WalletAddress::parse(ADDR).unwrap())
            }
        );
    }

    #[test]
    fn field_errors_become_validation_failures() {
        let mut errors = BTreeMap::new();
        errors.insert("address".to_string(), "is blocklisted".to_string());
        let b = ErrorBody {
            errors,
            ..ErrorBody::default()
        };

        assert_eq!(
            classify_bind_failure(StatusCode::UNPROCESSABLE_ENTITY, Some(b)),
            Err(BindFailure::Validation {
                field: "address".into(),
                message: "is blocklisted".into(),
            })
        );
    }

    #[test]
    fn unstructured_bind_failure_is_transport() {
        assert_eq!(
            classify_bind_failure(StatusCode::BAD_GATEWAY, None),
            Err(BindFailure::Transport(TransportError::Status { status: 502 }))
        );
    }
}
