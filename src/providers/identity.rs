// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP client for the external identity provider.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use super::error::{structured_error, ErrorBody, TransportError};
use super::{IdentityProvider, ProviderProfile, RefreshFailure, TokenGrant};

#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    token_url: Url,
    profile_url: Option<Url>,
    client_id: Option<String>,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Absolute expiry, epoch seconds.
    #[serde(default)]
    expires_at: Option<i64>,
    /// Relative expiry, seconds from now.
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct ProfileResponse {
    #[serde(default, alias = "sub", alias = "uid")]
    identity_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, alias = "name")]
    display_name: Option<String>,
    #[serde(default, alias = "zoneinfo")]
    timezone: Option<String>,
    #[serde(default, alias = "wallet")]
    wallet_address: Option<String>,
}

impl HttpIdentityProvider {
    pub fn new(
        token_url: Url,
        profile_url: Option<Url>,
        client_id: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Unreachable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            token_url,
            profile_url,
            client_id,
            http,
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshFailure> {
        let mut payload = json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
        });
        if let Some(client_id) = &self.client_id {
            payload["client_id"] = json!(client_id);
        }

        let response = self
            .http
            .post(self.token_url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(TransportError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = structured_error(response).await;
            let failure = classify_refresh_failure(status, body);
            warn!(status = status.as_u16(), error = %failure, "Identity provider refused refresh");
            return Err(failure);
        }

        let body: TokenResponse = response.json().await.map_err(TransportError::from)?;
        let grant = grant_from_response(body, Utc::now())?;
        debug!(expires_at = %grant.expires_at, "Identity provider issued new credentials");
        Ok(grant)
    }

    async fn fetch_profile(
        &self,
        access_token: &str,
    ) -> Result<Option<ProviderProfile>, TransportError> {
        let Some(profile_url) = &self.profile_url else {
            return Ok(None);
        };

        let response = self
            .http
            .get(profile_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TransportError::status(response.status()));
        }

        let body: ProfileResponse = response.json().await?;
        Ok(Some(ProviderProfile {
            identity_id: body.identity_id,
            email: body.email,
            display_name: body.display_name,
            timezone: body.timezone,
            wallet_address: body.wallet_address,
        }))
    }
}

/// Client errors mean the refresh token is no good; everything else is a
/// transport problem and leaves the session alone.
fn classify_refresh_failure(status: StatusCode, body: Option<ErrorBody>) -> RefreshFailure {
    let rejected = matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
    );
    if !rejected {
        return RefreshFailure::Transport(TransportError::status(status));
    }

    let reason = body
        .map(|b| b.message.unwrap_or_else(|| b.error_code.unwrap_or_default()))
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    RefreshFailure::Rejected(reason)
}

fn grant_from_response(body: TokenResponse, now: DateTime<Utc>) -> Result<TokenGrant, TransportError> {
    if body.access_token.trim().is_empty() {
        return Err(TransportError::InvalidResponse(
            "token response has an empty access_token".to_string(),
        ));
    }

    let expires_at = match (body.expires_at, body.expires_in) {
        (Some(epoch), _) => DateTime::from_timestamp(epoch, 0),
        (None, Some(secs)) => {
            TimeDelta::try_seconds(secs).and_then(|ttl| now.checked_add_signed(ttl))
        }
        (None, None) => None,
    }
    .ok_or_else(|| {
        TransportError::InvalidResponse("token response carries no usable expiry".to_string())
    })?;

    Ok(TokenGrant {
        access_token: body.access_token,
        refresh_token: body.refresh_token.filter(|t| !t.trim().is_empty()),
        expires_at,
    })
}
