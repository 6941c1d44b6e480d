// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use utoipa::{IntoParams, ToSchema};

use crate::auth::navigation::LOGIN_ENTRY;
use crate::auth::{CallbackParams, Navigation};
use crate::error::ApiError;
use crate::state::AppState;

/// 302 to `location`.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct LoginParams {
    /// Local path to land on after login.
    pub return_to: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ErrorParams {
    pub code: Option<String>,
}

/// Public view of a failed authorization.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthErrorView {
    pub code: String,
    pub message: String,
    /// Where to start over.
    pub retry: String,
}

#[utoipa::path(
    get,
    path = "/auth/login",
    params(LoginParams),
    tag = "Auth",
    responses(
        (status = 302, description = "Redirect to the identity provider"),
        (status = 500, description = "Authorization could not be started", body = crate::error::ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Query(params): Query<LoginParams>,
) -> Result<Response, ApiError> {
    let navigation = state.flow.begin_authorization_with_return(
        &state.scope,
        &state.redirect_uri,
        params.return_to.as_deref(),
    )?;
    Ok(found(navigation.location()))
}

/// Provider callback. Never renders an error itself; failures go to the
/// public error view.
#[utoipa::path(
    get,
    path = "/auth/callback",
    tag = "Auth",
    responses(
        (status = 302, description = "Redirect to the return path, or to the error view")
    )
)]
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match state.flow.handle_callback(&CallbackParams::new(params)) {
        Ok(outcome) => found(outcome.navigation.location()),
        Err(e) => {
            if e.is_protocol_error() {
                warn!(error = %e, error_code = e.error_code(), "Authorization callback rejected");
            } else {
                error!(error = %e, error_code = e.error_code(), "Authorization callback failed");
            }
            found(Navigation::error_view(e.error_code()).location())
        }
    }
}

#[utoipa::path(
    get,
    path = "/auth/error",
    params(ErrorParams),
    tag = "Auth",
    responses((status = 200, description = "Authorization failure details", body = AuthErrorView))
)]
pub async fn error_view(Query(params): Query<ErrorParams>) -> Json<AuthErrorView> {
    let code = params.code.unwrap_or_else(|| "unknown".to_string());
    let message = match code.as_str() {
        "state_mismatch" => "This sign-in link is stale or was not started here.",
        "authorization_expired" => "The sign-in attempt took too long.",
        "incomplete_callback" => "The identity provider returned an incomplete response.",
        "expired_credentials" => "The identity provider returned credentials that had already expired.",
        "provider_denied" => "The identity provider did not authorize the sign-in.",
        _ => "Sign-in failed.",
    };
    Json(AuthErrorView {
        code,
        message: message.to_string(),
        retry: LOGIN_ENTRY.to_string(),
    })
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 204, description = "Session cleared"))
)]
pub async fn logout(State(state): State<AppState>) -> StatusCode {
    state.session.logout();
    StatusCode::NO_CONTENT
}
