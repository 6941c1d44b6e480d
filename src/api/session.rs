// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    auth::{RefreshOutcome, SessionSnapshot},
    error::ApiError,
    models::Identity,
    state::AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub outcome: RefreshOutcome,
    pub session: SessionSnapshot,
}

/// Current session. Never carries tokens.
#[utoipa::path(
    get,
    path = "/v1/session",
    tag = "Session",
    responses((status = 200, body = SessionSnapshot))
)]
pub async fn get_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot())
}

#[utoipa::path(
    post,
    path = "/v1/session/refresh",
    tag = "Session",
    responses(
        (status = 200, body = RefreshResponse),
        (status = 401, description = "No session, or the provider rejected the refresh", body = crate::error::ErrorBody),
        (status = 502, description = "Identity provider unreachable", body = crate::error::ErrorBody)
    )
)]
pub async fn refresh_session(
    State(state): State<AppState>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let outcome = state.session.refresh_if_needed().await?;
    Ok(Json(RefreshResponse {
        outcome,
        session: state.session.snapshot(),
    }))
}

/// Re-read the profile from the identity provider.
#[utoipa::path(
    post,
    path = "/v1/session/identity",
    tag = "Session",
    responses(
        (status = 200, body = Identity),
        (status = 401, body = crate::error::ErrorBody),
        (status = 502, body = crate::error::ErrorBody)
    )
)]
pub async fn refresh_identity(State(state): State<AppState>) -> Result<Json<Identity>, ApiError> {
    let identity = state.session.refresh_identity().await?;
    Ok(Json(identity))
}
