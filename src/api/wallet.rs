// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};

use crate::{
    error::ApiError,
    faucet::BindOutcome,
    models::BindWalletRequest,
    state::AppState,
};

#[utoipa::path(
    post,
    path = "/v1/wallet/bind",
    request_body = BindWalletRequest,
    tag = "Wallet",
    responses(
        (status = 200, body = BindOutcome),
        (status = 401, body = crate::error::ErrorBody),
        (status = 409, description = "Identity or address already bound elsewhere", body = crate::error::ErrorBody),
        (status = 422, description = "Malformed address", body = crate::error::ErrorBody)
    )
)]
pub async fn bind_wallet(
    State(state): State<AppState>,
    Json(request): Json<BindWalletRequest>,
) -> Result<Json<BindOutcome>, ApiError> {
    let outcome = state.binder.bind_wallet(&request.address).await?;
    Ok(Json(outcome))
}
