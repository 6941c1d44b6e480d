// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    auth::{AccessGate, Gated, Navigator},
    error::ApiError,
    faucet::{Claimed, Countdown, Eligibility, WalletBindingGate, WalletGated},
    models::Identity,
    state::AppState,
};

/// Path the faucet page returns to after login.
const FAUCET_PAGE: &str = "/faucet";

/// Claim page for an identity with a bound wallet.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ClaimView {
    pub identity: Identity,
    pub eligibility: Eligibility,
    pub countdown: Option<Countdown>,
    /// Result of the last claim, surfaced once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed: Option<Claimed>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EligibilityResponse {
    pub eligibility: Eligibility,
    pub countdown: Option<Countdown>,
}

fn current_countdown(state: &AppState) -> Option<Countdown> {
    *state.countdown.borrow()
}

/// The faucet page behind both gates.
///
/// Renders `placeholder` only when the session has not resolved, which the
/// handler waits out. Anonymous callers get a redirecting view naming the
/// login entry; callers without a wallet get the binding form.
#[utoipa::path(
    get,
    path = "/v1/faucet",
    tag = "Faucet",
    responses((status = 200, description = "Gated claim page, tagged by `state` and `wallet`"))
)]
pub async fn faucet_page(State(state): State<AppState>) -> Json<Gated<WalletGated<ClaimView>>> {
    let view_state = state.clone();
    let claim_view = move |identity: &Identity| ClaimView {
        identity: identity.clone(),
        eligibility: view_state.engine.eligibility(),
        countdown: current_countdown(&view_state),
        claimed: view_state.engine.take_claimed(),
    };
    let gate = AccessGate::new(WalletBindingGate::new(claim_view)).returning_to(FAUCET_PAGE);

    let navigator = Navigator::new();
    Json(gate.render_resolved(&state.session, &navigator).await)
}

/// Last synced eligibility. Schedules a resync when stale, never waits on it.
#[utoipa::path(
    get,
    path = "/v1/eligibility",
    tag = "Faucet",
    responses(
        (status = 200, body = EligibilityResponse),
        (status = 401, body = crate::error::ErrorBody)
    )
)]
pub async fn get_eligibility(
    State(state): State<AppState>,
) -> Result<Json<EligibilityResponse>, ApiError> {
    if !state.session.status().is_authenticated() {
        return Err(ApiError::unauthorized("sign in to see claim eligibility"));
    }
    Ok(Json(EligibilityResponse {
        eligibility: state.engine.eligibility(),
        countdown: current_countdown(&state),
    }))
}

/// Fetch the authoritative state now.
#[utoipa::path(
    post,
    path = "/v1/eligibility/resync",
    tag = "Faucet",
    responses(
        (status = 200, body = Eligibility),
        (status = 401, body = crate::error::ErrorBody),
        (status = 409, description = "No wallet bound", body = crate::error::ErrorBody),
        (status = 502, body = crate::error::ErrorBody)
    )
)]
pub async fn resync_eligibility(
    State(state): State<AppState>,
) -> Result<Json<Eligibility>, ApiError> {
    Ok(Json(state.engine.resync().await?))
}

/// Submit a claim. A second claim while one is in flight is accepted and
/// ignored.
#[utoipa::path(
    post,
    path = "/v1/claim",
    tag = "Faucet",
    responses(
        (status = 200, body = Claimed),
        (status = 202, description = "A claim is already in flight"),
        (status = 401, body = crate::error::ErrorBody),
        (status = 409, description = "No wallet bound", body = crate::error::ErrorBody),
        (status = 429, description = "Cooldown not over", body = crate::error::ErrorBody),
        (status = 502, body = crate::error::ErrorBody)
    )
)]
pub async fn claim(State(state): State<AppState>) -> Result<Response, ApiError> {
    match state.engine.claim().await {
        Ok(claimed) => Ok((StatusCode::OK, Json(claimed)).into_response()),
        Err(e) if e.is_silent() => Ok(StatusCode::ACCEPTED.into_response()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::auth::Navigation;
    use crate::clock::Clock;
    use crate::models::ClaimState;
    use crate::testing::TestApp;

    #[tokio::test]
    async fn anonymous_page_redirects_to_login() {
        let app = TestApp::new();
        let Json(page) = faucet_page(State(app.state.clone())).await;

        assert_eq!(
            page,
            Gated::Redirecting {
                navigation: Navigation::login(Some(FAUCET_PAGE))
            }
        );
    }

    #[tokio::test]
    async fn page_without_wallet_shows_binding_form() {
        let app = TestApp::new();
        app.sign_in(false);

        let Json(page) = faucet_page(State(app.state.clone())).await;
        match page.into_view() {
            Some(WalletGated::BindingRequired { form }) => assert_eq!(form.identity_id, "user_1"),
            other => panic!("expected binding form, got {other:?}"),
        }
        assert_eq!(app.backend.eligibility_calls(), 0);
    }

    #[tokio::test]
    async fn page_with_wallet_renders_claim_view() {
        let app = TestApp::new();
        app.sign_in(true);

        let Json(page) = faucet_page(State(app.state.clone())).await;
        match page.into_view() {
            Some(WalletGated::Ready { view }) => {
                assert_eq!(view.identity.identity_id, "user_1");
                assert!(view.claimed.is_none());
            }
            other => panic!("expected claim view, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn eligibility_requires_session() {
        let app = TestApp::new();
        let err = get_eligibility(State(app.state.clone())).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn claim_returns_projection() {
        let app = TestApp::new();
        app.sign_in(true);
        app.backend
            .set_eligibility(ClaimState::new(true, app.clock.now()));

        let response = claim(State(app.state.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.backend.claim_calls(), 1);

        let eligibility = app.state.engine.eligibility();
        assert!(!eligibility.can_claim());
        assert!(eligibility.optimistic);
        assert_eq!(
            eligibility.next_claim_time(),
            Some(app.clock.now() + TimeDelta::hours(24))
        );
    }

    #[tokio::test]
    async fn second_claim_in_flight_is_accepted_silently() {
        let app = TestApp::new();
        app.sign_in(true);
        app.backend
            .set_eligibility(ClaimState::new(true, app.clock.now()));
        let gate = app.backend.hold_claim();

        let first = tokio::spawn(claim(State(app.state.clone())));
        app.backend.wait_for_claim_call().await;

        let second = claim(State(app.state.clone())).await.unwrap();
        assert_eq!(second.status(), StatusCode::ACCEPTED);

        gate.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(app.backend.claim_calls(), 1);
    }

    #[tokio::test]
    async fn claim_during_cooldown_is_rejected() {
        let app = TestApp::new();
        app.sign_in(true);
        app.backend.set_eligibility(ClaimState::new(
            false,
            app.clock.now() + TimeDelta::hours(3),
        ));

        let err = claim(State(app.state.clone())).await.unwrap_err();
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.error_code, "not_yet_eligible");
        assert_eq!(app.backend.claim_calls(), 0);
    }
}
