// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{Navigation, RefreshOutcome, SessionSnapshot, SessionStatus},
    error::ErrorBody,
    faucet::{BindOutcome, BindingForm, Claimed, Countdown, Eligibility},
    models::{BindWalletRequest, ClaimState, Identity, WalletAddress},
    state::AppState,
};

pub mod auth;
pub mod faucet;
pub mod guard;
pub mod health;
pub mod session;
pub mod wallet;

pub fn router(state: AppState) -> Router {
    let bridge_guard = state.guard.clone();

    let auth_routes = Router::new()
        .route("/login", get(auth::login))
        .route("/callback", get(auth::callback))
        .route("/error", get(auth::error_view))
        .route("/logout", post(auth::logout));

    let v1_routes = Router::new()
        .route("/session", get(session::get_session))
        .route("/session/refresh", post(session::refresh_session))
        .route("/session/identity", post(session::refresh_identity))
        .route("/faucet", get(faucet::faucet_page))
        .route("/eligibility", get(faucet::get_eligibility))
        .route("/eligibility/resync", post(faucet::resync_eligibility))
        .route("/claim", post(faucet::claim))
        .route("/wallet/bind", post(wallet::bind_wallet));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/auth", auth_routes)
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(bridge_guard.cors())
        .layer(middleware::from_fn_with_state(
            bridge_guard,
            guard::check_caller,
        ))
        .layer(TraceLayer::new_for_http())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        auth::login,
        auth::callback,
        auth::error_view,
        auth::logout,
        session::get_session,
        session::refresh_session,
        session::refresh_identity,
        faucet::faucet_page,
        faucet::get_eligibility,
        faucet::resync_eligibility,
        faucet::claim,
        wallet::bind_wallet
    ),
    components(
        schemas(
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks,
            auth::AuthErrorView,
            session::RefreshResponse,
            faucet::ClaimView,
            faucet::EligibilityResponse,
            SessionSnapshot,
            SessionStatus,
            RefreshOutcome,
            Navigation,
            Identity,
            WalletAddress,
            ClaimState,
            Eligibility,
            Claimed,
            Countdown,
            BindOutcome,
            BindingForm,
            BindWalletRequest,
            ErrorBody
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Auth", description = "Login redirect, provider callback and logout"),
        (name = "Session", description = "Session snapshot and credential refresh"),
        (name = "Faucet", description = "Claim eligibility and claims"),
        (name = "Wallet", description = "Payout wallet binding")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestApp;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let app = TestApp::new();
        let router = router(app.state.clone());
        // Ensure the router can be converted into a service without panicking.
        let _ = router.into_make_service();
    }

    #[test]
    fn openapi_lists_bridge_paths() {
        let doc = ApiDoc::openapi();
        for path in ["/auth/callback", "/v1/claim", "/v1/wallet/bind", "/v1/faucet"] {
            assert!(doc.paths.paths.contains_key(path), "{path}");
        }
    }

    #[tokio::test]
    async fn login_redirects_through_router() {
        let app = TestApp::new();
        let response = router(app.state.clone())
            .oneshot(
                Request::get("/auth/login?return_to=/faucet")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://idp.example.com/authorize?"));
    }

    #[tokio::test]
    async fn claim_without_session_is_unauthorized() {
        let app = TestApp::new();
        let response = router(app.state.clone())
            .oneshot(Request::post("/v1/claim").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error_code"], "not_authenticated");
    }

    #[tokio::test]
    async fn bind_through_router_accepts_json() {
        let app = TestApp::new();
        app.sign_in(false);

        let request = Request::post("/v1/wallet/bind")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(format!(
                r#"{{"address":"{}"}}"#,
                crate::testing::TEST_WALLET
            )))
            .unwrap();
        let response = router(app.state.clone()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(app.state.session.current_identity().unwrap().has_wallet());
    }
}
