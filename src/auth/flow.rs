// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Redirect-based authorization flow.
//!
//! ## Round Trip
//!
//! 1. [`AuthorizationFlow::begin_authorization`] issues a fresh `state` nonce,
//!    persists it as the one pending request and returns a full navigation to
//!    the provider.
//! 2. The provider redirects back with the tokens in the query string.
//! 3. [`AuthorizationFlow::handle_callback`] consumes the pending request
//!    before looking at anything else, so a nonce can only ever be checked
//!    once. A valid callback becomes a credential record and is adopted by
//!    the [`SessionManager`].

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use ring::rand::SystemRandom;
use tracing::{info, warn};
use url::Url;

use super::error::AuthFlowError;
use super::navigation::{sanitize_return_to, Navigation};
use super::nonce::generate_nonce;
use super::session::SessionManager;
use crate::clock::SharedClock;
use crate::models::{Identity, WalletAddress};
use crate::storage::{fingerprint, AuthorizationRequest, CredentialRecord, CredentialStore};

/// Query parameters of a provider callback.
#[derive(Debug, Clone, Default)]
pub struct CallbackParams(HashMap<String, String>);

impl CallbackParams {
    pub fn new(params: HashMap<String, String>) -> Self {
        Self(params)
    }

    /// Parse a raw query string.
    pub fn from_query(query: &str) -> Self {
        Self(
            url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
                .into_owned()
                .collect(),
        )
    }

    /// Non-empty value of a parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CallbackParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A successfully adopted login.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub identity: Identity,
    /// Where to go next: the requested return path or home.
    pub navigation: Navigation,
}

/// Initiates authorization requests and validates their callbacks.
pub struct AuthorizationFlow {
    store: CredentialStore,
    session: SessionManager,
    authorize_url: Url,
    client_id: Option<String>,
    pending_ttl: TimeDelta,
    clock: SharedClock,
    rng: SystemRandom,
}

impl AuthorizationFlow {
    pub fn new(
        store: CredentialStore,
        session: SessionManager,
        authorize_url: Url,
        client_id: Option<String>,
        pending_ttl: TimeDelta,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            session,
            authorize_url,
            client_id,
            pending_ttl,
            clock,
            rng: SystemRandom::new(),
        }
    }

    /// Start an authorization. Any earlier pending request stops being valid.
    pub fn begin_authorization(
        &self,
        scope: &str,
        redirect_uri: &str,
    ) -> Result<Navigation, AuthFlowError> {
        self.begin_authorization_with_return(scope, redirect_uri, None)
    }

    /// Start an authorization that lands on `return_to` once adopted.
    pub fn begin_authorization_with_return(
        &self,
        scope: &str,
        redirect_uri: &str,
        return_to: Option<&str>,
    ) -> Result<Navigation, AuthFlowError> {
        let state_nonce = generate_nonce(&self.rng)?;
        let request = AuthorizationRequest {
            state_nonce,
            redirect_uri: redirect_uri.to_string(),
            requested_scope: scope.to_string(),
            issued_at: self.clock.now(),
            return_to: return_to.and_then(sanitize_return_to),
        };
        self.store.save_authorization_request(&request)?;

        let mut url = self.authorize_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("redirect_uri", &request.redirect_uri)
                .append_pair("scope", &request.requested_scope)
                .append_pair("state", &request.state_nonce);
            if let Some(client_id) = &self.client_id {
                query
                    .append_pair("client_id", client_id)
                    .append_pair("response_type", "token");
            }
        }

        info!(
            nonce = %fingerprint(&request.state_nonce),
            scope = %request.requested_scope,
            "Authorization request issued"
        );
        Ok(Navigation::External(url.into()))
    }

    /// Validate a provider callback and adopt the session it carries.
    pub fn handle_callback(&self, params: &CallbackParams) -> Result<CallbackOutcome, AuthFlowError> {
        // Consumed regardless of outcome
        let pending = self.store.take_authorization_request()?;

        let Some(pending) = pending else {
            warn!("Callback without a pending authorization request");
            return Err(AuthFlowError::StateMismatch);
        };
        if params.get("state") != Some(pending.state_nonce.as_str()) {
            warn!(
                expected = %fingerprint(&pending.state_nonce),
                "Callback state does not match pending nonce"
            );
            return Err(AuthFlowError::StateMismatch);
        }
        info!(nonce = %fingerprint(&pending.state_nonce), "Authorization nonce consumed");

        if self.clock.now() - pending.issued_at > self.pending_ttl {
            warn!(issued_at = %pending.issued_at, "Authorization request expired");
            return Err(AuthFlowError::AuthorizationExpired);
        }

        if let Some(error) = params.get("error") {
            let detail = params.get("error_description").unwrap_or(error);
            warn!(error = %error, "Identity provider denied authorization");
            return Err(AuthFlowError::ProviderDenied(detail.to_string()));
        }

        let record = credential_record(params)?;
        if record.is_expired(self.clock.now()) {
            warn!(
                identity_id = %record.identity_id(),
                expires_at = %record.expires_at(),
                "Callback credentials already expired"
            );
            return Err(AuthFlowError::ExpiredCredentials);
        }
        let identity = callback_identity(params, record.identity_id());

        self.store.save_credentials(&record)?;
        self.session.adopt(record, identity.clone());

        let navigation = pending
            .return_to
            .as_deref()
            .and_then(sanitize_return_to)
            .map(Navigation::Internal)
            .unwrap_or_else(Navigation::home);

        Ok(CallbackOutcome {
            identity,
            navigation,
        })
    }
}

/// Collect the four required credential fields, naming every one missing.
fn credential_record(params: &CallbackParams) -> Result<CredentialRecord, AuthFlowError> {
    let access_token = params.get("access_token");
    let refresh_token = params.get("refresh_token");
    let expires_at = params
        .get("expires_at")
        .and_then(|raw| raw.parse::<i64>().ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
    let identity_id = params.first_of(&["identity_id", "sub", "uid"]);

    let mut missing = Vec::new();
    if access_token.is_none() {
        missing.push("access_token");
    }
    if refresh_token.is_none() {
        missing.push("refresh_token");
    }
    if expires_at.is_none() {
        missing.push("expires_at");
    }
    if identity_id.is_none() {
        missing.push("identity_id");
    }

    match (access_token, refresh_token, expires_at, identity_id) {
        (Some(access), Some(refresh), Some(expires_at), Some(id)) => {
            CredentialRecord::new(access, refresh, expires_at, id)
                .map_err(|e| AuthFlowError::IncompleteCallback(e.0.to_string()))
        }
        _ => Err(AuthFlowError::IncompleteCallback(missing.join(", "))),
    }
}

/// Best-effort identity from optional profile attributes.
fn callback_identity(params: &CallbackParams, identity_id: &str) -> Identity {
    let mut identity = Identity::bare(identity_id);
    identity.email = params.get("email").map(str::to_string);
    identity.display_name = params
        .first_of(&["display_name", "name"])
        .map(str::to_string);
    identity.timezone = params
        .first_of(&["timezone", "zoneinfo"])
        .map(str::to_string);
    identity.wallet_address = params
        .first_of(&["wallet_address", "wallet"])
        .and_then(|raw| WalletAddress::parse(raw).ok());
    identity
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::session::SessionStatus;
    use crate::clock::manual::ManualClock;
    use crate::clock::Clock;
    use crate::storage::{KeyValueStore, MemoryStore};
    use crate::testing::ScriptedProvider;

    struct Fixture {
        flow: AuthorizationFlow,
        session: SessionManager,
        store: CredentialStore,
        kv: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let kv = Arc::new(MemoryStore::new());
        let store = CredentialStore::new(kv.clone(), "test");
        let clock = Arc::new(ManualClock::at("2026-03-01T12:00:00Z".parse().unwrap()));
        let session = SessionManager::new(
            store.clone(),
            Arc::new(ScriptedProvider::default()),
            clock.clone(),
            TimeDelta::minutes(5),
        );
        session.bootstrap();
        let flow = AuthorizationFlow::new(
            store.clone(),
            session.clone(),
            Url::parse("https://idp.example.com/authorize").unwrap(),
            Some("faucet-web".into()),
            TimeDelta::minutes(10),
            clock.clone(),
        );
        Fixture {
            flow,
            session,
            store,
            kv,
            clock,
        }
    }

    fn issued_nonce(nav: &Navigation) -> String {
        let url = Url::parse(nav.location()).unwrap();
        url.query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    fn callback(f: &Fixture, state: &str) -> CallbackParams {
        let expires = (f.clock.now() + TimeDelta::hours(1)).timestamp().to_string();
        CallbackParams::from_iter([
            ("state", state.to_string()),
            ("access_token", "access-1".to_string()),
            ("refresh_token", "refresh-1".to_string()),
            ("expires_at", expires),
            ("identity_id", "user_1".to_string()),
            ("email", "a@example.com".to_string()),
            ("timezone", "Europe/Paris".to_string()),
        ])
    }

    /// Store a known nonce the way `begin_authorization` would.
    fn pending(f: &Fixture, nonce: &str) {
        f.store
            .save_authorization_request(&AuthorizationRequest {
                state_nonce: nonce.into(),
                redirect_uri: "http://127.0.0.1:8787/auth/callback".into(),
                requested_scope: "openid".into(),
                issued_at: f.clock.now(),
                return_to: None,
            })
            .unwrap();
    }

    #[test]
    fn begin_authorization_builds_provider_url() {
        let f = fixture();
        let nav = f
            .flow
            .begin_authorization("openid profile", "http://127.0.0.1:8787/auth/callback")
            .unwrap();

        let Navigation::External(location) = &nav else {
            panic!("expected external navigation, got {nav:?}");
        };
        let url = Url::parse(location).unwrap();
        assert_eq!(url.host_str(), Some("idp.example.com"));
        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["redirect_uri"], "http://127.0.0.1:8787/auth/callback");
        assert_eq!(query["scope"], "openid profile");
        assert_eq!(query["client_id"], "faucet-web");
        assert_eq!(query["response_type"], "token");
        assert_eq!(query["state"].len(), 43);
    }

    #[test]
    fn valid_callback_adopts_session() {
        let f = fixture();
        let nav = f.flow.begin_authorization("openid", "http://cb").unwrap();
        let nonce = issued_nonce(&nav);

        let outcome = f.flow.handle_callback(&callback(&f, &nonce)).unwrap();
        assert_eq!(outcome.identity.identity_id, "user_1");
        assert_eq!(outcome.identity.email.as_deref(), Some("a@example.com"));
        assert_eq!(outcome.navigation, Navigation::home());

        assert_eq!(f.session.status(), SessionStatus::Authenticated);
        let stored = f.store.load_credentials().unwrap().unwrap();
        assert_eq!(stored.access_token(), "access-1");
        assert_eq!(stored.identity_id(), "user_1");
    }

    #[test]
    fn mismatched_state_never_creates_a_session() {
        let f = fixture();
        pending(&f, "abc123");

        let err = f.flow.handle_callback(&callback(&f, "xyz999")).unwrap_err();
        assert!(matches!(err, AuthFlowError::StateMismatch));
        assert_eq!(f.store.load_credentials().unwrap(), None);
        assert_eq!(f.session.status(), SessionStatus::Anonymous);
    }

    #[test]
    fn consumed_nonce_cannot_be_replayed() {
        let f = fixture();
        pending(&f, "abc123");
        f.flow.handle_callback(&callback(&f, "abc123")).unwrap();

        let err = f.flow.handle_callback(&callback(&f, "abc123")).unwrap_err();
        assert!(matches!(err, AuthFlowError::StateMismatch));
    }

    #[test]
    fn mismatch_still_consumes_the_pending_request() {
        let f = fixture();
        pending(&f, "abc123");
        assert!(f.flow.handle_callback(&callback(&f, "wrong")).is_err());

        let err = f.flow.handle_callback(&callback(&f, "abc123")).unwrap_err();
        assert!(matches!(err, AuthFlowError::StateMismatch));
    }

    #[test]
    fn only_most_recent_nonce_is_accepted() {
        let f = fixture();
        let first = issued_nonce(&f.flow.begin_authorization("openid", "http://cb").unwrap());
        let second = issued_nonce(&f.flow.begin_authorization("openid", "http://cb").unwrap());
        assert_ne!(first, second);

        let err = f.flow.handle_callback(&callback(&f, &first)).unwrap_err();
        assert!(matches!(err, AuthFlowError::StateMismatch));
        assert_eq!(f.store.load_credentials().unwrap(), None);
    }

    #[test]
    fn incomplete_callback_names_missing_fields() {
        let f = fixture();
        pending(&f, "abc123");
        let params = CallbackParams::from_iter([
            ("state", "abc123"),
            ("access_token", "access-1"),
            ("expires_at", "not-a-number"),
            ("sub", "user_1"),
        ]);

        match f.flow.handle_callback(&params) {
            Err(AuthFlowError::IncompleteCallback(missing)) => {
                assert_eq!(missing, "refresh_token, expires_at");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(f.kv.is_empty());
    }

    #[test]
    fn expired_pending_request_is_rejected() {
        let f = fixture();
        pending(&f, "abc123");
        f.clock.advance(TimeDelta::minutes(11));

        let err = f.flow.handle_callback(&callback(&f, "abc123")).unwrap_err();
        assert!(matches!(err, AuthFlowError::AuthorizationExpired));
        assert!(f.kv.get("test/credentials").unwrap().is_none());
    }

    #[test]
    fn expired_callback_credentials_are_rejected() {
        let f = fixture();
        pending(&f, "abc123");
        let mut params = callback(&f, "abc123");
        let expired = (f.clock.now() - TimeDelta::seconds(1)).timestamp().to_string();
        params.0.insert("expires_at".into(), expired);

        let err = f.flow.handle_callback(&params).unwrap_err();
        assert!(matches!(err, AuthFlowError::ExpiredCredentials));
        assert_eq!(f.store.load_credentials().unwrap(), None);
        assert_eq!(f.session.status(), SessionStatus::Anonymous);
    }

    #[test]
    fn provider_error_is_denied() {
        let f = fixture();
        pending(&f, "abc123");
        let params = CallbackParams::from_query(
            "?state=abc123&error=access_denied&error_description=User+cancelled",
        );

        match f.flow.handle_callback(&params) {
            Err(AuthFlowError::ProviderDenied(detail)) => assert_eq!(detail, "User cancelled"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn callback_returns_to_requested_path() {
        let f = fixture();
        let nav = f
            .flow
            .begin_authorization_with_return("openid", "http://cb", Some("/faucet"))
            .unwrap();

        let outcome = f.flow.handle_callback(&callback(&f, &issued_nonce(&nav))).unwrap();
        assert_eq!(outcome.navigation, Navigation::Internal("/faucet".into()));
    }

    #[test]
    fn malformed_wallet_attribute_is_dropped() {
        let f = fixture();
        pending(&f, "abc123");
        let mut params = callback(&f, "abc123");
        params.0.insert("wallet_address".into(), "0xZZZ".into());

        let outcome = f.flow.handle_callback(&params).unwrap();
        assert_eq!(outcome.identity.wallet_address, None);
    }
}
