// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Typed session slots over a [`KeyValueStore`].
//!
//! ## Slot Layout
//!
//! ```text
//! {partition}/credentials     # CredentialRecord, overwritten wholesale
//! {partition}/identity        # last known Identity snapshot
//! {partition}/authorization   # pending AuthorizationRequest, single use
//! ```
//!
//! A credential record is either complete or absent. Anything in the
//! credentials slot that does not decode into a complete record is erased
//! and reported as absent.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use super::kv::{KeyValueStore, StoreResult};
use crate::models::Identity;

const CREDENTIALS_SLOT: &str = "credentials";
const IDENTITY_SLOT: &str = "identity";
const AUTHORIZATION_SLOT: &str = "authorization";

/// Short, non-reversible tag for a token, safe to log.
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest[..6].iter().map(|b| format!("{b:02x}")).collect()
}

// =============================================================================
// Credential Record
// =============================================================================

/// The token pair and expiry of one session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCredentialRecord")]
pub struct CredentialRecord {
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
    identity_id: String,
}

/// A credential field that was missing or empty.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("credential record is missing `{0}`")]
pub struct IncompleteRecord(pub &'static str);

#[derive(Deserialize)]
struct RawCredentialRecord {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    identity_id: String,
}

impl TryFrom<RawCredentialRecord> for CredentialRecord {
    type Error = IncompleteRecord;

    fn try_from(raw: RawCredentialRecord) -> Result<Self, Self::Error> {
        let expires_at = raw.expires_at.ok_or(IncompleteRecord("expires_at"))?;
        CredentialRecord::new(raw.access_token, raw.refresh_token, expires_at, raw.identity_id)
    }
}

impl CredentialRecord {
    /// Build a record, rejecting any empty field.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
        identity_id: impl Into<String>,
    ) -> Result<Self, IncompleteRecord> {
        let access_token = access_token.into();
        let refresh_token = refresh_token.into();
        let identity_id = identity_id.into();

        if access_token.trim().is_empty() {
            return Err(IncompleteRecord("access_token"));
        }
        if refresh_token.trim().is_empty() {
            return Err(IncompleteRecord("refresh_token"));
        }
        if identity_id.trim().is_empty() {
            return Err(IncompleteRecord("identity_id"));
        }

        Ok(Self {
            access_token,
            refresh_token,
            expires_at,
            identity_id,
        })
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn identity_id(&self) -> &str {
        &self.identity_id
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("access_token", &fingerprint(&self.access_token))
            .field("refresh_token", &fingerprint(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .field("identity_id", &self.identity_id)
            .finish()
    }
}

// =============================================================================
// Authorization Request State
// =============================================================================

/// The one authorization attempt currently allowed to complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub state_nonce: String,
    pub redirect_uri: String,
    pub requested_scope: String,
    pub issued_at: DateTime<Utc>,
    /// Local path to land on after a successful login.
    #[serde(default)]
    pub return_to: Option<String>,
}

// =============================================================================
// CredentialStore
// =============================================================================

/// Session persistence for one storage partition.
#[derive(Clone)]
pub struct CredentialStore {
    kv: Arc<dyn KeyValueStore>,
    partition: String,
}

impl CredentialStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, partition: impl Into<String>) -> Self {
        Self {
            kv,
            partition: partition.into(),
        }
    }

    fn key(&self, slot: &str) -> String {
        format!("{}/{slot}", self.partition)
    }

    /// Load the credential record, erasing it if it is not complete.
    pub fn load_credentials(&self) -> StoreResult<Option<CredentialRecord>> {
        let key = self.key(CREDENTIALS_SLOT);
        let Some(bytes) = self.kv.get(&key)? else {
            return Ok(None);
        };

        match serde_json::from_slice::<CredentialRecord>(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(partition = %self.partition, error = %e, "Discarding unreadable credential record");
                self.kv.remove(&[key.as_str()])?;
                Ok(None)
            }
        }
    }

    pub fn save_credentials(&self, record: &CredentialRecord) -> StoreResult<()> {
        let json = serde_json::to_vec(record)?;
        self.kv.put(&self.key(CREDENTIALS_SLOT), &json)
    }

    /// Load the cached identity snapshot. Unreadable snapshots are ignored.
    pub fn load_identity(&self) -> StoreResult<Option<Identity>> {
        let Some(bytes) = self.kv.get(&self.key(IDENTITY_SLOT))? else {
            return Ok(None);
        };
        Ok(serde_json::from_slice(&bytes).ok())
    }

    pub fn save_identity(&self, identity: &Identity) -> StoreResult<()> {
        let json = serde_json::to_vec(identity)?;
        self.kv.put(&self.key(IDENTITY_SLOT), &json)
    }

    /// Erase credentials and identity in one write.
    pub fn clear_session(&self) -> StoreResult<()> {
        let credentials = self.key(CREDENTIALS_SLOT);
        let identity = self.key(IDENTITY_SLOT);
        self.kv.remove(&[credentials.as_str(), identity.as_str()])
    }

    /// Persist a pending authorization, replacing any earlier one.
    pub fn save_authorization_request(&self, request: &AuthorizationRequest) -> StoreResult<()> {
        let json = serde_json::to_vec(request)?;
        self.kv.put(&self.key(AUTHORIZATION_SLOT), &json)
    }

    /// Consume the pending authorization. A second call returns `None`.
    pub fn take_authorization_request(&self) -> StoreResult<Option<AuthorizationRequest>> {
        let Some(bytes) = self.kv.take(&self.key(AUTHORIZATION_SLOT))? else {
            return Ok(None);
        };
        Ok(serde_json::from_slice(&bytes).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::MemoryStore;
    use chrono::TimeDelta;

    fn store() -> (CredentialStore, Arc<MemoryStore>) {
        let kv = Arc::new(MemoryStore::new());
        (CredentialStore::new(kv.clone(), "test"), kv)
    }

    fn record() -> CredentialRecord {
        CredentialRecord::new(
            "access-1",
            "refresh-1",
            Utc::now() + TimeDelta::hours(1),
            "user_1",
        )
        .unwrap()
    }

    #[test]
    fn record_requires_every_field() {
        let exp = Utc::now();
        assert_eq!(
            CredentialRecord::new("", "r", exp, "u"),
            Err(IncompleteRecord("access_token"))
        );
        assert_eq!(
            CredentialRecord::new("a", " ", exp, "u"),
            Err(IncompleteRecord("refresh_token"))
        );
        assert_eq!(
            CredentialRecord::new("a", "r", exp, ""),
            Err(IncompleteRecord("identity_id"))
        );
    }

    #[test]
    fn debug_output_hides_tokens() {
        let debug = format!("{:?}", record());
        assert!(!debug.contains("access-1"));
        assert!(!debug.contains("refresh-1"));
        assert!(debug.contains("user_1"));
    }

    #[test]
    fn credentials_overwrite_wholesale() {
        let (store, _) = store();
        store.save_credentials(&record()).unwrap();

        let replacement = CredentialRecord::new(
            "access-2",
            "refresh-2",
            Utc::now() + TimeDelta::hours(2),
            "user_1",
        )
        .unwrap();
        store.save_credentials(&replacement).unwrap();

        assert_eq!(store.load_credentials().unwrap(), Some(replacement));
    }

    #[test]
    fn partial_record_is_treated_as_absent_and_erased() {
        let (store, kv) = store();
        kv.put(
            "test/credentials",
            br#"{"access_token":"a","refresh_token":"","expires_at":"2030-01-01T00:00:00Z","identity_id":"u"}"#,
        )
        .unwrap();

        assert_eq!(store.load_credentials().unwrap(), None);
        assert!(kv.get("test/credentials").unwrap().is_none());
    }

    #[test]
    fn clear_session_removes_credentials_and_identity() {
        let (store, kv) = store();
        store.save_credentials(&record()).unwrap();
        store.save_identity(&Identity::bare("user_1")).unwrap();

        store.clear_session().unwrap();
        assert_eq!(store.load_credentials().unwrap(), None);
        assert_eq!(store.load_identity().unwrap(), None);
        assert!(kv.is_empty());
    }

    #[test]
    fn authorization_request_is_single_use() {
        let (store, _) = store();
        let request = AuthorizationRequest {
            state_nonce: "abc123".into(),
            redirect_uri: "http://127.0.0.1:8787/auth/callback".into(),
            requested_scope: "openid".into(),
            issued_at: Utc::now(),
            return_to: None,
        };
        store.save_authorization_request(&request).unwrap();

        assert_eq!(store.take_authorization_request().unwrap(), Some(request));
        assert_eq!(store.take_authorization_request().unwrap(), None);
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        assert_eq!(fingerprint("token"), fingerprint("token"));
        assert_ne!(fingerprint("token"), fingerprint("other"));
        assert_eq!(fingerprint("token").len(), 12);
    }
}
