// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Identity session lifecycle for the faucet client.
//!
//! ## Auth Flow
//!
//! 1. `GET /auth/login` issues a `state` nonce and redirects to the identity
//!    provider
//! 2. The provider redirects back to `/auth/callback` with the tokens in the
//!    query string (no code exchange)
//! 3. The callback is validated against the single pending nonce, written to
//!    the credential store and adopted by the [`SessionManager`]
//! 4. The session manager refreshes the credentials before they expire and
//!    fails closed to anonymous when the provider rejects a refresh
//!
//! ## Security
//!
//! - Only the most recently issued nonce is accepted, and only once
//! - A pending authorization expires after a fixed time to live
//! - Tokens are never logged; log lines carry a SHA-256 fingerprint
//! - Protected views never render before the session is resolved

pub mod error;
pub mod flow;
pub mod gate;
pub mod navigation;
pub mod nonce;
pub mod session;

pub use error::{AuthFlowError, SessionError};
pub use flow::{AuthorizationFlow, CallbackOutcome, CallbackParams};
pub use gate::{AccessGate, Gated, ProtectedView};
pub use navigation::{Navigation, Navigator};
pub use session::{
    RefreshOutcome, SessionContext, SessionManager, SessionSnapshot, SessionStatus,
};
