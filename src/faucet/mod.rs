// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Faucet Module
//!
//! Everything past the access gate: the wallet binding gate, the claim
//! eligibility engine and the countdown shown between claims.
//!
//! ```text
//! AccessGate ─► WalletBindingGate ─► claim view
//!                     │                  │
//!               WalletBinder        ClaimEngine ─► CountdownProjector
//! ```

pub mod countdown;
pub mod eligibility;
pub mod error;
pub mod wallet_gate;

pub use countdown::{project, Countdown, CountdownProjector};
pub use eligibility::{ClaimEngine, Claimed, Eligibility, EngineState};
pub use error::{BindError, ClaimError};
pub use wallet_gate::{BindOutcome, BindingForm, WalletBinder, WalletBindingGate, WalletGated};
