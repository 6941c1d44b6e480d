// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Faucet Session - client-side identity session and claim core
//!
//! Owns the session lifecycle against an external identity provider, gates
//! faucet views on authentication and a bound payout wallet, and tracks
//! claim eligibility with a live countdown. Front ends talk to it through a
//! loopback HTTP bridge.
//!
//! ## Modules
//!
//! - `api` - Loopback bridge handlers (Axum)
//! - `auth` - Session manager, authorization flow and access gate
//! - `faucet` - Wallet binding gate, claim engine and countdown
//! - `keeper` - Background refresh and resync sweeps
//! - `providers` - Identity provider and faucet backend clients
//! - `storage` - Durable credential storage (redb)

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod faucet;
pub mod keeper;
pub mod models;
pub mod providers;
pub mod state;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;
