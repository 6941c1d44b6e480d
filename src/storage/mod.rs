// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Credential Storage Module
//!
//! Durable client-side persistence for the current session.
//!
//! ## Layers
//!
//! - [`KeyValueStore`]: atomic byte-level get/put/take/remove. Backed by an
//!   embedded redb file in the binary ([`RedbStore`]) and by a process-local
//!   map in tests ([`MemoryStore`]).
//! - [`CredentialStore`]: typed slots for one storage partition (credential
//!   record, identity snapshot, pending authorization request).
//!
//! Exactly one credential record exists per partition. Refresh overwrites
//! it wholesale; logout erases it wholesale.

pub mod credentials;
pub mod kv;
pub mod redb_store;

pub use credentials::{
    fingerprint, AuthorizationRequest, CredentialRecord, CredentialStore, IncompleteRecord,
};
pub use kv::{KeyValueStore, MemoryStore, StoreError, StoreResult};
pub use redb_store::RedbStore;
