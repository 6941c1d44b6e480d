// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session and Faucet Data Models
//!
//! Types shared by the session manager, the gates, the claim engine and the
//! bridge API. All wire-facing types derive `Serialize`, `Deserialize` and
//! `ToSchema`.
//!
//! ## Wallet Address Type
//!
//! [`WalletAddress`] only exists in validated form: `0x` followed by exactly
//! 40 hexadecimal characters. Addresses are kept in lowercase so that two
//! spellings of the same account compare equal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// =============================================================================
// Wallet Address Type
// =============================================================================

/// Required prefix of a payout address.
pub const ADDRESS_PREFIX: &str = "0x";

/// Number of hex digits after the prefix (20 bytes).
pub const ADDRESS_HEX_LEN: usize = 40;

/// Rejected address input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("wallet address must be `0x` followed by 40 hex characters")]
pub struct InvalidAddress;

/// Validated EVM-style payout address.
///
/// # Example
///
/// ```rust,ignore
/// let addr = WalletAddress::parse("0x742d35Cc6634C0532925a3b844Bc9e7595f4aB12")?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "0x742d35cc6634c0532925a3b844bc9e7595f4ab12")]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Validate raw input against the lexical address pattern.
    ///
    /// Surrounding whitespace is ignored, nothing else is.
    pub fn parse(raw: &str) -> Result<Self, InvalidAddress> {
        let trimmed = raw.trim();
        let hex = trimmed.strip_prefix(ADDRESS_PREFIX).ok_or(InvalidAddress)?;
        if hex.len() != ADDRESS_HEX_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InvalidAddress);
        }
        Ok(WalletAddress(format!(
            "{ADDRESS_PREFIX}{}",
            hex.to_ascii_lowercase()
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = InvalidAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        WalletAddress::parse(&value)
    }
}

impl From<WalletAddress> for String {
    fn from(value: WalletAddress) -> Self {
        value.0
    }
}

// =============================================================================
// Identity Models
// =============================================================================

/// The authenticated user's profile.
///
/// `wallet_address` moves from `None` to a validated value at most once; the
/// client never rebinds it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Identity {
    /// Opaque identifier issued by the identity provider.
    pub identity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Bound payout address, if any.
    #[serde(default)]
    pub wallet_address: Option<WalletAddress>,
    /// IANA timezone name reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl Identity {
    /// Identity with nothing but its identifier.
    pub fn bare(identity_id: impl Into<String>) -> Self {
        Self {
            identity_id: identity_id.into(),
            email: None,
            display_name: None,
            wallet_address: None,
            timezone: None,
        }
    }

    pub fn has_wallet(&self) -> bool {
        self.wallet_address.is_some()
    }
}

/// Partial update of the non-credential identity fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityPatch {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub wallet_address: Option<WalletAddress>,
    pub timezone: Option<String>,
}

impl IdentityPatch {
    pub fn wallet(address: WalletAddress) -> Self {
        Self {
            wallet_address: Some(address),
            ..Self::default()
        }
    }
}

// =============================================================================
// Claim Models
// =============================================================================

/// Server-authoritative eligibility snapshot.
///
/// The client never derives `can_claim` itself; it only projects the time
/// left until `next_claim_time`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ClaimState {
    pub can_claim: bool,
    pub next_claim_time: DateTime<Utc>,
    /// Balance fields passed through untouched.
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub balances: serde_json::Map<String, serde_json::Value>,
}

impl ClaimState {
    pub fn new(can_claim: bool, next_claim_time: DateTime<Utc>) -> Self {
        Self {
            can_claim,
            next_claim_time,
            balances: serde_json::Map::new(),
        }
    }
}

// =============================================================================
// Bridge Request Models
// =============================================================================

/// Request to bind a payout address to the current identity.
///
/// The address is kept as raw text so that malformed input reaches the
/// binding gate's validation instead of failing JSON extraction.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BindWalletRequest {
    pub address: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "0x742d35Cc6634C0532925a3b844Bc9e7595f4aB12";

    #[test]
    fn parse_accepts_mixed_case_and_normalizes() {
        let addr = WalletAddress::parse(VALID).unwrap();
        assert_eq!(addr.as_str(), "0x742d35cc6634c0532925a3b844bc9e7595f4ab12");
        assert_eq!(addr, WalletAddress::parse(&VALID.to_lowercase()).unwrap());
    }

    #[test]
    fn parse_ignores_surrounding_whitespace() {
        assert!(WalletAddress::parse(&format!("  {VALID}\n")).is_ok());
    }

    #[test]
    fn parse_rejects_bad_input() {
        let cases = [
            "",
            "0x",
            "742d35Cc6634C0532925a3b844Bc9e7595f4aB12",
            "0xZZZ35Cc6634C0532925a3b844Bc9e7595f4aB12",
            "0x742d35Cc6634C0532925a3b844Bc9e7595f4aB1",
            "0x742d35Cc6634C0532925a3b844Bc9e7595f4aB123",
            "0X742d35Cc6634C0532925a3b844Bc9e7595f4aB12",
        ];
        for case in cases {
            assert_eq!(WalletAddress::parse(case), Err(InvalidAddress), "{case}");
        }
    }

    #[test]
    fn wallet_address_deserialization_validates() {
        let ok: Result<WalletAddress, _> = serde_json::from_str(&format!("\"{VALID}\""));
        assert!(ok.is_ok());

        let bad: Result<WalletAddress, _> = serde_json::from_str("\"0x1234\"");
        assert!(bad.is_err());
    }

    #[test]
    fn claim_state_keeps_balance_fields() {
        let json = r#"{
            "can_claim": false,
            "next_claim_time": "2026-01-01T00:00:00Z",
            "balance": "12.5",
            "token": "FCT"
        }"#;
        let state: ClaimState = serde_json::from_str(json).unwrap();
        assert!(!state.can_claim);
        assert_eq!(state.balances["balance"], "12.5");
        assert_eq!(state.balances["token"], "FCT");
    }
}
