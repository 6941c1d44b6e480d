// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorization `state` nonces.

use base64ct::{Base64UrlUnpadded, Encoding};
use ring::rand::SecureRandom;

use super::error::AuthFlowError;

/// Random bytes per nonce (256 bits).
const NONCE_BYTES: usize = 32;

/// Generate a URL-safe nonce.
pub fn generate_nonce(rng: &dyn SecureRandom) -> Result<String, AuthFlowError> {
    let mut buf = [0u8; NONCE_BYTES];
    rng.fill(&mut buf)
        .map_err(|_| AuthFlowError::NonceUnavailable)?;
    Ok(Base64UrlUnpadded::encode_string(&buf))
}
