//! Single-use verification/reset token helpers.
//!
//! Raw tokens only ever travel inside email links; the credential store
//! keeps their SHA-256 digest.
use anyhow::Context;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

use crate::users::repo_types::PendingToken;

const TOKEN_BYTES: usize = 32;

/// 32 random bytes, hex-encoded.
pub fn generate_token() -> anyhow::Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token")?;
    Ok(hex::encode(bytes))
}

pub fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Pending-token record for `raw`, expiring `ttl` from now.
pub fn pending(raw: &str, ttl: Duration) -> PendingToken {
    PendingToken {
        digest: digest(raw),
        expires_at: OffsetDateTime::now_utc() + ttl,
    }
}
