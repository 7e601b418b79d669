use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a signed token may be used for. A token is only accepted by the
/// operation matching its kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Bearer credential for API calls.
    Access,
    /// Cookie-bound credential that mints new access tokens.
    Refresh,
    /// Password-reset link credential; its digest is also stored on the account.
    Reset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id.
    pub sub: Uuid,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}
