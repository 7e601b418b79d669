use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::User, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => anyhow::bail!("unknown role '{other}'"),
        }
    }
}

/// A single-use token digest and its expiry. Held as one value so the two
/// are always set and cleared together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToken {
    pub digest: String,
    pub expires_at: OffsetDateTime,
}

impl PendingToken {
    pub fn is_live(&self, now: OffsetDateTime) -> bool {
        self.expires_at > now
    }

    pub fn accepts(&self, digest: &str, now: OffsetDateTime) -> bool {
        self.is_live(now) && self.digest == digest
    }

    fn from_columns(digest: Option<String>, expires_at: Option<OffsetDateTime>) -> Option<Self> {
        match (digest, expires_at) {
            (Some(digest), Some(expires_at)) => Some(Self { digest, expires_at }),
            _ => None,
        }
    }
}

/// User account as held by the credential store.
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: Role,
    pub is_email_verified: bool,
    pub email_verification: Option<PendingToken>,
    pub password_reset: Option<PendingToken>,
    pub last_login_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl UserAccount {
    pub fn has_role(&self, allowed: &[Role]) -> bool {
        allowed.contains(&self.role)
    }
}

/// Row shape of the `users` table.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: String,
    pub is_email_verified: bool,
    pub email_verification_token: Option<String>,
    pub email_verification_expires: Option<OffsetDateTime>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<OffsetDateTime>,
    pub last_login_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<UserRow> for UserAccount {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            email: r.email,
            password_hash: r.password_hash,
            full_name: r.full_name,
            role: r.role.parse()?,
            is_email_verified: r.is_email_verified,
            email_verification: PendingToken::from_columns(
                r.email_verification_token,
                r.email_verification_expires,
            ),
            password_reset: PendingToken::from_columns(
                r.password_reset_token,
                r.password_reset_expires,
            ),
            last_login_at: r.last_login_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: Role,
    pub email_verification: Option<PendingToken>,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub verified: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total: i64,
    pub verified: i64,
    pub unverified: i64,
    pub by_role: BTreeMap<String, i64>,
}
