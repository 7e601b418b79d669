use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::StoreError;
use crate::users::repo_types::{NewUser, Role, UserAccount, UserFilter, UserRow, UserStats};

/// Credential store contract. Implementations enforce email uniqueness and
/// report violations as `StoreError::DuplicateKey`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserAccount>, StoreError>;
    /// Account whose pending verification digest matches, expired or not.
    async fn find_by_verification_token(
        &self,
        email: &str,
        digest: &str,
    ) -> Result<Option<UserAccount>, StoreError>;
    async fn create(&self, new_user: NewUser) -> Result<UserAccount, StoreError>;
    /// Persist every mutable field of `user`; returns the stored record.
    async fn save(&self, user: &UserAccount) -> Result<UserAccount, StoreError>;
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
    async fn list(&self, filter: &UserFilter) -> Result<Vec<UserAccount>, StoreError>;
    async fn count(&self, filter: &UserFilter) -> Result<i64, StoreError>;
    async fn stats(&self) -> Result<UserStats, StoreError>;
}

const USER_COLUMNS: &str = r#"
    id, email, password_hash, full_name, role, is_email_verified,
    email_verification_token, email_verification_expires,
    password_reset_token, password_reset_expires,
    last_login_at, created_at, updated_at
"#;

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(UserAccount::try_from).transpose()?)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserAccount>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(UserAccount::try_from).transpose()?)
    }

    async fn find_by_verification_token(
        &self,
        email: &str,
        digest: &str,
    ) -> Result<Option<UserAccount>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE lower(email) = lower($1) AND email_verification_token = $2"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .bind(digest)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(UserAccount::try_from).transpose()?)
    }

    async fn create(&self, new_user: NewUser) -> Result<UserAccount, StoreError> {
        let (token, expires) = match &new_user.email_verification {
            Some(p) => (Some(p.digest.clone()), Some(p.expires_at)),
            None => (None, None),
        };
        let sql = format!(
            r#"
            INSERT INTO users (email, password_hash, full_name, role,
                               email_verification_token, email_verification_expires)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(&new_user.full_name)
            .bind(new_user.role.as_str())
            .bind(token)
            .bind(expires)
            .fetch_one(&self.db)
            .await?;
        Ok(UserAccount::try_from(row)?)
    }

    async fn save(&self, user: &UserAccount) -> Result<UserAccount, StoreError> {
        let verification = user.email_verification.as_ref();
        let reset = user.password_reset.as_ref();
        let sql = format!(
            r#"
            UPDATE users SET
                email = $2, password_hash = $3, full_name = $4, role = $5,
                is_email_verified = $6,
                email_verification_token = $7, email_verification_expires = $8,
                password_reset_token = $9, password_reset_expires = $10,
                last_login_at = $11, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.full_name)
            .bind(user.role.as_str())
            .bind(user.is_email_verified)
            .bind(verification.map(|p| p.digest.clone()))
            .bind(verification.map(|p| p.expires_at))
            .bind(reset.map(|p| p.digest.clone()))
            .bind(reset.map(|p| p.expires_at))
            .bind(user.last_login_at)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user {} vanished during save", user.id))?;
        Ok(UserAccount::try_from(row)?)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &UserFilter) -> Result<Vec<UserAccount>, StoreError> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE ($1::text IS NULL OR role = $1)
              AND ($2::bool IS NULL OR is_email_verified = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(filter.role.map(|r| r.as_str()))
            .bind(filter.verified)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.db)
            .await?;
        let users = rows
            .into_iter()
            .map(UserAccount::try_from)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(users)
    }

    async fn count(&self, filter: &UserFilter) -> Result<i64, StoreError> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM users
            WHERE ($1::text IS NULL OR role = $1)
              AND ($2::bool IS NULL OR is_email_verified = $2)
            "#,
        )
        .bind(filter.role.map(|r| r.as_str()))
        .bind(filter.verified)
        .fetch_one(&self.db)
        .await?;
        Ok(total)
    }

    async fn stats(&self) -> Result<UserStats, StoreError> {
        let (total, verified): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE is_email_verified)
            FROM users
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        let grouped: Vec<(String, i64)> =
            sqlx::query_as("SELECT role, COUNT(*) FROM users GROUP BY role")
                .fetch_all(&self.db)
                .await?;

        let mut by_role: BTreeMap<String, i64> = Role::ALL
            .iter()
            .map(|r| (r.as_str().to_string(), 0))
            .collect();
        by_role.extend(grouped);

        Ok(UserStats {
            total,
            verified,
            unverified: total - verified,
            by_role,
        })
    }
}
