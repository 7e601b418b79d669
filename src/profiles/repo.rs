use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::StoreError;

/// Optional descriptive data attached one-to-one to a user account.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub phone_number: Option<String>,
    pub profile_image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileFields {
    pub bio: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub phone_number: Option<String>,
    pub profile_image: Option<String>,
}

impl Profile {
    pub fn apply(&mut self, fields: ProfileFields) {
        self.bio = fields.bio;
        self.location = fields.location;
        self.country = fields.country;
        self.phone_number = fields.phone_number;
        self.profile_image = fields.profile_image;
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Profile>, StoreError>;
    /// Fails with `DuplicateKey` when the user already has a profile.
    async fn create(&self, user_id: Uuid, fields: ProfileFields) -> Result<Profile, StoreError>;
    async fn save(&self, profile: &Profile) -> Result<Profile, StoreError>;
    async fn delete_by_user(&self, user_id: Uuid) -> Result<bool, StoreError>;
}

#[derive(Clone)]
pub struct PgProfileStore {
    db: PgPool,
}

impl PgProfileStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Profile>, StoreError> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            SELECT id, user_id, bio, location, country, phone_number, profile_image,
                   created_at, updated_at
            FROM profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(profile)
    }

    async fn create(&self, user_id: Uuid, fields: ProfileFields) -> Result<Profile, StoreError> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (user_id, bio, location, country, phone_number, profile_image)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, bio, location, country, phone_number, profile_image,
                      created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(fields.bio)
        .bind(fields.location)
        .bind(fields.country)
        .bind(fields.phone_number)
        .bind(fields.profile_image)
        .fetch_one(&self.db)
        .await?;
        Ok(profile)
    }

    async fn save(&self, profile: &Profile) -> Result<Profile, StoreError> {
        let saved = sqlx::query_as::<_, Profile>(
            r#"
            UPDATE profiles SET
                bio = $2, location = $3, country = $4, phone_number = $5,
                profile_image = $6, updated_at = now()
            WHERE id = $1
            RETURNING id, user_id, bio, location, country, phone_number, profile_image,
                      created_at, updated_at
            "#,
        )
        .bind(profile.id)
        .bind(&profile.bio)
        .bind(&profile.location)
        .bind(&profile.country)
        .bind(&profile.phone_number)
        .bind(&profile.profile_image)
        .fetch_one(&self.db)
        .await?;
        Ok(saved)
    }

    async fn delete_by_user(&self, user_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM profiles WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
