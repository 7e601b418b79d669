use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::contacts::repo_types::{
    ContactFilter, ContactMessage, ContactRow, ContactStats, ContactStatus, NewContact,
};
use crate::db::StoreError;

#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn create(&self, new_contact: NewContact) -> Result<ContactMessage, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ContactMessage>, StoreError>;
    async fn list(&self, filter: &ContactFilter) -> Result<Vec<ContactMessage>, StoreError>;
    async fn count(&self, filter: &ContactFilter) -> Result<i64, StoreError>;
    async fn save(&self, contact: &ContactMessage) -> Result<ContactMessage, StoreError>;
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
    async fn stats(&self) -> Result<ContactStats, StoreError>;
}

const CONTACT_COLUMNS: &str = r#"
    id, user_id, name, email, subject, message, status, reply, replied_at, replied_by,
    ip_address, user_agent, created_at, updated_at
"#;

#[derive(Clone)]
pub struct PgContactStore {
    db: PgPool,
}

impl PgContactStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn into_messages(rows: Vec<ContactRow>) -> anyhow::Result<Vec<ContactMessage>> {
    rows.into_iter().map(ContactMessage::try_from).collect()
}

#[async_trait]
impl ContactStore for PgContactStore {
    async fn create(&self, c: NewContact) -> Result<ContactMessage, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO contacts (user_id, name, email, subject, message, status,
                                  ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {CONTACT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ContactRow>(&sql)
            .bind(c.user_id)
            .bind(&c.name)
            .bind(&c.email)
            .bind(&c.subject)
            .bind(&c.message)
            .bind(ContactStatus::New.as_str())
            .bind(&c.ip_address)
            .bind(&c.user_agent)
            .fetch_one(&self.db)
            .await?;
        Ok(ContactMessage::try_from(row)?)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ContactMessage>, StoreError> {
        let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = $1");
        let row = sqlx::query_as::<_, ContactRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(ContactMessage::try_from).transpose()?)
    }

    async fn list(&self, filter: &ContactFilter) -> Result<Vec<ContactMessage>, StoreError> {
        let sql = format!(
            r#"
            SELECT {CONTACT_COLUMNS} FROM contacts
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query_as::<_, ContactRow>(&sql)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.db)
            .await?;
        Ok(into_messages(rows)?)
    }

    async fn count(&self, filter: &ContactFilter) -> Result<i64, StoreError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM contacts WHERE ($1::text IS NULL OR status = $1)")
                .bind(filter.status.map(|s| s.as_str()))
                .fetch_one(&self.db)
                .await?;
        Ok(total)
    }

    async fn save(&self, c: &ContactMessage) -> Result<ContactMessage, StoreError> {
        let sql = format!(
            r#"
            UPDATE contacts SET
                status = $2, reply = $3, replied_at = $4, replied_by = $5, updated_at = now()
            WHERE id = $1
            RETURNING {CONTACT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ContactRow>(&sql)
            .bind(c.id)
            .bind(c.status.as_str())
            .bind(&c.reply)
            .bind(c.replied_at)
            .bind(c.replied_by)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("contact {} vanished during save", c.id))?;
        Ok(ContactMessage::try_from(row)?)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM contacts WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn stats(&self) -> Result<ContactStats, StoreError> {
        let grouped: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM contacts GROUP BY status")
                .fetch_all(&self.db)
                .await?;
        Ok(ContactStats::from_counts(grouped))
    }
}

impl ContactStats {
    pub fn from_counts(grouped: impl IntoIterator<Item = (String, i64)>) -> Self {
        let mut by_status: BTreeMap<String, i64> = ContactStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        by_status.extend(grouped);
        Self {
            total: by_status.values().sum(),
            by_status,
        }
    }
}
