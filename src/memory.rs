//! In-process store implementations used for local runs and tests.
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::contacts::{
    repo::ContactStore,
    repo_types::{ContactFilter, ContactMessage, ContactStats, ContactStatus, NewContact},
};
use crate::db::StoreError;
use crate::profiles::repo::{Profile, ProfileFields, ProfileStore};
use crate::users::{
    repo::UserStore,
    repo_types::{NewUser, Role, UserAccount, UserFilter, UserStats},
};

fn page<T: Clone>(mut items: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    let offset = offset.max(0) as usize;
    let limit = if limit <= 0 { usize::MAX } else { limit as usize };
    if offset >= items.len() {
        return Vec::new();
    }
    items.drain(..offset);
    items.truncate(limit);
    items
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, UserAccount>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(user: &UserAccount, filter: &UserFilter) -> bool {
        filter.role.map_or(true, |r| user.role == r)
            && filter.verified.map_or(true, |v| user.is_email_verified == v)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserAccount>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_verification_token(
        &self,
        email: &str,
        digest: &str,
    ) -> Result<Option<UserAccount>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| {
                u.email.eq_ignore_ascii_case(email)
                    && u.email_verification
                        .as_ref()
                        .is_some_and(|p| p.digest == digest)
            })
            .cloned())
    }

    async fn create(&self, new_user: NewUser) -> Result<UserAccount, StoreError> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&new_user.email))
        {
            return Err(StoreError::DuplicateKey("users_email_key".into()));
        }
        let now = OffsetDateTime::now_utc();
        let user = UserAccount {
            id: Uuid::new_v4(),
            email: new_user.email,
            password_hash: new_user.password_hash,
            full_name: new_user.full_name,
            role: new_user.role,
            is_email_verified: false,
            email_verification: new_user.email_verification,
            password_reset: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn save(&self, user: &UserAccount) -> Result<UserAccount, StoreError> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.id != user.id && u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::DuplicateKey("users_email_key".into()));
        }
        let slot = users
            .get_mut(&user.id)
            .ok_or_else(|| anyhow::anyhow!("user {} vanished during save", user.id))?;
        *slot = UserAccount {
            updated_at: OffsetDateTime::now_utc(),
            ..user.clone()
        };
        Ok(slot.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.users.write().await.remove(&id).is_some())
    }

    async fn list(&self, filter: &UserFilter) -> Result<Vec<UserAccount>, StoreError> {
        let users = self.users.read().await;
        let mut matching: Vec<UserAccount> = users
            .values()
            .filter(|u| Self::matches(u, filter))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(matching, filter.limit, filter.offset))
    }

    async fn count(&self, filter: &UserFilter) -> Result<i64, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().filter(|u| Self::matches(u, filter)).count() as i64)
    }

    async fn stats(&self) -> Result<UserStats, StoreError> {
        let users = self.users.read().await;
        let mut by_role: BTreeMap<String, i64> = Role::ALL
            .iter()
            .map(|r| (r.as_str().to_string(), 0))
            .collect();
        for user in users.values() {
            *by_role.entry(user.role.as_str().to_string()).or_default() += 1;
        }
        let total = users.len() as i64;
        let verified = users.values().filter(|u| u.is_email_verified).count() as i64;
        Ok(UserStats {
            total,
            verified,
            unverified: total - verified,
            by_role,
        })
    }
}

#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<Uuid, Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Profile>, StoreError> {
        Ok(self.profiles.read().await.get(&user_id).cloned())
    }

    async fn create(&self, user_id: Uuid, fields: ProfileFields) -> Result<Profile, StoreError> {
        let mut profiles = self.profiles.write().await;
        if profiles.contains_key(&user_id) {
            return Err(StoreError::DuplicateKey("profiles_user_id_key".into()));
        }
        let now = OffsetDateTime::now_utc();
        let mut profile = Profile {
            id: Uuid::new_v4(),
            user_id,
            bio: None,
            location: None,
            country: None,
            phone_number: None,
            profile_image: None,
            created_at: now,
            updated_at: now,
        };
        profile.apply(fields);
        profiles.insert(user_id, profile.clone());
        Ok(profile)
    }

    async fn save(&self, profile: &Profile) -> Result<Profile, StoreError> {
        let mut profiles = self.profiles.write().await;
        let slot = profiles
            .get_mut(&profile.user_id)
            .ok_or_else(|| anyhow::anyhow!("profile {} vanished during save", profile.id))?;
        *slot = Profile {
            updated_at: OffsetDateTime::now_utc(),
            ..profile.clone()
        };
        Ok(slot.clone())
    }

    async fn delete_by_user(&self, user_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.profiles.write().await.remove(&user_id).is_some())
    }
}

#[derive(Default)]
pub struct MemoryContactStore {
    contacts: RwLock<HashMap<Uuid, ContactMessage>>,
}

impl MemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn create(&self, c: NewContact) -> Result<ContactMessage, StoreError> {
        let now = OffsetDateTime::now_utc();
        let contact = ContactMessage {
            id: Uuid::new_v4(),
            user_id: c.user_id,
            name: c.name,
            email: c.email,
            subject: c.subject,
            message: c.message,
            status: ContactStatus::New,
            reply: None,
            replied_at: None,
            replied_by: None,
            ip_address: c.ip_address,
            user_agent: c.user_agent,
            created_at: now,
            updated_at: now,
        };
        self.contacts
            .write()
            .await
            .insert(contact.id, contact.clone());
        Ok(contact)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ContactMessage>, StoreError> {
        Ok(self.contacts.read().await.get(&id).cloned())
    }

    async fn list(&self, filter: &ContactFilter) -> Result<Vec<ContactMessage>, StoreError> {
        let contacts = self.contacts.read().await;
        let mut matching: Vec<ContactMessage> = contacts
            .values()
            .filter(|c| filter.status.map_or(true, |s| c.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(matching, filter.limit, filter.offset))
    }

    async fn count(&self, filter: &ContactFilter) -> Result<i64, StoreError> {
        let contacts = self.contacts.read().await;
        Ok(contacts
            .values()
            .filter(|c| filter.status.map_or(true, |s| c.status == s))
            .count() as i64)
    }

    async fn save(&self, contact: &ContactMessage) -> Result<ContactMessage, StoreError> {
        let mut contacts = self.contacts.write().await;
        let slot = contacts
            .get_mut(&contact.id)
            .ok_or_else(|| anyhow::anyhow!("contact {} vanished during save", contact.id))?;
        *slot = ContactMessage {
            updated_at: OffsetDateTime::now_utc(),
            ..contact.clone()
        };
        Ok(slot.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.contacts.write().await.remove(&id).is_some())
    }

    async fn stats(&self) -> Result<ContactStats, StoreError> {
        let contacts = self.contacts.read().await;
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for c in contacts.values() {
            *counts.entry(c.status.as_str().to_string()).or_default() += 1;
        }
        Ok(ContactStats::from_counts(counts))
    }
}
