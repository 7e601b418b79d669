use std::sync::Arc;

use axum::extract::FromRef;

use crate::config::AppConfig;
use crate::contacts::repo::{ContactStore, PgContactStore};
use crate::db;
use crate::mail::{self, Mailer};
use crate::memory::{MemoryContactStore, MemoryProfileStore, MemoryUserStore};
use crate::profiles::repo::{PgProfileStore, ProfileStore};
use crate::users::repo::{PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub contacts: Arc<dyn ContactStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl AppState {
    /// Load configuration from the environment, connect to Postgres, apply
    /// migrations and select the mail transport.
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let pool = db::connect(&config).await?;
        db::run_migrations(&pool).await;

        let mailer = mail::from_config(&config.mail)?;

        Ok(Self {
            users: Arc::new(PgUserStore::new(pool.clone())),
            profiles: Arc::new(PgProfileStore::new(pool.clone())),
            contacts: Arc::new(PgContactStore::new(pool)),
            config,
            mailer,
        })
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        profiles: Arc<dyn ProfileStore>,
        contacts: Arc<dyn ContactStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            config,
            users,
            profiles,
            contacts,
            mailer,
        }
    }

    /// State backed entirely by in-process stores.
    pub fn in_memory(config: AppConfig, mailer: Arc<dyn Mailer>) -> Self {
        Self::from_parts(
            Arc::new(config),
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemoryProfileStore::new()),
            Arc::new(MemoryContactStore::new()),
            mailer,
        )
    }
}
