use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{instrument, warn};

use super::{models::UserIdentity, StatsError};

/// Point reads of a user's identity snapshot
///
/// A user without an identity is an error: statistics are only stored for
/// known users.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get_identity(&self, user_id: &str) -> Result<UserIdentity, StatsError>;
}

#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    users: Arc<RwLock<HashMap<String, UserIdentity>>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, identity: UserIdentity) {
        self.users
            .write()
            .await
            .insert(identity.id.clone(), identity);
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn get_identity(&self, user_id: &str) -> Result<UserIdentity, StatsError> {
        self.users
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| StatsError::Identity(format!("no identity for user {}", user_id)))
    }
}

/// Reads identities from the `users` table
pub struct PostgresIdentityStore {
    pool: PgPool,
}

impl PostgresIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PostgresIdentityStore {
    #[instrument(skip(self))]
    async fn get_identity(&self, user_id: &str) -> Result<UserIdentity, StatsError> {
        sqlx::query_as::<_, UserIdentity>(
            "SELECT id, name, email, picture, locale, verified_email FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, user_id = %user_id, "Failed to fetch identity");
            StatsError::Identity(e.to_string())
        })?
        .ok_or_else(|| StatsError::Identity(format!("no identity for user {}", user_id)))
    }
}
