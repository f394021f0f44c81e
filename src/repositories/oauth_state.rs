//! # OAuth State Repository
//!
//! Pending authorizations, keyed by (user, platform). Each entry is read at
//! most once: the callback consumes it whether or not the exchange succeeds.

use chrono::{DateTime, Duration, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::oauth_state::{self, ActiveModel, Entity, Model};
use crate::platform::Platform;

/// What the connect step remembers for the callback
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub state: String,
    pub code_verifier: Option<String>,
    pub client_pkce: bool,
}

/// Repository for OAuth state database operations
#[derive(Debug, Clone)]
pub struct OAuthStateRepository {
    db: Arc<DatabaseConnection>,
}

impl OAuthStateRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Stores a pending authorization, replacing any earlier one for the pair
    pub async fn create_or_replace(
        &self,
        user_id: Uuid,
        platform: Platform,
        pending: PendingAuthorization,
        ttl: Duration,
    ) -> Result<Model, DbErr> {
        let now = Utc::now();
        let model = Model {
            id: Uuid::new_v4(),
            user_id,
            platform: platform.as_str().to_string(),
            state: pending.state,
            code_verifier: pending.code_verifier,
            client_pkce: pending.client_pkce,
            expires_at: (now + ttl).into(),
            created_at: now.into(),
        };

        let txn = self.db.begin().await?;
        Entity::delete_many()
            .filter(oauth_state::Column::UserId.eq(user_id))
            .filter(oauth_state::Column::Platform.eq(platform.as_str()))
            .exec(&txn)
            .await?;

        let active = ActiveModel {
            id: Set(model.id),
            user_id: Set(model.user_id),
            platform: Set(model.platform.clone()),
            state: Set(model.state.clone()),
            code_verifier: Set(model.code_verifier.clone()),
            client_pkce: Set(model.client_pkce),
            expires_at: Set(model.expires_at),
            created_at: Set(model.created_at),
        };
        // Avoid RETURNING so the insert does not need to unpack a UUID key on SQLite
        Entity::insert(active).exec_without_returning(&txn).await?;
        txn.commit().await?;

        Ok(model)
    }

    /// Removes and returns the pending authorization for the pair, expired or not
    pub async fn find_and_consume(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<Option<Model>, DbErr> {
        let pending = Entity::find()
            .filter(oauth_state::Column::UserId.eq(user_id))
            .filter(oauth_state::Column::Platform.eq(platform.as_str()))
            .one(&*self.db)
            .await?;

        let Some(pending) = pending else {
            return Ok(None);
        };

        // A concurrent callback may have consumed it first; only one caller wins the delete
        let deleted = Entity::delete_by_id(pending.id).exec(&*self.db).await?;
        if deleted.rows_affected == 0 {
            return Ok(None);
        }

        Ok(Some(pending))
    }

    /// Deletes entries that expired before `now`; returns how many went
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, DbErr> {
        let now: DateTimeWithTimeZone = now.into();
        let result = Entity::delete_many()
            .filter(oauth_state::Column::ExpiresAt.lt(now))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
