//! Connection repository (the token store)
//!
//! Persists one OAuth grant per `(user_id, platform)`. Tokens are sealed with
//! [`crate::crypto::seal_token`] on the way in and opened on the way out; the
//! plaintext never touches the database.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::crypto::{CryptoKey, is_encrypted_payload, open_token, seal_token};
use crate::models::platform_connection::{self, Entity as PlatformConnection};
use crate::platform::Platform;

/// Fields a caller wants stored for a `(user, platform)` grant.
///
/// `None` means "not supplied": on update the stored value is kept.
#[derive(Clone)]
pub struct ConnectionCandidate {
    pub user_id: Uuid,
    pub platform: Platform,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    pub metadata: Option<JsonValue>,
}

impl ConnectionCandidate {
    pub fn new(user_id: Uuid, platform: Platform, access_token: impl Into<String>) -> Self {
        Self {
            user_id,
            platform,
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            account_id: None,
            account_name: None,
            metadata: None,
        }
    }
}

impl std::fmt::Debug for ConnectionCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCandidate")
            .field("user_id", &self.user_id)
            .field("platform", &self.platform)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

/// Plaintext tokens of a stored connection
#[derive(Clone)]
pub struct ConnectionTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for ConnectionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionTokens")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Repository for platform connection operations
#[derive(Debug, Clone)]
pub struct ConnectionRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
    /// Crypto key for token encryption
    pub crypto_key: CryptoKey,
}

impl ConnectionRepository {
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    /// Returns the connection for `(user_id, platform)`, if any
    pub async fn get_connection(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<Option<platform_connection::Model>> {
        Ok(PlatformConnection::find()
            .filter(platform_connection::Column::UserId.eq(user_id))
            .filter(platform_connection::Column::Platform.eq(platform.as_str()))
            .one(&*self.db)
            .await?)
    }

    /// Lists every connection owned by a user, oldest first
    pub async fn list_connections(&self, user_id: Uuid) -> Result<Vec<platform_connection::Model>> {
        Ok(PlatformConnection::find()
            .filter(platform_connection::Column::UserId.eq(user_id))
            .order_by_asc(platform_connection::Column::CreatedAt)
            .order_by_asc(platform_connection::Column::Platform)
            .all(&*self.db)
            .await?)
    }

    /// Inserts or merges the connection for the candidate's `(user, platform)`.
    ///
    /// Runs as a single `INSERT .. ON CONFLICT (user_id, platform) DO UPDATE`
    /// whose update list names only the columns the candidate carries, so a
    /// refresh response without a refresh token leaves the stored one intact
    /// regardless of write order.
    pub async fn upsert_connection(
        &self,
        candidate: ConnectionCandidate,
    ) -> Result<platform_connection::Model> {
        use platform_connection::Column;

        let ConnectionCandidate {
            user_id,
            platform,
            access_token,
            refresh_token,
            expires_at,
            account_id,
            account_name,
            metadata,
        } = candidate;

        let now: DateTimeWithTimeZone = Utc::now().into();
        let access_cipher = seal_token(&self.crypto_key, user_id, platform, &access_token)
            .map_err(|e| anyhow!("Token encryption failed: {}", e))?;
        let refresh_cipher = refresh_token
            .as_deref()
            .map(|token| seal_token(&self.crypto_key, user_id, platform, token))
            .transpose()
            .map_err(|e| anyhow!("Token encryption failed: {}", e))?;

        let mut update_columns = vec![Column::AccessTokenCiphertext, Column::UpdatedAt];
        if refresh_cipher.is_some() {
            update_columns.push(Column::RefreshTokenCiphertext);
        }
        if expires_at.is_some() {
            update_columns.push(Column::ExpiresAt);
        }
        if account_id.is_some() {
            update_columns.push(Column::AccountId);
        }
        if account_name.is_some() {
            update_columns.push(Column::AccountName);
        }
        if metadata.is_some() {
            update_columns.push(Column::Metadata);
        }

        let active = platform_connection::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            platform: Set(platform.as_str().to_string()),
            access_token_ciphertext: Set(access_cipher),
            refresh_token_ciphertext: Set(refresh_cipher),
            expires_at: Set(expires_at.map(Into::into)),
            account_id: Set(account_id),
            account_name: Set(account_name),
            metadata: Set(metadata.unwrap_or_else(|| serde_json::json!({}))),
            created_at: Set(now),
            updated_at: Set(now),
        };

        PlatformConnection::insert(active)
            .on_conflict(
                OnConflict::columns([Column::UserId, Column::Platform])
                    .update_columns(update_columns)
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        // Re-read instead of RETURNING so SQLite and Postgres behave the same
        self.get_connection(user_id, platform)
            .await?
            .ok_or_else(|| anyhow!("connection for {} not persisted", platform))
    }

    /// Removes the connection. Deleting an absent connection is a no-op.
    pub async fn delete_connection(&self, user_id: Uuid, platform: Platform) -> Result<bool> {
        let result = PlatformConnection::delete_many()
            .filter(platform_connection::Column::UserId.eq(user_id))
            .filter(platform_connection::Column::Platform.eq(platform.as_str()))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Connections whose access token expires at or before `cutoff`
    pub async fn find_expiring(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<platform_connection::Model>> {
        let cutoff: DateTimeWithTimeZone = cutoff.into();
        Ok(PlatformConnection::find()
            .filter(platform_connection::Column::ExpiresAt.is_not_null())
            .filter(platform_connection::Column::ExpiresAt.lte(cutoff))
            .order_by_asc(platform_connection::Column::ExpiresAt)
            .all(&*self.db)
            .await?)
    }

    /// Opens the stored token ciphertexts of a connection
    pub fn decrypt_tokens(
        &self,
        connection: &platform_connection::Model,
    ) -> Result<ConnectionTokens> {
        let platform: Platform = connection.platform.parse()?;

        let has_legacy_access = !is_encrypted_payload(&connection.access_token_ciphertext);
        let has_legacy_refresh = connection
            .refresh_token_ciphertext
            .as_ref()
            .is_some_and(|token| !is_encrypted_payload(token));
        if has_legacy_access || has_legacy_refresh {
            tracing::warn!(
                user_id = %connection.user_id,
                platform = %platform,
                legacy_access_token = has_legacy_access,
                legacy_refresh_token = has_legacy_refresh,
                "Legacy plaintext tokens detected; they will be sealed on the next upsert"
            );
        }

        let open = |stored: &[u8]| {
            open_token(&self.crypto_key, connection.user_id, platform, stored).map_err(|e| {
                tracing::error!(
                    user_id = %connection.user_id,
                    platform = %platform,
                    "Token decryption failed"
                );
                anyhow!("Token decryption failed: {}", e)
            })
        };

        Ok(ConnectionTokens {
            access_token: open(&connection.access_token_ciphertext)?,
            refresh_token: connection
                .refresh_token_ciphertext
                .as_deref()
                .map(open)
                .transpose()?,
        })
    }

    /// Seals every legacy plaintext token still in the table.
    ///
    /// Returns how many connections were rewritten.
    pub async fn reseal_legacy_tokens(&self) -> Result<u64> {
        use sea_orm::ActiveModelTrait;

        let mut resealed = 0u64;
        for connection in PlatformConnection::find().all(&*self.db).await? {
            let platform: Platform = connection.platform.parse()?;
            let seal = |stored: &[u8]| -> Result<Option<Vec<u8>>> {
                if stored.is_empty() || is_encrypted_payload(stored) {
                    return Ok(None);
                }
                let plaintext = String::from_utf8(stored.to_vec())
                    .map_err(|_| anyhow!("legacy token of {} is not UTF-8", connection.id))?;
                seal_token(&self.crypto_key, connection.user_id, platform, &plaintext)
                    .map(Some)
                    .map_err(|e| anyhow!("Token encryption failed for {}: {}", connection.id, e))
            };

            let access = seal(&connection.access_token_ciphertext)?;
            let refresh = match connection.refresh_token_ciphertext.as_deref() {
                Some(stored) => seal(stored)?,
                None => None,
            };
            if access.is_none() && refresh.is_none() {
                continue;
            }

            let connection_id = connection.id;
            let mut active: platform_connection::ActiveModel = connection.into();
            if let Some(cipher) = access {
                active.access_token_ciphertext = Set(cipher);
            }
            if let Some(cipher) = refresh {
                active.refresh_token_ciphertext = Set(Some(cipher));
            }
            active.updated_at = Set(Utc::now().into());
            active.update(&*self.db).await?;

            tracing::info!(%connection_id, %platform, "Sealed legacy plaintext tokens");
            resealed += 1;
        }
        Ok(resealed)
    }
}
