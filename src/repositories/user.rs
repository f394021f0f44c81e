//! User repository

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::user::{self, Entity as User};

/// Profile fields supplied by the identity provider on login
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub google_id: Option<String>,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl UserRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<user::Model>> {
        Ok(User::find_by_id(id).one(&*self.db).await?)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>> {
        Ok(User::find()
            .filter(user::Column::Email.eq(email))
            .one(&*self.db)
            .await?)
    }

    pub async fn find_by_google_id(&self, google_id: &str) -> Result<Option<user::Model>> {
        Ok(User::find()
            .filter(user::Column::GoogleId.eq(google_id))
            .one(&*self.db)
            .await?)
    }

    /// Creates a user; email and google id must be unused
    pub async fn create(&self, new_user: NewUser) -> Result<user::Model> {
        let id = Uuid::new_v4();
        let now = Utc::now().into();

        let active = user::ActiveModel {
            id: Set(id),
            google_id: Set(new_user.google_id),
            email: Set(new_user.email),
            name: Set(new_user.name),
            avatar_url: Set(new_user.avatar_url),
            created_at: Set(now),
            updated_at: Set(now),
        };
        User::insert(active).exec_without_returning(&*self.db).await?;

        self.get(id)
            .await?
            .ok_or_else(|| anyhow!("user '{}' not persisted", id))
    }

    /// Returns the user linked to `google_id`, creating it on first login.
    ///
    /// Profile fields of an existing user are refreshed; the id and email never change.
    pub async fn find_or_create_by_google_id(&self, new_user: NewUser) -> Result<user::Model> {
        let google_id = new_user
            .google_id
            .clone()
            .ok_or_else(|| anyhow!("google_id is required"))?;

        if let Some(existing) = self.find_by_google_id(&google_id).await? {
            if existing.name == new_user.name && existing.avatar_url == new_user.avatar_url {
                return Ok(existing);
            }
            let mut model: user::ActiveModel = existing.into();
            model.name = Set(new_user.name);
            model.avatar_url = Set(new_user.avatar_url);
            model.updated_at = Set(Utc::now().into());
            return Ok(sea_orm::ActiveModelTrait::update(model, &*self.db).await?);
        }

        self.create(new_user).await
    }
}
