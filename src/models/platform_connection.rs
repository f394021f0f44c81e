//! Platform connection entity model
//!
//! One row per (user, platform) OAuth grant. Token columns hold AES-GCM
//! ciphertexts produced by [`crate::crypto::seal_token`]; they are never
//! serialized to API responses.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "platform_connections")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Platform identifier (see [`crate::platform::Platform`])
    pub platform: String,

    /// Encrypted access token
    pub access_token_ciphertext: Vec<u8>,

    /// Encrypted refresh token; absent for platforms that re-exchange instead
    pub refresh_token_ciphertext: Option<Vec<u8>>,

    /// When the access token stops working, if the platform said
    pub expires_at: Option<DateTimeWithTimeZone>,

    /// Ad account id on the platform side
    pub account_id: Option<String>,

    pub account_name: Option<String>,

    /// Platform-specific opaque metadata
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: JsonValue,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
