//! User entity model
//!
//! Users are created on first login through the external identity provider
//! and own every connection, metric row and insight.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Subject id from the identity provider (unique when present)
    pub google_id: Option<String>,

    /// Unique email address
    pub email: String,

    pub name: Option<String>,

    pub avatar_url: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::platform_connection::Entity")]
    PlatformConnections,
}

impl Related<super::platform_connection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PlatformConnections.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
