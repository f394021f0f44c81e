//! # OAuth State Model
//!
//! Pending authorizations between the connect redirect and the platform
//! callback. At most one per (user, platform).

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "oauth_states")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    pub platform: String,

    /// State token generated for CSRF protection
    pub state: String,

    /// Server-held PKCE verifier. Never leaves the process except in the
    /// token exchange request.
    pub code_verifier: Option<String>,

    /// The client supplied its own challenge and will present the verifier on callback
    pub client_pkce: bool,

    pub expires_at: DateTimeWithTimeZone,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
