//! Campaign metric entity model
//!
//! Normalized performance of one campaign on one calendar day. Every measure
//! is nullable: `None` means the platform did not report it.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "campaign_metrics")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    pub platform: String,

    /// Connection that produced the row; cleared when that connection is deleted
    pub platform_connection_id: Option<Uuid>,

    pub campaign_id: String,

    pub campaign_name: String,

    /// Day the measures belong to
    pub date: Date,

    pub spend: Option<f64>,
    pub impressions: Option<i64>,
    pub clicks: Option<i64>,
    pub conversions: Option<f64>,

    // Ratios the platform precomputed, if any
    pub cost_per_conversion: Option<f64>,
    pub conversion_rate: Option<f64>,
    pub ctr: Option<f64>,
    pub cpc: Option<f64>,
    pub roas: Option<f64>,

    /// Reported conversion value in account currency
    pub conversion_value: Option<f64>,

    pub created_at: DateTimeWithTimeZone,
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
    #[sea_orm(
        belongs_to = "super::platform_connection::Entity",
        from = "Column::PlatformConnectionId",
        to = "super::platform_connection::Column::Id",
        on_delete = "SetNull"
    )]
    PlatformConnection,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::platform_connection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PlatformConnection.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
