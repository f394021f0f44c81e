//! Stored insight repository

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::metric_insight::{self, Entity as MetricInsight};

#[derive(Debug, Clone)]
pub struct InsightRepository {
    db: Arc<DatabaseConnection>,
}

impl InsightRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Newest insights for a user, at most `limit`
    pub async fn list_recent(
        &self,
        user_id: Uuid,
        limit: u64,
    ) -> Result<Vec<metric_insight::Model>, DbErr> {
        MetricInsight::find()
            .filter(metric_insight::Column::UserId.eq(user_id))
            .order_by_desc(metric_insight::Column::CreatedAt)
            .order_by_asc(metric_insight::Column::Id)
            .limit(limit)
            .all(&*self.db)
            .await
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        insight_type: &str,
        title: &str,
        message: &str,
        created_at: DateTime<Utc>,
    ) -> Result<metric_insight::Model, DbErr> {
        let model = metric_insight::Model {
            id: Uuid::new_v4(),
            user_id,
            insight_type: insight_type.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            created_at: created_at.into(),
        };

        let active = metric_insight::ActiveModel {
            id: Set(model.id),
            user_id: Set(model.user_id),
            insight_type: Set(model.insight_type.clone()),
            title: Set(model.title.clone()),
            message: Set(model.message.clone()),
            created_at: Set(model.created_at),
        };
        MetricInsight::insert(active)
            .exec_without_returning(&*self.db)
            .await?;

        Ok(model)
    }
}
