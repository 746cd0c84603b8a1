use crate::db::{UsageRecordId, UserId};
use sea_orm::entity::prelude::*;
use serde::Serialize;

/// Per-user usage counters for the current billing period.
///
/// `plan` is a denormalized copy of the user's subscription plan, stored as
/// its string name. Unrecognized values resolve to the free plan's limits at
/// the plan-catalog boundary, never here.
#[derive(Clone, Debug, Default, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "usage_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: UsageRecordId,
    pub user_id: UserId,
    pub plan: String,
    pub prompts_used: i32,
    pub enhancements_used: i32,
    pub prompts_saved: i32,
    pub period_start_at: DateTime,
    pub period_end_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
