use crate::db::ModelId;
use sea_orm::entity::prelude::*;

/// An invocable AI model. `provider` and `tier` hold the string forms of
/// `promptops_api::ModelProvider` / `ModelTier`; parsing happens at the
/// query boundary.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "models")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: ModelId,
    pub name: String,
    pub provider: String,
    pub tier: String,
    pub enabled: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
