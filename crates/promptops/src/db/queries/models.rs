use super::*;
use crate::db::tables::model;
use promptops_api::{ModelProvider, ModelTier};

pub struct NewModelParams {
    pub name: String,
    pub provider: ModelProvider,
    pub tier: ModelTier,
    pub enabled: bool,
}

/// The registry entries seeded on startup. Deployments add further models
/// through `create_model`.
fn default_models() -> Vec<NewModelParams> {
    fn model(name: &str, provider: ModelProvider, tier: ModelTier) -> NewModelParams {
        NewModelParams {
            name: name.to_string(),
            provider,
            tier,
            enabled: true,
        }
    }

    vec![
        model("gpt-4o-mini", ModelProvider::OpenAi, ModelTier::Free),
        model("gpt-4o", ModelProvider::OpenAi, ModelTier::Pro),
        model("claude-3-5-haiku", ModelProvider::Anthropic, ModelTier::Free),
        model("claude-3-5-sonnet", ModelProvider::Anthropic, ModelTier::Pro),
        model("claude-3-opus", ModelProvider::Anthropic, ModelTier::Team),
        model("gemini-1.5-pro", ModelProvider::Google, ModelTier::Pro),
    ]
}

impl Database {
    /// Seeds the model registry with the built-in models, skipping any name
    /// that already has a row so redeploys don't clobber admin edits.
    pub async fn initialize_models(&self) -> Result<()> {
        self.transaction(|tx| async move {
            let existing_models = model::Entity::find().all(&*tx).await?;

            let mut new_models = default_models()
                .into_iter()
                .filter(|params| !existing_models.iter().any(|m| m.name == params.name))
                .map(|params| model::ActiveModel {
                    id: ActiveValue::not_set(),
                    name: ActiveValue::set(params.name),
                    provider: ActiveValue::set(params.provider.to_string()),
                    tier: ActiveValue::set(params.tier.to_string()),
                    enabled: ActiveValue::set(params.enabled),
                })
                .peekable();

            if new_models.peek().is_some() {
                model::Entity::insert_many(new_models).exec(&*tx).await?;
            }

            Ok(())
        })
        .await
    }

    pub async fn get_model(&self, id: ModelId) -> Result<Option<model::Model>> {
        self.transaction(|tx| async move {
            Ok(model::Entity::find_by_id(id).one(&*tx).await?)
        })
        .await
    }

    pub async fn get_model_by_name(&self, name: &str) -> Result<Option<model::Model>> {
        self.transaction(|tx| async move {
            Ok(model::Entity::find()
                .filter(model::Column::Name.eq(name))
                .one(&*tx)
                .await?)
        })
        .await
    }

    pub async fn list_models(&self) -> Result<Vec<model::Model>> {
        self.transaction(|tx| async move {
            Ok(model::Entity::find()
                .order_by_asc(model::Column::Name)
                .all(&*tx)
                .await?)
        })
        .await
    }

    pub async fn create_model(&self, params: NewModelParams) -> Result<model::Model> {
        let params = &params;
        self.transaction(|tx| async move {
            Ok(model::Entity::insert(model::ActiveModel {
                id: ActiveValue::not_set(),
                name: ActiveValue::set(params.name.clone()),
                provider: ActiveValue::set(params.provider.to_string()),
                tier: ActiveValue::set(params.tier.to_string()),
                enabled: ActiveValue::set(params.enabled),
            })
            .exec_with_returning(&*tx)
            .await?)
        })
        .await
    }

    pub async fn set_model_enabled(&self, id: ModelId, enabled: bool) -> Result<()> {
        self.transaction(|tx| async move {
            let affected = model::Entity::update_many()
                .col_expr(model::Column::Enabled, Expr::value(enabled))
                .filter(model::Column::Id.eq(id))
                .exec(&*tx)
                .await?
                .rows_affected;
            if affected == 0 {
                Err(anyhow!("no model with id {id}"))?;
            }
            Ok(())
        })
        .await
    }
}
