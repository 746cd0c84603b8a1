use super::*;
use crate::db::queries::usage_records::{adjust_saved_count_in_tx, get_usage_record_in_tx};
use crate::db::tables::prompt;

impl Database {
    /// Inserts the prompt and claims a saved-prompt slot in one
    /// transaction. Quota gating happens in the entitlement engine before
    /// this is called.
    pub async fn create_prompt(
        &self,
        user_id: UserId,
        title: &str,
        body: &str,
        now: NaiveDateTime,
    ) -> Result<Prompt> {
        self.transaction(|tx| async move {
            // Fails with UserNotFound before inserting anything.
            get_usage_record_in_tx(user_id, &tx).await?;

            let prompt = prompt::Entity::insert(prompt::ActiveModel {
                id: ActiveValue::not_set(),
                user_id: ActiveValue::set(user_id),
                title: ActiveValue::set(title.to_string()),
                body: ActiveValue::set(body.to_string()),
                created_at: ActiveValue::set(now),
            })
            .exec_with_returning(&*tx)
            .await?;

            adjust_saved_count_in_tx(user_id, 1, &tx).await?;

            Ok(prompt)
        })
        .await
    }

    /// Deletes the prompt and releases its slot. Returns false when the
    /// prompt does not exist (or belongs to another user), in which case
    /// the slot count is left alone.
    pub async fn delete_prompt(&self, user_id: UserId, prompt_id: PromptId) -> Result<bool> {
        self.transaction(|tx| async move {
            let affected = prompt::Entity::delete_many()
                .filter(prompt::Column::Id.eq(prompt_id))
                .filter(prompt::Column::UserId.eq(user_id))
                .exec(&*tx)
                .await?
                .rows_affected;
            if affected == 0 {
                return Ok(false);
            }

            adjust_saved_count_in_tx(user_id, -1, &tx).await?;
            Ok(true)
        })
        .await
    }

    pub async fn list_prompts(&self, user_id: UserId) -> Result<Vec<Prompt>> {
        self.transaction(|tx| async move {
            Ok(prompt::Entity::find()
                .filter(prompt::Column::UserId.eq(user_id))
                .order_by_asc(prompt::Column::Id)
                .all(&*tx)
                .await?)
        })
        .await
    }
}
