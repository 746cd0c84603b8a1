use super::*;
use crate::db::tables::{prompt, usage_record, user};
use promptops_api::Plan;

impl Database {
    /// Creates a user together with its zeroed usage record, in one
    /// transaction. The first billing period starts at `now` and runs for
    /// one period length.
    pub async fn create_user(
        &self,
        email_address: &str,
        admin: bool,
        plan: Plan,
        now: NaiveDateTime,
    ) -> Result<User> {
        self.transaction(|tx| async move {
            let user = user::Entity::insert(user::ActiveModel {
                id: ActiveValue::not_set(),
                email_address: ActiveValue::set(email_address.to_string()),
                admin: ActiveValue::set(admin),
                created_at: ActiveValue::set(now),
            })
            .exec_with_returning(&*tx)
            .await?;

            let period_end_at = now
                .checked_add_months(crate::entitlement::BILLING_PERIOD)
                .ok_or_else(|| anyhow!("billing period end overflows the calendar"))?;
            usage_record::Entity::insert(usage_record::ActiveModel {
                id: ActiveValue::not_set(),
                user_id: ActiveValue::set(user.id),
                plan: ActiveValue::set(plan.to_string()),
                prompts_used: ActiveValue::set(0),
                enhancements_used: ActiveValue::set(0),
                prompts_saved: ActiveValue::set(0),
                period_start_at: ActiveValue::set(now),
                period_end_at: ActiveValue::set(period_end_at),
            })
            .exec(&*tx)
            .await?;

            Ok(user)
        })
        .await
    }

    pub async fn get_user_by_id(&self, id: UserId) -> Result<Option<User>> {
        self.transaction(|tx| async move {
            Ok(user::Entity::find_by_id(id).one(&*tx).await?)
        })
        .await
    }

    pub async fn get_user_by_email(&self, email_address: &str) -> Result<Option<User>> {
        self.transaction(|tx| async move {
            Ok(user::Entity::find()
                .filter(user::Column::EmailAddress.eq(email_address))
                .one(&*tx)
                .await?)
        })
        .await
    }

    /// Deletes the user together with their usage record and saved prompts.
    pub async fn destroy_user(&self, id: UserId) -> Result<()> {
        self.transaction(|tx| async move {
            prompt::Entity::delete_many()
                .filter(prompt::Column::UserId.eq(id))
                .exec(&*tx)
                .await?;
            usage_record::Entity::delete_many()
                .filter(usage_record::Column::UserId.eq(id))
                .exec(&*tx)
                .await?;
            user::Entity::delete_by_id(id).exec(&*tx).await?;
            Ok(())
        })
        .await
    }
}
