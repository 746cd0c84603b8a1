use super::*;
use crate::db::tables::usage_record;
use crate::entitlement::BILLING_PERIOD;
use promptops_api::Plan;

/// The two counters that reset at the start of every billing period.
/// `prompts_saved` is not a measure: it tracks occupied slots and only
/// changes through [`Database::adjust_saved_count`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UsageMeasure {
    Prompts,
    Enhancements,
}

impl UsageMeasure {
    fn column(self) -> usage_record::Column {
        match self {
            UsageMeasure::Prompts => usage_record::Column::PromptsUsed,
            UsageMeasure::Enhancements => usage_record::Column::EnhancementsUsed,
        }
    }
}

impl Database {
    pub async fn get_usage_record(&self, user_id: UserId) -> Result<UsageRecord> {
        self.transaction(|tx| async move { get_usage_record_in_tx(user_id, &tx).await })
            .await
    }

    /// Adds one to the given usage counter. The increment happens in SQL
    /// (`SET used = used + 1`), never as a read-modify-write in the
    /// application, so concurrent requests for the same user cannot lose
    /// updates.
    pub async fn increment_usage(
        &self,
        user_id: UserId,
        measure: UsageMeasure,
    ) -> Result<UsageRecord> {
        self.transaction(|tx| async move {
            let column = measure.column();
            let affected = usage_record::Entity::update_many()
                .col_expr(column, Expr::col(column).add(1))
                .filter(usage_record::Column::UserId.eq(user_id))
                .exec(&*tx)
                .await?
                .rows_affected;
            if affected == 0 {
                return Err(Error::UserNotFound(user_id));
            }

            get_usage_record_in_tx(user_id, &tx).await
        })
        .await
    }

    /// Advances the billing window if `now` has passed its end, zeroing
    /// `prompts_used` and `enhancements_used` and leaving `prompts_saved`
    /// alone. Windows stay consecutive: each advance sets
    /// `period_start = old period_end`, so repeated rollovers accumulate no
    /// drift. A record whose period is still current is returned unchanged.
    pub async fn rollover_usage_if_expired(
        &self,
        user_id: UserId,
        now: NaiveDateTime,
    ) -> Result<UsageRecord> {
        self.transaction(|tx| async move {
            let record = get_usage_record_in_tx(user_id, &tx).await?;
            if now <= record.period_end_at {
                return Ok(record);
            }

            let (period_start_at, period_end_at) =
                advance_period(record.period_start_at, record.period_end_at, now)?;
            let mut record = record.into_active_model();
            record.prompts_used = ActiveValue::set(0);
            record.enhancements_used = ActiveValue::set(0);
            record.period_start_at = ActiveValue::set(period_start_at);
            record.period_end_at = ActiveValue::set(period_end_at);
            Ok(record.update(&*tx).await?)
        })
        .await
    }

    /// Rolls every expired usage record forward. Used by the background
    /// sweep; lazy rollover in the entitlement checks remains the
    /// correctness mechanism.
    pub async fn rollover_expired_periods(&self, now: NaiveDateTime) -> Result<usize> {
        self.transaction(|tx| async move {
            let expired = usage_record::Entity::find()
                .filter(usage_record::Column::PeriodEndAt.lt(now))
                .all(&*tx)
                .await?;

            let count = expired.len();
            for record in expired {
                let (period_start_at, period_end_at) =
                    advance_period(record.period_start_at, record.period_end_at, now)?;
                let mut record = record.into_active_model();
                record.prompts_used = ActiveValue::set(0);
                record.enhancements_used = ActiveValue::set(0);
                record.period_start_at = ActiveValue::set(period_start_at);
                record.period_end_at = ActiveValue::set(period_end_at);
                record.update(&*tx).await?;
            }

            Ok(count)
        })
        .await
    }

    /// Adjusts the saved-prompt slot count, clamping at zero. Like
    /// `increment_usage`, the arithmetic happens in SQL.
    pub async fn adjust_saved_count(&self, user_id: UserId, delta: i32) -> Result<UsageRecord> {
        self.transaction(|tx| async move { adjust_saved_count_in_tx(user_id, delta, &tx).await })
            .await
    }

    /// Updates the denormalized plan. Counters and the period window are
    /// left untouched: a mid-period plan change takes effect purely by
    /// changing which limits later checks look up.
    pub async fn set_plan(&self, user_id: UserId, plan: Plan) -> Result<UsageRecord> {
        self.transaction(|tx| async move {
            let affected = usage_record::Entity::update_many()
                .col_expr(usage_record::Column::Plan, Expr::value(plan.to_string()))
                .filter(usage_record::Column::UserId.eq(user_id))
                .exec(&*tx)
                .await?
                .rows_affected;
            if affected == 0 {
                return Err(Error::UserNotFound(user_id));
            }

            get_usage_record_in_tx(user_id, &tx).await
        })
        .await
    }
}

pub(crate) async fn get_usage_record_in_tx(
    user_id: UserId,
    tx: &DatabaseTransaction,
) -> Result<UsageRecord> {
    usage_record::Entity::find()
        .filter(usage_record::Column::UserId.eq(user_id))
        .one(tx)
        .await?
        .ok_or(Error::UserNotFound(user_id))
}

pub(crate) async fn adjust_saved_count_in_tx(
    user_id: UserId,
    delta: i32,
    tx: &DatabaseTransaction,
) -> Result<UsageRecord> {
    let affected = usage_record::Entity::update_many()
        .col_expr(
            usage_record::Column::PromptsSaved,
            Expr::col(usage_record::Column::PromptsSaved).add(delta),
        )
        .filter(usage_record::Column::UserId.eq(user_id))
        .filter(Expr::expr(Expr::col(usage_record::Column::PromptsSaved).add(delta)).gte(0))
        .exec(tx)
        .await?
        .rows_affected;

    let record = get_usage_record_in_tx(user_id, tx).await?;
    if affected == 0 && delta < 0 && record.prompts_saved + delta < 0 {
        // Crossing the floor clamps to zero rather than going negative.
        let mut record = record.into_active_model();
        record.prompts_saved = ActiveValue::set(0);
        return Ok(record.update(tx).await?);
    }

    Ok(record)
}

fn advance_period(
    period_start_at: NaiveDateTime,
    period_end_at: NaiveDateTime,
    now: NaiveDateTime,
) -> Result<(NaiveDateTime, NaiveDateTime)> {
    let mut start = period_start_at;
    let mut end = period_end_at;
    while now > end {
        start = end;
        end = start
            .checked_add_months(BILLING_PERIOD)
            .ok_or_else(|| anyhow!("billing period end overflows the calendar"))?;
    }
    Ok((start, end))
}
