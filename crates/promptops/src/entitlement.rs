use crate::db::queries::usage_records::UsageMeasure;
use crate::db::{model, Database, ModelId, UsageRecord, UserId};
use crate::{Error, Result};
use anyhow::anyhow;
use chrono::{Months, Utc};
use promptops_api::{ModelTier, Plan, QuotaStatus, UsageResponse};
use std::str::FromStr;
use std::sync::Arc;

/// Length of one billing period. Windows advance in whole periods from the
/// previous period end, so month-length irregularities never accumulate.
pub const BILLING_PERIOD: Months = Months::new(1);

/// A quota ceiling. Kept as a sum type so "unlimited" can never be compared
/// as a number downstream; the `-1` convention is translated exactly once,
/// here at the catalog boundary.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Limit {
    Finite(u32),
    Unlimited,
}

impl Limit {
    pub const fn from_raw(raw: i64) -> Self {
        if raw < 0 {
            Limit::Unlimited
        } else {
            Limit::Finite(raw as u32)
        }
    }

    pub const fn as_raw(self) -> i64 {
        match self {
            Limit::Finite(limit) => limit as i64,
            Limit::Unlimited => -1,
        }
    }

    /// Whether one more unit may be consumed at the given usage level.
    /// Strictly `used < limit`: with a limit of 15, the first 15 requests
    /// succeed and the 16th is denied.
    pub fn permits(self, used: i32) -> bool {
        match self {
            Limit::Unlimited => true,
            Limit::Finite(limit) => (used.max(0) as u32) < limit,
        }
    }
}

pub struct PlanLimits {
    pub prompts_per_period: Limit,
    pub enhancements_per_period: Limit,
    pub max_saved_prompts: Limit,
    pub allowed_model_tiers: &'static [ModelTier],
}

const FREE_LIMITS: PlanLimits = PlanLimits {
    prompts_per_period: Limit::from_raw(15),
    enhancements_per_period: Limit::from_raw(5),
    max_saved_prompts: Limit::from_raw(10),
    allowed_model_tiers: &[ModelTier::Free],
};

const PRO_LIMITS: PlanLimits = PlanLimits {
    prompts_per_period: Limit::from_raw(200),
    enhancements_per_period: Limit::from_raw(100),
    max_saved_prompts: Limit::from_raw(200),
    allowed_model_tiers: &[ModelTier::Free, ModelTier::Pro],
};

const TEAM_LIMITS: PlanLimits = PlanLimits {
    prompts_per_period: Limit::from_raw(1000),
    enhancements_per_period: Limit::from_raw(500),
    max_saved_prompts: Limit::from_raw(-1),
    allowed_model_tiers: &[ModelTier::Free, ModelTier::Pro, ModelTier::Team],
};

const ENTERPRISE_LIMITS: PlanLimits = PlanLimits {
    prompts_per_period: Limit::from_raw(-1),
    enhancements_per_period: Limit::from_raw(-1),
    max_saved_prompts: Limit::from_raw(-1),
    allowed_model_tiers: &[ModelTier::Free, ModelTier::Pro, ModelTier::Team],
};

pub fn limits(plan: Plan) -> &'static PlanLimits {
    match plan {
        Plan::Free => &FREE_LIMITS,
        Plan::Pro => &PRO_LIMITS,
        Plan::Team => &TEAM_LIMITS,
        Plan::Enterprise => &ENTERPRISE_LIMITS,
    }
}

/// Plan names come from the denormalized `usage_records.plan` column.
/// Anything unrecognized resolves to the most restrictive tier.
pub fn plan_from_name(name: &str) -> Plan {
    Plan::from_str(name).unwrap_or(Plan::Free)
}

pub fn limits_for_plan_name(name: &str) -> &'static PlanLimits {
    limits(plan_from_name(name))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    TestPrompt,
    RunEnhancement,
    SaveNewPrompt,
    InvokeModel(ModelId),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DenyReason {
    QuotaExceeded,
    PlanTierInsufficient,
    ModelDisabled,
}

/// The outcome of an entitlement check. Denials are ordinary data on the
/// hot path; the error channel is reserved for integrity and
/// infrastructure failures.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// The single authority on whether a user may perform a gated action, and
/// the recorder of what they consumed. One instance per process, built in
/// `AppState`.
#[derive(Clone)]
pub struct EntitlementEngine {
    db: Arc<Database>,
}

impl EntitlementEngine {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Decides whether `user_id` may perform `action` right now. Rolls the
    /// user's billing period forward first if it has lapsed, so a check
    /// against a stale window can never deny (or permit) based on last
    /// month's counters.
    ///
    /// A later `record_usage` is deliberately not atomic with this check:
    /// two near-simultaneous requests may both pass at `used == limit - 1`
    /// and land the counter one past the limit. Quotas here are guidance,
    /// not hard reservations, and that window is accepted.
    pub async fn can_perform(&self, user_id: UserId, action: Action) -> Result<Decision> {
        let now = Utc::now().naive_utc();
        let record = self.db.rollover_usage_if_expired(user_id, now).await?;
        let limits = limits_for_plan_name(&record.plan);

        let decision = match action {
            Action::TestPrompt => check_quota(limits.prompts_per_period, record.prompts_used),
            Action::RunEnhancement => {
                check_quota(limits.enhancements_per_period, record.enhancements_used)
            }
            Action::SaveNewPrompt => check_quota(limits.max_saved_prompts, record.prompts_saved),
            Action::InvokeModel(model_id) => match self.db.get_model(model_id).await? {
                Some(model) => authorize_model_access(limits, &model),
                // An id that matches no registry row is indistinguishable
                // from a delisted model to the caller.
                None => Decision::Denied(DenyReason::ModelDisabled),
            },
        };

        if let Decision::Denied(reason) = decision {
            tracing::info!(
                target: "entitlement denial",
                user_id = user_id.0,
                plan = %record.plan,
                action = ?action,
                reason = ?reason,
                prompts_used = record.prompts_used,
                enhancements_used = record.enhancements_used,
                prompts_saved = record.prompts_saved,
            );
        }

        Ok(decision)
    }

    /// Records one unit of consumption. Callers invoke this only after the
    /// gated action actually succeeded, so a failed upstream call never
    /// charges quota.
    pub async fn record_usage(&self, user_id: UserId, action: Action) -> Result<UsageRecord> {
        match action {
            Action::TestPrompt => self.db.increment_usage(user_id, UsageMeasure::Prompts).await,
            Action::RunEnhancement => {
                self.db
                    .increment_usage(user_id, UsageMeasure::Enhancements)
                    .await
            }
            Action::SaveNewPrompt => self.db.adjust_saved_count(user_id, 1).await,
            Action::InvokeModel(_) => Err(Error::Internal(anyhow!(
                "model invocation has no usage counter to record"
            ))),
        }
    }

    /// Explicit rollover entry point; a no-op while the current period is
    /// still running.
    pub async fn period_rollover(&self, user_id: UserId) -> Result<UsageRecord> {
        self.db
            .rollover_usage_if_expired(user_id, Utc::now().naive_utc())
            .await
    }

    /// Applies a plan change from billing. Takes effect immediately via the
    /// catalog lookup on the next check; counters are not reset mid-period.
    pub async fn set_plan(&self, user_id: UserId, plan: Plan) -> Result<UsageRecord> {
        self.db.set_plan(user_id, plan).await
    }

    /// Read-only usage snapshot for UI meters, in wire form (`-1` for
    /// unlimited).
    pub async fn usage(&self, user_id: UserId) -> Result<UsageResponse> {
        let now = Utc::now().naive_utc();
        let record = self.db.rollover_usage_if_expired(user_id, now).await?;
        let plan = plan_from_name(&record.plan);
        let limits = limits(plan);

        Ok(UsageResponse {
            plan,
            period_start_at: record.period_start_at,
            period_end_at: record.period_end_at,
            prompts: QuotaStatus::new(record.prompts_used, limits.prompts_per_period.as_raw()),
            enhancements: QuotaStatus::new(
                record.enhancements_used,
                limits.enhancements_per_period.as_raw(),
            ),
            saved_prompts: QuotaStatus::new(
                record.prompts_saved,
                limits.max_saved_prompts.as_raw(),
            ),
        })
    }

    /// The models the user's plan may invoke right now, for the model
    /// picker. Disabled models are omitted rather than annotated.
    pub async fn accessible_models(&self, user_id: UserId) -> Result<Vec<model::Model>> {
        let now = Utc::now().naive_utc();
        let record = self.db.rollover_usage_if_expired(user_id, now).await?;
        let limits = limits_for_plan_name(&record.plan);

        Ok(self
            .db
            .list_models()
            .await?
            .into_iter()
            .filter(|model| authorize_model_access(limits, model).is_allowed())
            .collect())
    }
}

fn check_quota(limit: Limit, used: i32) -> Decision {
    if limit.permits(used) {
        Decision::Allowed
    } else {
        Decision::Denied(DenyReason::QuotaExceeded)
    }
}

/// Tier membership and the enabled flag are independent checks; a
/// sufficient plan can still be denied on a disabled model.
fn authorize_model_access(limits: &PlanLimits, model: &model::Model) -> Decision {
    let Ok(tier) = ModelTier::from_str(&model.tier) else {
        return Decision::Denied(DenyReason::ModelDisabled);
    };
    if !limits.allowed_model_tiers.contains(&tier) {
        return Decision::Denied(DenyReason::PlanTierInsufficient);
    }
    if !model.enabled {
        return Decision::Denied(DenyReason::ModelDisabled);
    }
    Decision::Allowed
}
