//! Shared wire and domain types for the PromptOps service.
//!
//! Consumed by the server as well as by external callers of its HTTP API
//! (the web frontend and the billing webhook sender), so everything in here
//! is plain serde-able data with no service dependencies.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A subscription plan.
///
/// Ordered by generosity: `Free < Pro < Team < Enterprise`.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Plan {
    #[default]
    Free,
    Pro,
    Team,
    Enterprise,
}

/// The access tier of an AI model. A plan may invoke a model only if the
/// model's tier is within the plan's allowed set.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModelTier {
    Free,
    Pro,
    Team,
}

/// The upstream provider backing an AI model.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModelProvider {
    OpenAi,
    Anthropic,
    Google,
}

/// One invocable model, as returned by `GET /users/:id/models`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LanguageModel {
    pub id: i32,
    pub name: String,
    pub provider: ModelProvider,
    pub tier: ModelTier,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListModelsResponse {
    pub models: Vec<LanguageModel>,
}

/// Consumption of a single quota. `limit` uses the `-1 == unlimited` wire
/// convention; `percent_used` is `None` for unlimited quotas.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub used: i32,
    pub limit: i64,
    pub percent_used: Option<u8>,
}

impl QuotaStatus {
    pub fn new(used: i32, limit: i64) -> Self {
        let percent_used = if limit < 0 {
            None
        } else if limit == 0 {
            Some(100)
        } else {
            Some(((used.max(0) as i64 * 100) / limit).min(100) as u8)
        };
        Self {
            used,
            limit,
            percent_used,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit < 0
    }
}

/// Per-user usage snapshot for UI meters, `GET /users/:id/usage`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsageResponse {
    pub plan: Plan,
    pub period_start_at: NaiveDateTime,
    pub period_end_at: NaiveDateTime,
    pub prompts: QuotaStatus,
    pub enhancements: QuotaStatus,
    pub saved_prompts: QuotaStatus,
}

/// Body of the billing webhook, `POST /billing/plan_change`. Sent on
/// subscription create, update, and cancel; a cancellation is an update to
/// `Plan::Free`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanChangeEvent {
    pub user_id: i32,
    pub plan: Plan,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateUserParams {
    pub email_address: String,
    #[serde(default)]
    pub plan: Plan,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateUserResponse {
    pub user_id: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PerformCompletionParams {
    pub model: String,
    pub prompt: String,
}

/// Response to a prompt test or enhancement call. `usage` reflects the
/// quota consumed by this call, after recording.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PerformCompletionResponse {
    pub completion: String,
    pub usage: QuotaStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreatePromptParams {
    pub title: String,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedPrompt {
    pub id: i32,
    pub title: String,
    pub body: String,
    pub created_at: NaiveDateTime,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListPromptsResponse {
    pub prompts: Vec<SavedPrompt>,
}
