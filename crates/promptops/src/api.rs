use crate::completion::CompletionRequest;
use crate::db::{PromptId, UserId};
use crate::entitlement::{self, Action, Decision, DenyReason};
use crate::{AppState, Error, Result};
use anyhow::anyhow;
use axum::{
    body::Body,
    extract::Path,
    http::{self, Request, StatusCode},
    middleware::{self, Next},
    response::IntoResponse,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use promptops_api::{
    CreatePromptParams, CreateUserParams, CreateUserResponse, LanguageModel, ListModelsResponse,
    ListPromptsResponse, ModelProvider, ModelTier, PerformCompletionParams,
    PerformCompletionResponse, PlanChangeEvent, QuotaStatus, SavedPrompt, UsageResponse,
};
use std::str::FromStr;
use std::sync::Arc;
use tower::ServiceBuilder;

pub fn routes(state: Arc<AppState>) -> Router<(), Body> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/:id", delete(destroy_user))
        .route("/users/:id/usage", get(get_usage))
        .route("/users/:id/models", get(list_models))
        .route("/users/:id/prompts", get(list_prompts).post(create_prompt))
        .route("/users/:id/prompts/:prompt_id", delete(delete_prompt))
        .route("/users/:id/prompts/test", post(test_prompt))
        .route("/users/:id/prompts/enhance", post(enhance_prompt))
        .route("/billing/plan_change", post(plan_change))
        .layer(
            ServiceBuilder::new()
                .layer(Extension(state))
                .layer(middleware::from_fn(validate_api_token)),
        )
}

/// Callers are trusted backends (the web frontend's server, the billing
/// webhook forwarder); they authenticate with the shared API token and act
/// on behalf of the user named in the path.
async fn validate_api_token<B>(req: Request<B>, next: Next<B>) -> impl IntoResponse {
    let token = req
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| {
            Error::http(
                StatusCode::BAD_REQUEST,
                "missing authorization header".to_string(),
            )
        })?
        .strip_prefix("token ")
        .ok_or_else(|| {
            Error::http(
                StatusCode::BAD_REQUEST,
                "invalid authorization header".to_string(),
            )
        })?;

    let state = req.extensions().get::<Arc<AppState>>().unwrap();

    if token != state.config.api_token {
        Err(Error::http(
            StatusCode::UNAUTHORIZED,
            "invalid authorization token".to_string(),
        ))?
    }

    Ok::<_, Error>(next.run(req).await)
}

async fn create_user(
    Extension(app): Extension<Arc<AppState>>,
    Json(params): Json<CreateUserParams>,
) -> Result<Json<CreateUserResponse>> {
    let user = app
        .db
        .create_user(
            &params.email_address,
            false,
            params.plan,
            Utc::now().naive_utc(),
        )
        .await?;
    Ok(Json(CreateUserResponse { user_id: user.id.0 }))
}

async fn destroy_user(
    Extension(app): Extension<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Result<()> {
    app.db
        .get_user_by_id(user_id)
        .await?
        .ok_or_else(|| Error::http(StatusCode::NOT_FOUND, "user not found".to_string()))?;
    app.db.destroy_user(user_id).await
}

async fn get_usage(
    Extension(app): Extension<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Result<Json<UsageResponse>> {
    Ok(Json(app.entitlement.usage(user_id).await?))
}

async fn list_models(
    Extension(app): Extension<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Result<Json<ListModelsResponse>> {
    let models = app
        .entitlement
        .accessible_models(user_id)
        .await?
        .into_iter()
        .filter_map(|model| {
            Some(LanguageModel {
                id: model.id.0,
                provider: ModelProvider::from_str(&model.provider).ok()?,
                tier: ModelTier::from_str(&model.tier).ok()?,
                name: model.name,
            })
        })
        .collect();

    Ok(Json(ListModelsResponse { models }))
}

async fn test_prompt(
    Extension(app): Extension<Arc<AppState>>,
    Path(user_id): Path<UserId>,
    Json(params): Json<PerformCompletionParams>,
) -> Result<Json<PerformCompletionResponse>> {
    perform_completion(app, user_id, Action::TestPrompt, params).await
}

async fn enhance_prompt(
    Extension(app): Extension<Arc<AppState>>,
    Path(user_id): Path<UserId>,
    Json(params): Json<PerformCompletionParams>,
) -> Result<Json<PerformCompletionResponse>> {
    perform_completion(app, user_id, Action::RunEnhancement, params).await
}

/// The gated hot path: check quota, check model access, call the provider,
/// and record consumption only once the provider call has succeeded, so an
/// upstream failure never charges the user.
async fn perform_completion(
    app: Arc<AppState>,
    user_id: UserId,
    action: Action,
    params: PerformCompletionParams,
) -> Result<Json<PerformCompletionResponse>> {
    let model = app
        .db
        .get_model_by_name(&params.model)
        .await?
        .ok_or_else(|| {
            Error::http(
                StatusCode::NOT_FOUND,
                format!("unknown model {:?}", params.model),
            )
        })?;

    authorize(app.entitlement.can_perform(user_id, action).await?)?;
    authorize(
        app.entitlement
            .can_perform(user_id, Action::InvokeModel(model.id))
            .await?,
    )?;

    let provider = ModelProvider::from_str(&model.provider)
        .map_err(|_| anyhow!("model {:?} has unknown provider {:?}", model.name, model.provider))?;
    let completion = app
        .completion_provider
        .complete(CompletionRequest {
            provider,
            model_name: model.name.clone(),
            prompt: params.prompt,
        })
        .await
        .map_err(|err| {
            tracing::error!(
                model = model.name,
                error = %err,
                "upstream completion request failed"
            );
            Error::http(
                StatusCode::BAD_GATEWAY,
                "upstream provider request failed".to_string(),
            )
        })?;

    let record = app.entitlement.record_usage(user_id, action).await?;
    let limits = entitlement::limits_for_plan_name(&record.plan);
    let usage = match action {
        Action::TestPrompt => {
            QuotaStatus::new(record.prompts_used, limits.prompts_per_period.as_raw())
        }
        _ => QuotaStatus::new(
            record.enhancements_used,
            limits.enhancements_per_period.as_raw(),
        ),
    };

    Ok(Json(PerformCompletionResponse { completion, usage }))
}

async fn create_prompt(
    Extension(app): Extension<Arc<AppState>>,
    Path(user_id): Path<UserId>,
    Json(params): Json<CreatePromptParams>,
) -> Result<Json<SavedPrompt>> {
    authorize(
        app.entitlement
            .can_perform(user_id, Action::SaveNewPrompt)
            .await?,
    )?;

    let prompt = app
        .db
        .create_prompt(user_id, &params.title, &params.body, Utc::now().naive_utc())
        .await?;

    Ok(Json(SavedPrompt {
        id: prompt.id.0,
        title: prompt.title,
        body: prompt.body,
        created_at: prompt.created_at,
    }))
}

async fn delete_prompt(
    Extension(app): Extension<Arc<AppState>>,
    Path((user_id, prompt_id)): Path<(UserId, PromptId)>,
) -> Result<()> {
    if app.db.delete_prompt(user_id, prompt_id).await? {
        Ok(())
    } else {
        Err(Error::http(
            StatusCode::NOT_FOUND,
            "prompt not found".to_string(),
        ))
    }
}

async fn list_prompts(
    Extension(app): Extension<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Result<Json<ListPromptsResponse>> {
    let prompts = app
        .db
        .list_prompts(user_id)
        .await?
        .into_iter()
        .map(|prompt| SavedPrompt {
            id: prompt.id.0,
            title: prompt.title,
            body: prompt.body,
            created_at: prompt.created_at,
        })
        .collect();

    Ok(Json(ListPromptsResponse { prompts }))
}

async fn plan_change(
    Extension(app): Extension<Arc<AppState>>,
    Json(event): Json<PlanChangeEvent>,
) -> Result<()> {
    let record = app
        .entitlement
        .set_plan(UserId(event.user_id), event.plan)
        .await?;
    tracing::info!(
        user_id = event.user_id,
        plan = %record.plan,
        "applied plan change"
    );
    Ok(())
}

/// Turns a denial into the HTTP response the frontend renders: quota
/// exhaustion and tier gaps surface as upgrade prompts, disabled models as
/// temporary unavailability.
fn authorize(decision: Decision) -> Result<()> {
    match decision {
        Decision::Allowed => Ok(()),
        Decision::Denied(DenyReason::QuotaExceeded) => Err(Error::http(
            StatusCode::PAYMENT_REQUIRED,
            "Plan limit reached for this billing period. Upgrade your plan to continue."
                .to_string(),
        )),
        Decision::Denied(DenyReason::PlanTierInsufficient) => Err(Error::http(
            StatusCode::FORBIDDEN,
            "Your plan does not include this model. Upgrade to access it.".to_string(),
        )),
        Decision::Denied(DenyReason::ModelDisabled) => Err(Error::http(
            StatusCode::SERVICE_UNAVAILABLE,
            "This model is temporarily unavailable.".to_string(),
        )),
    }
}
