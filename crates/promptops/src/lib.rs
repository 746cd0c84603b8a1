pub mod api;
pub mod completion;
pub mod db;
pub mod entitlement;
pub mod env;
pub mod executor;

use axum::{
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use completion::CompletionProvider;
use db::{Database, UserId};
use entitlement::EntitlementEngine;
use executor::Executor;
use serde::Deserialize;
use std::{path::PathBuf, sync::Arc};

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub enum Error {
    Http(StatusCode, String, HeaderMap),
    Database(sea_orm::error::DbErr),
    Internal(anyhow::Error),
    /// Usage was requested for a user that has no row in the database. This
    /// is an integrity bug in the caller, not a normal outcome, so it is
    /// logged and surfaced as a generic failure.
    UserNotFound(UserId),
}

impl From<anyhow::Error> for Error {
    fn from(error: anyhow::Error) -> Self {
        Self::Internal(error)
    }
}

impl From<sea_orm::error::DbErr> for Error {
    fn from(error: sea_orm::error::DbErr) -> Self {
        Self::Database(error)
    }
}

impl From<axum::Error> for Error {
    fn from(error: axum::Error) -> Self {
        Self::Internal(error.into())
    }
}

impl From<axum::http::Error> for Error {
    fn from(error: axum::http::Error) -> Self {
        Self::Internal(error.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Internal(error.into())
    }
}

impl From<hyper::Error> for Error {
    fn from(error: hyper::Error) -> Self {
        Self::Internal(error.into())
    }
}

impl Error {
    pub fn http(code: StatusCode, message: String) -> Self {
        Self::Http(code, message, HeaderMap::default())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        match self {
            Error::Http(code, message, headers) => {
                log::error!("HTTP error {}: {}", code, &message);
                (code, headers, message).into_response()
            }
            Error::Database(error) => {
                log::error!(
                    "HTTP error {}: {:?}",
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &error
                );
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", &error)).into_response()
            }
            Error::Internal(error) => {
                log::error!(
                    "HTTP error {}: {:?}",
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &error
                );
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", &error)).into_response()
            }
            Error::UserNotFound(user_id) => {
                log::error!("no usage record for user {user_id}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
                    .into_response()
            }
        }
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(code, message, _headers) => (code, message).fmt(f),
            Error::Database(error) => error.fmt(f),
            Error::Internal(error) => error.fmt(f),
            Error::UserNotFound(user_id) => write!(f, "UserNotFound({user_id})"),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(code, message, _) => write!(f, "{code}: {message}"),
            Error::Database(error) => error.fmt(f),
            Error::Internal(error) => error.fmt(f),
            Error::UserNotFound(user_id) => write!(f, "no usage record for user {user_id}"),
        }
    }
}

impl std::error::Error for Error {}

#[derive(Clone, Deserialize)]
pub struct Config {
    pub http_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub migrations_path: Option<PathBuf>,
    pub api_token: String,
    pub rust_log: Option<String>,
    pub log_json: Option<bool>,
    pub promptops_environment: Arc<str>,
    pub openai_api_key: Option<Arc<str>>,
    pub anthropic_api_key: Option<Arc<str>>,
    pub google_ai_api_key: Option<Arc<str>>,
}

impl Config {
    pub fn is_development(&self) -> bool {
        self.promptops_environment == "development".into()
    }

    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            http_port: 0,
            database_url: "".into(),
            database_max_connections: 0,
            migrations_path: None,
            api_token: "secret".into(),
            rust_log: None,
            log_json: None,
            promptops_environment: "test".into(),
            openai_api_key: None,
            anthropic_api_key: None,
            google_ai_api_key: None,
        }
    }
}

#[derive(Deserialize)]
pub struct MigrateConfig {
    pub database_url: String,
    pub migrations_path: Option<PathBuf>,
}

pub struct AppState {
    pub db: Arc<Database>,
    pub entitlement: EntitlementEngine,
    pub completion_provider: Arc<dyn CompletionProvider>,
    pub executor: Executor,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config, executor: Executor) -> Result<Arc<Self>> {
        let mut db_options = db::ConnectOptions::new(config.database_url.clone());
        db_options.max_connections(config.database_max_connections);
        let db = Database::new(db_options).await?;
        db.initialize_models().await?;

        let db = Arc::new(db);
        let this = Self {
            db: db.clone(),
            entitlement: EntitlementEngine::new(db),
            completion_provider: Arc::new(completion::HttpCompletionProvider::new(&config)),
            executor,
            config,
        };
        Ok(Arc::new(this))
    }
}
