pub mod ids;
pub mod queries;
pub mod tables;

use crate::{Error, Result};
use anyhow::anyhow;
use chrono::NaiveDateTime;
use futures::Future;
use rand::{prelude::StdRng, Rng, SeedableRng};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, DbErr, EntityTrait, IntoActiveModel, IsolationLevel, QueryFilter,
    QueryOrder, RuntimeErr, TransactionTrait,
};
use sea_orm::sea_query::{Expr, ExprTrait};
use sqlx::{
    migrate::{Migrate, Migration, MigrationSource},
    Connection,
};
use std::{ops::Deref, path::Path, sync::Arc, time::Duration};
use tokio::sync::Mutex;

pub use ids::*;
pub use sea_orm::ConnectOptions;
pub use tables::model;
pub use tables::prompt::Model as Prompt;
pub use tables::usage_record::Model as UsageRecord;
pub use tables::user::Model as User;

#[cfg(test)]
pub use tests::TestDb;

const MAX_TRANSACTION_CONFLICT_RETRIES: u32 = 10;

/// The database methods are grouped into submodules of `queries/`, one per
/// table. Every method runs inside `Database::transaction`, which retries
/// the whole closure when Postgres reports a serialization conflict.
pub struct Database {
    options: ConnectOptions,
    pool: DatabaseConnection,
    rng: Mutex<StdRng>,
}

impl Database {
    pub async fn new(options: ConnectOptions) -> Result<Self> {
        sqlx::any::install_default_drivers();
        Ok(Self {
            options: options.clone(),
            pool: sea_orm::Database::connect(options).await?,
            rng: Mutex::new(StdRng::seed_from_u64(0)),
        })
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub async fn migrate(
        &self,
        migrations_path: &Path,
        ignore_checksum_mismatch: bool,
    ) -> anyhow::Result<Vec<(Migration, Duration)>> {
        let migrations = MigrationSource::resolve(migrations_path)
            .await
            .map_err(|err| anyhow!("failed to load migrations: {err:?}"))?;

        let mut connection = sqlx::AnyConnection::connect(self.options.get_url()).await?;

        connection.ensure_migrations_table().await?;
        let applied_migrations = connection.list_applied_migrations().await?;

        let mut new_migrations = Vec::new();
        for migration in migrations {
            match applied_migrations
                .iter()
                .find(|m| m.version == migration.version)
            {
                Some(applied_migration) => {
                    if migration.checksum != applied_migration.checksum && !ignore_checksum_mismatch
                    {
                        Err(anyhow!(
                            "checksum mismatch for applied migration {}",
                            migration.description
                        ))?;
                    }
                }
                None => {
                    let elapsed = connection.apply(&migration).await?;
                    new_migrations.push((migration, elapsed));
                }
            }
        }

        Ok(new_migrations)
    }

    pub async fn transaction<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: Send + Fn(TransactionHandle) -> Fut,
        Fut: Send + Future<Output = Result<T>>,
    {
        let mut i = 0;
        loop {
            let (tx, result) = self.with_transaction(&f).await?;
            match result {
                Ok(result) => match tx.commit().await.map_err(Into::into) {
                    Ok(()) => return Ok(result),
                    Err(error) => {
                        if !self.retry_on_serialization_error(&error, i).await {
                            return Err(error);
                        }
                    }
                },
                Err(error) => {
                    tx.rollback().await?;
                    if !self.retry_on_serialization_error(&error, i).await {
                        return Err(error);
                    }
                }
            }
            i += 1;
        }
    }

    async fn with_transaction<F, Fut, T>(&self, f: &F) -> Result<(DatabaseTransaction, Result<T>)>
    where
        F: Send + Fn(TransactionHandle) -> Fut,
        Fut: Send + Future<Output = Result<T>>,
    {
        let tx = self
            .pool
            .begin_with_config(Some(IsolationLevel::Serializable), None)
            .await?;

        let mut tx = Arc::new(Some(tx));
        let result = f(TransactionHandle(tx.clone())).await;
        let Some(tx) = Arc::get_mut(&mut tx).and_then(|tx| tx.take()) else {
            return Err(anyhow!(
                "couldn't complete transaction because it's still in use"
            ))?;
        };

        Ok((tx, result))
    }

    /// Retries transactions that fail to serialize, with randomized
    /// exponential backoff so concurrent connections don't retry in
    /// lock-step.
    async fn retry_on_serialization_error(&self, error: &Error, prev_attempt_count: u32) -> bool {
        if is_serialization_error(error) && prev_attempt_count < MAX_TRANSACTION_CONFLICT_RETRIES {
            let base_delay = 4_u64 << prev_attempt_count.min(16);
            let randomized_delay = base_delay as f32 * self.rng.lock().await.gen_range(0.5..=2.0);
            tracing::info!(
                prev_attempt_count = prev_attempt_count,
                delay = randomized_delay,
                "retrying transaction"
            );
            tokio::time::sleep(Duration::from_millis(randomized_delay as u64)).await;
            true
        } else {
            false
        }
    }
}

fn is_serialization_error(error: &Error) -> bool {
    const SERIALIZATION_FAILURE_CODE: &str = "40001";
    matches!(
        error,
        Error::Database(
            DbErr::Exec(RuntimeErr::SqlxError(error)) | DbErr::Query(RuntimeErr::SqlxError(error)),
        ) if error
            .as_database_error()
            .and_then(|error| error.code())
            .as_deref()
            == Some(SERIALIZATION_FAILURE_CODE)
    )
}

pub struct TransactionHandle(Arc<Option<DatabaseTransaction>>);

impl Deref for TransactionHandle {
    type Target = DatabaseTransaction;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref().as_ref().unwrap()
    }
}
