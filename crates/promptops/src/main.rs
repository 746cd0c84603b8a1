use anyhow::anyhow;
use axum::{routing::get, Router};
use chrono::Utc;
use promptops::{db, env, executor::Executor, AppState, Config, MigrateConfig, Result};
use db::Database;
use std::{
    env::args,
    net::{SocketAddr, TcpListener},
    path::Path,
    time::Duration,
};
use tokio::signal::unix::SignalKind;
use tracing_log::LogTracer;
use tracing_subscriber::{filter::EnvFilter, fmt::format::JsonFields, Layer};

const VERSION: &str = env!("CARGO_PKG_VERSION");

const ROLLOVER_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(error) = env::load_dotenv() {
        eprintln!(
            "error loading .env.toml (this is expected in production): {}",
            error
        );
    }

    match args().skip(1).next().as_deref() {
        Some("version") => {
            println!("promptops v{VERSION}");
        }
        Some("migrate") => {
            let config = envy::from_env::<MigrateConfig>().expect("error loading config");
            let mut db_options = db::ConnectOptions::new(config.database_url.clone());
            db_options.max_connections(5);
            let db = Database::new(db_options).await?;

            let migrations_path = config
                .migrations_path
                .as_deref()
                .unwrap_or_else(|| Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations")));

            let migrations = db.migrate(migrations_path, false).await?;
            for (migration, duration) in migrations {
                println!(
                    "Ran {} {} {:?}",
                    migration.version, migration.description, duration
                );
            }

            return Ok(());
        }
        Some("serve") => {
            let config = envy::from_env::<Config>().expect("error loading config");
            init_tracing(&config);

            let state = AppState::new(config, Executor::Production).await?;

            let listener = TcpListener::bind(&format!("0.0.0.0:{}", state.config.http_port))
                .expect("failed to bind TCP listener");

            spawn_rollover_sweep(&state);

            let app = promptops::api::routes(state.clone())
                .merge(Router::new().route("/", get(handle_root)))
                .layer(tower_http::trace::TraceLayer::new_for_http().make_span_with(
                    |request: &axum::http::Request<_>| {
                        let matched_path = request
                            .extensions()
                            .get::<axum::extract::MatchedPath>()
                            .map(|path| path.as_str());
                        tracing::info_span!("http_request", method = ?request.method(), matched_path)
                    },
                ));

            axum::Server::from_tcp(listener)?
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move {
                    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())
                        .expect("failed to listen for interrupt signal");
                    let mut sigint = tokio::signal::unix::signal(SignalKind::interrupt())
                        .expect("failed to listen for interrupt signal");
                    let sigterm = sigterm.recv();
                    let sigint = sigint.recv();
                    futures::pin_mut!(sigterm, sigint);
                    futures::future::select(sigterm, sigint).await;
                    tracing::info!("Received interrupt signal");
                })
                .await?;
        }
        _ => {
            Err(anyhow!("usage: promptops <version | migrate | serve>"))?;
        }
    }
    Ok(())
}

async fn handle_root() -> String {
    format!("promptops v{VERSION}")
}

/// Periodically rolls expired billing periods forward so idle users' usage
/// meters read correctly; entitlement checks themselves roll over lazily.
fn spawn_rollover_sweep(state: &std::sync::Arc<AppState>) {
    let state = state.clone();
    state.executor.clone().spawn_detached(async move {
        loop {
            state.executor.sleep(ROLLOVER_SWEEP_INTERVAL).await;

            match state
                .db
                .rollover_expired_periods(Utc::now().naive_utc())
                .await
            {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "rolled over expired billing periods"),
                Err(error) => {
                    tracing::error!(?error, "failed to roll over expired billing periods")
                }
            }
        }
    });
}

pub fn init_tracing(config: &Config) -> Option<()> {
    use std::str::FromStr;
    use tracing_subscriber::layer::SubscriberExt;
    let rust_log = config.rust_log.clone()?;

    LogTracer::init().ok()?;

    let subscriber = tracing_subscriber::Registry::default()
        .with(if config.log_json.unwrap_or(false) {
            Box::new(
                tracing_subscriber::fmt::layer()
                    .fmt_fields(JsonFields::default())
                    .event_format(
                        tracing_subscriber::fmt::format()
                            .json()
                            .flatten_event(true)
                            .with_span_list(true),
                    ),
            ) as Box<dyn Layer<_> + Send + Sync>
        } else {
            Box::new(
                tracing_subscriber::fmt::layer()
                    .event_format(tracing_subscriber::fmt::format().pretty()),
            )
        })
        .with(EnvFilter::from_str(rust_log.as_str()).ok()?);

    tracing::subscriber::set_global_default(subscriber).unwrap();

    None
}
