//! Startup helpers:
//! - database connection + migrations
//! - composition of the delivery components
//! - background worker spawn helpers

use std::{path::Path, sync::Arc};

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::db::{DbClient, SqliteDbClient};
use crate::services::channel::Senders;
use crate::services::distribution::Distributor;
use crate::services::retention::Purger;
use crate::services::secrets::{EnvSecretProvider, SecretProvider};
use crate::services::tasks::{self, DeliveryTasks, TaskReport};
use crate::services::transmission::TransmissionSender;
use crate::AppState;

/// Redact credentials from a database URL before logging.
pub fn redact_db_url(db_url: &str) -> String {
    if let Ok(url) = url::Url::parse(db_url) {
        let scheme = url.scheme();
        let host = url.host_str().unwrap_or("");
        let port_part = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let path = url.path();
        format!("{}://{}{}{}", scheme, host, port_part, path)
    } else {
        if let Some(at_pos) = db_url.find('@') {
            let without_creds = &db_url[at_pos + 1..];
            return format!("(redacted){}", without_creds);
        }
        "(redacted)".to_string()
    }
}

/// Open the SQLite pool and run migrations, creating the database directory if needed.
pub async fn init_db(config: &Config) -> Result<sqlx::SqlitePool> {
    let db_url = &config.database.url;
    tracing::info!("Connecting to database: {}", redact_db_url(db_url));

    let db_path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);
    let db_file_path = Path::new(db_path);

    if let Some(parent) = db_file_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                )
            })?;
        }
    }

    let connect_options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(connect_options)
        .await?;

    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Wire the delivery components over the given store.
///
/// The returned receiver carries delivery task reports and should be handed to
/// `spawn_background_workers`.
pub fn build_state(
    config: Config,
    db: Arc<dyn DbClient>,
    secrets: Arc<dyn SecretProvider>,
) -> Result<(Arc<AppState>, mpsc::UnboundedReceiver<TaskReport>)> {
    let senders = Senders::new(&config, secrets)?;
    let (tasks, reports) = DeliveryTasks::new();
    let transmitter =
        TransmissionSender::new(db.clone(), senders.clone(), tasks.clone(), &config.writable);
    let distributor = Distributor::new(db.clone(), transmitter, tasks);
    let purger = Purger::new(db.clone(), config.retention.clone());

    let state = Arc::new(AppState {
        db,
        config,
        senders,
        distributor,
        purger,
    });
    Ok((state, reports))
}

/// Open the configured SQLite database and compose the service around it.
pub async fn init_state(
    config: Config,
) -> Result<(Arc<AppState>, mpsc::UnboundedReceiver<TaskReport>)> {
    let pool = init_db(&config).await?;
    build_state(
        config,
        Arc::new(SqliteDbClient::new(pool)),
        Arc::new(EnvSecretProvider),
    )
}

/// Spawn background workers:
/// - the delivery report drain
/// - the retention purger, when enabled
///
/// Each worker exits on the `shutdown` broadcast. The handles let the caller
/// wait for them.
pub fn spawn_background_workers(
    state: &Arc<AppState>,
    reports: mpsc::UnboundedReceiver<TaskReport>,
    shutdown: &broadcast::Sender<()>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    handles.push(tokio::spawn(tasks::log_reports(
        reports,
        shutdown.subscribe(),
    )));

    if state.config.retention.enabled {
        match state.purger.start(shutdown.subscribe()) {
            Ok(handle) => handles.push(handle),
            Err(e) => tracing::warn!("Retention purger not started: {}", e),
        }
    } else {
        tracing::info!("Retention purger disabled");
    }

    handles
}
