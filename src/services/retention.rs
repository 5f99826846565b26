use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::RetentionConfig;
use crate::db::models::now_millis;
use crate::db::DbClient;
use crate::error::{AppError, AppResult};

/// Background loop capping the number of stored notifications.
pub struct Purger {
    db: Arc<dyn DbClient>,
    config: RetentionConfig,
    started: AtomicBool,
}

impl Purger {
    pub fn new(db: Arc<dyn DbClient>, config: RetentionConfig) -> Arc<Self> {
        Arc::new(Self {
            db,
            config,
            started: AtomicBool::new(false),
        })
    }

    /// Start the purge loop. It exits when `shutdown_rx` fires. Only one loop may run per purger.
    pub fn start(self: &Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> AppResult<JoinHandle<()>> {
        let interval = humantime::parse_duration(&self.config.interval).map_err(|e| {
            AppError::ContractInvalid(format!(
                "invalid retention interval '{}': {}",
                self.config.interval, e
            ))
        })?;
        if interval.is_zero() {
            return Err(AppError::ContractInvalid(
                "retention interval must be positive".to_string(),
            ));
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(AppError::ServerError(
                "retention purger already started".to_string(),
            ));
        }

        tracing::info!(
            "Retention purger started: interval {}, max cap {}, min cap {}",
            self.config.interval,
            self.config.max_cap,
            self.config.min_cap
        );

        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Retention purger shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }

                if let Err(e) = this.purge().await {
                    tracing::warn!("Retention purge failed: {}", e);
                }
            }
        }))
    }

    /// Delete everything older than the newest `min_cap` notifications once `max_cap` is reached.
    pub async fn purge(&self) -> AppResult<()> {
        let total = self.db.notification_total_count().await?;
        if total < self.config.max_cap {
            tracing::debug!(
                "{} notifications stored, below retention cap {}",
                total,
                self.config.max_cap
            );
            return Ok(());
        }

        let boundary = self
            .db
            .latest_notification_by_offset(self.config.min_cap)
            .await?;
        let age = now_millis() - boundary.modified;
        self.db.cleanup_notifications_by_age(age).await?;

        tracing::info!(
            "Purged notifications older than {}ms ({} stored, keeping {})",
            age,
            total,
            self.config.min_cap
        );
        Ok(())
    }
}
