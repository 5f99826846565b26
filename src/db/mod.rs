pub mod models;
pub mod repository;

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::AppResult;
use models::{Notification, Subscription, Transmission};
use repository::{NotificationRepository, SubscriptionRepository, TransmissionRepository};

/// Persistence port consumed by the delivery core.
#[async_trait]
pub trait DbClient: Send + Sync {
    /// Stores a notification, assigning `id` and timestamps when unset.
    async fn add_notification(&self, notification: Notification) -> AppResult<Notification>;

    async fn update_notification(&self, notification: &Notification) -> AppResult<()>;

    /// Subscriptions sharing at least one category or label. A negative `limit` means no limit.
    async fn subscriptions_by_categories_and_labels(
        &self,
        offset: i64,
        limit: i64,
        categories: &[String],
        labels: &[String],
    ) -> AppResult<Vec<Subscription>>;

    /// Fails with `EntityDoesNotExist` when no subscription has this name.
    async fn subscription_by_name(&self, name: &str) -> AppResult<Subscription>;

    async fn add_transmission(&self, transmission: Transmission) -> AppResult<Transmission>;

    async fn update_transmission(&self, transmission: &Transmission) -> AppResult<()>;

    async fn transmission_by_id(&self, id: &str) -> AppResult<Transmission>;

    async fn transmissions_by_notification_id(
        &self,
        notification_id: &str,
    ) -> AppResult<Vec<Transmission>>;

    async fn notification_total_count(&self) -> AppResult<i64>;

    /// The notification at `offset` when ordered newest-modified first.
    async fn latest_notification_by_offset(&self, offset: i64) -> AppResult<Notification>;

    /// Deletes notifications (and their transmissions) whose age exceeds `age_millis`.
    async fn cleanup_notifications_by_age(&self, age_millis: i64) -> AppResult<()>;
}

/// `DbClient` backed by the SQLite repositories.
#[derive(Clone)]
pub struct SqliteDbClient {
    pool: SqlitePool,
}

impl SqliteDbClient {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl DbClient for SqliteDbClient {
    async fn add_notification(&self, notification: Notification) -> AppResult<Notification> {
        NotificationRepository::create(&self.pool, notification).await
    }

    async fn update_notification(&self, notification: &Notification) -> AppResult<()> {
        NotificationRepository::update(&self.pool, notification).await
    }

    async fn subscriptions_by_categories_and_labels(
        &self,
        offset: i64,
        limit: i64,
        categories: &[String],
        labels: &[String],
    ) -> AppResult<Vec<Subscription>> {
        SubscriptionRepository::find_by_categories_and_labels(
            &self.pool, offset, limit, categories, labels,
        )
        .await
    }

    async fn subscription_by_name(&self, name: &str) -> AppResult<Subscription> {
        SubscriptionRepository::find_by_name(&self.pool, name).await
    }

    async fn add_transmission(&self, transmission: Transmission) -> AppResult<Transmission> {
        TransmissionRepository::create(&self.pool, transmission).await
    }

    async fn update_transmission(&self, transmission: &Transmission) -> AppResult<()> {
        TransmissionRepository::update(&self.pool, transmission).await
    }

    async fn transmission_by_id(&self, id: &str) -> AppResult<Transmission> {
        TransmissionRepository::find_by_id(&self.pool, id).await
    }

    async fn transmissions_by_notification_id(
        &self,
        notification_id: &str,
    ) -> AppResult<Vec<Transmission>> {
        TransmissionRepository::find_by_notification_id(&self.pool, notification_id).await
    }

    async fn notification_total_count(&self) -> AppResult<i64> {
        NotificationRepository::count(&self.pool).await
    }

    async fn latest_notification_by_offset(&self, offset: i64) -> AppResult<Notification> {
        NotificationRepository::find_latest_by_offset(&self.pool, offset).await
    }

    async fn cleanup_notifications_by_age(&self, age_millis: i64) -> AppResult<()> {
        let removed = NotificationRepository::delete_by_age(&self.pool, age_millis).await?;
        tracing::debug!("Retention removed {} notifications", removed);
        Ok(())
    }
}
