use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{now_millis, Subscription};
use crate::error::{AppError, AppResult};

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: String,
    name: String,
    categories: String,
    labels: String,
    channels: String,
    receiver: String,
    description: String,
    resend_limit: i32,
    resend_interval: String,
    admin_state: String,
    created: i64,
    modified: i64,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = AppError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: row.id,
            name: row.name,
            categories: serde_json::from_str(&row.categories)?,
            labels: serde_json::from_str(&row.labels)?,
            channels: serde_json::from_str(&row.channels)?,
            receiver: row.receiver,
            description: row.description,
            resend_limit: row.resend_limit,
            resend_interval: row.resend_interval,
            admin_state: row.admin_state.parse()?,
            created: row.created,
            modified: row.modified,
        })
    }
}

pub struct SubscriptionRepository;

impl SubscriptionRepository {
    /// Insert a subscription; the name must be unique
    pub async fn create(pool: &SqlitePool, mut subscription: Subscription) -> AppResult<Subscription> {
        if subscription.name.trim().is_empty() {
            return Err(AppError::ContractInvalid("subscription name is empty".to_string()));
        }
        if subscription.id.is_empty() {
            subscription.id = Uuid::new_v4().to_string();
        }
        let now = now_millis();
        subscription.created = now;
        subscription.modified = now;

        sqlx::query(
            r#"
            INSERT INTO subscription (
                id, name, categories, labels, channels, receiver, description,
                resend_limit, resend_interval, admin_state, created, modified
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&subscription.id)
        .bind(&subscription.name)
        .bind(serde_json::to_string(&subscription.categories)?)
        .bind(serde_json::to_string(&subscription.labels)?)
        .bind(serde_json::to_string(&subscription.channels)?)
        .bind(&subscription.receiver)
        .bind(&subscription.description)
        .bind(subscription.resend_limit)
        .bind(&subscription.resend_interval)
        .bind(subscription.admin_state.as_str())
        .bind(subscription.created)
        .bind(subscription.modified)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(subscription)
    }

    pub async fn find_by_name(pool: &SqlitePool, name: &str) -> AppResult<Subscription> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, name, categories, labels, channels, receiver, description,
                   resend_limit, resend_interval, admin_state, created, modified
            FROM subscription
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        match row {
            Some(row) => row.try_into(),
            None => Err(AppError::EntityDoesNotExist(format!(
                "subscription '{}'",
                name
            ))),
        }
    }

    /// Subscriptions sharing a category or a label with the given sets, oldest first
    pub async fn find_by_categories_and_labels(
        pool: &SqlitePool,
        offset: i64,
        limit: i64,
        categories: &[String],
        labels: &[String],
    ) -> AppResult<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT s.id, s.name, s.categories, s.labels, s.channels, s.receiver, s.description,
                   s.resend_limit, s.resend_interval, s.admin_state, s.created, s.modified
            FROM subscription s
            WHERE EXISTS (
                    SELECT 1 FROM json_each(s.categories) c
                    WHERE c.value IN (SELECT value FROM json_each(?))
                )
               OR EXISTS (
                    SELECT 1 FROM json_each(s.labels) l
                    WHERE l.value IN (SELECT value FROM json_each(?))
                )
            ORDER BY s.created, s.name
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(serde_json::to_string(categories)?)
        .bind(serde_json::to_string(labels)?)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter().map(Subscription::try_from).collect()
    }
}
