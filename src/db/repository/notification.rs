use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{now_millis, Notification};
use crate::error::{AppError, AppResult};

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    category: String,
    labels: String,
    content: String,
    content_type: String,
    sender: String,
    severity: String,
    status: String,
    description: String,
    acknowledged: bool,
    created: i64,
    modified: i64,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = AppError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Notification {
            id: row.id,
            category: row.category,
            labels: serde_json::from_str(&row.labels)?,
            content: row.content,
            content_type: row.content_type,
            sender: row.sender,
            severity: row.severity.parse()?,
            status: row.status.parse()?,
            description: row.description,
            acknowledged: row.acknowledged,
            created: row.created,
            modified: row.modified,
        })
    }
}

const SELECT_COLUMNS: &str = "id, category, labels, content, content_type, sender, severity, \
     status, description, acknowledged, created, modified";

pub struct NotificationRepository;

impl NotificationRepository {
    /// Insert a notification, filling in id and timestamps when unset
    pub async fn create(pool: &SqlitePool, mut notification: Notification) -> AppResult<Notification> {
        if notification.id.is_empty() {
            notification.id = Uuid::new_v4().to_string();
        }
        if notification.created == 0 {
            notification.created = now_millis();
        }
        notification.modified = notification.created;

        sqlx::query(
            r#"
            INSERT INTO notification (
                id, category, labels, content, content_type, sender, severity,
                status, description, acknowledged, created, modified
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&notification.id)
        .bind(&notification.category)
        .bind(serde_json::to_string(&notification.labels)?)
        .bind(&notification.content)
        .bind(&notification.content_type)
        .bind(&notification.sender)
        .bind(notification.severity.as_str())
        .bind(notification.status.as_str())
        .bind(&notification.description)
        .bind(notification.acknowledged)
        .bind(notification.created)
        .bind(notification.modified)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(notification)
    }

    /// Overwrite a stored notification and bump its modified time
    pub async fn update(pool: &SqlitePool, notification: &Notification) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE notification
            SET category = ?, labels = ?, content = ?, content_type = ?, sender = ?,
                severity = ?, status = ?, description = ?, acknowledged = ?, modified = ?
            WHERE id = ?
            "#,
        )
        .bind(&notification.category)
        .bind(serde_json::to_string(&notification.labels)?)
        .bind(&notification.content)
        .bind(&notification.content_type)
        .bind(&notification.sender)
        .bind(notification.severity.as_str())
        .bind(notification.status.as_str())
        .bind(&notification.description)
        .bind(notification.acknowledged)
        .bind(now_millis())
        .bind(&notification.id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(AppError::EntityDoesNotExist(format!(
                "notification '{}'",
                notification.id
            )));
        }

        Ok(())
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {} FROM notification WHERE id = ?",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        row.map(Notification::try_from).transpose()
    }

    pub async fn count(pool: &SqlitePool) -> AppResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notification")
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(count)
    }

    /// Notification at `offset` in newest-modified-first order
    pub async fn find_latest_by_offset(pool: &SqlitePool, offset: i64) -> AppResult<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {} FROM notification ORDER BY modified DESC, created DESC LIMIT 1 OFFSET ?",
            SELECT_COLUMNS
        ))
        .bind(offset)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        match row {
            Some(row) => row.try_into(),
            None => Err(AppError::EntityDoesNotExist(format!(
                "no notification at offset {}",
                offset
            ))),
        }
    }

    /// Delete notifications last modified more than `age_millis` ago, together with their transmissions
    pub async fn delete_by_age(pool: &SqlitePool, age_millis: i64) -> AppResult<u64> {
        let threshold = now_millis() - age_millis;
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        sqlx::query(
            r#"
            DELETE FROM transmission
            WHERE notification_id IN (SELECT id FROM notification WHERE modified < ?)
            "#,
        )
        .bind(threshold)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        let result = sqlx::query("DELETE FROM notification WHERE modified < ?")
            .bind(threshold)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }
}
