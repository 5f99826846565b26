use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{now_millis, Transmission};
use crate::error::{AppError, AppResult};

#[derive(sqlx::FromRow)]
struct TransmissionRow {
    id: String,
    notification_id: String,
    subscription_name: String,
    channel: String,
    status: String,
    resend_count: i32,
    records: String,
    created: i64,
}

impl TryFrom<TransmissionRow> for Transmission {
    type Error = AppError;

    fn try_from(row: TransmissionRow) -> Result<Self, Self::Error> {
        Ok(Transmission {
            id: row.id,
            created: row.created,
            subscription_name: row.subscription_name,
            notification_id: row.notification_id,
            channel: serde_json::from_str(&row.channel)?,
            status: row.status.parse()?,
            records: serde_json::from_str(&row.records)?,
            resend_count: row.resend_count,
        })
    }
}

pub struct TransmissionRepository;

impl TransmissionRepository {
    pub async fn create(pool: &SqlitePool, mut transmission: Transmission) -> AppResult<Transmission> {
        if transmission.id.is_empty() {
            transmission.id = Uuid::new_v4().to_string();
        }
        transmission.created = now_millis();

        sqlx::query(
            r#"
            INSERT INTO transmission (
                id, notification_id, subscription_name, channel, status,
                resend_count, records, created
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&transmission.id)
        .bind(&transmission.notification_id)
        .bind(&transmission.subscription_name)
        .bind(serde_json::to_string(&transmission.channel)?)
        .bind(transmission.status.as_str())
        .bind(transmission.resend_count)
        .bind(serde_json::to_string(&transmission.records)?)
        .bind(transmission.created)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(transmission)
    }

    /// Persist status, resend count and the record list of an existing transmission
    pub async fn update(pool: &SqlitePool, transmission: &Transmission) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE transmission
            SET status = ?, resend_count = ?, records = ?
            WHERE id = ?
            "#,
        )
        .bind(transmission.status.as_str())
        .bind(transmission.resend_count)
        .bind(serde_json::to_string(&transmission.records)?)
        .bind(&transmission.id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(AppError::EntityDoesNotExist(format!(
                "transmission '{}'",
                transmission.id
            )));
        }

        Ok(())
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Transmission> {
        let row = sqlx::query_as::<_, TransmissionRow>(
            r#"
            SELECT id, notification_id, subscription_name, channel, status,
                   resend_count, records, created
            FROM transmission
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        match row {
            Some(row) => row.try_into(),
            None => Err(AppError::EntityDoesNotExist(format!("transmission '{}'", id))),
        }
    }

    pub async fn find_by_notification_id(
        pool: &SqlitePool,
        notification_id: &str,
    ) -> AppResult<Vec<Transmission>> {
        let rows = sqlx::query_as::<_, TransmissionRow>(
            r#"
            SELECT id, notification_id, subscription_name, channel, status,
                   resend_count, records, created
            FROM transmission
            WHERE notification_id = ?
            ORDER BY created
            "#,
        )
        .bind(notification_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter().map(Transmission::try_from).collect()
    }
}
