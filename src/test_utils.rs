//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::Config;
use crate::db::models::{now_millis, Address, Notification, Subscription, Transmission};
use crate::db::DbClient;
use crate::error::{AppError, AppResult};
use crate::services::channel::{ChannelSender, MqttSender, Senders, ZeroMqSender};
use crate::services::secrets::StaticSecretProvider;

/// Single-connection in-memory SQLite database with migrations applied.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

#[derive(Default)]
struct Store {
    notifications: Vec<Notification>,
    subscriptions: Vec<Subscription>,
    transmissions: Vec<Transmission>,
    cleanup_calls: Vec<i64>,
}

/// `DbClient` over plain vectors; records every retention cleanup request.
#[derive(Default)]
pub struct InMemoryDbClient {
    store: Mutex<Store>,
}

impl InMemoryDbClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_subscription(&self, subscription: Subscription) {
        self.store.lock().unwrap().subscriptions.push(subscription);
    }

    /// Stores a notification as-is, keeping its timestamps.
    pub fn insert_notification(&self, notification: Notification) {
        self.store.lock().unwrap().notifications.push(notification);
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.store.lock().unwrap().notifications.clone()
    }

    pub fn notification(&self, id: &str) -> Option<Notification> {
        self.notifications().into_iter().find(|n| n.id == id)
    }

    pub fn transmissions(&self) -> Vec<Transmission> {
        self.store.lock().unwrap().transmissions.clone()
    }

    pub fn cleanup_calls(&self) -> Vec<i64> {
        self.store.lock().unwrap().cleanup_calls.clone()
    }
}

#[async_trait]
impl DbClient for InMemoryDbClient {
    async fn add_notification(&self, mut notification: Notification) -> AppResult<Notification> {
        if notification.id.is_empty() {
            notification.id = Uuid::new_v4().to_string();
        }
        if notification.created == 0 {
            notification.created = now_millis();
        }
        notification.modified = notification.created;
        self.store
            .lock()
            .unwrap()
            .notifications
            .push(notification.clone());
        Ok(notification)
    }

    async fn update_notification(&self, notification: &Notification) -> AppResult<()> {
        let mut store = self.store.lock().unwrap();
        let stored = store
            .notifications
            .iter_mut()
            .find(|n| n.id == notification.id)
            .ok_or_else(|| AppError::EntityDoesNotExist(notification.id.clone()))?;
        *stored = notification.clone();
        stored.modified = now_millis();
        Ok(())
    }

    async fn subscriptions_by_categories_and_labels(
        &self,
        offset: i64,
        limit: i64,
        categories: &[String],
        labels: &[String],
    ) -> AppResult<Vec<Subscription>> {
        let store = self.store.lock().unwrap();
        let matched = store
            .subscriptions
            .iter()
            .filter(|s| s.matches(categories, labels))
            .skip(offset.max(0) as usize)
            .cloned();
        Ok(if limit < 0 {
            matched.collect()
        } else {
            matched.take(limit as usize).collect()
        })
    }

    async fn subscription_by_name(&self, name: &str) -> AppResult<Subscription> {
        self.store
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| AppError::EntityDoesNotExist(format!("subscription '{}'", name)))
    }

    async fn add_transmission(&self, mut transmission: Transmission) -> AppResult<Transmission> {
        if transmission.id.is_empty() {
            transmission.id = Uuid::new_v4().to_string();
        }
        transmission.created = now_millis();
        self.store
            .lock()
            .unwrap()
            .transmissions
            .push(transmission.clone());
        Ok(transmission)
    }

    async fn update_transmission(&self, transmission: &Transmission) -> AppResult<()> {
        let mut store = self.store.lock().unwrap();
        let stored = store
            .transmissions
            .iter_mut()
            .find(|t| t.id == transmission.id)
            .ok_or_else(|| AppError::EntityDoesNotExist(transmission.id.clone()))?;
        *stored = transmission.clone();
        Ok(())
    }

    async fn transmission_by_id(&self, id: &str) -> AppResult<Transmission> {
        self.transmissions()
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| AppError::EntityDoesNotExist(id.to_string()))
    }

    async fn transmissions_by_notification_id(
        &self,
        notification_id: &str,
    ) -> AppResult<Vec<Transmission>> {
        Ok(self
            .transmissions()
            .into_iter()
            .filter(|t| t.notification_id == notification_id)
            .collect())
    }

    async fn notification_total_count(&self) -> AppResult<i64> {
        Ok(self.store.lock().unwrap().notifications.len() as i64)
    }

    async fn latest_notification_by_offset(&self, offset: i64) -> AppResult<Notification> {
        let mut notifications = self.notifications();
        notifications.sort_by(|a, b| b.modified.cmp(&a.modified));
        notifications
            .into_iter()
            .nth(offset.max(0) as usize)
            .ok_or_else(|| AppError::EntityDoesNotExist(format!("offset {}", offset)))
    }

    async fn cleanup_notifications_by_age(&self, age_millis: i64) -> AppResult<()> {
        self.store.lock().unwrap().cleanup_calls.push(age_millis);
        Ok(())
    }
}

/// Channel sender replaying queued outcomes, then a fixed fallback.
pub struct ScriptedSender {
    script: Mutex<VecDeque<Result<String, String>>>,
    fallback: Result<String, String>,
    calls: AtomicUsize,
}

impl ScriptedSender {
    pub fn succeeding() -> Arc<Self> {
        Self::scripted(Vec::new(), Ok("ok".to_string()))
    }

    pub fn failing() -> Arc<Self> {
        Self::scripted(Vec::new(), Err("connection refused".to_string()))
    }

    pub fn scripted(
        outcomes: Vec<Result<String, String>>,
        fallback: Result<String, String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outcomes.into()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelSender for ScriptedSender {
    async fn send(&self, _notification: &Notification, _address: &Address) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        outcome.map_err(AppError::ServerError)
    }
}

/// Senders with scripted REST and email channels and real, unused MQTT/ZeroMQ senders.
pub fn scripted_senders(rest: Arc<ScriptedSender>, email: Arc<ScriptedSender>) -> Senders {
    Senders {
        rest,
        email,
        mqtt: Arc::new(MqttSender::new(
            Arc::new(StaticSecretProvider::new()),
            Duration::from_secs(1),
        )),
        zeromq: Arc::new(ZeroMqSender::with_settle_delay(Duration::ZERO)),
    }
}

/// Service configuration with a fast resend schedule.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.writable.resend_limit = 2;
    config.writable.resend_interval = "1s".to_string();
    config
}
