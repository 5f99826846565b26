//! Per-channel delivery: first attempt, bounded resend of critical failures,
//! and escalation once the resend budget is exhausted.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::config::WritableConfig;
use crate::db::models::{
    Address, Notification, NotificationStatus, Severity, Subscription, Transmission,
    TransmissionRecord, TransmissionStatus,
};
use crate::db::DbClient;
use crate::error::{AppError, AppResult};
use crate::services::channel::{ChannelSender, Senders};
use crate::services::tasks::DeliveryTasks;

/// Reserved name of the subscription that receives escalated notifications.
pub const ESCALATION_SUBSCRIPTION_NAME: &str = "ESCALATION";
pub const ESCALATION_CONTENT_NOTICE: &str = "This notification is escalated by the transmission";
const ESCALATION_CONTENT_TYPE: &str = "text/plain";

pub struct TransmissionSender {
    db: Arc<dyn DbClient>,
    senders: Senders,
    tasks: DeliveryTasks,
    resend_limit: i32,
    resend_interval: String,
}

impl TransmissionSender {
    pub fn new(
        db: Arc<dyn DbClient>,
        senders: Senders,
        tasks: DeliveryTasks,
        writable: &WritableConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            senders,
            tasks,
            resend_limit: writable.resend_limit,
            resend_interval: writable.resend_interval.clone(),
        })
    }

    /// Run `transmit` on its own task. The caller does not wait for the outcome.
    pub fn spawn_transmit(
        self: &Arc<Self>,
        notification: Notification,
        subscription: Subscription,
        address: Address,
    ) {
        let label = format!(
            "notification {} to subscription {} via {}",
            notification.id,
            subscription.name,
            address.type_name()
        );
        let this = Arc::clone(self);
        self.tasks.spawn(label, async move {
            this.transmit(&notification, &subscription, &address)
                .await
                .map(|_| ())
        });
    }

    /// Deliver a notification to one subscription channel and persist the resulting transmission.
    pub async fn transmit(
        self: &Arc<Self>,
        notification: &Notification,
        subscription: &Subscription,
        address: &Address,
    ) -> AppResult<Transmission> {
        let record = self.first_send(notification, address).await;
        let transmission = Transmission::from_first_attempt(
            &notification.id,
            &subscription.name,
            address,
            record,
        );
        let mut transmission = self.db.add_transmission(transmission).await.map_err(|e| {
            tracing::error!(
                "Failed to persist transmission for notification {} and subscription {}: {}",
                notification.id,
                subscription.name,
                e
            );
            e
        })?;

        // Escalated notifications never re-enter resend or escalation.
        if notification.status == NotificationStatus::Escalated {
            return Ok(transmission);
        }

        if notification.severity == Severity::Critical
            && transmission.status == TransmissionStatus::Failed
        {
            transmission.status = TransmissionStatus::Resending;
            self.db.update_transmission(&transmission).await?;

            self.re_send(notification, subscription, &mut transmission)
                .await
                .map_err(|e| {
                    tracing::error!("Resend of transmission {} aborted: {}", transmission.id, e);
                    e
                })?;

            if transmission.status == TransmissionStatus::Escalated {
                self.escalated_send(notification, &transmission).await?;
            }
        }

        Ok(transmission)
    }

    /// One attempt through the sender wired for the address type.
    pub async fn first_send(&self, notification: &Notification, address: &Address) -> TransmissionRecord {
        let sender: &Arc<dyn ChannelSender> = match address {
            Address::Rest(_) => &self.senders.rest,
            Address::Email(_) => &self.senders.email,
            Address::Mqtt(_) | Address::ZeroMq(_) => {
                tracing::warn!(
                    "Notification {} not sent: unsupported address type {}",
                    notification.id,
                    address.type_name()
                );
                return TransmissionRecord::failed(format!(
                    "unsupported address type: {}",
                    address.type_name()
                ));
            }
        };

        match sender.send(notification, address).await {
            Ok(response) => TransmissionRecord::sent(response),
            Err(e) => {
                tracing::warn!(
                    "Failed to send notification {} via {} to {}:{}: {}",
                    notification.id,
                    address.type_name(),
                    address.host(),
                    address.port(),
                    e
                );
                TransmissionRecord::failed(e.to_string())
            }
        }
    }

    /// Effective resend limit and interval: subscription overrides, else service defaults.
    fn resend_policy(&self, subscription: &Subscription) -> AppResult<(i32, Duration)> {
        let limit = if subscription.resend_limit > 0 {
            subscription.resend_limit
        } else {
            self.resend_limit
        };
        let interval = if subscription.resend_interval.is_empty() {
            self.resend_interval.as_str()
        } else {
            subscription.resend_interval.as_str()
        };
        let interval = humantime::parse_duration(interval).map_err(|e| {
            AppError::ContractInvalid(format!("invalid resend interval '{}': {}", interval, e))
        })?;
        Ok((limit, interval))
    }

    /// Retry a failed transmission until it is sent or the limit is reached, then mark it escalated.
    pub async fn re_send(
        &self,
        notification: &Notification,
        subscription: &Subscription,
        transmission: &mut Transmission,
    ) -> AppResult<()> {
        let (limit, interval) = self.resend_policy(subscription)?;

        for attempt in 1..=limit {
            tokio::time::sleep(interval).await;

            let channel = transmission.channel.clone();
            let record = self.first_send(notification, &channel).await;
            let sent = record.is_sent();
            transmission.records.push(record);
            transmission.resend_count += 1;
            transmission.status = if sent {
                TransmissionStatus::Sent
            } else {
                TransmissionStatus::Resending
            };
            self.db.update_transmission(transmission).await?;

            if sent {
                tracing::info!(
                    "Transmission {} sent on resend attempt {}",
                    transmission.id,
                    attempt
                );
                return Ok(());
            }
        }

        tracing::warn!(
            "Transmission {} still failing after {} resends, escalating",
            transmission.id,
            limit
        );
        transmission.status = TransmissionStatus::Escalated;
        self.db.update_transmission(transmission).await?;
        Ok(())
    }

    /// Create an escalated copy of the notification and fan it out to the escalation subscription.
    ///
    /// Returns `Ok(None)` when no escalation subscription exists.
    pub async fn escalated_send(
        self: &Arc<Self>,
        notification: &Notification,
        transmission: &Transmission,
    ) -> AppResult<Option<Notification>> {
        let subscription = match self.db.subscription_by_name(ESCALATION_SUBSCRIPTION_NAME).await {
            Ok(subscription) => subscription,
            Err(AppError::EntityDoesNotExist(_)) => {
                tracing::info!(
                    "No {} subscription, transmission {} not escalated",
                    ESCALATION_SUBSCRIPTION_NAME,
                    transmission.id
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let escalated = Notification {
            id: Uuid::new_v4().to_string(),
            content: format!(
                "[{} {}] {}",
                ESCALATION_CONTENT_NOTICE, transmission.id, notification.content
            ),
            content_type: ESCALATION_CONTENT_TYPE.to_string(),
            status: NotificationStatus::Escalated,
            created: 0,
            modified: 0,
            ..notification.clone()
        };
        let escalated = self.db.add_notification(escalated).await?;
        tracing::info!(
            "Escalated notification {} created for transmission {}",
            escalated.id,
            transmission.id
        );

        for address in &subscription.channels {
            self.spawn_transmit(escalated.clone(), subscription.clone(), address.clone());
        }

        Ok(Some(escalated))
    }
}
