use std::sync::Arc;

use crate::db::models::{Notification, NotificationStatus};
use crate::db::DbClient;
use crate::error::AppResult;
use crate::services::tasks::DeliveryTasks;
use crate::services::transmission::TransmissionSender;

/// Routes notifications to every matching, unlocked subscription.
pub struct Distributor {
    db: Arc<dyn DbClient>,
    transmitter: Arc<TransmissionSender>,
    tasks: DeliveryTasks,
}

impl Distributor {
    pub fn new(
        db: Arc<dyn DbClient>,
        transmitter: Arc<TransmissionSender>,
        tasks: DeliveryTasks,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            transmitter,
            tasks,
        })
    }

    /// Validate and store a new notification, then distribute it in the background.
    ///
    /// Returns the stored id before any delivery is attempted.
    pub async fn add_notification(self: &Arc<Self>, mut notification: Notification) -> AppResult<String> {
        notification.validate()?;
        notification.status = NotificationStatus::New;

        let notification = self.db.add_notification(notification).await?;
        let id = notification.id.clone();
        tracing::info!("Stored notification {} from {}", id, notification.sender);

        let this = Arc::clone(self);
        self.tasks
            .spawn(format!("distribute notification {}", id), async move {
                this.distribute(notification).await.map(|_| ())
            });

        Ok(id)
    }

    /// Fan the notification out to matching subscriptions and mark it processed.
    ///
    /// Deliveries run on their own tasks; this returns without waiting for them.
    pub async fn distribute(&self, mut notification: Notification) -> AppResult<Notification> {
        let categories = notification.match_categories();
        let subscriptions = self
            .db
            .subscriptions_by_categories_and_labels(0, -1, &categories, &notification.labels)
            .await?;

        let mut dispatched = 0;
        for subscription in subscriptions {
            if subscription.is_locked() {
                tracing::debug!(
                    "Skipping locked subscription {} for notification {}",
                    subscription.name,
                    notification.id
                );
                continue;
            }
            for address in &subscription.channels {
                self.transmitter.spawn_transmit(
                    notification.clone(),
                    subscription.clone(),
                    address.clone(),
                );
                dispatched += 1;
            }
        }

        notification.status = NotificationStatus::Processed;
        self.db.update_notification(&notification).await?;
        tracing::debug!(
            "Notification {} processed, {} transmissions dispatched",
            notification.id,
            dispatched
        );

        Ok(notification)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::db::models::{
        Address, AdminState, EmailAddress, RestAddress, Severity, Subscription,
        TransmissionStatus,
    };
    use crate::error::AppError;
    use crate::services::tasks::TaskReport;
    use crate::test_utils::{scripted_senders, test_config, InMemoryDbClient, ScriptedSender};

    struct Harness {
        db: Arc<InMemoryDbClient>,
        distributor: Arc<Distributor>,
        reports: UnboundedReceiver<TaskReport>,
        rest: Arc<ScriptedSender>,
        email: Arc<ScriptedSender>,
    }

    fn harness() -> Harness {
        let db = Arc::new(InMemoryDbClient::new());
        let rest = ScriptedSender::succeeding();
        let email = ScriptedSender::succeeding();
        let (tasks, reports) = DeliveryTasks::new();
        let transmitter = TransmissionSender::new(
            db.clone(),
            scripted_senders(rest.clone(), email.clone()),
            tasks.clone(),
            &test_config().writable,
        );
        let distributor = Distributor::new(db.clone(), transmitter, tasks);
        Harness {
            db,
            distributor,
            reports,
            rest,
            email,
        }
    }

    impl Harness {
        async fn wait_for(&mut self, reports: usize) {
            for _ in 0..reports {
                let report = self.reports.recv().await.unwrap();
                assert!(report.result.is_ok(), "{} failed", report.label);
            }
        }
    }

    fn subscription(name: &str, admin_state: AdminState) -> Subscription {
        Subscription {
            name: name.to_string(),
            categories: vec!["security".into()],
            channels: vec![
                Address::Rest(RestAddress {
                    host: "localhost".into(),
                    port: 7770,
                    ..Default::default()
                }),
                Address::Email(EmailAddress {
                    recipients: vec!["ops@example.com".into()],
                    ..Default::default()
                }),
            ],
            admin_state,
            ..Default::default()
        }
    }

    fn notification() -> Notification {
        Notification {
            category: "security".into(),
            content: "door opened".into(),
            sender: "device-service".into(),
            severity: Severity::Normal,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn fans_out_one_transmission_per_channel() {
        let mut h = harness();
        h.db.insert_subscription(subscription("ops", AdminState::Unlocked));
        let stored = h.db.add_notification(notification()).await.unwrap();

        let processed = h.distributor.distribute(stored.clone()).await.unwrap();
        assert_eq!(processed.status, NotificationStatus::Processed);

        h.wait_for(2).await;
        let transmissions = h.db.transmissions();
        assert_eq!(transmissions.len(), 2);
        assert!(transmissions
            .iter()
            .all(|t| t.status == TransmissionStatus::Sent && t.notification_id == stored.id));
        assert_eq!(h.rest.calls(), 1);
        assert_eq!(h.email.calls(), 1);
    }

    #[tokio::test]
    async fn locked_subscriptions_get_no_transmissions() {
        let mut h = harness();
        h.db.insert_subscription(subscription("locked", AdminState::Locked));
        h.db.insert_subscription(subscription("open", AdminState::Unlocked));
        let stored = h.db.add_notification(notification()).await.unwrap();

        h.distributor.distribute(stored).await.unwrap();
        h.wait_for(2).await;

        let transmissions = h.db.transmissions();
        assert_eq!(transmissions.len(), 2);
        assert!(transmissions.iter().all(|t| t.subscription_name == "open"));
    }

    #[tokio::test]
    async fn processed_even_without_matches() {
        let h = harness();
        let mut unmatched = notification();
        unmatched.category = "billing".into();
        let stored = h.db.add_notification(unmatched).await.unwrap();

        h.distributor.distribute(stored.clone()).await.unwrap();

        let persisted = h.db.notification(&stored.id).unwrap();
        assert_eq!(persisted.status, NotificationStatus::Processed);
        assert!(h.db.transmissions().is_empty());
    }

    #[tokio::test]
    async fn labels_match_when_category_is_blank() {
        let mut h = harness();
        let mut sub = subscription("by-label", AdminState::Unlocked);
        sub.categories.clear();
        sub.labels = vec!["door".into()];
        h.db.insert_subscription(sub);

        let mut labelled = notification();
        labelled.category = " ".into();
        labelled.labels = vec!["door".into()];
        let stored = h.db.add_notification(labelled).await.unwrap();

        h.distributor.distribute(stored).await.unwrap();
        h.wait_for(2).await;
        assert_eq!(h.db.transmissions().len(), 2);
    }

    #[tokio::test]
    async fn add_notification_validates_and_distributes() {
        let mut h = harness();
        h.db.insert_subscription(subscription("ops", AdminState::Unlocked));

        let mut invalid = notification();
        invalid.category.clear();
        let err = h.distributor.add_notification(invalid).await.unwrap_err();
        assert!(matches!(err, AppError::ContractInvalid(_)));
        assert!(h.db.notifications().is_empty());

        let id = h.distributor.add_notification(notification()).await.unwrap();
        // distribute plus two channel transmissions
        h.wait_for(3).await;

        assert_eq!(
            h.db.notification(&id).unwrap().status,
            NotificationStatus::Processed
        );
        assert_eq!(h.db.transmissions().len(), 2);
    }
}
