//! Transport-specific channel senders.
//!
//! Every sender accepts the whole `Address` enum and rejects the variants it
//! does not own with a contract error.

mod email;
mod mqtt;
mod rest;
mod zeromq;

pub use email::{build_smtp_message, EmailSender};
pub use mqtt::MqttSender;
pub use rest::RestSender;
pub use zeromq::ZeroMqSender;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::db::models::{Address, Notification};
use crate::error::{AppError, AppResult};
use crate::services::secrets::SecretProvider;

/// Delivers one notification to one address and returns the transport's response text.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(&self, notification: &Notification, address: &Address) -> AppResult<String>;
}

pub(crate) fn address_mismatch(expected: &str, address: &Address) -> AppError {
    AppError::ContractInvalid(format!(
        "fail to cast {} address to {} address",
        address.type_name(),
        expected
    ))
}

/// The channel senders, one per transport.
#[derive(Clone)]
pub struct Senders {
    pub rest: Arc<dyn ChannelSender>,
    pub email: Arc<dyn ChannelSender>,
    pub mqtt: Arc<MqttSender>,
    pub zeromq: Arc<ZeroMqSender>,
}

impl Senders {
    pub fn new(config: &Config, secrets: Arc<dyn SecretProvider>) -> AppResult<Self> {
        Ok(Self {
            rest: Arc::new(RestSender::new(config.channels.rest_timeout())?),
            email: Arc::new(EmailSender::new(config.smtp.clone(), secrets.clone())),
            mqtt: Arc::new(MqttSender::new(secrets, config.channels.client_wait())),
            zeromq: Arc::new(ZeroMqSender::new()),
        })
    }

    /// Drop cached connections belonging to the given addresses.
    pub async fn remove_clients(&self, addresses: &[Address]) {
        for address in addresses {
            match address {
                Address::Mqtt(mqtt) => self.mqtt.remove_client(mqtt).await,
                Address::ZeroMq(zmq) => self.zeromq.remove_socket(zmq.port).await,
                Address::Rest(_) | Address::Email(_) => {}
            }
        }
    }

    pub async fn shutdown(&self) {
        self.mqtt.disconnect_all().await;
        self.zeromq.close_all().await;
        tracing::info!("Channel senders shut down");
    }
}
