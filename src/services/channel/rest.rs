use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Method};

use super::{address_mismatch, ChannelSender};
use crate::db::models::{Address, Notification};
use crate::error::{AppError, AppResult};

/// Sends the notification content as the body of an HTTP request.
pub struct RestSender {
    client: Client,
}

impl RestSender {
    pub fn new(timeout: Duration) -> AppResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ChannelSender for RestSender {
    async fn send(&self, notification: &Notification, address: &Address) -> AppResult<String> {
        let Address::Rest(rest) = address else {
            return Err(address_mismatch("REST", address));
        };

        let method = Method::from_bytes(rest.method().to_uppercase().as_bytes()).map_err(|_| {
            AppError::ContractInvalid(format!("invalid HTTP method '{}'", rest.http_method))
        })?;
        let url = rest.url();

        let mut request = self
            .client
            .request(method, &url)
            .body(notification.content.clone());
        if !notification.content_type.is_empty() {
            request = request.header(CONTENT_TYPE, notification.content_type.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!("REST request to {} returned {}", url, status);
            return Err(AppError::ServerError(format!(
                "failed to send REST request to {}: status {}, body: {}",
                url, status, body
            )));
        }

        tracing::debug!("Sent notification {} to {}", notification.id, url);
        Ok(body)
    }
}
