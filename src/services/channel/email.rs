use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Address as MailAddress, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use super::{address_mismatch, ChannelSender};
use crate::config::SmtpConfig;
use crate::db::models::{Address, Notification};
use crate::error::{AppError, AppResult};
use crate::services::secrets::SecretProvider;

/// SMTP limits a line to 998 characters excluding CRLF.
const MAX_LINE_LENGTH: usize = 998;
const AUTH_MODE_NONE: &str = "none";
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds an RFC 822 style message with CRLF line endings.
///
/// The MIME headers are only written when `content_type` is non-empty. Body
/// lines longer than the SMTP limit are split without altering their content.
pub fn build_smtp_message(
    sender: &str,
    subject: &str,
    to: &[String],
    content_type: &str,
    body: &str,
) -> String {
    let mut msg = String::with_capacity(body.len() + 256);
    msg.push_str(&format!("Subject: {}\r\n", subject));
    msg.push_str(&format!("From: {}\r\n", sender));
    msg.push_str(&format!("To: {}\r\n", to.join(",")));
    if !content_type.is_empty() {
        msg.push_str("MIME-version: 1.0;\r\n");
        msg.push_str(&format!("Content-Type: {}; charset=\"UTF-8\";\r\n", content_type));
    }
    msg.push_str("\r\n");

    for line in body.lines() {
        fold_line(line, &mut msg);
    }
    msg
}

fn fold_line(line: &str, out: &mut String) {
    let mut rest = line;
    while rest.len() > MAX_LINE_LENGTH {
        let mut cut = MAX_LINE_LENGTH;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        out.push_str(&rest[..cut]);
        out.push_str("\r\n");
        rest = &rest[cut..];
    }
    out.push_str(rest);
    out.push_str("\r\n");
}

pub struct EmailSender {
    smtp: SmtpConfig,
    secrets: Arc<dyn SecretProvider>,
}

impl EmailSender {
    pub fn new(smtp: SmtpConfig, secrets: Arc<dyn SecretProvider>) -> Self {
        Self { smtp, secrets }
    }

    /// Credentials from the secret store, or `None` when the server should be used unauthenticated.
    async fn deduce_auth(&self) -> AppResult<Option<Credentials>> {
        let mode = self.smtp.auth_mode.trim().to_lowercase();
        if mode.is_empty() || mode == AUTH_MODE_NONE {
            return Ok(None);
        }

        let secrets = self
            .secrets
            .get_secret(&self.smtp.secret_path, &["username", "password"])
            .await
            .map_err(|e| {
                AppError::ServerError(format!(
                    "failed to retrieve SMTP credentials from '{}': {}",
                    self.smtp.secret_path, e
                ))
            })?;

        let password = secrets.get("password").cloned().unwrap_or_default();
        if password.is_empty() {
            tracing::debug!("No SMTP password configured, sending unauthenticated");
            return Ok(None);
        }
        let username = secrets.get("username").cloned().unwrap_or_default();
        Ok(Some(Credentials::new(username, password)))
    }

    fn transport(
        &self,
        credentials: Option<Credentials>,
    ) -> AppResult<AsyncSmtpTransport<Tokio1Executor>> {
        let tls = TlsParameters::builder(self.smtp.host.clone())
            .dangerous_accept_invalid_certs(self.smtp.enable_self_signed_cert)
            .build()
            .map_err(|e| AppError::ServerError(format!("invalid SMTP TLS parameters: {}", e)))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.smtp.host)
            .port(self.smtp.port)
            .tls(Tls::Opportunistic(tls))
            .timeout(Some(SMTP_TIMEOUT));
        if let Some(credentials) = credentials {
            builder = builder.credentials(credentials);
        }
        Ok(builder.build())
    }

    fn envelope(&self, recipients: &[String]) -> AppResult<Envelope> {
        let from = self.smtp.sender.parse::<MailAddress>().map_err(|e| {
            AppError::ContractInvalid(format!("invalid SMTP sender '{}': {}", self.smtp.sender, e))
        })?;
        let to = recipients
            .iter()
            .map(|r| {
                r.trim().parse::<MailAddress>().map_err(|e| {
                    AppError::ContractInvalid(format!("invalid recipient '{}': {}", r, e))
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Envelope::new(Some(from), to)
            .map_err(|e| AppError::ContractInvalid(format!("invalid mail envelope: {}", e)))
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    async fn send(&self, notification: &Notification, address: &Address) -> AppResult<String> {
        let Address::Email(email) = address else {
            return Err(address_mismatch("EMAIL", address));
        };

        let envelope = self.envelope(&email.recipients)?;
        let message = build_smtp_message(
            &notification.sender,
            &self.smtp.subject,
            &email.recipients,
            &notification.content_type,
            &notification.content,
        );

        let credentials = self.deduce_auth().await?;
        let transport = self.transport(credentials)?;

        transport
            .send_raw(&envelope, message.as_bytes())
            .await
            .map_err(|e| {
                AppError::ServerError(format!(
                    "failed to send mail via {}:{}: {}",
                    self.smtp.host, self.smtp.port, e
                ))
            })?;

        tracing::debug!(
            "Mailed notification {} to {}",
            notification.id,
            email.recipients.join(",")
        );
        Ok(String::new())
    }
}
