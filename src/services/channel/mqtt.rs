use std::collections::HashMap;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, Incoming, MqttOptions, QoS, TlsConfiguration,
    Transport,
};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::{address_mismatch, ChannelSender};
use crate::db::models::{Address, MqttAddress, Notification};
use crate::error::{AppError, AppResult};
use crate::services::secrets::SecretProvider;

const AUTH_MODE_NONE: &str = "none";
const AUTH_MODE_USERNAME_PASSWORD: &str = "usernamepassword";
const AUTH_MODE_CLIENT_CERT: &str = "clientcert";
const AUTH_MODE_CA_CERT: &str = "cacert";

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const REQUEST_CAPACITY: usize = 16;

struct CachedClient {
    client: AsyncClient,
    poller: JoinHandle<()>,
}

#[derive(Default)]
struct AuthSecrets {
    username: Option<String>,
    password: Option<String>,
    ca_cert: Option<Vec<u8>>,
    client_cert: Option<(Vec<u8>, Vec<u8>)>,
}

/// Publishes notifications as JSON to MQTT brokers over cached, auto-reconnecting clients.
pub struct MqttSender {
    secrets: Arc<dyn SecretProvider>,
    wait: Duration,
    clients: RwLock<HashMap<String, CachedClient>>,
}

impl MqttSender {
    pub fn new(secrets: Arc<dyn SecretProvider>, wait: Duration) -> Self {
        Self {
            secrets,
            wait,
            clients: RwLock::new(HashMap::new()),
        }
    }

    fn cache_key(address: &MqttAddress) -> String {
        format!("{}:{}:{}", address.publisher, address.host, address.port)
    }

    pub async fn cached_clients(&self) -> usize {
        self.clients.read().await.len()
    }

    async fn client_for(&self, address: &MqttAddress) -> AppResult<AsyncClient> {
        let key = Self::cache_key(address);
        if let Some(cached) = self.clients.read().await.get(&key) {
            return Ok(cached.client.clone());
        }

        let mut clients = self.clients.write().await;
        if let Some(cached) = clients.get(&key) {
            return Ok(cached.client.clone());
        }

        // Connect runs under the write lock, so a slow broker stalls lookups for
        // every key for up to `wait`. A per-key in-flight marker would lift that.
        let cached = self.connect(address).await?;
        let client = cached.client.clone();
        clients.insert(key, cached);
        Ok(client)
    }

    async fn connect(&self, address: &MqttAddress) -> AppResult<CachedClient> {
        let options = self.options(address).await?;
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let connack = tokio::time::timeout(self.wait, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => return Ok(()),
                    Ok(_) => continue,
                    Err(e) => return Err(e),
                }
            }
        })
        .await;

        match connack {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(AppError::ServerError(format!(
                    "failed to connect to MQTT broker {}:{}: {}",
                    address.host, address.port, e
                )))
            }
            Err(_) => {
                return Err(AppError::ServerError(format!(
                    "timed out connecting to MQTT broker {}:{}",
                    address.host, address.port
                )))
            }
        }

        tracing::info!(
            "Connected MQTT client {} to {}:{}",
            address.publisher,
            address.host,
            address.port
        );
        let poller = tokio::spawn(poll_events(Self::cache_key(address), eventloop));
        Ok(CachedClient { client, poller })
    }

    async fn options(&self, address: &MqttAddress) -> AppResult<MqttOptions> {
        let secrets = self.auth_secrets(address).await?;

        let mut options = MqttOptions::new(&address.publisher, &address.host, address.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);

        if let (Some(username), Some(password)) = (&secrets.username, &secrets.password) {
            options.set_credentials(username, password);
        }

        let needs_tls =
            address.uses_tls() || secrets.ca_cert.is_some() || secrets.client_cert.is_some();
        if needs_tls {
            options.set_transport(tls_transport(address, secrets)?);
        }

        Ok(options)
    }

    async fn auth_secrets(&self, address: &MqttAddress) -> AppResult<AuthSecrets> {
        let mode = address.auth_mode.trim().to_lowercase();
        let keys: &[&str] = match mode.as_str() {
            "" | AUTH_MODE_NONE => return Ok(AuthSecrets::default()),
            AUTH_MODE_USERNAME_PASSWORD => &["username", "password"],
            AUTH_MODE_CLIENT_CERT => &["clientcert", "clientkey", "cacert"],
            AUTH_MODE_CA_CERT => &["cacert"],
            other => {
                return Err(AppError::ContractInvalid(format!(
                    "invalid MQTT auth mode '{}'",
                    other
                )))
            }
        };

        let mut found = self
            .secrets
            .get_secret(&address.secret_path, keys)
            .await
            .map_err(|e| {
                AppError::ServerError(format!(
                    "failed to retrieve MQTT secrets from '{}': {}",
                    address.secret_path, e
                ))
            })?;

        let missing = |key: &str| {
            AppError::ContractInvalid(format!(
                "MQTT auth mode '{}' requires secret '{}' at '{}'",
                mode, key, address.secret_path
            ))
        };

        let mut secrets = AuthSecrets {
            ca_cert: found.remove("cacert").map(String::into_bytes),
            ..Default::default()
        };
        match mode.as_str() {
            AUTH_MODE_USERNAME_PASSWORD => {
                secrets.username = Some(found.remove("username").ok_or_else(|| missing("username"))?);
                secrets.password = Some(found.remove("password").ok_or_else(|| missing("password"))?);
            }
            AUTH_MODE_CLIENT_CERT => {
                let cert = found.remove("clientcert").ok_or_else(|| missing("clientcert"))?;
                let key = found.remove("clientkey").ok_or_else(|| missing("clientkey"))?;
                secrets.client_cert = Some((cert.into_bytes(), key.into_bytes()));
            }
            _ => {
                if secrets.ca_cert.is_none() {
                    return Err(missing("cacert"));
                }
            }
        }
        Ok(secrets)
    }

    pub async fn remove_client(&self, address: &MqttAddress) {
        let removed = self.clients.write().await.remove(&Self::cache_key(address));
        if let Some(cached) = removed {
            self.close(cached).await;
            tracing::info!("Removed MQTT client {}", Self::cache_key(address));
        }
    }

    pub async fn disconnect_all(&self) {
        let drained: Vec<CachedClient> = self.clients.write().await.drain().map(|(_, c)| c).collect();
        for cached in drained {
            self.close(cached).await;
        }
    }

    async fn close(&self, cached: CachedClient) {
        if let Ok(Err(e)) = tokio::time::timeout(self.wait, cached.client.disconnect()).await {
            tracing::debug!("MQTT disconnect failed: {}", e);
        }
        cached.poller.abort();
    }
}

async fn poll_events(key: String, mut eventloop: EventLoop) {
    loop {
        match eventloop.poll().await {
            Ok(_) => {}
            Err(ConnectionError::RequestsDone) => {
                tracing::debug!("MQTT client {} closed", key);
                break;
            }
            Err(e) => {
                tracing::warn!("MQTT client {} connection error: {}", key, e);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

fn qos_level(qos: u8) -> AppResult<QoS> {
    match qos {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(AppError::ContractInvalid(format!("invalid MQTT QoS {}", other))),
    }
}

fn tls_transport(address: &MqttAddress, secrets: AuthSecrets) -> AppResult<Transport> {
    if address.skip_cert_verify {
        let builder = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertificateVerification));
        let config = match &secrets.client_cert {
            Some((cert, key)) => {
                let (certs, key) = parse_client_identity(cert, key)?;
                builder.with_client_auth_cert(certs, key).map_err(|e| {
                    AppError::ContractInvalid(format!("invalid MQTT client certificate: {}", e))
                })?
            }
            None => builder.with_no_client_auth(),
        };
        return Ok(Transport::tls_with_config(TlsConfiguration::Rustls(Arc::new(config))));
    }

    match secrets.ca_cert {
        Some(ca) => Ok(Transport::tls_with_config(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: secrets.client_cert,
        })),
        None if secrets.client_cert.is_some() => Err(AppError::ContractInvalid(
            "MQTT client certificate auth requires a CA certificate or skipCertVerify".to_string(),
        )),
        None => Ok(Transport::tls_with_default_config()),
    }
}

fn parse_client_identity(
    cert: &[u8],
    key: &[u8],
) -> AppResult<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::ContractInvalid(format!("invalid MQTT client certificate: {}", e)))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key))
        .map_err(|e| AppError::ContractInvalid(format!("invalid MQTT client key: {}", e)))?
        .ok_or_else(|| AppError::ContractInvalid("no private key in MQTT client key".to_string()))?;
    Ok((certs, key))
}

/// Accepts any server certificate; only used when the address sets `skipCertVerify`.
#[derive(Debug)]
struct NoCertificateVerification;

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

#[async_trait]
impl ChannelSender for MqttSender {
    async fn send(&self, notification: &Notification, address: &Address) -> AppResult<String> {
        let Address::Mqtt(mqtt) = address else {
            return Err(address_mismatch("MQTT", address));
        };

        // MqttOptions panics on an empty or space-prefixed client id.
        if mqtt.publisher.is_empty() || mqtt.publisher.starts_with(char::is_whitespace) {
            return Err(AppError::ContractInvalid(
                "MQTT publisher must be a non-empty client id".to_string(),
            ));
        }
        if mqtt.topic.trim().is_empty() {
            return Err(AppError::ContractInvalid("MQTT topic is empty".to_string()));
        }
        let qos = qos_level(mqtt.qos)?;
        let payload = serde_json::to_vec(notification)?;

        let client = self.client_for(mqtt).await?;
        tokio::time::timeout(
            self.wait,
            client.publish(mqtt.topic.as_str(), qos, mqtt.retained, payload),
        )
        .await
        .map_err(|_| AppError::ServerError(format!("timed out publishing to {}", mqtt.topic)))?
        .map_err(|e| AppError::ServerError(format!("failed to publish to {}: {}", mqtt.topic, e)))?;

        tracing::debug!(
            "Published notification {} to MQTT topic {}",
            notification.id,
            mqtt.topic
        );
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ZeroMqAddress;
    use crate::services::secrets::StaticSecretProvider;

    fn sender() -> MqttSender {
        MqttSender::new(Arc::new(StaticSecretProvider::new()), Duration::from_secs(2))
    }

    fn address() -> MqttAddress {
        MqttAddress {
            host: "127.0.0.1".to_string(),
            port: 1,
            publisher: "notification-core".to_string(),
            topic: "edge/alerts".to_string(),
            scheme: "tcp".to_string(),
            ..Default::default()
        }
    }

    fn notification() -> Notification {
        Notification {
            content: "hi".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn invalid_publisher_is_rejected_without_panicking() {
        let mut bad = address();
        bad.publisher = " leading-space".to_string();
        let err = sender()
            .send(&notification(), &Address::Mqtt(bad))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ContractInvalid(_)));
    }

    #[tokio::test]
    async fn qos_and_auth_mode_are_validated() {
        let mut bad_qos = address();
        bad_qos.qos = 3;
        let err = sender()
            .send(&notification(), &Address::Mqtt(bad_qos))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ContractInvalid(_)));

        let mut needs_creds = address();
        needs_creds.auth_mode = "usernamepassword".to_string();
        needs_creds.secret_path = "mqtt".to_string();
        let err = sender()
            .send(&notification(), &Address::Mqtt(needs_creds))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ContractInvalid(_)));
    }

    #[tokio::test]
    async fn failed_connect_is_not_cached() {
        let sender = sender();
        let err = sender
            .send(&notification(), &Address::Mqtt(address()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ServerError(_)));
        assert_eq!(sender.cached_clients().await, 0);
    }

    #[tokio::test]
    async fn rejects_other_address_types() {
        let err = sender()
            .send(
                &notification(),
                &Address::ZeroMq(ZeroMqAddress {
                    port: 5563,
                    ..Default::default()
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ContractInvalid(_)));
    }
}
