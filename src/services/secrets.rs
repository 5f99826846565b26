use std::collections::HashMap;
use std::env;

use async_trait::async_trait;

use crate::error::AppResult;

/// Key-value secret lookup used by the SMTP and MQTT channel senders.
///
/// Only keys that exist are returned; a missing key is not an error.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get_secret(&self, path: &str, keys: &[&str]) -> AppResult<HashMap<String, String>>;
}

/// Resolves secrets from `SECRET_<PATH>_<KEY>` environment variables.
#[derive(Debug, Default, Clone)]
pub struct EnvSecretProvider;

impl EnvSecretProvider {
    pub fn variable_name(path: &str, key: &str) -> String {
        format!("SECRET_{}_{}", normalize(path), normalize(key))
    }
}

fn normalize(part: &str) -> String {
    part.trim_matches('/')
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn get_secret(&self, path: &str, keys: &[&str]) -> AppResult<HashMap<String, String>> {
        let mut found = HashMap::new();
        for key in keys {
            if let Ok(value) = env::var(Self::variable_name(path, key)) {
                found.insert(key.to_string(), value);
            }
        }
        tracing::debug!(
            "Resolved {} of {} secret keys at path '{}'",
            found.len(),
            keys.len(),
            path
        );
        Ok(found)
    }
}

/// In-memory secret store keyed by path.
#[derive(Debug, Default, Clone)]
pub struct StaticSecretProvider {
    secrets: HashMap<String, HashMap<String, String>>,
}

impl StaticSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, path: &str, key: &str, value: &str) -> Self {
        self.secrets
            .entry(path.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn get_secret(&self, path: &str, keys: &[&str]) -> AppResult<HashMap<String, String>> {
        let Some(stored) = self.secrets.get(path) else {
            return Ok(HashMap::new());
        };
        Ok(keys
            .iter()
            .filter_map(|k| stored.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_names_are_normalized() {
        assert_eq!(
            EnvSecretProvider::variable_name("/mqtt/broker-1", "clientkey"),
            "SECRET_MQTT_BROKER_1_CLIENTKEY"
        );
    }

    #[tokio::test]
    async fn env_provider_returns_only_present_keys() {
        env::set_var("SECRET_SMTP_TEST_USERNAME", "mailer");
        let found = EnvSecretProvider
            .get_secret("smtp-test", &["username", "password"])
            .await
            .unwrap();
        assert_eq!(found.get("username").map(String::as_str), Some("mailer"));
        assert!(!found.contains_key("password"));
        env::remove_var("SECRET_SMTP_TEST_USERNAME");
    }

    #[tokio::test]
    async fn static_provider_filters_by_path_and_key() {
        let provider = StaticSecretProvider::new()
            .with_secret("smtp", "username", "u")
            .with_secret("smtp", "password", "p");

        let found = provider.get_secret("smtp", &["password"]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(provider
            .get_secret("mqtt", &["password"])
            .await
            .unwrap()
            .is_empty());
    }
}
