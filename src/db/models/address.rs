use serde::{Deserialize, Serialize};

/// Transport-specific delivery target. The tag selects the channel sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Address {
    #[serde(rename = "REST")]
    Rest(RestAddress),
    #[serde(rename = "EMAIL")]
    Email(EmailAddress),
    #[serde(rename = "MQTT")]
    Mqtt(MqttAddress),
    #[serde(rename = "ZeroMQ")]
    ZeroMq(ZeroMqAddress),
}

impl Address {
    pub fn type_name(&self) -> &'static str {
        match self {
            Address::Rest(_) => "REST",
            Address::Email(_) => "EMAIL",
            Address::Mqtt(_) => "MQTT",
            Address::ZeroMq(_) => "ZeroMQ",
        }
    }

    pub fn host(&self) -> &str {
        match self {
            Address::Rest(a) => &a.host,
            Address::Email(a) => &a.host,
            Address::Mqtt(a) => &a.host,
            Address::ZeroMq(a) => &a.host,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            Address::Rest(a) => a.port,
            Address::Email(a) => a.port,
            Address::Mqtt(a) => a.port,
            Address::ZeroMq(a) => a.port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestAddress {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub http_method: String,
}

impl RestAddress {
    pub fn method(&self) -> &str {
        if self.http_method.trim().is_empty() {
            "POST"
        } else {
            self.http_method.trim()
        }
    }

    pub fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("http://{}:{}{}", self.host, self.port, path)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAddress {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttAddress {
    pub host: String,
    pub port: u16,
    /// Client id used when connecting to the broker.
    pub publisher: String,
    pub topic: String,
    #[serde(default)]
    pub qos: u8,
    #[serde(default)]
    pub retained: bool,
    /// "none", "usernamepassword", "clientcert" or "cacert".
    #[serde(default)]
    pub auth_mode: String,
    #[serde(default)]
    pub secret_path: String,
    #[serde(default)]
    pub skip_cert_verify: bool,
    /// "tcp" for plain connections, "tls" / "ssl" / "mqtts" for TLS.
    #[serde(default)]
    pub scheme: String,
}

impl MqttAddress {
    pub fn uses_tls(&self) -> bool {
        matches!(
            self.scheme.to_lowercase().as_str(),
            "tls" | "ssl" | "mqtts" | "tcps"
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZeroMqAddress {
    #[serde(default)]
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub topic: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_tagged_by_type() {
        let json = r#"{"type":"REST","host":"localhost","port":7770,"path":"/alerts","httpMethod":"PUT"}"#;
        let address: Address = serde_json::from_str(json).unwrap();
        match &address {
            Address::Rest(rest) => {
                assert_eq!(rest.method(), "PUT");
                assert_eq!(rest.url(), "http://localhost:7770/alerts");
            }
            other => panic!("unexpected address {:?}", other),
        }
        assert_eq!(address.type_name(), "REST");

        let email: Address =
            serde_json::from_str(r#"{"type":"EMAIL","recipients":["ops@example.com"]}"#).unwrap();
        assert_eq!(email.type_name(), "EMAIL");
        assert_eq!(email.port(), 0);
    }

    #[test]
    fn rest_defaults_to_post_on_root() {
        let rest = RestAddress {
            host: "10.0.0.2".into(),
            port: 80,
            ..Default::default()
        };
        assert_eq!(rest.method(), "POST");
        assert_eq!(rest.url(), "http://10.0.0.2:80/");
    }

    #[test]
    fn mqtt_scheme_selects_tls() {
        let mut mqtt = MqttAddress {
            scheme: "TCP".into(),
            ..Default::default()
        };
        assert!(!mqtt.uses_tls());
        mqtt.scheme = "mqtts".into();
        assert!(mqtt.uses_tls());
    }
}
