use serde::{Deserialize, Serialize};
use std::fmt;

use super::MqttError;

/// Broker connection parameters.
///
/// `url` is `host[:port]`; the port defaults to 1883 when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MQTTServer {
    /// MQTT broker URL (e.g., "192.168.1.32:1883")
    pub url: String,
    /// Username for MQTT authentication, empty for anonymous
    pub user: String,
    /// Password for MQTT authentication
    pub pw: String,
}

impl Default for MQTTServer {
    fn default() -> Self {
        Self {
            url: "192.168.1.32:1883".to_string(),
            user: String::new(),
            pw: String::new(),
        }
    }
}

impl fmt::Display for MQTTServer {
    // Password is never shown
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.user.is_empty() {
            write!(f, "{}", self.url)
        } else {
            write!(f, "{}@{}", self.user, self.url)
        }
    }
}

impl MQTTServer {
    /// Splits `url` into host and port.
    pub fn host_and_port(&self) -> Result<(String, u16), MqttError> {
        let server_comps: Vec<&str> = self.url.split(':').collect();
        let host = server_comps
            .first()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| MqttError::InvalidServer(self.url.clone()))?;
        let port = match server_comps.get(1) {
            Some(port) => port
                .trim()
                .parse()
                .map_err(|_| MqttError::InvalidServer(self.url.clone()))?,
            None => 1883,
        };
        if server_comps.len() > 2 {
            return Err(MqttError::InvalidServer(self.url.clone()));
        }
        Ok((host.to_string(), port))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Must be unique per broker
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Unset means a lost connection stays lost.
    pub reconnect_interval_secs: Option<u64>,
    /// Capacity of the broker event channel handed to the bridges
    pub event_capacity: usize,
    pub server: MQTTServer,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            client_id: "client-speakercube".to_string(),
            keep_alive_secs: 5,
            reconnect_interval_secs: None,
            event_capacity: 100,
            server: MQTTServer::default(),
        }
    }
}

/// Association between a logical channel and a broker topic.
///
/// Fixed at startup; an empty configured topic resolves to `default_topic`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBinding {
    name: String,
    topic: String,
    default_topic: String,
}

impl TopicBinding {
    /// Only an unset or empty topic falls back, anything else is kept as is.
    pub fn new(name: &str, configured: Option<&str>, default_topic: &str) -> Self {
        let topic = match configured {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => default_topic.to_string(),
        };
        Self {
            name: name.to_string(),
            topic,
            default_topic: default_topic.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn default_topic(&self) -> &str {
        &self.default_topic
    }

    pub fn is_default(&self) -> bool {
        self.topic == self.default_topic
    }
}

impl fmt::Display for TopicBinding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -> {}", self.name, self.topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_url_without_port_uses_1883() {
        let server = MQTTServer {
            url: "broker.local".into(),
            ..Default::default()
        };
        assert_eq!(
            server.host_and_port().unwrap(),
            ("broker.local".to_string(), 1883)
        );
    }

    #[test]
    fn server_url_with_port() {
        let server = MQTTServer::default();
        assert_eq!(
            server.host_and_port().unwrap(),
            ("192.168.1.32".to_string(), 1883)
        );

        let server = MQTTServer {
            url: "10.0.1.43:8883".into(),
            ..Default::default()
        };
        assert_eq!(server.host_and_port().unwrap().1, 8883);
    }

    #[test]
    fn broken_server_urls_are_rejected() {
        for url in ["", ":1883", "host:port", "a:1:2"] {
            let server = MQTTServer {
                url: url.into(),
                ..Default::default()
            };
            assert!(server.host_and_port().is_err(), "accepted {url:?}");
        }
    }

    #[test]
    fn display_hides_password() {
        let server = MQTTServer {
            url: "broker:1883".into(),
            user: "lamp".into(),
            pw: "secret".into(),
        };
        assert_eq!(server.to_string(), "lamp@broker:1883");
    }

    #[test]
    fn topic_binding_falls_back_to_default() {
        let binding = TopicBinding::new("sad_lamp", None, "home-assistant/sad_lamp");
        assert_eq!(binding.topic(), "home-assistant/sad_lamp");
        assert!(binding.is_default());

        let binding = TopicBinding::new("sad_lamp", Some(""), "home-assistant/sad_lamp");
        assert!(binding.is_default());

        let binding = TopicBinding::new("sad_lamp", Some("lamps/sad"), "home-assistant/sad_lamp");
        assert_eq!(binding.topic(), "lamps/sad");
        assert_eq!(binding.name(), "sad_lamp");
        assert!(!binding.is_default());
    }

    #[test]
    fn topic_binding_keeps_surrounding_spaces() {
        let binding = TopicBinding::new("sad_lamp", Some(" lamps/sad "), "home-assistant/sad_lamp");
        assert_eq!(binding.topic(), " lamps/sad ");

        let binding = TopicBinding::new("sad_lamp", Some("  "), "home-assistant/sad_lamp");
        assert_eq!(binding.topic(), "  ");
        assert!(!binding.is_default());
    }
}
