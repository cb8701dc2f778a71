use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MQTTMessage {
    pub topic: String,
    pub content: String,
    pub timestamp: DateTime<Local>,
}

impl fmt::Display for MQTTMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let preview: String = self.content.chars().take(32).collect();
        write!(f, "{} - {}: {}", self.timestamp.format("%H:%M:%S"), self.topic, preview)
    }
}

impl MQTTMessage {
    pub fn from_topic(topic: String, content: String) -> Self {
        MQTTMessage {
            topic,
            content,
            timestamp: Local::now(),
        }
    }

    /// Builds a message from a raw publish payload, replacing invalid UTF-8.
    pub fn from_payload(topic: &str, payload: &[u8]) -> Self {
        Self::from_topic(
            topic.to_string(),
            String::from_utf8_lossy(payload).into_owned(),
        )
    }
}

/// What the broker task hands over to a bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    Connected,
    Message(MQTTMessage),
    Disconnected(String),
}
