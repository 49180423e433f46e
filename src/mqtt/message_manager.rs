use chrono::{DateTime, Local};
use std::fmt;

/// A message received from or sent to the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    pub topic: String,
    pub content: String,
    pub timestamp: DateTime<Local>,
}

impl fmt::Display for MqttMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let preview: String = self.content.chars().take(40).collect();
        write!(
            f,
            "{} {} - {}",
            self.timestamp.format("%H:%M:%S.%3f"),
            self.topic,
            preview
        )
    }
}

impl MqttMessage {
    pub fn from_topic(topic: impl Into<String>, content: impl Into<String>) -> Self {
        MqttMessage {
            topic: topic.into(),
            content: content.into(),
            timestamp: Local::now(),
        }
    }

    /// Builds a message from a raw publish payload, replacing invalid UTF-8
    pub fn from_payload(topic: impl Into<String>, payload: &[u8]) -> Self {
        Self::from_topic(topic, String::from_utf8_lossy(payload).into_owned())
    }
}
