use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Topic names shared by operator and vehicle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Topics {
    pub movement_command: String,
    pub movement_state: String,
    pub game_event: String,
    pub shoot_command: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            movement_command: "rasptank/movement/command".to_string(),
            movement_state: "rasptank/movement/state".to_string(),
            game_event: "rasptank/game/event".to_string(),
            shoot_command: "rasptank/shoot/command".to_string(),
        }
    }
}

/// What an incoming topic is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    MovementCommand,
    MovementState,
    GameEvent,
    ShootCommand,
}

impl Topics {
    pub fn classify(&self, topic: &str) -> Option<TopicKind> {
        if topic == self.movement_command {
            Some(TopicKind::MovementCommand)
        } else if topic == self.movement_state {
            Some(TopicKind::MovementState)
        } else if topic == self.game_event {
            Some(TopicKind::GameEvent)
        } else if topic == self.shoot_command {
            Some(TopicKind::ShootCommand)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    /// Prefix of the client id; the role name is appended
    pub client_id: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    /// Capacity of the outgoing request queue
    pub queue_capacity: usize,
    /// Silence after which the peer link is considered stale
    pub link_timeout_secs: f64,
    pub topics: Topics,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "rasptank".to_string(),
            user: None,
            password: None,
            keep_alive_secs: 5,
            queue_capacity: 100,
            link_timeout_secs: 6.0,
            topics: Topics::default(),
        }
    }
}

impl MqttConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }

    pub fn link_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.link_timeout_secs.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_topics() {
        let topics = Topics::default();
        assert_eq!(
            topics.classify("rasptank/movement/command"),
            Some(TopicKind::MovementCommand)
        );
        assert_eq!(topics.classify("rasptank/game/event"), Some(TopicKind::GameEvent));
        assert_eq!(topics.classify("rasptank/unknown"), None);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: MqttConfig = toml::from_str("host = \"broker.local\"\n[topics]\ngame_event = \"g\"").unwrap();
        assert_eq!(config.host, "broker.local");
        assert_eq!(config.port, 1883);
        assert_eq!(config.topics.game_event, "g");
        assert_eq!(config.topics.movement_command, "rasptank/movement/command");
        assert_eq!(config.link_timeout(), Duration::from_secs(6));
    }
}
