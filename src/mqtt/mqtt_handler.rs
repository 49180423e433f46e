use std::time::Duration;

use chrono::{DateTime, Local};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::MqttConfig;
use super::message_manager::MqttMessage;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_ERROR_MESSAGES: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Failed to queue publish on '{topic}': {reason}")]
    PublishFailed { topic: String, reason: String },

    #[error("Failed to subscribe to '{topic}': {reason}")]
    SubscribeFailed { topic: String, reason: String },

    #[error("Peer link stale, last message {0:?} ago")]
    Stale(Duration),
}

/// Fire-and-forget publishing; implementations must not wait for the broker
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), LinkError>;
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct MqttStatus {
    pub connection_state: ConnectionState,
    pub error_messages: Vec<String>,
    pub messages_received: usize,
    pub messages_sent: usize,
    pub last_activity: Option<DateTime<Local>>,
}

impl MqttStatus {
    fn push_error(&mut self, message: String) {
        if self.error_messages.len() >= MAX_ERROR_MESSAGES {
            self.error_messages.remove(0);
        }
        self.error_messages.push(message);
    }
}

/// Publishing side of the broker connection
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl Publisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), LinkError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .map_err(|e| LinkError::PublishFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Drives the rumqttc event loop and forwards incoming publishes
pub struct MqttHandler {
    client: AsyncClient,
    eventloop: EventLoop,
    subscriptions: Vec<String>,
    inbound: mpsc::Sender<MqttMessage>,
    status: watch::Sender<MqttStatus>,
}

impl MqttHandler {
    pub fn new(
        config: &MqttConfig,
        role: &str,
        subscriptions: Vec<String>,
        inbound: mpsc::Sender<MqttMessage>,
    ) -> (Self, MqttPublisher, watch::Receiver<MqttStatus>) {
        let client_id = format!("{}-{}", config.client_id, role);
        info!(
            "Creating MQTT client '{}' for {}:{}",
            client_id, config.host, config.port
        );

        let mut mqtt_options = MqttOptions::new(client_id, config.host.clone(), config.port);
        mqtt_options.set_keep_alive(config.keep_alive());
        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            mqtt_options.set_credentials(user.clone(), password.clone());
        }

        let (client, eventloop) = AsyncClient::new(mqtt_options, config.queue_capacity.max(1));
        let (status_tx, status_rx) = watch::channel(MqttStatus {
            connection_state: ConnectionState::Connecting,
            ..MqttStatus::default()
        });

        let publisher = MqttPublisher {
            client: client.clone(),
        };

        (
            MqttHandler {
                client,
                eventloop,
                subscriptions,
                inbound,
                status: status_tx,
            },
            publisher,
            status_rx,
        )
    }

    /// Polls the connection until `token` is cancelled
    ///
    /// Connection errors are logged and retried; rumqttc reconnects on the next poll.
    pub async fn run(mut self, token: CancellationToken) {
        info!("Starting MQTT event loop");

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("MQTT handler shutting down");
                    if let Err(e) = self.client.try_disconnect() {
                        debug!("Disconnect request not queued: {}", e);
                    }
                    break;
                }

                event = self.eventloop.poll() => {
                    match event {
                        Ok(event) => self.handle_event(event),
                        Err(e) => {
                            error!("MQTT connection error: {}", e);
                            self.status.send_modify(|status| {
                                status.connection_state = ConnectionState::Reconnecting;
                                status.push_error(e.to_string());
                            });

                            tokio::select! {
                                _ = token.cancelled() => break,
                                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                            }
                        }
                    }
                }
            }
        }

        self.status
            .send_modify(|status| status.connection_state = ConnectionState::Disconnected);
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                info!("Connected to broker: {:?}", ack.code);
                self.status
                    .send_modify(|status| status.connection_state = ConnectionState::Connected);
                self.subscribe_all();
            }
            Event::Incoming(Packet::Publish(publish)) => {
                let message = MqttMessage::from_payload(publish.topic.clone(), &publish.payload);
                debug!("Received {}", message);
                self.status.send_modify(|status| {
                    status.messages_received += 1;
                    status.last_activity = Some(message.timestamp);
                });
                if let Err(e) = self.inbound.try_send(message) {
                    warn!("Dropping incoming message on '{}': {}", publish.topic, e);
                }
            }
            Event::Outgoing(Outgoing::Publish(_)) => {
                self.status.send_modify(|status| {
                    status.messages_sent += 1;
                    status.last_activity = Some(Local::now());
                });
            }
            Event::Incoming(Packet::Disconnect) => {
                warn!("Broker closed the connection");
                self.status
                    .send_modify(|status| status.connection_state = ConnectionState::Reconnecting);
            }
            other => debug!("MQTT event: {:?}", other),
        }
    }

    fn subscribe_all(&mut self) {
        for topic in &self.subscriptions {
            match self.client.try_subscribe(topic.clone(), QoS::AtMostOnce) {
                Ok(_) => info!("Subscribed to '{}'", topic),
                Err(e) => {
                    let err = LinkError::SubscribeFailed {
                        topic: topic.clone(),
                        reason: e.to_string(),
                    };
                    error!("{}", err);
                    self.status.send_modify(|status| status.push_error(err.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_history_is_bounded() {
        let mut status = MqttStatus::default();
        for i in 0..(MAX_ERROR_MESSAGES + 5) {
            status.push_error(format!("e{i}"));
        }
        assert_eq!(status.error_messages.len(), MAX_ERROR_MESSAGES);
        assert_eq!(status.error_messages[0], "e5");
    }

    #[tokio::test]
    async fn publisher_queues_without_broker() {
        let (tx, _rx) = mpsc::channel(4);
        let config = MqttConfig::default();
        let (_handler, publisher, status) = MqttHandler::new(&config, "test", vec![], tx);
        assert_eq!(status.borrow().connection_state, ConnectionState::Connecting);
        assert!(publisher.publish("rasptank/movement/command", "none;none;none;0;0.00").is_ok());
    }
}
