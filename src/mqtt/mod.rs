//! # MQTT link
//!
//! Carries movement intents, acknowledged states, game events and shoot actions
//! between the operator station and the vehicle.
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker settings and topic names
//! ├── message_manager.rs  - Timestamped message representation
//! ├── mqtt_handler.rs     - rumqttc event loop and the Publisher seam
//! └── link_monitor.rs     - Peer staleness flag
//! ```
//!
//! Publishing is fire-and-forget: [`mqtt_handler::Publisher::publish`] only queues
//! the request. Retries and reconnects belong to the rumqttc event loop.

pub mod config;
pub mod link_monitor;
pub mod message_manager;
pub mod mqtt_handler;
