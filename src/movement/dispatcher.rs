//! Movement dispatcher
//!
//! Operator side: publishes an intent only when it differs from the last one that
//! made it onto the link, and remembers the state the vehicle acknowledged.
//! Vehicle side: republishes the applied intent as the acknowledged state.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::intent::MovementIntent;
use super::wire;
use crate::mqtt::config::Topics;
use crate::mqtt::mqtt_handler::Publisher;

pub const SHOOT_PAYLOAD: &str = "shoot";

pub struct MovementDispatcher {
    publisher: Arc<dyn Publisher>,
    topics: Topics,
    last_published: Option<MovementIntent>,
    /// Changed intent whose publish failed; retried by [`MovementDispatcher::flush`]
    pending: Option<MovementIntent>,
    acknowledged: Option<MovementIntent>,
    published_count: u64,
}

impl MovementDispatcher {
    pub fn new(publisher: Arc<dyn Publisher>, topics: Topics) -> Self {
        Self {
            publisher,
            topics,
            last_published: None,
            pending: None,
            acknowledged: None,
            published_count: 0,
        }
    }

    /// Publishes `intent` if it changed; returns whether it went out
    pub fn dispatch(&mut self, intent: MovementIntent) -> bool {
        if self.last_published == Some(intent) {
            self.pending = None;
            debug!("Intent unchanged, not publishing: {}", intent);
            return false;
        }
        self.send(intent)
    }

    /// Retries a changed intent that could not be queued earlier
    pub fn flush(&mut self) -> bool {
        match self.pending.take() {
            Some(intent) => self.send(intent),
            None => false,
        }
    }

    pub fn shoot(&self) -> bool {
        match self.publisher.publish(&self.topics.shoot_command, SHOOT_PAYLOAD) {
            Ok(()) => {
                info!("Shoot command sent");
                true
            }
            Err(e) => {
                warn!("Shoot command dropped: {}", e);
                false
            }
        }
    }

    /// Records the vehicle's acknowledged state from state-topic text
    pub fn on_state_message(&mut self, text: &str) -> MovementIntent {
        let decoded = wire::decode(text);
        if decoded.intent != self.last_published.unwrap_or_default() {
            debug!("Acknowledged state differs from last published intent: {}", decoded.intent);
        }
        self.acknowledged = Some(decoded.intent);
        decoded.intent
    }

    /// Vehicle side: reports the applied intent on the state topic
    pub fn republish_state(&self, applied: &MovementIntent) -> bool {
        match self
            .publisher
            .publish(&self.topics.movement_state, &wire::encode(applied))
        {
            Ok(()) => true,
            Err(e) => {
                warn!("State republish dropped: {}", e);
                false
            }
        }
    }

    pub fn last_published(&self) -> Option<MovementIntent> {
        self.last_published
    }

    pub fn acknowledged(&self) -> Option<MovementIntent> {
        self.acknowledged
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn published_count(&self) -> u64 {
        self.published_count
    }

    fn send(&mut self, intent: MovementIntent) -> bool {
        let payload = wire::encode(&intent);
        match self
            .publisher
            .publish(&self.topics.movement_command, &payload)
        {
            Ok(()) => {
                info!("Published intent {}", payload);
                self.last_published = Some(intent);
                self.pending = None;
                self.published_count += 1;
                true
            }
            Err(e) => {
                warn!("Intent publish failed, will retry: {}", e);
                self.pending = Some(intent);
                false
            }
        }
    }
}
