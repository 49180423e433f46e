//! Peer link health
//!
//! Staleness is a status flag only; nothing here touches the kinematics or the
//! feedback scheduler.

use chrono::{DateTime, Local};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::mqtt_handler::LinkError;

#[derive(Debug)]
struct LinkState {
    last_seen: Option<Instant>,
    last_seen_at: Option<DateTime<Local>>,
    started: Instant,
    reported_stale: bool,
}

/// Records the last time the peer was heard from
#[derive(Debug, Clone)]
pub struct LinkMonitor {
    timeout: Duration,
    state: Arc<Mutex<LinkState>>,
}

impl LinkMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            state: Arc::new(Mutex::new(LinkState {
                last_seen: None,
                last_seen_at: None,
                started: Instant::now(),
                reported_stale: false,
            })),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Marks the peer as alive now
    pub fn touch(&self) {
        if let Ok(mut state) = self.state.lock() {
            if state.reported_stale {
                info!("Peer link recovered");
                state.reported_stale = false;
            }
            state.last_seen = Some(Instant::now());
            state.last_seen_at = Some(Local::now());
        }
    }

    /// Time since the last message, or since creation if none arrived yet
    pub fn silence(&self) -> Duration {
        match self.state.lock() {
            Ok(state) => state.last_seen.unwrap_or(state.started).elapsed(),
            Err(_) => Duration::MAX,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.silence() > self.timeout
    }

    pub fn last_seen_at(&self) -> Option<DateTime<Local>> {
        self.state.lock().ok().and_then(|state| state.last_seen_at)
    }

    /// Returns the staleness as an error value, logging the first transition only
    pub fn check(&self) -> Result<(), LinkError> {
        let silence = self.silence();
        if silence <= self.timeout {
            return Ok(());
        }
        if let Ok(mut state) = self.state.lock() {
            if !state.reported_stale {
                warn!("No message from peer for {:?}", silence);
                state.reported_stale = true;
            }
        }
        Err(LinkError::Stale(silence))
    }
}
