//! Status snapshots for display and telemetry consumers
//!
//! Each runtime publishes its latest snapshot on a `watch` channel; querying the
//! status is a `borrow()` on the receiver.

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::feedback::scheduler::SchedulerStatus;
use crate::movement::intent::{Gear, MovementIntent};
use crate::movement::kinematics::TrackPowers;
use crate::mqtt::link_monitor::LinkMonitor;
use crate::mqtt::mqtt_handler::ConnectionState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkHealth {
    pub connection: ConnectionState,
    pub stale: bool,
    pub last_peer_message: Option<DateTime<Local>>,
}

impl LinkHealth {
    pub fn observe(monitor: &LinkMonitor, connection: ConnectionState) -> Self {
        Self {
            connection,
            stale: monitor.is_stale(),
            last_peer_message: monitor.last_seen_at(),
        }
    }
}

impl Default for LinkHealth {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            stale: true,
            last_peer_message: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatorStatus {
    /// Intent the translator currently resolves to
    pub intent: MovementIntent,
    pub last_published: Option<MovementIntent>,
    pub acknowledged: Option<MovementIntent>,
    pub gear: Gear,
    pub pivot_mode: bool,
    pub feedback: SchedulerStatus,
    pub link: LinkHealth,
    pub updated_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleStatus {
    pub applied: MovementIntent,
    pub powers: TrackPowers,
    pub commands_received: u64,
    pub rejected: u64,
    pub link: LinkHealth,
    pub updated_at: DateTime<Local>,
}

impl Default for VehicleStatus {
    fn default() -> Self {
        Self {
            applied: MovementIntent::stop(),
            powers: TrackPowers::zero(),
            commands_received: 0,
            rejected: 0,
            link: LinkHealth::default(),
            updated_at: Local::now(),
        }
    }
}
