//! Differential-drive kinematics for the tracked base
//!
//! Converts a [`MovementIntent`] into signed per-track power levels and from those
//! into actuator commands, including the low-speed kickstart compensation.
//!
//! | thrust  | turn  | turn_type | left            | right           |
//! |---------|-------|-----------|-----------------|-----------------|
//! | FWD/BWD | NONE  | NONE      | speed           | speed           |
//! | FWD/BWD | LEFT  | CURVE     | speed·(1−rate)  | speed           |
//! | FWD/BWD | RIGHT | CURVE     | speed           | speed·(1−rate)  |
//! | NONE    | LEFT  | SPIN      | −speed          | +speed          |
//! | NONE    | RIGHT | SPIN      | +speed          | −speed          |
//! | NONE    | LEFT  | PIVOT     | 0               | +speed          |
//! | NONE    | RIGHT | PIVOT     | +speed          | 0               |
//! | NONE    | NONE  | NONE      | 0               | 0               |

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::error::KinematicsError;
use super::intent::{MovementIntent, Thrust, Turn, TurnType};

/// Upper bound of a track's power magnitude
pub const MAX_POWER: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackSide {
    Left,
    Right,
}

impl TrackSide {
    pub fn index(self) -> usize {
        match self {
            TrackSide::Left => 0,
            TrackSide::Right => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackDirection {
    Forward,
    Backward,
}

/// Signed power per track in `[-MAX_POWER, MAX_POWER]`, negative meaning backward
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackPowers {
    pub left: f32,
    pub right: f32,
}

impl TrackPowers {
    pub fn new(left: f32, right: f32) -> Self {
        Self {
            left: left.clamp(-MAX_POWER, MAX_POWER),
            right: right.clamp(-MAX_POWER, MAX_POWER),
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn get(&self, side: TrackSide) -> f32 {
        match side {
            TrackSide::Left => self.left,
            TrackSide::Right => self.right,
        }
    }
}

/// Computes the signed track powers for an intent
///
/// Returns an error for intents that break the combination rules; the caller is
/// expected to command STOP in that case.
pub fn drive(intent: &MovementIntent) -> Result<TrackPowers, KinematicsError> {
    intent.validate()?;

    let speed = intent.gear.speed() as f32;
    let sign = match intent.thrust {
        Thrust::Forward => 1.0,
        Thrust::Backward => -1.0,
        Thrust::None => 0.0,
    };

    let powers = match (intent.thrust, intent.turn, intent.turn_type) {
        (Thrust::None, Turn::None, _) => TrackPowers::zero(),
        (_, Turn::None, _) => TrackPowers::new(sign * speed, sign * speed),
        (_, turn, TurnType::Curve) => {
            let inner = sign * speed * (1.0 - intent.curve_rate.value());
            let outer = sign * speed;
            match turn {
                Turn::Left => TrackPowers::new(inner, outer),
                _ => TrackPowers::new(outer, inner),
            }
        }
        (_, Turn::Left, TurnType::Spin) => TrackPowers::new(-speed, speed),
        (_, Turn::Right, TurnType::Spin) => TrackPowers::new(speed, -speed),
        (_, Turn::Left, TurnType::Pivot) => TrackPowers::new(0.0, speed),
        (_, Turn::Right, TurnType::Pivot) => TrackPowers::new(speed, 0.0),
        // validate() rules out every remaining combination
        _ => TrackPowers::zero(),
    };

    Ok(powers)
}

/// Low-speed compensation applied on a track's 0 → non-zero transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KickstartSettings {
    /// Target magnitudes below this value (and above zero) get a kickstart
    pub threshold: u8,
    /// Breakaway duty cycle commanded during the kickstart
    pub duty: u8,
    /// How long the breakaway duty is held before settling
    pub duration_ms: u64,
}

impl Default for KickstartSettings {
    fn default() -> Self {
        Self {
            threshold: 20,
            duty: 50,
            duration_ms: 100,
        }
    }
}

impl KickstartSettings {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// One actuator command for one track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackCommand {
    pub side: TrackSide,
    pub direction: TrackDirection,
    /// Target power, 0..=100
    pub power: u8,
    /// Breakaway duty to hold before settling to `power`
    pub kickstart: Option<u8>,
}

/// Everything needed to actuate one intent
#[derive(Debug, Clone, PartialEq)]
pub struct DrivePlan {
    pub intent: MovementIntent,
    pub powers: TrackPowers,
    pub commands: [TrackCommand; 2],
}

impl DrivePlan {
    pub fn needs_kickstart(&self) -> bool {
        self.commands.iter().any(|c| c.kickstart.is_some())
    }
}

/// Stateful kinematics: remembers the last commanded magnitude per track so that
/// kickstarts fire only when a track starts from standstill
#[derive(Debug, Clone)]
pub struct MotionKinematics {
    kickstart: KickstartSettings,
    last_power: [u8; 2],
}

impl MotionKinematics {
    pub fn new(kickstart: KickstartSettings) -> Self {
        Self {
            kickstart,
            last_power: [0, 0],
        }
    }

    pub fn kickstart_settings(&self) -> &KickstartSettings {
        &self.kickstart
    }

    /// Plans the actuation of `intent`
    ///
    /// On error the remembered track state is reset, matching the STOP the caller
    /// must command.
    pub fn plan(&mut self, intent: &MovementIntent) -> Result<DrivePlan, KinematicsError> {
        let powers = match drive(intent) {
            Ok(powers) => powers,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };

        let commands = [
            self.track_command(TrackSide::Left, powers.left),
            self.track_command(TrackSide::Right, powers.right),
        ];

        for command in &commands {
            self.last_power[command.side.index()] = command.power;
        }

        debug!(
            "Planned {}: left={:.1} right={:.1}",
            intent, powers.left, powers.right
        );

        Ok(DrivePlan {
            intent: *intent,
            powers,
            commands,
        })
    }

    /// Forgets track history, e.g. after an emergency stop
    pub fn reset(&mut self) {
        self.last_power = [0, 0];
    }

    fn track_command(&self, side: TrackSide, signed_power: f32) -> TrackCommand {
        let direction = if signed_power < 0.0 {
            TrackDirection::Backward
        } else {
            TrackDirection::Forward
        };
        let power = signed_power.abs().round().min(MAX_POWER) as u8;
        let from_standstill = self.last_power[side.index()] == 0;
        let kickstart = (from_standstill && power > 0 && power < self.kickstart.threshold)
            .then_some(self.kickstart.duty);

        TrackCommand {
            side,
            direction,
            power,
            kickstart,
        }
    }
}

impl Default for MotionKinematics {
    fn default() -> Self {
        Self::new(KickstartSettings::default())
    }
}
