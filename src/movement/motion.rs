//! Applies intents to the tracks
//!
//! Holds the vehicle-side "current intent" slot. A kinematics contract violation
//! is answered with `stop_all` and logged; it never escapes as a fault.

use tracing::{error, info};

use super::actuator::ActuatorPort;
use super::error::KinematicsError;
use super::intent::MovementIntent;
use super::kinematics::{KickstartSettings, MotionKinematics, TrackPowers};

pub struct MotionController {
    kinematics: MotionKinematics,
    port: ActuatorPort,
    current: MovementIntent,
    powers: TrackPowers,
}

impl MotionController {
    pub fn new(port: ActuatorPort, kickstart: KickstartSettings) -> Self {
        Self {
            kinematics: MotionKinematics::new(kickstart),
            port,
            current: MovementIntent::stop(),
            powers: TrackPowers::zero(),
        }
    }

    /// Drives the tracks for `intent` and returns what was actually applied
    ///
    /// The applied intent is STOP whenever `intent` breaks the combination rules.
    pub fn apply(&mut self, intent: &MovementIntent) -> Result<MovementIntent, KinematicsError> {
        match self.kinematics.plan(intent) {
            Ok(plan) => {
                self.port.apply(&plan);
                self.current = *intent;
                self.powers = plan.powers;
                Ok(*intent)
            }
            Err(e) => {
                error!("Rejected intent {}: {}, stopping", intent, e);
                self.emergency_stop();
                Err(e)
            }
        }
    }

    pub fn emergency_stop(&mut self) {
        info!("Stopping all tracks");
        self.port.stop_all();
        self.kinematics.reset();
        self.current = MovementIntent::stop();
        self.powers = TrackPowers::zero();
    }

    pub fn current(&self) -> MovementIntent {
        self.current
    }

    pub fn powers(&self) -> TrackPowers {
        self.powers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::actuator::{ActuatorCall, SimulatedActuator};
    use crate::movement::intent::{CurveRate, Gear, Thrust, Turn, TurnType};
    use crate::movement::kinematics::{TrackDirection, TrackSide};
    use std::time::Duration;

    fn controller() -> (MotionController, std::sync::Arc<std::sync::Mutex<Vec<ActuatorCall>>>) {
        let sim = SimulatedActuator::new();
        let history = sim.history();
        let port = ActuatorPort::new(Box::new(sim), Duration::from_millis(10));
        (MotionController::new(port, KickstartSettings::default()), history)
    }

    #[tokio::test]
    async fn applies_valid_intent() {
        let (mut motion, history) = controller();
        let intent = MovementIntent::curve(Thrust::Forward, Turn::Right, Gear::Gear4, CurveRate::Level1);
        assert_eq!(motion.apply(&intent).unwrap(), intent);
        assert_eq!(motion.current(), intent);
        assert_eq!(motion.powers().left, 100.0);
        assert!((motion.powers().right - 60.0).abs() < 1e-3);

        let calls = history.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                ActuatorCall::SetTrack {
                    side: TrackSide::Left,
                    direction: TrackDirection::Forward,
                    power: 100
                },
                ActuatorCall::SetTrack {
                    side: TrackSide::Right,
                    direction: TrackDirection::Forward,
                    power: 60
                },
            ]
        );
    }

    #[tokio::test]
    async fn contract_violation_commands_stop() {
        let (mut motion, history) = controller();
        motion
            .apply(&MovementIntent::straight(Thrust::Forward, Gear::Gear1))
            .unwrap();

        let bad = MovementIntent {
            thrust: Thrust::Forward,
            turn: Turn::Left,
            turn_type: TurnType::Pivot,
            gear: Gear::Gear1,
            curve_rate: CurveRate::None,
        };
        assert!(motion.apply(&bad).is_err());
        assert!(motion.current().is_stop());
        assert_eq!(history.lock().unwrap().last(), Some(&ActuatorCall::StopAll));
    }
}
