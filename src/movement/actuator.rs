//! Track actuator drivers
//!
//! [`ActuatorDriver`] is the seam between the kinematics and the motor hardware.
//! Two implementations exist: [`SimulatedActuator`] records and logs every command,
//! [`GpioActuator`] drives an H-bridge through `rppal`. [`ActuatorPort`] wraps
//! either one, swallows hardware failures and schedules kickstart settle steps.

use rppal::gpio::{Gpio, OutputPin};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::error::ActuatorError;
use super::kinematics::{DrivePlan, TrackDirection, TrackSide};

/// Motor hardware seen from the kinematics
pub trait ActuatorDriver: Send {
    /// Drives one track; `power` is a duty cycle in percent, 0 stops the track
    fn set_track(
        &mut self,
        side: TrackSide,
        direction: TrackDirection,
        power: u8,
    ) -> Result<(), ActuatorError>;

    fn stop_all(&mut self) -> Result<(), ActuatorError>;

    fn name(&self) -> &'static str;
}

/// Which driver the vehicle uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorKind {
    #[default]
    Simulated,
    Gpio,
}

/// BCM pin numbers of the dual H-bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioPins {
    /// Enable (PWM) pin of motor A, the right track
    pub motor_a_enable: u8,
    /// Enable (PWM) pin of motor B, the left track
    pub motor_b_enable: u8,
    pub motor_a_pin1: u8,
    pub motor_a_pin2: u8,
    pub motor_b_pin1: u8,
    pub motor_b_pin2: u8,
    pub pwm_frequency_hz: f64,
}

impl Default for GpioPins {
    fn default() -> Self {
        Self {
            motor_a_enable: 4,
            motor_b_enable: 17,
            motor_a_pin1: 14,
            motor_a_pin2: 15,
            motor_b_pin1: 27,
            motor_b_pin2: 18,
            pwm_frequency_hz: 1000.0,
        }
    }
}

/// Driver configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorSettings {
    pub kind: ActuatorKind,
    pub pins: GpioPins,
}

/// Builds the driver selected by `settings`
pub fn build_driver(settings: &ActuatorSettings) -> Result<Box<dyn ActuatorDriver>, ActuatorError> {
    match settings.kind {
        ActuatorKind::Simulated => Ok(Box::new(SimulatedActuator::new())),
        ActuatorKind::Gpio => Ok(Box::new(GpioActuator::new(&settings.pins)?)),
    }
}

/// One recorded call on the simulated driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCall {
    SetTrack {
        side: TrackSide,
        direction: TrackDirection,
        power: u8,
    },
    StopAll,
}

/// Driver without hardware; keeps a shared history of calls
#[derive(Debug, Clone, Default)]
pub struct SimulatedActuator {
    history: Arc<Mutex<Vec<ActuatorCall>>>,
}

impl SimulatedActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the recorded calls, still valid after the driver is boxed
    pub fn history(&self) -> Arc<Mutex<Vec<ActuatorCall>>> {
        self.history.clone()
    }

    fn record(&self, call: ActuatorCall) -> Result<(), ActuatorError> {
        let mut history = self
            .history
            .lock()
            .map_err(|e| ActuatorError::General(format!("history lock poisoned: {e}")))?;
        history.push(call);
        Ok(())
    }
}

impl ActuatorDriver for SimulatedActuator {
    fn set_track(
        &mut self,
        side: TrackSide,
        direction: TrackDirection,
        power: u8,
    ) -> Result<(), ActuatorError> {
        debug!("[sim] {:?} track {:?} at {}%", side, direction, power);
        self.record(ActuatorCall::SetTrack {
            side,
            direction,
            power,
        })
    }

    fn stop_all(&mut self) -> Result<(), ActuatorError> {
        debug!("[sim] all tracks stopped");
        self.record(ActuatorCall::StopAll)
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

struct Motor {
    enable: OutputPin,
    pin1: OutputPin,
    pin2: OutputPin,
    /// Motor A is mounted mirrored, so its forward polarity is swapped
    inverted: bool,
}

impl Motor {
    fn drive(
        &mut self,
        direction: TrackDirection,
        power: u8,
        frequency: f64,
    ) -> Result<(), ActuatorError> {
        if power == 0 {
            return self.stop(frequency);
        }

        let forward = (direction == TrackDirection::Forward) != self.inverted;
        if forward {
            self.pin1.set_high();
            self.pin2.set_low();
        } else {
            self.pin1.set_low();
            self.pin2.set_high();
        }
        let duty = f64::from(power.min(100)) / 100.0;
        self.enable.set_pwm_frequency(frequency, duty)?;
        Ok(())
    }

    fn stop(&mut self, frequency: f64) -> Result<(), ActuatorError> {
        self.pin1.set_low();
        self.pin2.set_low();
        self.enable.set_pwm_frequency(frequency, 0.0)?;
        Ok(())
    }
}

/// H-bridge driver on the Raspberry Pi GPIO header
pub struct GpioActuator {
    left: Motor,
    right: Motor,
    frequency: f64,
}

impl GpioActuator {
    pub fn new(pins: &GpioPins) -> Result<Self, ActuatorError> {
        info!("Initializing GPIO actuator with pins {:?}", pins);
        let gpio = Gpio::new()?;
        let output = |pin: u8| -> Result<OutputPin, ActuatorError> {
            Ok(gpio.get(pin)?.into_output_low())
        };

        let right = Motor {
            enable: output(pins.motor_a_enable)?,
            pin1: output(pins.motor_a_pin1)?,
            pin2: output(pins.motor_a_pin2)?,
            inverted: true,
        };
        let left = Motor {
            enable: output(pins.motor_b_enable)?,
            pin1: output(pins.motor_b_pin1)?,
            pin2: output(pins.motor_b_pin2)?,
            inverted: false,
        };

        let mut actuator = Self {
            left,
            right,
            frequency: pins.pwm_frequency_hz,
        };
        actuator.stop_all()?;
        Ok(actuator)
    }

    fn motor(&mut self, side: TrackSide) -> &mut Motor {
        match side {
            TrackSide::Left => &mut self.left,
            TrackSide::Right => &mut self.right,
        }
    }
}

impl ActuatorDriver for GpioActuator {
    fn set_track(
        &mut self,
        side: TrackSide,
        direction: TrackDirection,
        power: u8,
    ) -> Result<(), ActuatorError> {
        let frequency = self.frequency;
        self.motor(side).drive(direction, power, frequency)
    }

    fn stop_all(&mut self) -> Result<(), ActuatorError> {
        let frequency = self.frequency;
        self.left.stop(frequency)?;
        self.right.stop(frequency)
    }

    fn name(&self) -> &'static str {
        "gpio"
    }
}

impl Drop for GpioActuator {
    fn drop(&mut self) {
        if let Err(e) = self.stop_all() {
            error!("Failed to stop motors on shutdown: {}", e);
        }
    }
}

/// Shared, failure-tolerant access to a driver
///
/// Every write bumps the track's generation counter; a pending kickstart settle
/// only fires while its generation is still current.
#[derive(Clone)]
pub struct ActuatorPort {
    driver: Arc<Mutex<Box<dyn ActuatorDriver>>>,
    generations: Arc<[AtomicU64; 2]>,
    kickstart_duration: Duration,
}

impl ActuatorPort {
    pub fn new(driver: Box<dyn ActuatorDriver>, kickstart_duration: Duration) -> Self {
        info!("Actuator port using '{}' driver", driver.name());
        Self {
            driver: Arc::new(Mutex::new(driver)),
            generations: Arc::new([AtomicU64::new(0), AtomicU64::new(0)]),
            kickstart_duration,
        }
    }

    /// Commands both tracks of `plan`, never blocking on a kickstart
    pub fn apply(&self, plan: &DrivePlan) {
        for command in plan.commands {
            let generation = self.bump(command.side);
            let Some(duty) = command.kickstart else {
                self.set_track(command.side, command.direction, command.power);
                continue;
            };

            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                warn!("No async runtime for kickstart, commanding target power directly");
                self.set_track(command.side, command.direction, command.power);
                continue;
            };

            debug!(
                "Kickstart {:?} track at {}% for {:?}",
                command.side, duty, self.kickstart_duration
            );
            self.set_track(command.side, command.direction, duty);

            let port = self.clone();
            runtime.spawn(async move {
                tokio::time::sleep(port.kickstart_duration).await;
                if port.generation(command.side) == generation {
                    port.set_track(command.side, command.direction, command.power);
                } else {
                    debug!("Kickstart settle on {:?} superseded", command.side);
                }
            });
        }
    }

    /// Stops both tracks and cancels any pending settle
    pub fn stop_all(&self) {
        self.bump(TrackSide::Left);
        self.bump(TrackSide::Right);
        match self.driver.lock() {
            Ok(mut driver) => {
                if let Err(e) = driver.stop_all() {
                    error!("Actuator stop_all failed: {}", e);
                }
            }
            Err(e) => error!("Actuator lock poisoned: {}", e),
        }
    }

    fn set_track(&self, side: TrackSide, direction: TrackDirection, power: u8) {
        match self.driver.lock() {
            Ok(mut driver) => {
                if let Err(e) = driver.set_track(side, direction, power) {
                    error!("Actuator set_track({:?}) failed: {}", side, e);
                }
            }
            Err(e) => error!("Actuator lock poisoned: {}", e),
        }
    }

    fn bump(&self, side: TrackSide) -> u64 {
        self.generations[side.index()].fetch_add(1, Ordering::SeqCst) + 1
    }

    fn generation(&self, side: TrackSide) -> u64 {
        self.generations[side.index()].load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::intent::{CurveRate, Gear, MovementIntent, Thrust, Turn};
    use crate::movement::kinematics::{KickstartSettings, MotionKinematics};

    struct FailingActuator;

    impl ActuatorDriver for FailingActuator {
        fn set_track(&mut self, _: TrackSide, _: TrackDirection, _: u8) -> Result<(), ActuatorError> {
            Err(ActuatorError::General("bridge fault".to_string()))
        }

        fn stop_all(&mut self) -> Result<(), ActuatorError> {
            Err(ActuatorError::General("bridge fault".to_string()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    fn low_speed_setup() -> (MotionKinematics, ActuatorPort, Arc<Mutex<Vec<ActuatorCall>>>) {
        let settings = KickstartSettings {
            threshold: 40,
            duty: 50,
            duration_ms: 30,
        };
        let sim = SimulatedActuator::new();
        let history = sim.history();
        let port = ActuatorPort::new(Box::new(sim), settings.duration());
        (MotionKinematics::new(settings), port, history)
    }

    fn calls(history: &Arc<Mutex<Vec<ActuatorCall>>>) -> Vec<ActuatorCall> {
        history.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn kickstart_settles_to_target() {
        let (mut kinematics, port, history) = low_speed_setup();
        let curve = MovementIntent::curve(Thrust::Forward, Turn::Left, Gear::Gear1, CurveRate::Level2);
        port.apply(&kinematics.plan(&curve).unwrap());

        let immediate = calls(&history);
        assert_eq!(
            immediate[0],
            ActuatorCall::SetTrack {
                side: TrackSide::Left,
                direction: TrackDirection::Forward,
                power: 50
            }
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        let settled = calls(&history);
        assert_eq!(
            settled.last(),
            Some(&ActuatorCall::SetTrack {
                side: TrackSide::Left,
                direction: TrackDirection::Forward,
                power: 28
            })
        );
    }

    #[tokio::test]
    async fn newer_command_supersedes_pending_settle() {
        let (mut kinematics, port, history) = low_speed_setup();
        let curve = MovementIntent::curve(Thrust::Forward, Turn::Left, Gear::Gear1, CurveRate::Level2);
        port.apply(&kinematics.plan(&curve).unwrap());

        kinematics.reset();
        port.stop_all();
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(calls(&history).last(), Some(&ActuatorCall::StopAll));
    }

    #[tokio::test]
    async fn hardware_failures_are_swallowed() {
        let port = ActuatorPort::new(Box::new(FailingActuator), Duration::from_millis(10));
        let mut kinematics = MotionKinematics::default();
        let plan = kinematics
            .plan(&MovementIntent::straight(Thrust::Forward, Gear::Gear2))
            .unwrap();
        port.apply(&plan);
        port.stop_all();
    }

    #[test]
    fn apply_without_runtime_skips_kickstart() {
        let (mut kinematics, port, history) = low_speed_setup();
        let pivot = MovementIntent::in_place(Turn::Right, true, Gear::Gear1);
        let mut plan = kinematics.plan(&pivot).unwrap();
        plan.commands[0].kickstart = Some(50);
        port.apply(&plan);

        assert_eq!(
            calls(&history)[0],
            ActuatorCall::SetTrack {
                side: TrackSide::Left,
                direction: TrackDirection::Forward,
                power: 70
            }
        );
    }

    #[test]
    fn default_pins_match_wiring() {
        let pins = GpioPins::default();
        assert_eq!(pins.motor_a_enable, 4);
        assert_eq!(pins.motor_b_enable, 17);
        assert_eq!((pins.motor_b_pin1, pins.motor_b_pin2), (27, 18));
    }
}
