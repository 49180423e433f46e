//! Input translator
//!
//! Pure state machine turning operator input samples into movement intents and
//! operator events. Three sources feed it: the left stick (x turns, y thrusts at
//! the stepped gear), the triggers (R2 forward, L2 backward, gear proportional to
//! magnitude) and the D-pad. An active D-pad direction overrides the analog
//! sources; triggers override the stick's y axis.
//!
//! The translator emits an intent only when the resolved intent changes, so STOP
//! goes out exactly once per transition into the neutral state.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::movement::intent::{CurveRate, Gear, MovementIntent, Thrust, Turn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorSettings {
    /// Stick magnitudes below this are treated as zero on that axis
    pub dead_zone: f32,
    /// Stick x beyond this selects a turn direction
    pub turn_threshold: f32,
    /// Stick y beyond this selects a thrust direction
    pub thrust_threshold: f32,
    /// Trigger magnitude beyond this engages thrust
    pub trigger_threshold: f32,
    /// Drive gear index the operator starts in
    pub initial_gear_index: usize,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self {
            dead_zone: 0.15,
            turn_threshold: 0.3,
            thrust_threshold: 0.5,
            trigger_threshold: 0.5,
            initial_gear_index: Gear::DRIVE.len() / 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerSide {
    /// L2, backward thrust
    Left,
    /// R2, forward thrust
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DPadDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Discrete operator actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlButton {
    GearUp,
    GearDown,
    Shoot,
    TogglePivot,
}

/// One input sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlInput {
    /// Left stick, both axes in -1.0..=1.0, y positive forward
    Joystick { x: f32, y: f32 },
    Trigger { side: TriggerSide, value: f32 },
    Button { button: ControlButton, pressed: bool },
    DPad { direction: DPadDirection, pressed: bool },
}

/// Output of the translator, consumed by a single dispatcher
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TranslatorEvent {
    Intent(MovementIntent),
    GearChanged { gear: Gear, index: usize },
    GearOutOfBound { gear: Gear },
    PivotModeChanged { pivot: bool },
    Shoot,
}

#[derive(Debug, Clone)]
pub struct InputTranslator {
    settings: TranslatorSettings,
    gear_index: usize,
    pivot_mode: bool,
    stick_x: f32,
    stick_y: f32,
    left_trigger: f32,
    right_trigger: f32,
    /// Held D-pad directions in press order; the last one contributes
    dpad: Vec<DPadDirection>,
    current: Option<MovementIntent>,
}

impl InputTranslator {
    pub fn new(settings: TranslatorSettings) -> Self {
        let gear_index = settings.initial_gear_index.min(Gear::DRIVE.len() - 1);
        debug!("Creating input translator with settings: {:?}", settings);
        Self {
            settings,
            gear_index,
            pivot_mode: false,
            stick_x: 0.0,
            stick_y: 0.0,
            left_trigger: 0.0,
            right_trigger: 0.0,
            dpad: Vec::new(),
            current: None,
        }
    }

    pub fn gear(&self) -> Gear {
        // gear_index is kept within DRIVE by step_gear
        Gear::from_drive_index(self.gear_index).unwrap_or(Gear::Gear1)
    }

    pub fn gear_index(&self) -> usize {
        self.gear_index
    }

    pub fn pivot_mode(&self) -> bool {
        self.pivot_mode
    }

    /// Last emitted intent, STOP before the first emission
    pub fn current_intent(&self) -> MovementIntent {
        self.current.unwrap_or_default()
    }

    pub fn handle(&mut self, input: ControlInput) -> Vec<TranslatorEvent> {
        let mut events = Vec::new();

        match input {
            ControlInput::Joystick { x, y } => {
                self.stick_x = apply_dead_zone(x, self.settings.dead_zone);
                self.stick_y = apply_dead_zone(y, self.settings.dead_zone);
            }
            ControlInput::Trigger { side, value } => {
                let value = value.clamp(0.0, 1.0);
                match side {
                    TriggerSide::Left => self.left_trigger = value,
                    TriggerSide::Right => self.right_trigger = value,
                }
            }
            ControlInput::Button {
                button,
                pressed: true,
            } => match button {
                ControlButton::GearUp => events.push(self.step_gear(1)),
                ControlButton::GearDown => events.push(self.step_gear(-1)),
                ControlButton::Shoot => events.push(TranslatorEvent::Shoot),
                ControlButton::TogglePivot => {
                    self.pivot_mode = !self.pivot_mode;
                    info!("Pivot mode {}", if self.pivot_mode { "on" } else { "off" });
                    events.push(TranslatorEvent::PivotModeChanged {
                        pivot: self.pivot_mode,
                    });
                }
            },
            ControlInput::Button { pressed: false, .. } => {}
            ControlInput::DPad {
                direction,
                pressed: true,
            } => {
                self.dpad.retain(|d| *d != direction);
                self.dpad.push(direction);
            }
            ControlInput::DPad {
                direction,
                pressed: false,
            } => {
                self.dpad.retain(|d| *d != direction);
            }
        }

        let resolved = self.resolve();
        if self.current != Some(resolved) {
            debug!("Intent changed: {}", resolved);
            self.current = Some(resolved);
            events.push(TranslatorEvent::Intent(resolved));
        }

        events
    }

    fn step_gear(&mut self, delta: isize) -> TranslatorEvent {
        let target = self.gear_index as isize + delta;
        if target < 0 || target >= Gear::DRIVE.len() as isize {
            info!("Gear {:?} already at the end of the range", self.gear());
            return TranslatorEvent::GearOutOfBound { gear: self.gear() };
        }
        self.gear_index = target as usize;
        info!("Gear changed to {:?}", self.gear());
        TranslatorEvent::GearChanged {
            gear: self.gear(),
            index: self.gear_index,
        }
    }

    fn resolve(&self) -> MovementIntent {
        if let Some(direction) = self.dpad.last() {
            return self.dpad_intent(*direction);
        }
        self.analog_intent()
    }

    fn dpad_intent(&self, direction: DPadDirection) -> MovementIntent {
        let gear = self.gear();
        match direction {
            DPadDirection::Up => MovementIntent::straight(Thrust::Forward, gear),
            DPadDirection::Down => MovementIntent::straight(Thrust::Backward, gear),
            DPadDirection::Left => MovementIntent::in_place(Turn::Left, self.pivot_mode, gear),
            DPadDirection::Right => MovementIntent::in_place(Turn::Right, self.pivot_mode, gear),
        }
    }

    fn analog_intent(&self) -> MovementIntent {
        let turn = if self.stick_x.abs() > self.settings.turn_threshold {
            if self.stick_x < 0.0 {
                Turn::Left
            } else {
                Turn::Right
            }
        } else {
            Turn::None
        };

        let (thrust, gear) = self.analog_thrust();

        match (thrust, turn) {
            (Thrust::None, Turn::None) => MovementIntent::stop(),
            (thrust, Turn::None) => MovementIntent::straight(thrust, gear),
            (Thrust::None, turn) => MovementIntent::in_place(turn, self.pivot_mode, self.gear()),
            (thrust, turn) => {
                MovementIntent::curve(thrust, turn, gear, CurveRate::nearest(self.stick_x.abs()))
            }
        }
    }

    /// Thrust and gear from the triggers, falling back to the stick's y axis
    fn analog_thrust(&self) -> (Thrust, Gear) {
        let threshold = self.settings.trigger_threshold;
        if self.right_trigger > threshold {
            return (Thrust::Forward, trigger_gear(self.right_trigger));
        }
        if self.left_trigger > threshold {
            return (Thrust::Backward, trigger_gear(self.left_trigger));
        }

        if self.stick_y > self.settings.thrust_threshold {
            (Thrust::Forward, self.gear())
        } else if self.stick_y < -self.settings.thrust_threshold {
            (Thrust::Backward, self.gear())
        } else {
            (Thrust::None, Gear::Stop)
        }
    }
}

impl Default for InputTranslator {
    fn default() -> Self {
        Self::new(TranslatorSettings::default())
    }
}

/// Gear number `round(magnitude * N)` clamped to `1..=N`
pub fn trigger_gear(magnitude: f32) -> Gear {
    let count = Gear::DRIVE.len();
    let number = (magnitude.clamp(0.0, 1.0) * count as f32).round() as usize;
    let index = number.clamp(1, count) - 1;
    Gear::from_drive_index(index).unwrap_or(Gear::Gear1)
}

fn apply_dead_zone(value: f32, dead_zone: f32) -> f32 {
    let value = value.clamp(-1.0, 1.0);
    if value.abs() < dead_zone {
        0.0
    } else {
        value
    }
}
