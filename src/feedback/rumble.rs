//! Continuous movement rumble
//!
//! [`RumbleProfile`] is a pure function of the movement intent and elapsed time;
//! the scheduler samples it at the rumble tick rate. Intensities are motor
//! magnitudes in `0..=65535` for the low (left) and high (right) frequency motors.

use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use crate::movement::intent::{Gear, MovementIntent, Thrust, Turn, TurnType};

pub const MAX_INTENSITY: f32 = 65535.0;

/// Per-gear base intensity, variation amplitude and oscillation cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GearRumble {
    pub base: f32,
    pub variation: f32,
    /// Cycle time in seconds
    pub cycle: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RumbleSettings {
    pub gear1: GearRumble,
    pub gear2: GearRumble,
    pub gear3: GearRumble,
    pub gear4: GearRumble,
    /// Intensity floor on tracks whose modifier exceeds `floor_modifier`
    pub floor: f32,
    pub floor_modifier: f32,
    /// Strong start pulse length in milliseconds
    pub kick_ms: u64,
    /// Sampling period of the rumble loop in milliseconds
    pub tick_ms: u64,
    /// Duration attached to every sampled rumble command
    pub sample_duration_ms: u32,
}

impl Default for RumbleSettings {
    fn default() -> Self {
        Self {
            gear1: GearRumble {
                base: 20000.0,
                variation: 10000.0,
                cycle: 0.5,
            },
            gear2: GearRumble {
                base: 30000.0,
                variation: 15000.0,
                cycle: 0.4,
            },
            gear3: GearRumble {
                base: 40000.0,
                variation: 20000.0,
                cycle: 0.3,
            },
            gear4: GearRumble {
                base: 50000.0,
                variation: 25000.0,
                cycle: 0.2,
            },
            floor: 10000.0,
            floor_modifier: 0.2,
            kick_ms: 80,
            tick_ms: 10,
            sample_duration_ms: 50,
        }
    }
}

impl RumbleSettings {
    pub fn for_gear(&self, gear: Gear) -> GearRumble {
        match gear {
            Gear::Stop => GearRumble {
                base: 0.0,
                variation: 0.0,
                cycle: 1.0,
            },
            Gear::Gear1 => self.gear1,
            Gear::Gear2 => self.gear2,
            Gear::Gear3 => self.gear3,
            Gear::Gear4 => self.gear4,
        }
    }
}

/// Wave family selected by the movement regime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Straight travel, in-phase pair with a slight offset
    Continuous,
    /// Curve, per-track multipliers from the curve rate
    Differential,
    /// Spin, tracks in opposite phase
    Alternating,
    /// Pivot, stationary track near zero
    Pivot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RumbleProfile {
    intent: MovementIntent,
    pattern: Pattern,
    base: f32,
    variation: f32,
    cycle: f32,
    phase: f32,
    left_modifier: f32,
    right_modifier: f32,
    floor: f32,
    floor_modifier: f32,
}

impl RumbleProfile {
    pub fn new(intent: &MovementIntent, settings: &RumbleSettings) -> Self {
        let gear = settings.for_gear(intent.gear);
        let mut cycle = gear.cycle;

        let (thrust_modifier, phase) = match intent.thrust {
            Thrust::Forward => (1.2, 0.3),
            Thrust::Backward => {
                cycle *= 1.1;
                (1.0, 0.4)
            }
            Thrust::None => (0.9, 0.25),
        };
        let thrusting = intent.thrust != Thrust::None;

        let mut pattern = Pattern::Continuous;
        let mut left_modifier = 1.0;
        let mut right_modifier = 1.0;

        if intent.turn != Turn::None {
            match intent.turn_type {
                TurnType::Curve => {
                    pattern = Pattern::Differential;
                    let rate = intent.effective_curve_rate().value();
                    let inner = (1.0 - rate * 0.8).max(0.3);
                    let outer = (1.0 + rate * 0.8).min(2.0);
                    let (mut inner, mut outer) = (inner, outer);
                    match intent.thrust {
                        Thrust::Forward => outer *= 1.2,
                        Thrust::Backward => inner *= 1.1,
                        Thrust::None => {}
                    }
                    (left_modifier, right_modifier) = match intent.turn {
                        Turn::Left => (inner, outer),
                        _ => (outer, inner),
                    };
                }
                TurnType::Spin => {
                    pattern = Pattern::Alternating;
                    if thrusting {
                        (left_modifier, right_modifier) = match intent.turn {
                            Turn::Left => (1.3, 1.7),
                            _ => (1.7, 1.3),
                        };
                    } else {
                        left_modifier = 1.5;
                        right_modifier = 1.5;
                        cycle *= 0.5;
                    }
                }
                TurnType::Pivot => {
                    pattern = Pattern::Pivot;
                    let active = if thrusting { 2.0 } else { 1.8 };
                    (left_modifier, right_modifier) = match intent.turn {
                        Turn::Left => (0.15, active),
                        _ => (active, 0.15),
                    };
                }
                TurnType::None => {}
            }
        }

        Self {
            intent: *intent,
            pattern,
            base: gear.base * thrust_modifier,
            variation: gear.variation,
            cycle,
            phase,
            left_modifier,
            right_modifier,
            floor: settings.floor,
            floor_modifier: settings.floor_modifier,
        }
    }

    pub fn intent(&self) -> &MovementIntent {
        &self.intent
    }

    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    /// Strong start pulse sent before the loop begins
    pub fn kick(&self) -> (u16, u16) {
        let mut left = self.base * self.left_modifier * 1.3;
        let mut right = self.base * self.right_modifier * 1.3;
        if self.intent.turn == Turn::None {
            let boost = match self.intent.thrust {
                Thrust::Forward => 1.2,
                Thrust::Backward => 1.1,
                Thrust::None => 1.0,
            };
            left *= boost;
            right *= boost;
        }
        (to_intensity(left), to_intensity(right))
    }

    /// Intensities `t` seconds after the loop started
    pub fn sample(&self, t: f32) -> (u16, u16) {
        let omega = TAU / self.cycle;
        let shape = |x: f32| {
            if self.intent.thrust == Thrust::Backward {
                x.cos()
            } else {
                x.sin()
            }
        };
        let wave_left = shape(t * omega);
        let wave_right = shape(t * omega + self.phase);

        let (left, right) = match self.pattern {
            Pattern::Continuous => {
                let mut left = self.base + wave_left * self.variation;
                let mut right = self.base + wave_right * self.variation;
                if self.intent.thrust != Thrust::None {
                    let tread = (t * TAU / (self.cycle * 0.25)).sin() * self.variation * 0.3;
                    if self.intent.thrust == Thrust::Forward {
                        left += tread;
                        right -= tread;
                    } else {
                        left -= tread;
                        right += tread;
                    }
                }
                (left, right)
            }
            Pattern::Differential => (
                (self.base + wave_left * self.variation) * self.left_modifier,
                (self.base + wave_right * self.variation) * self.right_modifier,
            ),
            Pattern::Alternating => {
                let (wave, counter) = if self.intent.thrust == Thrust::None {
                    let w = (t * TAU / (self.cycle * 0.6)).sin();
                    (w, -w)
                } else {
                    let x = t * TAU / (self.cycle * 0.7);
                    (x.sin(), -(x + 0.2).sin())
                };
                (
                    (self.base + wave * self.variation) * self.left_modifier,
                    (self.base + counter * self.variation) * self.right_modifier,
                )
            }
            Pattern::Pivot => {
                let period = if self.intent.thrust != Thrust::None {
                    self.cycle * 0.8
                } else {
                    self.cycle
                };
                let active = self.base + (t * TAU / period).sin() * self.variation * 1.5;
                let stationary = self.base * 0.1;
                match self.intent.turn {
                    Turn::Left => (stationary, active),
                    _ => (active, stationary),
                }
            }
        };

        (
            self.shape_output(left, self.left_modifier),
            self.shape_output(right, self.right_modifier),
        )
    }

    fn shape_output(&self, value: f32, modifier: f32) -> u16 {
        let clamped = value.clamp(0.0, MAX_INTENSITY);
        if modifier > self.floor_modifier {
            to_intensity(clamped.max(self.floor))
        } else {
            to_intensity(clamped)
        }
    }
}

fn to_intensity(value: f32) -> u16 {
    value.clamp(0.0, MAX_INTENSITY) as u16
}
