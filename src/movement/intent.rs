//! Movement intent data model
//!
//! A [`MovementIntent`] is the operator's currently desired motion as a plain value.
//! It is created fresh on every meaningful input change, carried by value across the
//! link and held in a single latest-value slot on each side.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::IntentError;

/// RGB color triple used for indicator and haptic LEDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const OFF: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(255, 255, 255);
    pub const RED: Rgb = Rgb(255, 0, 0);
    pub const GREEN: Rgb = Rgb(0, 255, 0);
    pub const BLUE: Rgb = Rgb(0, 0, 255);
    pub const PURPLE: Rgb = Rgb(255, 0, 255);
    pub const YELLOW: Rgb = Rgb(255, 255, 0);
    pub const ORANGE: Rgb = Rgb(255, 128, 0);

    /// Linear blend from `self` (progress 0.0) to `other` (progress 1.0)
    pub fn blend(self, other: Rgb, progress: f32) -> Rgb {
        let p = progress.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f32 * (1.0 - p) + b as f32 * p).round() as u8;
        Rgb(mix(self.0, other.0), mix(self.1, other.1), mix(self.2, other.2))
    }
}

/// Longitudinal direction of travel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Thrust {
    Forward,
    Backward,
    #[default]
    None,
}

/// Direction of rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Turn {
    Left,
    Right,
    #[default]
    None,
}

/// How a turn is executed by the two tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TurnType {
    /// Both tracks driven in opposite directions
    Spin,
    /// One track stationary, the other driven
    Pivot,
    /// Both tracks driven, the inner one slowed by the curve rate
    Curve,
    #[default]
    None,
}

/// Discrete power level; the discriminant is the per-track speed in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Gear {
    #[default]
    Stop = 0,
    Gear1 = 70,
    Gear2 = 80,
    Gear3 = 90,
    Gear4 = 100,
}

impl Gear {
    /// Drive gears in ascending order, STOP excluded
    pub const DRIVE: [Gear; 4] = [Gear::Gear1, Gear::Gear2, Gear::Gear3, Gear::Gear4];

    pub fn speed(self) -> u8 {
        self as u8
    }

    pub fn from_speed(value: u8) -> Option<Gear> {
        match value {
            0 => Some(Gear::Stop),
            70 => Some(Gear::Gear1),
            80 => Some(Gear::Gear2),
            90 => Some(Gear::Gear3),
            100 => Some(Gear::Gear4),
            _ => None,
        }
    }

    /// Position in [`Gear::DRIVE`], `None` for STOP
    pub fn drive_index(self) -> Option<usize> {
        Gear::DRIVE.iter().position(|g| *g == self)
    }

    pub fn from_drive_index(index: usize) -> Option<Gear> {
        Gear::DRIVE.get(index).copied()
    }

    /// Indicator color shown on the operator's controller for this gear
    pub fn color(self) -> Rgb {
        match self {
            Gear::Stop => Rgb::WHITE,
            Gear::Gear1 => Rgb(135, 206, 250),
            Gear::Gear2 => Rgb(67, 198, 252),
            Gear::Gear3 => Rgb(0, 191, 255),
            Gear::Gear4 => Rgb(0, 0, 139),
        }
    }
}

/// Fraction by which the inner track is slowed during a curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum CurveRate {
    #[default]
    None,
    Level1,
    Level2,
}

impl CurveRate {
    /// Non-zero rates in ascending order
    pub const LEVELS: [CurveRate; 2] = [CurveRate::Level1, CurveRate::Level2];

    pub fn value(self) -> f32 {
        match self {
            CurveRate::None => 0.0,
            CurveRate::Level1 => 0.4,
            CurveRate::Level2 => 0.6,
        }
    }

    /// Nearest non-zero level to `magnitude`; ties resolve to the lower level
    pub fn nearest(magnitude: f32) -> CurveRate {
        let mut best = CurveRate::LEVELS[0];
        let mut best_distance = (magnitude - best.value()).abs();
        for level in &CurveRate::LEVELS[1..] {
            let distance = (magnitude - level.value()).abs();
            // strict comparison keeps the lower level on a tie
            if distance < best_distance - f32::EPSILON {
                best = *level;
                best_distance = distance;
            }
        }
        best
    }
}

/// Immutable description of the desired motion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MovementIntent {
    pub thrust: Thrust,
    pub turn: Turn,
    pub turn_type: TurnType,
    pub gear: Gear,
    pub curve_rate: CurveRate,
}

impl MovementIntent {
    /// The all-neutral intent
    pub fn stop() -> Self {
        Self::default()
    }

    /// Straight travel at `gear`
    pub fn straight(thrust: Thrust, gear: Gear) -> Self {
        Self {
            thrust,
            turn: Turn::None,
            turn_type: TurnType::None,
            gear,
            curve_rate: CurveRate::None,
        }
    }

    /// Curved travel, inner track slowed by `curve_rate`
    pub fn curve(thrust: Thrust, turn: Turn, gear: Gear, curve_rate: CurveRate) -> Self {
        Self {
            thrust,
            turn,
            turn_type: TurnType::Curve,
            gear,
            curve_rate,
        }
    }

    /// Rotation without thrust, either spinning or pivoting
    pub fn in_place(turn: Turn, pivot: bool, gear: Gear) -> Self {
        Self {
            thrust: Thrust::None,
            turn,
            turn_type: if pivot { TurnType::Pivot } else { TurnType::Spin },
            gear,
            curve_rate: CurveRate::None,
        }
    }

    pub fn is_stop(&self) -> bool {
        self.thrust == Thrust::None && self.turn == Turn::None
    }

    pub fn is_moving(&self) -> bool {
        !self.is_stop()
    }

    /// Curve rate as seen by consumers; zero unless the turn is a curve
    pub fn effective_curve_rate(&self) -> CurveRate {
        if self.turn_type == TurnType::Curve {
            self.curve_rate
        } else {
            CurveRate::None
        }
    }

    /// Same intent with a different gear, keeping the STOP invariant intact
    pub fn with_gear(self, gear: Gear) -> Self {
        if self.is_stop() {
            self
        } else {
            Self { gear, ..self }
        }
    }

    /// Checks every combination rule of the data model
    pub fn validate(&self) -> Result<(), IntentError> {
        match (self.thrust, self.turn, self.turn_type) {
            (_, Turn::None, TurnType::None) => {}
            (_, Turn::None, turn_type) => {
                return Err(IntentError::TurnTypeWithoutTurn(turn_type));
            }
            (_, turn, TurnType::None) => return Err(IntentError::TurnWithoutTurnType(turn)),
            (Thrust::None, _, TurnType::Curve) => return Err(IntentError::CurveWithoutThrust),
            (thrust, _, TurnType::Spin | TurnType::Pivot) if thrust != Thrust::None => {
                return Err(IntentError::InPlaceTurnWithThrust(self.turn_type));
            }
            _ => {}
        }

        if self.is_stop() != (self.gear == Gear::Stop) {
            return Err(IntentError::GearMismatch {
                gear: self.gear,
                moving: self.is_moving(),
            });
        }

        Ok(())
    }
}

impl fmt::Display for MovementIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}/{:?}/{:?} @ {:?} (curve {:.2})",
            self.thrust,
            self.turn,
            self.turn_type,
            self.gear,
            self.effective_curve_rate().value()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_intent_is_valid() {
        assert!(MovementIntent::stop().validate().is_ok());
        assert!(MovementIntent::stop().is_stop());
    }

    #[test]
    fn curve_requires_thrust() {
        let intent = MovementIntent {
            thrust: Thrust::None,
            turn: Turn::Left,
            turn_type: TurnType::Curve,
            gear: Gear::Gear1,
            curve_rate: CurveRate::Level1,
        };
        assert_eq!(intent.validate(), Err(IntentError::CurveWithoutThrust));
    }

    #[test]
    fn spin_rejects_thrust() {
        let intent = MovementIntent {
            thrust: Thrust::Forward,
            turn: Turn::Right,
            turn_type: TurnType::Spin,
            gear: Gear::Gear2,
            curve_rate: CurveRate::None,
        };
        assert!(matches!(
            intent.validate(),
            Err(IntentError::InPlaceTurnWithThrust(TurnType::Spin))
        ));
    }

    #[test]
    fn moving_intent_needs_drive_gear() {
        let intent = MovementIntent::straight(Thrust::Forward, Gear::Stop);
        assert!(matches!(intent.validate(), Err(IntentError::GearMismatch { .. })));

        let parked = MovementIntent {
            gear: Gear::Gear3,
            ..MovementIntent::stop()
        };
        assert!(parked.validate().is_err());
    }

    #[test]
    fn turn_and_turn_type_go_together() {
        let intent = MovementIntent {
            thrust: Thrust::Forward,
            turn: Turn::Left,
            turn_type: TurnType::None,
            gear: Gear::Gear1,
            curve_rate: CurveRate::None,
        };
        assert_eq!(intent.validate(), Err(IntentError::TurnWithoutTurnType(Turn::Left)));
    }

    #[test]
    fn nearest_curve_rate_prefers_lower_on_tie() {
        assert_eq!(CurveRate::nearest(0.45), CurveRate::Level1);
        assert_eq!(CurveRate::nearest(0.5), CurveRate::Level1);
        assert_eq!(CurveRate::nearest(0.55), CurveRate::Level2);
        assert_eq!(CurveRate::nearest(0.95), CurveRate::Level2);
        assert_eq!(CurveRate::nearest(0.0), CurveRate::Level1);
    }

    #[test]
    fn gear_drive_index_round_trips() {
        for (i, gear) in Gear::DRIVE.iter().enumerate() {
            assert_eq!(gear.drive_index(), Some(i));
            assert_eq!(Gear::from_drive_index(i), Some(*gear));
        }
        assert_eq!(Gear::Stop.drive_index(), None);
        assert_eq!(Gear::from_drive_index(4), None);
    }

    #[test]
    fn curve_rate_only_counts_for_curves() {
        let intent = MovementIntent {
            curve_rate: CurveRate::Level2,
            ..MovementIntent::in_place(Turn::Left, false, Gear::Gear1)
        };
        assert_eq!(intent.effective_curve_rate(), CurveRate::None);
    }

    #[test]
    fn blend_hits_both_ends() {
        assert_eq!(Rgb::RED.blend(Rgb::GREEN, 0.0), Rgb::RED);
        assert_eq!(Rgb::RED.blend(Rgb::GREEN, 1.0), Rgb::GREEN);
    }
}
