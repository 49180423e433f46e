//! Error definitions for the movement pipeline

use thiserror::Error;

use super::intent::{Gear, Turn, TurnType};

/// A combination of intent fields that the data model forbids
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntentError {
    #[error("turn type {0:?} given without a turn direction")]
    TurnTypeWithoutTurn(TurnType),

    #[error("turn {0:?} given without a turn type")]
    TurnWithoutTurnType(Turn),

    #[error("curve turn requires thrust")]
    CurveWithoutThrust,

    #[error("{0:?} turn is only valid without thrust")]
    InPlaceTurnWithThrust(TurnType),

    #[error("gear {gear:?} does not match movement state (moving: {moving})")]
    GearMismatch { gear: Gear, moving: bool },
}

/// Diagnostics raised while decoding wire text
///
/// Decoding never fails; these are reported next to the substituted value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WireError {
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("unexpected trailing fields: '{0}'")]
    TrailingFields(String),

    #[error("invalid value '{value}' for field '{field}'")]
    InvalidField { field: &'static str, value: String },

    #[error("decoded combination is invalid, replaced by STOP: {0}")]
    InvalidCombination(IntentError),
}

/// Kinematics contract violation; the caller must command STOP
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KinematicsError {
    #[error("invalid intent: {0}")]
    InvalidIntent(#[from] IntentError),
}

/// Failure reported by an actuator implementation
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    #[error("actuator not initialized: {0}")]
    NotInitialized(String),

    #[error("actuator error: {0}")]
    General(String),
}
