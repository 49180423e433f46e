//! Movement pipeline
//!
//! ```text
//! MovementIntent ──► wire::encode ──► link ──► wire::decode ──► MotionKinematics ──► ActuatorDriver
//! ```
//!
//! - [`intent`] - the intent value and its vocabularies
//! - [`wire`] - the only place that knows the text representation
//! - [`kinematics`] - regime table and kickstart planning
//! - [`actuator`] - motor drivers, simulated and GPIO
//! - [`motion`] - vehicle-side current intent slot
//! - [`dispatcher`] - publish-on-change and acknowledged state

pub mod actuator;
pub mod dispatcher;
pub mod error;
pub mod intent;
pub mod kinematics;
pub mod motion;
pub mod wire;

pub use error::{ActuatorError, IntentError, KinematicsError, WireError};
pub use intent::{CurveRate, Gear, MovementIntent, Rgb, Thrust, Turn, TurnType};
