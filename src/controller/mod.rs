//! Controller subsystem for gamepad input handling
//!
//! 1. [`event_collector`] - Raw gamepad input collection and force feedback playback
//! 2. [`controller_handle`] - Lifecycle and channel wiring
//!
//! # Architecture
//!
//! ```text
//! Gamepad ──► Collector ──► RawControllerEvent ──► mapping::to_control_input ──► InputTranslator
//! ```
//!
//! The collector polls gilrs on a dedicated blocking thread; the operator loop
//! drains its channel at 100 Hz.

pub mod controller_handle;
pub mod event_collector;
