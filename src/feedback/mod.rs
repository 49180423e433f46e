//! # Operator feedback
//!
//! Reflects the live movement state and game events back to the operator through
//! the gamepad's rumble motors and indicator color.
//!
//! ```text
//! feedback/
//! ├── animation.rs  - Step sequences with priority and loop count
//! ├── effects.rs    - Event catalog and game event parsing
//! ├── rumble.rs     - Continuous movement rumble waveforms
//! ├── renderer.rs   - HapticRenderer seam and the gamepad renderer
//! └── scheduler.rs  - Preemptible scheduler owning the running tasks
//! ```

pub mod animation;
pub mod effects;
pub mod renderer;
pub mod rumble;
pub mod scheduler;

pub use animation::{AnimationStep, FeedbackAnimation, Priority};
pub use effects::{parse_game_event, FeedbackEvent, GameEventError};
pub use renderer::{GamepadRenderer, HapticCommand, HapticError, HapticRenderer};
pub use scheduler::{FeedbackScheduler, FeedbackSettings, SchedulerState, SchedulerStatus};
