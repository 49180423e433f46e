//! Haptic output seam
//!
//! The scheduler renders through [`HapticRenderer`]. On the operator station the
//! renderer is a [`GamepadRenderer`] that forwards commands to the gamepad
//! collector thread, which owns the gilrs context and its force-feedback effects.

use tokio::sync::mpsc;

use crate::movement::intent::Rgb;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HapticError {
    #[error("haptic channel closed")]
    ChannelClosed,

    #[error("haptic queue full, dropped {0}")]
    QueueFull(String),

    #[error("force feedback error: {0}")]
    ForceFeedback(String),
}

pub trait HapticRenderer: Send + Sync {
    fn set_color(&self, color: Rgb) -> Result<(), HapticError>;

    /// Runs both motors for `duration_ms`; intensities in `0..=65535`
    fn set_rumble(&self, low: u16, high: u16, duration_ms: u32) -> Result<(), HapticError>;

    fn stop_rumble(&self) -> Result<(), HapticError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HapticCommand {
    Color(Rgb),
    Rumble { low: u16, high: u16, duration_ms: u32 },
    StopRumble,
}

/// Non-blocking renderer feeding the gamepad collector
#[derive(Debug, Clone)]
pub struct GamepadRenderer {
    commands: mpsc::Sender<HapticCommand>,
}

impl GamepadRenderer {
    pub fn new(commands: mpsc::Sender<HapticCommand>) -> Self {
        Self { commands }
    }

    fn send(&self, command: HapticCommand) -> Result<(), HapticError> {
        self.commands.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(command) => HapticError::QueueFull(format!("{command:?}")),
            mpsc::error::TrySendError::Closed(_) => HapticError::ChannelClosed,
        })
    }
}

impl HapticRenderer for GamepadRenderer {
    fn set_color(&self, color: Rgb) -> Result<(), HapticError> {
        self.send(HapticCommand::Color(color))
    }

    fn set_rumble(&self, low: u16, high: u16, duration_ms: u32) -> Result<(), HapticError> {
        self.send(HapticCommand::Rumble {
            low,
            high,
            duration_ms,
        })
    }

    fn stop_rumble(&self) -> Result<(), HapticError> {
        self.send(HapticCommand::StopRumble)
    }
}
