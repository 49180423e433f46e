//! Controller Handle - API for gamepad input and haptic output
//!
//! Wires the collector thread to the operator loop: raw events flow out through
//! one channel, haptic commands from the feedback scheduler flow in through
//! another. The returned [`GamepadRenderer`] is the scheduler's end of the
//! haptic channel.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use super::event_collector::{
    ButtonState, ButtonType, CollectorError, CollectorHandle, CollectorSettings, JoystickType,
    RawControllerEvent, TriggerType,
};
use crate::feedback::renderer::GamepadRenderer;

/// Configuration for the controller subsystem
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    pub collector: CollectorSettings,

    /// Buffer between the collector thread and the operator loop
    pub event_capacity: usize,

    /// Buffer for haptic commands; the rumble loop alone sends 100 per second
    pub haptic_capacity: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            collector: CollectorSettings::default(),
            event_capacity: 1000,
            haptic_capacity: 64,
        }
    }
}

/// Errors that can occur during controller initialization or operation
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Gamepad detection, driver or force feedback problems
    #[error("Collector error: {0}")]
    CollectorError(#[from] CollectorError),

    #[error("Initialization error: {0}")]
    InitializationError(String),
}

/// Handle owning the collector thread
///
/// # Thread Communication
///
/// ```text
/// Gamepad ──► Collector ─[RawControllerEvent]→ operator loop
///                 ▲
///                 └──────[HapticCommand]─── GamepadRenderer ◄── FeedbackScheduler
/// ```
pub struct ControllerHandle {
    collector: CollectorHandle,
}

impl ControllerHandle {
    /// Spawns the collector thread and returns the handle, the raw event
    /// receiver and the renderer feeding the gamepad's motors
    pub fn spawn(
        settings: Option<ControllerSettings>,
        token: CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<RawControllerEvent>, GamepadRenderer), ControllerError> {
        info!(
            "Initializing Controller system with settings: {:?}",
            settings
        );
        let settings = settings.unwrap_or_default();

        if settings.event_capacity == 0 || settings.haptic_capacity == 0 {
            return Err(ControllerError::InitializationError(
                "channel capacities must be positive".to_string(),
            ));
        }

        let (event_sender, event_receiver) = mpsc::channel(settings.event_capacity);
        let (haptic_sender, haptic_receiver) = mpsc::channel(settings.haptic_capacity);
        debug!(
            "Created event channel ({}) and haptic channel ({})",
            settings.event_capacity, settings.haptic_capacity
        );

        let collector = CollectorHandle::spawn(
            Some(settings.collector),
            event_sender,
            haptic_receiver,
            token,
        )?;

        info!("Controller system initialized successfully");
        Ok((
            Self { collector },
            event_receiver,
            GamepadRenderer::new(haptic_sender),
        ))
    }

    /// Stops the collector thread and releases the gamepad
    pub async fn shutdown(self) {
        info!("Shutting down controller");
        self.collector.shutdown().await;
    }
}
