use chrono::{DateTime, Local};
use gilrs::ff::{BaseEffect, BaseEffectType, Effect, EffectBuilder, Replay, Ticks};
use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use serde::{Deserialize, Serialize};
use statum::{machine, state};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::feedback::renderer::HapticCommand;
use crate::movement::intent::Rgb;

// Raw controller event with precise chrono timestamps
#[derive(Debug, Clone)]
pub enum RawControllerEvent {
    JoystickMove {
        stick: JoystickType,
        x: f32,
        y: f32,
        timestamp: DateTime<Local>,
    },
    TriggerMove {
        trigger: TriggerType,
        value: f32,
        timestamp: DateTime<Local>,
    },
    ButtonEvent {
        button_type: ButtonType,
        button_state: ButtonState,
        timestamp: DateTime<Local>,
    },
    ConnectionChanged {
        connected: bool,
        timestamp: DateTime<Local>,
    },
}

// Joystick type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoystickType {
    Left,
    Right,
}

// Trigger type, Left = L2, Right = R2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerType {
    Left,
    Right,
}

// Button state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonState {
    Pressed,
    Released,
}

// Face buttons use positional names: South = Cross, East = Circle, West = Square
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ButtonType {
    South,
    East,
    West,
    North,
    Start,
    Select,
    LeftBumper,
    RightBumper,
    LeftStick,
    RightStick,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    Guide,
}

// Collector settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSettings {
    /// Axis values below this magnitude are reported as zero; the translator
    /// applies the real dead zone
    pub noise_floor: f32,
    /// Sleep between polling rounds
    pub poll_interval_us: u64,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            noise_floor: 0.02,
            poll_interval_us: 500,
        }
    }
}

// Collector errors
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),

    #[error("Failed to send event: {0}")]
    EventSendError(String),

    #[error("No gamepad connected: {0}")]
    NoGamepadError(String),

    #[error("Force feedback failed: {0}")]
    ForceFeedbackError(String),
}

// Define collector states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
pub struct EventCollector<S: CollectionState> {
    // Gilrs context
    gilrs: Gilrs,

    // Active gamepad
    active_gamepad: Option<GamepadId>,

    // Collector settings
    settings: CollectorSettings,

    // Channel for sending events to the operator loop
    event_sender: mpsc::Sender<RawControllerEvent>,

    // Haptic commands from the feedback scheduler
    haptics: mpsc::Receiver<HapticCommand>,

    // Playing rumble effect, dropping it stops the motors
    rumble: Option<Effect>,

    // Indicator color last requested by the scheduler
    indicator: Option<Rgb>,

    // Last seen left stick values, both axes travel in one event
    last_left_stick_x: f32,
    last_left_stick_y: f32,
}

// Implementation of methods available in all states
impl<S: CollectionState> EventCollector<S> {
    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    pub fn active_gamepad(&self) -> Option<GamepadId> {
        self.active_gamepad
    }
}

// Implementation for Initializing state
impl EventCollector<Initializing> {
    pub fn create(
        settings: Option<CollectorSettings>,
        event_sender: mpsc::Sender<RawControllerEvent>,
        haptics: mpsc::Receiver<HapticCommand>,
    ) -> Result<Self, CollectorError> {
        let settings = settings.unwrap_or_default();
        debug!("Creating Event Collector with settings: {:?}", settings);

        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(CollectorError::InitializationError(e.to_string()));
            }
        };

        Ok(Self::new(
            gilrs,
            None,
            settings,
            event_sender,
            haptics,
            None,
            None,
            0.0, // last_left_stick_x
            0.0, // last_left_stick_y
        ))
    }

    // Select the first gamepad and transition to Collecting state
    pub fn initialize(mut self) -> EventCollector<Collecting> {
        let gamepads: Vec<(GamepadId, Gamepad<'_>)> = self.gilrs.gamepads().collect();

        if gamepads.is_empty() {
            warn!("No gamepad connected, waiting for one to appear");
        } else {
            info!("Found {} gamepads:", gamepads.len());
            for (idx, (id, gamepad)) in gamepads.iter().enumerate() {
                info!(
                    "  [{}] ID: {}, Name: {}, force feedback: {}",
                    idx,
                    id,
                    gamepad.name(),
                    gamepad.is_ff_supported()
                );
            }
            let (id, gamepad) = &gamepads[0];
            self.active_gamepad = Some(*id);
            info!("Selected gamepad: {} ({})", gamepad.name(), id);
        }

        info!("Event Collector initialized, transitioning to Collecting state");
        self.transition()
    }
}

// Implementation for Controller in Collecting state
impl EventCollector<Collecting> {
    // Forward every pending gilrs event
    pub fn collect_pending_events(&mut self) -> Result<(), CollectorError> {
        while let Some(Event { id, event, time, .. }) = self.gilrs.next_event() {
            match (self.active_gamepad, &event) {
                (None, EventType::Connected) => {
                    info!("Gamepad {} connected, selecting it", id);
                    self.active_gamepad = Some(id);
                }
                (Some(active_id), _) if id != active_id => {
                    debug!("Skipping event from non-active gamepad: {:?}", id);
                    continue;
                }
                _ => {}
            }

            debug!("Processing gilrs event: {:?} at time: {:?}", event, time);

            let Some(raw_event) = self.convert_gilrs_event(id, event) else {
                continue;
            };

            if let RawControllerEvent::ButtonEvent {
                button_type,
                button_state,
                timestamp,
            } = &raw_event
            {
                debug!(
                    "Button event: {:?} {:?} at {}",
                    button_type,
                    button_state,
                    timestamp.format("%H:%M:%S.%3f")
                );
            }

            if let Err(e) = self.event_sender.try_send(raw_event) {
                return Err(CollectorError::EventSendError(e.to_string()));
            }
        }

        Ok(())
    }

    // Apply every queued haptic command
    pub fn apply_pending_haptics(&mut self) {
        while let Ok(command) = self.haptics.try_recv() {
            if let Err(e) = self.apply_haptic(command) {
                debug!("Haptic command {:?} not applied: {}", command, e);
            }
        }
    }

    fn apply_haptic(&mut self, command: HapticCommand) -> Result<(), CollectorError> {
        match command {
            HapticCommand::Color(color) => {
                // gilrs exposes no light bar, the color is tracked for status only
                if self.indicator != Some(color) {
                    debug!("Indicator color {:?}", color);
                    self.indicator = Some(color);
                }
                Ok(())
            }
            HapticCommand::Rumble {
                low,
                high,
                duration_ms,
            } => {
                let id = self
                    .active_gamepad
                    .ok_or_else(|| CollectorError::NoGamepadError("rumble requested".to_string()))?;
                if !self.gilrs.gamepad(id).is_ff_supported() {
                    return Err(CollectorError::ForceFeedbackError(
                        "gamepad has no force feedback".to_string(),
                    ));
                }

                let mut builder = EffectBuilder::new();
                for effect in rumble_effects(low, high, duration_ms) {
                    builder.add_effect(effect);
                }
                let effect = builder
                    .gamepads(&[id])
                    .finish(&mut self.gilrs)
                    .map_err(|e| CollectorError::ForceFeedbackError(e.to_string()))?;
                effect
                    .play()
                    .map_err(|e| CollectorError::ForceFeedbackError(e.to_string()))?;

                // replacing the previous effect drops and stops it
                self.rumble = Some(effect);
                Ok(())
            }
            HapticCommand::StopRumble => {
                if let Some(effect) = self.rumble.take() {
                    effect
                        .stop()
                        .map_err(|e| CollectorError::ForceFeedbackError(e.to_string()))?;
                }
                Ok(())
            }
        }
    }

    // Run the collector until the token is cancelled
    pub fn run_collection_loop(&mut self, token: &CancellationToken) {
        info!("Starting Event Collector loop");

        let mut event_errors = 0u32;
        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::seconds(10);
        let poll_interval = std::time::Duration::from_micros(self.settings.poll_interval_us);

        while !token.is_cancelled() {
            if let Err(e) = self.collect_pending_events() {
                event_errors += 1;
                debug!("Error collecting event: {}", e);
            }
            self.apply_pending_haptics();

            let now = Local::now();
            if now - last_log_time > log_interval {
                if event_errors > 0 {
                    warn!(
                        "Event Collector dropped {} events in last {} seconds",
                        event_errors,
                        log_interval.num_seconds()
                    );
                }
                event_errors = 0;
                last_log_time = now;
            }

            std::thread::sleep(poll_interval);
        }

        self.rumble = None;
        info!("Event Collector loop stopped");
    }

    // Convert gilrs event to internal event type with chrono timestamp
    fn convert_gilrs_event(&mut self, id: GamepadId, event: EventType) -> Option<RawControllerEvent> {
        let now = Local::now();
        let floor = self.settings.noise_floor;

        match event {
            EventType::AxisChanged(axis, value, _) => match axis {
                Axis::LeftStickX => {
                    self.last_left_stick_x = apply_noise_floor(value, floor);
                    Some(RawControllerEvent::JoystickMove {
                        stick: JoystickType::Left,
                        x: self.last_left_stick_x,
                        y: self.last_left_stick_y,
                        timestamp: now,
                    })
                }
                Axis::LeftStickY => {
                    self.last_left_stick_y = apply_noise_floor(value, floor);
                    Some(RawControllerEvent::JoystickMove {
                        stick: JoystickType::Left,
                        x: self.last_left_stick_x,
                        y: self.last_left_stick_y,
                        timestamp: now,
                    })
                }
                Axis::LeftZ => Some(RawControllerEvent::TriggerMove {
                    trigger: TriggerType::Left,
                    value: trigger_magnitude(value, floor),
                    timestamp: now,
                }),
                Axis::RightZ => Some(RawControllerEvent::TriggerMove {
                    trigger: TriggerType::Right,
                    value: trigger_magnitude(value, floor),
                    timestamp: now,
                }),
                _ => {
                    debug!("Ignoring unsupported axis: {:?}", axis);
                    None
                }
            },
            // Some drivers report the analog triggers as buttons with a value
            EventType::ButtonChanged(Button::LeftTrigger2, value, _) => {
                Some(RawControllerEvent::TriggerMove {
                    trigger: TriggerType::Left,
                    value: trigger_magnitude(value, floor),
                    timestamp: now,
                })
            }
            EventType::ButtonChanged(Button::RightTrigger2, value, _) => {
                Some(RawControllerEvent::TriggerMove {
                    trigger: TriggerType::Right,
                    value: trigger_magnitude(value, floor),
                    timestamp: now,
                })
            }
            EventType::ButtonPressed(button, _) => {
                map_button(button).map(|button_type| RawControllerEvent::ButtonEvent {
                    button_type,
                    button_state: ButtonState::Pressed,
                    timestamp: now,
                })
            }
            EventType::ButtonReleased(button, _) => {
                map_button(button).map(|button_type| RawControllerEvent::ButtonEvent {
                    button_type,
                    button_state: ButtonState::Released,
                    timestamp: now,
                })
            }
            EventType::ButtonRepeated(button, _) => {
                debug!("Button repeat ignored: {:?}", button);
                None
            }
            EventType::Connected => {
                info!("Controller {} connected", id);
                Some(RawControllerEvent::ConnectionChanged {
                    connected: true,
                    timestamp: now,
                })
            }
            EventType::Disconnected => {
                warn!("Controller {} disconnected", id);
                self.active_gamepad = None;
                self.rumble = None;
                self.last_left_stick_x = 0.0;
                self.last_left_stick_y = 0.0;
                Some(RawControllerEvent::ConnectionChanged {
                    connected: false,
                    timestamp: now,
                })
            }
            _ => {
                debug!("Unhandled event type: {:?}", event);
                None
            }
        }
    }
}

// Public interface for spawning and running the collector
pub struct CollectorHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl CollectorHandle {
    // Create a new collector and run it on a blocking thread
    pub fn spawn(
        settings: Option<CollectorSettings>,
        event_sender: mpsc::Sender<RawControllerEvent>,
        haptics: mpsc::Receiver<HapticCommand>,
        token: CancellationToken,
    ) -> Result<Self, CollectorError> {
        info!("Spawning Event Collector with settings: {:?}", settings);

        let collector = EventCollector::create(settings, event_sender, haptics)?;

        let loop_token = token.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut collecting = collector.initialize();
            collecting.run_collection_loop(&loop_token);
        });

        info!("Event Collector successfully started");
        Ok(Self { token, task })
    }

    // Stop the loop and wait for the thread to exit
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            error!("Event Collector thread failed: {}", e);
        }
    }
}

// Strong motor carries the low frequency, weak motor the high frequency
fn rumble_effects(low: u16, high: u16, duration_ms: u32) -> Vec<BaseEffect> {
    let scheduling = Replay {
        play_for: Ticks::from_ms(duration_ms),
        ..Default::default()
    };
    vec![
        BaseEffect {
            kind: BaseEffectType::Strong { magnitude: low },
            scheduling,
            ..Default::default()
        },
        BaseEffect {
            kind: BaseEffectType::Weak { magnitude: high },
            scheduling,
            ..Default::default()
        },
    ]
}

// Helper function to map gilrs Button to our ButtonType
fn map_button(button: Button) -> Option<ButtonType> {
    match button {
        Button::South => Some(ButtonType::South),
        Button::East => Some(ButtonType::East),
        Button::West => Some(ButtonType::West),
        Button::North => Some(ButtonType::North),
        Button::Start => Some(ButtonType::Start),
        Button::Select => Some(ButtonType::Select),
        Button::LeftTrigger => Some(ButtonType::LeftBumper),
        Button::RightTrigger => Some(ButtonType::RightBumper),
        Button::LeftThumb => Some(ButtonType::LeftStick),
        Button::RightThumb => Some(ButtonType::RightStick),
        Button::DPadUp => Some(ButtonType::DPadUp),
        Button::DPadDown => Some(ButtonType::DPadDown),
        Button::DPadLeft => Some(ButtonType::DPadLeft),
        Button::DPadRight => Some(ButtonType::DPadRight),
        Button::Mode => Some(ButtonType::Guide),
        _ => None,
    }
}

fn apply_noise_floor(value: f32, floor: f32) -> f32 {
    if value.abs() < floor {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

// Trigger axes report -1.0..=1.0 on some backends and 0.0..=1.0 on others
fn trigger_magnitude(value: f32, floor: f32) -> f32 {
    let magnitude = if value < 0.0 { (value + 1.0) / 2.0 } else { value };
    apply_noise_floor(magnitude, floor).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_buttons_keep_positional_names() {
        assert_eq!(map_button(Button::West), Some(ButtonType::West));
        assert_eq!(map_button(Button::LeftTrigger), Some(ButtonType::LeftBumper));
        assert_eq!(map_button(Button::DPadLeft), Some(ButtonType::DPadLeft));
        assert_eq!(map_button(Button::LeftTrigger2), None);
    }

    #[test]
    fn noise_floor_zeroes_small_values_without_rescaling() {
        assert_eq!(apply_noise_floor(0.01, 0.02), 0.0);
        assert_eq!(apply_noise_floor(-0.45, 0.02), -0.45);
        assert_eq!(apply_noise_floor(1.3, 0.02), 1.0);
    }

    #[test]
    fn trigger_magnitude_accepts_both_ranges() {
        assert_eq!(trigger_magnitude(-1.0, 0.02), 0.0);
        assert_eq!(trigger_magnitude(0.0, 0.02), 0.0);
        assert_eq!(trigger_magnitude(0.6, 0.02), 0.6);
        assert_eq!(trigger_magnitude(1.0, 0.02), 1.0);
    }

    #[test]
    fn rumble_drives_both_motors_for_the_duration() {
        let effects = rumble_effects(40000, 12000, 50);
        assert_eq!(effects.len(), 2);
        assert!(matches!(
            effects[0].kind,
            BaseEffectType::Strong { magnitude: 40000 }
        ));
        assert!(matches!(effects[1].kind, BaseEffectType::Weak { magnitude: 12000 }));
        assert_eq!(effects[0].scheduling.play_for, Ticks::from_ms(50));
    }
}
