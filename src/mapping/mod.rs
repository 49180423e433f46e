//! Mapping from gamepad events to translator inputs
//!
//! | Gamepad          | Input                      |
//! |------------------|----------------------------|
//! | Left stick       | `Joystick { x, y }`        |
//! | L2 / R2          | backward / forward trigger |
//! | L1 / R1          | gear down / gear up        |
//! | West (Square)    | shoot                      |
//! | East (Circle)    | toggle pivot mode          |
//! | D-pad            | discrete direction         |
//!
//! Everything else is ignored.

pub mod translator;

pub use translator::{
    ControlButton, ControlInput, DPadDirection, InputTranslator, TranslatorEvent,
    TranslatorSettings, TriggerSide,
};

use crate::controller::event_collector::{
    ButtonState, ButtonType, JoystickType, RawControllerEvent, TriggerType,
};

pub fn to_control_input(event: &RawControllerEvent) -> Option<ControlInput> {
    match event {
        RawControllerEvent::JoystickMove {
            stick: JoystickType::Left,
            x,
            y,
            ..
        } => Some(ControlInput::Joystick { x: *x, y: *y }),
        RawControllerEvent::JoystickMove { .. } => None,
        RawControllerEvent::TriggerMove { trigger, value, .. } => Some(ControlInput::Trigger {
            side: match trigger {
                TriggerType::Left => TriggerSide::Left,
                TriggerType::Right => TriggerSide::Right,
            },
            value: *value,
        }),
        RawControllerEvent::ButtonEvent {
            button_type,
            button_state,
            ..
        } => {
            let pressed = *button_state == ButtonState::Pressed;
            let button = match button_type {
                ButtonType::LeftBumper => ControlButton::GearDown,
                ButtonType::RightBumper => ControlButton::GearUp,
                ButtonType::West => ControlButton::Shoot,
                ButtonType::East => ControlButton::TogglePivot,
                ButtonType::DPadUp => return dpad(DPadDirection::Up, pressed),
                ButtonType::DPadDown => return dpad(DPadDirection::Down, pressed),
                ButtonType::DPadLeft => return dpad(DPadDirection::Left, pressed),
                ButtonType::DPadRight => return dpad(DPadDirection::Right, pressed),
                _ => return None,
            };
            Some(ControlInput::Button { button, pressed })
        }
        RawControllerEvent::ConnectionChanged { .. } => None,
    }
}

/// Inputs that return every analog and D-pad source to rest, fed when the
/// gamepad disconnects
pub fn neutral_inputs() -> Vec<ControlInput> {
    let mut inputs = vec![
        ControlInput::Joystick { x: 0.0, y: 0.0 },
        ControlInput::Trigger {
            side: TriggerSide::Left,
            value: 0.0,
        },
        ControlInput::Trigger {
            side: TriggerSide::Right,
            value: 0.0,
        },
    ];
    inputs.extend(
        [
            DPadDirection::Up,
            DPadDirection::Down,
            DPadDirection::Left,
            DPadDirection::Right,
        ]
        .into_iter()
        .map(|direction| ControlInput::DPad {
            direction,
            pressed: false,
        }),
    );
    inputs
}

fn dpad(direction: DPadDirection, pressed: bool) -> Option<ControlInput> {
    Some(ControlInput::DPad { direction, pressed })
}
