//! Event catalog
//!
//! Every discrete event maps to one short [`FeedbackAnimation`]. Game events
//! arrive from the vehicle as `event;param` text.

use std::time::Duration;
use tracing::warn;

use super::animation::{AnimationStep, FeedbackAnimation, Priority};
use crate::movement::intent::{Gear, Rgb};

pub const BATTERY_WARNING_LEVEL: u8 = 20;
pub const BATTERY_CRITICAL_LEVEL: u8 = 10;
pub const FLAG_CAPTURE_DURATION: Duration = Duration::from_secs(5);

pub const BATTERY_ANIMATIONS: [&str; 2] = ["battery_low", "battery_critical"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackEvent {
    SpeedChanged(Gear),
    GearOutOfBound,
    Shoot,
    Hit { shooter: String },
    FlagCaptureStarted,
    FlagCaptured,
    FlagCaptureFailed,
    PivotToggled { pivot: bool },
    TeamColor(Rgb),
    Battery(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameEventError {
    #[error("empty game event")]
    Empty,

    #[error("unknown game event '{0}'")]
    Unknown(String),

    #[error("invalid parameter '{param}' for game event '{event}'")]
    InvalidParameter { event: String, param: String },
}

/// Parses `hit_by_ir;<shooter>`, `capturing_flag;started|captured|failed`,
/// `team;<color>` and `battery;<percent>`
pub fn parse_game_event(text: &str) -> Result<FeedbackEvent, GameEventError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(GameEventError::Empty);
    }

    let (event, param) = match text.split_once(';') {
        Some((event, param)) => (event.trim(), param.trim()),
        None => (text, ""),
    };
    let invalid = || GameEventError::InvalidParameter {
        event: event.to_string(),
        param: param.to_string(),
    };

    match event {
        "hit_by_ir" => Ok(FeedbackEvent::Hit {
            shooter: if param.is_empty() {
                "unknown".to_string()
            } else {
                param.to_string()
            },
        }),
        "capturing_flag" => match param {
            "started" => Ok(FeedbackEvent::FlagCaptureStarted),
            "captured" => Ok(FeedbackEvent::FlagCaptured),
            "failed" => Ok(FeedbackEvent::FlagCaptureFailed),
            _ => Err(invalid()),
        },
        "team" => match param.to_lowercase().as_str() {
            "blue" => Ok(FeedbackEvent::TeamColor(Rgb::BLUE)),
            "red" => Ok(FeedbackEvent::TeamColor(Rgb::RED)),
            "" => Err(invalid()),
            other => {
                warn!("Unknown team color '{}', using blue", other);
                Ok(FeedbackEvent::TeamColor(Rgb::BLUE))
            }
        },
        "battery" => param
            .trim_end_matches('%')
            .parse::<u8>()
            .map(|level| FeedbackEvent::Battery(level.min(100)))
            .map_err(|_| invalid()),
        other => Err(GameEventError::Unknown(other.to_string())),
    }
}

/// Short confirmation in the new gear's color
pub fn speed_change(gear: Gear) -> FeedbackAnimation {
    FeedbackAnimation::new("speed_change", Priority::Normal)
        .step(AnimationStep::color(gear.color(), 150).with_rumble(15000, 15000))
}

/// Two hard flashes of the current color
pub fn gear_out_of_bound(color: Rgb) -> FeedbackAnimation {
    let mut anim = FeedbackAnimation::new("gear_out_of_bound", Priority::Normal)
        .step(AnimationStep::color(color, 150).with_rumble(u16::MAX, u16::MAX));
    for _ in 0..2 {
        anim = anim
            .step(AnimationStep::color(Rgb::OFF, 150).with_rumble(0, 0))
            .step(AnimationStep::color(color, 150).with_rumble(u16::MAX, u16::MAX));
    }
    anim.step(AnimationStep::wait(100))
}

pub fn shoot() -> FeedbackAnimation {
    FeedbackAnimation::new("shoot", Priority::Normal)
        .step(AnimationStep::color(Rgb::RED, 150).with_rumble(50000, 50000))
}

/// Red fading back to `restore` over 1.5 s while the rumble decays
pub fn hit(restore: Rgb) -> FeedbackAnimation {
    const CYCLES: u32 = 10;
    let steps = (0..CYCLES).flat_map(|i| {
        let progress = i as f32 / CYCLES as f32;
        let strength = (f32::from(u16::MAX) * (1.0 - progress)) as u16;
        [
            AnimationStep::color(Rgb::RED.blend(restore, progress), 100)
                .with_rumble(strength, strength),
            AnimationStep::color(Rgb::OFF, 50),
        ]
    });
    FeedbackAnimation::new("hit", Priority::High).steps(steps)
}

/// Purple blinking for the duration of the capture
pub fn flag_capture_started(duration: Duration) -> FeedbackAnimation {
    let period = Duration::from_millis(200);
    let loops = (duration.as_millis() / period.as_millis()).max(1) as u32;
    FeedbackAnimation::new("flag_capture", Priority::High)
        .step(AnimationStep::color(Rgb::PURPLE, 100).with_rumble(20000, 20000))
        .step(AnimationStep::color(Rgb::OFF, 100).with_rumble(0, 0))
        .looping(loops)
}

pub fn flag_captured() -> FeedbackAnimation {
    let mut anim = FeedbackAnimation::new("flag_captured", Priority::High)
        .step(AnimationStep::color(Rgb::GREEN, 100).with_rumble(u16::MAX, u16::MAX));
    for _ in 0..4 {
        anim = anim
            .step(AnimationStep::color(Rgb::OFF, 100).with_rumble(0, 0))
            .step(AnimationStep::color(Rgb::GREEN, 100).with_rumble(u16::MAX, u16::MAX));
    }
    anim
}

pub fn flag_capture_failed() -> FeedbackAnimation {
    FeedbackAnimation::new("flag_capture_failed", Priority::High)
        .step(AnimationStep::color(Rgb::RED, 200).with_rumble(u16::MAX, u16::MAX))
        .step(AnimationStep::color(Rgb::OFF, 100))
        .step(AnimationStep::color(Rgb::RED, 300).with_rumble(u16::MAX, u16::MAX))
}

pub fn pivot_toggle() -> FeedbackAnimation {
    let mut anim = FeedbackAnimation::new("pivot_mode", Priority::Normal)
        .step(AnimationStep::color(Rgb::YELLOW, 100).with_rumble(30000, 30000));
    for _ in 0..3 {
        anim = anim
            .step(AnimationStep::color(Rgb::OFF, 50).with_rumble(0, 0))
            .step(AnimationStep::color(Rgb::YELLOW, 100).with_rumble(30000, 30000));
    }
    anim
}

/// Looping orange pulse, runs until the level recovers
pub fn battery_low() -> FeedbackAnimation {
    FeedbackAnimation::new(BATTERY_ANIMATIONS[0], Priority::High)
        .step(AnimationStep::color(Rgb::ORANGE, 1000))
        .step(AnimationStep::color(Rgb(50, 25, 0), 1000))
        .looping(0)
}

/// Looping fast red flash, runs until the level recovers
pub fn battery_critical() -> FeedbackAnimation {
    FeedbackAnimation::new(BATTERY_ANIMATIONS[1], Priority::Critical)
        .step(AnimationStep::color(Rgb::RED, 300))
        .step(AnimationStep::color(Rgb(50, 0, 0), 300))
        .looping(0)
}

/// Battery animation for `level`, `None` when no warning is due
pub fn battery(level: u8) -> Option<FeedbackAnimation> {
    if level <= BATTERY_CRITICAL_LEVEL {
        Some(battery_critical())
    } else if level <= BATTERY_WARNING_LEVEL {
        Some(battery_low())
    } else {
        None
    }
}
