//! Discrete feedback animations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::movement::intent::Rgb;

/// Admission priority; a running animation can only be replaced by an equal or
/// higher priority unless the start is forced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Low => "LOW",
            Priority::Normal => "NORMAL",
            Priority::High => "HIGH",
            Priority::Critical => "CRITICAL",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationStep {
    pub duration: Duration,
    pub color: Option<Rgb>,
    /// Low/high motor intensities held for the step
    pub rumble: Option<(u16, u16)>,
}

impl AnimationStep {
    pub fn wait(ms: u64) -> Self {
        Self {
            duration: Duration::from_millis(ms),
            color: None,
            rumble: None,
        }
    }

    pub fn color(color: Rgb, ms: u64) -> Self {
        Self {
            color: Some(color),
            ..Self::wait(ms)
        }
    }

    pub fn with_rumble(mut self, low: u16, high: u16) -> Self {
        self.rumble = Some((low, high));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackAnimation {
    pub name: String,
    pub priority: Priority,
    pub steps: Vec<AnimationStep>,
    /// Number of passes over `steps`; 0 repeats until interrupted
    pub loop_count: u32,
    pub restore_color_on_finish: bool,
}

impl FeedbackAnimation {
    pub fn new(name: impl Into<String>, priority: Priority) -> Self {
        Self {
            name: name.into(),
            priority,
            steps: Vec::new(),
            loop_count: 1,
            restore_color_on_finish: true,
        }
    }

    pub fn step(mut self, step: AnimationStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = AnimationStep>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn looping(mut self, loop_count: u32) -> Self {
        self.loop_count = loop_count;
        self
    }

    pub fn is_infinite(&self) -> bool {
        self.loop_count == 0
    }

    pub fn uses_rumble(&self) -> bool {
        self.steps.iter().any(|s| s.rumble.is_some())
    }

    /// Length of one full run, `None` when looping forever
    pub fn total_duration(&self) -> Option<Duration> {
        if self.is_infinite() {
            return None;
        }
        let pass: Duration = self.steps.iter().map(|s| s.duration).sum();
        Some(pass * self.loop_count)
    }
}
