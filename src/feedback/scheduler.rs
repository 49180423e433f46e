//! Priority-preemptible feedback scheduler
//!
//! Owns at most one discrete animation task and at most one continuous rumble
//! task. Each task gets its own [`CancellationToken`]; replacing a task cancels
//! it and waits a bounded time for it to exit. A task that misses the deadline
//! is left to finish on its own and the replacement starts anyway.
//!
//! ```text
//!            start (admitted)
//!   Idle ───────────────────────► Running(animation)
//!    ▲                                 │
//!    └─────── finished / interrupted ──┘
//! ```

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::animation::{FeedbackAnimation, Priority};
use super::effects::{self, FeedbackEvent, BATTERY_ANIMATIONS};
use super::renderer::{HapticError, HapticRenderer};
use super::rumble::{RumbleProfile, RumbleSettings};
use crate::movement::intent::{MovementIntent, Rgb};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackSettings {
    /// Upper bound on waiting for an interrupted task to exit
    pub join_timeout_ms: u64,
    pub flag_capture_secs: u64,
    pub initial_color: Rgb,
    pub rumble: RumbleSettings,
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self {
            join_timeout_ms: 500,
            flag_capture_secs: effects::FLAG_CAPTURE_DURATION.as_secs(),
            initial_color: Rgb::WHITE,
            rumble: RumbleSettings::default(),
        }
    }
}

impl FeedbackSettings {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    #[default]
    Idle,
    Running { name: String, priority: Priority },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub animation: SchedulerState,
    pub rumble_active: bool,
    pub persistent_color: Rgb,
}

struct AnimationTask {
    name: String,
    priority: Priority,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct RumbleTask {
    intent: MovementIntent,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct FeedbackScheduler {
    renderer: Arc<dyn HapticRenderer>,
    settings: FeedbackSettings,
    persistent_color: Arc<StdMutex<Rgb>>,
    animation: Mutex<Option<AnimationTask>>,
    rumble: Mutex<Option<RumbleTask>>,
}

impl FeedbackScheduler {
    pub fn new(renderer: Arc<dyn HapticRenderer>, settings: FeedbackSettings) -> Self {
        let initial = settings.initial_color;
        log_haptic(renderer.set_color(initial));
        Self {
            renderer,
            settings,
            persistent_color: Arc::new(StdMutex::new(initial)),
            animation: Mutex::new(None),
            rumble: Mutex::new(None),
        }
    }

    /// Starts `animation` if admitted; returns `false` when a higher priority
    /// animation is running and `force` is not set
    pub async fn start(&self, animation: FeedbackAnimation, force: bool) -> bool {
        let mut slot = self.animation.lock().await;

        if let Some(running) = slot.as_ref().filter(|task| !task.handle.is_finished()) {
            if !force && animation.priority < running.priority {
                debug!(
                    "Rejected '{}' ({}) while '{}' ({}) runs",
                    animation.name, animation.priority, running.name, running.priority
                );
                return false;
            }
            info!(
                "'{}' ({}) interrupts '{}' ({})",
                animation.name, animation.priority, running.name, running.priority
            );
        }

        if let Some(previous) = slot.take() {
            interrupt(&previous.name, previous.token, previous.handle, self.settings.join_timeout()).await;
        }

        let token = CancellationToken::new();
        let name = animation.name.clone();
        let priority = animation.priority;
        let handle = tokio::spawn(run_animation(
            animation,
            self.renderer.clone(),
            self.persistent_color.clone(),
            token.clone(),
        ));

        *slot = Some(AnimationTask {
            name,
            priority,
            token,
            handle,
        });
        true
    }

    /// Interrupts the running animation, if any
    pub async fn stop_animation(&self) {
        let previous = self.animation.lock().await.take();
        if let Some(task) = previous {
            interrupt(&task.name, task.token, task.handle, self.settings.join_timeout()).await;
        }
    }

    /// Interrupts the running animation only if its name is in `names`
    pub async fn stop_animation_named(&self, names: &[&str]) -> bool {
        let mut slot = self.animation.lock().await;
        let matches = slot
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished() && names.contains(&task.name.as_str()));
        if !matches {
            return false;
        }
        if let Some(task) = slot.take() {
            interrupt(&task.name, task.token, task.handle, self.settings.join_timeout()).await;
        }
        true
    }

    /// Starts, restarts or stops the continuous rumble for the movement state
    pub async fn update_movement(&self, intent: &MovementIntent) {
        let mut slot = self.rumble.lock().await;

        if let Some(task) = slot.as_ref() {
            if task.intent == *intent && !task.handle.is_finished() {
                return;
            }
        }

        if let Some(task) = slot.take() {
            interrupt("rumble", task.token, task.handle, self.settings.join_timeout()).await;
        }

        if intent.is_stop() {
            log_haptic(self.renderer.stop_rumble());
            return;
        }

        debug!("Continuous rumble for {}", intent);
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_rumble(
            RumbleProfile::new(intent, &self.settings.rumble),
            self.settings.rumble.clone(),
            self.renderer.clone(),
            token.clone(),
        ));
        *slot = Some(RumbleTask {
            intent: *intent,
            token,
            handle,
        });
    }

    /// Stops the continuous rumble loop
    pub async fn stop_rumble(&self) {
        self.update_movement(&MovementIntent::stop()).await;
    }

    /// Stops every task and restores the persistent color
    pub async fn stop_all(&self) {
        info!("Stopping all feedback");
        self.stop_animation().await;
        self.stop_rumble().await;
        log_haptic(self.renderer.set_color(self.persistent_color()));
    }

    /// Maps a catalog event onto an animation; returns whether it was admitted
    pub async fn handle_event(&self, event: FeedbackEvent) -> bool {
        debug!("Feedback event {:?}", event);
        match event {
            FeedbackEvent::SpeedChanged(gear) => {
                self.set_persistent_color(gear.color());
                self.start(effects::speed_change(gear), false).await
            }
            FeedbackEvent::GearOutOfBound => {
                let color = self.persistent_color();
                self.start(effects::gear_out_of_bound(color), false).await
            }
            FeedbackEvent::Shoot => self.start(effects::shoot(), false).await,
            FeedbackEvent::Hit { shooter } => {
                info!("Hit by {}", shooter);
                let color = self.persistent_color();
                self.start(effects::hit(color), false).await
            }
            FeedbackEvent::FlagCaptureStarted => {
                let duration = Duration::from_secs(self.settings.flag_capture_secs);
                self.start(effects::flag_capture_started(duration), false).await
            }
            FeedbackEvent::FlagCaptured => self.start(effects::flag_captured(), false).await,
            FeedbackEvent::FlagCaptureFailed => {
                self.start(effects::flag_capture_failed(), false).await
            }
            FeedbackEvent::PivotToggled { .. } => self.start(effects::pivot_toggle(), false).await,
            FeedbackEvent::TeamColor(color) => {
                self.set_persistent_color(color);
                if matches!(self.state().await, SchedulerState::Idle) {
                    log_haptic(self.renderer.set_color(color));
                }
                true
            }
            FeedbackEvent::Battery(level) => match effects::battery(level) {
                Some(animation) => {
                    if self.running_name().await.as_deref() == Some(animation.name.as_str()) {
                        return true;
                    }
                    warn!("Battery at {}%", level);
                    self.start(animation, false).await
                }
                None => {
                    if self.stop_animation_named(&BATTERY_ANIMATIONS).await {
                        info!("Battery recovered to {}%", level);
                    }
                    false
                }
            },
        }
    }

    pub fn persistent_color(&self) -> Rgb {
        *self
            .persistent_color
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Changes the color restored after transient animations
    pub fn set_persistent_color(&self, color: Rgb) {
        let mut slot = self
            .persistent_color
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = color;
    }

    pub async fn state(&self) -> SchedulerState {
        match self.animation.lock().await.as_ref() {
            Some(task) if !task.handle.is_finished() => SchedulerState::Running {
                name: task.name.clone(),
                priority: task.priority,
            },
            _ => SchedulerState::Idle,
        }
    }

    pub async fn rumble_active(&self) -> bool {
        self.rumble
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            animation: self.state().await,
            rumble_active: self.rumble_active().await,
            persistent_color: self.persistent_color(),
        }
    }

    async fn running_name(&self) -> Option<String> {
        match self.state().await {
            SchedulerState::Running { name, .. } => Some(name),
            SchedulerState::Idle => None,
        }
    }
}

/// Cancels a task and waits up to `timeout` for it to exit; never aborts it
async fn interrupt(name: &str, token: CancellationToken, handle: JoinHandle<()>, timeout: Duration) {
    token.cancel();
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(())) => debug!("'{}' stopped", name),
        Ok(Err(e)) => error!("'{}' task failed: {}", name, e),
        Err(_) => warn!("'{}' did not stop within {:?}, starting replacement anyway", name, timeout),
    }
}

async fn run_animation(
    animation: FeedbackAnimation,
    renderer: Arc<dyn HapticRenderer>,
    persistent_color: Arc<StdMutex<Rgb>>,
    token: CancellationToken,
) {
    debug!("Animation '{}' started", animation.name);
    let mut pass = 0u32;

    let interrupted = 'run: loop {
        if animation.steps.is_empty() {
            break false;
        }
        for step in &animation.steps {
            if let Some(color) = step.color {
                log_haptic(renderer.set_color(color));
            }
            if let Some((low, high)) = step.rumble {
                let duration_ms = u32::try_from(step.duration.as_millis()).unwrap_or(u32::MAX);
                log_haptic(renderer.set_rumble(low, high, duration_ms));
            }
            tokio::select! {
                _ = token.cancelled() => break 'run true,
                _ = tokio::time::sleep(step.duration) => {}
            }
        }
        pass += 1;
        if !animation.is_infinite() && pass >= animation.loop_count {
            break false;
        }
    };

    if animation.uses_rumble() {
        log_haptic(renderer.stop_rumble());
    }
    if animation.restore_color_on_finish {
        let color = *persistent_color
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        log_haptic(renderer.set_color(color));
    }
    debug!(
        "Animation '{}' {}",
        animation.name,
        if interrupted { "interrupted" } else { "finished" }
    );
}

async fn run_rumble(
    profile: RumbleProfile,
    settings: RumbleSettings,
    renderer: Arc<dyn HapticRenderer>,
    token: CancellationToken,
) {
    let (kick_left, kick_right) = profile.kick();
    log_haptic(renderer.set_rumble(kick_left, kick_right, settings.kick_ms as u32));

    let cancelled = tokio::select! {
        _ = token.cancelled() => true,
        _ = tokio::time::sleep(Duration::from_millis(settings.kick_ms)) => false,
    };

    if !cancelled {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(Duration::from_millis(settings.tick_ms.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let (left, right) = profile.sample(started.elapsed().as_secs_f32());
                    log_haptic(renderer.set_rumble(left, right, settings.sample_duration_ms));
                }
            }
        }
    }

    log_haptic(renderer.stop_rumble());
    debug!("Rumble for {} stopped", profile.intent());
}

fn log_haptic(result: Result<(), HapticError>) {
    match result {
        Ok(()) => {}
        Err(HapticError::QueueFull(command)) => debug!("Haptic queue full, dropped {}", command),
        Err(e) => warn!("Haptic output failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::animation::AnimationStep;
    use crate::feedback::renderer::testing::RecordingRenderer;
    use crate::feedback::renderer::HapticCommand;
    use crate::movement::intent::{Gear, Thrust, Turn};

    fn scheduler() -> (Arc<RecordingRenderer>, FeedbackScheduler) {
        let renderer = Arc::new(RecordingRenderer::default());
        let scheduler = FeedbackScheduler::new(renderer.clone(), FeedbackSettings::default());
        (renderer, scheduler)
    }

    fn held(name: &str, priority: Priority, color: Rgb) -> FeedbackAnimation {
        FeedbackAnimation::new(name, priority).step(AnimationStep::color(color, 2000))
    }

    fn running(state: SchedulerState) -> Option<(String, Priority)> {
        match state {
            SchedulerState::Running { name, priority } => Some((name, priority)),
            SchedulerState::Idle => None,
        }
    }

    #[tokio::test]
    async fn idle_scheduler_admits_and_returns_to_idle() {
        let (renderer, scheduler) = scheduler();
        assert_eq!(scheduler.state().await, SchedulerState::Idle);

        let blink = FeedbackAnimation::new("blink", Priority::Low).step(AnimationStep::color(Rgb::GREEN, 30));
        assert!(scheduler.start(blink, false).await);
        assert_eq!(running(scheduler.state().await).unwrap().0, "blink");

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(scheduler.state().await, SchedulerState::Idle);
        assert_eq!(renderer.colors(), vec![Rgb::WHITE, Rgb::GREEN, Rgb::WHITE]);
    }

    #[tokio::test]
    async fn higher_priority_preempts_lower() {
        let (renderer, scheduler) = scheduler();
        assert!(scheduler.start(held("low", Priority::Low, Rgb::GREEN), false).await);
        assert!(scheduler.start(held("high", Priority::High, Rgb::RED), false).await);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(
            running(scheduler.state().await),
            Some(("high".to_string(), Priority::High))
        );
        // the interrupted animation restored the persistent color before red
        assert_eq!(
            renderer.colors(),
            vec![Rgb::WHITE, Rgb::GREEN, Rgb::WHITE, Rgb::RED]
        );
        scheduler.stop_all().await;
    }

    #[tokio::test]
    async fn lower_priority_is_rejected_without_side_effects() {
        let (renderer, scheduler) = scheduler();
        assert!(scheduler.start(held("high", Priority::High, Rgb::RED), false).await);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let before = renderer.commands();

        assert!(!scheduler.start(held("low", Priority::Low, Rgb::GREEN), false).await);
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(renderer.commands(), before);
        assert_eq!(running(scheduler.state().await).unwrap().0, "high");
        scheduler.stop_all().await;
    }

    #[tokio::test]
    async fn equal_priority_and_force_are_admitted() {
        let (_, scheduler) = scheduler();
        assert!(scheduler.start(held("a", Priority::Normal, Rgb::RED), false).await);
        assert!(scheduler.start(held("b", Priority::Normal, Rgb::GREEN), false).await);
        assert!(scheduler.start(held("c", Priority::Critical, Rgb::RED), false).await);
        assert!(scheduler.start(held("d", Priority::Low, Rgb::GREEN), true).await);
        assert_eq!(running(scheduler.state().await).unwrap().0, "d");
        scheduler.stop_all().await;
    }

    #[tokio::test]
    async fn transient_effects_restore_persistent_color() {
        let (renderer, scheduler) = scheduler();
        assert!(scheduler.handle_event(FeedbackEvent::SpeedChanged(Gear::Gear4)).await);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(scheduler.persistent_color(), Gear::Gear4.color());

        assert!(scheduler.handle_event(FeedbackEvent::Shoot).await);
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(scheduler.persistent_color(), Gear::Gear4.color());
        assert_eq!(renderer.last_color(), Some(Gear::Gear4.color()));
        assert!(renderer.colors().contains(&Rgb::RED));
    }

    #[tokio::test]
    async fn team_color_persists_and_renders_when_idle() {
        let (renderer, scheduler) = scheduler();
        assert!(scheduler.handle_event(FeedbackEvent::TeamColor(Rgb::BLUE)).await);
        assert_eq!(renderer.last_color(), Some(Rgb::BLUE));
        assert_eq!(scheduler.persistent_color(), Rgb::BLUE);
    }

    #[tokio::test]
    async fn battery_warning_loops_until_recovery() {
        let (_, scheduler) = scheduler();
        assert!(scheduler.handle_event(FeedbackEvent::Battery(18)).await);
        assert!(scheduler.handle_event(FeedbackEvent::Battery(17)).await);
        assert_eq!(running(scheduler.state().await).unwrap().0, "battery_low");

        // lower priority events cannot interrupt the warning
        assert!(!scheduler.handle_event(FeedbackEvent::Shoot).await);

        assert!(scheduler.handle_event(FeedbackEvent::Battery(8)).await);
        assert_eq!(
            running(scheduler.state().await),
            Some(("battery_critical".to_string(), Priority::Critical))
        );

        assert!(!scheduler.handle_event(FeedbackEvent::Battery(80)).await);
        assert_eq!(scheduler.state().await, SchedulerState::Idle);
    }

    #[tokio::test]
    async fn movement_drives_a_single_rumble_loop() {
        let (renderer, scheduler) = scheduler();
        let forward = MovementIntent::straight(Thrust::Forward, Gear::Gear2);

        scheduler.update_movement(&forward).await;
        scheduler.update_movement(&forward).await;
        assert!(scheduler.rumble_active().await);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(renderer.rumble_count() > 5);

        let spin = MovementIntent::in_place(Turn::Left, false, Gear::Gear2);
        scheduler.update_movement(&spin).await;
        assert!(scheduler.rumble_active().await);

        scheduler.update_movement(&MovementIntent::stop()).await;
        assert!(!scheduler.rumble_active().await);

        renderer.clear();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(renderer.rumble_count(), 0);
    }

    #[tokio::test]
    async fn stop_all_halts_everything() {
        let (renderer, scheduler) = scheduler();
        scheduler
            .update_movement(&MovementIntent::straight(Thrust::Backward, Gear::Gear1))
            .await;
        scheduler.start(held("long", Priority::Normal, Rgb::PURPLE), false).await;

        scheduler.stop_all().await;
        let status = scheduler.status().await;
        assert_eq!(status.animation, SchedulerState::Idle);
        assert!(!status.rumble_active);
        assert_eq!(renderer.last_color(), Some(Rgb::WHITE));
        assert!(renderer.commands().contains(&HapticCommand::StopRumble));
    }

    #[tokio::test]
    async fn unresponsive_task_does_not_block_interrupt() {
        let token = CancellationToken::new();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        let started = std::time::Instant::now();
        interrupt("stuck", token, handle, Duration::from_millis(50)).await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn infinite_animation_runs_until_interrupted() {
        let (_, scheduler) = scheduler();
        let pulse = FeedbackAnimation::new("pulse", Priority::Low)
            .step(AnimationStep::color(Rgb::RED, 10))
            .step(AnimationStep::color(Rgb::OFF, 10))
            .looping(0);
        scheduler.start(pulse, false).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(scheduler.stop_animation_named(&["pulse"]).await);
        assert_eq!(scheduler.state().await, SchedulerState::Idle);
    }
}
