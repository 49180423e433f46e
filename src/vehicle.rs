//! Vehicle runtime
//!
//! Receives intents from the link, applies them to the tracks and reports the
//! applied intent back as the acknowledged state. The lifecycle is a statum
//! typestate machine run by [`VehicleHandle`] in a tokio task.
//!
//! ```text
//! Initializing ──start()──► Running ──run_until_shutdown()──► Stopping ──shutdown()
//! ```
//!
//! Each inbound message is handled synchronously; the kickstart settle is the
//! only deferred actuator write and it is spawned by the actuator port.

use chrono::Local;
use statum::{machine, state};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::movement::dispatcher::MovementDispatcher;
use crate::movement::intent::MovementIntent;
use crate::movement::motion::MotionController;
use crate::movement::wire;
use crate::mqtt::config::{TopicKind, Topics};
use crate::mqtt::link_monitor::LinkMonitor;
use crate::mqtt::message_manager::MqttMessage;
use crate::mqtt::mqtt_handler::{ConnectionState, MqttStatus};
use crate::status::{LinkHealth, VehicleStatus};

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_millis(100);

#[state]
#[derive(Debug, Clone)]
pub enum VehicleState {
    Initializing,
    Running,
    Stopping,
}

#[machine]
pub struct VehicleRuntime<S: VehicleState> {
    motion: MotionController,
    dispatcher: MovementDispatcher,
    link: LinkMonitor,
    topics: Topics,
    inbound: mpsc::Receiver<MqttMessage>,
    mqtt_status: Option<watch::Receiver<MqttStatus>>,
    status: watch::Sender<VehicleStatus>,
    commands_received: u64,
    rejected: u64,
}

impl<S: VehicleState> VehicleRuntime<S> {
    fn publish_status(&self) {
        let connection = self
            .mqtt_status
            .as_ref()
            .map(|rx| rx.borrow().connection_state)
            .unwrap_or(ConnectionState::Disconnected);

        self.status.send_replace(VehicleStatus {
            applied: self.motion.current(),
            powers: self.motion.powers(),
            commands_received: self.commands_received,
            rejected: self.rejected,
            link: LinkHealth::observe(&self.link, connection),
            updated_at: Local::now(),
        });
    }
}

impl VehicleRuntime<Initializing> {
    pub fn create(
        motion: MotionController,
        dispatcher: MovementDispatcher,
        link: LinkMonitor,
        topics: Topics,
        inbound: mpsc::Receiver<MqttMessage>,
        mqtt_status: Option<watch::Receiver<MqttStatus>>,
    ) -> (Self, watch::Receiver<VehicleStatus>) {
        let (status, status_rx) = watch::channel(VehicleStatus::default());
        (
            Self::new(
                motion,
                dispatcher,
                link,
                topics,
                inbound,
                mqtt_status,
                status,
                0, // commands_received
                0, // rejected
            ),
            status_rx,
        )
    }

    /// Parks the tracks and announces STOP before accepting commands
    pub fn start(mut self) -> VehicleRuntime<Running> {
        info!("Vehicle runtime starting with tracks stopped");
        self.motion.emergency_stop();
        self.dispatcher.republish_state(&MovementIntent::stop());
        self.publish_status();
        self.transition()
    }
}

impl VehicleRuntime<Running> {
    /// Subscription callback for messages from the operator
    pub fn handle_message(&mut self, message: &MqttMessage) {
        match self.topics.classify(&message.topic) {
            Some(TopicKind::MovementCommand) => {
                self.link.touch();
                self.commands_received += 1;
                self.apply_command(&message.content);
            }
            Some(TopicKind::ShootCommand) => {
                self.link.touch();
                info!("Shoot command received at {}", message.timestamp.format("%H:%M:%S.%3f"));
            }
            Some(kind) => debug!("Vehicle ignores {:?} message", kind),
            None => debug!("Message on unknown topic '{}'", message.topic),
        }
    }

    fn apply_command(&mut self, text: &str) {
        let decoded = wire::decode(text);
        for issue in &decoded.issues {
            warn!("Intent '{}': {}", text, issue);
        }

        let applied = match self.motion.apply(&decoded.intent) {
            Ok(applied) => applied,
            Err(_) => {
                self.rejected += 1;
                MovementIntent::stop()
            }
        };
        self.dispatcher.republish_state(&applied);
        self.publish_status();
    }

    pub fn current(&self) -> MovementIntent {
        self.motion.current()
    }

    /// Handles messages until the shutdown signal arrives
    pub async fn run_until_shutdown(
        mut self,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> VehicleRuntime<Stopping> {
        info!("Vehicle runtime accepting commands");

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Shutdown signal received for vehicle runtime");
                    break;
                }

                Some(message) = self.inbound.recv() => {
                    self.handle_message(&message);
                }

                _ = tokio::time::sleep(HOUSEKEEPING_INTERVAL) => {
                    // staleness is only reported, never acted on
                    let _ = self.link.check();
                    self.publish_status();
                }
            }
        }

        self.transition()
    }
}

impl VehicleRuntime<Stopping> {
    pub fn shutdown(mut self) {
        info!("Stopping vehicle runtime");
        self.motion.emergency_stop();
        self.dispatcher.republish_state(&MovementIntent::stop());
        self.publish_status();
    }
}

/// Runs a [`VehicleRuntime`] in a tokio task
#[derive(Debug, Default)]
pub struct VehicleHandle {
    task_handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl VehicleHandle {
    pub fn start(runtime: VehicleRuntime<Initializing>) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let running = runtime.start();
        let task_handle = tokio::spawn(async move {
            let stopping = running.run_until_shutdown(shutdown_rx).await;
            stopping.shutdown();
        });

        Self {
            task_handle: Some(task_handle),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Signals shutdown and waits until the tracks are stopped
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            if tx.send(()).is_err() {
                warn!("Vehicle runtime already terminated");
            }
        }

        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                error!("Vehicle runtime task failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::actuator::{ActuatorCall, ActuatorPort, SimulatedActuator};
    use crate::movement::intent::{Gear, Thrust, Turn};
    use crate::movement::kinematics::{KickstartSettings, TrackDirection, TrackSide};
    use crate::mqtt::testing::RecordingPublisher;
    use std::sync::{Arc, Mutex};

    struct Fixture {
        publisher: Arc<RecordingPublisher>,
        history: Arc<Mutex<Vec<ActuatorCall>>>,
        inbound: mpsc::Sender<MqttMessage>,
        status: watch::Receiver<VehicleStatus>,
        runtime: VehicleRuntime<Initializing>,
    }

    fn fixture() -> Fixture {
        let publisher = Arc::new(RecordingPublisher::default());
        let actuator = SimulatedActuator::new();
        let history = actuator.history();
        let kickstart = KickstartSettings::default();
        let port = ActuatorPort::new(Box::new(actuator), kickstart.duration());
        let (inbound, inbound_rx) = mpsc::channel(10);
        let (runtime, status) = VehicleRuntime::create(
            MotionController::new(port, kickstart),
            MovementDispatcher::new(publisher.clone(), Topics::default()),
            LinkMonitor::new(Duration::from_secs(6)),
            Topics::default(),
            inbound_rx,
            None,
        );
        Fixture {
            publisher,
            history,
            inbound,
            status,
            runtime,
        }
    }

    fn command(text: &str) -> MqttMessage {
        MqttMessage::from_topic(Topics::default().movement_command, text)
    }

    fn states(publisher: &RecordingPublisher) -> Vec<String> {
        publisher.on_topic(&Topics::default().movement_state)
    }

    #[tokio::test]
    async fn applies_and_acknowledges_commands() {
        let f = fixture();
        let mut running = f.runtime.start();
        let intent = MovementIntent::curve(
            Thrust::Forward,
            Turn::Right,
            Gear::Gear2,
            crate::movement::intent::CurveRate::Level1,
        );

        running.handle_message(&command(&wire::encode(&intent)));

        assert_eq!(running.current(), intent);
        assert_eq!(
            states(&f.publisher),
            vec![
                wire::encode(&MovementIntent::stop()),
                wire::encode(&intent)
            ]
        );
        let history = f.history.lock().unwrap().clone();
        assert!(history.contains(&ActuatorCall::SetTrack {
            side: TrackSide::Left,
            direction: TrackDirection::Forward,
            power: 80,
        }));
        assert_eq!(f.status.borrow().commands_received, 1);
    }

    #[tokio::test]
    async fn invalid_combination_stops_tracks() {
        let f = fixture();
        let mut running = f.runtime.start();
        running.handle_message(&command(&wire::encode(&MovementIntent::straight(
            Thrust::Backward,
            Gear::Gear3,
        ))));

        // every field is valid on its own but a spin cannot carry thrust
        running.handle_message(&command("forward;left;spin;90;0.00"));

        assert_eq!(running.current(), MovementIntent::stop());
        assert_eq!(
            states(&f.publisher).last(),
            Some(&wire::encode(&MovementIntent::stop()))
        );
        let history = f.history.lock().unwrap().clone();
        for call in &history[history.len() - 2..] {
            assert!(matches!(call, ActuatorCall::SetTrack { power: 0, .. }), "{call:?}");
        }
    }

    #[tokio::test]
    async fn garbage_never_moves_the_vehicle() {
        let f = fixture();
        let mut running = f.runtime.start();
        running.handle_message(&command("sideways;;;;"));
        running.handle_message(&command(""));
        assert_eq!(running.current(), MovementIntent::stop());
    }

    #[tokio::test]
    async fn handle_runs_until_shutdown() {
        let f = fixture();
        let mut handle = VehicleHandle::start(f.runtime);
        let intent = MovementIntent::straight(Thrust::Forward, Gear::Gear4);

        f.inbound
            .send(command(&wire::encode(&intent)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(f.status.borrow().applied, intent);

        handle.shutdown().await;
        assert_eq!(f.status.borrow().applied, MovementIntent::stop());
        assert_eq!(f.history.lock().unwrap().last(), Some(&ActuatorCall::StopAll));
    }
}
