//! Operator station runtime
//!
//! A single loop owns the translator and therefore the operator-side intent slot.
//! Every tick it drains gamepad events and inbound link messages, then retries a
//! pending publish, checks the link and refreshes the status snapshot.
//!
//! ```text
//! RawControllerEvent ──► InputTranslator ──► TranslatorEvent ─┬─► MovementDispatcher ──► link
//!                                                             └─► FeedbackScheduler ──► gamepad
//! link (state, game events) ──────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;
use chrono::Local;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controller::event_collector::RawControllerEvent;
use crate::feedback::effects::{self, FeedbackEvent};
use crate::feedback::scheduler::FeedbackScheduler;
use crate::mapping::translator::{ControlInput, InputTranslator, TranslatorEvent};
use crate::mapping::{neutral_inputs, to_control_input};
use crate::movement::dispatcher::MovementDispatcher;
use crate::movement::intent::MovementIntent;
use crate::mqtt::config::{TopicKind, Topics};
use crate::mqtt::link_monitor::LinkMonitor;
use crate::mqtt::message_manager::MqttMessage;
use crate::mqtt::mqtt_handler::{ConnectionState, MqttStatus};
use crate::status::{LinkHealth, OperatorStatus};

pub struct Operator {
    translator: InputTranslator,
    dispatcher: MovementDispatcher,
    scheduler: Arc<FeedbackScheduler>,
    link: LinkMonitor,
    topics: Topics,
    mqtt_status: Option<watch::Receiver<MqttStatus>>,
    status: watch::Sender<OperatorStatus>,
}

impl Operator {
    pub fn new(
        translator: InputTranslator,
        dispatcher: MovementDispatcher,
        scheduler: Arc<FeedbackScheduler>,
        link: LinkMonitor,
        topics: Topics,
    ) -> (Self, watch::Receiver<OperatorStatus>) {
        let initial = OperatorStatus {
            intent: translator.current_intent(),
            last_published: None,
            acknowledged: None,
            gear: translator.gear(),
            pivot_mode: translator.pivot_mode(),
            feedback: Default::default(),
            link: LinkHealth::default(),
            updated_at: Local::now(),
        };
        let (status, status_rx) = watch::channel(initial);
        (
            Self {
                translator,
                dispatcher,
                scheduler,
                link,
                topics,
                mqtt_status: None,
                status,
            },
            status_rx,
        )
    }

    /// Reports the broker connection state in the status snapshot
    pub fn with_mqtt_status(mut self, mqtt_status: watch::Receiver<MqttStatus>) -> Self {
        self.mqtt_status = Some(mqtt_status);
        self
    }

    pub fn current_intent(&self) -> MovementIntent {
        self.translator.current_intent()
    }

    pub async fn handle_raw_event(&mut self, event: &RawControllerEvent) {
        if let RawControllerEvent::ConnectionChanged {
            connected: false, ..
        } = event
        {
            warn!("Gamepad lost, returning all inputs to rest");
            for input in neutral_inputs() {
                self.handle_input(input).await;
            }
            return;
        }

        if let Some(input) = to_control_input(event) {
            self.handle_input(input).await;
        }
    }

    pub async fn handle_input(&mut self, input: ControlInput) {
        for event in self.translator.handle(input) {
            self.handle_translator_event(event).await;
        }
    }

    async fn handle_translator_event(&mut self, event: TranslatorEvent) {
        match event {
            TranslatorEvent::Intent(intent) => {
                self.dispatcher.dispatch(intent);
                self.scheduler.update_movement(&intent).await;
            }
            TranslatorEvent::GearChanged { gear, .. } => {
                self.scheduler
                    .handle_event(FeedbackEvent::SpeedChanged(gear))
                    .await;
            }
            TranslatorEvent::GearOutOfBound { .. } => {
                self.scheduler.handle_event(FeedbackEvent::GearOutOfBound).await;
            }
            TranslatorEvent::PivotModeChanged { pivot } => {
                self.scheduler
                    .handle_event(FeedbackEvent::PivotToggled { pivot })
                    .await;
            }
            TranslatorEvent::Shoot => {
                self.dispatcher.shoot();
                self.scheduler.handle_event(FeedbackEvent::Shoot).await;
            }
        }
    }

    /// Subscription callback for messages from the vehicle
    pub async fn handle_message(&mut self, message: &MqttMessage) {
        match self.topics.classify(&message.topic) {
            Some(TopicKind::MovementState) => {
                self.link.touch();
                let acknowledged = self.dispatcher.on_state_message(&message.content);
                debug!("Vehicle acknowledged {}", acknowledged);
            }
            Some(TopicKind::GameEvent) => {
                self.link.touch();
                match effects::parse_game_event(&message.content) {
                    Ok(event) => {
                        self.scheduler.handle_event(event).await;
                    }
                    Err(e) => warn!("Ignoring game event: {}", e),
                }
            }
            Some(kind) => debug!("Operator ignores {:?} message", kind),
            None => debug!("Message on unknown topic '{}'", message.topic),
        }
    }

    /// Periodic housekeeping after the inputs of one tick are handled
    pub async fn tick(&mut self) {
        self.dispatcher.flush();
        // staleness is only reported, never acted on
        let _ = self.link.check();
        self.publish_status().await;
    }

    async fn publish_status(&self) {
        let connection = self
            .mqtt_status
            .as_ref()
            .map(|rx| rx.borrow().connection_state)
            .unwrap_or(ConnectionState::Disconnected);

        self.status.send_replace(OperatorStatus {
            intent: self.translator.current_intent(),
            last_published: self.dispatcher.last_published(),
            acknowledged: self.dispatcher.acknowledged(),
            gear: self.translator.gear(),
            pivot_mode: self.translator.pivot_mode(),
            feedback: self.scheduler.status().await,
            link: LinkHealth::observe(&self.link, connection),
            updated_at: Local::now(),
        });
    }

    /// Runs the input loop until `token` is cancelled, then stops the vehicle
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<RawControllerEvent>,
        mut inbound: mpsc::Receiver<MqttMessage>,
        tick: Duration,
        token: CancellationToken,
    ) {
        info!("Starting operator loop at {:?}", tick);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Operator loop shutting down");
                    break;
                }

                _ = tokio::time::sleep(tick) => {
                    while let Ok(event) = events.try_recv() {
                        self.handle_raw_event(&event).await;
                    }
                    while let Ok(message) = inbound.try_recv() {
                        self.handle_message(&message).await;
                    }
                    self.tick().await;
                }
            }
        }

        if self.dispatcher.dispatch(MovementIntent::stop()) {
            info!("Sent final STOP to vehicle");
        }
        self.scheduler.stop_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::renderer::testing::RecordingRenderer;
    use crate::feedback::scheduler::{FeedbackSettings, SchedulerState};
    use crate::mapping::translator::{ControlButton, TranslatorSettings, TriggerSide};
    use crate::movement::intent::{Gear, Rgb, Thrust};
    use crate::movement::wire;
    use crate::mqtt::testing::RecordingPublisher;

    struct Fixture {
        publisher: Arc<RecordingPublisher>,
        renderer: Arc<RecordingRenderer>,
        scheduler: Arc<FeedbackScheduler>,
        operator: Operator,
        status: watch::Receiver<OperatorStatus>,
    }

    fn fixture() -> Fixture {
        let publisher = Arc::new(RecordingPublisher::default());
        let renderer = Arc::new(RecordingRenderer::default());
        let scheduler = Arc::new(FeedbackScheduler::new(
            renderer.clone(),
            FeedbackSettings::default(),
        ));
        let (operator, status) = Operator::new(
            InputTranslator::new(TranslatorSettings::default()),
            MovementDispatcher::new(publisher.clone(), Topics::default()),
            scheduler.clone(),
            LinkMonitor::new(Duration::from_secs(6)),
            Topics::default(),
        );
        Fixture {
            publisher,
            renderer,
            scheduler,
            operator,
            status,
        }
    }

    fn commands(publisher: &RecordingPublisher) -> Vec<String> {
        publisher.on_topic(&Topics::default().movement_command)
    }

    #[tokio::test]
    async fn rest_publishes_stop_once() {
        let mut f = fixture();
        f.operator
            .handle_input(ControlInput::Joystick { x: 0.0, y: 0.0 })
            .await;
        f.operator
            .handle_input(ControlInput::Joystick { x: 0.05, y: 0.0 })
            .await;
        assert_eq!(
            commands(&f.publisher),
            vec![wire::encode(&MovementIntent::stop())]
        );
    }

    #[tokio::test]
    async fn trigger_drives_and_rumbles() {
        let mut f = fixture();
        f.operator
            .handle_input(ControlInput::Trigger {
                side: TriggerSide::Right,
                value: 0.6,
            })
            .await;

        let expected = MovementIntent::straight(Thrust::Forward, Gear::Gear2);
        assert_eq!(commands(&f.publisher), vec![wire::encode(&expected)]);
        assert!(f.scheduler.rumble_active().await);

        f.operator
            .handle_input(ControlInput::Trigger {
                side: TriggerSide::Right,
                value: 0.0,
            })
            .await;
        assert!(!f.scheduler.rumble_active().await);
    }

    #[tokio::test]
    async fn shoot_publishes_action_and_flashes() {
        let mut f = fixture();
        f.operator
            .handle_input(ControlInput::Button {
                button: ControlButton::Shoot,
                pressed: true,
            })
            .await;
        assert_eq!(
            f.publisher.on_topic(&Topics::default().shoot_command),
            vec!["shoot".to_string()]
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(f.renderer.colors().contains(&Rgb::RED));
    }

    #[tokio::test]
    async fn gear_change_persists_indicator_color() {
        let mut f = fixture();
        f.operator
            .handle_input(ControlInput::Button {
                button: ControlButton::GearUp,
                pressed: true,
            })
            .await;
        assert_eq!(f.scheduler.persistent_color(), Gear::Gear4.color());

        f.operator
            .handle_input(ControlInput::Button {
                button: ControlButton::GearUp,
                pressed: true,
            })
            .await;
        assert_eq!(
            f.scheduler.state().await,
            SchedulerState::Running {
                name: "gear_out_of_bound".to_string(),
                priority: crate::feedback::Priority::Normal,
            }
        );
    }

    #[tokio::test]
    async fn vehicle_messages_update_ack_and_feedback() {
        let mut f = fixture();
        let topics = Topics::default();
        let state = wire::encode(&MovementIntent::straight(Thrust::Backward, Gear::Gear1));

        f.operator
            .handle_message(&MqttMessage::from_topic(&topics.movement_state, state))
            .await;
        f.operator
            .handle_message(&MqttMessage::from_topic(&topics.game_event, "team;red"))
            .await;
        f.operator
            .handle_message(&MqttMessage::from_topic(&topics.game_event, "dance;now"))
            .await;
        f.operator.tick().await;

        let status = f.status.borrow().clone();
        assert_eq!(
            status.acknowledged,
            Some(MovementIntent::straight(Thrust::Backward, Gear::Gear1))
        );
        assert_eq!(f.scheduler.persistent_color(), Rgb::RED);
        assert!(!status.link.stale);
        assert!(status.link.last_peer_message.is_some());
    }

    #[tokio::test]
    async fn gamepad_loss_stops_vehicle() {
        let mut f = fixture();
        f.operator
            .handle_input(ControlInput::Joystick { x: 0.0, y: 1.0 })
            .await;
        f.operator
            .handle_raw_event(&RawControllerEvent::ConnectionChanged {
                connected: false,
                timestamp: Local::now(),
            })
            .await;

        assert_eq!(f.operator.current_intent(), MovementIntent::stop());
        assert_eq!(
            commands(&f.publisher).last(),
            Some(&wire::encode(&MovementIntent::stop()))
        );
    }

    #[tokio::test]
    async fn failed_publish_is_retried_on_tick() {
        let mut f = fixture();
        f.publisher.set_failing(true);
        f.operator
            .handle_input(ControlInput::Joystick { x: 0.0, y: -1.0 })
            .await;
        assert!(commands(&f.publisher).is_empty());

        f.publisher.set_failing(false);
        f.operator.tick().await;
        assert_eq!(commands(&f.publisher).len(), 1);
        assert_eq!(
            f.status.borrow().last_published,
            Some(f.operator.current_intent())
        );
    }

    #[tokio::test]
    async fn run_loop_sends_final_stop() {
        let f = fixture();
        let (event_tx, event_rx) = mpsc::channel(10);
        let (_inbound_tx, inbound_rx) = mpsc::channel(10);
        let token = CancellationToken::new();
        let task = tokio::spawn(f.operator.run(
            event_rx,
            inbound_rx,
            Duration::from_millis(5),
            token.clone(),
        ));

        event_tx
            .send(RawControllerEvent::TriggerMove {
                trigger: crate::controller::event_collector::TriggerType::Right,
                value: 1.0,
                timestamp: Local::now(),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        task.await.unwrap();

        let sent = commands(&f.publisher);
        assert_eq!(
            sent.first(),
            Some(&wire::encode(&MovementIntent::straight(Thrust::Forward, Gear::Gear4)))
        );
        assert_eq!(sent.last(), Some(&wire::encode(&MovementIntent::stop())));
        assert!(!f.scheduler.rumble_active().await);
    }
}
