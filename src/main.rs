pub mod config;
pub mod controller;
pub mod feedback;
pub mod mapping;
pub mod movement;
pub mod mqtt;
pub mod operator;
pub mod status;
pub mod vehicle;

use crate::config::AppConfig;
use crate::controller::controller_handle::ControllerHandle;
use crate::feedback::scheduler::FeedbackScheduler;
use crate::mapping::translator::InputTranslator;
use crate::movement::actuator::{build_driver, ActuatorPort};
use crate::movement::dispatcher::MovementDispatcher;
use crate::movement::motion::MotionController;
use crate::mqtt::link_monitor::LinkMonitor;
use crate::mqtt::mqtt_handler::MqttHandler;
use crate::operator::Operator;
use crate::vehicle::{VehicleHandle, VehicleRuntime};
use color_eyre::{eyre::eyre, Result};
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Time the link stays up after the runtime stopped, so the final STOP leaves
const LINK_GRACE: Duration = Duration::from_millis(300);
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let mut args = std::env::args().skip(1);
    let role = args.next().unwrap_or_else(|| "operator".to_string());
    let config_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(AppConfig::default_path);

    let config = AppConfig::load_or_create(&config_path).await?;
    debug!("Running with config: {:?}", config);

    match role.as_str() {
        "operator" => run_operator(config).await,
        "vehicle" => run_vehicle(config).await,
        other => Err(eyre!(
            "Unknown role '{}', expected 'operator' or 'vehicle'",
            other
        )),
    }
}

async fn run_operator(config: AppConfig) -> Result<()> {
    info!("Starting operator station");
    let topics = config.mqtt.topics.clone();
    let link_token = CancellationToken::new();
    let runtime_token = CancellationToken::new();

    let (inbound_tx, inbound_rx) = mpsc::channel(config.operator.inbound_capacity.max(1));
    let (mqtt_handler, publisher, mqtt_status) = MqttHandler::new(
        &config.mqtt,
        "operator",
        vec![topics.movement_state.clone(), topics.game_event.clone()],
        inbound_tx,
    );
    let mqtt_task = tokio::spawn(mqtt_handler.run(link_token.clone()));

    let (controller, events, renderer) =
        ControllerHandle::spawn(Some(config.controller.clone()), runtime_token.clone())
            .map_err(|e| eyre!("Failed to spawn controller: {}", e))?;

    let scheduler = Arc::new(FeedbackScheduler::new(
        Arc::new(renderer),
        config.feedback.clone(),
    ));
    let (operator, status) = Operator::new(
        InputTranslator::new(config.translator.clone()),
        MovementDispatcher::new(Arc::new(publisher), topics.clone()),
        scheduler,
        LinkMonitor::new(config.mqtt.link_timeout()),
        topics,
    );
    let operator = operator.with_mqtt_status(mqtt_status);

    let tick = Duration::from_millis(config.operator.tick_ms.max(1));
    let operator_task = tokio::spawn(operator.run(events, inbound_rx, tick, runtime_token.clone()));
    tokio::spawn(log_status("Operator", status, runtime_token.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, shutting down operator");
    runtime_token.cancel();

    if let Err(e) = operator_task.await {
        error!("Operator loop failed: {}", e);
    }
    controller.shutdown().await;

    tokio::time::sleep(LINK_GRACE).await;
    link_token.cancel();
    mqtt_task.await?;
    Ok(())
}

async fn run_vehicle(config: AppConfig) -> Result<()> {
    info!("Starting vehicle");
    let topics = config.mqtt.topics.clone();
    let link_token = CancellationToken::new();
    let status_token = CancellationToken::new();

    let driver =
        build_driver(&config.actuator).map_err(|e| eyre!("Failed to set up actuator: {}", e))?;
    let port = ActuatorPort::new(driver, config.kickstart.duration());

    let (inbound_tx, inbound_rx) = mpsc::channel(config.mqtt.queue_capacity.max(1));
    let (mqtt_handler, publisher, mqtt_status) = MqttHandler::new(
        &config.mqtt,
        "vehicle",
        vec![topics.movement_command.clone(), topics.shoot_command.clone()],
        inbound_tx,
    );
    let mqtt_task = tokio::spawn(mqtt_handler.run(link_token.clone()));

    let (runtime, status) = VehicleRuntime::create(
        MotionController::new(port, config.kickstart.clone()),
        MovementDispatcher::new(Arc::new(publisher), topics.clone()),
        LinkMonitor::new(config.mqtt.link_timeout()),
        topics,
        inbound_rx,
        Some(mqtt_status),
    );
    let mut handle = VehicleHandle::start(runtime);
    tokio::spawn(log_status("Vehicle", status, status_token.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, shutting down vehicle");
    handle.shutdown().await;
    status_token.cancel();

    tokio::time::sleep(LINK_GRACE).await;
    link_token.cancel();
    mqtt_task.await?;
    Ok(())
}

async fn log_status<T: Debug + Send + Sync + 'static>(
    role: &'static str,
    status: watch::Receiver<T>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(STATUS_LOG_INTERVAL) => {
                info!("{} status: {:?}", role, *status.borrow());
            }
        }
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
