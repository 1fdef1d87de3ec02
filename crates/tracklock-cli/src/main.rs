//! Tracklock gateway binary.
//!
//! Reads its configuration from the environment, then runs the device
//! listener and the operator control surface side by side until either
//! fails or the process is stopped.

use anyhow::Context;
use tracklock_gateway::{
    CommandDispatcher, ControlState, DeviceRegistry, DeviceServer, EventSink, GatewayConfig,
    control,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("tracklock gateway {} starting", tracklock_core::VERSION);

    let config = GatewayConfig::from_env().context("loading configuration")?;
    if !config.labels.is_empty() {
        tracing::info!(labels = ?config.labels, "static event labels");
    }

    let registry = DeviceRegistry::new();
    let sink = EventSink::new(&config).context("building event sink")?;
    let dispatcher = CommandDispatcher::new(registry.clone());

    let device_server = DeviceServer::bind(
        &config.device_addr(),
        registry.clone(),
        sink,
        config.crc_secret,
    )
    .await
    .context("binding device listener")?;

    let control_state = ControlState::new(registry, dispatcher);
    let control_addr = config.control_addr();

    tokio::select! {
        result = device_server.run() => result.context("device listener failed"),
        result = control::serve(&control_addr, control_state) => {
            result.context("control surface failed")
        }
    }
}
