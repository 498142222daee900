use std::path::PathBuf;

use clap::Parser;
use emberd::config::Config;
use emberd::config::LogLevel;
use emberd::engine::Engine;
use emberd_device::Device;
use emberd_device::MqttSettings;
use emberd_device::MqttTransport;
use tokio::sync::oneshot;
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser)]
#[command(version, about = "emberd home automation hub")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "emberd.toml")]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)?;

    let level = args.log_level.unwrap_or(config.logging.level);
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from(level))
        .init();

    tracing::info!("emberd starting");
    tracing::info!("Loaded config from: {}", args.config.display());

    let mut engine = Engine::new();

    for (did, device_config) in &config.devices {
        tracing::info!("Connecting device: {}", did);

        // One MQTT session per device; the broker requires distinct client ids.
        let settings = MqttSettings {
            broker: config.mqtt.broker.clone(),
            port: config.mqtt.port,
            client_id: format!("{}-{}", config.mqtt.client_id, did),
            username: config.mqtt.username.clone(),
            password: config.mqtt.password.clone(),
        };
        let transport = MqttTransport::new(&settings);

        let device = match Device::connect(
            transport,
            config.mqtt.prefix.clone(),
            device_config.device_info(did),
            device_config.capabilities(),
        )
        .await
        {
            Ok(device) => device,
            Err(e) => {
                tracing::error!("Failed to connect device {}: {}", did, e);
                continue;
            }
        };

        engine.add_device(device).await;
    }

    let (api_shutdown_tx, api_shutdown_rx) = oneshot::channel();
    let api_task = if config.api.enabled {
        let bind = config.api.bind.clone();
        let port = config.api.port;
        let state = engine.state_handle();
        let commands = engine.command_sender();
        Some(tokio::spawn(async move {
            if let Err(e) = emberd::api::serve(bind, port, state, commands, api_shutdown_rx).await {
                tracing::error!("HTTP API server failed: {}", e);
            }
        }))
    } else {
        None
    };

    let (engine_shutdown_tx, engine_shutdown_rx) = oneshot::channel();
    let engine_task = tokio::spawn(async move {
        engine.run(engine_shutdown_rx).await;
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }

    engine_shutdown_tx.send(()).ok();
    engine_task.await.ok();

    api_shutdown_tx.send(()).ok();
    if let Some(task) = api_task {
        task.await.ok();
    }

    tracing::info!("emberd shutdown complete");

    Ok(())
}
