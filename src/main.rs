pub mod announce;
pub mod config;
pub mod gpio;
pub mod mirror;
pub mod mqtt;
pub mod speech;

#[cfg(test)]
mod test_support;

use crate::announce::{greet, AnnounceBridge, AnnounceSettings};
use crate::config::Config;
use crate::gpio::Button;
use crate::mirror::service::DOMAIN;
use crate::mirror::{rest_api, MirrorBridge, DEFAULT_TOPIC};
use crate::mqtt::{MqttHandler, TopicBinding};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "MQTT bridges for the sad lamp and the voicecube speaker"
)]
struct Args {
    /// Config file, defaults to <config dir>/voicecube/config.toml
    #[arg(long, short, env = "VOICECUBE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Mirror the last message of the sad_lamp topic and serve set_state
    Mirror,
    /// Speak incoming announcements and publish button presses
    Announce,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup()?;

    // Konfiguration laden, beim ersten Start Default schreiben
    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    Config::ensure_default_config(&config_path).await?;
    let config = Config::load(&config_path).await?;

    setup_logging_env(config.log_level()?);
    info!("Using config {}", config_path.display());

    match args.command {
        Command::Mirror => run_mirror(config).await,
        Command::Announce => run_announce(config).await,
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

async fn run_mirror(config: Config) -> Result<()> {
    let binding = TopicBinding::new(DOMAIN, Some(&config.mirror.topic), DEFAULT_TOPIC);
    if !binding.is_default() {
        info!("Topic {} replaces default {}", binding.topic(), binding.default_topic());
    }

    // Broker verbinden, Fehler hier beenden den Prozess
    let (mqtt, events) =
        MqttHandler::connect(&config.mqtt, vec![binding.topic().to_string()]).await?;

    let bridge = Arc::new(MirrorBridge::new(
        binding,
        &config.mirror.entity_id,
        &config.mirror.initial_state,
        mqtt.clone(),
    ));
    info!("Serving {} from {}", bridge.entity_id(), bridge.binding().topic());
    let _events_handle = tokio::spawn(bridge.clone().run(events));

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping");
            shutdown.cancel();
        }
    });

    rest_api::serve(bridge, &config.mirror.http_bind, cancel).await?;

    mqtt.shutdown().await;
    log_broker_summary(&mqtt);
    Ok(())
}

async fn run_announce(config: Config) -> Result<()> {
    let settings = AnnounceSettings::from(&config.announce);
    let button = Button::from_config(&config.gpio)?;
    let speaker = speech::speaker_from_config(&config.speech);
    // Begrüßung vor dem Verbinden, auch ein Fehlstart ist hörbar
    greet(speaker.as_ref(), &settings);

    let (mqtt, events) = MqttHandler::connect(
        &config.mqtt,
        vec![settings.announce_topic.topic().to_string()],
    )
    .await?;

    let bridge = AnnounceBridge::create(speaker, button, mqtt.clone(), events, settings).initialize();

    // Läuft bis Ctrl-C, es gibt keinen anderen Ausstieg
    tokio::select! {
        _ = bridge.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e))?;
            info!("Ctrl-C received, stopping");
        }
    }

    mqtt.shutdown().await;
    log_broker_summary(&mqtt);
    Ok(())
}

fn log_broker_summary(mqtt: &MqttHandler) {
    let status = mqtt.status().borrow().clone();
    info!(
        "Broker session ended {:?}: {} received, {} sent",
        status.connection_state, status.messages_received, status.messages_sent
    );
    for error in &status.error_messages {
        warn!("Broker error during session: {}", error);
    }
}
