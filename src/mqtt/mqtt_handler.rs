use std::io;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS, StateError};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::MqttConfig;
use super::message_manager::{BrokerEvent, MQTTMessage};

const MAX_KEPT_ERRORS: usize = 10;
const REQUEST_CAPACITY: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("Invalid broker address: {0:?}")]
    InvalidServer(String),

    #[error("Failed to connect to broker: {0}")]
    Connect(String),

    #[error("Failed to subscribe to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("Failed to publish to {topic}: {reason}")]
    Publish { topic: String, reason: String },
}

/// Outbound side of the broker, as seen by the bridges.
///
/// Publishing is fire-and-forget: `Ok` means the message was handed to the
/// client, not that the broker received it.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), MqttError>;
}

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
    Reconnecting,
}

#[derive(Clone, Debug, Default)]
pub struct MQTTStatus {
    pub connection_state: ConnectionState,
    pub error_messages: Vec<String>,
    pub messages_received: usize,
    pub messages_sent: usize,
    pub last_activity: Option<DateTime<Local>>,
}

impl MQTTStatus {
    fn record_error(&mut self, state: ConnectionState, reason: &str) {
        self.connection_state = state;
        self.error_messages.push(reason.to_string());
        if self.error_messages.len() > MAX_KEPT_ERRORS {
            self.error_messages.remove(0);
        }
    }
}

/// Owns the broker connection of one process.
///
/// The rumqttc event loop runs on a background task which forwards
/// [`BrokerEvent`]s to the receiver returned by [`MqttHandler::connect`].
pub struct MqttHandler {
    client: AsyncClient,
    status: watch::Sender<MQTTStatus>,
    cancel: CancellationToken,
}

impl MqttHandler {
    /// Connects and waits for the broker's ConnAck.
    ///
    /// `topics` are subscribed on every (re)connect. Failing to reach the
    /// broker here is fatal for the caller; there is no retry on startup.
    pub async fn connect(
        config: &MqttConfig,
        topics: Vec<String>,
    ) -> Result<(Arc<Self>, mpsc::Receiver<BrokerEvent>), MqttError> {
        let (host, port) = config.server.host_and_port()?;
        info!("Connecting to broker {} as {}", config.server, config.client_id);

        let mut mqtt_options = MqttOptions::new(config.client_id.clone(), host, port);
        mqtt_options
            .set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(1)))
            .set_clean_session(true);
        if !config.server.user.is_empty() {
            mqtt_options.set_credentials(config.server.user.clone(), config.server.pw.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);
        let (status, _) = watch::channel(MQTTStatus {
            connection_state: ConnectionState::Connecting,
            ..Default::default()
        });

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!("Connected to broker ({:?})", ack.code);
                    break;
                }
                Ok(event) => debug!("Event before ConnAck: {:?}", event),
                Err(e) => {
                    error!("Connection to {} failed: {}", config.server, e);
                    status.send_modify(|s| s.record_error(ConnectionState::Failed, &e.to_string()));
                    return Err(MqttError::Connect(e.to_string()));
                }
            }
        }

        subscribe_all(&client, &topics);
        status.send_modify(|s| {
            s.connection_state = ConnectionState::Connected;
            s.last_activity = Some(Local::now());
        });

        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));
        if event_tx.try_send(BrokerEvent::Connected).is_err() {
            warn!("Could not queue initial Connected event");
        }

        let cancel = CancellationToken::new();
        let forwarder = EventForwarder {
            client: client.clone(),
            topics,
            events: event_tx,
            status: status.clone(),
            reconnect_interval: config.reconnect_interval_secs.map(Duration::from_secs),
            cancel: cancel.clone(),
        };
        tokio::spawn(forwarder.run(eventloop));

        Ok((
            Arc::new(Self {
                client,
                status,
                cancel,
            }),
            event_rx,
        ))
    }

    pub fn status(&self) -> watch::Receiver<MQTTStatus> {
        self.status.subscribe()
    }

    /// Stops forwarding events and asks the broker for a clean disconnect.
    pub async fn shutdown(&self) {
        info!("Shutting down broker connection");
        if let Err(e) = self.client.try_disconnect() {
            warn!("Disconnect request failed: {}", e);
        }
        // give the event loop a moment to flush the disconnect
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.cancel.cancel();
    }
}

impl Publisher for MqttHandler {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), MqttError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .map_err(|e| MqttError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        self.status.send_modify(|s| {
            s.messages_sent += 1;
            s.last_activity = Some(Local::now());
        });
        debug!("Published {} bytes to {}", payload.len(), topic);
        Ok(())
    }
}

fn subscribe_all(client: &AsyncClient, topics: &[String]) {
    for topic in topics {
        match client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
            Ok(_) => info!("Subscribed to {}", topic),
            Err(e) => error!(
                "{}",
                MqttError::Subscribe {
                    topic: topic.clone(),
                    reason: e.to_string(),
                }
            ),
        }
    }
}

/// A few words about a lost connection, fit for speaking aloud. The full
/// error only goes to the log.
fn short_reason(e: &ConnectionError) -> String {
    match e {
        ConnectionError::Io(io) | ConnectionError::MqttState(StateError::Io(io)) => io_reason(io),
        ConnectionError::MqttState(StateError::AwaitPingResp) => "the broker stopped answering".to_string(),
        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => "network timeout".to_string(),
        ConnectionError::ConnectionRefused(code) => format!("the broker refused with {:?}", code),
        _ => "connection error".to_string(),
    }
}

fn io_reason(e: &io::Error) -> String {
    match e.get_ref() {
        Some(inner) => inner.to_string(),
        None => e.kind().to_string(),
    }
}

struct EventForwarder {
    client: AsyncClient,
    topics: Vec<String>,
    events: mpsc::Sender<BrokerEvent>,
    status: watch::Sender<MQTTStatus>,
    reconnect_interval: Option<Duration>,
    cancel: CancellationToken,
}

impl EventForwarder {
    async fn run(self, mut eventloop: EventLoop) {
        debug!("Broker event task started");
        loop {
            let polled = tokio::select! {
                _ = self.cancel.cancelled() => break,
                polled = eventloop.poll() => polled,
            };

            let forwarded = match polled {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let msg = MQTTMessage::from_payload(&publish.topic, &publish.payload);
                    debug!("Received {}", msg);
                    self.status.send_modify(|s| {
                        s.messages_received += 1;
                        s.last_activity = Some(msg.timestamp);
                    });
                    self.events.send(BrokerEvent::Message(msg)).await
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Reconnected to broker");
                    subscribe_all(&self.client, &self.topics);
                    self.status
                        .send_modify(|s| s.connection_state = ConnectionState::Connected);
                    self.events.send(BrokerEvent::Connected).await
                }
                Ok(_) => Ok(()),
                Err(e) => {
                    warn!("Lost connection to broker: {}", e);
                    self.status
                        .send_modify(|s| s.record_error(ConnectionState::Disconnected, &e.to_string()));
                    let reason = short_reason(&e);
                    if self.events.send(BrokerEvent::Disconnected(reason)).await.is_err() {
                        break;
                    }

                    let Some(interval) = self.reconnect_interval else {
                        info!("Reconnect disabled, broker event task stops");
                        break;
                    };
                    self.status
                        .send_modify(|s| s.connection_state = ConnectionState::Reconnecting);
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(interval) => {}
                    }
                    Ok(())
                }
            };

            if forwarded.is_err() {
                debug!("Event receiver dropped, broker event task stops");
                break;
            }
        }
        debug!("Broker event task finished");
    }
}
