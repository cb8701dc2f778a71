//! # MQTT Integration Module
//!
//! Broker plumbing shared by the sad lamp mirror and the voicecube
//! announce bridge. Each process owns exactly one broker connection, built
//! from the `[mqtt]` section of the config file.
//!
//! ## Why This Module Exists
//!
//! Both bridges talk to the same kind of broker in the same way:
//! - Connect once at startup and give up if the broker is not there
//! - Subscribe to a fixed set of topics, again after every reconnect
//! - Hand inbound messages to the bridge in arrival order
//! - Publish small text payloads without waiting for the broker
//!
//! Keeping that in one place lets the bridges stay free of rumqttc types.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker settings and topic bindings
//! ├── message_manager.rs  - Message representation and broker events
//! └── mqtt_handler.rs     - Connection, event forwarding and publishing
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! rumqttc EventLoop ──► EventForwarder task ──► mpsc<BrokerEvent> ──► bridge
//! bridge ──► Publisher::publish ──► AsyncClient::try_publish (QoS 0)
//! ```
//!
//! ## Design Philosophy
//!
//! - **Best Effort**: publishes are QoS 0 and never retried, a lost
//!   connection is reported as [`BrokerEvent::Disconnected`] and by default
//!   not re-established
//! - **Optional Reconnect**: `reconnect_interval_secs` turns on throttled
//!   reconnects; topics are subscribed again on every ConnAck
//! - **Testable Seams**: bridges only see the [`Publisher`] trait and a
//!   channel receiver, so tests drive them with in-memory fakes
//! - **Observable**: [`MQTTStatus`] counts traffic and keeps the last errors
//!   for the summary logged at shutdown

pub mod config;
pub mod message_manager;
pub mod mqtt_handler;

pub use config::{MQTTServer, MqttConfig, TopicBinding};
pub use message_manager::{BrokerEvent, MQTTMessage};
pub use mqtt_handler::{ConnectionState, MQTTStatus, MqttError, MqttHandler, Publisher};
