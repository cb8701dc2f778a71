//! # Voicecube Announce/Button Bridge
//!
//! Runs on the voicecube itself: a small board with a speaker and one
//! button. It speaks whatever arrives on the announce topic and publishes a
//! fixed payload while the button is held.
//!
//! ## Polling Model
//!
//! Both directions are driven by one loop on a fixed cadence:
//!
//! ```text
//! every poll_interval:
//!   drain buffered BrokerEvents ──► (announce_delay) ──► Speaker::say
//!   Button::sample == Pressed   ──► Publisher::publish(receive_topic)
//!                               ──► (press_cooldown)
//! ```
//!
//! A tick only handles the broker events that were queued when it started.
//! Messages arriving during an announce delay wait for the next tick.
//!
//! ## Lifecycle
//!
//! The greeting is spoken with [`greet`] before the broker connection is
//! attempted. [`AnnounceBridge`] then moves through two typestates:
//!
//! ```text
//! AnnounceBridge<Initializing> ──initialize()──► AnnounceBridge<Polling> ──run()──► forever
//! ```
//!
//! ## Failure Handling
//!
//! - Speech and publish errors are logged, the loop keeps polling
//! - A broker disconnect is spoken once as "disconnected because ..."
//! - Without a configured reconnect the bridge keeps polling the button
//!   after the broker task is gone

pub mod announce_bridge;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::mqtt::TopicBinding;

pub use announce_bridge::{greet, AnnounceBridge, BridgeState, TickReport};

pub const DEFAULT_ANNOUNCE_TOPIC: &str = "/voicecube/announce";
pub const DEFAULT_RECEIVE_TOPIC: &str = "/voicecube/receive";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct AnnounceConfig {
    pub announce_topic: String,
    pub receive_topic: String,
    pub button_payload: String,
    /// Spoken once at startup, empty to stay quiet
    pub greeting: String,
    pub poll_interval_ms: u64,
    /// Pause between receiving and speaking a message, 0 disables it
    pub announce_delay_ms: u64,
    /// Pause after a button publish
    pub press_cooldown_ms: u64,
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        Self {
            announce_topic: DEFAULT_ANNOUNCE_TOPIC.to_string(),
            receive_topic: DEFAULT_RECEIVE_TOPIC.to_string(),
            button_payload: "test message".to_string(),
            greeting: "Speaker is connected".to_string(),
            poll_interval_ms: 1000,
            announce_delay_ms: 1000,
            press_cooldown_ms: 1000,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AnnounceSettings {
    pub announce_topic: TopicBinding,
    pub receive_topic: TopicBinding,
    pub button_payload: String,
    pub greeting: Option<String>,
    pub poll_interval: Duration,
    pub announce_delay: Duration,
    pub press_cooldown: Duration,
}

impl From<&AnnounceConfig> for AnnounceSettings {
    fn from(config: &AnnounceConfig) -> Self {
        Self {
            announce_topic: TopicBinding::new(
                "announce",
                Some(&config.announce_topic),
                DEFAULT_ANNOUNCE_TOPIC,
            ),
            receive_topic: TopicBinding::new(
                "receive",
                Some(&config.receive_topic),
                DEFAULT_RECEIVE_TOPIC,
            ),
            button_payload: config.button_payload.clone(),
            greeting: Some(config.greeting.clone()).filter(|g| !g.is_empty()),
            // a zero interval would spin
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(10)),
            announce_delay: Duration::from_millis(config.announce_delay_ms),
            press_cooldown: Duration::from_millis(config.press_cooldown_ms),
        }
    }
}

impl Default for AnnounceSettings {
    fn default() -> Self {
        Self::from(&AnnounceConfig::default())
    }
}
