//! # Sad Lamp State Mirror
//!
//! Mirrors the last message on one topic into the state of one entity and
//! offers a `sad_lamp.set_state` service that publishes to the same topic.
//!
//! ```text
//! broker ──► MirrorBridge::on_message ──► EntityState (watch)
//!                                              ▲
//! POST /api/services/sad_lamp/set_state        │ GET /api/states/{entity_id}
//!        │                                     │
//!        └──► MirrorBridge::publish ──► broker
//! ```
//!
//! ## Behaviour
//!
//! - Before the first message the state reads [`DEFAULT_STATE`]
//! - Every inbound payload replaces the state unchanged, nothing is kept
//!   besides the last value and its timestamp
//! - `set_state` publishes `new_state` as is; a missing or structured value
//!   is rejected and nothing goes out
//! - A dropped broker connection freezes the last value, the HTTP API keeps
//!   serving it
//!
//! ## Module Architecture
//!
//! ```text
//! mirror/
//! ├── mirror_bridge.rs  - Entity state, message handling and publishing
//! ├── service.rs        - Service calls and field extraction
//! └── rest_api.rs       - axum routes standing in for the platform
//! ```

pub mod mirror_bridge;
pub mod rest_api;
pub mod service;

use serde::{Deserialize, Serialize};

pub use mirror_bridge::{EntityState, MirrorBridge};
pub use service::{ServiceCall, ServiceError};

pub const DEFAULT_TOPIC: &str = "home-assistant/sad_lamp";
pub const DEFAULT_ENTITY_ID: &str = "sad_lamp.last_message";
pub const DEFAULT_STATE: &str = "No messages";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct MirrorConfig {
    /// Empty means [`DEFAULT_TOPIC`]
    pub topic: String,
    pub entity_id: String,
    pub initial_state: String,
    pub http_bind: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            entity_id: DEFAULT_ENTITY_ID.to_string(),
            initial_state: DEFAULT_STATE.to_string(),
            http_bind: "127.0.0.1:8123".to_string(),
        }
    }
}
