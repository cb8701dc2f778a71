use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::service::{ServiceCall, ServiceError, DOMAIN, FIELD_NEW_STATE, SERVICE_SET_STATE};
use crate::mqtt::{BrokerEvent, MqttError, Publisher, TopicBinding};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    pub last_updated: DateTime<Local>,
}

/// Keeps one entity state in sync with the last message on one topic.
///
/// The state lives in a `watch` channel: writes from the broker task replace
/// it atomically and every reader sees a complete value.
pub struct MirrorBridge {
    binding: TopicBinding,
    state: watch::Sender<EntityState>,
    publisher: Arc<dyn Publisher>,
}

impl MirrorBridge {
    pub fn new(
        binding: TopicBinding,
        entity_id: &str,
        initial_state: &str,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let (state, _) = watch::channel(EntityState {
            entity_id: entity_id.to_string(),
            state: initial_state.to_string(),
            last_updated: Local::now(),
        });
        info!("Mirroring {} into {}", binding, entity_id);
        Self {
            binding,
            state,
            publisher,
        }
    }

    pub fn binding(&self) -> &TopicBinding {
        &self.binding
    }

    pub fn entity_id(&self) -> String {
        self.state.borrow().entity_id.clone()
    }

    pub fn last_value(&self) -> String {
        self.state.borrow().state.clone()
    }

    pub fn state(&self) -> EntityState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EntityState> {
        self.state.subscribe()
    }

    /// Overwrites the state with `payload`. The topic is not checked.
    pub fn on_message(&self, topic: &str, payload: &str) {
        debug!("{} <- {}: {:?}", self.binding.name(), topic, payload);
        self.state.send_modify(|s| {
            s.state = payload.to_string();
            s.last_updated = Local::now();
        });
    }

    /// Sends `new_value` unchanged to the bound topic.
    pub fn publish(&self, new_value: &str) -> Result<(), MqttError> {
        self.publisher
            .publish(self.binding.topic(), new_value)
            .inspect_err(|e| warn!("{}", e))
    }

    pub fn call_service(&self, call: &ServiceCall) -> Result<(), ServiceError> {
        if !call.is(DOMAIN, SERVICE_SET_STATE) {
            return Err(ServiceError::UnknownService {
                domain: call.domain.clone(),
                service: call.service.clone(),
            });
        }
        let new_state = call.text_field(FIELD_NEW_STATE)?;
        info!("{}.{} -> {:?}", call.domain, call.service, new_state);
        self.publish(&new_state)?;
        Ok(())
    }

    /// Applies broker events until the broker side goes away.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<BrokerEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                BrokerEvent::Message(msg) => self.on_message(&msg.topic, &msg.content),
                BrokerEvent::Connected => info!("Broker connected, listening on {}", self.binding.topic()),
                BrokerEvent::Disconnected(reason) => {
                    warn!("Broker disconnected ({}), {} keeps its last value", reason, self.entity_id())
                }
            }
        }
        info!("Broker events ended, state of {} is frozen", self.entity_id());
    }
}
