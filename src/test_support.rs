//! Fakes for the broker, speech and GPIO seams.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::gpio::{Level, PinReader};
use crate::mqtt::{MqttError, Publisher};
use crate::speech::{SpeechError, Speaker};

#[derive(Clone, Default)]
pub struct RecordingPublisher {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses every publish, like a client whose request queue is full.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), MqttError> {
        if self.fail {
            return Err(MqttError::Publish {
                topic: topic.to_string(),
                reason: "request queue full".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingSpeaker {
    said: Arc<Mutex<Vec<String>>>,
}

impl RecordingSpeaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn said(&self) -> Vec<String> {
        self.said.lock().unwrap().clone()
    }
}

impl Speaker for RecordingSpeaker {
    fn say(&self, text: &str) -> Result<(), SpeechError> {
        self.said.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Replays a fixed sequence of levels, then stays high.
pub struct ScriptedPin {
    levels: VecDeque<Level>,
}

impl ScriptedPin {
    pub fn new(levels: impl IntoIterator<Item = Level>) -> Self {
        Self {
            levels: levels.into_iter().collect(),
        }
    }
}

impl PinReader for ScriptedPin {
    fn read_level(&mut self) -> Level {
        self.levels.pop_front().unwrap_or(Level::High)
    }
}
