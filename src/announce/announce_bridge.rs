use std::sync::Arc;
use std::time::Duration;

use statum::{machine, state};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::AnnounceSettings;
use crate::gpio::{Button, ButtonState};
use crate::mqtt::{BrokerEvent, Publisher};
use crate::speech::Speaker;

/// Where a tick currently is. Only used for tracing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BridgeState {
    #[default]
    Idle,
    MessageReceived,
    Announcing,
    ButtonPressed,
    Publishing,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub announced: usize,
    pub disconnects: usize,
    pub button: ButtonState,
    pub published: bool,
}

#[state]
#[derive(Debug, Clone)]
pub enum BridgeLifecycle {
    Initializing,
    Polling,
}

#[machine]
pub struct AnnounceBridge<S: BridgeLifecycle> {
    speaker: Box<dyn Speaker>,
    button: Button,
    publisher: Arc<dyn Publisher>,
    events: mpsc::Receiver<BrokerEvent>,
    settings: AnnounceSettings,
    phase: BridgeState,
    broker_gone: bool,
}

impl<S: BridgeLifecycle> AnnounceBridge<S> {
    pub fn phase(&self) -> BridgeState {
        self.phase
    }

    fn enter(&mut self, next: BridgeState) {
        debug!("{:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    fn speak(&self, text: &str) {
        if let Err(e) = self.speaker.say(text) {
            error!("Could not speak {:?}: {}", text, e);
        }
    }
}

impl AnnounceBridge<Initializing> {
    pub fn create(
        speaker: Box<dyn Speaker>,
        button: Button,
        publisher: Arc<dyn Publisher>,
        events: mpsc::Receiver<BrokerEvent>,
        settings: AnnounceSettings,
    ) -> Self {
        debug!("Creating announce bridge with {:?}", settings);
        Self::new(
            speaker,
            button,
            publisher,
            events,
            settings,
            BridgeState::Idle,
            false,
        )
    }

    pub fn initialize(self) -> AnnounceBridge<Polling> {
        info!(
            "Announcing {} and publishing button presses to {}",
            self.settings.announce_topic.topic(),
            self.settings.receive_topic.topic()
        );
        self.transition()
    }
}

impl AnnounceBridge<Polling> {
    /// One loop iteration: drain buffered broker events, sample the button
    /// once, publish if it is pressed.
    pub async fn tick(&mut self) -> TickReport {
        let mut announced = 0;
        let mut disconnects = 0;

        // only what is already queued, later arrivals wait for the next tick
        let buffered = self.events.len();
        for _ in 0..buffered {
            match self.events.try_recv() {
                Ok(BrokerEvent::Message(msg)) => {
                    self.announce(&msg.content).await;
                    announced += 1;
                }
                Ok(BrokerEvent::Disconnected(reason)) => {
                    warn!("Disconnected from broker: {}", reason);
                    self.speak(&format!("disconnected because {}", reason));
                    disconnects += 1;
                }
                Ok(BrokerEvent::Connected) => info!("Connected to broker"),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
        if !self.broker_gone && self.events.is_closed() && self.events.is_empty() {
            warn!("Broker event task has stopped, no more announcements");
            self.broker_gone = true;
        }

        let button = self.button.sample();
        let published = button == ButtonState::Pressed && self.publish_press().await;

        TickReport {
            announced,
            disconnects,
            button,
            published,
        }
    }

    /// Ticks forever at the poll interval. Slow ticks push the next one back
    /// instead of bursting.
    pub async fn run(mut self) {
        let mut interval = time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Polling every {:?}", self.settings.poll_interval);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    async fn announce(&mut self, text: &str) {
        self.enter(BridgeState::MessageReceived);
        info!("received message = {}", text);
        pause(self.settings.announce_delay).await;
        self.enter(BridgeState::Announcing);
        self.speak(text);
        self.enter(BridgeState::Idle);
    }

    async fn publish_press(&mut self) -> bool {
        self.enter(BridgeState::ButtonPressed);
        info!("button pressed");
        self.enter(BridgeState::Publishing);
        let published = match self.publisher.publish(
            self.settings.receive_topic.topic(),
            &self.settings.button_payload,
        ) {
            Ok(()) => true,
            Err(e) => {
                error!("{}", e);
                false
            }
        };
        pause(self.settings.press_cooldown).await;
        self.enter(BridgeState::Idle);
        published
    }
}

/// Speaks the configured greeting, if any. Called before the broker
/// connection is attempted.
pub fn greet(speaker: &dyn Speaker, settings: &AnnounceSettings) {
    if let Some(greeting) = &settings.greeting {
        if let Err(e) = speaker.say(greeting) {
            error!("Could not speak {:?}: {}", greeting, e);
        }
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::Level;
    use crate::mqtt::MQTTMessage;
    use crate::test_support::{RecordingPublisher, RecordingSpeaker, ScriptedPin};
    use tokio::time::Instant;

    struct Rig {
        bridge: AnnounceBridge<Polling>,
        events: mpsc::Sender<BrokerEvent>,
        speaker: RecordingSpeaker,
        publisher: RecordingPublisher,
    }

    fn rig(levels: Vec<Level>, settings: AnnounceSettings) -> Rig {
        rig_with(levels, settings, RecordingPublisher::new())
    }

    fn rig_with(levels: Vec<Level>, settings: AnnounceSettings, publisher: RecordingPublisher) -> Rig {
        let (events, rx) = mpsc::channel(16);
        let speaker = RecordingSpeaker::new();
        let button = Button::new(Box::new(ScriptedPin::new(levels)), Level::Low);
        let bridge = AnnounceBridge::create(
            Box::new(speaker.clone()),
            button,
            Arc::new(publisher.clone()),
            rx,
            settings,
        )
        .initialize();
        Rig {
            bridge,
            events,
            speaker,
            publisher,
        }
    }

    fn quick_settings() -> AnnounceSettings {
        AnnounceSettings {
            greeting: None,
            announce_delay: Duration::ZERO,
            press_cooldown: Duration::ZERO,
            ..Default::default()
        }
    }

    fn message(content: &str) -> BrokerEvent {
        BrokerEvent::Message(MQTTMessage::from_topic(
            "/voicecube/announce".into(),
            content.into(),
        ))
    }

    #[test]
    fn greet_speaks_the_greeting() {
        let speaker = RecordingSpeaker::new();
        greet(&speaker, &AnnounceSettings::default());
        assert_eq!(speaker.said(), vec!["Speaker is connected"]);

        let quiet = RecordingSpeaker::new();
        greet(&quiet, &quick_settings());
        assert!(quiet.said().is_empty());
    }

    #[tokio::test]
    async fn initialize_starts_idle_and_silent() {
        let rig = rig(vec![], AnnounceSettings::default());
        assert!(rig.speaker.said().is_empty());
        assert_eq!(rig.bridge.phase(), BridgeState::Idle);
    }

    #[tokio::test]
    async fn held_button_publishes_once_per_tick() {
        let mut rig = rig(vec![Level::Low; 3], quick_settings());
        for _ in 0..3 {
            let report = rig.bridge.tick().await;
            assert_eq!(report.button, ButtonState::Pressed);
            assert!(report.published);
        }
        let report = rig.bridge.tick().await;
        assert_eq!(report.button, ButtonState::Released);
        assert!(!report.published);

        let expected = vec![("/voicecube/receive".to_string(), "test message".to_string()); 3];
        assert_eq!(rig.publisher.sent(), expected);
    }

    #[tokio::test]
    async fn released_button_publishes_nothing() {
        let mut rig = rig(vec![Level::High; 5], quick_settings());
        for _ in 0..5 {
            rig.bridge.tick().await;
        }
        assert!(rig.publisher.sent().is_empty());
    }

    #[tokio::test]
    async fn buffered_messages_are_announced_in_order() {
        let mut rig = rig(vec![], quick_settings());
        rig.events.send(message("first")).await.unwrap();
        rig.events.send(message("second")).await.unwrap();

        let report = rig.bridge.tick().await;
        assert_eq!(report.announced, 2);
        assert_eq!(rig.speaker.said(), vec!["first", "second"]);

        let report = rig.bridge.tick().await;
        assert_eq!(report.announced, 0);
    }

    #[tokio::test]
    async fn disconnect_is_spoken_once() {
        let mut rig = rig(vec![], quick_settings());
        rig.events
            .send(BrokerEvent::Disconnected("connection reset by peer".into()))
            .await
            .unwrap();
        drop(rig.events);

        let report = rig.bridge.tick().await;
        assert_eq!(report.disconnects, 1);
        rig.bridge.tick().await;
        assert_eq!(
            rig.speaker.said(),
            vec!["disconnected because connection reset by peer"]
        );
    }

    #[tokio::test]
    async fn connected_event_is_silent() {
        let mut rig = rig(vec![], quick_settings());
        rig.events.send(BrokerEvent::Connected).await.unwrap();
        let report = rig.bridge.tick().await;
        assert_eq!(report.announced, 0);
        assert!(rig.speaker.said().is_empty());
    }

    #[tokio::test]
    async fn failed_publish_keeps_polling() {
        let mut rig = rig_with(vec![Level::Low, Level::Low], quick_settings(), RecordingPublisher::failing());
        assert!(!rig.bridge.tick().await.published);
        assert!(!rig.bridge.tick().await.published);
        assert_eq!(rig.bridge.phase(), BridgeState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn announce_waits_for_the_delay() {
        let settings = AnnounceSettings {
            greeting: None,
            announce_delay: Duration::from_secs(1),
            press_cooldown: Duration::ZERO,
            ..Default::default()
        };
        let mut rig = rig(vec![], settings);
        rig.events.send(message("hello")).await.unwrap();

        let start = Instant::now();
        rig.bridge.tick().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(rig.speaker.said(), vec!["hello"]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_at_the_poll_interval() {
        let settings = AnnounceSettings {
            greeting: None,
            announce_delay: Duration::ZERO,
            press_cooldown: Duration::ZERO,
            ..Default::default()
        };
        let rig = rig(vec![Level::Low; 10], settings);
        let publisher = rig.publisher.clone();
        let handle = tokio::spawn(rig.bridge.run());

        // ticks at 0s, 1s and 2s
        time::sleep(Duration::from_millis(2500)).await;
        handle.abort();
        assert_eq!(publisher.sent().len(), 3);
    }
}
