//! Text-to-speech output.
//!
//! The bridge only needs "say this". [`EspeakSpeaker`] hands the text to the
//! `espeak` command line program, one utterance at a time, and [`LogSpeaker`]
//! stands in on machines without audio.

use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Speech worker is gone, dropped: {0:?}")]
    Closed(String),
}

/// Anything that can say a line of text.
///
/// `say` must not block the caller until playback is done; the announce
/// bridge calls it from inside its polling loop.
pub trait Speaker: Send + Sync {
    fn say(&self, text: &str) -> Result<(), SpeechError>;
}

/// `engine` in the `[speech]` section.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpeechEngine {
    #[default]
    Espeak,
    Log,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct SpeechConfig {
    pub engine: SpeechEngine,
    pub program: String,
    /// espeak `-v`
    pub voice: Option<String>,
    /// espeak `-s`, words per minute
    pub speed: Option<u32>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            engine: SpeechEngine::Espeak,
            program: "espeak".to_string(),
            voice: None,
            speed: None,
        }
    }
}

/// Builds the configured speaker. Must be called inside the tokio runtime.
pub fn speaker_from_config(config: &SpeechConfig) -> Box<dyn Speaker> {
    match config.engine {
        SpeechEngine::Espeak => Box::new(EspeakSpeaker::spawn(config)),
        SpeechEngine::Log => {
            info!("Speech output goes to the log");
            Box::new(LogSpeaker)
        }
    }
}

/// Queues utterances for a worker task that runs the speech program.
///
/// Utterances never overlap; each program run is awaited before the next one
/// starts. Failures of the program are logged by the worker.
pub struct EspeakSpeaker {
    queue: mpsc::UnboundedSender<String>,
}

impl EspeakSpeaker {
    /// Starts the worker task. Needs a running tokio runtime.
    pub fn spawn(config: &SpeechConfig) -> Self {
        let (queue, mut rx) = mpsc::unbounded_channel::<String>();
        let invocation = Invocation::from(config);
        info!("Starting speech worker with {}", invocation.program);

        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if let Err(e) = invocation.speak(&text).await {
                    error!("{}", e);
                }
            }
            debug!("Speech worker finished");
        });

        Self { queue }
    }
}

impl Speaker for EspeakSpeaker {
    fn say(&self, text: &str) -> Result<(), SpeechError> {
        self.queue
            .send(text.to_string())
            .map_err(|e| SpeechError::Closed(e.0))
    }
}

#[derive(Debug, Clone)]
struct Invocation {
    program: String,
    voice: Option<String>,
    speed: Option<u32>,
}

impl From<&SpeechConfig> for Invocation {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            program: config.program.clone(),
            voice: config.voice.clone().filter(|v| !v.is_empty()),
            speed: config.speed,
        }
    }
}

impl Invocation {
    fn args(&self, text: &str) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(voice) = &self.voice {
            args.push("-v".to_string());
            args.push(voice.clone());
        }
        if let Some(speed) = self.speed {
            args.push("-s".to_string());
            args.push(speed.to_string());
        }
        // keeps payloads starting with '-' from being read as options
        args.push("--".to_string());
        args.push(text.to_string());
        args
    }

    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        debug!("Speaking {:?}", text);
        let status = Command::new(&self.program)
            .args(self.args(text))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .await
            .map_err(|source| SpeechError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            warn!("{} exited with {}", self.program, status);
        }
        Ok(())
    }
}

/// Writes utterances to the log instead of the speakers.
pub struct LogSpeaker;

impl Speaker for LogSpeaker {
    fn say(&self, text: &str) -> Result<(), SpeechError> {
        info!("Saying: {}", text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_passes_voice_and_speed() {
        let config = SpeechConfig {
            voice: Some("de".into()),
            speed: Some(140),
            ..Default::default()
        };
        let args = Invocation::from(&config).args("Hallo");
        assert_eq!(args, ["-v", "de", "-s", "140", "--", "Hallo"]);
    }

    #[test]
    fn invocation_without_options_only_passes_text() {
        let config = SpeechConfig {
            voice: Some(String::new()),
            ..Default::default()
        };
        let args = Invocation::from(&config).args("-rf");
        assert_eq!(args, ["--", "-rf"]);
    }

    #[test]
    fn engine_names_in_config() {
        let config: SpeechConfig = toml::from_str("engine = \"log\"").unwrap();
        assert_eq!(config.engine, SpeechEngine::Log);
        assert_eq!(config.program, "espeak");
    }

    #[tokio::test]
    async fn missing_program_is_reported_as_spawn_error() {
        let invocation = Invocation {
            program: "/nonexistent/voicecube-espeak".into(),
            voice: None,
            speed: None,
        };
        let result = invocation.speak("hello").await;
        assert!(matches!(result, Err(SpeechError::Spawn { .. })));
    }

    #[tokio::test]
    async fn espeak_speaker_queues_without_waiting() {
        let config = SpeechConfig {
            program: "true".into(),
            ..Default::default()
        };
        let speaker = EspeakSpeaker::spawn(&config);
        assert!(speaker.say("one").is_ok());
        assert!(speaker.say("two").is_ok());
    }
}
