//! # GPIO Button Input
//!
//! Reads the voicecube button as a plain level, once per poll of the
//! announce bridge. There is no edge detection and no debouncing: a button
//! held across several polls reads as pressed on each of them.
//!
//! ```text
//! RppalPin / IdlePin ──► PinReader::read_level ──► Button::sample ──► ButtonState
//! ```
//!
//! The board wiring decides which level means "pressed". The default setup
//! (BCM 23, pull-down bias, active low) matches the voicecube hardware.

use rppal::gpio::{Gpio, InputPin};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    #[error("GPIO unavailable: {0}")]
    Unavailable(#[from] rppal::gpio::Error),
}

/// Electrical level of a pin.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    High,
}

impl From<rppal::gpio::Level> for Level {
    fn from(level: rppal::gpio::Level) -> Self {
        match level {
            rppal::gpio::Level::Low => Level::Low,
            rppal::gpio::Level::High => Level::High,
        }
    }
}

impl Level {
    pub fn inverted(self) -> Self {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

/// A sampled level, interpreted with the configured active level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonState {
    Pressed,
    Released,
}

/// Samples a digital input. Called once per poll, no edge detection.
pub trait PinReader: Send {
    fn read_level(&mut self) -> Level;
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GpioBackend {
    #[default]
    Rppal,
    /// No hardware, the button is never pressed
    None,
}

/// Internal resistor applied to the input pin.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    #[default]
    Down,
    Up,
    Off,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct GpioConfig {
    pub backend: GpioBackend,
    /// BCM numbering
    pub pin: u8,
    pub bias: Bias,
    /// Level that counts as pressed
    pub active_level: Level,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            backend: GpioBackend::Rppal,
            pin: 23,
            bias: Bias::Down,
            active_level: Level::Low,
        }
    }
}

/// An input pin on the Raspberry Pi header, driven by rppal.
pub struct RppalPin {
    pin: InputPin,
}

impl RppalPin {
    /// Claims BCM `pin` as an input. Fails off the Pi or when the pin is
    /// already in use.
    pub fn open(pin: u8, bias: Bias) -> Result<Self, GpioError> {
        let pin = Gpio::new()?.get(pin)?;
        let pin = match bias {
            Bias::Down => pin.into_input_pulldown(),
            Bias::Up => pin.into_input_pullup(),
            Bias::Off => pin.into_input(),
        };
        Ok(Self { pin })
    }
}

impl PinReader for RppalPin {
    fn read_level(&mut self) -> Level {
        self.pin.read().into()
    }
}

/// Always reads `level`.
pub struct IdlePin {
    level: Level,
}

impl IdlePin {
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

impl PinReader for IdlePin {
    fn read_level(&mut self) -> Level {
        self.level
    }
}

/// The announce button: a pin reader plus the level that counts as pressed.
pub struct Button {
    reader: Box<dyn PinReader>,
    active_level: Level,
}

impl fmt::Debug for Button {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Button")
            .field("active_level", &self.active_level)
            .finish_non_exhaustive()
    }
}

impl Button {
    pub fn new(reader: Box<dyn PinReader>, active_level: Level) -> Self {
        Self {
            reader,
            active_level,
        }
    }

    /// Opens the configured backend. With `backend = "none"` the button
    /// reads released forever.
    pub fn from_config(config: &GpioConfig) -> Result<Self, GpioError> {
        let reader: Box<dyn PinReader> = match config.backend {
            GpioBackend::Rppal => {
                info!(
                    "Using GPIO {} (bias {:?}, pressed = {:?})",
                    config.pin, config.bias, config.active_level
                );
                Box::new(RppalPin::open(config.pin, config.bias)?)
            }
            GpioBackend::None => {
                info!("No GPIO backend, button input disabled");
                Box::new(IdlePin::new(config.active_level.inverted()))
            }
        };
        Ok(Self::new(reader, config.active_level))
    }

    /// Reads the pin once.
    pub fn sample(&mut self) -> ButtonState {
        if self.reader.read_level() == self.active_level {
            ButtonState::Pressed
        } else {
            ButtonState::Released
        }
    }
}
