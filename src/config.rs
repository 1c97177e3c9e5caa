//! Playback and sequencing configuration.
//!
//! Defaults are compiled in; every value can be overridden from the
//! environment (`CMME_*` variables) or from a JSON file.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::proportion::Proportion;

/// Minims in one playback beat (the semibreve).
pub const MINIMS_PER_BEAT: i64 = 2;

/// General MIDI percussion channel (10, 0-based 9).
const PERCUSSION_CHANNEL: u8 = 9;
const MAX_MELODIC_CHANNELS: u8 = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Global playback tempo, in semibreve beats.
    pub beats_per_minute: f64,
    /// MIDI resolution.
    pub ticks_per_beat: u16,
    /// Silence inserted before every section after the first.
    pub rest_beats_between_sections: u32,
    /// General MIDI program for every voice.
    pub default_program: u8,
    pub default_velocity: u8,
    /// Output gain in 0.0..=1.0, sent as channel volume.
    pub default_gain: f64,
    /// Channels available to voices before wrapping around (at most 15;
    /// the percussion channel is skipped).
    pub max_channels: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            beats_per_minute: 80.0,
            ticks_per_beat: 96,
            rest_beats_between_sections: 1,
            default_program: 52,
            default_velocity: 96,
            default_gain: 0.8,
            max_channels: 9,
        }
    }
}

impl Config {
    /// Defaults with `CMME_*` environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parse a JSON config; missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_str(json).map_err(|e| ConfigError::Json(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from any key/value lookup, then validate.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_value(&lookup, "CMME_BPM", &mut self.beats_per_minute)?;
        override_value(&lookup, "CMME_TICKS_PER_BEAT", &mut self.ticks_per_beat)?;
        override_value(&lookup, "CMME_REST_BEATS", &mut self.rest_beats_between_sections)?;
        override_value(&lookup, "CMME_PROGRAM", &mut self.default_program)?;
        override_value(&lookup, "CMME_VELOCITY", &mut self.default_velocity)?;
        override_value(&lookup, "CMME_GAIN", &mut self.default_gain)?;
        override_value(&lookup, "CMME_MAX_CHANNELS", &mut self.max_channels)?;
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.beats_per_minute.is_finite() && self.beats_per_minute > 0.0) {
            return Err(ConfigError::OutOfRange {
                name: "beats_per_minute",
                reason: format!("must be positive, got {}", self.beats_per_minute),
            });
        }
        if self.ticks_per_beat == 0 || self.ticks_per_beat > 0x7fff {
            return Err(ConfigError::OutOfRange {
                name: "ticks_per_beat",
                reason: format!("must be in 1..=32767, got {}", self.ticks_per_beat),
            });
        }
        if self.default_program > 127 {
            return Err(ConfigError::OutOfRange {
                name: "default_program",
                reason: format!("must be in 0..=127, got {}", self.default_program),
            });
        }
        if self.default_velocity > 127 {
            return Err(ConfigError::OutOfRange {
                name: "default_velocity",
                reason: format!("must be in 0..=127, got {}", self.default_velocity),
            });
        }
        if !(0.0..=1.0).contains(&self.default_gain) {
            return Err(ConfigError::OutOfRange {
                name: "default_gain",
                reason: format!("must be in 0.0..=1.0, got {}", self.default_gain),
            });
        }
        if self.max_channels == 0 || self.max_channels > MAX_MELODIC_CHANNELS {
            return Err(ConfigError::OutOfRange {
                name: "max_channels",
                reason: format!(
                    "must be in 1..={MAX_MELODIC_CHANNELS}, got {}",
                    self.max_channels
                ),
            });
        }
        Ok(())
    }

    /// Ticks per minim, exact even for odd resolutions.
    pub fn ticks_per_minim(&self) -> Proportion {
        Proportion::raw(self.ticks_per_beat as i64, 1)
            .quotient(Proportion::from_integer(MINIMS_PER_BEAT))
            .unwrap_or(Proportion::ONE)
    }

    /// Length in minims of the gap before each section after the first.
    pub fn section_gap(&self) -> Proportion {
        Proportion::from_integer(self.rest_beats_between_sections as i64 * MINIMS_PER_BEAT)
    }

    /// MIDI channel for a voice, wrapping at `max_channels`. The percussion
    /// channel is never handed out.
    pub fn channel_for_voice(&self, voice: usize) -> u8 {
        let slot = (voice % self.max_channels.clamp(1, MAX_MELODIC_CHANNELS) as usize) as u8;
        if slot >= PERCUSSION_CHANNEL {
            slot + 1
        } else {
            slot
        }
    }

    /// Wall-clock microseconds per beat.
    pub fn micros_per_beat(&self) -> u32 {
        (60_000_000.0 / self.beats_per_minute).round() as u32
    }

    /// Channel volume derived from the output gain.
    pub fn channel_volume(&self) -> u8 {
        (self.default_gain * 127.0).round().clamp(0.0, 127.0) as u8
    }
}

fn override_value<T, F>(lookup: &F, name: &str, slot: &mut T) -> Result<(), ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value: raw.clone(),
        })?;
        log::debug!("config override {name}={raw}");
    }
    Ok(())
}
