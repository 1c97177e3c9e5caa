//! Error types, one enum per concern.
//!
//! Layout contract violations are not represented here: the page renderer
//! panics on them, since they can only come from a broken section renderer.

use thiserror::Error;

/// Failures of exact rational arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    #[error("proportion with zero denominator")]
    ZeroDenominator,
    #[error("division by a zero proportion")]
    DivisionByZero,
}

/// A document model value cannot be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("'{0}' is not a pitch letter (A to G)")]
    InvalidPitchLetter(char),
}

/// The document handed to the section renderer is malformed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("section {section} has {found} voice slots, piece declares {expected}")]
    VoiceCountMismatch {
        section: usize,
        expected: usize,
        found: usize,
    },
    #[error("section {section}, voice {voice}: proportion change to zero")]
    ZeroProportion { section: usize, voice: usize },
    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
}

/// Sequence construction failed; playback is unavailable for the document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SequenceError {
    #[error("section {section} is inconsistent: {reason}")]
    InconsistentSection { section: usize, reason: String },
    #[error("section {section}, voice {voice}: pitch {pitch} is outside the MIDI range")]
    PitchOutOfRange {
        section: usize,
        voice: usize,
        pitch: String,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
}

/// Device acquisition and playback failures. These are reported to the
/// user and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("no MIDI playback device is available")]
    NoDevice,
    #[error("MIDI device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("failed to send MIDI message: {0}")]
    Send(String),
    #[error("measure {measure} does not exist (score has {count} measures)")]
    InvalidStartMeasure { measure: usize, count: usize },
}

/// A single export attempt failed; in-memory state is untouched.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{what} value {value} cannot be represented in a MIDI file")]
    OutOfRange { what: &'static str, value: u64 },
}

/// Bad configuration value from the environment or a config file.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name}: cannot parse '{value}'")]
    InvalidValue { name: String, value: String },
    #[error("{name}: {reason}")]
    OutOfRange { name: &'static str, reason: String },
    #[error("config file: {0}")]
    Json(String),
}
