//! In-memory document model for a mensural piece.
//!
//! The loading layer (CMME XML) lives outside this crate; it hands over a
//! `Piece` built from these types. Everything derives serde so the host can
//! also pass a document as JSON.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::proportion::Proportion;

/// A complete piece: voice declarations plus an ordered list of sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Piece {
    pub title: Option<String>,
    pub composer: Option<String>,
    pub voices: Vec<VoiceInfo>,
    pub sections: Vec<Section>,
}

/// Staff label for one voice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub name: String,
    pub abbreviation: Option<String>,
}

/// A structurally distinct portion of the piece. One slot per piece voice;
/// `None` when the voice is silent for the whole section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Section {
    pub voices: Vec<Option<VoiceSection>>,
}

/// The event stream of one voice within one section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceSection {
    pub events: Vec<Event>,
}

/// One musical event. Closed set: everything downstream dispatches on it
/// with `match`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    Note(Note),
    Rest(Rest),
    /// Multiplies the running tempo proportion of the voice.
    ProportionChange(Proportion),
    /// Simultaneous events (chord, alternate notes); lasts as long as its
    /// longest member.
    Multi(Vec<Event>),
    Clef(ClefEvent),
    Mensuration(Mensuration),
    VariantMarker(VariantMarker),
}

impl Event {
    /// Notated length in minims, before any tempo proportion is applied.
    pub fn music_length(&self) -> Proportion {
        match self {
            Event::Note(n) => n.length,
            Event::Rest(r) => r.length,
            Event::Multi(events) => events
                .iter()
                .map(Event::music_length)
                .max()
                .unwrap_or(Proportion::ZERO),
            Event::ProportionChange(_)
            | Event::Clef(_)
            | Event::Mensuration(_)
            | Event::VariantMarker(_) => Proportion::ZERO,
        }
    }

    pub fn as_note(&self) -> Option<&Note> {
        match self {
            Event::Note(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_clef(&self) -> Option<&ClefEvent> {
        match self {
            Event::Clef(c) => Some(c),
            _ => None,
        }
    }

    /// All notes of this event, descending into multi-events.
    pub fn notes(&self) -> Vec<&Note> {
        match self {
            Event::Note(n) => vec![n],
            Event::Multi(events) => events.iter().flat_map(Event::notes).collect(),
            _ => Vec::new(),
        }
    }
}

/// Mensural note values, largest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    Maxima,
    Longa,
    Brevis,
    Semibrevis,
    Minima,
    Semiminima,
    Fusa,
    Semifusa,
}

impl NoteType {
    /// Length in minims under imperfect mensuration throughout.
    pub fn imperfect_minims(self) -> Proportion {
        match self {
            NoteType::Maxima => Proportion::from_integer(16),
            NoteType::Longa => Proportion::from_integer(8),
            NoteType::Brevis => Proportion::from_integer(4),
            NoteType::Semibrevis => Proportion::from_integer(2),
            NoteType::Minima => Proportion::ONE,
            NoteType::Semiminima => Proportion::raw(1, 2),
            NoteType::Fusa => Proportion::raw(1, 4),
            NoteType::Semifusa => Proportion::raw(1, 8),
        }
    }

    pub fn has_stem(self) -> bool {
        !matches!(self, NoteType::Brevis | NoteType::Semibrevis)
    }

    /// Number of flags on the stem.
    pub fn flags(self) -> usize {
        match self {
            NoteType::Fusa => 1,
            NoteType::Semifusa => 2,
            _ => 0,
        }
    }
}

/// Pitch with scientific octave numbering (C4 = middle C).
///
/// Only the letters A to G are accepted; the serde form is
/// `{"letter": "C", "octave": 4}` and is validated on the way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PitchName", into = "PitchName")]
pub struct Pitch {
    /// Diatonic step within the octave, 0 = C.
    step: u8,
    octave: i32,
}

const LETTERS: [char; 7] = ['C', 'D', 'E', 'F', 'G', 'A', 'B'];

#[derive(Serialize, Deserialize)]
struct PitchName {
    letter: char,
    octave: i32,
}

impl TryFrom<PitchName> for Pitch {
    type Error = ModelError;

    fn try_from(name: PitchName) -> Result<Self, Self::Error> {
        Pitch::new(name.letter, name.octave)
    }
}

impl From<Pitch> for PitchName {
    fn from(pitch: Pitch) -> Self {
        PitchName {
            letter: pitch.letter(),
            octave: pitch.octave,
        }
    }
}

impl Pitch {
    /// Letter is case-insensitive.
    pub fn new(letter: char, octave: i32) -> Result<Self, ModelError> {
        let upper = letter.to_ascii_uppercase();
        let step = LETTERS
            .iter()
            .position(|&l| l == upper)
            .ok_or(ModelError::InvalidPitchLetter(letter))?;
        Ok(Self {
            step: step as u8,
            octave,
        })
    }

    /// Natural pitch from a step index (0 = C); wraps into the octave.
    pub(crate) const fn from_step(step: u8, octave: i32) -> Self {
        Self {
            step: step % 7,
            octave,
        }
    }

    pub fn letter(&self) -> char {
        LETTERS[self.step as usize]
    }

    pub fn octave(&self) -> i32 {
        self.octave
    }

    /// Diatonic step count from C0.
    pub fn diatonic(&self) -> i32 {
        self.octave * 7 + self.step as i32
    }

    /// MIDI key number; may fall outside 0..=127 for extreme input.
    pub fn to_midi(&self, accidental: Option<Accidental>) -> i32 {
        const SEMITONES: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];
        let alter = accidental.map_or(0, Accidental::alter);
        (self.octave + 1) * 12 + SEMITONES[self.step as usize] + alter
    }
}

impl std::fmt::Display for Pitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.letter(), self.octave)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accidental {
    Flat,
    Natural,
    Sharp,
}

impl Accidental {
    pub fn alter(self) -> i32 {
        match self {
            Accidental::Flat => -1,
            Accidental::Natural => 0,
            Accidental::Sharp => 1,
        }
    }
}

/// Whether (and how) a note is tied to the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieType {
    #[default]
    None,
    Over,
    Under,
}

impl TieType {
    pub fn is_tied(self) -> bool {
        self != TieType::None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub pitch: Pitch,
    pub note_type: NoteType,
    /// Length in minims.
    pub length: Proportion,
    #[serde(default)]
    pub colored: bool,
    /// Part of a ligature; the first following note without this flag ends it.
    #[serde(default)]
    pub ligated: bool,
    #[serde(default)]
    pub tie: TieType,
    #[serde(default)]
    pub accidental: Option<Accidental>,
}

impl Note {
    /// A plain note with its imperfect length.
    pub fn new(pitch: Pitch, note_type: NoteType) -> Self {
        Self {
            pitch,
            note_type,
            length: note_type.imperfect_minims(),
            colored: false,
            ligated: false,
            tie: TieType::None,
            accidental: None,
        }
    }

    pub fn with_length(mut self, length: Proportion) -> Self {
        self.length = length;
        self
    }

    pub fn tied(mut self, tie: TieType) -> Self {
        self.tie = tie;
        self
    }

    pub fn ligated(mut self) -> Self {
        self.ligated = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rest {
    pub note_type: NoteType,
    pub length: Proportion,
}

impl Rest {
    pub fn new(note_type: NoteType) -> Self {
        Self {
            note_type,
            length: note_type.imperfect_minims(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClefKind {
    C,
    F,
    G,
    Gamma,
    /// Signature flat.
    Flat,
    /// Signature sharp.
    Sharp,
}

impl ClefKind {
    pub fn is_letter(self) -> bool {
        matches!(self, ClefKind::C | ClefKind::F | ClefKind::G | ClefKind::Gamma)
    }

    /// The pitch a letter clef names on its own staff position.
    pub fn named_pitch(self) -> Option<Pitch> {
        match self {
            ClefKind::C => Some(Pitch::from_step(0, 4)),
            ClefKind::F => Some(Pitch::from_step(3, 3)),
            ClefKind::G => Some(Pitch::from_step(4, 4)),
            ClefKind::Gamma => Some(Pitch::from_step(4, 2)),
            ClefKind::Flat | ClefKind::Sharp => None,
        }
    }
}

/// A clef or signature accidental.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClefEvent {
    pub kind: ClefKind,
    /// Diatonic steps above the bottom staff line (0 = bottom line, 8 = top line).
    pub staff_step: i32,
    /// Editorial modern clef shown next to the original one.
    #[serde(default)]
    pub modern_equivalent: bool,
}

impl ClefEvent {
    pub fn new(kind: ClefKind, staff_step: i32) -> Self {
        Self {
            kind,
            staff_step,
            modern_equivalent: false,
        }
    }

    /// Letter clefs from the source; these always start a new clef set.
    pub fn is_principal(&self) -> bool {
        self.kind.is_letter() && !self.modern_equivalent
    }

    /// Two clefs cannot stand in the same set.
    pub fn contradicts(&self, other: &ClefEvent) -> bool {
        match (self.kind.is_letter(), other.kind.is_letter()) {
            (false, false) => {
                self.staff_step.rem_euclid(7) == other.staff_step.rem_euclid(7)
                    && self.kind != other.kind
            }
            (true, true) => {
                self.modern_equivalent
                    && other.modern_equivalent
                    && (self.kind, self.staff_step) != (other.kind, other.staff_step)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MensurationSign {
    Circle,
    Semicircle,
    /// Reversed semicircle.
    ReversedSemicircle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mensuration {
    pub sign: MensurationSign,
    #[serde(default)]
    pub dot: bool,
    #[serde(default)]
    pub stroke: bool,
    /// Semibreves per breve (2 or 3).
    pub tempus: u8,
    /// Minims per semibreve (2 or 3).
    pub prolatio: u8,
}

impl Mensuration {
    pub fn new(sign: MensurationSign, tempus: u8, prolatio: u8) -> Self {
        Self {
            sign,
            dot: prolatio == 3,
            stroke: false,
            tempus,
            prolatio,
        }
    }

    /// Minims in one breve, which is one measure.
    pub fn breve_minims(&self) -> u32 {
        (self.tempus.max(1) as u32) * (self.prolatio.max(1) as u32)
    }
}

impl Default for Mensuration {
    fn default() -> Self {
        Mensuration::new(MensurationSign::Semicircle, 2, 2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    Start,
    End,
}

/// Start or end of a passage with alternate readings. Only start markers
/// carry readings; the default reading is whatever the voice holds between
/// the two markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantMarker {
    pub kind: MarkerKind,
    #[serde(default)]
    pub readings: Vec<VariantReading>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantReading {
    pub sources: Vec<String>,
    pub events: Vec<Event>,
    /// Editor flagged this reading as a scribal error.
    #[serde(default)]
    pub error: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_letters_are_validated() {
        assert_eq!(Pitch::new('h', 4), Err(ModelError::InvalidPitchLetter('h')));
        let b = Pitch::new('b', 3).unwrap();
        assert_eq!(b.letter(), 'B');
        assert_eq!(b.to_midi(None), 59);
        assert_eq!(b.to_string(), "B3");
    }

    #[test]
    fn pitch_json_is_checked() {
        let pitch: Pitch = serde_json::from_str(r#"{"letter": "F", "octave": 3}"#).unwrap();
        assert_eq!(pitch, Pitch::new('F', 3).unwrap());
        assert_eq!(
            serde_json::to_value(pitch).unwrap(),
            serde_json::json!({"letter": "F", "octave": 3})
        );
        assert!(serde_json::from_str::<Pitch>(r#"{"letter": "X", "octave": 3}"#).is_err());
    }
}
