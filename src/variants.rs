//! Critical-apparatus catalog: one report per variant start marker, with
//! the kinds of difference its alternate readings introduce.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Serialize, Serializer};

use crate::model::{Event, MarkerKind, Note, VariantMarker, VariantReading};
use crate::renderer::{RenderedScore, RenderedSection, RenderedVoice};

/// Set of difference categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VariantType(u32);

impl VariantType {
    pub const NONE: VariantType = VariantType(0);
    pub const RHYTHM: VariantType = VariantType(1 << 0);
    pub const PITCH: VariantType = VariantType(1 << 1);
    pub const ACCIDENTAL: VariantType = VariantType(1 << 2);
    pub const COLORATION: VariantType = VariantType(1 << 3);
    pub const LIGATURE: VariantType = VariantType(1 << 4);
    pub const MENSURATION: VariantType = VariantType(1 << 5);
    pub const CLEF: VariantType = VariantType(1 << 6);
    pub const ERROR: VariantType = VariantType(1 << 7);
    pub const OTHER: VariantType = VariantType(1 << 8);

    const NAMED: [(VariantType, &'static str); 9] = [
        (Self::RHYTHM, "rhythm"),
        (Self::PITCH, "pitch"),
        (Self::ACCIDENTAL, "accidental"),
        (Self::COLORATION, "coloration"),
        (Self::LIGATURE, "ligature"),
        (Self::MENSURATION, "mensuration"),
        (Self::CLEF, "clef"),
        (Self::ERROR, "error"),
        (Self::OTHER, "other"),
    ];

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: VariantType) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: VariantType) {
        self.0 |= other.0;
    }

    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for VariantType {
    type Output = VariantType;

    fn bitor(self, rhs: VariantType) -> VariantType {
        VariantType(self.0 | rhs.0)
    }
}

impl BitOrAssign for VariantType {
    fn bitor_assign(&mut self, rhs: VariantType) {
        self.insert(rhs);
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join(", "))
    }
}

impl Serialize for VariantType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.names().serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantReport {
    pub voice: usize,
    /// 1-based; one past the start measure when the reading closes later.
    pub measure_num: usize,
    pub spans_measure_boundary: bool,
    pub measure_label: String,
    pub var_types: VariantType,
    pub num_readings: usize,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VariantAnalysisList {
    reports: Vec<VariantReport>,
}

impl VariantAnalysisList {
    /// Scan every voice of every section.
    pub fn new(score: &RenderedScore) -> Self {
        let mut reports = Vec::new();
        for section in &score.sections {
            for (v, slot) in section.voices.iter().enumerate() {
                if let Some(voice) = slot {
                    collect_voice(section, v, voice, &mut reports);
                }
            }
        }
        log::debug!("found {} variant locations", reports.len());
        Self::from_reports(reports)
    }

    /// Order by measure, non-spanning before spanning, then voice.
    pub fn from_reports(mut reports: Vec<VariantReport>) -> Self {
        reports.sort_by_key(|r| (r.measure_num, r.spans_measure_boundary, r.voice));
        Self { reports }
    }

    pub fn reports(&self) -> &[VariantReport] {
        &self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VariantReport> {
        self.reports.iter()
    }

    pub fn in_measure(&self, measure_num: usize) -> impl Iterator<Item = &VariantReport> {
        self.reports.iter().filter(move |r| r.measure_num == measure_num)
    }

    pub fn in_voice(&self, voice: usize) -> impl Iterator<Item = &VariantReport> {
        self.reports.iter().filter(move |r| r.voice == voice)
    }

    pub fn with_type(&self, flag: VariantType) -> impl Iterator<Item = &VariantReport> {
        self.reports.iter().filter(move |r| r.var_types.contains(flag))
    }
}

impl<'a> IntoIterator for &'a VariantAnalysisList {
    type Item = &'a VariantReport;
    type IntoIter = std::slice::Iter<'a, VariantReport>;

    fn into_iter(self) -> Self::IntoIter {
        self.reports.iter()
    }
}

fn collect_voice(
    section: &RenderedSection,
    voice_num: usize,
    voice: &RenderedVoice,
    reports: &mut Vec<VariantReport>,
) {
    let global_measure = |event_num: usize| {
        voice.events[event_num]
            .measure
            .and_then(|m| section.measures.get(m))
            .map_or(0, |m| m.measure_num)
    };

    for group in &voice.variant_groups {
        let (Some(first), Some(last)) = (group.first_event_num, group.last_event_num) else {
            continue;
        };
        let Event::VariantMarker(marker) = &voice.events[first].event else {
            continue;
        };
        let default_events: Vec<&Event> = voice.events[first + 1..=last]
            .iter()
            .map(|e| &e.event)
            .filter(|e| !is_end_marker(e))
            .collect();

        // An end marker sitting on a barline closes the measure before it.
        // A reading left open at section end closes on the last event itself.
        let close_bound = if is_end_marker(&voice.events[last].event) {
            last
        } else {
            last + 1
        };
        let closing = (first + 1..close_bound)
            .rev()
            .find(|&i| !voice.events[i].real_length.is_zero())
            .unwrap_or(first);
        let start = global_measure(first) + 1;
        let end = global_measure(closing) + 1;
        let spans = end > start;
        reports.push(VariantReport {
            voice: voice_num,
            measure_num: if spans { start + 1 } else { start },
            spans_measure_boundary: spans,
            measure_label: if spans {
                format!("{start}-{end}")
            } else {
                start.to_string()
            },
            var_types: marker_types(marker, &default_events),
            num_readings: marker.readings.len(),
            sources: sources_of(marker),
        });
    }
}

fn is_end_marker(event: &Event) -> bool {
    matches!(event, Event::VariantMarker(m) if m.kind == MarkerKind::End)
}

fn sources_of(marker: &VariantMarker) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for s in marker.readings.iter().flat_map(|r| r.sources.iter()) {
        if !sources.contains(s) {
            sources.push(s.clone());
        }
    }
    sources
}

/// Union of the differences of every reading against the default.
fn marker_types(marker: &VariantMarker, default_events: &[&Event]) -> VariantType {
    marker
        .readings
        .iter()
        .fold(VariantType::NONE, |acc, r| acc | reading_types(r, default_events))
}

pub(crate) fn reading_types(reading: &VariantReading, default_events: &[&Event]) -> VariantType {
    let mut types = VariantType::NONE;
    if reading.error {
        types |= VariantType::ERROR;
    }
    let alternate: Vec<&Event> = reading.events.iter().collect();

    let default_notes = notes_of(default_events);
    let alt_notes = notes_of(&alternate);
    if default_notes.len() != alt_notes.len() {
        types |= VariantType::RHYTHM;
    }
    for (a, b) in default_notes.iter().zip(&alt_notes) {
        if a.note_type != b.note_type || a.length != b.length {
            types |= VariantType::RHYTHM;
        }
        if a.pitch != b.pitch {
            types |= VariantType::PITCH;
        }
        if a.accidental != b.accidental {
            types |= VariantType::ACCIDENTAL;
        }
        if a.colored != b.colored {
            types |= VariantType::COLORATION;
        }
        if a.ligated != b.ligated {
            types |= VariantType::LIGATURE;
        }
    }

    let rests = |events: &[&Event]| -> Vec<_> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Rest(r) => Some(r.length),
                _ => None,
            })
            .collect()
    };
    if rests(default_events) != rests(&alternate) {
        types |= VariantType::RHYTHM;
    }

    let mensural = |events: &[&Event]| -> Vec<Event> {
        events
            .iter()
            .filter(|e| matches!(e, Event::Mensuration(_) | Event::ProportionChange(_)))
            .map(|e| (*e).clone())
            .collect()
    };
    if mensural(default_events) != mensural(&alternate) {
        types |= VariantType::MENSURATION;
    }

    let clefs = |events: &[&Event]| -> Vec<Event> {
        events
            .iter()
            .filter(|e| matches!(e, Event::Clef(_)))
            .map(|e| (*e).clone())
            .collect()
    };
    if clefs(default_events) != clefs(&alternate) {
        types |= VariantType::CLEF;
    }

    let differs = default_events.len() != alternate.len()
        || default_events.iter().zip(&alternate).any(|(a, b)| a != b);
    if differs && (types.is_empty() || types == VariantType::ERROR) {
        types |= VariantType::OTHER;
    }
    types
}

fn notes_of<'a>(events: &[&'a Event]) -> Vec<&'a Note> {
    events.iter().flat_map(|e| e.notes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Accidental, NoteType, Pitch};

    fn report(measure_num: usize, spans: bool, voice: usize) -> VariantReport {
        VariantReport {
            voice,
            measure_num,
            spans_measure_boundary: spans,
            measure_label: measure_num.to_string(),
            var_types: VariantType::NONE,
            num_readings: 1,
            sources: Vec::new(),
        }
    }

    #[test]
    fn spanning_reports_sort_last_within_measure() {
        let list = VariantAnalysisList::from_reports(vec![
            report(3, false, 0),
            report(3, true, 0),
            report(2, false, 1),
        ]);
        let order: Vec<_> = list
            .iter()
            .map(|r| (r.measure_num, r.spans_measure_boundary))
            .collect();
        assert_eq!(order, vec![(2, false), (3, false), (3, true)]);
    }

    #[test]
    fn flag_set_operations() {
        let mut t = VariantType::PITCH | VariantType::RHYTHM;
        assert!(t.contains(VariantType::PITCH));
        assert!(!t.contains(VariantType::CLEF));
        assert!(!t.contains(VariantType::NONE));
        t |= VariantType::CLEF;
        assert_eq!(t.names(), vec!["rhythm", "pitch", "clef"]);
        assert_eq!(t.to_string(), "rhythm, pitch, clef");
    }

    fn note(letter: char) -> Event {
        Event::Note(Note::new(Pitch::new(letter, 4).unwrap(), NoteType::Semibrevis))
    }

    fn reading(events: Vec<Event>) -> VariantReading {
        VariantReading {
            sources: vec!["A".into()],
            events,
            error: false,
        }
    }

    #[test]
    fn classifies_reading_differences() {
        let default = [note('C'), note('D')];
        let refs: Vec<&Event> = default.iter().collect();

        let pitch = reading(vec![note('C'), note('E')]);
        assert_eq!(reading_types(&pitch, &refs), VariantType::PITCH);

        let rhythm = reading(vec![note('C')]);
        assert_eq!(reading_types(&rhythm, &refs), VariantType::RHYTHM);

        let flat = Note {
            accidental: Some(Accidental::Flat),
            ..Note::new(Pitch::new('D', 4).unwrap(), NoteType::Semibrevis)
        };
        let accidental = reading(vec![note('C'), Event::Note(flat)]);
        assert_eq!(reading_types(&accidental, &refs), VariantType::ACCIDENTAL);

        let same = VariantReading {
            error: true,
            ..reading(default.to_vec())
        };
        assert_eq!(reading_types(&same, &refs), VariantType::ERROR);
    }
}
