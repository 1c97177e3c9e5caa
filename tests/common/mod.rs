//! Piece builders shared by the integration tests.

#![allow(dead_code)]

use cmmescore::*;

pub fn voices(names: &[&str]) -> Vec<VoiceInfo> {
    names
        .iter()
        .map(|n| VoiceInfo {
            name: n.to_string(),
            abbreviation: None,
        })
        .collect()
}

/// `sections[s][v]` holds the events of voice `v` in section `s`; an empty
/// list leaves the voice silent in that section.
pub fn piece(names: &[&str], sections: Vec<Vec<Vec<Event>>>) -> Piece {
    Piece {
        title: Some("Test piece".into()),
        composer: Some("Anon.".into()),
        voices: voices(names),
        sections: sections
            .into_iter()
            .map(|voices| Section {
                voices: voices
                    .into_iter()
                    .map(|events| (!events.is_empty()).then_some(VoiceSection { events }))
                    .collect(),
            })
            .collect(),
    }
}

pub fn note(letter: char, octave: i32, note_type: NoteType) -> Event {
    Event::Note(Note::new(Pitch::new(letter, octave).unwrap(), note_type))
}

pub fn tied(letter: char, octave: i32, note_type: NoteType) -> Event {
    Event::Note(Note::new(Pitch::new(letter, octave).unwrap(), note_type).tied(TieType::Over))
}

pub fn note_of(letter: char, octave: i32, minims: i64) -> Event {
    Event::Note(
        Note::new(Pitch::new(letter, octave).unwrap(), NoteType::Semibrevis)
            .with_length(Proportion::from_integer(minims)),
    )
}

pub fn rest(note_type: NoteType) -> Event {
    Event::Rest(Rest::new(note_type))
}

pub fn clef(kind: ClefKind, staff_step: i32) -> Event {
    Event::Clef(ClefEvent::new(kind, staff_step))
}

pub fn variant_start(readings: Vec<VariantReading>) -> Event {
    Event::VariantMarker(VariantMarker {
        kind: MarkerKind::Start,
        readings,
    })
}

pub fn variant_end() -> Event {
    Event::VariantMarker(VariantMarker {
        kind: MarkerKind::End,
        readings: Vec::new(),
    })
}

pub fn reading(sources: &[&str], events: Vec<Event>) -> VariantReading {
    VariantReading {
        sources: sources.iter().map(|s| s.to_string()).collect(),
        events,
        error: false,
    }
}

/// A C clef followed by `n` breves.
pub fn breves(n: usize) -> Vec<Event> {
    let mut events = vec![clef(ClefKind::C, 4)];
    events.extend((0..n).map(|_| note('D', 4, NoteType::Brevis)));
    events
}

pub fn render(piece: &Piece) -> RenderedScore {
    ScoreRenderer::render(piece).unwrap()
}
