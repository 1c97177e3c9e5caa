//! Integration tests for MIDI sequencing, the timemap and SMF export.

mod common;

use cmmescore::*;
use common::*;
use pretty_assertions::assert_eq;

/// 96 ticks per semibreve beat.
const TICKS_PER_MINIM: u64 = 48;

fn sequence(piece: &Piece) -> Sequence {
    build_sequence(&render(piece), &Config::default()).unwrap()
}

fn notes(track: &MidiTrack) -> (Vec<(u64, u8)>, Vec<(u64, u8)>) {
    let ons = track
        .note_ons()
        .map(|m| match m.message {
            MidiMessageKind::NoteOn { key, .. } => (m.tick, key),
            _ => unreachable!(),
        })
        .collect();
    let offs = track
        .note_offs()
        .map(|m| match m.message {
            MidiMessageKind::NoteOff { key } => (m.tick, key),
            _ => unreachable!(),
        })
        .collect();
    (ons, offs)
}

// ═══════════════════════════════════════════════════════════════════════
// Ties
// ═══════════════════════════════════════════════════════════════════════

/// A minim rest, then a chain of `n` tied semibreves on G4.
fn tie_chain(n: usize) -> Piece {
    let mut events = vec![clef(ClefKind::C, 4), rest(NoteType::Minima)];
    for i in 0..n {
        if i + 1 < n {
            events.push(tied('G', 4, NoteType::Semibrevis));
        } else {
            events.push(note('G', 4, NoteType::Semibrevis));
        }
    }
    piece(&["Tenor"], vec![vec![events]])
}

#[test]
fn tie_chains_sound_once() {
    for n in [2, 3, 4, 5] {
        let seq = sequence(&tie_chain(n));
        let (ons, offs) = notes(&seq.tracks[0]);
        let start = TICKS_PER_MINIM;
        let end = start + n as u64 * 2 * TICKS_PER_MINIM;
        assert_eq!(ons, vec![(start, 67)], "chain of {n}");
        assert_eq!(offs, vec![(end, 67)], "chain of {n}");
    }
}

#[test]
fn tie_to_different_pitch_is_ignored() {
    let seq = sequence(&piece(
        &["Tenor"],
        vec![vec![vec![
            tied('G', 4, NoteType::Semibrevis),
            note('A', 4, NoteType::Semibrevis),
        ]]],
    ));
    let (ons, offs) = notes(&seq.tracks[0]);
    assert_eq!(ons, vec![(0, 67), (96, 69)]);
    assert_eq!(offs, vec![(96, 67), (192, 69)]);
}

#[test]
fn tie_broken_by_rest_is_ignored() {
    let seq = sequence(&piece(
        &["Tenor"],
        vec![vec![vec![
            tied('G', 4, NoteType::Minima),
            rest(NoteType::Minima),
            note('G', 4, NoteType::Minima),
        ]]],
    ));
    let (ons, _) = notes(&seq.tracks[0]);
    assert_eq!(ons, vec![(0, 67), (96, 67)]);
}

// ═══════════════════════════════════════════════════════════════════════
// Multi-events and proportions
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn multi_event_joins_at_longest_branch() {
    for multi in [
        Event::Multi(vec![note_of('C', 4, 2), note_of('E', 4, 3)]),
        Event::Multi(vec![note_of('E', 4, 3), note_of('C', 4, 2)]),
    ] {
        let seq = sequence(&piece(
            &["Tenor"],
            vec![vec![vec![rest(NoteType::Minima), multi, note('G', 4, NoteType::Minima)]]],
        ));
        let (ons, offs) = notes(&seq.tracks[0]);
        let t = TICKS_PER_MINIM;
        assert!(ons.contains(&(t, 60)) && ons.contains(&(t, 64)));
        assert!(offs.contains(&(t + 2 * TICKS_PER_MINIM, 60)));
        assert!(offs.contains(&(t + 3 * TICKS_PER_MINIM, 64)));
        // The following note starts where the longer branch ends.
        assert_eq!(ons.last(), Some(&(t + 3 * TICKS_PER_MINIM, 67)));
    }
}

#[test]
fn proportion_divides_note_lengths() {
    let seq = sequence(&piece(
        &["Tenor"],
        vec![vec![vec![
            Event::ProportionChange(Proportion::new(3, 2).unwrap()),
            note('C', 4, NoteType::Semibrevis),
            note('D', 4, NoteType::Semibrevis),
            note('E', 4, NoteType::Semibrevis),
        ]]],
    ));
    let (ons, _) = notes(&seq.tracks[0]);
    // Each semibreve lasts 4/3 minims = 64 ticks.
    assert_eq!(ons, vec![(0, 60), (64, 62), (128, 64)]);
}

#[test]
fn rests_advance_time() {
    let seq = sequence(&piece(
        &["Tenor"],
        vec![vec![vec![rest(NoteType::Brevis), note('F', 4, NoteType::Minima)]]],
    ));
    let (ons, _) = notes(&seq.tracks[0]);
    assert_eq!(ons, vec![(4 * TICKS_PER_MINIM, 65)]);
}

// ═══════════════════════════════════════════════════════════════════════
// Markers, sections, channels
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn markers_are_one_based_and_sections_are_separated() {
    let seq = sequence(&piece(&["Tenor"], vec![vec![breves(1)], vec![breves(1)]]));
    let markers: Vec<(u64, MidiMessageKind)> =
        seq.tracks[0].markers().map(|m| (m.tick, m.message)).collect();
    assert_eq!(
        markers,
        vec![
            (0, MidiMessageKind::Marker { measure: 1 }),
            // Four minims, then one beat of rest.
            (6 * TICKS_PER_MINIM, MidiMessageKind::Marker { measure: 2 }),
        ]
    );
    assert_eq!(seq.length_ticks, 10 * TICKS_PER_MINIM);
}

#[test]
fn only_first_track_carries_markers() {
    let seq = sequence(&piece(&["Cantus", "Tenor"], vec![vec![breves(2), breves(2)]]));
    assert_eq!(seq.tracks[0].markers().count(), 2);
    assert_eq!(seq.tracks[1].markers().count(), 0);
}

#[test]
fn channels_wrap_at_max_channels() {
    let names: Vec<String> = (0..10).map(|i| format!("V{i}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let voices = (0..10).map(|_| breves(1)).collect();
    let seq = sequence(&piece(&name_refs, vec![voices]));
    let channels: Vec<u8> = seq.tracks.iter().map(|t| t.channel).collect();
    assert_eq!(channels, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 0]);
}

#[test]
fn voices_never_land_on_the_percussion_channel() {
    let names: Vec<String> = (0..12).map(|i| format!("V{i}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let voices = (0..12).map(|_| breves(1)).collect();
    let config = Config {
        max_channels: 15,
        ..Config::default()
    };
    let seq = build_sequence(&render(&piece(&name_refs, vec![voices])), &config).unwrap();
    let channels: Vec<u8> = seq.tracks.iter().map(|t| t.channel).collect();
    assert_eq!(channels, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12]);
}

#[test]
fn empty_section_adds_no_rest() {
    let seq = sequence(&piece(
        &["Tenor"],
        vec![vec![breves(1)], vec![vec![]], vec![breves(1)]],
    ));
    let ticks: Vec<u64> = seq.tracks[0].markers().map(|m| m.tick).collect();
    // One gap between the two sounding sections, none for the empty one.
    assert_eq!(ticks, vec![0, 6 * TICKS_PER_MINIM]);
}

#[test]
fn start_tick_matches_timemap() {
    let score = render(&piece(&["Tenor"], vec![vec![breves(2)], vec![breves(2)]]));
    let config = Config::default();
    let timemap = generate_timemap(&score, &config);
    for (m, entry) in timemap.iter().enumerate() {
        assert_eq!(start_tick_for_measure(&score, &config, m), Ok(entry.start_tick));
    }
    // Two measures of four minims, one beat of rest, one more measure.
    assert_eq!(timemap[3].start_tick, 14 * TICKS_PER_MINIM);
}

#[test]
fn finer_resolution_from_config() {
    let config = Config::from_json_str(r#"{"ticks_per_beat": 192}"#).unwrap();
    let seq = build_sequence(&render(&tie_chain(1)), &config).unwrap();
    let (ons, _) = notes(&seq.tracks[0]);
    assert_eq!(ons, vec![(96, 67)]);
    assert_eq!(seq.ticks_per_beat, 192);
}

#[test]
fn invalid_config_is_rejected() {
    let config = Config {
        max_channels: 0,
        ..Config::default()
    };
    let err = build_sequence(&render(&tie_chain(1)), &config).unwrap_err();
    assert!(matches!(err, SequenceError::Config(_)));
}

// ═══════════════════════════════════════════════════════════════════════
// SMF export
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn smf_has_one_track_per_voice() {
    let seq = sequence(&piece(
        &["Cantus", "Altus", "Tenor"],
        vec![vec![breves(2), breves(2), breves(2)]],
    ));
    let bytes = seq.to_smf_bytes().unwrap();
    assert_eq!(&bytes[0..4], b"MThd");

    let smf = midly::Smf::parse(&bytes).unwrap();
    assert_eq!(smf.header.format, midly::Format::Parallel);
    assert_eq!(smf.tracks.len(), 3);
    let note_ons = smf.tracks[1]
        .iter()
        .filter(|e| {
            matches!(
                e.kind,
                midly::TrackEventKind::Midi {
                    message: midly::MidiMessage::NoteOn { .. },
                    ..
                }
            )
        })
        .count();
    assert_eq!(note_ons, 2);
}

#[test]
fn smf_is_written_to_disk() {
    let seq = sequence(&tie_chain(3));
    let path = std::env::temp_dir().join(format!("cmmescore-test-{}.mid", std::process::id()));
    seq.save(&path).unwrap();
    let written = std::fs::read(&path).unwrap();
    assert_eq!(written, seq.to_smf_bytes().unwrap());
    std::fs::remove_file(&path).unwrap();
}
