//! Integration tests for the variant catalog.

mod common;

use cmmescore::*;
use common::*;
use pretty_assertions::assert_eq;

fn sb(letter: char) -> Event {
    note(letter, 4, NoteType::Semibrevis)
}

/// Measures hold two semibreves each.
///
/// Voice 0: a rhythm variant filling measure 3.
/// Voice 1: a pitch variant inside measure 2, then an error reading that
/// starts in measure 2 and closes in measure 3.
fn apparatus_piece() -> Piece {
    let cantus = vec![
        sb('C'),
        sb('D'),
        sb('E'),
        sb('F'),
        variant_start(vec![reading(&["Bologna Q15"], vec![note('G', 4, NoteType::Brevis)])]),
        sb('G'),
        sb('A'),
        variant_end(),
        sb('G'),
        sb('F'),
    ];
    let tenor = vec![
        sb('C'),
        sb('D'),
        variant_start(vec![
            reading(&["Oxford 213"], vec![sb('F')]),
            reading(&["Bologna Q15", "Oxford 213"], vec![sb('F')]),
        ]),
        sb('E'),
        variant_end(),
        variant_start(vec![VariantReading {
            error: true,
            ..reading(&["Trent 92"], vec![sb('D'), sb('C')])
        }]),
        sb('D'),
        sb('C'),
        variant_end(),
        sb('D'),
    ];
    piece(&["Cantus", "Tenor"], vec![vec![cantus, tenor]])
}

#[test]
fn reports_are_sorted_by_measure_then_spanning() {
    let list = VariantAnalysisList::new(&render(&apparatus_piece()));
    let rows: Vec<(usize, bool, usize, &str)> = list
        .iter()
        .map(|r| (r.measure_num, r.spans_measure_boundary, r.voice, r.measure_label.as_str()))
        .collect();
    assert_eq!(
        rows,
        vec![(2, false, 1, "2"), (3, false, 0, "3"), (3, true, 1, "2-3")]
    );
}

#[test]
fn flags_describe_reading_differences() {
    let list = VariantAnalysisList::new(&render(&apparatus_piece()));
    let by_label = |voice: usize, label: &str| {
        list.in_voice(voice)
            .find(|r| r.measure_label == label)
            .cloned()
            .unwrap()
    };

    let rhythm = by_label(0, "3");
    assert_eq!(rhythm.var_types, VariantType::RHYTHM);

    let pitch = by_label(1, "2");
    assert_eq!(pitch.var_types, VariantType::PITCH);
    assert_eq!(pitch.num_readings, 2);
    assert_eq!(pitch.sources, vec!["Oxford 213", "Bologna Q15"]);

    let error = by_label(1, "2-3");
    assert_eq!(error.var_types, VariantType::ERROR);
}

#[test]
fn queries_filter_reports() {
    let list = VariantAnalysisList::new(&render(&apparatus_piece()));
    assert_eq!(list.len(), 3);
    assert_eq!(list.in_measure(3).count(), 2);
    assert_eq!(list.in_voice(1).count(), 2);
    assert_eq!(list.with_type(VariantType::PITCH).count(), 1);
    assert_eq!(list.with_type(VariantType::RHYTHM | VariantType::PITCH).count(), 0);
    assert_eq!(list.with_type(VariantType::ERROR).count(), 1);
    assert_eq!(list.with_type(VariantType::CLEF).count(), 0);
}

#[test]
fn markers_do_not_disturb_timing() {
    let plain = piece(&["Tenor"], vec![vec![vec![sb('C'), sb('D'), sb('E')]]]);
    let marked = piece(
        &["Tenor"],
        vec![vec![vec![
            sb('C'),
            variant_start(vec![reading(&["A"], vec![sb('F')])]),
            sb('D'),
            variant_end(),
            sb('E'),
        ]]],
    );
    let config = Config::default();
    let a = build_sequence(&render(&plain), &config).unwrap();
    let b = build_sequence(&render(&marked), &config).unwrap();
    let ticks = |s: &Sequence| s.tracks[0].note_ons().map(|m| m.tick).collect::<Vec<_>>();
    assert_eq!(ticks(&a), ticks(&b));
}

#[test]
fn report_json_lists_flag_names() {
    let list = VariantAnalysisList::new(&render(&apparatus_piece()));
    let json = serde_json::to_value(&list).unwrap();
    assert_eq!(json["reports"][0]["var_types"], serde_json::json!(["pitch"]));
}

#[test]
fn reading_left_open_matches_explicit_close() {
    let passage = |closed: bool| {
        let mut events = vec![
            sb('C'),
            sb('D'),
            variant_start(vec![reading(&["Chigi"], vec![sb('E'), sb('G'), sb('G')])]),
            sb('E'),
            sb('F'),
            sb('G'),
        ];
        if closed {
            events.push(variant_end());
        }
        piece(&["Tenor"], vec![vec![events]])
    };
    let row = |closed: bool| {
        let list = VariantAnalysisList::new(&render(&passage(closed)));
        let r = list.iter().next().cloned().unwrap();
        (r.measure_num, r.spans_measure_boundary, r.measure_label, r.var_types)
    };

    let open = row(false);
    assert_eq!(open, row(true));
    assert_eq!(open, (3, true, "2-3".to_string(), VariantType::PITCH));
}
