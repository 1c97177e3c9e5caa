//! Event rendering: draws every event of every measure in a system and
//! records where notes landed for the tie and ligature pass. Ligature
//! members are only placed here; the ligature pass draws them as one shape.

use std::collections::HashMap;

use crate::model::{Event, MarkerKind, Pitch};

use super::clef_set::RenderedClefSet;
use super::draw::*;
use super::page::RenderedStaffSystem;
use super::section::{RenderedScore, RenderedVoice};

/// Where a note was drawn.
#[derive(Debug, Clone, Copy)]
pub(super) struct PlacedNote {
    pub(super) x: f64,
    pub(super) y: f64,
    pub(super) width: f64,
    pub(super) step: i32,
}

/// Keyed by (section, voice, event index).
pub(super) type Placements = HashMap<(usize, usize, usize), PlacedNote>;

pub(super) fn render_events<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    score: &RenderedScore,
    system: &RenderedStaffSystem,
) -> Placements {
    let mut placements = Placements::new();

    for (pos_i, pos) in system.measures.iter().enumerate() {
        let section = &score.sections[pos.section];
        for (v, slot) in section.voices.iter().enumerate() {
            let Some(voice) = slot else { continue };
            let top = system.staff_top(v);
            // Leading clefs and sign of a system's first measure already sit
            // in the left info.
            let mut leading = pos_i == 0 && system.left_info_width > 0.0;
            let mut sign_seen = false;

            for (ei, ev) in voice.events_in_measure(pos.section_measure) {
                leading = leading
                    && match ev.event {
                        Event::Clef(_) => !sign_seen,
                        Event::Mensuration(_) => {
                            sign_seen = true;
                            true
                        }
                        _ => false,
                    };
                if leading {
                    continue;
                }
                let x = pos.x + ev.xloc * system.spacing_coefficient;
                let step_of = |p: &Pitch| staff_step(voice, ev.clef_set, p);
                let placed = match &ev.event {
                    // Ligature members are drawn together once the group is placed.
                    Event::Note(note) if ev.ligature.is_some() => {
                        let step = step_of(&note.pitch);
                        Some(PlacedNote {
                            x,
                            y: top + step_y(step, 1.0),
                            width: note_width(note),
                            step,
                        })
                    }
                    event => render_event(surface, event, &step_of, x, top),
                };
                if let Some(placed) = placed {
                    placements.insert((pos.section, v, ei), placed);
                }
            }
        }
    }
    placements
}

fn staff_step(voice: &RenderedVoice, clef_set: Option<usize>, pitch: &Pitch) -> i32 {
    clef_set
        .and_then(|i| voice.clef_sets.get(i))
        .map_or_else(|| RenderedClefSet::unclefed_staff_step(pitch), |set| set.staff_step_of(pitch))
}

fn render_event<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    event: &Event,
    step_of: &dyn Fn(&Pitch) -> i32,
    x: f64,
    top: f64,
) -> Option<PlacedNote> {
    match event {
        Event::Note(note) => {
            let step = step_of(&note.pitch);
            let width = draw_note(surface, note, step, x, top, 1.0);
            Some(PlacedNote {
                x,
                y: top + step_y(step, 1.0),
                width,
                step,
            })
        }
        Event::Rest(rest) => {
            draw_rest(surface, rest, x, top, 1.0);
            None
        }
        Event::Clef(clef) => {
            draw_clef(surface, clef, x, top, 1.0);
            None
        }
        Event::Mensuration(m) => {
            draw_mensuration(surface, m, x, top, 1.0);
            None
        }
        Event::ProportionChange(p) => {
            draw_proportion(surface, *p, x, top, 1.0);
            None
        }
        Event::Multi(children) => {
            // Children share one x position; the first note anchors ties.
            children
                .iter()
                .filter_map(|child| render_event(surface, child, step_of, x, top))
                .reduce(|first, _| first)
        }
        Event::VariantMarker(marker) => {
            if marker.kind == MarkerKind::Start {
                draw_variant_flag(surface, x, top, 1.0);
            }
            None
        }
    }
}
