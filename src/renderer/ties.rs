//! Tie arcs, ligature shapes and ligature brackets.
//!
//! A tie chain of n notes gets n-1 arcs, one per joint. A joint broken by a
//! system break is drawn as two halves: to the right edge of the first
//! system and from the music start of the next.

use crate::model::{Event, TieType};

use super::constants::*;
use super::draw::{draw_ligature, DrawingSurface, LigatureMember, PathCmd};
use super::event_group::{ExtremeNote, TieState};
use super::notes::{PlacedNote, Placements};
use super::page::RenderedStaffSystem;
use super::section::RenderedScore;

const TIE_NOTEHEAD_OFFSET: f64 = 4.0;
const TIE_HEIGHT_FACTOR: f64 = 0.15;
const TIE_MIN_HEIGHT: f64 = 3.0;
const TIE_MAX_HEIGHT: f64 = 10.0;
const TIE_THICKNESS: f64 = 1.2;
const BRACKET_CLEARANCE: f64 = 8.0;
const BRACKET_HOOK: f64 = 3.0;

pub(super) fn render_ties<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    score: &RenderedScore,
    system: &RenderedStaffSystem,
    placements: &Placements,
) {
    let mut sections: Vec<usize> = system.measures.iter().map(|m| m.section).collect();
    sections.dedup();

    for s in sections {
        for (v, slot) in score.sections[s].voices.iter().enumerate() {
            let Some(voice) = slot else { continue };
            for tie in &voice.ties {
                let (Some(first), Some(last)) = (tie.group.first_event_num, tie.group.last_event_num) else {
                    continue;
                };
                let chain: Vec<usize> = (first..=last)
                    .filter(|&i| {
                        matches!(voice.events[i].event, Event::Note(_))
                            && voice.events[i].tie_state != TieState::NotTied
                    })
                    .collect();
                let above = match &voice.events[first].event {
                    Event::Note(n) => n.tie == TieType::Over,
                    _ => true,
                };
                for joint in chain.windows(2) {
                    let a = placements.get(&(s, v, joint[0]));
                    let b = placements.get(&(s, v, joint[1]));
                    match (a, b) {
                        (Some(a), Some(b)) => draw_tie(surface, centre(a), centre(b), a.y, above),
                        (Some(a), None) => draw_tie(surface, centre(a), system.right_x, a.y, above),
                        (None, Some(b)) => {
                            draw_tie(surface, system.music_left_x(), centre(b), b.y, above)
                        }
                        (None, None) => {}
                    }
                }
            }
        }
    }
}

fn centre(note: &PlacedNote) -> f64 {
    note.x + note.width / 2.0
}

fn draw_tie<S: DrawingSurface + ?Sized>(surface: &mut S, x1: f64, x2: f64, y: f64, above: bool) {
    let dir = if above { -1.0 } else { 1.0 };
    let y0 = y + dir * TIE_NOTEHEAD_OFFSET;
    let dx = (x2 - x1).abs().max(1.0);
    let height = (dx * TIE_HEIGHT_FACTOR).clamp(TIE_MIN_HEIGHT, TIE_MAX_HEIGHT);
    let (c1x, c2x) = (x1 + dx * 0.25, x1 + dx * 0.75);
    let cy = y0 + dir * height;
    let inner = cy - dir * TIE_THICKNESS;

    surface.path(
        &[
            PathCmd::MoveTo(x1, y0),
            PathCmd::CurveTo(c1x, cy, c2x, cy, x2, y0),
            PathCmd::CurveTo(c2x, inner, c1x, inner, x1, y0),
            PathCmd::Close,
        ],
        Some(NOTE_COLOR),
        None,
    );
}

/// Ligatures: the placed members as one combined shape, plus a bracket
/// when the whole group lies in the system. The bracket goes above the
/// highest note, or below the lowest when the group sits low on the staff.
pub(super) fn render_ligatures<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    score: &RenderedScore,
    system: &RenderedStaffSystem,
    placements: &Placements,
) {
    let mut sections: Vec<usize> = system.measures.iter().map(|m| m.section).collect();
    sections.dedup();

    for s in sections {
        for (v, slot) in score.sections[s].voices.iter().enumerate() {
            let Some(voice) = slot else { continue };
            let top = system.staff_top(v);
            for (li, lig) in voice.ligatures.iter().enumerate() {
                let (Some(first), Some(last)) = (lig.group.first_event_num, lig.group.last_event_num) else {
                    continue;
                };
                let members: Vec<LigatureMember> = (first..=last)
                    .filter(|&i| voice.events[i].ligature == Some(li))
                    .filter_map(|i| match (&voice.events[i].event, placements.get(&(s, v, i))) {
                        (Event::Note(note), Some(p)) => Some(LigatureMember {
                            note,
                            x: p.x,
                            staff_step: p.step,
                        }),
                        _ => None,
                    })
                    .collect();
                if members.is_empty() {
                    continue;
                }
                draw_ligature(surface, &members, top, 1.0);

                let (Some(a), Some(b)) = (placements.get(&(s, v, first)), placements.get(&(s, v, last))) else {
                    continue;
                };
                let extreme = |e: Option<ExtremeNote>| e.and_then(|e| placements.get(&(s, v, e.event_num)));
                let high = extreme(lig.highest).unwrap_or(if a.y <= b.y { a } else { b });
                let low = extreme(lig.lowest).unwrap_or(if a.y <= b.y { b } else { a });
                let (x1, x2) = (a.x, b.x + b.width);
                let (y, hook) = bracket_position(top, high, low);
                surface.line(x1, y, x2, y, NOTE_COLOR, BRACKET_WIDTH);
                surface.line(x1, y, x1, y + hook, NOTE_COLOR, BRACKET_WIDTH);
                surface.line(x2, y, x2, y + hook, NOTE_COLOR, BRACKET_WIDTH);
            }
        }
    }
}

/// Bracket height and hook direction for a ligature whose extreme notes
/// are `high` and `low`.
fn bracket_position(staff_top: f64, high: &PlacedNote, low: &PlacedNote) -> (f64, f64) {
    // Below when the extremes average under the middle line (step 4).
    if high.step + low.step < 8 {
        let bottom = staff_top + STAFF_HEIGHT;
        (low.y.max(bottom) + BRACKET_CLEARANCE, -BRACKET_HOOK)
    } else {
        (high.y.min(staff_top) - BRACKET_CLEARANCE, BRACKET_HOOK)
    }
}
