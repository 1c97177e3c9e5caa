//! Back-end independent drawing: the `DrawingSurface` trait plus the glyph
//! routines shared by the SVG and PDF back-ends.
//!
//! Glyph advances come from the metric functions here, never from the
//! surface, so a layout computed once is valid for every back-end.

use crate::model::{
    Accidental, ClefEvent, ClefKind, Mensuration, MensurationSign, Note, NoteType, Rest,
};
use crate::proportion::Proportion;

use super::constants::*;

// ═══════════════════════════════════════════════════════════════════════
// Surface
// ═══════════════════════════════════════════════════════════════════════

/// Path segment in surface coordinates (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathCmd {
    MoveTo(f64, f64),
    LineTo(f64, f64),
    CurveTo(f64, f64, f64, f64, f64, f64),
    Close,
}

/// Minimal vector drawing target.
pub trait DrawingSurface {
    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, color: &str, width: f64);
    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: &str);
    /// Filled when `fill` is given, stroked when `stroke` is given.
    fn path(&mut self, cmds: &[PathCmd], fill: Option<&str>, stroke: Option<(&str, f64)>);
    fn text(&mut self, x: f64, y: f64, content: &str, size: f64, color: &str);
}

// ═══════════════════════════════════════════════════════════════════════
// Metrics
// ═══════════════════════════════════════════════════════════════════════

pub(crate) fn clef_width(clef: &ClefEvent) -> f64 {
    if clef.kind.is_letter() {
        CLEF_WIDTH
    } else {
        SIGNATURE_ACCIDENTAL_WIDTH
    }
}

pub(crate) fn notehead_width(note_type: NoteType) -> f64 {
    match note_type {
        NoteType::Maxima => MAXIMA_WIDTH,
        NoteType::Longa => LONGA_WIDTH,
        NoteType::Brevis => BREVE_WIDTH,
        _ => NOTEHEAD_WIDTH,
    }
}

pub(crate) fn note_width(note: &Note) -> f64 {
    let accidental = if note.accidental.is_some() {
        ACCIDENTAL_WIDTH
    } else {
        0.0
    };
    notehead_width(note.note_type) + accidental
}

/// Vertical offset from the staff top for a staff step (0 = bottom line).
pub(crate) fn step_y(staff_step: i32, scale: f64) -> f64 {
    (STAFF_HEIGHT - staff_step as f64 * STAFF_LINE_SPACING / 2.0) * scale
}

// ═══════════════════════════════════════════════════════════════════════
// Glyphs
// ═══════════════════════════════════════════════════════════════════════

/// Draw a clef or signature accidental; returns its advance.
pub(crate) fn draw_clef<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    clef: &ClefEvent,
    x: f64,
    staff_top: f64,
    scale: f64,
) -> f64 {
    let cy = staff_top + step_y(clef.staff_step, scale);
    let s = STAFF_LINE_SPACING * scale;
    let color = if clef.modern_equivalent {
        VARIANT_COLOR
    } else {
        NOTE_COLOR
    };
    match clef.kind {
        ClefKind::C => {
            // Two square heads either side of the clef line.
            surface.rect(x + 2.0 * scale, cy - s, s * 0.8, s * 0.8, color);
            surface.rect(x + 2.0 * scale, cy + s * 0.2, s * 0.8, s * 0.8, color);
            surface.line(x + scale, cy - s * 1.2, x + scale, cy + s * 1.2, color, STEM_WIDTH * scale);
        }
        ClefKind::F => {
            surface.rect(x + 2.0 * scale, cy - s * 0.4, s * 0.8, s * 0.8, color);
            surface.rect(x + 7.0 * scale, cy - s * 0.9, s * 0.6, s * 0.6, color);
            surface.rect(x + 7.0 * scale, cy + s * 0.3, s * 0.6, s * 0.6, color);
            surface.line(x + 11.0 * scale, cy - s * 1.2, x + 11.0 * scale, cy + s * 1.6, color, STEM_WIDTH * scale);
        }
        ClefKind::G | ClefKind::Gamma => {
            let r = s * 0.6;
            let cx = x + 6.0 * scale;
            surface.path(
                &[
                    PathCmd::MoveTo(cx, cy - r),
                    PathCmd::CurveTo(cx + r * 1.4, cy - r, cx + r * 1.4, cy + r, cx, cy + r),
                    PathCmd::CurveTo(cx - r * 1.4, cy + r, cx - r * 1.4, cy - r, cx, cy - r),
                    PathCmd::Close,
                ],
                None,
                Some((color, STEM_WIDTH * scale)),
            );
            if clef.kind == ClefKind::Gamma {
                surface.text(x + scale, cy - s, "Γ", 9.0 * scale, color);
            } else {
                surface.line(cx + r, cy, cx + r, cy - s * 2.0, color, STEM_WIDTH * scale);
            }
        }
        ClefKind::Flat => draw_flat(surface, x, cy, scale, color),
        ClefKind::Sharp => draw_sharp(surface, x, cy, scale, color),
    }
    clef_width(clef) * scale
}

fn draw_flat<S: DrawingSurface + ?Sized>(surface: &mut S, x: f64, cy: f64, scale: f64, color: &str) {
    let s = STAFF_LINE_SPACING * scale;
    surface.line(x + scale, cy - s * 1.5, x + scale, cy + s * 0.5, color, STEM_WIDTH * scale);
    surface.path(
        &[
            PathCmd::MoveTo(x + scale, cy + s * 0.5),
            PathCmd::CurveTo(x + 6.0 * scale, cy, x + 5.0 * scale, cy - s * 0.6, x + scale, cy - s * 0.2),
        ],
        None,
        Some((color, STEM_WIDTH * scale)),
    );
}

fn draw_sharp<S: DrawingSurface + ?Sized>(surface: &mut S, x: f64, cy: f64, scale: f64, color: &str) {
    let s = STAFF_LINE_SPACING * scale;
    let w = STEM_WIDTH * scale;
    surface.line(x + 2.0 * scale, cy - s, x + 2.0 * scale, cy + s, color, w);
    surface.line(x + 4.5 * scale, cy - s, x + 4.5 * scale, cy + s, color, w);
    surface.line(x, cy - s * 0.3, x + 6.0 * scale, cy - s * 0.5, color, w * 1.5);
    surface.line(x, cy + s * 0.5, x + 6.0 * scale, cy + s * 0.3, color, w * 1.5);
}

/// Draw a mensuration sign centred on the staff; returns its advance.
pub(crate) fn draw_mensuration<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    mensuration: &Mensuration,
    x: f64,
    staff_top: f64,
    scale: f64,
) -> f64 {
    let cy = staff_top + STAFF_HEIGHT / 2.0 * scale;
    let r = STAFF_LINE_SPACING * 0.9 * scale;
    let cx = x + MENSURATION_WIDTH / 2.0 * scale;
    let k = r * 0.55;
    let stroke = Some((NOTE_COLOR, STEM_WIDTH * scale));
    match mensuration.sign {
        MensurationSign::Circle => surface.path(
            &[
                PathCmd::MoveTo(cx, cy - r),
                PathCmd::CurveTo(cx + k * 1.8, cy - r, cx + k * 1.8, cy + r, cx, cy + r),
                PathCmd::CurveTo(cx - k * 1.8, cy + r, cx - k * 1.8, cy - r, cx, cy - r),
                PathCmd::Close,
            ],
            None,
            stroke,
        ),
        MensurationSign::Semicircle => surface.path(
            &[
                PathCmd::MoveTo(cx + r * 0.6, cy - r),
                PathCmd::CurveTo(cx - r * 1.2, cy - r, cx - r * 1.2, cy + r, cx + r * 0.6, cy + r),
            ],
            None,
            stroke,
        ),
        MensurationSign::ReversedSemicircle => surface.path(
            &[
                PathCmd::MoveTo(cx - r * 0.6, cy - r),
                PathCmd::CurveTo(cx + r * 1.2, cy - r, cx + r * 1.2, cy + r, cx - r * 0.6, cy + r),
            ],
            None,
            stroke,
        ),
    }
    if mensuration.dot {
        let d = 1.2 * scale;
        surface.rect(cx - d / 2.0, cy - d / 2.0, d, d, NOTE_COLOR);
    }
    if mensuration.stroke {
        surface.line(cx, cy - r * 1.4, cx, cy + r * 1.4, NOTE_COLOR, STEM_WIDTH * scale);
    }
    MENSURATION_WIDTH * scale
}

/// Draw a proportion sign as stacked figures; returns its advance.
pub(crate) fn draw_proportion<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    proportion: Proportion,
    x: f64,
    staff_top: f64,
    scale: f64,
) -> f64 {
    let size = 10.0 * scale;
    surface.text(x, staff_top + STAFF_HEIGHT * 0.45 * scale, &proportion.numerator().to_string(), size, NOTE_COLOR);
    surface.text(x, staff_top + STAFF_HEIGHT * 0.95 * scale, &proportion.denominator().to_string(), size, NOTE_COLOR);
    PROPORTION_WIDTH * scale
}

/// Draw a mensural note at staff step `staff_step`; returns its advance.
pub(crate) fn draw_note<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    note: &Note,
    staff_step: i32,
    x: f64,
    staff_top: f64,
    scale: f64,
) -> f64 {
    let mut hx = x;
    let cy = staff_top + step_y(staff_step, scale);
    let half = STAFF_LINE_SPACING / 2.0 * scale;

    if let Some(accidental) = note.accidental {
        hx += draw_accidental(surface, accidental, hx, cy, scale);
    }

    draw_ledger_lines(surface, staff_step, hx, notehead_width(note.note_type) * scale, staff_top, scale);

    let w = notehead_width(note.note_type) * scale;
    // Black notation for the short values; coloration inverts it.
    let short = matches!(
        note.note_type,
        NoteType::Semiminima | NoteType::Fusa | NoteType::Semifusa
    );
    let filled = short != note.colored;

    match note.note_type {
        NoteType::Maxima | NoteType::Longa | NoteType::Brevis => {
            draw_square_head(surface, hx, cy - half, w, half * 2.0, filled);
            if note.note_type != NoteType::Brevis {
                surface.line(hx + w, cy, hx + w, cy + STEM_LENGTH * scale, NOTE_COLOR, STEM_WIDTH * scale);
            }
        }
        _ => {
            draw_lozenge(surface, hx, cy, w, half, filled);
            if note.note_type.has_stem() {
                let sx = hx + w / 2.0;
                let top = cy - STEM_LENGTH * scale;
                surface.line(sx, cy - half, sx, top, NOTE_COLOR, STEM_WIDTH * scale);
                for i in 0..note.note_type.flags() {
                    let fy = top + i as f64 * 3.0 * scale;
                    surface.line(sx, fy, sx + 4.0 * scale, fy + 3.0 * scale, NOTE_COLOR, STEM_WIDTH * scale);
                }
            }
        }
    }
    note_width(note) * scale
}

fn draw_accidental<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    accidental: Accidental,
    x: f64,
    cy: f64,
    scale: f64,
) -> f64 {
    match accidental {
        Accidental::Flat => draw_flat(surface, x, cy, scale, NOTE_COLOR),
        Accidental::Sharp => draw_sharp(surface, x, cy, scale, NOTE_COLOR),
        Accidental::Natural => {
            let s = STAFF_LINE_SPACING * scale;
            surface.line(x + scale, cy - s, x + scale, cy + s * 0.5, NOTE_COLOR, STEM_WIDTH * scale);
            surface.line(x + 4.0 * scale, cy - s * 0.5, x + 4.0 * scale, cy + s, NOTE_COLOR, STEM_WIDTH * scale);
        }
    }
    ACCIDENTAL_WIDTH * scale
}

/// One positioned note of a ligature.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LigatureMember<'a> {
    pub(crate) note: &'a Note,
    pub(crate) x: f64,
    pub(crate) staff_step: i32,
}

/// Draw a ligature as a single shape: square heads, each joined to the
/// next by a vertical connector at the join and a link at the new pitch.
/// A final long or maxima keeps its descending stem.
pub(crate) fn draw_ligature<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    members: &[LigatureMember],
    staff_top: f64,
    scale: f64,
) {
    let half = STAFF_LINE_SPACING / 2.0 * scale;
    let mut cmds = Vec::with_capacity(members.len() * 9);
    let mut prev: Option<(f64, f64)> = None;

    for member in members {
        let mut hx = member.x;
        let cy = staff_top + step_y(member.staff_step, scale);
        if let Some(accidental) = member.note.accidental {
            hx += draw_accidental(surface, accidental, hx, cy, scale);
        }
        let w = notehead_width(member.note.note_type) * scale;
        draw_ledger_lines(surface, member.staff_step, hx, w, staff_top, scale);

        if let Some((px, py)) = prev {
            cmds.push(PathCmd::MoveTo(px, py.min(cy) - half));
            cmds.push(PathCmd::LineTo(px, py.max(cy) + half));
            if hx > px {
                cmds.push(PathCmd::MoveTo(px, cy));
                cmds.push(PathCmd::LineTo(hx, cy));
            }
        }
        cmds.extend([
            PathCmd::MoveTo(hx, cy - half),
            PathCmd::LineTo(hx + w, cy - half),
            PathCmd::LineTo(hx + w, cy + half),
            PathCmd::LineTo(hx, cy + half),
            PathCmd::Close,
        ]);
        prev = Some((hx + w, cy));
    }

    if let (Some(last), Some((right, cy))) = (members.last(), prev) {
        if matches!(last.note.note_type, NoteType::Longa | NoteType::Maxima) {
            cmds.push(PathCmd::MoveTo(right, cy));
            cmds.push(PathCmd::LineTo(right, cy + STEM_LENGTH * scale));
        }
    }
    if cmds.is_empty() {
        return;
    }
    let colored = members.iter().all(|m| m.note.colored);
    surface.path(
        &cmds,
        colored.then_some(NOTE_COLOR),
        Some((NOTE_COLOR, STEM_WIDTH * scale)),
    );
}

fn draw_square_head<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    x: f64,
    y: f64,
    w: f64,
    h: f64,
    filled: bool,
) {
    let cmds = [
        PathCmd::MoveTo(x, y),
        PathCmd::LineTo(x + w, y),
        PathCmd::LineTo(x + w, y + h),
        PathCmd::LineTo(x, y + h),
        PathCmd::Close,
    ];
    if filled {
        surface.path(&cmds, Some(NOTE_COLOR), None);
    } else {
        surface.path(&cmds, None, Some((NOTE_COLOR, STEM_WIDTH)));
    }
}

fn draw_lozenge<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    x: f64,
    cy: f64,
    w: f64,
    half: f64,
    filled: bool,
) {
    let cmds = [
        PathCmd::MoveTo(x, cy),
        PathCmd::LineTo(x + w / 2.0, cy - half),
        PathCmd::LineTo(x + w, cy),
        PathCmd::LineTo(x + w / 2.0, cy + half),
        PathCmd::Close,
    ];
    if filled {
        surface.path(&cmds, Some(NOTE_COLOR), None);
    } else {
        surface.path(&cmds, None, Some((NOTE_COLOR, STEM_WIDTH)));
    }
}

fn draw_ledger_lines<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    staff_step: i32,
    x: f64,
    w: f64,
    staff_top: f64,
    scale: f64,
) {
    let mut step = if staff_step < 0 { -2 } else { 10 };
    while (staff_step < 0 && step >= staff_step) || (staff_step > 8 && step <= staff_step) {
        let y = staff_top + step_y(step, scale);
        surface.line(x - 2.0 * scale, y, x + w + 2.0 * scale, y, STAFF_COLOR, STAFF_LINE_WIDTH * scale);
        step += if staff_step < 0 { -2 } else { 2 };
    }
}

/// Draw a rest; returns its advance.
pub(crate) fn draw_rest<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    rest: &Rest,
    x: f64,
    staff_top: f64,
    scale: f64,
) -> f64 {
    let s = STAFF_LINE_SPACING * scale;
    let mid = staff_top + STAFF_HEIGHT / 2.0 * scale;
    let cx = x + REST_WIDTH / 2.0 * scale;
    let (top, bottom) = match rest.note_type {
        NoteType::Maxima | NoteType::Longa => (mid - s, mid + s),
        NoteType::Brevis => (mid - s, mid),
        NoteType::Semibrevis => (mid - s, mid - s * 0.5),
        NoteType::Minima => (mid - s * 0.5, mid),
        _ => (mid - s * 0.5, mid - s * 0.2),
    };
    surface.rect(cx - scale, top, 2.0 * scale, bottom - top, NOTE_COLOR);
    if matches!(rest.note_type, NoteType::Semiminima | NoteType::Fusa | NoteType::Semifusa) {
        surface.line(cx, top, cx + 3.0 * scale, top - 2.0 * scale, NOTE_COLOR, STEM_WIDTH * scale);
    }
    REST_WIDTH * scale
}

/// Small flag above the staff marking a variant reading.
pub(crate) fn draw_variant_flag<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    x: f64,
    staff_top: f64,
    scale: f64,
) {
    let top = staff_top - 6.0 * scale;
    surface.line(x, top, x, staff_top + STAFF_HEIGHT * scale, VARIANT_COLOR, BRACKET_WIDTH * scale);
    surface.path(
        &[
            PathCmd::MoveTo(x, top),
            PathCmd::LineTo(x + 4.0 * scale, top + 2.0 * scale),
            PathCmd::LineTo(x, top + 4.0 * scale),
            PathCmd::Close,
        ],
        Some(VARIANT_COLOR),
        None,
    );
}
