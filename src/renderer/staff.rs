//! Staff frame rendering: staff lines, voice names, left info (clefs and
//! mensuration signs carried into a system) and barlines.

use crate::model::{ClefEvent, Event, Mensuration};

use super::clef_set::RenderedClefSet;
use super::constants::*;
use super::draw::{clef_width, draw_clef, draw_mensuration, DrawingSurface};
use super::measure::MeasureInfo;
use super::page::RenderedStaffSystem;
use super::section::{RenderedScore, RenderedSection};

/// Title and composer above the first system of the first page.
pub(super) fn render_header<S: DrawingSurface + ?Sized>(surface: &mut S, score: &RenderedScore) {
    if let Some(title) = &score.title {
        surface.text(PAGE_MARGIN_LEFT, PAGE_MARGIN_TOP - 18.0, title, 14.0, LABEL_COLOR);
    }
    if let Some(composer) = &score.composer {
        surface.text(PAGE_MARGIN_LEFT, PAGE_MARGIN_TOP - 6.0, composer, 9.0, LABEL_COLOR);
    }
}

pub(super) fn render_staves<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    score: &RenderedScore,
    system: &RenderedStaffSystem,
) {
    for v in 0..system.num_voices {
        let top = system.staff_top(v);
        for line in 0..5 {
            let y = top + line as f64 * STAFF_LINE_SPACING;
            surface.line(system.left_x, y, system.right_x, y, STAFF_COLOR, STAFF_LINE_WIDTH);
        }
        if system.display_voice_names {
            if let Some(name) = score.voice_names.get(v) {
                surface.text(PAGE_MARGIN_LEFT, top + STAFF_HEIGHT / 2.0 + 3.0, name, 9.0, LABEL_COLOR);
            }
        }
    }
}

/// What a system start redisplays for one voice: the clefs in force and
/// the mensuration sign, once the voice has shown one.
///
/// When the system's first measure opens with clefs (and possibly a sign)
/// those are used instead, and the measure skips drawing them.
pub(super) struct LeftInfo<'a> {
    leading_clefs: Vec<ClefEvent>,
    carried: Option<&'a RenderedClefSet>,
    mensuration: Option<Mensuration>,
}

impl<'a> LeftInfo<'a> {
    pub(super) fn of(section: &'a RenderedSection, measure: &MeasureInfo, voice_num: usize) -> Self {
        let Some(voice) = &section.voices[voice_num] else {
            let params = &section.start_params[voice_num];
            return Self {
                leading_clefs: Vec::new(),
                carried: params.clef_set.as_ref(),
                mensuration: params.mensuration,
            };
        };

        let mut leading_clefs = Vec::new();
        let mut leading_sign = None;
        if let Some(first) = measure.revent_index[voice_num] {
            let m = voice.events[first].measure;
            for e in voice.events[first..].iter().take_while(|e| e.measure == m) {
                match &e.event {
                    Event::Clef(c) if leading_sign.is_none() => leading_clefs.push(*c),
                    Event::Mensuration(sign) => leading_sign = Some(*sign),
                    _ => break,
                }
            }
        }
        let carried = if leading_clefs.is_empty() {
            measure.start_clef_sets[voice_num].and_then(|i| voice.clef_sets.get(i))
        } else {
            None
        };
        Self {
            leading_clefs,
            carried,
            mensuration: leading_sign.or(measure.start_mensurations[voice_num]),
        }
    }

    pub(super) fn clef_width(&self) -> f64 {
        if self.leading_clefs.is_empty() {
            self.carried.map_or(0.0, |set| set.x_size())
        } else {
            self.leading_clefs.iter().map(clef_width).sum()
        }
    }

    pub(super) fn has_mensuration(&self) -> bool {
        self.mensuration.is_some()
    }

    /// Clefs from `x`, the sign from `sign_x`.
    fn draw<S: DrawingSurface + ?Sized>(&self, surface: &mut S, x: f64, sign_x: f64, top: f64) {
        if self.leading_clefs.is_empty() {
            if let Some(set) = self.carried {
                set.draw(false, surface, x, top, 1.0);
            }
        } else {
            let mut cx = x;
            for clef in &self.leading_clefs {
                cx += draw_clef(surface, clef, cx, top, 1.0);
            }
        }
        if let Some(sign) = &self.mensuration {
            draw_mensuration(surface, sign, sign_x, top, 1.0);
        }
    }
}

/// Left info of every voice plus the width of the clef column; signs are
/// aligned after the widest clef group.
pub(super) fn left_info_columns<'a>(
    section: &'a RenderedSection,
    measure: &MeasureInfo,
) -> (Vec<LeftInfo<'a>>, f64) {
    let infos: Vec<LeftInfo> = (0..section.voices.len())
        .map(|v| LeftInfo::of(section, measure, v))
        .collect();
    let clef_column = infos.iter().map(LeftInfo::clef_width).fold(0.0, f64::max);
    (infos, clef_column)
}

/// Redisplay the clefs and mensuration signs in force at the start of a
/// system.
pub(super) fn render_left_info<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    score: &RenderedScore,
    system: &RenderedStaffSystem,
) {
    if system.left_info_width <= 0.0 {
        return;
    }
    let Some(first) = system.measures.first() else { return };
    let section = &score.sections[first.section];
    let Some(measure) = section.measures.get(first.section_measure) else { return };
    let x = system.left_x + LEFT_INFO_PAD / 2.0;

    let (infos, clef_column) = left_info_columns(section, measure);
    for (v, info) in infos.iter().enumerate().take(system.num_voices) {
        info.draw(surface, x, x + clef_column, system.staff_top(v));
    }
}

pub(super) fn render_barlines<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    system: &RenderedStaffSystem,
) {
    for v in 0..system.num_voices {
        let top = system.staff_top(v);
        surface.line(system.left_x, top, system.left_x, top + STAFF_HEIGHT, BARLINE_COLOR, BARLINE_WIDTH);
        for m in &system.measures {
            let x = m.x + m.width;
            surface.line(x, top, x, top + STAFF_HEIGHT, BARLINE_COLOR, BARLINE_WIDTH);
        }
    }
}
