//! Page layout: packs the continuous measure sequence of all sections
//! into systems, and systems into pages.

use serde::Serialize;

use super::constants::*;
use super::measure::MeasureInfo;
use super::section::{RenderedScore, RenderedSection};
use super::staff::{left_info_columns, LeftInfo};

// ═══════════════════════════════════════════════════════════════════════
// Layout structures
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct PageOptions {
    pub page_width: f64,
    pub page_height: f64,
    /// Label staves on the first system of every page.
    pub display_voice_names: bool,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            page_width: DEFAULT_PAGE_WIDTH,
            page_height: DEFAULT_PAGE_HEIGHT,
            display_voice_names: true,
        }
    }
}

/// Horizontal placement of one measure inside a system.
#[derive(Debug, Clone, Serialize)]
pub struct MeasurePosition {
    pub measure_num: usize,
    pub section: usize,
    /// Index within the section's measure list.
    pub section_measure: usize,
    pub x: f64,
    pub width: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedStaffSystem {
    pub start_measure: usize,
    pub end_measure: usize,
    pub left_x: f64,
    pub right_x: f64,
    pub top_y: f64,
    pub num_voices: usize,
    pub spacing_coefficient: f64,
    pub display_voice_names: bool,
    /// Width reserved for redisplaying the clefs and signs in force.
    pub left_info_width: f64,
    pub page: usize,
    pub measures: Vec<MeasurePosition>,
}

impl RenderedStaffSystem {
    /// Where measure content begins, after labels and left info.
    pub fn music_left_x(&self) -> f64 {
        self.measures.first().map_or(self.right_x, |m| m.x)
    }

    pub fn height(&self) -> f64 {
        system_height(self.num_voices)
    }

    pub fn staff_top(&self, voice: usize) -> f64 {
        self.top_y + voice as f64 * (STAFF_HEIGHT + STAFF_GAP)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedScorePage {
    pub start_system: usize,
    pub num_systems: usize,
    pub num_staves: usize,
    pub y_space_used: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreLayout {
    pub options: PageOptions,
    pub pages: Vec<RenderedScorePage>,
    pub systems: Vec<RenderedStaffSystem>,
}

impl ScoreLayout {
    pub fn systems_on_page(&self, page: usize) -> &[RenderedStaffSystem] {
        match self.pages.get(page) {
            Some(p) => &self.systems[p.start_system..p.start_system + p.num_systems],
            None => &[],
        }
    }

    /// System containing a global measure.
    pub fn system_of_measure(&self, measure_num: usize) -> Option<usize> {
        self.systems
            .iter()
            .position(|s| (s.start_measure..=s.end_measure).contains(&measure_num))
    }
}

pub(crate) fn system_height(num_voices: usize) -> f64 {
    let n = num_voices.max(1) as f64;
    n * STAFF_HEIGHT + (n - 1.0) * STAFF_GAP
}

// ═══════════════════════════════════════════════════════════════════════
// ScorePageRenderer
// ═══════════════════════════════════════════════════════════════════════

pub struct ScorePageRenderer<'a> {
    score: &'a RenderedScore,
    options: PageOptions,
}

impl<'a> ScorePageRenderer<'a> {
    pub fn new(score: &'a RenderedScore, options: PageOptions) -> Self {
        Self { score, options }
    }

    /// Width of the clefs and mensuration signs to redisplay at the start
    /// of a system beginning with `measure` of `section`.
    ///
    /// Panics when the measure's per-voice arrays do not match the score.
    pub fn calc_left_info_size(&self, section: &RenderedSection, measure: &MeasureInfo) -> f64 {
        let num_voices = self.score.num_voices();
        assert_eq!(
            section.voices.len(),
            num_voices,
            "section {} holds {} voices, score has {}",
            section.section_num,
            section.voices.len(),
            num_voices
        );
        assert!(
            measure.revent_index.len() == num_voices
                && measure.start_clef_sets.len() == num_voices
                && measure.start_mensurations.len() == num_voices,
            "measure {} voice arrays do not match {} voices",
            measure.measure_num,
            num_voices
        );

        let (infos, clef_column) = left_info_columns(section, measure);
        let sign = if infos.iter().any(LeftInfo::has_mensuration) {
            MENSURATION_WIDTH
        } else {
            0.0
        };
        clef_column + sign
    }

    pub fn layout(&self) -> ScoreLayout {
        let opts = &self.options;
        let num_voices = self.score.num_voices();
        let sys_height = system_height(num_voices);
        let usable_height = opts.page_height - PAGE_MARGIN_TOP - PAGE_MARGIN_BOTTOM;
        let line_right = opts.page_width - PAGE_MARGIN_RIGHT;

        let measures: Vec<(usize, usize, &MeasureInfo)> = self
            .score
            .sections
            .iter()
            .enumerate()
            .flat_map(|(si, s)| s.measures.iter().enumerate().map(move |(mi, m)| (si, mi, m)))
            .collect();

        let mut pages: Vec<RenderedScorePage> = Vec::new();
        let mut systems: Vec<RenderedStaffSystem> = Vec::new();
        let mut idx = 0;

        while idx < measures.len() {
            // Vertical fit before opening the system.
            let needs_page = match pages.last() {
                None => true,
                Some(page) => page.y_space_used + SYSTEM_SPACING + sys_height > usable_height,
            };
            if needs_page {
                pages.push(RenderedScorePage {
                    start_system: systems.len(),
                    num_systems: 0,
                    num_staves: 0,
                    y_space_used: 0.0,
                });
            }
            let page_idx = pages.len() - 1;
            let page = &mut pages[page_idx];
            let first_on_page = page.num_systems == 0;
            let top_y = PAGE_MARGIN_TOP
                + if first_on_page {
                    0.0
                } else {
                    page.y_space_used + SYSTEM_SPACING
                };

            let display_names = opts.display_voice_names && first_on_page;
            let left_x = PAGE_MARGIN_LEFT + if display_names { VOICE_NAME_WIDTH } else { 0.0 };
            let (si, _, first) = measures[idx];
            let left_info = if idx == 0 {
                0.0
            } else {
                let width = self.calc_left_info_size(&self.score.sections[si], first);
                if width > 0.0 {
                    width + LEFT_INFO_PAD
                } else {
                    0.0
                }
            };
            let music_left = left_x + left_info;
            let available = line_right - music_left;

            let mut natural = 0.0;
            let mut end = idx;
            while end < measures.len() {
                let w = measures[end].2.x_length;
                if end > idx && natural + w > available {
                    break;
                }
                natural += w;
                end += 1;
            }

            let whole_score_fits = idx == 0 && end == measures.len();
            let coefficient = if whole_score_fits || natural <= 0.0 {
                1.0
            } else {
                (available / natural).max(1.0)
            };

            let mut x = music_left;
            let mut positions = Vec::with_capacity(end - idx);
            for &(section, section_measure, m) in &measures[idx..end] {
                let width = m.x_length * coefficient;
                positions.push(MeasurePosition {
                    measure_num: m.measure_num,
                    section,
                    section_measure,
                    x,
                    width,
                });
                x += width;
            }
            let right_x = if coefficient > 1.0 { line_right } else { x };
            if let Some(last) = positions.last_mut() {
                // Land the final barline on the margin without float drift.
                last.width = right_x - last.x;
            }

            log::debug!(
                "system {}: measures {}..={} coefficient {:.3}",
                systems.len(),
                measures[idx].2.measure_num,
                measures[end - 1].2.measure_num,
                coefficient
            );

            systems.push(RenderedStaffSystem {
                start_measure: measures[idx].2.measure_num,
                end_measure: measures[end - 1].2.measure_num,
                left_x,
                right_x,
                top_y,
                num_voices,
                spacing_coefficient: coefficient,
                display_voice_names: display_names,
                left_info_width: left_info,
                page: page_idx,
                measures: positions,
            });
            page.num_systems += 1;
            page.num_staves += num_voices;
            page.y_space_used = top_y - PAGE_MARGIN_TOP + sys_height;
            idx = end;
        }

        ScoreLayout {
            options: opts.clone(),
            pages,
            systems,
        }
    }
}
