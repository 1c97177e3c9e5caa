//! Per-measure layout records.

use serde::Serialize;

use crate::model::Mensuration;
use crate::proportion::Proportion;

/// One measure of one section.
///
/// Built by the section renderer and read-only afterwards: page layout and
/// MIDI sequencing only consult it.
#[derive(Debug, Clone, Serialize)]
pub struct MeasureInfo {
    /// Global measure index, 0-based.
    pub measure_num: usize,
    /// Tempo-adjusted minims from the start of the section.
    pub start_time: Proportion,
    /// Notated length in minims (one breve of the governing mensuration).
    pub num_minims: u32,
    pub default_tempo_proportion: Proportion,
    /// Running tempo proportion of each voice at the start of the measure.
    pub tempo_proportions: Vec<Proportion>,
    /// Per voice: index of the first rendered event in this measure.
    pub revent_index: Vec<Option<usize>>,
    /// Per voice: clef set (index into that voice's clef sets) in force
    /// when the measure starts.
    pub start_clef_sets: Vec<Option<usize>>,
    /// Per voice: mensuration sign in force when the measure starts, `None`
    /// until the voice has shown one.
    pub start_mensurations: Vec<Option<Mensuration>>,
    /// Natural width.
    pub x_length: f64,
    /// Left edge in the continuous (unbroken) layout of the section.
    pub left_x: f64,
}

impl MeasureInfo {
    /// Real duration: notated minims divided by the default tempo proportion.
    pub fn duration(&self) -> Proportion {
        Proportion::from(self.num_minims)
            .quotient(self.default_tempo_proportion)
            .unwrap_or_else(|_| Proportion::from(self.num_minims))
    }

    pub fn end_time(&self) -> Proportion {
        self.start_time + self.duration()
    }

    pub fn num_voices(&self) -> usize {
        self.tempo_proportions.len()
    }
}

/// The measures of one section, in order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MeasureList {
    measures: Vec<MeasureInfo>,
}

impl MeasureList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, measure: MeasureInfo) {
        self.measures.push(measure);
    }

    pub fn len(&self) -> usize {
        self.measures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MeasureInfo> {
        self.measures.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MeasureInfo> {
        self.measures.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, MeasureInfo> {
        self.measures.iter_mut()
    }

    pub fn first_measure_num(&self) -> Option<usize> {
        self.measures.first().map(|m| m.measure_num)
    }

    /// Look a measure up by its global number.
    pub fn by_measure_num(&self, measure_num: usize) -> Option<&MeasureInfo> {
        let first = self.first_measure_num()?;
        measure_num
            .checked_sub(first)
            .and_then(|i| self.measures.get(i))
    }

    /// Index of the measure containing `time` (the last one starting at or
    /// before it). Times past the end map to the last measure.
    pub fn index_at_time(&self, time: Proportion) -> Option<usize> {
        if self.measures.is_empty() {
            return None;
        }
        let after = self.measures.partition_point(|m| m.start_time <= time);
        Some(after.saturating_sub(1))
    }

    /// Total real duration of the section.
    pub fn total_duration(&self) -> Proportion {
        self.measures
            .iter()
            .fold(Proportion::ZERO, |acc, m| acc + m.duration())
    }

    /// Total natural width.
    pub fn total_width(&self) -> f64 {
        self.measures.iter().map(|m| m.x_length).sum()
    }
}

impl<'a> IntoIterator for &'a MeasureList {
    type Item = &'a MeasureInfo;
    type IntoIter = std::slice::Iter<'a, MeasureInfo>;
    fn into_iter(self) -> Self::IntoIter {
        self.measures.iter()
    }
}
