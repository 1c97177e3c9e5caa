//! Clef sets: clefs and signature accidentals drawn together at one
//! horizontal position.

use serde::Serialize;

use crate::model::{ClefEvent, ClefKind, Pitch};

use super::draw::{clef_width, draw_clef, DrawingSurface};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedClefSet {
    pub clefs: Vec<ClefEvent>,
    /// Event index of each member within its voice; `None` for sets carried
    /// in from a previous section.
    pub event_nums: Vec<Option<usize>>,
}

impl RenderedClefSet {
    pub fn new(clef: ClefEvent, event_num: Option<usize>) -> Self {
        Self {
            clefs: vec![clef],
            event_nums: vec![event_num],
        }
    }

    /// Fold `clef` into `sets`: a principal clef, or one contradicting the
    /// last set, starts a new set; anything else joins the last set.
    /// Returns the index of the set the clef ended up in.
    pub fn combine(
        sets: &mut Vec<RenderedClefSet>,
        clef: ClefEvent,
        event_num: Option<usize>,
    ) -> usize {
        match sets.last_mut() {
            Some(last) if !clef.is_principal() && !last.contradicts(&clef) => {
                last.clefs.push(clef);
                last.event_nums.push(event_num);
            }
            _ => sets.push(RenderedClefSet::new(clef, event_num)),
        }
        sets.len() - 1
    }

    pub fn contradicts(&self, clef: &ClefEvent) -> bool {
        self.clefs.iter().any(|c| c.contradicts(clef))
    }

    pub fn len(&self) -> usize {
        self.clefs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clefs.is_empty()
    }

    /// The clef that fixes pitch positions: the last principal member, or
    /// failing that the last letter clef.
    pub fn principal_clef(&self) -> Option<&ClefEvent> {
        self.clefs
            .iter()
            .rev()
            .find(|c| c.is_principal())
            .or_else(|| self.clefs.iter().rev().find(|c| c.kind.is_letter()))
    }

    /// Staff step at which `pitch` sits under this set's principal clef.
    pub fn staff_step_of(&self, pitch: &Pitch) -> i32 {
        match self.principal_clef().and_then(|c| c.kind.named_pitch().map(|p| (c, p))) {
            Some((clef, named)) => clef.staff_step + pitch.diatonic() - named.diatonic(),
            None => Self::unclefed_staff_step(pitch),
        }
    }

    /// Staff step with no clef in force: C4 on the middle line.
    pub fn unclefed_staff_step(pitch: &Pitch) -> i32 {
        4 + pitch.diatonic() - Pitch::from_step(0, 4).diatonic()
    }

    /// Semitone alteration the set's signature applies to `pitch`.
    pub fn signature_alter(&self, pitch: &Pitch) -> i32 {
        let step = self.staff_step_of(pitch).rem_euclid(7);
        self.clefs
            .iter()
            .rev()
            .find(|c| !c.kind.is_letter() && c.staff_step.rem_euclid(7) == step)
            .map_or(0, |c| match c.kind {
                ClefKind::Flat => -1,
                ClefKind::Sharp => 1,
                _ => 0,
            })
    }

    pub fn x_size(&self) -> f64 {
        self.clefs.iter().map(clef_width).sum()
    }

    /// Width drawn by [`draw`](Self::draw) with the same `principal_only`.
    pub fn x_size_filtered(&self, principal_only: bool) -> f64 {
        self.clefs
            .iter()
            .filter(|c| !principal_only || c.is_principal())
            .map(clef_width)
            .sum()
    }

    /// Draw members left to right; returns the width consumed.
    pub fn draw<S: DrawingSurface + ?Sized>(
        &self,
        principal_only: bool,
        surface: &mut S,
        x: f64,
        y: f64,
        scale: f64,
    ) -> f64 {
        let mut cx = x;
        for clef in self
            .clefs
            .iter()
            .filter(|c| !principal_only || c.is_principal())
        {
            cx += draw_clef(surface, clef, cx, y, scale);
        }
        cx - x
    }
}
