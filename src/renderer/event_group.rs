//! Grouping structures over a voice's rendered event list: ligature and tie
//! spans, variant reading spans, and tie-state classification.

use serde::Serialize;

use crate::model::{Note, Pitch};

// ═══════════════════════════════════════════════════════════════════════
// RenderedEventGroup
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    None,
    Ligature,
    VariantReading,
}

/// A contiguous run of event indices `[first, last]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedEventGroup {
    pub group_type: GroupType,
    pub first_event_num: Option<usize>,
    pub last_event_num: Option<usize>,
}

impl RenderedEventGroup {
    pub fn new(group_type: GroupType) -> Self {
        Self {
            group_type,
            first_event_num: None,
            last_event_num: None,
        }
    }

    pub fn spanning(group_type: GroupType, first: usize, last: usize) -> Self {
        Self {
            group_type,
            first_event_num: Some(first),
            last_event_num: Some(last),
        }
    }

    pub fn contains(&self, event_num: usize) -> bool {
        match (self.first_event_num, self.last_event_num) {
            (Some(first), Some(last)) => (first..=last).contains(&event_num),
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        match (self.first_event_num, self.last_event_num) {
            (Some(first), Some(last)) if last >= first => last - first + 1,
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ═══════════════════════════════════════════════════════════════════════
// RenderedLigature
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LigatureType {
    Ligature,
    Tie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LigatureState {
    Idle,
    Open,
}

/// An extreme note of a group: event index plus pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtremeNote {
    pub event_num: usize,
    pub pitch: Pitch,
}

/// Incrementally built ligature or tie span.
///
/// Fed one top-level note at a time. In ligature mode the group closes
/// itself on the first unligated note; in tie mode the caller closes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedLigature {
    pub ligature_type: LigatureType,
    pub group: RenderedEventGroup,
    state: LigatureState,
    pub highest: Option<ExtremeNote>,
    pub lowest: Option<ExtremeNote>,
}

impl RenderedLigature {
    pub fn new(ligature_type: LigatureType) -> Self {
        Self {
            ligature_type,
            group: RenderedEventGroup::new(GroupType::Ligature),
            state: LigatureState::Idle,
            highest: None,
            lowest: None,
        }
    }

    pub fn state(&self) -> LigatureState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == LigatureState::Open
    }

    /// Fold one note in. Returns `true` when this note closed the group.
    pub fn update(&mut self, event_num: usize, note: &Note) -> bool {
        match self.state {
            LigatureState::Idle => {
                let opens = match self.ligature_type {
                    LigatureType::Ligature => note.ligated,
                    LigatureType::Tie => note.tie.is_tied(),
                };
                if opens {
                    self.state = LigatureState::Open;
                    self.group.first_event_num = Some(event_num);
                    self.group.last_event_num = Some(event_num);
                    self.highest = Some(ExtremeNote {
                        event_num,
                        pitch: note.pitch,
                    });
                    self.lowest = self.highest;
                }
                false
            }
            LigatureState::Open => {
                self.group.last_event_num = Some(event_num);
                self.track_extremes(event_num, note);
                if self.ligature_type == LigatureType::Ligature && !note.ligated {
                    self.state = LigatureState::Idle;
                    return true;
                }
                false
            }
        }
    }

    /// Close an open group (tie mode).
    pub fn close(&mut self) {
        self.state = LigatureState::Idle;
    }

    fn track_extremes(&mut self, event_num: usize, note: &Note) {
        let candidate = ExtremeNote {
            event_num,
            pitch: note.pitch,
        };
        if self
            .highest
            .map_or(true, |h| note.pitch.diatonic() > h.pitch.diatonic())
        {
            self.highest = Some(candidate);
        }
        if self
            .lowest
            .map_or(true, |l| note.pitch.diatonic() < l.pitch.diatonic())
        {
            self.lowest = Some(candidate);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tie state
// ═══════════════════════════════════════════════════════════════════════

/// Position of a note within a tie chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TieState {
    #[default]
    NotTied,
    TieStart,
    TieMiddle,
    TieEnd,
}

impl TieState {
    /// `continues`: the previous note ties into this one.
    /// `ties_forward`: this note ties into the next one.
    pub fn classify(continues: bool, ties_forward: bool) -> Self {
        match (continues, ties_forward) {
            (false, false) => TieState::NotTied,
            (false, true) => TieState::TieStart,
            (true, true) => TieState::TieMiddle,
            (true, false) => TieState::TieEnd,
        }
    }

    pub fn emits_note_on(self) -> bool {
        matches!(self, TieState::NotTied | TieState::TieStart)
    }

    pub fn emits_note_off(self) -> bool {
        matches!(self, TieState::NotTied | TieState::TieEnd)
    }

    /// An arc is drawn from this note to the next one.
    pub fn draws_arc(self) -> bool {
        matches!(self, TieState::TieStart | TieState::TieMiddle)
    }
}
