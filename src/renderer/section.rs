//! Section rendering: walks every voice of every section once, placing
//! events in time, building clef sets, ligature and tie groups, and the
//! measure list that page layout and MIDI sequencing share.

use serde::Serialize;

use crate::error::RenderError;
use crate::model::{Event, MarkerKind, Mensuration, Piece, Section};
use crate::proportion::Proportion;

use super::clef_set::RenderedClefSet;
use super::constants::*;
use super::draw::{clef_width, note_width};
use super::event_group::{
    GroupType, LigatureType, RenderedEventGroup, RenderedLigature, TieState,
};
use super::measure::{MeasureInfo, MeasureList};

// ═══════════════════════════════════════════════════════════════════════
// Rendered structures
// ═══════════════════════════════════════════════════════════════════════

/// One event of a voice, placed in time and space.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedEvent {
    pub event: Event,
    /// Section-relative start, tempo-adjusted minims.
    pub music_time: Proportion,
    /// Notated length divided by the proportion in force.
    pub real_length: Proportion,
    /// Cumulative tempo proportion in force for this event.
    pub proportion: Proportion,
    /// Clef set in force after this event (index into the voice's sets).
    pub clef_set: Option<usize>,
    /// Mensuration in force after this event.
    pub mensuration: Mensuration,
    pub tie_state: TieState,
    pub ligature: Option<usize>,
    pub tie: Option<usize>,
    pub variant_group: Option<usize>,
    /// Index into the section's measure list.
    pub measure: Option<usize>,
    /// Offset from the measure's left edge at natural spacing.
    pub xloc: f64,
    pub x_size: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RenderedVoice {
    pub events: Vec<RenderedEvent>,
    pub clef_sets: Vec<RenderedClefSet>,
    pub ligatures: Vec<RenderedLigature>,
    pub ties: Vec<RenderedLigature>,
    pub variant_groups: Vec<RenderedEventGroup>,
    /// Section-relative time at which the voice's last event ends.
    pub end_time: Proportion,
}

impl RenderedVoice {
    /// First event whose measure is `measure`.
    pub fn first_event_in_measure(&self, measure: usize) -> Option<usize> {
        self.events.iter().position(|e| e.measure == Some(measure))
    }

    /// Events of one measure, with their indices.
    pub fn events_in_measure(&self, measure: usize) -> impl Iterator<Item = (usize, &RenderedEvent)> {
        self.events
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.measure == Some(measure))
    }
}

/// Per-voice state carried from one section into the next.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderedSectionParams {
    pub clef_set: Option<RenderedClefSet>,
    pub mensuration: Option<Mensuration>,
    pub used_in_section: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedSection {
    pub section_num: usize,
    pub voices: Vec<Option<RenderedVoice>>,
    pub measures: MeasureList,
    /// State in force for each voice when the section starts.
    pub start_params: Vec<RenderedSectionParams>,
}

impl RenderedSection {
    pub fn num_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn first_measure_num(&self) -> Option<usize> {
        self.measures.first_measure_num()
    }
}

/// Every section of a piece, rendered.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedScore {
    pub title: Option<String>,
    pub composer: Option<String>,
    pub voice_names: Vec<String>,
    pub sections: Vec<RenderedSection>,
}

impl RenderedScore {
    pub fn num_voices(&self) -> usize {
        self.voice_names.len()
    }

    pub fn num_measures(&self) -> usize {
        self.sections.iter().map(|s| s.measures.len()).sum()
    }

    /// All measures in score order with their section index.
    pub fn measures(&self) -> impl Iterator<Item = (usize, &MeasureInfo)> {
        self.sections
            .iter()
            .enumerate()
            .flat_map(|(si, s)| s.measures.iter().map(move |m| (si, m)))
    }

    /// Section index and record of a global measure number.
    pub fn locate_measure(&self, measure_num: usize) -> Option<(usize, &MeasureInfo)> {
        self.sections.iter().enumerate().find_map(|(si, s)| {
            s.measures.by_measure_num(measure_num).map(|m| (si, m))
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// ScoreRenderer
// ═══════════════════════════════════════════════════════════════════════

pub struct ScoreRenderer;

impl ScoreRenderer {
    /// Render every section of `piece`.
    pub fn render(piece: &Piece) -> Result<RenderedScore, RenderError> {
        let num_voices = piece.voices.len();
        let mut params = vec![RenderedSectionParams::default(); num_voices];
        let mut sections = Vec::with_capacity(piece.sections.len());
        let mut next_measure = 0;

        for (section_num, section) in piece.sections.iter().enumerate() {
            if section.voices.len() != num_voices {
                return Err(RenderError::VoiceCountMismatch {
                    section: section_num,
                    expected: num_voices,
                    found: section.voices.len(),
                });
            }
            let rendered = render_section(section_num, section, &params, next_measure)?;
            next_measure += rendered.measures.len();
            params = end_params(&rendered, &params);
            log::debug!(
                "section {section_num}: {} measures, {} voices present",
                rendered.measures.len(),
                rendered.voices.iter().filter(|v| v.is_some()).count()
            );
            sections.push(rendered);
        }

        Ok(RenderedScore {
            title: piece.title.clone(),
            composer: piece.composer.clone(),
            voice_names: piece.voices.iter().map(|v| v.name.clone()).collect(),
            sections,
        })
    }
}

fn render_section(
    section_num: usize,
    section: &Section,
    start_params: &[RenderedSectionParams],
    first_measure_num: usize,
) -> Result<RenderedSection, RenderError> {
    let mut voices = Vec::with_capacity(section.voices.len());
    for (v, slot) in section.voices.iter().enumerate() {
        let rendered = match slot {
            Some(vs) => Some(render_voice(section_num, v, &vs.events, &start_params[v])?),
            None => None,
        };
        voices.push(rendered);
    }

    let measures = build_measures(&mut voices, start_params, first_measure_num);

    Ok(RenderedSection {
        section_num,
        voices,
        measures,
        start_params: start_params.to_vec(),
    })
}

/// Params handed to the next section: state at the end of this one, or
/// the incoming state for silent voices.
fn end_params(
    section: &RenderedSection,
    incoming: &[RenderedSectionParams],
) -> Vec<RenderedSectionParams> {
    section
        .voices
        .iter()
        .zip(incoming)
        .map(|(voice, prev)| match voice {
            Some(rv) => {
                let last = rv.events.last();
                RenderedSectionParams {
                    clef_set: last
                        .and_then(|e| e.clef_set)
                        .and_then(|i| rv.clef_sets.get(i).cloned())
                        .or_else(|| prev.clef_set.clone()),
                    mensuration: last_sign(rv.events.iter()).or(prev.mensuration),
                    used_in_section: true,
                }
            }
            None => RenderedSectionParams {
                used_in_section: false,
                ..prev.clone()
            },
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Voice walk
// ═══════════════════════════════════════════════════════════════════════

/// Tie state of every top-level event: a note ties forward when it is
/// marked tied and the next sounding event is a note of the same pitch.
fn classify_ties(events: &[Event]) -> Vec<TieState> {
    let sounding: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, Event::Note(_) | Event::Rest(_) | Event::Multi(_)))
        .map(|(i, _)| i)
        .collect();

    let mut states = vec![TieState::NotTied; events.len()];
    let mut continues = false;
    for (k, &i) in sounding.iter().enumerate() {
        let ties_forward = match (&events[i], sounding.get(k + 1).map(|&j| &events[j])) {
            (Event::Note(n), Some(Event::Note(next))) => n.tie.is_tied() && n.pitch == next.pitch,
            _ => false,
        };
        let is_note = matches!(events[i], Event::Note(_));
        states[i] = if is_note {
            TieState::classify(continues, ties_forward)
        } else {
            TieState::NotTied
        };
        continues = is_note && ties_forward;
    }
    states
}

fn event_width(event: &Event) -> f64 {
    match event {
        Event::Note(n) => note_width(n),
        Event::Rest(_) => REST_WIDTH,
        Event::Clef(c) => clef_width(c),
        Event::Mensuration(_) => MENSURATION_WIDTH,
        Event::ProportionChange(_) => PROPORTION_WIDTH,
        Event::Multi(children) => children.iter().map(event_width).fold(0.0, f64::max),
        Event::VariantMarker(_) => 0.0,
    }
}

fn render_voice(
    section_num: usize,
    voice_num: usize,
    events: &[Event],
    params: &RenderedSectionParams,
) -> Result<RenderedVoice, RenderError> {
    let mut voice = RenderedVoice::default();
    let mut clef_set = None;
    if let Some(carried) = &params.clef_set {
        let mut set = carried.clone();
        set.event_nums.iter_mut().for_each(|n| *n = None);
        voice.clef_sets.push(set);
        clef_set = Some(0);
    }
    let mut mensuration = params.mensuration.unwrap_or_default();
    let mut proportion = Proportion::ONE;
    let mut time = Proportion::ZERO;

    let tie_states = classify_ties(events);
    let mut ligature = RenderedLigature::new(LigatureType::Ligature);
    let mut tie = RenderedLigature::new(LigatureType::Tie);
    let mut open_variant: Option<usize> = None;

    for (i, event) in events.iter().enumerate() {
        match event {
            Event::Clef(clef) => {
                clef_set = Some(RenderedClefSet::combine(&mut voice.clef_sets, *clef, Some(i)));
            }
            Event::Mensuration(m) => mensuration = *m,
            Event::ProportionChange(p) => {
                if p.is_zero() {
                    return Err(RenderError::ZeroProportion {
                        section: section_num,
                        voice: voice_num,
                    });
                }
                proportion = proportion * *p;
            }
            _ => {}
        }

        let mut ligature_idx = None;
        let mut tie_idx = None;
        if let Event::Note(note) = event {
            let closed = ligature.update(i, note);
            if ligature.is_open() || closed {
                ligature_idx = Some(voice.ligatures.len());
            }
            if closed {
                voice.ligatures.push(std::mem::replace(
                    &mut ligature,
                    RenderedLigature::new(LigatureType::Ligature),
                ));
            }

            if tie_states[i] != TieState::NotTied {
                tie.update(i, note);
                tie_idx = Some(voice.ties.len());
                if tie_states[i] == TieState::TieEnd {
                    tie.close();
                    voice.ties.push(std::mem::replace(
                        &mut tie,
                        RenderedLigature::new(LigatureType::Tie),
                    ));
                }
            }
        }

        let mut variant_idx = open_variant;
        if let Event::VariantMarker(marker) = event {
            match (marker.kind, open_variant) {
                (MarkerKind::Start, None) => {
                    open_variant = Some(voice.variant_groups.len());
                    variant_idx = open_variant;
                    voice
                        .variant_groups
                        .push(RenderedEventGroup::spanning(GroupType::VariantReading, i, i));
                }
                (MarkerKind::End, Some(g)) => {
                    voice.variant_groups[g].last_event_num = Some(i);
                    open_variant = None;
                }
                (kind, _) => log::warn!(
                    "section {section_num} voice {voice_num}: unbalanced variant {kind:?} marker at event {i}"
                ),
            }
        }

        let real_length = event
            .music_length()
            .quotient(proportion)
            .map_err(|_| RenderError::ZeroProportion {
                section: section_num,
                voice: voice_num,
            })?;

        voice.events.push(RenderedEvent {
            event: event.clone(),
            music_time: time,
            real_length,
            proportion,
            clef_set,
            mensuration,
            tie_state: tie_states[i],
            ligature: ligature_idx,
            tie: tie_idx,
            variant_group: variant_idx,
            measure: None,
            xloc: 0.0,
            x_size: event_width(event),
        });
        time = time + real_length;
    }

    if ligature.is_open() {
        log::warn!("section {section_num} voice {voice_num}: ligature left open at end of section");
        voice.ligatures.push(ligature);
    }
    if let Some(g) = open_variant {
        log::warn!("section {section_num} voice {voice_num}: variant reading never closed");
        voice.variant_groups[g].last_event_num = voice.events.len().checked_sub(1);
    }
    voice.end_time = time;
    Ok(voice)
}

// ═══════════════════════════════════════════════════════════════════════
// Measures
// ═══════════════════════════════════════════════════════════════════════

/// The last mensuration sign among `events`.
fn last_sign<'a>(events: impl Iterator<Item = &'a RenderedEvent>) -> Option<Mensuration> {
    events
        .filter_map(|e| match e.event {
            Event::Mensuration(m) => Some(m),
            _ => None,
        })
        .last()
}

/// Mensuration and proportion of a voice at `time`: the state after the
/// last event starting at or before it.
fn state_at(
    voice: &RenderedVoice,
    time: Proportion,
    fallback: Mensuration,
) -> (Mensuration, Proportion) {
    voice
        .events
        .iter()
        .take_while(|e| e.music_time <= time)
        .last()
        .map_or((fallback, Proportion::ONE), |e| (e.mensuration, e.proportion))
}

fn build_measures(
    voices: &mut [Option<RenderedVoice>],
    start_params: &[RenderedSectionParams],
    first_measure_num: usize,
) -> MeasureList {
    let mut measures = MeasureList::new();
    let section_end = voices
        .iter()
        .flatten()
        .map(|v| v.end_time)
        .max()
        .unwrap_or(Proportion::ZERO);
    let default_voice = voices.iter().position(|v| v.is_some());

    let mut start = Proportion::ZERO;
    while start < section_end {
        let fallback = |v: usize| start_params[v].mensuration.unwrap_or_default();
        let (mensuration, default_prop) = match default_voice {
            Some(dv) => voices[dv]
                .as_ref()
                .map_or((fallback(dv), Proportion::ONE), |v| state_at(v, start, fallback(dv))),
            None => (Mensuration::default(), Proportion::ONE),
        };
        let tempo_proportions = voices
            .iter()
            .enumerate()
            .map(|(v, voice)| {
                voice
                    .as_ref()
                    .map_or(Proportion::ONE, |rv| state_at(rv, start, fallback(v)).1)
            })
            .collect();

        let mut measure = MeasureInfo {
            measure_num: first_measure_num + measures.len(),
            start_time: start,
            num_minims: mensuration.breve_minims(),
            default_tempo_proportion: default_prop,
            tempo_proportions,
            revent_index: vec![None; voices.len()],
            start_clef_sets: vec![None; voices.len()],
            start_mensurations: vec![None; voices.len()],
            x_length: 0.0,
            left_x: 0.0,
        };
        let duration = measure.duration();
        if duration.is_zero() {
            break;
        }
        start = start + duration;
        measure.x_length = duration.to_f64() * MINIM_SPACE;
        measures.push(measure);
    }

    assign_events(voices, &mut measures, start_params);
    measures
}

/// Attach events to measures, fill per-voice measure state and compute
/// natural x positions and widths.
fn assign_events(
    voices: &mut [Option<RenderedVoice>],
    measures: &mut MeasureList,
    start_params: &[RenderedSectionParams],
) {
    let starts: Vec<Proportion> = measures.iter().map(|m| m.start_time).collect();
    let mut content_width = vec![0.0_f64; measures.len()];

    for (v, slot) in voices.iter_mut().enumerate() {
        let Some(voice) = slot else { continue };
        let initial_clef_set = start_params[v].clef_set.as_ref().map(|_| 0);

        let mut last_right: Option<(usize, f64)> = None;
        for event in voice.events.iter_mut() {
            let Some(m) = measures.index_at_time(event.music_time) else {
                continue;
            };
            event.measure = Some(m);
            let time_x = MEASURE_LEFT_PAD + (event.music_time - starts[m]).to_f64() * MINIM_SPACE;
            let min_x = match last_right {
                Some((lm, right)) if lm == m => right + EVENT_GAP,
                _ => MEASURE_LEFT_PAD,
            };
            event.xloc = time_x.max(min_x);
            if event.x_size > 0.0 {
                last_right = Some((m, event.xloc + event.x_size));
            }
            content_width[m] = content_width[m].max(event.xloc + event.x_size);
        }

        for (m, measure) in measures.iter_mut().enumerate() {
            measure.revent_index[v] = voice.first_event_in_measure(m);
            let before: Vec<&RenderedEvent> = voice
                .events
                .iter()
                .filter(|e| e.measure.map_or(false, |em| em < m))
                .collect();
            measure.start_clef_sets[v] = before.last().map_or(initial_clef_set, |e| e.clef_set);
            measure.start_mensurations[v] =
                last_sign(before.into_iter()).or(start_params[v].mensuration);
        }
    }

    let mut left_x = 0.0;
    for (m, measure) in measures.iter_mut().enumerate() {
        let time_width = measure.x_length + MEASURE_LEFT_PAD;
        measure.x_length = time_width.max(content_width[m]) + MEASURE_RIGHT_PAD;
        measure.left_x = left_x;
        left_x += measure.x_length;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;

    fn voice_info(name: &str) -> VoiceInfo {
        VoiceInfo {
            name: name.into(),
            abbreviation: None,
        }
    }

    fn sb(letter: char, octave: i32) -> Event {
        Event::Note(Note::new(Pitch::new(letter, octave).unwrap(), NoteType::Semibrevis))
    }

    fn piece(sections: Vec<Vec<Option<Vec<Event>>>>, voices: usize) -> Piece {
        Piece {
            title: None,
            composer: None,
            voices: (0..voices).map(|i| voice_info(&format!("V{i}"))).collect(),
            sections: sections
                .into_iter()
                .map(|s| Section {
                    voices: s
                        .into_iter()
                        .map(|v| v.map(|events| VoiceSection { events }))
                        .collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn measures_follow_breves() {
        let events = vec![
            Event::Clef(ClefEvent::new(ClefKind::C, 4)),
            sb('C', 4),
            sb('D', 4),
            sb('E', 4),
        ];
        let score = ScoreRenderer::render(&piece(vec![vec![Some(events)]], 1)).unwrap();
        let section = &score.sections[0];
        // 6 minims in 2:2 mensuration = 2 measures (4 + 2).
        assert_eq!(section.measures.len(), 2);
        let voice = section.voices[0].as_ref().unwrap();
        assert_eq!(voice.events[3].measure, Some(1));
        assert_eq!(section.measures.get(1).unwrap().revent_index[0], Some(3));
        assert_eq!(section.measures.get(1).unwrap().start_clef_sets[0], Some(0));
        assert_eq!(section.measures.get(0).unwrap().start_clef_sets[0], None);
    }

    #[test]
    fn proportion_shortens_real_time() {
        let events = vec![
            Event::ProportionChange(Proportion::new(3, 2).unwrap()),
            sb('C', 4),
            sb('D', 4),
            sb('E', 4),
        ];
        let score = ScoreRenderer::render(&piece(vec![vec![Some(events)]], 1)).unwrap();
        let voice = score.sections[0].voices[0].as_ref().unwrap();
        assert_eq!(voice.end_time, Proportion::from_integer(4));
        // A breve under 3:2 lasts 8/3, so 4 real minims need two measures.
        let measures = &score.sections[0].measures;
        assert_eq!(measures.len(), 2);
        assert_eq!(measures.get(1).unwrap().start_time, Proportion::new(8, 3).unwrap());
        assert_eq!(
            score.sections[0].measures.get(0).unwrap().default_tempo_proportion,
            Proportion::new(3, 2).unwrap()
        );
    }

    #[test]
    fn zero_proportion_is_rejected() {
        let events = vec![Event::ProportionChange(Proportion::ZERO), sb('C', 4)];
        let err = ScoreRenderer::render(&piece(vec![vec![Some(events)]], 1)).unwrap_err();
        assert!(matches!(err, RenderError::ZeroProportion { section: 0, voice: 0 }));
    }

    #[test]
    fn voice_count_mismatch_is_rejected() {
        let err = ScoreRenderer::render(&piece(vec![vec![Some(vec![sb('C', 4)])]], 2)).unwrap_err();
        assert!(matches!(err, RenderError::VoiceCountMismatch { expected: 2, found: 1, .. }));
    }

    #[test]
    fn params_carry_into_silent_and_resuming_voices() {
        let s0 = vec![
            Some(vec![Event::Clef(ClefEvent::new(ClefKind::F, 6)), sb('F', 3), sb('G', 3)]),
            Some(vec![Event::Clef(ClefEvent::new(ClefKind::C, 0)), sb('C', 4), sb('D', 4)]),
        ];
        let s1 = vec![None, Some(vec![sb('E', 4), sb('F', 4)])];
        let s2 = vec![Some(vec![sb('A', 3), sb('B', 3)]), Some(vec![sb('C', 4), sb('C', 4)])];
        let score = ScoreRenderer::render(&piece(vec![s0, s1, s2], 2)).unwrap();

        let p1 = &score.sections[1].start_params;
        assert!(p1[0].used_in_section);
        assert_eq!(p1[0].clef_set.as_ref().map(|s| s.clefs[0].kind), Some(ClefKind::F));

        let p2 = &score.sections[2].start_params;
        assert!(!p2[0].used_in_section);
        assert_eq!(p2[0].clef_set.as_ref().map(|s| s.clefs[0].kind), Some(ClefKind::F));
        let bass = score.sections[2].voices[0].as_ref().unwrap();
        assert_eq!(bass.clef_sets.len(), 1);
        assert_eq!(bass.events[0].clef_set, Some(0));

        assert_eq!(score.sections[1].first_measure_num(), Some(1));
        assert_eq!(score.locate_measure(2).map(|(s, _)| s), Some(2));
    }

    #[test]
    fn tie_chain_is_classified_and_grouped() {
        let tied = |l| Event::Note(Note::new(Pitch::new(l, 4).unwrap(), NoteType::Minima).tied(TieType::Over));
        let events = vec![
            tied('G'),
            Event::Clef(ClefEvent::new(ClefKind::Flat, 2)),
            tied('G'),
            tied('G'),
            Event::Note(Note::new(Pitch::new('G', 4).unwrap(), NoteType::Minima)),
            tied('A'),
            Event::Rest(Rest::new(NoteType::Minima)),
        ];
        let score = ScoreRenderer::render(&piece(vec![vec![Some(events)]], 1)).unwrap();
        let voice = score.sections[0].voices[0].as_ref().unwrap();
        let states: Vec<TieState> = voice.events.iter().map(|e| e.tie_state).collect();
        assert_eq!(
            states,
            vec![
                TieState::TieStart,
                TieState::NotTied,
                TieState::TieMiddle,
                TieState::TieMiddle,
                TieState::TieEnd,
                TieState::NotTied,
                TieState::NotTied,
            ]
        );
        assert_eq!(voice.ties.len(), 1);
        assert_eq!(voice.ties[0].group.first_event_num, Some(0));
        assert_eq!(voice.ties[0].group.last_event_num, Some(4));
    }

    #[test]
    fn empty_section_has_no_measures() {
        let events = vec![Event::Clef(ClefEvent::new(ClefKind::C, 4))];
        let score = ScoreRenderer::render(&piece(vec![vec![Some(events)], vec![None]], 1)).unwrap();
        assert!(score.sections[0].measures.is_empty());
        assert!(score.sections[1].measures.is_empty());
        assert_eq!(score.num_measures(), 0);
    }
}
