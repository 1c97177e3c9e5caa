//! MIDI sequence construction from rendered sections.
//!
//! One track per voice. Every track starts with a program change and a
//! channel volume; track 0 also carries the tempo and one marker per
//! measure (1-based measure number) for playback progress. Times are kept
//! as exact `Proportion`s in minims and only rounded to ticks at the end.

use std::path::Path;

use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use serde::Serialize;

use crate::config::Config;
use crate::error::{ExportError, SequenceError};
use crate::model::{Event, Note};
use crate::proportion::Proportion;
use crate::renderer::{RenderedClefSet, RenderedScore, RenderedSection, RenderedVoice};
use crate::timemap::section_start_times;

/// MIDI controller number for channel volume.
const CC_CHANNEL_VOLUME: u8 = 7;

// ═══════════════════════════════════════════════════════════════════════
// Sequence types
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MidiMessageKind {
    ProgramChange { program: u8 },
    ChannelVolume { value: u8 },
    NoteOn { key: u8, velocity: u8 },
    NoteOff { key: u8 },
    /// Carries the 1-based measure number.
    Marker { measure: u32 },
    EndOfTrack,
}

impl MidiMessageKind {
    /// Ordering among messages at the same instant: setup first, releases
    /// before markers before attacks, end of track last.
    pub(crate) fn order(&self) -> u8 {
        match self {
            MidiMessageKind::ProgramChange { .. } | MidiMessageKind::ChannelVolume { .. } => 0,
            MidiMessageKind::NoteOff { .. } => 1,
            MidiMessageKind::Marker { .. } => 2,
            MidiMessageKind::NoteOn { .. } => 3,
            MidiMessageKind::EndOfTrack => 4,
        }
    }

    /// Raw channel message bytes; `None` for meta messages.
    pub fn to_bytes(&self, channel: u8) -> Option<Vec<u8>> {
        let ch = channel & 0x0F;
        match *self {
            MidiMessageKind::ProgramChange { program } => Some(vec![0xC0 | ch, program]),
            MidiMessageKind::ChannelVolume { value } => {
                Some(vec![0xB0 | ch, CC_CHANNEL_VOLUME, value])
            }
            MidiMessageKind::NoteOn { key, velocity } => Some(vec![0x90 | ch, key, velocity]),
            MidiMessageKind::NoteOff { key } => Some(vec![0x80 | ch, key, 0]),
            MidiMessageKind::Marker { .. } | MidiMessageKind::EndOfTrack => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimedMessage {
    /// Absolute time in real minims.
    pub time: Proportion,
    pub tick: u64,
    pub message: MidiMessageKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct MidiTrack {
    pub voice: usize,
    pub name: String,
    pub channel: u8,
    pub messages: Vec<TimedMessage>,
}

impl MidiTrack {
    pub fn note_ons(&self) -> impl Iterator<Item = &TimedMessage> {
        self.messages
            .iter()
            .filter(|m| matches!(m.message, MidiMessageKind::NoteOn { .. }))
    }

    pub fn note_offs(&self) -> impl Iterator<Item = &TimedMessage> {
        self.messages
            .iter()
            .filter(|m| matches!(m.message, MidiMessageKind::NoteOff { .. }))
    }

    pub fn markers(&self) -> impl Iterator<Item = &TimedMessage> {
        self.messages
            .iter()
            .filter(|m| matches!(m.message, MidiMessageKind::Marker { .. }))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Sequence {
    pub ticks_per_beat: u16,
    pub micros_per_beat: u32,
    pub tracks: Vec<MidiTrack>,
    /// Tick of the end-of-track messages.
    pub length_ticks: u64,
}

// ═══════════════════════════════════════════════════════════════════════
// Construction
// ═══════════════════════════════════════════════════════════════════════

/// Build the playback sequence for a rendered score.
pub fn build_sequence(score: &RenderedScore, config: &Config) -> Result<Sequence, SequenceError> {
    config.validate()?;
    let num_voices = score.num_voices();
    let starts = section_start_times(score, config);

    let mut tracks: Vec<MidiTrack> = (0..num_voices)
        .map(|v| {
            let channel = config.channel_for_voice(v);
            MidiTrack {
                voice: v,
                name: score.voice_names[v].clone(),
                channel,
                messages: vec![
                    timed(Proportion::ZERO, MidiMessageKind::ProgramChange {
                        program: config.default_program,
                    }),
                    timed(Proportion::ZERO, MidiMessageKind::ChannelVolume {
                        value: config.channel_volume(),
                    }),
                ],
            }
        })
        .collect();

    let mut end = Proportion::ZERO;
    for (si, section) in score.sections.iter().enumerate() {
        check_section(section, num_voices)?;
        let start = starts[si];

        if let Some(track0) = tracks.first_mut() {
            for m in section.measures.iter() {
                track0.messages.push(timed(
                    start + m.start_time,
                    MidiMessageKind::Marker {
                        measure: (m.measure_num + 1) as u32,
                    },
                ));
            }
        }

        for (v, slot) in section.voices.iter().enumerate() {
            if let Some(voice) = slot {
                let mut walker = VoiceWalker {
                    section: si,
                    voice_num: v,
                    velocity: config.default_velocity,
                    messages: &mut tracks[v].messages,
                };
                let voice_end = walker.walk(voice, start)?;
                end = end.max(voice_end);
            }
        }
        end = end.max(start + section.measures.total_duration());
        log::debug!("sequenced section {si} starting at {start} minims");
    }

    let tpm = config.ticks_per_minim();
    for track in &mut tracks {
        track.messages.push(timed(end, MidiMessageKind::EndOfTrack));
        track
            .messages
            .sort_by(|a, b| a.time.cmp(&b.time).then(a.message.order().cmp(&b.message.order())));
        for message in &mut track.messages {
            message.tick = message.time.to_ticks(tpm);
        }
    }

    Ok(Sequence {
        ticks_per_beat: config.ticks_per_beat,
        micros_per_beat: config.micros_per_beat(),
        tracks,
        length_ticks: end.to_ticks(tpm),
    })
}

fn timed(time: Proportion, message: MidiMessageKind) -> TimedMessage {
    TimedMessage {
        time,
        tick: 0,
        message,
    }
}

fn check_section(section: &RenderedSection, num_voices: usize) -> Result<(), SequenceError> {
    if section.voices.len() != num_voices {
        return Err(SequenceError::InconsistentSection {
            section: section.section_num,
            reason: format!("{} voices, score has {}", section.voices.len(), num_voices),
        });
    }
    if let Some(m) = section
        .measures
        .iter()
        .find(|m| m.num_voices() != num_voices || m.default_tempo_proportion.is_zero())
    {
        return Err(SequenceError::InconsistentSection {
            section: section.section_num,
            reason: format!("measure {} does not match the section's voices", m.measure_num),
        });
    }
    Ok(())
}

/// Sequences one voice of one section.
struct VoiceWalker<'a> {
    section: usize,
    voice_num: usize,
    velocity: u8,
    messages: &'a mut Vec<TimedMessage>,
}

impl VoiceWalker<'_> {
    /// Returns the absolute time at which the voice ends.
    fn walk(&mut self, voice: &RenderedVoice, section_start: Proportion) -> Result<Proportion, SequenceError> {
        let mut cur_time = section_start;
        let mut cur_proportion = Proportion::ONE;
        let mut tie_key: Option<u8> = None;

        for ev in &voice.events {
            if section_start + ev.music_time != cur_time {
                return Err(SequenceError::InconsistentSection {
                    section: self.section,
                    reason: format!(
                        "voice {} event at {} but sequencing reached {}",
                        self.voice_num,
                        ev.music_time,
                        cur_time - section_start
                    ),
                });
            }
            let clef_set = ev.clef_set.and_then(|i| voice.clef_sets.get(i));
            match &ev.event {
                Event::Note(note) => {
                    let key = self.key_for(note, clef_set)?;
                    let length = note.length.quotient(cur_proportion)?;
                    if ev.tie_state.emits_note_on() {
                        self.note_on(cur_time, key);
                        tie_key = Some(key);
                    }
                    cur_time = cur_time + length;
                    if ev.tie_state.emits_note_off() {
                        let key = tie_key.take().unwrap_or(key);
                        self.note_off(cur_time, key);
                    }
                }
                Event::Rest(rest) => {
                    cur_time = cur_time + rest.length.quotient(cur_proportion)?;
                }
                Event::ProportionChange(p) => cur_proportion = cur_proportion * *p,
                Event::Multi(children) => {
                    let mut join = cur_time;
                    for child in children {
                        join = join.max(self.branch(child, cur_time, cur_proportion, clef_set)?);
                    }
                    cur_time = join;
                }
                Event::Clef(_) | Event::Mensuration(_) | Event::VariantMarker(_) => {}
            }
        }
        Ok(cur_time)
    }

    /// Sequence one branch of a multi-event from `start`; returns its end.
    fn branch(
        &mut self,
        event: &Event,
        start: Proportion,
        proportion: Proportion,
        clef_set: Option<&RenderedClefSet>,
    ) -> Result<Proportion, SequenceError> {
        Ok(match event {
            Event::Note(note) => {
                let key = self.key_for(note, clef_set)?;
                let end = start + note.length.quotient(proportion)?;
                self.note_on(start, key);
                self.note_off(end, key);
                end
            }
            Event::Rest(rest) => start + rest.length.quotient(proportion)?,
            Event::Multi(children) => {
                let mut join = start;
                for child in children {
                    join = join.max(self.branch(child, start, proportion, clef_set)?);
                }
                join
            }
            _ => start,
        })
    }

    fn key_for(&self, note: &Note, clef_set: Option<&RenderedClefSet>) -> Result<u8, SequenceError> {
        let key = match note.accidental {
            Some(_) => note.pitch.to_midi(note.accidental),
            None => note.pitch.to_midi(None) + clef_set.map_or(0, |s| s.signature_alter(&note.pitch)),
        };
        u8::try_from(key)
            .ok()
            .filter(|k| *k <= 127)
            .ok_or_else(|| SequenceError::PitchOutOfRange {
                section: self.section,
                voice: self.voice_num,
                pitch: note.pitch.to_string(),
            })
    }

    fn note_on(&mut self, time: Proportion, key: u8) {
        self.messages.push(timed(time, MidiMessageKind::NoteOn {
            key,
            velocity: self.velocity,
        }));
    }

    fn note_off(&mut self, time: Proportion, key: u8) {
        self.messages.push(timed(time, MidiMessageKind::NoteOff { key }));
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Standard MIDI File export
// ═══════════════════════════════════════════════════════════════════════

impl Sequence {
    /// Encode as a format 1 Standard MIDI File.
    pub fn to_smf_bytes(&self) -> Result<Vec<u8>, ExportError> {
        let ppq = u15::try_from(self.ticks_per_beat).ok_or(ExportError::OutOfRange {
            what: "ticks per beat",
            value: self.ticks_per_beat as u64,
        })?;
        let tempo = u24::try_from(self.micros_per_beat).ok_or(ExportError::OutOfRange {
            what: "tempo",
            value: self.micros_per_beat as u64,
        })?;

        // Marker texts must outlive the borrowed SMF events.
        let labels: Vec<Vec<String>> = self
            .tracks
            .iter()
            .map(|t| {
                t.messages
                    .iter()
                    .map(|m| match m.message {
                        MidiMessageKind::Marker { measure } => measure.to_string(),
                        _ => String::new(),
                    })
                    .collect()
            })
            .collect();

        let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(ppq)));
        for (ti, track) in self.tracks.iter().enumerate() {
            let channel = u4::new(track.channel & 0x0F);
            let mut events: Vec<TrackEvent> = vec![TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::TrackName(track.name.as_bytes())),
            }];
            if ti == 0 {
                events.push(TrackEvent {
                    delta: u28::new(0),
                    kind: TrackEventKind::Meta(MetaMessage::Tempo(tempo)),
                });
            }

            let mut last_tick = 0u64;
            for (message, label) in track.messages.iter().zip(&labels[ti]) {
                let delta = message.tick.saturating_sub(last_tick);
                let delta = u32::try_from(delta)
                    .ok()
                    .and_then(u28::try_from)
                    .ok_or(ExportError::OutOfRange {
                        what: "delta time",
                        value: delta,
                    })?;
                last_tick = message.tick;
                let kind = match message.message {
                    MidiMessageKind::ProgramChange { program } => TrackEventKind::Midi {
                        channel,
                        message: MidiMessage::ProgramChange {
                            program: u7::new(program),
                        },
                    },
                    MidiMessageKind::ChannelVolume { value } => TrackEventKind::Midi {
                        channel,
                        message: MidiMessage::Controller {
                            controller: u7::new(CC_CHANNEL_VOLUME),
                            value: u7::new(value),
                        },
                    },
                    MidiMessageKind::NoteOn { key, velocity } => TrackEventKind::Midi {
                        channel,
                        message: MidiMessage::NoteOn {
                            key: u7::new(key),
                            vel: u7::new(velocity),
                        },
                    },
                    MidiMessageKind::NoteOff { key } => TrackEventKind::Midi {
                        channel,
                        message: MidiMessage::NoteOff {
                            key: u7::new(key),
                            vel: u7::new(0),
                        },
                    },
                    MidiMessageKind::Marker { .. } => {
                        TrackEventKind::Meta(MetaMessage::Marker(label.as_bytes()))
                    }
                    MidiMessageKind::EndOfTrack => TrackEventKind::Meta(MetaMessage::EndOfTrack),
                };
                events.push(TrackEvent { delta, kind });
            }
            smf.tracks.push(events);
        }

        let mut buf = Vec::new();
        smf.write_std(&mut buf)?;
        Ok(buf)
    }

    /// Write the sequence to a `.mid` file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ExportError> {
        let bytes = self.to_smf_bytes()?;
        std::fs::write(path.as_ref(), bytes)?;
        log::info!("wrote MIDI file {}", path.as_ref().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::renderer::ScoreRenderer;

    fn single_voice(events: Vec<Event>) -> RenderedScore {
        let piece = Piece {
            title: None,
            composer: None,
            voices: vec![VoiceInfo {
                name: "Cantus".into(),
                abbreviation: None,
            }],
            sections: vec![Section {
                voices: vec![Some(VoiceSection { events })],
            }],
        };
        ScoreRenderer::render(&piece).unwrap()
    }

    fn minim(letter: char) -> Note {
        Note::new(Pitch::new(letter, 4).unwrap(), NoteType::Minima)
    }

    #[test]
    fn setup_messages_lead_each_track() {
        let score = single_voice(vec![Event::Note(minim('C'))]);
        let seq = build_sequence(&score, &Config::default()).unwrap();
        let kinds: Vec<_> = seq.tracks[0].messages.iter().map(|m| m.message).collect();
        assert_eq!(kinds[0], MidiMessageKind::ProgramChange { program: 52 });
        assert_eq!(kinds[1], MidiMessageKind::ChannelVolume { value: 102 });
        assert_eq!(*kinds.last().unwrap(), MidiMessageKind::EndOfTrack);
    }

    #[test]
    fn release_precedes_attack_at_same_instant() {
        let score = single_voice(vec![Event::Note(minim('C')), Event::Note(minim('C'))]);
        let seq = build_sequence(&score, &Config::default()).unwrap();
        let at_48: Vec<_> = seq.tracks[0]
            .messages
            .iter()
            .filter(|m| m.tick == 48)
            .map(|m| m.message)
            .collect();
        assert_eq!(
            at_48,
            vec![
                MidiMessageKind::NoteOff { key: 60 },
                MidiMessageKind::NoteOn { key: 60, velocity: 96 }
            ]
        );
    }

    #[test]
    fn signature_flat_lowers_key() {
        let score = single_voice(vec![
            Event::Clef(ClefEvent::new(ClefKind::C, 4)),
            Event::Clef(ClefEvent::new(ClefKind::Flat, 3)),
            Event::Note(Note::new(Pitch::new('B', 3).unwrap(), NoteType::Minima)),
            Event::Note(
                Note {
                    accidental: Some(Accidental::Natural),
                    ..Note::new(Pitch::new('B', 3).unwrap(), NoteType::Minima)
                },
            ),
        ]);
        let seq = build_sequence(&score, &Config::default()).unwrap();
        let keys: Vec<u8> = seq.tracks[0]
            .note_ons()
            .map(|m| match m.message {
                MidiMessageKind::NoteOn { key, .. } => key,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(keys, vec![58, 59]);
    }

    #[test]
    fn out_of_range_pitch_is_an_error() {
        let score = single_voice(vec![Event::Note(Note::new(Pitch::new('C', 11).unwrap(), NoteType::Minima))]);
        let err = build_sequence(&score, &Config::default()).unwrap_err();
        assert!(matches!(err, SequenceError::PitchOutOfRange { voice: 0, .. }));
    }

    #[test]
    fn smf_bytes_have_header_and_tracks() {
        let score = single_voice(vec![Event::Note(minim('D')), Event::Rest(Rest::new(NoteType::Minima))]);
        let seq = build_sequence(&score, &Config::default()).unwrap();
        let bytes = seq.to_smf_bytes().unwrap();
        assert_eq!(&bytes[0..4], b"MThd");
        assert_eq!(&bytes[8..10], &1u16.to_be_bytes());
        assert_eq!(&bytes[10..12], &1u16.to_be_bytes());
        assert_eq!(&bytes[12..14], &96u16.to_be_bytes());

        let parsed = midly::Smf::parse(&bytes).unwrap();
        assert_eq!(parsed.tracks.len(), 1);
    }
}
