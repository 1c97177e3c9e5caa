//! Absolute start times and durations for every measure of the score, in
//! minims and in ticks, with the rest gap between sections included.
//! Playback start positions and cursor sync both read from here.

use serde::Serialize;

use crate::config::Config;
use crate::error::PlaybackError;
use crate::proportion::Proportion;
use crate::renderer::RenderedScore;

/// Timing information for one measure.
#[derive(Debug, Clone, Serialize)]
pub struct TimemapEntry {
    /// Global measure index (0-based)
    pub measure_num: usize,
    /// Section the measure belongs to
    pub section: usize,
    /// Start from the beginning of the piece, in real minims
    pub start_time: Proportion,
    /// Real duration (notated minims over the tempo proportion)
    pub duration: Proportion,
    pub start_tick: u64,
    /// Wall-clock start in milliseconds
    pub timestamp_ms: f64,
}

/// Absolute start of each section, in real minims. Every section with
/// measures that follows another one is preceded by the configured rest
/// gap; empty sections take no time and add no gap.
pub fn section_start_times(score: &RenderedScore, config: &Config) -> Vec<Proportion> {
    let gap = config.section_gap();
    let mut starts = Vec::with_capacity(score.sections.len());
    let mut t = Proportion::ZERO;
    let mut sounded = false;
    for section in &score.sections {
        if section.measures.is_empty() {
            starts.push(t);
            continue;
        }
        if sounded {
            t = t + gap;
        }
        starts.push(t);
        t = t + section.measures.total_duration();
        sounded = true;
    }
    starts
}

pub fn generate_timemap(score: &RenderedScore, config: &Config) -> Vec<TimemapEntry> {
    let starts = section_start_times(score, config);
    let tpm = config.ticks_per_minim();
    let ms_per_minim = 60_000.0 / config.beats_per_minute / crate::config::MINIMS_PER_BEAT as f64;

    score
        .measures()
        .map(|(si, m)| {
            let start_time = starts[si] + m.start_time;
            TimemapEntry {
                measure_num: m.measure_num,
                section: si,
                start_time,
                duration: m.duration(),
                start_tick: start_time.to_ticks(tpm),
                timestamp_ms: start_time.to_f64() * ms_per_minim,
            }
        })
        .collect()
}

/// Tick at which playback starting from 0-based measure `measure` begins.
pub fn start_tick_for_measure(
    score: &RenderedScore,
    config: &Config,
    measure: usize,
) -> Result<u64, PlaybackError> {
    let count = score.num_measures();
    let (si, m) = score
        .locate_measure(measure)
        .ok_or(PlaybackError::InvalidStartMeasure { measure, count })?;
    let starts = section_start_times(score, config);
    Ok((starts[si] + m.start_time).to_ticks(config.ticks_per_minim()))
}

/// Serialize a timemap to JSON.
pub fn timemap_to_json(entries: &[TimemapEntry]) -> String {
    serde_json::to_string(entries).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::renderer::ScoreRenderer;

    fn breves(n: usize) -> Vec<Event> {
        (0..n)
            .map(|_| Event::Note(Note::new(Pitch::new('G', 4).unwrap(), NoteType::Brevis)))
            .collect()
    }

    /// Section 0: two breves. Section 1: 3:2, then two breves.
    fn two_sections() -> RenderedScore {
        let mut second = vec![Event::ProportionChange(Proportion::raw(3, 2))];
        second.extend(breves(2));
        let piece = Piece {
            title: None,
            composer: None,
            voices: vec![VoiceInfo {
                name: "Tenor".into(),
                abbreviation: None,
            }],
            sections: vec![
                Section {
                    voices: vec![Some(VoiceSection { events: breves(2) })],
                },
                Section {
                    voices: vec![Some(VoiceSection { events: second })],
                },
            ],
        };
        ScoreRenderer::render(&piece).unwrap()
    }

    #[test]
    fn sections_are_separated_by_rest_gap() {
        let score = two_sections();
        let starts = section_start_times(&score, &Config::default());
        // 8 minims, then one beat (2 minims) of rest.
        assert_eq!(starts, vec![Proportion::ZERO, Proportion::from_integer(10)]);
    }

    #[test]
    fn empty_sections_add_no_gap() {
        let tenor = |events: Vec<Event>| Section {
            voices: vec![Some(VoiceSection { events })],
        };
        let piece = Piece {
            title: None,
            composer: None,
            voices: vec![VoiceInfo {
                name: "Tenor".into(),
                abbreviation: None,
            }],
            sections: vec![
                tenor(Vec::new()),
                tenor(breves(2)),
                tenor(Vec::new()),
                Section { voices: vec![None] },
                tenor(breves(1)),
            ],
        };
        let score = ScoreRenderer::render(&piece).unwrap();
        let starts = section_start_times(&score, &Config::default());
        let eight = Proportion::from_integer(8);
        assert_eq!(
            starts,
            vec![Proportion::ZERO, Proportion::ZERO, eight, eight, Proportion::from_integer(10)]
        );
        let map = generate_timemap(&score, &Config::default());
        assert_eq!(map[2].start_tick, 480);
    }

    #[test]
    fn timemap_lists_every_measure() {
        let score = two_sections();
        let map = generate_timemap(&score, &Config::default());
        let starts: Vec<_> = map.iter().map(|e| e.start_time).collect();
        let third = Proportion::from_integer(10);
        let fourth = third + Proportion::raw(8, 3);
        assert_eq!(
            starts,
            vec![Proportion::ZERO, Proportion::from_integer(4), third, fourth]
        );
        assert_eq!(map[3].section, 1);
        assert_eq!(map[3].duration, Proportion::raw(8, 3));
        // 48 ticks per minim.
        assert_eq!(map[3].start_tick, 608);
        // 80 bpm, 2 minims per beat: 375 ms per minim.
        assert!((map[1].timestamp_ms - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn start_tick_sums_prior_measures_and_gaps() {
        let score = two_sections();
        let config = Config::default();
        assert_eq!(start_tick_for_measure(&score, &config, 0), Ok(0));
        assert_eq!(start_tick_for_measure(&score, &config, 2), Ok(480));
        assert_eq!(
            start_tick_for_measure(&score, &config, 4),
            Err(PlaybackError::InvalidStartMeasure { measure: 4, count: 4 })
        );
    }
}
