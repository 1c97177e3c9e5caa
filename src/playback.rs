//! Real-time playback of a `Sequence` on a MIDI output device.
//!
//! A session runs on one worker thread that owns the opened device. It
//! reports progress through an unbounded channel so the host is never
//! blocked, and releases the device when the sequence ends or when the
//! player is stopped.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::config::Config;
use crate::error::PlaybackError;
use crate::midi::{MidiMessageKind, Sequence};
use crate::renderer::RenderedScore;
use crate::timemap::start_tick_for_measure;

/// Controller number for "all notes off".
const CC_ALL_NOTES_OFF: u8 = 123;

/// An opened MIDI output. Dropping it releases the underlying port.
pub trait MidiDevice: Send {
    fn send(&mut self, message: &[u8]) -> Result<(), PlaybackError>;
}

/// Opens devices for playback sessions.
pub trait DeviceProvider {
    fn open(&self) -> Result<Box<dyn MidiDevice>, PlaybackError>;
}

/// Progress notifications from the playback thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// Playback reached the marker of this 1-based measure.
    MeasureReached(u32),
    /// The end of the sequence was reached and the device released.
    Finished,
    /// The device rejected a message; the session ended.
    Failed(PlaybackError),
}

// ═══════════════════════════════════════════════════════════════════════
// Schedule
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cue {
    Send(Vec<u8>),
    Measure(u32),
    End,
}

#[derive(Debug, Clone)]
struct Scheduled {
    tick: u64,
    order: u8,
    cue: Cue,
}

/// Everything a session needs, detached from the borrowed sequence.
#[derive(Debug, Clone)]
struct Schedule {
    setup: Vec<Vec<u8>>,
    cues: Vec<Scheduled>,
    channels: Vec<u8>,
    start_tick: u64,
    micros_per_tick: f64,
}

impl Schedule {
    /// Merge all tracks, keeping setup messages and everything at or after
    /// `start_tick`. Notes already sounding at the start are not replayed.
    fn new(sequence: &Sequence, start_tick: u64) -> Self {
        let mut setup = Vec::new();
        let mut cues = Vec::new();
        let mut channels = Vec::new();

        for (ti, track) in sequence.tracks.iter().enumerate() {
            if !channels.contains(&track.channel) {
                channels.push(track.channel);
            }
            for m in &track.messages {
                let cue = match m.message {
                    MidiMessageKind::ProgramChange { .. } | MidiMessageKind::ChannelVolume { .. } => {
                        setup.extend(m.message.to_bytes(track.channel));
                        continue;
                    }
                    MidiMessageKind::Marker { measure } => Cue::Measure(measure),
                    // One end cue for the whole sequence.
                    MidiMessageKind::EndOfTrack if ti == 0 => Cue::End,
                    MidiMessageKind::EndOfTrack => continue,
                    _ => match m.message.to_bytes(track.channel) {
                        Some(bytes) => Cue::Send(bytes),
                        None => continue,
                    },
                };
                if m.tick >= start_tick {
                    cues.push(Scheduled {
                        tick: m.tick,
                        order: m.message.order(),
                        cue,
                    });
                }
            }
        }
        cues.sort_by_key(|c| (c.tick, c.order));

        let ticks_per_beat = sequence.ticks_per_beat.max(1) as f64;
        Self {
            setup,
            cues,
            channels,
            start_tick,
            micros_per_tick: sequence.micros_per_beat as f64 / ticks_per_beat,
        }
    }

    fn offset_of(&self, tick: u64) -> Duration {
        let ticks = tick.saturating_sub(self.start_tick) as f64;
        Duration::from_micros((ticks * self.micros_per_tick).round() as u64)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Player
// ═══════════════════════════════════════════════════════════════════════

struct Session {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct MidiPlayer {
    provider: Box<dyn DeviceProvider>,
    config: Config,
    session: Option<Session>,
    events_tx: Sender<PlayerEvent>,
    events_rx: Receiver<PlayerEvent>,
}

impl MidiPlayer {
    pub fn new(provider: Box<dyn DeviceProvider>, config: Config) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            provider,
            config,
            session: None,
            events_tx,
            events_rx,
        }
    }

    /// Receiver for progress notifications. Clones share one queue.
    pub fn events(&self) -> Receiver<PlayerEvent> {
        self.events_rx.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }

    /// Start playing `sequence` from `start_tick`, replacing any running
    /// session. On error the player stays idle.
    pub fn play(&mut self, sequence: &Sequence, start_tick: u64) -> Result<(), PlaybackError> {
        self.stop();
        let device = self.provider.open()?;
        let schedule = Schedule::new(sequence, start_tick);
        let events = self.events_tx.clone();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);

        let handle = thread::Builder::new()
            .name("cmme-playback".into())
            .spawn(move || run_session(device, schedule, stop_rx, events))
            .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?;

        log::info!("playback started at tick {start_tick}");
        self.session = Some(Session { stop_tx, handle });
        Ok(())
    }

    /// Start playing from a 0-based global measure index.
    pub fn play_from_measure(
        &mut self,
        score: &RenderedScore,
        sequence: &Sequence,
        measure: usize,
    ) -> Result<(), PlaybackError> {
        let tick = start_tick_for_measure(score, &self.config, measure)?;
        self.play(sequence, tick)
    }

    /// Stop the running session and wait for it to release the device.
    /// Does nothing when idle.
    pub fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        // A finished session has dropped its receiver; that's fine.
        let _ = session.stop_tx.try_send(());
        if session.handle.join().is_err() {
            log::warn!("playback thread panicked");
        }
        log::info!("playback stopped");
    }
}

impl Drop for MidiPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worker loop. The device is dropped when this returns.
fn run_session(
    mut device: Box<dyn MidiDevice>,
    schedule: Schedule,
    stop_rx: Receiver<()>,
    events: Sender<PlayerEvent>,
) {
    let outcome = play_schedule(device.as_mut(), &schedule, &stop_rx, &events);
    for &channel in &schedule.channels {
        let _ = device.send(&[0xB0 | (channel & 0x0F), CC_ALL_NOTES_OFF, 0]);
    }
    drop(device);

    match outcome {
        Ok(true) => {
            let _ = events.send(PlayerEvent::Finished);
        }
        Ok(false) => log::debug!("playback session cancelled"),
        Err(e) => {
            log::warn!("playback aborted: {e}");
            let _ = events.send(PlayerEvent::Failed(e));
        }
    }
}

/// Returns `Ok(true)` when the schedule ran to its end, `Ok(false)` when
/// stopped early.
fn play_schedule(
    device: &mut dyn MidiDevice,
    schedule: &Schedule,
    stop_rx: &Receiver<()>,
    events: &Sender<PlayerEvent>,
) -> Result<bool, PlaybackError> {
    for bytes in &schedule.setup {
        device.send(bytes)?;
    }

    let started = Instant::now();
    for cue in &schedule.cues {
        let due = started + schedule.offset_of(cue.tick);
        let wait = due.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            match stop_rx.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return Ok(false),
            }
        } else if stop_rx.try_recv().is_ok() {
            return Ok(false);
        }

        match &cue.cue {
            Cue::Send(bytes) => device.send(bytes)?,
            Cue::Measure(m) => {
                let _ = events.send(PlayerEvent::MeasureReached(*m));
            }
            Cue::End => return Ok(true),
        }
    }
    Ok(true)
}

// ═══════════════════════════════════════════════════════════════════════
// midir back-end
// ═══════════════════════════════════════════════════════════════════════

#[cfg(feature = "device")]
pub use self::device::MidirProvider;

#[cfg(feature = "device")]
mod device {
    use midir::{MidiOutput, MidiOutputConnection};

    use super::{DeviceProvider, MidiDevice};
    use crate::error::PlaybackError;

    const CLIENT_NAME: &str = "cmme-score";

    /// Opens the first output port, or the first whose name contains
    /// `port_filter`.
    #[derive(Debug, Clone, Default)]
    pub struct MidirProvider {
        pub port_filter: Option<String>,
    }

    impl DeviceProvider for MidirProvider {
        fn open(&self) -> Result<Box<dyn MidiDevice>, PlaybackError> {
            let output = MidiOutput::new(CLIENT_NAME)
                .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?;
            let ports = output.ports();
            let port = match &self.port_filter {
                Some(filter) => ports
                    .iter()
                    .find(|p| output.port_name(p).is_ok_and(|n| n.contains(filter.as_str()))),
                None => ports.first(),
            }
            .cloned()
            .ok_or(PlaybackError::NoDevice)?;

            if let Ok(name) = output.port_name(&port) {
                log::info!("opening MIDI output {name}");
            }
            let connection = output
                .connect(&port, CLIENT_NAME)
                .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?;
            Ok(Box::new(MidirDevice(connection)))
        }
    }

    struct MidirDevice(MidiOutputConnection);

    impl MidiDevice for MidirDevice {
        fn send(&mut self, message: &[u8]) -> Result<(), PlaybackError> {
            self.0
                .send(message)
                .map_err(|e| PlaybackError::Send(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{MidiTrack, TimedMessage};
    use crate::proportion::Proportion;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct Probe {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        drops: Arc<AtomicUsize>,
    }

    struct MockDevice(Probe);

    impl MidiDevice for MockDevice {
        fn send(&mut self, message: &[u8]) -> Result<(), PlaybackError> {
            self.0.sent.lock().unwrap().push(message.to_vec());
            Ok(())
        }
    }

    impl Drop for MockDevice {
        fn drop(&mut self) {
            self.0.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct MockProvider(Probe);

    impl DeviceProvider for MockProvider {
        fn open(&self) -> Result<Box<dyn MidiDevice>, PlaybackError> {
            Ok(Box::new(MockDevice(self.0.clone())))
        }
    }

    struct NoDevices;

    impl DeviceProvider for NoDevices {
        fn open(&self) -> Result<Box<dyn MidiDevice>, PlaybackError> {
            Err(PlaybackError::NoDevice)
        }
    }

    fn msg(tick: u64, message: MidiMessageKind) -> TimedMessage {
        TimedMessage {
            time: Proportion::ZERO,
            tick,
            message,
        }
    }

    /// Two measures of one note each, `tick_gap` ticks apart.
    fn two_measures(tick_gap: u64, micros_per_beat: u32) -> Sequence {
        Sequence {
            ticks_per_beat: 96,
            micros_per_beat,
            length_ticks: tick_gap * 2,
            tracks: vec![MidiTrack {
                voice: 0,
                name: "Cantus".into(),
                channel: 0,
                messages: vec![
                    msg(0, MidiMessageKind::ProgramChange { program: 52 }),
                    msg(0, MidiMessageKind::Marker { measure: 1 }),
                    msg(0, MidiMessageKind::NoteOn { key: 60, velocity: 96 }),
                    msg(tick_gap, MidiMessageKind::NoteOff { key: 60 }),
                    msg(tick_gap, MidiMessageKind::Marker { measure: 2 }),
                    msg(tick_gap, MidiMessageKind::NoteOn { key: 62, velocity: 96 }),
                    msg(tick_gap * 2, MidiMessageKind::NoteOff { key: 62 }),
                    msg(tick_gap * 2, MidiMessageKind::EndOfTrack),
                ],
            }],
        }
    }

    #[test]
    fn plays_to_the_end_and_releases_device() {
        let probe = Probe::default();
        let mut player = MidiPlayer::new(Box::new(MockProvider(probe.clone())), Config::default());
        let events = player.events();
        player.play(&two_measures(96, 1_000), 0).unwrap();

        let mut seen = Vec::new();
        while let Ok(ev) = events.recv_timeout(Duration::from_secs(5)) {
            let done = ev == PlayerEvent::Finished;
            seen.push(ev);
            if done {
                break;
            }
        }
        assert_eq!(
            seen,
            vec![
                PlayerEvent::MeasureReached(1),
                PlayerEvent::MeasureReached(2),
                PlayerEvent::Finished
            ]
        );
        player.stop();
        assert_eq!(probe.drops.load(Ordering::SeqCst), 1);

        let sent = probe.sent.lock().unwrap();
        assert_eq!(sent[0], vec![0xC0, 52]);
        assert!(sent.contains(&vec![0x90, 62, 96]));
        assert_eq!(sent.last().unwrap(), &vec![0xB0, CC_ALL_NOTES_OFF, 0]);
    }

    #[test]
    fn stop_twice_releases_once() {
        let probe = Probe::default();
        let mut player = MidiPlayer::new(Box::new(MockProvider(probe.clone())), Config::default());
        // Slow enough that the session is still running when stopped.
        player.play(&two_measures(96 * 100, 1_000_000), 0).unwrap();
        assert!(player.is_playing());
        player.stop();
        player.stop();
        assert!(!player.is_playing());
        assert_eq!(probe.drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_without_session_is_noop() {
        let mut player = MidiPlayer::new(Box::new(NoDevices), Config::default());
        player.stop();
        assert!(!player.is_playing());
    }

    #[test]
    fn missing_device_leaves_player_idle() {
        let mut player = MidiPlayer::new(Box::new(NoDevices), Config::default());
        let err = player.play(&two_measures(96, 1_000), 0).unwrap_err();
        assert_eq!(err, PlaybackError::NoDevice);
        assert!(!player.is_playing());
        assert!(player.events().try_recv().is_err());
    }

    #[test]
    fn schedule_skips_messages_before_start() {
        let schedule = Schedule::new(&two_measures(96, 1_000), 96);
        assert_eq!(schedule.setup, vec![vec![0xC0, 52]]);
        let cues: Vec<_> = schedule.cues.iter().map(|c| c.cue.clone()).collect();
        assert_eq!(
            cues,
            vec![
                Cue::Send(vec![0x80, 60, 0]),
                Cue::Measure(2),
                Cue::Send(vec![0x90, 62, 96]),
                Cue::Send(vec![0x80, 62, 0]),
                Cue::End,
            ]
        );
        assert_eq!(schedule.offset_of(96), Duration::ZERO);
    }
}
