// Sequencer Player - Transport, editing and I/O facade over the shared sequence
// Owns the scheduler thread; every structural edit parks the engine first

use super::clock::Clock;
use super::edit::Clipboard;
use super::engine::Engine;
use super::recorder::RecordMode;
use super::scheduler::{Scheduler, SchedulerTiming};
use super::sequence::{Sequence, SequenceSummary, SharedSequence, lock_sequence};
use super::transport::{PlaybackState, TransportState};
use crate::config::SequencerConfig;
use crate::history::{History, HistoryError};
use crate::messaging::channels::{
    EngineConsumer, EngineProducer, InputConsumer, NotificationConsumer, NotificationProducer,
    create_engine_channel, create_notification_channel,
};
use crate::messaging::command::EngineCommand;
use crate::messaging::notification::Notification;
use crate::midi::file::{self, MidiFileError};
use crate::midi::sink::SoundSink;
use ringbuf::traits::{Consumer, Producer};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const ENGINE_QUEUE_CAPACITY: usize = 64;
const NOTIFICATION_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("Invalid track: {0}")]
    InvalidTrack(usize),

    #[error("Invalid tempo: {0}")]
    InvalidTempo(f64),

    #[error("Invalid time signature: {0}/{1}")]
    InvalidTimeSignature(u8, u8),

    #[error("Invalid quantize resolution: {0}")]
    InvalidResolution(i64),

    #[error("Invalid range: {0} - {1}")]
    InvalidRange(i64, i64),

    #[error("Clipboard is empty")]
    EmptyClipboard,

    #[error("Scheduler already started")]
    AlreadyStarted,

    #[error("Failed to spawn scheduler thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error(transparent)]
    File(#[from] MidiFileError),

    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Player settings, usually derived from [`SequencerConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerOptions {
    pub timing: SchedulerTiming,
    /// Pause after a panic, before a relocation
    pub relocate_delay: Duration,
    /// Upper bound on the wait for the engine to park
    pub park_timeout: Duration,
    pub click_recording: bool,
    pub click_playing: bool,
    pub record_mode: RecordMode,
    pub quantize_on_record: bool,
    pub history_size: usize,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self::from(&SequencerConfig::default())
    }
}

impl From<&SequencerConfig> for PlayerOptions {
    fn from(config: &SequencerConfig) -> Self {
        Self {
            timing: config.scheduler_timing(),
            relocate_delay: config.relocate_delay(),
            park_timeout: Duration::from_millis(500),
            click_recording: config.click_recording,
            click_playing: config.click_playing,
            record_mode: config.record_mode,
            quantize_on_record: config.quantize_on_record,
            history_size: config.history_size,
        }
    }
}

// Shared handles used to park the engine around an edit
struct Control {
    sequence: SharedSequence,
    state: Arc<PlaybackState>,
    sink: Arc<dyn SoundSink>,
    relocate_delay: Duration,
    park_timeout: Duration,
    threaded: bool,
}

impl Control {
    /// Wait (bounded) until the scheduler reports it is parked
    fn wait_parked(&self) {
        if !self.threaded {
            return;
        }
        let deadline = Instant::now() + self.park_timeout;
        while !self.state.is_parked() {
            if Instant::now() >= deadline {
                log::warn!("Scheduler did not park in time");
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Stop the engine, run `f` on the sequence, then resume where it was
    fn with_paused<R>(&self, f: impl FnOnce(&mut Sequence) -> R) -> R {
        let was_playing = self.state.is_playing();
        let was_clicking = self.state.is_clicking();
        let active = was_playing || was_clicking;

        if active {
            self.state.set_playing(false);
            self.state.set_clicking(false);
            self.wait_parked();
            self.sink.panic(None);
            if !self.relocate_delay.is_zero() {
                thread::sleep(self.relocate_delay);
            }
        }

        let result = {
            let mut seq = lock_sequence(&self.sequence);
            let result = f(&mut seq);
            self.state.set_current_tick(seq.current_tick());
            result
        };

        if active {
            self.state.set_clicking(was_clicking);
            self.state.request_start();
            self.state.set_playing(was_playing);
        }
        result
    }
}

/// Front end of the sequencer
///
/// Transport requests are flag flips on [`PlaybackState`]; edits lock the
/// sequence after parking the engine; tempo changes are forwarded to the
/// engine through its command ring.
pub struct Player {
    control: Control,
    commands: EngineProducer,
    notifications: NotificationConsumer,
    engine_parts: Option<(EngineConsumer, NotificationProducer)>,
    scheduler: Option<Scheduler>,
    clipboard: Clipboard,
    history: History,
    options: PlayerOptions,
    // Clicking was switched on by play/record rather than by the user
    auto_click: bool,
}

impl Player {
    pub fn new(sequence: Sequence, sink: Arc<dyn SoundSink>, options: PlayerOptions) -> Self {
        let (commands, command_rx) = create_engine_channel(ENGINE_QUEUE_CAPACITY);
        let (notification_tx, notifications) =
            create_notification_channel(NOTIFICATION_QUEUE_CAPACITY);
        let state = PlaybackState::new();
        state.set_current_tick(sequence.current_tick());

        Self {
            control: Control {
                sequence: Arc::new(Mutex::new(sequence)),
                state,
                sink,
                relocate_delay: options.relocate_delay,
                park_timeout: options.park_timeout,
                threaded: false,
            },
            commands,
            notifications,
            engine_parts: Some((command_rx, notification_tx)),
            scheduler: None,
            clipboard: Clipboard::new(),
            history: History::with_capacity(options.history_size),
            options,
            auto_click: false,
        }
    }

    /// Build the engine for this player; only one engine can exist
    pub fn take_engine<C: Clock>(&mut self, clock: C) -> Option<Engine<C>> {
        let (commands, notifications) = self.engine_parts.take()?;
        let engine = Engine::new(
            Arc::clone(&self.control.sequence),
            Arc::clone(&self.control.state),
            Arc::clone(&self.control.sink),
            clock,
            commands,
        )
        .with_notifications(notifications);
        Some(engine)
    }

    /// Start the scheduler thread, optionally fed by a MIDI input ring
    pub fn start<C>(&mut self, clock: C, input: Option<InputConsumer>) -> Result<(), PlayerError>
    where
        C: Clock + 'static,
    {
        let mut engine = self.take_engine(clock).ok_or(PlayerError::AlreadyStarted)?;
        if let Some(input) = input {
            engine = engine.with_input(input);
        }
        let scheduler = Scheduler::spawn(engine, self.options.timing).map_err(PlayerError::Spawn)?;
        self.scheduler = Some(scheduler);
        self.control.threaded = true;
        log::info!("Sequencer started");
        Ok(())
    }

    /// Stop playback and the scheduler thread
    pub fn shutdown(&mut self) {
        if self.state().is_playing() {
            self.pause();
        }
        self.control.state.set_clicking(false);
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop();
        }
        self.control.threaded = false;
        self.control.sink.panic(None);
    }

    // ---- Accessors ----

    pub fn sequence(&self) -> SharedSequence {
        Arc::clone(&self.control.sequence)
    }

    /// Read the sequence under its lock
    pub fn with_sequence<R>(&self, f: impl FnOnce(&Sequence) -> R) -> R {
        let seq = lock_sequence(&self.control.sequence);
        f(&seq)
    }

    pub fn playback(&self) -> &Arc<PlaybackState> {
        &self.control.state
    }

    pub fn sink(&self) -> &Arc<dyn SoundSink> {
        &self.control.sink
    }

    pub fn state(&self) -> TransportState {
        self.control.state.state()
    }

    pub fn position(&self) -> i64 {
        self.control.state.current_tick()
    }

    pub fn is_clicking(&self) -> bool {
        self.control.state.is_clicking()
    }

    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Position as "bar:beat:tick" plus the elapsed time
    pub fn position_display(&self) -> String {
        let tick = self.position();
        self.with_sequence(|seq| {
            format!(
                "{} {}",
                seq.base().tick_to_bar(tick),
                seq.base().format_time(tick)
            )
        })
    }

    pub fn summary(&self) -> SequenceSummary {
        self.with_sequence(Sequence::summary)
    }

    pub fn properties(&self) -> String {
        self.with_sequence(Sequence::get_properties)
    }

    /// Drain pending notifications from the scheduler
    pub fn poll_notifications(&mut self) -> Vec<Notification> {
        let mut lst = Vec::new();
        while let Some(notification) = self.notifications.try_pop() {
            lst.push(notification);
        }
        lst
    }

    // ---- Transport ----

    pub fn play(&mut self) {
        let state = &self.control.state;
        if state.is_playing() {
            return;
        }
        {
            let mut seq = lock_sequence(&self.control.sequence);
            if seq.length() > 0 && seq.current_tick() >= seq.length() && !seq.is_looping() {
                seq.set_position(0);
                state.set_current_tick(0);
            }
        }
        if self.options.click_playing && !state.is_clicking() {
            state.set_clicking(true);
            self.auto_click = true;
        }
        state.set_paused(false);
        state.request_start();
        state.set_playing(true);
        log::debug!("Play from tick {}", state.current_tick());
    }

    pub fn pause(&mut self) {
        if self.control.state.is_recording() {
            self.stop_record();
        }
        let state = Arc::clone(&self.control.state);
        state.set_playing(false);
        if self.auto_click {
            state.set_clicking(false);
            self.auto_click = false;
        }
        if !state.is_active() {
            self.control.wait_parked();
        }
        self.control.sink.panic(None);

        let position = state.current_tick();
        {
            let mut seq = lock_sequence(&self.control.sequence);
            seq.check_rec_data();
            let position = seq.set_position(position);
            seq.metronome_mut().seek(position);
            state.set_current_tick(position);
        }
        if state.is_clicking() {
            state.request_start();
        }
        state.set_paused(true);
        log::debug!("Paused at tick {}", state.current_tick());
    }

    pub fn toggle_play(&mut self) {
        if self.control.state.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Pause and return to the start
    pub fn stop(&mut self) {
        self.pause();
        self.goto(0);
        self.control.state.set_paused(false);
    }

    /// Move to `tick` (clamped); playback continues from there
    pub fn goto(&mut self, tick: i64) -> i64 {
        self.control.with_paused(|seq| seq.set_position(tick))
    }

    pub fn goto_start(&mut self) -> i64 {
        self.goto(0)
    }

    pub fn goto_end(&mut self) -> i64 {
        let end = self.with_sequence(Sequence::length);
        self.goto(end)
    }

    /// Go to a 1-based bar
    pub fn goto_bar(&mut self, bar: i64) -> i64 {
        let tick = self.with_sequence(|seq| seq.base().bar_to_tick(bar - 1));
        self.goto(tick)
    }

    /// Go to a 1-based beat counted from the start of the song
    pub fn goto_beat(&mut self, beat: i64) -> i64 {
        let tick = self.with_sequence(|seq| seq.base().beat_to_tick((beat - 1).max(0)));
        self.goto(tick)
    }

    /// Go to a wall-clock offset at the current tempo
    pub fn goto_seconds(&mut self, sec: f64) -> i64 {
        let tick = self.with_sequence(|seq| seq.base().sec_to_tick(sec.max(0.0)));
        self.goto(tick)
    }

    /// One bar back (to the start of the current bar when inside it)
    pub fn rewind(&mut self) -> i64 {
        let position = self.position();
        let tick = self.with_sequence(|seq| {
            let bar_ticks = seq.base().bar_ticks().max(1);
            let bar = position / bar_ticks;
            if position % bar_ticks == 0 {
                (bar - 1).max(0) * bar_ticks
            } else {
                bar * bar_ticks
            }
        });
        self.goto(tick)
    }

    /// One bar forward
    pub fn forward(&mut self) -> i64 {
        let position = self.position();
        let tick = self.with_sequence(|seq| {
            let bar_ticks = seq.base().bar_ticks().max(1);
            (position / bar_ticks + 1) * bar_ticks
        });
        self.goto(tick)
    }

    pub fn goto_left_locator(&mut self) -> i64 {
        let tick = self.with_sequence(Sequence::left_locator);
        self.goto(tick)
    }

    pub fn goto_right_locator(&mut self) -> i64 {
        let tick = self.with_sequence(Sequence::right_locator);
        self.goto(tick)
    }

    pub fn goto_start_loop(&mut self) -> i64 {
        let tick = self.with_sequence(Sequence::start_loop);
        self.goto(tick)
    }

    pub fn goto_end_loop(&mut self) -> i64 {
        let tick = self.with_sequence(Sequence::end_loop);
        self.goto(tick)
    }

    /// Silence every channel now
    pub fn panic(&mut self) {
        if self.control.threaded && self.commands.try_push(EngineCommand::Panic).is_ok() {
            return;
        }
        self.control.sink.panic(None);
    }

    // ---- Tempo, meter, click, loop ----

    /// Change tempo while playing; the engine re-anchors at the current tick
    pub fn set_bpm(&mut self, bpm: f64) -> Result<(), PlayerError> {
        let mut seq = lock_sequence(&self.control.sequence);
        if !seq.set_bpm(bpm) {
            return Err(PlayerError::InvalidTempo(bpm));
        }
        let sec_per_tick = seq.base().sec_per_tick();
        // Pushed under the lock so the engine never sees the new tempo
        // without its re-anchor command
        if self
            .commands
            .try_push(EngineCommand::SetTempo { sec_per_tick })
            .is_err()
        {
            log::debug!("Engine queue full, tempo picked up on next start");
        }
        log::info!("Tempo set to {:.2} BPM", bpm);
        Ok(())
    }

    pub fn set_time_signature(&mut self, numerator: u8, denominator: u8) -> Result<(), PlayerError> {
        let ok = self
            .control
            .with_paused(|seq| seq.set_time_signature(numerator, denominator));
        if ok {
            Ok(())
        } else {
            Err(PlayerError::InvalidTimeSignature(numerator, denominator))
        }
    }

    /// Toggle the click; returns the new state
    pub fn toggle_click(&mut self) -> bool {
        let state = &self.control.state;
        let clicking = !state.is_clicking();
        self.auto_click = false;
        if clicking && !state.is_playing() {
            state.request_start();
        }
        state.set_clicking(clicking);
        lock_sequence(&self.control.sequence)
            .metronome_mut()
            .set_active(clicking);
        clicking
    }

    pub fn toggle_loop(&mut self) -> bool {
        lock_sequence(&self.control.sequence).toggle_loop()
    }

    pub fn set_loop_region(&mut self, start: i64, end: i64) -> Result<(), PlayerError> {
        if lock_sequence(&self.control.sequence).set_loop_region(start, end) {
            Ok(())
        } else {
            Err(PlayerError::InvalidRange(start, end))
        }
    }

    pub fn set_start_loop(&mut self, tick: i64) -> i64 {
        lock_sequence(&self.control.sequence).set_start_loop(tick)
    }

    pub fn set_end_loop(&mut self, tick: i64) -> i64 {
        lock_sequence(&self.control.sequence).set_end_loop(tick)
    }

    pub fn set_left_locator(&mut self, tick: i64) -> i64 {
        lock_sequence(&self.control.sequence).set_left_locator(tick)
    }

    pub fn set_right_locator(&mut self, tick: i64) -> i64 {
        lock_sequence(&self.control.sequence).set_right_locator(tick)
    }

    // ---- Recording ----

    /// Start recording into the armed (or current) track; playback starts
    pub fn record(&mut self) {
        if self.control.state.is_recording() {
            return;
        }
        {
            let mut seq = lock_sequence(&self.control.sequence);
            seq.set_quantizing(self.options.quantize_on_record);
            let recorder = seq.recorder_mut();
            recorder.set_mode(self.options.record_mode);
            recorder.start();
        }
        let state = &self.control.state;
        if self.options.click_recording && !state.is_clicking() {
            state.set_clicking(true);
            self.auto_click = true;
        }
        state.set_recording(true);
        self.play();
        log::info!("Recording");
    }

    /// Stop recording and merge the take; playback continues
    /// Returns true when a take was merged.
    pub fn stop_record(&mut self) -> bool {
        let state = Arc::clone(&self.control.state);
        if !state.is_recording() {
            return false;
        }
        state.set_recording(false);
        if self.auto_click && !self.options.click_playing {
            state.set_clicking(false);
            self.auto_click = false;
        }

        let history = &mut self.history;
        let merged = self.control.with_paused(|seq| {
            let position = seq.current_tick();
            let Some(take) = seq.recorder_mut().finish(position) else {
                return false;
            };
            history.record("record", seq);
            let merged = seq.arrange_rec_data(take);
            seq.check_rec_data();
            seq.set_position(position);
            merged
        });
        log::info!("Recording stopped, take {}", if merged { "merged" } else { "empty" });
        merged
    }

    pub fn toggle_record(&mut self) -> bool {
        if self.control.state.is_recording() {
            self.stop_record();
            false
        } else {
            self.record();
            true
        }
    }

    // ---- Track flags ----

    fn check_track(&self, tracknum: usize) -> Result<(), PlayerError> {
        if tracknum < self.with_sequence(Sequence::track_count) {
            Ok(())
        } else {
            Err(PlayerError::InvalidTrack(tracknum))
        }
    }

    /// Toggle mute; a muted track's channel is silenced right away
    pub fn toggle_mute(&mut self, tracknum: usize) -> Result<bool, PlayerError> {
        let mut seq = lock_sequence(&self.control.sequence);
        let muted = seq
            .toggle_mute(tracknum)
            .ok_or(PlayerError::InvalidTrack(tracknum))?;
        if muted {
            if let Some(track) = seq.track(tracknum) {
                self.control.sink.panic(Some(track.channel));
            }
        }
        Ok(muted)
    }

    pub fn toggle_solo(&mut self, tracknum: usize) -> Result<bool, PlayerError> {
        let mut seq = lock_sequence(&self.control.sequence);
        let soloed = seq
            .toggle_solo(tracknum)
            .ok_or(PlayerError::InvalidTrack(tracknum))?;
        if soloed {
            self.control.sink.panic(None);
        }
        Ok(soloed)
    }

    pub fn arm(&mut self, tracknum: usize) -> Result<bool, PlayerError> {
        lock_sequence(&self.control.sequence)
            .arm(tracknum)
            .ok_or(PlayerError::InvalidTrack(tracknum))
    }

    pub fn select_track(&mut self, tracknum: usize) -> Result<(), PlayerError> {
        if lock_sequence(&self.control.sequence).set_current_track(tracknum) {
            Ok(())
        } else {
            Err(PlayerError::InvalidTrack(tracknum))
        }
    }

    pub fn set_track_channel(&mut self, tracknum: usize, channel: u8) -> Result<(), PlayerError> {
        self.check_track(tracknum)?;
        self.edit("channel", |seq| seq.change_track_channel(tracknum, channel));
        Ok(())
    }

    pub fn set_track_program(&mut self, tracknum: usize, program: u8) -> Result<(), PlayerError> {
        self.check_track(tracknum)?;
        self.edit("program", |seq| seq.change_track_program(tracknum, program));
        let channel = self.with_sequence(|seq| seq.track(tracknum).map(|t| t.channel));
        if let Some(channel) = channel {
            self.control.sink.program_change(channel, program & 0x7F);
        }
        Ok(())
    }

    // ---- Editing ----

    /// Park the engine, snapshot for undo, then edit
    fn edit<R>(&mut self, description: &str, f: impl FnOnce(&mut Sequence) -> R) -> R {
        let history = &mut self.history;
        self.control.with_paused(|seq| {
            history.record(description, seq);
            let position = seq.current_tick();
            let result = f(seq);
            seq.check_rec_data();
            seq.set_position(position);
            result
        })
    }

    pub fn set_quantize_resolution(&mut self, resolution: i64) -> Result<i64, PlayerError> {
        let mut seq = lock_sequence(&self.control.sequence);
        if seq.set_quantize_resolution(resolution) {
            Ok(seq.quantize_step())
        } else {
            Err(PlayerError::InvalidResolution(resolution))
        }
    }

    /// Quantize a track; returns the number of moved events
    pub fn quantize_track(&mut self, tracknum: usize) -> Result<usize, PlayerError> {
        self.check_track(tracknum)?;
        self.edit("quantize", |seq| seq.quantize_track(tracknum))
            .ok_or(PlayerError::InvalidTrack(tracknum))
    }

    /// Erase a track's events; None erases everything
    pub fn erase_track(
        &mut self,
        tracknum: usize,
        range: Option<(i64, i64)>,
    ) -> Result<usize, PlayerError> {
        self.check_track(tracknum)?;
        if let Some((start, end)) = range {
            if start < 0 || end < start {
                return Err(PlayerError::InvalidRange(start, end));
            }
        }
        self.edit("erase", |seq| seq.erase_track(tracknum, range))
            .ok_or(PlayerError::InvalidTrack(tracknum))
    }

    pub fn delete_track(&mut self, tracknum: usize) -> Result<(), PlayerError> {
        self.check_track(tracknum)?;
        self.edit("delete track", |seq| seq.delete_track(tracknum))
            .map(|_| ())
            .ok_or(PlayerError::InvalidTrack(tracknum))
    }

    pub fn copy(&mut self, tracknum: usize, start: i64, end: i64) -> Result<usize, PlayerError> {
        if end < start {
            return Err(PlayerError::InvalidRange(start, end));
        }
        let clipboard = &mut self.clipboard;
        let seq = lock_sequence(&self.control.sequence);
        let track = seq.track(tracknum).ok_or(PlayerError::InvalidTrack(tracknum))?;
        Ok(clipboard.copy(track, start, end))
    }

    pub fn cut(&mut self, tracknum: usize, start: i64, end: i64) -> Result<usize, PlayerError> {
        if end < start {
            return Err(PlayerError::InvalidRange(start, end));
        }
        self.check_track(tracknum)?;
        let history = &mut self.history;
        let clipboard = &mut self.clipboard;
        let count = self.control.with_paused(|seq| {
            history.record("cut", seq);
            let position = seq.current_tick();
            let count = seq
                .track_mut(tracknum)
                .map(|track| clipboard.cut(track, start, end))
                .unwrap_or(0);
            seq.check_rec_data();
            seq.set_position(position);
            count
        });
        Ok(count)
    }

    /// Paste the clipboard at `at`, merged with or replacing the range
    pub fn paste(&mut self, tracknum: usize, at: i64, merge: bool) -> Result<(), PlayerError> {
        if self.clipboard.is_empty() {
            return Err(PlayerError::EmptyClipboard);
        }
        self.check_track(tracknum)?;
        let history = &mut self.history;
        let clipboard = &self.clipboard;
        self.control.with_paused(|seq| {
            history.record("paste", seq);
            let position = seq.current_tick();
            if let Some(track) = seq.track_mut(tracknum) {
                if merge {
                    clipboard.paste_merge(track, at);
                } else {
                    clipboard.paste_replace(track, at);
                }
            }
            seq.adjust_tracks();
            seq.check_rec_data();
            seq.set_position(position);
        });
        Ok(())
    }

    pub fn undo(&mut self) -> Result<String, PlayerError> {
        let history = &mut self.history;
        let description = self.control.with_paused(|seq| {
            let position = seq.current_tick();
            let description = history.undo(seq)?;
            seq.gen_timeline();
            seq.set_position(position);
            Ok::<_, HistoryError>(description)
        })?;
        log::info!("Undo {}", description);
        Ok(description)
    }

    pub fn redo(&mut self) -> Result<String, PlayerError> {
        let history = &mut self.history;
        let description = self.control.with_paused(|seq| {
            let position = seq.current_tick();
            let description = history.redo(seq)?;
            seq.gen_timeline();
            seq.set_position(position);
            Ok::<_, HistoryError>(description)
        })?;
        log::info!("Redo {}", description);
        Ok(description)
    }

    // ---- Files ----

    /// Replace the song with a MIDI file; history is cleared
    pub fn load_file(&mut self, path: &Path) -> Result<(), PlayerError> {
        let loaded = file::load_sequence(path)?;
        self.stop();
        self.control.with_paused(|seq| {
            let resolution = seq.quantize_resolution();
            *seq = loaded;
            seq.set_quantize_resolution(resolution);
        });
        self.history.clear();
        self.control.state.set_current_tick(0);
        self.control.sink.reset();
        Ok(())
    }

    pub fn save_file(&self, path: &Path) -> Result<(), PlayerError> {
        let seq = lock_sequence(&self.control.sequence);
        file::save_sequence(&seq, path)?;
        Ok(())
    }

    /// Replace the song with an empty one at the current tempo and meter
    pub fn new_sequence(&mut self, track_count: usize) {
        self.stop();
        self.control.with_paused(|seq| {
            let mut fresh = Sequence::from_base(seq.base().clone());
            fresh.set_quantize_resolution(seq.quantize_resolution());
            fresh.new_sequence(track_count);
            *seq = fresh;
        });
        self.history.clear();
        self.control.state.set_current_tick(0);
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.shutdown();
    }
}
