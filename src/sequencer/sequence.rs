// Sequence - Owns the time base, tracks, timeline, click and record buffer
// All editing goes through here; the player wraps it for thread safety

use super::edit;
use super::metronome::Metronome;
use super::quantize;
use super::recorder::{RecordMode, RecordTake, Recorder};
use super::timebase::{DEFAULT_PPQ, TimeBase};
use super::timeline::Timeline;
use super::track::Track;
use crate::midi::event::{DRUM_CHANNEL, Event, EventKind, MetaEvent};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Sequence shared between the control thread and the scheduler
pub type SharedSequence = Arc<Mutex<Sequence>>;

/// Lock a shared sequence, recovering from a poisoned lock
pub fn lock_sequence(seq: &SharedSequence) -> MutexGuard<'_, Sequence> {
    seq.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clamp `val` to `[min, max]`
pub fn limit_value(val: i64, min: i64, max: i64) -> i64 {
    val.max(min).min(max.max(min))
}

/// A note on with its paired note off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NoteInfo {
    pub tick: i64,
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
    /// Ticks until the note off, None when unpaired
    pub duration: Option<i64>,
}

/// Per-track line of [`SequenceSummary`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSummary {
    pub index: usize,
    pub name: String,
    pub channel: u8,
    pub program: u8,
    pub events: usize,
    pub notes: usize,
    pub length: i64,
    pub muted: bool,
    pub soloed: bool,
    pub armed: bool,
}

/// Serializable overview of a sequence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceSummary {
    pub ppq: u32,
    pub bpm: f64,
    pub tempo: u32,
    pub time_signature: String,
    pub length_ticks: i64,
    pub length_time: String,
    pub bars: i64,
    pub tracks: Vec<TrackSummary>,
}

/// Musical data and editing state of one song
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    base: TimeBase,
    tracks: Vec<Track>,
    timeline: Timeline,
    metronome: Metronome,
    recorder: Recorder,

    current_tick: i64,
    length: i64,
    left_loc: i64,
    right_loc: i64,
    start_loop: i64,
    end_loop: i64,
    looping: bool,

    quantize_resolution: i64,
    quantize_step: i64,
    quantizing: bool,

    current_track: usize,
    rec_waiting: bool,
    // Tracks edited since the last timeline rebuild
    dirty: bool,
}

impl Sequence {
    /// Empty sequence (no tracks) with the given resolution
    pub fn new(ppq: u32) -> Self {
        Self::from_base(TimeBase::new(ppq))
    }

    /// Empty sequence using an existing time base (tempo, meter, ppq)
    pub fn from_base(base: TimeBase) -> Self {
        let metronome = Metronome::new(&base);
        let mut seq = Self {
            base,
            tracks: Vec::new(),
            timeline: Timeline::new(),
            metronome,
            recorder: Recorder::new(),
            current_tick: 0,
            length: 0,
            left_loc: 0,
            right_loc: 0,
            start_loop: 0,
            end_loop: 0,
            looping: false,
            quantize_resolution: 16,
            quantize_step: 0,
            quantizing: true,
            current_track: 0,
            rec_waiting: false,
            dirty: false,
        };
        seq.init_sequencer();
        seq
    }

    /// Sequence with a conductor track and `track_count` channel tracks
    pub fn with_tracks(ppq: u32, bpm: f64, track_count: usize) -> Self {
        let mut seq = Self::new(ppq);
        seq.base.set_bpm(bpm);
        seq.new_sequence(track_count);
        seq
    }

    /// Locators and loop region back to their defaults, quantize grid
    /// recomputed for the current bar length
    pub fn init_sequencer(&mut self) {
        let bar = self.base.bar_ticks();
        self.left_loc = 0;
        self.right_loc = 0;
        self.start_loop = 0;
        self.end_loop = bar * 2;
        self.looping = true;
        self.refresh_quantize_step();
        self.quantizing = true;
    }

    /// Replace all data with an empty song: conductor track 0 (tempo,
    /// time signature) plus channel tracks, each two bars long
    pub fn new_sequence(&mut self, track_count: usize) {
        let bar = self.base.bar_ticks();
        let end = bar * 2;
        let sig = self.base.time_signature();

        let mut conductor = Track::new();
        conductor.name = "Tempo Track".to_string();
        conductor.add_evs([
            Event::meta(0, MetaEvent::TrackName(conductor.name.clone())),
            Event::tempo(0, self.base.tempo()),
            Event::meta(
                0,
                MetaEvent::TimeSignature {
                    numerator: sig.numerator,
                    denominator: sig.denominator,
                    clocks_per_click: 24,
                    notated_32nd: 8,
                },
            ),
            Event::end_of_track(end),
        ]);

        let mut tracks = vec![conductor];
        for idx in 0..track_count {
            let channel = (idx % 16) as u8;
            let mut track = Track::with_channel(channel);
            track.name = format!("Track {:02}", idx + 1);
            track.add_ev(Event::end_of_track(end));
            tracks.push(track);
        }

        self.load_tracks(tracks);
        self.current_track = if track_count > 0 { 1 } else { 0 };
        self.looping = true;
    }

    /// Install a freshly built track list: click regenerated, timeline
    /// rebuilt, ends equalized, position back to 0
    pub fn load_tracks(&mut self, mut tracks: Vec<Track>) {
        edit::adjust_tracks(&mut tracks);
        self.tracks = tracks;
        self.current_track = self.tracks.len().min(2).saturating_sub(1);
        self.recorder.clear();
        self.rec_waiting = false;
        self.init_click();
        self.init_sequencer();
        self.looping = false;
        self.gen_timeline();
        self.set_position(0);
    }

    // ---- Accessors ----

    pub fn base(&self) -> &TimeBase {
        &self.base
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Mutable track access; the timeline must be regenerated afterwards
    pub fn track_mut(&mut self, index: usize) -> Option<&mut Track> {
        let track = self.tracks.get_mut(index)?;
        self.dirty = true;
        Some(track)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn timeline_mut(&mut self) -> &mut Timeline {
        &mut self.timeline
    }

    pub fn metronome(&self) -> &Metronome {
        &self.metronome
    }

    pub fn metronome_mut(&mut self) -> &mut Metronome {
        &mut self.metronome
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut Recorder {
        &mut self.recorder
    }

    pub fn current_tick(&self) -> i64 {
        self.current_tick
    }

    /// Update the reported position without moving any cursor
    pub fn set_current_tick(&mut self, tick: i64) {
        self.current_tick = tick.max(0);
    }

    pub fn length(&self) -> i64 {
        self.length
    }

    pub fn left_locator(&self) -> i64 {
        self.left_loc
    }

    pub fn right_locator(&self) -> i64 {
        self.right_loc
    }

    pub fn start_loop(&self) -> i64 {
        self.start_loop
    }

    pub fn end_loop(&self) -> i64 {
        self.end_loop
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn quantize_resolution(&self) -> i64 {
        self.quantize_resolution
    }

    pub fn quantize_step(&self) -> i64 {
        self.quantize_step
    }

    pub fn is_quantizing(&self) -> bool {
        self.quantizing
    }

    pub fn set_quantizing(&mut self, quantizing: bool) {
        self.quantizing = quantizing;
    }

    pub fn current_track(&self) -> usize {
        self.current_track
    }

    pub fn set_current_track(&mut self, index: usize) -> bool {
        if index >= self.tracks.len() {
            return false;
        }
        self.current_track = index;
        true
    }

    pub fn is_rec_waiting(&self) -> bool {
        self.rec_waiting
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // ---- Timeline and position ----

    /// Rebuild the timeline from the current tracks and refresh the length
    pub fn gen_timeline(&mut self) {
        for track in self.tracks.iter_mut() {
            track.reset_cursor();
            track.gen_group_pos();
        }
        self.timeline.rebuild(&self.tracks);
        self.update_length();
        self.dirty = false;
    }

    /// Sequence length: the longest track
    pub fn update_length(&mut self) {
        self.length = edit::max_length(&self.tracks);
    }

    /// Move every cursor to `tick` (clamped to `[0, length]`)
    /// Returns the clamped position
    pub fn set_position(&mut self, tick: i64) -> i64 {
        let tick = limit_value(tick, 0, self.length);
        self.current_tick = tick;
        for track in self.tracks.iter_mut() {
            track.seek(tick);
        }
        self.timeline.seek(tick);
        tick
    }

    /// Re-seek all cursors at the current position
    pub fn update_tracks_position(&mut self) {
        self.set_position(self.current_tick);
    }

    /// Events due up to `curtick` on every track, tagged with the track index
    ///
    /// Each track's cursor drains from where it stands, so events are
    /// delivered in track order, then insertion order.
    pub fn get_playable_data(&mut self, curtick: i64) -> Vec<(usize, Event)> {
        let mut lst = Vec::new();
        for (tracknum, track) in self.tracks.iter_mut().enumerate() {
            lst.extend(
                track
                    .search_ev_group(curtick)
                    .into_iter()
                    .filter(Event::is_playable)
                    .map(|ev| (tracknum, ev)),
            );
        }
        lst
    }

    // ---- Tempo ----

    /// Change tempo: time base first, then the tempo event at tick 0
    pub fn set_bpm(&mut self, bpm: f64) -> bool {
        if !self.metronome.change_bpm(&mut self.base, bpm) {
            return false;
        }
        self.change_event_tempo(0, self.base.tempo());
        true
    }

    /// Update the first tempo event at or after `tick` on the conductor
    /// track, or insert one at tick 0 when there is none
    pub fn change_event_tempo(&mut self, tick: i64, tempo: u32) {
        if self.tracks.is_empty() {
            self.tracks.push(Track::new());
        }
        let conductor = &mut self.tracks[0];
        match conductor.search_ev(tick, Event::is_tempo) {
            Some(idx) => {
                if let Some(ev) = conductor.events_mut().get_mut(idx) {
                    ev.kind = EventKind::Meta(MetaEvent::Tempo(tempo));
                }
            }
            None => {
                conductor.insert_ev(0, Event::tempo(0, tempo));
                self.timeline.rebuild(&self.tracks);
                let pos = self.current_tick;
                self.timeline.seek(pos);
            }
        }
    }

    /// Regenerate the click pattern from the current time base
    pub fn init_click(&mut self) {
        self.metronome.generate_click(&self.base);
    }

    /// Change the time signature; the click is regenerated
    pub fn set_time_signature(&mut self, numerator: u8, denominator: u8) -> bool {
        if !self.base.set_time_signature(numerator, denominator) {
            return false;
        }
        self.init_click();
        self.refresh_quantize_step();
        true
    }

    // ---- Locators and loop ----

    pub fn set_left_locator(&mut self, tick: i64) -> i64 {
        self.left_loc = limit_value(tick, 0, self.length);
        self.left_loc
    }

    pub fn set_right_locator(&mut self, tick: i64) -> i64 {
        self.right_loc = limit_value(tick, 0, self.length);
        self.right_loc
    }

    pub fn set_start_loop(&mut self, tick: i64) -> i64 {
        self.start_loop = limit_value(tick, 0, self.length);
        self.start_loop
    }

    pub fn set_end_loop(&mut self, tick: i64) -> i64 {
        self.end_loop = limit_value(tick, 0, self.length);
        self.end_loop
    }

    /// Set both loop points without clamping to the length
    /// (an empty song may loop over bars it does not contain yet)
    pub fn set_loop_region(&mut self, start: i64, end: i64) -> bool {
        if start < 0 || end <= start {
            return false;
        }
        self.start_loop = start;
        self.end_loop = end;
        true
    }

    pub fn toggle_loop(&mut self) -> bool {
        self.looping = !self.looping;
        self.looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Loop start to jump to when `curpos` reached the loop end
    pub fn loop_manager(&self, curpos: i64) -> Option<i64> {
        if self.looping && self.end_loop > self.start_loop && curpos >= self.end_loop {
            Some(self.start_loop)
        } else {
            None
        }
    }

    // ---- Quantize ----

    /// Grid resolution (notes per bar); ignored when the step would be zero
    pub fn set_quantize_resolution(&mut self, resolution: i64) -> bool {
        match quantize::quantize_step(self.base.bar_ticks(), resolution) {
            Some(step) => {
                self.quantize_resolution = resolution;
                self.quantize_step = step;
                true
            }
            None => false,
        }
    }

    /// Recompute the step after the bar length changed, falling back to
    /// sixteenths when the resolution no longer fits the bar
    fn refresh_quantize_step(&mut self) {
        if !self.set_quantize_resolution(self.quantize_resolution) {
            self.set_quantize_resolution(16);
        }
    }

    /// Quantize a track and rebuild the timeline
    /// Returns the number of moved events, None for an invalid track
    pub fn quantize_track(&mut self, tracknum: usize) -> Option<usize> {
        let step = self.quantize_step;
        let track = self.tracks.get_mut(tracknum)?;
        let moved = quantize::quantize_track(track, step);
        edit::adjust_tracks(&mut self.tracks);
        self.gen_timeline();
        self.update_tracks_position();
        Some(moved)
    }

    // ---- Track flags ----

    /// Toggle mute; returns the new state
    pub fn toggle_mute(&mut self, tracknum: usize) -> Option<bool> {
        let track = self.tracks.get_mut(tracknum)?;
        track.muted = !track.muted;
        Some(track.muted)
    }

    /// Toggle solo; non-soloed tracks are muted by the system while at
    /// least one solo is active
    pub fn toggle_solo(&mut self, tracknum: usize) -> Option<bool> {
        let track = self.tracks.get_mut(tracknum)?;
        track.soloed = !track.soloed;
        let state = track.soloed;

        let any_solo = self.tracks.iter().any(|track| track.soloed);
        for track in self.tracks.iter_mut() {
            track.sys_muted = any_solo && !track.soloed;
        }
        Some(state)
    }

    /// Arm a track for recording; only one track is armed at a time
    /// Arming the armed track disarms it.
    pub fn arm(&mut self, tracknum: usize) -> Option<bool> {
        let was_armed = self.tracks.get(tracknum)?.armed;
        for (idx, track) in self.tracks.iter_mut().enumerate() {
            track.armed = idx == tracknum && !was_armed;
        }
        if !was_armed {
            self.current_track = tracknum;
        }
        Some(!was_armed)
    }

    pub fn armed_track(&self) -> Option<usize> {
        self.tracks.iter().position(|track| track.armed)
    }

    // ---- Structural edits ----

    /// Equalize end-of-track markers after an edit that changed a track's length
    pub fn adjust_tracks(&mut self) {
        edit::adjust_tracks(&mut self.tracks);
        self.dirty = true;
    }

    pub fn add_track(&mut self, track: Track) -> usize {
        self.tracks.push(track);
        edit::adjust_tracks(&mut self.tracks);
        self.gen_timeline();
        self.update_tracks_position();
        self.tracks.len() - 1
    }

    /// Remove a track; the timeline is rebuilt
    pub fn delete_track(&mut self, tracknum: usize) -> Option<Track> {
        if tracknum >= self.tracks.len() {
            return None;
        }
        let removed = self.tracks.remove(tracknum);
        if self.current_track >= self.tracks.len() {
            self.current_track = self.tracks.len().saturating_sub(1);
        }
        self.gen_timeline();
        self.update_tracks_position();
        Some(removed)
    }

    /// Erase events of a track, end-of-track kept
    /// `range` None erases everything, otherwise ticks `[start, end]`
    pub fn erase_track(&mut self, tracknum: usize, range: Option<(i64, i64)>) -> Option<usize> {
        let track = self.tracks.get_mut(tracknum)?;
        let (start, end) = range.unwrap_or((0, i64::MAX));
        let removed = edit::delete_events(track, start, end).len();
        self.gen_timeline();
        self.update_tracks_position();
        Some(removed)
    }

    /// Move a track (and its channel events) to another channel
    pub fn change_track_channel(&mut self, tracknum: usize, channel: u8) -> bool {
        let Some(track) = self.tracks.get_mut(tracknum) else {
            return false;
        };
        let channel = channel & 0x0F;
        track.channel = channel;
        for ev in track.events_mut().iter_mut().filter(|ev| ev.is_playable()) {
            ev.channel = channel;
        }
        true
    }

    /// Set a track's program: the first program change is updated, or one
    /// is inserted at tick 0
    pub fn change_track_program(&mut self, tracknum: usize, program: u8) -> bool {
        let Some(track) = self.tracks.get_mut(tracknum) else {
            return false;
        };
        let program = program & 0x7F;
        track.program = program;
        let channel = track.channel;
        let found = track
            .search_ev(0, |ev| matches!(ev.kind, EventKind::ProgramChange { .. }));
        match found {
            Some(idx) => {
                if let Some(ev) = track.events_mut().get_mut(idx) {
                    ev.kind = EventKind::ProgramChange { program };
                }
            }
            None => {
                // After tick-0 meta events, before the first note
                let idx = track
                    .events()
                    .iter()
                    .position(|ev| ev.tick > 0 || ev.is_playable())
                    .unwrap_or(track.len());
                track.insert_ev(idx, Event::program_change(0, channel, program));
                self.gen_timeline();
                self.update_tracks_position();
            }
        }
        true
    }

    // ---- Notes ----

    /// Index of the note off closing the note on at `index`
    pub fn get_noteoff(&self, tracknum: usize, index: usize) -> Option<usize> {
        let events = self.tracks.get(tracknum)?.events();
        let on = events.get(index).filter(|ev| ev.is_note_on())?;
        let note = on.note()?;
        events
            .iter()
            .enumerate()
            .skip(index + 1)
            .find(|(_, ev)| ev.is_note_off() && ev.channel == on.channel && ev.note() == Some(note))
            .map(|(idx, _)| idx)
    }

    /// Notes of a track with their durations
    pub fn get_notes(&self, tracknum: usize) -> Vec<NoteInfo> {
        let Some(track) = self.tracks.get(tracknum) else {
            return Vec::new();
        };
        let events = track.events();
        let mut paired = vec![false; events.len()];
        let mut notes = Vec::new();

        for (idx, ev) in events.iter().enumerate() {
            let EventKind::NoteOn { note, velocity } = ev.kind else {
                continue;
            };
            let off = events
                .iter()
                .enumerate()
                .skip(idx + 1)
                .find(|(off_idx, off)| {
                    !paired[*off_idx]
                        && off.is_note_off()
                        && off.channel == ev.channel
                        && off.note() == Some(note)
                })
                .map(|(off_idx, off)| (off_idx, off.tick));
            if let Some((off_idx, _)) = off {
                paired[off_idx] = true;
            }
            notes.push(NoteInfo {
                tick: ev.tick,
                channel: ev.channel,
                note,
                velocity,
                duration: off.map(|(_, tick)| tick - ev.tick),
            });
        }
        notes
    }

    // ---- Recording ----

    /// Merge a finished take into the armed (or current) track
    pub fn arrange_rec_data(&mut self, take: RecordTake) -> bool {
        if take.events.is_empty() {
            return false;
        }
        let tracknum = self.armed_track().unwrap_or(self.current_track);
        let step = self.quantize_step;
        let quantizing = self.quantizing;
        let Some(track) = self.tracks.get_mut(tracknum) else {
            return false;
        };

        if take.mode == RecordMode::Replace {
            edit::delete_events(track, take.start, take.end);
        }
        let mut events = take.events;
        if quantizing {
            quantize::quantize_events(&mut events, step);
        }
        let channel = track.channel;
        for ev in events.iter_mut() {
            if ev.channel != DRUM_CHANNEL {
                ev.channel = channel;
            }
        }
        track.add_evs(events);
        track.sort();
        edit::clean_track(track);
        edit::adjust_tracks(&mut self.tracks);
        self.rec_waiting = true;
        true
    }

    /// Rebuild the timeline when a take (or a direct edit) is pending
    pub fn check_rec_data(&mut self) -> bool {
        if !self.rec_waiting && !self.dirty {
            return false;
        }
        self.rec_waiting = false;
        self.gen_timeline();
        self.update_tracks_position();
        true
    }

    // ---- Description ----

    pub fn summary(&self) -> SequenceSummary {
        let tracks = self
            .tracks
            .iter()
            .enumerate()
            .map(|(index, track)| TrackSummary {
                index,
                name: track.name.clone(),
                channel: track.channel,
                program: track.program,
                events: track.len(),
                notes: track.note_count(),
                length: track.length(),
                muted: track.muted,
                soloed: track.soloed,
                armed: track.armed,
            })
            .collect();

        SequenceSummary {
            ppq: self.base.ppq(),
            bpm: self.base.bpm(),
            tempo: self.base.tempo(),
            time_signature: self.base.time_signature().to_string(),
            length_ticks: self.length,
            length_time: self.base.format_time(self.length),
            bars: self.base.tick_to_bars(self.length),
            tracks,
        }
    }

    /// Human readable description of the song and its tracks
    pub fn get_properties(&self) -> String {
        let summary = self.summary();
        let mut out = String::new();
        let _ = writeln!(out, "Tempo: {:.2} BPM ({} usec/qn)", summary.bpm, summary.tempo);
        let _ = writeln!(out, "Time signature: {}", summary.time_signature);
        let _ = writeln!(out, "Resolution: {} ppq", summary.ppq);
        let _ = writeln!(
            out,
            "Length: {} ticks, {} bars, {}",
            summary.length_ticks, summary.bars, summary.length_time
        );
        let _ = writeln!(
            out,
            "Loop: {} ({} - {}), locators: {} - {}",
            if self.looping { "on" } else { "off" },
            self.start_loop,
            self.end_loop,
            self.left_loc,
            self.right_loc
        );
        let _ = writeln!(out, "Tracks: {}", summary.tracks.len());
        for track in &summary.tracks {
            let _ = writeln!(
                out,
                "  {:>2} {:<20} chan {:>2} prog {:>3} events {:>5} notes {:>4}{}{}{}",
                track.index,
                track.name,
                track.channel + 1,
                track.program,
                track.events,
                track.notes,
                if track.muted { " M" } else { "" },
                if track.soloed { " S" } else { "" },
                if track.armed { " R" } else { "" },
            );
        }
        out
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(DEFAULT_PPQ)
    }
}
