// Recorder - Captures incoming MIDI while the transport plays
// Events are stamped with the play position and merged into a track on stop

use crate::midi::event::{Event, EventKind};
use std::collections::HashMap;

/// How a take is merged into the target track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum RecordMode {
    /// Events already in the recorded range are deleted first
    #[default]
    Replace,
    /// Recorded events are added on top of the existing ones
    Merge,
}

/// A finished recording
#[derive(Debug, Clone, PartialEq)]
pub struct RecordTake {
    pub events: Vec<Event>,
    /// First recorded tick
    pub start: i64,
    /// Play position when recording stopped
    pub end: i64,
    pub mode: RecordMode,
}

/// Record buffer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recorder {
    events: Vec<Event>,
    // (channel, note) -> tick of the note on still held
    active_notes: HashMap<(u8, u8), i64>,
    first_pos: Option<i64>,
    last_pos: i64,
    mode: RecordMode,
    armed: bool,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> RecordMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: RecordMode) {
        self.mode = mode;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// True once at least one message has been captured
    pub fn is_incoming(&self) -> bool {
        self.first_pos.is_some()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Start a new take, dropping anything buffered
    pub fn start(&mut self) {
        self.clear();
        self.armed = true;
    }

    /// Capture one event at the current play position
    ///
    /// Events are stamped with `playpos` (clamped at 0). The first message
    /// marks the start of the take, used by replace mode.
    pub fn input(&mut self, event: Event, playpos: i64) -> Option<&Event> {
        if !self.armed || !event.is_playable() {
            return None;
        }
        let tick = playpos.max(0);
        if self.first_pos.is_none() {
            self.first_pos = Some(tick);
        }

        match event.kind {
            EventKind::NoteOn { note, .. } => {
                self.active_notes.insert((event.channel, note), tick);
            }
            EventKind::NoteOff { note, .. } => {
                self.active_notes.remove(&(event.channel, note));
            }
            _ => {}
        }

        self.last_pos = self.last_pos.max(tick);
        self.events.push(event.at(tick));
        self.events.last()
    }

    /// Finish the take; held notes are closed at `playpos`
    /// Returns None when nothing was captured
    pub fn finish(&mut self, playpos: i64) -> Option<RecordTake> {
        self.armed = false;
        let start = self.first_pos?;
        let end = playpos.max(self.last_pos);

        let mut held: Vec<((u8, u8), i64)> = self.active_notes.drain().collect();
        held.sort();
        for ((channel, note), _) in held {
            self.events.push(Event::note_off(end, channel, note));
        }

        let mut events = std::mem::take(&mut self.events);
        events.sort_by_key(|ev| ev.tick);
        self.first_pos = None;
        self.last_pos = 0;

        Some(RecordTake {
            events,
            start,
            end,
            mode: self.mode,
        })
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.active_notes.clear();
        self.first_pos = None;
        self.last_pos = 0;
        self.armed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_recording() {
        let mut recorder = Recorder::new();
        recorder.start();
        recorder.input(Event::note_on(0, 0, 60, 100), 240);
        recorder.input(Event::note_off(0, 0, 60), 300);

        let take = recorder.finish(480).unwrap();
        assert_eq!(take.start, 240);
        assert_eq!(take.end, 480);
        let ticks: Vec<i64> = take.events.iter().map(|e| e.tick).collect();
        assert_eq!(ticks, vec![240, 300]);
    }

    #[test]
    fn test_events_stamped_at_play_position() {
        let mut recorder = Recorder::new();
        recorder.start();
        recorder.input(Event::note_on(0, 0, 60, 100), 400);
        recorder.input(Event::note_off(0, 0, 60), 450);
        // Loop wrapped: the next note lands at the start of the region
        recorder.input(Event::note_on(0, 0, 62, 100), 10);
        recorder.input(Event::note_off(0, 0, 62), -5);

        let take = recorder.finish(60).unwrap();
        assert_eq!(take.start, 400);
        let ticks: Vec<i64> = take.events.iter().map(|e| e.tick).collect();
        assert_eq!(ticks, vec![0, 10, 400, 450]);
    }

    #[test]
    fn test_ignored_when_not_armed() {
        let mut recorder = Recorder::new();
        assert!(recorder.input(Event::note_on(0, 0, 60, 100), 10).is_none());
        assert!(recorder.finish(20).is_none());
    }

    #[test]
    fn test_active_notes_closed_on_finish() {
        let mut recorder = Recorder::new();
        recorder.start();
        recorder.input(Event::note_on(0, 2, 64, 90), 100);
        assert!(recorder.is_incoming());

        let take = recorder.finish(200).unwrap();
        assert_eq!(take.events.len(), 2);
        assert_eq!(take.events[1], Event::note_off(200, 2, 64));

        // Next take starts fresh
        recorder.start();
        assert!(!recorder.is_incoming());
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_meta_events_not_recorded() {
        let mut recorder = Recorder::new();
        recorder.start();
        assert!(recorder.input(Event::tempo(0, 400_000), 10).is_none());
        assert!(recorder.is_empty());
    }
}
