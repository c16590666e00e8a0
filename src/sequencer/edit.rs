// Track editing tools - range copy/cut/paste, shifting and length equalization
// All ranges are inclusive tick ranges `[start, end]`

use super::track::Track;
use crate::midi::event::Event;

/// Clone events with tick in `[start, end]`
pub fn get_evs_range(track: &Track, start: i64, end: i64) -> Vec<Event> {
    let (first, last) = track.range_indices(start, end);
    track.events()[first..last].to_vec()
}

/// Index of the longest track (first one on ties)
pub fn get_max_track(tracks: &[Track]) -> Option<usize> {
    let max_len = tracks.iter().map(Track::length).max()?;
    tracks.iter().position(|track| track.length() == max_len)
}

pub fn is_max_track(tracks: &[Track], index: usize) -> bool {
    get_max_track(tracks) == Some(index)
}

/// Length of the longest track
pub fn max_length(tracks: &[Track]) -> i64 {
    tracks.iter().map(Track::length).max().unwrap_or(0)
}

/// Move every event by `delta` ticks, clamping at 0
pub fn shift_events(events: &mut [Event], delta: i64) {
    for ev in events.iter_mut() {
        ev.tick = (ev.tick + delta).max(0);
    }
}

/// Move events so the first one sits at `start` ticks before zero
/// (the range start becomes tick 0)
pub fn shift_to_zero(events: &mut [Event], start: i64) {
    shift_events(events, -start);
}

/// Drop inner end-of-track events and put a single one after the last event
pub fn clean_track(track: &mut Track) {
    let end = track
        .events()
        .iter()
        .map(|ev| ev.tick)
        .max()
        .unwrap_or(0);
    let events = track.events_mut();
    events.retain(|ev| !ev.is_end_of_track());
    events.push(Event::end_of_track(end));
    track.sort();
}

pub fn clean_tracks(tracks: &mut [Track]) {
    for track in tracks.iter_mut() {
        clean_track(track);
    }
}

/// Move each track's end-of-track to the longest track's length
pub fn adjust_tracks(tracks: &mut [Track]) {
    let max_len = max_length(tracks);
    for track in tracks.iter_mut() {
        let events = track.events_mut();
        events.retain(|ev| !ev.is_end_of_track());
        events.push(Event::end_of_track(max_len));
        track.sort();
    }
}

/// Remove tracks without playable events; track 0 (conductor) is kept
/// Returns the number of removed tracks
pub fn reduce_tracks(tracks: &mut Vec<Track>) -> usize {
    let before = tracks.len();
    let mut index = 0;
    tracks.retain(|track| {
        let keep = index == 0 || !track.has_no_playable();
        index += 1;
        keep
    });
    before - tracks.len()
}

/// Delete events in `[start, end]`; end-of-track markers are kept
/// Returns the removed events
pub fn delete_events(track: &mut Track, start: i64, end: i64) -> Vec<Event> {
    let (first, last) = track.range_indices(start, end);
    let removed = track.delete_range(first, last);
    let (kept_eot, removed): (Vec<Event>, Vec<Event>) =
        removed.into_iter().partition(Event::is_end_of_track);
    if !kept_eot.is_empty() {
        track.insert_range(first, kept_eot);
    }
    removed
}

/// Copy `[start, end]` shifted so `start` becomes tick 0
pub fn copy_range(track: &Track, start: i64, end: i64) -> Vec<Event> {
    let mut events: Vec<Event> = get_evs_range(track, start, end)
        .into_iter()
        .filter(|ev| !ev.is_end_of_track())
        .collect();
    shift_to_zero(&mut events, start);
    events
}

/// Copy then delete `[start, end]`
pub fn cut_range(track: &mut Track, start: i64, end: i64) -> Vec<Event> {
    let events = copy_range(track, start, end);
    delete_events(track, start, end);
    events
}

/// Paste a zero-based block at `at`, replacing `[at, at + length]`
pub fn paste_replace(track: &mut Track, events: &[Event], at: i64, length: i64) {
    delete_events(track, at, at + length);
    paste_merge(track, events, at);
}

/// Paste a zero-based block at `at`, keeping existing events
pub fn paste_merge(track: &mut Track, events: &[Event], at: i64) {
    let mut block = events.to_vec();
    shift_events(&mut block, at.max(0));
    track.add_evs(block);
    track.sort();
    clean_track(track);
}

/// One copied range, kept between copy and paste
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clipboard {
    events: Vec<Event>,
    length: i64,
}

impl Clipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Length of the copied range in ticks
    pub fn length(&self) -> i64 {
        self.length
    }

    pub fn copy(&mut self, track: &Track, start: i64, end: i64) -> usize {
        self.events = copy_range(track, start, end);
        self.length = (end - start).max(0);
        self.events.len()
    }

    pub fn cut(&mut self, track: &mut Track, start: i64, end: i64) -> usize {
        self.events = cut_range(track, start, end);
        self.length = (end - start).max(0);
        self.events.len()
    }

    /// Delete a range without touching the clipboard
    pub fn erase(&self, track: &mut Track, start: i64, end: i64) -> usize {
        delete_events(track, start, end).len()
    }

    pub fn paste_replace(&self, track: &mut Track, at: i64) -> bool {
        if self.is_empty() {
            return false;
        }
        paste_replace(track, &self.events, at, self.length);
        true
    }

    pub fn paste_merge(&self, track: &mut Track, at: i64) -> bool {
        if self.is_empty() {
            return false;
        }
        paste_merge(track, &self.events, at);
        true
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.length = 0;
    }
}
