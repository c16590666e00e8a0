// Track - Ordered event store with cursor and group-by-tick views
// Events are kept sorted by tick; ties keep insertion order

use crate::midi::event::Event;

/// Event list of one track plus its playback cursor and channel state
///
/// The cursor (`pos`) walks the event list for playback. The group index
/// (first event index of each distinct tick) is cached and dropped on every
/// structural mutation; group accessors rebuild it on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    events: Vec<Event>,
    pos: usize,
    // Lower tick bound for range group scans, -1 when unset
    last_tick: i64,
    groups: Option<Vec<usize>>,
    group_index: usize,

    pub channel: u8,
    pub bank: u8,
    pub program: u8,
    pub name: String,
    pub instrument_name: String,

    pub muted: bool,
    /// Muted by the solo logic of another track
    pub sys_muted: bool,
    pub soloed: bool,
    pub armed: bool,
    pub active: bool,
}

impl Track {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            pos: 0,
            last_tick: -1,
            groups: None,
            group_index: 0,
            channel: 0,
            bank: 0,
            program: 0,
            name: String::new(),
            instrument_name: String::new(),
            muted: false,
            sys_muted: false,
            soloed: false,
            armed: false,
            active: true,
        }
    }

    /// Create a track bound to a channel
    pub fn with_channel(channel: u8) -> Self {
        Self {
            channel: channel & 0x0F,
            ..Self::new()
        }
    }

    /// Create a track holding the given events, sorted
    pub fn from_events(events: Vec<Event>) -> Self {
        let mut track = Self::new();
        track.events = events;
        track.sort();
        track
    }

    // ---- Data access ----

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Mutable access to the list; the group index is dropped
    pub fn events_mut(&mut self) -> &mut Vec<Event> {
        self.invalidate();
        &mut self.events
    }

    /// Replace the whole event list, cursor back to 0
    pub fn set_events(&mut self, events: Vec<Event>) {
        self.events = events;
        self.invalidate();
        self.reset_cursor();
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        self.invalidate();
        self.reset_cursor();
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Tick of the last event, 0 when empty
    pub fn length(&self) -> i64 {
        self.events.last().map(|ev| ev.tick).unwrap_or(0)
    }

    pub fn note_count(&self) -> usize {
        self.events.iter().filter(|ev| ev.is_note_on()).count()
    }

    /// True when the track holds nothing but meta events
    pub fn has_no_playable(&self) -> bool {
        !self.events.iter().any(|ev| ev.is_playable())
    }

    pub fn is_audible(&self) -> bool {
        !self.muted && !self.sys_muted
    }

    // ---- Structural mutation ----

    fn invalidate(&mut self) {
        self.groups = None;
        self.group_index = 0;
    }

    pub fn add_ev(&mut self, event: Event) {
        self.events.push(event);
        self.invalidate();
    }

    pub fn add_evs(&mut self, events: impl IntoIterator<Item = Event>) {
        self.events.extend(events);
        self.invalidate();
    }

    /// Insert at index, clamped to the list length
    /// A cursor past the insertion point keeps pointing at the same event.
    pub fn insert_ev(&mut self, index: usize, event: Event) {
        let index = index.min(self.events.len());
        self.events.insert(index, event);
        if index < self.pos {
            self.pos += 1;
        }
        self.invalidate();
    }

    pub fn insert_range(&mut self, index: usize, events: Vec<Event>) {
        let index = index.min(self.events.len());
        let count = events.len();
        self.events.splice(index..index, events);
        if index < self.pos {
            self.pos += count;
        }
        self.invalidate();
    }

    pub fn delete_ev(&mut self, index: usize) -> Option<Event> {
        if index >= self.events.len() {
            return None;
        }
        self.invalidate();
        if index < self.pos {
            self.pos -= 1;
        }
        Some(self.events.remove(index))
    }

    /// Remove events in `[start, end)`, indices clamped
    pub fn delete_range(&mut self, start: usize, end: usize) -> Vec<Event> {
        let end = end.min(self.events.len());
        if start >= end {
            return Vec::new();
        }
        self.invalidate();
        let removed: Vec<Event> = self.events.drain(start..end).collect();
        if self.pos > start {
            self.pos -= self.pos.min(end) - start;
        }
        removed
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.invalidate();
        self.reset_cursor();
    }

    /// Stable sort by tick
    pub fn sort(&mut self) {
        self.events.sort_by_key(|ev| ev.tick);
        self.invalidate();
    }

    /// Sort, then drop events identical to an earlier one at the same tick
    pub fn sort_uniq_evs(&mut self) {
        self.sort();
        let mut kept: Vec<Event> = Vec::with_capacity(self.events.len());
        let mut group_start = 0;
        for ev in self.events.drain(..) {
            if kept.last().map(|last| last.tick) != Some(ev.tick) {
                group_start = kept.len();
            }
            if !kept[group_start..].contains(&ev) {
                kept.push(ev);
            }
        }
        self.events = kept;
    }

    // ---- Search ----

    /// First index with `tick >= t`, or the length if none
    pub fn search_pos(&self, tick: i64) -> usize {
        self.events.partition_point(|ev| ev.tick < tick)
    }

    /// Last index with `tick == t`, else first index with `tick > t`
    pub fn search_lastpos(&self, tick: i64) -> usize {
        let after = self.events.partition_point(|ev| ev.tick <= tick);
        if after > 0 && self.events[after - 1].tick == tick {
            after - 1
        } else {
            after
        }
    }

    /// Index of the first event at or after `tick` matching the predicate
    pub fn search_ev<F>(&self, tick: i64, pred: F) -> Option<usize>
    where
        F: Fn(&Event) -> bool,
    {
        let start = self.search_pos(tick);
        self.events[start..]
            .iter()
            .position(pred)
            .map(|offset| start + offset)
    }

    /// Indices `[start, end)` covering ticks in `[start_tick, end_tick]`
    pub fn range_indices(&self, start_tick: i64, end_tick: i64) -> (usize, usize) {
        let start = self.search_pos(start_tick);
        let end = self.events.partition_point(|ev| ev.tick <= end_tick);
        (start, end.max(start))
    }

    // ---- Cursor ----

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Move the cursor, clamped to the list length
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.events.len());
    }

    pub fn last_tick(&self) -> i64 {
        self.last_tick
    }

    /// Cursor to 0 and range bound cleared
    pub fn reset_cursor(&mut self) {
        self.pos = 0;
        self.last_tick = -1;
        self.group_index = 0;
    }

    /// Place the cursor on the first event at or after `tick`
    pub fn seek(&mut self, tick: i64) {
        self.pos = self.search_pos(tick);
        self.last_tick = -1;
    }

    /// Event under the cursor
    pub fn get_ev(&self) -> Option<&Event> {
        self.events.get(self.pos)
    }

    pub fn get_next_ev(&self) -> Option<&Event> {
        self.events.get(self.pos + 1)
    }

    pub fn get_prev_ev(&self) -> Option<&Event> {
        self.pos.checked_sub(1).and_then(|idx| self.events.get(idx))
    }

    /// Advance the cursor and return the event it lands on
    /// Past the end the cursor stays at the length and None is returned
    pub fn next_ev(&mut self) -> Option<&Event> {
        if self.pos < self.events.len() {
            self.pos += 1;
        }
        self.events.get(self.pos)
    }

    /// Step the cursor back and return the event it lands on
    pub fn prev_ev(&mut self) -> Option<&Event> {
        if self.pos == 0 {
            return None;
        }
        self.pos -= 1;
        self.events.get(self.pos)
    }

    /// Drain events from the cursor while `last_tick <= tick <= up_to`
    ///
    /// Events below the range bound left behind by a stale cursor are
    /// skipped, so the scan always terminates.
    pub fn search_ev_group(&mut self, up_to: i64) -> Vec<Event> {
        let mut lst = Vec::new();
        while let Some(ev) = self.events.get(self.pos) {
            if ev.tick > up_to {
                break;
            }
            if ev.tick >= self.last_tick {
                lst.push(ev.clone());
            }
            self.pos += 1;
        }
        if let Some(last) = lst.last() {
            self.last_tick = last.tick;
        }
        lst
    }

    /// Drain the events whose tick equals `tick` exactly
    /// Events before `tick` still under the cursor are skipped
    pub fn search_ev_group_time(&mut self, tick: i64) -> Vec<Event> {
        let mut lst = Vec::new();
        while let Some(ev) = self.events.get(self.pos) {
            if ev.tick > tick {
                break;
            }
            if ev.tick == tick {
                lst.push(ev.clone());
            }
            self.pos += 1;
        }
        if !lst.is_empty() {
            self.last_tick = tick;
        }
        lst
    }

    // ---- Group views ----

    /// Index of the first event of each distinct tick
    pub fn gen_group_pos(&mut self) -> &[usize] {
        let mut groups = Vec::new();
        let mut curtick = None;
        for (idx, ev) in self.events.iter().enumerate() {
            if curtick != Some(ev.tick) {
                groups.push(idx);
                curtick = Some(ev.tick);
            }
        }
        self.groups = Some(groups);
        self.group_index = 0;
        self.groups.as_deref().unwrap_or_default()
    }

    /// (first index, tick) for each distinct tick
    pub fn gen_group_time(&mut self) -> Vec<(usize, i64)> {
        self.ensure_groups();
        self.group_list()
            .iter()
            .map(|&idx| (idx, self.events[idx].tick))
            .collect()
    }

    fn ensure_groups(&mut self) {
        if self.groups.is_none() {
            self.gen_group_pos();
        }
    }

    fn group_list(&self) -> &[usize] {
        self.groups.as_deref().unwrap_or_default()
    }

    pub fn group_count(&mut self) -> usize {
        self.ensure_groups();
        self.group_list().len()
    }

    pub fn group_index(&self) -> usize {
        self.group_index
    }

    /// Point the group index at the group containing the cursor
    pub fn update_group_pos(&mut self) {
        self.ensure_groups();
        let pos = self.pos;
        let index = self
            .group_list()
            .partition_point(|&start| start <= pos)
            .saturating_sub(1);
        self.group_index = index;
    }

    /// `[start, end)` event indices of the current group
    pub fn get_group_range(&mut self) -> Option<(usize, usize)> {
        self.ensure_groups();
        let groups = self.group_list();
        let start = *groups.get(self.group_index)?;
        let end = groups
            .get(self.group_index + 1)
            .copied()
            .unwrap_or(self.events.len());
        Some((start, end))
    }

    /// Events of the current group
    pub fn get_ev_group(&mut self) -> Option<&[Event]> {
        let (start, end) = self.get_group_range()?;
        self.pos = start;
        Some(&self.events[start..end])
    }

    pub fn next_ev_group(&mut self) -> Option<&[Event]> {
        self.ensure_groups();
        if self.group_index + 1 >= self.group_list().len() {
            return None;
        }
        self.group_index += 1;
        self.get_ev_group()
    }

    pub fn prev_ev_group(&mut self) -> Option<&[Event]> {
        self.ensure_groups();
        if self.group_index == 0 {
            return None;
        }
        self.group_index -= 1;
        self.get_ev_group()
    }
}

impl Default for Track {
    fn default() -> Self {
        Self::new()
    }
}

/// Track whose cursor wraps to the start when it runs out
///
/// Used for the click pattern: each wrap increments `repeat_count`, so the
/// absolute tick of an event is `tick + pattern_len * repeat_count`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepeatingTrack {
    track: Track,
    repeat_count: i64,
}

impl RepeatingTrack {
    pub fn new(track: Track) -> Self {
        Self {
            track,
            repeat_count: 0,
        }
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn track_mut(&mut self) -> &mut Track {
        &mut self.track
    }

    pub fn repeat_count(&self) -> i64 {
        self.repeat_count
    }

    pub fn set_repeat_count(&mut self, count: i64) {
        self.repeat_count = count.max(0);
    }

    /// Cursor and repeat counter back to the start
    pub fn reset(&mut self) {
        self.track.reset_cursor();
        self.repeat_count = 0;
    }

    pub fn get_ev(&self) -> Option<&Event> {
        self.track.get_ev()
    }

    /// Advance, wrapping to the first event after the last one
    pub fn next_ev(&mut self) -> Option<&Event> {
        if self.track.is_empty() {
            return None;
        }
        if self.track.pos() + 1 >= self.track.len() {
            self.track.reset_cursor();
            self.repeat_count += 1;
            return self.track.get_ev();
        }
        self.track.next_ev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn sample_track() -> Track {
        Track::from_events(vec![
            Event::note_on(0, 0, 60, 100),
            Event::note_on(0, 0, 64, 100),
            Event::note_off(120, 0, 60),
            Event::note_off(120, 0, 64),
            Event::note_on(240, 0, 67, 90),
            Event::note_off(360, 0, 67),
            Event::end_of_track(480),
        ])
    }

    #[test]
    fn test_sort_is_stable() {
        let track = Track::from_events(vec![
            Event::note_on(10, 0, 1, 1),
            Event::note_on(5, 0, 2, 1),
            Event::note_on(10, 0, 3, 1),
            Event::note_on(5, 0, 4, 1),
        ]);
        let notes: Vec<u8> = track.events().iter().filter_map(|e| e.note()).collect();
        assert_eq!(notes, vec![2, 4, 1, 3]);
    }

    #[test]
    fn test_search_pos() {
        let track = sample_track();
        assert_eq!(track.search_pos(0), 0);
        assert_eq!(track.search_pos(1), 2);
        assert_eq!(track.search_pos(120), 2);
        assert_eq!(track.search_pos(481), track.len());
    }

    #[test]
    fn test_search_lastpos() {
        let track = sample_track();
        assert_eq!(track.search_lastpos(120), 3);
        assert_eq!(track.search_lastpos(130), 4);
        assert_eq!(track.search_lastpos(0), 1);
        assert_eq!(track.search_lastpos(1000), track.len());
    }

    #[test]
    fn test_search_ev() {
        let track = sample_track();
        assert_eq!(track.search_ev(0, |e| e.is_note_off()), Some(2));
        assert_eq!(track.search_ev(0, |e| e.is_tempo()), None);
    }

    #[test]
    fn test_cursor_clamps_at_end() {
        let mut track = sample_track();
        track.set_pos(track.len() - 1);
        assert!(track.next_ev().is_none());
        assert_eq!(track.pos(), track.len());
        assert!(track.next_ev().is_none());
        assert_eq!(track.pos(), track.len());
        assert!(track.prev_ev().is_some());
    }

    #[test]
    fn test_prev_ev_at_start() {
        let mut track = sample_track();
        assert!(track.prev_ev().is_none());
        assert_eq!(track.pos(), 0);
    }

    #[test]
    fn test_search_ev_group_range() {
        let mut track = sample_track();
        let group = track.search_ev_group(130);
        assert_eq!(group.len(), 4);
        assert_eq!(track.pos(), 4);
        assert_eq!(track.last_tick(), 120);
        assert!(track.search_ev_group(200).is_empty());
        assert_eq!(track.search_ev_group(240).len(), 1);
    }

    #[test]
    fn test_search_ev_group_time_exact() {
        let mut track = sample_track();
        assert_eq!(track.search_ev_group_time(0).len(), 2);
        assert!(track.search_ev_group_time(100).is_empty());
        assert_eq!(track.pos(), 2);
        // Stale cursor: asking for 240 skips the events at 120
        assert_eq!(track.search_ev_group_time(240).len(), 1);
        assert_eq!(track.pos(), 5);
    }

    #[test]
    fn test_groups() {
        let mut track = sample_track();
        assert_eq!(track.gen_group_pos(), &[0, 2, 4, 5, 6]);
        assert_eq!(track.group_count(), 5);
        assert_eq!(track.get_group_range(), Some((0, 2)));
        assert_eq!(track.next_ev_group().map(|g| g.len()), Some(2));
        assert_eq!(track.next_ev_group().map(|g| g[0].tick), Some(240));
        assert_eq!(track.prev_ev_group().map(|g| g[0].tick), Some(120));
        assert_eq!(
            track.gen_group_time(),
            vec![(0, 0), (2, 120), (4, 240), (5, 360), (6, 480)]
        );
    }

    #[test]
    fn test_group_index_dropped_on_edit() {
        let mut track = sample_track();
        track.gen_group_pos();
        track.add_ev(Event::note_on(600, 0, 70, 80));
        assert_eq!(track.group_count(), 6);
    }

    #[test]
    fn test_update_group_pos() {
        let mut track = sample_track();
        track.set_pos(3);
        track.update_group_pos();
        assert_eq!(track.group_index(), 1);
    }

    #[test]
    fn test_sort_uniq_evs() {
        let mut track = Track::from_events(vec![
            Event::note_on(0, 0, 60, 100),
            Event::note_on(0, 0, 60, 100),
            Event::note_on(0, 0, 62, 100),
            Event::note_on(10, 0, 60, 100),
        ]);
        track.sort_uniq_evs();
        assert_eq!(track.len(), 3);
    }

    #[test]
    fn test_delete_range_clamps() {
        let mut track = sample_track();
        track.set_pos(7);
        let removed = track.delete_range(5, 100);
        assert_eq!(removed.len(), 2);
        assert_eq!(track.len(), 5);
        assert_eq!(track.pos(), 5);
        assert!(track.delete_range(4, 2).is_empty());
    }

    #[test]
    fn test_length() {
        assert_eq!(sample_track().length(), 480);
        assert_eq!(Track::new().length(), 0);
    }

    #[test]
    fn test_repeating_track_wraps() {
        let mut click = RepeatingTrack::new(Track::from_events(vec![
            Event::note_on(0, 9, 67, 120),
            Event::note_off(120, 9, 67),
        ]));
        assert_eq!(click.get_ev().map(|e| e.tick), Some(0));
        assert_eq!(click.next_ev().map(|e| e.tick), Some(120));
        assert_eq!(click.next_ev().map(|e| e.tick), Some(0));
        assert_eq!(click.repeat_count(), 1);
        click.reset();
        assert_eq!(click.repeat_count(), 0);
        assert_eq!(click.track().pos(), 0);
    }

    #[test]
    fn test_repeating_track_empty() {
        let mut click = RepeatingTrack::new(Track::new());
        assert!(click.next_ev().is_none());
        assert_eq!(click.repeat_count(), 0);
    }

    #[test]
    fn test_search_pos_monotonic_random() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let mut track = Track::new();
            for _ in 0..rng.gen_range(0..40) {
                let tick = rng.gen_range(0..500);
                track.add_ev(Event::note_on(tick, 0, 60, 100));
            }
            track.sort();

            let mut last = 0;
            for t in -5..510 {
                let pos = track.search_pos(t);
                let linear = track
                    .events()
                    .iter()
                    .position(|ev| ev.tick >= t)
                    .unwrap_or(track.len());
                assert_eq!(pos, linear, "tick {}", t);
                assert!(pos >= last, "tick {}", t);
                last = pos;
            }
        }
    }
}
