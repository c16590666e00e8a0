// Timeline - Merged view of all tracks, one entry per distinct tick
// Tells the scheduler when the next event is due; playing is done per track

use super::track::Track;

/// One timeline entry: a tick and the track providing its representative event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineEntry {
    pub tick: i64,
    pub tracknum: usize,
}

/// Tick-sorted, duplicate-free merge of every track
///
/// Rebuilt on structural changes (load, quantize, track add/delete, record
/// merge) and never mutated during playback; only its cursor moves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
    pos: usize,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from tracks
    pub fn from_tracks(tracks: &[Track]) -> Self {
        let mut timeline = Self::new();
        timeline.rebuild(tracks);
        timeline
    }

    /// Merge the first event of each distinct tick of every track,
    /// then keep one entry per tick. Cursor back to 0.
    pub fn rebuild(&mut self, tracks: &[Track]) {
        let mut entries = Vec::new();
        for (tracknum, track) in tracks.iter().enumerate() {
            let mut curtick = None;
            for ev in track.events() {
                if curtick != Some(ev.tick) {
                    entries.push(TimelineEntry {
                        tick: ev.tick,
                        tracknum,
                    });
                    curtick = Some(ev.tick);
                }
            }
        }
        // Stable: at equal ticks the lowest track number wins
        entries.sort_by_key(|entry| entry.tick);
        entries.dedup_by_key(|entry| entry.tick);
        self.entries = entries;
        self.pos = 0;
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tick of the last entry, 0 when empty
    pub fn length(&self) -> i64 {
        self.entries.last().map(|entry| entry.tick).unwrap_or(0)
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn reset(&mut self) {
        self.pos = 0;
    }

    /// First index with `tick >= t`, or the length if none
    pub fn search_pos(&self, tick: i64) -> usize {
        self.entries.partition_point(|entry| entry.tick < tick)
    }

    /// Place the cursor on the first entry at or after `tick`
    pub fn seek(&mut self, tick: i64) {
        self.pos = self.search_pos(tick);
    }

    /// Tick of the entry under the cursor without consuming it, or -1
    pub fn peek_time(&self) -> i64 {
        self.entries.get(self.pos).map(|entry| entry.tick).unwrap_or(-1)
    }

    /// Consume the entry under the cursor and return its tick
    /// Returns -1 once the timeline is exhausted
    pub fn next_ev_time(&mut self) -> i64 {
        match self.entries.get(self.pos) {
            Some(entry) => {
                self.pos += 1;
                entry.tick
            }
            None => -1,
        }
    }

    /// Entry at exactly `tick`
    pub fn search_ev_group_time(&self, tick: i64) -> Option<&TimelineEntry> {
        let idx = self.search_pos(tick);
        self.entries.get(idx).filter(|entry| entry.tick == tick)
    }

    /// (index, tick) pairs; ticks are unique so this is the group-time index
    pub fn group_times(&self) -> impl Iterator<Item = (usize, i64)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (idx, entry.tick))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::event::Event;

    fn tracks() -> Vec<Track> {
        vec![
            Track::from_events(vec![Event::tempo(0, 500_000), Event::end_of_track(480)]),
            Track::from_events(vec![
                Event::note_on(0, 0, 60, 100),
                Event::note_off(120, 0, 60),
                Event::note_on(240, 0, 62, 100),
                Event::note_off(360, 0, 62),
            ]),
            Track::from_events(vec![
                Event::note_on(120, 1, 48, 100),
                Event::note_on(120, 1, 52, 100),
                Event::note_off(300, 1, 48),
                Event::note_off(300, 1, 52),
            ]),
        ]
    }

    #[test]
    fn test_rebuild_unique_sorted() {
        let timeline = Timeline::from_tracks(&tracks());
        let ticks: Vec<i64> = timeline.entries().iter().map(|e| e.tick).collect();
        assert_eq!(ticks, vec![0, 120, 240, 300, 360, 480]);
        assert_eq!(timeline.length(), 480);
    }

    #[test]
    fn test_provenance_prefers_lowest_track() {
        let timeline = Timeline::from_tracks(&tracks());
        assert_eq!(timeline.search_ev_group_time(0).map(|e| e.tracknum), Some(0));
        assert_eq!(timeline.search_ev_group_time(120).map(|e| e.tracknum), Some(1));
        assert_eq!(timeline.search_ev_group_time(300).map(|e| e.tracknum), Some(2));
        assert!(timeline.search_ev_group_time(301).is_none());
    }

    #[test]
    fn test_next_ev_time_sentinel() {
        let mut timeline = Timeline::from_tracks(&tracks());
        timeline.seek(350);
        assert_eq!(timeline.peek_time(), 360);
        assert_eq!(timeline.next_ev_time(), 360);
        assert_eq!(timeline.next_ev_time(), 480);
        assert_eq!(timeline.next_ev_time(), -1);
        assert_eq!(timeline.next_ev_time(), -1);
    }

    #[test]
    fn test_empty_timeline() {
        let mut timeline = Timeline::from_tracks(&[]);
        assert!(timeline.is_empty());
        assert_eq!(timeline.next_ev_time(), -1);
        assert_eq!(timeline.length(), 0);
    }

    #[test]
    fn test_group_times_match_entries() {
        let timeline = Timeline::from_tracks(&tracks());
        let groups: Vec<(usize, i64)> = timeline.group_times().collect();
        assert_eq!(groups[2], (2, 240));
        assert_eq!(groups.len(), timeline.len());
    }
}
