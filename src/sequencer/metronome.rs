// Metronome - Click track generator for musical timing
// Generates a one-bar repeating pattern of drum notes keyed to the time signature

use super::timebase::TimeBase;
use super::track::{RepeatingTrack, Track};
use crate::midi::event::{DRUM_CHANNEL, Event};

/// Metronome click type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickType {
    /// Click on first beat of bar (accent/downbeat)
    Accent,
    /// Click on other beats
    Regular,
}

impl ClickType {
    /// Click type for a 0-based beat in the bar
    pub fn for_beat(beat: i64) -> Self {
        if beat == 0 {
            ClickType::Accent
        } else {
            ClickType::Regular
        }
    }
}

/// Note and velocity played for a click type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickSound {
    pub note: u8,
    pub velocity: u8,
}

/// Click track state
///
/// The pattern covers one bar and lives in a [`RepeatingTrack`]; the absolute
/// tick of a click is its pattern tick plus `bar_ticks * repeat_count`.
#[derive(Debug, Clone, PartialEq)]
pub struct Metronome {
    click: RepeatingTrack,
    pattern_len: i64,
    accent: ClickSound,
    regular: ClickSound,
    channel: u8,
    active: bool,
}

impl Metronome {
    /// Accent: high wood block
    pub const ACCENT: ClickSound = ClickSound {
        note: 67,
        velocity: 120,
    };

    /// Regular beat: low wood block
    pub const REGULAR: ClickSound = ClickSound {
        note: 68,
        velocity: 80,
    };

    /// Create a metronome and generate its pattern
    pub fn new(base: &TimeBase) -> Self {
        let mut metronome = Self {
            click: RepeatingTrack::default(),
            pattern_len: base.bar_ticks(),
            accent: Self::ACCENT,
            regular: Self::REGULAR,
            channel: DRUM_CHANNEL,
            active: false,
        };
        metronome.generate_click(base);
        metronome
    }

    /// Rebuild the one-bar pattern: per beat a note on, then a note off
    /// one beat later. Cursor and repeat counter are reset.
    pub fn generate_click(&mut self, base: &TimeBase) {
        let ppq = base.ppq() as i64;
        let mut track = Track::with_channel(self.channel);
        track.name = "Click".to_string();

        for beat in 0..base.numerator() as i64 {
            let sound = self.sound(ClickType::for_beat(beat));
            let tick = beat * ppq;
            track.add_ev(Event::note_on(tick, self.channel, sound.note, sound.velocity));
            track.add_ev(Event::note_off(tick + ppq, self.channel, sound.note));
        }
        track.sort();

        self.pattern_len = base.bar_ticks();
        self.click = RepeatingTrack::new(track);
    }

    /// Change tempo through the time base; the pattern is unchanged
    pub fn change_bpm(&self, base: &mut TimeBase, bpm: f64) -> bool {
        base.set_bpm(bpm)
    }

    pub fn sound(&self, click_type: ClickType) -> ClickSound {
        match click_type {
            ClickType::Accent => self.accent,
            ClickType::Regular => self.regular,
        }
    }

    pub fn set_sound(&mut self, click_type: ClickType, sound: ClickSound) {
        match click_type {
            ClickType::Accent => self.accent = sound,
            ClickType::Regular => self.regular = sound,
        }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn click_track(&self) -> &RepeatingTrack {
        &self.click
    }

    pub fn pattern_len(&self) -> i64 {
        self.pattern_len
    }

    pub fn repeat_count(&self) -> i64 {
        self.click.repeat_count()
    }

    /// Back to the first click of the pattern
    pub fn init_click(&mut self) {
        self.click.reset();
    }

    /// Place the click cursor at an absolute tick
    pub fn seek(&mut self, tick: i64) {
        if self.pattern_len <= 0 {
            self.init_click();
            return;
        }
        let tick = tick.max(0);
        let repeat = tick / self.pattern_len;
        let offset = tick % self.pattern_len;
        self.click.reset();
        self.click.set_repeat_count(repeat);
        let pos = self.click.track().search_pos(offset);
        self.click.track_mut().set_pos(pos);
        // Offset past the last pattern event: next click is in the next bar
        if pos >= self.click.track().len() {
            self.click.reset();
            self.click.set_repeat_count(repeat + 1);
        }
    }

    /// Absolute tick of the next click event
    pub fn peek_tick(&self) -> Option<i64> {
        self.click
            .get_ev()
            .map(|ev| ev.tick + self.pattern_len * self.click.repeat_count())
    }

    /// Take the next click event stamped with its absolute tick, advancing
    /// (and wrapping) the pattern cursor
    pub fn pop(&mut self) -> Option<Event> {
        let tick = self.peek_tick()?;
        let ev = self.click.get_ev()?.at(tick);
        self.click.next_ev();
        Some(ev)
    }

    /// Clicks with absolute tick up to `tick`
    pub fn due_events(&mut self, tick: i64) -> Vec<Event> {
        let mut lst = Vec::new();
        while let Some(next) = self.peek_tick() {
            if next > tick {
                break;
            }
            match self.pop() {
                Some(ev) => lst.push(ev),
                None => break,
            }
        }
        lst
    }
}

impl Default for Metronome {
    fn default() -> Self {
        Self::new(&TimeBase::default())
    }
}
