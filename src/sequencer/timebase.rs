// TimeBase - Musical time representation
// Handles conversion between ticks, seconds, bars, beats and tempo

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default resolution in ticks per quarter note
pub const DEFAULT_PPQ: u32 = 120;

/// Default tempo in microseconds per quarter note (120 BPM)
pub const DEFAULT_TEMPO: u32 = 500_000;

const USEC_PER_MINUTE: f64 = 60_000_000.0;

/// Time signature (numerator/denominator)
/// Example: 4/4 time = TimeSignature { numerator: 4, denominator: 4 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,   // Beats per bar
    pub denominator: u8, // Note value (4 = quarter note, 8 = eighth note)
}

impl TimeSignature {
    /// Creates a new time signature, or None for a zero numerator
    /// or a denominator that is not a power of two
    pub fn new(numerator: u8, denominator: u8) -> Option<Self> {
        if numerator == 0 || !denominator.is_power_of_two() {
            return None;
        }
        Some(Self {
            numerator,
            denominator,
        })
    }

    /// Common 4/4 time signature
    pub fn four_four() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Position expressed in bars, beats and ticks (all 0-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BarPosition {
    pub bar: i64,
    pub beat: i64,
    pub tick: i64,
}

impl BarPosition {
    /// 1-based (bar, beat) pair, as shown to the user
    pub fn display_pair(&self) -> (i64, i64) {
        (self.bar + 1, self.beat + 1)
    }
}

impl fmt::Display for BarPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}:{:02}:{:03}", self.bar + 1, self.beat + 1, self.tick)
    }
}

/// Tick/second/bar converter
///
/// Holds the resolution (PPQ), the time signature and the current tempo.
/// Every derived field (`bpm`, `bar_ticks`, `sec_per_beat`, `sec_per_tick`,
/// `tick_per_sec`) is recomputed together whenever one of the inputs changes,
/// so the struct is never observed in a half-updated state.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeBase {
    ppq: u32,
    time_signature: TimeSignature,
    tempo: u32,
    bpm: f64,
    bar_ticks: i64,
    sec_per_beat: f64,
    sec_per_tick: f64,
    tick_per_sec: f64,
}

impl TimeBase {
    /// Create a time base with the given resolution, 4/4 and 120 BPM
    pub fn new(ppq: u32) -> Self {
        let mut base = Self {
            ppq: ppq.max(1),
            time_signature: TimeSignature::default(),
            tempo: DEFAULT_TEMPO,
            bpm: 0.0,
            bar_ticks: 0,
            sec_per_beat: 0.0,
            sec_per_tick: 0.0,
            tick_per_sec: 0.0,
        };
        base.update_params();
        base
    }

    /// Recompute all derived fields from ppq, time signature and tempo
    fn update_params(&mut self) {
        self.bpm = Self::tempo_to_bpm(self.tempo);
        self.bar_ticks = self.time_signature.numerator as i64 * self.ppq as i64;
        self.sec_per_beat = self.tempo as f64 / 1_000_000.0;
        self.sec_per_tick = self.sec_per_beat / self.ppq as f64;
        self.tick_per_sec = if self.sec_per_tick > 0.0 {
            1.0 / self.sec_per_tick
        } else {
            0.0
        };
    }

    pub fn ppq(&self) -> u32 {
        self.ppq
    }

    /// Tempo in microseconds per quarter note
    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn numerator(&self) -> u8 {
        self.time_signature.numerator
    }

    pub fn denominator(&self) -> u8 {
        self.time_signature.denominator
    }

    /// Ticks in one bar (`numerator * ppq`)
    pub fn bar_ticks(&self) -> i64 {
        self.bar_ticks
    }

    pub fn sec_per_beat(&self) -> f64 {
        self.sec_per_beat
    }

    pub fn sec_per_tick(&self) -> f64 {
        self.sec_per_tick
    }

    pub fn tick_per_sec(&self) -> f64 {
        self.tick_per_sec
    }

    /// Set the resolution, ignored when zero
    pub fn set_ppq(&mut self, ppq: u32) -> bool {
        if ppq == 0 {
            return false;
        }
        self.ppq = ppq;
        self.update_params();
        true
    }

    /// Set tempo from BPM
    /// Non-positive values are rejected and leave the time base untouched
    pub fn set_bpm(&mut self, bpm: f64) -> bool {
        if bpm <= 0.0 || !bpm.is_finite() {
            return false;
        }
        let tempo = Self::bpm_to_tempo(bpm);
        if tempo == 0 {
            return false;
        }
        self.tempo = tempo;
        self.update_params();
        true
    }

    /// Set tempo in microseconds per quarter note, ignored when zero
    pub fn set_tempo(&mut self, tempo: u32) -> bool {
        if tempo == 0 {
            return false;
        }
        self.tempo = tempo;
        self.update_params();
        true
    }

    /// Set the time signature, rejecting invalid values
    pub fn set_time_signature(&mut self, numerator: u8, denominator: u8) -> bool {
        match TimeSignature::new(numerator, denominator) {
            Some(sig) => {
                self.time_signature = sig;
                self.update_params();
                true
            }
            None => false,
        }
    }

    /// BPM to microseconds per quarter note, 0 for non-positive input
    pub fn bpm_to_tempo(bpm: f64) -> u32 {
        if bpm <= 0.0 || !bpm.is_finite() {
            return 0;
        }
        (USEC_PER_MINUTE / bpm).round() as u32
    }

    /// Microseconds per quarter note to BPM, 0 for zero input
    pub fn tempo_to_bpm(tempo: u32) -> f64 {
        if tempo == 0 {
            return 0.0;
        }
        USEC_PER_MINUTE / tempo as f64
    }

    pub fn tick_to_sec(&self, tick: i64) -> f64 {
        tick as f64 * self.sec_per_tick
    }

    /// Seconds to ticks, rounded to the nearest tick
    pub fn sec_to_tick(&self, sec: f64) -> i64 {
        if self.sec_per_tick <= 0.0 {
            return 0;
        }
        (sec / self.sec_per_tick).round() as i64
    }

    /// Split a tick into (bar, beat, tick in beat), all 0-based
    pub fn tick_to_bar(&self, tick: i64) -> BarPosition {
        let ppq = self.ppq as i64;
        let bar = tick.div_euclid(self.bar_ticks);
        let rest = tick.rem_euclid(self.bar_ticks);
        BarPosition {
            bar,
            beat: rest / ppq,
            tick: rest % ppq,
        }
    }

    /// 1-based (bar, beat) for the given tick
    pub fn get_bar(&self, tick: i64) -> (i64, i64) {
        self.tick_to_bar(tick).display_pair()
    }

    /// First tick of a 0-based bar number, negative bars clamp to 0
    pub fn bar_to_tick(&self, bar: i64) -> i64 {
        self.bar_ticks * bar.max(0)
    }

    pub fn beat_to_tick(&self, beat: i64) -> i64 {
        beat * self.ppq as i64
    }

    pub fn tick_to_beat(&self, tick: i64) -> i64 {
        tick.div_euclid(self.ppq as i64)
    }

    /// Number of whole bars in a tick count
    pub fn tick_to_bars(&self, tick: i64) -> i64 {
        tick.div_euclid(self.bar_ticks)
    }

    /// Format a tick as `mm:ss.mmm` wall time at the current tempo
    pub fn format_time(&self, tick: i64) -> String {
        let total_ms = (self.tick_to_sec(tick.max(0)) * 1000.0).round() as i64;
        format!(
            "{:02}:{:02}.{:03}",
            total_ms / 60_000,
            (total_ms / 1000) % 60,
            total_ms % 1000
        )
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new(DEFAULT_PPQ)
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1} BPM, {}, {} ppq",
            self.bpm, self.time_signature, self.ppq
        )
    }
}
