// Transport - Playback state shared between control and scheduler threads
// Single-word flags and the play position are atomics; no lock needed to read them

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Transport state (play/stop/record)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Recording,
    Paused,
}

impl TransportState {
    /// Check if transport is in a playing state (Playing or Recording)
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing | TransportState::Recording)
    }

    /// Check if transport is recording
    pub fn is_recording(&self) -> bool {
        matches!(self, TransportState::Recording)
    }

    /// Check if transport is stopped or paused
    pub fn is_stopped(&self) -> bool {
        matches!(self, TransportState::Stopped | TransportState::Paused)
    }
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TransportState::Stopped => "stopped",
            TransportState::Playing => "playing",
            TransportState::Recording => "recording",
            TransportState::Paused => "paused",
        };
        f.write_str(label)
    }
}

/// Shared playback state
///
/// Written by the control thread (transport requests) and by the scheduler
/// thread (`parked`, `current_tick`, end of data). `clicking` is an overlay
/// that can be set in any transport state; `recording` is only meaningful
/// while playing.
#[derive(Debug)]
pub struct PlaybackState {
    running: AtomicBool,
    playing: AtomicBool,
    paused: AtomicBool,
    recording: AtomicBool,
    clicking: AtomicBool,
    // Control thread asks the scheduler to re-anchor its clock
    start_request: AtomicBool,
    // Scheduler has observed that nothing is active
    parked: AtomicBool,
    current_tick: AtomicI64,
}

impl PlaybackState {
    /// Create new shared playback state
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get current transport state
    pub fn state(&self) -> TransportState {
        let playing = self.is_playing();
        if playing && self.is_recording() {
            TransportState::Recording
        } else if playing {
            TransportState::Playing
        } else if self.is_paused() {
            TransportState::Paused
        } else {
            TransportState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::Release);
    }

    pub fn is_clicking(&self) -> bool {
        self.clicking.load(Ordering::Acquire)
    }

    pub fn set_clicking(&self, clicking: bool) {
        self.clicking.store(clicking, Ordering::Release);
    }

    /// Playing or clicking: the scheduler has work to do
    pub fn is_active(&self) -> bool {
        self.is_playing() || self.is_clicking()
    }

    /// Ask the scheduler to re-anchor on its next iteration
    pub fn request_start(&self) {
        self.start_request.store(true, Ordering::Release);
    }

    /// Consume a pending start request
    pub fn take_start_request(&self) -> bool {
        self.start_request.swap(false, Ordering::AcqRel)
    }

    pub fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Acquire)
    }

    pub fn set_parked(&self, parked: bool) {
        self.parked.store(parked, Ordering::Release);
    }

    /// Last position published by the scheduler, in ticks
    pub fn current_tick(&self) -> i64 {
        self.current_tick.load(Ordering::Relaxed)
    }

    pub fn set_current_tick(&self, tick: i64) {
        self.current_tick.store(tick, Ordering::Relaxed);
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            running: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            recording: AtomicBool::new(false),
            clicking: AtomicBool::new(false),
            start_request: AtomicBool::new(false),
            parked: AtomicBool::new(true),
            current_tick: AtomicI64::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_state_helpers() {
        assert!(TransportState::Playing.is_playing());
        assert!(TransportState::Recording.is_playing());
        assert!(TransportState::Recording.is_recording());
        assert!(TransportState::Paused.is_stopped());
        assert!(!TransportState::Playing.is_stopped());
        assert_eq!(TransportState::default(), TransportState::Stopped);
    }

    #[test]
    fn test_state_priority() {
        let state = PlaybackState::new();
        assert_eq!(state.state(), TransportState::Stopped);

        state.set_paused(true);
        assert_eq!(state.state(), TransportState::Paused);

        state.set_paused(false);
        state.set_playing(true);
        assert_eq!(state.state(), TransportState::Playing);

        state.set_recording(true);
        assert_eq!(state.state(), TransportState::Recording);

        // Recording flag alone does not mean recording
        state.set_playing(false);
        assert_eq!(state.state(), TransportState::Stopped);
    }

    #[test]
    fn test_click_overlay_is_independent() {
        let state = PlaybackState::new();
        state.set_clicking(true);
        assert!(state.is_active());
        assert_eq!(state.state(), TransportState::Stopped);
    }

    #[test]
    fn test_start_request_consumed_once() {
        let state = PlaybackState::new();
        assert!(!state.take_start_request());
        state.request_start();
        assert!(state.take_start_request());
        assert!(!state.take_start_request());
    }

    #[test]
    fn test_parked_by_default() {
        let state = PlaybackState::new();
        assert!(state.is_parked());
        assert!(!state.is_running());
    }
}
