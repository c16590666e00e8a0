// Notifications - Status reports from the scheduler thread to the control side

use std::fmt;

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
}

/// What happened on the scheduler side
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NotificationKind {
    /// Playback reached the last event and the transport stopped
    EndOfSequence,
    /// A SetTempo command carried a non-positive or non-finite period
    TempoRejected { sec_per_tick: f64 },
}

/// A scheduler report stamped with the song position it was raised at.
///
/// The control thread drains these through the notification ring; the
/// scheduler never blocks on a full ring, so reports can be lost under load.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub tick: i64,
    pub message: String,
}

impl Notification {
    pub fn end_of_sequence(tick: i64) -> Self {
        Self {
            kind: NotificationKind::EndOfSequence,
            tick,
            message: "End of sequence".to_string(),
        }
    }

    pub fn tempo_rejected(tick: i64, sec_per_tick: f64) -> Self {
        Self {
            kind: NotificationKind::TempoRejected { sec_per_tick },
            tick,
            message: format!("Tempo ignored: {} s/tick", sec_per_tick),
        }
    }

    pub fn level(&self) -> NotificationLevel {
        match self.kind {
            NotificationKind::EndOfSequence => NotificationLevel::Info,
            NotificationKind::TempoRejected { .. } => NotificationLevel::Warning,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level() {
            NotificationLevel::Info => "info",
            NotificationLevel::Warning => "warning",
        };
        write!(f, "[{}] {} (tick {})", level, self.message, self.tick)
    }
}
