// Sequencer module - Time base, tracks, timeline and the real-time player
// The engine runs on its own thread; everything else edits the shared sequence

pub mod clock;
pub mod edit;
pub mod engine;
pub mod metronome;
pub mod player;
pub mod quantize;
pub mod recorder;
pub mod scheduler;
pub mod sequence;
pub mod timebase;
pub mod timeline;
pub mod track;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use edit::Clipboard;
pub use engine::{Engine, EngineStatus};
pub use metronome::{ClickType, Metronome};
pub use player::{Player, PlayerError, PlayerOptions};
pub use recorder::{RecordMode, RecordTake, Recorder};
pub use scheduler::{Scheduler, SchedulerTiming};
pub use sequence::{Sequence, SequenceSummary, SharedSequence};
pub use timebase::{BarPosition, TimeBase, TimeSignature};
pub use timeline::Timeline;
pub use track::{RepeatingTrack, Track};
pub use transport::{PlaybackState, TransportState};
