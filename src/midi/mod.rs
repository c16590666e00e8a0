// MIDI - Event model, file format, ports and the sound sink seam

pub mod device;
pub mod event;
pub mod file;
pub mod input;
pub mod output;
pub mod sink;
