// History - Snapshot based undo/redo for sequence edits

use crate::sequencer::sequence::Sequence;
use std::collections::VecDeque;

/// Default maximum number of snapshots to keep
const DEFAULT_MAX_HISTORY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,
}

/// State of the sequence before an edit
#[derive(Debug, Clone)]
struct Snapshot {
    description: String,
    sequence: Sequence,
}

/// Undo and redo stacks of whole-sequence snapshots
///
/// An edit records the state it is about to replace. Undoing swaps the
/// current sequence with the top of the undo stack; the replaced state goes
/// on the redo stack. A new edit clears the redo stack.
///
/// # Memory Management
/// When the limit is reached, the oldest snapshot is dropped.
#[derive(Debug, Clone)]
pub struct History {
    undo_stack: VecDeque<Snapshot>,
    redo_stack: VecDeque<Snapshot>,
    max_history: usize,
}

impl History {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_HISTORY)
    }

    /// History with a custom limit (at least one level)
    pub fn with_capacity(max_history: usize) -> Self {
        let max_history = max_history.max(1);
        Self {
            undo_stack: VecDeque::with_capacity(max_history),
            redo_stack: VecDeque::new(),
            max_history,
        }
    }

    /// Remember `before` as the state preceding the edit `description`
    pub fn record(&mut self, description: impl Into<String>, before: &Sequence) {
        self.undo_stack.push_back(Snapshot {
            description: description.into(),
            sequence: before.clone(),
        });
        self.redo_stack.clear();
        if self.undo_stack.len() > self.max_history {
            self.undo_stack.pop_front();
        }
    }

    /// Restore the state before the last edit into `current`
    /// Returns the description of the undone edit.
    pub fn undo(&mut self, current: &mut Sequence) -> Result<String, HistoryError> {
        let snapshot = self
            .undo_stack
            .pop_back()
            .ok_or(HistoryError::NothingToUndo)?;
        let replaced = std::mem::replace(current, snapshot.sequence);
        self.redo_stack.push_back(Snapshot {
            description: snapshot.description.clone(),
            sequence: replaced,
        });
        Ok(snapshot.description)
    }

    /// Re-apply the last undone edit into `current`
    pub fn redo(&mut self, current: &mut Sequence) -> Result<String, HistoryError> {
        let snapshot = self
            .redo_stack
            .pop_back()
            .ok_or(HistoryError::NothingToRedo)?;
        let replaced = std::mem::replace(current, snapshot.sequence);
        self.undo_stack.push_back(Snapshot {
            description: snapshot.description.clone(),
            sequence: replaced,
        });
        Ok(snapshot.description)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|s| s.description.as_str())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.back().map(|s| s.description.as_str())
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::event::Event;

    fn edit(history: &mut History, seq: &mut Sequence, note: u8) {
        history.record(format!("add {}", note), seq);
        seq.track_mut(1).unwrap().add_ev(Event::note_on(0, 0, note, 100));
    }

    #[test]
    fn test_undo_redo_roundtrip() {
        let mut seq = Sequence::with_tracks(120, 120.0, 1);
        let mut history = History::new();
        edit(&mut history, &mut seq, 60);
        edit(&mut history, &mut seq, 62);
        assert_eq!(seq.track(1).unwrap().note_count(), 2);

        assert_eq!(history.undo(&mut seq).unwrap(), "add 62");
        assert_eq!(seq.track(1).unwrap().note_count(), 1);
        assert!(history.can_redo());

        assert_eq!(history.redo(&mut seq).unwrap(), "add 62");
        assert_eq!(seq.track(1).unwrap().note_count(), 2);
        assert_eq!(history.undo_description(), Some("add 62"));
    }

    #[test]
    fn test_empty_stacks() {
        let mut seq = Sequence::default();
        let mut history = History::new();
        assert_eq!(history.undo(&mut seq), Err(HistoryError::NothingToUndo));
        assert_eq!(history.redo(&mut seq), Err(HistoryError::NothingToRedo));
    }

    #[test]
    fn test_new_edit_clears_redo() {
        let mut seq = Sequence::with_tracks(120, 120.0, 1);
        let mut history = History::new();
        edit(&mut history, &mut seq, 60);
        history.undo(&mut seq).unwrap();
        edit(&mut history, &mut seq, 64);
        assert!(!history.can_redo());
        assert_eq!(history.redo_count(), 0);
    }

    #[test]
    fn test_limit_drops_oldest() {
        let mut seq = Sequence::with_tracks(120, 120.0, 1);
        let mut history = History::with_capacity(3);
        for note in 60..66 {
            edit(&mut history, &mut seq, note);
        }
        assert_eq!(history.undo_count(), 3);
        history.undo(&mut seq).unwrap();
        history.undo(&mut seq).unwrap();
        history.undo(&mut seq).unwrap();
        assert_eq!(seq.track(1).unwrap().note_count(), 3);
        assert!(!history.can_undo());
    }
}
