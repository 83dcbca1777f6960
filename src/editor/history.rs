//! Linear undo/redo over [`EditState`] snapshots.
//!
//! The history always holds at least one snapshot. Applying a patch after an
//! undo discards every snapshot past the cursor; there is no branching.

use super::state::{EditPatch, EditState};

/// Maximum number of snapshots kept; the oldest is dropped beyond this.
pub const MAX_HISTORY: usize = 500;

#[derive(Debug, Clone)]
pub struct EditHistory {
    snapshots: Vec<EditState>,
    cursor: usize,
}

impl EditHistory {
    pub fn new(initial: EditState) -> Self {
        EditHistory {
            snapshots: vec![initial],
            cursor: 0,
        }
    }

    pub fn current(&self) -> &EditState {
        &self.snapshots[self.cursor]
    }

    /// Merges `patch` into the current snapshot and makes the result current.
    pub fn apply(&mut self, patch: &EditPatch) -> &EditState {
        let next = self.current().merge(patch);
        self.snapshots.truncate(self.cursor + 1);
        self.snapshots.push(next);
        if self.snapshots.len() > MAX_HISTORY {
            self.snapshots.remove(0);
        }
        self.cursor = self.snapshots.len() - 1;
        self.current()
    }

    /// Steps back one snapshot. Returns `None` when already at the oldest.
    pub fn undo(&mut self) -> Option<&EditState> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(self.current())
    }

    /// Steps forward one snapshot. Returns `None` when already at the newest.
    pub fn redo(&mut self) -> Option<&EditState> {
        if self.cursor + 1 >= self.snapshots.len() {
            return None;
        }
        self.cursor += 1;
        Some(self.current())
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl Default for EditHistory {
    fn default() -> Self {
        EditHistory::new(EditState::default())
    }
}
