//! Snapshot-based undo/redo
//!
//! Holds an ordered list of snapshots plus a cursor. The cursor is always a
//! valid index. Committing while the cursor is behind the tip drops the redo
//! tail first.

use tracing::debug;

#[derive(Debug, Clone)]
pub struct History<T: Clone> {
    snapshots: Vec<T>,
    cursor: usize,
    /// Set while a snapshot is being restored, so the restore does not
    /// record itself as a new commit
    replaying: bool,
}

impl<T: Clone> History<T> {
    /// Start a history whose snapshot 0 is `initial`
    pub fn new(initial: T) -> Self {
        Self {
            snapshots: vec![initial],
            cursor: 0,
            replaying: false,
        }
    }

    /// Record `state` as the newest snapshot. Returns `false` (and records
    /// nothing) while a replay is in progress.
    pub fn commit(&mut self, state: T) -> bool {
        if self.replaying {
            debug!("Ignoring commit during history replay");
            return false;
        }
        self.snapshots.truncate(self.cursor + 1);
        self.snapshots.push(state);
        self.cursor = self.snapshots.len() - 1;
        true
    }

    /// Step back one snapshot. No-op at snapshot 0.
    pub fn undo(&mut self) -> Option<&T> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        self.snapshots.get(self.cursor)
    }

    pub fn redo(&mut self) -> Option<&T> {
        if self.cursor + 1 >= self.snapshots.len() {
            return None;
        }
        self.cursor += 1;
        self.snapshots.get(self.cursor)
    }

    /// Mark the start of a snapshot restore
    pub fn begin_replay(&mut self) {
        self.replaying = true;
    }

    pub fn end_replay(&mut self) {
        self.replaying = false;
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    pub fn current(&self) -> &T {
        // cursor < len is maintained by every mutation
        &self.snapshots[self.cursor]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }
}
