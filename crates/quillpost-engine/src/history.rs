//! Snapshot-based undo/redo.
//!
//! Every transaction stores a pre-edit snapshot of the whole document plus
//! the selection, captured as (leaf-section-index, offset) pairs. These
//! stay stable across restoration because they are re-resolved by walking
//! the restored tree rather than holding section handles. Consecutive
//! snapshots sharing an edit-action tag within the grouping timeout
//! collapse into one undo step. The stacks are fixed-capacity ring
//! buffers; the oldest entries are silently evicted.

use std::collections::VecDeque;

use log::debug;

use crate::codec::DocumentValue;
use crate::cursor::{Position, Range};
use crate::model::Post;

/// Tag describing what kind of edit a transaction performed, used to group
/// consecutive snapshots (e.g. repeated typing) into one undo step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditAction {
    InsertText,
    DeleteText,
}

/// Selection endpoints captured as (leaf-section-index, offset) pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotRange {
    pub head: (usize, usize),
    pub tail: (usize, usize),
}

/// An immutable capture of the document and selection at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub taken_at_ms: u64,
    pub document: DocumentValue,
    pub range: Option<SnapshotRange>,
    pub action: Option<EditAction>,
}

impl Snapshot {
    /// Whether a later snapshot continues this one's undo group.
    fn groups_with(&self, next: &Snapshot, grouping_ms: u64) -> bool {
        self.action.is_some()
            && self.action == next.action
            && next.taken_at_ms.saturating_sub(self.taken_at_ms) < grouping_ms
    }
}

/// Undo/redo stacks over pre-edit snapshots.
pub struct EditHistory {
    undo_stack: VecDeque<Snapshot>,
    redo_stack: VecDeque<Snapshot>,
    pending: Option<Snapshot>,
    depth: usize,
    grouping_ms: u64,
}

impl EditHistory {
    pub fn new(depth: usize, grouping_ms: u64) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            pending: None,
            depth,
            grouping_ms,
        }
    }

    pub fn has_undo(&self) -> bool {
        !self.undo_stack.is_empty() || self.pending.is_some()
    }

    pub fn has_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Record the pre-edit snapshot of a beginning transaction. A snapshot
    /// that groups with the pending one is dropped so the whole burst
    /// becomes a single undo step; otherwise the pending snapshot moves to
    /// the undo stack. New edits always invalidate the redo stack.
    pub fn store_snapshot(&mut self, snapshot: Snapshot) {
        self.redo_stack.clear();
        match &self.pending {
            Some(pending) if pending.groups_with(&snapshot, self.grouping_ms) => {}
            Some(_) => {
                let pending = self.pending.take().expect("pending snapshot vanished");
                self.push_undo(pending);
                self.pending = Some(snapshot);
            }
            None => self.pending = Some(snapshot),
        }
    }

    /// Drop the pending snapshot: the transaction that stored it must not
    /// be independently undoable.
    pub fn cancel_pending(&mut self) {
        self.pending = None;
    }

    /// Pop the undo stack, pushing `current` (the live document state) onto
    /// the redo stack. Returns the snapshot to restore.
    pub fn step_backward(&mut self, current: Snapshot) -> Option<Snapshot> {
        if let Some(pending) = self.pending.take() {
            self.push_undo(pending);
        }
        let snapshot = self.undo_stack.pop_back()?;
        self.push_redo(current);
        Some(snapshot)
    }

    /// Pop the redo stack, pushing `current` onto the undo stack. Returns
    /// the snapshot to restore.
    pub fn step_forward(&mut self, current: Snapshot) -> Option<Snapshot> {
        self.pending = None;
        let snapshot = self.redo_stack.pop_back()?;
        self.push_undo(current);
        Some(snapshot)
    }

    fn push_undo(&mut self, snapshot: Snapshot) {
        if self.undo_stack.len() == self.depth {
            debug!("undo depth {} reached; evicting oldest snapshot", self.depth);
            self.undo_stack.pop_front();
        }
        self.undo_stack.push_back(snapshot);
    }

    fn push_redo(&mut self, snapshot: Snapshot) {
        if self.redo_stack.len() == self.depth {
            self.redo_stack.pop_front();
        }
        self.redo_stack.push_back(snapshot);
    }
}

// ============ Range capture / restore ============

/// Capture a range as leaf-section-index pairs, or None for blank ranges or
/// ranges addressing dead sections.
pub fn capture_range(post: &Post, range: &Range) -> Option<SnapshotRange> {
    let leaves = post.leaf_sections();
    let resolve = |position: &Position| -> Option<(usize, usize)> {
        let section = position.section()?;
        let index = leaves.iter().position(|s| *s == section)?;
        Some((index, position.offset()))
    };
    Some(SnapshotRange {
        head: resolve(&range.head)?,
        tail: resolve(&range.tail)?,
    })
}

/// Re-resolve captured endpoints against a (restored) document, clamping
/// offsets to the live section lengths.
pub fn restore_range(post: &Post, range: &SnapshotRange) -> Range {
    let leaves = post.leaf_sections();
    let resolve = |(index, offset): (usize, usize)| -> Position {
        match leaves.get(index) {
            Some(section) => Position::new(*section, offset.min(post.section_length(*section))),
            None => post.tail_position(),
        }
    };
    Range::new(resolve(range.head), resolve(range.tail))
}
