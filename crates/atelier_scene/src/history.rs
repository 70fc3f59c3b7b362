// SPDX-License-Identifier: MIT OR Apache-2.0
//! Undo/redo history built on whole-scene snapshots.
//!
//! `history` holds past states, most recent last. `future` holds undone
//! states, the next one to redo first. Pushing a new snapshot clears
//! `future`; anything older than [`MAX_HISTORY`] entries is dropped for good.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::scene::SceneError;

/// Maximum undo history depth
pub const MAX_HISTORY: usize = 20;

/// History errors
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Nothing to undo
    #[error("Nothing to undo")]
    NothingToUndo,

    /// Nothing to redo
    #[error("Nothing to redo")]
    NothingToRedo,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Snapshot decoded into a tree that breaks an invariant
    #[error("Corrupt snapshot: {0}")]
    Corrupt(#[from] SceneError),
}

/// Result type for history operations
pub type Result<T> = std::result::Result<T, HistoryError>;

/// Serialized state of the whole tree at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Serialized state
    pub data: Vec<u8>,
    /// Timestamp when snapshot was taken
    pub timestamp: u64,
    /// Size in bytes
    pub size: usize,
}

impl Snapshot {
    /// Create a new snapshot from raw bytes
    pub fn new(data: Vec<u8>) -> Self {
        let size = data.len();
        Self {
            data,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            size,
        }
    }

    /// Create from serializable value
    pub fn from_value<T: Serialize>(value: &T) -> Result<Self> {
        let data = bincode::serialize(value)?;
        Ok(Self::new(data))
    }

    /// Deserialize to value
    pub fn to_value<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        Ok(bincode::deserialize(&self.data)?)
    }
}

/// A snapshot plus the label of the operation it brackets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Human-readable description
    pub label: String,
    /// Stored state
    pub snapshot: Snapshot,
}

/// History statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    /// Entries available to undo
    pub undo_count: usize,
    /// Entries available to redo
    pub redo_count: usize,
    /// Total memory used by stored snapshots (bytes)
    pub memory_used: usize,
    /// Maximum history depth
    pub max_depth: usize,
}

/// Undo/redo snapshot stacks
#[derive(Debug)]
pub struct History {
    /// Past states, most recent last
    history: VecDeque<HistoryEntry>,
    /// Undone states, next redo first
    future: VecDeque<HistoryEntry>,
    /// Maximum history depth
    max_depth: usize,
}

impl History {
    /// Create a new history manager
    pub fn new() -> Self {
        Self::with_max_depth(MAX_HISTORY)
    }

    /// Create with custom maximum depth
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            history: VecDeque::new(),
            future: VecDeque::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Record the state before an operation. Clears the redo stack.
    pub fn push(&mut self, label: impl Into<String>, snapshot: Snapshot) {
        self.future.clear();
        self.history.push_back(HistoryEntry {
            label: label.into(),
            snapshot,
        });

        while self.history.len() > self.max_depth {
            if let Some(dropped) = self.history.pop_front() {
                tracing::debug!("History full, dropping '{}'", dropped.label);
            }
        }
    }

    /// State an undo would restore
    pub fn peek_undo(&self) -> Option<&Snapshot> {
        self.history.back().map(|e| &e.snapshot)
    }

    /// State a redo would restore
    pub fn peek_redo(&self) -> Option<&Snapshot> {
        self.future.front().map(|e| &e.snapshot)
    }

    /// Step back: `current` goes to the front of the redo stack and the
    /// most recent past state is returned.
    pub fn undo(&mut self, current: Snapshot) -> Result<Snapshot> {
        let entry = self.history.pop_back().ok_or(HistoryError::NothingToUndo)?;
        self.future.push_front(HistoryEntry {
            label: entry.label,
            snapshot: current,
        });
        Ok(entry.snapshot)
    }

    /// Step forward: `current` goes back onto the undo stack and the next
    /// undone state is returned.
    pub fn redo(&mut self, current: Snapshot) -> Result<Snapshot> {
        let entry = self.future.pop_front().ok_or(HistoryError::NothingToRedo)?;
        self.history.push_back(HistoryEntry {
            label: entry.label,
            snapshot: current,
        });
        while self.history.len() > self.max_depth {
            self.history.pop_front();
        }
        Ok(entry.snapshot)
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Get undo stack depth
    pub fn undo_depth(&self) -> usize {
        self.history.len()
    }

    /// Get redo stack depth
    pub fn redo_depth(&self) -> usize {
        self.future.len()
    }

    /// Clear all history
    pub fn clear(&mut self) {
        self.history.clear();
        self.future.clear();
    }

    /// Get history statistics
    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            undo_count: self.history.len(),
            redo_count: self.future.len(),
            memory_used: self
                .history
                .iter()
                .chain(self.future.iter())
                .map(|e| e.snapshot.size)
                .sum(),
            max_depth: self.max_depth,
        }
    }

    /// Get description of next undo operation
    pub fn undo_description(&self) -> Option<&str> {
        self.history.back().map(|e| e.label.as_str())
    }

    /// Get description of next redo operation
    pub fn redo_description(&self) -> Option<&str> {
        self.future.front().map(|e| e.label.as_str())
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

    fn snap(value: u32) -> Snapshot {
        Snapshot::from_value(&value).unwrap()
    }

    #[test]
    fn test_undo_redo_order() {
        let mut history = History::new();
        history.push("one", snap(1));
        history.push("two", snap(2));

        let restored: u32 = history.undo(snap(3)).unwrap().to_value().unwrap();
        assert_eq!(restored, 2);
        assert_eq!(history.redo_description(), Some("two"));

        let forward: u32 = history.redo(snap(2)).unwrap().to_value().unwrap();
        assert_eq!(forward, 3);
        assert_eq!(history.undo_depth(), 2);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_push_clears_future() {
        let mut history = History::new();
        history.push("one", snap(1));
        history.undo(snap(2)).unwrap();
        assert!(history.can_redo());

        history.push("branch", snap(1));
        assert!(!history.can_redo());
    }

    #[test]
    fn test_depth_bound() {
        let mut history = History::new();
        for i in 0..25 {
            history.push(format!("op {i}"), snap(i));
        }
        assert_eq!(history.undo_depth(), MAX_HISTORY);
        assert_eq!(history.undo_description(), Some("op 24"));

        let mut last = 0;
        while history.can_undo() {
            last = history.undo(snap(99)).unwrap().to_value().unwrap();
        }
        assert_eq!(last, 5);
    }

    #[test]
    fn test_empty_stacks() {
        let mut history = History::new();
        assert!(matches!(history.undo(snap(0)), Err(HistoryError::NothingToUndo)));
        assert!(matches!(history.redo(snap(0)), Err(HistoryError::NothingToRedo)));
        assert_eq!(history.stats().memory_used, 0);
    }
}
