//! Time-boxed recording units and the writer that produces them.
//!
//! A segment is built in memory while `Recording`, persisted in one pass when
//! its time-box ends (`Closed`), then handed to the queue. Empty time-boxes
//! and failed writes never leave this module (`Abandoned`).

mod store;
#[cfg(test)]
mod tests;
mod writer;

pub use store::{SegmentFormat, SegmentStore};
pub use writer::{SegmentWriter, TimeBoxEnd, WriterSettings};

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Identity of a segment: a monotonic sequence number plus its creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId {
    pub seq: u64,
    pub created_at: DateTime<Local>,
}

impl SegmentId {
    pub fn new(seq: u64) -> Self {
        Self {
            seq,
            created_at: Local::now(),
        }
    }
}

/// Where a segment is in its life. `Consumed` and `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    Recording,
    Closed,
    Queued,
    Delivering,
    Consumed,
    Abandoned,
}

impl SegmentState {
    pub fn label(self) -> &'static str {
        match self {
            SegmentState::Recording => "recording",
            SegmentState::Closed => "closed",
            SegmentState::Queued => "queued",
            SegmentState::Delivering => "delivering",
            SegmentState::Consumed => "consumed",
            SegmentState::Abandoned => "abandoned",
        }
    }
}

/// A closed segment persisted to storage. Owned by whoever holds it: the
/// writer until queued, then the transfer cursor, which alone may delete it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    id: SegmentId,
    path: PathBuf,
    len: u64,
    state: SegmentState,
}

impl Segment {
    pub(crate) fn closed(id: SegmentId, path: PathBuf, len: u64) -> Self {
        Self {
            id,
            path,
            len,
            state: SegmentState::Closed,
        }
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn seq(&self) -> u64 {
        self.id.seq
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte length of the persisted blob.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn state(&self) -> SegmentState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SegmentState) {
        debug!(
            seq = self.id.seq,
            from = self.state.label(),
            to = state.label(),
            "segment state changed"
        );
        self.state = state;
    }
}
