//! Transfer cursor: answers "next chunk" polls from the queued segments.
//!
//! State is one open file plus a byte offset. Each poll is answered
//! immediately with at most `chunk_size` bytes. An empty answer means nothing
//! is available right now; it carries no end-of-segment meaning, so consumers
//! that need segment boundaries must find them in the content itself (see
//! [`crate::framing`]).

use crate::handoff::HandoffReceiver;
use crate::segment::{Segment, SegmentState};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Read};
use tracing::{debug, info, warn};

/// Largest payload the transport can carry in a single read.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Running totals for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferStats {
    pub segments_delivered: u64,
    pub bytes_delivered: u64,
    pub segments_lost: u64,
    pub reclaim_failures: u64,
}

/// Segment currently being served, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CursorPosition {
    pub seq: u64,
    pub offset: u64,
    pub len: u64,
}

struct Delivery {
    segment: Segment,
    file: File,
    offset: u64,
    end: u64,
}

impl Delivery {
    /// Read the next chunk; the flag is true once the segment has no bytes left.
    fn read_chunk(&mut self, chunk_size: usize) -> io::Result<(Vec<u8>, bool)> {
        let want = self.end.saturating_sub(self.offset).min(chunk_size as u64);
        let mut chunk = Vec::with_capacity(want as usize);
        (&mut self.file).take(want).read_to_end(&mut chunk)?;
        self.offset += chunk.len() as u64;
        // A short read means the file shrank underneath us; nothing more is coming.
        let drained = self.offset >= self.end || (chunk.len() as u64) < want;
        Ok((chunk, drained))
    }
}

pub struct TransferCursor {
    inbox: HandoffReceiver,
    chunk_size: usize,
    current: Option<Delivery>,
    stats: TransferStats,
}

impl TransferCursor {
    pub fn new(inbox: HandoffReceiver, chunk_size: usize) -> Self {
        Self {
            inbox,
            chunk_size: chunk_size.max(1),
            current: None,
            stats: TransferStats::default(),
        }
    }

    /// Answer one poll.
    ///
    /// Idle: take the next queued segment (or answer empty). Delivering: return
    /// up to `chunk_size` bytes from the current offset. The segment's storage
    /// is deleted right after the read that returns its final bytes, and the
    /// cursor goes back to idle. Storage faults are logged and answered empty.
    pub fn poll(&mut self) -> Vec<u8> {
        if self.current.is_none() {
            let Some(segment) = self.inbox.try_pop() else {
                return Vec::new();
            };
            match self.begin(segment) {
                Some(delivery) => self.current = Some(delivery),
                None => return Vec::new(),
            }
        }
        let Some(delivery) = self.current.as_mut() else {
            return Vec::new();
        };

        match delivery.read_chunk(self.chunk_size) {
            Ok((chunk, drained)) => {
                self.stats.bytes_delivered += chunk.len() as u64;
                if drained {
                    if let Some(done) = self.current.take() {
                        self.finish(done);
                    }
                }
                chunk
            }
            Err(err) => {
                if let Some(broken) = self.current.take() {
                    warn!(
                        seq = broken.segment.seq(),
                        offset = broken.offset,
                        "segment read failed, dropping it: {err}"
                    );
                    self.stats.segments_lost += 1;
                    self.reclaim(broken.segment);
                }
                Vec::new()
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    pub fn position(&self) -> Option<CursorPosition> {
        self.current.as_ref().map(|delivery| CursorPosition {
            seq: delivery.segment.seq(),
            offset: delivery.offset,
            len: delivery.end,
        })
    }

    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    fn begin(&mut self, mut segment: Segment) -> Option<Delivery> {
        let file = match File::open(segment.path()) {
            Ok(file) => file,
            Err(err) => {
                warn!(
                    seq = segment.seq(),
                    path = %segment.path().display(),
                    "segment storage unavailable, skipping: {err}"
                );
                self.stats.segments_lost += 1;
                self.reclaim(segment);
                return None;
            }
        };
        let end = file
            .metadata()
            .map(|metadata| metadata.len())
            .unwrap_or_else(|_| segment.len());
        segment.set_state(SegmentState::Delivering);
        info!(seq = segment.seq(), bytes = end, "segment delivery started");
        Some(Delivery {
            segment,
            file,
            offset: 0,
            end,
        })
    }

    fn finish(&mut self, delivery: Delivery) {
        let Delivery {
            mut segment,
            file,
            offset,
            ..
        } = delivery;
        drop(file);
        segment.set_state(SegmentState::Consumed);
        self.stats.segments_delivered += 1;
        info!(seq = segment.seq(), bytes = offset, "segment delivered");
        self.reclaim(segment);
    }

    /// Delete a segment's storage. Takes the segment by value so it can only
    /// happen once. Failures leak the file rather than stall the pipeline.
    fn reclaim(&mut self, segment: Segment) {
        match fs::remove_file(segment.path()) {
            Ok(()) => debug!(seq = segment.seq(), "segment storage reclaimed"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                self.stats.reclaim_failures += 1;
                warn!(
                    seq = segment.seq(),
                    path = %segment.path().display(),
                    "failed to delete delivered segment: {err}"
                );
            }
        }
    }
}
