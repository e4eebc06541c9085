//! Hand-off queue between the capture thread and the poll-driven cursor.
//!
//! Strict FIFO in completion order. Neither side ever blocks: `push` appends
//! to an unbounded channel and `try_pop` returns immediately. A slow consumer
//! makes the queue grow, which is logged but not treated as an error.

use crate::segment::{Segment, SegmentState};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Create a connected sender/receiver pair. `warn_depth` is the queue length
/// at which each further push logs a backpressure warning.
pub fn channel(warn_depth: usize) -> (HandoffSender, HandoffReceiver) {
    let (tx, rx) = unbounded();
    let pushed = Arc::new(AtomicU64::new(0));
    (
        HandoffSender {
            tx,
            pushed,
            warn_depth: warn_depth.max(1),
        },
        HandoffReceiver { rx },
    )
}

#[derive(Debug, Clone)]
pub struct HandoffSender {
    tx: Sender<Segment>,
    pushed: Arc<AtomicU64>,
    warn_depth: usize,
}

impl HandoffSender {
    /// Queue a closed segment behind everything already queued.
    pub fn push(&self, mut segment: Segment) {
        segment.set_state(SegmentState::Queued);
        let seq = segment.seq();
        if let Err(err) = self.tx.send(segment) {
            // Receiver gone: the file stays on disk and is recovered on restart.
            warn!(seq, path = %err.0.path().display(), "hand-off queue closed; segment left in storage");
            return;
        }
        self.pushed.fetch_add(1, Ordering::Relaxed);
        let depth = self.tx.len();
        if depth >= self.warn_depth {
            warn!(seq, depth, "hand-off queue backing up; consumer is slower than capture");
        } else {
            debug!(seq, depth, "segment queued");
        }
    }

    /// Segments currently waiting.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    /// Total segments ever accepted.
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct HandoffReceiver {
    rx: Receiver<Segment>,
}

impl HandoffReceiver {
    /// Oldest queued segment, or `None` if nothing is waiting.
    pub fn try_pop(&self) -> Option<Segment> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
