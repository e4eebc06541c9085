//! One running relay instance: storage, queue, writer, cursor and lifecycle
//! wired together, with the three operations a transport binding needs.

use crate::audio::{CaptureFormat, CaptureSource};
use crate::handoff::{self, HandoffSender};
use crate::lifecycle::{LifecycleController, SessionId};
use crate::lock_or_recover;
use crate::segment::{SegmentFormat, SegmentStore, SegmentWriter, WriterSettings};
use crate::transfer::{CursorPosition, TransferCursor};
use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

/// Library-level settings, derived from the CLI by `AppConfig::relay_config`.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub output_dir: PathBuf,
    pub capture: CaptureFormat,
    pub segment_duration: Duration,
    pub segment_format: SegmentFormat,
    pub chunk_size: usize,
    pub stop_grace: Duration,
    pub reopen_backoff: Duration,
    pub queue_warn_depth: usize,
    /// Re-queue segment files left in `output_dir` by a previous run.
    pub recover_leftovers: bool,
}

/// Snapshot of the pipeline for status output.
#[derive(Debug, Clone, Serialize)]
pub struct RelayStats {
    pub capture_active: bool,
    pub subscribers: usize,
    pub segments_queued: u64,
    pub queue_depth: usize,
    pub segments_delivered: u64,
    pub bytes_delivered: u64,
    pub segments_lost: u64,
    pub reclaim_failures: u64,
    pub delivering: Option<CursorPosition>,
}

pub struct Relay {
    lifecycle: LifecycleController<SegmentWriter>,
    cursor: Mutex<TransferCursor>,
    queue: HandoffSender,
}

impl Relay {
    pub fn new(config: RelayConfig, source: Arc<dyn CaptureSource>) -> Result<Self> {
        let store = Arc::new(SegmentStore::open(
            &config.output_dir,
            config.segment_format,
            config.capture,
        )?);
        let (queue, inbox) = handoff::channel(config.queue_warn_depth);

        let mut first_seq = 0;
        if config.recover_leftovers {
            let leftovers = store.recover()?;
            if !leftovers.is_empty() {
                info!(
                    count = leftovers.len(),
                    dir = %store.dir().display(),
                    "re-queuing segments left by a previous run"
                );
            }
            for segment in leftovers {
                first_seq = segment.seq() + 1;
                queue.push(segment);
            }
        }

        let writer = SegmentWriter::new(
            source,
            store,
            queue.clone(),
            WriterSettings {
                format: config.capture,
                segment_duration: config.segment_duration,
                reopen_backoff: config.reopen_backoff,
            },
            first_seq,
        );

        Ok(Self {
            lifecycle: LifecycleController::new(Arc::new(writer), config.stop_grace),
            cursor: Mutex::new(TransferCursor::new(inbox, config.chunk_size)),
            queue,
        })
    }

    /// A consumer session attached. Fails only if capture had to start and
    /// the capture source could not be opened.
    pub fn subscribe(&self, session: impl Into<SessionId>) -> Result<()> {
        self.lifecycle.on_subscribe(session)
    }

    pub fn unsubscribe(&self, session: impl Into<SessionId>) {
        self.lifecycle.on_unsubscribe(session)
    }

    /// Answer one transport poll with `0..=chunk_size` bytes. Never blocks on
    /// capture and never fails; empty means nothing to send right now.
    pub fn poll_chunk(&self) -> Vec<u8> {
        lock_or_recover(&self.cursor, "transfer cursor").poll()
    }

    pub fn is_capturing(&self) -> bool {
        self.lifecycle.is_capturing()
    }

    pub fn stats(&self) -> RelayStats {
        let cursor = lock_or_recover(&self.cursor, "transfer cursor");
        let transfer = cursor.stats();
        RelayStats {
            capture_active: self.lifecycle.is_capturing(),
            subscribers: self.lifecycle.subscriber_count(),
            segments_queued: self.queue.pushed(),
            queue_depth: self.queue.len(),
            segments_delivered: transfer.segments_delivered,
            bytes_delivered: transfer.bytes_delivered,
            segments_lost: transfer.segments_lost,
            reclaim_failures: transfer.reclaim_failures,
            delivering: cursor.position(),
        }
    }

    /// Detach everyone and stop capture. Queued segments stay on disk.
    pub fn shutdown(&self) {
        self.lifecycle.shutdown();
    }
}
