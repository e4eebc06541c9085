//! Segment writer: the dedicated capture thread that turns a block stream
//! into time-boxed segments and publishes each one as soon as it is closed.

use super::{SegmentId, SegmentState, SegmentStore};
use crate::audio::{CaptureFormat, CaptureSource, CaptureStream};
use crate::handoff::HandoffSender;
use crate::lock_or_recover;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Granularity of the stop check while waiting to reopen a failed device.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Explains why a time-box ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeBoxEnd {
    /// The configured duration's worth of blocks was read.
    Elapsed,
    /// `stop()` was observed between reads.
    Stopped,
    /// The source returned a short block.
    StreamEnded,
    ReadFailed(String),
}

impl TimeBoxEnd {
    pub fn label(&self) -> &'static str {
        match self {
            TimeBoxEnd::Elapsed => "elapsed",
            TimeBoxEnd::Stopped => "stopped",
            TimeBoxEnd::StreamEnded => "stream_ended",
            TimeBoxEnd::ReadFailed(_) => "read_failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WriterSettings {
    pub format: CaptureFormat,
    pub segment_duration: Duration,
    /// Wait between attempts to reopen the source after a read failure.
    pub reopen_backoff: Duration,
}

/// Producer side of the pipeline. `start`/`stop` are idempotent; at most one
/// capture thread exists at a time and it owns the capture stream.
pub struct SegmentWriter {
    source: Arc<dyn CaptureSource>,
    store: Arc<SegmentStore>,
    queue: HandoffSender,
    settings: WriterSettings,
    next_seq: Arc<AtomicU64>,
    worker: Mutex<Option<CaptureWorker>>,
}

struct CaptureWorker {
    stop_flag: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl SegmentWriter {
    /// `first_seq` is the sequence number given to the first new segment.
    pub fn new(
        source: Arc<dyn CaptureSource>,
        store: Arc<SegmentStore>,
        queue: HandoffSender,
        settings: WriterSettings,
        first_seq: u64,
    ) -> Self {
        Self {
            source,
            store,
            queue,
            settings,
            next_seq: Arc::new(AtomicU64::new(first_seq)),
            worker: Mutex::new(None),
        }
    }

    /// Open the capture source and spawn the capture thread.
    ///
    /// A no-op (with a warning) if capture is already running. Failing to open
    /// the source is the one error this pipeline surfaces to its caller.
    pub fn start(&self) -> Result<()> {
        let mut worker = lock_or_recover(&self.worker, "segment writer start");
        if let Some(active) = worker.as_ref() {
            if !active.handle.is_finished() {
                warn!("capture already active; start ignored");
                return Ok(());
            }
        }
        if let Some(stale) = worker.take() {
            if stale.handle.join().is_err() {
                error!("previous segment writer thread panicked");
            }
        }

        let stream = self
            .source
            .open(&self.settings.format)
            .context("failed to open capture source")?;
        let stop_flag = Arc::new(AtomicBool::new(false));
        let capture = CaptureLoop {
            source: self.source.clone(),
            store: self.store.clone(),
            queue: self.queue.clone(),
            settings: self.settings.clone(),
            next_seq: self.next_seq.clone(),
            stop_flag: stop_flag.clone(),
        };
        let handle = thread::Builder::new()
            .name("segment-writer".to_string())
            .spawn(move || capture.run(stream))
            .context("failed to spawn segment writer thread")?;

        *worker = Some(CaptureWorker { stop_flag, handle });
        info!(
            segment_ms = self.settings.segment_duration.as_millis() as u64,
            "capture started"
        );
        Ok(())
    }

    /// Ask the capture thread to finish its current block and wait for it to
    /// flush or abandon the open segment. A no-op if capture is not running.
    pub fn stop(&self) {
        let mut worker = lock_or_recover(&self.worker, "segment writer stop");
        let Some(active) = worker.take() else {
            debug!("capture already stopped; stop ignored");
            return;
        };
        active.stop_flag.store(true, Ordering::SeqCst);
        if active.handle.join().is_err() {
            error!("segment writer thread panicked");
        }
        info!("capture stopped");
    }

    /// True while a capture thread is running. A thread that exited on its
    /// own (panicked) no longer counts, so the next `start()` replaces it.
    pub fn is_active(&self) -> bool {
        lock_or_recover(&self.worker, "segment writer status")
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A segment while it is `Recording`: blocks gathered in memory until the
/// time-box ends.
pub(super) struct TimeBox {
    id: SegmentId,
    expected_blocks: usize,
    blocks: usize,
    pcm: Vec<u8>,
    state: SegmentState,
}

impl TimeBox {
    pub(super) fn begin(id: SegmentId, expected_blocks: usize, block_bytes: usize) -> Self {
        Self {
            id,
            expected_blocks: expected_blocks.max(1),
            blocks: 0,
            pcm: Vec::with_capacity(expected_blocks.saturating_mul(block_bytes)),
            state: SegmentState::Recording,
        }
    }

    pub(super) fn push(&mut self, block: Vec<u8>) {
        self.blocks += 1;
        self.pcm.extend(block);
    }

    pub(super) fn is_full(&self) -> bool {
        self.blocks >= self.expected_blocks
    }

    pub(super) fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    pub(super) fn blocks(&self) -> usize {
        self.blocks
    }

    pub(super) fn state(&self) -> SegmentState {
        self.state
    }

    /// Discard the captured data; the segment never reaches storage.
    pub(super) fn abandon(&mut self) {
        self.state = SegmentState::Abandoned;
        self.pcm = Vec::new();
    }
}

struct CaptureLoop {
    source: Arc<dyn CaptureSource>,
    store: Arc<SegmentStore>,
    queue: HandoffSender,
    settings: WriterSettings,
    next_seq: Arc<AtomicU64>,
    stop_flag: Arc<AtomicBool>,
}

impl CaptureLoop {
    fn run(self, stream: Box<dyn CaptureStream>) {
        let block_bytes = self.settings.format.block_bytes();
        let blocks_per_segment = self.settings.format.blocks_for(self.settings.segment_duration);
        let mut stream = Some(stream);

        while !self.stopped() {
            if stream.is_none() {
                stream = self.reopen();
                continue;
            }
            let Some(active) = stream.as_mut() else {
                continue;
            };

            let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
            let mut time_box = TimeBox::begin(SegmentId::new(seq), blocks_per_segment, block_bytes);
            debug!(
                seq,
                blocks = blocks_per_segment,
                state = time_box.state().label(),
                "segment started"
            );
            let end = self.fill(active.as_mut(), &mut time_box, block_bytes);
            self.close(time_box, &end);

            match end {
                TimeBoxEnd::Elapsed => {}
                TimeBoxEnd::Stopped => break,
                TimeBoxEnd::StreamEnded | TimeBoxEnd::ReadFailed(_) => {
                    if let Some(broken) = stream.take() {
                        broken.close();
                    }
                }
            }
        }

        if let Some(stream) = stream {
            stream.close();
        }
    }

    fn stopped(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }

    /// Read blocks until the time-box is full or stop is requested. The stop
    /// flag is only checked between reads.
    fn fill(&self, stream: &mut dyn CaptureStream, time_box: &mut TimeBox, block_bytes: usize) -> TimeBoxEnd {
        while !time_box.is_full() {
            if self.stopped() {
                return TimeBoxEnd::Stopped;
            }
            match stream.read_block() {
                Ok(block) => {
                    let short = block.len() < block_bytes;
                    if !block.is_empty() {
                        time_box.push(block);
                    }
                    if short {
                        return TimeBoxEnd::StreamEnded;
                    }
                }
                Err(err) => return TimeBoxEnd::ReadFailed(format!("{err:#}")),
            }
        }
        TimeBoxEnd::Elapsed
    }

    /// Persist and publish a non-empty time-box; abandon everything else.
    fn close(&self, mut time_box: TimeBox, end: &TimeBoxEnd) {
        let seq = time_box.id.seq;
        let blocks = time_box.blocks();
        if let TimeBoxEnd::ReadFailed(err) = end {
            warn!(seq, blocks, "capture read failed: {err}");
        }
        if time_box.is_empty() {
            time_box.abandon();
            debug!(
                seq,
                state = time_box.state().label(),
                reason = end.label(),
                "no blocks captured"
            );
            return;
        }

        let started = Instant::now();
        match self.store.persist(time_box.id, &time_box.pcm) {
            Ok(segment) => {
                info!(
                    seq,
                    blocks,
                    bytes = segment.len(),
                    path = %segment.path().display(),
                    reason = end.label(),
                    flush_ms = started.elapsed().as_millis() as u64,
                    "segment closed"
                );
                self.queue.push(segment);
            }
            Err(err) => {
                time_box.abandon();
                error!(
                    seq,
                    blocks,
                    state = time_box.state().label(),
                    "segment write failed: {err:#}"
                );
            }
        }
    }

    /// Try once to reopen the source; on failure wait out the backoff
    /// (waking early on stop) and let the caller retry.
    fn reopen(&self) -> Option<Box<dyn CaptureStream>> {
        match self.source.open(&self.settings.format) {
            Ok(stream) => {
                info!("capture source reopened");
                Some(stream)
            }
            Err(err) => {
                warn!("failed to reopen capture source: {err:#}");
                let deadline = Instant::now() + self.settings.reopen_backoff;
                while !self.stopped() && Instant::now() < deadline {
                    thread::sleep(STOP_POLL_INTERVAL.min(self.settings.reopen_backoff));
                }
                None
            }
        }
    }
}
