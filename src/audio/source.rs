use super::SAMPLE_BYTES;
use anyhow::Result;
use std::time::Duration;

/// Block geometry requested from a capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames (one sample per channel) in each block handed to the writer.
    pub block_frames: usize,
}

impl CaptureFormat {
    /// Size in bytes of one full block.
    pub fn block_bytes(&self) -> usize {
        self.block_frames * usize::from(self.channels.max(1)) * SAMPLE_BYTES
    }

    /// Wall-clock span of one block.
    pub fn block_duration(&self) -> Duration {
        let rate = u64::from(self.sample_rate.max(1));
        Duration::from_micros(self.block_frames as u64 * 1_000_000 / rate)
    }

    /// Number of blocks that make up a time-box of `duration`, never less than one.
    pub fn blocks_for(&self, duration: Duration) -> usize {
        let frames = duration.as_secs_f64() * f64::from(self.sample_rate);
        let blocks = (frames / self.block_frames.max(1) as f64).floor() as usize;
        blocks.max(1)
    }
}

/// Something that can hand out audio streams, one per capture cycle.
///
/// `open` must fail synchronously when the device or format is unusable so
/// that `start()` can report it instead of failing silently later.
pub trait CaptureSource: Send + Sync {
    fn open(&self, format: &CaptureFormat) -> Result<Box<dyn CaptureStream>>;
}

/// An open stream owned by exactly one capture loop.
pub trait CaptureStream: Send {
    /// Block until the next block is available. Returns one full block, or a
    /// shorter one at end of stream.
    fn read_block(&mut self) -> Result<Vec<u8>>;

    /// Release the device. Called exactly once, when the loop is done with it.
    fn close(self: Box<Self>);
}
