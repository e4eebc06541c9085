use super::SAMPLE_BYTES;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Encode device samples as 16-bit little-endian PCM, the only layout the
/// segment writer persists.
pub(super) fn append_pcm16<T, F>(buf: &mut Vec<u8>, data: &[T], mut convert: F)
where
    T: Copy,
    F: FnMut(T) -> i16,
{
    buf.reserve(data.len() * SAMPLE_BYTES);
    for sample in data.iter().copied() {
        buf.extend_from_slice(&convert(sample).to_le_bytes());
    }
}

pub(super) fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

pub(super) fn u16_to_i16(sample: u16) -> i16 {
    (i32::from(sample) - 32_768) as i16
}

/// Slices the device callback's arbitrary-sized buffers into fixed-size
/// blocks and forwards them without ever blocking the audio thread.
pub(super) struct BlockDispatcher {
    block_bytes: usize,
    pending: Vec<u8>,
    sender: Sender<Vec<u8>>,
    dropped: Arc<AtomicUsize>,
}

impl BlockDispatcher {
    pub(super) fn new(block_bytes: usize, sender: Sender<Vec<u8>>, dropped: Arc<AtomicUsize>) -> Self {
        Self {
            block_bytes: block_bytes.max(SAMPLE_BYTES),
            pending: Vec::with_capacity(block_bytes),
            sender,
            dropped,
        }
    }

    pub(super) fn push<T, F>(&mut self, data: &[T], convert: F)
    where
        T: Copy,
        F: FnMut(T) -> i16,
    {
        append_pcm16(&mut self.pending, data, convert);

        while self.pending.len() >= self.block_bytes {
            let block: Vec<u8> = self.pending.drain(..self.block_bytes).collect();
            if let Err(err) = self.sender.try_send(block) {
                match err {
                    TrySendError::Full(_) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    TrySendError::Disconnected(_) => break,
                }
            }
        }
    }
}
