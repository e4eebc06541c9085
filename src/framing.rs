//! Consumer-side segment reassembly.
//!
//! Polls carry no boundary marker, so a consumer that wants whole segments
//! must find the length inside the data. WAV segments start with a RIFF
//! header whose size field gives the total length; this splits a chunk
//! stream on those boundaries.

use anyhow::{bail, Result};

const RIFF_MAGIC: &[u8; 4] = b"RIFF";
const RIFF_HEADER_LEN: usize = 8;

#[derive(Debug, Default)]
pub struct SegmentAssembler {
    buffer: Vec<u8>,
    expected: Option<usize>,
}

impl SegmentAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one polled chunk and return every segment it completed.
    /// Empty chunks are ignored.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.buffer.extend_from_slice(chunk);
        let mut complete = Vec::new();
        loop {
            if self.expected.is_none() {
                if self.buffer.len() < RIFF_HEADER_LEN {
                    break;
                }
                if &self.buffer[..4] != RIFF_MAGIC {
                    bail!("stream is not RIFF framed; cannot find segment boundary");
                }
                let size = u32::from_le_bytes([
                    self.buffer[4],
                    self.buffer[5],
                    self.buffer[6],
                    self.buffer[7],
                ]);
                self.expected = Some(size as usize + RIFF_HEADER_LEN);
            }
            match self.expected {
                Some(total) if self.buffer.len() >= total => {
                    let rest = self.buffer.split_off(total);
                    complete.push(std::mem::replace(&mut self.buffer, rest));
                    self.expected = None;
                }
                _ => break,
            }
        }
        Ok(complete)
    }

    /// Bytes received for a segment that is not complete yet.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Total length of the segment in progress, once its header has arrived.
    pub fn expected_len(&self) -> Option<usize> {
        self.expected
    }
}
