//! Capture Source contract and the cpal-backed microphone implementation.
//!
//! The segment writer only ever sees [`CaptureSource`] and [`CaptureStream`]:
//! open a stream for a [`CaptureFormat`], read fixed-size blocks of 16-bit
//! little-endian PCM, close it. Hardware specifics stay behind those traits.

/// Bytes per sample; blocks are always 16-bit PCM.
pub const SAMPLE_BYTES: usize = 2;

mod dispatch;
mod recorder;
mod source;
#[cfg(test)]
mod tests;

pub use recorder::CpalSource;
pub use source::{CaptureFormat, CaptureSource, CaptureStream};
