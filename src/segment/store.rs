//! Segment persistence: naming, container encoding, and restart recovery.

use super::{Segment, SegmentId};
use crate::audio::{CaptureFormat, SAMPLE_BYTES};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use clap::ValueEnum;
use hound::{WavSpec, WavWriter};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const FILE_PREFIX: &str = "audio_";

/// Container used for persisted segments. Consumers treat the result as an
/// opaque blob; only `Wav` carries its own length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SegmentFormat {
    /// 16-bit PCM WAV; the RIFF header gives every segment a self-describing length.
    Wav,
    /// Captured PCM bytes verbatim.
    Raw,
}

impl SegmentFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SegmentFormat::Wav => "wav",
            SegmentFormat::Raw => "raw",
        }
    }
}

/// Directory of persisted segments for one running instance.
#[derive(Debug)]
pub struct SegmentStore {
    dir: PathBuf,
    format: SegmentFormat,
    capture: CaptureFormat,
}

impl SegmentStore {
    /// Use `dir` for segment files, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>, format: SegmentFormat, capture: CaptureFormat) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create segment directory {}", dir.display()))?;
        Ok(Self {
            dir,
            format,
            capture,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `audio_<YYYYmmdd_HHMMSS>_<seq>.<ext>`; names sort in creation order.
    pub fn path_for(&self, id: &SegmentId) -> PathBuf {
        let stamp = id.created_at.format("%Y%m%d_%H%M%S");
        self.dir.join(format!(
            "{FILE_PREFIX}{stamp}_{:06}.{}",
            id.seq,
            self.format.extension()
        ))
    }

    /// Write `pcm` as a finished segment. A failed write leaves nothing behind.
    pub fn persist(&self, id: SegmentId, pcm: &[u8]) -> Result<Segment> {
        let path = self.path_for(&id);
        let written = match self.format {
            SegmentFormat::Wav => write_wav(&path, &self.capture, pcm),
            SegmentFormat::Raw => write_raw(&path, pcm),
        };
        if let Err(err) = written {
            if let Err(cleanup) = fs::remove_file(&path) {
                debug!(path = %path.display(), "no partial segment to clean up: {cleanup}");
            }
            return Err(err);
        }
        let len = fs::metadata(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len();
        Ok(Segment::closed(id, path, len))
    }

    /// Segment files left over from a previous run, oldest first, numbered
    /// from zero. Empty leftovers are deleted instead of being returned.
    pub fn recover(&self) -> Result<Vec<Segment>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("failed to scan {}", self.dir.display()))?;
        let extension = self.format.extension();
        let mut leftovers: Vec<(PathBuf, fs::Metadata)> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                let path = entry.path();
                let named = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.starts_with(FILE_PREFIX))
                    .unwrap_or(false);
                named && path.extension().map(|ext| ext == extension).unwrap_or(false)
            })
            .filter_map(|entry| {
                let metadata = entry.metadata().ok()?;
                metadata.is_file().then(|| (entry.path(), metadata))
            })
            .collect();
        leftovers.sort_by(|a, b| a.0.cmp(&b.0));

        let mut segments = Vec::with_capacity(leftovers.len());
        for (path, metadata) in leftovers {
            if metadata.len() == 0 {
                if let Err(err) = fs::remove_file(&path) {
                    warn!(path = %path.display(), "failed to remove empty leftover segment: {err}");
                }
                continue;
            }
            let created_at = metadata
                .modified()
                .map(DateTime::<Local>::from)
                .unwrap_or_else(|_| Local::now());
            let id = SegmentId {
                seq: segments.len() as u64,
                created_at,
            };
            segments.push(Segment::closed(id, path, metadata.len()));
        }
        Ok(segments)
    }
}

fn write_wav(path: &Path, capture: &CaptureFormat, pcm: &[u8]) -> Result<()> {
    if pcm.len() % SAMPLE_BYTES != 0 {
        bail!(
            "{} bytes of PCM is not a whole number of 16-bit samples",
            pcm.len()
        );
    }
    let spec = WavSpec {
        channels: capture.channels,
        sample_rate: capture.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for sample in pcm.chunks_exact(SAMPLE_BYTES) {
        writer
            .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
            .with_context(|| format!("failed to write samples to {}", path.display()))?;
    }
    writer
        .finalize()
        .with_context(|| format!("failed to finalize {}", path.display()))
}

fn write_raw(path: &Path, pcm: &[u8]) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(pcm)
        .and_then(|_| writer.flush())
        .with_context(|| format!("failed to write {}", path.display()))
}
