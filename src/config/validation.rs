use super::defaults::{
    LOG_LEVELS, MAX_BLOCK_FRAMES, MAX_CHANNELS, MAX_SAMPLE_RATE, MAX_SEGMENT_SECONDS,
    MAX_STOP_GRACE_MS, MIN_BLOCK_FRAMES, MIN_CHUNK_SIZE, MIN_SAMPLE_RATE,
};
use super::AppConfig;
use crate::transfer::DEFAULT_CHUNK_SIZE;
use anyhow::{bail, Result};
use clap::Parser;
use std::path::Path;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize the log level.
    pub fn validate(&mut self) -> Result<()> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            bail!(
                "--sample-rate must be between {MIN_SAMPLE_RATE} and {MAX_SAMPLE_RATE} Hz, got {}",
                self.sample_rate
            );
        }
        if !(1..=MAX_CHANNELS).contains(&self.channels) {
            bail!(
                "--channels must be between 1 and {MAX_CHANNELS}, got {}",
                self.channels
            );
        }
        if !(MIN_BLOCK_FRAMES..=MAX_BLOCK_FRAMES).contains(&self.block_frames) {
            bail!(
                "--block-frames must be between {MIN_BLOCK_FRAMES} and {MAX_BLOCK_FRAMES}, got {}",
                self.block_frames
            );
        }
        if !(1..=MAX_SEGMENT_SECONDS).contains(&self.segment_seconds) {
            bail!(
                "--segment-seconds must be between 1 and {MAX_SEGMENT_SECONDS}, got {}",
                self.segment_seconds
            );
        }
        if !(MIN_CHUNK_SIZE..=DEFAULT_CHUNK_SIZE).contains(&self.chunk_size) {
            bail!(
                "--chunk-size must be between {MIN_CHUNK_SIZE} and {DEFAULT_CHUNK_SIZE} bytes, got {}",
                self.chunk_size
            );
        }
        if !(2..=1024).contains(&self.block_channel_capacity) {
            bail!(
                "--block-channel-capacity must be between 2 and 1024, got {}",
                self.block_channel_capacity
            );
        }
        let block_ms = self.capture_format().block_duration().as_millis() as u64;
        if self.read_timeout_ms <= block_ms || self.read_timeout_ms > 60_000 {
            bail!(
                "--read-timeout-ms must exceed one block ({block_ms} ms) and be at most 60000, got {}",
                self.read_timeout_ms
            );
        }
        if !(10..=60_000).contains(&self.reopen_backoff_ms) {
            bail!(
                "--reopen-backoff-ms must be between 10 and 60000, got {}",
                self.reopen_backoff_ms
            );
        }
        if self.stop_grace_ms > MAX_STOP_GRACE_MS {
            bail!(
                "--stop-grace-ms must be at most {MAX_STOP_GRACE_MS}, got {}",
                self.stop_grace_ms
            );
        }
        if self.queue_warn_depth == 0 {
            bail!("--queue-warn-depth must be at least 1");
        }
        if !(1..=1_000).contains(&self.poll_interval_ms) {
            bail!(
                "--poll-interval-ms must be between 1 and 1000, got {}",
                self.poll_interval_ms
            );
        }
        if self.run_seconds == Some(0) {
            bail!("--run-seconds must be at least 1 when given");
        }

        let level = self.log_level.trim().to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            bail!(
                "--log-level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.log_level
            );
        }
        self.log_level = level;

        ensure_directory_or_absent(&self.output_dir, "--output-dir")?;
        if let Some(receive_dir) = &self.receive_dir {
            ensure_directory_or_absent(receive_dir, "--receive-dir")?;
            if receive_dir == &self.output_dir {
                bail!("--receive-dir must differ from --output-dir");
            }
        }
        Ok(())
    }
}

/// Directories are created on demand, but an existing non-directory is a mistake.
pub(super) fn ensure_directory_or_absent(path: &Path, flag: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("{flag} must not be empty");
    }
    if path.exists() && !path.is_dir() {
        bail!("{flag} '{}' exists and is not a directory", path.display());
    }
    Ok(())
}
