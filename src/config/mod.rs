//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use crate::audio::CaptureFormat;
use crate::relay::RelayConfig;
use crate::segment::SegmentFormat;
use crate::transfer::DEFAULT_CHUNK_SIZE;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub use defaults::{
    DEFAULT_BLOCK_CHANNEL_CAPACITY, DEFAULT_BLOCK_FRAMES, DEFAULT_CHANNELS, DEFAULT_LOG_LEVEL,
    DEFAULT_OUTPUT_DIR, DEFAULT_POLL_INTERVAL_MS, DEFAULT_QUEUE_WARN_DEPTH,
    DEFAULT_READ_TIMEOUT_MS, DEFAULT_REOPEN_BACKOFF_MS, DEFAULT_SAMPLE_RATE,
    DEFAULT_SEGMENT_SECONDS, DEFAULT_STOP_GRACE_MS,
};

/// CLI options for the VoxRelay capture service.
#[derive(Debug, Parser, Clone)]
#[command(about = "VoxRelay segmented audio capture with chunked pull transfer", author, version)]
pub struct AppConfig {
    /// Directory holding segments until they are delivered
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Preferred audio input device name
    #[arg(long)]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Capture sample rate (Hz)
    #[arg(long = "sample-rate", default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Capture channel count
    #[arg(long, default_value_t = DEFAULT_CHANNELS)]
    pub channels: u16,

    /// Frames per block read from the device
    #[arg(long = "block-frames", default_value_t = DEFAULT_BLOCK_FRAMES)]
    pub block_frames: usize,

    /// Target duration of each segment (seconds)
    #[arg(long = "segment-seconds", default_value_t = DEFAULT_SEGMENT_SECONDS)]
    pub segment_seconds: u64,

    /// Container used for stored segments
    #[arg(long = "segment-format", value_enum, default_value_t = SegmentFormat::Wav)]
    pub segment_format: SegmentFormat,

    /// Maximum bytes returned by one poll
    #[arg(long = "chunk-size", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Blocks buffered between the device callback and the segment writer
    #[arg(long = "block-channel-capacity", default_value_t = DEFAULT_BLOCK_CHANNEL_CAPACITY)]
    pub block_channel_capacity: usize,

    /// Treat a device that delivers no block for this long as failed (milliseconds)
    #[arg(long = "read-timeout-ms", default_value_t = DEFAULT_READ_TIMEOUT_MS)]
    pub read_timeout_ms: u64,

    /// Wait between attempts to reopen a failed device (milliseconds)
    #[arg(long = "reopen-backoff-ms", default_value_t = DEFAULT_REOPEN_BACKOFF_MS)]
    pub reopen_backoff_ms: u64,

    /// Keep capturing this long after the last subscriber leaves (milliseconds)
    #[arg(long = "stop-grace-ms", default_value_t = DEFAULT_STOP_GRACE_MS)]
    pub stop_grace_ms: u64,

    /// Queue depth that triggers a backpressure warning
    #[arg(long = "queue-warn-depth", default_value_t = DEFAULT_QUEUE_WARN_DEPTH)]
    pub queue_warn_depth: usize,

    /// Do not re-queue segments left in the output directory by a previous run
    #[arg(long = "no-recover", default_value_t = false)]
    pub no_recover: bool,

    /// Loopback consumer poll interval (milliseconds)
    #[arg(long = "poll-interval-ms", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Stop after this many seconds (runs until killed when omitted)
    #[arg(long = "run-seconds")]
    pub run_seconds: Option<u64>,

    /// Write segments received by the loopback consumer here
    #[arg(long = "receive-dir")]
    pub receive_dir: Option<PathBuf>,

    /// Log verbosity (trace, debug, info, warn, error)
    #[arg(long = "log-level", env = "VOXRELAY_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    /// Write JSON trace lines to this file instead of stderr
    #[arg(long = "trace-log", env = "VOXRELAY_TRACE_LOG")]
    pub trace_log: Option<PathBuf>,

    /// Disable all logging
    #[arg(long = "no-logs", env = "VOXRELAY_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,
}

impl AppConfig {
    pub fn capture_format(&self) -> CaptureFormat {
        CaptureFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            block_frames: self.block_frames,
        }
    }

    /// Settings handed to the library once the CLI has been validated.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            output_dir: self.output_dir.clone(),
            capture: self.capture_format(),
            segment_duration: Duration::from_secs(self.segment_seconds),
            segment_format: self.segment_format,
            chunk_size: self.chunk_size,
            stop_grace: Duration::from_millis(self.stop_grace_ms),
            reopen_backoff: Duration::from_millis(self.reopen_backoff_ms),
            queue_warn_depth: self.queue_warn_depth,
            recover_leftovers: !self.no_recover,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
