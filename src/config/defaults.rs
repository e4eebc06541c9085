pub const DEFAULT_OUTPUT_DIR: &str = "recordings";
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_CHANNELS: u16 = 1;
pub const DEFAULT_BLOCK_FRAMES: usize = 1024;
pub const DEFAULT_SEGMENT_SECONDS: u64 = 30;
pub const DEFAULT_BLOCK_CHANNEL_CAPACITY: usize = 32;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_REOPEN_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_STOP_GRACE_MS: u64 = 0;
pub const DEFAULT_QUEUE_WARN_DEPTH: usize = 8;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub(super) const MIN_SAMPLE_RATE: u32 = 8_000;
pub(super) const MAX_SAMPLE_RATE: u32 = 192_000;
pub(super) const MAX_CHANNELS: u16 = 2;
pub(super) const MIN_BLOCK_FRAMES: usize = 64;
pub(super) const MAX_BLOCK_FRAMES: usize = 16_384;
pub(super) const MAX_SEGMENT_SECONDS: u64 = 3_600;
/// Smallest useful payload; 20 bytes is the default BLE ATT MTU minus headers.
pub(super) const MIN_CHUNK_SIZE: usize = 20;
pub(super) const MAX_STOP_GRACE_MS: u64 = 60_000;
pub(super) const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
