use super::dispatch::{append_pcm16, f32_to_i16, u16_to_i16, BlockDispatcher};
use super::CaptureFormat;
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn format(sample_rate: u32, channels: u16, block_frames: usize) -> CaptureFormat {
    CaptureFormat {
        sample_rate,
        channels,
        block_frames,
    }
}

#[test]
fn encodes_samples_as_little_endian_pcm16() {
    let mut buf = Vec::new();
    append_pcm16(&mut buf, &[1i16, -2, 0x1234], |sample| sample);
    assert_eq!(buf, vec![0x01, 0x00, 0xFE, 0xFF, 0x34, 0x12]);
}

#[test]
fn float_samples_are_clamped_before_conversion() {
    assert_eq!(f32_to_i16(0.0), 0);
    assert_eq!(f32_to_i16(1.0), i16::MAX);
    assert_eq!(f32_to_i16(4.0), i16::MAX);
    assert_eq!(f32_to_i16(-4.0), -i16::MAX);
}

#[test]
fn unsigned_samples_are_recentred() {
    assert_eq!(u16_to_i16(32_768), 0);
    assert_eq!(u16_to_i16(0), i16::MIN);
    assert_eq!(u16_to_i16(u16::MAX), i16::MAX);
}

#[test]
fn block_dispatcher_emits_blocks_and_tracks_drops() {
    let (tx, rx) = bounded::<Vec<u8>>(1);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = BlockDispatcher::new(4, tx, dropped.clone());

    dispatcher.push(&[1i16, 2, 3, 4], |sample| sample);

    let block = rx.try_recv().expect("missing block");
    assert_eq!(block, vec![1, 0, 2, 0]);
    assert_eq!(dropped.load(Ordering::Relaxed), 1);
}

#[test]
fn block_dispatcher_accumulates_partial_blocks() {
    let (tx, rx) = bounded::<Vec<u8>>(4);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = BlockDispatcher::new(6, tx, dropped.clone());

    dispatcher.push(&[1i16, 2], |sample| sample);
    assert!(rx.try_recv().is_err());

    dispatcher.push(&[3i16, 4], |sample| sample);
    let block = rx.try_recv().expect("missing block");
    assert_eq!(block, vec![1, 0, 2, 0, 3, 0]);
    assert!(rx.try_recv().is_err());
    assert_eq!(dropped.load(Ordering::Relaxed), 0);
}

#[test]
fn block_dispatcher_stops_when_receiver_is_gone() {
    let (tx, rx) = bounded::<Vec<u8>>(1);
    drop(rx);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = BlockDispatcher::new(2, tx, dropped.clone());

    dispatcher.push(&[1i16, 2, 3], |sample| sample);
    assert_eq!(dropped.load(Ordering::Relaxed), 0);
}

#[test]
fn block_bytes_account_for_channels() {
    assert_eq!(format(44_100, 1, 1024).block_bytes(), 2048);
    assert_eq!(format(44_100, 2, 1024).block_bytes(), 4096);
}

#[test]
fn blocks_per_time_box_rounds_down() {
    // 44100 / 1024 * 30 = 1291.99...
    assert_eq!(format(44_100, 1, 1024).blocks_for(Duration::from_secs(30)), 1291);
    assert_eq!(format(16_000, 1, 1600).blocks_for(Duration::from_secs(1)), 10);
}

#[test]
fn time_box_always_has_at_least_one_block() {
    assert_eq!(format(8_000, 1, 16_384).blocks_for(Duration::from_secs(1)), 1);
}

#[test]
fn block_duration_matches_rate() {
    assert_eq!(
        format(16_000, 1, 1600).block_duration(),
        Duration::from_millis(100)
    );
}
