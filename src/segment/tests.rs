use super::writer::TimeBox;
use super::*;
use crate::audio::CaptureFormat;
use crate::handoff::{self, HandoffReceiver};
use crate::test_support::{ScriptedSource, Step};
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const BLOCK: usize = 200;

fn capture_format() -> CaptureFormat {
    CaptureFormat {
        sample_rate: 1_000,
        channels: 1,
        block_frames: BLOCK / 2,
    }
}

struct Harness {
    dir: TempDir,
    source: Arc<ScriptedSource>,
    writer: SegmentWriter,
    inbox: HandoffReceiver,
}

fn harness(source: ScriptedSource, segment_duration: Duration) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(
        SegmentStore::open(dir.path(), SegmentFormat::Raw, capture_format()).expect("store"),
    );
    let (queue, inbox) = handoff::channel(64);
    let source = Arc::new(source);
    let writer = SegmentWriter::new(
        source.clone(),
        store,
        queue,
        WriterSettings {
            format: capture_format(),
            segment_duration,
            reopen_backoff: Duration::from_millis(5),
        },
        0,
    );
    Harness {
        dir,
        source,
        writer,
        inbox,
    }
}

fn wait_for(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

fn drain(inbox: &HandoffReceiver) -> Vec<Segment> {
    std::iter::from_fn(|| inbox.try_pop()).collect()
}

#[test]
fn read_error_keeps_truncated_segment_and_starts_new_one() {
    let mut steps = vec![
        Step::Block(vec![1; BLOCK]),
        Step::Block(vec![1; BLOCK]),
        Step::Fail("device glitch"),
    ];
    steps.extend((0..10).map(|_| Step::Block(vec![2; BLOCK])));
    let h = harness(ScriptedSource::scripted(steps), Duration::from_secs(1));

    h.writer.start().expect("start");
    assert!(wait_for(Duration::from_secs(5), || h.inbox.len() >= 2));
    h.writer.stop();

    let segments = drain(&h.inbox);
    assert!(segments.len() >= 2);
    let truncated = fs::read(segments[0].path()).expect("read first");
    assert_eq!(truncated, vec![1; 2 * BLOCK]);
    assert_eq!(segments[0].len(), 2 * BLOCK as u64);
    let full = fs::read(segments[1].path()).expect("read second");
    assert_eq!(full, vec![2; 10 * BLOCK]);
    assert!(segments[0].seq() < segments[1].seq());
    assert!(segments.iter().all(|s| s.state() == SegmentState::Queued));
    assert!(h.source.open_count() >= 2);
    assert_eq!(h.source.open_count(), h.source.close_count());
}

#[test]
fn start_and_stop_are_idempotent() {
    let h = harness(ScriptedSource::endless(vec![0; BLOCK]), Duration::from_secs(3600));

    h.writer.start().expect("first start");
    h.writer.start().expect("second start is a no-op");
    assert!(h.writer.is_active());
    assert_eq!(h.source.open_count(), 1);

    h.writer.stop();
    h.writer.stop();
    assert!(!h.writer.is_active());
    assert_eq!(h.source.close_count(), 1);
}

#[test]
fn stop_mid_time_box_flushes_partial_segment() {
    let h = harness(ScriptedSource::endless(vec![9; BLOCK]), Duration::from_secs(3600));

    h.writer.start().expect("start");
    assert!(wait_for(Duration::from_secs(5), || h.source.read_count() >= 5));
    h.writer.stop();

    let segments = drain(&h.inbox);
    assert_eq!(segments.len(), 1);
    let reads = h.source.read_count();
    assert!(reads >= 5);
    assert_eq!(segments[0].len(), (reads * BLOCK) as u64);
    assert!(fs::read(segments[0].path())
        .expect("read")
        .iter()
        .all(|byte| *byte == 9));
}

#[test]
fn time_boxes_with_no_blocks_are_abandoned() {
    let h = harness(ScriptedSource::scripted(Vec::new()), Duration::from_secs(1));

    h.writer.start().expect("start");
    assert!(wait_for(Duration::from_secs(5), || h.source.read_count() >= 3));
    h.writer.stop();

    assert!(h.inbox.try_pop().is_none());
    assert_eq!(fs::read_dir(h.dir.path()).expect("read dir").count(), 0);
}

#[test]
fn open_failure_at_start_is_reported() {
    let source = ScriptedSource::endless(vec![0; BLOCK]);
    source.fail_opens(1);
    let h = harness(source, Duration::from_secs(1));

    let err = h.writer.start().expect_err("open should fail");
    assert!(format!("{err:#}").contains("scripted open failure"));
    assert!(!h.writer.is_active());
    h.writer.stop();
}

#[test]
fn write_failure_abandons_segment_without_queueing() {
    let h = harness(ScriptedSource::endless(vec![4; BLOCK]), Duration::from_millis(200));
    fs::remove_dir_all(h.dir.path()).expect("remove storage");

    h.writer.start().expect("start");
    // Two blocks per segment; give it time to close several.
    assert!(wait_for(Duration::from_secs(5), || h.source.read_count() >= 8));
    h.writer.stop();

    assert!(h.inbox.try_pop().is_none());
}

#[test]
fn crashed_capture_thread_is_inactive_and_restartable() {
    let h = harness(
        ScriptedSource::scripted(vec![
            Step::Block(vec![1; BLOCK]),
            Step::Panic("driver crashed"),
        ]),
        Duration::from_secs(1),
    );

    h.writer.start().expect("start");
    assert!(wait_for(Duration::from_secs(5), || !h.writer.is_active()));

    h.writer.start().expect("restart after crash");
    assert!(h.writer.is_active());
    assert!(h.source.open_count() >= 2);
    h.writer.stop();
    assert!(!h.writer.is_active());
}

#[test]
fn short_block_ends_time_box_and_reopens() {
    let h = harness(
        ScriptedSource::scripted(vec![
            Step::Block(vec![6; BLOCK]),
            Step::Block(vec![6; BLOCK / 2]),
        ]),
        Duration::from_secs(1),
    );

    h.writer.start().expect("start");
    assert!(wait_for(Duration::from_secs(5), || h.inbox.len() >= 1));
    assert!(wait_for(Duration::from_secs(5), || h.source.open_count() >= 2));
    h.writer.stop();

    let segments = drain(&h.inbox);
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].len(), (BLOCK + BLOCK / 2) as u64);
}

#[test]
fn time_box_tracks_blocks() {
    let mut time_box = TimeBox::begin(SegmentId::new(0), 2, BLOCK);
    assert!(time_box.is_empty());
    assert_eq!(time_box.state(), SegmentState::Recording);
    time_box.push(vec![0; BLOCK]);
    assert!(!time_box.is_full());
    time_box.push(vec![0; BLOCK]);
    assert!(time_box.is_full());
    assert_eq!(time_box.blocks(), 2);

    time_box.abandon();
    assert_eq!(time_box.state(), SegmentState::Abandoned);
    assert!(time_box.is_empty());
}

#[test]
fn segment_names_sort_in_creation_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SegmentStore::open(dir.path(), SegmentFormat::Wav, capture_format()).expect("store");
    let first = SegmentId::new(9);
    let second = SegmentId {
        seq: 10,
        created_at: first.created_at,
    };
    let a = store.path_for(&first);
    let b = store.path_for(&second);
    assert!(a < b);
    let name = a.file_name().and_then(|n| n.to_str()).expect("name");
    assert!(name.starts_with("audio_"));
    assert!(name.ends_with("_000009.wav"));
}

#[test]
fn wav_segments_carry_pcm_and_header() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SegmentStore::open(dir.path(), SegmentFormat::Wav, capture_format()).expect("store");
    let pcm: Vec<u8> = [1i16, -1, 300, -300]
        .iter()
        .flat_map(|sample| sample.to_le_bytes())
        .collect();

    let segment = store.persist(SegmentId::new(0), &pcm).expect("persist");
    assert_eq!(segment.state(), SegmentState::Closed);
    assert_eq!(segment.len(), fs::metadata(segment.path()).expect("stat").len());

    let mut reader = hound::WavReader::open(segment.path()).expect("wav");
    assert_eq!(reader.spec().sample_rate, 1_000);
    assert_eq!(reader.spec().channels, 1);
    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.expect("sample")).collect();
    assert_eq!(samples, vec![1, -1, 300, -300]);
}

#[test]
fn wav_rejects_partial_sample_and_leaves_no_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SegmentStore::open(dir.path(), SegmentFormat::Wav, capture_format()).expect("store");

    let err = store.persist(SegmentId::new(0), &[1, 2, 3]).expect_err("odd length");
    assert!(format!("{err:#}").contains("not a whole number"));
    assert_eq!(fs::read_dir(dir.path()).expect("read dir").count(), 0);
}

#[test]
fn raw_segments_are_verbatim() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SegmentStore::open(dir.path(), SegmentFormat::Raw, capture_format()).expect("store");
    let segment = store.persist(SegmentId::new(3), &[1, 2, 3, 4]).expect("persist");
    assert_eq!(fs::read(segment.path()).expect("read"), vec![1, 2, 3, 4]);
    assert_eq!(segment.len(), 4);
    assert!(!segment.is_empty());
}

#[test]
fn recover_orders_leftovers_and_drops_empty_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("audio_20240102_000000_000001.raw"), [2u8; 4]).expect("write");
    fs::write(dir.path().join("audio_20240101_000000_000005.raw"), [1u8; 4]).expect("write");
    fs::write(dir.path().join("audio_20240103_000000_000002.raw"), []).expect("write");
    fs::write(dir.path().join("audio_20240104_000000_000003.wav"), [3u8; 4]).expect("write");
    fs::write(dir.path().join("other.raw"), [4u8; 4]).expect("write");

    let store = SegmentStore::open(dir.path(), SegmentFormat::Raw, capture_format()).expect("store");
    let recovered = store.recover().expect("recover");
    let names: Vec<String> = recovered
        .iter()
        .map(|s| s.path().file_name().and_then(|n| n.to_str()).unwrap_or("").to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "audio_20240101_000000_000005.raw".to_string(),
            "audio_20240102_000000_000001.raw".to_string(),
        ]
    );
    assert_eq!(recovered.iter().map(Segment::seq).collect::<Vec<_>>(), vec![0, 1]);
    assert!(!dir.path().join("audio_20240103_000000_000002.raw").exists());
}
