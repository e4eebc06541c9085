//! In-process consumer standing in for a remote reader: one session, fixed
//! poll pacing, optional reassembly of received segments to disk.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;
use tracing::{debug, info};
use voxrelay::config::AppConfig;
use voxrelay::framing::SegmentAssembler;
use voxrelay::segment::SegmentFormat;
use voxrelay::Relay;

use crate::signals::shutdown_requested;

const SESSION: &str = "loopback";

/// Where received bytes go. WAV streams are split back into segment files;
/// raw streams have no boundaries, so they are appended to one file.
enum ReceiveSink {
    Discard,
    Segments {
        dir: PathBuf,
        assembler: SegmentAssembler,
        received: usize,
    },
    Stream(File),
}

impl ReceiveSink {
    fn for_config(config: &AppConfig) -> Result<Self> {
        let Some(dir) = &config.receive_dir else {
            return Ok(ReceiveSink::Discard);
        };
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create receive directory {}", dir.display()))?;
        match config.segment_format {
            SegmentFormat::Wav => Ok(ReceiveSink::Segments {
                dir: dir.clone(),
                assembler: SegmentAssembler::new(),
                received: 0,
            }),
            SegmentFormat::Raw => {
                let path = dir.join("received.raw");
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .with_context(|| format!("failed to open {}", path.display()))?;
                Ok(ReceiveSink::Stream(file))
            }
        }
    }

    fn accept(&mut self, chunk: &[u8]) -> Result<()> {
        match self {
            ReceiveSink::Discard => Ok(()),
            ReceiveSink::Stream(file) => file.write_all(chunk).context("failed to append received bytes"),
            ReceiveSink::Segments {
                dir,
                assembler,
                received,
            } => {
                for segment in assembler.push(chunk)? {
                    *received += 1;
                    save_segment(dir, *received, &segment)?;
                }
                Ok(())
            }
        }
    }
}

fn save_segment(dir: &Path, index: usize, bytes: &[u8]) -> Result<()> {
    let path = dir.join(format!("received_{index:06}.wav"));
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), bytes = bytes.len(), "segment received");
    Ok(())
}

/// Attach, poll until `--run-seconds` elapses or a shutdown signal arrives,
/// detach, then drain whatever the final stop flushed.
pub(crate) fn run_loopback(relay: &Relay, config: &AppConfig) -> Result<()> {
    let mut sink = ReceiveSink::for_config(config)?;
    let interval = config.poll_interval();
    let started = Instant::now();

    relay.subscribe(SESSION)?;
    let mut outcome = Ok(());
    loop {
        if shutdown_requested() {
            info!("shutdown requested; stopping capture");
            break;
        }
        if let Some(limit) = config.run_seconds {
            if started.elapsed().as_secs() >= limit {
                break;
            }
        }
        let chunk = relay.poll_chunk();
        if chunk.is_empty() {
            thread::sleep(interval);
            continue;
        }
        if let Err(err) = sink.accept(&chunk) {
            outcome = Err(err);
            break;
        }
    }
    relay.unsubscribe(SESSION);
    outcome?;

    let mut drained = 0usize;
    loop {
        let chunk = relay.poll_chunk();
        if chunk.is_empty() {
            // Empty can also mean a queued segment's storage vanished; keep
            // going until the queue itself is empty.
            if relay.stats().queue_depth == 0 {
                break;
            }
            continue;
        }
        drained += chunk.len();
        sink.accept(&chunk)?;
    }
    debug!(bytes = drained, "drained after stop");
    Ok(())
}
