//! Hardware-free capture sources for exercising the pipeline in tests.

use crate::audio::{CaptureFormat, CaptureSource, CaptureStream};
use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Pace of scripted reads, standing in for the device's block duration.
const READ_PACE: Duration = Duration::from_millis(1);

pub(crate) enum Step {
    Block(Vec<u8>),
    Fail(&'static str),
    /// Panic inside `read_block`, taking the capture thread down.
    Panic(&'static str),
}

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    closes: AtomicUsize,
    reads: AtomicUsize,
    failing_opens: AtomicUsize,
}

/// Replays a script of blocks and failures shared across every opened
/// stream. Once the script is used up, reads either repeat `idle` forever or
/// fail.
pub(crate) struct ScriptedSource {
    steps: Arc<Mutex<VecDeque<Step>>>,
    idle: Option<Vec<u8>>,
    counters: Arc<Counters>,
}

impl ScriptedSource {
    pub(crate) fn scripted(steps: Vec<Step>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into())),
            idle: None,
            counters: Arc::default(),
        }
    }

    pub(crate) fn endless(block: Vec<u8>) -> Self {
        Self {
            idle: Some(block),
            ..Self::scripted(Vec::new())
        }
    }

    /// Make the next `count` opens fail.
    pub(crate) fn fail_opens(&self, count: usize) {
        self.counters.failing_opens.store(count, Ordering::SeqCst);
    }

    pub(crate) fn open_count(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn close_count(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn read_count(&self) -> usize {
        self.counters.reads.load(Ordering::SeqCst)
    }
}

impl CaptureSource for ScriptedSource {
    fn open(&self, _format: &CaptureFormat) -> Result<Box<dyn CaptureStream>> {
        let failing = self.counters.failing_opens.load(Ordering::SeqCst);
        if failing > 0 {
            self.counters.failing_opens.store(failing - 1, Ordering::SeqCst);
            return Err(anyhow!("scripted open failure"));
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedStream {
            steps: self.steps.clone(),
            idle: self.idle.clone(),
            counters: self.counters.clone(),
        }))
    }
}

struct ScriptedStream {
    steps: Arc<Mutex<VecDeque<Step>>>,
    idle: Option<Vec<u8>>,
    counters: Arc<Counters>,
}

impl CaptureStream for ScriptedStream {
    fn read_block(&mut self) -> Result<Vec<u8>> {
        thread::sleep(READ_PACE);
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        let next = self
            .steps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        match next {
            Some(Step::Block(block)) => Ok(block),
            Some(Step::Fail(reason)) => Err(anyhow!(reason)),
            Some(Step::Panic(reason)) => panic!("{reason}"),
            None => match &self.idle {
                Some(block) => Ok(block.clone()),
                None => Err(anyhow!("script exhausted")),
            },
        }
    }

    fn close(self: Box<Self>) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}
