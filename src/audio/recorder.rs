//! System microphone capture via CPAL.
//!
//! cpal streams are not `Send` on every host, so each opened stream lives on
//! its own `audio-input` thread for its whole life. The capture loop only
//! holds the receiving end of a bounded block channel plus a shutdown handle.

use super::dispatch::{f32_to_i16, u16_to_i16, BlockDispatcher};
use super::source::{CaptureFormat, CaptureSource, CaptureStream};
use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Capture source backed by a physical input device.
#[derive(Debug, Clone)]
pub struct CpalSource {
    preferred_device: Option<String>,
    channel_capacity: usize,
    read_timeout: Duration,
}

impl CpalSource {
    /// List microphone names so the CLI can expose a human-friendly selector.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().context("no input devices available")?;
        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// `preferred_device` picks a device by exact name; `None` uses the host default.
    pub fn new(preferred_device: Option<String>, channel_capacity: usize, read_timeout: Duration) -> Self {
        Self {
            preferred_device,
            channel_capacity: channel_capacity.max(1),
            read_timeout,
        }
    }
}

impl CaptureSource for CpalSource {
    fn open(&self, format: &CaptureFormat) -> Result<Box<dyn CaptureStream>> {
        let (block_tx, block_rx) = bounded::<Vec<u8>>(self.channel_capacity);
        let (ready_tx, ready_rx) = bounded::<Result<String>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let dropped = Arc::new(AtomicUsize::new(0));

        let preferred = self.preferred_device.clone();
        let format = *format;
        let thread_dropped = dropped.clone();
        let handle = thread::Builder::new()
            .name("audio-input".to_string())
            .spawn(move || {
                let stream = match build_stream(preferred.as_deref(), &format, block_tx, thread_dropped) {
                    Ok((stream, name)) => {
                        let _ = ready_tx.send(Ok(name));
                        stream
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                // Parked until the owning stream is closed or dropped.
                let _ = shutdown_rx.recv();
                if let Err(err) = stream.pause() {
                    debug!("failed to pause audio stream: {err}");
                }
                drop(stream);
            })
            .context("failed to spawn audio input thread")?;

        match ready_rx.recv() {
            Ok(Ok(device)) => {
                info!(
                    device = %device,
                    sample_rate = format.sample_rate,
                    channels = format.channels,
                    block_frames = format.block_frames,
                    "audio input opened"
                );
            }
            Ok(Err(err)) => {
                let _ = handle.join();
                return Err(err);
            }
            Err(_) => {
                let _ = handle.join();
                bail!("audio input thread exited before the stream was ready");
            }
        }

        Ok(Box::new(CpalStream {
            blocks: block_rx,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
            dropped,
            read_timeout: self.read_timeout,
        }))
    }
}

struct CpalStream {
    blocks: Receiver<Vec<u8>>,
    shutdown: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
    dropped: Arc<AtomicUsize>,
    read_timeout: Duration,
}

impl CpalStream {
    fn release(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("audio input thread panicked");
            }
        }
    }
}

impl CaptureStream for CpalStream {
    fn read_block(&mut self) -> Result<Vec<u8>> {
        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            warn!(dropped, "audio blocks dropped; capture loop fell behind the device");
        }
        match self.blocks.recv_timeout(self.read_timeout) {
            Ok(block) => Ok(block),
            Err(RecvTimeoutError::Timeout) => Err(anyhow!(
                "no audio block within {} ms",
                self.read_timeout.as_millis()
            )),
            Err(RecvTimeoutError::Disconnected) => Err(anyhow!("audio stream disconnected")),
        }
    }

    fn close(mut self: Box<Self>) {
        self.release();
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.release();
    }
}

fn resolve_device(preferred: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match preferred {
        Some(name) => {
            let mut devices = host.input_devices().context("no input devices available")?;
            devices
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| anyhow!("input device '{name}' not found"))
        }
        None => host
            .default_input_device()
            .context("no default input device available"),
    }
}

fn build_stream(
    preferred: Option<&str>,
    format: &CaptureFormat,
    sender: Sender<Vec<u8>>,
    dropped: Arc<AtomicUsize>,
) -> Result<(cpal::Stream, String)> {
    let device = resolve_device(preferred)?;
    let name = device
        .name()
        .unwrap_or_else(|_| "unknown input device".to_string());
    let sample_format = device
        .default_input_config()
        .with_context(|| format!("'{name}' has no usable input configuration"))?
        .sample_format();
    let config = StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let mut dispatcher = BlockDispatcher::new(format.block_bytes(), sender, dropped);

    let err_fn = |err| warn!("audio stream error: {err}");
    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| dispatcher.push(data, |sample| sample),
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| dispatcher.push(data, u16_to_i16),
            err_fn,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| dispatcher.push(data, f32_to_i16),
            err_fn,
            None,
        ),
        other => bail!("unsupported sample format: {other:?}"),
    }
    .with_context(|| {
        format!(
            "'{name}' rejected {} Hz / {} channel capture",
            format.sample_rate, format.channels
        )
    })?;

    stream.play().context("failed to start audio stream")?;
    Ok((stream, name))
}
