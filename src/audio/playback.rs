//! Gap-free playback scheduling for inbound audio chunks.
//!
//! The output device has no implicit queue, so ordering is constructed here:
//! a monotone cursor marks the next free playback slot, every decoded chunk
//! is scheduled at `max(cursor, now)`, and the cursor advances by exactly the
//! chunk's duration. Buffers therefore never overlap and never play out of
//! enqueue order, even when the network delivers them in bursts.
//!
//! Actual emission happens on a dedicated OS thread that sleeps until each
//! buffer's start time and pushes the samples into a [`PlaybackSink`].

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use alsa::pcm::PCM;
use tokio::sync::mpsc;

use super::alsa_device;
use super::pcm;
use crate::error::LiveError;

/// A monotone clock over the output timeline, in seconds.
pub trait OutputClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall-clock seconds since construction.
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl OutputClock for MonotonicClock {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// Destination for decoded mono f32 samples.
pub trait PlaybackSink: Send {
    fn write(&mut self, samples: &[f32]) -> anyhow::Result<()>;

    /// Discard audio already queued inside the output device. Invoked when
    /// scheduled playback is invalidated mid-buffer; the default is a no-op
    /// for sinks with no device-side queue.
    fn halt(&mut self) {}
}

/// Samples handed to the sink per call. Invalidation is re-checked between
/// slices, so `stop_all` cuts into a buffer that is already being written
/// instead of waiting for the whole chunk to drain.
const WRITE_SLICE_SAMPLES: usize = 1024;

/// ALSA-backed sink: f32 → i16, `writei` with XRUN recovery and bounded
/// retries so a device that stops accepting data cannot wedge the thread.
pub struct AlsaSink {
    pcm: PCM,
}

impl AlsaSink {
    pub fn open(device: &str, sample_rate: u32) -> anyhow::Result<Self> {
        let (pcm, _params) = alsa_device::open_playback(device, sample_rate)?;
        Ok(Self { pcm })
    }
}

impl PlaybackSink for AlsaSink {
    fn write(&mut self, samples: &[f32]) -> anyhow::Result<()> {
        let pcm_data: Vec<i16> = samples.iter().map(|&s| (s * 32768.0) as i32 as i16).collect();

        let io = self.pcm.io_i16()?;
        let mut frames_written = 0;
        let mut retry_count = 0u32;
        while frames_written < pcm_data.len() {
            match io.writei(&pcm_data[frames_written..]) {
                Ok(n) => {
                    frames_written += n;
                    retry_count = 0;
                }
                Err(e) => {
                    log::warn!("ALSA XRUN or error: {}, recovering...", e);
                    retry_count += 1;
                    if let Err(e2) = self.pcm.prepare() {
                        anyhow::bail!("Failed to recover PCM playback: {}", e2);
                    }
                    if retry_count >= 3 {
                        log::error!(
                            "Max recovery retries reached. Dropping {} unwritten samples.",
                            pcm_data.len() - frames_written,
                        );
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn halt(&mut self) {
        // snd_pcm_drop discards frames already sitting in the device buffer.
        if let Err(e) = self.pcm.drop() {
            log::warn!("Failed to drop queued playback frames: {}", e);
        }
        if let Err(e) = self.pcm.prepare() {
            log::warn!("Failed to re-prepare playback device: {}", e);
        }
    }
}

struct Scheduled {
    id: u64,
    generation: u64,
    start: f64,
    samples: Vec<f32>,
}

/// Decodes inbound base64 PCM16 chunks and schedules them for gap-free,
/// order-preserving playback.
pub struct PlaybackScheduler {
    cursor: f64,
    next_id: u64,
    sample_rate: u32,
    clock: Arc<dyn OutputClock>,
    pending: Arc<Mutex<HashSet<u64>>>,
    generation: Arc<AtomicU64>,
    tx: Option<mpsc::UnboundedSender<Scheduled>>,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackScheduler {
    pub fn new(
        sink: Box<dyn PlaybackSink>,
        clock: Arc<dyn OutputClock>,
        sample_rate: u32,
    ) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending: Arc<Mutex<HashSet<u64>>> = Arc::new(Mutex::new(HashSet::new()));
        let generation = Arc::new(AtomicU64::new(0));

        let handle = {
            let pending = pending.clone();
            let generation = generation.clone();
            let clock = clock.clone();
            thread::Builder::new()
                .name("audio-playback".into())
                .spawn(move || playback_thread(sink, clock, rx, pending, generation))?
        };

        Ok(Self {
            cursor: 0.0,
            next_id: 0,
            sample_rate,
            clock,
            pending,
            generation,
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Decode one base64 PCM16 chunk and schedule it after everything already
    /// queued. A malformed chunk fails here without touching the pending set
    /// or the cursor; the caller logs it and the stream carries on.
    pub fn enqueue(&mut self, b64: &str) -> Result<(), LiveError> {
        let bytes = pcm::decode_base64(b64)?;
        let planar = pcm16_mono(&bytes)?;

        let duration = planar.len() as f64 / self.sample_rate as f64;
        let now = self.clock.now();
        let start = if self.cursor > now { self.cursor } else { now };

        let id = self.next_id;
        self.next_id += 1;

        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| LiveError::Teardown("playback already shut down".to_string()))?;

        self.pending.lock().unwrap().insert(id);
        if tx
            .send(Scheduled {
                id,
                generation: self.generation.load(Ordering::SeqCst),
                start,
                samples: planar,
            })
            .is_err()
        {
            self.pending.lock().unwrap().remove(&id);
            return Err(LiveError::Teardown("playback thread gone".to_string()));
        }

        self.cursor = start + duration;
        Ok(())
    }

    /// Halt every scheduled buffer and clear the pending set. The cursor is
    /// left where it is; use [`reset`](Self::reset) when starting over.
    pub fn stop_all(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().unwrap().clear();
    }

    /// Zero the cursor for a fresh session.
    pub fn reset(&mut self) {
        self.cursor = 0.0;
    }

    /// Next free playback slot on the output clock, in seconds.
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Number of buffers scheduled but not yet played to completion.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    fn shutdown(&mut self) {
        self.stop_all();
        self.tx.take();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn pcm16_mono(bytes: &[u8]) -> Result<Vec<f32>, LiveError> {
    let mut planar = pcm::pcm16_to_planar(bytes, 1)?;
    planar
        .pop()
        .ok_or_else(|| LiveError::Decode("empty chunk".to_string()))
}

fn playback_thread(
    mut sink: Box<dyn PlaybackSink>,
    clock: Arc<dyn OutputClock>,
    mut rx: mpsc::UnboundedReceiver<Scheduled>,
    pending: Arc<Mutex<HashSet<u64>>>,
    generation: Arc<AtomicU64>,
) {
    log::info!("Playback thread started");
    while let Some(buf) = rx.blocking_recv() {
        // Wait for the buffer's slot, in short hops so stop_all can cut in.
        loop {
            if generation.load(Ordering::SeqCst) != buf.generation {
                break;
            }
            let wait = buf.start - clock.now();
            if wait <= 0.0 {
                break;
            }
            thread::sleep(Duration::from_secs_f64(wait.min(0.05)));
        }

        if generation.load(Ordering::SeqCst) != buf.generation {
            // Invalidated by stop_all while queued or waiting.
            pending.lock().unwrap().remove(&buf.id);
            continue;
        }

        for slice in buf.samples.chunks(WRITE_SLICE_SAMPLES) {
            if generation.load(Ordering::SeqCst) != buf.generation {
                // stop_all landed mid-buffer: flush the device queue too.
                log::debug!("Playback buffer halted mid-write");
                sink.halt();
                break;
            }
            if let Err(e) = sink.write(slice) {
                log::error!("Playback sink error: {}", e);
                break;
            }
        }
        pending.lock().unwrap().remove(&buf.id);
    }
    log::info!("Playback thread stopped");
}
