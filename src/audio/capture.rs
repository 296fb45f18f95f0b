//! Microphone capture chain.
//!
//! Runs on a dedicated OS thread (NOT a tokio task) to keep real-time audio
//! I/O away from async network scheduling. The device is acquired up front so
//! a missing or busy microphone fails the session before it goes live; frames
//! only start flowing once the transport has opened.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use alsa::pcm::PCM;
use tokio::sync::mpsc;

use super::alsa_device::{self, AlsaParams};
use crate::error::LiveError;

/// Source of fixed-size mono f32 capture frames.
///
/// The session only sees this trait, so tests can stand in a fake source
/// without touching hardware.
pub trait CaptureSource: Send {
    /// Open the capture device. Fails with [`LiveError::Permission`] when the
    /// microphone is unavailable.
    fn acquire(&mut self) -> Result<(), LiveError>;

    /// Start delivering frames on `frames`. Must be called after `acquire`.
    fn begin(&mut self, frames: mpsc::Sender<Vec<f32>>) -> Result<(), LiveError>;

    /// Stop the capture thread and release the device synchronously. Leaving
    /// the device open leaks the OS microphone-in-use indicator, so this must
    /// complete before teardown continues. Safe to call more than once.
    fn stop(&mut self);
}

/// ALSA-backed capture source: 16 kHz mono S16LE periods, normalized to f32
/// and reframed into `frame_samples`-sized blocks.
pub struct AlsaCapture {
    device: String,
    sample_rate: u32,
    frame_samples: usize,
    acquired: Option<(PCM, AlsaParams)>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AlsaCapture {
    pub fn new(device: &str, sample_rate: u32, frame_samples: usize) -> Self {
        Self {
            device: device.to_string(),
            sample_rate,
            frame_samples,
            acquired: None,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }
}

impl CaptureSource for AlsaCapture {
    fn acquire(&mut self) -> Result<(), LiveError> {
        if self.acquired.is_some() {
            return Ok(());
        }
        let (pcm, params) = alsa_device::open_capture(&self.device, self.sample_rate)
            .map_err(|e| LiveError::Permission(format!("{:#}", e)))?;
        self.acquired = Some((pcm, params));
        Ok(())
    }

    fn begin(&mut self, frames: mpsc::Sender<Vec<f32>>) -> Result<(), LiveError> {
        let (pcm, params) = self
            .acquired
            .take()
            .ok_or_else(|| LiveError::Permission("capture device not acquired".to_string()))?;

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let frame_samples = self.frame_samples;

        let handle = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                if let Err(e) = capture_thread(&pcm, &params, frame_samples, frames, &running) {
                    log::error!("Capture thread error: {}", e);
                }
            })
            .map_err(|e| LiveError::Permission(format!("failed to spawn capture thread: {}", e)))?;

        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
        // Covers stop-before-begin: release the device we were holding.
        self.acquired.take();
    }
}

impl Drop for AlsaCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_thread(
    pcm: &PCM,
    params: &AlsaParams,
    frame_samples: usize,
    frames: mpsc::Sender<Vec<f32>>,
    running: &AtomicBool,
) -> anyhow::Result<()> {
    let period_size = params.period_size;
    let mut read_buf = vec![0i16; period_size * params.channels as usize];
    let mut accum: Vec<f32> = Vec::with_capacity(frame_samples * 2);

    let io = pcm.io_i16()?;

    log::info!(
        "Capture started: rate={}, period={}, frame_samples={}",
        params.sample_rate,
        period_size,
        frame_samples,
    );

    while running.load(Ordering::Relaxed) {
        match io.readi(&mut read_buf) {
            Ok(n) => {
                for &s in &read_buf[..n] {
                    accum.push(s as f32 / 32768.0);
                }
                while accum.len() >= frame_samples {
                    let frame: Vec<f32> = accum[..frame_samples].to_vec();
                    if frames.blocking_send(frame).is_err() {
                        log::warn!("Frame receiver dropped, stopping capture");
                        return Ok(());
                    }
                    accum.drain(..frame_samples);
                }
            }
            Err(e) => {
                log::warn!("ALSA capture error: {}, recovering...", e);
                if let Err(e2) = pcm.prepare() {
                    log::error!("Failed to recover PCM capture: {}", e2);
                    break;
                }
            }
        }
    }

    log::info!("Capture stopped");
    Ok(())
}
