//! audio - Capture, playback scheduling, and PCM transport codec
//!
//! Uses ALSA for audio I/O on dedicated OS threads. The live transport
//! carries raw PCM16 in base64, so there is no compressed codec here, only
//! sample-format conversion and the playback cursor bookkeeping.

mod alsa_device;
pub mod capture;
pub mod pcm;
pub mod playback;

pub use capture::{AlsaCapture, CaptureSource};
pub use playback::{AlsaSink, MonotonicClock, OutputClock, PlaybackScheduler, PlaybackSink};
