//! Error taxonomy for the live pipeline.
//!
//! Everything except `Decode` is caught at the session boundary and turned
//! into a state transition; `Decode` is recovered locally by dropping the
//! offending chunk.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LiveError {
    /// Audio device access denied or unavailable, on either the microphone
    /// or the playback side.
    #[error("audio device unavailable: {0}")]
    Permission(String),

    /// The live connection failed to open or errored mid-session.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Malformed inbound audio chunk. Non-fatal; the chunk is dropped.
    #[error("malformed audio chunk: {0}")]
    Decode(String),

    /// A resource failed to release during teardown. Logged and swallowed so
    /// the remaining resources still get cleaned up.
    #[error("teardown failure: {0}")]
    Teardown(String),
}
