//! Turn transcript assembly.
//!
//! The transport streams partial transcription text for both sides of the
//! conversation; fragments arrive interleaved but in order (the message
//! stream is single-threaded). This module is pure bookkeeping: append
//! fragments, snapshot a finished turn when the turn-complete signal lands.

use uuid::Uuid;

/// One completed exchange: what the user said and what the model said back.
/// Immutable once assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptTurn {
    pub id: Uuid,
    pub input: String,
    pub output: String,
}

/// Accumulates transcription fragments for the currently open turn.
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    input: String,
    output: String,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment of the user's speech transcription.
    pub fn on_input_fragment(&mut self, text: &str) {
        self.input.push_str(text);
    }

    /// Append a fragment of the model's speech transcription.
    pub fn on_output_fragment(&mut self, text: &str) {
        self.output.push_str(text);
    }

    /// Freeze the open turn and reset both accumulators for the next one.
    pub fn on_turn_complete(&mut self) -> TranscriptTurn {
        TranscriptTurn {
            id: Uuid::new_v4(),
            input: std::mem::take(&mut self.input),
            output: std::mem::take(&mut self.output),
        }
    }
}
