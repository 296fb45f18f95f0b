//! Wire message types for the live transport.
//!
//! Field names and nesting are fixed by the remote service; everything is
//! camelCase JSON on the wire.

use serde::{Deserialize, Serialize};

pub const PCM16_MIME: &str = "audio/pcm;rate=16000";

// ======================== Outbound ========================

/// First message after the socket opens: which model to talk to and how it
/// should answer.
#[derive(Serialize)]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub input_audio_transcription: TranscriptionConfig,
    pub output_audio_transcription: TranscriptionConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Serialize)]
pub struct TextPart {
    pub text: String,
}

/// Empty marker object: its presence in the setup turns transcription on.
#[derive(Serialize)]
pub struct TranscriptionConfig {}

/// One microphone chunk on its way to the model.
#[derive(Serialize, Debug)]
pub struct MediaMessage {
    pub media: MediaChunk,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    /// Base64 PCM16 payload.
    pub data: String,
    pub mime_type: String,
}

impl MediaChunk {
    pub fn pcm16(data: String) -> Self {
        Self {
            data,
            mime_type: PCM16_MIME.to_string(),
        }
    }
}

// ======================== Inbound ========================

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    pub server_content: Option<ServerContent>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    pub input_transcription: Option<Transcription>,
    pub output_transcription: Option<Transcription>,
    pub turn_complete: Option<bool>,
    pub model_turn: Option<ModelTurn>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Transcription {
    pub text: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ModelTurn {
    pub parts: Vec<Part>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub inline_data: Option<InlineData>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub data: String,
    pub mime_type: Option<String>,
}

impl ServerMessage {
    /// Base64 audio payload of the first part of the model turn, if any.
    pub fn inline_audio(&self) -> Option<&str> {
        self.server_content
            .as_ref()?
            .model_turn
            .as_ref()?
            .parts
            .first()?
            .inline_data
            .as_ref()
            .map(|d| d.data.as_str())
    }
}
