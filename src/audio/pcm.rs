//! Raw PCM16 conversion and base64 transport encoding.
//!
//! The live transport carries uncompressed 16-bit little-endian PCM wrapped
//! in base64 text, so the codec here is pure sample-format plumbing: f32
//! capture frames → PCM16 bytes on the way out, base64 → PCM16 → planar f32
//! on the way in.

use crate::error::LiveError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;

/// Convert f32 samples in [-1, 1] to little-endian PCM16 bytes.
///
/// Each sample is scaled by 32768 and truncated toward zero with NO
/// clamping: samples outside [-1, 1] wrap modulo 2^16 instead of clipping.
/// This matches what the remote service was tuned against; do not "fix" it
/// here without a product decision.
pub fn floats_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s * 32768.0) as i32 as i16;
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode interleaved little-endian PCM16 bytes into one planar f32 buffer
/// per channel, normalized by 1/32768.
///
/// Fails when the byte length is not a whole number of frames.
pub fn pcm16_to_planar(bytes: &[u8], num_channels: usize) -> Result<Vec<Vec<f32>>, LiveError> {
    let frame_bytes = 2 * num_channels;
    if num_channels == 0 || bytes.len() % frame_bytes != 0 {
        return Err(LiveError::Decode(format!(
            "{} bytes is not a multiple of {} (PCM16 x {} channels)",
            bytes.len(),
            frame_bytes,
            num_channels,
        )));
    }

    let frame_count = bytes.len() / frame_bytes;
    let mut planar = vec![vec![0f32; frame_count]; num_channels];
    for i in 0..frame_count {
        for c in 0..num_channels {
            let off = (i * num_channels + c) * 2;
            let v = i16::from_le_bytes([bytes[off], bytes[off + 1]]);
            planar[c][i] = v as f32 / 32768.0;
        }
    }
    Ok(planar)
}

/// Base64-encode raw bytes for the transport (standard alphabet, padded).
pub fn encode_base64(bytes: &[u8]) -> String {
    B64.encode(bytes)
}

/// Decode transport base64 back to raw bytes.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, LiveError> {
    B64.decode(text)
        .map_err(|e| LiveError::Decode(format!("invalid base64: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm16_round_trip_within_one_lsb() {
        let samples: Vec<f32> = vec![-1.0, -0.5, -0.1234, 0.0, 0.1234, 0.5, 0.9999];
        let bytes = floats_to_pcm16(&samples);
        let planar = pcm16_to_planar(&bytes, 1).unwrap();
        assert_eq!(planar.len(), 1);
        for (orig, round) in samples.iter().zip(&planar[0]) {
            assert!(
                (orig - round).abs() <= 1.0 / 32768.0,
                "sample {} came back as {}",
                orig,
                round,
            );
        }
    }

    #[test]
    fn overdriven_samples_wrap_instead_of_clipping() {
        // 1.0 * 32768 overflows i16 and wraps to -32768.
        let bytes = floats_to_pcm16(&[1.0]);
        let planar = pcm16_to_planar(&bytes, 1).unwrap();
        assert_eq!(planar[0][0], -1.0);
    }

    #[test]
    fn base64_round_trip() {
        let data: Vec<u8> = (0..=255).collect();
        let text = encode_base64(&data);
        assert_eq!(decode_base64(&text).unwrap(), data);
    }

    #[test]
    fn odd_byte_length_is_a_decode_error() {
        let err = pcm16_to_planar(&[0, 1, 2], 1).unwrap_err();
        assert!(matches!(err, LiveError::Decode(_)));
    }

    #[test]
    fn stereo_deinterleave_indexing() {
        // Frames: L=[1, 3], R=[2, 4] interleaved as 1,2,3,4.
        let mut bytes = Vec::new();
        for v in [1i16, 2, 3, 4] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let planar = pcm16_to_planar(&bytes, 2).unwrap();
        assert_eq!(planar[0], vec![1.0 / 32768.0, 3.0 / 32768.0]);
        assert_eq!(planar[1], vec![2.0 / 32768.0, 4.0 / 32768.0]);
    }

    #[test]
    fn byte_length_must_cover_all_channels() {
        // 6 bytes = 3 samples: not a whole number of stereo frames.
        let err = pcm16_to_planar(&[0u8; 6], 2).unwrap_err();
        assert!(matches!(err, LiveError::Decode(_)));
    }
}
