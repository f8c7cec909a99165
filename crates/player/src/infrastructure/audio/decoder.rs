//! PCM16 chunk decoding.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

/// Divisor mapping i16 samples onto [-1.0, 1.0).
const PCM16_SCALE: f32 = 32768.0;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Invalid base64 audio payload: {0}")]
    Base64(String),

    #[error("PCM16 payload has odd byte length {0}")]
    OddLength(usize),
}

/// Decode a base64 string of signed 16-bit little-endian samples into floats.
pub fn decode_pcm16_base64(payload: &str) -> Result<Vec<f32>, DecodeError> {
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| DecodeError::Base64(e.to_string()))?;
    pcm16_le_to_f32(&bytes)
}

pub fn pcm16_le_to_f32(bytes: &[u8]) -> Result<Vec<f32>, DecodeError> {
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / PCM16_SCALE)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(samples: &[i16]) -> String {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        STANDARD.encode(bytes)
    }

    #[test]
    fn decodes_extremes_and_silence() {
        let decoded = decode_pcm16_base64(&encode(&[0, i16::MIN, i16::MAX, 16384]))
            .expect("valid payload");
        assert_eq!(decoded[0], 0.0);
        assert_eq!(decoded[1], -1.0);
        assert!((decoded[2] - 0.999_969).abs() < 1e-5);
        assert_eq!(decoded[3], 0.5);
    }

    #[test]
    fn empty_payload_is_empty_buffer() {
        assert_eq!(decode_pcm16_base64("").expect("valid payload"), Vec::<f32>::new());
    }

    #[test]
    fn rejects_bad_base64() {
        assert!(matches!(
            decode_pcm16_base64("!!not-base64!!"),
            Err(DecodeError::Base64(_))
        ));
    }

    #[test]
    fn rejects_odd_length() {
        let payload = STANDARD.encode([1u8, 2, 3]);
        assert_eq!(decode_pcm16_base64(&payload), Err(DecodeError::OddLength(3)));
    }
}
