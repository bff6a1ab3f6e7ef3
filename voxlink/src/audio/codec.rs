//! PCM wire codec
//!
//! Stateless conversion between the transport representation (signed 16-bit
//! little-endian integers) and the engine representation (f32 in [-1, 1]).
//!
//! The scale factor is 32768 with round-to-nearest on encode, so
//! `encode(decode(bytes))` reproduces `bytes` exactly and
//! `decode(encode(samples))` is within 1/32768 of `samples` per element.

use crate::audio::error::{AudioError, AudioResult};

/// Scale between normalized f32 samples and i16 wire samples.
pub const PCM_SCALE: f32 = 32768.0;

/// Encode normalized f32 samples as i16 little-endian bytes.
///
/// Out-of-range samples are clamped to the i16 range.
pub fn encode(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let scaled = (sample * PCM_SCALE)
            .round()
            .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        bytes.extend_from_slice(&scaled.to_le_bytes());
    }
    bytes
}

/// Decode i16 little-endian bytes into normalized f32 samples.
///
/// Odd-length input is malformed: the caller gets `MalformedInput` and is
/// expected to log it and treat the chunk as empty instead of aborting the
/// stream.
pub fn decode(bytes: &[u8]) -> AudioResult<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(AudioError::MalformedInput(format!(
            "odd byte length {}",
            bytes.len()
        )));
    }

    let mut samples = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks_exact(2) {
        let value = i16::from_le_bytes([pair[0], pair[1]]);
        samples.push(value as f32 / PCM_SCALE);
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_values() {
        let bytes = encode(&[-1.0, 0.0, 0.5]);
        assert_eq!(bytes.len(), 6);

        // -1.0 * 32768 = -32768 = 0x8000
        assert_eq!(&bytes[0..2], &[0x00, 0x80]);
        // 0.0 -> 0
        assert_eq!(&bytes[2..4], &[0x00, 0x00]);
        // 0.5 * 32768 = 16384 = 0x4000
        assert_eq!(&bytes[4..6], &[0x00, 0x40]);
    }

    #[test]
    fn test_encode_clamps_overrange() {
        let bytes = encode(&[2.0, -2.0, 1.0]);
        let decoded = decode(&bytes).unwrap();

        assert!((decoded[0] - 32767.0 / PCM_SCALE).abs() < f32::EPSILON);
        assert!((decoded[1] + 1.0).abs() < f32::EPSILON);
        // +1.0 saturates to 32767, one quantization step below unity
        assert!((decoded[2] - 1.0).abs() <= 1.0 / PCM_SCALE);
    }

    #[test]
    fn test_decode_then_encode_is_lossless() {
        // Every i16 pattern must survive a decode/encode round trip
        let values: Vec<i16> = vec![i16::MIN, -12345, -1, 0, 1, 255, 12345, i16::MAX];
        let mut bytes = Vec::new();
        for v in &values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }

        let samples = decode(&bytes).unwrap();
        assert_eq!(samples.len(), values.len());
        assert_eq!(encode(&samples), bytes);
    }

    #[test]
    fn test_encode_then_decode_within_quantization() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.013).sin()).collect();
        let decoded = decode(&encode(&samples)).unwrap();

        for (a, b) in samples.iter().zip(decoded.iter()) {
            assert!(
                (a - b).abs() <= 1.0 / PCM_SCALE,
                "sample drifted: {} vs {}",
                a,
                b
            );
        }
    }

    #[test]
    fn test_decode_odd_length_is_malformed() {
        let result = decode(&[0x01, 0x02, 0x03]);
        assert!(matches!(result, Err(AudioError::MalformedInput(_))));
    }

    #[test]
    fn test_decode_empty() {
        assert!(decode(&[]).unwrap().is_empty());
        assert!(encode(&[]).is_empty());
    }
}
