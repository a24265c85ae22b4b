//! Conversion between floating-point samples and the 16-bit wire format.
//!
//! The wire carries 16-bit signed little-endian PCM. Encoding clamps to
//! `[-1.0, 1.0]` and scales by 32767; decoding divides by 32768. Pure and
//! stateless — invertible up to quantization.

/// Quantize floating samples to 16-bit signed integers.
pub fn quantize(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0).round() as i16)
        .collect()
}

/// Expand 16-bit signed integers to floating samples in `[-1.0, ~1.0)`.
pub fn dequantize(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Pack 16-bit samples into little-endian bytes.
pub fn pack_i16_le(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}

/// Unpack little-endian bytes into 16-bit samples.
///
/// An odd trailing byte is ignored — the wire edge tolerates truncation.
pub fn unpack_i16_le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encode floating samples straight to wire bytes.
pub fn encode(samples: &[f32]) -> Vec<u8> {
    pack_i16_le(&quantize(samples))
}

/// Decode wire bytes straight to floating samples.
pub fn decode(bytes: &[u8]) -> Vec<f32> {
    dequantize(&unpack_i16_le(bytes))
}
