//! Bit-exact conversion between `f32` values and the 4-byte texel payload.
//!
//! A texel holds the raw IEEE-754 bit pattern of one float, least
//! significant byte first. This is a reinterpretation, not a numeric
//! conversion, so every pattern (signed zeros, infinities, NaN payloads)
//! survives the round trip. The WGSL kernels implement the same layout.

use crate::error::{MatrixError, Result};

/// Bytes per encoded texel.
pub const TEXEL_BYTES: usize = 4;

/// Split the bit pattern of `value` into four bytes, LSB first.
#[inline]
pub fn encode(value: f32) -> [u8; 4] {
    value.to_bits().to_le_bytes()
}

/// Reassemble a float from four LSB-first bytes.
#[inline]
pub fn decode(bytes: [u8; 4]) -> f32 {
    f32::from_bits(u32::from_le_bytes(bytes))
}

/// Encode a row-major slice into a contiguous texel byte buffer.
pub fn encode_slice(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * TEXEL_BYTES);
    for &v in values {
        out.extend_from_slice(&encode(v));
    }
    out
}

/// Decode a contiguous texel byte buffer.
///
/// # Errors
/// Returns an error if `bytes.len()` is not a multiple of 4.
pub fn decode_slice(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % TEXEL_BYTES != 0 {
        return Err(MatrixError::InvalidArgument(format!(
            "texel buffer of {} bytes is not a multiple of {}",
            bytes.len(),
            TEXEL_BYTES
        )));
    }
    Ok(bytes
        .chunks_exact(TEXEL_BYTES)
        .map(|c| decode([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_byte_order() {
        // 1.0 == 0x3F80_0000
        assert_eq!(encode(1.0), [0x00, 0x00, 0x80, 0x3F]);
        // sign lives in the top bit of the last byte
        assert_eq!(encode(-0.0), [0x00, 0x00, 0x00, 0x80]);
        assert_eq!(encode(-1.0)[3] & 0x80, 0x80);
    }

    #[test]
    fn test_known_values() {
        let values = [-1.0f32, -0.5, 0.0, 0.5, 1.0];
        let expected: [[u8; 4]; 5] = [
            [0x00, 0x00, 0x80, 0xBF],
            [0x00, 0x00, 0x00, 0xBF],
            [0x00, 0x00, 0x00, 0x00],
            [0x00, 0x00, 0x00, 0x3F],
            [0x00, 0x00, 0x80, 0x3F],
        ];
        for (v, e) in values.iter().zip(expected.iter()) {
            assert_eq!(&encode(*v), e);
        }
    }

    #[test]
    fn test_special_patterns_round_trip() {
        let patterns: [u32; 8] = [
            0x0000_0000, // +0
            0x8000_0000, // -0
            0x7F80_0000, // +inf
            0xFF80_0000, // -inf
            0x7FC0_0000, // quiet NaN
            0x7F80_0001, // signalling NaN payload
            0xFFC1_2345, // negative NaN with payload
            0x0000_0001, // smallest subnormal
        ];
        for bits in patterns {
            let bytes = bits.to_le_bytes();
            assert_eq!(encode(decode(bytes)), bytes, "pattern {bits:#010x}");
            assert_eq!(decode(encode(f32::from_bits(bits))).to_bits(), bits);
        }
    }

    #[test]
    fn test_random_patterns_round_trip() {
        let mut rng = StdRng::seed_from_u64(0x7E57);
        for _ in 0..100_000 {
            let bits: u32 = rng.gen();
            let bytes = bits.to_le_bytes();
            assert_eq!(encode(decode(bytes)), bytes);
        }
    }

    #[test]
    fn test_slice_helpers() {
        let values = vec![1.5f32, -2.25, f32::INFINITY, -0.0];
        let bytes = encode_slice(&values);
        assert_eq!(bytes.len(), 16);
        let back = decode_slice(&bytes).unwrap();
        let bits: Vec<u32> = back.iter().map(|v| v.to_bits()).collect();
        let expected: Vec<u32> = values.iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits, expected);
    }

    #[test]
    fn test_decode_slice_rejects_partial_texel() {
        assert!(decode_slice(&[0u8; 7]).is_err());
        assert!(decode_slice(&[]).unwrap().is_empty());
    }
}
