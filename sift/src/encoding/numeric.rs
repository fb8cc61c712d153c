//! Shift-tagged sortable encoding for numeric terms.
//!
//! Numeric, date-time and geo-point fields reach the aggregation engine as
//! prefix-coded terms: the first byte is `0x20 + shift`, the remaining bytes
//! carry the sign-flipped value shifted right by `shift`, seven bits per byte,
//! most significant first. The index writes one term per precision step, so
//! only terms with a shift of zero carry the original value.

use crate::{Error, Result};

/// Marker byte for an int64 term with a shift of zero.
pub const SHIFT_START_INT64: u8 = 0x20;

const MAX_SHIFT: u32 = 63;
const SIGN_FLIP: u64 = 0x8000_0000_0000_0000;
const FLOAT_FLIP: i64 = 0x7fff_ffff_ffff_ffff;

fn payload_len(shift: u32) -> usize {
    (((MAX_SHIFT - shift) / 7) + 1) as usize
}

fn encode_unchecked(value: i64, shift: u32) -> Vec<u8> {
    let mut out = vec![0u8; payload_len(shift) + 1];
    out[0] = SHIFT_START_INT64 + shift as u8;

    let mut bits = ((value as u64) ^ SIGN_FLIP) >> shift;
    for slot in out[1..].iter_mut().rev() {
        *slot = (bits & 0x7f) as u8;
        bits >>= 7;
    }
    out
}

/// Encode `value` at the given precision step.
pub fn encode_i64(value: i64, shift: u32) -> Result<Vec<u8>> {
    if shift > MAX_SHIFT {
        return Err(Error::Encoding(format!(
            "shift {} out of range 0..={}",
            shift, MAX_SHIFT
        )));
    }
    Ok(encode_unchecked(value, shift))
}

/// Full-precision (shift 0) term for an int64 value.
pub fn encode_full_i64(value: i64) -> Vec<u8> {
    encode_unchecked(value, 0)
}

/// Full-precision term for a float value.
pub fn encode_f64(value: f64) -> Vec<u8> {
    encode_full_i64(f64_to_sortable_i64(value))
}

/// Full-precision term for a Unix timestamp in nanoseconds.
pub fn encode_timestamp_nanos(nanos: i64) -> Vec<u8> {
    encode_full_i64(nanos)
}

/// Precision step of a term, or `None` when the marker byte is not a
/// numeric marker.
pub fn shift(term: &[u8]) -> Option<u32> {
    let first = *term.first()?;
    let shift = u32::from(first.wrapping_sub(SHIFT_START_INT64));
    (shift <= MAX_SHIFT).then_some(shift)
}

/// Decode the (shifted) value carried by a term.
///
/// Returns `None` for terms with an invalid marker, a payload of the wrong
/// length, or payload bytes with the high bit set.
pub fn decode_i64(term: &[u8]) -> Option<i64> {
    let shift = shift(term)?;
    let payload = &term[1..];
    if payload.len() != payload_len(shift) {
        return None;
    }

    let mut bits: u64 = 0;
    for &byte in payload {
        if byte & 0x80 != 0 {
            return None;
        }
        bits = (bits << 7) | u64::from(byte);
    }
    Some(((bits << shift) ^ SIGN_FLIP) as i64)
}

/// Decode a term only if it carries a full-precision value.
pub fn full_precision_i64(term: &[u8]) -> Option<i64> {
    if shift(term)? != 0 {
        return None;
    }
    decode_i64(term)
}

/// Decode a full-precision float term.
pub fn full_precision_f64(term: &[u8]) -> Option<f64> {
    full_precision_i64(term).map(sortable_i64_to_f64)
}

/// Map a float onto an i64 whose ordering matches the float ordering.
pub fn f64_to_sortable_i64(value: f64) -> i64 {
    let bits = value.to_bits() as i64;
    if bits < 0 {
        bits ^ FLOAT_FLIP
    } else {
        bits
    }
}

pub fn sortable_i64_to_f64(value: i64) -> f64 {
    let bits = if value < 0 { value ^ FLOAT_FLIP } else { value };
    f64::from_bits(bits as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference vectors shared with the Lucene-compatible encoder.
    fn vectors() -> Vec<(i64, u32, Vec<u8>)> {
        vec![
            (1, 0, vec![0x20, 0x1, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x1]),
            (-1, 0, vec![0x20, 0x0, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f]),
            (-94582, 0, vec![0x20, 0x0, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f, 0x7a, 0x1d, 0xa]),
            (314729851, 0, vec![0x20, 0x1, 0x0, 0x0, 0x0, 0x0, 0x1, 0x16, 0x9, 0x4a, 0x7b]),
            (314729851, 4, vec![0x24, 0x8, 0x0, 0x0, 0x0, 0x0, 0x9, 0x30, 0x4c, 0x57]),
            (314729851, 8, vec![0x28, 0x40, 0x0, 0x0, 0x0, 0x0, 0x4b, 0x4, 0x65]),
            (314729851, 16, vec![0x30, 0x20, 0x0, 0x0, 0x0, 0x0, 0x25, 0x42]),
            (314729851, 32, vec![0x40, 0x8, 0x0, 0x0, 0x0, 0x0]),
        ]
    }

    #[test]
    fn test_encode_matches_reference_vectors() {
        for (input, shift_value, expected) in vectors() {
            let encoded = encode_i64(input, shift_value).unwrap();
            assert_eq!(encoded, expected, "input {} shift {}", input, shift_value);
            assert_eq!(shift(&encoded), Some(shift_value));
            if shift_value == 0 {
                assert_eq!(decode_i64(&encoded), Some(input));
            }
        }
    }

    #[test]
    fn test_shift_out_of_range_rejected() {
        assert!(encode_i64(5, 64).is_err());
    }

    #[test]
    fn test_malformed_terms_rejected() {
        // marker below the numeric range
        assert_eq!(decode_i64(&[0x19, b'c', b'a', b't']), None);
        // marker above the numeric range
        assert_eq!(decode_i64(&[0x20 + 64, b'c']), None);
        // payload too long
        assert_eq!(
            decode_i64(&[0x20, 0x1, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x1]),
            None
        );
        // payload too short
        assert_eq!(decode_i64(&[0x20 + 63]), None);
        assert_eq!(decode_i64(b""), None);
        assert_eq!(decode_i64(b"Apple"), None);
    }

    #[test]
    fn test_full_precision_ignores_shifted_terms() {
        let shifted = encode_i64(f64_to_sortable_i64(42.0), 4).unwrap();
        assert_eq!(full_precision_f64(&shifted), None);
        assert_eq!(full_precision_f64(&encode_f64(42.0)), Some(42.0));
    }

    #[test]
    fn test_sortable_float_ordering() {
        let values = [-1e300, -2.5, -0.0, 0.0, 1e-9, 3.75, f64::MAX];
        for pair in values.windows(2) {
            assert!(f64_to_sortable_i64(pair[0]) <= f64_to_sortable_i64(pair[1]));
        }
        assert_eq!(sortable_i64_to_f64(f64_to_sortable_i64(-2.5)), -2.5);
    }

    #[test]
    fn test_timestamp_terms() {
        let nanos = 1_705_276_800_000_000_000;
        assert_eq!(full_precision_i64(&encode_timestamp_nanos(nanos)), Some(nanos));
    }
}
