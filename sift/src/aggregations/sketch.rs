//! HyperLogLog(++) sketch for approximate distinct counting.
//!
//! Registers are kept dense in memory (one byte each). The serialized form is
//! either a sparse list of non-zero registers or the dense registers packed at
//! six bits apiece, whichever is shorter, so a sketch never serializes to more
//! than `2^p` bytes.

use xxhash_rust::xxh3::xxh3_64;

use crate::{Error, Result};

pub const DEFAULT_PRECISION: u8 = 14;
pub const MIN_PRECISION: u8 = 4;
pub const MAX_PRECISION: u8 = 18;

const FORMAT_DENSE: u8 = 1;
const FORMAT_SPARSE: u8 = 2;
const HEADER_LEN: usize = 2;
const SPARSE_ENTRY_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HyperLogLog {
    precision: u8,
    registers: Vec<u8>,
}

impl Default for HyperLogLog {
    fn default() -> Self {
        Self::with_precision(DEFAULT_PRECISION)
    }
}

impl HyperLogLog {
    /// Create a sketch; precision must lie in `4..=18`.
    pub fn new(precision: u8) -> Result<Self> {
        if !Self::is_valid_precision(precision) {
            return Err(Error::Sketch(format!(
                "precision {} out of range {}..={}",
                precision, MIN_PRECISION, MAX_PRECISION
            )));
        }
        Ok(Self::with_precision(precision))
    }

    fn with_precision(precision: u8) -> Self {
        Self {
            precision,
            registers: vec![0; 1 << precision],
        }
    }

    pub fn is_valid_precision(precision: u8) -> bool {
        (MIN_PRECISION..=MAX_PRECISION).contains(&precision)
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    fn max_rank(&self) -> u8 {
        64 - self.precision + 1
    }

    pub fn insert(&mut self, bytes: &[u8]) {
        let hash = xxh3_64(bytes);
        let p = u32::from(self.precision);
        let index = (hash >> (64 - p)) as usize;
        let rank = ((hash << p).leading_zeros() + 1).min(u32::from(self.max_rank())) as u8;
        if rank > self.registers[index] {
            self.registers[index] = rank;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.registers.iter().all(|&r| r == 0)
    }

    /// Distinct-count estimate using Ertl's improved raw estimator, which
    /// stays unbiased from empty through saturated sketches without
    /// empirical correction tables.
    pub fn estimate(&self) -> u64 {
        let m = self.registers.len() as f64;
        let q = usize::from(64 - self.precision);

        // histogram of register values, 0..=q+1
        let mut counts = vec![0u32; q + 2];
        for &r in &self.registers {
            counts[usize::from(r)] += 1;
        }
        if f64::from(counts[0]) == m {
            return 0;
        }

        let mut z = m * tau(1.0 - f64::from(counts[q + 1]) / m);
        for k in (1..=q).rev() {
            z = 0.5 * (z + f64::from(counts[k]));
        }
        z += m * sigma(f64::from(counts[0]) / m);

        let alpha_inf = 0.5 / std::f64::consts::LN_2;
        (alpha_inf * m * m / z).round() as u64
    }

    /// Fold `other` into this sketch. Both must share a precision.
    pub fn merge(&mut self, other: &HyperLogLog) -> Result<()> {
        if self.precision != other.precision {
            return Err(Error::Sketch(format!(
                "cannot merge sketches with precision {} and {}",
                self.precision, other.precision
            )));
        }
        for (mine, theirs) in self.registers.iter_mut().zip(&other.registers) {
            if *theirs > *mine {
                *mine = *theirs;
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let non_zero = self.registers.iter().filter(|&&r| r != 0).count();
        let sparse_len = HEADER_LEN + 4 + non_zero * SPARSE_ENTRY_LEN;
        let dense_len = HEADER_LEN + (self.registers.len() * 6).div_ceil(8);

        if sparse_len < dense_len {
            let mut out = Vec::with_capacity(sparse_len);
            out.push(FORMAT_SPARSE);
            out.push(self.precision);
            out.extend_from_slice(&(non_zero as u32).to_le_bytes());
            for (idx, &r) in self.registers.iter().enumerate() {
                if r != 0 {
                    let idx = idx as u32;
                    out.extend_from_slice(&idx.to_le_bytes()[..3]);
                    out.push(r);
                }
            }
            out
        } else {
            let mut out = Vec::with_capacity(dense_len);
            out.push(FORMAT_DENSE);
            out.push(self.precision);
            let mut acc: u32 = 0;
            let mut bits = 0;
            for &r in &self.registers {
                acc |= u32::from(r & 0x3f) << bits;
                bits += 6;
                while bits >= 8 {
                    out.push((acc & 0xff) as u8);
                    acc >>= 8;
                    bits -= 8;
                }
            }
            if bits > 0 {
                out.push((acc & 0xff) as u8);
            }
            out
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Sketch("truncated sketch header".to_string()));
        }
        let precision = bytes[1];
        let mut sketch = Self::new(precision)?;
        let max_rank = sketch.max_rank();
        let body = &bytes[HEADER_LEN..];

        match bytes[0] {
            FORMAT_SPARSE => {
                if body.len() < 4 {
                    return Err(Error::Sketch("truncated sparse sketch".to_string()));
                }
                let count = u32::from_le_bytes([body[0], body[1], body[2], body[3]]) as usize;
                let entries = &body[4..];
                if entries.len() != count * SPARSE_ENTRY_LEN {
                    return Err(Error::Sketch(format!(
                        "sparse sketch declares {} entries but carries {} bytes",
                        count,
                        entries.len()
                    )));
                }
                for entry in entries.chunks_exact(SPARSE_ENTRY_LEN) {
                    let idx = u32::from_le_bytes([entry[0], entry[1], entry[2], 0]) as usize;
                    let rank = entry[3];
                    if idx >= sketch.registers.len() || rank > max_rank {
                        return Err(Error::Sketch(format!("invalid sparse entry ({}, {})", idx, rank)));
                    }
                    sketch.registers[idx] = rank;
                }
            }
            FORMAT_DENSE => {
                let expected = (sketch.registers.len() * 6).div_ceil(8);
                if body.len() != expected {
                    return Err(Error::Sketch(format!(
                        "dense sketch expected {} bytes, got {}",
                        expected,
                        body.len()
                    )));
                }
                let mut acc: u32 = 0;
                let mut bits = 0;
                let mut input = body.iter();
                for slot in sketch.registers.iter_mut() {
                    while bits < 6 {
                        // length was checked above
                        let byte = input.next().copied().unwrap_or(0);
                        acc |= u32::from(byte) << bits;
                        bits += 8;
                    }
                    let rank = (acc & 0x3f) as u8;
                    if rank > max_rank {
                        return Err(Error::Sketch(format!("invalid register value {}", rank)));
                    }
                    *slot = rank;
                    acc >>= 6;
                    bits -= 6;
                }
            }
            other => {
                return Err(Error::Sketch(format!("unknown sketch format {}", other)));
            }
        }
        Ok(sketch)
    }

    pub fn size_in_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.registers.capacity()
    }
}

fn sigma(mut x: f64) -> f64 {
    if x == 1.0 {
        return f64::INFINITY;
    }
    let mut y = 1.0;
    let mut z = x;
    loop {
        x *= x;
        let prev = z;
        z += x * y;
        y += y;
        if z == prev {
            return z;
        }
    }
}

fn tau(mut x: f64) -> f64 {
    if x == 0.0 || x == 1.0 {
        return 0.0;
    }
    let mut y = 1.0;
    let mut z = 1.0 - x;
    loop {
        x = x.sqrt();
        let prev = z;
        y *= 0.5;
        z -= (1.0 - x).powi(2) * y;
        if z == prev {
            return z / 3.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(precision: u8, range: std::ops::Range<u32>) -> HyperLogLog {
        let mut hll = HyperLogLog::new(precision).unwrap();
        for i in range {
            hll.insert(format!("item-{}", i).as_bytes());
        }
        hll
    }

    #[test]
    fn test_small_sets_are_exact() {
        let mut hll = HyperLogLog::default();
        for name in ["alice", "bob", "charlie", "alice", "bob", "david", "alice"] {
            hll.insert(name.as_bytes());
        }
        assert_eq!(hll.estimate(), 4);
        assert_eq!(HyperLogLog::default().estimate(), 0);
    }

    #[test]
    fn test_estimate_within_two_percent() {
        let hll = filled(14, 0..10_000);
        let estimate = hll.estimate() as f64;
        assert!((estimate - 10_000.0).abs() / 10_000.0 < 0.02, "estimate {}", estimate);
    }

    #[test]
    fn test_estimate_accurate_around_register_count() {
        // the range between linear counting and the raw estimate
        let m = 1usize << 14;
        for n in [m, m + m / 2, 2 * m] {
            let mut total_error = 0.0;
            for seed in 0..4 {
                let mut hll = HyperLogLog::new(14).unwrap();
                for i in 0..n {
                    hll.insert(format!("run-{}-{}", seed, i).as_bytes());
                }
                total_error += (hll.estimate() as f64 - n as f64) / n as f64;
            }
            let mean_error = total_error / 4.0;
            assert!(mean_error.abs() < 0.02, "n={} mean error {}", n, mean_error);
        }
    }

    #[test]
    fn test_merge_overlapping_shards() {
        let mut a = filled(14, 0..5_000);
        let b = filled(14, 3_000..8_000);
        a.merge(&b).unwrap();
        let estimate = a.estimate() as f64;
        assert!((estimate - 8_000.0).abs() / 8_000.0 < 0.02, "estimate {}", estimate);
    }

    #[test]
    fn test_merge_is_commutative() {
        let a = filled(12, 0..700);
        let b = filled(12, 500..2_000);
        let mut ab = a.clone();
        ab.merge(&b).unwrap();
        let mut ba = b.clone();
        ba.merge(&a).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_merge_rejects_mismatched_precision() {
        let mut a = HyperLogLog::new(10).unwrap();
        let b = HyperLogLog::new(12).unwrap();
        assert!(a.merge(&b).is_err());
    }

    #[test]
    fn test_invalid_precision() {
        assert!(HyperLogLog::new(3).is_err());
        assert!(HyperLogLog::new(19).is_err());
        assert!(HyperLogLog::new(4).is_ok());
    }

    #[test]
    fn test_sparse_and_dense_serialization() {
        let sparse = filled(14, 0..50);
        let bytes = sparse.to_bytes();
        assert_eq!(bytes[0], FORMAT_SPARSE);
        assert_eq!(HyperLogLog::from_bytes(&bytes).unwrap(), sparse);

        let dense = filled(10, 0..20_000);
        let bytes = dense.to_bytes();
        assert_eq!(bytes[0], FORMAT_DENSE);
        assert!(bytes.len() <= 1 << 10);
        let restored = HyperLogLog::from_bytes(&bytes).unwrap();
        assert_eq!(restored, dense);
        assert_eq!(restored.estimate(), dense.estimate());
    }

    #[test]
    fn test_corrupt_bytes_rejected() {
        assert!(HyperLogLog::from_bytes(&[]).is_err());
        assert!(HyperLogLog::from_bytes(&[9, 14]).is_err());
        assert!(HyperLogLog::from_bytes(&[FORMAT_DENSE, 14, 0, 0]).is_err());
        assert!(HyperLogLog::from_bytes(&[FORMAT_SPARSE, 14, 1, 0, 0, 0]).is_err());
    }
}
