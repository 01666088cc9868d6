//! Byte-level statistics over raw buffers.
//!
//! All functions are pure and side-effect free. A buffer too small for a
//! formula (or one with zero variance where a moment divides by the
//! standard deviation) is rejected with `SiftError::DegenerateInput`
//! instead of silently producing NaN or infinity.

use crate::error::{Result, SiftError};
use std::collections::BTreeMap;

const BINS: usize = 256;

fn require_len(data: &[u8], min: usize, reason: &'static str) -> Result<()> {
    if data.len() < min {
        return Err(SiftError::DegenerateInput {
            reason,
            len: data.len(),
        });
    }
    Ok(())
}

fn histogram(data: &[u8]) -> [u64; BINS] {
    let mut bins = [0u64; BINS];
    for &byte in data {
        bins[byte as usize] += 1;
    }
    bins
}

/// Byte frequency distribution: sparse map from byte value to occurrence
/// count. Counts sum to the buffer length.
pub fn byte_frequency(data: &[u8]) -> Result<BTreeMap<u16, u64>> {
    require_len(data, 1, "byte frequency of an empty buffer")?;
    let bins = histogram(data);
    Ok(bins
        .iter()
        .enumerate()
        .filter(|(_, &count)| count > 0)
        .map(|(value, &count)| (value as u16, count))
        .collect())
}

/// Word frequency distribution over non-overlapping 2-byte little-endian
/// windows at even offsets; a trailing odd byte is ignored. Counts sum to
/// floor(n / 2).
pub fn word_frequency(data: &[u8]) -> Result<BTreeMap<u16, u64>> {
    require_len(data, 2, "word frequency needs at least one 2-byte window")?;
    let mut dist = BTreeMap::new();
    for pair in data.chunks_exact(2) {
        let word = u16::from_le_bytes([pair[0], pair[1]]);
        *dist.entry(word).or_insert(0) += 1;
    }
    Ok(dist)
}

/// Arithmetic mean of the byte values
pub fn mean_byte_value(data: &[u8]) -> Result<f64> {
    require_len(data, 1, "mean of an empty buffer")?;
    let sum: u64 = data.iter().map(|&b| u64::from(b)).sum();
    Ok(sum as f64 / data.len() as f64)
}

/// Sample standard deviation of the byte values (divisor n - 1)
pub fn byte_std_dev(data: &[u8]) -> Result<f64> {
    require_len(data, 2, "sample standard deviation needs n >= 2")?;
    let mean = mean_byte_value(data)?;
    let sum_sq: f64 = data
        .iter()
        .map(|&b| {
            let d = f64::from(b) - mean;
            d * d
        })
        .sum();
    Ok((sum_sq / (data.len() - 1) as f64).sqrt())
}

/// Mean absolute deviation of the byte values
pub fn mean_absolute_deviation(data: &[u8]) -> Result<f64> {
    require_len(data, 1, "mean absolute deviation of an empty buffer")?;
    let mean = mean_byte_value(data)?;
    let sum: f64 = data.iter().map(|&b| (f64::from(b) - mean).abs()).sum();
    Ok(sum / data.len() as f64)
}

/// Central moments needed by the standardized statistics: (m2, m3, m4) as
/// raw sums of squared/cubed/fourth-power deviations from the mean.
fn deviation_sums(data: &[u8], mean: f64) -> (f64, f64, f64) {
    let mut m2 = 0.0;
    let mut m3 = 0.0;
    let mut m4 = 0.0;
    for &byte in data {
        let d = f64::from(byte) - mean;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    (m2, m3, m4)
}

/// Standardized kurtosis: sum((x - mean)^4) / ((n - 1) * s^4)
pub fn std_kurtosis(data: &[u8]) -> Result<f64> {
    require_len(data, 2, "kurtosis needs n >= 2")?;
    let mean = mean_byte_value(data)?;
    let (m2, _, m4) = deviation_sums(data, mean);
    if m2 == 0.0 {
        return Err(SiftError::DegenerateInput {
            reason: "kurtosis of a zero-variance buffer",
            len: data.len(),
        });
    }
    let s = (m2 / (data.len() - 1) as f64).sqrt();
    Ok(m4 / ((data.len() - 1) as f64 * s.powi(4)))
}

/// Standardized skewness: sum((x - mean)^3) / ((n - 1) * s^3)
pub fn std_skewness(data: &[u8]) -> Result<f64> {
    require_len(data, 2, "skewness needs n >= 2")?;
    let mean = mean_byte_value(data)?;
    let (m2, m3, _) = deviation_sums(data, mean);
    if m2 == 0.0 {
        return Err(SiftError::DegenerateInput {
            reason: "skewness of a zero-variance buffer",
            len: data.len(),
        });
    }
    let s = (m2 / (data.len() - 1) as f64).sqrt();
    Ok(m3 / ((data.len() - 1) as f64 * s.powi(3)))
}

/// Average byte continuity: n * sum((x - mean)^4) / (sum((x - mean)^2))^2
pub fn avg_byte_continuity(data: &[u8]) -> Result<f64> {
    require_len(data, 1, "continuity of an empty buffer")?;
    let mean = mean_byte_value(data)?;
    let (m2, _, m4) = deviation_sums(data, mean);
    if m2 == 0.0 {
        return Err(SiftError::DegenerateInput {
            reason: "continuity of a zero-variance buffer",
            len: data.len(),
        });
    }
    Ok(data.len() as f64 * m4 / (m2 * m2))
}

/// Byte value and length of the longest run of consecutive equal bytes.
/// Ties keep the first-found maximal run; a single-byte buffer is a run of
/// length 1.
pub fn longest_byte_streak(data: &[u8]) -> Result<(u8, u64)> {
    require_len(data, 1, "longest streak of an empty buffer")?;
    let mut best_byte = data[0];
    let mut best_len: u64 = 1;
    let mut current_byte = data[0];
    let mut current_len: u64 = 1;

    for &byte in &data[1..] {
        if byte == current_byte {
            current_len += 1;
        } else {
            current_byte = byte;
            current_len = 1;
        }
        if current_len > best_len {
            best_byte = current_byte;
            best_len = current_len;
        }
    }
    Ok((best_byte, best_len))
}

fn frequency_subrange(data: &[u8], low: u16, high: u16) -> Result<BTreeMap<u16, u64>> {
    let full = byte_frequency(data)?;
    Ok(full
        .range(low..=high)
        .map(|(&value, &count)| (value, count))
        .collect())
}

/// Frequencies of the printable ASCII range, byte values 32..=126
pub fn low_ascii_frequency(data: &[u8]) -> Result<BTreeMap<u16, u64>> {
    frequency_subrange(data, 32, 126)
}

/// Frequencies of the upper byte range, values 128..=255
pub fn high_ascii_frequency(data: &[u8]) -> Result<BTreeMap<u16, u64>> {
    frequency_subrange(data, 128, 255)
}

/// Shannon entropy over the byte histogram, in bits per byte.
/// Returns a value between 0.0 (uniform buffer) and 8.0 (every byte value
/// equally likely).
pub fn shannon_entropy(data: &[u8]) -> Result<f64> {
    require_len(data, 1, "entropy of an empty buffer")?;
    let bins = histogram(data);
    let total = data.len() as f64;
    let mut entropy = 0.0f64;
    for &count in bins.iter() {
        if count > 0 {
            let p = count as f64 / total;
            entropy -= p * p.log2();
        }
    }
    Ok(entropy)
}
