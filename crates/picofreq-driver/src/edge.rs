// SPDX-License-Identifier: AGPL-3.0-only

//! Edge time analysis
//!
//! Turns a buffer of raw timer timestamps, one per rising edge, into an
//! averaged period. Pure computation; no hardware state.
//!
//! ## Policy
//!
//! - Scanning stops at the first zero timestamp after index 0: the capture
//!   ended there and the rest of the buffer was never written.
//! - An interval whose end is not after its start (timer wrap or a corrupt
//!   sample) is skipped, not corrected.
//! - The average is `sum / valid` truncated to `u32`; zero valid intervals
//!   is an invalid measurement.

use crate::error::{FreqError, Result};

/// Timestamps captured per measurement
pub const NUM_EDGE_TIMES: usize = 11;

/// Fixed-capacity timestamp buffer filled by the capture DMA
///
/// Zero means "not captured yet", never a real timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeTimeBuffer([u32; NUM_EDGE_TIMES]);

impl EdgeTimeBuffer {
    /// Empty buffer
    pub const fn new() -> Self {
        Self([0; NUM_EDGE_TIMES])
    }

    /// Zero every entry
    pub fn clear(&mut self) {
        self.0 = [0; NUM_EDGE_TIMES];
    }

    /// Entries in capture order
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    /// Mutable view for the DMA read-back
    pub fn as_mut_slice(&mut self) -> &mut [u32] {
        &mut self.0
    }

    /// Number of entries written before the first gap
    pub fn captured_len(&self) -> usize {
        match self.0.first() {
            Some(0) | None => 0,
            Some(_) => 1 + self.0[1..].iter().take_while(|&&t| t != 0).count(),
        }
    }
}

impl From<[u32; NUM_EDGE_TIMES]> for EdgeTimeBuffer {
    fn from(times: [u32; NUM_EDGE_TIMES]) -> Self {
        Self(times)
    }
}

/// Outcome of analysing one buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeStats {
    /// Mean interval in timer ticks
    pub average_ticks: u32,
    /// Intervals that contributed to the mean
    pub valid_intervals: u32,
    /// Intervals dropped as non-increasing
    pub skipped_intervals: u32,
}

/// Average the intervals between adjacent timestamps
///
/// `pin` only labels the error.
///
/// # Errors
///
/// Returns `MeasurementInvalid` if no interval is usable.
pub fn analyze(times: &[u32], pin: u8) -> Result<EdgeStats> {
    let mut total: u64 = 0;
    let mut valid: u32 = 0;
    let mut skipped: u32 = 0;

    for pair in times.windows(2) {
        let (prev, cur) = (pair[0], pair[1]);
        if cur == 0 {
            break;
        }
        if cur > prev {
            total += u64::from(cur - prev);
            valid += 1;
        } else {
            skipped += 1;
        }
    }

    if valid == 0 {
        return Err(FreqError::MeasurementInvalid { pin });
    }

    #[allow(clippy::cast_possible_truncation)]
    let average_ticks = (total / u64::from(valid)) as u32;

    Ok(EdgeStats {
        average_ticks,
        valid_intervals: valid,
        skipped_intervals: skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(head: &[u32]) -> EdgeTimeBuffer {
        let mut times = [0u32; NUM_EDGE_TIMES];
        times[..head.len()].copy_from_slice(head);
        EdgeTimeBuffer::from(times)
    }

    #[test]
    fn averages_increasing_intervals() {
        let buf = buffer(&[100, 150, 300]);
        let stats = analyze(buf.as_slice(), 7).unwrap();
        assert_eq!(stats.average_ticks, 100);
        assert_eq!(stats.valid_intervals, 2);
    }

    #[test]
    fn skips_non_increasing_interval() {
        let buf = buffer(&[100, 80, 200]);
        let stats = analyze(buf.as_slice(), 7).unwrap();
        assert_eq!(stats.average_ticks, 120);
        assert_eq!(stats.valid_intervals, 1, "wrapped interval must not count");
        assert_eq!(stats.skipped_intervals, 1);
    }

    #[test]
    fn empty_buffer_is_invalid() {
        let buf = EdgeTimeBuffer::new();
        assert_eq!(
            analyze(buf.as_slice(), 3),
            Err(FreqError::MeasurementInvalid { pin: 3 })
        );
    }

    #[test]
    fn single_edge_is_invalid() {
        let buf = buffer(&[4242]);
        assert!(analyze(buf.as_slice(), 3).is_err());
    }

    #[test]
    fn stops_at_first_gap() {
        // The 5000 after the gap is never considered.
        let buf = buffer(&[10, 20, 0, 5000]);
        let stats = analyze(buf.as_slice(), 0).unwrap();
        assert_eq!(stats.average_ticks, 10);
        assert_eq!(stats.valid_intervals, 1);
    }

    #[test]
    fn full_buffer_near_wrap() {
        let start = u32::MAX - 2_500;
        let mut times = [0u32; NUM_EDGE_TIMES];
        for (i, t) in times.iter_mut().enumerate() {
            *t = start.wrapping_add(1_000 * i as u32);
        }
        // Edges at MAX-2500, MAX-1500, MAX-500, then 499, 1499, ...
        let stats = analyze(&times, 0).unwrap();
        assert_eq!(stats.average_ticks, 1_000);
        assert_eq!(stats.valid_intervals, 9);
        assert_eq!(stats.skipped_intervals, 1);
    }

    #[test]
    fn captured_len_counts_prefix() {
        assert_eq!(EdgeTimeBuffer::new().captured_len(), 0);
        assert_eq!(buffer(&[5, 6, 7]).captured_len(), 3);
        let mut full = buffer(&[]);
        full.as_mut_slice().fill(9);
        assert_eq!(full.captured_len(), NUM_EDGE_TIMES);
    }

    #[test]
    fn large_intervals_do_not_overflow() {
        let buf = buffer(&[1, u32::MAX - 1, u32::MAX]);
        let stats = analyze(buf.as_slice(), 0).unwrap();
        assert_eq!(stats.valid_intervals, 2);
        assert_eq!(stats.average_ticks, (u32::MAX - 1) / 2);
    }
}
