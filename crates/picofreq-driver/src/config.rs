// SPDX-License-Identifier: AGPL-3.0-only

//! Session configuration
//!
//! Plain structs with sensible defaults. Values that depend on the signal
//! being measured can be derived from it instead of guessed.

use crate::edge::NUM_EDGE_TIMES;
use std::time::Duration;
use tracing::debug;

/// PIO counter session settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterConfig {
    /// Longest a measurement may wait for a complete window
    pub measure_timeout: Duration,
}

impl CounterConfig {
    /// Default measurement deadline
    pub const DEFAULT_MEASURE_TIMEOUT: Duration = Duration::from_secs(1);

    /// Override the measurement deadline
    #[must_use]
    pub const fn with_measure_timeout(mut self, timeout: Duration) -> Self {
        self.measure_timeout = timeout;
        self
    }

    /// Deadline long enough for one window of a signal at `min_frequency_hz`
    ///
    /// Allows two periods: one to align on a rising edge, one to measure.
    pub fn for_min_frequency(min_frequency_hz: f64) -> Self {
        let measure_timeout = periods(min_frequency_hz, 2)
            .max(Duration::from_millis(1));
        debug!("Counter deadline {measure_timeout:?} for signals >= {min_frequency_hz} Hz");
        Self { measure_timeout }
    }
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            measure_timeout: Self::DEFAULT_MEASURE_TIMEOUT,
        }
    }
}

/// Edge-timed meter session settings
///
/// # Holdoff contract
///
/// `read_period` snapshots whatever the DMA has captured when it is called.
/// A read is only trustworthy once `capture_holdoff` has elapsed since
/// `start`; the holdoff must cover `NUM_EDGE_TIMES` periods of the slowest
/// signal of interest. Earlier reads are still served (a partial buffer
/// averages fewer intervals) but are logged as truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterConfig {
    /// Minimum time between `start` and a trustworthy `read_period`
    pub capture_holdoff: Duration,
}

impl MeterConfig {
    /// Default holdoff: enough for signals of 110 Hz and above
    pub const DEFAULT_CAPTURE_HOLDOFF: Duration = Duration::from_millis(100);

    /// Override the holdoff
    #[must_use]
    pub const fn with_capture_holdoff(mut self, holdoff: Duration) -> Self {
        self.capture_holdoff = holdoff;
        self
    }

    /// Holdoff covering a full buffer of a signal at `min_frequency_hz`
    ///
    /// `NUM_EDGE_TIMES` edges plus one period of margin for the first edge.
    pub fn for_min_frequency(min_frequency_hz: f64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let capture_holdoff = periods(min_frequency_hz, NUM_EDGE_TIMES as u32 + 1);
        debug!("Meter holdoff {capture_holdoff:?} for signals >= {min_frequency_hz} Hz");
        Self { capture_holdoff }
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            capture_holdoff: Self::DEFAULT_CAPTURE_HOLDOFF,
        }
    }
}

/// Settings for a whole frequency service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Counter sessions
    pub counter: CounterConfig,
    /// Meter sessions
    pub meter: MeterConfig,
}

impl ServiceConfig {
    /// Replace the counter settings
    #[must_use]
    pub const fn with_counter(mut self, counter: CounterConfig) -> Self {
        self.counter = counter;
        self
    }

    /// Replace the meter settings
    #[must_use]
    pub const fn with_meter(mut self, meter: MeterConfig) -> Self {
        self.meter = meter;
        self
    }
}

fn periods(frequency_hz: f64, count: u32) -> Duration {
    if frequency_hz.is_finite() && frequency_hz > 0.0 {
        Duration::try_from_secs_f64(f64::from(count) / frequency_hz).unwrap_or(Duration::MAX)
    } else {
        Duration::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_holdoff_covers_buffer() {
        let cfg = MeterConfig::for_min_frequency(1_000.0);
        // 11 edges + 1 period of margin at 1 ms each
        assert!((cfg.capture_holdoff.as_secs_f64() - 0.012).abs() < 1e-9);
    }

    #[test]
    fn counter_deadline_has_floor() {
        let cfg = CounterConfig::for_min_frequency(1_000_000.0);
        assert_eq!(cfg.measure_timeout, Duration::from_millis(1));
    }

    #[test]
    fn zero_frequency_never_times_out() {
        assert_eq!(CounterConfig::for_min_frequency(0.0).measure_timeout, Duration::MAX);
    }

    #[test]
    fn vanishing_frequency_saturates() {
        assert_eq!(MeterConfig::for_min_frequency(1e-20).capture_holdoff, Duration::MAX);
        assert_eq!(CounterConfig::for_min_frequency(1e-20).measure_timeout, Duration::MAX);
        assert_eq!(CounterConfig::for_min_frequency(f64::MIN_POSITIVE).measure_timeout, Duration::MAX);
    }

    #[test]
    fn builders_override_defaults() {
        let cfg = ServiceConfig::default()
            .with_meter(MeterConfig::default().with_capture_holdoff(Duration::from_millis(5)));
        assert_eq!(cfg.meter.capture_holdoff, Duration::from_millis(5));
        assert_eq!(cfg.counter, CounterConfig::default());
    }
}
