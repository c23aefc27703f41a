// SPDX-License-Identifier: AGPL-3.0-only

//! Measurement results and their conversion to physical units

use picofreq_chip::clocks::TIMER_HZ;

/// High and low durations of one input period, in `clk_sys` cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleCounts {
    /// Cycles the input spent high
    pub high_cycles: u32,
    /// Cycles the input spent low
    pub low_cycles: u32,
}

impl CycleCounts {
    /// Cycles in one full period
    pub const fn total_cycles(&self) -> u64 {
        self.high_cycles as u64 + self.low_cycles as u64
    }

    /// Input frequency given the system clock, 0.0 if no period was seen
    #[allow(clippy::cast_precision_loss)]
    pub fn frequency_hz(&self, sys_clk_hz: u32) -> f64 {
        match self.total_cycles() {
            0 => 0.0,
            total => f64::from(sys_clk_hz) / total as f64,
        }
    }

    /// Share of the period spent high, in percent
    #[allow(clippy::cast_precision_loss)]
    pub fn duty_cycle_percent(&self) -> f64 {
        match self.total_cycles() {
            0 => 0.0,
            total => f64::from(self.high_cycles) * 100.0 / total as f64,
        }
    }
}

/// Averaged period in free-running timer ticks (µs)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct PeriodTicks(pub u32);

impl PeriodTicks {
    /// Raw tick count
    pub const fn ticks(&self) -> u32 {
        self.0
    }

    /// Input frequency, 0.0 for a zero period
    pub fn frequency_hz(&self) -> f64 {
        match self.0 {
            0 => 0.0,
            ticks => f64::from(TIMER_HZ) / f64::from(ticks),
        }
    }
}
