// SPDX-License-Identifier: AGPL-3.0-only

//! Clock rates.
//!
//! `clk_sys` is configured at board bring-up; the default below is what the
//! SDK leaves it at. The free-running timer always ticks at 1 MHz, so a
//! timestamp difference is directly a period in microseconds.

/// Default `clk_sys` frequency after bring-up.
pub const DEFAULT_SYS_CLK_HZ: u32 = 125_000_000;

/// Free-running timer tick rate (`timerawl` increments once per µs).
pub const TIMER_HZ: u32 = 1_000_000;
