// SPDX-License-Identifier: AGPL-3.0-only

//! Hardware backend abstraction
//!
//! Session managers never touch registers directly. Every hardware effect
//! goes through [`HardwareBackend`], which keeps the arbitration logic
//! testable on a host with [`SoftwareBoard`](crate::SoftwareBoard).

use crate::error::Result;
use crate::pool::ExecutionUnit;
use picofreq_chip::gpio::GpioFunction;
use picofreq_chip::pio::PioProgram;
use std::fmt::Debug;
use std::time::Duration;

/// Narrow hardware-control interface used by the session managers
///
/// Calls are grouped by peripheral. All of them are synchronous; the only
/// call that may wait is [`pio_counter_read`](Self::pio_counter_read), and
/// it is bounded by the caller's deadline.
pub trait HardwareBackend: Debug + Send {
    // ── Clocks ───────────────────────────────────────────────────────────

    /// Current `clk_sys` frequency in Hz
    fn sys_clock_hz(&self) -> u32;

    /// Free-running 1 MHz timer
    ///
    /// The capture DMA copies the low 32 bits of this value.
    fn timer_now_us(&self) -> u64;

    // ── GPIO ─────────────────────────────────────────────────────────────

    /// Select the peripheral driving `pin`
    fn gpio_set_function(&mut self, pin: u8, function: GpioFunction);

    /// Remove pull-up/pull-down from `pin`
    fn gpio_disable_pulls(&mut self, pin: u8);

    // ── PIO ──────────────────────────────────────────────────────────────

    /// Whether `program` fits in the instruction store of block `pio`
    fn pio_can_add_program(&self, pio: usize, program: &PioProgram) -> bool;

    /// Load `program` into block `pio` and return its offset
    ///
    /// # Errors
    ///
    /// Returns `ResourceExhausted` if the instruction store is full.
    fn pio_add_program(&mut self, pio: usize, program: &PioProgram) -> Result<u8>;

    /// Unload `program` previously loaded at `offset`
    fn pio_remove_program(&mut self, pio: usize, program: &PioProgram, offset: u8);

    /// Configure `unit` to run the counting program on `pin` and enable it
    fn pio_counter_init(&mut self, unit: ExecutionUnit, offset: u8, pin: u8);

    /// Start or stop a state machine
    fn pio_sm_set_enabled(&mut self, unit: ExecutionUnit, enabled: bool);

    /// Wait for one complete measurement window from `unit`
    ///
    /// Returns the (high, low) cycle counts pushed by the program.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if the window does not complete within `timeout`.
    fn pio_counter_read(&mut self, unit: ExecutionUnit, timeout: Duration) -> Result<(u32, u32)>;

    // ── PWM ──────────────────────────────────────────────────────────────

    /// Configure `slice` to count rising edges on channel B
    ///
    /// Divider 1, wrap 0 so every edge raises the slice DREQ. The slice is
    /// left disabled.
    fn pwm_configure_edge_counter(&mut self, slice: u8);

    /// Start or stop counting on `slice`
    fn pwm_set_enabled(&mut self, slice: u8, enabled: bool);

    /// Overwrite the edge counter of `slice`
    fn pwm_set_counter(&mut self, slice: u8, value: u16);

    // ── DMA ──────────────────────────────────────────────────────────────

    /// Claim the lowest free DMA channel
    fn dma_claim_unused_channel(&mut self) -> Option<u8>;

    /// Whether `channel` is currently claimed
    fn dma_is_claimed(&self, channel: u8) -> bool;

    /// Whether `channel` has a transfer in flight
    fn dma_is_busy(&self, channel: u8) -> bool;

    /// Return `channel` to the free pool
    fn dma_unclaim(&mut self, channel: u8);

    /// Configure `channel` to copy the timer low word on each DREQ of `slice`
    ///
    /// 32-bit transfers, fixed read address, incrementing write address,
    /// `transfers` elements. The transfer is not started.
    fn dma_configure_edge_capture(&mut self, channel: u8, slice: u8, transfers: usize);

    /// Reset write address and transfer count without starting
    fn dma_rearm(&mut self, channel: u8, transfers: usize);

    /// Start `channel`; it then waits for its DREQ
    fn dma_start(&mut self, channel: u8);

    /// Abort any transfer in flight on `channel`
    fn dma_abort(&mut self, channel: u8);

    /// Copy what `channel` has written so far into `dest`
    ///
    /// Entries the transfer has not reached are left untouched.
    fn dma_read_captured(&self, channel: u8, dest: &mut [u32]);
}
