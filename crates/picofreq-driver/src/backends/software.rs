// SPDX-License-Identifier: AGPL-3.0-only

//! Software (simulated board) backend
//!
//! Implements [`HardwareBackend`] as a deterministic model of the RP2040
//! peripherals the measurement sessions touch. This enables:
//!
//! 1. **CI without hardware**: every session path, including resource
//!    exhaustion and partial captures, runs on a plain host.
//!
//! 2. **Reproducible timing**: time only moves when [`SoftwareBoard::advance`]
//!    is called (or a counter read waits out its deadline). Nothing sleeps.
//!
//! 3. **Signal injection**: square waves can be applied to any pin with
//!    [`SoftwareBoard::apply_signal`] and are seen by both the PIO counter
//!    and the PWM/DMA edge capture.
//!
//! ## Model
//!
//! ```text
//! signal ──▶ GPIO (fn = PWM) ──▶ slice ch. B ──DREQ──▶ DMA ──▶ timestamps
//!        └─▶ GPIO ─────────────▶ PIO SM ──push──▶ (high, low) cycles
//! ```
//!
//! The instruction store is allocated top-down like the SDK loader, so
//! program offsets and capacity failures match what firmware would see.

use crate::backend::HardwareBackend;
use crate::error::{FreqError, Resource, Result};
use crate::pool::ExecutionUnit;
use picofreq_chip::clocks::{DEFAULT_SYS_CLK_HZ, TIMER_HZ};
use picofreq_chip::dma::NUM_CHANNELS;
use picofreq_chip::gpio::{GpioFunction, NUM_GPIOS};
use picofreq_chip::pio::{PioProgram, INSTRUCTION_MEMORY_SIZE, NUM_PIOS, NUM_STATE_MACHINES};
use picofreq_chip::pwm::{channel_b_gpios, EDGE_TIMING_WRAP, NUM_SLICES};
use std::time::Duration;
use tracing::{debug, trace};

/// Timer value at construction; non-zero so a captured timestamp is never 0.
const BOOT_TIME_US: u64 = 1_000_000;

/// Ideal square wave driven onto a pin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signal {
    /// Frequency in Hz
    pub frequency_hz: f64,
    /// Share of the period spent high, 0–100
    pub duty_percent: f64,
}

impl Signal {
    /// Square wave at `frequency_hz` with `duty_percent` high time
    pub const fn new(frequency_hz: f64, duty_percent: f64) -> Self {
        Self {
            frequency_hz,
            duty_percent,
        }
    }

    /// Whether the pin actually toggles (DC levels have no edges)
    pub fn is_toggling(&self) -> bool {
        self.frequency_hz.is_finite()
            && self.frequency_hz > 0.0
            && self.duty_percent > 0.0
            && self.duty_percent < 100.0
    }

    fn period_us(&self) -> f64 {
        f64::from(TIMER_HZ) / self.frequency_hz
    }
}

#[derive(Debug, Clone, Copy)]
struct SignalSource {
    signal: Signal,
    /// Time of the first rising edge
    origin_us: u64,
}

#[derive(Debug, Clone, Copy)]
struct GpioState {
    function: GpioFunction,
    pulls_enabled: bool,
}

impl Default for GpioState {
    fn default() -> Self {
        Self {
            function: GpioFunction::Sio,
            pulls_enabled: true,
        }
    }
}

#[derive(Debug, Clone)]
struct LoadedProgram {
    name: &'static str,
    offset: u8,
    length: u8,
}

#[derive(Debug, Clone, Copy, Default)]
struct StateMachine {
    enabled: bool,
    pin: Option<u8>,
}

#[derive(Debug, Clone, Default)]
struct PioBlock {
    used: [bool; INSTRUCTION_MEMORY_SIZE],
    programs: Vec<LoadedProgram>,
    sms: [StateMachine; NUM_STATE_MACHINES],
}

impl PioBlock {
    /// Highest offset where `program` fits, searching top-down
    fn find_offset(&self, program: &PioProgram) -> Option<u8> {
        let len = program.length as usize;
        if len == 0 || !program.fits_empty_store() {
            return None;
        }
        let candidates: Vec<usize> = match program.origin {
            Some(origin) => vec![origin as usize],
            None => (0..=INSTRUCTION_MEMORY_SIZE - len).rev().collect(),
        };
        candidates
            .into_iter()
            .filter(|&start| start + len <= INSTRUCTION_MEMORY_SIZE)
            .find(|&start| self.used[start..start + len].iter().all(|&u| !u))
            .and_then(|start| u8::try_from(start).ok())
    }

    fn mark(&mut self, offset: u8, length: u8, used: bool) {
        let start = offset as usize;
        let end = (start + length as usize).min(INSTRUCTION_MEMORY_SIZE);
        self.used[start..end].fill(used);
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PwmSlice {
    edge_counter: bool,
    enabled: bool,
    counter: u16,
    wrap: u16,
}

impl PwmSlice {
    /// Count one input edge; true when the counter wraps (DREQ raised)
    fn count_edge(&mut self) -> bool {
        if self.counter >= self.wrap {
            self.counter = 0;
            true
        } else {
            self.counter += 1;
            false
        }
    }
}

#[derive(Debug, Clone, Default)]
struct DmaChannel {
    claimed: bool,
    busy: bool,
    dreq_slice: Option<u8>,
    transfers: usize,
    written: Vec<u32>,
}

/// Simulated RP2040 board
#[derive(Debug, Clone)]
pub struct SoftwareBoard {
    sys_clk_hz: u32,
    now_us: u64,
    gpio: Vec<GpioState>,
    signals: Vec<Option<SignalSource>>,
    pio: Vec<PioBlock>,
    pwm: Vec<PwmSlice>,
    dma: Vec<DmaChannel>,
}

impl SoftwareBoard {
    /// Board at the default system clock, all peripherals idle
    pub fn new() -> Self {
        Self {
            sys_clk_hz: DEFAULT_SYS_CLK_HZ,
            now_us: BOOT_TIME_US,
            gpio: vec![GpioState::default(); NUM_GPIOS],
            signals: vec![None; NUM_GPIOS],
            pio: vec![PioBlock::default(); NUM_PIOS],
            pwm: vec![PwmSlice::default(); NUM_SLICES],
            dma: vec![DmaChannel::default(); NUM_CHANNELS],
        }
    }

    /// Run `clk_sys` at `hz`
    #[must_use]
    pub fn with_sys_clock_hz(mut self, hz: u32) -> Self {
        self.sys_clk_hz = hz;
        self
    }

    /// Start the free-running timer at `us`
    ///
    /// Useful to place a capture across the 32-bit wrap of the low word.
    #[must_use]
    pub fn with_timer_origin(mut self, us: u64) -> Self {
        self.now_us = us;
        self
    }

    // ── Simulation control ───────────────────────────────────────────────

    /// Drive `signal` onto `pin`; its first rising edge is one period from now
    pub fn apply_signal(&mut self, pin: u8, signal: Signal) {
        if let Some(entry) = self.signals.get_mut(pin as usize) {
            let origin_us = if signal.is_toggling() {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let first = signal.period_us().round().max(1.0) as u64;
                self.now_us.saturating_add(first)
            } else {
                self.now_us
            };
            *entry = Some(SignalSource { signal, origin_us });
            debug!("Signal on pin {pin}: {} Hz, {}% duty", signal.frequency_hz, signal.duty_percent);
        }
    }

    /// Leave `pin` undriven
    pub fn remove_signal(&mut self, pin: u8) {
        if let Some(entry) = self.signals.get_mut(pin as usize) {
            *entry = None;
        }
    }

    /// Let `duration` of board time pass, running any armed captures
    pub fn advance(&mut self, duration: Duration) {
        let until = self.now_us.saturating_add(duration_us(duration));
        for channel in 0..self.dma.len() {
            self.run_capture(channel, until);
        }
        self.now_us = until;
    }

    /// Fill `length` instruction slots of block `pio` with a foreign program
    ///
    /// Returns the offset, or `None` if it does not fit.
    pub fn occupy_program_space(&mut self, pio: usize, length: u8) -> Option<u8> {
        let program = PioProgram {
            name: "foreign",
            length,
            origin: None,
        };
        self.pio_add_program(pio, &program).ok()
    }

    /// Claim `count` DMA channels on behalf of other firmware
    pub fn claim_dma_channels(&mut self, count: usize) -> Vec<u8> {
        (0..count)
            .map_while(|_| self.dma_claim_unused_channel())
            .collect()
    }

    // ── Inspection ───────────────────────────────────────────────────────

    /// Programs resident in block `pio`
    pub fn programs_loaded(&self, pio: usize) -> usize {
        self.pio.get(pio).map_or(0, |block| block.programs.len())
    }

    /// Free instruction slots in block `pio`
    pub fn free_instruction_slots(&self, pio: usize) -> usize {
        self.pio
            .get(pio)
            .map_or(0, |block| block.used.iter().filter(|&&u| !u).count())
    }

    /// Function currently selected on `pin`
    pub fn gpio_function(&self, pin: u8) -> GpioFunction {
        self.gpio
            .get(pin as usize)
            .map_or(GpioFunction::Sio, |g| g.function)
    }

    /// Whether pulls are still enabled on `pin`
    pub fn pulls_enabled(&self, pin: u8) -> bool {
        self.gpio.get(pin as usize).is_some_and(|g| g.pulls_enabled)
    }

    /// Whether state machine `unit` is running
    pub fn sm_enabled(&self, unit: ExecutionUnit) -> bool {
        self.sm(unit).is_some_and(|sm| sm.enabled)
    }

    /// Whether `slice` is counting
    pub fn pwm_enabled(&self, slice: u8) -> bool {
        self.pwm.get(slice as usize).is_some_and(|s| s.enabled)
    }

    /// Number of claimed DMA channels
    pub fn dma_claimed_count(&self) -> usize {
        self.dma.iter().filter(|c| c.claimed).count()
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn sm(&self, unit: ExecutionUnit) -> Option<&StateMachine> {
        self.pio.get(unit.pio).and_then(|b| b.sms.get(unit.sm))
    }

    fn sm_mut(&mut self, unit: ExecutionUnit) -> Option<&mut StateMachine> {
        self.pio.get_mut(unit.pio).and_then(|b| b.sms.get_mut(unit.sm))
    }

    /// Toggling source on the channel-B pin of `slice` routed to PWM
    fn slice_input(&self, slice: u8) -> Option<SignalSource> {
        channel_b_gpios(slice)
            .filter(|&pin| self.gpio_function(pin) == GpioFunction::Pwm)
            .find_map(|pin| self.signals[pin as usize])
            .filter(|src| src.signal.is_toggling())
    }

    /// Write one timestamp per counter wrap in `(now, until]`
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn run_capture(&mut self, channel: usize, until: u64) {
        let ch = &self.dma[channel];
        let Some(slice) = ch.dreq_slice else { return };
        if !ch.busy || !self.pwm_enabled(slice) {
            return;
        }
        let Some(src) = self.slice_input(slice) else { return };

        let period = src.signal.period_us();
        let since_origin = self.now_us as f64 - src.origin_us as f64;
        let mut k = if since_origin < 0.0 {
            0.0
        } else {
            (since_origin / period).floor() + 1.0
        };

        let ch = &mut self.dma[channel];
        let pwm = &mut self.pwm[slice as usize];
        loop {
            let edge_us = (src.origin_us as f64 + k * period).floor() as u64;
            if edge_us > until || !ch.busy {
                break;
            }
            if edge_us > self.now_us && pwm.count_edge() {
                // The DMA reads the low word of the timer.
                ch.written.push(edge_us as u32);
                trace!("dma{channel}: edge at {edge_us} us");
                if ch.written.len() >= ch.transfers {
                    ch.busy = false;
                }
            }
            k += 1.0;
        }
    }
}

impl Default for SoftwareBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareBackend for SoftwareBoard {
    fn sys_clock_hz(&self) -> u32 {
        self.sys_clk_hz
    }

    fn timer_now_us(&self) -> u64 {
        self.now_us
    }

    fn gpio_set_function(&mut self, pin: u8, function: GpioFunction) {
        if let Some(g) = self.gpio.get_mut(pin as usize) {
            g.function = function;
        }
    }

    fn gpio_disable_pulls(&mut self, pin: u8) {
        if let Some(g) = self.gpio.get_mut(pin as usize) {
            g.pulls_enabled = false;
        }
    }

    fn pio_can_add_program(&self, pio: usize, program: &PioProgram) -> bool {
        self.pio
            .get(pio)
            .is_some_and(|block| block.find_offset(program).is_some())
    }

    fn pio_add_program(&mut self, pio: usize, program: &PioProgram) -> Result<u8> {
        let block = self
            .pio
            .get_mut(pio)
            .ok_or(FreqError::exhausted(Resource::ProgramSpace))?;
        let offset = block
            .find_offset(program)
            .ok_or(FreqError::exhausted(Resource::ProgramSpace))?;

        block.mark(offset, program.length, true);
        block.programs.push(LoadedProgram {
            name: program.name,
            offset,
            length: program.length,
        });
        debug!("pio{pio}: '{}' at {offset} ({} slots)", program.name, program.length);
        Ok(offset)
    }

    fn pio_remove_program(&mut self, pio: usize, program: &PioProgram, offset: u8) {
        let Some(block) = self.pio.get_mut(pio) else { return };
        if let Some(i) = block
            .programs
            .iter()
            .position(|p| p.name == program.name && p.offset == offset)
        {
            let removed = block.programs.remove(i);
            block.mark(removed.offset, removed.length, false);
            debug!("pio{pio}: removed '{}' from {offset}", removed.name);
        }
    }

    fn pio_counter_init(&mut self, unit: ExecutionUnit, offset: u8, pin: u8) {
        self.gpio_set_function(pin, GpioFunction::pio(unit.pio));
        if let Some(sm) = self.sm_mut(unit) {
            sm.pin = Some(pin);
            sm.enabled = true;
        }
        trace!("{unit}: counter program at {offset} on pin {pin}");
    }

    fn pio_sm_set_enabled(&mut self, unit: ExecutionUnit, enabled: bool) {
        if let Some(sm) = self.sm_mut(unit) {
            sm.enabled = enabled;
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn pio_counter_read(&mut self, unit: ExecutionUnit, timeout: Duration) -> Result<(u32, u32)> {
        let source = self
            .sm(unit)
            .filter(|sm| sm.enabled)
            .and_then(|sm| sm.pin)
            .and_then(|pin| self.signals.get(pin as usize).copied().flatten())
            .filter(|src| src.signal.is_toggling());

        let timeout_us = duration_us(timeout);
        let Some(src) = source else {
            self.advance(timeout);
            return Err(FreqError::timeout(timeout));
        };

        // Align on a rising edge, then one full period.
        let window_us = (2.0 * src.signal.period_us()).ceil() as u64;
        if window_us > timeout_us {
            self.advance(timeout);
            return Err(FreqError::timeout(timeout));
        }
        self.advance(Duration::from_micros(window_us));

        let period_cycles = (f64::from(self.sys_clk_hz) / src.signal.frequency_hz).round();
        let high = (period_cycles * src.signal.duty_percent / 100.0).round();
        let high_cycles = high.min(f64::from(u32::MAX)) as u32;
        let low_cycles = (period_cycles - high).clamp(0.0, f64::from(u32::MAX)) as u32;
        Ok((high_cycles, low_cycles))
    }

    fn pwm_configure_edge_counter(&mut self, slice: u8) {
        if let Some(s) = self.pwm.get_mut(slice as usize) {
            *s = PwmSlice {
                edge_counter: true,
                enabled: false,
                counter: 0,
                wrap: EDGE_TIMING_WRAP,
            };
        }
    }

    fn pwm_set_enabled(&mut self, slice: u8, enabled: bool) {
        if let Some(s) = self.pwm.get_mut(slice as usize) {
            s.enabled = enabled && s.edge_counter;
        }
    }

    fn pwm_set_counter(&mut self, slice: u8, value: u16) {
        if let Some(s) = self.pwm.get_mut(slice as usize) {
            s.counter = value;
        }
    }

    fn dma_claim_unused_channel(&mut self) -> Option<u8> {
        let index = self.dma.iter().position(|c| !c.claimed)?;
        self.dma[index] = DmaChannel {
            claimed: true,
            ..DmaChannel::default()
        };
        u8::try_from(index).ok()
    }

    fn dma_is_claimed(&self, channel: u8) -> bool {
        self.dma.get(channel as usize).is_some_and(|c| c.claimed)
    }

    fn dma_is_busy(&self, channel: u8) -> bool {
        self.dma.get(channel as usize).is_some_and(|c| c.busy)
    }

    fn dma_unclaim(&mut self, channel: u8) {
        if let Some(c) = self.dma.get_mut(channel as usize) {
            *c = DmaChannel::default();
        }
    }

    fn dma_configure_edge_capture(&mut self, channel: u8, slice: u8, transfers: usize) {
        if let Some(c) = self.dma.get_mut(channel as usize) {
            c.dreq_slice = Some(slice);
            c.transfers = transfers;
            c.written.clear();
            c.busy = false;
        }
    }

    fn dma_rearm(&mut self, channel: u8, transfers: usize) {
        if let Some(c) = self.dma.get_mut(channel as usize) {
            c.transfers = transfers;
            c.written.clear();
        }
    }

    fn dma_start(&mut self, channel: u8) {
        if let Some(c) = self.dma.get_mut(channel as usize) {
            c.busy = c.claimed && c.dreq_slice.is_some() && c.written.len() < c.transfers;
        }
    }

    fn dma_abort(&mut self, channel: u8) {
        if let Some(c) = self.dma.get_mut(channel as usize) {
            c.busy = false;
        }
    }

    fn dma_read_captured(&self, channel: u8, dest: &mut [u32]) {
        if let Some(c) = self.dma.get(channel as usize) {
            for (d, &t) in dest.iter_mut().zip(&c.written) {
                *d = t;
            }
        }
    }
}

fn duration_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}
