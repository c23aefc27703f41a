// SPDX-License-Identifier: AGPL-3.0-only

//! PIO frequency counter sessions
//!
//! Each session binds one pin to one PIO state machine running the shared
//! counting program. Per pin the lifecycle is:
//!
//! ```text
//! Unbound ──init──▶ Active ──deinit──▶ Unbound
//!                     │ ▲
//!                     └─┘ measure
//! ```

use crate::backend::HardwareBackend;
use crate::config::CounterConfig;
use crate::error::{FreqError, Resource, Result};
use crate::measurement::CycleCounts;
use crate::pool::ExecutionUnit;
use crate::registry::ResourceRegistry;
use picofreq_chip::gpio;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Concurrent counter sessions (one per state machine)
pub const MAX_FREQ_COUNTERS: usize = 8;

/// One active counter session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSlot {
    /// Measured pin
    pub pin: u8,
    /// State machine running the program
    pub unit: ExecutionUnit,
    /// Program offset within the unit's block
    pub program_offset: u8,
}

/// Counter session table
///
/// A slot is `Some` exactly while its state machine is claimed in the
/// registry's pool.
#[derive(Debug)]
pub struct CounterSessions {
    config: CounterConfig,
    slots: [Option<CounterSlot>; MAX_FREQ_COUNTERS],
}

impl CounterSessions {
    /// Empty session table
    pub const fn new(config: CounterConfig) -> Self {
        Self {
            config,
            slots: [None; MAX_FREQ_COUNTERS],
        }
    }

    /// Active configuration
    pub const fn config(&self) -> &CounterConfig {
        &self.config
    }

    /// Start counting on `pin`
    ///
    /// Returns the system clock frequency the counts will be relative to.
    ///
    /// # Errors
    ///
    /// - `ChannelMappingInvalid` if `pin` is not a user GPIO
    /// - `PinConflict` if `pin` already has a session
    /// - `ResourceExhausted` if no slot or state machine is free, or the
    ///   program cannot be loaded
    pub fn init<B: HardwareBackend + ?Sized>(
        &mut self,
        pin: u8,
        registry: &mut ResourceRegistry,
        hw: &mut B,
    ) -> Result<u32> {
        if !gpio::is_valid(pin) {
            return Err(FreqError::ChannelMappingInvalid { pin });
        }
        if self.find(pin).is_some() {
            return Err(FreqError::PinConflict { pin });
        }

        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(FreqError::exhausted(Resource::Slot))?;

        let unit = registry.units.claim(hw)?;
        let Some(program_offset) = registry.units.program_offset(unit.pio) else {
            // A claimed unit always has its block's program resident.
            registry.units.release(unit, hw);
            return Err(FreqError::exhausted(Resource::ProgramSpace));
        };

        hw.pio_counter_init(unit, program_offset, pin);
        self.slots[index] = Some(CounterSlot {
            pin,
            unit,
            program_offset,
        });

        let sys_clk_hz = hw.sys_clock_hz();
        info!("Counter on pin {pin} active ({unit}, offset {program_offset}, clk_sys {sys_clk_hz} Hz)");
        Ok(sys_clk_hz)
    }

    /// Stop counting on `pin` and free its state machine
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `pin` has no session.
    pub fn deinit<B: HardwareBackend + ?Sized>(
        &mut self,
        pin: u8,
        registry: &mut ResourceRegistry,
        hw: &mut B,
    ) -> Result<()> {
        let index = self.find(pin).ok_or(FreqError::NotFound { pin })?;
        if let Some(slot) = self.slots[index].take() {
            Self::release(slot, registry, hw);
            info!("Counter on pin {pin} released");
        }
        Ok(())
    }

    /// Read one window using the configured deadline
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `pin` has no session, `Timeout` if no window
    /// completes in time.
    pub fn measure<B: HardwareBackend + ?Sized>(&self, pin: u8, hw: &mut B) -> Result<CycleCounts> {
        self.measure_with_timeout(pin, self.config.measure_timeout, hw)
    }

    /// Read one window, waiting at most `timeout`
    ///
    /// The session stays active after a timeout.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `pin` has no session, `Timeout` if no window
    /// completes in time.
    pub fn measure_with_timeout<B: HardwareBackend + ?Sized>(
        &self,
        pin: u8,
        timeout: Duration,
        hw: &mut B,
    ) -> Result<CycleCounts> {
        let slot = self
            .find(pin)
            .and_then(|i| self.slots[i])
            .ok_or(FreqError::NotFound { pin })?;

        let (high_cycles, low_cycles) = hw.pio_counter_read(slot.unit, timeout).map_err(|e| {
            warn!("Counter on pin {pin}: {e}");
            e
        })?;

        debug!("Counter on pin {pin}: high {high_cycles}, low {low_cycles}");
        Ok(CycleCounts {
            high_cycles,
            low_cycles,
        })
    }

    /// Force-release every session
    pub fn teardown<B: HardwareBackend + ?Sized>(&mut self, registry: &mut ResourceRegistry, hw: &mut B) {
        for slot in self.slots.iter_mut().filter_map(Option::take) {
            debug!("Teardown: counter on pin {}", slot.pin);
            Self::release(slot, registry, hw);
        }
    }

    /// Whether `pin` has a session
    pub fn is_active(&self, pin: u8) -> bool {
        self.find(pin).is_some()
    }

    /// Session bound to `pin`
    pub fn slot(&self, pin: u8) -> Option<&CounterSlot> {
        self.slots.iter().flatten().find(|s| s.pin == pin)
    }

    /// Number of active sessions
    pub fn active_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    fn find(&self, pin: u8) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.is_some_and(|s| s.pin == pin))
    }

    fn release<B: HardwareBackend + ?Sized>(slot: CounterSlot, registry: &mut ResourceRegistry, hw: &mut B) {
        hw.pio_sm_set_enabled(slot.unit, false);
        registry.units.release(slot.unit, hw);
    }
}

impl Default for CounterSessions {
    fn default() -> Self {
        Self::new(CounterConfig::default())
    }
}
