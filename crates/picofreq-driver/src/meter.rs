// SPDX-License-Identifier: AGPL-3.0-only

//! Edge-timed frequency meter sessions
//!
//! A session counts rising edges on a pin with a PWM slice (wrap 0, so each
//! edge raises the slice DREQ) and lets a DMA channel copy the free-running
//! timer's low word into the session's [`EdgeTimeBuffer`] on every edge.
//! The averaged period is computed by [`edge::analyze`](crate::edge::analyze).
//!
//! ```text
//! Unbound ──init──▶ Armed ──start──▶ Capturing ──read_period──▶ Armed
//!    ▲                │                  │
//!    └────deinit──────┴──────────────────┘
//! ```
//!
//! Armed and Capturing are both "active"; Capturing only means the DMA is
//! running. `deinit` of an unknown pin succeeds.
//!
//! # Timing hazard
//!
//! `read_period` aborts the transfer wherever it is. See
//! [`MeterConfig`](crate::MeterConfig) for the holdoff a caller must honour
//! between `start` and `read_period` to get a full buffer.

use crate::backend::HardwareBackend;
use crate::config::MeterConfig;
use crate::edge::{self, EdgeTimeBuffer, NUM_EDGE_TIMES};
use crate::error::{FreqError, Resource, Result};
use crate::measurement::PeriodTicks;
use crate::registry::ResourceRegistry;
use crate::slices::{SliceArbiter, SliceOwner};
use picofreq_chip::gpio::GpioFunction;
use picofreq_chip::pwm::{gpio_to_channel, gpio_to_slice, PwmChannel};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Concurrent meter sessions
pub const MAX_FREQ_METERS: usize = 4;

/// One active meter session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterSlot {
    /// Measured pin (channel B of `slice`)
    pub pin: u8,
    /// PWM slice counting the edges
    pub slice: u8,
    /// DMA channel writing timestamps
    pub dma_channel: u8,
    /// Timestamps of the current capture
    pub edge_times: EdgeTimeBuffer,
    /// Timer value at the last `start`
    pub started_at_us: Option<u64>,
}

/// Meter session table plus the slices it has bound
#[derive(Debug)]
pub struct MeterSessions {
    config: MeterConfig,
    slots: [Option<MeterSlot>; MAX_FREQ_METERS],
    arbiter: SliceArbiter,
}

impl MeterSessions {
    /// Empty session table
    pub const fn new(config: MeterConfig) -> Self {
        Self {
            config,
            slots: [None; MAX_FREQ_METERS],
            arbiter: SliceArbiter::new(),
        }
    }

    /// Active configuration
    pub const fn config(&self) -> &MeterConfig {
        &self.config
    }

    /// Slices bound by this table
    pub const fn arbiter(&self) -> &SliceArbiter {
        &self.arbiter
    }

    /// Claim a slice and DMA channel for `pin` and arm the capture
    ///
    /// Nothing is held if any step fails.
    ///
    /// # Errors
    ///
    /// - `PinConflict` if `pin` already has a session
    /// - `ResourceExhausted` if no slot or DMA channel is free, or the slice
    ///   is held here or by another subsystem
    /// - `ChannelMappingInvalid` if `pin` is not a channel-B pin
    pub fn init<B: HardwareBackend + ?Sized>(
        &mut self,
        pin: u8,
        registry: &mut ResourceRegistry,
        hw: &mut B,
    ) -> Result<()> {
        if self.find(pin).is_some() {
            return Err(FreqError::PinConflict { pin });
        }

        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(FreqError::exhausted(Resource::Slot))?;

        let slice = match (gpio_to_channel(pin), gpio_to_slice(pin)) {
            (Some(PwmChannel::B), Some(slice)) => slice,
            _ => return Err(FreqError::ChannelMappingInvalid { pin }),
        };

        if !self.arbiter.try_bind(slice) {
            return Err(FreqError::exhausted(Resource::Slice(slice)));
        }
        if let Err(e) = registry.slices.allocate(slice, SliceOwner::FrequencyMeter) {
            self.arbiter.unbind(slice);
            return Err(e);
        }

        let Some(dma_channel) = hw.dma_claim_unused_channel() else {
            warn!("No DMA channel for meter on pin {pin}; releasing slice {slice}");
            registry.slices.release(slice, SliceOwner::FrequencyMeter);
            self.arbiter.unbind(slice);
            return Err(FreqError::exhausted(Resource::DmaChannel));
        };

        hw.gpio_set_function(pin, GpioFunction::Pwm);
        hw.pwm_configure_edge_counter(slice);
        hw.dma_configure_edge_capture(dma_channel, slice, NUM_EDGE_TIMES);

        self.slots[index] = Some(MeterSlot {
            pin,
            slice,
            dma_channel,
            edge_times: EdgeTimeBuffer::new(),
            started_at_us: None,
        });

        info!("Meter on pin {pin} armed (slice {slice}, dma {dma_channel})");
        Ok(())
    }

    /// Release the session on `pin`, if any
    ///
    /// Always succeeds; an unknown pin is a no-op.
    ///
    /// # Errors
    ///
    /// None at present; the signature matches the other operations.
    pub fn deinit<B: HardwareBackend + ?Sized>(
        &mut self,
        pin: u8,
        registry: &mut ResourceRegistry,
        hw: &mut B,
    ) -> Result<()> {
        let Some(slot) = self.find(pin).and_then(|i| self.slots[i].take()) else {
            debug!("Meter deinit on pin {pin}: nothing to release");
            return Ok(());
        };

        self.release(&slot, registry, hw);
        hw.gpio_set_function(pin, GpioFunction::Sio);
        hw.gpio_disable_pulls(pin);
        info!("Meter on pin {pin} released");
        Ok(())
    }

    /// Clear the buffer and start capturing edges
    ///
    /// Restarting a running capture discards it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `pin` has no session.
    pub fn start<B: HardwareBackend + ?Sized>(&mut self, pin: u8, hw: &mut B) -> Result<()> {
        let slot = self.slot_mut(pin)?;

        if hw.dma_is_busy(slot.dma_channel) {
            hw.dma_abort(slot.dma_channel);
        }
        slot.edge_times.clear();

        hw.dma_rearm(slot.dma_channel, NUM_EDGE_TIMES);
        hw.dma_start(slot.dma_channel);

        hw.pwm_set_counter(slot.slice, 0);
        hw.pwm_set_enabled(slot.slice, true);

        slot.started_at_us = Some(hw.timer_now_us());
        debug!("Meter on pin {pin} capturing");
        Ok(())
    }

    /// Stop the capture and return the averaged period
    ///
    /// # Errors
    ///
    /// - `NotFound` if `pin` has no session
    /// - `MeasurementInvalid` if fewer than two increasing edges were seen
    pub fn read_period<B: HardwareBackend + ?Sized>(&mut self, pin: u8, hw: &mut B) -> Result<PeriodTicks> {
        let holdoff = self.config.capture_holdoff;
        let slot = self.slot_mut(pin)?;

        if hw.dma_is_busy(slot.dma_channel) {
            hw.dma_abort(slot.dma_channel);
        }
        hw.pwm_set_enabled(slot.slice, false);
        hw.dma_read_captured(slot.dma_channel, slot.edge_times.as_mut_slice());

        if let Some(started) = slot.started_at_us {
            let elapsed = Duration::from_micros(hw.timer_now_us().saturating_sub(started));
            if elapsed < holdoff {
                warn!(
                    "Meter on pin {pin} read {elapsed:?} after start (holdoff {holdoff:?}); \
                     capture truncated at {} of {NUM_EDGE_TIMES} edges",
                    slot.edge_times.captured_len()
                );
            }
        }

        let stats = edge::analyze(slot.edge_times.as_slice(), pin)?;
        debug!(
            "Meter on pin {pin}: {} ticks over {} intervals ({} skipped)",
            stats.average_ticks, stats.valid_intervals, stats.skipped_intervals
        );
        Ok(PeriodTicks(stats.average_ticks))
    }

    /// Force-release every session
    pub fn teardown<B: HardwareBackend + ?Sized>(&mut self, registry: &mut ResourceRegistry, hw: &mut B) {
        for index in 0..MAX_FREQ_METERS {
            if let Some(slot) = self.slots[index].take() {
                debug!("Teardown: meter on pin {}", slot.pin);
                self.release(&slot, registry, hw);
            }
        }
    }

    /// Whether `pin` has a session
    pub fn is_active(&self, pin: u8) -> bool {
        self.find(pin).is_some()
    }

    /// Session bound to `pin`
    pub fn slot(&self, pin: u8) -> Option<&MeterSlot> {
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

    fn slot_mut(&mut self, pin: u8) -> Result<&mut MeterSlot> {
        self.slots
            .iter_mut()
            .flatten()
            .find(|s| s.pin == pin)
            .ok_or(FreqError::NotFound { pin })
    }

    fn release<B: HardwareBackend + ?Sized>(
        &mut self,
        slot: &MeterSlot,
        registry: &mut ResourceRegistry,
        hw: &mut B,
    ) {
        hw.pwm_set_enabled(slot.slice, false);

        if hw.dma_is_claimed(slot.dma_channel) {
            hw.dma_abort(slot.dma_channel);
            hw.dma_unclaim(slot.dma_channel);
        }

        self.arbiter.unbind(slot.slice);
        registry.slices.release(slot.slice, SliceOwner::FrequencyMeter);
    }
}

impl Default for MeterSessions {
    fn default() -> Self {
        Self::new(MeterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::software::{Signal, SoftwareBoard};
    use picofreq_chip::dma::NUM_CHANNELS;

    fn setup() -> (MeterSessions, ResourceRegistry, SoftwareBoard) {
        (MeterSessions::default(), ResourceRegistry::new(), SoftwareBoard::new())
    }

    #[test]
    fn init_binds_slice_and_dma() {
        let (mut meters, mut reg, mut hw) = setup();
        meters.init(7, &mut reg, &mut hw).unwrap();

        let slot = *meters.slot(7).unwrap();
        assert_eq!(slot.slice, 3);
        assert!(meters.arbiter().is_bound(3));
        assert_eq!(reg.slices.owner(3), Some(SliceOwner::FrequencyMeter));
        assert!(hw.dma_is_claimed(slot.dma_channel));
        assert!(!hw.dma_is_busy(slot.dma_channel), "armed, not started");
    }

    #[test]
    fn channel_a_pin_rejected() {
        let (mut meters, mut reg, mut hw) = setup();
        assert_eq!(
            meters.init(6, &mut reg, &mut hw),
            Err(FreqError::ChannelMappingInvalid { pin: 6 })
        );
        assert_eq!(
            meters.init(31, &mut reg, &mut hw),
            Err(FreqError::ChannelMappingInvalid { pin: 31 })
        );
        assert!(reg.is_idle());
    }

    #[test]
    fn second_init_on_same_pin_conflicts() {
        let (mut meters, mut reg, mut hw) = setup();
        meters.init(7, &mut reg, &mut hw).unwrap();
        let slot = *meters.slot(7).unwrap();
        let mask = meters.arbiter().mask();

        assert_eq!(
            meters.init(7, &mut reg, &mut hw),
            Err(FreqError::PinConflict { pin: 7 })
        );
        assert_eq!(meters.active_count(), 1);
        assert_eq!(hw.dma_claimed_count(), 1);
        assert_eq!(meters.arbiter().mask(), mask);
        assert_eq!(meters.slot(7).map(|s| s.dma_channel), Some(slot.dma_channel));
        assert_eq!(reg.slices.busy_count(), 1);
    }

    #[test]
    fn sibling_pin_on_same_slice_rejected() {
        let (mut meters, mut reg, mut hw) = setup();
        meters.init(1, &mut reg, &mut hw).unwrap();
        // GPIO17 is channel B of slice 0 too.
        assert_eq!(
            meters.init(17, &mut reg, &mut hw),
            Err(FreqError::exhausted(Resource::Slice(0)))
        );
    }

    #[test]
    fn slice_held_by_pwm_output_rejected() {
        let (mut meters, mut reg, mut hw) = setup();
        reg.slices.allocate(3, SliceOwner::PwmOutput).unwrap();
        assert_eq!(
            meters.init(7, &mut reg, &mut hw),
            Err(FreqError::exhausted(Resource::Slice(3)))
        );
        assert!(!meters.arbiter().is_bound(3), "local binding rolled back");
    }

    #[test]
    fn no_dma_channel_rolls_back_slice() {
        let (mut meters, mut reg, mut hw) = setup();
        hw.claim_dma_channels(NUM_CHANNELS);
        assert_eq!(
            meters.init(7, &mut reg, &mut hw),
            Err(FreqError::exhausted(Resource::DmaChannel))
        );
        assert!(!reg.slices.is_busy(3));
        assert_eq!(meters.arbiter().mask(), 0);
    }

    #[test]
    fn slots_run_out_before_slices() {
        let (mut meters, mut reg, mut hw) = setup();
        for pin in [1, 3, 5, 7] {
            meters.init(pin, &mut reg, &mut hw).unwrap();
        }
        assert_eq!(
            meters.init(9, &mut reg, &mut hw),
            Err(FreqError::exhausted(Resource::Slot))
        );
    }

    #[test]
    fn deinit_unknown_pin_succeeds() {
        let (mut meters, mut reg, mut hw) = setup();
        assert_eq!(meters.deinit(7, &mut reg, &mut hw), Ok(()));
    }

    #[test]
    fn deinit_releases_everything() {
        let (mut meters, mut reg, mut hw) = setup();
        meters.init(7, &mut reg, &mut hw).unwrap();
        let channel = meters.slot(7).unwrap().dma_channel;
        meters.start(7, &mut hw).unwrap();
        meters.deinit(7, &mut reg, &mut hw).unwrap();

        assert!(!meters.is_active(7));
        assert!(reg.is_idle());
        assert!(!hw.dma_is_claimed(channel));
        assert_eq!(hw.gpio_function(7), GpioFunction::Sio);
        // Pin is free again.
        meters.init(7, &mut reg, &mut hw).unwrap();
    }

    #[test]
    fn start_and_read_unknown_pin() {
        let (mut meters, _reg, mut hw) = setup();
        assert_eq!(meters.start(7, &mut hw), Err(FreqError::NotFound { pin: 7 }));
        assert_eq!(meters.read_period(7, &mut hw), Err(FreqError::NotFound { pin: 7 }));
    }

    #[test]
    fn immediate_read_is_invalid() {
        let (mut meters, mut reg, mut hw) = setup();
        hw.apply_signal(7, Signal::new(1_000.0, 50.0));
        meters.init(7, &mut reg, &mut hw).unwrap();
        meters.start(7, &mut hw).unwrap();
        assert_eq!(
            meters.read_period(7, &mut hw),
            Err(FreqError::MeasurementInvalid { pin: 7 })
        );
    }

    #[test]
    fn full_capture_gives_period() {
        let (mut meters, mut reg, mut hw) = setup();
        hw.apply_signal(7, Signal::new(1_000.0, 50.0));
        meters.init(7, &mut reg, &mut hw).unwrap();
        meters.start(7, &mut hw).unwrap();
        hw.advance(Duration::from_millis(20));

        let period = meters.read_period(7, &mut hw).unwrap();
        assert_eq!(period, PeriodTicks(1_000));
        assert_eq!(meters.slot(7).unwrap().edge_times.captured_len(), NUM_EDGE_TIMES);
    }

    #[test]
    fn restart_clears_previous_capture() {
        let (mut meters, mut reg, mut hw) = setup();
        hw.apply_signal(7, Signal::new(2_000.0, 50.0));
        meters.init(7, &mut reg, &mut hw).unwrap();
        meters.start(7, &mut hw).unwrap();
        hw.advance(Duration::from_millis(20));
        meters.read_period(7, &mut hw).unwrap();

        hw.remove_signal(7);
        meters.start(7, &mut hw).unwrap();
        hw.advance(Duration::from_millis(20));
        assert!(meters.read_period(7, &mut hw).is_err());
    }

    #[test]
    fn teardown_releases_all_slots() {
        let (mut meters, mut reg, mut hw) = setup();
        for pin in [1, 3, 5] {
            meters.init(pin, &mut reg, &mut hw).unwrap();
        }
        meters.start(3, &mut hw).unwrap();
        meters.teardown(&mut reg, &mut hw);
        assert_eq!(meters.active_count(), 0);
        assert!(reg.is_idle());
        assert_eq!(hw.dma_claimed_count(), 0);
    }
}
