// SPDX-License-Identifier: AGPL-3.0-only

//! Host-side handles for counter and meter sessions
//!
//! A client speaks the report protocol through any [`Transport`]. The
//! transport is borrowed per call, so several clients can share one link:
//!
//! ```
//! use picofreq_driver::{CounterClient, FrequencyService, ServiceConfig, Signal, SoftwareBoard};
//!
//! # fn main() -> picofreq_driver::Result<()> {
//! let mut link = FrequencyService::new(SoftwareBoard::new(), ServiceConfig::default());
//! link.backend_mut().apply_signal(15, Signal::new(10_000.0, 40.0));
//!
//! let mut counter = CounterClient::open(15, &mut link)?;
//! let (hz, duty) = counter.measure(&mut link)?;
//! assert!((hz - 10_000.0).abs() < 1.0);
//! assert!((duty - 40.0).abs() < 0.1);
//! counter.close(&mut link)?;
//! # Ok(())
//! # }
//! ```

use crate::backend::HardwareBackend;
use crate::error::{FreqError, Result};
use crate::measurement::{CycleCounts, PeriodTicks};
use crate::protocol::{self, opcode, CmdStatus, Family, Report};
use crate::service::FrequencyService;
use tracing::{debug, warn};

/// Exchanges one report with a device
pub trait Transport {
    /// Send `command` and wait for its response
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the link fails.
    fn send_report(&mut self, command: &Report) -> Result<Report>;
}

impl<B: HardwareBackend> Transport for FrequencyService<B> {
    fn send_report(&mut self, command: &Report) -> Result<Report> {
        Ok(self.process(command).1)
    }
}

/// Send one command and turn a refusal into a typed error
fn exchange<T: Transport + ?Sized>(transport: &mut T, family: Family, op: u8, pin: u8) -> Result<Report> {
    let response = transport.send_report(&protocol::command(op, pin))?;

    if protocol::opcode(&response) != op {
        return Err(FreqError::transport(format!(
            "response to 0x{op:02x} echoed 0x{:02x}",
            protocol::opcode(&response)
        )));
    }

    match protocol::status(&response) {
        Some(CmdStatus::Ok) => Ok(response),
        Some(CmdStatus::Nok) => Err(protocol::decode_error(family, op, pin, protocol::error_code(&response))),
        Some(CmdStatus::NotConcerned) => Err(FreqError::transport(format!(
            "device does not handle 0x{op:02x}"
        ))),
        None => Err(FreqError::transport(format!(
            "unknown status byte in response to 0x{op:02x}"
        ))),
    }
}

/// PIO counter session on one pin
#[derive(Debug)]
pub struct CounterClient {
    pin: u8,
    sys_clk_hz: u32,
    open: bool,
}

impl CounterClient {
    /// Start a counter session on `pin`
    ///
    /// # Errors
    ///
    /// Returns the device's refusal decoded as a [`FreqError`].
    pub fn open<T: Transport + ?Sized>(pin: u8, transport: &mut T) -> Result<Self> {
        let response = exchange(transport, Family::Counter, opcode::FREQ_COUNTER_INIT, pin)?;
        let sys_clk_hz = protocol::word(&response, 0);
        debug!("Counter client on pin {pin}: clk_sys {sys_clk_hz} Hz");
        Ok(Self {
            pin,
            sys_clk_hz,
            open: true,
        })
    }

    /// Raw high/low cycle counts of one window
    ///
    /// # Errors
    ///
    /// `NotFound` once closed, otherwise the device's refusal.
    pub fn measure_counts<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<CycleCounts> {
        self.ensure_open()?;
        let response = exchange(
            transport,
            Family::Counter,
            opcode::FREQ_COUNTER_GET_MEASUREMENT,
            self.pin,
        )?;
        Ok(CycleCounts {
            high_cycles: protocol::word(&response, 0),
            low_cycles: protocol::word(&response, 1),
        })
    }

    /// Frequency in Hz and duty cycle in percent
    ///
    /// Both are 0.0 if the window was empty or the clock is unknown.
    ///
    /// # Errors
    ///
    /// See [`measure_counts`](Self::measure_counts).
    pub fn measure<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<(f64, f64)> {
        let counts = self.measure_counts(transport)?;
        if self.sys_clk_hz == 0 {
            warn!("Counter on pin {}: system clock unknown", self.pin);
            return Ok((0.0, 0.0));
        }
        Ok((counts.frequency_hz(self.sys_clk_hz), counts.duty_cycle_percent()))
    }

    /// End the session
    ///
    /// The handle is closed even if the device refuses.
    ///
    /// # Errors
    ///
    /// Returns the device's refusal. Closing twice is a no-op.
    pub fn close<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<()> {
        if !std::mem::replace(&mut self.open, false) {
            return Ok(());
        }
        exchange(transport, Family::Counter, opcode::FREQ_COUNTER_DEINIT, self.pin).map(drop)
    }

    /// Measured pin
    pub const fn pin(&self) -> u8 {
        self.pin
    }

    /// System clock reported at open
    pub const fn sys_clock_hz(&self) -> u32 {
        self.sys_clk_hz
    }

    /// Whether the session is still open
    pub const fn is_open(&self) -> bool {
        self.open
    }

    const fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(FreqError::NotFound { pin: self.pin })
        }
    }
}

/// Edge-timed meter session on one pin
#[derive(Debug)]
pub struct MeterClient {
    pin: u8,
    open: bool,
}

impl MeterClient {
    /// Start a meter session on `pin`
    ///
    /// # Errors
    ///
    /// Returns the device's refusal decoded as a [`FreqError`].
    pub fn open<T: Transport + ?Sized>(pin: u8, transport: &mut T) -> Result<Self> {
        exchange(transport, Family::Meter, opcode::FREQ_METER_INIT, pin)?;
        Ok(Self { pin, open: true })
    }

    /// Clear the capture and start collecting edges
    ///
    /// # Errors
    ///
    /// `NotFound` once closed, otherwise the device's refusal.
    pub fn start<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<()> {
        self.ensure_open()?;
        exchange(transport, Family::Meter, opcode::FREQ_METER_START, self.pin).map(drop)
    }

    /// Averaged period of the current capture
    ///
    /// # Errors
    ///
    /// `NotFound` once closed, `MeasurementInvalid` if no usable edges
    /// were captured.
    pub fn read_period_ticks<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<PeriodTicks> {
        self.ensure_open()?;
        let response = exchange(
            transport,
            Family::Meter,
            opcode::FREQ_METER_GET_PERIOD_TICKS,
            self.pin,
        )?;
        Ok(PeriodTicks(protocol::word(&response, 0)))
    }

    /// Frequency of the current capture in Hz
    ///
    /// # Errors
    ///
    /// See [`read_period_ticks`](Self::read_period_ticks).
    pub fn frequency_hz<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<f64> {
        self.read_period_ticks(transport).map(|p| p.frequency_hz())
    }

    /// End the session
    ///
    /// # Errors
    ///
    /// Returns the device's refusal. Closing twice is a no-op.
    pub fn close<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<()> {
        if !std::mem::replace(&mut self.open, false) {
            return Ok(());
        }
        exchange(transport, Family::Meter, opcode::FREQ_METER_DEINIT, self.pin).map(drop)
    }

    /// Measured pin
    pub const fn pin(&self) -> u8 {
        self.pin
    }

    /// Whether the session is still open
    pub const fn is_open(&self) -> bool {
        self.open
    }

    const fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(FreqError::NotFound { pin: self.pin })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::software::{Signal, SoftwareBoard};
    use crate::config::ServiceConfig;
    use crate::error::Resource;
    use std::time::Duration;

    fn link() -> FrequencyService<SoftwareBoard> {
        FrequencyService::new(SoftwareBoard::new(), ServiceConfig::default())
    }

    /// Transport that answers every command with a fixed report
    struct Canned(Report);

    impl Transport for Canned {
        fn send_report(&mut self, _command: &Report) -> Result<Report> {
            Ok(self.0)
        }
    }

    #[test]
    fn counter_open_caches_clock() {
        let mut link = link();
        let counter = CounterClient::open(3, &mut link).unwrap();
        assert_eq!(counter.sys_clock_hz(), 125_000_000);
        assert!(link.counters().is_active(3));
    }

    #[test]
    fn counter_open_twice_is_pin_conflict() {
        let mut link = link();
        let _first = CounterClient::open(3, &mut link).unwrap();
        assert_eq!(
            CounterClient::open(3, &mut link).unwrap_err(),
            FreqError::PinConflict { pin: 3 }
        );
    }

    #[test]
    fn counter_timeout_decoded() {
        let mut link = FrequencyService::new(
            SoftwareBoard::new(),
            ServiceConfig::default().with_counter(
                crate::config::CounterConfig::default().with_measure_timeout(Duration::from_millis(5)),
            ),
        );
        let counter = CounterClient::open(3, &mut link).unwrap();
        assert_eq!(
            counter.measure(&mut link).unwrap_err(),
            FreqError::Timeout { duration_ms: 0 }
        );
    }

    #[test]
    fn closed_counter_refuses_locally() {
        let mut link = link();
        let mut counter = CounterClient::open(3, &mut link).unwrap();
        counter.close(&mut link).unwrap();
        counter.close(&mut link).unwrap();
        assert!(!link.counters().is_active(3));
        assert_eq!(
            counter.measure_counts(&mut link).unwrap_err(),
            FreqError::NotFound { pin: 3 }
        );
    }

    #[test]
    fn meter_reads_frequency() {
        let mut link = link();
        link.backend_mut().apply_signal(9, Signal::new(1_000.0, 50.0));
        let meter = MeterClient::open(9, &mut link).unwrap();
        meter.start(&mut link).unwrap();
        link.backend_mut().advance(Duration::from_millis(15));

        assert_eq!(meter.read_period_ticks(&mut link).unwrap(), PeriodTicks(1_000));
        assert!((meter.frequency_hz(&mut link).unwrap() - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn meter_errors_decoded() {
        let mut link = link();
        assert_eq!(
            MeterClient::open(8, &mut link).unwrap_err(),
            FreqError::ChannelMappingInvalid { pin: 8 }
        );
        link.backend_mut().claim_dma_channels(12);
        assert_eq!(
            MeterClient::open(9, &mut link).unwrap_err(),
            FreqError::exhausted(Resource::DmaChannel)
        );
    }

    #[test]
    fn mismatched_echo_is_transport_error() {
        let mut canned = Canned(protocol::command(0x00, 0));
        let err = CounterClient::open(1, &mut canned).unwrap_err();
        assert!(matches!(err, FreqError::Transport { .. }));
    }

    #[test]
    fn not_concerned_is_transport_error() {
        let mut rsp = protocol::command(opcode::FREQ_METER_INIT, 0);
        protocol::set_status(&mut rsp, CmdStatus::NotConcerned);
        let err = MeterClient::open(1, &mut Canned(rsp)).unwrap_err();
        assert!(matches!(err, FreqError::Transport { .. }));
    }
}
