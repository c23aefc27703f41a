// SPDX-License-Identifier: AGPL-3.0-only

//! Command dispatch for both measurement subsystems
//!
//! [`FrequencyService`] is the single owner of the backend, the shared
//! resource registry and both session tables. Commands are handled one at
//! a time through `&mut self`, so no table is ever observed mid-update.

use crate::backend::HardwareBackend;
use crate::config::ServiceConfig;
use crate::counter::CounterSessions;
use crate::error::{FreqError, Result};
use crate::meter::MeterSessions;
use crate::protocol::{self, opcode, CmdStatus, Family, Report};
use crate::registry::ResourceRegistry;
use tracing::{debug, info, trace};

/// Frequency measurement front end over a hardware backend
#[derive(Debug)]
pub struct FrequencyService<B: HardwareBackend> {
    backend: B,
    registry: ResourceRegistry,
    counters: CounterSessions,
    meters: MeterSessions,
}

impl<B: HardwareBackend> FrequencyService<B> {
    /// Service with empty session tables
    pub fn new(backend: B, config: ServiceConfig) -> Self {
        info!(
            "Frequency service up: counter deadline {:?}, meter holdoff {:?}",
            config.counter.measure_timeout, config.meter.capture_holdoff
        );
        Self {
            backend,
            registry: ResourceRegistry::new(),
            counters: CounterSessions::new(config.counter),
            meters: MeterSessions::new(config.meter),
        }
    }

    /// Handle one command report
    ///
    /// Unknown opcodes get `NotConcerned` and a response carrying only the
    /// echoed opcode and status.
    pub fn process(&mut self, command: &Report) -> (CmdStatus, Report) {
        let op = protocol::opcode(command);
        let pin = protocol::command_pin(command);
        let mut response = protocol::response_to(command);

        let status = match Family::of(op) {
            None => {
                trace!("Opcode 0x{op:02x} not concerned");
                CmdStatus::NotConcerned
            }
            Some(family) => {
                protocol::set_pin(&mut response, pin);
                let outcome = match family {
                    Family::Counter => self.counter_command(op, pin, &mut response),
                    Family::Meter => self.meter_command(op, pin, &mut response),
                };
                match outcome {
                    Ok(()) => CmdStatus::Ok,
                    Err(e) => {
                        let code = match family {
                            Family::Counter => protocol::counter_error_code(&e),
                            Family::Meter => protocol::meter_error_code(&e),
                        };
                        debug!("0x{op:02x} on pin {pin} refused (code 0x{code:02x}): {e}");
                        protocol::set_error_code(&mut response, code);
                        CmdStatus::Nok
                    }
                }
            }
        };

        protocol::set_status(&mut response, status);
        (status, response)
    }

    fn counter_command(&mut self, op: u8, pin: u8, response: &mut Report) -> Result<()> {
        let hw = &mut self.backend;
        match op {
            opcode::FREQ_COUNTER_INIT => {
                let sys_clk_hz = self.counters.init(pin, &mut self.registry, hw)?;
                protocol::put_words(response, &[sys_clk_hz]);
            }
            opcode::FREQ_COUNTER_DEINIT => self.counters.deinit(pin, &mut self.registry, hw)?,
            opcode::FREQ_COUNTER_GET_MEASUREMENT => {
                let counts = self.counters.measure(pin, hw)?;
                protocol::put_words(response, &[counts.high_cycles, counts.low_cycles]);
            }
            _ => return Err(FreqError::Rejected { opcode: op, code: protocol::UNSPECIFIED_CODE }),
        }
        Ok(())
    }

    fn meter_command(&mut self, op: u8, pin: u8, response: &mut Report) -> Result<()> {
        let hw = &mut self.backend;
        match op {
            opcode::FREQ_METER_INIT => self.meters.init(pin, &mut self.registry, hw)?,
            opcode::FREQ_METER_DEINIT => self.meters.deinit(pin, &mut self.registry, hw)?,
            opcode::FREQ_METER_START => self.meters.start(pin, hw)?,
            opcode::FREQ_METER_GET_PERIOD_TICKS => {
                let period = self.meters.read_period(pin, hw)?;
                protocol::put_words(response, &[period.ticks()]);
            }
            _ => return Err(FreqError::Rejected { opcode: op, code: protocol::UNSPECIFIED_CODE }),
        }
        Ok(())
    }

    /// Force-release every session of both subsystems
    pub fn shutdown(&mut self) {
        let (counters, meters) = (self.counters.active_count(), self.meters.active_count());
        if counters + meters > 0 {
            info!("Shutting down {counters} counter and {meters} meter sessions");
        }
        self.counters.teardown(&mut self.registry, &mut self.backend);
        self.meters.teardown(&mut self.registry, &mut self.backend);
    }

    /// Backend, e.g. to inspect a simulated board
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable backend, e.g. to drive a simulated board
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Shared resource registry
    pub const fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Counter session table
    pub const fn counters(&self) -> &CounterSessions {
        &self.counters
    }

    /// Meter session table
    pub const fn meters(&self) -> &MeterSessions {
        &self.meters
    }
}

impl<B: HardwareBackend> Drop for FrequencyService<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::software::{Signal, SoftwareBoard};
    use crate::protocol::command;
    use crate::slices::SliceOwner;
    use std::time::Duration;

    fn service() -> FrequencyService<SoftwareBoard> {
        FrequencyService::new(SoftwareBoard::new(), ServiceConfig::default())
    }

    #[test]
    fn unknown_opcode_not_concerned() {
        let mut svc = service();
        let (status, rsp) = svc.process(&command(0x42, 9));
        assert_eq!(status, CmdStatus::NotConcerned);
        assert_eq!(rsp[0], 0x42);
        assert_eq!(rsp[1], 0x03);
        assert!(rsp[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn counter_init_reports_clock() {
        let mut svc = service();
        let (status, rsp) = svc.process(&command(opcode::FREQ_COUNTER_INIT, 15));
        assert_eq!(status, CmdStatus::Ok);
        assert_eq!(rsp[2], 15);
        assert_eq!(protocol::word(&rsp, 0), 125_000_000);
    }

    #[test]
    fn counter_measurement_round_trip() {
        let mut svc = service();
        svc.backend_mut().apply_signal(15, Signal::new(1_000.0, 25.0));
        svc.process(&command(opcode::FREQ_COUNTER_INIT, 15));

        let (status, rsp) = svc.process(&command(opcode::FREQ_COUNTER_GET_MEASUREMENT, 15));
        assert_eq!(status, CmdStatus::Ok);
        assert_eq!(protocol::word(&rsp, 0), 31_250);
        assert_eq!(protocol::word(&rsp, 1), 93_750);
    }

    #[test]
    fn duplicate_counter_init_code() {
        let mut svc = service();
        svc.process(&command(opcode::FREQ_COUNTER_INIT, 15));
        let (status, rsp) = svc.process(&command(opcode::FREQ_COUNTER_INIT, 15));
        assert_eq!(status, CmdStatus::Nok);
        assert_eq!(protocol::error_code(&rsp), 0x02);
    }

    #[test]
    fn meter_read_without_edges_is_nok() {
        let mut svc = service();
        svc.process(&command(opcode::FREQ_METER_INIT, 7));
        svc.process(&command(opcode::FREQ_METER_START, 7));
        let (status, rsp) = svc.process(&command(opcode::FREQ_METER_GET_PERIOD_TICKS, 7));
        assert_eq!(status, CmdStatus::Nok);
        assert_eq!(protocol::error_code(&rsp), 0x02);
    }

    #[test]
    fn meter_period_round_trip() {
        let mut svc = service();
        svc.backend_mut().apply_signal(7, Signal::new(2_000.0, 50.0));
        svc.process(&command(opcode::FREQ_METER_INIT, 7));
        svc.process(&command(opcode::FREQ_METER_START, 7));
        svc.backend_mut().advance(Duration::from_millis(10));

        let (status, rsp) = svc.process(&command(opcode::FREQ_METER_GET_PERIOD_TICKS, 7));
        assert_eq!(status, CmdStatus::Ok);
        assert_eq!(protocol::word(&rsp, 0), 500);
    }

    #[test]
    fn shutdown_releases_both_subsystems() {
        let mut svc = service();
        svc.process(&command(opcode::FREQ_COUNTER_INIT, 2));
        svc.process(&command(opcode::FREQ_METER_INIT, 5));
        assert_eq!(svc.registry().slices.owner(2), Some(SliceOwner::FrequencyMeter));

        svc.shutdown();
        assert!(svc.registry().is_idle());
        assert_eq!(svc.counters().active_count(), 0);
        assert_eq!(svc.meters().active_count(), 0);
        assert_eq!(svc.backend().dma_claimed_count(), 0);
    }
}
