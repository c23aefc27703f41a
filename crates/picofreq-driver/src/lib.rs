//! Frequency measurement sessions for the RP2040.
//!
//! Two independent subsystems share the chip's counting resources:
//!
//! - **PIO counter**: a state machine running a shared counting program
//!   reports the high and low time of one input period in `clk_sys`
//!   cycles. Up to eight sessions, one per state machine.
//! - **Edge-timed meter**: a PWM slice counts rising edges on channel B and
//!   a DMA channel copies the free-running timer on every edge. The period
//!   is the average of up to ten intervals. Up to four sessions.
//!
//! # Resource ownership
//!
//! ```text
//! FrequencyService
//!   ├─ ResourceRegistry
//!   │    ├─ ExecutionUnitPool   8 state machines, program residency per block
//!   │    └─ SliceRegistry       8 PWM slices, tagged by owning subsystem
//!   ├─ CounterSessions          8 slots
//!   ├─ MeterSessions            4 slots + local slice mask
//!   └─ HardwareBackend          registers (firmware) or SoftwareBoard (host)
//! ```
//!
//! # Quick start
//!
//! ```
//! use picofreq_driver::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> picofreq_driver::Result<()> {
//! let mut link = FrequencyService::new(SoftwareBoard::new(), ServiceConfig::default());
//! link.backend_mut().apply_signal(7, Signal::new(2_000.0, 50.0));
//!
//! let meter = MeterClient::open(7, &mut link)?;
//! meter.start(&mut link)?;
//! link.backend_mut().advance(Duration::from_millis(20));
//! assert_eq!(meter.read_period_ticks(&mut link)?.ticks(), 500);
//! # Ok(())
//! # }
//! ```
//!
//! # Capture timing (meter)
//!
//! | Input | Full buffer after | Default holdoff covers it |
//! |-------|-------------------|---------------------------|
//! | 10 kHz | 1.1 ms | yes |
//! | 1 kHz | 11 ms | yes |
//! | 110 Hz | 100 ms | yes |
//! | 50 Hz | 220 ms | no, use `MeterConfig::for_min_frequency` |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod backend;
pub mod backends;
mod client;
mod config;
mod counter;
pub mod edge;
mod error;
mod measurement;
mod meter;
mod pool;
pub mod protocol;
mod registry;
mod service;
mod slices;

/// Chip constants (re-exported from picofreq-chip).
pub mod chip {
    pub use picofreq_chip::clocks::{DEFAULT_SYS_CLK_HZ, TIMER_HZ};
    pub use picofreq_chip::pio::{FREQ_COUNTER_PROGRAM, INSTRUCTION_MEMORY_SIZE, TOTAL_STATE_MACHINES};
    pub use picofreq_chip::pwm::{gpio_to_channel, gpio_to_slice, PwmChannel, NUM_SLICES};
}

pub use backend::HardwareBackend;
pub use backends::software::{Signal, SoftwareBoard};
pub use client::{CounterClient, MeterClient, Transport};
pub use config::{CounterConfig, MeterConfig, ServiceConfig};
pub use counter::{CounterSessions, CounterSlot, MAX_FREQ_COUNTERS};
pub use edge::{EdgeStats, EdgeTimeBuffer, NUM_EDGE_TIMES};
pub use error::{FreqError, Resource, Result};
pub use measurement::{CycleCounts, PeriodTicks};
pub use meter::{MeterSessions, MeterSlot, MAX_FREQ_METERS};
pub use pool::{ExecutionUnit, ExecutionUnitPool};
pub use protocol::{CmdStatus, Report, REPORT_SIZE};
pub use registry::ResourceRegistry;
pub use service::FrequencyService;
pub use slices::{SliceArbiter, SliceOwner, SliceRegistry};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        CmdStatus, CounterClient, CounterConfig, CycleCounts, FreqError, FrequencyService,
        HardwareBackend, MeterClient, MeterConfig, PeriodTicks, Result, ServiceConfig, Signal,
        SoftwareBoard, Transport,
    };
}
