// SPDX-License-Identifier: AGPL-3.0-only

//! Fixed-size command/response reports
//!
//! Commands and responses are 64-byte reports. A command carries the opcode
//! and the pin; a response echoes both and adds a status byte:
//!
//! ```text
//! command:  | opcode | pin    | 0 ...
//! response: | opcode | status | pin | error code  | 0 ...          (NOK)
//!                                   | u32 LE  | u32 LE | 0 ...    (OK)
//! ```
//!
//! Error codes are per command family and kept compatible with existing
//! host tooling, so the same code can mean different things for counter
//! and meter commands.

use crate::error::{FreqError, Resource};
use bytes::{Buf, BufMut};

/// Size of every command and response
pub const REPORT_SIZE: usize = 64;

/// One command or response
pub type Report = [u8; REPORT_SIZE];

/// Byte offset of the pin in a command
const CMD_PIN: usize = 1;
/// Byte offset of the status in a response
const RSP_STATUS: usize = 1;
/// Byte offset of the pin in a response
const RSP_PIN: usize = 2;
/// Byte offset of the error code or first payload word in a response
const RSP_PAYLOAD: usize = 3;

/// Command opcodes
pub mod opcode {
    /// Start a PIO counter session
    pub const FREQ_COUNTER_INIT: u8 = 0xA0;
    /// Stop a PIO counter session
    pub const FREQ_COUNTER_DEINIT: u8 = 0xA1;
    /// Read one high/low window
    pub const FREQ_COUNTER_GET_MEASUREMENT: u8 = 0xA2;
    /// Start an edge-timed meter session
    pub const FREQ_METER_INIT: u8 = 0xA8;
    /// Stop an edge-timed meter session
    pub const FREQ_METER_DEINIT: u8 = 0xA9;
    /// Clear and restart the edge capture
    pub const FREQ_METER_START: u8 = 0xAA;
    /// Read the averaged period
    pub const FREQ_METER_GET_PERIOD_TICKS: u8 = 0xAB;
}

/// Outcome of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CmdStatus {
    /// Handled successfully
    Ok = 0x01,
    /// Handled and refused; the error code is at byte 3
    Nok = 0x02,
    /// Opcode belongs to no handler here
    NotConcerned = 0x03,
}

impl CmdStatus {
    /// Wire value
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse a wire value
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Ok),
            0x02 => Some(Self::Nok),
            0x03 => Some(Self::NotConcerned),
            _ => None,
        }
    }
}

/// Command family an opcode belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// PIO frequency counter
    Counter,
    /// Edge-timed frequency meter
    Meter,
}

impl Family {
    /// Family of `opcode`, `None` for opcodes handled elsewhere
    pub const fn of(opcode: u8) -> Option<Self> {
        match opcode {
            opcode::FREQ_COUNTER_INIT
            | opcode::FREQ_COUNTER_DEINIT
            | opcode::FREQ_COUNTER_GET_MEASUREMENT => Some(Self::Counter),
            opcode::FREQ_METER_INIT
            | opcode::FREQ_METER_DEINIT
            | opcode::FREQ_METER_START
            | opcode::FREQ_METER_GET_PERIOD_TICKS => Some(Self::Meter),
            _ => None,
        }
    }
}

/// Counter error codes
pub mod counter_code {
    /// No slot, state machine or program space
    pub const RESOURCE_EXHAUSTED: u8 = 0x01;
    /// Pin already counting
    pub const PIN_CONFLICT: u8 = 0x02;
    /// No session on the pin
    pub const NOT_FOUND: u8 = 0x03;
    /// No window completed before the deadline
    pub const TIMEOUT: u8 = 0x04;
    /// Pin is not a user GPIO
    pub const INVALID_PIN: u8 = 0x05;
}

/// Meter error codes
pub mod meter_code {
    /// Pin or slice busy (init), or no session (start/read)
    pub const BUSY_OR_NOT_FOUND: u8 = 0x01;
    /// No DMA channel (init), or no usable intervals (read)
    pub const NO_DMA_OR_INVALID: u8 = 0x02;
    /// All session slots in use
    pub const NO_SLOT: u8 = 0x03;
    /// Pin is not a channel-B pin
    pub const CHANNEL_MAPPING: u8 = 0x04;
}

/// Code for an error that has no family-specific mapping
pub const UNSPECIFIED_CODE: u8 = 0xFF;

// ── Building and parsing ─────────────────────────────────────────────────

/// Command report for `opcode` on `pin`
pub fn command(opcode: u8, pin: u8) -> Report {
    let mut report = [0u8; REPORT_SIZE];
    let mut buf = &mut report[..];
    buf.put_u8(opcode);
    buf.put_u8(pin);
    report
}

/// Opcode of a command or response
pub const fn opcode(report: &Report) -> u8 {
    report[0]
}

/// Pin addressed by a command
pub const fn command_pin(report: &Report) -> u8 {
    report[CMD_PIN]
}

/// Empty response echoing the opcode of `command`
pub fn response_to(command: &Report) -> Report {
    let mut response = [0u8; REPORT_SIZE];
    response[0] = opcode(command);
    response
}

/// Write the status byte
pub fn set_status(response: &mut Report, status: CmdStatus) {
    response[RSP_STATUS] = status.as_byte();
}

/// Echo the pin into a response
pub fn set_pin(response: &mut Report, pin: u8) {
    response[RSP_PIN] = pin;
}

/// Write the error code of a NOK response
pub fn set_error_code(response: &mut Report, code: u8) {
    response[RSP_PAYLOAD] = code;
}

/// Write little-endian words starting at the payload offset
pub fn put_words(response: &mut Report, words: &[u32]) {
    let mut buf = &mut response[RSP_PAYLOAD..];
    for &word in words {
        buf.put_u32_le(word);
    }
}

/// Status of a response, `None` if the byte is not a known status
pub const fn status(response: &Report) -> Option<CmdStatus> {
    CmdStatus::from_byte(response[RSP_STATUS])
}

/// Pin echoed in a response
pub const fn response_pin(response: &Report) -> u8 {
    response[RSP_PIN]
}

/// Error code of a NOK response
pub const fn error_code(response: &Report) -> u8 {
    response[RSP_PAYLOAD]
}

/// Payload word `index` (0-based) of an OK response
pub fn word(response: &Report, index: usize) -> u32 {
    let mut buf = &response[RSP_PAYLOAD + 4 * index..];
    buf.get_u32_le()
}

// ── Error codes ──────────────────────────────────────────────────────────

/// Wire code for a counter command failure
pub const fn counter_error_code(err: &FreqError) -> u8 {
    match err {
        FreqError::ResourceExhausted { .. } => counter_code::RESOURCE_EXHAUSTED,
        FreqError::PinConflict { .. } => counter_code::PIN_CONFLICT,
        FreqError::NotFound { .. } => counter_code::NOT_FOUND,
        FreqError::Timeout { .. } => counter_code::TIMEOUT,
        FreqError::ChannelMappingInvalid { .. } => counter_code::INVALID_PIN,
        _ => UNSPECIFIED_CODE,
    }
}

/// Wire code for a meter command failure
pub const fn meter_error_code(err: &FreqError) -> u8 {
    match err {
        FreqError::PinConflict { .. }
        | FreqError::NotFound { .. }
        | FreqError::ResourceExhausted {
            resource: Resource::Slice(_),
        } => meter_code::BUSY_OR_NOT_FOUND,
        FreqError::ResourceExhausted {
            resource: Resource::DmaChannel,
        }
        | FreqError::MeasurementInvalid { .. } => meter_code::NO_DMA_OR_INVALID,
        FreqError::ResourceExhausted {
            resource: Resource::Slot,
        } => meter_code::NO_SLOT,
        FreqError::ChannelMappingInvalid { .. } => meter_code::CHANNEL_MAPPING,
        _ => UNSPECIFIED_CODE,
    }
}

/// Typed error for a NOK response
///
/// Codes are ambiguous on the wire (a counter `0x01` may be a slot or a
/// state machine), so the decoded error names the likeliest resource. A
/// decoded `Timeout` carries `duration_ms: 0`; the deadline is not sent.
pub const fn decode_error(family: Family, opcode: u8, pin: u8, code: u8) -> FreqError {
    match (family, code) {
        (Family::Counter, counter_code::RESOURCE_EXHAUSTED) => FreqError::exhausted(Resource::ExecutionUnit),
        (Family::Counter, counter_code::PIN_CONFLICT) => FreqError::PinConflict { pin },
        (Family::Counter, counter_code::NOT_FOUND) => FreqError::NotFound { pin },
        (Family::Counter, counter_code::TIMEOUT) => FreqError::Timeout { duration_ms: 0 },
        (Family::Counter, counter_code::INVALID_PIN) | (Family::Meter, meter_code::CHANNEL_MAPPING) => {
            FreqError::ChannelMappingInvalid { pin }
        }
        (Family::Meter, meter_code::BUSY_OR_NOT_FOUND) if opcode == opcode::FREQ_METER_INIT => {
            FreqError::PinConflict { pin }
        }
        (Family::Meter, meter_code::BUSY_OR_NOT_FOUND) => FreqError::NotFound { pin },
        (Family::Meter, meter_code::NO_DMA_OR_INVALID) if opcode == opcode::FREQ_METER_INIT => {
            FreqError::exhausted(Resource::DmaChannel)
        }
        (Family::Meter, meter_code::NO_DMA_OR_INVALID) => FreqError::MeasurementInvalid { pin },
        (Family::Meter, meter_code::NO_SLOT) => FreqError::exhausted(Resource::Slot),
        _ => FreqError::Rejected { opcode, code },
    }
}
