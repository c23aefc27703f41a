// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for frequency measurement sessions

use std::fmt;
use thiserror::Error;

/// Result type alias for measurement operations
pub type Result<T> = std::result::Result<T, FreqError>;

/// Hardware or bookkeeping resource that ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// No free logical session slot
    Slot,
    /// No unclaimed PIO state machine
    ExecutionUnit,
    /// PIO instruction store too full to load the program
    ProgramSpace,
    /// PWM slice already bound
    Slice(u8),
    /// No unclaimed DMA channel
    DmaChannel,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slot => write!(f, "session slot"),
            Self::ExecutionUnit => write!(f, "PIO state machine"),
            Self::ProgramSpace => write!(f, "PIO instruction memory"),
            Self::Slice(slice) => write!(f, "PWM slice {slice}"),
            Self::DmaChannel => write!(f, "DMA channel"),
        }
    }
}

/// Errors that can occur while arbitrating resources or measuring
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FreqError {
    /// Requested pin already owns an active session
    #[error("Pin {pin} already has an active session")]
    PinConflict {
        /// Pin that was requested
        pin: u8,
    },

    /// A slot, execution unit, DMA channel or program-store capacity ran out
    #[error("Resource exhausted: {resource}")]
    ResourceExhausted {
        /// What ran out
        resource: Resource,
    },

    /// Pin's fixed channel mapping does not satisfy the operation
    #[error("Pin {pin} does not map to a usable counting channel")]
    ChannelMappingInvalid {
        /// Pin that was requested
        pin: u8,
    },

    /// Operation addressed a pin with no active session
    #[error("No active session on pin {pin}")]
    NotFound {
        /// Pin that was requested
        pin: u8,
    },

    /// Capture produced zero usable intervals
    #[error("No usable edge intervals captured on pin {pin}")]
    MeasurementInvalid {
        /// Pin that was measured
        pin: u8,
    },

    /// Hardware did not complete before the deadline
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout {
        /// Deadline in milliseconds
        duration_ms: u64,
    },

    /// Firmware rejected a command with a code the host cannot map
    #[error("Command 0x{opcode:02x} rejected with code 0x{code:02x}")]
    Rejected {
        /// Command opcode
        opcode: u8,
        /// Raw error code from the response
        code: u8,
    },

    /// Report could not be exchanged with the device
    #[error("Transport failed: {reason}")]
    Transport {
        /// Reason for failure
        reason: String,
    },
}

impl FreqError {
    /// Create a resource exhausted error
    pub const fn exhausted(resource: Resource) -> Self {
        Self::ResourceExhausted { resource }
    }

    /// Create a timeout error from a deadline
    pub fn timeout(deadline: std::time::Duration) -> Self {
        Self::Timeout {
            duration_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Create a transport error
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }
}
