// SPDX-License-Identifier: AGPL-3.0-only

//! Execution unit pool
//!
//! Tracks which PIO state machines are claimed and shares one resident copy
//! of a program per PIO block between all claimants.
//!
//! # Residency
//!
//! A block's program is resident iff at least one of its units is claimed.
//! Residency is computed from the claim table rather than stored, so the
//! two can never disagree. Only the load offset is kept, and it is
//! meaningful only while the block is resident.

use crate::backend::HardwareBackend;
use crate::error::{FreqError, Resource, Result};
use picofreq_chip::pio::{PioProgram, NUM_PIOS, NUM_STATE_MACHINES};
use std::fmt;
use tracing::{debug, warn};

/// A PIO state machine, identified by block and index within the block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutionUnit {
    /// PIO block ("container") index
    pub pio: usize,
    /// State machine index within the block
    pub sm: usize,
}

impl ExecutionUnit {
    /// Create a unit identity
    pub const fn new(pio: usize, sm: usize) -> Self {
        Self { pio, sm }
    }
}

impl fmt::Display for ExecutionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pio{}/sm{}", self.pio, self.sm)
    }
}

/// Claim table for every state machine plus shared program placement
#[derive(Debug, Clone)]
pub struct ExecutionUnitPool {
    program: PioProgram,
    claimed: [[bool; NUM_STATE_MACHINES]; NUM_PIOS],
    program_offset: [u8; NUM_PIOS],
}

impl ExecutionUnitPool {
    /// Create an empty pool sharing `program` across its claimants
    pub const fn new(program: PioProgram) -> Self {
        Self {
            program,
            claimed: [[false; NUM_STATE_MACHINES]; NUM_PIOS],
            program_offset: [0; NUM_PIOS],
        }
    }

    /// Program this pool loads on behalf of its claimants
    pub const fn program(&self) -> &PioProgram {
        &self.program
    }

    /// Claim the first free unit, loading the program if needed
    ///
    /// Units are scanned block 0 first, lowest index first. If the chosen
    /// unit's block has no resident program it is loaded now; when that
    /// fails nothing is claimed.
    ///
    /// # Errors
    ///
    /// Returns `ResourceExhausted` if every unit is claimed or the program
    /// cannot be loaded into the chosen block.
    pub fn claim<B: HardwareBackend + ?Sized>(&mut self, hw: &mut B) -> Result<ExecutionUnit> {
        let unit = self
            .first_free()
            .ok_or(FreqError::exhausted(Resource::ExecutionUnit))?;

        if !self.is_program_resident(unit.pio) {
            if !hw.pio_can_add_program(unit.pio, &self.program) {
                warn!(
                    "No room for '{}' in pio{}; {} not claimed",
                    self.program.name, unit.pio, unit
                );
                return Err(FreqError::exhausted(Resource::ProgramSpace));
            }
            let offset = hw.pio_add_program(unit.pio, &self.program)?;
            self.program_offset[unit.pio] = offset;
            debug!(
                "Loaded '{}' into pio{} at offset {}",
                self.program.name, unit.pio, offset
            );
        }

        self.claimed[unit.pio][unit.sm] = true;
        debug!("Claimed {unit} ({} of {} in use)", self.claimed_count(), self.capacity());
        Ok(unit)
    }

    /// Release `unit`, unloading the program if it was the block's last user
    ///
    /// Releasing an unclaimed or out-of-range unit does nothing.
    pub fn release<B: HardwareBackend + ?Sized>(&mut self, unit: ExecutionUnit, hw: &mut B) {
        if !self.is_claimed(unit) {
            return;
        }
        self.claimed[unit.pio][unit.sm] = false;
        debug!("Released {unit}");

        if !self.is_program_resident(unit.pio) {
            hw.pio_remove_program(unit.pio, &self.program, self.program_offset[unit.pio]);
            debug!(
                "Unloaded '{}' from pio{} (offset {})",
                self.program.name, unit.pio, self.program_offset[unit.pio]
            );
        }
    }

    /// Whether `unit` is currently claimed
    pub fn is_claimed(&self, unit: ExecutionUnit) -> bool {
        self.claimed
            .get(unit.pio)
            .and_then(|block| block.get(unit.sm))
            .copied()
            .unwrap_or(false)
    }

    /// Whether the program is loaded in block `pio`
    pub fn is_program_resident(&self, pio: usize) -> bool {
        self.claimed
            .get(pio)
            .is_some_and(|block| block.iter().any(|&c| c))
    }

    /// Offset of the resident program in block `pio`
    pub fn program_offset(&self, pio: usize) -> Option<u8> {
        self.is_program_resident(pio)
            .then(|| self.program_offset[pio])
    }

    /// Number of claimed units across all blocks
    pub fn claimed_count(&self) -> usize {
        self.claimed.iter().flatten().filter(|&&c| c).count()
    }

    /// Total number of units
    pub const fn capacity(&self) -> usize {
        NUM_PIOS * NUM_STATE_MACHINES
    }

    fn first_free(&self) -> Option<ExecutionUnit> {
        (0..NUM_PIOS)
            .flat_map(|pio| (0..NUM_STATE_MACHINES).map(move |sm| ExecutionUnit::new(pio, sm)))
            .find(|&unit| !self.claimed[unit.pio][unit.sm])
    }
}
