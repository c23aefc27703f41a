// SPDX-License-Identifier: AGPL-3.0-only

//! PWM slice arbitration
//!
//! Two layers guard a slice:
//!
//! - [`SliceArbiter`]: a bitmask local to one subsystem, recording which
//!   slices *it* has bound.
//! - [`SliceRegistry`]: one board-wide table with an owner tag per slice,
//!   shared by every subsystem that drives slices (edge-timed metering and
//!   PWM output). A conflict is detected no matter which side asked first.

use crate::error::{FreqError, Resource, Result};
use picofreq_chip::pwm::NUM_SLICES;
use std::fmt;
use tracing::{debug, warn};

/// Bitmask of slices bound by one subsystem
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceArbiter {
    bound: u16,
}

impl SliceArbiter {
    /// Empty arbiter
    pub const fn new() -> Self {
        Self { bound: 0 }
    }

    /// Mark `slice` as bound; `false` if it already was
    pub fn try_bind(&mut self, slice: u8) -> bool {
        let Some(bit) = Self::bit(slice) else {
            return false;
        };
        if self.bound & bit != 0 {
            return false;
        }
        self.bound |= bit;
        true
    }

    /// Clear `slice` unconditionally
    pub fn unbind(&mut self, slice: u8) {
        if let Some(bit) = Self::bit(slice) {
            self.bound &= !bit;
        }
    }

    /// Whether `slice` is bound
    pub fn is_bound(&self, slice: u8) -> bool {
        Self::bit(slice).is_some_and(|bit| self.bound & bit != 0)
    }

    /// Raw bitmask, bit n = slice n
    pub const fn mask(&self) -> u16 {
        self.bound
    }

    fn bit(slice: u8) -> Option<u16> {
        ((slice as usize) < NUM_SLICES).then(|| 1u16 << slice)
    }
}

/// Subsystem holding a slice in the shared registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SliceOwner {
    /// Edge-timed period measurement
    FrequencyMeter,
    /// PWM signal generation
    PwmOutput,
}

impl fmt::Display for SliceOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrequencyMeter => write!(f, "frequency meter"),
            Self::PwmOutput => write!(f, "PWM output"),
        }
    }
}

/// Board-wide slice ownership table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SliceRegistry {
    owners: [Option<SliceOwner>; NUM_SLICES],
}

impl SliceRegistry {
    /// Registry with every slice free
    pub const fn new() -> Self {
        Self {
            owners: [None; NUM_SLICES],
        }
    }

    /// Whether any subsystem holds `slice`
    ///
    /// Out-of-range slices report busy so they are never handed out.
    pub fn is_busy(&self, slice: u8) -> bool {
        self.owners
            .get(slice as usize)
            .map_or(true, Option::is_some)
    }

    /// Current owner of `slice`
    pub fn owner(&self, slice: u8) -> Option<SliceOwner> {
        self.owners.get(slice as usize).copied().flatten()
    }

    /// Take `slice` for `owner`
    ///
    /// # Errors
    ///
    /// Returns `ResourceExhausted` if the slice is held (by anyone,
    /// including `owner` itself) or does not exist.
    pub fn allocate(&mut self, slice: u8, owner: SliceOwner) -> Result<()> {
        let entry = self
            .owners
            .get_mut(slice as usize)
            .ok_or(FreqError::exhausted(Resource::Slice(slice)))?;

        if let Some(current) = entry {
            debug!("Slice {slice} requested by {owner} but held by {current}");
            return Err(FreqError::exhausted(Resource::Slice(slice)));
        }

        *entry = Some(owner);
        debug!("Slice {slice} allocated to {owner}");
        Ok(())
    }

    /// Give `slice` back
    ///
    /// A release by a subsystem that does not own the slice is ignored.
    pub fn release(&mut self, slice: u8, owner: SliceOwner) {
        let Some(entry) = self.owners.get_mut(slice as usize) else {
            return;
        };
        match *entry {
            Some(current) if current == owner => {
                *entry = None;
                debug!("Slice {slice} released by {owner}");
            }
            Some(current) => {
                warn!("{owner} tried to release slice {slice} owned by {current}");
            }
            None => {}
        }
    }

    /// Number of slices currently held
    pub fn busy_count(&self) -> usize {
        self.owners.iter().filter(|o| o.is_some()).count()
    }
}
