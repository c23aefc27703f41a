// SPDX-License-Identifier: AGPL-3.0-only

//! Board-wide arbitration state
//!
//! One `ResourceRegistry` per board. Session managers borrow it for the
//! duration of a call instead of reaching for process-wide statics, so
//! independent boards (or tests) never share state.

use crate::pool::ExecutionUnitPool;
use crate::slices::SliceRegistry;
use picofreq_chip::pio::FREQ_COUNTER_PROGRAM;

/// Shared pools the session managers allocate from
#[derive(Debug, Clone)]
pub struct ResourceRegistry {
    /// State machines running the frequency counting program
    pub units: ExecutionUnitPool,
    /// PWM slice ownership across subsystems
    pub slices: SliceRegistry,
}

impl ResourceRegistry {
    /// Registry with every resource free
    pub const fn new() -> Self {
        Self {
            units: ExecutionUnitPool::new(FREQ_COUNTER_PROGRAM),
            slices: SliceRegistry::new(),
        }
    }

    /// Whether nothing is held
    pub fn is_idle(&self) -> bool {
        self.units.claimed_count() == 0 && self.slices.busy_count() == 0
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
