// SPDX-License-Identifier: AGPL-3.0-only

//! Programmable I/O blocks and the edge-counting micro-program.
//!
//! The RP2040 has two PIO blocks ("containers"). Each block holds four
//! state machines that share one 32-slot instruction store, so a program
//! loaded once can be executed by every state machine of that block.

/// Number of PIO blocks on the chip.
pub const NUM_PIOS: usize = 2;

/// State machines per PIO block.
pub const NUM_STATE_MACHINES: usize = 4;

/// Instruction slots in each PIO block's shared program store.
pub const INSTRUCTION_MEMORY_SIZE: usize = 32;

/// Total execution units across all blocks.
pub const TOTAL_STATE_MACHINES: usize = NUM_PIOS * NUM_STATE_MACHINES;

/// Descriptor of a PIO program as the loader sees it.
///
/// Only the footprint matters for arbitration: where it may be placed and
/// how many instruction slots it occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PioProgram {
    /// Program name, used in logs.
    pub name: &'static str,
    /// Number of instruction slots occupied.
    pub length: u8,
    /// Fixed load address, or `None` if relocatable.
    pub origin: Option<u8>,
}

impl PioProgram {
    /// Whether the program can ever fit in an empty instruction store.
    #[must_use]
    pub const fn fits_empty_store(&self) -> bool {
        match self.origin {
            Some(origin) => origin as usize + self.length as usize <= INSTRUCTION_MEMORY_SIZE,
            None => self.length as usize <= INSTRUCTION_MEMORY_SIZE,
        }
    }
}

/// High/low duration counter.
///
/// ```text
/// .program freq_counter
/// .wrap_target
///     mov x, ~null
///     wait 0 pin 0
///     wait 1 pin 0        ; align on a rising edge
/// high:
///     jmp x-- still_high
/// still_high:
///     jmp pin high
///     mov y, ~null
/// low:
///     jmp pin done
///     jmp y-- low
/// done:
///     mov isr, ~x
///     push block          ; high count
///     mov isr, ~y
///     push block          ; low count
/// .wrap
/// ```
///
/// One measurement window is one full period of the input; the two pushes
/// are what the driver reads back as the high and low cycle counts.
pub const FREQ_COUNTER_PROGRAM: PioProgram = PioProgram {
    name: "freq_counter",
    length: 12,
    origin: None,
};
