//! Backend implementations
//!
//! Firmware builds provide a register-level backend for the target board.
//! The host side ships one:
//! - **Software**: deterministic model of the RP2040 peripherals the
//!   sessions use (PIO, PWM, DMA, timer), with injectable input signals

pub mod software;

pub use software::{Signal, SoftwareBoard};
