// SPDX-License-Identifier: AGPL-3.0-only

//! Silicon model of the RP2040 resources used for frequency measurement.
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of the silicon: how many execution units and program slots
//! exist, how GPIOs map onto PWM slices and channels, how many DMA channels
//! can be claimed, and the tick rates of the clocks involved.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`pio`] | PIO blocks, state machines, instruction store, counting program |
//! | [`pwm`] | PWM slices and the GPIO → slice/channel mapping |
//! | [`dma`] | DMA channel count |
//! | [`clocks`] | System clock default and free-running timer rate |
//! | [`gpio`] | GPIO range and pin functions |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clocks;
pub mod dma;
pub mod gpio;
pub mod pio;
pub mod pwm;
