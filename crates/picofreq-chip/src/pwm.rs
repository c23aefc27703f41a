// SPDX-License-Identifier: AGPL-3.0-only

//! PWM slices and the fixed GPIO → slice/channel mapping.
//!
//! Every GPIO is hard-wired to one channel of one slice:
//!
//! ```text
//! slice   = (gpio >> 1) & 7
//! channel = gpio & 1        (0 = A, 1 = B)
//! ```
//!
//! Only channel B can clock the slice counter from an external input,
//! which is what edge-timed period measurement relies on.

use crate::gpio::NUM_GPIOS;

/// Number of PWM slices.
pub const NUM_SLICES: usize = 8;

/// Counter wrap value used for edge timing: every counted edge wraps the
/// counter and raises the slice DREQ.
pub const EDGE_TIMING_WRAP: u16 = 0;

/// One of the two channels of a slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PwmChannel {
    /// Output-only channel.
    A,
    /// Channel that can also act as the counter's clock input.
    B,
}

/// Slice a GPIO belongs to, or `None` for pins outside the GPIO range.
#[must_use]
pub const fn gpio_to_slice(gpio: u8) -> Option<u8> {
    if (gpio as usize) < NUM_GPIOS {
        Some((gpio >> 1) & 7)
    } else {
        None
    }
}

/// Channel a GPIO drives, or `None` for pins outside the GPIO range.
#[must_use]
pub const fn gpio_to_channel(gpio: u8) -> Option<PwmChannel> {
    if (gpio as usize) >= NUM_GPIOS {
        return None;
    }
    if gpio & 1 == 0 {
        Some(PwmChannel::A)
    } else {
        Some(PwmChannel::B)
    }
}

/// GPIOs wired to channel B of `slice`, in ascending order.
#[allow(clippy::cast_possible_truncation)]
pub fn channel_b_gpios(slice: u8) -> impl Iterator<Item = u8> {
    (0..NUM_GPIOS as u8).filter(move |&g| {
        gpio_to_slice(g) == Some(slice) && gpio_to_channel(g) == Some(PwmChannel::B)
    })
}
