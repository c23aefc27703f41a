// SPDX-License-Identifier: AGPL-3.0-only

//! GPIO range and the pin functions the measurement paths select.

/// User GPIOs on the RP2040 (GPIO0–GPIO29).
pub const NUM_GPIOS: usize = 30;

/// Function multiplexed onto a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GpioFunction {
    /// Software-controlled I/O (reset state).
    #[default]
    Sio,
    /// PWM slice input/output.
    Pwm,
    /// Routed to PIO block 0.
    Pio0,
    /// Routed to PIO block 1.
    Pio1,
}

impl GpioFunction {
    /// PIO function for block `index`.
    #[must_use]
    pub const fn pio(index: usize) -> Self {
        if index == 0 {
            Self::Pio0
        } else {
            Self::Pio1
        }
    }
}

/// Whether `pin` names a user GPIO.
#[must_use]
pub const fn is_valid(pin: u8) -> bool {
    (pin as usize) < NUM_GPIOS
}
