// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Raspberry Pi GPIO transmitter
//!
//! Plays a waveform by toggling an output pin against a microsecond
//! deadline derived from the start of the transmission, so jitter in one
//! step does not shift the remaining steps.

use std::time::{Duration, Instant};

use log::debug;
use rppal::gpio::{Gpio, OutputPin};

use crate::ir::wave::{total_usec, WaveStep};
use crate::ir::{IrError, IrTransmitter};

/// Pins reserved for hardware PWM; the carrier must not collide with them.
pub const PIN_PWM: &[u8] = &[12, 13, 18];

/// Settle time after a transmission.
const SETTLE_MSEC: u64 = 100;

pub struct GpioTransmitter {
    pin: OutputPin,
}

impl GpioTransmitter {
    pub fn new(pin: u8) -> Result<Self, IrError> {
        if PIN_PWM.contains(&pin) {
            return Err(IrError::PwmPin(pin, PIN_PWM));
        }
        let gpio = Gpio::new().map_err(|e| IrError::Hardware(e.to_string()))?;
        let pin = gpio
            .get(pin)
            .map_err(|e| IrError::Hardware(e.to_string()))?
            .into_output_low();
        Ok(Self { pin })
    }
}

impl IrTransmitter for GpioTransmitter {
    fn transmit(&mut self, steps: &[WaveStep]) -> Result<(), IrError> {
        debug!("{} steps, {} us", steps.len(), total_usec(steps));

        let start = Instant::now();
        let mut deadline_usec = 0u64;
        for step in steps {
            if step.on {
                self.pin.set_high();
            } else {
                self.pin.set_low();
            }
            deadline_usec += step.usec as u64;
            let deadline = Duration::from_micros(deadline_usec);
            while start.elapsed() < deadline {
                std::hint::spin_loop();
            }
        }
        self.pin.set_low();

        std::thread::sleep(Duration::from_millis(SETTLE_MSEC));
        Ok(())
    }
}
