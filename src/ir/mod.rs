// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Infrared transmission
//!
//! This module covers everything between a symbolic button name and the
//! modulated waveform on the GPIO pin:
//! - [`store`]: device definition files (`*.irconf`) and the expansion of a
//!   button template into a pulse/space frame,
//! - [`wave`]: carrier generation and frame chaining,
//! - [`drivers`]: the hardware back ends (GPIO and a recording mock),
//! - [`emitter`]: the worker that owns the transmitter and serializes
//!   emissions.

pub mod drivers;
pub mod emitter;
pub mod store;
pub mod wave;

// Re-export main types for easier access
pub use emitter::{IrEmitter, IrSender};
pub use store::IrStore;

use thiserror::Error;

use crate::config::{IrConfig, IrDriverKind};
use wave::WaveStep;

/// Errors of the infrared subsystem.
#[derive(Debug, Error)]
pub enum IrError {
    #[error("{0}: no such device")]
    UnknownDevice(String),

    #[error("{0}/{1}: no such button")]
    UnknownButton(String, String),

    #[error("invalid macro: '{0}'")]
    InvalidMacro(String),

    #[error("{0}: invalid button data")]
    InvalidButton(String),

    #[error("{0}: config parse failure: {1}")]
    ConfigParse(String, String),

    #[error("frame too short: {0} pairs .. ignored")]
    FrameTooShort(usize),

    #[error("pin {0} is one of the PWM pins {1:?}")]
    PwmPin(u8, &'static [u8]),

    #[error("transmitter busy")]
    HardwareBusy,

    #[error("hardware error: {0}")]
    Hardware(String),
}

/// Low-level transmitter playing a prepared waveform.
///
/// Implementations block until the waveform has been fully transmitted.
/// Exactly one transmitter instance exists per process and it is owned by
/// the emitter worker, so transmissions are serialized.
pub trait IrTransmitter: Send {
    fn transmit(&mut self, steps: &[WaveStep]) -> Result<(), IrError>;
}

/// Factory function creating the transmitter selected by the configuration.
pub fn create_transmitter(config: &IrConfig) -> Result<Box<dyn IrTransmitter>, IrError> {
    match config.driver {
        IrDriverKind::Gpio => {
            log::info!("using GPIO transmitter on pin {}", config.pin);
            Ok(Box::new(drivers::gpio::GpioTransmitter::new(config.pin)?))
        }
        IrDriverKind::Mock => {
            log::info!("using mock transmitter");
            Ok(Box::new(drivers::mock::MockTransmitter::new()))
        }
    }
}
