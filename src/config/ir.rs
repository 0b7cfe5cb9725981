// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! `[ir]` section: infrared transmitter settings.

use serde::{Deserialize, Serialize};

fn default_host() -> String {
    "localhost".to_string()
}

fn default_pin() -> u8 {
    22
}

fn default_driver() -> IrDriverKind {
    IrDriverKind::Gpio
}

/// Which transmitter implementation to instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IrDriverKind {
    /// Bit-banged carrier on a Raspberry Pi GPIO pin.
    Gpio,
    /// Recording transmitter, no hardware required.
    Mock,
}

/// Infrared transmitter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrConfig {
    /// Host of a remote IR server. Accepted for compatibility with
    /// split-process deployments; the in-process emitter ignores it.
    #[serde(default = "default_host")]
    pub host: String,

    /// GPIO pin driving the IR LED. Must not be a hardware PWM pin.
    #[serde(default = "default_pin")]
    pub pin: u8,

    /// Transmitter driver, `gpio` or `mock`.
    #[serde(default = "default_driver")]
    pub driver: IrDriverKind,
}

impl Default for IrConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            pin: default_pin(),
            driver: default_driver(),
        }
    }
}
