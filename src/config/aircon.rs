// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! `[aircon]` section: the remote-controlled device and its send gating.

use serde::{Deserialize, Serialize};

fn default_dev_name() -> String {
    "aircon".to_string()
}

fn default_button_header() -> String {
    "on_hot_auto_".to_string()
}

fn default_interval_min() -> f64 {
    40.0
}

/// Settings for the air conditioner being commanded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirconConfig {
    /// Device name looked up in the infrared configuration store.
    #[serde(default = "default_dev_name")]
    pub dev_name: String,

    /// Button name prefix; the two-digit setpoint is appended, so a header
    /// of `on_hot_auto_` and a setpoint of 25 selects `on_hot_auto_25`.
    #[serde(default = "default_button_header")]
    pub button_header: String,

    /// Minimum interval between setpoint transmissions in seconds.
    #[serde(default = "default_interval_min")]
    pub interval_min: f64,
}

impl Default for AirconConfig {
    fn default() -> Self {
        Self {
            dev_name: default_dev_name(),
            button_header: default_button_header(),
            interval_min: default_interval_min(),
        }
    }
}
