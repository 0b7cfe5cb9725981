// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! `[auto_aircon]` section: the command server and control-law options.

use serde::{Deserialize, Serialize};

fn default_port() -> u16 {
    51002
}

fn default_kpd_clamp() -> bool {
    true
}

/// Command server and controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP port of the command server.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Clamp the combined P and D contributions to suppress sudden setpoint
    /// swings.
    #[serde(default = "default_kpd_clamp")]
    pub kpd_clamp: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            kpd_clamp: default_kpd_clamp(),
        }
    }
}
