// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! `[temp]` section: the MQTT source of ambient-temperature samples.

use serde::{Deserialize, Serialize};

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_topic() -> String {
    "env1/temp".to_string()
}

fn default_window_sec() -> f64 {
    crate::temp::history::DEF_WINDOW_SEC
}

/// Temperature ingest settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempConfig {
    /// MQTT broker host.
    #[serde(default = "default_host")]
    pub host: String,

    /// MQTT broker port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Topic carrying `{"ts": <ms>, "data": <temp>}` payloads.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Access token, sent as the MQTT username when non-empty.
    #[serde(default)]
    pub token: String,

    /// History window in seconds.
    #[serde(default = "default_window_sec")]
    pub window_sec: f64,
}

impl Default for TempConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            topic: default_topic(),
            token: String::new(),
            window_sec: default_window_sec(),
        }
    }
}
