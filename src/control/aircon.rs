// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Setpoint mapper and transmission gate
//!
//! Maps a desired remote setpoint into the permitted range and decides
//! whether an infrared transmission is warranted: an unchanged setpoint is
//! never re-sent, and a small change inside the minimum re-transmit
//! interval is suppressed until it has been asked for five times in a row.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{error, info};

use crate::ir::IrSender;

/// Lowest remote-control setpoint.
pub const RTEMP_MIN: i32 = 20;
/// Highest remote-control setpoint.
pub const RTEMP_MAX: i32 = 30;
/// Setpoint deltas below this are subject to min-interval suppression.
pub const SMALL_DELTA: i32 = 3;
/// A small delta is let through after this many consecutive suppressions.
pub const SKIP_COUNT_MAX: u32 = 5;
/// Button turning the device off.
pub const BUTTON_OFF: &str = "off";

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// The air conditioner as seen through its remote control.
pub struct Aircon {
    ir: Arc<dyn IrSender>,
    dev: String,
    bhdr: String,
    rtemp: i32,
    last_tx_ts: f64,
    interval_min: f64,
    skip_count: u32,
    on: bool,
}

impl Aircon {
    pub fn new(ir: Arc<dyn IrSender>, dev: &str, bhdr: &str, interval_min: f64) -> Self {
        Self {
            ir,
            dev: dev.to_string(),
            bhdr: bhdr.to_string(),
            rtemp: RTEMP_MIN,
            last_tx_ts: 0.0,
            interval_min,
            skip_count: 0,
            on: false,
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Last transmitted setpoint.
    pub fn rtemp(&self) -> i32 {
        self.rtemp
    }

    pub fn interval_min(&self) -> f64 {
        self.interval_min
    }

    pub fn set_interval_min(&mut self, interval_min: f64) {
        self.interval_min = interval_min;
    }

    /// Re-send the current setpoint unconditionally and mark the device on.
    pub async fn on(&mut self) -> Option<i32> {
        self.set_temp(self.rtemp, true).await
    }

    /// Send the off button; the device stays marked on when the
    /// transmission fails.
    pub async fn off(&mut self) -> bool {
        match self.ir.send_button(&self.dev, BUTTON_OFF).await {
            Err(e) => {
                error!("{}/{}: {}", self.dev, BUTTON_OFF, e);
                false
            }
            Ok(()) => {
                info!("{}: off", self.dev);
                self.on = false;
                true
            }
        }
    }

    /// Gate and transmit a setpoint; see [`Aircon::set_temp_at`].
    pub async fn set_temp(&mut self, rtemp: i32, force: bool) -> Option<i32> {
        self.set_temp_at(rtemp, force, unix_now()).await
    }

    /// Gate and transmit a setpoint, with an explicit notion of "now" in
    /// epoch seconds. Returns the transmitted setpoint, or `None` when the
    /// transmission was suppressed or failed.
    pub async fn set_temp_at(&mut self, rtemp: i32, force: bool, now: f64) -> Option<i32> {
        let mut rtemp = rtemp;
        if rtemp > RTEMP_MAX {
            rtemp = RTEMP_MAX;
            info!("fix: rtemp={}", rtemp);
        }
        if rtemp < RTEMP_MIN {
            rtemp = RTEMP_MIN;
            info!("fix: rtemp={}", rtemp);
        }

        if !force && rtemp == self.rtemp {
            info!("rtemp=={} .. ignored", self.rtemp);
            return None;
        }

        let interval = now - self.last_tx_ts;
        if !force && interval < self.interval_min && (self.rtemp - rtemp).abs() < SMALL_DELTA {
            self.skip_count += 1;
            if self.skip_count < SKIP_COUNT_MAX {
                info!(
                    "rtemp={}, interval={:.1} < {}[{}] .. ignored",
                    rtemp, interval, self.interval_min, self.skip_count
                );
                return None;
            }
            info!("skip count={}", self.skip_count);
        }
        self.skip_count = 0;

        let button = format!("{}{:02}", self.bhdr, rtemp);
        if let Err(e) = self.ir.send_button(&self.dev, &button).await {
            error!("{}/{}: {}", self.dev, button, e);
            return None;
        }
        info!("{}: {}", self.dev, button);

        self.on = true;
        self.last_tx_ts = now;
        self.rtemp = rtemp;
        Some(rtemp)
    }
}
