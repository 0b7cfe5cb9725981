// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Discrete PID computation over the temperature history
//!
//! The three terms are computed from the sliding window rather than a single
//! error sample:
//!
//! - P: deviation of the window average from the target,
//! - I: trapezoidal integration of the last two samples against the target,
//! - D: slope between the oldest and newest sample.
//!
//! The output has inverted sign (a room warmer than the target must lower
//! the commanded setpoint). The integrator carries its previous value so an
//! anti-windup exceedance can roll back the last accumulation step while the
//! contribution is clamped to `ki_i_max`.

use log::{debug, warn};

use crate::config::PidParam;
use crate::temp::history::TempHist;

/// Internal scale factor for the P term.
pub const COEFF_P: f64 = 1.0;
/// Internal scale factor for the I term.
pub const COEFF_I: f64 = 0.01;
/// Internal scale factor for the D term.
pub const COEFF_D: f64 = 100.0;
/// Bound on the combined P and D contributions when clamping is enabled.
pub const KPD_MAX: f64 = 3.0;

/// Per-term breakdown of one PID step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidTerms {
    pub kp_p: f64,
    pub ki_i: f64,
    pub kd_d: f64,
    /// The combined output added to the target temperature.
    pub pid: f64,
}

/// PID controller state.
#[derive(Debug)]
pub struct PidController {
    i: f64,
    prev_i: f64,
    kpd_clamp: bool,
}

impl PidController {
    pub fn new(kpd_clamp: bool) -> Self {
        Self {
            i: 0.0,
            prev_i: 0.0,
            kpd_clamp,
        }
    }

    /// Reset the integrator.
    pub fn reset(&mut self) {
        self.i = 0.0;
        self.prev_i = 0.0;
    }

    /// Accumulated integral in degree-seconds (scaled by [`COEFF_I`]).
    pub fn integral(&self) -> f64 {
        self.i
    }

    /// Run one PID step against the history.
    ///
    /// Returns `None` while the computation is underdetermined: fewer than
    /// two samples, or a zero time delta.
    pub fn step(&mut self, hist: &TempHist, ttemp: f64, param: &PidParam) -> Option<PidTerms> {
        if hist.len() < 2 {
            debug!("history too short: {}", hist.len());
            return None;
        }

        let ave = hist.average()?;
        let cur = *hist.get(-1)?;
        let prev = *hist.get(-2)?;
        let first = *hist.get(0)?;

        let d_ts = cur.ts - prev.ts;
        let span = cur.ts - first.ts;
        if d_ts <= 0.0 || span <= 0.0 {
            debug!("zero time delta: d_ts={}, span={}", d_ts, span);
            return None;
        }

        // P
        let p = (ave - ttemp) * COEFF_P;
        let kp_p = -param.kp * p;

        // I, with rollback on anti-windup exceedance
        let d_i = (cur.temp + prev.temp) * d_ts / 2.0 - ttemp * d_ts;
        self.prev_i = self.i;
        self.i += d_i * COEFF_I;
        let mut ki_i = -param.ki * self.i;
        if ki_i.abs() > param.ki_i_max {
            warn!("abs(ki_i)={:.2} > {:.2}", ki_i.abs(), param.ki_i_max);
            ki_i = ki_i.signum() * param.ki_i_max;
            self.i = self.prev_i;
        }

        // D
        let d = (cur.temp - first.temp) / span * COEFF_D;
        let kd_d = -param.kd * d;

        let pid = if self.kpd_clamp {
            ki_i + (kp_p + kd_d).clamp(-KPD_MAX, KPD_MAX)
        } else {
            kp_p + ki_i + kd_d
        };

        debug!(
            "pid={:.2} <= (kp_p,ki_i,kd_d)=({:.2},{:.2},{:.2})",
            pid, kp_p, ki_i, kd_d
        );
        Some(PidTerms {
            kp_p,
            ki_i,
            kd_d,
            pid,
        })
    }
}
