// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Carrier waveform generation
//!
//! A pulse of length `L` µs becomes `round(L / cycle)` on/off carrier cycles
//! at 38 kHz with a duty of 1/3; a space becomes a single off step. Cycle
//! boundaries are computed against the ideal timeline so rounding errors do
//! not accumulate over a long pulse. Segments are cached by length, since a
//! frame reuses a handful of distinct durations.

use std::collections::HashMap;
use std::sync::Arc;

/// Default carrier frequency in Hz.
pub const CARRIER_FREQ_HZ: f64 = 38_000.0;
/// Default carrier duty cycle.
pub const CARRIER_DUTY: f64 = 1.0 / 3.0;
/// Frames with fewer pulse/space pairs than this are rejected as malformed.
pub const FRAME_MIN_PAIRS: usize = 6;
/// Gap between repeated frames in µs.
pub const REPEAT_GAP_USEC: u32 = 10_000;

/// One step of the output waveform: pin level and duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveStep {
    pub on: bool,
    pub usec: u32,
}

/// Generate the carrier steps for a single pulse of `len_us` µs.
pub fn carrier(freq_hz: f64, duty: f64, len_us: u32) -> Vec<WaveStep> {
    let cycle_us = 1_000_000.0 / freq_hz;
    let cycles = (len_us as f64 / cycle_us).round() as u32;
    let on_usec = (cycle_us * duty).round() as u32;

    let mut steps = Vec::with_capacity(2 * cycles as usize);
    let mut cur_usec = 0u32;
    for i in 0..cycles {
        let target_usec = ((i + 1) as f64 * cycle_us).round() as u32;
        cur_usec += on_usec;
        let off_usec = target_usec.saturating_sub(cur_usec);
        cur_usec += off_usec;

        steps.push(WaveStep {
            on: true,
            usec: on_usec,
        });
        if off_usec > 0 {
            steps.push(WaveStep {
                on: false,
                usec: off_usec,
            });
        }
    }
    steps
}

/// Segment cache keyed by duration, one per emission.
#[derive(Debug, Default)]
pub struct WaveBank {
    pulse_cache: HashMap<u32, Arc<Vec<WaveStep>>>,
    space_cache: HashMap<u32, Arc<Vec<WaveStep>>>,
}

impl WaveBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Carrier-modulated segment for a pulse of `usec` µs.
    pub fn pulse(&mut self, usec: u32) -> Arc<Vec<WaveStep>> {
        self.pulse_cache
            .entry(usec)
            .or_insert_with(|| Arc::new(carrier(CARRIER_FREQ_HZ, CARRIER_DUTY, usec)))
            .clone()
    }

    /// Null segment for a space of `usec` µs.
    pub fn space(&mut self, usec: u32) -> Arc<Vec<WaveStep>> {
        self.space_cache
            .entry(usec)
            .or_insert_with(|| {
                Arc::new(vec![WaveStep {
                    on: false,
                    usec,
                }])
            })
            .clone()
    }

    pub fn clear(&mut self) {
        self.pulse_cache.clear();
        self.space_cache.clear();
    }

    /// Expand a pulse/space frame into the full output waveform, repeated
    /// `repeat` times with an inter-repeat gap.
    pub fn chain(&mut self, frame: &[(u32, u32)], repeat: u32) -> Vec<WaveStep> {
        let mut steps = Vec::new();
        for rep in 0..repeat.max(1) {
            if rep > 0 {
                steps.push(WaveStep {
                    on: false,
                    usec: REPEAT_GAP_USEC,
                });
            }
            for &(pulse, space) in frame {
                steps.extend(self.pulse(pulse).iter().copied());
                steps.extend(self.space(space).iter().copied());
            }
        }
        steps
    }
}

/// Total duration of a waveform in µs.
pub fn total_usec(steps: &[WaveStep]) -> u64 {
    steps.iter().map(|s| s.usec as u64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carrier_cycle_count() {
        // One 38 kHz cycle is ~26.3 µs, so a 425 µs pulse holds 16 cycles.
        let steps = carrier(CARRIER_FREQ_HZ, CARRIER_DUTY, 425);
        let ons = steps.iter().filter(|s| s.on).count();
        assert_eq!(ons, 16);
        // duty 1/3 -> 9 µs on per cycle
        assert!(steps.iter().filter(|s| s.on).all(|s| s.usec == 9));
    }

    #[test]
    fn carrier_length_stays_on_the_grid() {
        let steps = carrier(CARRIER_FREQ_HZ, CARRIER_DUTY, 3400);
        let total = total_usec(&steps);
        let cycles = (3400.0 / (1_000_000.0 / CARRIER_FREQ_HZ)).round() as u64;
        let ideal = (cycles as f64 * 1_000_000.0 / CARRIER_FREQ_HZ).round() as u64;
        assert_eq!(total, ideal);
    }

    #[test]
    fn bank_reuses_segments() {
        let mut bank = WaveBank::new();
        let a = bank.pulse(425);
        let b = bank.pulse(425);
        assert!(Arc::ptr_eq(&a, &b));
        let c = bank.space(1275);
        let d = bank.space(1275);
        assert!(Arc::ptr_eq(&c, &d));
    }

    #[test]
    fn chain_repeats_with_gap() {
        let mut bank = WaveBank::new();
        let frame = [(425, 425), (425, 1275)];
        let once = bank.chain(&frame, 1);
        let twice = bank.chain(&frame, 2);
        assert_eq!(
            total_usec(&twice),
            2 * total_usec(&once) + REPEAT_GAP_USEC as u64
        );
        // the gap sits between the two copies
        assert_eq!(twice[once.len()].usec, REPEAT_GAP_USEC);
        assert!(!twice[once.len()].on);
    }

    #[test]
    fn space_is_a_single_off_step() {
        let mut bank = WaveBank::new();
        let s = bank.space(12750);
        assert_eq!(s.len(), 1);
        assert_eq!(
            s[0],
            WaveStep {
                on: false,
                usec: 12750
            }
        );
    }
}
