// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Time-windowed temperature history
//!
//! The controller keeps a short sliding window of `(timestamp, temperature)`
//! samples. Samples are appended at the tail; once the span between head and
//! tail exceeds the configured window, head samples are evicted. A sample
//! whose timestamp is older than the current tail is dropped.

use std::collections::VecDeque;

use log::{debug, warn};

/// Default history window in seconds.
pub const DEF_WINDOW_SEC: f64 = 45.0;

/// One temperature measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Seconds since the Unix epoch (fractional).
    pub ts: f64,
    /// Measured temperature in degrees Celsius.
    pub temp: f64,
}

/// Ordered, time-windowed buffer of temperature samples.
#[derive(Debug)]
pub struct TempHist {
    samples: VecDeque<Sample>,
    window_sec: f64,
    dropped: u64,
}

impl TempHist {
    pub fn new(window_sec: f64) -> Self {
        Self {
            samples: VecDeque::new(),
            window_sec,
            dropped: 0,
        }
    }

    /// Append a sample and evict head samples falling outside the window.
    ///
    /// A sample older than the current tail violates the ordering invariant
    /// and is dropped; the drop counter is incremented and `false` returned.
    pub fn add(&mut self, ts: f64, temp: f64) -> bool {
        if let Some(tail) = self.samples.back() {
            if ts < tail.ts {
                warn!("ts={:.3} < tail ts={:.3} .. ignored", ts, tail.ts);
                self.dropped += 1;
                return false;
            }
        }

        self.samples.push_back(Sample { ts, temp });

        while self.samples.len() >= 2 {
            match self.samples.front() {
                Some(head) if ts - head.ts > self.window_sec => {
                    let old = self.samples.pop_front();
                    debug!("remove: {:?}", old);
                }
                _ => break,
            }
        }

        true
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get a sample by index; negative indices count from the tail, so
    /// `get(-1)` is the most recent sample.
    pub fn get(&self, idx: isize) -> Option<&Sample> {
        if idx >= 0 {
            self.samples.get(idx as usize)
        } else {
            let n = self.samples.len();
            n.checked_sub(idx.unsigned_abs())
                .and_then(|i| self.samples.get(i))
        }
    }

    pub fn head(&self) -> Option<&Sample> {
        self.samples.front()
    }

    pub fn tail(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Mean temperature over the window.
    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().map(|s| s.temp).sum();
        Some(sum / self.samples.len() as f64)
    }

    /// Number of samples rejected for non-monotonic timestamps.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for TempHist {
    fn default() -> Self {
        Self::new(DEF_WINDOW_SEC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_keeps_timestamps_ordered() {
        let mut hist = TempHist::new(60.0);
        assert!(hist.add(10.0, 25.0));
        assert!(hist.add(20.0, 25.5));
        assert!(!hist.add(15.0, 26.0), "older sample must be rejected");
        assert_eq!(hist.len(), 2);
        assert_eq!(hist.dropped(), 1);
        assert_eq!(hist.tail().unwrap().ts, 20.0);
    }

    #[test]
    fn window_eviction() {
        let mut hist = TempHist::new(30.0);
        for i in 0..6 {
            hist.add(i as f64 * 10.0, 25.0);
        }
        // tail ts = 50, window 30 -> head must be >= 20
        assert!(hist.tail().unwrap().ts - hist.head().unwrap().ts <= 30.0);
        assert_eq!(hist.head().unwrap().ts, 20.0);
        assert_eq!(hist.len(), 4);
    }

    #[test]
    fn at_least_one_sample_is_retained() {
        let mut hist = TempHist::new(10.0);
        hist.add(0.0, 25.0);
        hist.add(1000.0, 26.0);
        // the huge gap evicts everything but the newest sample
        assert_eq!(hist.len(), 1);
        assert_eq!(hist.tail().unwrap().ts, 1000.0);
    }

    #[test]
    fn negative_indices() {
        let mut hist = TempHist::new(60.0);
        hist.add(1.0, 21.0);
        hist.add(2.0, 22.0);
        hist.add(3.0, 23.0);
        assert_eq!(hist.get(-1).unwrap().temp, 23.0);
        assert_eq!(hist.get(-2).unwrap().temp, 22.0);
        assert_eq!(hist.get(0).unwrap().temp, 21.0);
        assert!(hist.get(-4).is_none());
        assert!(hist.get(3).is_none());
    }

    #[test]
    fn average() {
        let mut hist = TempHist::new(60.0);
        assert!(hist.average().is_none());
        hist.add(1.0, 20.0);
        hist.add(2.0, 30.0);
        assert_eq!(hist.average(), Some(25.0));
    }

    #[test]
    fn equal_timestamps_are_accepted() {
        let mut hist = TempHist::new(60.0);
        hist.add(5.0, 25.0);
        assert!(hist.add(5.0, 25.5));
        assert_eq!(hist.len(), 2);
    }
}
