// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Recording transmitter for tests and hardware-free runs.

use std::sync::{Arc, Mutex};

use log::debug;

use crate::ir::wave::{total_usec, WaveStep};
use crate::ir::{IrError, IrTransmitter};

/// One recorded transmission.
#[derive(Debug, Clone)]
pub struct Emission {
    pub steps: Vec<WaveStep>,
    pub total_usec: u64,
}

/// Shared emission log handed out by [`MockTransmitter::log`].
pub type EmissionLog = Arc<Mutex<Vec<Emission>>>;

#[derive(Debug, Default)]
pub struct MockTransmitter {
    log: EmissionLog,
    fail: bool,
}

impl MockTransmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the recorded emissions.
    pub fn log(&self) -> EmissionLog {
        self.log.clone()
    }

    /// Make every subsequent transmission fail, for error-path tests.
    pub fn set_fail(&mut self, fail: bool) {
        self.fail = fail;
    }
}

impl IrTransmitter for MockTransmitter {
    fn transmit(&mut self, steps: &[WaveStep]) -> Result<(), IrError> {
        if self.fail {
            return Err(IrError::Hardware("mock failure".to_string()));
        }
        let emission = Emission {
            steps: steps.to_vec(),
            total_usec: total_usec(steps),
        };
        debug!("recorded {} steps, {} us", steps.len(), emission.total_usec);
        self.log
            .lock()
            .map_err(|_| IrError::Hardware("emission log poisoned".to_string()))?
            .push(emission);
        Ok(())
    }
}
