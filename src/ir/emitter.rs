// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Emitter worker
//!
//! The transmitter blocks for the full length of a waveform (a frame takes
//! tens of milliseconds of busy-waiting), so it lives on a dedicated worker
//! thread owning the hardware exclusively. The async side resolves the
//! button, builds the waveform and awaits the worker's reply.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use log::{info, warn};
use tokio::sync::{mpsc, oneshot};

use super::store::IrStore;
use super::wave::{WaveBank, WaveStep, FRAME_MIN_PAIRS};
use super::{IrError, IrTransmitter};

/// Capacity of the worker job queue.
const JOB_QUEUE_LEN: usize = 8;

struct EmitJob {
    steps: Vec<WaveStep>,
    reply: oneshot::Sender<Result<(), IrError>>,
}

/// The interface the controller uses to reach the infrared subsystem.
#[async_trait]
pub trait IrSender: Send + Sync {
    /// Resolve and transmit a button. Blocks until the transmitter is idle.
    async fn send_button(&self, dev: &str, button: &str) -> Result<(), IrError>;

    /// All known device names.
    fn device_names(&self) -> Vec<String>;

    /// Macros and buttons of one device.
    fn device_detail(&self, dev: &str) -> Option<serde_json::Value>;

    /// Atomically replace the device store from the search path. Returns
    /// the number of loaded definitions; on failure the previous store is
    /// kept.
    fn reload(&self) -> Result<usize, IrError>;
}

/// Button resolution plus the worker owning the transmitter.
pub struct IrEmitter {
    store: Arc<RwLock<IrStore>>,
    jobs: mpsc::Sender<EmitJob>,
}

impl IrEmitter {
    /// Wrap a transmitter; spawns the worker thread.
    pub fn new(store: IrStore, mut transmitter: Box<dyn IrTransmitter>) -> Self {
        let (jobs, mut rx) = mpsc::channel::<EmitJob>(JOB_QUEUE_LEN);
        std::thread::spawn(move || {
            while let Some(job) = rx.blocking_recv() {
                let res = transmitter.transmit(&job.steps);
                if job.reply.send(res).is_err() {
                    warn!("emit reply receiver dropped");
                }
            }
            info!("emitter worker done");
        });
        Self {
            store: Arc::new(RwLock::new(store)),
            jobs,
        }
    }

    fn locked_store(&self) -> Result<std::sync::RwLockReadGuard<'_, IrStore>, IrError> {
        self.store
            .read()
            .map_err(|_| IrError::Hardware("device store lock poisoned".to_string()))
    }
}

#[async_trait]
impl IrSender for IrEmitter {
    async fn send_button(&self, dev: &str, button: &str) -> Result<(), IrError> {
        let (frame, repeat) = self.locked_store()?.resolve(dev, button)?;
        if frame.len() < FRAME_MIN_PAIRS {
            warn!("{}/{}: {} pairs .. ignored", dev, button, frame.len());
            return Err(IrError::FrameTooShort(frame.len()));
        }

        let mut bank = WaveBank::new();
        let steps = bank.chain(&frame, repeat);

        let (tx, rx) = oneshot::channel();
        self.jobs
            .send(EmitJob { steps, reply: tx })
            .await
            .map_err(|_| IrError::Hardware("emitter worker gone".to_string()))?;
        rx.await
            .map_err(|_| IrError::Hardware("emitter worker dropped the job".to_string()))?
    }

    fn device_names(&self) -> Vec<String> {
        self.locked_store()
            .map(|s| s.device_names())
            .unwrap_or_default()
    }

    fn device_detail(&self, dev: &str) -> Option<serde_json::Value> {
        self.locked_store().ok()?.device_detail(dev)
    }

    fn reload(&self) -> Result<usize, IrError> {
        let mut store = self
            .store
            .write()
            .map_err(|_| IrError::Hardware("device store lock poisoned".to_string()))?;
        store.load_all()
    }
}
