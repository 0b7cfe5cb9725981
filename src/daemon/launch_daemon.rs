// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon management
//!
//! Wires the subsystems together and runs the control main loop. The task
//! layout follows the two-region model:
//!
//! - the **control region** is this module's [`Daemon::run`] loop, the only
//!   task mutating the [`Controller`];
//! - the **I/O region** is the MQTT subscriber task, one task per TCP
//!   connection, and the emitter worker thread.
//!
//! The loop blocks on the union of two sources: the next temperature event
//! and the next deferred command. The `shutdown9999` command, the broker's
//! end-of-stream sentinel and a Ctrl-C (routed through the deferred queue)
//! all end the loop; pending `CONTINUE` clients are answered with
//! NG `terminated` while draining.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::{Config, PidParamFile};
use crate::control::Controller;
use crate::ir::{create_transmitter, IrEmitter, IrSender, IrStore};
use crate::server::command::{shutdown_delay_sec, CmdReply, CommandRegistry, SHUTDOWN_CMD};
use crate::server::tcp::{CmdServer, Deferred, QUEUE_CAPACITY};
use crate::status::StatusClient;
use crate::temp::{TempEvent, TempSubscriber};

/// The assembled daemon: controller plus its I/O tasks.
pub struct Daemon {
    controller: Controller,
    registry: Arc<CommandRegistry<Controller>>,
    cmdq_tx: mpsc::Sender<Deferred>,
    cmdq_rx: mpsc::Receiver<Deferred>,
    sample_rx: broadcast::Receiver<TempEvent>,
    subscriber: TempSubscriber,
    server_task: JoinHandle<()>,
    running: Arc<AtomicBool>,
}

impl Daemon {
    /// Build every subsystem and start the I/O tasks.
    ///
    /// Fails when the device store cannot be parsed, the transmitter cannot
    /// be initialized, or the listener cannot bind within its retry budget.
    pub async fn launch(config: Config, params: PidParamFile, ttemp: f64) -> Result<Self> {
        let mut store = IrStore::default();
        let n = store.load_all().context("load device definitions")?;
        info!("{} device definitions", n);

        let transmitter = create_transmitter(&config.ir).context("initialize transmitter")?;
        let emitter: Arc<dyn IrSender> = Arc::new(IrEmitter::new(store, transmitter));

        let status = StatusClient::new(&config.param.host, config.param.port);

        let subscriber = TempSubscriber::start(&config.temp).context("start subscriber")?;
        let sample_rx = subscriber.subscribe();

        let running = Arc::new(AtomicBool::new(true));
        let registry = Arc::new(Controller::registry());
        let (cmdq_tx, cmdq_rx) = mpsc::channel(QUEUE_CAPACITY);

        let server = CmdServer::bind(
            config.auto_aircon.port,
            registry.clone(),
            cmdq_tx.clone(),
            running.clone(),
        )
        .await?;
        let server_task = tokio::spawn(server.run());

        let controller = Controller::new(&config, params, ttemp, emitter, status);

        Ok(Self {
            controller,
            registry,
            cmdq_tx,
            cmdq_rx,
            sample_rx,
            subscriber,
            server_task,
            running,
        })
    }

    /// A handle for injecting deferred work from outside the server, e.g.
    /// routing Ctrl-C through the shutdown command.
    pub fn command_queue(&self) -> mpsc::Sender<Deferred> {
        self.cmdq_tx.clone()
    }

    /// The control main loop. Returns after an orderly shutdown.
    pub async fn run(&mut self) -> Result<()> {
        self.controller.startup().await;

        // armed by shutdown9999; the loop keeps serving until it fires
        let mut deadline: Option<tokio::time::Instant> = None;

        loop {
            let exit_timer = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                event = self.sample_rx.recv() => match event {
                    Ok(TempEvent::Sample(sample)) => {
                        self.controller.handle_sample(sample).await;
                    }
                    Ok(TempEvent::EndOfStream) => {
                        info!("end of stream .. shutdown");
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("lagged, {} samples dropped", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("sample channel closed .. shutdown");
                        break;
                    }
                },
                deferred = self.cmdq_rx.recv() => {
                    let Some(deferred) = deferred else { break };
                    info!("args={:?}", deferred.args);

                    let reply = self.execute(&deferred.args).await;
                    let shutdown = deferred.args.first().map(String::as_str) == Some(SHUTDOWN_CMD);
                    if let Some(tx) = deferred.reply {
                        let _ = tx.send(reply);
                    }
                    if shutdown {
                        let sec = shutdown_delay_sec(&deferred.args);
                        info!("shutdown in {} sec", sec);
                        deadline = Some(
                            tokio::time::Instant::now()
                                + std::time::Duration::from_secs_f64(sec),
                        );
                    }
                },
                _ = exit_timer => {
                    info!("shutdown !!");
                    break;
                },
            }
        }

        self.end().await
    }

    /// Run one deferred command against the controller.
    async fn execute(&mut self, args: &[String]) -> CmdReply {
        let registry = self.registry.clone();
        let Some(name) = args.first() else {
            return CmdReply::ng("no command");
        };
        match registry.get(name) {
            None => CmdReply::ng(format!("{}: no such command .. ignored", name)),
            Some(cmd) => match &cmd.deferred {
                None => CmdReply::ng(format!("{}: nothing to execute .. ignored", name)),
                Some(run) => run(&mut self.controller, args).await,
            },
        }
    }

    /// Stop accepting work, drain pending requests and tear the I/O down.
    pub async fn end(&mut self) -> Result<()> {
        info!("shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);

        while let Ok(deferred) = self.cmdq_rx.try_recv() {
            if let Some(tx) = deferred.reply {
                let _ = tx.send(CmdReply::ng("terminated"));
            }
        }

        self.server_task.abort();
        if let Err(e) = self.subscriber.end().await {
            warn!("subscriber teardown: {:#}", e);
        }
        info!("done");
        Ok(())
    }
}
