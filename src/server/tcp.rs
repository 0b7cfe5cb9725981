// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! TCP command server
//!
//! One task per accepted connection. Requests are whitespace-delimited
//! tokens terminated by a newline, read in chunks of up to 512 bytes; the
//! reply is a JSON object followed by `\r\n` and an EOT byte (0x04) marking
//! end-of-reply for streaming clients.
//!
//! Connection tasks only ever run immediate validators; anything touching
//! controller state is enqueued on the deferred queue consumed by the
//! control thread. `ACCEPT` replies are written before the work is
//! enqueued, so a client always holds the reply before execution begins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use log::{debug, error, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{mpsc, oneshot};

use super::command::{CmdReply, CommandRegistry, ReturnCode};

/// Per-request read buffer size.
pub const READ_BUF_LEN: usize = 512;
/// Connection read timeout.
pub const READ_TIMEOUT: Duration = Duration::from_secs(3);
/// Deferred queue capacity; a full queue replies NG "server busy".
pub const QUEUE_CAPACITY: usize = 100;
/// Bind retry budget.
pub const BIND_RETRY_MAX: u32 = 12;
/// Wait between bind retries.
pub const BIND_RETRY_WAIT: Duration = Duration::from_secs(5);
/// End-of-reply marker.
pub const EOT: u8 = 0x04;

/// One unit of deferred work: the request tokens and, for `CONTINUE`
/// commands, the channel the control thread posts the reply on.
#[derive(Debug)]
pub struct Deferred {
    pub args: Vec<String>,
    pub reply: Option<oneshot::Sender<CmdReply>>,
}

/// The listening server.
pub struct CmdServer<C: Send + 'static> {
    listener: TcpListener,
    registry: Arc<CommandRegistry<C>>,
    cmdq: mpsc::Sender<Deferred>,
    active: Arc<AtomicBool>,
}

impl<C: Send + 'static> CmdServer<C> {
    /// Bind with address reuse, retrying transient failures with a back-off.
    pub async fn bind(
        port: u16,
        registry: Arc<CommandRegistry<C>>,
        cmdq: mpsc::Sender<Deferred>,
        active: Arc<AtomicBool>,
    ) -> Result<Self> {
        let mut attempt = 0;
        let listener = loop {
            attempt += 1;
            match Self::try_bind(port) {
                Ok(listener) => break listener,
                Err(e) if attempt < BIND_RETRY_MAX => {
                    error!("bind port {}: {} .. retry", port, e);
                    tokio::time::sleep(BIND_RETRY_WAIT).await;
                }
                Err(e) => {
                    bail!("bind port {} failed after {} attempts: {}", port, attempt, e);
                }
            }
        };
        info!("command server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            registry,
            cmdq,
            active,
        })
    }

    fn try_bind(port: u16) -> Result<TcpListener> {
        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(([0, 0, 0, 0], port).into())?;
        Ok(socket.listen(64)?)
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop; runs until the task is aborted.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("connection from {}", peer);
                    let registry = self.registry.clone();
                    let cmdq = self.cmdq.clone();
                    let active = self.active.clone();
                    tokio::spawn(async move {
                        handle_client(stream, registry, cmdq, active).await;
                        debug!("connection from {} done", peer);
                    });
                }
                Err(e) => {
                    warn!("accept: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

async fn send_reply(stream: &mut TcpStream, reply: &CmdReply) {
    let mut out = match serde_json::to_vec(reply) {
        Ok(v) => v,
        Err(e) => {
            error!("reply serialization: {}", e);
            return;
        }
    };
    out.extend_from_slice(b"\r\n");
    out.push(EOT);
    if let Err(e) = stream.write_all(&out).await {
        warn!("reply write: {}", e);
    }
}

async fn handle_client<C: Send + 'static>(
    mut stream: TcpStream,
    registry: Arc<CommandRegistry<C>>,
    cmdq: mpsc::Sender<Deferred>,
    active: Arc<AtomicBool>,
) {
    let mut buf = [0u8; READ_BUF_LEN];

    loop {
        let n = match tokio::time::timeout(READ_TIMEOUT, stream.read(&mut buf)).await {
            Err(_) => {
                // timeout tick: keep reading while the server lives
                if active.load(Ordering::SeqCst) {
                    continue;
                }
                send_reply(&mut stream, &CmdReply::ng("server is dead !")).await;
                break;
            }
            Ok(Err(e)) => {
                warn!("read: {}", e);
                send_reply(&mut stream, &CmdReply::ng(format!("error {}", e))).await;
                break;
            }
            Ok(Ok(n)) => n,
        };
        if n == 0 {
            debug!("disconnected");
            break;
        }

        let line = match std::str::from_utf8(&buf[..n]) {
            Ok(s) => s.trim(),
            Err(e) => {
                let msg = format!("{} .. ignored", e);
                error!("{}", msg);
                send_reply(&mut stream, &CmdReply::ng(msg)).await;
                break;
            }
        };
        if line.is_empty() || line == "\u{4}" {
            debug!("disconnected");
            break;
        }

        let args: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if args.is_empty() {
            send_reply(&mut stream, &CmdReply::ng("no command")).await;
            break;
        }
        debug!("args={:?}", args);

        let Some(cmd) = registry.get(&args[0]) else {
            let msg = format!("{}: no such command .. ignored", args[0]);
            error!("{}", msg);
            send_reply(&mut stream, &CmdReply::ng(msg)).await;
            continue;
        };

        // immediate phase
        let mut immediate = None;
        if let Some(validate) = &cmd.immediate {
            let reply = validate(&args);
            info!("{}: rc={}", args[0], reply.rc);
            if reply.rc != ReturnCode::Continue && reply.rc != ReturnCode::Accept {
                send_reply(&mut stream, &reply).await;
                continue;
            }
            immediate = Some(reply);
        }

        if cmd.deferred.is_none() {
            // nothing to enqueue; the validation reply is the result
            let msg = immediate
                .and_then(|r| r.msg)
                .unwrap_or_else(|| format!("{}: nothing to execute", args[0]).into());
            send_reply(&mut stream, &CmdReply::ok_msg(msg)).await;
            continue;
        }

        // deferred phase
        let permit = match cmdq.try_reserve() {
            Ok(permit) => permit,
            Err(_) => {
                let msg = "server busy".to_string();
                warn!("{}", msg);
                send_reply(&mut stream, &CmdReply::ng(msg)).await;
                continue;
            }
        };

        let accepted = immediate
            .as_ref()
            .map(|r| r.rc == ReturnCode::Accept)
            .unwrap_or(false);
        if accepted {
            // reply first; the client never waits for execution
            send_reply(
                &mut stream,
                &CmdReply {
                    rc: ReturnCode::Accept,
                    msg: immediate.and_then(|r| r.msg),
                },
            )
            .await;
            permit.send(Deferred { args, reply: None });
            continue;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        permit.send(Deferred {
            args,
            reply: Some(reply_tx),
        });
        let reply = reply_rx
            .await
            .unwrap_or_else(|_| CmdReply::ng("terminated"));
        send_reply(&mut stream, &reply).await;
    }
}
