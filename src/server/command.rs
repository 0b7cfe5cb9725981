// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Command registry
//!
//! Every command is a record of an optional *immediate* validator and an
//! optional *deferred* executor plus a help string. Immediate validators
//! run on the connection task and must not touch controller state; deferred
//! executors run on the control thread with exclusive access to it.
//!
//! The immediate validator's return code steers the connection handler:
//!
//! - `OK` / `NG`: reply directly, nothing is enqueued,
//! - `CONTINUE`: enqueue the deferred work and await its reply,
//! - `ACCEPT`: reply first, then enqueue without awaiting.
//!
//! A command without an immediate validator behaves as `CONTINUE`.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{json, Value};

/// Name of the shutdown command.
pub const SHUTDOWN_CMD: &str = "shutdown9999";

/// Dispatcher return codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReturnCode {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "NG")]
    Ng,
    #[serde(rename = "CONTINUE")]
    Continue,
    #[serde(rename = "ACCEPT")]
    Accept,
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReturnCode::Ok => "OK",
            ReturnCode::Ng => "NG",
            ReturnCode::Continue => "CONTINUE",
            ReturnCode::Accept => "ACCEPT",
        };
        f.write_str(s)
    }
}

/// A reply as written to the wire: `{"rc": .., "msg": ..}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CmdReply {
    pub rc: ReturnCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<Value>,
}

impl CmdReply {
    pub fn ok() -> Self {
        Self {
            rc: ReturnCode::Ok,
            msg: None,
        }
    }

    pub fn ok_msg(msg: impl Into<Value>) -> Self {
        Self {
            rc: ReturnCode::Ok,
            msg: Some(msg.into()),
        }
    }

    pub fn ng(msg: impl Into<Value>) -> Self {
        Self {
            rc: ReturnCode::Ng,
            msg: Some(msg.into()),
        }
    }

    pub fn cont(msg: impl Into<Value>) -> Self {
        Self {
            rc: ReturnCode::Continue,
            msg: Some(msg.into()),
        }
    }

    pub fn accept(msg: impl Into<Value>) -> Self {
        Self {
            rc: ReturnCode::Accept,
            msg: Some(msg.into()),
        }
    }
}

/// Immediate validator, run on the connection task.
pub type ImmediateFn = Box<dyn Fn(&[String]) -> CmdReply + Send + Sync>;

/// Deferred executor, run on the control thread against the context `C`.
pub type DeferredFn<C> =
    Box<dyn for<'a> Fn(&'a mut C, &'a [String]) -> BoxFuture<'a, CmdReply> + Send + Sync>;

/// One registered command.
pub struct Command<C> {
    pub immediate: Option<ImmediateFn>,
    pub deferred: Option<DeferredFn<C>>,
    pub help: String,
}

/// Registry of commands keyed by name.
pub struct CommandRegistry<C> {
    cmds: BTreeMap<String, Command<C>>,
}

impl<C: Send + 'static> CommandRegistry<C> {
    /// An empty registry with the built-in commands `sleep` and
    /// `shutdown9999`. Call [`CommandRegistry::finalize`] after registering
    /// everything to install `help`.
    pub fn new() -> Self {
        let mut reg = Self {
            cmds: BTreeMap::new(),
        };
        reg.add(
            "sleep",
            Some(Box::new(validate_sleep)),
            Some(Box::new(deferred_sleep::<C>)),
            "sleep",
        );
        reg.add(
            SHUTDOWN_CMD,
            Some(Box::new(validate_shutdown)),
            Some(Box::new(deferred_shutdown::<C>)),
            "shutdown server",
        );
        reg
    }

    pub fn add(
        &mut self,
        name: &str,
        immediate: Option<ImmediateFn>,
        deferred: Option<DeferredFn<C>>,
        help: &str,
    ) {
        self.cmds.insert(
            name.to_string(),
            Command {
                immediate,
                deferred,
                help: help.to_string(),
            },
        );
    }

    /// Install the `help` command over a snapshot of the registered names.
    pub fn finalize(&mut self) {
        let mut listing: Vec<(String, String)> = self
            .cmds
            .iter()
            .map(|(name, cmd)| (name.clone(), cmd.help.clone()))
            .collect();
        listing.push(("help".to_string(), "command help".to_string()));
        self.add(
            "help",
            Some(Box::new(move |args: &[String]| cmd_help(&listing, args))),
            None,
            "command help",
        );
    }

    pub fn get(&self, name: &str) -> Option<&Command<C>> {
        self.cmds.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cmds.contains_key(name)
    }
}

impl<C: Send + 'static> Default for CommandRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

fn cmd_help(listing: &[(String, String)], args: &[String]) -> CmdReply {
    if args.len() >= 2 {
        return match listing.iter().find(|(name, _)| name == &args[1]) {
            Some((_, help)) => CmdReply::ok_msg(help.clone()),
            None => CmdReply::ng(format!("{}: no such command", args[1])),
        };
    }
    let listing: Vec<Value> = listing
        .iter()
        .map(|(name, help)| json!([name, help]))
        .collect();
    CmdReply::ok_msg(Value::Array(listing))
}

fn parse_sec(args: &[String]) -> Result<f64, String> {
    match args.get(1) {
        None => Err("no seconds given".to_string()),
        Some(s) => s
            .parse::<f64>()
            .map_err(|e| format!("{}: {}", args[0], e)),
    }
}

fn validate_sleep(args: &[String]) -> CmdReply {
    match parse_sec(args) {
        Ok(sec) => CmdReply::cont(format!("sleep_sec={}", sec)),
        Err(msg) => CmdReply::ng(msg),
    }
}

fn deferred_sleep<'a, C>(_c: &'a mut C, args: &'a [String]) -> BoxFuture<'a, CmdReply> {
    Box::pin(run_sleep(args))
}

async fn run_sleep(args: &[String]) -> CmdReply {
    match parse_sec(args) {
        Ok(sec) => {
            tokio::time::sleep(Duration::from_secs_f64(sec.max(0.0))).await;
            CmdReply::ok_msg(format!("{}: sleep_sec={}", args[0], sec))
        }
        Err(msg) => CmdReply::ng(msg),
    }
}

fn validate_shutdown(args: &[String]) -> CmdReply {
    if args.len() == 1 {
        return CmdReply::accept("sleep_sec=0");
    }
    match parse_sec(args) {
        Ok(sec) => CmdReply::accept(format!("sleep_sec={}", sec)),
        Err(msg) => CmdReply::ng(msg),
    }
}

fn deferred_shutdown<'a, C>(_c: &'a mut C, args: &'a [String]) -> BoxFuture<'a, CmdReply> {
    Box::pin(run_shutdown(args))
}

/// The delay is enforced by the control loop, which keeps serving queued
/// commands until the deadline; the executor only echoes it.
async fn run_shutdown(args: &[String]) -> CmdReply {
    let sec = shutdown_delay_sec(args);
    CmdReply::ok_msg(format!("{}: sleep_sec={}", args[0], sec))
}

/// Delay requested by a `shutdown9999` invocation, 0 when absent or bad.
pub fn shutdown_delay_sec(args: &[String]) -> f64 {
    args.get(1)
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
        .max(0.0)
}
