// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Command dispatch and the TCP command server
//!
//! [`command`] holds the registry of named commands with their immediate
//! validators and deferred executors; [`tcp`] serves them over a
//! line-oriented protocol and funnels deferred work onto the single queue
//! the control thread consumes.

pub mod command;
pub mod tcp;

pub use command::{CmdReply, CommandRegistry, ReturnCode, SHUTDOWN_CMD};
pub use tcp::{CmdServer, Deferred};
