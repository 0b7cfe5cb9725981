// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Temperature ingest and history
//!
//! [`subscriber`] maintains the broker session and turns payloads into
//! [`TempEvent`]s on a freshness-biased channel; [`history`] keeps the
//! sliding window the control law runs on.

pub mod history;
pub mod subscriber;

pub use history::{Sample, TempHist};
pub use subscriber::{TempEvent, TempSubscriber};
