// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Autoaircon
//!
//! A closed-loop controller holding a room's air temperature near a target
//! by commanding an infrared-remote air conditioner.
//!
//! Ambient-temperature samples arrive from a remote sensor over MQTT; the
//! controller keeps a short sliding history, runs a discrete PID
//! computation, maps the result to a permitted remote-control setpoint and
//! emits the corresponding button as a carrier-modulated pulse train on a
//! GPIO pin. Operators drive it over a line-oriented TCP protocol
//! (on/off, target temperature, PID gains, manual setpoint, raw IR sends).
//!
//! ## Main components
//!
//! - **config**: INI configuration with search-path probing, plus the JSON
//!   PID parameter file rewritten by the gain commands
//! - **temp**: MQTT subscriber and the time-windowed sample history
//! - **control**: PID computation, the setpoint gate and the controller
//!   state the loop mutates
//! - **ir**: device definition store, carrier waveform generation and the
//!   transmitter drivers
//! - **server**: command registry and the concurrent TCP command server
//! - **daemon**: task orchestration and the control main loop
//!
//! ## Concurrency model
//!
//! Controller state lives on a single control task; everything else (broker
//! session, TCP connections, the hardware worker) communicates with it
//! through channels. See [`daemon::launch_daemon`] for the wiring.

/// Configuration handling: the INI file and the PID parameter file.
pub mod config;

/// The control law: PID computation, setpoint gate and controller state.
pub mod control;

/// Daemon orchestration and the control main loop.
pub mod daemon;

/// Infrared transmission: device store, waveforms, drivers, emitter.
pub mod ir;

/// Command dispatch and the TCP command server.
pub mod server;

/// Status sink publisher.
pub mod status;

/// Temperature ingest and history.
pub mod temp;
