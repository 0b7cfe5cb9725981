// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the controller daemon
//!
//! The configuration is an INI file with one section per concern:
//!
//! ```ini
//! [ir]
//! pin = 22
//! driver = gpio
//!
//! [aircon]
//! dev_name = aircon
//! button_header = on_hot_auto_
//! interval_min = 40
//!
//! [param]
//! host = localhost
//! port = 51888
//!
//! [temp]
//! host = localhost
//! topic = env1/temp
//! token =
//! window_sec = 45
//!
//! [auto_aircon]
//! port = 51002
//! kpd_clamp = true
//! ```
//!
//! The file is searched under the candidate names `autoaircon.conf`,
//! `.autoaircon.conf` and `.autoaircon` in the current directory, `$HOME`
//! and `/etc`. Every key has a default, so a minimal file only needs the
//! values that differ. When no file is found at all, a sample is written
//! next to the working directory for the user to edit, and startup fails.
//!
//! The PID gains live in a separate JSON parameter file handled by the
//! [`pid`] module because the `kp`/`ki`/`kd` commands rewrite it at runtime.

pub mod aircon;
pub mod ir;
pub mod param;
pub mod pid;
pub mod server;
pub mod temp;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use config::FileFormat;
use log::{debug, error};
use serde::{Deserialize, Serialize};

// Re-export all types for public API
pub use aircon::AirconConfig;
pub use ir::{IrConfig, IrDriverKind};
pub use param::ParamConfig;
pub use pid::{PidParam, PidParamFile};
pub use server::ServerConfig;
pub use temp::TempConfig;

/// Candidate configuration file names, probed in order.
pub const CONF_FILENAMES: [&str; 3] = ["autoaircon.conf", ".autoaircon.conf", ".autoaircon"];

/// Root configuration structure for the controller daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Infrared transmitter settings.
    #[serde(default)]
    pub ir: IrConfig,

    /// Air conditioner device and send gating.
    #[serde(default)]
    pub aircon: AirconConfig,

    /// Status sink address.
    #[serde(default)]
    pub param: ParamConfig,

    /// Temperature ingest settings.
    #[serde(default)]
    pub temp: TempConfig,

    /// Command server and control-law options.
    #[serde(default)]
    pub auto_aircon: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ir: IrConfig::default(),
            aircon: AirconConfig::default(),
            param: ParamConfig::default(),
            temp: TempConfig::default(),
            auto_aircon: ServerConfig::default(),
        }
    }
}

fn search_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from(".")];
    if let Ok(home) = env::var("HOME") {
        dirs.push(PathBuf::from(home));
    }
    dirs.push(PathBuf::from("/etc"));
    dirs
}

impl Config {
    /// First readable candidate in `.`, `$HOME`, `/etc`.
    pub fn find() -> Option<PathBuf> {
        for dir in search_dirs() {
            for name in CONF_FILENAMES {
                let path = dir.join(name);
                if fs::File::open(&path).is_ok() {
                    debug!("found {}", path.display());
                    return Some(path);
                }
            }
        }
        None
    }

    /// Load the configuration from `path`, or from the first candidate on
    /// the search path when `path` is `None`. Missing configuration is a
    /// startup error; a sample file is written to help the user along.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::find() {
                Some(p) => p,
                None => {
                    let sample = PathBuf::from("autoaircon.conf.sample");
                    if let Err(e) = Self::default().save_sample(&sample) {
                        debug!("could not write sample config: {:#}", e);
                    } else {
                        error!(
                            "sample configuration written to {}\nPlease edit and rename it",
                            sample.display()
                        );
                    }
                    bail!("no configuration file found (candidates: {:?})", CONF_FILENAMES);
                }
            },
        };

        debug!("loading configuration from {}", path.display());
        let raw = config::Config::builder()
            .add_source(config::File::from(path.as_path()).format(FileFormat::Ini))
            .build()
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;

        let cfg: Config = raw
            .try_deserialize()
            .with_context(|| format!("failed to parse configuration from {}", path.display()))?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Range checks that the type system cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.auto_aircon.port == 0 {
            bail!("auto_aircon.port must be non-zero");
        }
        if !(5.0..=600.0).contains(&self.temp.window_sec) {
            bail!(
                "temp.window_sec={} out of range (5..600)",
                self.temp.window_sec
            );
        }
        if self.aircon.interval_min < 0.0 {
            bail!("aircon.interval_min must not be negative");
        }
        Ok(())
    }

    /// Apply command line overrides to the loaded configuration.
    pub fn apply_args(&mut self, port: Option<u16>, mqtt_host: Option<String>) {
        if let Some(port) = port {
            debug!("overriding port from command line: {}", port);
            self.auto_aircon.port = port;
        }
        if let Some(host) = mqtt_host {
            debug!("overriding MQTT host from command line: {}", host);
            self.temp.host = host;
        }
    }

    /// Render the configuration as an INI document.
    pub fn to_ini_string(&self) -> String {
        let driver = match self.ir.driver {
            IrDriverKind::Gpio => "gpio",
            IrDriverKind::Mock => "mock",
        };
        format!(
            "[ir]\n\
             host = {}\n\
             pin = {}\n\
             driver = {}\n\
             \n\
             [aircon]\n\
             dev_name = {}\n\
             button_header = {}\n\
             interval_min = {}\n\
             \n\
             [param]\n\
             host = {}\n\
             port = {}\n\
             \n\
             [temp]\n\
             host = {}\n\
             port = {}\n\
             topic = {}\n\
             token = {}\n\
             window_sec = {}\n\
             \n\
             [auto_aircon]\n\
             port = {}\n\
             kpd_clamp = {}\n",
            self.ir.host,
            self.ir.pin,
            driver,
            self.aircon.dev_name,
            self.aircon.button_header,
            self.aircon.interval_min,
            self.param.host,
            self.param.port,
            self.temp.host,
            self.temp.port,
            self.temp.topic,
            self.temp.token,
            self.temp.window_sec,
            self.auto_aircon.port,
            self.auto_aircon.kpd_clamp,
        )
    }

    /// Write the configuration as a sample INI file.
    pub fn save_sample(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_ini_string())
            .with_context(|| format!("failed to write sample config to {}", path.display()))?;
        Ok(())
    }
}
