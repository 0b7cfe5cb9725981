// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! PID parameter file handling
//!
//! The PID gains live in a small JSON file that is searched for in the
//! current directory, the user's home directory and `/etc`. The `kp`, `ki`
//! and `kd` commands rewrite the file, so saving goes through a temporary
//! file in the same directory followed by a rename.

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Candidate file names, probed in order.
pub const PARAM_FILENAMES: [&str; 4] = [
    "autoaircon-param.json",
    ".autoaircon-param.json",
    "autoaircon-param",
    ".autoaircon-param",
];

/// PID gains and related tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidParam {
    #[serde(default)]
    pub kp: f64,
    #[serde(default)]
    pub ki: f64,
    #[serde(default)]
    pub kd: f64,
    /// Upper bound on `|ki * i|`; on exceedance the integrator is rolled back.
    #[serde(default)]
    pub ki_i_max: f64,
    /// Minimum re-transmit interval in seconds.
    #[serde(default)]
    pub interval_min: f64,
}

impl Default for PidParam {
    fn default() -> Self {
        Self {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            ki_i_max: 0.0,
            interval_min: 0.0,
        }
    }
}

/// A [`PidParam`] bound to the file it was loaded from.
#[derive(Debug)]
pub struct PidParamFile {
    pub param: PidParam,
    path: Option<PathBuf>,
}

fn search_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from(".")];
    if let Ok(home) = env::var("HOME") {
        dirs.push(PathBuf::from(home));
    }
    dirs.push(PathBuf::from("/etc"));
    dirs
}

impl PidParamFile {
    /// Locate and load the parameter file; defaults are used when no file
    /// is found or a value is missing.
    pub fn load() -> Self {
        match Self::find() {
            Some(path) => Self::from_path(&path),
            None => {
                warn!("no PID parameter file found, using defaults");
                Self {
                    param: PidParam::default(),
                    path: None,
                }
            }
        }
    }

    /// Parameters not backed by any file; saving is a no-op.
    pub fn in_memory(param: PidParam) -> Self {
        Self { param, path: None }
    }

    /// Load from an explicit path. A parse failure falls back to defaults,
    /// keeping the path so a later save repairs the file.
    pub fn from_path(path: &Path) -> Self {
        let param = fs::read_to_string(path)
            .context("read")
            .and_then(|s| serde_json::from_str::<PidParam>(&s).context("parse"))
            .unwrap_or_else(|e| {
                warn!("{}: {:#} .. using defaults", path.display(), e);
                PidParam::default()
            });
        debug!("{}: {:?}", path.display(), param);
        Self {
            param,
            path: Some(path.to_path_buf()),
        }
    }

    /// First readable candidate in `.`, `$HOME`, `/etc`.
    pub fn find() -> Option<PathBuf> {
        for dir in search_dirs() {
            for name in PARAM_FILENAMES {
                let path = dir.join(name);
                if fs::File::open(&path).is_ok() {
                    debug!("found {}", path.display());
                    return Some(path);
                }
            }
        }
        None
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Persist the current parameters with a write-then-rename.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            debug!("no parameter file path, not persisted");
            return Ok(());
        };
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("create temporary file in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut tmp, &self.param).context("serialize parameters")?;
        tmp.write_all(b"\n")?;
        tmp.persist(path)
            .with_context(|| format!("rename into {}", path.display()))?;
        debug!("saved {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autoaircon-param.json");
        let mut pf = PidParamFile {
            param: PidParam {
                kp: 1.5,
                ki: 0.01,
                kd: 100.0,
                ki_i_max: 5.0,
                interval_min: 40.0,
            },
            path: Some(path.clone()),
        };
        pf.save().unwrap();
        pf.param.kp = 0.0;

        let loaded = PidParamFile::from_path(&path);
        assert_eq!(loaded.param.kp, 1.5);
        assert_eq!(loaded.param.ki_i_max, 5.0);
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        fs::write(&path, r#"{"kp": 2.0}"#).unwrap();
        let loaded = PidParamFile::from_path(&path);
        assert_eq!(loaded.param.kp, 2.0);
        assert_eq!(loaded.param.ki, 0.0);
        assert_eq!(loaded.param.interval_min, 0.0);
    }

    #[test]
    fn save_without_path_is_a_no_op() {
        let pf = PidParamFile {
            param: PidParam::default(),
            path: None,
        };
        assert!(pf.save().is_ok());
    }
}
