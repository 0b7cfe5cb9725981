// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Device definition store
//!
//! Device definitions are JSON files with the `.irconf` suffix, searched in
//! the current directory, `$HOME/.irconf.d` and `/etc/irconf.d`. A file
//! holds one record or a list of records:
//!
//! ```json
//! {
//!   "comment": "living room aircon",
//!   "dev_name": ["aircon", "aircon2"],
//!   "format": "AEHA",
//!   "T": 425,
//!   "sym_tbl": {
//!     "-": [8, 4], "=": [8, 8], "0": [1, 1], "1": [1, 3],
//!     "/": [1, 30], "*": [1, 70], "?": [1, 1]
//!   },
//!   "macro": {
//!     "[prefix]": "- 28C6",
//!     "[suffix]": "(0b)0 /"
//!   },
//!   "buttons": {
//!     "off": "[prefix] 00 [suffix]",
//!     "on_hot_auto_25": ["[prefix] A5 [suffix]", 2]
//!   }
//! }
//! ```
//!
//! A button template mixes symbol characters from `sym_tbl`, hexadecimal
//! digits (each expands to four bits MSB first), explicit binary blocks
//! prefixed with `(0b)` and `[macro]` placeholders. Resolution turns the
//! template into a `(pulse_us, space_us)` frame by multiplying the symbol
//! table units with the base period `T`.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, warn};
use serde::Deserialize;

use super::IrError;

/// Binary-block prefix in button templates.
pub const HEADER_BIN: &str = "(0b)";
/// Suffix of device definition files.
pub const CONF_SUFFIX: &str = "irconf";

const MACRO_PASS_MAX: usize = 10;

/// A device name, singular or a list of aliases.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DevNames {
    One(String),
    Many(Vec<String>),
}

impl DevNames {
    fn iter(&self) -> impl Iterator<Item = &str> {
        match self {
            DevNames::One(n) => std::slice::from_ref(n).iter(),
            DevNames::Many(v) => v.iter(),
        }
        .map(String::as_str)
    }
}

/// A symbol table entry: either a `[pulse, space]` pair, or a list of pairs
/// of which the first is used.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SymEntry {
    Pair([u32; 2]),
    Pairs(Vec<[u32; 2]>),
}

impl SymEntry {
    fn pair(&self) -> Option<[u32; 2]> {
        match self {
            SymEntry::Pair(p) => Some(*p),
            SymEntry::Pairs(v) => v.first().copied(),
        }
    }
}

/// A button value: a template, or a `[template, repeat]` pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ButtonDef {
    Template(String),
    Repeated(String, u32),
}

/// One device definition as read from an `.irconf` file.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub comment: String,

    pub dev_name: DevNames,

    #[serde(default)]
    pub format: Option<String>,

    /// Base period in µs.
    #[serde(rename = "T")]
    pub t: u32,

    pub sym_tbl: HashMap<String, SymEntry>,

    #[serde(default, rename = "macro")]
    pub macros: HashMap<String, String>,

    pub buttons: HashMap<String, ButtonDef>,

    /// Default frame repeat count for plain-string buttons.
    #[serde(default)]
    pub def_repeat: Option<u32>,
}

/// One file-or-list entry of an `.irconf` file.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ConfFile {
    One(DeviceConfig),
    Many(Vec<DeviceConfig>),
}

/// A loaded device definition with its source file.
#[derive(Debug, Clone)]
pub struct DeviceEntry {
    pub file: PathBuf,
    pub data: DeviceConfig,
}

/// Default search directories: `.`, `$HOME/.irconf.d`, `/etc/irconf.d`.
pub fn default_conf_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from(".")];
    if let Ok(home) = env::var("HOME") {
        dirs.push(PathBuf::from(home).join(".irconf.d"));
    }
    dirs.push(PathBuf::from("/etc/irconf.d"));
    dirs
}

/// In-memory collection of device definitions.
#[derive(Debug)]
pub struct IrStore {
    entries: Vec<DeviceEntry>,
    conf_dirs: Vec<PathBuf>,
}

impl IrStore {
    pub fn new(conf_dirs: Vec<PathBuf>) -> Self {
        Self {
            entries: Vec::new(),
            conf_dirs,
        }
    }

    /// Load every `.irconf` file on the search path, replacing the current
    /// contents. On failure the previous contents are kept.
    pub fn load_all(&mut self) -> Result<usize, IrError> {
        let mut entries = Vec::new();
        for dir in &self.conf_dirs {
            let Ok(rd) = fs::read_dir(dir) else {
                debug!("{}: not readable .. skipped", dir.display());
                continue;
            };
            let mut files: Vec<PathBuf> = rd
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().map(|x| x == CONF_SUFFIX).unwrap_or(false))
                .collect();
            files.sort();
            for file in files {
                Self::load_file(&mut entries, &file)?;
            }
        }
        let n = entries.len();
        self.entries = entries;
        debug!("{} device definitions loaded", n);
        Ok(n)
    }

    fn load_file(entries: &mut Vec<DeviceEntry>, path: &Path) -> Result<(), IrError> {
        let text = fs::read_to_string(path)
            .map_err(|e| IrError::ConfigParse(path.display().to_string(), e.to_string()))?;
        let parsed: ConfFile = serde_json::from_str(&text)
            .map_err(|e| IrError::ConfigParse(path.display().to_string(), e.to_string()))?;
        let records = match parsed {
            ConfFile::One(d) => vec![d],
            ConfFile::Many(v) => v,
        };
        for data in records {
            entries.push(DeviceEntry {
                file: path.to_path_buf(),
                data,
            });
        }
        Ok(())
    }

    /// Look up a device by name or alias.
    pub fn device(&self, dev_name: &str) -> Option<&DeviceEntry> {
        self.entries
            .iter()
            .find(|e| e.data.dev_name.iter().any(|n| n == dev_name))
    }

    /// All known device names, aliases included.
    pub fn device_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|e| e.data.dev_name.iter().map(str::to_string))
            .collect()
    }

    /// Macros and button templates of a device, for listings.
    pub fn device_detail(&self, dev_name: &str) -> Option<serde_json::Value> {
        let ent = self.device(dev_name)?;
        let macros: serde_json::Map<String, serde_json::Value> = ent
            .data
            .macros
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        let buttons: serde_json::Map<String, serde_json::Value> = ent
            .data
            .buttons
            .iter()
            .map(|(k, v)| {
                let val = match v {
                    ButtonDef::Template(s) => serde_json::Value::String(s.clone()),
                    ButtonDef::Repeated(s, n) => serde_json::json!([s, n]),
                };
                (k.clone(), val)
            })
            .collect();
        Some(serde_json::json!({ "macro": macros, "buttons": buttons }))
    }

    /// Resolve `(device, button)` into a pulse/space frame in µs and the
    /// repeat count.
    pub fn resolve(&self, dev_name: &str, button: &str) -> Result<(Vec<(u32, u32)>, u32), IrError> {
        let ent = self
            .device(dev_name)
            .ok_or_else(|| IrError::UnknownDevice(dev_name.to_string()))?;
        let data = &ent.data;

        let (template, repeat) = match data.buttons.get(button) {
            None => {
                return Err(IrError::UnknownButton(
                    dev_name.to_string(),
                    button.to_string(),
                ))
            }
            Some(ButtonDef::Template(s)) => (s.clone(), data.def_repeat.unwrap_or(1)),
            Some(ButtonDef::Repeated(s, n)) => (s.clone(), *n),
        };
        if template.trim().is_empty() {
            return Err(IrError::InvalidButton(button.to_string()));
        }

        // macro expansion, iterated until no placeholder changes anything
        let mut sig = template;
        for _ in 0..MACRO_PASS_MAX {
            let mut changed = false;
            for (name, expansion) in &data.macros {
                if sig.contains(name.as_str()) {
                    sig = sig.replace(name.as_str(), expansion);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        if sig.contains('[') || sig.contains(']') {
            error!("invalid macro: sig='{}'", sig);
            return Err(IrError::InvalidMacro(sig));
        }

        // collapse whitespace and adjacent binary blocks: '(0b)01(0b)10' -> '(0b)0110'
        sig.retain(|c| !c.is_whitespace());
        sig = sig.replace(&format!("0{}", HEADER_BIN), "0");
        sig = sig.replace(&format!("1{}", HEADER_BIN), "1");

        // split at non-binary symbol characters
        for ch in data.sym_tbl.keys() {
            if ch == "0" || ch == "1" {
                continue;
            }
            sig = sig.replace(ch.as_str(), &format!(" {} ", ch));
        }

        // hex -> binary
        let mut symbols = String::new();
        for tok in sig.split_whitespace() {
            if data.sym_tbl.contains_key(tok) && tok != "0" && tok != "1" {
                symbols.push_str(tok);
                continue;
            }
            if let Some(rest) = tok.strip_prefix(HEADER_BIN) {
                symbols.push_str(rest);
                continue;
            }
            for ch in tok.chars() {
                match ch.to_digit(16) {
                    Some(v) => symbols.push_str(&format!("{:04b}", v)),
                    None => symbols.push(ch),
                }
            }
        }

        // symbols -> (pulse, space) in µs
        let mut frame = Vec::with_capacity(symbols.len());
        for ch in symbols.chars() {
            match data.sym_tbl.get(&ch.to_string()).and_then(SymEntry::pair) {
                Some([pulse, space]) => frame.push((pulse * data.t, space * data.t)),
                None => warn!("'{}' !? .. ignored", ch),
            }
        }
        debug!("{}/{}: {} pairs, repeat={}", dev_name, button, frame.len(), repeat);

        Ok((frame, repeat))
    }
}

impl Default for IrStore {
    fn default() -> Self {
        Self::new(default_conf_dirs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(json: &str) -> IrStore {
        let mut store = IrStore::new(vec![]);
        let data: ConfFile = serde_json::from_str(json).unwrap();
        let records = match data {
            ConfFile::One(d) => vec![d],
            ConfFile::Many(v) => v,
        };
        for data in records {
            store.entries.push(DeviceEntry {
                file: PathBuf::from("test.irconf"),
                data,
            });
        }
        store
    }

    const DEV: &str = r#"{
        "dev_name": ["tdev", "tdev2"],
        "T": 425,
        "sym_tbl": {"-": [8, 4], "0": [1, 1], "1": [1, 3], "/": [1, 30]},
        "macro": {"[p]": "- "},
        "buttons": {
            "b1": "[p] A5 /",
            "b2": ["[p] (0b)01(0b)10 /", 2],
            "b3": "[p] [undefined] /",
            "b4": ""
        }
    }"#;

    #[test]
    fn resolve_hex_button() {
        let store = store_with(DEV);
        let (frame, repeat) = store.resolve("tdev", "b1").unwrap();
        assert_eq!(repeat, 1);
        // leader, A5 = 10100101 MSB first, trailer
        assert_eq!(
            frame,
            vec![
                (3400, 1700),
                (425, 1275),
                (425, 425),
                (425, 1275),
                (425, 425),
                (425, 425),
                (425, 1275),
                (425, 425),
                (425, 1275),
                (425, 12750),
            ]
        );
    }

    #[test]
    fn resolve_binary_blocks_collapse() {
        let store = store_with(DEV);
        let (frame, repeat) = store.resolve("tdev", "b2").unwrap();
        assert_eq!(repeat, 2);
        // 0110 between leader and trailer
        assert_eq!(
            frame,
            vec![
                (3400, 1700),
                (425, 425),
                (425, 1275),
                (425, 1275),
                (425, 425),
                (425, 12750),
            ]
        );
    }

    #[test]
    fn alias_lookup() {
        let store = store_with(DEV);
        assert!(store.device("tdev2").is_some());
        assert!(store.device("nope").is_none());
        let names = store.device_names();
        assert_eq!(names, vec!["tdev".to_string(), "tdev2".to_string()]);
    }

    #[test]
    fn unresolved_macro_is_an_error() {
        let store = store_with(DEV);
        assert!(matches!(
            store.resolve("tdev", "b3"),
            Err(IrError::InvalidMacro(_))
        ));
    }

    #[test]
    fn empty_button_is_invalid() {
        let store = store_with(DEV);
        assert!(matches!(
            store.resolve("tdev", "b4"),
            Err(IrError::InvalidButton(_))
        ));
    }

    #[test]
    fn unknown_device_and_button() {
        let store = store_with(DEV);
        assert!(matches!(
            store.resolve("nope", "b1"),
            Err(IrError::UnknownDevice(_))
        ));
        assert!(matches!(
            store.resolve("tdev", "nope"),
            Err(IrError::UnknownButton(_, _))
        ));
    }

    #[test]
    fn hex_expansion_is_msb_first_per_nibble() {
        let store = store_with(
            r#"{
                "dev_name": "n",
                "T": 100,
                "sym_tbl": {"0": [1, 1], "1": [2, 2]},
                "macro": {},
                "buttons": {"b": "8"}
            }"#,
        );
        let (frame, _) = store.resolve("n", "b").unwrap();
        // 8 = 1000
        assert_eq!(frame, vec![(200, 200), (100, 100), (100, 100), (100, 100)]);
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.irconf"), DEV).unwrap();
        fs::write(dir.path().join("ignored.json"), "{}").unwrap();
        let mut store = IrStore::new(vec![dir.path().to_path_buf()]);
        assert_eq!(store.load_all().unwrap(), 1);
        assert!(store.device("tdev").is_some());
        assert_eq!(store.device("tdev").unwrap().file, dir.path().join("a.irconf"));
    }

    #[test]
    fn failed_reload_keeps_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.irconf");
        fs::write(&file, DEV).unwrap();
        let mut store = IrStore::new(vec![dir.path().to_path_buf()]);
        store.load_all().unwrap();

        fs::write(&file, "not json").unwrap();
        assert!(store.load_all().is_err());
        assert!(store.device("tdev").is_some(), "old store must survive");
    }

    #[test]
    fn device_detail_lists_macros_and_buttons() {
        let store = store_with(DEV);
        let detail = store.device_detail("tdev").unwrap();
        assert_eq!(detail["macro"]["[p]"], "- ");
        assert_eq!(detail["buttons"]["b1"], "[p] A5 /");
        assert_eq!(detail["buttons"]["b2"][1], 2);
    }
}
