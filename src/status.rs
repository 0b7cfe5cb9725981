// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Status sink client
//!
//! Publishes controller state to a remote TCP service that accepts one JSON
//! object per line. The client remembers the last published value per field
//! and only sends what changed; publication failures are logged and never
//! disturb the control loop.

use std::collections::HashMap;
use std::time::Duration;

use log::debug;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Fields of `fields` differing from the values recorded in `last`.
pub fn changed_fields(last: &HashMap<String, Value>, fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .filter(|(k, v)| last.get(k.as_str()) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Change-tracking publisher. An empty host disables publication.
#[derive(Debug)]
pub struct StatusClient {
    host: String,
    port: u16,
    last: HashMap<String, Value>,
}

impl StatusClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            last: HashMap::new(),
        }
    }

    /// A client that never publishes.
    pub fn disabled() -> Self {
        Self::new("", 0)
    }

    /// Publish the changed subset of `fields` (a JSON object).
    pub async fn send(&mut self, fields: Value) {
        let Some(fields) = fields.as_object() else {
            debug!("not an object: {}", fields);
            return;
        };
        let changed = changed_fields(&self.last, fields);
        if changed.is_empty() {
            return;
        }
        for (k, v) in &changed {
            self.last.insert(k.clone(), v.clone());
        }
        if self.host.is_empty() {
            return;
        }

        let line = format!("{}\n", Value::Object(changed));
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(CONNECT_TIMEOUT, connect).await {
            Ok(Ok(mut stream)) => {
                if let Err(e) = stream.write_all(line.as_bytes()).await {
                    debug!("status write: {}", e);
                }
            }
            Ok(Err(e)) => debug!("status connect: {}", e),
            Err(_) => debug!("status connect timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_changes_are_published() {
        let mut last = HashMap::new();
        let fields = json!({"ttemp": 25.0, "rtemp": 25});
        let changed = changed_fields(&last, fields.as_object().unwrap());
        assert_eq!(changed.len(), 2);

        last.insert("ttemp".to_string(), json!(25.0));
        last.insert("rtemp".to_string(), json!(25));
        let changed = changed_fields(&last, fields.as_object().unwrap());
        assert!(changed.is_empty());

        let fields = json!({"ttemp": 25.0, "rtemp": 26});
        let changed = changed_fields(&last, fields.as_object().unwrap());
        assert_eq!(changed.len(), 1);
        assert_eq!(changed["rtemp"], 26);
    }

    #[tokio::test]
    async fn disabled_client_tracks_state_without_io() {
        let mut client = StatusClient::disabled();
        client.send(json!({"active": true})).await;
        client.send(json!({"active": true})).await;
        assert_eq!(client.last.get("active"), Some(&json!(true)));
    }
}
