// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the autoaircon project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! MQTT temperature subscriber
//!
//! A background task polls the MQTT event loop, parses each payload
//! `{"ts": <ms-since-epoch>, "data": <number|string>}` and forwards it as a
//! [`TempEvent`] over a broadcast channel. The channel is deliberately a
//! broadcast: when the consumer lags, the oldest samples are dropped in
//! favor of the newest. A payload with `data == 0` is the shutdown
//! sentinel and becomes an explicit [`TempEvent::EndOfStream`].
//!
//! Broker disconnects are retried with bounded exponential backoff; the
//! subscription is re-established on every connection acknowledgment.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::json;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::history::Sample;
use crate::config::TempConfig;

/// Capacity of the sample channel.
pub const CHANNEL_CAPACITY: usize = 64;

const RECONNECT_WAIT_MIN: Duration = Duration::from_secs(1);
const RECONNECT_WAIT_MAX: Duration = Duration::from_secs(30);

/// One event on the sample channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TempEvent {
    Sample(Sample),
    EndOfStream,
}

/// Parse a broker payload into a [`TempEvent`].
///
/// Returns `None` on malformed payloads; those are logged and dropped by
/// the caller.
pub fn parse_payload(payload: &[u8]) -> Option<TempEvent> {
    let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
    let ts = value.get("ts")?.as_f64()? / 1000.0;
    let data = value.get("data")?;
    let temp = match data {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if temp == 0.0 {
        return Some(TempEvent::EndOfStream);
    }
    Some(TempEvent::Sample(Sample { ts, temp }))
}

/// Broker session feeding the sample channel.
pub struct TempSubscriber {
    client: AsyncClient,
    topic: String,
    tx: broadcast::Sender<TempEvent>,
    task: JoinHandle<()>,
    // keeps the channel open while the consumer has not subscribed yet
    _guard: broadcast::Receiver<TempEvent>,
}

impl TempSubscriber {
    /// Open the broker session and start the background parser task.
    pub fn start(config: &TempConfig) -> Result<Self> {
        let mut options = MqttOptions::new(
            format!("autoaircon-{}", std::process::id()),
            config.host.clone(),
            config.port,
        );
        options.set_keep_alive(Duration::from_secs(30));
        if !config.token.is_empty() {
            options.set_credentials(format!("token:{}", config.token), "");
        }

        let (client, mut eventloop) = AsyncClient::new(options, 16);
        let (tx, guard) = broadcast::channel(CHANNEL_CAPACITY);

        let topic = config.topic.clone();
        let task_tx = tx.clone();
        let task_client = client.clone();
        let task_topic = topic.clone();
        let task = tokio::spawn(async move {
            let mut wait = RECONNECT_WAIT_MIN;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("broker connected, subscribing to {}", task_topic);
                        wait = RECONNECT_WAIT_MIN;
                        if let Err(e) = task_client
                            .subscribe(task_topic.clone(), QoS::AtLeastOnce)
                            .await
                        {
                            warn!("subscribe failed: {}", e);
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        match parse_payload(&publish.payload) {
                            Some(event) => {
                                debug!("{:?}", event);
                                if task_tx.send(event).is_err() {
                                    warn!("no sample receivers .. dropped");
                                }
                            }
                            None => {
                                warn!("malformed payload on {} .. dropped", publish.topic);
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("broker error: {} .. reconnect in {:?}", e, wait);
                        tokio::time::sleep(wait).await;
                        wait = (wait * 2).min(RECONNECT_WAIT_MAX);
                    }
                }
            }
            debug!("subscriber task done");
        });

        Ok(Self {
            client,
            topic,
            tx,
            task,
            _guard: guard,
        })
    }

    /// A new receiver on the sample channel.
    pub fn subscribe(&self) -> broadcast::Receiver<TempEvent> {
        self.tx.subscribe()
    }

    /// Publish the end-of-stream sentinel to our own topic to unblock the
    /// consumer, then tear the session down.
    pub async fn end(&self) -> Result<()> {
        let sentinel = json!({ "ts": chrono::Utc::now().timestamp_millis(), "data": 0 });
        self.client
            .publish(
                self.topic.clone(),
                QoS::AtLeastOnce,
                false,
                sentinel.to_string(),
            )
            .await
            .context("publish shutdown sentinel")?;
        // give the broker a moment to echo the sentinel back
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.client.disconnect().await.ok();
        self.task.abort();
        Ok(())
    }
}
