//! Cross-replica event fan-out: ruleset invalidation and newly-admitted
//! killmails both need every query-API replica to hear about them, not just
//! the replica that produced the event. A local `broadcast` channel handles
//! in-process fan-out (SSE subscribers); a Redis pub/sub channel bridges
//! events between replicas, mirroring a single in-process bus extended for
//! multi-replica SSE fan-out.

use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sk_schemas::KillmailEvent;
use tokio::sync::broadcast;
use tracing::warn;

const CHANNEL_NAME: &str = "skirmish:events";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusEvent {
    RulesetInvalidated,
    KillmailAdmitted(Box<KillmailEvent>),
}

/// In-process fan-out bus, optionally bridged to Redis for cross-replica
/// delivery. Cloning shares the same underlying channel.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<BusEvent>,
}

impl Bus {
    pub fn new_local() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    /// Publish locally and, if the redis client is configured, to every
    /// other replica subscribed on the shared channel.
    pub async fn publish(&self, redis_url: Option<&str>, event: BusEvent) -> Result<()> {
        let _ = self.tx.send(event.clone());

        if let Some(url) = redis_url {
            let client = redis::Client::open(url).context("invalid redis url")?;
            let mut conn = client
                .get_connection_manager()
                .await
                .context("failed to connect to redis")?;
            let payload = serde_json::to_string(&event).context("bus event encode failed")?;
            conn.publish::<_, _, ()>(CHANNEL_NAME, payload)
                .await
                .context("redis PUBLISH failed")?;
        }

        Ok(())
    }

    /// Spawn a background task that subscribes to the shared Redis channel
    /// and forwards every message into the local broadcast bus, so events
    /// published by other replicas reach this process's SSE subscribers.
    /// Runs until the process exits; reconnects with a fixed backoff if the
    /// Redis connection drops.
    pub fn spawn_redis_bridge(&self, redis_url: String) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            loop {
                if let Err(err) = run_bridge_once(&redis_url, &tx).await {
                    warn!(error = %err, "redis pub/sub bridge disconnected, retrying");
                }
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        });
    }
}

async fn run_bridge_once(redis_url: &str, tx: &broadcast::Sender<BusEvent>) -> Result<()> {
    let client = redis::Client::open(redis_url).context("invalid redis url")?;
    let mut pubsub = client
        .get_async_pubsub()
        .await
        .context("failed to open redis pub/sub connection")?;
    pubsub
        .subscribe(CHANNEL_NAME)
        .await
        .context("failed to subscribe to event channel")?;

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let payload: String = msg.get_payload().context("pub/sub payload decode failed")?;
        match serde_json::from_str::<BusEvent>(&payload) {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(err) => warn!(error = %err, "dropping malformed bus event"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_publish_reaches_local_subscriber() {
        let bus = Bus::new_local();
        let mut rx = bus.subscribe();
        bus.publish(None, BusEvent::RulesetInvalidated).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, BusEvent::RulesetInvalidated));
    }
}
