//! Relay pool: where events go out and come back in.

use anyhow::{Context, Result};
use async_trait::async_trait;
use nostr_sdk::{Client, Event, EventId, Filter};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Sends signed events to relays.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, relays: &[String], event: Event) -> Result<EventId>;
}

/// Reads events from relays.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch(&self, relays: &[String], filter: Filter, timeout: Duration)
        -> Result<Vec<Event>>;
}

/// Shared, mutable routing options for a [`Pool`].
#[derive(Debug, Clone, Default)]
pub struct PoolConfig {
    multiplextr_url: Arc<RwLock<Option<String>>>,
}

impl PoolConfig {
    pub fn multiplextr_url(&self) -> Option<String> {
        self.multiplextr_url.read().clone()
    }

    pub fn set_multiplextr_url(&self, url: Option<String>) {
        let url = url.filter(|u| !u.trim().is_empty());
        let mut current = self.multiplextr_url.write();
        if *current != url {
            debug!("Multiplexer set to {:?}", url);
            *current = url;
        }
    }

    /// Relays a request for `relays` is actually sent to.
    ///
    /// With a multiplexer configured everything goes through that one relay.
    pub fn route(&self, relays: &[String]) -> Vec<String> {
        if let Some(url) = self.multiplextr_url() {
            return vec![url];
        }
        let mut out: Vec<String> = Vec::with_capacity(relays.len());
        for url in relays {
            if !out.contains(url) {
                out.push(url.clone());
            }
        }
        out
    }
}

/// A relay client that connects to relays on demand.
#[derive(Clone)]
pub struct Pool {
    client: Client,
    config: PoolConfig,
}

impl Pool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            client: Client::builder().build(),
            config,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Get the underlying nostr-sdk Client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Add and connect any relay in `relays` the client does not know yet.
    async fn ensure_relays(&self, relays: &[String]) -> Result<()> {
        let mut added = 0;
        for relay_url in relays {
            if self
                .client
                .add_relay(relay_url.as_str())
                .await
                .with_context(|| format!("Failed to add relay: {}", relay_url))?
            {
                added += 1;
            }
        }
        if added > 0 {
            self.client.connect().await;
            info!("Pool connected to {} new relay(s)", added);
        }
        Ok(())
    }
}

#[async_trait]
impl Publisher for Pool {
    async fn publish(&self, relays: &[String], event: Event) -> Result<EventId> {
        let targets = self.config.route(relays);
        if targets.is_empty() {
            anyhow::bail!("No relays to publish to");
        }
        self.ensure_relays(&targets).await?;

        let output = self
            .client
            .send_event_to(targets.iter().map(String::as_str), &event)
            .await
            .with_context(|| format!("Failed to send event {}", event.id))?;
        debug!(
            "Event {} accepted by {} relay(s), rejected by {}",
            output.val,
            output.success.len(),
            output.failed.len()
        );
        if output.success.is_empty() && !output.failed.is_empty() {
            anyhow::bail!("Every relay rejected event {}", output.val);
        }
        Ok(output.val)
    }
}

#[async_trait]
impl EventSource for Pool {
    async fn fetch(
        &self,
        relays: &[String],
        filter: Filter,
        timeout: Duration,
    ) -> Result<Vec<Event>> {
        let targets = self.config.route(relays);
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_relays(&targets).await?;

        let events = tokio::time::timeout(
            timeout + Duration::from_secs(1),
            self.client
                .fetch_events_from(targets.iter().map(String::as_str), filter, timeout),
        )
        .await
        .context("Timeout fetching events")?
        .context("Failed to fetch events")?;
        Ok(events.into_iter().collect())
    }
}
