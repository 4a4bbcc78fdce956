//! Outgoing protocol commands.
//!
//! A [`Command`] is an unsigned event description. Publishing it signs with
//! the keychain and sends it from a background task; the caller gets a
//! [`PublishHandle`] it may await or drop.

use crate::agent::keys::Keychain;
use crate::agent::pool::Publisher;
use anyhow::{Context, Result};
use canoe_core::{tag_from_slice, Mute, Petname, Relay};
use nostr_sdk::{EventBuilder, EventId, Kind, Tag, Timestamp};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// `d` identifier of the encrypted settings event.
pub const SETTINGS_D_TAG: &str = "canoe/settings/v1";

pub const KIND_CONTACTS: u16 = 3;
pub const KIND_DELETION: u16 = 5;
pub const KIND_MUTES: u16 = 10000;
pub const KIND_RELAYS: u16 = 10002;
pub const KIND_LIST: u16 = 30001;
pub const KIND_APP_DATA: u16 = 30078;

/// Builds commands signed by the current identity.
#[derive(Clone)]
pub struct Cmd {
    keys: Arc<Keychain>,
    publisher: Arc<dyn Publisher>,
}

impl Cmd {
    pub fn new(keys: Arc<Keychain>, publisher: Arc<dyn Publisher>) -> Self {
        Self { keys, publisher }
    }

    fn command(&self, kind: u16, content: impl Into<String>, tags: Vec<Vec<String>>) -> Command {
        Command {
            kind,
            content: content.into(),
            tags,
            keys: Arc::clone(&self.keys),
            publisher: Arc::clone(&self.publisher),
        }
    }

    /// Encrypted application settings (NIP-78).
    pub fn set_settings(&self, ciphertext: impl Into<String>) -> Command {
        self.command(
            KIND_APP_DATA,
            ciphertext,
            vec![vec!["d".to_string(), SETTINGS_D_TAG.to_string()]],
        )
    }

    /// Contact list (NIP-02).
    pub fn set_petnames(&self, petnames: &[Petname]) -> Command {
        self.command(
            KIND_CONTACTS,
            "",
            petnames.iter().map(Petname::to_tag).collect(),
        )
    }

    /// Relay list metadata (NIP-65).
    pub fn set_relays(&self, relays: &[Relay]) -> Command {
        self.command(
            KIND_RELAYS,
            "",
            relays.iter().filter_map(Relay::to_tag).collect(),
        )
    }

    /// Mute list (NIP-51).
    pub fn set_mutes(&self, mutes: &[Mute]) -> Command {
        self.command(KIND_MUTES, "", mutes.iter().map(Mute::to_tag).collect())
    }

    pub fn create_list(&self, tags: Vec<Vec<String>>) -> Command {
        self.command(KIND_LIST, "", tags)
    }

    /// Deletion request (NIP-09).
    pub fn delete_event(&self, ids: &[String]) -> Command {
        self.command(
            KIND_DELETION,
            "",
            ids.iter()
                .map(|id| vec!["e".to_string(), id.clone()])
                .collect(),
        )
    }
}

/// An event ready to be signed and sent.
pub struct Command {
    kind: u16,
    content: String,
    tags: Vec<Vec<String>>,
    keys: Arc<Keychain>,
    publisher: Arc<dyn Publisher>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("kind", &self.kind)
            .field("content", &self.content)
            .field("tags", &self.tags)
            .finish()
    }
}

impl Command {
    pub fn kind(&self) -> u16 {
        self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn tags(&self) -> &[Vec<String>] {
        &self.tags
    }

    fn builder(&self) -> EventBuilder {
        let tags: Vec<Tag> = self.tags.iter().filter_map(|t| tag_from_slice(t)).collect();
        EventBuilder::new(Kind::from(self.kind), self.content.clone())
            .tags(tags)
            .custom_created_at(Timestamp::now())
    }

    /// Sign and send to every relay in `relays` that accepts writes.
    ///
    /// Must be called from within a tokio runtime.
    pub fn publish(self, relays: &[Relay]) -> PublishHandle {
        let targets: Vec<String> = relays
            .iter()
            .filter(|r| r.write)
            .map(|r| r.url.clone())
            .collect();

        let kind = self.kind;
        let handle = tokio::spawn(async move {
            let event = self
                .keys
                .sign(self.builder())
                .with_context(|| format!("Failed to sign kind {} event", kind))?;
            debug!("Publishing kind {} event {} to {:?}", kind, event.id, targets);
            let result = self.publisher.publish(&targets, event).await;
            if let Err(e) = &result {
                warn!("Failed to publish kind {} event: {e:#}", kind);
            }
            result
        });

        PublishHandle { kind, handle }
    }
}

/// Outcome of a publish running in the background.
#[derive(Debug)]
pub struct PublishHandle {
    kind: u16,
    handle: JoinHandle<Result<EventId>>,
}

impl PublishHandle {
    pub fn kind(&self) -> u16 {
        self.kind
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the relays' answer.
    pub async fn wait(self) -> Result<EventId> {
        self.handle
            .await
            .context("Publish task was cancelled or panicked")?
    }
}
