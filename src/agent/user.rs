//! The logged-in user's profile and the mutations that publish it.
//!
//! Every mutator follows the same two steps: apply the change to the local
//! profile, then (if the identity can sign) hand a command to the pool and
//! return its [`PublishHandle`]. Local state is never rolled back.
//!
//! Mutators that publish spawn a tokio task and must be called from within a
//! runtime.

use crate::agent::cmd::{
    Cmd, PublishHandle, KIND_APP_DATA, KIND_CONTACTS, KIND_DELETION, KIND_LIST, KIND_MUTES,
    KIND_RELAYS, SETTINGS_D_TAG,
};
use crate::agent::keys::{KeyError, Keychain};
use crate::agent::pool::PoolConfig;
use crate::agent::profile::{Profile, Settings};
use crate::store::{Derived, Store, Subscription, Synced};
use anyhow::Result;
use canoe_core::{first_tag_value, uniq_by, uniq_relays, Mute, Petname, Relay};
use nostr_sdk::{Event, EventId, JsonUtil, Kind, Metadata};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct User {
    profile: Store<Profile>,
    keys: Arc<Keychain>,
    cmd: Cmd,

    profile_view: Derived<Profile>,
    settings: Derived<Settings>,
    petnames: Derived<Vec<Petname>>,
    petname_pubkeys: Derived<Vec<String>>,
    relays: Derived<Vec<Relay>>,
    mutes: Derived<Vec<Mute>>,
    lists: Derived<Vec<Event>>,

    /// Newest `created_at` ingested per replaceable kind.
    latest: Arc<Mutex<HashMap<u16, u64>>>,
    _watchers: Vec<Subscription>,
    _synced: Option<Synced<Profile>>,
}

impl User {
    pub fn new(profile: Store<Profile>, keys: Arc<Keychain>, cmd: Cmd, pool: PoolConfig) -> Self {
        Self::build(profile, None, keys, cmd, pool)
    }

    /// A user whose profile is persisted as JSON at `path`.
    pub fn open(
        path: impl Into<PathBuf>,
        default: Profile,
        keys: Arc<Keychain>,
        cmd: Cmd,
        pool: PoolConfig,
    ) -> Self {
        let synced = Synced::open(path, default);
        let profile = synced.store().clone();
        Self::build(profile, Some(synced), keys, cmd, pool)
    }

    fn build(
        profile: Store<Profile>,
        synced: Option<Synced<Profile>>,
        keys: Arc<Keychain>,
        cmd: Cmd,
        pool: PoolConfig,
    ) -> Self {
        let mut watchers = Vec::new();

        let latest = Arc::new(Mutex::new(HashMap::new()));

        let target = profile.clone();
        let seen = Arc::clone(&latest);
        watchers.push(keys.pubkey().subscribe(move |pubkey| {
            let Some(pubkey) = pubkey.clone() else {
                return;
            };
            let previous = target.with(|p| p.pubkey.clone());
            match previous {
                Some(previous) if previous == pubkey => {}
                Some(_) => {
                    info!("Switching profile to {}", pubkey);
                    seen.lock().clear();
                    target.update(|p| Profile {
                        pubkey: Some(pubkey),
                        settings: p.settings,
                        ..Profile::default()
                    });
                }
                None => target.update(|p| Profile {
                    pubkey: Some(pubkey),
                    ..p
                }),
            }
        }));

        watchers.push(profile.subscribe(move |p| {
            pool.set_multiplextr_url(p.settings.multiplextr_url.clone());
        }));

        let petnames = profile.derive(|p| p.petnames.clone());
        Self {
            profile_view: profile.derive(Profile::clone),
            settings: profile.derive(|p| p.settings.clone()),
            petname_pubkeys: profile
                .derive(|p| p.petnames.iter().map(|pn| pn.pubkey.clone()).collect()),
            petnames,
            relays: profile.derive(|p| p.relays.clone()),
            mutes: profile.derive(|p| p.mutes.clone()),
            lists: profile.derive(|p| p.lists.clone()),
            profile,
            keys,
            cmd,
            latest,
            _watchers: watchers,
            _synced: synced,
        }
    }

    // ── Profile ─────────────────────────────────────────────────────

    pub fn profile(&self) -> &Derived<Profile> {
        &self.profile_view
    }

    pub fn get_profile(&self) -> Profile {
        self.profile.get()
    }

    pub fn get_pubkey(&self) -> Option<String> {
        self.profile.with(|p| p.pubkey.clone())
    }

    /// True when we can sign and have at least one relay to write to.
    pub fn can_publish(&self) -> bool {
        self.keys.can_sign() && self.profile.with(|p| p.write_relays().next().is_some())
    }

    fn publish_targets(&self) -> Vec<Relay> {
        self.get_relays()
    }

    // ── Settings ────────────────────────────────────────────────────

    pub fn settings(&self) -> &Derived<Settings> {
        &self.settings
    }

    pub fn get_settings(&self) -> Settings {
        self.profile.with(|p| p.settings.clone())
    }

    pub fn get_setting(&self, key: &str) -> Option<serde_json::Value> {
        self.profile.with(|p| p.settings.get(key))
    }

    /// Absolute URL of `path` on the configured helper service.
    pub fn dufflepud(&self, path: &str) -> Option<String> {
        self.profile.with(|p| {
            p.settings
                .dufflepud_url
                .as_ref()
                .map(|base| format!("{}{}", base.trim_end_matches('/'), path))
        })
    }

    pub fn set_settings(&self, settings: Settings) -> Result<Option<PublishHandle>, KeyError> {
        self.profile.update(|p| Profile {
            settings: settings.clone(),
            ..p
        });

        if !self.keys.can_sign() {
            return Ok(None);
        }
        let content = self.keys.encrypt_json(&settings)?;
        Ok(Some(
            self.cmd.set_settings(content).publish(&self.publish_targets()),
        ))
    }

    // ── Petnames ────────────────────────────────────────────────────

    pub fn petnames(&self) -> &Derived<Vec<Petname>> {
        &self.petnames
    }

    pub fn get_petnames(&self) -> Vec<Petname> {
        self.profile.with(|p| p.petnames.clone())
    }

    pub fn petname_pubkeys(&self) -> &Derived<Vec<String>> {
        &self.petname_pubkeys
    }

    pub fn get_petname_pubkeys(&self) -> Vec<String> {
        self.profile
            .with(|p| p.petnames.iter().map(|pn| pn.pubkey.clone()).collect())
    }

    pub fn update_petnames(
        &self,
        f: impl FnOnce(Vec<Petname>) -> Vec<Petname>,
    ) -> Option<PublishHandle> {
        let petnames = uniq_by(f(self.get_petnames()), |pn| pn.pubkey.clone());
        self.profile.update(|p| Profile {
            petnames: petnames.clone(),
            ..p
        });

        self.keys
            .can_sign()
            .then(|| self.cmd.set_petnames(&petnames).publish(&self.publish_targets()))
    }

    pub fn add_petname(
        &self,
        pubkey: &str,
        url: Option<&str>,
        name: Option<&str>,
    ) -> Option<PublishHandle> {
        let petname = Petname::new(pubkey, url, name);
        self.update_petnames(|petnames| canoe_core::with_petname(petnames, petname))
    }

    pub fn remove_petname(&self, pubkey: &str) -> Option<PublishHandle> {
        self.update_petnames(|petnames| canoe_core::without_petname(petnames, pubkey))
    }

    // ── Relays ──────────────────────────────────────────────────────

    pub fn relays(&self) -> &Derived<Vec<Relay>> {
        &self.relays
    }

    pub fn get_relays(&self) -> Vec<Relay> {
        self.profile.with(|p| p.relays.clone())
    }

    /// Replace the relay list. The new list is published to the new relays.
    pub fn update_relays(&self, f: impl FnOnce(Vec<Relay>) -> Vec<Relay>) -> Option<PublishHandle> {
        let relays = uniq_relays(f(self.get_relays()));
        self.profile.update(|p| Profile {
            relays: relays.clone(),
            ..p
        });

        self.keys
            .can_sign()
            .then(|| self.cmd.set_relays(&relays).publish(&relays))
    }

    pub fn add_relay(&self, url: &str) -> Option<PublishHandle> {
        let relay = Relay::new(url);
        self.update_relays(|relays| canoe_core::with_relay(relays, relay))
    }

    pub fn remove_relay(&self, url: &str) -> Option<PublishHandle> {
        self.update_relays(|relays| canoe_core::without_relay(relays, url))
    }

    pub fn set_relay_write_condition(&self, url: &str, write: bool) -> Option<PublishHandle> {
        self.update_relays(|relays| canoe_core::with_write_condition(relays, url, write))
    }

    // ── Mutes ───────────────────────────────────────────────────────

    pub fn mutes(&self) -> &Derived<Vec<Mute>> {
        &self.mutes
    }

    pub fn get_mutes(&self) -> Vec<Mute> {
        self.profile.with(|p| p.mutes.clone())
    }

    /// Drop events whose id, author, reply target or root is muted.
    pub fn apply_mutes(&self, events: Vec<Event>) -> Vec<Event> {
        self.profile
            .with(|p| canoe_core::apply_mutes(events, &p.mutes))
    }

    pub fn update_mutes(&self, f: impl FnOnce(Vec<Mute>) -> Vec<Mute>) -> Option<PublishHandle> {
        let mutes = uniq_by(f(self.get_mutes()), |m| m.value.clone());
        self.profile.update(|p| Profile {
            mutes: mutes.clone(),
            ..p
        });

        self.keys
            .can_sign()
            .then(|| self.cmd.set_mutes(&mutes).publish(&self.publish_targets()))
    }

    pub fn add_mute(&self, kind: &str, value: &str) -> Option<PublishHandle> {
        let mute = Mute::new(kind, value);
        self.update_mutes(|mutes| canoe_core::with_mute(mutes, mute))
    }

    pub fn remove_mute(&self, value: &str) -> Option<PublishHandle> {
        self.update_mutes(|mutes| canoe_core::without_mute(mutes, value))
    }

    // ── Lists ───────────────────────────────────────────────────────

    pub fn lists(&self) -> &Derived<Vec<Event>> {
        &self.lists
    }

    pub fn get_lists(&self) -> Vec<Event> {
        self.profile.with(|p| p.lists.clone())
    }

    /// Publish a list named `name`, first deleting the list `id` it replaces.
    ///
    /// Both steps are awaited; a failed delete aborts before the create.
    pub async fn put_list(
        &self,
        id: Option<&str>,
        name: &str,
        params: Vec<Vec<String>>,
        relays: Vec<Vec<String>>,
    ) -> Result<EventId> {
        let mut tags = vec![vec!["d".to_string(), name.to_string()]];
        tags.extend(params);
        tags.extend(relays);

        if let Some(id) = id {
            self.cmd
                .delete_event(&[id.to_string()])
                .publish(&self.publish_targets())
                .wait()
                .await?;
        }

        self.cmd
            .create_list(tags)
            .publish(&self.publish_targets())
            .wait()
            .await
    }

    pub fn remove_list(&self, id: &str) -> PublishHandle {
        self.profile.update(|p| Profile {
            lists: p.lists.into_iter().filter(|l| l.id.to_hex() != id).collect(),
            ..p
        });
        self.cmd
            .delete_event(&[id.to_string()])
            .publish(&self.publish_targets())
    }

    // ── Sync from relays ────────────────────────────────────────────

    /// Apply one of the user's own events received from a relay.
    ///
    /// Returns whether the profile changed. Events from other authors and
    /// replaceable events older than the last one applied are ignored.
    pub fn ingest(&self, event: &Event) -> bool {
        let author = event.pubkey.to_hex();
        if self.get_pubkey().as_deref() != Some(author.as_str()) {
            return false;
        }

        let kind = event.kind.as_u16();
        let created_at = event.created_at.as_u64();
        let replaceable = is_replaceable(kind);

        // Held until the event is recorded so an older event cannot land last.
        let mut latest = self.latest.lock();
        if replaceable && latest.get(&kind).is_some_and(|seen| created_at <= *seen) {
            return false;
        }

        let applied = match kind {
            0 => self.ingest_metadata(event),
            KIND_CONTACTS => {
                let petnames = event
                    .tags
                    .iter()
                    .filter_map(|t| Petname::from_tag(t.as_slice()))
                    .collect();
                self.profile.update(|p| Profile { petnames, ..p });
                true
            }
            KIND_MUTES => {
                let mutes = event
                    .tags
                    .iter()
                    .filter_map(|t| Mute::from_tag(t.as_slice()))
                    .collect();
                self.profile.update(|p| Profile { mutes, ..p });
                true
            }
            KIND_RELAYS => {
                let relays = uniq_relays(
                    event
                        .tags
                        .iter()
                        .filter_map(|t| Relay::from_tag(t.as_slice()))
                        .collect(),
                );
                self.profile.update(|p| Profile { relays, ..p });
                true
            }
            KIND_LIST => self.ingest_list(event),
            KIND_DELETION => self.ingest_deletion(event),
            KIND_APP_DATA => self.ingest_settings(event),
            _ => false,
        };

        if applied {
            if replaceable {
                latest.insert(kind, created_at);
            }
            debug!("Profile updated from kind {} event {}", kind, event.id);
        }
        applied
    }

    fn ingest_metadata(&self, event: &Event) -> bool {
        match Metadata::from_json(&event.content) {
            Ok(metadata) => {
                let lnurl = metadata.lud06.clone().or_else(|| metadata.lud16.clone());
                self.profile.update(|p| Profile {
                    kind0: Some(metadata),
                    lnurl,
                    ..p
                });
                true
            }
            Err(e) => {
                warn!("Ignoring invalid metadata {}: {e}", event.id);
                false
            }
        }
    }

    fn ingest_list(&self, event: &Event) -> bool {
        let Some(name) = first_tag_value(event, "d") else {
            return false;
        };
        let newer_exists = self.profile.with(|p| {
            p.lists.iter().any(|l| {
                first_tag_value(l, "d") == Some(name) && l.created_at >= event.created_at
            })
        });
        if newer_exists {
            return false;
        }

        let event = event.clone();
        let name = name.to_string();
        self.profile.update(|p| {
            let mut lists: Vec<Event> = p
                .lists
                .into_iter()
                .filter(|l| first_tag_value(l, "d") != Some(name.as_str()))
                .collect();
            lists.push(event);
            Profile { lists, ..p }
        });
        true
    }

    fn ingest_deletion(&self, event: &Event) -> bool {
        let ids: HashSet<&str> = canoe_core::tag_values(event, "e").collect();
        let before = self.profile.with(|p| p.lists.len());
        self.profile.update(|p| Profile {
            lists: p
                .lists
                .into_iter()
                .filter(|l| !ids.contains(l.id.to_hex().as_str()))
                .collect(),
            ..p
        });
        self.profile.with(|p| p.lists.len()) != before
    }

    fn ingest_settings(&self, event: &Event) -> bool {
        if first_tag_value(event, "d") != Some(SETTINGS_D_TAG) {
            return false;
        }
        if !self.keys.can_sign() {
            debug!("Cannot decrypt settings without a secret key");
            return false;
        }
        match self.keys.decrypt_json::<Settings>(&event.content) {
            Ok(settings) => {
                info!("Loaded settings from relays");
                self.profile.update(|p| Profile { settings, ..p });
                true
            }
            Err(e) => {
                warn!("Failed to decrypt settings {}: {e}", event.id);
                false
            }
        }
    }
}

fn is_replaceable(kind: u16) -> bool {
    Kind::from(kind).is_replaceable() || kind == KIND_APP_DATA
}
