//! Social-graph entries kept on a user's profile: relays, petnames and mutes.
//!
//! Each collection is a set keyed by one field. The helpers here keep that
//! invariant and produce the raw tags used when the collection is published.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;

/// A relay the user reads from and/or writes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relay {
    pub url: String,
    #[serde(default = "default_true")]
    pub read: bool,
    #[serde(default = "default_true")]
    pub write: bool,
}

fn default_true() -> bool {
    true
}

impl Relay {
    /// A relay used for both reading and writing.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            read: true,
            write: true,
        }
    }

    /// NIP-65 `r` tag. `None` when the relay is neither read nor written.
    pub fn to_tag(&self) -> Option<Vec<String>> {
        let mut tag = vec!["r".to_string(), self.url.clone()];
        match (self.read, self.write) {
            (true, true) => {}
            (true, false) => tag.push("read".to_string()),
            (false, true) => tag.push("write".to_string()),
            (false, false) => return None,
        }
        Some(tag)
    }

    /// Parse an `r` tag. A missing marker means read and write.
    pub fn from_tag(tag: &[String]) -> Option<Self> {
        if tag.first().map(|v| v.as_str()) != Some("r") {
            return None;
        }
        let url = tag.get(1)?.trim();
        if url.is_empty() {
            return None;
        }
        let (read, write) = match tag.get(2).map(|v| v.as_str()) {
            Some("read") => (true, false),
            Some("write") => (false, true),
            _ => (true, true),
        };
        Some(Self {
            url: url.to_string(),
            read,
            write,
        })
    }
}

/// A follow entry: `["p", pubkey, relay_url, name]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Petname {
    pub pubkey: String,
    #[serde(default)]
    pub relay: String,
    #[serde(default)]
    pub name: String,
}

impl Petname {
    pub fn new(pubkey: impl Into<String>, relay: Option<&str>, name: Option<&str>) -> Self {
        Self {
            pubkey: pubkey.into(),
            relay: relay.unwrap_or_default().to_string(),
            name: name.unwrap_or_default().to_string(),
        }
    }

    pub fn to_tag(&self) -> Vec<String> {
        vec![
            "p".to_string(),
            self.pubkey.clone(),
            self.relay.clone(),
            self.name.clone(),
        ]
    }

    pub fn from_tag(tag: &[String]) -> Option<Self> {
        if tag.first().map(|v| v.as_str()) != Some("p") {
            return None;
        }
        Some(Self {
            pubkey: tag.get(1)?.clone(),
            relay: tag.get(2).cloned().unwrap_or_default(),
            name: tag.get(3).cloned().unwrap_or_default(),
        })
    }
}

/// A mute entry: `[type, value]`, where type is usually `p` or `e`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mute {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl Mute {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }

    pub fn to_tag(&self) -> Vec<String> {
        vec![self.kind.clone(), self.value.clone()]
    }

    pub fn from_tag(tag: &[String]) -> Option<Self> {
        Some(Self {
            kind: tag.first()?.clone(),
            value: tag.get(1)?.clone(),
        })
    }
}

/// Keep the first item for every key, preserving order.
pub fn uniq_by<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}

/// Relays de-duplicated by url.
pub fn uniq_relays(relays: Vec<Relay>) -> Vec<Relay> {
    uniq_by(relays, |r| r.url.clone())
}

/// Replace-on-write: drop any entry for `pubkey`, then append the new one.
pub fn with_petname(petnames: Vec<Petname>, petname: Petname) -> Vec<Petname> {
    let mut out = without_petname(petnames, &petname.pubkey);
    out.push(petname);
    out
}

pub fn without_petname(petnames: Vec<Petname>, pubkey: &str) -> Vec<Petname> {
    petnames.into_iter().filter(|p| p.pubkey != pubkey).collect()
}

/// Replace-on-write keyed by mute value.
pub fn with_mute(mutes: Vec<Mute>, mute: Mute) -> Vec<Mute> {
    let mut out = without_mute(mutes, &mute.value);
    out.push(mute);
    out
}

pub fn without_mute(mutes: Vec<Mute>, value: &str) -> Vec<Mute> {
    mutes.into_iter().filter(|m| m.value != value).collect()
}

pub fn with_relay(mut relays: Vec<Relay>, relay: Relay) -> Vec<Relay> {
    relays.push(relay);
    uniq_relays(relays)
}

pub fn without_relay(relays: Vec<Relay>, url: &str) -> Vec<Relay> {
    relays.into_iter().filter(|r| r.url != url).collect()
}

pub fn with_write_condition(relays: Vec<Relay>, url: &str, write: bool) -> Vec<Relay> {
    relays
        .into_iter()
        .map(|r| if r.url == url { Relay { write, ..r } } else { r })
        .collect()
}
