//! People as seen from their published events, and how to name them.

use crate::html::ellipsize;
use crate::social::{Petname, Relay};
use nostr_sdk::{Metadata, PublicKey, ToBech32};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Names longer than this are ellipsized for display.
const NAME_LIMIT: usize = 60;

/// What we know about a pubkey.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub pubkey: String,
    /// Kind 0 metadata.
    #[serde(default)]
    pub kind0: Option<Metadata>,
    #[serde(default)]
    pub petnames: Vec<Petname>,
    #[serde(default)]
    pub relays: Vec<Relay>,
    /// `created_at` of the newest event folded into this record.
    #[serde(default)]
    pub updated_at: u64,
}

impl Person {
    /// A person we know nothing about besides the key.
    pub fn bare(pubkey: impl Into<String>) -> Self {
        Self {
            pubkey: pubkey.into(),
            ..Default::default()
        }
    }
}

/// Read access to a people directory.
pub trait PersonLookup {
    fn person(&self, pubkey: &str) -> Option<Person>;
}

impl PersonLookup for HashMap<String, Person> {
    fn person(&self, pubkey: &str) -> Option<Person> {
        self.get(pubkey).cloned()
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Truncate an npub for compact display.
pub fn short_npub(pubkey: &str) -> Option<String> {
    let npub = PublicKey::from_hex(pubkey).ok()?.to_bech32().ok()?;
    Some(format!("{}...", &npub[..16.min(npub.len())]))
}

/// Display name: `display_name`, then `name`, then a short npub, then the raw key.
pub fn display_person(person: &Person) -> String {
    let kind0 = person.kind0.as_ref();
    if let Some(name) = non_empty(kind0.and_then(|m| m.display_name.as_ref())) {
        return ellipsize(name, NAME_LIMIT);
    }
    if let Some(name) = non_empty(kind0.and_then(|m| m.name.as_ref())) {
        return ellipsize(name, NAME_LIMIT);
    }
    short_npub(&person.pubkey).unwrap_or_else(|| person.pubkey.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_sdk::prelude::*;

    #[test]
    fn prefers_display_name() {
        let person = Person {
            pubkey: "abc".into(),
            kind0: Some(Metadata::new().name("alice").display_name("Alice A")),
            ..Default::default()
        };
        assert_eq!(display_person(&person), "Alice A");
    }

    #[test]
    fn falls_back_to_name_when_display_name_blank() {
        let person = Person {
            pubkey: "abc".into(),
            kind0: Some(Metadata::new().name("alice").display_name("  ")),
            ..Default::default()
        };
        assert_eq!(display_person(&person), "alice");
    }

    #[test]
    fn falls_back_to_short_npub() {
        let keys = Keys::generate();
        let person = Person::bare(keys.public_key().to_hex());
        let name = display_person(&person);
        assert!(name.starts_with("npub1"));
        assert!(name.ends_with("..."));
    }

    #[test]
    fn invalid_key_falls_back_to_raw_value() {
        assert_eq!(display_person(&Person::bare("abc")), "abc");
    }
}
