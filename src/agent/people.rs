//! Directory of people we have seen events from.

use crate::store::Store;
use canoe_core::{uniq_relays, Person, PersonLookup, Petname, Relay};
use nostr_sdk::{Event, JsonUtil, Kind, Metadata};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Observable map of pubkey to [`Person`].
#[derive(Debug, Clone, Default)]
pub struct People {
    store: Store<HashMap<String, Person>>,
    /// Newest `created_at` applied per (pubkey, kind).
    latest: Arc<Mutex<HashMap<(String, Kind), u64>>>,
}

impl People {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &Store<HashMap<String, Person>> {
        &self.store
    }

    pub fn get(&self, pubkey: &str) -> Option<Person> {
        self.store.with(|people| people.get(pubkey).cloned())
    }

    pub fn len(&self) -> usize {
        self.store.with(|people| people.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fold profile, contact-list and relay-list events into the directory.
    ///
    /// Returns how many events changed something. For each person and kind
    /// only events at least as new as the last applied one are accepted.
    pub fn ingest(&self, events: &[Event]) -> usize {
        self.store
            .try_update(|people| {
                let mut latest = self.latest.lock();
                let mut applied = 0;
                for event in events {
                    let pubkey = event.pubkey.to_hex();
                    let created_at = event.created_at.as_u64();
                    let key = (pubkey.clone(), event.kind);
                    if latest.get(&key).is_some_and(|seen| created_at < *seen) {
                        trace!("Skipping stale kind {} for {}", event.kind, pubkey);
                        continue;
                    }
                    let person = people
                        .entry(pubkey.clone())
                        .or_insert_with(|| Person::bare(pubkey));
                    if apply(person, event) {
                        latest.insert(key, created_at);
                        applied += 1;
                    }
                }
                drop(latest);
                (applied > 0).then(|| {
                    debug!("Ingested {} of {} people event(s)", applied, events.len());
                    applied
                })
            })
            .unwrap_or(0)
    }
}

impl PersonLookup for People {
    fn person(&self, pubkey: &str) -> Option<Person> {
        self.get(pubkey)
    }
}

fn apply(person: &mut Person, event: &Event) -> bool {
    let changed = match event.kind {
        Kind::Metadata => match Metadata::from_json(&event.content) {
            Ok(metadata) => {
                person.kind0 = Some(metadata);
                true
            }
            Err(e) => {
                debug!("Invalid metadata from {}: {e}", person.pubkey);
                false
            }
        },
        Kind::ContactList => {
            person.petnames = tags(event).filter_map(Petname::from_tag).collect();
            true
        }
        Kind::RelayList => {
            person.relays = uniq_relays(tags(event).filter_map(Relay::from_tag).collect());
            true
        }
        _ => false,
    };

    if changed {
        person.updated_at = person.updated_at.max(event.created_at.as_u64());
    }
    changed
}

fn tags(event: &Event) -> impl Iterator<Item = &[String]> {
    event.tags.iter().map(|tag| tag.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_sdk::{EventBuilder, Keys, Tag, TagKind, Timestamp};

    fn event(keys: &Keys, kind: Kind, content: &str, tags: Vec<Tag>, at: u64) -> Event {
        EventBuilder::new(kind, content)
            .tags(tags)
            .custom_created_at(Timestamp::from(at))
            .sign_with_keys(keys)
            .unwrap()
    }

    fn tag(values: &[&str]) -> Tag {
        Tag::custom(
            TagKind::custom(values[0]),
            values[1..].iter().map(|v| v.to_string()),
        )
    }

    #[test]
    fn metadata_is_indexed_by_pubkey() {
        let keys = Keys::generate();
        let people = People::new();
        let applied = people.ingest(&[event(
            &keys,
            Kind::Metadata,
            r#"{"name":"alice"}"#,
            vec![],
            10,
        )]);
        assert_eq!(applied, 1);

        let person = people.person(&keys.public_key().to_hex()).unwrap();
        assert_eq!(person.kind0.unwrap().name.as_deref(), Some("alice"));
        assert_eq!(person.updated_at, 10);
    }

    #[test]
    fn older_events_do_not_overwrite() {
        let keys = Keys::generate();
        let people = People::new();
        people.ingest(&[event(&keys, Kind::Metadata, r#"{"name":"new"}"#, vec![], 20)]);
        let applied = people.ingest(&[event(&keys, Kind::Metadata, r#"{"name":"old"}"#, vec![], 10)]);
        assert_eq!(applied, 0);
        let person = people.get(&keys.public_key().to_hex()).unwrap();
        assert_eq!(person.kind0.unwrap().name.as_deref(), Some("new"));
    }

    #[test]
    fn contacts_and_relays() {
        let keys = Keys::generate();
        let people = People::new();
        people.ingest(&[
            event(
                &keys,
                Kind::ContactList,
                "",
                vec![tag(&["p", "abc", "wss://x", "bob"])],
                1,
            ),
            event(
                &keys,
                Kind::RelayList,
                "",
                vec![
                    tag(&["r", "wss://a"]),
                    tag(&["r", "wss://a", "read"]),
                    tag(&["r", "wss://b", "write"]),
                ],
                2,
            ),
        ]);

        let person = people.get(&keys.public_key().to_hex()).unwrap();
        assert_eq!(person.petnames, vec![Petname::new("abc", Some("wss://x"), Some("bob"))]);
        assert_eq!(person.updated_at, 2);
        assert_eq!(person.relays.len(), 2);
        assert!(person.relays[0].write);
        assert!(!person.relays[1].read);
    }

    #[test]
    fn kinds_are_versioned_independently() {
        let keys = Keys::generate();
        let people = People::new();
        people.ingest(&[event(&keys, Kind::Metadata, r#"{"name":"a"}"#, vec![], 20)]);
        let applied = people.ingest(&[event(
            &keys,
            Kind::ContactList,
            "",
            vec![tag(&["p", "abc"])],
            10,
        )]);
        assert_eq!(applied, 1);
        assert_eq!(people.get(&keys.public_key().to_hex()).unwrap().petnames.len(), 1);
    }

    #[test]
    fn bad_metadata_is_ignored() {
        let keys = Keys::generate();
        let people = People::new();
        assert_eq!(people.ingest(&[event(&keys, Kind::Metadata, "{nope", vec![], 1)]), 0);
    }

    #[test]
    fn concurrent_ingests_keep_every_person() {
        let people = People::new();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let people = people.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .map(|i| {
                            let keys = Keys::generate();
                            people.ingest(&[event(
                                &keys,
                                Kind::Metadata,
                                r#"{"name":"someone"}"#,
                                vec![],
                                i,
                            )])
                        })
                        .sum::<usize>()
                })
            })
            .collect();
        let applied: usize = threads.into_iter().map(|t| t.join().unwrap()).sum();

        assert_eq!(applied, 400);
        assert_eq!(people.len(), applied);
    }
}
