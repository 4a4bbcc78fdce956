//! Fetching people, the user's network and feeds from relays.

use crate::agent::people::People;
use crate::agent::pool::EventSource;
use crate::agent::user::User;
use anyhow::Result;
use async_trait::async_trait;
use nostr_sdk::{Event, Filter, Kind, PublicKey};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Authors per request when loading many people at once.
const PEOPLE_CHUNK: usize = 256;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait Loader: Send + Sync {
    /// Load profiles, contact lists and relay lists of `pubkeys`.
    async fn load_people(&self, relays: &[String], pubkeys: &[String]) -> Result<usize>;

    /// Load `pubkey`'s own data and then the people it follows.
    async fn load_network(&self, relays: &[String], pubkey: &str) -> Result<usize>;
}

/// [`Loader`] backed by relays.
pub struct NetworkLoader {
    source: Arc<dyn EventSource>,
    people: People,
    user: Arc<User>,
    timeout: Duration,
}

impl NetworkLoader {
    pub fn new(source: Arc<dyn EventSource>, people: People, user: Arc<User>) -> Self {
        Self {
            source,
            people,
            user,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn ingest(&self, events: &[Event]) -> usize {
        let applied = self.people.ingest(events);
        for event in events {
            self.user.ingest(event);
        }
        applied
    }

    /// Recent notes by `authors`, newest first.
    pub async fn load_notes(
        &self,
        relays: &[String],
        authors: &[String],
        limit: usize,
    ) -> Result<Vec<Event>> {
        let authors = parse_pubkeys(authors);
        if authors.is_empty() {
            return Ok(Vec::new());
        }
        let filter = Filter::new()
            .kind(Kind::TextNote)
            .authors(authors)
            .limit(limit);
        let mut notes = self.source.fetch(relays, filter, self.timeout).await?;
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notes.truncate(limit);
        Ok(notes)
    }

    /// Replies and reactions that reference any of `events`.
    pub async fn load_context(&self, relays: &[String], events: &[Event]) -> Result<Vec<Event>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let filter = Filter::new()
            .kinds([Kind::TextNote, Kind::Reaction])
            .events(events.iter().map(|e| e.id));
        self.source.fetch(relays, filter, self.timeout).await
    }
}

#[async_trait]
impl Loader for NetworkLoader {
    async fn load_people(&self, relays: &[String], pubkeys: &[String]) -> Result<usize> {
        let authors = parse_pubkeys(pubkeys);
        let mut applied = 0;
        for chunk in authors.chunks(PEOPLE_CHUNK) {
            let filter = Filter::new()
                .kinds([Kind::Metadata, Kind::ContactList, Kind::RelayList])
                .authors(chunk.iter().copied());
            let events = self.source.fetch(relays, filter, self.timeout).await?;
            debug!("Fetched {} people event(s)", events.len());
            applied += self.ingest(&events);
        }
        Ok(applied)
    }

    async fn load_network(&self, relays: &[String], pubkey: &str) -> Result<usize> {
        let author = PublicKey::parse(pubkey)?;
        let filter = Filter::new().author(author).kinds([
            Kind::Metadata,
            Kind::ContactList,
            Kind::MuteList,
            Kind::RelayList,
            Kind::from(crate::agent::cmd::KIND_LIST),
            Kind::from(crate::agent::cmd::KIND_APP_DATA),
        ]);
        let own = self.source.fetch(relays, filter, self.timeout).await?;
        self.ingest(&own);

        let hex = author.to_hex();
        let follows: Vec<String> = if self.user.get_pubkey().as_deref() == Some(hex.as_str()) {
            self.user.get_petname_pubkeys()
        } else {
            self.people
                .get(&hex)
                .map(|p| p.petnames.into_iter().map(|pn| pn.pubkey).collect())
                .unwrap_or_default()
        };

        let applied = self.load_people(relays, &follows).await?;
        info!(
            "Loaded network of {}: {} follow(s), {} update(s)",
            hex,
            follows.len(),
            applied
        );
        Ok(applied)
    }
}

fn parse_pubkeys(pubkeys: &[String]) -> Vec<PublicKey> {
    let mut seen = HashSet::new();
    pubkeys
        .iter()
        .filter(|pk| seen.insert(pk.as_str()))
        .filter_map(|pk| match PublicKey::parse(pk) {
            Ok(pk) => Some(pk),
            Err(e) => {
                warn!("Skipping invalid pubkey {}: {e}", pk);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::cmd::Cmd;
    use crate::agent::keys::Keychain;
    use crate::agent::pool::{PoolConfig, Publisher};
    use nostr_sdk::{EventBuilder, EventId, Keys, Tag, TagKind};
    use parking_lot::Mutex;

    /// Answers every fetch with the same events and records the filters.
    struct Canned {
        events: Vec<Event>,
        filters: Mutex<Vec<Filter>>,
    }

    #[async_trait]
    impl EventSource for Canned {
        async fn fetch(&self, _: &[String], filter: Filter, _: Duration) -> Result<Vec<Event>> {
            self.filters.lock().push(filter);
            Ok(self.events.clone())
        }
    }

    struct NoPublish;

    #[async_trait]
    impl Publisher for NoPublish {
        async fn publish(&self, _: &[String], event: Event) -> Result<EventId> {
            Ok(event.id)
        }
    }

    fn setup(me: &Keys, events: Vec<Event>) -> (NetworkLoader, Arc<Canned>, Arc<User>, People) {
        let keys = Arc::new(Keychain::new());
        keys.set_private_key(&me.secret_key().to_secret_hex()).unwrap();
        let cmd = Cmd::new(Arc::clone(&keys), Arc::new(NoPublish));
        let user = Arc::new(User::new(
            Default::default(),
            keys,
            cmd,
            PoolConfig::default(),
        ));
        let source = Arc::new(Canned {
            events,
            filters: Mutex::new(Vec::new()),
        });
        let people = People::new();
        let loader = NetworkLoader::new(source.clone(), people.clone(), Arc::clone(&user));
        (loader, source, user, people)
    }

    #[test]
    fn parse_pubkeys_skips_invalid_and_duplicates() {
        let pk = Keys::generate().public_key().to_hex();
        let parsed = parse_pubkeys(&[pk.clone(), "nope".into(), pk]);
        assert_eq!(parsed.len(), 1);
    }

    #[tokio::test]
    async fn load_network_follows_contacts() {
        let me = Keys::generate();
        let friend = Keys::generate();
        let friend_hex = friend.public_key().to_hex();

        let contacts = EventBuilder::new(Kind::ContactList, "")
            .tag(Tag::custom(TagKind::custom("p"), [friend_hex.clone()]))
            .sign_with_keys(&me)
            .unwrap();
        let metadata = EventBuilder::new(Kind::Metadata, r#"{"name":"friend"}"#)
            .sign_with_keys(&friend)
            .unwrap();

        let (loader, source, user, people) = setup(&me, vec![contacts, metadata]);
        loader
            .load_network(&["wss://a".to_string()], &me.public_key().to_hex())
            .await
            .unwrap();

        assert_eq!(user.get_petname_pubkeys(), vec![friend_hex.clone()]);
        let person = people.get(&friend_hex).unwrap();
        assert_eq!(person.kind0.unwrap().name.as_deref(), Some("friend"));
        assert_eq!(source.filters.lock().len(), 2);
    }

    #[tokio::test]
    async fn empty_inputs_need_no_fetch() {
        let (loader, source, _, _) = setup(&Keys::generate(), Vec::new());
        assert!(loader.load_notes(&[], &[], 10).await.unwrap().is_empty());
        assert!(loader.load_context(&[], &[]).await.unwrap().is_empty());
        assert_eq!(loader.load_people(&[], &["bad".into()]).await.unwrap(), 0);
        assert!(source.filters.lock().is_empty());
    }

    #[tokio::test]
    async fn notes_are_sorted_and_limited() {
        let author = Keys::generate();
        let notes: Vec<Event> = (1..=3)
            .map(|i| {
                EventBuilder::new(Kind::TextNote, format!("note {i}"))
                    .custom_created_at(nostr_sdk::Timestamp::from(i))
                    .sign_with_keys(&author)
                    .unwrap()
            })
            .collect();
        let (loader, _, _, _) = setup(&Keys::generate(), notes);

        let loaded = loader
            .load_notes(&[], &[author.public_key().to_hex()], 2)
            .await
            .unwrap();
        let contents: Vec<&str> = loaded.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["note 3", "note 2"]);
    }
}
