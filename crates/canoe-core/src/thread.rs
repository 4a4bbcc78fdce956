//! Feed threading: attach reactions, replies and parents to notes.
//!
//! Everything here works on events that were already fetched and verified;
//! nothing touches the network.

use crate::person::{Person, PersonLookup};
use crate::tags::find_reply_id;
use nostr_sdk::{Event, EventId, Kind};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// A note with everything needed to display it in a feed.
#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedNote {
    #[serde(flatten)]
    pub event: Event,
    pub reactions: Vec<Event>,
    /// Direct replies, oldest first, each annotated in turn.
    pub replies: Vec<AnnotatedNote>,
    pub person: Option<Person>,
    /// Set by [`threadify`] when the note is shown under its parent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<AnnotatedNote>>,
}

impl AnnotatedNote {
    pub fn id(&self) -> EventId {
        self.event.id
    }
}

/// Options for [`threadify`].
#[derive(Debug, Clone)]
pub struct ThreadOptions {
    /// Hex pubkeys whose notes are left out of this feed.
    pub muffle: HashSet<String>,
    pub show_replies: bool,
}

impl Default for ThreadOptions {
    fn default() -> Self {
        Self {
            muffle: HashSet::new(),
            show_replies: true,
        }
    }
}

/// Context events grouped by the id they reply or react to.
struct ReplyIndex<'a> {
    by_target: HashMap<String, Vec<&'a Event>>,
}

impl<'a> ReplyIndex<'a> {
    fn new(context: &'a [Event]) -> Self {
        let mut by_target: HashMap<String, Vec<&'a Event>> = HashMap::new();
        for event in context {
            if let Some(target) = find_reply_id(event) {
                by_target.entry(target).or_default().push(event);
            }
        }
        Self { by_target }
    }

    fn children(&self, id: &EventId) -> &[&'a Event] {
        self.by_target
            .get(&id.to_hex())
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }
}

fn annotate_with<P: PersonLookup + ?Sized>(
    note: &Event,
    index: &ReplyIndex<'_>,
    people: &P,
    path: &mut HashSet<EventId>,
) -> AnnotatedNote {
    path.insert(note.id);

    let children = index.children(&note.id);
    let reactions: Vec<Event> = children
        .iter()
        .filter(|e| e.kind == Kind::Reaction)
        .map(|e| (*e).clone())
        .collect();

    let mut replies: Vec<&Event> = children
        .iter()
        .copied()
        .filter(|e| e.kind == Kind::TextNote)
        .filter(|e| {
            let on_path = path.contains(&e.id);
            if on_path {
                trace!("skipping cyclic reply {} under {}", e.id, note.id);
            }
            !on_path
        })
        .collect();
    replies.sort_by_key(|e| e.created_at);

    let replies = replies
        .into_iter()
        .map(|reply| annotate_with(reply, index, people, path))
        .collect();

    path.remove(&note.id);

    AnnotatedNote {
        event: note.clone(),
        reactions,
        replies,
        person: people.person(&note.pubkey.to_hex()),
        parent: None,
    }
}

/// Attach reactions, replies (recursively) and the author to `note`.
///
/// A reply that is already an ancestor on the current path is skipped, so a
/// cyclic reply graph still terminates.
pub fn annotate<P: PersonLookup + ?Sized>(note: &Event, context: &[Event], people: &P) -> AnnotatedNote {
    let index = ReplyIndex::new(context);
    annotate_with(note, &index, people, &mut HashSet::new())
}

/// Turn a batch of events into an ordered, annotated feed.
///
/// Each event is replaced by the note it replies or reacts to when that note
/// is known; reactions with no known parent are dropped. Notes that will show
/// up nested under another surfaced note are not repeated at the top level.
pub fn threadify<P: PersonLookup + ?Sized>(
    events: &[Event],
    context: &[Event],
    people: &P,
    options: &ThreadOptions,
) -> Vec<AnnotatedNote> {
    let by_id: HashMap<String, &Event> = events
        .iter()
        .chain(context.iter())
        .map(|e| (e.id.to_hex(), e))
        .collect();

    let mut seen = HashSet::new();
    let mut notes: Vec<&Event> = events
        .iter()
        .filter_map(|e| {
            find_reply_id(e)
                .and_then(|target| by_id.get(&target).copied())
                .or_else(|| (e.kind == Kind::TextNote).then_some(e))
        })
        .filter(|e| !options.muffle.contains(&e.pubkey.to_hex()))
        .collect();
    notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    notes.retain(|e| seen.insert(e.id));

    let index = ReplyIndex::new(context);
    let annotate_one = |note: &Event| annotate_with(note, &index, people, &mut HashSet::new());

    if !options.show_replies {
        return notes
            .into_iter()
            .filter(|note| find_reply_id(note).is_none())
            .map(annotate_one)
            .collect();
    }

    let surfaced: HashSet<String> = notes.iter().map(|e| e.id.to_hex()).collect();

    notes
        .into_iter()
        .filter(|note| match find_reply_id(note) {
            Some(target) => !surfaced.contains(&target),
            None => true,
        })
        .map(|note| {
            let parent = find_reply_id(note)
                .and_then(|target| by_id.get(&target).copied())
                .map(|parent| Box::new(annotate_one(parent)));
            let mut annotated = annotate_one(note);
            annotated.parent = parent;
            annotated
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::test_util::event;
    use nostr_sdk::prelude::*;

    fn no_people() -> HashMap<String, Person> {
        HashMap::new()
    }

    #[test]
    fn annotate_without_context_is_empty() {
        let keys = Keys::generate();
        let note = event(&keys, 1, "hi", &[], 10);
        let out = annotate(&note, &[], &no_people());
        assert!(out.reactions.is_empty());
        assert!(out.replies.is_empty());
        assert!(out.person.is_none());
    }

    #[test]
    fn annotate_collects_reactions_and_sorted_replies() {
        let keys = Keys::generate();
        let note = event(&keys, 1, "root", &[], 10);
        let id = note.id.to_hex();
        let late = event(&keys, 1, "late", &[&["e", id.as_str()]], 30);
        let early = event(&keys, 1, "early", &[&["e", id.as_str()]], 20);
        let like = event(&keys, 7, "+", &[&["e", id.as_str()]], 25);
        let unrelated = event(&keys, 1, "other", &[&["e", "ffff"]], 15);
        let context = vec![late.clone(), like.clone(), early.clone(), unrelated];

        let out = annotate(&note, &context, &no_people());
        assert_eq!(out.reactions.len(), 1);
        assert_eq!(out.reactions[0].id, like.id);
        let reply_ids: Vec<EventId> = out.replies.iter().map(|r| r.id()).collect();
        assert_eq!(reply_ids, vec![early.id, late.id]);
    }

    #[test]
    fn annotate_recurses_into_replies() {
        let keys = Keys::generate();
        let root = event(&keys, 1, "root", &[], 10);
        let child = event(&keys, 1, "child", &[&["e", root.id.to_hex().as_str()]], 20);
        let grandchild = event(&keys, 1, "grandchild", &[&["e", child.id.to_hex().as_str()]], 30);
        let context = vec![grandchild.clone(), child.clone()];

        let out = annotate(&root, &context, &no_people());
        assert_eq!(out.replies.len(), 1);
        assert_eq!(out.replies[0].replies[0].id(), grandchild.id);
    }

    #[test]
    fn annotate_looks_up_author() {
        let keys = Keys::generate();
        let note = event(&keys, 1, "hi", &[], 10);
        let mut people = HashMap::new();
        let hex = keys.public_key().to_hex();
        people.insert(hex.clone(), Person::bare(hex.clone()));
        let out = annotate(&note, &[], &people);
        assert_eq!(out.person.map(|p| p.pubkey), Some(hex));
    }

    #[test]
    fn threadify_without_replies_only_keeps_roots() {
        let keys = Keys::generate();
        let root = event(&keys, 1, "root", &[], 10);
        let orphan_reply = event(&keys, 1, "reply", &[&["e", "missing"]], 20);
        let out = threadify(
            &[root.clone(), orphan_reply],
            &[],
            &no_people(),
            &ThreadOptions {
                show_replies: false,
                ..Default::default()
            },
        );
        assert_eq!(out.len(), 1);
        assert!(out.iter().all(|n| find_reply_id(&n.event).is_none()));
    }

    #[test]
    fn threadify_substitutes_parent_and_drops_orphan_reactions() {
        let keys = Keys::generate();
        let root = event(&keys, 1, "root", &[], 10);
        let like = event(&keys, 7, "+", &[&["e", root.id.to_hex().as_str()]], 50);
        let orphan_like = event(&keys, 7, "+", &[&["e", "missing"]], 60);

        let out = threadify(&[like, orphan_like], &[root.clone()], &no_people(), &ThreadOptions::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), root.id);
    }

    #[test]
    fn threadify_sorts_newest_first_and_muffles() {
        let a = Keys::generate();
        let b = Keys::generate();
        let old = event(&a, 1, "old", &[], 10);
        let new = event(&a, 1, "new", &[], 20);
        let muffled = event(&b, 1, "muffled", &[], 30);

        let mut muffle = HashSet::new();
        muffle.insert(b.public_key().to_hex());
        let out = threadify(
            &[old.clone(), new.clone(), muffled],
            &[],
            &no_people(),
            &ThreadOptions {
                muffle,
                ..Default::default()
            },
        );
        let ids: Vec<EventId> = out.iter().map(|n| n.id()).collect();
        assert_eq!(ids, vec![new.id, old.id]);
    }

    #[test]
    fn threadify_hides_notes_nested_under_surfaced_notes() {
        let keys = Keys::generate();
        let root = event(&keys, 1, "root", &[], 10);
        let reply = event(&keys, 1, "reply", &[&["e", root.id.to_hex().as_str()]], 20);
        let nested = event(&keys, 1, "nested", &[&["e", reply.id.to_hex().as_str()]], 30);

        let events = vec![root.clone(), nested.clone()];
        let context = vec![reply.clone(), nested.clone()];
        let out = threadify(&events, &context, &no_people(), &ThreadOptions::default());

        // `nested` resolves to `reply`; `reply`'s parent `root` is surfaced too,
        // so only `root` stays at the top level.
        let surfaced: HashSet<String> = out.iter().map(|n| n.id().to_hex()).collect();
        for note in &out {
            if let Some(target) = find_reply_id(&note.event) {
                assert!(!surfaced.contains(&target));
            }
        }
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), root.id);
        assert_eq!(out[0].replies[0].id(), reply.id);
    }

    #[test]
    fn threadify_attaches_parent() {
        let keys = Keys::generate();
        let root = event(&keys, 1, "root", &[], 10);
        let reply = event(&keys, 1, "reply", &[&["e", root.id.to_hex().as_str()]], 20);
        let nested = event(&keys, 1, "nested", &[&["e", reply.id.to_hex().as_str()]], 30);

        let out = threadify(&[nested], &[root.clone(), reply.clone()], &no_people(), &ThreadOptions::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), reply.id);
        assert_eq!(out[0].parent.as_ref().map(|p| p.id()), Some(root.id));
    }

    #[test]
    fn threadify_lists_shared_parent_once() {
        let keys = Keys::generate();
        let root = event(&keys, 1, "root", &[], 10);
        let like_a = event(&keys, 7, "+", &[&["e", root.id.to_hex().as_str()]], 20);
        let like_b = event(&keys, 7, "🤙", &[&["e", root.id.to_hex().as_str()]], 30);
        let out = threadify(&[like_a, like_b], &[root], &no_people(), &ThreadOptions::default());
        assert_eq!(out.len(), 1);
    }

    fn forged(id: u8, reply_to: u8, created_at: u64) -> Event {
        let keys = Keys::generate();
        let sig = nostr_sdk::secp256k1::schnorr::Signature::from_slice(&[0u8; 64]).unwrap();
        Event::new(
            EventId::from_byte_array([id; 32]),
            keys.public_key(),
            Timestamp::from(created_at),
            Kind::TextNote,
            [Tag::event(EventId::from_byte_array([reply_to; 32]))],
            "loop",
            sig,
        )
    }

    #[test]
    fn annotate_terminates_on_cyclic_replies() {
        let a = forged(1, 2, 10);
        let b = forged(2, 1, 20);
        let context = vec![a.clone(), b.clone()];

        let out = annotate(&a, &context, &no_people());
        assert_eq!(out.replies.len(), 1);
        assert_eq!(out.replies[0].id(), b.id);
        assert!(out.replies[0].replies.is_empty());
    }

    #[test]
    fn annotate_ignores_self_reply() {
        let a = forged(3, 3, 10);
        let out = annotate(&a, &[a.clone()], &no_people());
        assert!(out.replies.is_empty());
    }
}
