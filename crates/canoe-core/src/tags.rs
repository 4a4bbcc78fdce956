//! Tag helpers and NIP-10 reply/root resolution.

use nostr_sdk::{Event, Tag, TagKind};

/// Marker values that NIP-10 allows in position 3 of an `e` tag.
const MARK_REPLY: &str = "reply";
const MARK_ROOT: &str = "root";
const MARK_MENTION: &str = "mention";

/// Raw tag at `index`, as a string slice.
pub fn tag_at(event: &Event, index: usize) -> Option<&[String]> {
    event.tags.get(index).map(|tag| tag.as_slice())
}

/// Values (position 1) of every tag of the given type, in order.
pub fn tag_values<'a>(event: &'a Event, kind: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    event.tags.iter().filter_map(move |tag| {
        let s = tag.as_slice();
        if s.first().map(|v| v.as_str()) == Some(kind) {
            s.get(1).map(|v| v.as_str())
        } else {
            None
        }
    })
}

/// First value of a tag type (e.g. the `d` identifier).
pub fn first_tag_value<'a>(event: &'a Event, kind: &'a str) -> Option<&'a str> {
    tag_values(event, kind).next()
}

/// Build a tag from its raw string form. Returns `None` for an empty slice.
pub fn tag_from_slice(values: &[String]) -> Option<Tag> {
    let (kind, rest) = values.split_first()?;
    Some(Tag::custom(TagKind::custom(kind.clone()), rest.to_vec()))
}

/// The `e` tags that reference a parent, ignoring mentions.
fn thread_tags(event: &Event) -> Vec<&[String]> {
    event
        .tags
        .iter()
        .map(|tag| tag.as_slice())
        .filter(|s| s.first().map(|v| v.as_str()) == Some("e") && s.len() >= 2)
        .filter(|s| s.get(3).map(|v| v.as_str()) != Some(MARK_MENTION))
        .collect()
}

fn marked<'a>(tags: &[&'a [String]], mark: &str) -> Option<&'a [String]> {
    tags.iter()
        .copied()
        .find(|s| s.get(3).map(|v| v.as_str()) == Some(mark))
}

/// Resolve `(reply, root)` tags of an event.
///
/// Marked tags take precedence: `reply` is the tag marked "reply", falling back
/// to the one marked "root". Unmarked (positional) tags use the first as root
/// and the last as reply.
fn reply_and_root(event: &Event) -> (Option<&[String]>, Option<&[String]>) {
    let tags = thread_tags(event);
    if tags.is_empty() {
        return (None, None);
    }

    let is_legacy = tags.iter().all(|s| {
        !matches!(
            s.get(3).map(|v| v.as_str()),
            Some(MARK_REPLY) | Some(MARK_ROOT)
        )
    });

    if is_legacy {
        return (tags.last().copied(), tags.first().copied());
    }

    let root = marked(&tags, MARK_ROOT);
    let reply = marked(&tags, MARK_REPLY).or(root);
    (reply, root)
}

/// Id of the event this one replies (or reacts) to.
pub fn find_reply_id(event: &Event) -> Option<String> {
    reply_and_root(event)
        .0
        .and_then(|s| s.get(1))
        .filter(|id| !id.is_empty())
        .cloned()
}

/// Id of the thread root this event belongs to.
pub fn find_root_id(event: &Event) -> Option<String> {
    reply_and_root(event)
        .1
        .and_then(|s| s.get(1))
        .filter(|id| !id.is_empty())
        .cloned()
}
