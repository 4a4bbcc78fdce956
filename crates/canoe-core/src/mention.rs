//! Rendering note content for display, including `#[n]` mention markers.

use crate::html::{ellipsize, escape_attribute, escape_html, render_content};
use crate::person::{display_person, Person, PersonLookup};
use crate::tags::{tag_at, tag_values};
use nostr_sdk::Event;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\[(\d+)\]").unwrap());

/// Notes longer than this are shortened unless shown in full.
pub const NOTE_PREVIEW_LIMIT: usize = 500;

/// Builds in-app paths.
#[derive(Debug, Clone)]
pub struct Routes {
    person_prefix: String,
}

impl Routes {
    pub fn new(person_prefix: impl Into<String>) -> Self {
        Self {
            person_prefix: person_prefix.into(),
        }
    }

    /// Path of a person's profile page.
    pub fn person(&self, pubkey: &str) -> String {
        format!("{}{}", self.person_prefix, pubkey)
    }
}

impl Default for Routes {
    fn default() -> Self {
        Self::new("/p/")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    pub show_entire: bool,
}

/// Render a note's content as HTML.
///
/// Long content is ellipsized, markup is escaped, URLs are linked, and each
/// `#[n]` marker that points at an existing tag becomes a profile link.
pub fn render_note<P: PersonLookup + ?Sized>(
    note: &Event,
    people: &P,
    routes: &Routes,
    options: RenderOptions,
) -> String {
    let should_ellipsize = note.content.chars().count() > NOTE_PREVIEW_LIMIT && !options.show_entire;

    let people_by_pubkey: HashMap<String, Person> = tag_values(note, "p")
        .filter_map(|pubkey| people.person(pubkey))
        .map(|person| (person.pubkey.clone(), person))
        .collect();

    let content = if should_ellipsize {
        ellipsize(&note.content, NOTE_PREVIEW_LIMIT)
    } else {
        note.content.clone()
    };

    let content = render_content(&content);

    MENTION_RE
        .replace_all(&content, |caps: &Captures| {
            let marker = caps[0].to_string();
            let Some(tag) = caps[1].parse::<usize>().ok().and_then(|i| tag_at(note, i)) else {
                return marker;
            };
            let Some(pubkey) = tag.get(1) else {
                return marker;
            };

            let person = people_by_pubkey
                .get(pubkey)
                .cloned()
                .unwrap_or_else(|| Person::bare(pubkey.clone()));

            format!(
                r#"@<a href="{}" class="underline">{}</a>"#,
                escape_attribute(&routes.person(pubkey)),
                escape_html(&display_person(&person))
            )
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::test_util::event;
    use nostr_sdk::prelude::*;

    fn alice() -> HashMap<String, Person> {
        let mut people = HashMap::new();
        people.insert(
            "abc".to_string(),
            Person {
                pubkey: "abc".into(),
                kind0: Some(Metadata::new().display_name("Alice")),
                ..Default::default()
            },
        );
        people
    }

    #[test]
    fn replaces_marker_with_profile_link() {
        let keys = Keys::generate();
        let note = event(&keys, 1, "hello #[0] world", &[&["p", "abc"]], 1);
        let out = render_note(&note, &alice(), &Routes::default(), RenderOptions::default());
        assert_eq!(out, r#"hello @<a href="/p/abc" class="underline">Alice</a> world"#);
    }

    #[test]
    fn leaves_marker_without_tag_unchanged() {
        let keys = Keys::generate();
        let note = event(&keys, 1, "hello #[0] world", &[], 1);
        let out = render_note(&note, &alice(), &Routes::default(), RenderOptions::default());
        assert_eq!(out, "hello #[0] world");
    }

    #[test]
    fn unknown_person_uses_fallback_name() {
        let keys = Keys::generate();
        let note = event(&keys, 1, "cc #[0]", &[&["p", "xyz"]], 1);
        let out = render_note(&note, &alice(), &Routes::new("/people/"), RenderOptions::default());
        assert_eq!(out, r#"cc @<a href="/people/xyz" class="underline">xyz</a>"#);
    }

    #[test]
    fn long_content_is_truncated_unless_shown_entire() {
        let keys = Keys::generate();
        let content = "word ".repeat(200);
        let note = event(&keys, 1, &content, &[], 1);

        let short = render_note(&note, &alice(), &Routes::default(), RenderOptions { show_entire: false });
        let full = render_note(&note, &alice(), &Routes::default(), RenderOptions { show_entire: true });

        assert!(short.ends_with("..."));
        assert!(short.chars().count() <= NOTE_PREVIEW_LIMIT + 3);
        assert_eq!(full, content.trim());
    }

    #[test]
    fn content_is_escaped() {
        let keys = Keys::generate();
        let note = event(&keys, 1, "<b>#[0]</b>", &[&["p", "abc"]], 1);
        let out = render_note(&note, &alice(), &Routes::default(), RenderOptions::default());
        assert_eq!(
            out,
            r#"&lt;b&gt;@<a href="/p/abc" class="underline">Alice</a>&lt;/b&gt;"#
        );
    }

    #[test]
    fn mention_name_and_path_are_escaped() {
        let keys = Keys::generate();
        let hostile = r#"x"><script>alert(1)</script>"#;
        let mut people = HashMap::new();
        people.insert(
            hostile.to_string(),
            Person {
                pubkey: hostile.into(),
                kind0: Some(Metadata::new().display_name("<img src=x onerror=alert(1)>")),
                ..Default::default()
            },
        );
        let note = event(&keys, 1, "hi #[0]", &[&["p", hostile]], 1);
        let out = render_note(&note, &people, &Routes::default(), RenderOptions::default());

        assert!(out.starts_with(r#"hi @<a href="/p/x&quot;"#));
        assert!(out.ends_with(r#"class="underline">&lt;img src=x onerror=alert(1)&gt;</a>"#));
        assert!(!out.contains("<script>"));
        assert!(!out.contains("<img"));
    }
}
