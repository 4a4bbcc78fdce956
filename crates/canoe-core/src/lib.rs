//! Shared Nostr client logic for canoe
//!
//! Pure functions over already-fetched events: reply resolution, social-graph
//! entries, mute filtering, feed threading and note rendering. Nothing in this
//! crate performs I/O.

pub mod html;
pub mod mention;
pub mod mute;
pub mod person;
pub mod social;
pub mod tags;
pub mod thread;

// Re-export commonly used types
pub use html::{ellipsize, escape_attribute, escape_html, render_content};
pub use mention::{render_note, RenderOptions, Routes, NOTE_PREVIEW_LIMIT};
pub use mute::{apply_mutes, MuteSet};
pub use person::{display_person, short_npub, Person, PersonLookup};
pub use social::{
    uniq_by, uniq_relays, with_mute, with_petname, with_relay, with_write_condition,
    without_mute, without_petname, without_relay, Mute, Petname, Relay,
};
pub use tags::{find_reply_id, find_root_id, first_tag_value, tag_at, tag_from_slice, tag_values};
pub use thread::{annotate, threadify, AnnotatedNote, ThreadOptions};

// Re-export nostr-sdk for convenience
pub use nostr_sdk;
