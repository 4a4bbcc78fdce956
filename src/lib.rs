//! canoe: the application layer of a Nostr social client.
//!
//! Pure feed and rendering logic lives in `canoe-core`; this crate adds
//! state (profile, people, UI), relay I/O and the command line.

pub mod agent;
pub mod app;
pub mod cli;
pub mod config;
pub mod store;

pub use agent::{Agent, User};
pub use app::{App, Credentials};
pub use config::Config;
pub use store::{Derived, Store, Subscription, Synced};
