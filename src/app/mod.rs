//! Application controller: login, relay management and feed presentation.

pub mod ui;

pub use ui::{
    parse_theme, Location, Modal, ModalStack, Palette, Router, Theme, ThemeName, Toast,
    ToastMessage,
};

use crate::agent::{Agent, Loader, PublishHandle};
use crate::config::Config;
use anyhow::{Context, Result};
use canoe_core::{AnnotatedNote, RenderOptions, Relay, Routes, ThreadOptions};
use nostr_sdk::{Event, EventId};
use std::sync::Arc;
use tracing::{info, warn};

const THEME_FILE: &str = "theme.json";

/// Where the app goes after logging in.
pub const NETWORK_ROUTE: &str = "/notes/network";

/// How to log in: a secret key to sign with, or a public key to browse as.
#[derive(Debug, Clone)]
pub enum Credentials {
    PrivateKey(String),
    PublicKey(String),
}

pub struct App {
    pub agent: Arc<Agent>,
    pub router: Router,
    pub toast: Toast,
    pub modals: ModalStack,
    pub theme: Theme,
    pub routes: Routes,
}

impl App {
    pub fn new(config: &Config, agent: Agent) -> Self {
        let router = Router::default();
        Self {
            agent: Arc::new(agent),
            modals: ModalStack::new(router.clone()),
            router,
            toast: Toast::new(),
            theme: Theme::new(&config.theme),
            routes: Routes::new(config.routes.person_prefix.clone()),
        }
    }

    /// An app whose theme choice is persisted in the data directory.
    pub fn open(config: &Config, agent: Agent) -> Self {
        let mut app = Self::new(config, agent);
        app.theme = Theme::open(config.data_dir().join(THEME_FILE), &config.theme);
        app
    }

    fn relay_urls(&self) -> Vec<String> {
        self.agent.read_urls()
    }

    /// Log in and load enough to show the network feed.
    ///
    /// Network loading continues in the background; only the user's own
    /// profile is awaited.
    pub async fn login(&self, credentials: Credentials) -> Result<String> {
        let pubkey = match &credentials {
            Credentials::PrivateKey(secret) => self.agent.keys.set_private_key(secret),
            Credentials::PublicKey(pubkey) => self.agent.keys.set_public_key(pubkey),
        }
        .context("Failed to log in")?
        .to_hex();
        info!("Logged in as {}", pubkey);

        self.modals
            .push(Modal::message("Loading your profile data...", true));

        let background = self.load_app_data(&pubkey);
        tokio::spawn(async move {
            if let Err(e) = background.await {
                warn!("Failed to load app data: {e:#}");
            }
        });

        self.agent
            .loader
            .load_people(&self.relay_urls(), std::slice::from_ref(&pubkey))
            .await
            .context("Failed to load profile")?;

        self.router.navigate(NETWORK_ROUTE);
        Ok(pubkey)
    }

    /// Load the user's network on the current relays.
    ///
    /// The returned future owns what it needs, so it can be spawned.
    pub fn load_app_data(
        &self,
        pubkey: &str,
    ) -> impl std::future::Future<Output = Result<usize>> + Send + 'static {
        let loader = Arc::clone(&self.agent.loader);
        let relays = self.relay_urls();
        let pubkey = pubkey.to_string();
        async move { loader.load_network(&relays, &pubkey).await }
    }

    /// Add a relay for anonymous use and, when logged in, to the user's list.
    pub async fn add_relay(&self, relay: Relay) -> Result<Option<EventId>> {
        self.agent
            .defaults
            .update(|relays| canoe_core::with_relay(relays, relay.clone()));

        let Some(pubkey) = self.agent.user.get_pubkey() else {
            return Ok(None);
        };
        let handle = self
            .agent
            .user
            .update_relays(|relays| canoe_core::with_relay(relays, relay));
        let id = wait(handle).await?;

        self.load_app_data(&pubkey).await?;
        Ok(id)
    }

    pub async fn remove_relay(&self, url: &str) -> Result<Option<EventId>> {
        self.agent
            .defaults
            .update(|relays| canoe_core::without_relay(relays, url));

        if self.agent.user.get_pubkey().is_none() {
            return Ok(None);
        }
        wait(self.agent.user.remove_relay(url)).await
    }

    pub async fn set_relay_write_condition(&self, url: &str, write: bool) -> Result<Option<EventId>> {
        self.agent
            .defaults
            .update(|relays| canoe_core::with_write_condition(relays, url, write));

        if self.agent.user.get_pubkey().is_none() {
            return Ok(None);
        }
        wait(self.agent.user.set_relay_write_condition(url, write)).await
    }

    /// The user's relays, or the defaults for anonymous use.
    pub fn get_relays(&self) -> Vec<Relay> {
        self.agent.get_relays()
    }

    pub fn render_note(&self, note: &Event, options: RenderOptions) -> String {
        canoe_core::render_note(note, &self.agent.people, &self.routes, options)
    }

    pub fn annotate(&self, note: &Event, context: &[Event]) -> AnnotatedNote {
        canoe_core::annotate(note, context, &self.agent.people)
    }

    pub fn threadify(
        &self,
        events: &[Event],
        context: &[Event],
        options: &ThreadOptions,
    ) -> Vec<AnnotatedNote> {
        canoe_core::threadify(events, context, &self.agent.people, options)
    }
}

async fn wait(handle: Option<PublishHandle>) -> Result<Option<EventId>> {
    match handle {
        Some(handle) => Ok(Some(handle.wait().await?)),
        None => Ok(None),
    }
}
