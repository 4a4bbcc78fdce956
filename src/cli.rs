use anyhow::{Context, Result};
use clap::Subcommand;
use nostr_sdk::{PublicKey, ToBech32};

use crate::agent::{Loader, PublishHandle};
use crate::app::{App, ThemeName};
use crate::config::Config;
use canoe_core::{display_person, Person, Relay, RenderOptions, ThreadOptions};
use std::collections::HashSet;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the configured identity and its relays
    Whoami,
    /// Print the feed of people you follow
    Feed {
        /// Maximum number of notes to fetch
        #[clap(long, default_value_t = 20)]
        limit: usize,
        /// Hide notes that are replies
        #[clap(long)]
        no_replies: bool,
        /// Do not shorten long notes
        #[clap(long)]
        full: bool,
    },
    /// Manage your relay list
    Relays {
        #[clap(subcommand)]
        action: RelayAction,
    },
    /// Follow someone (npub or hex)
    Follow {
        pubkey: String,
        /// Relay hint for this contact
        #[clap(long)]
        relay: Option<String>,
        /// Petname for this contact
        #[clap(long)]
        name: Option<String>,
    },
    /// Stop following someone
    Unfollow { pubkey: String },
    /// Mute a pubkey or event id
    Mute {
        value: String,
        /// Mute type: p (person) or e (event)
        #[clap(long = "type", default_value = "p")]
        kind: String,
    },
    /// Unmute a pubkey or event id
    Unmute { value: String },
    /// Show or switch the UI theme
    Theme {
        #[clap(long, conflicts_with = "light")]
        dark: bool,
        #[clap(long)]
        light: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum RelayAction {
    /// List relays in use
    List,
    /// Add a relay (read and write)
    Add { url: String },
    /// Remove a relay
    Remove { url: String },
    /// Enable or disable writing to a relay
    Write {
        url: String,
        /// Stop publishing to this relay
        #[clap(long)]
        off: bool,
    },
}

pub async fn handle_command(cmd: Commands, app: &App, config: &Config) -> Result<()> {
    match cmd {
        Commands::Whoami => cmd_whoami(app, config).await,
        Commands::Feed {
            limit,
            no_replies,
            full,
        } => cmd_feed(app, config, limit, !no_replies, full).await,
        Commands::Relays { action } => cmd_relays(action, app, config).await,
        Commands::Follow { pubkey, relay, name } => {
            let hex = parse_pubkey(&pubkey)?;
            session(app, config).await?;
            let handle = app
                .agent
                .user
                .add_petname(&hex, relay.as_deref(), name.as_deref());
            report("Followed", &hex, handle).await
        }
        Commands::Unfollow { pubkey } => {
            let hex = parse_pubkey(&pubkey)?;
            session(app, config).await?;
            let handle = app.agent.user.remove_petname(&hex);
            report("Unfollowed", &hex, handle).await
        }
        Commands::Mute { value, kind } => {
            let value = normalize_mute(&kind, &value)?;
            session(app, config).await?;
            let handle = app.agent.user.add_mute(&kind, &value);
            report("Muted", &value, handle).await
        }
        Commands::Unmute { value } => {
            let value = PublicKey::parse(&value)
                .map(|pk| pk.to_hex())
                .unwrap_or(value);
            session(app, config).await?;
            let handle = app.agent.user.remove_mute(&value);
            report("Unmuted", &value, handle).await
        }
        Commands::Theme { dark, light } => cmd_theme(app, dark, light),
    }
}

/// Log in with the configured identity and load the user's own data.
///
/// Returns the hex pubkey, or `None` when no identity is configured.
async fn session(app: &App, config: &Config) -> Result<Option<String>> {
    let pubkey = if let Some(secret) = config.load_secret()? {
        app.agent
            .keys
            .set_private_key(&secret)
            .context("Invalid secret key in config")?
    } else if let Some(pubkey) = &config.identity.pubkey {
        app.agent
            .keys
            .set_public_key(pubkey)
            .context("Invalid pubkey in config")?
    } else {
        return Ok(None);
    };

    let hex = pubkey.to_hex();
    app.load_app_data(&hex)
        .await
        .context("Failed to load profile from relays")?;
    Ok(Some(hex))
}

async fn report(action: &str, target: &str, handle: Option<PublishHandle>) -> Result<()> {
    println!("✅ {action} {target}");
    match handle {
        Some(handle) => {
            let id = handle.wait().await.context("Failed to publish")?;
            println!("   Published event: {}", id.to_hex());
        }
        None => println!("   Saved locally only (read-only identity)"),
    }
    Ok(())
}

fn parse_pubkey(value: &str) -> Result<String> {
    let pk = PublicKey::parse(value).map_err(|e| anyhow::anyhow!("Invalid pubkey: {e}"))?;
    Ok(pk.to_hex())
}

fn normalize_mute(kind: &str, value: &str) -> Result<String> {
    match kind {
        "p" => parse_pubkey(value),
        _ => Ok(value.to_string()),
    }
}

async fn cmd_whoami(app: &App, config: &Config) -> Result<()> {
    let Some(hex) = session(app, config).await? else {
        println!("No identity configured.");
        println!("Set [identity] nsec or pubkey in the config, or CANOE_NSEC in the environment.");
        return Ok(());
    };

    let npub = PublicKey::from_hex(&hex)?.to_bech32()?;
    let person = app
        .agent
        .get_person(&hex)
        .unwrap_or_else(|| Person::bare(hex.clone()));

    println!("🔑 Identity:\n");
    println!("  name: {}", display_person(&person));
    println!("  npub: {npub}");
    println!("  hex:  {hex}");
    println!(
        "  mode: {}",
        if app.agent.keys.can_sign() {
            "signing"
        } else {
            "read-only"
        }
    );
    println!("  follows: {}", app.agent.user.get_petnames().len());
    println!("  can publish: {}", app.agent.user.can_publish());
    Ok(())
}

async fn cmd_feed(app: &App, config: &Config, limit: usize, show_replies: bool, full: bool) -> Result<()> {
    let me = session(app, config).await?;
    let relays = app.agent.read_urls();

    let mut authors = app.agent.user.get_petname_pubkeys();
    if authors.is_empty() {
        authors.extend(me);
    }
    if authors.is_empty() {
        println!("Nobody to show: log in and follow someone first.");
        return Ok(());
    }

    let loader = &app.agent.loader;
    let notes = app
        .agent
        .user
        .apply_mutes(loader.load_notes(&relays, &authors, limit).await?);
    let context = app
        .agent
        .user
        .apply_mutes(loader.load_context(&relays, &notes).await?);

    let unknown: Vec<String> = notes
        .iter()
        .chain(context.iter())
        .flat_map(|e| {
            std::iter::once(e.pubkey.to_hex())
                .chain(canoe_core::tag_values(e, "p").map(str::to_string))
        })
        .collect::<HashSet<_>>()
        .into_iter()
        .filter(|pk| app.agent.get_person(pk).is_none())
        .collect();
    loader.load_people(&relays, &unknown).await?;

    let options = ThreadOptions {
        show_replies,
        ..Default::default()
    };
    let feed = app.threadify(&notes, &context, &options);
    if feed.is_empty() {
        println!("No notes found.");
        return Ok(());
    }

    let render = RenderOptions { show_entire: full };
    for item in feed {
        if let Some(parent) = &item.parent {
            println!("↳ in reply to {}:", author_name(app, &parent.event.pubkey.to_hex()));
            println!("  {}", app.render_note(&parent.event, render));
        }
        println!(
            "{} · {}",
            author_name(app, &item.event.pubkey.to_hex()),
            format_time(item.event.created_at.as_u64())
        );
        println!("{}", app.render_note(&item.event, render));
        println!(
            "  💬 {}  ❤ {}\n",
            item.replies.len(),
            item.reactions.len()
        );
    }
    Ok(())
}

fn author_name(app: &App, pubkey: &str) -> String {
    let person = app
        .agent
        .get_person(pubkey)
        .unwrap_or_else(|| Person::bare(pubkey));
    display_person(&person)
}

fn format_time(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| chrono::DateTime::from_timestamp(s, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| secs.to_string())
}

async fn cmd_relays(action: RelayAction, app: &App, config: &Config) -> Result<()> {
    session(app, config).await?;
    match action {
        RelayAction::List => {
            let relays = app.get_relays();
            if relays.is_empty() {
                println!("No relays configured.");
                return Ok(());
            }
            println!("📡 Relays:\n");
            for relay in relays {
                println!("  {} {}", relay.url, relay_flags(&relay));
            }
        }
        RelayAction::Add { url } => {
            validate_relay_url(&url)?;
            let id = app.add_relay(Relay::new(url.as_str())).await?;
            print_outcome("Added", &url, id);
        }
        RelayAction::Remove { url } => {
            let id = app.remove_relay(&url).await?;
            print_outcome("Removed", &url, id);
        }
        RelayAction::Write { url, off } => {
            let id = app.set_relay_write_condition(&url, !off).await?;
            let action = if off { "Disabled writes to" } else { "Enabled writes to" };
            print_outcome(action, &url, id);
        }
    }
    Ok(())
}

fn relay_flags(relay: &Relay) -> &'static str {
    match (relay.read, relay.write) {
        (true, true) => "[read, write]",
        (true, false) => "[read]",
        (false, true) => "[write]",
        (false, false) => "[off]",
    }
}

fn validate_relay_url(url: &str) -> Result<()> {
    if !url.starts_with("wss://") && !url.starts_with("ws://") {
        anyhow::bail!("Relay URL must start with ws:// or wss://: {}", url);
    }
    Ok(())
}

fn print_outcome(action: &str, target: &str, id: Option<nostr_sdk::EventId>) {
    println!("✅ {action} {target}");
    match id {
        Some(id) => println!("   Published event: {}", id.to_hex()),
        None => println!("   Saved locally only"),
    }
}

fn cmd_theme(app: &App, dark: bool, light: bool) -> Result<()> {
    if dark {
        app.theme.set(ThemeName::Dark);
    } else if light {
        app.theme.set(ThemeName::Light);
    }
    let theme = app.theme.current();
    println!("🎨 Theme: {theme}\n");
    println!("{}", app.theme.get_theme_variables(theme));
    Ok(())
}
