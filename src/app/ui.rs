//! UI state: location, toasts, the modal stack and themes.

use crate::config::ThemeConfig;
use crate::store::{Store, Subscription, Synced};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

// ── Location ────────────────────────────────────────────────────

static MODAL_DEPTH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bm=(\d+)").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub pathname: String,
    /// Fragment including the leading `#`, or empty.
    pub hash: String,
}

impl Location {
    pub fn parse(path: &str) -> Self {
        match path.find('#') {
            Some(i) => Self {
                pathname: path[..i].to_string(),
                hash: path[i..].to_string(),
            },
            None => Self {
                pathname: path.to_string(),
                hash: String::new(),
            },
        }
    }

    /// Modal depth encoded in the hash as `m=<n>`; 0 when absent.
    pub fn modal_depth(&self) -> usize {
        MODAL_DEPTH_RE
            .captures(&self.hash)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(0)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pathname, self.hash)
    }
}

/// Programmatic navigation with an observable current location.
#[derive(Debug, Clone)]
pub struct Router {
    location: Store<Location>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Router {
    pub fn new(initial: &str) -> Self {
        Self {
            location: Store::new(Location::parse(initial)),
        }
    }

    /// Go to `path`. Subscribers see every navigation, even to the same path.
    pub fn navigate(&self, path: &str) {
        debug!("Navigate to {}", path);
        self.location.set(Location::parse(path));
    }

    pub fn location(&self) -> &Store<Location> {
        &self.location
    }

    pub fn current(&self) -> Location {
        self.location.get()
    }
}

// ── Toast ───────────────────────────────────────────────────────

pub const TOAST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToastMessage {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

/// A single transient notification.
#[derive(Debug, Clone, Default)]
pub struct Toast {
    current: Store<Option<ToastMessage>>,
}

impl Toast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &Store<Option<ToastMessage>> {
        &self.current
    }

    pub fn get(&self) -> Option<ToastMessage> {
        self.current.get()
    }

    /// Show a toast for the default five seconds.
    pub fn show(&self, kind: &str, message: impl Into<String>) -> Uuid {
        self.show_for(kind, message, Some(TOAST_TIMEOUT))
    }

    /// Show a toast and, given a timeout, hide it afterwards unless another
    /// toast has replaced it in the meantime. Needs a tokio runtime when a
    /// timeout is given.
    pub fn show_for(&self, kind: &str, message: impl Into<String>, timeout: Option<Duration>) -> Uuid {
        let id = Uuid::new_v4();
        self.current.set(Some(ToastMessage {
            id,
            kind: kind.to_string(),
            message: message.into(),
        }));

        if let Some(timeout) = timeout.filter(|t| !t.is_zero()) {
            let current = self.current.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if current.with(|t| t.as_ref().map(|t| t.id)) == Some(id) {
                    current.set(None);
                }
            });
        }
        id
    }

    pub fn hide(&self) {
        self.current.set(None);
    }
}

// ── Modals ──────────────────────────────────────────────────────

/// Pause after popping a modal so history navigation can settle.
pub const MODAL_POP_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modal {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub spinner: bool,
}

impl Modal {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            message: None,
            spinner: false,
        }
    }

    /// A plain message, optionally with a spinner.
    pub fn message(message: impl Into<String>, spinner: bool) -> Self {
        Self {
            message: Some(message.into()),
            spinner,
            ..Self::new("message")
        }
    }
}

/// Stack of open modals mirrored into the location hash as `#m=<depth>`.
///
/// Navigating to a location with a smaller depth (e.g. the back button)
/// truncates the stack to match.
pub struct ModalStack {
    stack: Store<Vec<Modal>>,
    router: Router,
    _location: Subscription,
}

impl ModalStack {
    pub fn new(router: Router) -> Self {
        let stack: Store<Vec<Modal>> = Store::default();
        let target = stack.clone();
        let location = router.location().subscribe(move |location| {
            let depth = location.modal_depth();
            if target.with(|s| depth < s.len()) {
                target.update(|mut s| {
                    s.truncate(depth);
                    s
                });
            }
        });
        Self {
            stack,
            router,
            _location: location,
        }
    }

    pub fn stack(&self) -> &Store<Vec<Modal>> {
        &self.stack
    }

    pub fn get_current(&self) -> Option<Modal> {
        self.stack.with(|s| s.last().cloned())
    }

    pub fn len(&self) -> usize {
        self.stack.with(|s| s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the location hash reflect `stack`'s depth.
    pub fn sync(&self, stack: &[Modal]) {
        let hash = if stack.is_empty() {
            String::new()
        } else {
            format!("#m={}", stack.len())
        };
        let location = self.router.current();
        if hash != location.hash {
            self.router.navigate(&format!("{}{}", location.pathname, hash));
        }
    }

    fn set_and_sync(&self, stack: Vec<Modal>) {
        self.stack.set(stack.clone());
        self.sync(&stack);
    }

    pub fn push(&self, modal: Modal) {
        let mut stack = self.stack.get();
        stack.push(modal);
        self.set_and_sync(stack);
    }

    pub fn remove(&self, id: Uuid) {
        let mut stack = self.stack.get();
        stack.retain(|m| m.id != id);
        self.set_and_sync(stack);
    }

    pub async fn pop(&self) {
        let mut stack = self.stack.get();
        stack.pop();
        self.set_and_sync(stack);
        tokio::time::sleep(MODAL_POP_DELAY).await;
    }

    /// Swap the top modal without touching the location.
    pub fn replace(&self, modal: Modal) {
        self.stack.update(|mut stack| {
            stack.pop();
            stack.push(modal);
            stack
        });
    }

    /// Pop every modal, one at a time.
    pub async fn clear(&self) {
        for _ in 0..self.len() {
            self.pop().await;
        }
    }
}

// ── Theme ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeName {
    Light,
    #[default]
    Dark,
}

impl ThemeName {
    pub fn toggled(self) -> Self {
        match self {
            ThemeName::Light => ThemeName::Dark,
            ThemeName::Dark => ThemeName::Light,
        }
    }
}

impl FromStr for ThemeName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(ThemeName::Light),
            "dark" => Ok(ThemeName::Dark),
            other => anyhow::bail!("Unknown theme: {}", other),
        }
    }
}

impl fmt::Display for ThemeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThemeName::Light => write!(f, "light"),
            ThemeName::Dark => write!(f, "dark"),
        }
    }
}

/// Color name/value pairs in declaration order.
pub type Palette = Vec<(String, String)>;

/// Parse `name:value,name:value`. A repeated name keeps its first position
/// and takes the last value; entries without a `:` are skipped.
pub fn parse_theme(s: &str) -> Palette {
    let mut palette: Palette = Vec::new();
    for entry in s.split(',') {
        let Some((key, value)) = entry.split_once(':') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() {
            continue;
        }
        match palette.iter_mut().find(|(k, _)| k == key) {
            Some(existing) => existing.1 = value.to_string(),
            None => palette.push((key.to_string(), value.to_string())),
        }
    }
    palette
}

pub struct Theme {
    current: Store<ThemeName>,
    light: Palette,
    dark: Palette,
    _synced: Option<Synced<ThemeName>>,
}

impl Theme {
    pub fn new(config: &ThemeConfig) -> Self {
        let current = Store::new(initial_theme(config));
        Self::build(config, current, None)
    }

    /// A theme whose selection is persisted at `path`.
    pub fn open(path: impl Into<PathBuf>, config: &ThemeConfig) -> Self {
        let synced = Synced::open(path, initial_theme(config));
        let current = synced.store().clone();
        Self::build(config, current, Some(synced))
    }

    fn build(config: &ThemeConfig, current: Store<ThemeName>, synced: Option<Synced<ThemeName>>) -> Self {
        Self {
            current,
            light: parse_theme(&config.light),
            dark: parse_theme(&config.dark),
            _synced: synced,
        }
    }

    pub fn store(&self) -> &Store<ThemeName> {
        &self.current
    }

    pub fn current(&self) -> ThemeName {
        self.current.get()
    }

    pub fn set(&self, theme: ThemeName) {
        self.current.set(theme);
    }

    pub fn toggle(&self) -> ThemeName {
        let next = self.current().toggled();
        self.set(next);
        next
    }

    pub fn get_theme_colors(&self, theme: ThemeName) -> &Palette {
        match theme {
            ThemeName::Light => &self.light,
            ThemeName::Dark => &self.dark,
        }
    }

    pub fn get_theme_color(&self, theme: ThemeName, key: &str) -> Option<&str> {
        self.get_theme_colors(theme)
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// CSS custom properties, one `--name: value;` per line.
    pub fn get_theme_variables(&self, theme: ThemeName) -> String {
        self.get_theme_colors(theme)
            .iter()
            .map(|(k, v)| format!("--{}: {};", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn initial_theme(config: &ThemeConfig) -> ThemeName {
    config.default.parse().unwrap_or_else(|e| {
        warn!("{e}; using dark theme");
        ThemeName::Dark
    })
}
