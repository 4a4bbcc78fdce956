//! Identity, relays, the user's profile and the people directory.

pub mod cmd;
pub mod keys;
pub mod loaders;
pub mod people;
pub mod pool;
pub mod profile;
pub mod user;

pub use cmd::{Cmd, Command, PublishHandle};
pub use keys::{KeyError, Keychain};
pub use loaders::{Loader, NetworkLoader};
pub use people::People;
pub use pool::{EventSource, Pool, PoolConfig, Publisher};
pub use profile::{Profile, Settings};
pub use user::User;

use crate::config::Config;
use crate::store::Store;
use canoe_core::{Person, Relay};
use std::sync::Arc;
use tracing::debug;

const PROFILE_FILE: &str = "profile.json";

/// Everything the app needs to talk to relays on behalf of one identity.
pub struct Agent {
    pub keys: Arc<Keychain>,
    pub pool: PoolConfig,
    pub user: Arc<User>,
    pub people: People,
    pub loader: Arc<NetworkLoader>,
    /// Relays used while no user relay list is known.
    pub defaults: Store<Vec<Relay>>,
}

impl Agent {
    /// An agent backed by a live relay pool, with the profile persisted
    /// under the configured data directory.
    pub fn connect(config: &Config) -> Self {
        let pool_config = PoolConfig::default();
        let pool = Arc::new(Pool::new(pool_config.clone()));
        let profile_path = config.data_dir().join(PROFILE_FILE);
        debug!("Profile state at {}", profile_path.display());
        Self::build(config, pool.clone(), pool, pool_config, |keys, cmd, pool| {
            User::open(profile_path, default_profile(config), keys, cmd, pool)
        })
    }

    /// An agent over arbitrary relay I/O, with an in-memory profile.
    pub fn with_io(
        config: &Config,
        publisher: Arc<dyn Publisher>,
        source: Arc<dyn EventSource>,
    ) -> Self {
        Self::build(config, publisher, source, PoolConfig::default(), |keys, cmd, pool| {
            User::new(Store::new(default_profile(config)), keys, cmd, pool)
        })
    }

    fn build(
        config: &Config,
        publisher: Arc<dyn Publisher>,
        source: Arc<dyn EventSource>,
        pool: PoolConfig,
        user: impl FnOnce(Arc<Keychain>, Cmd, PoolConfig) -> User,
    ) -> Self {
        let keys = Arc::new(Keychain::new());
        let cmd = Cmd::new(Arc::clone(&keys), publisher);
        let user = Arc::new(user(Arc::clone(&keys), cmd, pool.clone()));
        let people = People::new();
        let loader = Arc::new(NetworkLoader::new(source, people.clone(), Arc::clone(&user)));
        let defaults = Store::new(config.relays.iter().map(Relay::new).collect());

        Self {
            keys,
            pool,
            user,
            people,
            loader,
            defaults,
        }
    }

    /// The user's relays if they have any, otherwise the defaults.
    pub fn get_relays(&self) -> Vec<Relay> {
        let relays = self.user.get_relays();
        if relays.is_empty() {
            self.defaults.get()
        } else {
            relays
        }
    }

    /// URLs of [`Agent::get_relays`] that we read from.
    pub fn read_urls(&self) -> Vec<String> {
        self.get_relays()
            .into_iter()
            .filter(|r| r.read)
            .map(|r| r.url)
            .collect()
    }

    pub fn get_person(&self, pubkey: &str) -> Option<Person> {
        self.people.get(pubkey)
    }
}

fn default_profile(config: &Config) -> Profile {
    Profile::new(Settings::from_config(&config.settings))
}
