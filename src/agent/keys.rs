//! The active identity: who we are and whether we can sign.

use crate::store::Store;
use nostr_sdk::nips::nip04;
use nostr_sdk::{Event, EventBuilder, Keys, PublicKey, SecretKey};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("no identity is loaded")]
    NotLoggedIn,
    #[error("identity is read-only (public key only)")]
    ReadOnly,
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("crypto failure: {0}")]
    Crypto(String),
    #[error("serialization failure: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone)]
enum Identity {
    Signer(Keys),
    ReadOnly(PublicKey),
}

impl Identity {
    fn public_key(&self) -> PublicKey {
        match self {
            Identity::Signer(keys) => keys.public_key(),
            Identity::ReadOnly(pk) => *pk,
        }
    }
}

/// Holds the logged-in identity and exposes its pubkey as an observable value.
pub struct Keychain {
    identity: RwLock<Option<Identity>>,
    pubkey: Store<Option<String>>,
}

impl Default for Keychain {
    fn default() -> Self {
        Self::new()
    }
}

impl Keychain {
    pub fn new() -> Self {
        Self {
            identity: RwLock::new(None),
            pubkey: Store::new(None),
        }
    }

    /// Log in with a secret key (nsec1... or hex).
    pub fn set_private_key(&self, secret: &str) -> Result<PublicKey, KeyError> {
        let secret_key =
            SecretKey::parse(secret.trim()).map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        let keys = Keys::new(secret_key);
        let pk = keys.public_key();
        self.replace(Identity::Signer(keys));
        Ok(pk)
    }

    /// Log in read-only with a public key (npub1... or hex).
    pub fn set_public_key(&self, pubkey: &str) -> Result<PublicKey, KeyError> {
        let pk = PublicKey::parse(pubkey.trim()).map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        self.replace(Identity::ReadOnly(pk));
        Ok(pk)
    }

    fn replace(&self, identity: Identity) {
        let hex = identity.public_key().to_hex();
        *self.identity.write() = Some(identity);
        info!("Identity set: {}", hex);
        self.pubkey.set(Some(hex));
    }

    pub fn clear(&self) {
        *self.identity.write() = None;
        self.pubkey.set(None);
    }

    pub fn can_sign(&self) -> bool {
        matches!(*self.identity.read(), Some(Identity::Signer(_)))
    }

    /// Observable hex pubkey of the current identity.
    pub fn pubkey(&self) -> &Store<Option<String>> {
        &self.pubkey
    }

    pub fn public_key(&self) -> Option<PublicKey> {
        self.identity.read().as_ref().map(Identity::public_key)
    }

    fn keys(&self) -> Result<Keys, KeyError> {
        match self.identity.read().as_ref() {
            Some(Identity::Signer(keys)) => Ok(keys.clone()),
            Some(Identity::ReadOnly(_)) => Err(KeyError::ReadOnly),
            None => Err(KeyError::NotLoggedIn),
        }
    }

    /// Serialize `value` and encrypt it to ourselves (NIP-04).
    pub fn encrypt_json<T: Serialize>(&self, value: &T) -> Result<String, KeyError> {
        let keys = self.keys()?;
        let json = serde_json::to_string(value)?;
        nip04::encrypt(keys.secret_key(), &keys.public_key(), json)
            .map_err(|e| KeyError::Crypto(e.to_string()))
    }

    /// Inverse of [`Keychain::encrypt_json`].
    pub fn decrypt_json<T: DeserializeOwned>(&self, ciphertext: &str) -> Result<T, KeyError> {
        let keys = self.keys()?;
        let json = nip04::decrypt(keys.secret_key(), &keys.public_key(), ciphertext)
            .map_err(|e| KeyError::Crypto(e.to_string()))?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn sign(&self, builder: EventBuilder) -> Result<Event, KeyError> {
        let keys = self.keys()?;
        builder
            .sign_with_keys(&keys)
            .map_err(|e| KeyError::Crypto(e.to_string()))
    }
}
