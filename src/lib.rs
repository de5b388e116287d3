#![warn(missing_docs)]

//! A causal consistency cache that sits in front of an anna-style lattice key-value store.
//!
//! Each cache thread keeps the values it fetched from the key-value store and only exposes
//! them to multi-key readers once every causal dependency of the value is visible as well.
//! The [`nodes::causal_cache`] module contains the cache thread and its event loop.
//!
//! ## Usage Example
//!
//! Start a key-value store that speaks the [`messages::TcpMessage`] protocol, point the
//! `kvs-address` of a config file at it, and run:
//!
//! ```text
//! cargo run --bin causal-cache -- causal-cache-config.yml
//! ```
//!
//! Clients then send [`messages::CausalRequest`]s to `listen-ip:port-base + thread_id`.

pub use causal_cache_api::{lattice, ClientKey, KvsError, LatticeType, LatticeValue};
use eyre::anyhow;
use metadata::MetadataKey;

pub mod config;
pub mod messages;
pub mod metadata;
pub mod nodes;
pub mod store;
pub mod topics;

/// The key type used in the key-value store.
#[derive(Debug, PartialEq, Eq, Hash, Clone, serde::Serialize, serde::Deserialize)]
pub enum Key {
    /// A key supplied by a client of the cache.
    Client(ClientKey),
    /// Used to store internal metadata.
    Metadata(MetadataKey),
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Client(key) => write!(f, "{}", key),
            Key::Metadata(key) => write!(f, "{:?}", key),
        }
    }
}

impl From<MetadataKey> for Key {
    fn from(key: MetadataKey) -> Self {
        Self::Metadata(key)
    }
}

impl From<ClientKey> for Key {
    fn from(key: ClientKey) -> Self {
        Self::Client(key)
    }
}

impl<'a> From<&'a ClientKey> for Key {
    fn from(key: &'a ClientKey) -> Self {
        Self::Client(key.clone())
    }
}

impl std::convert::TryFrom<Key> for ClientKey {
    type Error = eyre::Error;

    fn try_from(value: Key) -> Result<Self, Self::Error> {
        match value {
            Key::Metadata(_) => Err(anyhow!("key is a metadata key instead of a client key")),
            Key::Client(key) => Ok(key),
        }
    }
}
