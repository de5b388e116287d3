//! Provides the [`MetadataKey`] type that cache threads use to publish information about
//! themselves in the key-value store.

use crate::Key;
use eyre::anyhow;

/// Keys under which internal metadata is stored in the key-value store.
#[derive(Debug, PartialEq, Eq, Hash, Clone, serde::Serialize, serde::Deserialize)]
pub enum MetadataKey {
    /// The set of client keys that a cache thread currently caches.
    ///
    /// Stored as a last-writer-wins value that each cache thread overwrites periodically,
    /// so that the key-value store knows which caches hold a key.
    CacheKeys {
        /// The [`CacheThread::cache_id`][crate::topics::CacheThread::cache_id] of the
        /// reporting thread.
        cache_id: String,
    },
}

impl std::convert::TryFrom<Key> for MetadataKey {
    type Error = eyre::Error;

    fn try_from(value: Key) -> Result<Self, Self::Error> {
        match value {
            Key::Client(_) => Err(anyhow!("key is a client key instead of a metadata key")),
            Key::Metadata(key) => Ok(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientKey;

    #[test]
    fn key_conversions() {
        let meta = MetadataKey::CacheKeys {
            cache_id: "cache-1:0".into(),
        };
        let key = Key::from(meta.clone());
        assert_eq!(MetadataKey::try_from(key.clone()).unwrap(), meta);
        assert!(ClientKey::try_from(key).is_err());

        let client = Key::from(ClientKey::from("k"));
        assert!(MetadataKey::try_from(client).is_err());
    }
}
