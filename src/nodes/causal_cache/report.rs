use super::CausalCacheNode;
use crate::{lattice::LastWriterWinsLattice, metadata::MetadataKey, ClientKey, LatticeValue};
use eyre::Context;
use std::collections::BTreeSet;

impl CausalCacheNode {
    /// Publishes the set of keys that clients read through this thread.
    ///
    /// The set is written as a last-writer-wins value under [`MetadataKey::CacheKeys`].
    /// The PUT is not tracked, so a timeout is not retried; the next report replaces it.
    pub fn report_cached_keys(&mut self) -> eyre::Result<()> {
        let keys: BTreeSet<&ClientKey> = self.key_set.iter().collect();
        let serialized = serde_json::to_vec(&keys).context("failed to serialize cached keys")?;

        let key = MetadataKey::CacheKeys {
            cache_id: self.ct.cache_id(),
        };
        log::debug!("Reporting {} cached keys", keys.len());
        self.kvs_put(
            key.into(),
            LatticeValue::Lww(LastWriterWinsLattice::new_now(serialized)),
        );
        Ok(())
    }
}
