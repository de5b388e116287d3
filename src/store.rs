//! Key-value stores for the causal values held by a cache thread.

use crate::{
    lattice::{
        causal::{CausalLattice, VectorClock},
        Lattice,
    },
    ClientKey,
};
use std::{
    borrow::Borrow,
    collections::{hash_map, HashMap},
    hash::Hash,
    sync::Arc,
};

/// A key-value store for [`CausalLattice`] values.
///
/// Values are handed out as shared [`Arc`] references, so that in-flight resolutions can keep
/// looking at a value while the store moves on. A merge never modifies a value that is still
/// referenced elsewhere; it replaces the stored reference with a merged copy instead.
#[derive(Debug, Default)]
pub struct LatticeStore {
    db: HashMap<ClientKey, Arc<CausalLattice>>,
}

impl LatticeStore {
    /// Gets the current value for the given key, if present.
    pub fn get<Q>(&self, key: &Q) -> Option<&Arc<CausalLattice>>
    where
        ClientKey: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.db.get(key)
    }

    /// Merges the given value into the stored value of the key.
    ///
    /// If the key is not present yet, the value is inserted as is. Returns the stored value
    /// after the merge.
    pub fn merge(&mut self, key: ClientKey, value: &CausalLattice) -> &Arc<CausalLattice> {
        match self.db.entry(key) {
            hash_map::Entry::Vacant(entry) => entry.insert(Arc::new(value.clone())),
            hash_map::Entry::Occupied(entry) => {
                let stored = entry.into_mut();
                Arc::make_mut(stored).merge(value);
                stored
            }
        }
    }

    /// Returns whether the store contains the given key.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        ClientKey: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.db.contains_key(key)
    }

    /// Returns an [`Iterator`] of all keys in the store.
    pub fn keys(&self) -> hash_map::Keys<'_, ClientKey, Arc<CausalLattice>> {
        self.db.keys()
    }

    /// The number of stored keys.
    pub fn len(&self) -> usize {
        self.db.len()
    }

    /// Returns `true` if no key is stored.
    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}

/// Keeps the version of each key that was admitted to the causal cut.
#[derive(Debug, Default)]
pub struct VersionStore {
    versions: HashMap<ClientKey, VectorClock>,
}

impl VersionStore {
    /// Returns the admitted version of the given key.
    pub fn get<Q>(&self, key: &Q) -> Option<&VectorClock>
    where
        ClientKey: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.versions.get(key)
    }

    /// Returns `true` if the admitted version of `key` includes the given version.
    ///
    /// The zero clock is included in every version, even for keys that were never admitted.
    pub fn covers<Q>(&self, key: &Q, version: &VectorClock) -> bool
    where
        ClientKey: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.versions.get(key) {
            Some(admitted) => admitted.dominates(version),
            None => version.is_zero(),
        }
    }

    /// Records that the given version of `key` was admitted.
    ///
    /// Admitted versions only grow: the new version is merged with the previous one.
    pub fn update(&mut self, key: ClientKey, version: &VectorClock) {
        match self.versions.entry(key) {
            hash_map::Entry::Vacant(entry) => {
                entry.insert(version.clone());
            }
            hash_map::Entry::Occupied(mut entry) => entry.get_mut().merge(version),
        }
    }
}
