//! Reduces the versions that a client has observed to the causal frontier.

use crate::{
    lattice::causal::{CausalOrder, VectorClock},
    messages::{Address, KeyVersion},
    ClientKey,
};
use std::collections::{HashMap, HashSet};

/// The maximal versions per key that a client has observed.
///
/// Versions that are dominated by another observed version of the same key are dropped.
/// Concurrent versions are all kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CausalFrontier {
    versions: HashMap<ClientKey, HashSet<VectorClock>>,
}

impl CausalFrontier {
    /// Computes the frontier of all versions in the given dependency locations.
    pub fn from_locations(locations: &HashMap<Address, Vec<KeyVersion>>) -> Self {
        let mut frontier = Self::default();
        for key_version in locations.values().flatten() {
            frontier.insert(&key_version.key, &key_version.vector_clock);
        }
        frontier
    }

    /// Adds an observed version of `key` to the frontier.
    ///
    /// Does nothing if an equal or newer version is already part of the frontier.
    /// Otherwise the version is added and all versions that it dominates are removed.
    pub fn insert(&mut self, key: &ClientKey, version: &VectorClock) {
        let versions = self.versions.entry(key.clone()).or_default();

        let mut dominated = Vec::new();
        for existing in versions.iter() {
            match version.compare(existing) {
                CausalOrder::Less | CausalOrder::Equal => return,
                CausalOrder::Greater => dominated.push(existing.clone()),
                CausalOrder::Concurrent => {}
            }
        }
        for old in dominated {
            versions.remove(&old);
        }
        versions.insert(version.clone());
    }

    /// Returns `true` if the client observed some version of `key`.
    pub fn contains_key(&self, key: &ClientKey) -> bool {
        self.versions.contains_key(key)
    }

    /// Returns `true` if `version` is exactly one of the frontier versions of `key`.
    pub fn contains(&self, key: &ClientKey, version: &VectorClock) -> bool {
        self.versions
            .get(key)
            .map_or(false, |versions| versions.contains(version))
    }

    /// Returns `true` if some frontier version of `key` includes `version`.
    pub fn covers(&self, key: &ClientKey, version: &VectorClock) -> bool {
        self.versions.get(key).map_or(false, |versions| {
            versions.iter().any(|observed| observed.dominates(version))
        })
    }

    /// The frontier versions of `key`.
    pub fn get(&self, key: &ClientKey) -> Option<&HashSet<VectorClock>> {
        self.versions.get(key)
    }
}
